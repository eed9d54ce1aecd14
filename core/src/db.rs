use std::io::Write;
use std::path::Path;

use chrono::{Local, NaiveDate};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, OptionalRow, Result};
use crate::models::{
    DATE_FORMAT, DailyReport, DayPreset, ExpandedFood, Food, FoodHistoryRow, FoodLink,
    HistoryEntry, HistoryKind, Meal, MealLink, NewFood, NewUser, Nutrient, User, UserUpdate,
    normalize_meal_type, scale_per_100g, validate_name, validate_new_food, validate_new_user,
    validate_quantity, validate_user_update,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        firstname TEXT NOT NULL,
        lastname TEXT NOT NULL,
        age INTEGER NOT NULL,
        weight INTEGER NOT NULL,
        height INTEGER NOT NULL,
        target_weight INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS weight_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        date TEXT NOT NULL,
        weight REAL NOT NULL
    );

    CREATE TABLE IF NOT EXISTS imc_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        date TEXT NOT NULL,
        imc REAL NOT NULL
    );

    CREATE TABLE IF NOT EXISTS body_fat_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        date TEXT NOT NULL,
        body_fat REAL NOT NULL
    );

    CREATE TABLE IF NOT EXISTS food (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        fdc_id INTEGER UNIQUE,
        name TEXT NOT NULL,
        calories REAL,
        source TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS food_nutrient (
        food_id INTEGER NOT NULL REFERENCES food(id) ON DELETE CASCADE,
        nutrient_id INTEGER NOT NULL,
        amount REAL NOT NULL,
        PRIMARY KEY (food_id, nutrient_id)
    );

    CREATE TABLE IF NOT EXISTS meal (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        type TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS meal_food (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        meal_id INTEGER NOT NULL REFERENCES meal(id),
        food_id INTEGER NOT NULL REFERENCES food(id),
        quantity REAL NOT NULL
    );

    CREATE TABLE IF NOT EXISTS food_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        food_id INTEGER NOT NULL REFERENCES food(id),
        date TEXT NOT NULL,
        quantity REAL NOT NULL
    );

    CREATE TABLE IF NOT EXISTS day_preset (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        name TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS day_preset_meal (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        day_preset_id INTEGER NOT NULL REFERENCES day_preset(id),
        meal_id INTEGER NOT NULL REFERENCES meal(id),
        quantity REAL NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_food_name ON food(name);
    CREATE INDEX IF NOT EXISTS idx_meal_food_meal ON meal_food(meal_id);
    CREATE INDEX IF NOT EXISTS idx_day_preset_user ON day_preset(user_id);
    CREATE INDEX IF NOT EXISTS idx_day_preset_meal_day ON day_preset_meal(day_preset_id);
    CREATE INDEX IF NOT EXISTS idx_food_history_user_date ON food_history(user_id, date);
    CREATE INDEX IF NOT EXISTS idx_weight_history_user ON weight_history(user_id);
    CREATE INDEX IF NOT EXISTS idx_imc_history_user ON imc_history(user_id);
    CREATE INDEX IF NOT EXISTS idx_body_fat_history_user ON body_fat_history(user_id);
";

/// Tables created by [`Database::init_schema`].
pub const TABLES: &[&str] = &[
    "users",
    "weight_history",
    "imc_history",
    "body_fat_history",
    "food",
    "food_nutrient",
    "meal",
    "meal_food",
    "food_history",
    "day_preset",
    "day_preset_meal",
];

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened database");
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create every table and index that is missing. Never drops or alters
    /// existing data, so it is safe to call on every start.
    pub fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(SCHEMA)?;
        debug!("schema ready");
        Ok(())
    }

    // --- Row mapping helpers ---

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            firstname: row.get(1)?,
            lastname: row.get(2)?,
            age: row.get(3)?,
            weight_kg: row.get(4)?,
            height_cm: row.get(5)?,
            target_weight_kg: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn food_from_row(row: &rusqlite::Row) -> rusqlite::Result<Food> {
        Ok(Food {
            id: row.get(0)?,
            fdc_id: row.get(1)?,
            name: row.get(2)?,
            calories: row.get(3)?,
            nutrients: Vec::new(),
            source: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Meal> {
        Ok(Meal {
            id: row.get(0)?,
            name: row.get(1)?,
            meal_type: row.get(2)?,
        })
    }

    fn day_preset_from_row(row: &rusqlite::Row) -> rusqlite::Result<DayPreset> {
        Ok(DayPreset {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
        })
    }

    fn date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
        let s: String = row.get(idx)?;
        NaiveDate::parse_from_str(&s, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    // --- Users ---

    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        validate_new_user(user)?;
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO users (firstname, lastname, age, weight, height, target_weight, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.firstname.trim(),
                user.lastname.trim(),
                user.age,
                user.weight_kg,
                user.height_cm,
                user.target_weight_kg,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(user_id = id, "created user");
        self.get_user(id)
    }

    pub fn get_user(&self, id: i64) -> Result<User> {
        self.conn
            .query_row(
                "SELECT id, firstname, lastname, age, weight, height, target_weight, created_at
                 FROM users WHERE id = ?1",
                params![id],
                Self::user_from_row,
            )
            .or_not_found("user", id)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, firstname, lastname, age, weight, height, target_weight, created_at
             FROM users ORDER BY id",
        )?;
        let users = stmt
            .query_map([], Self::user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn update_user(&self, id: i64, update: &UserUpdate) -> Result<User> {
        validate_user_update(update)?;
        // Verify existence
        self.get_user(id)?;

        if let Some(weight) = update.weight_kg {
            self.conn.execute(
                "UPDATE users SET weight = ?1 WHERE id = ?2",
                params![weight, id],
            )?;
        }
        if let Some(height) = update.height_cm {
            self.conn.execute(
                "UPDATE users SET height = ?1 WHERE id = ?2",
                params![height, id],
            )?;
        }
        if let Some(age) = update.age {
            self.conn
                .execute("UPDATE users SET age = ?1 WHERE id = ?2", params![age, id])?;
        }
        if let Some(target) = update.target_weight_kg {
            self.conn.execute(
                "UPDATE users SET target_weight = ?1 WHERE id = ?2",
                params![target, id],
            )?;
        }

        self.get_user(id)
    }

    // --- Foods ---

    pub fn insert_food(&self, food: &NewFood) -> Result<Food> {
        validate_new_food(food)?;
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO food (fdc_id, name, calories, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![food.fdc_id, food.name.trim(), food.calories, food.source, now],
        )?;
        let id = self.conn.last_insert_rowid();
        for n in &food.nutrients {
            self.conn.execute(
                "INSERT OR REPLACE INTO food_nutrient (food_id, nutrient_id, amount)
                 VALUES (?1, ?2, ?3)",
                params![id, n.nutrient_id, n.amount_per_100g],
            )?;
        }
        debug!(food_id = id, fdc_id = ?food.fdc_id, "inserted food");
        self.get_food(id)
    }

    /// Insert a catalog food unless one with the same FDC id is already stored.
    pub fn upsert_food_by_fdc_id(&self, food: &NewFood) -> Result<Food> {
        if let Some(fdc_id) = food.fdc_id {
            if let Some(existing) = self.get_food_by_fdc_id(fdc_id)? {
                return Ok(existing);
            }
        }
        self.insert_food(food)
    }

    pub fn get_food(&self, id: i64) -> Result<Food> {
        let mut food = self
            .conn
            .query_row(
                "SELECT id, fdc_id, name, calories, source, created_at FROM food WHERE id = ?1",
                params![id],
                Self::food_from_row,
            )
            .or_not_found("food", id)?;
        food.nutrients = self.food_nutrients(id)?;
        Ok(food)
    }

    pub fn get_food_by_fdc_id(&self, fdc_id: i64) -> Result<Option<Food>> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM food WHERE fdc_id = ?1",
                params![fdc_id],
                |row| row.get(0),
            )
            .optional()?;
        id.map(|id| self.get_food(id)).transpose()
    }

    fn food_nutrients(&self, food_id: i64) -> Result<Vec<Nutrient>> {
        let mut stmt = self.conn.prepare(
            "SELECT nutrient_id, amount FROM food_nutrient WHERE food_id = ?1 ORDER BY nutrient_id",
        )?;
        let nutrients = stmt
            .query_map(params![food_id], |row| {
                Ok(Nutrient {
                    nutrient_id: row.get(0)?,
                    amount_per_100g: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nutrients)
    }

    /// Look a food up by name: exact (case-insensitive) match first, then a
    /// substring match that must be unambiguous.
    pub fn find_food_by_name(&self, name: &str) -> Result<Food> {
        let exact: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM food WHERE LOWER(name) = LOWER(?1) ORDER BY id LIMIT 1",
                params![name.trim()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = exact {
            return self.get_food(id);
        }

        let matches = self.search_foods_local(name)?;
        match matches.as_slice() {
            [] => Err(Error::not_found("food", format!("'{name}'"))),
            [only] => self.get_food(only.id),
            _ => Err(Error::validation(format!(
                "'{name}' matches {} foods; use a food id instead",
                matches.len()
            ))),
        }
    }

    pub fn search_foods_local(&self, query: &str) -> Result<Vec<Food>> {
        let escaped = query
            .trim()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{escaped}%");
        let mut stmt = self.conn.prepare(
            "SELECT id, fdc_id, name, calories, source, created_at FROM food
             WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name LIMIT 20",
        )?;
        let foods = stmt
            .query_map(params![pattern], Self::food_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }

    /// List stored foods. Nutrients are not loaded; use [`Database::get_food`].
    pub fn list_foods(&self, search: Option<&str>) -> Result<Vec<Food>> {
        if let Some(query) = search {
            return self.search_foods_local(query);
        }
        let mut stmt = self.conn.prepare(
            "SELECT id, fdc_id, name, calories, source, created_at FROM food ORDER BY name LIMIT 100",
        )?;
        let foods = stmt
            .query_map([], Self::food_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }

    // --- Meals ---

    pub fn create_meal(&self, name: &str, meal_type: &str) -> Result<Meal> {
        validate_name("Meal", name)?;
        let meal_type = normalize_meal_type(meal_type)?;
        self.conn.execute(
            "INSERT INTO meal (name, type) VALUES (?1, ?2)",
            params![name.trim(), meal_type],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(meal_id = id, "created meal");
        self.get_meal(id)
    }

    pub fn get_meal(&self, id: i64) -> Result<Meal> {
        self.conn
            .query_row(
                "SELECT id, name, type FROM meal WHERE id = ?1",
                params![id],
                Self::meal_from_row,
            )
            .or_not_found("meal", id)
    }

    /// Case-insensitive lookup; the oldest meal wins when names repeat.
    pub fn find_meal(&self, name: &str) -> Result<Meal> {
        self.conn
            .query_row(
                "SELECT id, name, type FROM meal WHERE LOWER(name) = LOWER(?1) ORDER BY id LIMIT 1",
                params![name.trim()],
                Self::meal_from_row,
            )
            .or_not_found("meal", format!("'{name}'"))
    }

    pub fn list_meals(&self) -> Result<Vec<Meal>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, type FROM meal ORDER BY id")?;
        let meals = stmt
            .query_map([], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    /// Append a food to a meal. Re-linking the same food adds another row.
    pub fn link_food_to_meal(&self, food_id: i64, meal_id: i64, quantity_g: f64) -> Result<FoodLink> {
        let quantity_g = validate_quantity("Quantity", quantity_g)?;
        self.get_meal(meal_id)?;
        let food = self.get_food(food_id)?;
        self.conn.execute(
            "INSERT INTO meal_food (meal_id, food_id, quantity) VALUES (?1, ?2, ?3)",
            params![meal_id, food_id, quantity_g],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(link_id = id, meal_id, food_id, quantity_g, "linked food to meal");
        Ok(FoodLink {
            id,
            meal_id,
            food_id,
            quantity_g,
            food_name: Some(food.name),
        })
    }

    pub fn meal_foods(&self, meal_id: i64) -> Result<Vec<FoodLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT mf.id, mf.meal_id, mf.food_id, mf.quantity, f.name
             FROM meal_food mf
             JOIN food f ON mf.food_id = f.id
             WHERE mf.meal_id = ?1
             ORDER BY mf.id",
        )?;
        let links = stmt
            .query_map(params![meal_id], |row| {
                Ok(FoodLink {
                    id: row.get(0)?,
                    meal_id: row.get(1)?,
                    food_id: row.get(2)?,
                    quantity_g: row.get(3)?,
                    food_name: Some(row.get(4)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    /// Foods of a meal in link order. Unknown or empty meals expand to nothing.
    pub fn expand_meal(&self, meal_id: i64) -> Result<Vec<ExpandedFood>> {
        let mut stmt = self
            .conn
            .prepare("SELECT food_id, quantity FROM meal_food WHERE meal_id = ?1 ORDER BY id")?;
        let foods = stmt
            .query_map(params![meal_id], |row| {
                Ok(ExpandedFood {
                    food_id: row.get(0)?,
                    quantity_g: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }

    // --- Day presets ---

    pub fn create_day_preset(&self, user_id: i64, name: &str) -> Result<DayPreset> {
        validate_name("Day preset", name)?;
        self.get_user(user_id)?;
        self.conn.execute(
            "INSERT INTO day_preset (user_id, name) VALUES (?1, ?2)",
            params![user_id, name.trim()],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(day_preset_id = id, user_id, "created day preset");
        self.get_day_preset(id)
    }

    pub fn get_day_preset(&self, id: i64) -> Result<DayPreset> {
        self.conn
            .query_row(
                "SELECT id, user_id, name FROM day_preset WHERE id = ?1",
                params![id],
                Self::day_preset_from_row,
            )
            .or_not_found("day preset", id)
    }

    pub fn find_day_preset(&self, user_id: i64, name: &str) -> Result<DayPreset> {
        self.conn
            .query_row(
                "SELECT id, user_id, name FROM day_preset
                 WHERE user_id = ?1 AND LOWER(name) = LOWER(?2) ORDER BY id LIMIT 1",
                params![user_id, name.trim()],
                Self::day_preset_from_row,
            )
            .or_not_found("day preset", format!("'{name}'"))
    }

    pub fn list_day_presets(&self, user_id: i64) -> Result<Vec<DayPreset>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, user_id, name FROM day_preset WHERE user_id = ?1 ORDER BY id")?;
        let days = stmt
            .query_map(params![user_id], Self::day_preset_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(days)
    }

    /// Append a meal to a day preset with a multiplier. Not deduplicated.
    pub fn link_meal_to_day_preset(
        &self,
        meal_id: i64,
        day_preset_id: i64,
        multiplier: f64,
    ) -> Result<MealLink> {
        let multiplier = validate_quantity("Multiplier", multiplier)?;
        let meal = self.get_meal(meal_id)?;
        self.get_day_preset(day_preset_id)?;
        self.conn.execute(
            "INSERT INTO day_preset_meal (day_preset_id, meal_id, quantity) VALUES (?1, ?2, ?3)",
            params![day_preset_id, meal_id, multiplier],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(link_id = id, day_preset_id, meal_id, multiplier, "linked meal to day preset");
        Ok(MealLink {
            id,
            day_preset_id,
            meal_id,
            multiplier,
            meal_name: Some(meal.name),
        })
    }

    pub fn day_preset_meals(&self, day_preset_id: i64) -> Result<Vec<MealLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT dpm.id, dpm.day_preset_id, dpm.meal_id, dpm.quantity, m.name
             FROM day_preset_meal dpm
             JOIN meal m ON dpm.meal_id = m.id
             WHERE dpm.day_preset_id = ?1
             ORDER BY dpm.id",
        )?;
        let links = stmt
            .query_map(params![day_preset_id], |row| {
                Ok(MealLink {
                    id: row.get(0)?,
                    day_preset_id: row.get(1)?,
                    meal_id: row.get(2)?,
                    multiplier: row.get(3)?,
                    meal_name: Some(row.get(4)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    /// Every food of every meal of a day, scaled by the meal's multiplier.
    ///
    /// Ordered by meal link, then food link. A food reached through two meals
    /// appears twice.
    pub fn expand_day_preset(&self, day_preset_id: i64) -> Result<Vec<ExpandedFood>> {
        let mut stmt = self.conn.prepare(
            "SELECT mf.food_id, mf.quantity * dpm.quantity
             FROM day_preset_meal dpm
             JOIN meal_food mf ON mf.meal_id = dpm.meal_id
             WHERE dpm.day_preset_id = ?1
             ORDER BY dpm.id, mf.id",
        )?;
        let foods = stmt
            .query_map(params![day_preset_id], |row| {
                Ok(ExpandedFood {
                    food_id: row.get(0)?,
                    quantity_g: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(foods)
    }

    // --- History ---

    pub fn append_history(
        &self,
        kind: HistoryKind,
        user_id: i64,
        date: NaiveDate,
        value: f64,
        food_id: Option<i64>,
    ) -> Result<HistoryEntry> {
        if !value.is_finite() {
            return Err(Error::validation(format!("{kind} value must be a number")));
        }
        self.get_user(user_id)?;
        let date_str = date.format(DATE_FORMAT).to_string();

        let food_id = match (kind, food_id) {
            (HistoryKind::Food, Some(food_id)) => {
                validate_quantity("Quantity", value)?;
                self.get_food(food_id)?;
                self.conn.execute(
                    "INSERT INTO food_history (user_id, food_id, date, quantity)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![user_id, food_id, date_str, value],
                )?;
                Some(food_id)
            }
            (HistoryKind::Food, None) => {
                return Err(Error::validation("Food history entries need a food id"));
            }
            (_, Some(_)) => {
                return Err(Error::validation(format!(
                    "{kind} history entries do not reference foods"
                )));
            }
            (_, None) => {
                let sql = format!(
                    "INSERT INTO {} (user_id, date, {}) VALUES (?1, ?2, ?3)",
                    kind.table(),
                    kind.value_column()
                );
                self.conn.execute(&sql, params![user_id, date_str, value])?;
                None
            }
        };

        let id = self.conn.last_insert_rowid();
        debug!(%kind, entry_id = id, user_id, value, "appended history");
        Ok(HistoryEntry {
            id,
            kind,
            user_id,
            date,
            value,
            food_id,
        })
    }

    /// Entries of one kind for a user, oldest insert first.
    pub fn query_history(&self, kind: HistoryKind, user_id: i64) -> Result<Vec<HistoryEntry>> {
        let food_col = if kind == HistoryKind::Food {
            "food_id"
        } else {
            "NULL"
        };
        let sql = format!(
            "SELECT id, user_id, date, {}, {food_col} FROM {} WHERE user_id = ?1 ORDER BY id",
            kind.value_column(),
            kind.table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![user_id], |row| {
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    kind,
                    user_id: row.get(1)?,
                    date: Self::date_column(row, 2)?,
                    value: row.get(3)?,
                    food_id: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Delete a food-history entry by id. Missing ids are not an error.
    pub fn delete_food_history(&self, entry_id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM food_history WHERE id = ?1", params![entry_id])?;
        debug!(entry_id, deleted = rows > 0, "delete food history");
        Ok(rows > 0)
    }

    pub fn get_food_history_entry(&self, entry_id: i64) -> Result<HistoryEntry> {
        self.conn
            .query_row(
                "SELECT id, user_id, date, quantity, food_id FROM food_history WHERE id = ?1",
                params![entry_id],
                |row| {
                    Ok(HistoryEntry {
                        id: row.get(0)?,
                        kind: HistoryKind::Food,
                        user_id: row.get(1)?,
                        date: Self::date_column(row, 2)?,
                        value: row.get(3)?,
                        food_id: row.get(4)?,
                    })
                },
            )
            .or_not_found("food history entry", entry_id)
    }

    /// Food history joined with food names and scaled calories.
    pub fn food_history(
        &self,
        user_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<Vec<FoodHistoryRow>> {
        let date_str = date.map(|d| d.format(DATE_FORMAT).to_string());
        let mut stmt = self.conn.prepare(
            "SELECT fh.id, fh.date, fh.food_id, f.name, fh.quantity, f.calories
             FROM food_history fh
             JOIN food f ON fh.food_id = f.id
             WHERE fh.user_id = ?1 AND (?2 IS NULL OR fh.date = ?2)
             ORDER BY fh.id",
        )?;
        let rows = stmt
            .query_map(params![user_id, date_str], |row| {
                let quantity_g: f64 = row.get(4)?;
                let cal_100: Option<f64> = row.get(5)?;
                Ok(FoodHistoryRow {
                    id: row.get(0)?,
                    date: Self::date_column(row, 1)?,
                    food_id: row.get(2)?,
                    food_name: row.get(3)?,
                    quantity_g,
                    calories: cal_100.map(|c| scale_per_100g(c, quantity_g)),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn daily_report(&self, user_id: i64, date: NaiveDate) -> Result<DailyReport> {
        self.get_user(user_id)?;
        let entries = self.food_history(user_id, Some(date))?;
        let total_calories = entries.iter().filter_map(|e| e.calories).sum();
        let total_quantity_g = entries.iter().map(|e| e.quantity_g).sum();
        Ok(DailyReport {
            user_id,
            date,
            entries,
            total_calories,
            total_quantity_g,
        })
    }

    /// Write one kind of history as CSV. Returns the number of data rows.
    pub fn export_history_csv<W: Write>(
        &self,
        kind: HistoryKind,
        user_id: i64,
        writer: W,
    ) -> Result<usize> {
        #[derive(Serialize)]
        struct CsvRow {
            id: i64,
            date: String,
            value: f64,
            food_id: Option<i64>,
        }

        let entries = self.query_history(kind, user_id)?;
        let mut wtr = csv::Writer::from_writer(writer);
        for e in &entries {
            wtr.serialize(CsvRow {
                id: e.id,
                date: e.date.format(DATE_FORMAT).to_string(),
                value: e.value,
                food_id: e.food_id,
            })?;
        }
        if entries.is_empty() {
            wtr.write_record(["id", "date", "value", "food_id"])?;
        }
        wtr.flush()?;
        Ok(entries.len())
    }
}
