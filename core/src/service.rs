use std::io::Write;
use std::path::Path;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogHit, FoodCatalog};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::metrics::{BodyMetrics, body_fat_estimate, body_mass_index, round2};
use crate::models::{
    DailyReport, DayPreset, ExpandedFood, Food, HistoryEntry, HistoryKind, Meal, NewUser, User,
    UserUpdate,
};

/// The logged-in user. Every user-scoped operation takes one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    user_id: i64,
}

impl Session {
    #[must_use]
    pub fn user_id(&self) -> i64 {
        self.user_id
    }
}

/// One expanded item that could not be logged.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub food_id: i64,
    pub quantity_g: f64,
    pub reason: String,
}

/// Result of logging a meal or a day preset item by item.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompositeOutcome {
    pub logged: Vec<HistoryEntry>,
    pub failures: Vec<ItemFailure>,
}

impl CompositeOutcome {
    /// Nothing was expanded at all, so there was nothing to log.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logged.is_empty() && self.failures.is_empty()
    }

    #[must_use]
    pub fn total_quantity_g(&self) -> f64 {
        self.logged.iter().map(|e| e.value).sum()
    }
}

pub struct Tracker {
    db: Database,
}

impl Tracker {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    /// Read-only queries go straight to the ledger.
    #[must_use]
    pub fn db(&self) -> &Database {
        &self.db
    }

    // --- Users ---

    /// Create a user and record their starting measurements for today.
    pub fn register(&self, user: &NewUser) -> Result<(Session, User)> {
        let user = self.db.create_user(user)?;
        let today = Local::now().date_naive();
        self.record_measurements(&user, today)?;
        info!(user_id = user.id, "registered user");
        Ok((Session { user_id: user.id }, user))
    }

    pub fn login(&self, user_id: i64) -> Result<Session> {
        let user = self.db.get_user(user_id)?;
        debug!(user_id = user.id, "logged in");
        Ok(Session { user_id: user.id })
    }

    pub fn current_user(&self, session: &Session) -> Result<User> {
        self.db.get_user(session.user_id)
    }

    pub fn metrics(&self, session: &Session) -> Result<BodyMetrics> {
        let user = self.current_user(session)?;
        Ok(BodyMetrics::for_user(&user))
    }

    /// Update the weight and append weight, BMI and body-fat history rows.
    pub fn set_weight(&self, session: &Session, weight_kg: i64, date: NaiveDate) -> Result<User> {
        let user = self.db.update_user(
            session.user_id,
            &UserUpdate {
                weight_kg: Some(weight_kg),
                ..UserUpdate::default()
            },
        )?;
        self.record_measurements(&user, date)?;
        Ok(user)
    }

    /// Update the height and append a BMI history row.
    pub fn set_height(&self, session: &Session, height_cm: i64, date: NaiveDate) -> Result<User> {
        let user = self.db.update_user(
            session.user_id,
            &UserUpdate {
                height_cm: Some(height_cm),
                ..UserUpdate::default()
            },
        )?;
        self.db.append_history(
            HistoryKind::BodyMassIndex,
            user.id,
            date,
            round2(body_mass_index(user.weight_kg, user.height_cm)),
            None,
        )?;
        Ok(user)
    }

    pub fn set_age(&self, session: &Session, age: i64) -> Result<User> {
        self.db.update_user(
            session.user_id,
            &UserUpdate {
                age: Some(age),
                ..UserUpdate::default()
            },
        )
    }

    pub fn set_target_weight(&self, session: &Session, target_kg: i64) -> Result<User> {
        self.db.update_user(
            session.user_id,
            &UserUpdate {
                target_weight_kg: Some(target_kg),
                ..UserUpdate::default()
            },
        )
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_measurements(&self, user: &User, date: NaiveDate) -> Result<()> {
        self.db.append_history(
            HistoryKind::Weight,
            user.id,
            date,
            user.weight_kg as f64,
            None,
        )?;
        self.db.append_history(
            HistoryKind::BodyMassIndex,
            user.id,
            date,
            round2(body_mass_index(user.weight_kg, user.height_cm)),
            None,
        )?;
        self.db.append_history(
            HistoryKind::BodyFat,
            user.id,
            date,
            round2(body_fat_estimate(user.weight_kg)),
            None,
        )?;
        Ok(())
    }

    // --- Lookups by id or name ---

    /// Resolve a food from a numeric id or a name.
    pub fn resolve_food(&self, id_or_name: &str) -> Result<Food> {
        match id_or_name.trim().parse::<i64>() {
            Ok(id) => self.db.get_food(id),
            Err(_) => self.db.find_food_by_name(id_or_name),
        }
    }

    pub fn resolve_meal(&self, id_or_name: &str) -> Result<Meal> {
        match id_or_name.trim().parse::<i64>() {
            Ok(id) => self.db.get_meal(id),
            Err(_) => self.db.find_meal(id_or_name),
        }
    }

    /// Resolve one of the session user's day presets.
    pub fn resolve_day_preset(&self, session: &Session, id_or_name: &str) -> Result<DayPreset> {
        match id_or_name.trim().parse::<i64>() {
            Ok(id) => {
                let day = self.db.get_day_preset(id)?;
                if day.user_id != session.user_id {
                    return Err(Error::not_found("day preset", id));
                }
                Ok(day)
            }
            Err(_) => self.db.find_day_preset(session.user_id, id_or_name),
        }
    }

    // --- Day presets ---

    pub fn create_day_preset(&self, session: &Session, name: &str) -> Result<DayPreset> {
        self.db.create_day_preset(session.user_id, name)
    }

    pub fn list_day_presets(&self, session: &Session) -> Result<Vec<DayPreset>> {
        self.db.list_day_presets(session.user_id)
    }

    // --- Consumption ---

    pub fn log_food(
        &self,
        session: &Session,
        food_id: i64,
        quantity_g: f64,
        date: NaiveDate,
    ) -> Result<HistoryEntry> {
        self.db.append_history(
            HistoryKind::Food,
            session.user_id,
            date,
            quantity_g,
            Some(food_id),
        )
    }

    /// Log every food of a meal. Items that fail are reported, not fatal.
    pub fn log_meal(
        &self,
        session: &Session,
        meal_id: i64,
        date: NaiveDate,
    ) -> Result<CompositeOutcome> {
        let items = self.db.expand_meal(meal_id)?;
        debug!(meal_id, items = items.len(), "expanded meal");
        Ok(self.log_expanded(session, &items, date))
    }

    /// Log every food of every meal in a day preset.
    pub fn log_day_preset(
        &self,
        session: &Session,
        day_preset_id: i64,
        date: NaiveDate,
    ) -> Result<CompositeOutcome> {
        match self.db.get_day_preset(day_preset_id) {
            Ok(day) if day.user_id != session.user_id => {
                return Err(Error::not_found("day preset", day_preset_id));
            }
            Ok(_) => {}
            // Unknown presets expand to nothing
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        let items = self.db.expand_day_preset(day_preset_id)?;
        debug!(day_preset_id, items = items.len(), "expanded day preset");
        Ok(self.log_expanded(session, &items, date))
    }

    fn log_expanded(
        &self,
        session: &Session,
        items: &[ExpandedFood],
        date: NaiveDate,
    ) -> CompositeOutcome {
        let mut outcome = CompositeOutcome::default();
        for item in items {
            match self.log_food(session, item.food_id, item.quantity_g, date) {
                Ok(entry) => outcome.logged.push(entry),
                Err(e) => {
                    warn!(food_id = item.food_id, error = %e, "failed to log item");
                    outcome.failures.push(ItemFailure {
                        food_id: item.food_id,
                        quantity_g: item.quantity_g,
                        reason: e.to_string(),
                    });
                }
            }
        }
        outcome
    }

    /// Delete one of the session user's food entries.
    ///
    /// Entries that do not exist or belong to someone else are left alone and
    /// reported as `false`.
    pub fn delete_food_entry(&self, session: &Session, entry_id: i64) -> Result<bool> {
        match self.db.get_food_history_entry(entry_id) {
            Ok(entry) if entry.user_id == session.user_id => self.db.delete_food_history(entry_id),
            Ok(_) => {
                warn!(entry_id, "refusing to delete another user's entry");
                Ok(false)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    // --- Reporting ---

    pub fn history(&self, session: &Session, kind: HistoryKind) -> Result<Vec<HistoryEntry>> {
        self.db.query_history(kind, session.user_id)
    }

    pub fn daily_report(&self, session: &Session, date: NaiveDate) -> Result<DailyReport> {
        self.db.daily_report(session.user_id, date)
    }

    pub fn export_history<W: Write>(
        &self,
        session: &Session,
        kind: HistoryKind,
        writer: W,
    ) -> Result<usize> {
        self.db.export_history_csv(kind, session.user_id, writer)
    }

    // --- Catalog ---

    pub fn search_catalog(&self, catalog: &dyn FoodCatalog, query: &str) -> Result<Vec<CatalogHit>> {
        if query.trim().is_empty() {
            return Err(Error::validation("Search query must not be empty"));
        }
        catalog.search(query.trim())
    }

    /// Fetch a catalog food and cache it locally. Already cached foods are
    /// returned without asking the catalog.
    pub fn import_food(&self, catalog: &dyn FoodCatalog, fdc_id: i64) -> Result<Food> {
        if let Some(food) = self.db.get_food_by_fdc_id(fdc_id)? {
            debug!(fdc_id, food_id = food.id, "catalog food already cached");
            return Ok(food);
        }
        let details = catalog.details(fdc_id)?;
        let food = self.db.upsert_food_by_fdc_id(&details.into_new_food())?;
        info!(fdc_id, food_id = food.id, "imported catalog food");
        Ok(food)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::catalog::CatalogFood;
    use crate::models::{NewFood, Nutrient};

    struct MockCatalog {
        foods: Vec<CatalogFood>,
        calls: AtomicUsize,
    }

    impl MockCatalog {
        fn new(foods: Vec<CatalogFood>) -> Self {
            Self {
                foods,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl FoodCatalog for MockCatalog {
        fn search(&self, query: &str) -> Result<Vec<CatalogHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let q = query.to_lowercase();
            Ok(self
                .foods
                .iter()
                .filter(|f| f.description.to_lowercase().contains(&q))
                .map(|f| CatalogHit {
                    fdc_id: f.fdc_id,
                    description: f.description.clone(),
                    data_type: None,
                })
                .collect())
        }

        fn details(&self, fdc_id: i64) -> Result<CatalogFood> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.foods
                .iter()
                .find(|f| f.fdc_id == fdc_id)
                .cloned()
                .ok_or_else(|| Error::CatalogUnavailable(format!("HTTP 404 for {fdc_id}")))
        }
    }

    fn sample_user() -> NewUser {
        NewUser {
            firstname: "John".to_string(),
            lastname: "Doe".to_string(),
            age: 30,
            weight_kg: 70,
            height_cm: 175,
            target_weight_kg: 65,
        }
    }

    fn apple() -> CatalogFood {
        CatalogFood {
            fdc_id: 171_705,
            description: "Apples, raw, with skin".to_string(),
            nutrients: vec![Nutrient {
                nutrient_id: 1008,
                amount_per_100g: 52.0,
            }],
        }
    }

    fn add_food(tracker: &Tracker, name: &str) -> Food {
        tracker
            .db()
            .insert_food(&NewFood {
                fdc_id: None,
                name: name.to_string(),
                calories: Some(100.0),
                nutrients: Vec::new(),
                source: "manual".to_string(),
            })
            .unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_register_records_initial_measurements() {
        let tracker = Tracker::new_in_memory().unwrap();
        let (session, user) = tracker.register(&sample_user()).unwrap();
        assert_eq!(session.user_id(), user.id);

        let weights = tracker.history(&session, HistoryKind::Weight).unwrap();
        assert_eq!(weights.len(), 1);
        assert!((weights[0].value - 70.0).abs() < f64::EPSILON);

        let bmi = tracker.history(&session, HistoryKind::BodyMassIndex).unwrap();
        assert!((bmi[0].value - 22.86).abs() < f64::EPSILON);

        let fat = tracker.history(&session, HistoryKind::BodyFat).unwrap();
        assert!((fat[0].value - 14.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_login_unknown_user() {
        let tracker = Tracker::new_in_memory().unwrap();
        assert!(tracker.login(3).unwrap_err().is_not_found());
    }

    #[test]
    fn test_login_existing_user() {
        let tracker = Tracker::new_in_memory().unwrap();
        let (session, _) = tracker.register(&sample_user()).unwrap();
        assert_eq!(tracker.login(session.user_id()).unwrap(), session);
    }

    #[test]
    fn test_metrics() {
        let tracker = Tracker::new_in_memory().unwrap();
        let (session, _) = tracker.register(&sample_user()).unwrap();
        let m = tracker.metrics(&session).unwrap();
        assert!((m.bmi - 22.86).abs() < f64::EPSILON);
        assert_eq!(m.to_target_kg, -5);
    }

    #[test]
    fn test_set_weight_appends_three_rows() {
        let tracker = Tracker::new_in_memory().unwrap();
        let (session, _) = tracker.register(&sample_user()).unwrap();
        let user = tracker.set_weight(&session, 80, day(2)).unwrap();
        assert_eq!(user.weight_kg, 80);

        let weights = tracker.history(&session, HistoryKind::Weight).unwrap();
        assert_eq!(weights.len(), 2);
        assert_eq!(weights[1].date, day(2));
        assert_eq!(tracker.history(&session, HistoryKind::BodyMassIndex).unwrap().len(), 2);
        let fat = tracker.history(&session, HistoryKind::BodyFat).unwrap();
        assert!((fat[1].value - 16.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_set_height_appends_bmi_only() {
        let tracker = Tracker::new_in_memory().unwrap();
        let (session, _) = tracker.register(&sample_user()).unwrap();
        tracker.set_height(&session, 0, day(2)).unwrap();
        let bmi = tracker.history(&session, HistoryKind::BodyMassIndex).unwrap();
        assert_eq!(bmi.len(), 2);
        assert!(bmi[1].value.abs() < f64::EPSILON);
        assert_eq!(tracker.history(&session, HistoryKind::Weight).unwrap().len(), 1);
    }

    #[test]
    fn test_set_age_and_target() {
        let tracker = Tracker::new_in_memory().unwrap();
        let (session, _) = tracker.register(&sample_user()).unwrap();
        assert_eq!(tracker.set_age(&session, 31).unwrap().age, 31);
        assert_eq!(tracker.set_target_weight(&session, 60).unwrap().target_weight_kg, 60);
        assert!(tracker.set_age(&session, -1).is_err());
    }

    #[test]
    fn test_log_food_validates_quantity() {
        let tracker = Tracker::new_in_memory().unwrap();
        let (session, _) = tracker.register(&sample_user()).unwrap();
        let food = add_food(&tracker, "Oats");
        assert!(matches!(
            tracker.log_food(&session, food.id, 0.0, day(1)),
            Err(Error::Validation(_))
        ));
        let entry = tracker.log_food(&session, food.id, 40.0, day(1)).unwrap();
        assert_eq!(entry.food_id, Some(food.id));
    }

    #[test]
    fn test_log_day_preset() {
        let tracker = Tracker::new_in_memory().unwrap();
        let (session, _) = tracker.register(&sample_user()).unwrap();
        let bread = add_food(&tracker, "Bread");
        let meal = tracker.db().create_meal("Breakfast", "breakfast").unwrap();
        tracker.db().link_food_to_meal(bread.id, meal.id, 50.0).unwrap();
        let monday = tracker.create_day_preset(&session, "Monday").unwrap();
        tracker
            .db()
            .link_meal_to_day_preset(meal.id, monday.id, 2.0)
            .unwrap();

        let outcome = tracker.log_day_preset(&session, monday.id, day(3)).unwrap();
        assert!(!outcome.is_empty());
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.logged.len(), 1);
        assert!((outcome.total_quantity_g() - 100.0).abs() < 1e-9);

        let report = tracker.daily_report(&session, day(3)).unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].food_name, "Bread");
    }

    #[test]
    fn test_log_empty_meal_is_soft_failure() {
        let tracker = Tracker::new_in_memory().unwrap();
        let (session, _) = tracker.register(&sample_user()).unwrap();
        let meal = tracker.db().create_meal("Nothing", "snack").unwrap();
        assert!(tracker.log_meal(&session, meal.id, day(1)).unwrap().is_empty());
        assert!(tracker.log_meal(&session, 404, day(1)).unwrap().is_empty());
        assert!(tracker.log_day_preset(&session, 404, day(1)).unwrap().is_empty());
    }

    #[test]
    fn test_log_meal_continues_past_failures() {
        let tracker = Tracker::new_in_memory().unwrap();
        let (session, _) = tracker.register(&sample_user()).unwrap();
        let good = add_food(&tracker, "Rice");
        let meal = tracker.db().create_meal("Lunch", "lunch").unwrap();
        tracker.db().link_food_to_meal(good.id, meal.id, 150.0).unwrap();

        // A session for a user that no longer resolves makes every item fail
        let ghost = Session { user_id: 999 };
        let outcome = tracker.log_meal(&ghost, meal.id, day(1)).unwrap();
        assert!(outcome.logged.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].food_id, good.id);

        let outcome = tracker.log_meal(&session, meal.id, day(1)).unwrap();
        assert_eq!(outcome.logged.len(), 1);
    }

    #[test]
    fn test_log_day_preset_keeps_going_after_failed_item() {
        let tracker = Tracker::new_in_memory().unwrap();
        let (session, _) = tracker.register(&sample_user()).unwrap();
        let huge = add_food(&tracker, "Sugar");
        let small = add_food(&tracker, "Salt");
        let meal = tracker.db().create_meal("Odd", "snack").unwrap();
        tracker.db().link_food_to_meal(huge.id, meal.id, 1e308).unwrap();
        tracker.db().link_food_to_meal(small.id, meal.id, 10.0).unwrap();
        let preset = tracker.create_day_preset(&session, "Odd day").unwrap();
        tracker
            .db()
            .link_meal_to_day_preset(meal.id, preset.id, 10.0)
            .unwrap();

        // 1e308 x 10 overflows to infinity and is rejected; the next item still logs
        let outcome = tracker.log_day_preset(&session, preset.id, day(2)).unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].food_id, huge.id);
        assert!(outcome.failures[0].quantity_g.is_infinite());
        assert_eq!(outcome.logged.len(), 1);
        assert_eq!(outcome.logged[0].food_id, Some(small.id));
        assert!((outcome.logged[0].value - 100.0).abs() < 1e-9);

        let eaten = tracker.history(&session, HistoryKind::Food).unwrap();
        assert_eq!(eaten.len(), 1);
    }

    #[test]
    fn test_day_preset_of_other_user_is_hidden() {
        let tracker = Tracker::new_in_memory().unwrap();
        let (alice, _) = tracker.register(&sample_user()).unwrap();
        let (bob, _) = tracker.register(&sample_user()).unwrap();
        let day_preset = tracker.create_day_preset(&alice, "Rest day").unwrap();

        assert!(tracker
            .log_day_preset(&bob, day_preset.id, day(1))
            .unwrap_err()
            .is_not_found());
        assert!(tracker
            .resolve_day_preset(&bob, &day_preset.id.to_string())
            .unwrap_err()
            .is_not_found());
        assert_eq!(
            tracker.resolve_day_preset(&alice, "rest day").unwrap().id,
            day_preset.id
        );
    }

    #[test]
    fn test_delete_food_entry_checks_owner() {
        let tracker = Tracker::new_in_memory().unwrap();
        let (alice, _) = tracker.register(&sample_user()).unwrap();
        let (bob, _) = tracker.register(&sample_user()).unwrap();
        let food = add_food(&tracker, "Cake");
        let entry = tracker.log_food(&alice, food.id, 80.0, day(1)).unwrap();

        assert!(!tracker.delete_food_entry(&bob, entry.id).unwrap());
        assert_eq!(tracker.history(&alice, HistoryKind::Food).unwrap().len(), 1);

        assert!(tracker.delete_food_entry(&alice, entry.id).unwrap());
        assert!(tracker.history(&alice, HistoryKind::Food).unwrap().is_empty());
        assert!(!tracker.delete_food_entry(&alice, entry.id).unwrap());
    }

    #[test]
    fn test_resolve_food_by_id_or_name() {
        let tracker = Tracker::new_in_memory().unwrap();
        let food = add_food(&tracker, "Greek Yogurt");
        assert_eq!(tracker.resolve_food(&food.id.to_string()).unwrap().id, food.id);
        assert_eq!(tracker.resolve_food("yogurt").unwrap().id, food.id);
        assert!(tracker.resolve_food("999").unwrap_err().is_not_found());
    }

    #[test]
    fn test_import_food_caches() {
        let tracker = Tracker::new_in_memory().unwrap();
        let catalog = MockCatalog::new(vec![apple()]);

        let food = tracker.import_food(&catalog, 171_705).unwrap();
        assert_eq!(food.fdc_id, Some(171_705));
        assert_eq!(food.calories, Some(52.0));
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);

        // Second import is served locally
        let again = tracker.import_food(&catalog, 171_705).unwrap();
        assert_eq!(again.id, food.id);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_import_food_catalog_failure() {
        let tracker = Tracker::new_in_memory().unwrap();
        let catalog = MockCatalog::new(Vec::new());
        let err = tracker.import_food(&catalog, 1).unwrap_err();
        assert!(matches!(err, Error::CatalogUnavailable(_)));
        assert!(tracker.db().list_foods(None).unwrap().is_empty());
    }

    #[test]
    fn test_search_catalog() {
        let tracker = Tracker::new_in_memory().unwrap();
        let catalog = MockCatalog::new(vec![apple()]);
        assert_eq!(tracker.search_catalog(&catalog, "apple").unwrap().len(), 1);
        assert!(tracker.search_catalog(&catalog, "pear").unwrap().is_empty());
        assert!(matches!(
            tracker.search_catalog(&catalog, "  "),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_export_history() {
        let tracker = Tracker::new_in_memory().unwrap();
        let (session, _) = tracker.register(&sample_user()).unwrap();
        let mut buf = Vec::new();
        let n = tracker
            .export_history(&session, HistoryKind::BodyFat, &mut buf)
            .unwrap();
        assert_eq!(n, 1);
        assert!(String::from_utf8(buf).unwrap().contains(",14.0,"));
    }
}
