use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// FoodData Central nutrient id for energy in kcal.
pub const ENERGY_KCAL_NUTRIENT_ID: i64 = 1008;

/// Energy ids tried in order. Foundation foods often report only the
/// Atwater general (2047) or specific (2048) factors.
pub const ENERGY_NUTRIENT_IDS: [i64; 3] = [ENERGY_KCAL_NUTRIENT_ID, 2047, 2048];

pub const DATE_FORMAT: &str = "%Y-%m-%d";

// --- Users ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub firstname: String,
    pub lastname: String,
    pub age: i64,
    pub weight_kg: i64,
    pub height_cm: i64,
    pub target_weight_kg: i64,
    #[serde(default)]
    pub created_at: String,
}

impl User {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub firstname: String,
    pub lastname: String,
    pub age: i64,
    pub weight_kg: i64,
    pub height_cm: i64,
    pub target_weight_kg: i64,
}

/// Field-level changes to a user. `None` leaves the stored value as is.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub weight_kg: Option<i64>,
    pub height_cm: Option<i64>,
    pub age: Option<i64>,
    pub target_weight_kg: Option<i64>,
}

impl UserUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weight_kg.is_none()
            && self.height_cm.is_none()
            && self.age.is_none()
            && self.target_weight_kg.is_none()
    }
}

pub fn validate_new_user(user: &NewUser) -> Result<()> {
    if user.firstname.trim().is_empty() || user.lastname.trim().is_empty() {
        return Err(Error::validation("First and last name must not be empty"));
    }
    validate_body_field("age", user.age)?;
    validate_body_field("weight", user.weight_kg)?;
    validate_body_field("height", user.height_cm)?;
    validate_body_field("target weight", user.target_weight_kg)?;
    Ok(())
}

pub fn validate_user_update(update: &UserUpdate) -> Result<()> {
    if update.is_empty() {
        return Err(Error::validation("Nothing to update"));
    }
    let fields = [
        ("weight", update.weight_kg),
        ("height", update.height_cm),
        ("age", update.age),
        ("target weight", update.target_weight_kg),
    ];
    for (name, value) in fields {
        if let Some(v) = value {
            validate_body_field(name, v)?;
        }
    }
    Ok(())
}

fn validate_body_field(name: &str, value: i64) -> Result<()> {
    if value < 0 {
        return Err(Error::validation(format!("{name} must not be negative")));
    }
    Ok(())
}

// --- Foods ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Nutrient {
    pub nutrient_id: i64,
    pub amount_per_100g: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Food {
    pub id: i64,
    pub fdc_id: Option<i64>,
    pub name: String,
    pub calories: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nutrients: Vec<Nutrient>,
    pub source: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewFood {
    pub fdc_id: Option<i64>,
    pub name: String,
    pub calories: Option<f64>,
    pub nutrients: Vec<Nutrient>,
    pub source: String,
}

pub fn validate_new_food(food: &NewFood) -> Result<()> {
    if food.name.trim().is_empty() {
        return Err(Error::validation("Food name must not be empty"));
    }
    if food.calories.is_some_and(|c| !c.is_finite() || c < 0.0) {
        return Err(Error::validation("Calories must not be negative"));
    }
    Ok(())
}

/// Calories for `quantity_g` grams of a food whose calories are per 100 g.
#[must_use]
pub fn scale_per_100g(per_100g: f64, quantity_g: f64) -> f64 {
    per_100g * quantity_g / 100.0
}

// --- Meals and day presets ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meal {
    pub id: i64,
    pub name: String,
    pub meal_type: String,
}

/// One food inside a meal. Linking the same food twice yields two links.
#[derive(Debug, Clone, Serialize)]
pub struct FoodLink {
    pub id: i64,
    pub meal_id: i64,
    pub food_id: i64,
    pub quantity_g: f64,
    // Joined for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayPreset {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
}

/// One meal inside a day preset, repeated `multiplier` times.
#[derive(Debug, Clone, Serialize)]
pub struct MealLink {
    pub id: i64,
    pub day_preset_id: i64,
    pub meal_id: i64,
    pub multiplier: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_name: Option<String>,
}

/// A food with its final quantity after scaling through meals and days.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExpandedFood {
    pub food_id: i64,
    pub quantity_g: f64,
}

/// Meal types are free-form tags; they are only trimmed and lower-cased.
pub fn normalize_meal_type(meal_type: &str) -> Result<String> {
    let trimmed = meal_type.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("Meal type must not be empty"));
    }
    Ok(trimmed.to_lowercase())
}

pub fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation(format!("{what} name must not be empty")));
    }
    Ok(())
}

/// Link quantities and multipliers must be finite and strictly positive.
pub fn validate_quantity(what: &str, value: f64) -> Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::validation(format!(
            "{what} must be greater than 0 (got {value})"
        )));
    }
    Ok(value)
}

// --- History ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Weight,
    BodyMassIndex,
    BodyFat,
    Food,
}

impl HistoryKind {
    pub const ALL: [HistoryKind; 4] = [
        HistoryKind::Weight,
        HistoryKind::BodyMassIndex,
        HistoryKind::BodyFat,
        HistoryKind::Food,
    ];

    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            Self::Weight => "weight_history",
            Self::BodyMassIndex => "imc_history",
            Self::BodyFat => "body_fat_history",
            Self::Food => "food_history",
        }
    }

    #[must_use]
    pub fn value_column(self) -> &'static str {
        match self {
            Self::Weight => "weight",
            Self::BodyMassIndex => "imc",
            Self::BodyFat => "body_fat",
            Self::Food => "quantity",
        }
    }

    #[must_use]
    pub fn unit(self) -> &'static str {
        match self {
            Self::Weight => "kg",
            Self::BodyMassIndex => "",
            Self::BodyFat => "kg",
            Self::Food => "g",
        }
    }
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weight => write!(f, "weight"),
            Self::BodyMassIndex => write!(f, "bmi"),
            Self::BodyFat => write!(f, "bodyfat"),
            Self::Food => write!(f, "food"),
        }
    }
}

impl FromStr for HistoryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "weight" => Ok(Self::Weight),
            "bmi" | "imc" => Ok(Self::BodyMassIndex),
            "bodyfat" | "body-fat" | "body_fat" => Ok(Self::BodyFat),
            "food" => Ok(Self::Food),
            _ => Err(Error::validation(format!(
                "Unknown history kind '{s}'. Use weight, bmi, bodyfat or food"
            ))),
        }
    }
}

/// A dated measurement or consumption. Only food entries can be deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub kind: HistoryKind,
    pub user_id: i64,
    pub date: NaiveDate,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FoodHistoryRow {
    pub id: i64,
    pub date: NaiveDate,
    pub food_id: i64,
    pub food_name: String,
    pub quantity_g: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyReport {
    pub user_id: i64,
    pub date: NaiveDate,
    pub entries: Vec<FoodHistoryRow>,
    pub total_calories: f64,
    pub total_quantity_g: f64,
}

/// Convert a quantity with a unit to grams.
/// Volume-based conversions assume water density (1 ml = 1 g).
/// Returns `(grams, is_approximate)` where `is_approximate` is true for volume conversions.
#[must_use]
pub fn convert_to_grams(quantity: f64, unit: &str) -> Option<(f64, bool)> {
    let lower = unit.to_lowercase();
    match lower.as_str() {
        "g" | "gram" | "grams" => Some((quantity, false)),
        "kg" | "kilogram" | "kilograms" => Some((quantity * 1000.0, false)),
        "lb" | "lbs" | "pound" | "pounds" => Some((quantity * 454.0, false)),
        "oz" | "ounce" | "ounces" => Some((quantity * 28.35, false)),
        "tbsp" | "tablespoon" | "tablespoons" => Some((quantity * 15.0, true)),
        "tsp" | "teaspoon" | "teaspoons" => Some((quantity * 5.0, true)),
        "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => {
            Some((quantity, true))
        }
        "l" | "liter" | "liters" | "litre" | "litres" => Some((quantity * 1000.0, true)),
        _ => None,
    }
}
