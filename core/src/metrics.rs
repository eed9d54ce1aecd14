use serde::Serialize;

use crate::models::User;

/// Share of body weight reported by [`body_fat_estimate`].
pub const BODY_FAT_RATIO: f64 = 0.2;

/// Body-mass-index: `weight_kg / (height_cm / 100)^2`.
///
/// A height of zero yields `0.0` instead of infinity or NaN.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn body_mass_index(weight_kg: i64, height_cm: i64) -> f64 {
    if height_cm == 0 {
        return 0.0;
    }
    let height_m = height_cm as f64 / 100.0;
    weight_kg as f64 / (height_m * height_m)
}

/// Placeholder body-fat figure, a flat share of body weight.
///
/// This is a stand-in, not a validated medical formula. Do not present it as
/// an authoritative measurement.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn body_fat_estimate(weight_kg: i64) -> f64 {
    weight_kg as f64 * BODY_FAT_RATIO
}

/// Round to two decimals for display.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Derived figures for one user, as shown by the `metrics` command.
#[derive(Debug, Clone, Serialize)]
pub struct BodyMetrics {
    pub user_id: i64,
    pub weight_kg: i64,
    pub height_cm: i64,
    pub target_weight_kg: i64,
    pub to_target_kg: i64,
    pub bmi: f64,
    pub body_fat: f64,
}

impl BodyMetrics {
    #[must_use]
    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            weight_kg: user.weight_kg,
            height_cm: user.height_cm,
            target_weight_kg: user.target_weight_kg,
            to_target_kg: user.target_weight_kg - user.weight_kg,
            bmi: round2(body_mass_index(user.weight_kg, user.height_cm)),
            body_fat: round2(body_fat_estimate(user.weight_kg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_bmi_matches_formula() {
        for (w, h) in [(70, 175), (50, 160), (120, 190), (1, 1)] {
            let expected = w as f64 / ((h as f64 / 100.0) * (h as f64 / 100.0));
            assert!((body_mass_index(w, h) - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_bmi_zero_height_is_zero() {
        assert_eq!(body_mass_index(70, 0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(body_mass_index(0, 0).to_bits(), 0.0_f64.to_bits());
    }

    #[test]
    fn test_bmi_rounded_scenario() {
        // 70 / 1.75^2 = 22.857...
        assert!((round2(body_mass_index(70, 175)) - 22.86).abs() < f64::EPSILON);
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_body_fat_is_fifth_of_weight() {
        for w in [0, 1, 65, 70, 200] {
            assert!((body_fat_estimate(w) - 0.2 * w as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn test_round2() {
        assert!((round2(1.005_1) - 1.01).abs() < f64::EPSILON);
        assert!((round2(3.0) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_body_metrics_for_user() {
        let user = User {
            id: 1,
            firstname: "John".to_string(),
            lastname: "Doe".to_string(),
            age: 30,
            weight_kg: 70,
            height_cm: 175,
            target_weight_kg: 65,
            created_at: String::new(),
        };
        let m = BodyMetrics::for_user(&user);
        assert!((m.bmi - 22.86).abs() < f64::EPSILON);
        assert!((m.body_fat - 14.0).abs() < f64::EPSILON);
        assert_eq!(m.to_target_kg, -5);
    }
}
