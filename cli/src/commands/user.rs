use anyhow::{Context, Result, bail};
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use plate_core::metrics::{body_fat_estimate, body_mass_index, round2};
use plate_core::models::{NewUser, User};
use plate_core::service::{Session, Tracker};

use super::helpers::{parse_date, print_json};
use crate::SetCommand;

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_register(
    tracker: &Tracker,
    firstname: String,
    lastname: String,
    age: i64,
    weight: i64,
    height: i64,
    target: Option<i64>,
    json: bool,
) -> Result<Session> {
    let (session, user) = tracker
        .register(&NewUser {
            firstname,
            lastname,
            age,
            weight_kg: weight,
            height_cm: height,
            target_weight_kg: target.unwrap_or(weight),
        })
        .context("Failed to register user")?;

    if json {
        print_json(&user)?;
    } else {
        println!("Registered {} (id: {})", user.full_name(), user.id);
    }
    Ok(session)
}

pub(crate) fn cmd_whoami(tracker: &Tracker, session: &Session, json: bool) -> Result<()> {
    let user = tracker.current_user(session)?;
    if json {
        print_json(&user)?;
    } else {
        println!(
            "{} (id: {}), {} years, {} kg, {} cm, target {} kg",
            user.full_name(),
            user.id,
            user.age,
            user.weight_kg,
            user.height_cm,
            user.target_weight_kg
        );
    }
    Ok(())
}

pub(crate) fn cmd_users(tracker: &Tracker, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct UserRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Age")]
        age: i64,
        #[tabled(rename = "Weight")]
        weight: String,
        #[tabled(rename = "Height")]
        height: String,
    }

    let users = tracker.db().list_users()?;
    if json {
        return print_json(&users);
    }
    if users.is_empty() {
        eprintln!("No users yet. Create one with 'register'");
        return Ok(());
    }

    let rows: Vec<UserRow> = users
        .iter()
        .map(|u: &User| UserRow {
            id: u.id,
            name: u.full_name(),
            age: u.age,
            weight: format!("{} kg", u.weight_kg),
            height: format!("{} cm", u.height_cm),
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}

pub(crate) fn cmd_metrics(tracker: &Tracker, session: &Session, json: bool) -> Result<()> {
    let m = tracker.metrics(session)?;
    if json {
        return print_json(&m);
    }
    println!("Weight:     {} kg", m.weight_kg);
    println!("Height:     {} cm", m.height_cm);
    println!("BMI:        {:.2}", m.bmi);
    println!("Body fat:   {:.2} kg (estimate)", m.body_fat);
    let sign = if m.to_target_kg > 0 { "+" } else { "" };
    println!(
        "Target:     {} kg ({sign}{} kg to go)",
        m.target_weight_kg, m.to_target_kg
    );
    Ok(())
}

#[derive(Serialize)]
struct Figure {
    weight_kg: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    height_cm: Option<i64>,
    value: f64,
}

pub(crate) fn cmd_bmi(
    tracker: &Tracker,
    session: Option<&Session>,
    weight: Option<i64>,
    height: Option<i64>,
    json: bool,
) -> Result<()> {
    let (weight_kg, height_cm) = match (weight, height) {
        (Some(w), Some(h)) => (w, h),
        (None, None) => {
            let Some(session) = session else {
                bail!("Give a weight and a height, or log in first");
            };
            let user = tracker.current_user(session)?;
            (user.weight_kg, user.height_cm)
        }
        _ => bail!("Give both a weight (kg) and a height (cm)"),
    };

    let value = round2(body_mass_index(weight_kg, height_cm));
    if json {
        return print_json(&Figure {
            weight_kg,
            height_cm: Some(height_cm),
            value,
        });
    }
    if height_cm == 0 {
        eprintln!("Height is 0, BMI is undefined");
    }
    println!("BMI: {value:.2}");
    Ok(())
}

pub(crate) fn cmd_bodyfat(
    tracker: &Tracker,
    session: Option<&Session>,
    weight: Option<i64>,
    json: bool,
) -> Result<()> {
    let weight_kg = match (weight, session) {
        (Some(w), _) => w,
        (None, Some(session)) => tracker.current_user(session)?.weight_kg,
        (None, None) => bail!("Give a weight, or log in first"),
    };

    let value = round2(body_fat_estimate(weight_kg));
    if json {
        return print_json(&Figure {
            weight_kg,
            height_cm: None,
            value,
        });
    }
    println!("Body fat: {value:.2} kg (rough estimate, 20% of body weight)");
    Ok(())
}

pub(crate) fn cmd_set(
    tracker: &Tracker,
    session: &Session,
    command: SetCommand,
    json: bool,
) -> Result<()> {
    let (user, what) = match command {
        SetCommand::Weight { kg, date } => (
            tracker.set_weight(session, kg, parse_date(date)?)?,
            format!("weight to {kg} kg"),
        ),
        SetCommand::Height { cm, date } => (
            tracker.set_height(session, cm, parse_date(date)?)?,
            format!("height to {cm} cm"),
        ),
        SetCommand::Age { years } => (
            tracker.set_age(session, years)?,
            format!("age to {years}"),
        ),
        SetCommand::Target { kg } => (
            tracker.set_target_weight(session, kg)?,
            format!("target weight to {kg} kg"),
        ),
    };

    if json {
        print_json(&user)?;
    } else {
        println!("Set {what}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plate_core::models::HistoryKind;

    fn register(tracker: &Tracker) -> Session {
        cmd_register(
            tracker,
            "John".to_string(),
            "Doe".to_string(),
            30,
            70,
            175,
            None,
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_register_defaults_target_to_weight() {
        let tracker = Tracker::new_in_memory().unwrap();
        let session = register(&tracker);
        let user = tracker.current_user(&session).unwrap();
        assert_eq!(user.target_weight_kg, 70);
    }

    #[test]
    fn test_bmi_needs_both_values() {
        let tracker = Tracker::new_in_memory().unwrap();
        assert!(cmd_bmi(&tracker, None, Some(70), None, true).is_err());
        assert!(cmd_bmi(&tracker, None, None, None, true).is_err());
        assert!(cmd_bmi(&tracker, None, Some(70), Some(175), true).is_ok());
    }

    #[test]
    fn test_bodyfat_from_session() {
        let tracker = Tracker::new_in_memory().unwrap();
        let session = register(&tracker);
        assert!(cmd_bodyfat(&tracker, Some(&session), None, true).is_ok());
        assert!(cmd_bodyfat(&tracker, None, None, true).is_err());
    }

    #[test]
    fn test_set_weight_records_history() {
        let tracker = Tracker::new_in_memory().unwrap();
        let session = register(&tracker);
        cmd_set(
            &tracker,
            &session,
            SetCommand::Weight {
                kg: 72,
                date: Some("2024-06-01".to_string()),
            },
            true,
        )
        .unwrap();
        let weights = tracker.history(&session, HistoryKind::Weight).unwrap();
        assert_eq!(weights.len(), 2);
        assert!((weights[1].value - 72.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_set_rejects_negative() {
        let tracker = Tracker::new_in_memory().unwrap();
        let session = register(&tracker);
        assert!(cmd_set(&tracker, &session, SetCommand::Age { years: -2 }, true).is_err());
    }
}
