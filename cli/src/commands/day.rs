use anyhow::Result;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use plate_core::models::{DayPreset, MealLink};
use plate_core::service::{Session, Tracker};

use super::helpers::{parse_date, print_json, truncate};
use super::print_composite;

pub(crate) fn cmd_day_create(
    tracker: &Tracker,
    session: &Session,
    name: &str,
    json: bool,
) -> Result<()> {
    let day = tracker.create_day_preset(session, name)?;
    if json {
        print_json(&day)?;
    } else {
        println!("Created day preset: {} (id: {})", day.name, day.id);
    }
    Ok(())
}

pub(crate) fn cmd_day_list(tracker: &Tracker, session: &Session, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct DayRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Meals")]
        meals: usize,
    }

    let days = tracker.list_day_presets(session)?;
    if json {
        return print_json(&days);
    }
    if days.is_empty() {
        eprintln!("No day presets yet. Create one with 'day create <name>'");
        return Ok(());
    }
    let rows = days
        .iter()
        .map(|d| -> Result<DayRow> {
            Ok(DayRow {
                id: d.id,
                name: truncate(&d.name, 40),
                meals: tracker.db().day_preset_meals(d.id)?.len(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}

pub(crate) fn cmd_day_show(
    tracker: &Tracker,
    session: &Session,
    day_ref: &str,
    json: bool,
) -> Result<()> {
    #[derive(Serialize)]
    struct DayDetail<'a> {
        #[serde(flatten)]
        day: &'a DayPreset,
        meals: &'a [MealLink],
    }

    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "Meal ID")]
        meal_id: i64,
        #[tabled(rename = "Meal")]
        name: String,
        #[tabled(rename = "Times")]
        multiplier: String,
    }

    let day = tracker.resolve_day_preset(session, day_ref)?;
    let meals = tracker.db().day_preset_meals(day.id)?;

    if json {
        return print_json(&DayDetail {
            day: &day,
            meals: &meals,
        });
    }

    println!("{} (id: {})", day.name, day.id);
    if meals.is_empty() {
        eprintln!("No meals in this day preset yet");
        return Ok(());
    }
    let rows: Vec<MealRow> = meals
        .iter()
        .map(|m| MealRow {
            meal_id: m.meal_id,
            name: truncate(m.meal_name.as_deref().unwrap_or("?"), 40),
            multiplier: format!("x{}", m.multiplier),
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}

pub(crate) fn cmd_day_add_meal(
    tracker: &Tracker,
    session: &Session,
    day_ref: &str,
    meal_ref: &str,
    multiplier: f64,
    json: bool,
) -> Result<()> {
    let day = tracker.resolve_day_preset(session, day_ref)?;
    let meal = tracker.resolve_meal(meal_ref)?;
    let link = tracker
        .db()
        .link_meal_to_day_preset(meal.id, day.id, multiplier)?;

    if json {
        print_json(&link)?;
    } else {
        println!("Added {} x{multiplier} to {}", meal.name, day.name);
    }
    Ok(())
}

pub(crate) fn cmd_day_log(
    tracker: &Tracker,
    session: &Session,
    day_ref: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let day = tracker.resolve_day_preset(session, day_ref)?;
    let outcome = tracker.log_day_preset(session, day.id, date)?;
    print_composite(&format!("day '{}'", day.name), &outcome, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plate_core::models::{HistoryKind, NewFood, NewUser};

    fn setup() -> (Tracker, Session) {
        let tracker = Tracker::new_in_memory().unwrap();
        let (session, _) = tracker
            .register(&NewUser {
                firstname: "John".to_string(),
                lastname: "Doe".to_string(),
                age: 30,
                weight_kg: 70,
                height_cm: 175,
                target_weight_kg: 65,
            })
            .unwrap();
        let bread = tracker
            .db()
            .insert_food(&NewFood {
                fdc_id: None,
                name: "Bread".to_string(),
                calories: Some(265.0),
                nutrients: Vec::new(),
                source: "manual".to_string(),
            })
            .unwrap();
        let meal = tracker.db().create_meal("Breakfast", "breakfast").unwrap();
        tracker.db().link_food_to_meal(bread.id, meal.id, 50.0).unwrap();
        (tracker, session)
    }

    #[test]
    fn test_day_preset_flow() {
        let (tracker, session) = setup();
        cmd_day_create(&tracker, &session, "Monday", true).unwrap();
        cmd_day_add_meal(&tracker, &session, "monday", "breakfast", 2.0, true).unwrap();
        cmd_day_log(&tracker, &session, "Monday", Some("2024-06-03".to_string()), true).unwrap();

        let eaten = tracker.history(&session, HistoryKind::Food).unwrap();
        assert_eq!(eaten.len(), 1);
        assert!((eaten[0].value - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_add_meal_rejects_zero_multiplier() {
        let (tracker, session) = setup();
        cmd_day_create(&tracker, &session, "Monday", true).unwrap();
        assert!(cmd_day_add_meal(&tracker, &session, "Monday", "Breakfast", 0.0, true).is_err());
    }

    #[test]
    fn test_unknown_day_is_not_found() {
        let (tracker, session) = setup();
        let err = cmd_day_log(&tracker, &session, "Sunday", None, true).unwrap_err();
        assert_eq!(crate::commands::exit_code(&err), 2);
    }
}
