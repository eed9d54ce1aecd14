use anyhow::Result;
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use plate_core::models::{FoodLink, Meal};
use plate_core::service::{Session, Tracker};

use super::helpers::{parse_date, parse_quantity, print_json, truncate};
use super::print_composite;

pub(crate) fn cmd_meal_create(
    tracker: &Tracker,
    name: &str,
    meal_type: &str,
    json: bool,
) -> Result<()> {
    let meal = tracker.db().create_meal(name, meal_type)?;
    if json {
        print_json(&meal)?;
    } else {
        println!("Created meal: {} [{}] (id: {})", meal.name, meal.meal_type, meal.id);
    }
    Ok(())
}

pub(crate) fn cmd_meal_list(tracker: &Tracker, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Type")]
        meal_type: String,
    }

    let meals = tracker.db().list_meals()?;
    if json {
        return print_json(&meals);
    }
    if meals.is_empty() {
        eprintln!("No meals yet. Create one with 'meal create <name>'");
        return Ok(());
    }
    let rows: Vec<MealRow> = meals
        .iter()
        .map(|m| MealRow {
            id: m.id,
            name: truncate(&m.name, 40),
            meal_type: m.meal_type.clone(),
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}

pub(crate) fn cmd_meal_show(tracker: &Tracker, meal_ref: &str, json: bool) -> Result<()> {
    #[derive(Serialize)]
    struct MealDetail<'a> {
        #[serde(flatten)]
        meal: &'a Meal,
        foods: &'a [FoodLink],
    }

    let meal = tracker.resolve_meal(meal_ref)?;
    let foods = tracker.db().meal_foods(meal.id)?;

    if json {
        return print_json(&MealDetail {
            meal: &meal,
            foods: &foods,
        });
    }

    println!("{} [{}] (id: {})", meal.name, meal.meal_type, meal.id);
    if foods.is_empty() {
        eprintln!("No foods in this meal yet");
        return Ok(());
    }
    print_link_table(&foods);
    Ok(())
}

fn print_link_table(links: &[FoodLink]) {
    #[derive(Tabled)]
    struct LinkRow {
        #[tabled(rename = "Food ID")]
        food_id: i64,
        #[tabled(rename = "Food")]
        name: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
    }

    let rows: Vec<LinkRow> = links
        .iter()
        .map(|l| LinkRow {
            food_id: l.food_id,
            name: truncate(l.food_name.as_deref().unwrap_or("?"), 40),
            quantity: format!("{:.0}g", l.quantity_g),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(2)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn cmd_meal_add_food(
    tracker: &Tracker,
    meal_ref: &str,
    food_ref: &str,
    quantity: &str,
    json: bool,
) -> Result<()> {
    let grams = parse_quantity(quantity)?;
    let meal = tracker.resolve_meal(meal_ref)?;
    let food = tracker.resolve_food(food_ref)?;
    let link = tracker.db().link_food_to_meal(food.id, meal.id, grams)?;

    if json {
        print_json(&link)?;
    } else {
        println!("Added {grams:.0}g of {} to {}", food.name, meal.name);
    }
    Ok(())
}

pub(crate) fn cmd_meal_log(
    tracker: &Tracker,
    session: &Session,
    meal_ref: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let meal = tracker.resolve_meal(meal_ref)?;
    let outcome = tracker.log_meal(session, meal.id, date)?;
    print_composite(&format!("meal '{}'", meal.name), &outcome, json)
}
