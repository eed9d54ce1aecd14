use anyhow::{Context, Result};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use crate::fdc::{FdcClient, SearchFilters};
use plate_core::catalog::{CatalogHit, FoodCatalog};
use plate_core::models::{ENERGY_NUTRIENT_IDS, NewFood, Nutrient};
use plate_core::service::{Session, Tracker};

use super::helpers::{parse_date, parse_quantity, print_food_table, print_json, truncate};

pub(crate) fn cmd_search(
    tracker: &Tracker,
    fdc: &FdcClient,
    query: &str,
    filters: SearchFilters,
    json: bool,
) -> Result<()> {
    let catalog = fdc.with_filters(filters);
    let hits = tracker
        .search_catalog(&catalog, query)
        .with_context(|| format!("Search for '{query}' failed"))?;

    if json {
        return print_json(&hits);
    }
    if hits.is_empty() {
        eprintln!("No results found for '{query}'");
        return Ok(());
    }
    print_hit_table(&hits);
    eprintln!("Use 'details <fdc id>' to see nutrients or 'food import <fdc id>' to keep one");
    Ok(())
}

fn print_hit_table(hits: &[CatalogHit]) {
    #[derive(Tabled)]
    struct HitRow {
        #[tabled(rename = "FDC ID")]
        fdc_id: i64,
        #[tabled(rename = "Description")]
        description: String,
        #[tabled(rename = "Data type")]
        data_type: String,
    }

    let rows: Vec<HitRow> = hits
        .iter()
        .map(|h| HitRow {
            fdc_id: h.fdc_id,
            description: truncate(&h.description, 50),
            data_type: h.data_type.clone().unwrap_or_default(),
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));
}

pub(crate) fn cmd_details(
    fdc: &FdcClient,
    fdc_id: i64,
    quantity: Option<&str>,
    json: bool,
) -> Result<()> {
    #[derive(Serialize)]
    struct Details<'a> {
        fdc_id: i64,
        description: &'a str,
        quantity_g: f64,
        nutrients: &'a [Nutrient],
    }

    #[derive(Tabled)]
    struct NutrientRow {
        #[tabled(rename = "Nutrient ID")]
        id: i64,
        #[tabled(rename = "Amount")]
        amount: String,
    }

    let food = fdc
        .details(fdc_id)
        .with_context(|| format!("Failed to fetch FDC food {fdc_id}"))?;
    let grams = quantity.map(parse_quantity).transpose()?.unwrap_or(100.0);
    let nutrients = food.scaled(grams);

    if json {
        return print_json(&Details {
            fdc_id: food.fdc_id,
            description: &food.description,
            quantity_g: grams,
            nutrients: &nutrients,
        });
    }

    println!("{} (FDC {}), per {grams:.0}g", food.description, food.fdc_id);
    if nutrients.is_empty() {
        eprintln!("No nutrient data");
        return Ok(());
    }
    let rows: Vec<NutrientRow> = nutrients
        .iter()
        .map(|n| NutrientRow {
            id: n.nutrient_id,
            amount: if ENERGY_NUTRIENT_IDS.contains(&n.nutrient_id) {
                format!("{:.0} kcal", n.amount_per_100g)
            } else {
                format!("{:.2}", n.amount_per_100g)
            },
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(1)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_food_add(
    tracker: &Tracker,
    name: &str,
    calories: Option<f64>,
    json: bool,
) -> Result<()> {
    let food = tracker.db().insert_food(&NewFood {
        fdc_id: None,
        name: name.to_string(),
        calories,
        nutrients: Vec::new(),
        source: "manual".to_string(),
    })?;

    if json {
        print_json(&food)?;
    } else {
        println!("Added food: {} (id: {})", food.name, food.id);
    }
    Ok(())
}

pub(crate) fn cmd_food_list(tracker: &Tracker, search: Option<&str>, json: bool) -> Result<()> {
    let foods = tracker.db().list_foods(search)?;

    if json {
        return print_json(&foods);
    }
    if foods.is_empty() {
        eprintln!("No foods found");
        return Ok(());
    }
    print_food_table(&foods);
    Ok(())
}

pub(crate) fn cmd_food_import(
    tracker: &Tracker,
    catalog: &dyn FoodCatalog,
    fdc_id: i64,
    json: bool,
) -> Result<()> {
    let food = tracker
        .import_food(catalog, fdc_id)
        .with_context(|| format!("Failed to import FDC food {fdc_id}"))?;

    if json {
        print_json(&food)?;
    } else {
        let cal = food
            .calories
            .map(|c| format!(", {c:.0} kcal/100g"))
            .unwrap_or_default();
        println!("Imported {} (id: {}{cal})", food.name, food.id);
    }
    Ok(())
}

pub(crate) fn cmd_eat(
    tracker: &Tracker,
    session: &Session,
    food_ref: &str,
    quantity: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let grams = parse_quantity(quantity)?;
    let date = parse_date(date)?;
    let food = tracker.resolve_food(food_ref)?;
    let entry = tracker.log_food(session, food.id, grams, date)?;

    if json {
        print_json(&entry)?;
    } else {
        let cal = food
            .calories
            .map(|c| format!(", {:.0} kcal", c * grams / 100.0))
            .unwrap_or_default();
        println!(
            "Logged {grams:.0}g of {} for {} (entry {}{cal})",
            food.name,
            entry.date.format("%Y-%m-%d"),
            entry.id
        );
    }
    Ok(())
}
