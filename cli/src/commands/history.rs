use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use plate_core::models::{HistoryEntry, HistoryKind};
use plate_core::service::{Session, Tracker};

use super::helpers::{fmt_opt, parse_date, print_json, truncate};

pub(crate) fn cmd_history(
    tracker: &Tracker,
    session: &Session,
    kind: &str,
    json: bool,
) -> Result<()> {
    let kind: HistoryKind = kind.parse()?;
    let entries = tracker.history(session, kind)?;

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        eprintln!("No {kind} history yet");
        return Ok(());
    }
    print_history_table(kind, &entries);
    Ok(())
}

fn print_history_table(kind: HistoryKind, entries: &[HistoryEntry]) {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Food ID")]
        food_id: String,
    }

    let unit = kind.unit();
    let rows: Vec<HistoryRow> = entries
        .iter()
        .map(|e| HistoryRow {
            id: e.id,
            date: e.date.format("%Y-%m-%d").to_string(),
            value: format!("{:.2}{unit}", e.value),
            food_id: e.food_id.map(|id| id.to_string()).unwrap_or_default(),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(2)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn cmd_delete_entry(
    tracker: &Tracker,
    session: &Session,
    entry_id: i64,
    json: bool,
) -> Result<()> {
    let deleted = tracker.delete_food_entry(session, entry_id)?;
    if json {
        println!("{}", serde_json::json!({ "id": entry_id, "deleted": deleted }));
    } else if deleted {
        println!("Deleted entry {entry_id}");
    } else {
        eprintln!("No food entry {entry_id}, nothing deleted");
    }
    Ok(())
}

pub(crate) fn cmd_report(
    tracker: &Tracker,
    session: &Session,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct ReportRow {
        #[tabled(rename = "Entry")]
        id: i64,
        #[tabled(rename = "Food")]
        food: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Calories")]
        calories: String,
    }

    let date = parse_date(date)?;
    let report = tracker.daily_report(session, date)?;

    if json {
        return print_json(&report);
    }

    let date_str = report.date.format("%Y-%m-%d");
    if report.entries.is_empty() {
        eprintln!("Nothing logged on {date_str}");
        return Ok(());
    }
    println!("Report for {date_str}");
    let rows: Vec<ReportRow> = report
        .entries
        .iter()
        .map(|e| ReportRow {
            id: e.id,
            food: truncate(&e.food_name, 40),
            quantity: format!("{:.0}g", e.quantity_g),
            calories: fmt_opt(e.calories, 0),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    println!(
        "Total: {:.0}g, {:.0} kcal",
        report.total_quantity_g, report.total_calories
    );
    Ok(())
}

pub(crate) fn cmd_export(
    tracker: &Tracker,
    session: &Session,
    kind: &str,
    output: Option<&Path>,
) -> Result<()> {
    let kind: HistoryKind = kind.parse()?;
    let rows = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let n = tracker.export_history(session, kind, BufWriter::new(file))?;
            eprintln!("Wrote {n} {kind} rows to {}", path.display());
            n
        }
        None => tracker.export_history(session, kind, io::stdout().lock())?,
    };
    tracing::debug!(%kind, rows, "exported history");
    Ok(())
}
