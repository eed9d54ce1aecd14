mod day;
mod food;
pub(crate) mod helpers;
mod history;
mod meal;
mod user;

use anyhow::{Result, anyhow};

use crate::fdc::{FdcClient, SearchFilters};
use crate::{Command, DayCommand, FoodCommand, MealCommand};
use plate_core::service::{CompositeOutcome, Session, Tracker};

/// Whether the prompt should keep reading lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Exit,
}

/// Dispatcher state: the tracker, the catalog client and the logged-in user.
pub(crate) struct App {
    tracker: Tracker,
    fdc: FdcClient,
    session: Option<Session>,
    json: bool,
}

impl App {
    pub(crate) fn new(tracker: Tracker, fdc: FdcClient, json: bool) -> Self {
        Self {
            tracker,
            fdc,
            session: None,
            json,
        }
    }

    pub(crate) fn login(&mut self, user_id: i64) -> Result<()> {
        self.session = Some(self.tracker.login(user_id)?);
        Ok(())
    }

    pub(crate) fn prompt(&self) -> String {
        match self.session {
            Some(s) => format!("plate[{}]> ", s.user_id()),
            None => "plate> ".to_string(),
        }
    }

    fn session(&self) -> Result<Session> {
        self.session
            .ok_or_else(|| anyhow!("Not logged in. Use 'login <id>' or 'register' first"))
    }

    /// Run one command against the current state.
    pub(crate) fn dispatch(&mut self, command: Command) -> Result<Flow> {
        self.dispatch_as(command, self.json)
    }

    /// Like `dispatch`, with JSON output chosen for this command only.
    pub(crate) fn dispatch_as(&mut self, command: Command, json: bool) -> Result<Flow> {
        let t = &self.tracker;

        match command {
            Command::Register {
                firstname,
                lastname,
                age,
                weight,
                height,
                target,
            } => {
                let session =
                    user::cmd_register(t, firstname, lastname, age, weight, height, target, json)?;
                self.session = Some(session);
            }
            Command::Login { id } => {
                self.login(id)?;
                user::cmd_whoami(&self.tracker, &self.session()?, json)?;
            }
            Command::Logout => {
                self.session = None;
                if !json {
                    println!("Logged out");
                }
            }
            Command::Whoami => user::cmd_whoami(t, &self.session()?, json)?,
            Command::Users => user::cmd_users(t, json)?,
            Command::Metrics => user::cmd_metrics(t, &self.session()?, json)?,
            Command::Bmi { weight, height } => {
                user::cmd_bmi(t, self.session.as_ref(), weight, height, json)?;
            }
            Command::Bodyfat { weight } => {
                user::cmd_bodyfat(t, self.session.as_ref(), weight, json)?;
            }
            Command::Set { command } => user::cmd_set(t, &self.session()?, command, json)?,
            Command::History { kind } => history::cmd_history(t, &self.session()?, &kind, json)?,
            Command::Search {
                query,
                data_type,
                brand,
                category,
            } => {
                let filters = SearchFilters {
                    data_type,
                    brand_owner: brand,
                    food_category: category,
                };
                food::cmd_search(t, &self.fdc, &query.join(" "), filters, json)?;
            }
            Command::Details { fdc_id, quantity } => {
                food::cmd_details(&self.fdc, fdc_id, quantity.as_deref(), json)?;
            }
            Command::Food { command } => match command {
                FoodCommand::Add { name, calories } => food::cmd_food_add(t, &name, calories, json)?,
                FoodCommand::List { search } => food::cmd_food_list(t, search.as_deref(), json)?,
                FoodCommand::Import { fdc_id } => food::cmd_food_import(t, &self.fdc, fdc_id, json)?,
            },
            Command::Meal { command } => match command {
                MealCommand::Create { name, meal_type } => {
                    meal::cmd_meal_create(t, &name, &meal_type, json)?;
                }
                MealCommand::List => meal::cmd_meal_list(t, json)?,
                MealCommand::Show { meal } => meal::cmd_meal_show(t, &meal, json)?,
                MealCommand::AddFood {
                    meal,
                    food,
                    quantity,
                } => meal::cmd_meal_add_food(t, &meal, &food, &quantity, json)?,
                MealCommand::Log { meal, date } => {
                    meal::cmd_meal_log(t, &self.session()?, &meal, date, json)?;
                }
            },
            Command::Day { command } => {
                let session = self.session()?;
                match command {
                    DayCommand::Create { name } => day::cmd_day_create(t, &session, &name, json)?,
                    DayCommand::List => day::cmd_day_list(t, &session, json)?,
                    DayCommand::Show { day } => day::cmd_day_show(t, &session, &day, json)?,
                    DayCommand::AddMeal {
                        day,
                        meal,
                        multiplier,
                    } => day::cmd_day_add_meal(t, &session, &day, &meal, multiplier, json)?,
                    DayCommand::Log { day, date } => {
                        day::cmd_day_log(t, &session, &day, date, json)?;
                    }
                }
            }
            Command::Eat {
                food,
                quantity,
                date,
            } => food::cmd_eat(t, &self.session()?, &food, &quantity, date, json)?,
            Command::DeleteEntry { id } => {
                history::cmd_delete_entry(t, &self.session()?, id, json)?;
            }
            Command::Report { date } => history::cmd_report(t, &self.session()?, date, json)?,
            Command::Export { kind, output } => {
                history::cmd_export(t, &self.session()?, &kind, output.as_deref())?;
            }
            Command::Exit => return Ok(Flow::Exit),
        }

        Ok(Flow::Continue)
    }
}

/// Process exit status for a failed one-shot command: 2 when something was
/// not found, 1 otherwise.
pub(crate) fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<plate_core::Error>() {
        Some(e) if e.is_not_found() => 2,
        _ => 1,
    }
}

/// Print the result of logging a meal or day preset.
pub(super) fn print_composite(what: &str, outcome: &CompositeOutcome, json: bool) -> Result<()> {
    if json {
        return helpers::print_json(outcome);
    }
    if outcome.is_empty() {
        eprintln!("No food IDs found for {what}");
        return Ok(());
    }
    let total = outcome.logged.len() + outcome.failures.len();
    println!(
        "Logged {} of {total} foods from {what} ({:.0}g)",
        outcome.logged.len(),
        outcome.total_quantity_g()
    );
    for f in &outcome.failures {
        eprintln!("  food {} ({:.0}g): {}", f.food_id, f.quantity_g, f.reason);
    }
    Ok(())
}
