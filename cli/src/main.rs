mod commands;
mod config;
mod fdc;
mod repl;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::debug;

use crate::commands::{App, helpers::json_error};
use crate::config::Config;
use crate::fdc::FdcClient;
use plate_core::service::Tracker;

#[derive(Parser)]
#[command(
    name = "plate",
    version,
    about = "Track body metrics, meals and what you eat",
    long_about = "Track body metrics, meals and what you eat.\n\n\
                  Run without a command to start the interactive prompt."
)]
struct Cli {
    /// Database file (overrides PLATE_DB and config.json)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Act as this user id
    #[arg(long, global = true, env = "PLATE_USER")]
    user: Option<i64>,
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create a user and log in as them
    Register {
        firstname: String,
        lastname: String,
        /// Age in years
        age: i64,
        /// Weight in kg
        weight: i64,
        /// Height in cm
        height: i64,
        /// Target weight in kg (default: current weight)
        #[arg(long)]
        target: Option<i64>,
    },
    /// Log in as an existing user
    Login { id: i64 },
    /// Forget the current user
    Logout,
    /// Show the current user
    Whoami,
    /// List users
    Users,
    /// Show weight, BMI, body fat and distance to target
    Metrics,
    /// Body-mass index of the current user, or of the given values
    Bmi {
        /// Weight in kg
        weight: Option<i64>,
        /// Height in cm
        height: Option<i64>,
    },
    /// Body-fat estimate of the current user, or of the given weight
    Bodyfat {
        /// Weight in kg
        weight: Option<i64>,
    },
    /// Change a body value of the current user
    Set {
        #[command(subcommand)]
        command: SetCommand,
    },
    /// Show one history: weight, bmi, bodyfat or food
    History { kind: String },
    /// Search FoodData Central
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        /// Restrict to one data type (Foundation, "SR Legacy", Branded, ...)
        #[arg(long)]
        data_type: Option<String>,
        /// Restrict to one brand owner
        #[arg(long)]
        brand: Option<String>,
        /// Restrict to one food category
        #[arg(long)]
        category: Option<String>,
    },
    /// Show the nutrients of a FoodData Central food
    Details {
        fdc_id: i64,
        /// Scale nutrients to this quantity (e.g. "150g", "2 oz")
        #[arg(long)]
        quantity: Option<String>,
    },
    /// Manage local foods
    Food {
        #[command(subcommand)]
        command: FoodCommand,
    },
    /// Manage meals
    Meal {
        #[command(subcommand)]
        command: MealCommand,
    },
    /// Manage day presets
    Day {
        #[command(subcommand)]
        command: DayCommand,
    },
    /// Log a food (id or name) for the current user
    Eat {
        food: String,
        /// Quantity (e.g. "200", "200g", "1.5 oz")
        quantity: String,
        /// Date (YYYY-MM-DD, today, yesterday; default: today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Delete a food history entry
    DeleteEntry { id: i64 },
    /// What was eaten on a day
    Report {
        #[arg(long)]
        date: Option<String>,
    },
    /// Write one history as CSV
    Export {
        kind: String,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Leave the interactive prompt
    #[command(alias = "quit")]
    Exit,
}

#[derive(Subcommand, Debug)]
pub(crate) enum SetCommand {
    /// Weight in kg; also records BMI and body fat
    Weight {
        kg: i64,
        #[arg(long)]
        date: Option<String>,
    },
    /// Height in cm; also records BMI
    Height {
        cm: i64,
        #[arg(long)]
        date: Option<String>,
    },
    /// Age in years
    Age { years: i64 },
    /// Target weight in kg
    Target { kg: i64 },
}

#[derive(Subcommand, Debug)]
pub(crate) enum FoodCommand {
    /// Add a food by hand
    Add {
        name: String,
        /// Calories per 100g
        #[arg(long)]
        calories: Option<f64>,
    },
    /// List local foods
    List {
        #[arg(long)]
        search: Option<String>,
    },
    /// Copy a FoodData Central food into the local database
    Import { fdc_id: i64 },
}

#[derive(Subcommand, Debug)]
pub(crate) enum MealCommand {
    /// Create a meal
    Create {
        name: String,
        /// Free-form tag: breakfast, lunch, dinner, snack, ...
        #[arg(short = 't', long = "type", default_value = "other")]
        meal_type: String,
    },
    /// List meals
    List,
    /// Show the foods of a meal
    Show { meal: String },
    /// Add a food to a meal
    AddFood {
        meal: String,
        food: String,
        /// Quantity (e.g. "50", "50g", "2 tbsp")
        quantity: String,
    },
    /// Log every food of a meal
    Log {
        meal: String,
        #[arg(long)]
        date: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum DayCommand {
    /// Create a day preset
    Create { name: String },
    /// List your day presets
    List,
    /// Show the meals of a day preset
    Show { day: String },
    /// Add a meal to a day preset
    AddMeal {
        day: String,
        meal: String,
        /// How many times the meal is eaten that day
        #[arg(default_value_t = 1.0)]
        multiplier: f64,
    },
    /// Log every food of every meal in a day preset
    Log {
        day: String,
        #[arg(long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json = cli.json;

    if let Err(e) = run(cli).await {
        if json {
            println!("{}", json_error(&format!("{e:#}")));
        } else {
            eprintln!("Error: {e:#}");
        }
        process::exit(commands::exit_code(&e));
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    debug!(
        db = %config.db_path.display(),
        data_dir = %config.data_dir.display(),
        "loaded config"
    );
    let tracker = Tracker::new(&config.db_path)?;
    let fdc = FdcClient::new(&config.fdc_endpoint, &config.fdc_api_key)?;

    let mut app = App::new(tracker, fdc, cli.json);
    if let Some(id) = cli.user {
        app.login(id)?;
    }

    match cli.command {
        Some(command) => app.dispatch(command).map(|_| ()),
        None => repl::run(app).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_one_shot_command() {
        let cli = Cli::try_parse_from(["plate", "--user", "3", "eat", "oats", "40g"]).unwrap();
        assert_eq!(cli.user, Some(3));
        assert!(matches!(cli.command, Some(Command::Eat { .. })));
    }

    #[test]
    fn test_parse_search_filters() {
        let cli = Cli::try_parse_from([
            "plate", "search", "corn", "flakes", "--brand", "Kellogg", "--category", "Cereal",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Search {
                query,
                brand,
                category,
                data_type,
            }) => {
                assert_eq!(query, vec!["corn", "flakes"]);
                assert_eq!(brand.as_deref(), Some("Kellogg"));
                assert_eq!(category.as_deref(), Some("Cereal"));
                assert!(data_type.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_no_command_means_repl() {
        let cli = Cli::try_parse_from(["plate", "--db", "/tmp/x.db"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
    }
}
