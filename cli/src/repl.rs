use std::io::{self, BufRead, Write};
use std::thread;

use anyhow::{Result, bail};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::debug;

use crate::Command;
use crate::commands::{App, Flow};

/// One prompt line, parsed with the same commands as the binary.
#[derive(Parser, Debug)]
#[command(
    name = "plate",
    no_binary_name = true,
    disable_version_flag = true
)]
struct Line {
    /// Print this command's output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

/// Read commands from stdin until `exit`, end of input or Ctrl-C.
pub(crate) async fn run(mut app: App) -> Result<()> {
    // One slot: the reader waits until the previous line was handled.
    let (tx, mut rx) = mpsc::channel::<String>(1);
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || read_lines(&tx))?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    eprintln!("plate: type 'help' for commands, 'exit' to leave");
    print_prompt(&app)?;
    loop {
        tokio::select! {
            line = rx.recv() => {
                let Some(line) = line else {
                    debug!("end of input");
                    break;
                };
                if handle_line(&mut app, &line) == Flow::Exit {
                    break;
                }
                print_prompt(&app)?;
            }
            _ = &mut ctrl_c => {
                eprintln!();
                debug!("interrupted");
                break;
            }
        }
    }
    Ok(())
}

fn read_lines(tx: &mpsc::Sender<String>) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if tx.blocking_send(line).is_err() {
            break;
        }
    }
}

fn print_prompt(app: &App) -> Result<()> {
    let mut out = io::stdout().lock();
    write!(out, "{}", app.prompt())?;
    out.flush()?;
    Ok(())
}

/// Run one line. Errors are printed and never end the session.
fn handle_line(app: &mut App, line: &str) -> Flow {
    let tokens = match split_line(line) {
        Ok(tokens) if tokens.is_empty() => return Flow::Continue,
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!("Error: {e}");
            return Flow::Continue;
        }
    };

    let parsed = match Line::try_parse_from(&tokens) {
        Ok(parsed) => parsed,
        Err(e) => {
            // Also covers `help` and `--help`
            let _ = e.print();
            return Flow::Continue;
        }
    };

    let flow = if parsed.json {
        app.dispatch_as(parsed.command, true)
    } else {
        app.dispatch(parsed.command)
    };
    match flow {
        Ok(flow) => flow,
        Err(e) => {
            eprintln!("Error: {e:#}");
            Flow::Continue
        }
    }
}

/// Split a line into words. Single or double quotes group words.
fn split_line(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        bail!("Unclosed {q} quote");
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DayCommand, MealCommand};

    #[test]
    fn test_split_line_plain() {
        assert_eq!(split_line("eat oats 40g").unwrap(), vec!["eat", "oats", "40g"]);
        assert!(split_line("   ").unwrap().is_empty());
    }

    #[test]
    fn test_split_line_quotes() {
        assert_eq!(
            split_line(r#"meal add-food "Big Breakfast" 'brown rice' "2 tbsp""#).unwrap(),
            vec!["meal", "add-food", "Big Breakfast", "brown rice", "2 tbsp"]
        );
        assert_eq!(split_line(r#"food add """#).unwrap(), vec!["food", "add", ""]);
    }

    #[test]
    fn test_split_line_unclosed_quote() {
        assert!(split_line(r#"meal create "Lunch"#).is_err());
    }

    #[test]
    fn test_parse_repl_lines() {
        let line = Line::try_parse_from(["day", "add-meal", "Monday", "Breakfast", "2"]).unwrap();
        match line.command {
            Command::Day {
                command: DayCommand::AddMeal { multiplier, .. },
            } => assert!((multiplier - 2.0).abs() < f64::EPSILON),
            other => panic!("unexpected command: {other:?}"),
        }

        let line = Line::try_parse_from(["meal", "create", "Lunch", "--type", "lunch"]).unwrap();
        assert!(matches!(
            line.command,
            Command::Meal {
                command: MealCommand::Create { .. }
            }
        ));
    }

    #[test]
    fn test_json_flag_at_prompt() {
        let line = Line::try_parse_from(["users", "--json"]).unwrap();
        assert!(line.json);
        assert!(matches!(line.command, Command::Users));

        let line = Line::try_parse_from(["--json", "whoami"]).unwrap();
        assert!(line.json);

        let line = Line::try_parse_from(["users"]).unwrap();
        assert!(!line.json);
    }

    #[test]
    fn test_quit_is_exit() {
        let line = Line::try_parse_from(["quit"]).unwrap();
        assert!(matches!(line.command, Command::Exit));
    }

    #[test]
    fn test_unknown_command_is_parse_error() {
        assert!(Line::try_parse_from(["dance"]).is_err());
    }
}
