//! Command-line interface and REPL
//!
//! Lines are read on a blocking thread and parsed into [`ReplCommand`]s,
//! which the main loop executes against the registry and the shadow actor.

use anyhow::{bail, Context, Result};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::Value;
use tokio::sync::mpsc;

use thing_shadow::registry::{InMemoryRegistry, ThingRegistry};
use thing_shadow::shadow::{split_uid, ShadowHandle, StateFlags, ThingRef};

/// One parsed REPL line
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    /// Print the full shadow
    Show,
    /// Print the pending delta and flags
    Delta,
    /// Update a thing state
    Set { uid: String, value: Value },
    /// Forced update, or forced publish when no value is given
    Force { uid: String, value: Option<Value> },
    /// Ask a thing to publish its current state
    Publish { uid: String },
    Create { uid: String, value: Value, private: bool },
    Remove { uid: String },
    Private { uid: String },
    /// Stop shadowing a thing
    Disable { uid: String },
    /// Apply a JSON state document
    Apply { document: String },
    Flush,
    Help,
    Exit,
}

const HELP: &[(&str, &str)] = &[
    ("show", "print the full shadow"),
    ("delta", "print the pending delta shadow and flags"),
    ("set <uid> <value>", "update the state of a thing"),
    ("force <uid> [value]", "forced update, or forced publish without value"),
    ("publish <uid>", "publish the current state of a thing"),
    ("create <uid> <value> [private]", "create a thing"),
    ("remove <uid>", "remove a thing"),
    ("private <uid>", "make a thing private"),
    ("disable <uid>", "stop shadowing a thing"),
    ("apply <json>", "apply a state document"),
    ("flush", "flush the pending delta now"),
    ("help", "show this help"),
    ("exit", "quit"),
];

/// Parse a value argument: JSON when it parses, a plain string otherwise
pub fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Parse one REPL line; `None` for a blank line
pub fn parse_command(line: &str) -> Result<Option<ReplCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb {
        "show" => ReplCommand::Show,
        "delta" => ReplCommand::Delta,
        "flush" => ReplCommand::Flush,
        "help" | "?" => ReplCommand::Help,
        "exit" | "quit" => ReplCommand::Exit,
        "set" => {
            let (uid, value) = uid_and_value(rest)?;
            let value = value.context("usage: set <uid> <value>")?;
            ReplCommand::Set { uid, value }
        }
        "force" => {
            let (uid, value) = uid_and_value(rest)?;
            ReplCommand::Force { uid, value }
        }
        "create" => {
            let (uid, value) = uid_and_value(rest)?;
            let value = value.context("usage: create <uid> <value> [private]")?;
            let (value, private) = match value {
                Value::String(s) if s.ends_with(" private") => {
                    let raw = s.trim_end_matches(" private").trim();
                    (parse_value(raw), true)
                }
                other => (other, false),
            };
            ReplCommand::Create { uid, value, private }
        }
        "publish" => ReplCommand::Publish { uid: single_uid(rest)? },
        "remove" => ReplCommand::Remove { uid: single_uid(rest)? },
        "private" => ReplCommand::Private { uid: single_uid(rest)? },
        "disable" => ReplCommand::Disable { uid: single_uid(rest)? },
        "apply" => {
            if rest.is_empty() {
                bail!("usage: apply <json>");
            }
            ReplCommand::Apply {
                document: rest.to_string(),
            }
        }
        other => bail!("unknown command '{}', type 'help'", other),
    };

    Ok(Some(command))
}

fn single_uid(rest: &str) -> Result<String> {
    match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
        [uid] => Ok(uid.to_string()),
        _ => bail!("expected exactly one <uid>"),
    }
}

fn uid_and_value(rest: &str) -> Result<(String, Option<Value>)> {
    if rest.is_empty() {
        bail!("missing <uid>");
    }
    match rest.split_once(char::is_whitespace) {
        Some((uid, value)) => Ok((uid.to_string(), Some(parse_value(value.trim())))),
        None => Ok((rest.to_string(), None)),
    }
}

/// Read lines on the current (blocking) thread until `exit` or EOF
///
/// Every parsed command is forwarded to `tx`; parse errors are printed here.
pub fn read_commands(tx: mpsc::UnboundedSender<ReplCommand>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    println!("{}", "thing-shadow REPL, type 'help' for commands".bold().cyan());

    loop {
        match rl.readline("shadow> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                match parse_command(&line) {
                    Ok(Some(command)) => {
                        let exit = command == ReplCommand::Exit;
                        if tx.send(command).is_err() || exit {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("{} {}", "error:".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                let _ = tx.send(ReplCommand::Exit);
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

/// Execute one command, returning `false` when the REPL should stop
pub async fn execute(
    command: ReplCommand,
    registry: &InMemoryRegistry,
    shadow: &ShadowHandle,
) -> Result<bool> {
    match command {
        ReplCommand::Show => {
            let snapshot = shadow.snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot.full_shadow)?);
        }
        ReplCommand::Delta => {
            let snapshot = shadow.snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot.delta_shadow)?);
            println!(
                "  flags: {}  window: {}  flushes: {}",
                serde_json::to_string(&snapshot.flags)?.dimmed(),
                if snapshot.window_active { "active".yellow() } else { "idle".green() },
                snapshot.flush_count
            );
        }
        ReplCommand::Set { uid, value } => {
            let (domain, id) = split_uid(&uid);
            if !registry.update_state(domain, id, value, StateFlags::empty())? {
                println!("{}", "unchanged".dimmed());
            }
        }
        ReplCommand::Force { uid, value } => {
            let (domain, id) = split_uid(&uid);
            match value {
                Some(value) => {
                    registry.update_state(domain, id, value, StateFlags::FORCED)?;
                }
                None => registry.publish(domain, id, StateFlags::FORCED)?,
            }
        }
        ReplCommand::Publish { uid } => {
            let (domain, id) = split_uid(&uid);
            registry.publish(domain, id, StateFlags::empty())?;
        }
        ReplCommand::Create { uid, value, private } => {
            let (domain, id) = split_uid(&uid);
            let mut thing = ThingRef::new(domain, id);
            thing.private = private;
            registry.create(thing, value, true)?;
        }
        ReplCommand::Remove { uid } => {
            let (domain, id) = split_uid(&uid);
            registry.remove(domain, id)?;
        }
        ReplCommand::Private { uid } => {
            let (domain, id) = split_uid(&uid);
            registry.make_private(domain, id)?;
        }
        ReplCommand::Disable { uid } => {
            let (domain, id) = split_uid(&uid);
            let thing = registry
                .find(domain, id)
                .unwrap_or_else(|| ThingRef::new(domain, id));
            shadow.disable(thing).await?;
            println!("{} {}", "shadow disabled for".dimmed(), uid);
        }
        ReplCommand::Apply { document } => {
            let applied = shadow.apply_json(document).await?;
            println!("{} thing(s) updated", applied.to_string().green());
        }
        ReplCommand::Flush => {
            if !shadow.flush().await? {
                println!("{}", "nothing pending".dimmed());
            }
        }
        ReplCommand::Help => print_help(),
        ReplCommand::Exit => return Ok(false),
    }
    Ok(true)
}

pub fn print_help() {
    println!("\n{}", "Commands:".bold());
    for (usage, description) in HELP {
        println!("  {:<32} {}", usage.cyan(), description);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("show").unwrap(), Some(ReplCommand::Show));
        assert_eq!(parse_command("  flush  ").unwrap(), Some(ReplCommand::Flush));
        assert_eq!(parse_command("quit").unwrap(), Some(ReplCommand::Exit));
        assert_eq!(parse_command("").unwrap(), None);
    }

    #[test]
    fn test_parse_set_values() {
        assert_eq!(
            parse_command("set light.kitchen {\"power\": true}").unwrap(),
            Some(ReplCommand::Set {
                uid: "light.kitchen".to_string(),
                value: json!({ "power": true }),
            })
        );
        assert_eq!(
            parse_command("set door closed").unwrap(),
            Some(ReplCommand::Set {
                uid: "door".to_string(),
                value: json!("closed"),
            })
        );
        assert!(parse_command("set door").is_err());
    }

    #[test]
    fn test_parse_force_and_create() {
        assert_eq!(
            parse_command("force door").unwrap(),
            Some(ReplCommand::Force {
                uid: "door".to_string(),
                value: None,
            })
        );
        assert_eq!(
            parse_command("create token 42 private").unwrap(),
            Some(ReplCommand::Create {
                uid: "token".to_string(),
                value: json!(42),
                private: true,
            })
        );
        assert_eq!(
            parse_command("create light.hall false").unwrap(),
            Some(ReplCommand::Create {
                uid: "light.hall".to_string(),
                value: json!(false),
                private: false,
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("frobnicate").is_err());
        assert!(parse_command("remove").is_err());
        assert!(parse_command("remove a b").is_err());
        assert!(parse_command("apply").is_err());
    }

    #[tokio::test]
    async fn test_execute_against_actor() {
        use std::sync::Arc;
        use thing_shadow::config::ShadowConfig;
        use thing_shadow::shadow::ShadowActor;

        let registry = Arc::new(InMemoryRegistry::new());
        let handle = ShadowActor::spawn(&ShadowConfig::default(), registry.clone()).unwrap();

        for line in ["create light.kitchen false", "set light.kitchen true"] {
            let command = parse_command(line).unwrap().unwrap();
            assert!(execute(command, &registry, &handle).await.unwrap());
        }

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.full_shadow, json!({ "light": { "kitchen": true } }));
        assert!(!execute(ReplCommand::Exit, &registry, &handle).await.unwrap());
    }
}
