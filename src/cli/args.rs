//! Command-line argument parsing for postboard.

use crate::board::constants::DEFAULT_PAGE_SIZE;
use crate::error::{BoardError, Result};
use std::env;

/// Command-line interface commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Post {
        author: String,
        category: String,
        title: String,
        content: String,
    },
    Reply {
        parent: String,
        author: String,
        content: String,
    },
    Show {
        id: String,
    },
    List {
        tag: String,
        cursor: Option<String>,
        limit: usize,
    },
    Replies {
        id: String,
        cursor: Option<String>,
        limit: usize,
    },
    Recategorize {
        id: String,
        category: String,
    },
    Delete {
        id: String,
    },
    Lock {
        id: String,
        locked: bool,
    },
    Ban {
        author: String,
        banned: bool,
    },
    Check,
    RebuildIndex,
    Help,
}

/// Parse the process arguments into a Command
pub fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(&args)
}

fn require<'a>(args: &'a [String], count: usize, usage: &str) -> Result<&'a [String]> {
    if args.len() < count {
        return Err(BoardError::invalid_input(format!("Usage: postboard {}", usage)));
    }
    Ok(args)
}

/// Splits `--cursor` and `--limit` options from positional arguments.
fn page_options(args: &[String]) -> Result<(Vec<String>, Option<String>, usize)> {
    let mut positional = Vec::new();
    let mut cursor = None;
    let mut limit = DEFAULT_PAGE_SIZE;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--cursor" => {
                let value = iter
                    .next()
                    .ok_or_else(|| BoardError::invalid_input("--cursor requires a value"))?;
                cursor = Some(value.clone());
            }
            "--limit" => {
                let value = iter
                    .next()
                    .ok_or_else(|| BoardError::invalid_input("--limit requires a value"))?;
                limit = value.parse().map_err(|_| {
                    BoardError::invalid_input(format!("Invalid limit '{}'", value))
                })?;
            }
            _ => positional.push(arg.clone()),
        }
    }

    Ok((positional, cursor, limit))
}

/// Parse arguments (without the program name) into a Command
pub fn parse_args_from(args: &[String]) -> Result<Command> {
    let Some(name) = args.first() else {
        return Ok(Command::Help);
    };
    let rest = &args[1..];

    match name.as_str() {
        "post" => {
            let a = require(rest, 4, "post <author> <category> <title> <content>")?;
            Ok(Command::Post {
                author: a[0].clone(),
                category: a[1].clone(),
                title: a[2].clone(),
                content: a[3].clone(),
            })
        }

        "reply" => {
            let a = require(rest, 3, "reply <parent_id> <author> <content>")?;
            Ok(Command::Reply {
                parent: a[0].clone(),
                author: a[1].clone(),
                content: a[2].clone(),
            })
        }

        "show" => {
            let a = require(rest, 1, "show <id>")?;
            Ok(Command::Show { id: a[0].clone() })
        }

        "list" => {
            let (positional, cursor, limit) = page_options(rest)?;
            Ok(Command::List {
                tag: positional.into_iter().next().unwrap_or_default(),
                cursor,
                limit,
            })
        }

        "replies" => {
            let (positional, cursor, limit) = page_options(rest)?;
            let id = positional
                .into_iter()
                .next()
                .ok_or_else(|| BoardError::invalid_input("Usage: postboard replies <id>"))?;
            Ok(Command::Replies { id, cursor, limit })
        }

        "recategorize" => {
            let a = require(rest, 2, "recategorize <id> <category>")?;
            Ok(Command::Recategorize {
                id: a[0].clone(),
                category: a[1].clone(),
            })
        }

        "delete" => {
            let a = require(rest, 1, "delete <id>")?;
            Ok(Command::Delete { id: a[0].clone() })
        }

        "lock" | "unlock" => {
            let a = require(rest, 1, &format!("{} <id>", name))?;
            Ok(Command::Lock {
                id: a[0].clone(),
                locked: name == "lock",
            })
        }

        "ban" | "unban" => {
            let a = require(rest, 1, &format!("{} <author>", name))?;
            Ok(Command::Ban {
                author: a[0].clone(),
                banned: name == "ban",
            })
        }

        "check" => Ok(Command::Check),
        "rebuild-index" => Ok(Command::RebuildIndex),
        "help" | "--help" | "-h" => Ok(Command::Help),

        other => Err(BoardError::invalid_input(format!(
            "Unknown command '{}'",
            other
        ))),
    }
}

/// Print usage information
pub fn print_usage() {
    println!("postboard - discussion board storage engine");
    println!("============================================");
    println!();
    println!("Usage: postboard <command> [args...]");
    println!();
    println!("Commands:");
    println!("  post <author> <category> <title> <content>   Create a root post");
    println!("  reply <parent_id> <author> <content>         Reply to a post");
    println!("  show <id>                                    Show one post");
    println!("  list [tag] [--limit N] [--cursor C]          List posts (all, author, or #category)");
    println!("  replies <id> [--limit N] [--cursor C]        List direct replies of a post");
    println!("  recategorize <id> <category>                 Move a root post to another category");
    println!("  delete <id>                                  Delete a post");
    println!("  lock <id> | unlock <id>                      Toggle replies on a post");
    println!("  ban <author> | unban <author>                Toggle an author ban");
    println!("  check                                        Verify index consistency");
    println!("  rebuild-index                                Regenerate all index entries");
    println!();
    println!("Environment:");
    println!("  POSTBOARD_DATA        Data directory (default: postboard_data)");
    println!("  POSTBOARD_DB_PROFILE  RocksDB profile: default | server");
    println!("  RUST_LOG              Log filter (default: postboard=info)");
}
