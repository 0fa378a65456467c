//! Command-line interface for postboard.
//!
//! A thin administrative front end over [`PostRepository`]: every command
//! opens the repository configured by the environment, performs one
//! operation and prints plain text to stdout.

pub mod args;
pub mod commands;
pub mod utils;

use crate::board::repository::PostRepository;
use crate::Result;
use std::process;

pub use args::Command;

/// Main entry point for the CLI application
pub fn run() -> Result<()> {
    let command = match args::parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error parsing arguments: {}", e);
            args::print_usage();
            process::exit(1);
        }
    };

    if command == Command::Help {
        args::print_usage();
        return Ok(());
    }

    let repo = utils::open_repository()?;
    execute(&repo, command)
}

/// Runs one parsed command against an open repository
pub fn execute(repo: &PostRepository, command: Command) -> Result<()> {
    match command {
        Command::Post {
            author,
            category,
            title,
            content,
        } => commands::post(repo, &author, &category, &title, &content),
        Command::Reply {
            parent,
            author,
            content,
        } => commands::reply(repo, &parent, &author, &content),
        Command::Show { id } => commands::show(repo, &id),
        Command::List { tag, cursor, limit } => {
            commands::list(repo, &tag, cursor.as_deref(), limit)
        }
        Command::Replies { id, cursor, limit } => {
            commands::replies(repo, &id, cursor.as_deref(), limit)
        }
        Command::Recategorize { id, category } => commands::recategorize(repo, &id, &category),
        Command::Delete { id } => commands::delete(repo, &id),
        Command::Lock { id, locked } => commands::lock(repo, &id, locked),
        Command::Ban { author, banned } => commands::ban(repo, &author, banned),
        Command::Check => commands::check(repo),
        Command::RebuildIndex => commands::rebuild_index(repo),
        Command::Help => {
            args::print_usage();
            Ok(())
        }
    }
}
