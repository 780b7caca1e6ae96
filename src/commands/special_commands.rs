//! Special commands parser for interactive chat mode
//!
//! Special commands are handled by the chat loop itself instead of being sent
//! to the coordinator. They are prefixed with `/` and are case-insensitive;
//! `exit` and `quit` also work without the slash.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Commands understood by the chat loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Forget the conversation and last search results
    Reset,

    /// Print the turns in the current window
    History,

    /// Load a resume file into the session
    Resume(PathBuf),

    /// Answer the last message again after a failed turn
    Retry,

    /// Show session status
    Status,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; send it to the coordinator
    None,
}

/// Parse a line of user input
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` for an unrecognized `/command` and
/// `CommandError::MissingArgument` for `/resume` without a path.
///
/// # Examples
///
/// ```
/// use jobscout::commands::special_commands::{parse_special_command, SpecialCommand};
/// use std::path::PathBuf;
///
/// assert_eq!(parse_special_command("/reset").unwrap(), SpecialCommand::Reset);
/// assert_eq!(
///     parse_special_command("/resume ~/CV.txt").unwrap(),
///     SpecialCommand::Resume(PathBuf::from("~/CV.txt"))
/// );
/// assert_eq!(parse_special_command("find rust jobs").unwrap(), SpecialCommand::None);
/// assert!(parse_special_command("/apply").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command.to_lowercase(), rest.trim()),
        None => (lower, ""),
    };

    match command.as_str() {
        "/reset" | "/clear" => Ok(SpecialCommand::Reset),
        "/history" => Ok(SpecialCommand::History),
        "/retry" => Ok(SpecialCommand::Retry),
        "/status" => Ok(SpecialCommand::Status),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/exit" | "/quit" | "exit" | "quit" => Ok(SpecialCommand::Exit),
        "/resume" if rest.is_empty() => Err(CommandError::MissingArgument {
            command: "/resume".to_string(),
            usage: "/resume <path-to-resume.txt>".to_string(),
        }),
        "/resume" => Ok(SpecialCommand::Resume(PathBuf::from(rest))),
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Print help for chat mode
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

SESSION:
  /resume <path>  - Load a plain-text resume for matching and suggestions
  /reset          - Forget the conversation and last search results
  /history        - Show the conversation so far
  /retry          - Answer your last message again after a failure
  /status         - Show provider, store and resume status

GENERAL:
  /help           - Show this help message
  /exit, exit     - Leave the chat

Anything else is sent to the assistant, for example:
  Find remote data scientist jobs posted this week
  Which of these fits my resume best?
  How should I tweak my resume for the first one?

Press Ctrl-C while an answer is streaming to cancel it.
"#
    );
}
