//! Interactive console commands
//!
//! ```text
//! energy <0-1>   bpm <value>   volume <0-1>
//! status         next          help          quit
//! ```
//!
//! Parsing is case-insensitive. Values are not clamped here; that happens in
//! `ControlLimits` on the way to the performer.

use std::num::ParseFloatError;

use thiserror::Error;

use crate::messages::ControlMessage;

/// Help text printed by `help` and at startup
pub const HELP_TEXT: &str = "\
OSC messages:
  /energy [0.0-1.0]      - Set crowd energy level
  /movement [0.0-1.0]    - Set crowd movement (alias)
  /bpm [value]           - Change base BPM
  /master_volume [0-1]   - Master volume
  /status                - Show status
  /next_vocal            - Force vocal change

Commands:
  energy [0-1]   - Set energy
  bpm [value]    - Set BPM
  volume [0-1]   - Set master volume
  status         - Show status
  next           - Next vocal
  help           - Show this help
  quit           - Exit";

/// A parsed console line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsoleCommand {
    Control(ControlMessage),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command '{0}' (type 'help')")]
    Unknown(String),

    #[error("'{command}' needs a value")]
    MissingValue { command: &'static str },

    #[error("Invalid {command} value '{value}'")]
    InvalidValue {
        command: &'static str,
        value: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("'{command}' takes no arguments")]
    UnexpectedArgument { command: &'static str },
}

/// Parse one console line
pub fn parse_command(line: &str) -> Result<ConsoleCommand, CommandError> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Err(CommandError::Empty);
    };
    let arg = parts.next();
    if parts.next().is_some() {
        return Err(CommandError::UnexpectedArgument {
            command: canonical(word),
        });
    }

    let command = match word.to_ascii_lowercase().as_str() {
        "energy" => ConsoleCommand::Control(ControlMessage::SetEnergy(value("energy", arg)?)),
        "bpm" => ConsoleCommand::Control(ControlMessage::SetBpm(value("bpm", arg)?)),
        "volume" => ConsoleCommand::Control(ControlMessage::SetMasterVolume(
            value("volume", arg)? as f32,
        )),
        "status" => no_arg("status", arg, ConsoleCommand::Control(ControlMessage::Status))?,
        "next" => no_arg("next", arg, ConsoleCommand::Control(ControlMessage::NextVocal))?,
        "help" => no_arg("help", arg, ConsoleCommand::Help)?,
        "quit" | "exit" => no_arg("quit", arg, ConsoleCommand::Quit)?,
        _ => return Err(CommandError::Unknown(word.to_string())),
    };
    Ok(command)
}

fn value(command: &'static str, arg: Option<&str>) -> Result<f64, CommandError> {
    let raw = arg.ok_or(CommandError::MissingValue { command })?;
    raw.parse::<f64>().map_err(|source| CommandError::InvalidValue {
        command,
        value: raw.to_string(),
        source,
    })
}

fn no_arg(
    command: &'static str,
    arg: Option<&str>,
    parsed: ConsoleCommand,
) -> Result<ConsoleCommand, CommandError> {
    match arg {
        Some(_) => Err(CommandError::UnexpectedArgument { command }),
        None => Ok(parsed),
    }
}

fn canonical(word: &str) -> &'static str {
    match word.to_ascii_lowercase().as_str() {
        "energy" => "energy",
        "bpm" => "bpm",
        "volume" => "volume",
        "status" => "status",
        "next" => "next",
        "help" => "help",
        "quit" | "exit" => "quit",
        _ => "command",
    }
}
