//! Comment command parsing.
//!
//! A comment body addresses this service when one of its lines starts with
//! the `/ralph` prefix followed by a command word. Routing is modelled as a
//! closed enum so the command set is exhaustive and compiler-checked;
//! anything else lands in [`CommandName::Unknown`] and gets a guidance reply
//! rather than an error.

/// Literal line prefix that addresses the service.
pub const COMMAND_PREFIX: &str = "/ralph";

/// The closed set of routable commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandName {
    /// Analyse one user story and reply with implementation guidance.
    Run,
    /// Report completion progress for the task document.
    Status,
    /// Static command reference.
    Help,
    /// Any other command word (kept verbatim for the guidance reply).
    Unknown(String),
}

impl CommandName {
    /// Stable lowercase label for logging and outcome reporting.
    pub fn label(&self) -> &str {
        match self {
            CommandName::Run => "run",
            CommandName::Status => "status",
            CommandName::Help => "help",
            CommandName::Unknown(word) => word.as_str(),
        }
    }
}

/// A parsed command: name plus ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: CommandName,
    /// Whitespace-split remainder of the command line, case preserved.
    pub args: Vec<String>,
}

/// Extracts the command from a comment body, if any.
///
/// Scans lines top to bottom; a line matches when, after trimming, it starts
/// with [`COMMAND_PREFIX`] followed by whitespace and a bare word. The command
/// word is matched case-insensitively; arguments keep their case. Only the
/// first matching line is honored. Total over all inputs: no match is `None`,
/// never an error.
pub fn parse_command(body: &str) -> Option<Command> {
    for line in body.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix(COMMAND_PREFIX) else {
            continue;
        };
        // "/ralphx ..." is not a command; the prefix must end the word.
        if !rest.starts_with(char::is_whitespace) {
            continue;
        }
        let mut words = rest.split_whitespace();
        let Some(word) = words.next() else {
            // A bare "/ralph" line names no command; keep scanning.
            continue;
        };
        let name = match word.to_ascii_lowercase().as_str() {
            "run" => CommandName::Run,
            "status" => CommandName::Status,
            "help" => CommandName::Help,
            _ => CommandName::Unknown(word.to_string()),
        };
        let args = words.map(str::to_string).collect();
        return Some(Command { name, args });
    }
    None
}
