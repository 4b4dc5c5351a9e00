// ABOUTME: Chat command grammar for the /memewall command language.
// ABOUTME: Parses whitespace-separated tokens into a closed Command enum.

use crate::auth::Identity;
use crate::power::PowerAction;

/// Argument a command needed but did not get.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingArg {
    Url,
    Filename,
    Password,
}

/// Parsed command from /memewall text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// /memewall or /memewall help
    Help,
    /// /memewall commands
    Commands,
    /// Fetch an image and show it: /memewall url <url> <filename>
    Url { url: String, filename: String },
    /// /memewall list
    List,
    /// Show an existing artifact: /memewall show <filename>
    Show(String),
    /// List artifacts with one highlighted: /memewall preview <filename>
    Preview(String),
    /// /memewall stop
    Stop,
    /// /memewall poweroff <password> or /memewall reboot <password>
    Power {
        action: PowerAction,
        password: String,
    },
    /// A known command was given without a required argument.
    Missing(MissingArg),
    /// Unknown command with the full original text.
    Unknown(String),
}

impl Command {
    /// Parse command text with the command prefix already stripped.
    pub fn parse(text: &str) -> Command {
        let text = text.trim();
        let mut tokens = text.split_whitespace();

        let Some(head) = tokens.next() else {
            return Command::Help;
        };
        let mut arg = |missing: MissingArg| {
            tokens
                .next()
                .map(str::to_string)
                .ok_or(Command::Missing(missing))
        };

        let parsed = match head {
            "help" => Ok(Command::Help),
            "commands" => Ok(Command::Commands),
            "list" => Ok(Command::List),
            "stop" => Ok(Command::Stop),
            "url" => arg(MissingArg::Url).and_then(|url| {
                arg(MissingArg::Filename).map(|filename| Command::Url { url, filename })
            }),
            "show" => arg(MissingArg::Filename).map(Command::Show),
            "preview" => arg(MissingArg::Filename).map(Command::Preview),
            "poweroff" => arg(MissingArg::Password).map(|password| Command::Power {
                action: PowerAction::Poweroff,
                password,
            }),
            "reboot" => arg(MissingArg::Password).map(|password| Command::Power {
                action: PowerAction::Reboot,
                password,
            }),
            _ => Ok(Command::Unknown(text.to_string())),
        };

        parsed.unwrap_or_else(|missing| missing)
    }

    /// Parse raw message text that starts with `prefix` (e.g. "/memewall").
    pub fn from_message(prefix: &str, text: &str) -> Option<Command> {
        let rest = text.trim().strip_prefix(prefix)?;
        // "/memewallfoo" is not ours
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }
        Some(Self::parse(rest))
    }

    /// Whether running this command changes what the wall shows or the host state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Command::Url { .. } | Command::Show(_) | Command::Stop | Command::Power { .. }
        )
    }
}

/// A parsed command together with the caller that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub actor: Identity,
}

impl Request {
    pub fn new(command: Command, actor: Identity) -> Self {
        Self { command, actor }
    }
}
