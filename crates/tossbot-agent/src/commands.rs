//! Command-line parsing for prefixed chat messages.

/// A parsed bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Join,
    /// With an option: declare the winner. Without: force-close.
    Close { winning_option: Option<String> },
    Balance,
    Refresh,
    Monitor,
    /// Free text after the prefix: a new toss prompt for the parser.
    NewToss { prompt: String },
}

impl Command {
    /// Name used by the allowed-commands whitelist.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Status => "status",
            Command::Join => "join",
            Command::Close { .. } => "close",
            Command::Balance => "balance",
            Command::Refresh => "refresh",
            Command::Monitor => "monitor",
            Command::NewToss { .. } => "toss",
        }
    }
}

/// Parse a chat line. Returns `None` when the line is not addressed to
/// the bot (missing prefix) or carries nothing after the prefix.
pub fn parse_command(text: &str, prefix: &str) -> Option<Command> {
    let trimmed = text.trim();
    let rest = strip_prefix_case_insensitive(trimmed, prefix)?.trim();
    if rest.is_empty() {
        return None;
    }

    let mut words = rest.split_whitespace();
    let head = words.next()?;
    let tail = rest[head.len()..].trim();

    let command = match head.to_ascii_lowercase().as_str() {
        "help" => Command::Help,
        "status" => Command::Status,
        "join" => Command::Join,
        "close" => Command::Close {
            winning_option: (!tail.is_empty()).then(|| tail.to_string()),
        },
        "balance" => Command::Balance,
        "refresh" => Command::Refresh,
        "monitor" => Command::Monitor,
        _ => Command::NewToss { prompt: rest.to_string() },
    };
    Some(command)
}

fn strip_prefix_case_insensitive<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if text.len() >= prefix.len() && text[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}
