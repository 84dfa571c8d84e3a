//! Parsing of terminal input lines.

/// What a line typed at the prompt asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Users,
    Select(String),
    Connect,
    Login,
    Logout,
    Quit,
    Help,
    /// Plain text for the selected peer
    Send(String),
    /// Unknown command or missing argument; carries the hint to show
    Invalid(String),
}

impl Command {
    /// Parse one line; `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Self::Send(line.to_string()));
        };

        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };
        Some(match name {
            "users" => Self::Users,
            "select" if argument.is_empty() => {
                Self::Invalid("Usage: /select <n|name>".to_string())
            }
            "select" => Self::Select(argument.to_string()),
            "connect" => Self::Connect,
            "login" => Self::Login,
            "logout" => Self::Logout,
            "quit" | "exit" => Self::Quit,
            "help" => Self::Help,
            other => Self::Invalid(format!("Unknown command: /{other} (try /help)")),
        })
    }
}
