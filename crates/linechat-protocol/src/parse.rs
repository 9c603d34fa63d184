//! Classification of lines received from clients.

/// Commands a client can send instead of a chat line.
///
/// Commands are matched against the whole line; `/help me` is ordinary chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Private list of commands.
    Help,
    /// Private list of connected participants.
    Users,
    /// Leave the chat. Clients usually handle this locally, but a raw
    /// connection that sends it is closed by the server.
    Exit,
}

impl Command {
    /// Every command, in the order `/help` lists them.
    pub const ALL: [Command; 3] = [Command::Help, Command::Users, Command::Exit];

    pub fn token(self) -> &'static str {
        match self {
            Command::Help => "/help",
            Command::Users => "/users",
            Command::Exit => "/exit",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Command::Help => "Show this help",
            Command::Users => "List connected users",
            Command::Exit => "Exit the chat",
        }
    }

    /// Parses a command token. Returns `None` for anything else.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.token() == token)
    }
}

/// A line received from an active participant, after terminator stripping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine<'a> {
    /// Nothing left after stripping; dropped silently.
    Empty,
    /// A recognised command; answered privately.
    Command(Command),
    /// Anything else; broadcast verbatim.
    Chat(&'a str),
}

impl<'a> ClientLine<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let line = strip_line_terminators(raw);
        if line.is_empty() {
            return ClientLine::Empty;
        }
        match Command::from_token(line) {
            Some(command) => ClientLine::Command(command),
            None => ClientLine::Chat(line),
        }
    }
}

/// Strips any run of trailing `\r` and `\n` characters.
///
/// Leading and inner whitespace is preserved.
pub fn strip_line_terminators(raw: &str) -> &str {
    raw.trim_end_matches(['\r', '\n'])
}
