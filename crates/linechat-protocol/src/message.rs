//! Texts sent from the server to clients.

use linechat_core::{ChatName, Message};

use crate::parse::Command;

/// Sent on connect. No trailing newline so the client's cursor stays on
/// the prompt line.
pub const NAME_PROMPT: &str = "Enter your username: ";

/// Final line sent when the requested name is in use (or reserved).
pub const NAME_TAKEN_NOTICE: &str = "Username already taken. Connection closed.\n";

/// Final line sent when the server has no room for another participant.
pub const SERVER_FULL_NOTICE: &str = "Server is full. Connection closed.\n";

/// Greeting sent once the handshake succeeds.
pub fn welcome(name: &ChatName) -> String {
    format!("Welcome to the chat server, {name}!\n")
}

/// Renders a message as one wire line, terminator included.
pub fn render_line(message: &Message) -> String {
    format!("{message}\n")
}

/// Private reply to `/help`.
pub fn help_text() -> String {
    let mut text = String::from("Available commands:\n");
    for command in Command::ALL {
        text.push_str(command.token());
        text.push_str(" - ");
        text.push_str(command.description());
        text.push('\n');
    }
    text
}

/// Private reply to `/users`.
pub fn users_text(names: &[ChatName]) -> String {
    let mut text = format!("Connected users ({}):\n", names.len());
    for name in names {
        text.push_str("  ");
        text.push_str(name.as_str());
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn test_prompt_has_no_newline() {
        assert!(!NAME_PROMPT.ends_with('\n'));
    }

    #[test]
    fn test_welcome() {
        assert_eq!(
            welcome(&ChatName::new("alice")),
            "Welcome to the chat server, alice!\n"
        );
    }

    #[test]
    fn test_render_line() {
        let time = NaiveTime::from_hms_opt(9, 3, 0).unwrap();
        let msg = Message::at("bob", "hi there", time);
        assert_eq!(render_line(&msg), "[09:03:00] bob: hi there\n");
    }

    #[test]
    fn test_help_lists_every_command() {
        let help = help_text();
        assert!(help.starts_with("Available commands:\n"));
        assert!(help.contains("/help - Show this help\n"));
        assert!(help.contains("/users - "));
        assert!(help.contains("/exit - Exit the chat\n"));
    }

    #[test]
    fn test_users_text() {
        let names = vec![ChatName::new("alice"), ChatName::new("bob")];
        assert_eq!(users_text(&names), "Connected users (2):\n  alice\n  bob\n");
    }

    #[test]
    fn test_rejection_notices_are_single_lines() {
        for notice in [NAME_TAKEN_NOTICE, SERVER_FULL_NOTICE] {
            assert!(notice.ends_with(".\n"));
            assert_eq!(notice.matches('\n').count(), 1);
        }
    }
}
