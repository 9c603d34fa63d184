//! Chat message value type.

use std::fmt;

use chrono::{Local, NaiveTime};

use crate::session::{ChatName, SYSTEM_SENDER};

/// strftime pattern used when rendering a message's capture time.
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// One chat line: who said it, what they said, and when it was captured.
///
/// Messages are immutable once built. Equality is structural; ordering is
/// whatever order they were appended to the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    sender: String,
    content: String,
    captured_at: NaiveTime,
}

impl Message {
    /// Creates a message stamped with the current local time of day.
    ///
    /// No validation is performed; either field may be empty. Callers are
    /// expected to drop blank user input before getting here.
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::at(sender, content, Local::now().time())
    }

    /// Creates a message with an explicit capture time.
    pub fn at(sender: impl Into<String>, content: impl Into<String>, captured_at: NaiveTime) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            captured_at,
        }
    }

    /// Creates a message authored by the server itself.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(SYSTEM_SENDER, content)
    }

    /// Announces that `name` has joined.
    pub fn join_notice(name: &ChatName) -> Self {
        Self::system(format!("{name} has joined the chat"))
    }

    /// Announces that `name` has left.
    pub fn leave_notice(name: &ChatName) -> Self {
        Self::system(format!("{name} has left the chat"))
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn captured_at(&self) -> NaiveTime {
        self.captured_at
    }

    /// Returns true if the server authored this message.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.sender == SYSTEM_SENDER
    }

    /// Renders the capture time as `HH:MM:SS`.
    pub fn timestamp(&self) -> String {
        self.captured_at.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Renders as `[HH:MM:SS] sender: content`, without a line terminator.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.captured_at.format(TIMESTAMP_FORMAT),
            self.sender,
            self.content
        )
    }
}
