//! Session identity and lifecycle types.

use std::fmt;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Sender name used for messages the server authors itself.
///
/// Participants can never claim this name.
pub const SYSTEM_SENDER: &str = "Server";

/// Display name chosen by a participant during the handshake.
///
/// Names are compared byte-for-byte. No normalisation happens beyond the
/// line-terminator stripping done by the protocol layer, and an empty name
/// is a valid (if unusual) choice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChatName(String);

impl ChatName {
    /// Creates a new ChatName from a string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks if this name collides with the server's own sender name.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.0 == SYSTEM_SENDER
    }
}

impl fmt::Display for ChatName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChatName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for ChatName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Server-assigned identifier for one accepted connection.
///
/// Unlike names, ids are never reused during a run, so they tell apart two
/// sessions that held the same name at different times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle of a single connection.
///
/// ```text
/// Connecting ──▶ Negotiating ──▶ Active ──▶ Closing ──▶ Closed
///                     │                        ▲
///                     └────── name taken ──────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Socket accepted, nothing sent yet.
    #[default]
    Connecting,
    /// Prompt sent, waiting for the proposed name.
    Negotiating,
    /// Registered and relaying lines.
    Active,
    /// Tearing down: flag cleared, registry entry being removed.
    Closing,
    /// Worker exited and the connection is released.
    Closed,
}

impl SessionState {
    /// Returns whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Negotiating)
                | (Connecting, Closing)
                | (Negotiating, Active)
                | (Negotiating, Closing)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Connecting => "connecting",
            SessionState::Negotiating => "negotiating",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(label)
    }
}
