//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `RegistryEvent`: Events published by the registry for subscribers

use std::fmt;

use linechat_core::{ChatName, SessionId};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::server::SessionHandle;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command that produces a result carries a oneshot sender for the
/// reply, so callers can await it without blocking the actor.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Insert a session under its name if the name is free.
    ///
    /// # Errors
    /// - `RegistryError::NameTaken` if a live session already holds the name
    /// - `RegistryError::RegistryFull` if at maximum capacity
    /// - `RegistryError::SessionClosed` if the session was closed before insertion
    TryAdd {
        session: SessionHandle,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Remove the entry for `name`, but only if it still belongs to `id`.
    ///
    /// Responds `true` if an entry was removed. Removing an absent or
    /// already-replaced entry is a no-op, not an error.
    Remove {
        name: ChatName,
        id: SessionId,
        reason: RemovalReason,
        respond_to: oneshot::Sender<bool>,
    },

    /// Copy of every live session, for broadcast fan-out.
    Recipients {
        respond_to: oneshot::Sender<Vec<SessionHandle>>,
    },

    /// Names of all live sessions, sorted.
    Names {
        respond_to: oneshot::Sender<Vec<ChatName>>,
    },

    /// Number of live sessions.
    Count { respond_to: oneshot::Sender<usize> },

    /// Close and remove every session. Used on shutdown.
    ///
    /// Responds with the number of sessions that were closed.
    CloseAll { respond_to: oneshot::Sender<usize> },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Another live session holds this name
    #[error("Name already taken: {0}")]
    NameTaken(ChatName),

    /// Registry has reached maximum capacity
    #[error("Registry full: maximum {max} sessions")]
    RegistryFull { max: usize },

    /// The session was closed before it could be registered
    #[error("Session closed before registration: {0}")]
    SessionClosed(SessionId),

    /// Actor channel closed (registry shut down)
    #[error("Registry channel closed")]
    ChannelClosed,
}

// ============================================================================
// Registry Events
// ============================================================================

/// Reason a session left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Peer closed the connection
    Disconnected,
    /// Participant sent `/exit`
    Exited,
    /// Reading from the connection failed
    ReadFailed,
    /// Writing to the connection failed or timed out
    SendFailed,
    /// The server is stopping
    Shutdown,
}

impl RemovalReason {
    /// Whether the remaining participants should be told about this departure.
    #[must_use]
    pub fn is_announced(self) -> bool {
        !matches!(self, RemovalReason::Shutdown)
    }
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RemovalReason::Disconnected => "disconnected",
            RemovalReason::Exited => "exited",
            RemovalReason::ReadFailed => "read failed",
            RemovalReason::SendFailed => "send failed",
            RemovalReason::Shutdown => "shutdown",
        };
        f.write_str(label)
    }
}

/// Events published by the registry when membership changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A session was registered under `name`.
    Joined { name: ChatName, id: SessionId },

    /// A session was removed.
    Left {
        name: ChatName,
        id: SessionId,
        reason: RemovalReason,
    },
}
