//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to membership events.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed` or a neutral default

use linechat_core::{ChatName, SessionId};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{RegistryCommand, RegistryError, RegistryEvent, RemovalReason};
use crate::server::SessionHandle;

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// # Usage
///
/// ```ignore
/// // Claim a name
/// handle.try_add(Arc::clone(&session)).await?;
///
/// // Who should get a broadcast?
/// let recipients = handle.recipients().await;
///
/// // Leave
/// handle.remove(name, id, RemovalReason::Disconnected).await;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to membership changes
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Registers a session under its name, atomically checking that the
    /// name is free.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NameTaken` if a live session holds the name
    /// - `RegistryError::RegistryFull` if the registry is at maximum capacity
    /// - `RegistryError::SessionClosed` if the session was already closed
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn try_add(&self, session: SessionHandle) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::TryAdd {
                session,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Removes `name` if it still belongs to session `id`.
    ///
    /// Idempotent: returns `false` when there was nothing to remove or the
    /// actor is gone.
    pub async fn remove(&self, name: ChatName, id: SessionId, reason: RemovalReason) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Remove {
                name,
                id,
                reason,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Copies out the list of live sessions.
    ///
    /// Returns an empty vector if the actor is gone.
    pub async fn recipients(&self) -> Vec<SessionHandle> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Recipients { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Sorted names of live sessions.
    pub async fn names(&self) -> Vec<ChatName> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Names { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Number of live sessions (0 if the actor is gone).
    pub async fn count(&self) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Count { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or(0)
    }

    /// Closes and removes every session. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::CloseAll { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or(0)
    }

    /// Subscribe to membership events.
    ///
    /// This is a synchronous operation - it doesn't communicate with the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Returns `true` while the actor's command channel is open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
