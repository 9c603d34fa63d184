//! Registry actor - owns the name table and processes commands.
//!
//! The RegistryActor is the single owner of "who is connected". Commands
//! arrive over an mpsc channel and are handled one at a time, which makes
//! every check-then-insert atomic without a lock.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel send failures are ignored or logged, never panic

use std::collections::HashMap;

use linechat_core::{ChatName, SessionId};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::commands::{RegistryCommand, RegistryError, RegistryEvent, RemovalReason};
use crate::server::SessionHandle;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns every live session.
///
/// # Invariants
///
/// - At most one session per name.
/// - Every session in `sessions` is alive: removal closes the session in
///   the same command that drops the entry.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Live sessions keyed by display name
    sessions: HashMap<ChatName, SessionHandle>,

    /// Capacity limit
    max_sessions: usize,

    /// Publisher for membership changes
    event_publisher: broadcast::Sender<RegistryEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<RegistryEvent>,
        max_sessions: usize,
    ) -> Self {
        Self {
            receiver,
            sessions: HashMap::new(),
            max_sessions,
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all handles dropped).
    pub async fn run(mut self) {
        info!(max_sessions = self.max_sessions, "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        // Nothing can reach these sessions any more.
        let remaining = self.close_all();
        info!(closed = remaining, "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::TryAdd {
                session,
                respond_to,
            } => {
                let result = self.handle_try_add(session);
                // Ignore send error - caller may have gone away
                let _ = respond_to.send(result);
            }
            RegistryCommand::Remove {
                name,
                id,
                reason,
                respond_to,
            } => {
                let removed = self.handle_remove(&name, id, reason);
                let _ = respond_to.send(removed);
            }
            RegistryCommand::Recipients { respond_to } => {
                let _ = respond_to.send(self.sessions.values().cloned().collect());
            }
            RegistryCommand::Names { respond_to } => {
                let mut names: Vec<ChatName> = self.sessions.keys().cloned().collect();
                names.sort();
                let _ = respond_to.send(names);
            }
            RegistryCommand::Count { respond_to } => {
                let _ = respond_to.send(self.sessions.len());
            }
            RegistryCommand::CloseAll { respond_to } => {
                let closed = self.close_all();
                let _ = respond_to.send(closed);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_try_add(&mut self, session: SessionHandle) -> Result<(), RegistryError> {
        let name = session.name().clone();

        if self.sessions.contains_key(&name) {
            debug!(name = %name, session = %session.id(), "Name already taken");
            return Err(RegistryError::NameTaken(name));
        }

        if self.sessions.len() >= self.max_sessions {
            warn!(
                name = %name,
                current = self.sessions.len(),
                max = self.max_sessions,
                "Registry is full, rejecting session"
            );
            return Err(RegistryError::RegistryFull {
                max: self.max_sessions,
            });
        }

        if !session.is_alive() {
            return Err(RegistryError::SessionClosed(session.id()));
        }

        let id = session.id();
        self.sessions.insert(name.clone(), session);
        debug!(name = %name, session = %id, total = self.sessions.len(), "Session registered");

        self.publish(RegistryEvent::Joined { name, id });
        Ok(())
    }

    fn handle_remove(&mut self, name: &ChatName, id: SessionId, reason: RemovalReason) -> bool {
        match self.sessions.get(name) {
            Some(existing) if existing.id() == id => {}
            Some(existing) => {
                debug!(
                    name = %name,
                    requested = %id,
                    current = %existing.id(),
                    "Ignoring removal of a replaced session"
                );
                return false;
            }
            None => return false,
        }

        let Some(session) = self.sessions.remove(name) else {
            return false;
        };
        session.close();

        debug!(
            name = %name,
            session = %id,
            reason = %reason,
            total = self.sessions.len(),
            "Session removed"
        );

        self.publish(RegistryEvent::Left {
            name: name.clone(),
            id,
            reason,
        });
        true
    }

    fn close_all(&mut self) -> usize {
        let count = self.sessions.len();
        for (name, session) in self.sessions.drain() {
            session.close();
            let _ = self.event_publisher.send(RegistryEvent::Left {
                name,
                id: session.id(),
                reason: RemovalReason::Shutdown,
            });
        }
        count
    }

    fn publish(&self, event: RegistryEvent) {
        // No subscribers is fine
        let _ = self.event_publisher.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Session;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio_util::sync::CancellationToken;

    fn create_actor(max: usize) -> (RegistryActor, broadcast::Receiver<RegistryEvent>) {
        let (_cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = broadcast::channel(16);
        (RegistryActor::new(cmd_rx, event_tx, max), event_rx)
    }

    fn create_session(id: u64, name: &str) -> SessionHandle {
        Arc::new(Session::new(
            SessionId::new(id),
            ChatName::new(name),
            tokio::io::sink(),
            CancellationToken::new(),
            Duration::from_secs(1),
        ))
    }

    fn try_add(actor: &mut RegistryActor, session: SessionHandle) -> Result<(), RegistryError> {
        let (tx, mut rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::TryAdd {
            session,
            respond_to: tx,
        });
        rx.try_recv().unwrap()
    }

    fn remove(actor: &mut RegistryActor, name: &str, id: u64) -> bool {
        let (tx, mut rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::Remove {
            name: ChatName::new(name),
            id: SessionId::new(id),
            reason: RemovalReason::Disconnected,
            respond_to: tx,
        });
        rx.try_recv().unwrap()
    }

    #[tokio::test]
    async fn test_try_add_session() {
        let (mut actor, mut event_rx) = create_actor(10);

        assert!(try_add(&mut actor, create_session(1, "alice")).is_ok());
        assert_eq!(actor.sessions.len(), 1);

        let event = event_rx.try_recv().unwrap();
        assert_eq!(
            event,
            RegistryEvent::Joined {
                name: ChatName::new("alice"),
                id: SessionId::new(1),
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected_without_mutation() {
        let (mut actor, _) = create_actor(10);

        let first = create_session(1, "alice");
        try_add(&mut actor, Arc::clone(&first)).unwrap();

        let result = try_add(&mut actor, create_session(2, "alice"));
        assert_eq!(result, Err(RegistryError::NameTaken(ChatName::new("alice"))));
        assert_eq!(actor.sessions.len(), 1);
        assert_eq!(actor.sessions.get(&ChatName::new("alice")).unwrap().id(), SessionId::new(1));
        assert!(first.is_alive());
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let (mut actor, _) = create_actor(2);

        try_add(&mut actor, create_session(1, "a")).unwrap();
        try_add(&mut actor, create_session(2, "b")).unwrap();

        let result = try_add(&mut actor, create_session(3, "c"));
        assert_eq!(result, Err(RegistryError::RegistryFull { max: 2 }));

        assert!(remove(&mut actor, "a", 1));
        assert!(try_add(&mut actor, create_session(3, "c")).is_ok());
    }

    #[tokio::test]
    async fn test_closed_session_not_added() {
        let (mut actor, _) = create_actor(10);
        let session = create_session(1, "alice");
        session.close();

        let result = try_add(&mut actor, session);
        assert_eq!(result, Err(RegistryError::SessionClosed(SessionId::new(1))));
        assert!(actor.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_remove_closes_session_and_publishes() {
        let (mut actor, mut event_rx) = create_actor(10);
        let session = create_session(1, "alice");
        try_add(&mut actor, Arc::clone(&session)).unwrap();
        let _ = event_rx.try_recv();

        assert!(remove(&mut actor, "alice", 1));
        assert!(!session.is_alive());
        assert!(actor.sessions.is_empty());

        match event_rx.try_recv().unwrap() {
            RegistryEvent::Left { name, reason, .. } => {
                assert_eq!(name.as_str(), "alice");
                assert_eq!(reason, RemovalReason::Disconnected);
            }
            other => panic!("Expected Left event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (mut actor, mut event_rx) = create_actor(10);
        try_add(&mut actor, create_session(1, "alice")).unwrap();
        let _ = event_rx.try_recv();

        assert!(remove(&mut actor, "alice", 1));
        assert!(!remove(&mut actor, "alice", 1));
        assert!(!remove(&mut actor, "nobody", 9));

        // Only one Left event for the one real removal
        assert!(event_rx.try_recv().is_ok());
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_remove_does_not_evict_reused_name() {
        let (mut actor, _) = create_actor(10);
        try_add(&mut actor, create_session(1, "alice")).unwrap();
        assert!(remove(&mut actor, "alice", 1));

        let reused = create_session(2, "alice");
        try_add(&mut actor, Arc::clone(&reused)).unwrap();

        // A late removal from the first session must not touch the second
        assert!(!remove(&mut actor, "alice", 1));
        assert!(reused.is_alive());
        assert_eq!(actor.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_names_sorted() {
        let (mut actor, _) = create_actor(10);
        for (id, name) in [(1, "carol"), (2, "alice"), (3, "bob")] {
            try_add(&mut actor, create_session(id, name)).unwrap();
        }

        let (tx, mut rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::Names { respond_to: tx });
        let names: Vec<String> = rx
            .try_recv()
            .unwrap()
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn test_close_all() {
        let (mut actor, mut event_rx) = create_actor(10);
        let a = create_session(1, "a");
        let b = create_session(2, "b");
        try_add(&mut actor, Arc::clone(&a)).unwrap();
        try_add(&mut actor, Arc::clone(&b)).unwrap();
        while event_rx.try_recv().is_ok() {}

        let (tx, mut rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::CloseAll { respond_to: tx });
        assert_eq!(rx.try_recv().unwrap(), 2);

        assert!(!a.is_alive());
        assert!(!b.is_alive());
        assert!(actor.sessions.is_empty());

        for _ in 0..2 {
            match event_rx.try_recv().unwrap() {
                RegistryEvent::Left { reason, .. } => assert_eq!(reason, RemovalReason::Shutdown),
                other => panic!("Expected Left event, got {other:?}"),
            }
        }
    }
}
