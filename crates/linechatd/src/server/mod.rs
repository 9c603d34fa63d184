//! TCP server for the chat daemon.
//!
//! The server:
//! - Listens on a TCP port for client connections
//! - Spawns a ConnectionHandler for each client
//! - Announces departures from registry events
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └────────┬────────┘     └─────────────────┘
//!          │ publish / admit
//!          ▼
//! ┌─────────────────┐
//! │   Dispatcher    │──▶ every Session (send lock + timeout)
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Server errors are logged and allow continued operation

mod connection;
mod dispatcher;
mod session;

pub use connection::{ConnectionContext, ConnectionError, ConnectionHandler};
pub use dispatcher::{AdmitError, Dispatcher};
pub use session::{BoxedWriter, SendError, Session, SessionHandle, SessionWriter};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use linechat_core::{Message, SessionId};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::history::History;
use crate::registry::{spawn_registry, RegistryEvent, RegistryHandle};

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Startable, stoppable chat service.
///
/// The server owns the history and the registry for its whole lifetime.
///
/// ```no_run
/// use linechatd::{ChatServer, ServerConfig};
///
/// # async fn demo() -> Result<(), linechatd::ServerError> {
/// let mut server = ChatServer::new(ServerConfig::default());
/// let addr = server.start().await?;
/// println!("listening on {addr}");
/// // ...
/// server.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct ChatServer {
    config: ServerConfig,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Tracks the accept loop, the announcer and every connection task
    tracker: TaskTracker,

    /// Conversation log shared with every connection
    history: History,

    /// Present while running
    registry: Option<RegistryHandle>,

    /// Held until every task has exited, then dropped
    listener: Option<Arc<TcpListener>>,

    local_addr: Option<SocketAddr>,

    stopped: bool,
}

impl ChatServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            cancel_token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            history: History::new(),
            registry: None,
            listener: None,
            local_addr: None,
            stopped: false,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Registry handle, once started.
    pub fn registry(&self) -> Option<&RegistryHandle> {
        self.registry.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.listener.is_some() && !self.stopped
    }

    /// Binds the listener and begins accepting.
    ///
    /// Failing to bind is the only error surfaced to the caller; every
    /// later failure is confined to the connection it happened on.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.stopped {
            return Err(ServerError::Stopped);
        }
        if self.listener.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        let addr = self.config.listen_addr();
        let listener = TcpListener::bind((self.config.bind_address.as_str(), self.config.port))
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                error: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr,
            error: e.to_string(),
        })?;
        let listener = Arc::new(listener);

        let registry = spawn_registry(self.config.max_sessions);
        let dispatcher = Dispatcher::new(self.history.clone(), registry.clone());
        let ctx = ConnectionContext::new(dispatcher.clone(), self.cancel_token.clone(), &self.config);

        self.tracker.spawn(announce_departures(
            registry.subscribe(),
            dispatcher,
            self.cancel_token.clone(),
        ));
        self.tracker.spawn(accept_loop(
            Arc::clone(&listener),
            ctx,
            self.tracker.clone(),
        ));

        self.listener = Some(listener);
        self.registry = Some(registry);
        self.local_addr = Some(local_addr);

        info!(addr = %local_addr, max_sessions = self.config.max_sessions, "Chat server listening");
        Ok(local_addr)
    }

    /// Stops accepting, closes every session and waits for all tasks.
    ///
    /// The listener is released only after every task has exited. Calling
    /// this more than once, or before `start`, is harmless.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        info!("Server shutdown requested");
        self.cancel_token.cancel();

        if let Some(registry) = &self.registry {
            let closed = registry.close_all().await;
            debug!(closed = closed, "Closed sessions");
        }

        self.tracker.close();
        self.tracker.wait().await;

        self.registry = None;
        if self.listener.take().is_some() {
            info!(history = self.history.len().await, "Chat server stopped");
        }
    }

    /// Starts, runs until `shutdown` resolves, then stops.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await;
        Ok(())
    }
}

impl Drop for ChatServer {
    fn drop(&mut self) {
        // Tasks cannot be awaited here; make sure they at least wind down.
        self.cancel_token.cancel();
    }
}

/// Accepts connections until cancelled, one handler task per connection.
async fn accept_loop(listener: Arc<TcpListener>, ctx: ConnectionContext, tracker: TaskTracker) {
    let mut next_id: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel_token.cancelled() => {
                debug!("Accept loop shutting down");
                break;
            }

            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        next_id += 1;
                        let id = SessionId::new(next_id);
                        debug!(session = %id, peer = %peer, "Accepted connection");

                        let handler = ConnectionHandler::new(stream, id, ctx.clone());
                        tracker.spawn(handler.run());
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        // Continue accepting other connections
                        sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }
}

/// Turns registry `Left` events into leave notices.
async fn announce_departures(
    mut events: broadcast::Receiver<RegistryEvent>,
    dispatcher: Dispatcher,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                debug!("Presence announcer shutting down");
                break;
            }

            result = events.recv() => {
                match result {
                    Ok(RegistryEvent::Left { name, reason, .. }) if reason.is_announced() => {
                        dispatcher.publish(Message::leave_notice(&name)).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Presence announcer lagged, skipped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Registry event channel closed");
                        break;
                    }
                }
            }
        }
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Server already started")]
    AlreadyStarted,

    #[error("Server has been stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:80".to_string(),
            error: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("0.0.0.0:80"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut server = ChatServer::new(ServerConfig::local_ephemeral());
        server.start().await.unwrap();

        assert!(matches!(server.start().await, Err(ServerError::AlreadyStarted)));
        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut server = ChatServer::new(ServerConfig::local_ephemeral());
        server.start().await.unwrap();
        assert!(server.is_running());

        server.stop().await;
        server.stop().await;

        assert!(!server.is_running());
        assert!(server.registry().is_none());
        assert!(matches!(server.start().await, Err(ServerError::Stopped)));
    }

    #[tokio::test]
    async fn test_stop_before_start_is_harmless() {
        let mut server = ChatServer::new(ServerConfig::local_ephemeral());
        server.stop().await;
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let mut first = ChatServer::new(ServerConfig::local_ephemeral());
        let addr = first.start().await.unwrap();

        let mut config = ServerConfig::local_ephemeral();
        config.port = addr.port();
        let mut second = ChatServer::new(config);

        assert!(matches!(second.start().await, Err(ServerError::Bind { .. })));
        first.stop().await;
    }
}
