//! Shared per-participant state: identity, liveness and the send path.
//!
//! A `Session` is created once the handshake has produced a name. The
//! registry and in-flight broadcasts hold `Arc` clones of it; the
//! connection handler that created it owns the read side and is the only
//! one that releases the connection.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use linechat_core::{ChatName, SessionId};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Boxed write half so sessions can sit on any transport.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared handle to a session.
pub type SessionHandle = Arc<Session>;

/// One connected participant, as seen by everyone who may write to it.
pub struct Session {
    id: SessionId,
    name: ChatName,

    /// Write half, serialised by the per-session send lock
    writer: Mutex<BufWriter<BoxedWriter>>,

    /// True from creation until the session is closed, exactly once
    alive: AtomicBool,

    /// Set once the connection has been shut down
    released: AtomicBool,

    /// Cancelled when the session is closed; wakes the read loop
    closing: CancellationToken,

    /// Bound on a single write + flush
    write_timeout: Duration,
}

impl Session {
    /// Creates a live session.
    ///
    /// `closing` is usually a child of the server's shutdown token, so a
    /// server stop also wakes every session.
    pub fn new<W>(
        id: SessionId,
        name: ChatName,
        writer: W,
        closing: CancellationToken,
        write_timeout: Duration,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            name,
            writer: Mutex::new(BufWriter::new(Box::new(writer))),
            alive: AtomicBool::new(true),
            released: AtomicBool::new(false),
            closing,
            write_timeout,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &ChatName {
        &self.name
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Marks the session closed and wakes its read loop.
    ///
    /// Returns `true` only for the call that actually flipped the flag.
    pub fn close(&self) -> bool {
        let was_alive = self.alive.swap(false, Ordering::AcqRel);
        if was_alive {
            self.closing.cancel();
        }
        was_alive
    }

    /// Resolves once the session has been closed (or the server is stopping).
    pub async fn closed(&self) {
        self.closing.cancelled().await
    }

    /// Writes `text` verbatim under the send lock.
    ///
    /// Fails with `SendError::Closed` once the session is closed, so a
    /// broadcast racing a disconnect never touches a dead connection.
    pub async fn send(&self, text: &str) -> Result<(), SendError> {
        let mut writer = self.lock_writer().await;
        writer.write_all(&[text]).await
    }

    /// Takes the send lock for a multi-line write that must not be
    /// interleaved with other sends (the join replay).
    pub async fn lock_writer(&self) -> SessionWriter<'_> {
        SessionWriter {
            session: self,
            guard: self.writer.lock().await,
        }
    }

    /// Flushes and shuts down the write half. Only the first call does
    /// anything; later calls return immediately.
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close();

        let mut writer = self.writer.lock().await;
        let result = timeout(self.write_timeout, writer.shutdown()).await;
        match result {
            Ok(Ok(())) => debug!(name = %self.name, session = %self.id, "Connection released"),
            Ok(Err(e)) => {
                debug!(name = %self.name, session = %self.id, error = %e, "Shutdown failed")
            }
            Err(_) => debug!(name = %self.name, session = %self.id, "Shutdown timed out"),
        }
    }

    /// Returns true once `release` has run.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a session's connection.
pub struct SessionWriter<'a> {
    session: &'a Session,
    guard: MutexGuard<'a, BufWriter<BoxedWriter>>,
}

impl SessionWriter<'_> {
    /// Writes every chunk then flushes once, bounded by the write timeout.
    pub async fn write_all<S: AsRef<str>>(&mut self, chunks: &[S]) -> Result<(), SendError> {
        if !self.session.is_alive() {
            return Err(SendError::Closed);
        }

        let writer = &mut *self.guard;
        let result = timeout(self.session.write_timeout, async {
            for chunk in chunks {
                writer.write_all(chunk.as_ref().as_bytes()).await?;
            }
            writer.flush().await
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SendError::Io(e.to_string())),
            Err(_) => Err(SendError::Timeout(self.session.write_timeout)),
        }
    }
}

/// Errors that can occur when writing to a participant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Session is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Write timed out after {0:?}")]
    Timeout(Duration),
}
