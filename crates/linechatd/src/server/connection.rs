//! Connection handler for individual client connections.
//!
//! Each accepted connection gets its own `ConnectionHandler` that:
//! - Prompts for a name and negotiates it with the registry
//! - Runs the read loop, turning lines into broadcasts or command replies
//! - Tears the session down exactly once when the loop ends
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::sync::Arc;
use std::time::Duration;

use linechat_core::{ChatName, Message, SessionId, SessionState};
use linechat_protocol::{
    help_text, strip_line_terminators, users_text, ClientLine, Command, NAME_PROMPT,
    NAME_TAKEN_NOTICE, SERVER_FULL_NOTICE,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatcher::{AdmitError, Dispatcher};
use super::session::{SendError, Session, SessionHandle};
use crate::config::ServerConfig;
use crate::registry::{RegistryError, RemovalReason};

/// Everything a handler needs from the server, shared by all connections.
#[derive(Clone)]
pub struct ConnectionContext {
    pub dispatcher: Dispatcher,
    pub cancel_token: CancellationToken,
    pub handshake_timeout: Duration,
    pub write_timeout: Duration,
    pub max_line_length: usize,
}

impl ConnectionContext {
    pub fn new(dispatcher: Dispatcher, cancel_token: CancellationToken, config: &ServerConfig) -> Self {
        Self {
            dispatcher,
            cancel_token,
            handshake_timeout: config.handshake_timeout(),
            write_timeout: config.write_timeout(),
            max_line_length: config.max_line_length,
        }
    }
}

/// Connection handler for a single client.
pub struct ConnectionHandler {
    id: SessionId,

    /// Buffered reader for incoming lines
    reader: BufReader<OwnedReadHalf>,

    /// Write half until the handshake hands it to the `Session`
    writer: Option<OwnedWriteHalf>,

    ctx: ConnectionContext,

    state: SessionState,
}

impl ConnectionHandler {
    pub fn new(stream: TcpStream, id: SessionId, ctx: ConnectionContext) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            id,
            reader: BufReader::new(reader),
            writer: Some(writer),
            ctx,
            state: SessionState::Connecting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the connection to completion.
    ///
    /// Returns the final state, which is always `Closed`.
    pub async fn run(mut self) -> SessionState {
        debug!(session = %self.id, "New connection");

        let session = match self.negotiate().await {
            Ok(session) => session,
            Err(e) => {
                match &e {
                    ConnectionError::NameTaken(name) => {
                        info!(session = %self.id, name = %name, "Rejected duplicate name")
                    }
                    ConnectionError::RegistryFull { max } => {
                        warn!(session = %self.id, max = *max, "Rejected connection, server full")
                    }
                    ConnectionError::Eof | ConnectionError::Cancelled => {
                        debug!(session = %self.id, error = %e, "Handshake abandoned")
                    }
                    _ => debug!(session = %self.id, error = %e, "Handshake failed"),
                }
                self.transition(SessionState::Closing);
                self.transition(SessionState::Closed);
                return self.state;
            }
        };

        self.transition(SessionState::Active);
        info!(name = %session.name(), session = %self.id, "Participant joined");

        let reason = self.read_loop(&session).await;

        self.transition(SessionState::Closing);
        // Removal clears the alive flag in the same actor step
        let removed = match reason {
            Some(reason) => {
                self.ctx
                    .dispatcher
                    .registry()
                    .remove(session.name().clone(), self.id, reason)
                    .await
            }
            None => false,
        };
        if !removed {
            session.close();
        }
        session.release().await;
        self.transition(SessionState::Closed);

        match reason {
            Some(reason) => {
                info!(name = %session.name(), session = %self.id, reason = %reason, "Participant left")
            }
            None => info!(name = %session.name(), session = %self.id, "Participant removed"),
        }
        self.state
    }

    // ========================================================================
    // Handshake
    // ========================================================================

    /// Prompts for a name and registers it.
    ///
    /// On success the write half has moved into the returned session. On
    /// failure the write half is dropped (closing the connection) after any
    /// rejection notice has been sent.
    async fn negotiate(&mut self) -> Result<SessionHandle, ConnectionError> {
        self.transition(SessionState::Negotiating);

        let mut writer = self.writer.take().ok_or(ConnectionError::Eof)?;
        write_bounded(&mut writer, NAME_PROMPT, self.ctx.write_timeout).await?;

        let name = tokio::select! {
            biased;
            _ = self.ctx.cancel_token.cancelled() => return Err(ConnectionError::Cancelled),
            result = timeout(
                self.ctx.handshake_timeout,
                read_line(&mut self.reader, self.ctx.max_line_length),
            ) => match result {
                Ok(line) => ChatName::new(line?),
                Err(_) => return Err(ConnectionError::HandshakeTimeout(self.ctx.handshake_timeout)),
            },
        };
        debug!(session = %self.id, name = %name, "Received name");

        let session = Arc::new(Session::new(
            self.id,
            name.clone(),
            writer,
            self.ctx.cancel_token.child_token(),
            self.ctx.write_timeout,
        ));

        let admitted = if name.is_reserved() {
            Err(AdmitError::Registry(RegistryError::NameTaken(name)))
        } else {
            self.ctx.dispatcher.admit(&session).await
        };

        match admitted {
            Ok(()) => Ok(session),
            Err(e) => {
                let err = ConnectionError::from(e);
                if let Some(notice) = err.rejection_notice() {
                    // Best effort: the connection is closing either way
                    let _ = session.send(notice).await;
                }
                session.close();
                session.release().await;
                Err(err)
            }
        }
    }

    // ========================================================================
    // Read loop
    // ========================================================================

    /// Processes lines until the session ends.
    ///
    /// Returns why the session should be removed, or `None` if someone
    /// else already removed it (failed broadcast, server shutdown).
    async fn read_loop(&mut self, session: &SessionHandle) -> Option<RemovalReason> {
        loop {
            let result = tokio::select! {
                biased;
                _ = self.ctx.cancel_token.cancelled() => return Some(RemovalReason::Shutdown),
                _ = session.closed() => return None,
                result = read_line(&mut self.reader, self.ctx.max_line_length) => result,
            };

            let line = match result {
                Ok(line) => line,
                Err(ConnectionError::Eof) => {
                    debug!(name = %session.name(), "Client sent EOF");
                    return Some(RemovalReason::Disconnected);
                }
                Err(e) => {
                    debug!(name = %session.name(), error = %e, "Read failed");
                    return Some(RemovalReason::ReadFailed);
                }
            };

            match ClientLine::parse(&line) {
                ClientLine::Empty => continue,
                ClientLine::Command(command) => {
                    if let Some(reason) = self.handle_command(session, command).await {
                        return Some(reason);
                    }
                }
                ClientLine::Chat(text) => {
                    let message = Message::new(session.name().as_str(), text);
                    self.ctx.dispatcher.publish(message).await;
                }
            }
        }
    }

    /// Answers a command privately. Returns a removal reason if the
    /// command ends the session.
    async fn handle_command(
        &self,
        session: &SessionHandle,
        command: Command,
    ) -> Option<RemovalReason> {
        debug!(name = %session.name(), command = command.token(), "Command received");

        let reply = match command {
            Command::Help => help_text(),
            Command::Users => users_text(&self.ctx.dispatcher.registry().names().await),
            Command::Exit => return Some(RemovalReason::Exited),
        };

        match session.send(&reply).await {
            Ok(()) => None,
            Err(SendError::Closed) => None,
            Err(e) => {
                debug!(name = %session.name(), error = %e, "Failed to send reply");
                Some(RemovalReason::SendFailed)
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            warn!(session = %self.id, from = %self.state, to = %next, "Unexpected state transition");
        }
        debug!(session = %self.id, from = %self.state, to = %next, "Session state");
        self.state = next;
    }
}

/// Reads one line, without its terminator.
///
/// At most `max` bytes of content are accepted. A final line without a
/// terminator before EOF is still returned.
async fn read_line<R>(reader: &mut R, max: usize) -> Result<String, ConnectionError>
where
    R: AsyncBufRead + Unpin,
{
    // Room for the longest line plus "\r\n"
    let limit = u64::try_from(max.saturating_add(2)).unwrap_or(u64::MAX);

    let mut line = String::new();
    let bytes_read = reader
        .take(limit)
        .read_line(&mut line)
        .await
        .map_err(|e| ConnectionError::Io(e.to_string()))?;

    if bytes_read == 0 {
        return Err(ConnectionError::Eof);
    }

    let content = strip_line_terminators(&line);
    if content.len() > max || (!line.ends_with('\n') && bytes_read as u64 == limit) {
        return Err(ConnectionError::LineTooLong { max });
    }

    Ok(content.to_string())
}

/// Writes to a connection that has no session yet.
async fn write_bounded(
    writer: &mut OwnedWriteHalf,
    text: &str,
    limit: Duration,
) -> Result<(), ConnectionError> {
    match timeout(limit, writer.write_all(text.as_bytes())).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::Send(SendError::Timeout(limit))),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection closed")]
    Eof,

    #[error("Server shutting down")]
    Cancelled,

    #[error("No name received within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Line too long (max: {max} bytes)")]
    LineTooLong { max: usize },

    #[error("Name already taken: {0}")]
    NameTaken(ChatName),

    #[error("Server full (max: {max} sessions)")]
    RegistryFull { max: usize },

    #[error("Registry error: {0}")]
    Registry(RegistryError),

    #[error("Send error: {0}")]
    Send(SendError),
}

impl ConnectionError {
    /// Final line to send before closing, if this error has one.
    pub fn rejection_notice(&self) -> Option<&'static str> {
        match self {
            ConnectionError::NameTaken(_) => Some(NAME_TAKEN_NOTICE),
            ConnectionError::RegistryFull { .. } => Some(SERVER_FULL_NOTICE),
            _ => None,
        }
    }
}

impl From<AdmitError> for ConnectionError {
    fn from(err: AdmitError) -> Self {
        match err {
            AdmitError::Registry(RegistryError::NameTaken(name)) => ConnectionError::NameTaken(name),
            AdmitError::Registry(RegistryError::RegistryFull { max }) => {
                ConnectionError::RegistryFull { max }
            }
            AdmitError::Registry(other) => ConnectionError::Registry(other),
            AdmitError::Send(e) => ConnectionError::Send(e),
        }
    }
}
