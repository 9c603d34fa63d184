//! Broadcast fan-out and the join sequence.
//!
//! Both operations take the history write lock around "append" and
//! "copy recipients" so that every message is delivered either live or in
//! a joiner's replay, never both and never neither. Sends happen after
//! that lock is released; a slow participant only ever delays itself
//! (bounded by the write timeout), never the registry or the history.

use std::sync::Arc;

use linechat_core::Message;
use linechat_protocol::{render_line, welcome};
use tracing::{debug, warn};

use super::session::{SendError, SessionHandle};
use crate::history::History;
use crate::registry::{RegistryError, RegistryHandle, RemovalReason};

/// Delivers messages to every registered session.
#[derive(Clone)]
pub struct Dispatcher {
    history: History,
    registry: RegistryHandle,
}

impl Dispatcher {
    pub fn new(history: History, registry: RegistryHandle) -> Self {
        Self { history, registry }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Appends `message` to the history, then sends it to every live
    /// session (the author included).
    ///
    /// Returns the number of sessions that received it.
    pub async fn publish(&self, message: Message) -> usize {
        let line = render_line(&message);

        let recipients = {
            let mut log = self.history.write().await;
            log.push(message);
            self.registry.recipients().await
        };

        self.deliver(&line, recipients).await
    }

    /// Registers `session` and brings it up to date.
    ///
    /// Under the history lock: claim the name, copy the replay, append the
    /// join notice and copy the recipients, then take the joiner's send
    /// lock before letting go. The joiner therefore receives the welcome
    /// line and the full replay before any live line, and the join notice
    /// reaches it live rather than in the replay.
    ///
    /// # Errors
    ///
    /// - `AdmitError::Registry` if the name could not be claimed; nothing
    ///   was appended and nobody was notified
    /// - `AdmitError::Send` if the welcome or replay could not be written;
    ///   the join notice has still been delivered to everyone else and the
    ///   session has already been removed again
    pub async fn admit(&self, session: &SessionHandle) -> Result<(), AdmitError> {
        let notice = Message::join_notice(session.name());
        let notice_line = render_line(&notice);

        let (replay, recipients, mut writer) = {
            let mut log = self.history.write().await;
            self.registry.try_add(Arc::clone(session)).await?;

            let replay = log.clone();
            log.push(notice);
            let recipients = self.registry.recipients().await;
            let writer = session.lock_writer().await;
            (replay, recipients, writer)
        };

        let mut lines = Vec::with_capacity(replay.len() + 1);
        lines.push(welcome(session.name()));
        lines.extend(replay.iter().map(render_line));

        let replayed = writer.write_all(&lines).await;
        drop(writer);

        if let Err(e) = replayed {
            debug!(
                name = %session.name(),
                session = %session.id(),
                error = %e,
                "Failed to send welcome and replay"
            );
            // The notice is already in the history; everyone else still sees it
            let others = recipients
                .into_iter()
                .filter(|r| r.id() != session.id())
                .collect();
            self.deliver(&notice_line, others).await;
            self.registry
                .remove(session.name().clone(), session.id(), RemovalReason::SendFailed)
                .await;
            return Err(AdmitError::Send(e));
        }

        debug!(
            name = %session.name(),
            session = %session.id(),
            replayed = replay.len(),
            "Replay sent"
        );

        self.deliver(&notice_line, recipients).await;
        Ok(())
    }

    /// Sends one rendered line to each recipient in turn.
    ///
    /// A failed recipient is removed from the registry; the rest still get
    /// the line.
    async fn deliver(&self, line: &str, recipients: Vec<SessionHandle>) -> usize {
        let mut delivered = 0;
        let mut failed = Vec::new();

        for session in recipients {
            match session.send(line).await {
                Ok(()) => delivered += 1,
                Err(SendError::Closed) => {
                    debug!(name = %session.name(), "Skipping closed session");
                    failed.push(session);
                }
                Err(e) => {
                    warn!(
                        name = %session.name(),
                        session = %session.id(),
                        error = %e,
                        "Failed to deliver message"
                    );
                    failed.push(session);
                }
            }
        }

        for session in failed {
            self.registry
                .remove(session.name().clone(), session.id(), RemovalReason::SendFailed)
                .await;
        }

        delivered
    }
}

/// Errors from [`Dispatcher::admit`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmitError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Failed to send replay: {0}")]
    Send(SendError),
}
