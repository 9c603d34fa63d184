//! Append-only message history.
//!
//! The history lives for as long as the server does and is never
//! truncated. Readers always get a full copy taken under the lock, so a
//! concurrent append is either entirely visible or not at all.

use std::sync::Arc;

use linechat_core::Message;
use tokio::sync::{RwLock, RwLockWriteGuard};

/// Shared, cheap-to-clone handle to the conversation log.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Arc<RwLock<Vec<Message>>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message at the end.
    pub async fn append(&self, message: Message) {
        self.entries.write().await.push(message);
    }

    /// Returns a copy of every message stored so far, oldest first.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Exclusive access for compound operations that must not interleave
    /// with appends, such as "append and pick recipients" in the dispatcher.
    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, Vec<Message>> {
        self.entries.write().await
    }
}
