//! Name registry using Actor pattern.
//!
//! The registry is the single source of truth for which participants are
//! connected. It receives commands via a tokio mpsc channel and publishes
//! membership changes on a broadcast channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ConnectionHandler │────▶│  RegistryActor  │────▶│ Broadcast Channel│
//! └──────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                       │
//!         │   RegistryCommand     │   RegistryEvent       │
//!         │   (mpsc channel)      │   (broadcast)         │
//!         ▼                       ▼                       ▼
//!   TryAdd / Remove          HashMap<ChatName,      presence announcer
//!   Recipients              SessionHandle>        (leave notices)
//! ```
//!
//! Because the actor handles one command at a time, two joins racing for
//! the same name are serialised: exactly one `TryAdd` wins.

use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;

pub use actor::RegistryActor;
pub use commands::{RegistryCommand, RegistryError, RegistryEvent, RemovalReason};
pub use handle::RegistryHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 256;

/// Spawn the registry actor and return a handle for interaction.
///
/// The actor stops once every handle has been dropped, closing any
/// sessions still registered at that point.
///
/// # Example
///
/// ```no_run
/// use linechatd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(100);
///     assert_eq!(handle.count().await, 0);
/// }
/// ```
pub fn spawn_registry(max_sessions: usize) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone(), max_sessions);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}
