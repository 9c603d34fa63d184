//! linechat Core - Shared types for the linechat server
//!
//! This crate provides the domain types shared between the wire
//! protocol (linechat-protocol) and the daemon (linechatd).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod message;
pub mod session;

// Re-exports for convenience
pub use message::{Message, TIMESTAMP_FORMAT};
pub use session::{ChatName, SessionId, SessionState, SYSTEM_SENDER};
