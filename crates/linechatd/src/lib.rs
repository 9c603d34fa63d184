//! linechat Daemon - Name registry, history and broadcast server
//!
//! This crate provides the core infrastructure for the chat daemon:
//! - `registry` - Name registry actor tracking connected participants
//! - `history` - Append-only log of every message since start
//! - `server` - TCP acceptor, per-connection handlers and broadcast
//! - `config` - Server settings loaded from TOML and CLI overrides
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      linechatd                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   ChatServer    │────▶│     RegistryActor           │   │
//! │  │ (TCP acceptor)  │     │  (name → session owner)     │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ connections                 │ Left events       │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionHandler│────▶│  Dispatcher + History       │   │
//! │  │  (per client)   │     │  (append, then fan out)     │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod history;
pub mod registry;
pub mod server;

pub use config::{ConfigError, ServerConfig};
pub use history::History;
pub use server::{ChatServer, ServerError};
