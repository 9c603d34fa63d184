//! linechat Protocol - Wire protocol for the chat server
//!
//! The protocol is newline-delimited UTF-8 text over a TCP stream:
//!
//! ```text
//! server: Enter your username:
//! client: alice
//! server: Welcome to the chat server, alice!
//! server: [12:00:01] bob: earlier message      (history replay)
//! server: [12:00:05] Server: alice has joined the chat
//! client: hello
//! server: [12:00:09] alice: hello               (broadcast to everyone)
//! ```
//!
//! This crate provides the server-to-client texts (`message`) and the
//! classification of client-to-server lines (`parse`).

pub mod message;
pub mod parse;

pub use message::{
    help_text, render_line, users_text, welcome, NAME_PROMPT, NAME_TAKEN_NOTICE,
    SERVER_FULL_NOTICE,
};
pub use parse::{strip_line_terminators, ClientLine, Command};
