//! Network infrastructure: the remote event listener.
//!
//! Phones and browsers on the local network drive the player by issuing
//! plain `GET /Type/Key/Value/Sequence` requests; [`listener`] accepts them
//! and forwards the decoded events to the event multiplexer.

pub mod listener;

pub use listener::{ListenerError, RemoteEventListener};
