//! redq-client: a session-aware, reconnecting Redis client.
//!
//! The [`Connection`] handle owns one logical connection: it remembers the
//! acknowledged credential and selected database, detects transport loss,
//! re-establishes an equivalent session on a fresh transport, and queues
//! commands submitted while no transport is live so callers observe latency
//! rather than failure.

pub mod config;
pub mod connection;

mod dispatcher;
mod reconnect;

pub use config::ClientConfig;
pub use connection::Connection;

// Re-exports so callers only need this crate for common usage.
pub use redq_core::protocol::{Command, RespValue};
pub use redq_core::session::{ConnectionState, SessionSnapshot};
pub use redq_core::{Error, Result};
