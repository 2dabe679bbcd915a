//! Session state management for redq.
//!
//! This module provides:
//! - Per-connection session state (credential, selected database)
//! - Connection lifecycle states
//! - Reconnect backoff policy

mod reconnect;
mod state;

pub use reconnect::ReconnectPolicy;
pub use state::{ConnectionState, SessionSnapshot, SessionState};
