//! redq-core: Shared library for the redq Redis client.
//!
//! This crate provides:
//! - RESP2 wire codec and command/reply types
//! - Scalar double encoding (wire-exact `+inf` / `-inf` handling)
//! - Session state (credential, selected database) and reconnect policy
//! - TCP transport with explicit lifecycle states
//! - Error taxonomy, logging and metrics

pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat};
pub use metrics::ConnectionMetrics;
