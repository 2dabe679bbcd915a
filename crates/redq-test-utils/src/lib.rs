//! redq-test-utils: Test infrastructure for redq.
//!
//! Provides:
//! - MockRedisServer: in-process RESP2 server speaking a small command
//!   subset over real TCP, with forced-disconnect support

mod server;

pub use server::{MockRedisServer, MockServerConfig};
