//! Client configuration.

use std::time::Duration;

use redq_core::constants::{
    DEFAULT_BACKOFF_INITIAL, DEFAULT_BACKOFF_MAX, DEFAULT_CONNECT_TIMEOUT,
};

/// Configuration for one logical connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Whether transport loss triggers automatic reconnection.
    pub reconnect_enabled: bool,
    /// Initial delay between reconnect attempts.
    pub backoff_initial: Duration,
    /// Cap on the reconnect backoff delay.
    pub backoff_max: Duration,
    /// Per-command bound on waiting for a response, including time spent
    /// queued during a reconnect window. `None` waits indefinitely.
    pub command_timeout: Option<Duration>,
    /// Bound on establishing a TCP connection.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_enabled: true,
            backoff_initial: DEFAULT_BACKOFF_INITIAL,
            backoff_max: DEFAULT_BACKOFF_MAX,
            command_timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable automatic reconnection.
    pub fn with_reconnect(mut self, enabled: bool) -> Self {
        self.reconnect_enabled = enabled;
        self
    }

    /// Set the reconnect backoff bounds.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff_initial = initial;
        self.backoff_max = max;
        self
    }

    /// Bound how long a command may wait for its response.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Set the TCP connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
