//! Metrics collection for redq connections.
//!
//! Tracks command/reply counts, byte counters, and reconnection statistics
//! for one logical connection. Snapshots are serializable so callers can
//! export them.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Connection metrics tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    /// Total commands written to the transport.
    pub commands_sent: u64,
    /// Total replies decoded from the transport.
    pub replies_received: u64,
    /// Total bytes sent.
    pub bytes_sent: u64,
    /// Total bytes received.
    pub bytes_recv: u64,
    /// Number of completed reconnections.
    pub reconnect_count: u32,
    /// Connection start timestamp (not serialized, reset on deserialize).
    #[serde(skip, default = "Instant::now")]
    pub started_at: Instant,
}

impl Default for ConnectionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMetrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            commands_sent: 0,
            replies_received: 0,
            bytes_sent: 0,
            bytes_recv: 0,
            reconnect_count: 0,
            started_at: Instant::now(),
        }
    }

    /// Record a command written to the transport.
    pub fn record_command(&mut self, bytes: usize) {
        self.commands_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    /// Record a decoded reply.
    pub fn record_reply(&mut self) {
        self.replies_received += 1;
    }

    /// Record raw bytes received from the transport.
    pub fn record_bytes_recv(&mut self, bytes: u64) {
        self.bytes_recv += bytes;
    }

    /// Record a completed reconnection.
    pub fn record_reconnect(&mut self) {
        self.reconnect_count += 1;
    }

    /// Time since the connection was established.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_metrics_are_zeroed() {
        let m = ConnectionMetrics::new();
        assert_eq!(m.commands_sent, 0);
        assert_eq!(m.replies_received, 0);
        assert_eq!(m.bytes_sent, 0);
        assert_eq!(m.bytes_recv, 0);
        assert_eq!(m.reconnect_count, 0);
    }

    #[test]
    fn record_command_counts_bytes() {
        let mut m = ConnectionMetrics::new();
        m.record_command(14);
        m.record_command(20);
        assert_eq!(m.commands_sent, 2);
        assert_eq!(m.bytes_sent, 34);
    }

    #[test]
    fn record_reply_and_reconnect() {
        let mut m = ConnectionMetrics::new();
        m.record_reply();
        m.record_reconnect();
        m.record_bytes_recv(7);
        assert_eq!(m.replies_received, 1);
        assert_eq!(m.reconnect_count, 1);
        assert_eq!(m.bytes_recv, 7);
    }

    #[test]
    fn metrics_serialize_without_timestamp() {
        let mut m = ConnectionMetrics::new();
        m.record_command(10);
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"commands_sent\":1"));
        assert!(!json.contains("started_at"));
    }
}
