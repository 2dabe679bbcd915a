//! Protocol and configuration constants for redq.

use std::time::Duration;

// =============================================================================
// Protocol Constants
// =============================================================================

/// Logical database selected when a connection is first established.
pub const DEFAULT_DATABASE: u32 = 0;

/// Maximum bulk string payload size (512 MiB, the RESP protocol limit).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Maximum number of elements accepted in a single reply array.
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

// =============================================================================
// Timing Constants
// =============================================================================

/// Default initial delay between reconnect attempts.
pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_millis(50);

/// Default cap on the reconnect backoff delay.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(2);

/// Default timeout for establishing a TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Dispatch Constants
// =============================================================================

/// Capacity of the submission channel between callers and the connection task.
pub const SUBMISSION_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the transport event channel (decoded replies, closure events).
pub const EVENT_CHANNEL_CAPACITY: usize = 64;
