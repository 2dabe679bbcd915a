//! Session state types.

use crate::constants::DEFAULT_DATABASE;

/// Lifecycle state of one logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial TCP connect in progress.
    Connecting,
    /// Live transport, queue drained, accepting traffic.
    Ready,
    /// Transport lost, reconnect attempts in flight.
    Reconnecting,
    /// Fresh transport established, session commands being replayed.
    Replaying,
    /// Explicitly abandoned by the caller; terminal.
    Closed,
}

impl ConnectionState {
    /// True only when the connection is fully established and draining traffic.
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }

    /// True once the caller has abandoned the connection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

/// Per-connection session state: the pair that must be re-established after
/// any transport loss for command behavior to remain consistent.
///
/// Both fields hold the last *successfully acknowledged* values only. A
/// rejected AUTH or SELECT leaves them untouched; callers of
/// [`SessionState::store_credential`] / [`SessionState::store_database`] must
/// have seen the server's acknowledgment first.
#[derive(Debug, Default)]
pub struct SessionState {
    credential: Option<String>,
    database: u32,
}

impl SessionState {
    /// Fresh session: no credential, default database.
    pub fn new() -> Self {
        Self {
            credential: None,
            database: DEFAULT_DATABASE,
        }
    }

    /// The acknowledged credential, if any.
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    /// The acknowledged database index.
    pub fn database(&self) -> u32 {
        self.database
    }

    /// Store a credential the server has acknowledged.
    pub fn store_credential(&mut self, secret: String) {
        self.credential = Some(secret);
    }

    /// Store a database index the server has acknowledged.
    pub fn store_database(&mut self, index: u32) {
        self.database = index;
    }

    /// Deliberate logout: reset both fields to their defaults.
    pub fn clear(&mut self) {
        self.credential = None;
        self.database = DEFAULT_DATABASE;
    }

    /// Whether a fresh transport needs session commands replayed onto it.
    pub fn needs_replay(&self) -> bool {
        self.credential.is_some() || self.database != DEFAULT_DATABASE
    }

    /// Read-only copy for observation and replay.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            credential: self.credential.clone(),
            database: self.database,
        }
    }
}

/// Read-only view of a session, exposed for verification; never a mutation
/// path back into the connection.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// The acknowledged credential, if any.
    pub credential: Option<String>,
    /// The acknowledged database index.
    pub database: u32,
}

impl std::fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field(
                "credential",
                &self.credential.as_ref().map(|_| "[REDACTED]"),
            )
            .field("database", &self.database)
            .finish()
    }
}
