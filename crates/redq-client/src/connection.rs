//! The public connection handle.
//!
//! A [`Connection`] is a cheap clone over one logical connection. All
//! commands are funneled through a single connection task (see
//! `dispatcher`), which owns the socket and all dispatch state; that task is
//! the one mutual-exclusion domain for the session, so no two reconnect
//! attempts and no reconnect concurrent with a caller-issued AUTH/SELECT can
//! race on it.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, Notify};

use redq_core::constants::SUBMISSION_CHANNEL_CAPACITY;
use redq_core::error::{Error, Result};
use redq_core::metrics::ConnectionMetrics;
use redq_core::protocol::{Command, RespValue};
use redq_core::session::{ConnectionState, SessionSnapshot, SessionState};
use redq_core::transport::Transport;

use crate::config::ClientConfig;
use crate::dispatcher::{CommandKind, ConnectionTask, QueuedCommand, Submission};

// Helpers to use std locks without panicking on poison.
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// State shared between the handle and the connection task.
///
/// The task is the only writer of `state` and `session`; handles read
/// snapshots for observation.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) state: RwLock<ConnectionState>,
    pub(crate) session: RwLock<SessionState>,
    pub(crate) metrics: RwLock<ConnectionMetrics>,
    pub(crate) state_changed: Notify,
}

impl Shared {
    pub(crate) fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ConnectionState::Connecting),
            session: RwLock::new(SessionState::new()),
            metrics: RwLock::new(ConnectionMetrics::new()),
            state_changed: Notify::new(),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *read_lock(&self.state)
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *write_lock(&self.state) = state;
        self.state_changed.notify_waiters();
    }
}

/// Handle to one logical connection.
#[derive(Clone)]
pub struct Connection {
    submit_tx: mpsc::Sender<Submission>,
    shared: Arc<Shared>,
}

impl Connection {
    /// Connect to a server and spawn the connection task.
    ///
    /// Fails if the initial transport cannot be established; transport loss
    /// after this point is handled by automatic reconnection (unless
    /// disabled in `config`).
    pub async fn connect(addr: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let addr = addr.into();
        let shared = Arc::new(Shared::new(config.clone()));

        let transport = Transport::open(&addr, 1, config.connect_timeout).await?;

        let (submit_tx, submit_rx) = mpsc::channel(SUBMISSION_CHANNEL_CAPACITY);
        let task = ConnectionTask::new(addr, config, Arc::clone(&shared), submit_rx, transport);

        // Ready must be observable before the task runs: the task owns every
        // state transition from here on.
        shared.set_state(ConnectionState::Ready);
        tokio::spawn(task.run());

        Ok(Self { submit_tx, shared })
    }

    /// Authenticate this connection.
    ///
    /// An empty secret is rejected locally, before any network round-trip.
    /// On acknowledgment the secret becomes part of the session and is
    /// replayed after reconnects; a server rejection leaves the stored
    /// credential untouched.
    pub async fn auth(&self, secret: impl Into<String>) -> Result<()> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(Error::Validation {
                message: "credential must not be empty".into(),
            });
        }
        let command = Command::new("AUTH").arg(&secret);
        self.request(command, CommandKind::Auth(secret)).await?;
        Ok(())
    }

    /// Select a logical database.
    ///
    /// On acknowledgment the index becomes part of the session and is
    /// replayed after reconnects; a server rejection leaves the stored index
    /// untouched.
    pub async fn select(&self, index: u32) -> Result<()> {
        let command = Command::new("SELECT").arg(index.to_string());
        self.request(command, CommandKind::Select(index)).await?;
        Ok(())
    }

    /// Execute an arbitrary command.
    ///
    /// Error replies surface as [`Error::ServerRejection`] with the server's
    /// text verbatim.
    pub async fn execute(&self, command: Command) -> Result<RespValue> {
        self.request(command, CommandKind::Plain).await
    }

    /// PING the server.
    pub async fn ping(&self) -> Result<String> {
        let reply = self.execute(Command::new("PING")).await?;
        reply.into_string().ok_or_else(|| Error::Protocol {
            message: "unexpected PING reply".into(),
        })
    }

    /// ECHO a message.
    pub async fn echo(&self, message: impl AsRef<[u8]>) -> Result<String> {
        let reply = self.execute(Command::new("ECHO").arg(message)).await?;
        reply.into_string().ok_or_else(|| Error::Protocol {
            message: "unexpected ECHO reply".into(),
        })
    }

    /// SET a key.
    pub async fn set(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.execute(Command::new("SET").arg(key).arg(value)).await?;
        Ok(())
    }

    /// GET a key. `None` if the key does not exist.
    pub async fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<String>> {
        match self.execute(Command::new("GET").arg(key)).await? {
            RespValue::Null => Ok(None),
            value => match value.into_string() {
                Some(s) => Ok(Some(s)),
                None => Err(Error::Protocol {
                    message: "unexpected GET reply".into(),
                }),
            },
        }
    }

    /// DEL keys, returning how many existed.
    pub async fn del(&self, key: impl AsRef<[u8]>) -> Result<i64> {
        let reply = self.execute(Command::new("DEL").arg(key)).await?;
        reply.as_integer().ok_or_else(|| Error::Protocol {
            message: "unexpected DEL reply".into(),
        })
    }

    /// Ask the server to close the connection.
    ///
    /// The server acknowledges and then closes its end; the closure is an
    /// ordinary remote close, so with reconnection enabled the session is
    /// re-established transparently and subsequent commands succeed.
    pub async fn quit(&self) -> Result<()> {
        self.execute(Command::new("QUIT")).await?;
        Ok(())
    }

    /// Abandon the connection.
    ///
    /// Disables any further reconnection and fails every queued command with
    /// [`Error::ConnectionClosed`]. Terminal.
    pub async fn close(&self) {
        let _ = self.submit_tx.send(Submission::Close).await;
    }

    /// True only while the connection is established and draining traffic.
    pub fn is_open(&self) -> bool {
        self.shared.state().is_open()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Wait until the connection reaches `Ready`, bounded by `limit`.
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection is abandoned
    /// first, [`Error::Timeout`] if the bound elapses.
    pub async fn wait_ready(&self, limit: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            // Register with the Notify before checking state, so a
            // transition between the check and the await is not missed.
            let notified = self.shared.state_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.shared.state() {
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Closed => return Err(Error::ConnectionClosed),
                _ => {}
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(Error::Timeout);
            }
        }
    }

    /// Read-only snapshot of the session (credential, selected database).
    pub fn session(&self) -> SessionSnapshot {
        read_lock(&self.shared.session).snapshot()
    }

    /// Snapshot of the connection metrics.
    pub fn metrics(&self) -> ConnectionMetrics {
        read_lock(&self.shared.metrics).clone()
    }

    async fn request(&self, command: Command, kind: CommandKind) -> Result<RespValue> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let queued = QueuedCommand {
            command,
            kind,
            reply: reply_tx,
            enqueued_at: Instant::now(),
        };
        self.submit_tx
            .send(Submission::Command(queued))
            .await
            .map_err(|_| Error::ConnectionClosed)?;

        let response = match self.shared.config.command_timeout {
            Some(limit) => tokio::time::timeout(limit, reply_rx)
                .await
                .map_err(|_| Error::Timeout)?,
            None => reply_rx.await,
        };
        // A dropped reply sender means the task shut down before dispatch.
        response.map_err(|_| Error::ConnectionClosed)?
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.shared.state())
            .finish()
    }
}
