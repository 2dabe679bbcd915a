//! The connection task: single owner of the socket and all dispatch state.
//!
//! Callers submit commands over a channel; the task writes them in
//! submission order and matches replies strictly FIFO to the order commands
//! were written. A per-transport reader task feeds decoded replies and the
//! closure event back over an event channel, tagged with the transport
//! generation so events from a stale handle are ignored.
//!
//! While no transport is live, submissions accumulate in a queue; they are
//! only failed on explicit abandonment (or by the caller's own command
//! timeout). In-flight commands, by contrast, fail immediately when the
//! transport closes: their fate on the wire is unknowable.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use redq_core::constants::EVENT_CHANNEL_CAPACITY;
use redq_core::error::{Error, Result};
use redq_core::protocol::{Command, RespValue};
use redq_core::session::ConnectionState;
use redq_core::transport::{CloseCause, Transport, TransportReader, TransportWriter};

use crate::config::ClientConfig;
use crate::connection::{write_lock, Shared};

/// A caller request to the connection task.
pub(crate) enum Submission {
    /// Dispatch a command.
    Command(QueuedCommand),
    /// Abandon the connection.
    Close,
}

/// How a successful reply affects the session.
pub(crate) enum CommandKind {
    /// No session effect.
    Plain,
    /// Store this credential once acknowledged.
    Auth(String),
    /// Store this database index once acknowledged.
    Select(u32),
}

/// A submitted command, from submission until its reply resolves.
pub(crate) struct QueuedCommand {
    pub(crate) command: Command,
    pub(crate) kind: CommandKind,
    pub(crate) reply: oneshot::Sender<Result<RespValue>>,
    pub(crate) enqueued_at: Instant,
}

/// An in-flight call awaiting its reply, matched FIFO.
struct PendingCall {
    kind: CommandKind,
    reply: oneshot::Sender<Result<RespValue>>,
}

/// Events from the per-transport reader task.
pub(crate) enum TransportEvent {
    /// A decoded reply.
    Reply { generation: u64, value: RespValue },
    /// The transport closed. Sent exactly once per reader.
    Closed { generation: u64, cause: CloseCause },
}

/// Whether the current transport survived handling an event or submission.
#[derive(PartialEq)]
pub(crate) enum TaskFlow {
    Continue,
    Lost,
}

pub(crate) struct ConnectionTask {
    pub(crate) addr: String,
    pub(crate) config: ClientConfig,
    pub(crate) shared: Arc<Shared>,
    pub(crate) submissions: mpsc::Receiver<Submission>,
    pub(crate) events: mpsc::Receiver<TransportEvent>,
    pub(crate) events_tx: mpsc::Sender<TransportEvent>,
    pub(crate) writer: Option<TransportWriter>,
    pub(crate) reader_task: Option<JoinHandle<()>>,
    pub(crate) generation: u64,
    pending: VecDeque<PendingCall>,
    pub(crate) queue: VecDeque<QueuedCommand>,
}

impl ConnectionTask {
    /// Build the task around an already-open transport.
    pub(crate) fn new(
        addr: String,
        config: ClientConfig,
        shared: Arc<Shared>,
        submissions: mpsc::Receiver<Submission>,
        transport: Transport,
    ) -> Self {
        let (events_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let generation = transport.generation();
        let (reader, writer) = transport.into_split();
        let reader_task = spawn_reader(reader, events_tx.clone(), Arc::clone(&shared));

        Self {
            addr,
            config,
            shared,
            submissions,
            events,
            events_tx,
            writer: Some(writer),
            reader_task: Some(reader_task),
            generation,
            pending: VecDeque::new(),
            queue: VecDeque::new(),
        }
    }

    /// Main loop. Runs until the caller abandons the connection or transport
    /// loss is terminal (reconnection disabled).
    pub(crate) async fn run(mut self) {
        loop {
            let flow = tokio::select! {
                submission = self.submissions.recv() => match submission {
                    Some(Submission::Command(cmd)) => self.dispatch(cmd).await,
                    // Channel closure means every handle was dropped.
                    Some(Submission::Close) | None => {
                        self.shutdown().await;
                        return;
                    }
                },
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    // Unreachable: we hold a sender ourselves.
                    None => TaskFlow::Continue,
                },
            };

            if flow == TaskFlow::Lost && !self.recover().await {
                self.shutdown().await;
                return;
            }
        }
    }

    /// Dispatch one submission: write it if a transport is live, queue it
    /// otherwise.
    async fn dispatch(&mut self, cmd: QueuedCommand) -> TaskFlow {
        if cmd.reply.is_closed() {
            // Cancelled before it was ever written.
            return TaskFlow::Continue;
        }
        if self.writer.is_none() {
            debug!(command = cmd.command.name(), "no transport, queueing command");
            self.queue.push_back(cmd);
            return TaskFlow::Continue;
        }
        if self.write_command(cmd).await {
            TaskFlow::Continue
        } else {
            self.on_transport_lost(CloseCause::IoFailure).await;
            TaskFlow::Lost
        }
    }

    /// Write one command and register its pending call.
    ///
    /// Returns false when the write fails; the command itself is resolved
    /// with a transport error (it may have partially reached the wire).
    pub(crate) async fn write_command(&mut self, cmd: QueuedCommand) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            self.queue.push_back(cmd);
            return true;
        };
        match writer.send(&cmd.command).await {
            Ok(bytes) => {
                write_lock(&self.shared.metrics).record_command(bytes);
                self.pending.push_back(PendingCall {
                    kind: cmd.kind,
                    reply: cmd.reply,
                });
                true
            }
            Err(e) => {
                warn!(command = cmd.command.name(), error = %e, "write failed");
                let _ = cmd.reply.send(Err(Error::Transport {
                    message: format!("write failed: {}", e),
                }));
                false
            }
        }
    }

    async fn handle_event(&mut self, event: TransportEvent) -> TaskFlow {
        match event {
            TransportEvent::Reply { generation, value } => {
                if generation != self.generation {
                    return TaskFlow::Continue;
                }
                self.resolve_reply(value);
                TaskFlow::Continue
            }
            TransportEvent::Closed { generation, cause } => {
                if generation != self.generation {
                    debug!(generation, "ignoring closure of stale transport");
                    return TaskFlow::Continue;
                }
                self.on_transport_lost(cause).await;
                TaskFlow::Lost
            }
        }
    }

    /// Match a reply to the oldest pending call and resolve it.
    fn resolve_reply(&mut self, value: RespValue) {
        write_lock(&self.shared.metrics).record_reply();
        let Some(call) = self.pending.pop_front() else {
            warn!("reply with no pending call");
            return;
        };

        let result = match value {
            RespValue::Error(message) => Err(Error::ServerRejection { message }),
            value => Ok(value),
        };

        // Session state moves only on acknowledged success.
        if result.is_ok() {
            match &call.kind {
                CommandKind::Auth(secret) => {
                    write_lock(&self.shared.session).store_credential(secret.clone());
                    debug!("credential acknowledged");
                }
                CommandKind::Select(index) => {
                    write_lock(&self.shared.session).store_database(*index);
                    debug!(database = index, "database selection acknowledged");
                }
                CommandKind::Plain => {}
            }
        }

        let _ = call.reply.send(result);
    }

    /// Tear down the current transport: fail in-flight calls, keep the
    /// queue. Idempotent for one generation.
    pub(crate) async fn on_transport_lost(&mut self, cause: CloseCause) {
        info!(generation = self.generation, cause = %cause, "transport lost");
        self.writer = None;
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        for call in self.pending.drain(..) {
            let _ = call.reply.send(Err(Error::Transport {
                message: format!("connection closed: {}", cause),
            }));
        }
    }

    /// Write out the waiting queue in submission order.
    ///
    /// Returns false if the transport dies mid-drain; the remaining queue is
    /// kept for the next cycle.
    pub(crate) async fn drain_queue(&mut self) -> bool {
        while let Some(cmd) = self.queue.pop_front() {
            if cmd.reply.is_closed() {
                debug!(
                    command = cmd.command.name(),
                    "dropping cancelled queued command"
                );
                continue;
            }
            debug!(
                command = cmd.command.name(),
                queued_ms = cmd.enqueued_at.elapsed().as_millis() as u64,
                "draining queued command"
            );
            if !self.write_command(cmd).await {
                return false;
            }
        }
        true
    }

    /// Abandonment: terminal. Fails every queued command and any submission
    /// still buffered in the channel with `ConnectionClosed`.
    async fn shutdown(&mut self) {
        self.shared.set_state(ConnectionState::Closed);
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await;
        }
        info!(cause = %CloseCause::LocalClose, "connection abandoned");

        for call in self.pending.drain(..) {
            let _ = call.reply.send(Err(Error::ConnectionClosed));
        }
        for cmd in self.queue.drain(..) {
            let _ = cmd.reply.send(Err(Error::ConnectionClosed));
        }

        self.submissions.close();
        while let Some(submission) = self.submissions.recv().await {
            if let Submission::Command(cmd) = submission {
                let _ = cmd.reply.send(Err(Error::ConnectionClosed));
            }
        }
    }
}

/// Spawn the reader for one transport generation.
///
/// Emits `Reply` events until the stream ends, then exactly one `Closed`
/// event carrying the cause, and exits.
pub(crate) fn spawn_reader(
    mut reader: TransportReader,
    events: mpsc::Sender<TransportEvent>,
    shared: Arc<Shared>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let generation = reader.generation();
        let mut seen_bytes = 0u64;
        loop {
            match reader.read_value().await {
                Ok(Some(value)) => {
                    let total = reader.bytes_read();
                    write_lock(&shared.metrics).record_bytes_recv(total - seen_bytes);
                    seen_bytes = total;
                    if events
                        .send(TransportEvent::Reply { generation, value })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(None) => {
                    let _ = events
                        .send(TransportEvent::Closed {
                            generation,
                            cause: CloseCause::RemoteClose,
                        })
                        .await;
                    return;
                }
                Err(e) => {
                    debug!(generation, error = %e, "reader failed");
                    let _ = events
                        .send(TransportEvent::Closed {
                            generation,
                            cause: CloseCause::IoFailure,
                        })
                        .await;
                    return;
                }
            }
        }
    })
}
