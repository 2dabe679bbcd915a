//! Reconnection and session replay.
//!
//! Runs inside the connection task, so at most one reconnect cycle can ever
//! be in flight and no cycle can race a caller-issued AUTH/SELECT. The cycle
//! separates three concerns:
//! - `Reconnecting`: re-open a transport under the backoff policy
//! - `Replaying`: re-issue session commands on the fresh transport
//! - `Ready`: release the waiting queue in original submission order
//!
//! A replay rejected by the server is surfaced as a log event only: stored
//! session state is never cleared by a failed replay, and the transition to
//! `Ready` is not blocked.

use std::time::Duration;

use tracing::{debug, info, warn};

use redq_core::constants::DEFAULT_DATABASE;
use redq_core::error::Result;
use redq_core::protocol::{Command, RespValue};
use redq_core::session::{ConnectionState, ReconnectPolicy};
use redq_core::transport::{CloseCause, Transport};

use crate::connection::{read_lock, write_lock};
use crate::dispatcher::{spawn_reader, ConnectionTask, Submission};

impl ConnectionTask {
    /// Run one reconnect cycle after transport loss.
    ///
    /// Returns true once the connection is `Ready` again, false when the
    /// connection must shut down instead (reconnection disabled, or the
    /// caller abandoned it mid-cycle).
    pub(crate) async fn recover(&mut self) -> bool {
        if !self.config.reconnect_enabled {
            info!("reconnection disabled, closing connection");
            return false;
        }

        self.shared.set_state(ConnectionState::Reconnecting);
        let mut policy = ReconnectPolicy::new(self.config.backoff_initial, self.config.backoff_max);

        loop {
            let delay = policy.next_delay();
            debug!(
                attempt = policy.attempt(),
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect attempt"
            );
            if self.wait_backoff(delay).await {
                return false;
            }

            self.generation += 1;
            let mut transport = match Transport::open(
                &self.addr,
                self.generation,
                self.config.connect_timeout,
            )
            .await
            {
                Ok(transport) => transport,
                Err(e) => {
                    debug!(attempt = policy.attempt(), error = %e, "reconnect attempt failed");
                    continue;
                }
            };

            self.shared.set_state(ConnectionState::Replaying);
            // Replay is part of establishing the connection; bound it the
            // same way as the connect itself.
            let replay = tokio::time::timeout(
                self.config.connect_timeout,
                self.replay_session(&mut transport),
            )
            .await;
            match replay {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "transport failed during session replay");
                    self.shared.set_state(ConnectionState::Reconnecting);
                    continue;
                }
                Err(_) => {
                    warn!("session replay timed out");
                    self.shared.set_state(ConnectionState::Reconnecting);
                    continue;
                }
            }

            let (reader, writer) = transport.into_split();
            self.writer = Some(writer);
            self.reader_task = Some(spawn_reader(
                reader,
                self.events_tx.clone(),
                self.shared.clone(),
            ));
            write_lock(&self.shared.metrics).record_reconnect();

            if !self.drain_queue().await {
                // Transport died while draining; the remaining queue is kept
                // for the next cycle.
                self.on_transport_lost(CloseCause::IoFailure).await;
                self.shared.set_state(ConnectionState::Reconnecting);
                continue;
            }

            self.shared.set_state(ConnectionState::Ready);
            info!(
                generation = self.generation,
                attempts = policy.attempt(),
                "reconnected"
            );
            return true;
        }
    }

    /// Sleep out one backoff delay while staying responsive to callers.
    ///
    /// Commands submitted during the delay are queued; returns true if the
    /// caller abandoned the connection.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                submission = self.submissions.recv() => match submission {
                    Some(Submission::Command(cmd)) => {
                        if !cmd.reply.is_closed() {
                            self.queue.push_back(cmd);
                        }
                    }
                    Some(Submission::Close) | None => return true,
                },
            }
        }
    }

    /// Re-issue session commands on a fresh transport, before any queued
    /// command is released.
    ///
    /// Only transport failures are errors here. A server rejection is logged
    /// and swallowed: stored state stays as-is and the connection still
    /// proceeds to `Ready`.
    async fn replay_session(&mut self, transport: &mut Transport) -> Result<()> {
        let snapshot = read_lock(&self.shared.session).snapshot();

        if let Some(secret) = snapshot.credential.as_deref() {
            let reply = self
                .replay_command(transport, Command::new("AUTH").arg(secret))
                .await?;
            match reply {
                RespValue::Error(message) => {
                    warn!(%message, "credential replay rejected, keeping stored session")
                }
                _ => debug!("credential replayed"),
            }
        }

        if snapshot.database != DEFAULT_DATABASE {
            let reply = self
                .replay_command(
                    transport,
                    Command::new("SELECT").arg(snapshot.database.to_string()),
                )
                .await?;
            match reply {
                RespValue::Error(message) => warn!(
                    %message,
                    database = snapshot.database,
                    "database replay rejected, keeping stored session"
                ),
                _ => debug!(database = snapshot.database, "database selection replayed"),
            }
        }

        Ok(())
    }

    async fn replay_command(
        &self,
        transport: &mut Transport,
        command: Command,
    ) -> Result<RespValue> {
        let bytes = transport.send(&command).await?;
        write_lock(&self.shared.metrics).record_command(bytes);
        let reply = transport.read_value().await?;
        write_lock(&self.shared.metrics).record_reply();
        Ok(reply)
    }
}
