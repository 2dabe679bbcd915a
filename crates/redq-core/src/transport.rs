//! TCP transport for one logical connection.
//!
//! A [`Transport`] owns a single byte-stream socket and moves through
//! `Connecting → Open → Closing → Closed`; no handle ever returns to `Open`,
//! reconnection always creates a new one. Handles carry a generation id so
//! closure events from a stale transport can be told apart from the live one.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::{Codec, Command, RespValue};

/// Lifecycle state of a transport handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// TCP connect in progress.
    Connecting,
    /// Handshake done, reads and writes are valid.
    Open,
    /// Close requested, socket not yet released.
    Closing,
    /// Socket released; terminal.
    Closed,
}

/// Why a transport handle closed. Reported exactly once per handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    /// The local side requested the close.
    LocalClose,
    /// The peer closed the stream.
    RemoteClose,
    /// An unrecoverable I/O error.
    IoFailure,
}

impl std::fmt::Display for CloseCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseCause::LocalClose => write!(f, "local close"),
            CloseCause::RemoteClose => write!(f, "remote close"),
            CloseCause::IoFailure => write!(f, "I/O failure"),
        }
    }
}

/// A live transport: one TCP socket plus its framing buffer.
#[derive(Debug)]
pub struct Transport {
    stream: TcpStream,
    read_buf: BytesMut,
    state: TransportState,
    generation: u64,
}

impl Transport {
    /// Open a transport to `addr`, bounded by `timeout`.
    pub async fn open(addr: &str, generation: u64, timeout: Duration) -> Result<Self> {
        let state = TransportState::Connecting;
        trace!(addr, generation, ?state, "opening transport");

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Transport {
                message: format!("connect to {} timed out", addr),
            })?
            .map_err(|e| Error::Transport {
                message: format!("connect to {} failed: {}", addr, e),
            })?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            state: TransportState::Open,
            generation,
        })
    }

    /// Generation id of this handle.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Write one command frame. Only valid while `Open`.
    pub async fn send(&mut self, cmd: &Command) -> Result<usize> {
        if self.state != TransportState::Open {
            return Err(Error::Transport {
                message: format!("send on {:?} transport", self.state),
            });
        }
        let frame = Codec::encode(cmd);
        self.stream.write_all(&frame).await?;
        Ok(frame.len())
    }

    /// Read one reply, treating end-of-stream as a transport failure.
    ///
    /// Used for the request/response exchanges that happen before the
    /// transport is split (session replay); once split, the reader half
    /// reports end-of-stream as a closure event instead.
    pub async fn read_value(&mut self) -> Result<RespValue> {
        loop {
            if let Some(value) = Codec::decode(&mut self.read_buf)? {
                return Ok(value);
            }
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                self.state = TransportState::Closed;
                return Err(Error::Transport {
                    message: "connection closed before reply".into(),
                });
            }
        }
    }

    /// Locally close the transport.
    pub async fn close(&mut self) {
        self.state = TransportState::Closing;
        let _ = self.stream.shutdown().await;
        self.state = TransportState::Closed;
        trace!(generation = self.generation, cause = %CloseCause::LocalClose, "transport closed");
    }

    /// Split into reader and writer halves for concurrent use.
    pub fn into_split(self) -> (TransportReader, TransportWriter) {
        let (read_half, write_half) = self.stream.into_split();
        (
            TransportReader {
                half: read_half,
                buf: self.read_buf,
                bytes_read: 0,
                generation: self.generation,
            },
            TransportWriter {
                half: write_half,
                generation: self.generation,
            },
        )
    }
}

/// Read half of a split transport.
#[derive(Debug)]
pub struct TransportReader {
    half: OwnedReadHalf,
    buf: BytesMut,
    bytes_read: u64,
    generation: u64,
}

impl TransportReader {
    /// Generation id of the handle this half belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Total bytes consumed from the socket so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read one reply.
    ///
    /// Returns `Ok(None)` on a clean end-of-stream between replies
    /// (a remote close); a stream that ends mid-reply is a protocol error.
    pub async fn read_value(&mut self) -> Result<Option<RespValue>> {
        loop {
            if let Some(value) = Codec::decode(&mut self.buf)? {
                return Ok(Some(value));
            }
            let n = self.half.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(Error::Protocol {
                    message: "connection closed mid-reply".into(),
                });
            }
            self.bytes_read += n as u64;
        }
    }
}

/// Write half of a split transport.
#[derive(Debug)]
pub struct TransportWriter {
    half: OwnedWriteHalf,
    generation: u64,
}

impl TransportWriter {
    /// Generation id of the handle this half belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Write one command frame, returning the number of bytes written.
    pub async fn send(&mut self, cmd: &Command) -> Result<usize> {
        let frame = Codec::encode(cmd);
        self.half.write_all(&frame).await?;
        Ok(frame.len())
    }

    /// Locally shut down the write direction.
    pub async fn shutdown(&mut self) {
        let _ = self.half.shutdown().await;
    }
}
