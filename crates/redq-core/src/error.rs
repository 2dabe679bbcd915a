//! Error types for redq-core.

use thiserror::Error;

/// Main error type for redq operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed local input, rejected before any network round-trip.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Command refused by the server; the message is the server's text verbatim.
    #[error("{message}")]
    ServerRejection { message: String },

    /// Protocol violation or malformed RESP data.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Malformed scalar text on decode.
    #[error("format error: {message}")]
    Format { message: String },

    /// Transport layer failure.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Connection was closed and will not be re-established.
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,
}

impl Error {
    /// Returns true if this error is transient and reconnection may help.
    ///
    /// Transient errors are transport-level failures where the server is
    /// likely still reachable and a fresh connection could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. } | Error::Timeout | Error::Io(_)
        )
    }

    /// Returns true if this error is fatal for the connection.
    ///
    /// Fatal errors mean reconnecting cannot change the outcome: the input
    /// was invalid locally, the server refused the command, or the caller
    /// abandoned the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Validation { .. }
                | Error::ServerRejection { .. }
                | Error::ConnectionClosed
                | Error::Protocol { .. }
        )
    }
}

/// Convenience result type for redq operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_server_rejection_is_verbatim() {
        let err = Error::ServerRejection {
            message: "ERR invalid password".into(),
        };
        assert_eq!(err.to_string(), "ERR invalid password");
    }

    #[test]
    fn error_display_validation() {
        let err = Error::Validation {
            message: "credential must not be empty".into(),
        };
        assert_eq!(
            err.to_string(),
            "validation error: credential must not be empty"
        );
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn transient_errors() {
        assert!(Error::Transport {
            message: "connection lost".into()
        }
        .is_transient());
        assert!(Error::Timeout.is_transient());
        assert!(Error::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe"
        ))
        .is_transient());

        assert!(!Error::ServerRejection {
            message: "ERR nope".into()
        }
        .is_transient());
        assert!(!Error::ConnectionClosed.is_transient());
    }

    #[test]
    fn fatal_errors() {
        assert!(Error::Validation {
            message: "empty".into()
        }
        .is_fatal());
        assert!(Error::ServerRejection {
            message: "ERR nope".into()
        }
        .is_fatal());
        assert!(Error::ConnectionClosed.is_fatal());
        assert!(Error::Protocol {
            message: "bad frame".into()
        }
        .is_fatal());

        assert!(!Error::Transport {
            message: "lost".into()
        }
        .is_fatal());
        assert!(!Error::Timeout.is_fatal());
    }
}
