//! RESP2 protocol types for redq.
//!
//! This module defines:
//! - [`Command`]: a client request, encoded as an array of bulk strings
//! - [`RespValue`]: a decoded server reply
//! - [`codec`]: streaming wire codec
//! - [`double`]: scalar double encoding (wire-exact infinity handling)

pub mod codec;
pub mod double;

pub use codec::Codec;
pub use double::{format_double, parse_double};

use bytes::Bytes;

/// A single client command: a name plus binary-safe arguments.
///
/// On the wire a command is an array of bulk strings; the name is the first
/// element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<Bytes>,
}

impl Command {
    /// Create a command with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append a binary-safe argument.
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    /// Append a double argument in its canonical wire form.
    ///
    /// Infinities render as `+inf` / `-inf`, finite values as the shortest
    /// decimal text that round-trips.
    pub fn arg_double(self, value: f64) -> Self {
        self.arg(double::format_double(value))
    }

    /// The command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The command arguments, excluding the name.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }
}

/// A decoded RESP2 reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Simple string reply (`+OK`).
    Simple(String),
    /// Error reply (`-ERR ...`); the string is the server's text verbatim.
    Error(String),
    /// Integer reply (`:42`).
    Integer(i64),
    /// Bulk string reply (`$3\r\nfoo`).
    Bulk(Bytes),
    /// Null reply (`$-1` or `*-1`).
    Null,
    /// Array reply.
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Returns true for error replies.
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// View this reply as UTF-8 text, if it is a simple or bulk string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::Simple(s) => Some(s),
            RespValue::Bulk(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Convert this reply into owned UTF-8 text, if it is a string reply.
    pub fn into_string(self) -> Option<String> {
        match self {
            RespValue::Simple(s) => Some(s),
            RespValue::Bulk(b) => String::from_utf8(b.to_vec()).ok(),
            _ => None,
        }
    }

    /// The integer payload, if this is an integer reply.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_builder_collects_args() {
        let cmd = Command::new("SET").arg("key").arg("value");
        assert_eq!(cmd.name(), "SET");
        assert_eq!(cmd.args().len(), 2);
        assert_eq!(&cmd.args()[0][..], b"key");
        assert_eq!(&cmd.args()[1][..], b"value");
    }

    #[test]
    fn command_arg_double_uses_wire_form() {
        let cmd = Command::new("ZADD").arg("z").arg_double(f64::INFINITY).arg("m");
        assert_eq!(&cmd.args()[1][..], b"+inf");

        let cmd = Command::new("ZADD").arg("z").arg_double(1.1).arg("m");
        assert_eq!(&cmd.args()[1][..], b"1.1");
    }

    #[test]
    fn resp_value_as_str() {
        assert_eq!(RespValue::Simple("OK".into()).as_str(), Some("OK"));
        assert_eq!(
            RespValue::Bulk(Bytes::from_static(b"hello")).as_str(),
            Some("hello")
        );
        assert_eq!(RespValue::Integer(1).as_str(), None);
        assert_eq!(RespValue::Null.as_str(), None);
    }

    #[test]
    fn resp_value_error_detection() {
        assert!(RespValue::Error("ERR bad".into()).is_error());
        assert!(!RespValue::Simple("OK".into()).is_error());
    }

    #[test]
    fn resp_value_integer_access() {
        assert_eq!(RespValue::Integer(42).as_integer(), Some(42));
        assert_eq!(RespValue::Null.as_integer(), None);
    }
}
