//! Streaming RESP2 wire codec.
//!
//! Commands encode as arrays of bulk strings. Replies decode from a
//! [`BytesMut`] with the usual streaming contract:
//! - a complete value is consumed and returned as `Ok(Some(..))`
//! - partial input returns `Ok(None)` and leaves the buffer untouched
//! - malformed input returns `Err`
//!
//! Announced lengths are validated before the payload is buffered, so an
//! oversized or corrupt length prefix fails fast instead of stalling the
//! reader.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::{MAX_ARRAY_LEN, MAX_BULK_LEN};
use crate::error::{Error, Result};
use crate::protocol::{Command, RespValue};

const CRLF: &[u8] = b"\r\n";

/// Codec for RESP2 framing.
pub struct Codec;

impl Codec {
    /// Encode a command as an array of bulk strings.
    pub fn encode(cmd: &Command) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(b'*');
        buf.put_slice((1 + cmd.args().len()).to_string().as_bytes());
        buf.put_slice(CRLF);
        put_bulk(&mut buf, cmd.name().as_bytes());
        for arg in cmd.args() {
            put_bulk(&mut buf, arg);
        }
        buf.freeze()
    }

    /// Encode a reply value (the server-to-client direction).
    ///
    /// Used by test servers and by codec tests; the client itself only
    /// decodes replies.
    pub fn encode_value(value: &RespValue) -> Bytes {
        let mut buf = BytesMut::new();
        put_value(&mut buf, value);
        buf.freeze()
    }

    /// Decode one reply from a buffer.
    ///
    /// Returns:
    /// - Ok(Some(value)) if a complete reply was decoded (buffer is advanced)
    /// - Ok(None) if more data is needed (buffer unchanged)
    /// - Err if the data is invalid
    pub fn decode(buf: &mut BytesMut) -> Result<Option<RespValue>> {
        let mut pos = 0;
        match parse_value(buf, &mut pos)? {
            Some(value) => {
                buf.advance(pos);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Decode from a slice (convenience for testing).
    pub fn decode_slice(data: &[u8]) -> Result<Option<RespValue>> {
        let mut buf = BytesMut::from(data);
        Self::decode(&mut buf)
    }
}

fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u8(b'$');
    buf.put_slice(data.len().to_string().as_bytes());
    buf.put_slice(CRLF);
    buf.put_slice(data);
    buf.put_slice(CRLF);
}

fn put_value(buf: &mut BytesMut, value: &RespValue) {
    match value {
        RespValue::Simple(s) => {
            buf.put_u8(b'+');
            buf.put_slice(s.as_bytes());
            buf.put_slice(CRLF);
        }
        RespValue::Error(s) => {
            buf.put_u8(b'-');
            buf.put_slice(s.as_bytes());
            buf.put_slice(CRLF);
        }
        RespValue::Integer(n) => {
            buf.put_u8(b':');
            buf.put_slice(n.to_string().as_bytes());
            buf.put_slice(CRLF);
        }
        RespValue::Bulk(data) => put_bulk(buf, data),
        RespValue::Null => buf.put_slice(b"$-1\r\n"),
        RespValue::Array(items) => {
            buf.put_u8(b'*');
            buf.put_slice(items.len().to_string().as_bytes());
            buf.put_slice(CRLF);
            for item in items {
                put_value(buf, item);
            }
        }
    }
}

/// Parse one value starting at `*pos`, advancing `*pos` past it on success.
///
/// Returns Ok(None) when the buffer ends mid-value; `*pos` is then
/// meaningless and the caller must not advance the buffer.
fn parse_value(data: &[u8], pos: &mut usize) -> Result<Option<RespValue>> {
    if *pos >= data.len() {
        return Ok(None);
    }
    let kind = data[*pos];
    let Some((line, next)) = read_line(data, *pos + 1) else {
        return Ok(None);
    };

    match kind {
        b'+' => {
            let text = line_to_string(line)?;
            *pos = next;
            Ok(Some(RespValue::Simple(text)))
        }
        b'-' => {
            let text = line_to_string(line)?;
            *pos = next;
            Ok(Some(RespValue::Error(text)))
        }
        b':' => {
            let n = parse_integer(line)?;
            *pos = next;
            Ok(Some(RespValue::Integer(n)))
        }
        b'$' => {
            let len = parse_integer(line)?;
            if len == -1 {
                *pos = next;
                return Ok(Some(RespValue::Null));
            }
            if len < 0 || len as usize > MAX_BULK_LEN {
                return Err(Error::Protocol {
                    message: format!("invalid bulk length {}", len),
                });
            }
            let len = len as usize;
            if data.len() < next + len + CRLF.len() {
                return Ok(None);
            }
            if &data[next + len..next + len + 2] != CRLF {
                return Err(Error::Protocol {
                    message: "bulk string missing trailing CRLF".into(),
                });
            }
            let payload = Bytes::copy_from_slice(&data[next..next + len]);
            *pos = next + len + 2;
            Ok(Some(RespValue::Bulk(payload)))
        }
        b'*' => {
            let count = parse_integer(line)?;
            if count == -1 {
                *pos = next;
                return Ok(Some(RespValue::Null));
            }
            if count < 0 || count as usize > MAX_ARRAY_LEN {
                return Err(Error::Protocol {
                    message: format!("invalid array length {}", count),
                });
            }
            let mut cursor = next;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                match parse_value(data, &mut cursor)? {
                    Some(item) => items.push(item),
                    None => return Ok(None),
                }
            }
            *pos = cursor;
            Ok(Some(RespValue::Array(items)))
        }
        other => Err(Error::Protocol {
            message: format!("invalid reply type byte 0x{:02x}", other),
        }),
    }
}

/// Find the CRLF-terminated line starting at `start`.
///
/// Returns the line contents (without CRLF) and the offset just past it.
fn read_line(data: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let mut i = start;
    while i + 1 < data.len() {
        if data[i] == b'\r' && data[i + 1] == b'\n' {
            return Some((&data[start..i], i + 2));
        }
        i += 1;
    }
    None
}

fn line_to_string(line: &[u8]) -> Result<String> {
    String::from_utf8(line.to_vec()).map_err(|_| Error::Protocol {
        message: "reply line is not valid UTF-8".into(),
    })
}

fn parse_integer(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Error::Protocol {
            message: format!("invalid length or integer line {:?}", line),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_command_exact_bytes() {
        let cmd = Command::new("SET").arg("k").arg("v");
        let encoded = Codec::encode(&cmd);
        assert_eq!(&encoded[..], b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
    }

    #[test]
    fn encode_command_without_args() {
        let encoded = Codec::encode(&Command::new("PING"));
        assert_eq!(&encoded[..], b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn decode_simple_string() {
        let value = Codec::decode_slice(b"+OK\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Simple("OK".into()));
    }

    #[test]
    fn decode_error_keeps_server_text_verbatim() {
        let value = Codec::decode_slice(b"-NOAUTH Authentication required.\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(
            value,
            RespValue::Error("NOAUTH Authentication required.".into())
        );
    }

    #[test]
    fn decode_integer() {
        let value = Codec::decode_slice(b":1024\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Integer(1024));
    }

    #[test]
    fn decode_bulk_and_null() {
        let value = Codec::decode_slice(b"$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Bulk(Bytes::from_static(b"hello")));

        let value = Codec::decode_slice(b"$-1\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Null);
    }

    #[test]
    fn decode_array_recursive() {
        let value = Codec::decode_slice(b"*2\r\n$3\r\nfoo\r\n:7\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(
            value,
            RespValue::Array(vec![
                RespValue::Bulk(Bytes::from_static(b"foo")),
                RespValue::Integer(7),
            ])
        );
    }

    #[test]
    fn decode_partial_returns_none() {
        assert!(Codec::decode_slice(b"+OK").unwrap().is_none());
        assert!(Codec::decode_slice(b"$5\r\nhel").unwrap().is_none());
        assert!(Codec::decode_slice(b"*2\r\n$3\r\nfoo\r\n").unwrap().is_none());
    }

    #[test]
    fn decode_empty_returns_none() {
        assert!(Codec::decode_slice(&[]).unwrap().is_none());
    }

    #[test]
    fn decode_oversized_bulk_length_is_rejected_early() {
        // Announced length exceeds the cap; no payload present yet.
        let line = format!("${}\r\n", MAX_BULK_LEN + 1);
        let result = Codec::decode_slice(line.as_bytes());
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[test]
    fn decode_invalid_type_byte_is_rejected() {
        let result = Codec::decode_slice(b"?huh\r\n");
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[test]
    fn decode_bulk_missing_terminator_is_rejected() {
        let result = Codec::decode_slice(b"$3\r\nfooXY");
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[test]
    fn multiple_replies_in_buffer() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"+OK\r\n:3\r\n$2\r\nhi\r\n");

        assert_eq!(
            Codec::decode(&mut buf).unwrap().unwrap(),
            RespValue::Simple("OK".into())
        );
        assert_eq!(
            Codec::decode(&mut buf).unwrap().unwrap(),
            RespValue::Integer(3)
        );
        assert_eq!(
            Codec::decode(&mut buf).unwrap().unwrap(),
            RespValue::Bulk(Bytes::from_static(b"hi"))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_advances_buffer_only_on_success() {
        let mut buf = BytesMut::from(&b"$5\r\nhel"[..]);
        let before = buf.len();
        assert!(Codec::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), before);

        buf.extend_from_slice(b"lo\r\n");
        let value = Codec::decode(&mut buf).unwrap().unwrap();
        assert_eq!(value, RespValue::Bulk(Bytes::from_static(b"hello")));
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_value_decode_roundtrip() {
        let values = [
            RespValue::Simple("PONG".into()),
            RespValue::Error("ERR invalid password".into()),
            RespValue::Integer(-12),
            RespValue::Bulk(Bytes::from_static(b"binary\x00safe")),
            RespValue::Null,
            RespValue::Array(vec![
                RespValue::Simple("OK".into()),
                RespValue::Array(vec![RespValue::Integer(1)]),
            ]),
        ];
        for value in values {
            let encoded = Codec::encode_value(&value);
            let decoded = Codec::decode_slice(&encoded).unwrap().unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn command_is_decodable_as_value() {
        // Commands are arrays of bulk strings; a server reads them with the
        // same parser.
        let cmd = Command::new("AUTH").arg("secret");
        let encoded = Codec::encode(&cmd);
        let decoded = Codec::decode_slice(&encoded).unwrap().unwrap();
        assert_eq!(
            decoded,
            RespValue::Array(vec![
                RespValue::Bulk(Bytes::from_static(b"AUTH")),
                RespValue::Bulk(Bytes::from_static(b"secret")),
            ])
        );
    }
}
