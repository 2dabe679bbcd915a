//! Scalar double codec.
//!
//! The textual form of doubles is part of the wire contract: finite values
//! render as the shortest decimal text that round-trips, positive infinity
//! as `+inf`, negative infinity as `-inf`.

use crate::error::{Error, Result};

/// Encode a double in its canonical wire form.
pub fn format_double(value: f64) -> String {
    if value == f64::INFINITY {
        "+inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        // Rust's Display for f64 emits the shortest decimal text that
        // round-trips to the same bit pattern.
        format!("{}", value)
    }
}

/// Parse a double from its wire form.
///
/// `+inf` / `inf` and `-inf` map to the infinities; everything else goes
/// through standard decimal parsing.
pub fn parse_double(text: &str) -> Result<f64> {
    match text {
        "+inf" | "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        _ => text.parse::<f64>().map_err(|_| Error::Format {
            message: format!("invalid double: {:?}", text),
        }),
    }
}
