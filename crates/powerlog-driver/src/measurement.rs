//! Measurement frames and the instrument's "no data" codes.
//!
//! A frame is one `;`-separated line of numbers laid out by the armed
//! [`ValueSelection`](crate::ValueSelection). The analyzer has no NaN or
//! infinity on the wire; it sends three out-of-range magnitudes instead.

use serde::Serialize;

use crate::error::{DriverError, Result};

/// Field separator inside a frame.
pub const FIELD_SEPARATOR: char = ';';

/// Wire code for NaN.
pub const NAN_CODE: f64 = 9.91e37;

/// Wire code for positive infinity.
pub const POS_INFINITY_CODE: f64 = 9.9e37;

/// Wire code for negative infinity.
pub const NEG_INFINITY_CODE: f64 = -9.9e37;

/// A "no data" code found in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentinel {
    NotANumber,
    PositiveInfinity,
    NegativeInfinity,
}

impl Sentinel {
    /// Classify a parsed value. Only the exact codes match.
    pub fn classify(value: f64) -> Option<Self> {
        if value == NAN_CODE {
            Some(Sentinel::NotANumber)
        } else if value == POS_INFINITY_CODE {
            Some(Sentinel::PositiveInfinity)
        } else if value == NEG_INFINITY_CODE {
            Some(Sentinel::NegativeInfinity)
        } else {
            None
        }
    }

    /// The IEEE value the code stands for.
    pub fn to_f64(self) -> f64 {
        match self {
            Sentinel::NotANumber => f64::NAN,
            Sentinel::PositiveInfinity => f64::INFINITY,
            Sentinel::NegativeInfinity => f64::NEG_INFINITY,
        }
    }
}

/// Whether `value` is one of the three "no data" codes.
pub fn is_no_data(value: f64) -> bool {
    Sentinel::classify(value).is_some()
}

/// `None` for a "no data" code, the value otherwise.
pub fn reading(value: f64) -> Option<f64> {
    if is_no_data(value) {
        None
    } else {
        Some(value)
    }
}

/// Split a frame line into trimmed fields. An empty line has no fields.
pub fn split_fields(line: &str) -> Vec<&str> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }
    line.split(FIELD_SEPARATOR).map(str::trim).collect()
}

/// Parse a frame line into numbers.
///
/// An empty line yields an empty frame. A single non-numeric field fails the
/// whole frame with [`DriverError::Parse`].
pub fn parse_frame(line: &str) -> Result<Vec<f64>> {
    split_fields(line)
        .into_iter()
        .map(|field| {
            field.parse::<f64>().map_err(|_| DriverError::Parse {
                field: field.to_string(),
                line: line.to_string(),
            })
        })
        .collect()
}
