//! # Payload Decoder
//!
//! Turns raw radio payloads into numeric readings.
//!
//! Two payload shapes are understood:
//!
//! - A bare decimal number, e.g. `b"21.50"` (temperature sender)
//! - Tab-separated `name = value unit` fields, e.g.
//!   `b"time = 3 seconds \t eCO2 = 400 ppm \t TVOC = 12 ppb"` (gas sender),
//!   from which one named field is extracted
//!
//! Radio payloads are noisy. A payload that does not decode is an expected
//! condition and is reported as [`DecodeError::InvalidFormat`].

use thiserror::Error;

/// Separator between fields in multi-reading payloads
const FIELD_SEPARATOR: char = '\t';

/// Separator between a field name and its value
const NAME_VALUE_SEPARATOR: char = '=';

/// Payload decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Payload is not UTF-8 numeric text
    #[error("Invalid payload format: {0}")]
    InvalidFormat(String),
}

/// Decode a payload holding a single decimal number
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns `DecodeError::InvalidFormat` if the payload is not UTF-8, is not a
/// number, or is not finite.
///
/// # Examples
///
/// ```
/// use lora_telemetry::telemetry::decode;
///
/// assert_eq!(decode(b" 21.50\r\n"), Ok(21.5));
/// assert!(decode(b"bogus").is_err());
/// ```
pub fn decode(raw: &[u8]) -> Result<f64, DecodeError> {
    let text = as_text(raw)?;
    parse_number(text.trim())
}

/// Configured payload decoder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SampleDecoder {
    /// Whole payload is one number
    #[default]
    Scalar,
    /// Extract the named field from a `name = value unit` payload
    Field(String),
}

impl SampleDecoder {
    /// Build a decoder from the optional `[decoder] field` setting
    pub fn from_field(field: Option<&str>) -> Self {
        match field {
            Some(name) => SampleDecoder::Field(name.to_string()),
            None => SampleDecoder::Scalar,
        }
    }

    /// Decode one payload
    pub fn decode(&self, raw: &[u8]) -> Result<f64, DecodeError> {
        match self {
            SampleDecoder::Scalar => decode(raw),
            SampleDecoder::Field(name) => decode_field(raw, name),
        }
    }
}

fn decode_field(raw: &[u8], name: &str) -> Result<f64, DecodeError> {
    let text = as_text(raw)?;

    for segment in text.split(FIELD_SEPARATOR) {
        let Some((key, rest)) = segment.split_once(NAME_VALUE_SEPARATOR) else {
            continue;
        };
        if key.trim() != name {
            continue;
        }

        // Value is the first token; anything after it is the unit
        let token = rest.split_whitespace().next().ok_or_else(|| {
            DecodeError::InvalidFormat(format!("field '{}' has no value", name))
        })?;
        return parse_number(token);
    }

    Err(DecodeError::InvalidFormat(format!("field '{}' not found", name)))
}

fn as_text(raw: &[u8]) -> Result<&str, DecodeError> {
    std::str::from_utf8(raw)
        .map_err(|e| DecodeError::InvalidFormat(format!("not UTF-8: {}", e)))
}

fn parse_number(text: &str) -> Result<f64, DecodeError> {
    if text.is_empty() {
        return Err(DecodeError::InvalidFormat("empty payload".to_string()));
    }

    let value: f64 = text
        .parse()
        .map_err(|_| DecodeError::InvalidFormat(format!("not a number: {:?}", text)))?;

    if !value.is_finite() {
        return Err(DecodeError::InvalidFormat(format!("not finite: {:?}", text)));
    }

    Ok(value)
}
