//! Core types for the CAN bus decoder library
//!
//! This module defines the frame type fed into the decoder and the decoded
//! values it emits. Decoding faults that only affect one signal are carried
//! as a [`Validity`] on that signal instead of an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::j1939::PgnAddress;
use crate::signals::MessageKey;

/// Timestamp type used throughout the decoder
pub type Timestamp = DateTime<Utc>;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Raw CAN frame as handed over by a transport
///
/// Created per received frame, consumed immediately and never retained by
/// the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Timestamp in microseconds since epoch
    pub timestamp_us: i64,
    /// CAN arbitration ID (11-bit or 29-bit)
    pub arbitration_id: u32,
    /// True if this is an extended (29-bit) CAN ID
    pub is_extended: bool,
    /// Frame data bytes (0-8 bytes)
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Create a frame, inferring the identifier format from its value.
    ///
    /// Extended identifiers of `0x7FF` or below need [`RawFrame::with_format`].
    pub fn new(timestamp_us: i64, arbitration_id: u32, data: &[u8]) -> Self {
        Self::with_format(timestamp_us, arbitration_id, arbitration_id > 0x7FF, data)
    }

    /// Create a frame with an explicit identifier format
    pub fn with_format(timestamp_us: i64, arbitration_id: u32, is_extended: bool, data: &[u8]) -> Self {
        Self {
            timestamp_us,
            arbitration_id,
            is_extended,
            data: data.to_vec(),
        }
    }

    /// Convert timestamp from microseconds to DateTime<Utc>
    pub fn timestamp(&self) -> Timestamp {
        let secs = self.timestamp_us.div_euclid(1_000_000);
        let nsecs = (self.timestamp_us.rem_euclid(1_000_000) * 1_000) as u32;
        DateTime::from_timestamp(secs, nsecs).unwrap_or_default()
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

/// Errors that can occur during decoding
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Bit range {start}..{end} outside buffer of {available} bits")]
    Extraction {
        start: usize,
        end: usize,
        available: usize,
    },

    #[error("Unsupported bit length {0} (must be 1..=64)")]
    BitLength(usize),

    #[error("Invalid fast-packet length {0} (must be 6..=223)")]
    InvalidLength(usize),

    #[error("Payload of {actual} bytes is shorter than the declared {expected}")]
    PayloadTooShort { expected: usize, actual: usize },

    #[error("Unknown message: CAN ID 0x{0:X}")]
    UnknownMessageId(u32),

    #[error("Invalid signal definition: {0}")]
    InvalidSignalDefinition(String),

    #[error("Duplicate message {0}")]
    DuplicateMessage(MessageKey),

    #[error("Invalid identifier field: {0}")]
    InvalidIdentifier(String),

    #[error("No value supplied for signal: {0}")]
    MissingSignalValue(String),

    #[error("Value cannot be encoded: {0}")]
    InvalidSignalValue(String),

    #[error("Failed to parse DBC file: {0}")]
    DbcParseError(String),

    #[error("Failed to parse log file: {0}")]
    LogParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Outcome attached to every decoded signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    /// Value decoded and within bounds
    Ok,
    /// Physical value outside the declared `[min, max]` range (value still reported)
    OutOfRange,
    /// Protocol "data not available" bit pattern
    SentinelNotAvailable,
    /// Bit range did not fit the buffer; no value
    ExtractionError,
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validity::Ok => write!(f, "ok"),
            Validity::OutOfRange => write!(f, "out-of-range"),
            Validity::SentinelNotAvailable => write!(f, "n/a"),
            Validity::ExtractionError => write!(f, "extraction-error"),
        }
    }
}

/// Signal value variants supported by the decoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    /// Scaled engineering value (`raw * factor + offset`)
    Physical(f64),
    /// Enumerated code with its label from the value table
    Lookup { code: i64, label: Option<String> },
    /// Fixed-length ASCII text with trailing fill removed
    Text(String),
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Physical(v) => write!(f, "{:.3}", v),
            SignalValue::Lookup { code, label: Some(label) } => write!(f, "{} ({})", label, code),
            SignalValue::Lookup { code, label: None } => write!(f, "{}", code),
            SignalValue::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl SignalValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SignalValue::Physical(v) => Some(*v),
            SignalValue::Lookup { code, .. } => Some(*code as f64),
            SignalValue::Text(_) => None,
        }
    }
}

/// A decoded signal with its validity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedSignalValue {
    /// Signal name from the dictionary
    pub name: String,
    /// Decoded value; `None` when not available or not extractable
    pub value: Option<SignalValue>,
    /// Engineering unit (e.g., "m/s", "rad", "V")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub validity: Validity,
}

impl DecodedSignalValue {
    pub fn is_ok(&self) -> bool {
        self.validity == Validity::Ok
    }
}

/// All signals decoded from one frame or one completed fast-packet payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    /// Timestamp of the frame that completed the message
    pub timestamp: Timestamp,
    /// Raw arbitration ID of the (last) frame
    pub arbitration_id: u32,
    /// J1939 decomposition for extended identifiers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<PgnAddress>,
    /// Message name from the dictionary
    pub message_name: String,
    /// Active multiplexor value (if message is multiplexed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplexer_value: Option<u64>,
    /// Decoded signals keyed by name
    pub signals: BTreeMap<String, DecodedSignalValue>,
}

impl DecodedMessage {
    /// Look up one decoded signal by name
    pub fn signal(&self, name: &str) -> Option<&DecodedSignalValue> {
        self.signals.get(name)
    }
}
