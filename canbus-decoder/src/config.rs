//! Decoder configuration types
//!
//! This module defines the options the decoding pipeline honours. Everything
//! has a sensible default so an empty `[decoder]` table is valid.

use serde::{Deserialize, Serialize};

use crate::j1939;

/// How fast-packet frames are grouped into independent reassembly streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReassemblyKey {
    /// One stream per raw arbitration ID
    #[default]
    ArbitrationId,
    /// One stream per PGN and source address (ignores priority and destination)
    AddressedPgn,
}

impl ReassemblyKey {
    /// Stream key for a frame
    pub fn stream_for(&self, arbitration_id: u32, is_extended: bool) -> u32 {
        match self {
            ReassemblyKey::AddressedPgn if is_extended => j1939::addressed_pgn(arbitration_id),
            _ => arbitration_id,
        }
    }
}

/// Configuration for the decoder library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Optional: only decode these message ids or PGNs
    #[serde(default)]
    pub message_filter: Option<Vec<u32>>,

    /// Grouping of fast-packet frames into streams
    #[serde(default)]
    pub reassembly_key: ReassemblyKey,

    /// Flag values outside `[min, max]` as out of range
    #[serde(default = "default_true")]
    pub check_ranges: bool,

    /// Recognise "data not available" bit patterns
    #[serde(default = "default_true")]
    pub detect_not_available: bool,

    /// Report frames without a dictionary entry to the diagnostic sink
    #[serde(default)]
    pub emit_unknown: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            message_filter: None,
            reassembly_key: ReassemblyKey::default(),
            check_ranges: true,
            detect_not_available: true,
            emit_unknown: false,
        }
    }
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set message filter
    pub fn with_message_filter(mut self, messages: Vec<u32>) -> Self {
        self.message_filter = Some(messages);
        self
    }

    /// Builder method: choose the reassembly stream key
    pub fn with_reassembly_key(mut self, key: ReassemblyKey) -> Self {
        self.reassembly_key = key;
        self
    }

    /// Builder method: enable or disable range checks
    pub fn with_range_checks(mut self, enabled: bool) -> Self {
        self.check_ranges = enabled;
        self
    }

    /// Builder method: enable or disable "not available" detection
    pub fn with_not_available_detection(mut self, enabled: bool) -> Self {
        self.detect_not_available = enabled;
        self
    }

    /// Builder method: report unknown message ids
    pub fn with_unknown_reporting(mut self, enabled: bool) -> Self {
        self.emit_unknown = enabled;
        self
    }

    /// Check if a message should be processed. Either key may match.
    pub fn should_process_message(&self, arbitration_id: u32, pgn: Option<u32>) -> bool {
        match &self.message_filter {
            Some(messages) => {
                messages.contains(&arbitration_id)
                    || pgn.is_some_and(|pgn| messages.contains(&pgn))
            }
            None => true,
        }
    }
}
