//! J1939 / NMEA 2000 identifier decomposition
//!
//! A 29-bit identifier is laid out as:
//!
//! ```text
//! 28..26  priority
//! 25      extended data page (EDP)
//! 24      data page (DP)
//! 23..16  PDU format (PF)
//! 15..8   PDU specific (PS): destination address or group extension
//! 7..0    source address (SA)
//! ```
//!
//! PF < 240 is PDU1 (peer-to-peer, PS is the destination and not part of
//! the PGN). PF >= 240 is PDU2 (broadcast, PS belongs to the PGN).

use serde::Serialize;
use std::fmt;

use crate::types::{DecoderError, Result};

/// Destination address used for broadcasts
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// Smallest PDU format value of a PDU2 (broadcast) message
pub const PDU2_THRESHOLD: u8 = 240;

/// Source address used when none was claimed
pub const NULL_ADDRESS: u8 = 0xFE;

/// Fields of a 29-bit identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PgnAddress {
    pub priority: u8,
    pub extended_data_page: u8,
    pub data_page: u8,
    pub pdu_format: u8,
    pub pdu_specific: u8,
    pub pgn: u32,
    pub source_address: u8,
    pub destination_address: u8,
}

impl PgnAddress {
    /// Split an arbitration ID into its J1939 fields
    pub fn decompose(arbitration_id: u32) -> Self {
        let priority = ((arbitration_id >> 26) & 0x7) as u8;
        let extended_data_page = ((arbitration_id >> 25) & 0x1) as u8;
        let data_page = ((arbitration_id >> 24) & 0x1) as u8;
        let pdu_format = (arbitration_id >> 16) as u8;
        let pdu_specific = (arbitration_id >> 8) as u8;
        let source_address = arbitration_id as u8;

        let page = ((extended_data_page as u32) << 17) | ((data_page as u32) << 16);
        let (pgn, destination_address) = if pdu_format < PDU2_THRESHOLD {
            (page | (pdu_format as u32) << 8, pdu_specific)
        } else {
            (
                page | (pdu_format as u32) << 8 | pdu_specific as u32,
                BROADCAST_ADDRESS,
            )
        };

        Self {
            priority,
            extended_data_page,
            data_page,
            pdu_format,
            pdu_specific,
            pgn,
            source_address,
            destination_address,
        }
    }

    /// True for peer-to-peer (destination specific) messages
    pub fn is_pdu1(&self) -> bool {
        self.pdu_format < PDU2_THRESHOLD
    }
}

impl fmt::Display for PgnAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P={:x} edp={:x} dp={:x} pf={:x} ps={:x} sa={:x}",
            self.priority,
            self.extended_data_page,
            self.data_page,
            self.pdu_format,
            self.pdu_specific,
            self.source_address
        )
    }
}

/// PGN of an arbitration ID
pub fn pgn(arbitration_id: u32) -> u32 {
    PgnAddress::decompose(arbitration_id).pgn
}

/// PGN combined with the source address; unique per sender
pub fn addressed_pgn(arbitration_id: u32) -> u32 {
    (pgn(arbitration_id) << 8) | (arbitration_id & 0xFF)
}

/// True if both identifiers carry the same PGN
pub fn same_pgn(a: u32, b: u32) -> bool {
    pgn(a) == pgn(b)
}

/// Arbitration ID for a PGN with priority 0.
///
/// PDU1 PGNs are addressed to the broadcast address.
pub fn can_id_for_pgn(pgn: u32, source_address: u8) -> u32 {
    let pdu_format = (pgn >> 8) & 0xFF;
    let pages = pgn & 0x3_0000;
    if pdu_format < PDU2_THRESHOLD as u32 {
        (pages << 8) | (pdu_format << 16) | ((BROADCAST_ADDRESS as u32) << 8) | source_address as u32
    } else {
        (pages << 8) | ((pgn & 0xFFFF) << 8) | source_address as u32
    }
}

/// Build an arbitration ID from its parts.
///
/// A destination other than broadcast is only valid for PDU1 PGNs.
pub fn compose(priority: u8, pgn: u32, destination_address: u8, source_address: u8) -> Result<u32> {
    if priority > 7 {
        return Err(DecoderError::InvalidIdentifier(format!(
            "priority {} out of bounds",
            priority
        )));
    }
    if pgn > 0x3_FFFF {
        return Err(DecoderError::InvalidIdentifier(format!(
            "pgn {} out of bounds",
            pgn
        )));
    }

    let pdu_format = (pgn >> 8) & 0xFF;
    let base = ((priority as u32) << 26) | ((pgn & 0x3_0000) << 8) | (pdu_format << 16);
    if pdu_format < PDU2_THRESHOLD as u32 {
        if pgn & 0xFF != 0 {
            return Err(DecoderError::InvalidIdentifier(format!(
                "pdu1 pgn {} has a non-zero low byte",
                pgn
            )));
        }
        Ok(base | ((destination_address as u32) << 8) | source_address as u32)
    } else if destination_address != BROADCAST_ADDRESS {
        Err(DecoderError::InvalidIdentifier(format!(
            "pgn {} is not peer-to-peer",
            pgn
        )))
    } else {
        Ok(base | ((pgn & 0xFF) << 8) | source_address as u32)
    }
}
