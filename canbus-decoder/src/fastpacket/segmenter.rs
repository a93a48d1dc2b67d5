//! Fast-packet segmentation
//!
//! Splits a payload of 6..=223 bytes into 8-byte CAN frames. The 3-bit
//! sequence counter is shared by every segmenter in the process so that
//! consecutive messages from this node never reuse the same counter back to
//! back.

use std::sync::atomic::{AtomicU8, Ordering};

use super::reassembler::{FIRST_FRAME_DATA, NEXT_FRAME_DATA};
use crate::signals::FAST_PACKET_MAX_BYTES;
use crate::types::{DecoderError, Result};

/// Fill byte for unused frame tail
pub const PADDING: u8 = 0xFF;

const FRAME_SIZE: usize = 8;

static SEQUENCE_COUNTER: AtomicU8 = AtomicU8::new(0);

/// Take the next value of the process-wide rolling counter (0..=7)
pub fn next_sequence() -> u8 {
    // 256 is a multiple of 8, so wrapping keeps the rotation even
    SEQUENCE_COUNTER.fetch_add(1, Ordering::Relaxed) & 0x07
}

pub struct FastPacketSegmenter;

impl FastPacketSegmenter {
    /// Segment `payload[..total_length]` using the next sequence counter
    pub fn segment(total_length: usize, payload: &[u8]) -> Result<Vec<[u8; FRAME_SIZE]>> {
        Self::segment_with_sequence(next_sequence(), total_length, payload)
    }

    /// Segment with an explicit sequence counter (only the low 3 bits are used)
    pub fn segment_with_sequence(
        sequence: u8,
        total_length: usize,
        payload: &[u8],
    ) -> Result<Vec<[u8; FRAME_SIZE]>> {
        if !(FIRST_FRAME_DATA..=FAST_PACKET_MAX_BYTES).contains(&total_length) {
            return Err(DecoderError::InvalidLength(total_length));
        }
        if payload.len() < total_length {
            return Err(DecoderError::PayloadTooShort {
                expected: total_length,
                actual: payload.len(),
            });
        }

        let header = (sequence & 0x07) << 5;
        let mut frames = Vec::with_capacity(Self::frame_count(total_length));

        let mut first = [PADDING; FRAME_SIZE];
        first[0] = header;
        first[1] = total_length as u8;
        first[2..].copy_from_slice(&payload[..FIRST_FRAME_DATA]);
        frames.push(first);

        for (index, chunk) in payload[FIRST_FRAME_DATA..total_length]
            .chunks(NEXT_FRAME_DATA)
            .enumerate()
        {
            let mut frame = [PADDING; FRAME_SIZE];
            frame[0] = header | (index as u8 + 1);
            frame[1..1 + chunk.len()].copy_from_slice(chunk);
            frames.push(frame);
        }

        log::trace!(
            "Segmented {} bytes into {} frames (sequence {})",
            total_length,
            frames.len(),
            sequence & 0x07
        );
        Ok(frames)
    }

    /// Frames needed for a message of `total_length` bytes
    pub fn frame_count(total_length: usize) -> usize {
        1 + total_length.saturating_sub(FIRST_FRAME_DATA).div_ceil(NEXT_FRAME_DATA)
    }
}
