//! Fast-packet reassembly
//!
//! One [`FastPacketReassembler`] tracks one logical stream. Frames must be
//! fed in arrival order by a single owner.
//!
//! ```text
//! frame 0:  [seq|0]   [total] [d0 .. d5]
//! frame k:  [seq|k]   [d(6 + (k-1)*7) .. +7]
//! ```

use crate::diagnostics::{DiagnosticEvent, DiagnosticSink};

const SEQUENCE_MASK: u8 = 0xE0;
const FRAME_INDEX_MASK: u8 = 0x1F;

/// Payload bytes carried by the first frame
pub const FIRST_FRAME_DATA: usize = 6;
/// Payload bytes carried by every following frame
pub const NEXT_FRAME_DATA: usize = 7;

/// Result of feeding one frame
#[derive(Debug, PartialEq, Eq)]
pub enum ReassemblyStatus<'a> {
    /// More frames are needed
    Accumulating,
    /// The message is complete; the slice holds exactly the declared bytes
    Complete(&'a [u8]),
}

/// Reassembly state for one stream
#[derive(Debug, Clone)]
pub struct FastPacketReassembler {
    stream: u32,
    active_sequence: Option<u8>,
    expected_total_bytes: usize,
    accumulated_byte_count: usize,
    buffer: Vec<u8>,
    failure_count: u64,
    update_count: u64,
    complete_count: u64,
}

impl FastPacketReassembler {
    /// Create an idle reassembler whose buffer holds `capacity` bytes
    pub fn new(stream: u32, capacity: usize) -> Self {
        Self {
            stream,
            active_sequence: None,
            expected_total_bytes: 0,
            accumulated_byte_count: 0,
            buffer: vec![0; capacity],
            failure_count: 0,
            update_count: 0,
            complete_count: 0,
        }
    }

    /// Feed the next frame of this stream
    pub fn update(&mut self, payload: &[u8], sink: &mut dyn DiagnosticSink) -> ReassemblyStatus<'_> {
        self.update_count += 1;

        let Some(&header_byte) = payload.first() else {
            self.report_malformed(payload.len(), sink);
            return ReassemblyStatus::Accumulating;
        };
        let sequence = header_byte & SEQUENCE_MASK;
        let frame_index = (header_byte & FRAME_INDEX_MASK) as usize;

        let resynced = self.active_sequence != Some(sequence);
        if resynced {
            if self.active_sequence.is_some() && self.is_incomplete() {
                self.record_failure(sink);
            }
            self.active_sequence = Some(sequence);
            self.accumulated_byte_count = 0;
            self.expected_total_bytes = self.buffer.len();
        }

        let (header_length, offset) = if frame_index == 0 {
            if payload.len() < 2 {
                self.report_malformed(payload.len(), sink);
                return ReassemblyStatus::Accumulating;
            }
            // Same sequence restarted before the previous message finished
            if !resynced && self.is_incomplete() {
                self.record_failure(sink);
            }
            self.accumulated_byte_count = 0;
            self.expected_total_bytes = payload[1] as usize;
            (2, 0)
        } else {
            (1, FIRST_FRAME_DATA + (frame_index - 1) * NEXT_FRAME_DATA)
        };

        let remaining = self
            .expected_total_bytes
            .saturating_sub(self.accumulated_byte_count);
        let bytes_to_copy = (payload.len() - header_length).min(remaining);

        // Stray continuation of a message that already completed
        if bytes_to_copy == 0 && frame_index != 0 {
            return ReassemblyStatus::Accumulating;
        }

        let end = offset + bytes_to_copy;
        if end > self.buffer.len() {
            sink.report(DiagnosticEvent::ReassemblyOverflow {
                stream: self.stream,
                offset,
                length: bytes_to_copy,
                capacity: self.buffer.len(),
            });
            return ReassemblyStatus::Accumulating;
        }

        self.buffer[offset..end].copy_from_slice(&payload[header_length..header_length + bytes_to_copy]);
        self.accumulated_byte_count += bytes_to_copy;

        if self.accumulated_byte_count == self.expected_total_bytes {
            self.complete_count += 1;
            ReassemblyStatus::Complete(&self.buffer[..self.expected_total_bytes])
        } else {
            ReassemblyStatus::Accumulating
        }
    }

    /// Abandoned sequences so far
    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    /// Frames fed so far
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Messages completed so far
    pub fn complete_count(&self) -> u64 {
        self.complete_count
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// True while a sequence is partially received
    pub fn is_accumulating(&self) -> bool {
        self.active_sequence.is_some() && self.is_incomplete()
    }

    fn is_incomplete(&self) -> bool {
        self.accumulated_byte_count != self.expected_total_bytes
    }

    fn record_failure(&mut self, sink: &mut dyn DiagnosticSink) {
        self.failure_count += 1;
        sink.report(DiagnosticEvent::ReassemblyDesync {
            stream: self.stream,
            expected: self.expected_total_bytes,
            accumulated: self.accumulated_byte_count,
        });
    }

    fn report_malformed(&self, length: usize, sink: &mut dyn DiagnosticSink) {
        sink.report(DiagnosticEvent::MalformedFrame {
            stream: self.stream,
            length,
        });
    }
}
