//! Diagnostic events
//!
//! Protocol faults the decoder recovers from are reported to an injected
//! [`DiagnosticSink`]. The default [`LogSink`] forwards them to the `log`
//! facade; tests collect them in a `Vec`.

use std::fmt;

/// A recoverable fault observed while decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// A fast-packet sequence was abandoned before it completed
    ReassemblyDesync {
        stream: u32,
        expected: usize,
        accumulated: usize,
    },
    /// A fast-packet frame would have written past the reassembly buffer
    ReassemblyOverflow {
        stream: u32,
        offset: usize,
        length: usize,
        capacity: usize,
    },
    /// A fast-packet frame too short to hold its header
    MalformedFrame { stream: u32, length: usize },
    /// A signal could not be extracted from the payload
    ExtractionFailed {
        message: String,
        signal: String,
        reason: String,
    },
    /// No dictionary entry for the identifier
    UnknownMessageId { arbitration_id: u32, pgn: Option<u32> },
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticEvent::ReassemblyDesync {
                stream,
                expected,
                accumulated,
            } => write!(
                f,
                "fast-packet stream 0x{:X} desync after {}/{} bytes",
                stream, accumulated, expected
            ),
            DiagnosticEvent::ReassemblyOverflow {
                stream,
                offset,
                length,
                capacity,
            } => write!(
                f,
                "fast-packet stream 0x{:X} copy of {} bytes at {} exceeds buffer of {}",
                stream, length, offset, capacity
            ),
            DiagnosticEvent::MalformedFrame { stream, length } => write!(
                f,
                "fast-packet stream 0x{:X} frame of {} bytes has no room for its header",
                stream, length
            ),
            DiagnosticEvent::ExtractionFailed {
                message,
                signal,
                reason,
            } => write!(f, "signal {}.{} not extracted: {}", message, signal, reason),
            DiagnosticEvent::UnknownMessageId {
                arbitration_id,
                pgn: Some(pgn),
            } => write!(f, "unknown message 0x{:X} (pgn {})", arbitration_id, pgn),
            DiagnosticEvent::UnknownMessageId {
                arbitration_id,
                pgn: None,
            } => write!(f, "unknown message 0x{:X}", arbitration_id),
        }
    }
}

/// Receiver for diagnostic events
pub trait DiagnosticSink {
    fn report(&mut self, event: DiagnosticEvent);
}

/// Forwards events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, event: DiagnosticEvent) {
        match event {
            DiagnosticEvent::UnknownMessageId { .. } => log::trace!("{}", event),
            DiagnosticEvent::ExtractionFailed { .. } => log::debug!("{}", event),
            _ => log::warn!("{}", event),
        }
    }
}

impl DiagnosticSink for Vec<DiagnosticEvent> {
    fn report(&mut self, event: DiagnosticEvent) {
        self.push(event);
    }
}
