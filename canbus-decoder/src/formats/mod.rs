//! Log file format parsers
//!
//! Each parser implements an iterator pattern over RawFrame objects.

use crate::types::{RawFrame, Result};
use std::path::Path;

pub mod candump;

// Re-export parser types
pub use candump::{CandumpReader, CandumpWriter};

/// Common trait for all log file parsers
pub trait LogFileParser: Iterator<Item = Result<RawFrame>> + Sized {
    /// Parse a log file and return an iterator over CAN frames
    fn parse(path: &Path) -> Result<Self>;
}
