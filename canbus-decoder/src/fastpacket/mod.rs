//! NMEA 2000 fast-packet transport
//!
//! Messages longer than one classic CAN frame are split into up to 32
//! frames sharing a 3-bit sequence counter. [`FastPacketReassembler`]
//! rebuilds them on receive, [`FastPacketSegmenter`] splits them on send.

pub mod reassembler;
pub mod segmenter;

pub use reassembler::{FastPacketReassembler, ReassemblyStatus, FIRST_FRAME_DATA, NEXT_FRAME_DATA};
pub use segmenter::{next_sequence, FastPacketSegmenter};
