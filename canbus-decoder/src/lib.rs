//! CAN Bus Decoder Library
//!
//! Decodes raw CAN frames into physically scaled signal values using a
//! DBC-style message dictionary, and reassembles NMEA 2000 / J1939
//! fast-packet sequences for messages longer than one frame.
//!
//! # Architecture
//!
//! Frames flow through a single synchronous pipeline:
//!
//! ```text
//! transport -> FrameIngestion -> J1939 decomposition -> dictionary lookup
//!           -> (fast-packet reassembly) -> SignalDecoder -> handler
//! ```
//!
//! and the reverse for transmission:
//!
//! ```text
//! values -> SignalEncoder -> FastPacketSegmenter -> FrameEgress
//! ```
//!
//! The dictionary is frozen once built and shared read-only; reassembly
//! state is owned by one [`FrameDecoder`] per frame source.
//!
//! The library does NOT:
//! - Open sockets or talk to CAN hardware
//! - Schedule work across threads
//! - Persist or author dictionaries (DBC files are read with `can-dbc`)
//!
//! # Example Usage
//!
//! ```no_run
//! use canbus_decoder::{Decoder, DecoderConfig, ReassemblyKey};
//! use std::path::Path;
//!
//! // Load signal definitions and freeze them
//! let mut builder = Decoder::builder();
//! builder.add_dbc(Path::new("n2k.dbc")).unwrap();
//! let decoder = builder.build();
//!
//! // Configure decoding
//! let config = DecoderConfig::new().with_reassembly_key(ReassemblyKey::AddressedPgn);
//!
//! // Decode a candump log
//! let messages = decoder.decode_file(Path::new("candump.log"), config).unwrap();
//!
//! for message in messages {
//!     match message {
//!         Ok(decoded) => println!("{} at {}", decoded.message_name, decoded.timestamp),
//!         Err(e) => eprintln!("Decode error: {}", e),
//!     }
//! }
//! ```

pub mod bitfield;
pub mod config;
pub mod decoder;
pub mod diagnostics;
pub mod fastpacket;
pub mod formats;
pub mod j1939;
pub mod message_decoder;
pub mod signals;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use bitfield::BitFieldCodec;
pub use config::{DecoderConfig, ReassemblyKey};
pub use decoder::{Decoder, DecoderBuilder, DecoderStats, DecodingIterator, FrameDecoder, StreamStats};
pub use diagnostics::{DiagnosticEvent, DiagnosticSink, LogSink};
pub use fastpacket::{FastPacketReassembler, FastPacketSegmenter, ReassemblyStatus};
pub use j1939::PgnAddress;
pub use message_decoder::{DecodedSignals, SignalDecoder, SignalEncoder};
pub use signals::dbc::DbcKey;
pub use signals::{
    ByteOrder, DictionaryStats, MessageDescriptor, MessageDictionary, MessageKey, MessageKind,
    MultiplexIndicator, SignalDescriptor, ValueType,
};
pub use transport::{Dispatcher, FrameEgress, FrameIngestion, Transmitter};
pub use types::{
    DecodedMessage, DecodedSignalValue, DecoderError, RawFrame, Result, SignalValue, Timestamp,
    Validity,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
