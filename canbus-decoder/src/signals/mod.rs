//! Message dictionary and DBC loader
//!
//! This module contains the immutable message dictionary the decoder reads
//! from, and the DBC adapter that produces its entries.

pub mod dbc;
pub mod dictionary;

// Re-export key types for convenience
pub use dictionary::{
    ByteOrder, DictionaryStats, MessageBuilder, MessageDescriptor, MessageDictionary,
    MessageDictionaryBuilder, MessageKey, MessageKind, MultiplexIndicator, SignalDescriptor, ValueType,
    CLASSIC_MAX_BYTES, FAST_PACKET_MAX_BYTES,
};
