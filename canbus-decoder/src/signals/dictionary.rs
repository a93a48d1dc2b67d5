//! Message dictionary
//!
//! Static description of every message and signal the decoder knows. The
//! dictionary is assembled through [`MessageDictionaryBuilder`] and then moved
//! into an immutable [`MessageDictionary`] that can be shared read-only
//! across decoding threads.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::bitfield::BitFieldCodec;
use crate::j1939;
use crate::types::{DecoderError, Result};

/// Largest payload a fast-packet message can carry
pub const FAST_PACKET_MAX_BYTES: usize = 223;

/// Largest payload of a classic CAN frame
pub const CLASSIC_MAX_BYTES: usize = 8;

/// Largest 11-bit identifier
const STANDARD_ID_MAX: u32 = 0x7FF;

/// What a dictionary entry is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKey {
    /// 11-bit identifier of a standard frame
    Standard(u32),
    /// Exact 29-bit identifier of an extended frame
    Extended(u32),
    /// J1939 PGN of an extended frame, any priority, source or destination
    Pgn(u32),
}

impl MessageKey {
    /// Standard or extended key, inferred from the identifier value
    pub fn from_id(arbitration_id: u32) -> Self {
        if arbitration_id > STANDARD_ID_MAX {
            MessageKey::Extended(arbitration_id)
        } else {
            MessageKey::Standard(arbitration_id)
        }
    }

    /// The identifier or PGN number
    pub fn value(&self) -> u32 {
        match *self {
            MessageKey::Standard(id) | MessageKey::Extended(id) | MessageKey::Pgn(id) => id,
        }
    }
}

impl From<u32> for MessageKey {
    fn from(arbitration_id: u32) -> Self {
        MessageKey::from_id(arbitration_id)
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKey::Standard(id) => write!(f, "0x{:03X}", id),
            MessageKey::Extended(id) => write!(f, "0x{:08X}", id),
            MessageKey::Pgn(pgn) => write!(f, "pgn {}", pgn),
        }
    }
}

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// How the raw bits of a signal are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    UnsignedInt,
    SignedInt,
    /// IEEE 754 single precision, 32 bits
    Float,
    /// IEEE 754 double precision, 64 bits
    Double,
    /// Whole bytes of ASCII text
    FixedString,
    /// Unsigned code resolved through the value descriptions
    LookupEnum,
}

/// Multiplexing role of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MultiplexIndicator {
    /// Always present
    #[default]
    None,
    /// Selects which multiplexed signals are present
    Multiplexor,
    /// Present only when the multiplexor equals this value
    MultiplexedBy(u64),
}

/// A CAN signal definition
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDescriptor {
    /// Signal name, unique within its message
    pub name: String,
    /// Start bit in the convention of `byte_order`
    pub start_bit: u16,
    /// Length in bits
    pub bit_length: u16,
    pub byte_order: ByteOrder,
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub factor: f64,
    /// Offset to add after scaling
    pub offset: f64,
    /// Minimum physical value
    pub min: f64,
    /// Maximum physical value
    pub max: f64,
    /// Engineering unit (e.g., "m/s", "rad", "V")
    pub unit: Option<String>,
    pub multiplex: MultiplexIndicator,
    /// Value table for enum-like values (raw_value -> description)
    pub value_descriptions: BTreeMap<i64, String>,
}

impl SignalDescriptor {
    /// Create an unscaled signal with no range and no unit
    pub fn new(
        name: impl Into<String>,
        start_bit: u16,
        bit_length: u16,
        byte_order: ByteOrder,
        value_type: ValueType,
    ) -> Self {
        Self {
            name: name.into(),
            start_bit,
            bit_length,
            byte_order,
            value_type,
            factor: 1.0,
            offset: 0.0,
            min: 0.0,
            max: 0.0,
            unit: None,
            multiplex: MultiplexIndicator::None,
            value_descriptions: BTreeMap::new(),
        }
    }

    pub fn with_scaling(mut self, factor: f64, offset: f64) -> Self {
        self.factor = factor;
        self.offset = offset;
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_multiplex(mut self, multiplex: MultiplexIndicator) -> Self {
        self.multiplex = multiplex;
        self
    }

    pub fn with_value_description(mut self, code: i64, label: impl Into<String>) -> Self {
        self.value_descriptions.insert(code, label.into());
        self
    }

    /// True for signed integer signals
    pub fn is_signed(&self) -> bool {
        self.value_type == ValueType::SignedInt
    }

    /// True when `[min, max]` is a real range (DBC uses `[0|0]` for "none")
    pub fn has_range(&self) -> bool {
        self.min < self.max
    }

    /// One past the last absolute bit this signal touches
    pub fn bit_extent(&self) -> usize {
        BitFieldCodec::normalize_start_bit(self.start_bit as usize, self.byte_order)
            + self.bit_length as usize
    }

    /// Check the signal layout on its own
    fn validate(&self) -> Result<()> {
        let length = self.bit_length as usize;
        let invalid = |reason: &str| {
            Err(DecoderError::InvalidSignalDefinition(format!(
                "signal '{}': {}",
                self.name, reason
            )))
        };

        match self.value_type {
            ValueType::FixedString => {
                let first =
                    BitFieldCodec::normalize_start_bit(self.start_bit as usize, self.byte_order);
                if length == 0 || length % 8 != 0 || first % 8 != 0 {
                    return invalid("string signals must be whole, byte aligned bytes");
                }
            }
            ValueType::Float if length != 32 => return invalid("float signals are 32 bits"),
            ValueType::Double if length != 64 => return invalid("double signals are 64 bits"),
            _ if length == 0 || length > 64 => {
                return invalid("numeric signals are 1..=64 bits");
            }
            _ => {}
        }

        if self.factor == 0.0 {
            return invalid("factor must not be zero");
        }

        Ok(())
    }
}

/// Number of CAN frames that make up one logical message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Fits into one classic frame
    Simple,
    /// Carried in fast-packet sequences
    FastPacket,
}

/// A complete CAN message definition
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDescriptor {
    /// Identifier or PGN this message is registered under
    pub key: MessageKey,
    /// Message name
    pub name: String,
    /// Declared size in bytes (0 when unknown)
    pub declared_byte_length: usize,
    /// Sender ECU name (optional)
    pub sender: Option<String>,
    signals: BTreeMap<String, SignalDescriptor>,
}

impl MessageDescriptor {
    /// Start building a message definition
    ///
    /// A plain `u32` key is a standard or extended identifier; use
    /// [`MessageKey::Pgn`] for J1939 messages matched by PGN.
    pub fn builder(
        key: impl Into<MessageKey>,
        name: impl Into<String>,
        declared_byte_length: usize,
    ) -> MessageBuilder {
        MessageBuilder {
            key: key.into(),
            name: name.into(),
            declared_byte_length,
            sender: None,
            signals: Vec::new(),
        }
    }

    /// All signals keyed by name
    pub fn signals(&self) -> &BTreeMap<String, SignalDescriptor> {
        &self.signals
    }

    pub fn signal(&self, name: &str) -> Option<&SignalDescriptor> {
        self.signals.get(name)
    }

    /// The multiplexor signal, if the message has one
    pub fn multiplexor(&self) -> Option<&SignalDescriptor> {
        self.signals
            .values()
            .find(|s| s.multiplex == MultiplexIndicator::Multiplexor)
    }

    /// True if this message has multiplexed signals
    pub fn is_multiplexed(&self) -> bool {
        self.signals
            .values()
            .any(|s| s.multiplex != MultiplexIndicator::None)
    }

    /// `max(declared length, bytes needed by the furthest signal)`
    pub fn min_size(&self) -> usize {
        let bit_limit = self
            .signals
            .values()
            .map(SignalDescriptor::bit_extent)
            .max()
            .unwrap_or(0);
        self.declared_byte_length.max(bit_limit.div_ceil(8))
    }

    /// Single frame or fast-packet, chosen by the payload size
    pub fn kind(&self) -> MessageKind {
        if self.min_size() > CLASSIC_MAX_BYTES {
            MessageKind::FastPacket
        } else {
            MessageKind::Simple
        }
    }
}

/// Builder for [`MessageDescriptor`]
#[derive(Debug)]
pub struct MessageBuilder {
    key: MessageKey,
    name: String,
    declared_byte_length: usize,
    sender: Option<String>,
    signals: Vec<SignalDescriptor>,
}

impl MessageBuilder {
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn signal(mut self, signal: SignalDescriptor) -> Self {
        self.signals.push(signal);
        self
    }

    /// Validate the layout and produce the descriptor
    pub fn build(self) -> Result<MessageDescriptor> {
        if self.declared_byte_length > FAST_PACKET_MAX_BYTES {
            return Err(DecoderError::InvalidSignalDefinition(format!(
                "message '{}' declares {} bytes (max {})",
                self.name, self.declared_byte_length, FAST_PACKET_MAX_BYTES
            )));
        }

        let mut signals = BTreeMap::new();
        let mut multiplexors = 0;
        for signal in self.signals {
            signal.validate()?;

            if self.declared_byte_length > 0 && signal.bit_extent() > self.declared_byte_length * 8 {
                return Err(DecoderError::InvalidSignalDefinition(format!(
                    "signal '{}' ends at bit {} beyond {}-byte message '{}'",
                    signal.name,
                    signal.bit_extent(),
                    self.declared_byte_length,
                    self.name
                )));
            }
            if signal.multiplex == MultiplexIndicator::Multiplexor {
                multiplexors += 1;
            }
            if signals.contains_key(&signal.name) {
                return Err(DecoderError::InvalidSignalDefinition(format!(
                    "duplicate signal '{}' in message '{}'",
                    signal.name, self.name
                )));
            }
            signals.insert(signal.name.clone(), signal);
        }

        if multiplexors > 1 {
            return Err(DecoderError::InvalidSignalDefinition(format!(
                "message '{}' has {} multiplexors; only one is supported",
                self.name, multiplexors
            )));
        }

        Ok(MessageDescriptor {
            key: self.key,
            name: self.name,
            declared_byte_length: self.declared_byte_length,
            sender: self.sender,
            signals,
        })
    }
}

/// Collects message definitions before they are frozen
#[derive(Debug, Default)]
pub struct MessageDictionaryBuilder {
    messages: HashMap<MessageKey, MessageDescriptor>,
}

impl MessageDictionaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message definition; keys must be unique
    pub fn add_message(&mut self, message: MessageDescriptor) -> Result<()> {
        if self.messages.contains_key(&message.key) {
            return Err(DecoderError::DuplicateMessage(message.key));
        }
        self.messages.insert(message.key, message);
        Ok(())
    }

    /// Merge another set of definitions; later duplicates are skipped with a warning
    pub fn extend(&mut self, messages: impl IntoIterator<Item = MessageDescriptor>) {
        for message in messages {
            let key = message.key;
            if let Err(e) = self.add_message(message) {
                log::warn!("Skipping message {}: {}", key, e);
            }
        }
    }

    /// Freeze the dictionary
    pub fn build(self) -> MessageDictionary {
        MessageDictionary {
            messages: self.messages,
        }
    }
}

/// Immutable mapping from CAN ID / PGN to message definition
#[derive(Debug, Default)]
pub struct MessageDictionary {
    messages: HashMap<MessageKey, MessageDescriptor>,
}

impl MessageDictionary {
    pub fn builder() -> MessageDictionaryBuilder {
        MessageDictionaryBuilder::new()
    }

    /// Look up a message by its exact key
    pub fn lookup(&self, key: MessageKey) -> Option<&MessageDescriptor> {
        self.messages.get(&key)
    }

    /// Message for a received frame.
    ///
    /// Standard frames only match standard keys. Extended frames match their
    /// exact identifier first, then the PGN they carry.
    pub fn lookup_frame(&self, arbitration_id: u32, is_extended: bool) -> Option<&MessageDescriptor> {
        if is_extended {
            self.lookup(MessageKey::Extended(arbitration_id))
                .or_else(|| self.lookup(MessageKey::Pgn(j1939::pgn(arbitration_id))))
        } else {
            self.lookup(MessageKey::Standard(arbitration_id))
        }
    }

    /// Get all known keys, sorted
    pub fn keys(&self) -> Vec<MessageKey> {
        let mut keys: Vec<MessageKey> = self.messages.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Find all messages containing a specific signal name
    pub fn find_signal(&self, signal_name: &str) -> Vec<(MessageKey, &SignalDescriptor)> {
        let mut found: Vec<_> = self
            .messages
            .values()
            .filter_map(|msg| msg.signal(signal_name).map(|sig| (msg.key, sig)))
            .collect();
        found.sort_unstable_by_key(|(key, _)| *key);
        found
    }

    /// Get dictionary statistics
    pub fn stats(&self) -> DictionaryStats {
        DictionaryStats {
            num_messages: self.messages.len(),
            num_signals: self.messages.values().map(|m| m.signals.len()).sum(),
            num_fast_packet: self
                .messages
                .values()
                .filter(|m| m.kind() == MessageKind::FastPacket)
                .count(),
        }
    }
}

/// Dictionary statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryStats {
    /// Total number of message definitions
    pub num_messages: usize,
    /// Total number of signal definitions
    pub num_signals: usize,
    /// Messages carried as fast-packet sequences
    pub num_fast_packet: usize,
}
