//! DBC file loader
//!
//! Parses Vector DBC files with the `can-dbc` crate and converts them into
//! [`MessageDescriptor`]s ready for the dictionary builder.

use crate::j1939::PgnAddress;
use crate::signals::dictionary::{
    ByteOrder, MessageDescriptor, MessageKey, MultiplexIndicator, SignalDescriptor, ValueType,
};
use crate::types::{DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Flag DBC files set on extended (29-bit) identifiers
const DBC_EXTENDED_FLAG: u32 = 0x8000_0000;

/// String attribute overriding how a signal's bits are interpreted
const SIGNAL_TYPE_ATTRIBUTE: &str = "SignalType";

/// Which key a DBC message is registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbcKey {
    /// The identifier as written in the file
    #[default]
    ArbitrationId,
    /// The J1939 PGN of extended identifiers (standard ids stay as they are)
    Pgn,
}

/// Parse a DBC file and return message definitions
pub fn parse_dbc_file(path: &Path, key: DbcKey) -> Result<Vec<MessageDescriptor>> {
    log::info!("Parsing DBC file: {:?}", path);

    // Read the DBC file as bytes first (handle non-UTF8 encodings)
    let bytes = std::fs::read(path).map_err(|e| {
        DecoderError::DbcParseError(format!("Failed to read file {:?}: {}", path, e))
    })?;

    let messages = parse_dbc(&bytes, key)?;

    log::info!("Parsed {} messages from {:?}", messages.len(), path);

    Ok(messages)
}

/// Parse DBC content already in memory
pub fn parse_dbc(bytes: &[u8], key: DbcKey) -> Result<Vec<MessageDescriptor>> {
    // Fall back to Latin-1 for files written by Windows tools
    let dbc_content = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            log::warn!("DBC file is not UTF-8, trying Latin-1 encoding");
            bytes.iter().map(|&b| b as char).collect()
        }
    };

    let dbc = can_dbc::DBC::from_slice(dbc_content.as_bytes())
        .map_err(|e| DecoderError::DbcParseError(format!("{:?}", e)))?;

    dbc.messages()
        .iter()
        .map(|dbc_msg| convert_message(&dbc, dbc_msg, key))
        .collect()
}

/// Convert a can-dbc message to our MessageDescriptor
fn convert_message(
    dbc: &can_dbc::DBC,
    dbc_msg: &can_dbc::Message,
    key: DbcKey,
) -> Result<MessageDescriptor> {
    let raw_id = dbc_msg.message_id().0;
    let is_extended = raw_id & DBC_EXTENDED_FLAG != 0;
    let can_id = raw_id & !DBC_EXTENDED_FLAG;

    let message_key = match key {
        DbcKey::Pgn if is_extended => MessageKey::Pgn(PgnAddress::decompose(can_id).pgn),
        _ if is_extended => MessageKey::Extended(can_id),
        _ => MessageKey::Standard(can_id),
    };

    let mut builder = MessageDescriptor::builder(
        message_key,
        dbc_msg.message_name().as_str(),
        *dbc_msg.message_size() as usize,
    );
    if let can_dbc::Transmitter::NodeName(name) = dbc_msg.transmitter() {
        builder = builder.sender(name.as_str());
    }

    for dbc_sig in dbc_msg.signals() {
        builder = builder.signal(convert_signal(dbc, dbc_msg, dbc_sig));
    }

    builder.build()
}

/// Convert a can-dbc signal to our SignalDescriptor
fn convert_signal(
    dbc: &can_dbc::DBC,
    dbc_msg: &can_dbc::Message,
    dbc_sig: &can_dbc::Signal,
) -> SignalDescriptor {
    let byte_order = match *dbc_sig.byte_order() {
        can_dbc::ByteOrder::LittleEndian => ByteOrder::LittleEndian,
        can_dbc::ByteOrder::BigEndian => ByteOrder::BigEndian,
    };

    let value_descriptions = dbc
        .value_descriptions_for_signal(*dbc_msg.message_id(), dbc_sig.name())
        .unwrap_or_default();

    let value_type = signal_type_attribute(dbc, dbc_msg, dbc_sig)
        .or_else(|| extended_value_type(dbc, dbc_msg, dbc_sig))
        .unwrap_or(match *dbc_sig.value_type() {
            can_dbc::ValueType::Signed => ValueType::SignedInt,
            can_dbc::ValueType::Unsigned if !value_descriptions.is_empty() => ValueType::LookupEnum,
            can_dbc::ValueType::Unsigned => ValueType::UnsignedInt,
        });

    let multiplex = match *dbc_sig.multiplexer_indicator() {
        can_dbc::MultiplexIndicator::Multiplexor => MultiplexIndicator::Multiplexor,
        can_dbc::MultiplexIndicator::MultiplexedSignal(value) => {
            MultiplexIndicator::MultiplexedBy(value)
        }
        can_dbc::MultiplexIndicator::MultiplexorAndMultiplexedSignal(value) => {
            log::warn!(
                "Extended multiplexing not supported, '{}' treated as multiplexed by {}",
                dbc_sig.name(),
                value
            );
            MultiplexIndicator::MultiplexedBy(value)
        }
        can_dbc::MultiplexIndicator::Plain => MultiplexIndicator::None,
    };

    let mut signal = SignalDescriptor::new(
        dbc_sig.name().as_str(),
        *dbc_sig.start_bit() as u16,
        *dbc_sig.signal_size() as u16,
        byte_order,
        value_type,
    )
    .with_scaling(*dbc_sig.factor(), *dbc_sig.offset())
    .with_range(*dbc_sig.min(), *dbc_sig.max())
    .with_multiplex(multiplex);

    if !dbc_sig.unit().is_empty() {
        signal = signal.with_unit(dbc_sig.unit().as_str());
    }
    for description in value_descriptions {
        signal = signal.with_value_description(*description.a() as i64, description.b().as_str());
    }

    signal
}

/// `SIG_VALTYPE_` entry: 1 is IEEE float, 2 is IEEE double
fn extended_value_type(
    dbc: &can_dbc::DBC,
    dbc_msg: &can_dbc::Message,
    dbc_sig: &can_dbc::Signal,
) -> Option<ValueType> {
    match dbc.extended_value_type_for_signal(*dbc_msg.message_id(), dbc_sig.name())? {
        can_dbc::SignalExtendedValueType::IEEEfloat32Bit => Some(ValueType::Float),
        can_dbc::SignalExtendedValueType::IEEEdouble64bit => Some(ValueType::Double),
        can_dbc::SignalExtendedValueType::SignedOrUnsignedInteger => None,
    }
}

/// `BA_ "SignalType" SG_ ...` string attribute
fn signal_type_attribute(
    dbc: &can_dbc::DBC,
    dbc_msg: &can_dbc::Message,
    dbc_sig: &can_dbc::Signal,
) -> Option<ValueType> {
    let type_name = dbc.attribute_values().iter().find_map(|attribute| {
        if attribute.attribute_name() != SIGNAL_TYPE_ATTRIBUTE {
            return None;
        }
        match attribute.attribute_value() {
            can_dbc::AttributeValuedForObjectType::SignalAttributeValue(
                message_id,
                signal_name,
                can_dbc::AttributeValue::AttributeValueCharString(type_name),
            ) if message_id == dbc_msg.message_id() && signal_name == dbc_sig.name() => {
                Some(type_name.as_str())
            }
            _ => None,
        }
    })?;

    match type_name {
        "ASCIIZ" => Some(ValueType::FixedString),
        "LOOKUP" => Some(ValueType::LookupEnum),
        "DOUBLE" if *dbc_sig.signal_size() == 32 => Some(ValueType::Float),
        "DOUBLE" => Some(ValueType::Double),
        "INT" | "LONG" if *dbc_sig.value_type() == can_dbc::ValueType::Signed => {
            Some(ValueType::SignedInt)
        }
        "INT" | "LONG" => Some(ValueType::UnsignedInt),
        other => {
            log::warn!(
                "Unsupported {} '{}' on signal '{}', using its value type",
                SIGNAL_TYPE_ATTRIBUTE,
                other,
                dbc_sig.name()
            );
            None
        }
    }
}
