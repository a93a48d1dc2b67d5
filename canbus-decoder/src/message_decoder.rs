//! Message Decoding Engine
//!
//! Extracts signal values from a payload based on the message definition
//! from the dictionary, and writes them back for transmission. Handles
//! multiplexing, physical value conversion, range checks, "not available"
//! bit patterns and fixed-length text.

use std::collections::BTreeMap;

use crate::bitfield::BitFieldCodec;
use crate::config::DecoderConfig;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink};
use crate::signals::{MessageDescriptor, MultiplexIndicator, SignalDescriptor, ValueType};
use crate::types::{DecodedSignalValue, DecoderError, Result, SignalValue, Validity};

/// Trailing fill stripped from fixed-length text
const TEXT_FILL: [u8; 4] = [0x00, 0xFF, b'@', b' '];

/// Byte written wherever no signal value was supplied
pub const ENCODE_FILL: u8 = 0xFF;

/// Signals decoded from one payload
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedSignals {
    /// Raw multiplexor value, if the message has a multiplexor
    pub multiplexer_value: Option<u64>,
    pub signals: BTreeMap<String, DecodedSignalValue>,
}

/// Signal decoder - extracts signals from payloads
pub struct SignalDecoder;

impl SignalDecoder {
    /// Decode every active signal of `message` from `payload`.
    ///
    /// A signal that cannot be extracted is reported to `sink` and kept in
    /// the result with [`Validity::ExtractionError`]; its siblings are still
    /// decoded. Multiplexed signals are only present when the multiplexor
    /// selects them.
    pub fn decode(
        message: &MessageDescriptor,
        payload: &[u8],
        config: &DecoderConfig,
        sink: &mut dyn DiagnosticSink,
    ) -> DecodedSignals {
        let multiplexer_value = message.multiplexor().and_then(|mux| {
            BitFieldCodec::extract(
                payload,
                mux.start_bit as usize,
                mux.bit_length as usize,
                mux.byte_order,
            )
            .ok()
        });

        let mut signals = BTreeMap::new();
        for signal in message.signals().values() {
            let active = match signal.multiplex {
                MultiplexIndicator::None | MultiplexIndicator::Multiplexor => true,
                MultiplexIndicator::MultiplexedBy(value) => multiplexer_value == Some(value),
            };
            if !active {
                continue;
            }

            let decoded = match Self::decode_signal(signal, payload, config) {
                Ok(decoded) => decoded,
                Err(e) => {
                    sink.report(DiagnosticEvent::ExtractionFailed {
                        message: message.name.clone(),
                        signal: signal.name.clone(),
                        reason: e.to_string(),
                    });
                    DecodedSignalValue {
                        name: signal.name.clone(),
                        value: None,
                        unit: signal.unit.clone(),
                        validity: Validity::ExtractionError,
                    }
                }
            };
            signals.insert(signal.name.clone(), decoded);
        }

        DecodedSignals {
            multiplexer_value,
            signals,
        }
    }

    /// Decode a single signal, ignoring multiplexing
    pub fn decode_signal(
        signal: &SignalDescriptor,
        payload: &[u8],
        config: &DecoderConfig,
    ) -> Result<DecodedSignalValue> {
        let start = signal.start_bit as usize;
        let length = signal.bit_length as usize;
        let sentinels = config.detect_not_available;

        let value = match signal.value_type {
            ValueType::FixedString => Some(SignalValue::Text(Self::extract_text(signal, payload)?)),
            ValueType::Float | ValueType::Double => {
                let bits = BitFieldCodec::extract(payload, start, length, signal.byte_order)?;
                if sentinels && bits == BitFieldCodec::mask(length) {
                    None
                } else {
                    let raw = if length == 32 {
                        f32::from_bits(bits as u32) as f64
                    } else {
                        f64::from_bits(bits)
                    };
                    Some(SignalValue::Physical(Self::scale(signal, raw)))
                }
            }
            ValueType::SignedInt => {
                let raw = BitFieldCodec::extract_signed(payload, start, length, signal.byte_order)?;
                // Largest positive value means "not available"
                if sentinels && length >= 2 && raw == BitFieldCodec::mask(length - 1) as i64 {
                    None
                } else {
                    Some(SignalValue::Physical(Self::scale(signal, raw as f64)))
                }
            }
            ValueType::UnsignedInt | ValueType::LookupEnum => {
                let raw = BitFieldCodec::extract(payload, start, length, signal.byte_order)?;
                if sentinels && length >= 2 && raw == BitFieldCodec::mask(length) {
                    None
                } else if signal.value_type == ValueType::LookupEnum {
                    let code = raw as i64;
                    Some(SignalValue::Lookup {
                        code,
                        label: signal.value_descriptions.get(&code).cloned(),
                    })
                } else {
                    Some(SignalValue::Physical(Self::scale(signal, raw as f64)))
                }
            }
        };

        let validity = match &value {
            None => Validity::SentinelNotAvailable,
            Some(SignalValue::Physical(physical))
                if config.check_ranges && !Self::in_range(signal, *physical) =>
            {
                Validity::OutOfRange
            }
            Some(_) => Validity::Ok,
        };

        Ok(DecodedSignalValue {
            name: signal.name.clone(),
            value,
            unit: signal.unit.clone(),
            validity,
        })
    }

    fn scale(signal: &SignalDescriptor, raw: f64) -> f64 {
        raw * signal.factor + signal.offset
    }

    fn in_range(signal: &SignalDescriptor, physical: f64) -> bool {
        if !signal.has_range() {
            return true;
        }
        // Absorb rounding of raw * factor
        let tolerance = 1e-9 * signal.min.abs().max(signal.max.abs()).max(1.0);
        physical >= signal.min - tolerance && physical <= signal.max + tolerance
    }

    /// Whole bytes as ASCII with the trailing fill removed
    fn extract_text(signal: &SignalDescriptor, payload: &[u8]) -> Result<String> {
        let bytes = text_bytes(signal, payload.len()).map(|range| &payload[range])?;
        let end = bytes
            .iter()
            .rposition(|b| !TEXT_FILL.contains(b))
            .map_or(0, |last| last + 1);
        Ok(bytes[..end].iter().map(|&b| b as char).collect())
    }
}

/// Byte range of a fixed-length text signal inside a buffer of `available` bytes
fn text_bytes(signal: &SignalDescriptor, available: usize) -> Result<std::ops::Range<usize>> {
    let first = BitFieldCodec::normalize_start_bit(signal.start_bit as usize, signal.byte_order);
    let begin = first / 8;
    let end = begin + signal.bit_length as usize / 8;
    if end > available {
        return Err(DecoderError::Extraction {
            start: first,
            end: first + signal.bit_length as usize,
            available: available * 8,
        });
    }
    Ok(begin..end)
}

/// Signal encoder - builds payloads from physical values
pub struct SignalEncoder;

impl SignalEncoder {
    /// Encode `values` into a payload of `message.min_size()` bytes.
    ///
    /// Signals without a value keep the fill pattern, which decodes as "not
    /// available". A multiplexed message needs its multiplexor value; only
    /// signals it selects are written.
    pub fn encode(
        message: &MessageDescriptor,
        values: &BTreeMap<String, SignalValue>,
    ) -> Result<Vec<u8>> {
        if let Some(unknown) = values.keys().find(|name| message.signal(name).is_none()) {
            return Err(DecoderError::InvalidSignalValue(format!(
                "message '{}' has no signal '{}'",
                message.name, unknown
            )));
        }

        let selector = match message.multiplexor() {
            Some(mux) => {
                let value = values
                    .get(&mux.name)
                    .ok_or_else(|| DecoderError::MissingSignalValue(mux.name.clone()))?;
                Some(Self::raw_value(mux, value)?)
            }
            None => None,
        };

        let mut payload = vec![ENCODE_FILL; message.min_size()];
        for signal in message.signals().values() {
            let active = match signal.multiplex {
                MultiplexIndicator::None | MultiplexIndicator::Multiplexor => true,
                MultiplexIndicator::MultiplexedBy(value) => selector == Some(value),
            };
            let Some(value) = values.get(&signal.name).filter(|_| active) else {
                continue;
            };

            if signal.value_type == ValueType::FixedString {
                Self::insert_text(signal, value, &mut payload)?;
            } else {
                let raw = Self::raw_value(signal, value)?;
                BitFieldCodec::insert(
                    &mut payload,
                    signal.start_bit as usize,
                    signal.bit_length as usize,
                    signal.byte_order,
                    raw,
                )?;
            }
        }

        Ok(payload)
    }

    /// Raw bit pattern for a numeric or lookup signal
    fn raw_value(signal: &SignalDescriptor, value: &SignalValue) -> Result<u64> {
        let length = signal.bit_length as usize;
        let invalid = |reason: &str| {
            DecoderError::InvalidSignalValue(format!("signal '{}': {}", signal.name, reason))
        };

        let raw: i128 = match (signal.value_type, value) {
            (ValueType::FixedString, _) => return Err(invalid("text signals take text values")),
            (ValueType::Float | ValueType::Double, _) => {
                let physical = value.as_f64().ok_or_else(|| invalid("expects a number"))?;
                let raw = (physical - signal.offset) / signal.factor;
                return Ok(if length == 32 {
                    (raw as f32).to_bits() as u64
                } else {
                    raw.to_bits()
                });
            }
            (_, SignalValue::Lookup { code, .. }) => *code as i128,
            (_, SignalValue::Physical(physical)) => {
                let raw = ((physical - signal.offset) / signal.factor).round();
                if !raw.is_finite() {
                    return Err(invalid("value is not finite"));
                }
                raw as i128
            }
            (ValueType::LookupEnum, SignalValue::Text(label)) => signal
                .value_descriptions
                .iter()
                .find(|(_, description)| *description == label)
                .map(|(code, _)| *code as i128)
                .ok_or_else(|| invalid("unknown value description"))?,
            (_, SignalValue::Text(_)) => return Err(invalid("expects a number")),
        };

        let (low, high) = if signal.is_signed() {
            (-(1i128 << (length - 1)), (1i128 << (length - 1)) - 1)
        } else {
            (0, (1i128 << length) - 1)
        };
        if raw < low || raw > high {
            return Err(invalid(&format!("raw value {} does not fit {} bits", raw, length)));
        }

        // Two's complement; insert keeps the low bits
        Ok(raw as u64)
    }

    fn insert_text(signal: &SignalDescriptor, value: &SignalValue, payload: &mut [u8]) -> Result<()> {
        let SignalValue::Text(text) = value else {
            return Err(DecoderError::InvalidSignalValue(format!(
                "signal '{}': expects text",
                signal.name
            )));
        };
        let range = text_bytes(signal, payload.len())?;
        if !text.is_ascii() || text.len() > range.len() {
            return Err(DecoderError::InvalidSignalValue(format!(
                "signal '{}': '{}' is not ASCII of at most {} bytes",
                signal.name,
                text,
                range.len()
            )));
        }

        let field = &mut payload[range];
        field.fill(ENCODE_FILL);
        field[..text.len()].copy_from_slice(text.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::ByteOrder;

    fn le(name: &str, start: u16, length: u16, value_type: ValueType) -> SignalDescriptor {
        SignalDescriptor::new(name, start, length, ByteOrder::LittleEndian, value_type)
    }

    fn decode(message: &MessageDescriptor, payload: &[u8]) -> (DecodedSignals, Vec<DiagnosticEvent>) {
        let mut sink = Vec::new();
        let decoded = SignalDecoder::decode(message, payload, &DecoderConfig::default(), &mut sink);
        (decoded, sink)
    }

    fn engine() -> MessageDescriptor {
        MessageDescriptor::builder(0x123, "EngineData", 8)
            .signal(
                le("EngineSpeed", 0, 16, ValueType::UnsignedInt)
                    .with_scaling(0.25, 0.0)
                    .with_range(0.0, 8000.0)
                    .with_unit("rpm"),
            )
            .signal(
                le("EngineTemp", 16, 8, ValueType::UnsignedInt)
                    .with_scaling(1.0, -40.0)
                    .with_range(-40.0, 210.0),
            )
            .signal(
                le("Gear", 24, 3, ValueType::LookupEnum)
                    .with_value_description(0, "Park")
                    .with_value_description(3, "Drive"),
            )
            .signal(le("Torque", 32, 16, ValueType::SignedInt).with_scaling(0.5, 0.0))
            .build()
            .unwrap()
    }

    fn multiplexed() -> MessageDescriptor {
        MessageDescriptor::builder(0x200, "Muxed", 8)
            .signal(le("Mode", 0, 8, ValueType::UnsignedInt).with_multiplex(MultiplexIndicator::Multiplexor))
            .signal(le("SignalA", 8, 16, ValueType::UnsignedInt).with_multiplex(MultiplexIndicator::MultiplexedBy(0)))
            .signal(le("SignalB", 8, 16, ValueType::UnsignedInt).with_multiplex(MultiplexIndicator::MultiplexedBy(1)))
            .signal(le("Counter", 24, 8, ValueType::UnsignedInt))
            .build()
            .unwrap()
    }

    #[test]
    fn test_decode_scaled_signals() {
        let payload = [0x40, 0x1F, 0x64, 0x03, 0x38, 0xFF, 0, 0];
        let (decoded, sink) = decode(&engine(), &payload);
        assert!(sink.is_empty());

        let speed = &decoded.signals["EngineSpeed"];
        assert_eq!(speed.value, Some(SignalValue::Physical(2000.0)));
        assert_eq!(speed.unit.as_deref(), Some("rpm"));
        assert!(speed.is_ok());

        assert_eq!(decoded.signals["EngineTemp"].value, Some(SignalValue::Physical(60.0)));
        assert_eq!(
            decoded.signals["Gear"].value,
            Some(SignalValue::Lookup { code: 3, label: Some("Drive".into()) })
        );
        // 0xFF38 = -200
        assert_eq!(decoded.signals["Torque"].value, Some(SignalValue::Physical(-100.0)));
        assert_eq!(decoded.multiplexer_value, None);
    }

    #[test]
    fn test_out_of_range_keeps_value() {
        // 0xFE = 254 -> 214 C, above the 210 C limit
        let payload = [0, 0, 0xFE, 0, 0, 0, 0, 0];
        let (decoded, _) = decode(&engine(), &payload);
        let temp = &decoded.signals["EngineTemp"];
        assert_eq!(temp.validity, Validity::OutOfRange);
        assert_eq!(temp.value, Some(SignalValue::Physical(214.0)));

        let config = DecoderConfig::default().with_range_checks(false);
        let signal = engine().signal("EngineTemp").unwrap().clone();
        let temp = SignalDecoder::decode_signal(&signal, &payload, &config).unwrap();
        assert_eq!(temp.validity, Validity::Ok);
    }

    #[test]
    fn test_not_available_patterns() {
        let payload = [0xFF, 0xFF, 0xFF, 0x07, 0xFF, 0x7F, 0, 0];
        let (decoded, _) = decode(&engine(), &payload);
        for name in ["EngineSpeed", "EngineTemp", "Gear", "Torque"] {
            let signal = &decoded.signals[name];
            assert_eq!(signal.validity, Validity::SentinelNotAvailable, "{}", name);
            assert_eq!(signal.value, None);
        }

        let config = DecoderConfig::default().with_not_available_detection(false);
        let signal = engine().signal("EngineSpeed").unwrap().clone();
        let speed = SignalDecoder::decode_signal(&signal, &payload, &config).unwrap();
        assert_eq!(speed.value, Some(SignalValue::Physical(16383.75)));
        assert_eq!(speed.validity, Validity::OutOfRange);
    }

    #[test]
    fn test_negative_one_is_not_a_sentinel() {
        let payload = [0, 0, 0, 0, 0xFF, 0xFF, 0, 0];
        let (decoded, _) = decode(&engine(), &payload);
        assert_eq!(decoded.signals["Torque"].value, Some(SignalValue::Physical(-0.5)));
    }

    #[test]
    fn test_multiplex_exclusivity() {
        let (decoded, _) = decode(&multiplexed(), &[1, 0x10, 0x00, 7, 0, 0, 0, 0]);
        assert_eq!(decoded.multiplexer_value, Some(1));
        assert!(decoded.signals.contains_key("Mode"));
        assert!(decoded.signals.contains_key("Counter"));
        assert_eq!(decoded.signals["SignalB"].value, Some(SignalValue::Physical(16.0)));
        assert!(!decoded.signals.contains_key("SignalA"));

        let (decoded, _) = decode(&multiplexed(), &[0, 0x10, 0x00, 7, 0, 0, 0, 0]);
        assert!(decoded.signals.contains_key("SignalA"));
        assert!(!decoded.signals.contains_key("SignalB"));

        // No matching branch at all
        let (decoded, _) = decode(&multiplexed(), &[5, 0x10, 0x00, 7, 0, 0, 0, 0]);
        assert_eq!(decoded.signals.len(), 2);
    }

    #[test]
    fn test_extraction_error_is_per_signal() {
        let message = MessageDescriptor::builder(0x300, "Short", 0)
            .signal(le("First", 0, 8, ValueType::UnsignedInt))
            .signal(le("Second", 8, 16, ValueType::UnsignedInt))
            .build()
            .unwrap();

        let (decoded, sink) = decode(&message, &[0x2A, 0x01]);
        assert_eq!(decoded.signals["First"].value, Some(SignalValue::Physical(42.0)));
        assert_eq!(decoded.signals["Second"].validity, Validity::ExtractionError);
        assert_eq!(decoded.signals["Second"].value, None);
        assert_eq!(sink.len(), 1);
        assert!(matches!(&sink[0], DiagnosticEvent::ExtractionFailed { signal, .. } if signal == "Second"));
    }

    #[test]
    fn test_fixed_string_trims_fill() {
        let message = MessageDescriptor::builder(0x400, "Name", 8)
            .signal(le("Text", 0, 64, ValueType::FixedString))
            .build()
            .unwrap();
        let (decoded, _) = decode(&message, b"NAV1@@  ");
        assert_eq!(decoded.signals["Text"].value, Some(SignalValue::Text("NAV1".into())));

        let (decoded, _) = decode(&message, &[b'A', 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(decoded.signals["Text"].value, Some(SignalValue::Text("A".into())));
    }

    #[test]
    fn test_float_and_double() {
        let message = MessageDescriptor::builder(0x500, "Floats", 12)
            .signal(le("Single", 0, 32, ValueType::Float))
            .signal(le("Wide", 32, 64, ValueType::Double))
            .build()
            .unwrap();

        let mut payload = Vec::new();
        payload.extend_from_slice(&1.5f32.to_le_bytes());
        payload.extend_from_slice(&(-2.25f64).to_le_bytes());
        let (decoded, _) = decode(&message, &payload);
        assert_eq!(decoded.signals["Single"].value, Some(SignalValue::Physical(1.5)));
        assert_eq!(decoded.signals["Wide"].value, Some(SignalValue::Physical(-2.25)));

        let (decoded, _) = decode(&message, &[0xFF; 12]);
        assert_eq!(decoded.signals["Single"].validity, Validity::SentinelNotAvailable);
    }

    #[test]
    fn test_encode_then_decode() {
        let mut values = BTreeMap::new();
        values.insert("EngineSpeed".to_string(), SignalValue::Physical(1234.5));
        values.insert("Gear".to_string(), SignalValue::Text("Park".into()));
        values.insert("Torque".to_string(), SignalValue::Physical(-12.0));

        let payload = SignalEncoder::encode(&engine(), &values).unwrap();
        assert_eq!(payload.len(), 8);

        let (decoded, _) = decode(&engine(), &payload);
        assert_eq!(decoded.signals["EngineSpeed"].value, Some(SignalValue::Physical(1234.5)));
        assert_eq!(
            decoded.signals["Gear"].value,
            Some(SignalValue::Lookup { code: 0, label: Some("Park".into()) })
        );
        assert_eq!(decoded.signals["Torque"].value, Some(SignalValue::Physical(-12.0)));
        // Not supplied, left as fill
        assert_eq!(decoded.signals["EngineTemp"].validity, Validity::SentinelNotAvailable);
    }

    #[test]
    fn test_encode_multiplexed() {
        let mut values = BTreeMap::new();
        values.insert("SignalA".to_string(), SignalValue::Physical(5.0));
        assert!(matches!(
            SignalEncoder::encode(&multiplexed(), &values),
            Err(DecoderError::MissingSignalValue(name)) if name == "Mode"
        ));

        values.insert("Mode".to_string(), SignalValue::Physical(0.0));
        values.insert("SignalB".to_string(), SignalValue::Physical(9.0));
        let payload = SignalEncoder::encode(&multiplexed(), &values).unwrap();
        assert_eq!(&payload[..3], &[0, 5, 0]);
    }

    #[test]
    fn test_encode_rejects_bad_values() {
        let mut values = BTreeMap::new();
        values.insert("EngineTemp".to_string(), SignalValue::Physical(-41.0));
        assert!(matches!(
            SignalEncoder::encode(&engine(), &values),
            Err(DecoderError::InvalidSignalValue(_))
        ));

        let mut values = BTreeMap::new();
        values.insert("Missing".to_string(), SignalValue::Physical(1.0));
        assert!(SignalEncoder::encode(&engine(), &values).is_err());
    }

    #[test]
    fn test_encode_text() {
        let message = MessageDescriptor::builder(0x400, "Name", 8)
            .signal(le("Text", 0, 64, ValueType::FixedString))
            .build()
            .unwrap();
        let mut values = BTreeMap::new();
        values.insert("Text".to_string(), SignalValue::Text("HELM".into()));
        let payload = SignalEncoder::encode(&message, &values).unwrap();
        assert_eq!(payload, b"HELM\xFF\xFF\xFF\xFF");

        values.insert("Text".to_string(), SignalValue::Text("TOO LONG!".into()));
        assert!(SignalEncoder::encode(&message, &values).is_err());
    }
}
