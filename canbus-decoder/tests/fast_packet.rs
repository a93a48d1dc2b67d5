//! Fast-packet segmentation and reassembly through the public API

use canbus_decoder::fastpacket::{FastPacketReassembler, FastPacketSegmenter, ReassemblyStatus};
use canbus_decoder::{
    ByteOrder, DecodedMessage, Decoder, DecoderConfig, DiagnosticEvent, MessageDescriptor,
    MessageKey, PgnAddress, RawFrame, ReassemblyKey, SignalDescriptor, SignalValue, ValueType,
};
use proptest::prelude::*;

const PRODUCT_INFORMATION: u32 = 126996;
const LENGTH: usize = 181;

fn text_signal(name: &str, first_byte: u16, bytes: u16) -> SignalDescriptor {
    SignalDescriptor::new(name, first_byte * 8, bytes * 8, ByteOrder::LittleEndian, ValueType::FixedString)
}

fn decoder() -> Decoder {
    let message = MessageDescriptor::builder(MessageKey::Pgn(PRODUCT_INFORMATION), "ProductInformation", LENGTH)
        .signal(SignalDescriptor::new("Nmea2000Version", 0, 16, ByteOrder::LittleEndian, ValueType::UnsignedInt).with_scaling(0.001, 0.0))
        .signal(SignalDescriptor::new("ProductCode", 16, 16, ByteOrder::LittleEndian, ValueType::UnsignedInt))
        .signal(text_signal("ModelId", 4, 32))
        .signal(text_signal("SoftwareVersion", 36, 32))
        .signal(text_signal("SerialCode", 132, 32))
        .signal(SignalDescriptor::new("LoadEquivalency", 1440, 8, ByteOrder::LittleEndian, ValueType::UnsignedInt))
        .build()
        .unwrap();

    let mut builder = Decoder::builder();
    builder.add_message(message).unwrap();
    builder.build()
}

fn product_information(model: &str) -> Vec<u8> {
    let mut payload = vec![0xFF; LENGTH];
    payload[0..2].copy_from_slice(&2100u16.to_le_bytes());
    payload[2..4].copy_from_slice(&1234u16.to_le_bytes());
    payload[4..4 + model.len()].copy_from_slice(model.as_bytes());
    payload[36..41].copy_from_slice(b"1.2.3");
    payload[132..140].copy_from_slice(b"SN000042");
    payload[180] = 1;
    payload
}

fn id(priority: u32, source: u8) -> u32 {
    (priority << 26) | (PRODUCT_INFORMATION << 8) | source as u32
}

fn text(message: &DecodedMessage, name: &str) -> String {
    match message.signal(name).and_then(|s| s.value.clone()) {
        Some(SignalValue::Text(text)) => text,
        other => panic!("{} is not text: {:?}", name, other),
    }
}

#[test]
fn test_long_message_round_trip() {
    let payload = product_information("GPS 200");
    let frames = FastPacketSegmenter::segment_with_sequence(5, LENGTH, &payload).unwrap();
    assert_eq!(frames.len(), 26);
    assert_eq!(frames[25], [0xB9, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 1]);

    let decoder = decoder();
    let mut frame_decoder = decoder.frame_decoder(DecoderConfig::default());
    let mut messages = Vec::new();
    for (i, data) in frames.iter().enumerate() {
        if let Some(message) = frame_decoder.process(&RawFrame::new(i as i64, id(6, 0x23), data)) {
            messages.push((i, message));
        }
    }

    assert_eq!(messages.len(), 1);
    let (index, message) = &messages[0];
    assert_eq!(*index, 25);
    assert_eq!(message.message_name, "ProductInformation");
    assert_eq!(text(message, "ModelId"), "GPS 200");
    assert_eq!(text(message, "SoftwareVersion"), "1.2.3");
    assert_eq!(text(message, "SerialCode"), "SN000042");
    assert_eq!(message.signal("ProductCode").unwrap().value, Some(SignalValue::Physical(1234.0)));
    assert_eq!(message.signal("LoadEquivalency").unwrap().value, Some(SignalValue::Physical(1.0)));

    let stats = frame_decoder.stats();
    assert_eq!(stats.frames, 26);
    assert_eq!(stats.decoded, 1);
    assert_eq!(stats.streams[&id(6, 0x23)].completed, 1);
}

#[test]
fn test_recovers_after_interrupted_sequence() {
    let first = FastPacketSegmenter::segment_with_sequence(1, LENGTH, &product_information("OLD")).unwrap();
    let second = FastPacketSegmenter::segment_with_sequence(2, LENGTH, &product_information("NEW")).unwrap();

    let mut events: Vec<DiagnosticEvent> = Vec::new();
    let mut reassembler = FastPacketReassembler::new(0x23, LENGTH);
    for frame in &first[..10] {
        assert_eq!(reassembler.update(frame, &mut events), ReassemblyStatus::Accumulating);
    }

    let mut completed = None;
    for frame in &second {
        if let ReassemblyStatus::Complete(payload) = reassembler.update(frame, &mut events) {
            completed = Some(payload.to_vec());
        }
    }

    assert_eq!(completed, Some(product_information("NEW")));
    assert_eq!(reassembler.failure_count(), 1);
    assert_eq!(reassembler.complete_count(), 1);
    assert_eq!(
        events,
        vec![DiagnosticEvent::ReassemblyDesync {
            stream: 0x23,
            expected: LENGTH,
            accumulated: 6 + 9 * 7,
        }]
    );
}

/// Sender 0x10 changes priority mid-message, sender 0x20 interleaves with it
fn interleaved_frames() -> Vec<RawFrame> {
    let a = FastPacketSegmenter::segment_with_sequence(0, LENGTH, &product_information("ALPHA")).unwrap();
    let b = FastPacketSegmenter::segment_with_sequence(0, LENGTH, &product_information("BRAVO")).unwrap();

    let mut frames = Vec::new();
    for (i, (fa, fb)) in a.iter().zip(&b).enumerate() {
        let priority = if i % 2 == 0 { 3 } else { 6 };
        frames.push(RawFrame::new(2 * i as i64, id(priority, 0x10), fa));
        frames.push(RawFrame::new(2 * i as i64 + 1, id(6, 0x20), fb));
    }
    frames
}

fn decode_all(config: DecoderConfig) -> Vec<DecodedMessage> {
    let decoder = decoder();
    let mut frame_decoder = decoder.frame_decoder(config);
    interleaved_frames()
        .iter()
        .filter_map(|frame| frame_decoder.process(frame))
        .collect()
}

#[test]
fn test_interleaved_sources_by_addressed_pgn() {
    let messages = decode_all(DecoderConfig::new().with_reassembly_key(ReassemblyKey::AddressedPgn));
    assert_eq!(messages.len(), 2);

    let sources: Vec<u8> = messages
        .iter()
        .map(|m| m.address.map(|a| a.source_address).unwrap())
        .collect();
    assert_eq!(sources, vec![0x10, 0x20]);
    assert_eq!(text(&messages[0], "ModelId"), "ALPHA");
    assert_eq!(text(&messages[1], "ModelId"), "BRAVO");
}

#[test]
fn test_priority_change_splits_streams_by_arbitration_id() {
    let messages = decode_all(DecoderConfig::default());
    assert_eq!(messages.len(), 1);
    assert_eq!(text(&messages[0], "ModelId"), "BRAVO");
    assert_eq!(
        messages[0].address,
        Some(PgnAddress::decompose(id(6, 0x20)))
    );
}

proptest! {
    #[test]
    fn segment_then_reassemble(
        payload in proptest::collection::vec(any::<u8>(), 6..=223),
        sequence in 0u8..8,
    ) {
        let frames = FastPacketSegmenter::segment_with_sequence(sequence, payload.len(), &payload).unwrap();
        prop_assert_eq!(frames.len(), FastPacketSegmenter::frame_count(payload.len()));

        let mut events: Vec<DiagnosticEvent> = Vec::new();
        let mut reassembler = FastPacketReassembler::new(0, 223);
        let (last, rest) = frames.split_last().unwrap();
        for frame in rest {
            prop_assert_eq!(reassembler.update(frame, &mut events), ReassemblyStatus::Accumulating);
        }
        prop_assert_eq!(
            reassembler.update(last, &mut events),
            ReassemblyStatus::Complete(&payload[..])
        );
        prop_assert!(events.is_empty());
    }
}
