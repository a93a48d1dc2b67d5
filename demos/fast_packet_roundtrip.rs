//! Send a long message through the fast-packet transmitter and decode it again
//!
//! Usage:
//!   fast_packet_roundtrip

use anyhow::Result;
use canbus_decoder::formats::CandumpWriter;
use canbus_decoder::j1939;
use canbus_decoder::{
    ByteOrder, Decoder, DecoderConfig, Dispatcher, FrameIngestion, MessageDescriptor, MessageKey,
    RawFrame, SignalDescriptor, SignalValue, Transmitter, ValueType,
};
use std::collections::BTreeMap;

const GNSS_POSITION: u32 = 129029;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    let message = MessageDescriptor::builder(MessageKey::Pgn(GNSS_POSITION), "GnssPosition", 43)
        .signal(SignalDescriptor::new("Sid", 0, 8, ByteOrder::LittleEndian, ValueType::UnsignedInt))
        .signal(
            SignalDescriptor::new("Latitude", 56, 64, ByteOrder::LittleEndian, ValueType::SignedInt)
                .with_scaling(1e-16, 0.0)
                .with_unit("deg"),
        )
        .signal(
            SignalDescriptor::new("Longitude", 120, 64, ByteOrder::LittleEndian, ValueType::SignedInt)
                .with_scaling(1e-16, 0.0)
                .with_unit("deg"),
        )
        .build()?;

    let mut builder = Decoder::builder();
    builder.add_message(message.clone())?;
    let decoder = builder.build();

    let mut values = BTreeMap::new();
    values.insert("Sid".to_string(), SignalValue::Physical(7.0));
    values.insert("Latitude".to_string(), SignalValue::Physical(51.5));
    values.insert("Longitude".to_string(), SignalValue::Physical(-0.125));

    let id = j1939::compose(3, GNSS_POSITION, 0xFF, 0x23)?;

    // Print the frames as candump lines
    let mut printer = Transmitter::new(CandumpWriter::new(std::io::stdout(), "vcan0"));
    printer.send(id, &message, &values)?;

    // And collect a second copy to feed back in
    let mut transmitter = Transmitter::new(Vec::<RawFrame>::new());
    let sent = transmitter.send(id, &message, &values)?;
    println!("sent {} frames", sent);

    let mut dispatcher = Dispatcher::new(decoder.frame_decoder(DecoderConfig::default()), |decoded| {
        for signal in decoded.signals.values() {
            println!(
                "{}.{} = {}",
                decoded.message_name,
                signal.name,
                signal.value.as_ref().map(|v| v.to_string()).unwrap_or_default()
            );
        }
    });
    for frame in transmitter.into_inner() {
        dispatcher.on_frame(frame.timestamp_us, frame.arbitration_id, frame.is_extended, &frame.data);
    }

    Ok(())
}
