//! Transport boundary
//!
//! Transports push received frames through [`FrameIngestion`] and accept
//! outgoing frames through [`FrameEgress`]. Sockets and TCP clients live
//! outside this crate; they only need to implement or call these traits.

use std::collections::BTreeMap;
use std::io;

use crate::decoder::FrameDecoder;
use crate::fastpacket::FastPacketSegmenter;
use crate::message_decoder::SignalEncoder;
use crate::signals::{MessageDescriptor, MessageKey, MessageKind};
use crate::types::{DecodedMessage, RawFrame, Result, SignalValue};

/// Push interface invoked by a transport for every received frame
pub trait FrameIngestion {
    fn on_frame(&mut self, timestamp_us: i64, arbitration_id: u32, is_extended: bool, payload: &[u8]);
}

/// Sink for frames leaving this node
pub trait FrameEgress {
    fn send_raw(&mut self, arbitration_id: u32, is_extended: bool, payload: &[u8]) -> io::Result<()>;
}

/// Collects sent frames in memory
impl FrameEgress for Vec<RawFrame> {
    fn send_raw(&mut self, arbitration_id: u32, is_extended: bool, payload: &[u8]) -> io::Result<()> {
        self.push(RawFrame::with_format(0, arbitration_id, is_extended, payload));
        Ok(())
    }
}

/// Ingestion endpoint that decodes frames and hands complete messages to a
/// handler.
///
/// The handler runs on the thread that calls [`FrameIngestion::on_frame`];
/// handing work off to other threads is up to the handler.
pub struct Dispatcher<H> {
    decoder: FrameDecoder,
    handler: H,
}

impl<H: FnMut(DecodedMessage)> Dispatcher<H> {
    pub fn new(decoder: FrameDecoder, handler: H) -> Self {
        Self { decoder, handler }
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    pub fn into_decoder(self) -> FrameDecoder {
        self.decoder
    }
}

impl<H: FnMut(DecodedMessage)> FrameIngestion for Dispatcher<H> {
    fn on_frame(&mut self, timestamp_us: i64, arbitration_id: u32, is_extended: bool, payload: &[u8]) {
        let frame = RawFrame::with_format(timestamp_us, arbitration_id, is_extended, payload);
        if let Some(message) = self.decoder.process(&frame) {
            (self.handler)(message);
        }
    }
}

/// Egress pipeline: encode, segment when needed, send each frame in order
pub struct Transmitter<E> {
    egress: E,
}

impl<E: FrameEgress> Transmitter<E> {
    pub fn new(egress: E) -> Self {
        Self { egress }
    }

    /// Encode `values` for `message` and send them under `arbitration_id`.
    ///
    /// The frame format follows the message key: only standard keys go out
    /// as 11-bit frames. Returns the number of frames sent.
    pub fn send(
        &mut self,
        arbitration_id: u32,
        message: &MessageDescriptor,
        values: &BTreeMap<String, SignalValue>,
    ) -> Result<usize> {
        let payload = SignalEncoder::encode(message, values)?;
        let is_extended = !matches!(message.key, MessageKey::Standard(_));
        self.send_payload(arbitration_id, is_extended, message.kind(), &payload)
    }

    /// Send an already encoded payload
    pub fn send_payload(
        &mut self,
        arbitration_id: u32,
        is_extended: bool,
        kind: MessageKind,
        payload: &[u8],
    ) -> Result<usize> {
        match kind {
            MessageKind::Simple => {
                self.egress.send_raw(arbitration_id, is_extended, payload)?;
                Ok(1)
            }
            MessageKind::FastPacket => {
                let frames = FastPacketSegmenter::segment(payload.len(), payload)?;
                for frame in &frames {
                    self.egress.send_raw(arbitration_id, is_extended, frame)?;
                }
                log::debug!(
                    "Sent 0x{:X} as {} fast-packet frames",
                    arbitration_id,
                    frames.len()
                );
                Ok(frames.len())
            }
        }
    }

    pub fn egress(&self) -> &E {
        &self.egress
    }

    pub fn into_inner(self) -> E {
        self.egress
    }
}
