//! Main decoder API
//!
//! This module provides the primary interface for the decoder library.
//! [`DecoderBuilder`] loads signal definitions; the [`Decoder`] it produces
//! owns the frozen dictionary and hands out [`FrameDecoder`]s, one per frame
//! source, that share it read-only.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use crate::config::DecoderConfig;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink, LogSink};
use crate::fastpacket::{FastPacketReassembler, ReassemblyStatus};
use crate::formats::{CandumpReader, LogFileParser};
use crate::j1939::PgnAddress;
use crate::message_decoder::SignalDecoder;
use crate::signals::dbc::{self, DbcKey};
use crate::signals::{
    DictionaryStats, MessageDescriptor, MessageDictionary, MessageDictionaryBuilder, MessageKind,
};
use crate::types::{DecodedMessage, RawFrame, Result, Validity};

/// Loads definitions before the dictionary is frozen
#[derive(Debug, Default)]
pub struct DecoderBuilder {
    messages: MessageDictionaryBuilder,
    dbc_key: DbcKey,
}

impl DecoderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key used for messages of DBC files loaded afterwards
    pub fn dbc_key(mut self, key: DbcKey) -> Self {
        self.dbc_key = key;
        self
    }

    /// Load a DBC file and add its definitions
    ///
    /// # Example
    /// ```no_run
    /// use canbus_decoder::Decoder;
    /// use std::path::Path;
    ///
    /// let mut builder = Decoder::builder();
    /// builder.add_dbc(Path::new("powertrain.dbc")).unwrap();
    /// let decoder = builder.build();
    /// ```
    pub fn add_dbc(&mut self, path: &Path) -> Result<()> {
        log::info!("Loading DBC file: {:?}", path);

        let messages = dbc::parse_dbc_file(path, self.dbc_key)?;
        self.messages.extend(messages);

        log::info!("DBC file loaded successfully: {:?}", path);
        Ok(())
    }

    /// Add a single hand-written definition
    pub fn add_message(&mut self, message: MessageDescriptor) -> Result<()> {
        self.messages.add_message(message)
    }

    /// Freeze the dictionary
    pub fn build(self) -> Decoder {
        Decoder::from_dictionary(self.messages.build())
    }
}

/// The main decoder struct - entry point for all decoding operations
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    dictionary: Arc<MessageDictionary>,
}

impl Decoder {
    /// Decoder with an empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> DecoderBuilder {
        DecoderBuilder::new()
    }

    pub fn from_dictionary(dictionary: MessageDictionary) -> Self {
        Self {
            dictionary: Arc::new(dictionary),
        }
    }

    pub fn dictionary(&self) -> &Arc<MessageDictionary> {
        &self.dictionary
    }

    /// Get statistics about the loaded dictionary
    pub fn dictionary_stats(&self) -> DictionaryStats {
        self.dictionary.stats()
    }

    /// Per-source decoder reporting diagnostics to the `log` facade
    pub fn frame_decoder(&self, config: DecoderConfig) -> FrameDecoder {
        FrameDecoder::new(Arc::clone(&self.dictionary), config, Box::new(LogSink))
    }

    /// Decode a candump log file and return an iterator of decoded messages
    ///
    /// Frames that do not complete a message (unknown ids, filtered ids,
    /// partial fast-packet sequences) produce no item; unreadable lines
    /// produce an error item and decoding continues.
    ///
    /// # Example
    /// ```no_run
    /// use canbus_decoder::{Decoder, DecoderConfig};
    /// use std::path::Path;
    ///
    /// let decoder = Decoder::new();
    /// let messages = decoder.decode_file(Path::new("trace.log"), DecoderConfig::new()).unwrap();
    ///
    /// for message in messages {
    ///     match message {
    ///         Ok(decoded) => println!("Decoded message: {:?}", decoded),
    ///         Err(e) => eprintln!("Error: {}", e),
    ///     }
    /// }
    /// ```
    pub fn decode_file(
        &self,
        path: &Path,
        config: DecoderConfig,
    ) -> Result<DecodingIterator<CandumpReader<BufReader<File>>>> {
        log::info!("Decoding log file: {:?}", path);
        let frames = CandumpReader::parse(path)?;
        Ok(DecodingIterator::new(frames, self.frame_decoder(config)))
    }

    /// Decode frames from any source
    pub fn decode_frames<I>(&self, frames: I, config: DecoderConfig) -> DecodingIterator<I::IntoIter>
    where
        I: IntoIterator<Item = Result<RawFrame>>,
    {
        DecodingIterator::new(frames.into_iter(), self.frame_decoder(config))
    }
}

/// Counters for one fast-packet stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Frames fed to the reassembler
    pub updates: u64,
    /// Messages completed
    pub completed: u64,
    /// Sequences abandoned before completion
    pub failures: u64,
}

/// Decoding statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecoderStats {
    /// Frames processed
    pub frames: u64,
    /// Messages emitted
    pub decoded: u64,
    /// Frames dropped by the message filter
    pub filtered: u64,
    /// Frames without a dictionary entry
    pub unknown_ids: u64,
    /// Signals that could not be extracted
    pub extraction_errors: u64,
    /// Sum of all stream failures
    pub reassembly_failures: u64,
    /// Fast-packet streams by key
    pub streams: BTreeMap<u32, StreamStats>,
}

impl DecoderStats {
    /// Fold the counters of another decoder into these
    pub fn merge(&mut self, other: &DecoderStats) {
        self.frames += other.frames;
        self.decoded += other.decoded;
        self.filtered += other.filtered;
        self.unknown_ids += other.unknown_ids;
        self.extraction_errors += other.extraction_errors;
        self.reassembly_failures += other.reassembly_failures;
        for (key, stream) in &other.streams {
            let entry = self.streams.entry(*key).or_default();
            entry.updates += stream.updates;
            entry.completed += stream.completed;
            entry.failures += stream.failures;
        }
    }
}

/// Decoding pipeline for one frame source.
///
/// Owns the reassembly state of every fast-packet stream it sees, so one
/// instance must be fed from a single thread in arrival order. Independent
/// sources get their own instance and share the dictionary.
pub struct FrameDecoder {
    dictionary: Arc<MessageDictionary>,
    config: DecoderConfig,
    streams: HashMap<u32, FastPacketReassembler>,
    sink: Box<dyn DiagnosticSink + Send>,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new(
        dictionary: Arc<MessageDictionary>,
        config: DecoderConfig,
        sink: Box<dyn DiagnosticSink + Send>,
    ) -> Self {
        Self {
            dictionary,
            config,
            streams: HashMap::new(),
            sink,
            stats: DecoderStats::default(),
        }
    }

    /// Process one frame. Returns a message when the frame completes one.
    pub fn process(&mut self, frame: &RawFrame) -> Option<DecodedMessage> {
        self.stats.frames += 1;

        let id = frame.arbitration_id;
        let address = frame.is_extended.then(|| PgnAddress::decompose(id));
        let pgn = address.map(|address| address.pgn);

        if !self.config.should_process_message(id, pgn) {
            self.stats.filtered += 1;
            return None;
        }

        let Some(message) = self.dictionary.lookup_frame(id, frame.is_extended) else {
            self.stats.unknown_ids += 1;
            if self.config.emit_unknown {
                self.sink.report(DiagnosticEvent::UnknownMessageId {
                    arbitration_id: id,
                    pgn,
                });
            }
            return None;
        };

        let decoded = match message.kind() {
            MessageKind::Simple => {
                SignalDecoder::decode(message, &frame.data, &self.config, self.sink.as_mut())
            }
            MessageKind::FastPacket => {
                let stream = self.config.reassembly_key.stream_for(id, frame.is_extended);
                let capacity = message.min_size();
                let reassembler = self.streams.entry(stream).or_insert_with(|| {
                    log::debug!("New fast-packet stream 0x{:X} for {}", stream, message.name);
                    FastPacketReassembler::new(stream, capacity)
                });

                match reassembler.update(&frame.data, self.sink.as_mut()) {
                    ReassemblyStatus::Accumulating => return None,
                    ReassemblyStatus::Complete(payload) => {
                        SignalDecoder::decode(message, payload, &self.config, self.sink.as_mut())
                    }
                }
            }
        };

        self.stats.decoded += 1;
        self.stats.extraction_errors += decoded
            .signals
            .values()
            .filter(|signal| signal.validity == Validity::ExtractionError)
            .count() as u64;

        log::trace!("Decoded {} from 0x{:X}", message.name, id);
        Some(DecodedMessage {
            timestamp: frame.timestamp(),
            arbitration_id: id,
            address,
            message_name: message.name.clone(),
            multiplexer_value: decoded.multiplexer_value,
            signals: decoded.signals,
        })
    }

    /// Snapshot of the counters, including per-stream reassembly counts
    pub fn stats(&self) -> DecoderStats {
        let mut stats = self.stats.clone();
        for (key, reassembler) in &self.streams {
            stats.reassembly_failures += reassembler.failure_count();
            stats.streams.insert(
                *key,
                StreamStats {
                    updates: reassembler.update_count(),
                    completed: reassembler.complete_count(),
                    failures: reassembler.failure_count(),
                },
            );
        }
        stats
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }
}

/// Iterator that decodes frames into messages
///
/// This iterator wraps a frame iterator and feeds each frame through its
/// [`FrameDecoder`], yielding only frames that complete a message.
pub struct DecodingIterator<I> {
    frames: I,
    decoder: FrameDecoder,
}

impl<I> DecodingIterator<I>
where
    I: Iterator<Item = Result<RawFrame>>,
{
    fn new(frames: I, decoder: FrameDecoder) -> Self {
        Self { frames, decoder }
    }

    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }
}

impl<I> Iterator for DecodingIterator<I>
where
    I: Iterator<Item = Result<RawFrame>>,
{
    type Item = Result<DecodedMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.frames.next()? {
                Ok(frame) => {
                    if let Some(message) = self.decoder.process(&frame) {
                        return Some(Ok(message));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
