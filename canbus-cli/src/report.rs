//! Output rendering
//!
//! Formats decoded messages as text or JSON lines and prints the end of run
//! summary.

use anyhow::Result;
use canbus_decoder::{DecodedMessage, DecoderStats, DictionaryStats, Validity};
use std::path::PathBuf;

use crate::config::OutputFormat;

/// Result of decoding one log file
#[derive(Debug, Default)]
pub struct FileReport {
    pub path: PathBuf,
    /// Rendered messages, one per line
    pub output: String,
    /// Lines the candump reader rejected
    pub parse_errors: u64,
    pub stats: DecoderStats,
}

/// Render one message in the requested format
pub fn render_message(message: &DecodedMessage, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(message)?),
        OutputFormat::Text => Ok(render_text(message)),
    }
}

fn render_text(message: &DecodedMessage) -> String {
    let mut line = format!(
        "{} 0x{:08X} {}",
        message
            .timestamp
            .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
        message.arbitration_id,
        message.message_name
    );
    if let Some(address) = &message.address {
        line.push_str(&format!(" [pgn {} sa {}]", address.pgn, address.source_address));
    }
    if let Some(mux) = message.multiplexer_value {
        line.push_str(&format!(" mux={}", mux));
    }

    for signal in message.signals.values() {
        line.push_str(&format!(" {}=", signal.name));
        match (&signal.value, signal.validity) {
            (Some(value), Validity::Ok) => line.push_str(&value.to_string()),
            (Some(value), validity) => line.push_str(&format!("{}({})", value, validity)),
            (None, validity) => line.push_str(&validity.to_string()),
        }
        if let (Some(unit), Some(_)) = (&signal.unit, &signal.value) {
            line.push_str(unit);
        }
    }
    line
}

/// Print the per-file and total counters
pub fn print_summary(reports: &[FileReport], dictionary: &DictionaryStats) {
    println!("\n📊 Summary");
    println!(
        "  Dictionary: {} messages, {} signals, {} fast-packet",
        dictionary.num_messages, dictionary.num_signals, dictionary.num_fast_packet
    );

    let mut total = DecoderStats::default();
    let mut parse_errors = 0;
    for report in reports {
        println!(
            "  {:?}: {} frames, {} messages, {} unknown, {} bad lines",
            report.path,
            report.stats.frames,
            report.stats.decoded,
            report.stats.unknown_ids,
            report.parse_errors
        );
        total.merge(&report.stats);
        parse_errors += report.parse_errors;
    }

    println!("───────────────────────────────────────────────");
    println!("  Frames:              {}", total.frames);
    println!("  Decoded messages:    {}", total.decoded);
    println!("  Filtered frames:     {}", total.filtered);
    println!("  Unknown ids:         {}", total.unknown_ids);
    println!("  Extraction errors:   {}", total.extraction_errors);
    println!("  Reassembly failures: {}", total.reassembly_failures);
    println!("  Fast-packet streams: {}", total.streams.len());
    println!("  Unparsable lines:    {}", parse_errors);
}

#[cfg(test)]
mod tests {
    use super::*;
    use canbus_decoder::{DecodedSignalValue, PgnAddress, SignalValue};
    use std::collections::BTreeMap;

    fn message() -> DecodedMessage {
        let mut signals = BTreeMap::new();
        signals.insert(
            "Speed".to_string(),
            DecodedSignalValue {
                name: "Speed".into(),
                value: Some(SignalValue::Physical(12.5)),
                unit: Some("kn".into()),
                validity: Validity::Ok,
            },
        );
        signals.insert(
            "Heading".to_string(),
            DecodedSignalValue {
                name: "Heading".into(),
                value: None,
                unit: Some("rad".into()),
                validity: Validity::SentinelNotAvailable,
            },
        );
        DecodedMessage {
            timestamp: chrono::DateTime::from_timestamp(1_623_412_345, 0).unwrap(),
            arbitration_id: 0x09F8_0223,
            address: Some(PgnAddress::decompose(0x09F8_0223)),
            message_name: "CogSogRapid".into(),
            multiplexer_value: None,
            signals,
        }
    }

    #[test]
    fn test_render_text() {
        let line = render_message(&message(), OutputFormat::Text).unwrap();
        assert_eq!(
            line,
            "2021-06-11T11:52:25.000000Z 0x09F80223 CogSogRapid [pgn 129026 sa 35] Heading=n/a Speed=12.500kn"
        );
    }

    #[test]
    fn test_render_json() {
        let line = render_message(&message(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["message_name"], "CogSogRapid");
        assert_eq!(value["signals"]["Speed"]["value"], 12.5);
        assert_eq!(value["signals"]["Heading"]["validity"], "SentinelNotAvailable");
        assert!(value["signals"]["Heading"]["value"].is_null());
    }
}
