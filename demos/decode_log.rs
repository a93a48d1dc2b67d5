//! Standalone candump log decoder
//!
//! Decodes a candump log with DBC signal definitions and prints each decoded
//! message followed by a summary.
//!
//! Usage:
//!   decode_log <candump.log> [--dbc <file.dbc>] [--pgn] [--limit <count>] [--verbose]
//!
//! Example:
//!   decode_log candump-2021-06-11.log --dbc n2k.dbc --pgn --limit 100

use anyhow::{bail, Context, Result};
use canbus_decoder::{DbcKey, DecodedMessage, Decoder, DecoderConfig, ReassemblyKey};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

fn print_message(message: &DecodedMessage, verbose: bool) {
    let secs = message.timestamp.timestamp() as f64
        + message.timestamp.timestamp_subsec_micros() as f64 / 1e6;
    let address = message
        .address
        .map(|a| format!(" pgn {} sa {}", a.pgn, a.source_address))
        .unwrap_or_default();
    println!(
        "[{:.6}s] 0x{:08X} {}{}",
        secs, message.arbitration_id, message.message_name, address
    );

    if verbose {
        for signal in message.signals.values().take(8) {
            let value = signal
                .value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".into());
            println!(
                "    {}: {}{} ({})",
                signal.name,
                value,
                signal.unit.as_deref().unwrap_or(""),
                signal.validity
            );
        }
        if message.signals.len() > 8 {
            println!("    ... and {} more signals", message.signals.len() - 8);
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage: {} <candump.log> [--dbc <file.dbc>] [--pgn] [--limit <count>] [--verbose]",
            args[0]
        );
        std::process::exit(1);
    }

    let log_file = PathBuf::from(&args[1]);
    let mut dbc_files = Vec::new();
    let mut dbc_key = DbcKey::ArbitrationId;
    let mut limit: Option<usize> = None;
    let mut verbose = false;

    let mut rest = args[2..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--dbc" => match rest.next() {
                Some(path) => dbc_files.push(PathBuf::from(path)),
                None => bail!("--dbc needs a file"),
            },
            "--limit" => {
                let count = rest.next().context("--limit needs a count")?;
                limit = Some(count.parse().context("--limit is not a number")?);
            }
            "--pgn" => dbc_key = DbcKey::Pgn,
            "--verbose" | "-v" => verbose = true,
            other => bail!("unknown argument: {}", other),
        }
    }

    let mut builder = Decoder::builder().dbc_key(dbc_key);
    for path in &dbc_files {
        builder
            .add_dbc(path)
            .with_context(|| format!("loading {:?}", path))?;
    }
    let decoder = builder.build();

    let config = DecoderConfig::new().with_reassembly_key(ReassemblyKey::AddressedPgn);
    let mut messages = decoder.decode_file(&log_file, config)?;

    let mut per_message: HashMap<String, usize> = HashMap::new();
    let mut shown = 0;
    for item in &mut messages {
        match item {
            Ok(message) => {
                *per_message.entry(message.message_name.clone()).or_default() += 1;
                print_message(&message, verbose);
                shown += 1;
            }
            Err(e) => eprintln!("skipped: {}", e),
        }
        if limit.is_some_and(|limit| shown >= limit) {
            break;
        }
    }

    let stats = messages.stats();
    println!("\n=== DECODING SUMMARY ===");
    println!("Frames processed:    {}", stats.frames);
    println!("Decoded messages:    {}", stats.decoded);
    println!("Unknown ids:         {}", stats.unknown_ids);
    println!("Reassembly failures: {}", stats.reassembly_failures);

    let mut sorted: Vec<_> = per_message.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1));
    if !sorted.is_empty() {
        println!("\nTop 10 Most Frequent Messages:");
        for (name, count) in sorted.iter().take(10) {
            println!("  {}: {} times", name, count);
        }
    }

    Ok(())
}
