//! CAN Bus Decoder CLI Application
//!
//! Command-line front end for the canbus-decoder library:
//! - Loads DBC files into a frozen message dictionary
//! - Decodes candump logs, several files in parallel
//! - Prints decoded messages as text or JSON lines
//! - Prints a summary of decoding statistics

use anyhow::{Context, Result};
use canbus_decoder::formats::{CandumpReader, LogFileParser};
use canbus_decoder::{Decoder, DecoderConfig};
use clap::Parser;
use rayon::prelude::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

mod config;
mod report;

use config::{AppConfig, OutputFormat};
use report::FileReport;

/// CAN Bus Decoder - Decode candump logs with DBC signal definitions
#[derive(Parser, Debug)]
#[command(name = "canbus-cli")]
#[command(about = "Decode CAN, J1939 and NMEA 2000 candump logs", long_about = None)]
#[command(version)]
struct Args {
    /// candump log file(s) to decode (can be repeated)
    #[arg(short, long, value_name = "FILE")]
    log: Vec<PathBuf>,

    /// Path to DBC file(s) (can be repeated)
    #[arg(long, value_name = "FILE")]
    dbc: Vec<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format for decoded messages
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Maximum number of frames to decode per file (for testing)
    #[arg(long, value_name = "COUNT")]
    max_frames: Option<usize>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CAN Bus Decoder CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", canbus_decoder::VERSION);

    let config = merge_config(&args)?;

    if config.input.files.is_empty() && config.input.dbc_files.is_empty() {
        println!("CAN Bus Decoder - No input specified");
        println!("\nQuick Start:");
        println!("  canbus-cli --log candump.log --dbc n2k.dbc");
        println!("  canbus-cli --log a.log --log b.log --dbc n2k.dbc --format json");
        println!("\nWith a configuration file:");
        println!("  canbus-cli --config config.toml");
        println!("\nUse --help for more options");
        return Ok(());
    }

    run(&config, args.quiet)
}

/// Combine the configuration file with command line flags; flags win
fn merge_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    config.input.files.extend(args.log.iter().cloned());
    config.input.dbc_files.extend(args.dbc.iter().cloned());
    if let Some(format) = args.format {
        config.output.format = format;
    }
    if args.max_frames.is_some() {
        config.output.max_frames = args.max_frames;
    }

    Ok(config)
}

fn run(config: &AppConfig, quiet: bool) -> Result<()> {
    let mut builder = Decoder::builder().dbc_key(config.input.dbc_key);
    for dbc_path in &config.input.dbc_files {
        builder
            .add_dbc(dbc_path)
            .with_context(|| format!("Error loading DBC: {:?}", dbc_path))?;
    }
    let decoder = builder.build();

    let dictionary = decoder.dictionary_stats();
    log::info!(
        "Dictionary: {} messages, {} signals",
        dictionary.num_messages,
        dictionary.num_signals
    );

    if config.input.files.is_empty() {
        println!("✓ Message dictionary loaded successfully!");
        println!("  Add --log <candump.log> to decode CAN frames");
        return Ok(());
    }

    // One FrameDecoder per file; the dictionary is shared read-only
    let reports = config
        .input
        .files
        .par_iter()
        .map(|path| decode_log(&decoder, path, config))
        .collect::<Result<Vec<FileReport>>>()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for report in &reports {
        out.write_all(report.output.as_bytes())?;
    }
    out.flush()?;
    drop(out);

    if !quiet && config.output.format == OutputFormat::Text {
        report::print_summary(&reports, &dictionary);
    }

    Ok(())
}

/// Decode one log file into rendered output and counters
fn decode_log(decoder: &Decoder, path: &Path, config: &AppConfig) -> Result<FileReport> {
    log::info!("Decoding log file: {:?}", path);
    let frames = CandumpReader::parse(path)
        .with_context(|| format!("Failed to open log file: {:?}", path))?;
    let limit = config.output.max_frames.unwrap_or(usize::MAX);

    let decoder_config: DecoderConfig = config.decoder.clone();
    let mut messages = decoder.decode_frames(frames.take(limit), decoder_config);

    let mut report = FileReport {
        path: path.to_path_buf(),
        ..Default::default()
    };
    for item in &mut messages {
        match item {
            Ok(message) => {
                report
                    .output
                    .push_str(&report::render_message(&message, config.output.format)?);
                report.output.push('\n');
            }
            Err(e) => {
                log::warn!("{:?}: {}", path, e);
                report.parse_errors += 1;
            }
        }
    }
    report.stats = messages.stats();

    log::info!(
        "Finished {:?}: {} frames, {} messages",
        path,
        report.stats.frames,
        report.stats.decoded
    );
    Ok(report)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
