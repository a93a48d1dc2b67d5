//! candump text logs
//!
//! Reads the two line formats written by can-utils:
//!
//! ```text
//! (1623412345.123456) can0 18EEFF00#0102030405060708
//! <0x18EEFF00> [8] 01 02 03 04 05 06 07 08
//! ```
//!
//! The compact form may omit the timestamp or the interface name, carry a
//! remote request (`123#R`) or a CAN FD payload (`123##<flags><data>`).
//! The bracketed form may be preceded by a timestamp; without one the frame
//! is stamped 0. Blank lines and lines starting with `#` or `//` are skipped.
//! A malformed line yields an error item and reading continues.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use super::LogFileParser;
use crate::transport::FrameEgress;
use crate::types::{DecoderError, RawFrame, Result};

const CLASSIC_MAX_DATA: usize = 8;
const FD_MAX_DATA: usize = 64;
const STANDARD_ID_MAX: u32 = 0x7FF;
const EXTENDED_ID_MAX: u32 = 0x1FFF_FFFF;

/// Iterator over the frames of a candump log
pub struct CandumpReader<R> {
    lines: io::Lines<R>,
    line_number: usize,
}

impl<R: BufRead> CandumpReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
        }
    }
}

impl LogFileParser for CandumpReader<BufReader<File>> {
    fn parse(path: &Path) -> Result<Self> {
        log::debug!("Opening candump log: {:?}", path);
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> Iterator for CandumpReader<R> {
    type Item = Result<RawFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_number += 1;

            match parse_line(&line) {
                Ok(Some(frame)) => return Some(Ok(frame)),
                Ok(None) => continue,
                Err(e) => {
                    log::debug!("Line {}: {}", self.line_number, e);
                    return Some(Err(DecoderError::LogParseError(format!(
                        "line {}: {}",
                        self.line_number, e
                    ))));
                }
            }
        }
    }
}

/// Parse one log line. Returns `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<RawFrame>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
        return Ok(None);
    }

    let mut tokens = line.split_whitespace().peekable();
    let mut timestamp_us = 0;
    if let Some(token) = tokens.peek() {
        if let Some(inner) = token.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
            timestamp_us = parse_timestamp(inner)?;
            tokens.next();
        }
    }

    let rest: Vec<&str> = tokens.collect();
    if let Some(compact) = rest.iter().find(|t| t.contains('#')) {
        return parse_compact(timestamp_us, compact).map(Some);
    }
    if let Some(position) = rest.iter().position(|t| t.starts_with('<')) {
        return parse_bracketed(timestamp_us, &rest[position..]).map(Some);
    }

    Err(invalid(line, "no frame found"))
}

/// `[-]seconds.fraction` to microseconds
fn parse_timestamp(text: &str) -> Result<i64> {
    let (negative, magnitude) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (seconds, fraction) = magnitude.split_once('.').unwrap_or((magnitude, ""));
    if seconds.is_empty() || !seconds.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(text, "bad timestamp seconds"));
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(text, "bad timestamp fraction"));
    }

    let seconds: i64 = seconds
        .parse()
        .map_err(|_| invalid(text, "timestamp out of range"))?;
    let digits = &fraction[..fraction.len().min(6)];
    let micros = if digits.is_empty() {
        0
    } else {
        let value: i64 = digits
            .parse()
            .map_err(|_| invalid(text, "bad timestamp fraction"))?;
        value * 10i64.pow(6 - digits.len() as u32)
    };

    let total = seconds
        .checked_mul(1_000_000)
        .and_then(|us| us.checked_add(micros))
        .ok_or_else(|| invalid(text, "timestamp out of range"))?;
    Ok(if negative { -total } else { total })
}

/// `ID#DATA`, `ID#R` or `ID##<flags>DATA`
fn parse_compact(timestamp_us: i64, token: &str) -> Result<RawFrame> {
    let (id_text, data_text) = token
        .split_once('#')
        .ok_or_else(|| invalid(token, "missing '#'"))?;

    let is_extended = id_text.len() > 3;
    let arbitration_id = parse_id(id_text, is_extended)?;

    let (data_text, max_data) = match data_text.strip_prefix('#') {
        // First nibble after "##" holds the FD flags
        Some(fd) => (fd.get(1..).ok_or_else(|| invalid(token, "missing FD flags"))?, FD_MAX_DATA),
        None => (data_text, CLASSIC_MAX_DATA),
    };

    let data = if data_text.starts_with('R') {
        Vec::new()
    } else {
        parse_hex_bytes(&data_text.replace('.', ""))?
    };
    if data.len() > max_data {
        return Err(invalid(token, "too many data bytes"));
    }

    Ok(RawFrame {
        timestamp_us,
        arbitration_id,
        is_extended,
        data,
    })
}

/// `<0xID> [len] b0 b1 ...`
fn parse_bracketed(timestamp_us: i64, tokens: &[&str]) -> Result<RawFrame> {
    let id_token = tokens[0];
    let id_text = id_token
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .ok_or_else(|| invalid(id_token, "unterminated identifier"))?;
    let id_text = id_text
        .strip_prefix("0x")
        .or_else(|| id_text.strip_prefix("0X"))
        .unwrap_or(id_text);
    let arbitration_id = parse_id(id_text, true)?;

    let length_token = tokens
        .get(1)
        .ok_or_else(|| invalid(id_token, "missing length"))?;
    let length: usize = length_token
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| invalid(length_token, "bad length"))?;
    if length > CLASSIC_MAX_DATA {
        return Err(invalid(length_token, "length above 8"));
    }

    let data = tokens[2..]
        .iter()
        .map(|byte| u8::from_str_radix(byte, 16).map_err(|_| invalid(byte, "bad data byte")))
        .collect::<Result<Vec<u8>>>()?;
    if data.len() != length {
        return Err(invalid(
            length_token,
            &format!("declares {} bytes but has {}", length, data.len()),
        ));
    }

    Ok(RawFrame {
        timestamp_us,
        arbitration_id,
        is_extended: arbitration_id > STANDARD_ID_MAX,
        data,
    })
}

fn parse_id(text: &str, extended: bool) -> Result<u32> {
    let id = u32::from_str_radix(text, 16).map_err(|_| invalid(text, "bad identifier"))?;
    let max = if extended { EXTENDED_ID_MAX } else { STANDARD_ID_MAX };
    if id > max {
        return Err(invalid(text, "identifier out of range"));
    }
    Ok(id)
}

fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return Err(invalid(text, "odd number of hex digits"));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).map_err(|_| invalid(text, "bad hex data")))
        .collect()
}

fn invalid(text: &str, reason: &str) -> DecoderError {
    DecoderError::LogParseError(format!("{}: '{}'", reason, text))
}

/// Format a frame as a compact candump line
pub fn format_line(frame: &RawFrame, interface: &str) -> String {
    let seconds = frame.timestamp_us.div_euclid(1_000_000);
    let micros = frame.timestamp_us.rem_euclid(1_000_000);
    let id = if frame.is_extended {
        format!("{:08X}", frame.arbitration_id)
    } else {
        format!("{:03X}", frame.arbitration_id)
    };
    let data: String = frame.data.iter().map(|b| format!("{:02X}", b)).collect();
    format!("({}.{:06}) {} {}#{}", seconds, micros, interface, id, data)
}

/// Frame egress that writes candump lines, stamped with the wall clock
pub struct CandumpWriter<W> {
    out: W,
    interface: String,
}

impl<W: Write> CandumpWriter<W> {
    pub fn new(out: W, interface: impl Into<String>) -> Self {
        Self {
            out,
            interface: interface.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FrameEgress for CandumpWriter<W> {
    fn send_raw(&mut self, arbitration_id: u32, is_extended: bool, payload: &[u8]) -> io::Result<()> {
        let now = chrono::Utc::now().timestamp_micros();
        let frame = RawFrame::with_format(now, arbitration_id, is_extended, payload);
        writeln!(self.out, "{}", format_line(&frame, &self.interface))
    }
}
