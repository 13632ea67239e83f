//! Segment command implementation.

use super::{open_context, CliError};
use serde::Serialize;
use sharedwal_core::{
    recovery_xlog_dir, segment_file_name, Config, PageRead, ReadSource, Severity, TimelineState,
    XLogReader, XLogRecPtr,
};

/// Result of reading one page.
#[derive(Debug, Serialize)]
pub struct SegmentResult {
    /// WAL directory read from.
    pub dir: String,
    /// Segment file name on the adopted timeline.
    pub segment: Option<String>,
    /// Requested WAL position.
    pub lsn: XLogRecPtr,
    /// Bytes read, zero if none.
    pub bytes_read: usize,
    /// Outcome of the read.
    pub outcome: String,
    /// First bytes of the page in hex.
    pub head: String,
}

const HEAD_LEN: usize = 32;

/// Parses a WAL position given in decimal, `0x` hex or `X/Y` notation.
pub fn parse_lsn(value: &str) -> Result<XLogRecPtr, CliError> {
    let invalid = || CliError::InvalidArgument(format!("invalid WAL position {value:?}"));

    if let Some((hi, lo)) = value.split_once('/') {
        let hi = u32::from_str_radix(hi, 16).map_err(|_| invalid())?;
        let lo = u32::from_str_radix(lo, 16).map_err(|_| invalid())?;
        return Ok((u64::from(hi) << 32) | u64::from(lo));
    }
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| invalid()),
        None => value.parse().map_err(|_| invalid()),
    }
}

/// Limits `len` so the read ends at the pre-read unit holding `lsn`.
fn clamp_len(lsn: XLogRecPtr, len: usize, unit: usize) -> Result<usize, CliError> {
    if len == 0 {
        return Err(CliError::InvalidArgument("length must be positive".into()));
    }
    let left_in_unit = unit - (lsn % unit as u64) as usize;
    Ok(len.min(left_in_unit))
}

/// Runs the segment command.
pub fn run(
    config: Config,
    instance: i32,
    timelines: Vec<u32>,
    lsn: XLogRecPtr,
    len: usize,
    format: &str,
) -> Result<(), CliError> {
    let ctx = open_context(config)?;
    let config = ctx.config();
    let len = clamp_len(lsn, len, config.pre_read_size)?;

    let dir = recovery_xlog_dir(&config.shared_root, &config.wal_dir_prefix, instance);
    let mut reader = XLogReader::new(&ctx, &dir, TimelineState::new(timelines))?;
    let mut page = vec![0u8; len];
    let outcome = reader.read_page(lsn, lsn, &mut page, ReadSource::PgXlog, Severity::Warning)?;

    let (bytes_read, outcome) = match outcome {
        PageRead::Read(n) => (n, "read".to_string()),
        PageRead::ShortRead { expected, actual } => {
            (0, format!("short read ({actual} of {expected} bytes)"))
        }
        PageRead::NotFound => (0, "segment not found".to_string()),
    };
    let segment = reader.current_segment().map(|segno| {
        segment_file_name(
            reader.timeline().cur_file_tli,
            segno,
            config.segments_per_log_id(),
        )
    });

    let result = SegmentResult {
        dir: dir.display().to_string(),
        segment,
        lsn,
        bytes_read,
        outcome,
        head: page[..bytes_read.min(HEAD_LEN)]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect(),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            println!("WAL Directory: {}", result.dir);
            println!("  Segment:  {}", result.segment.as_deref().unwrap_or("-"));
            println!("  Position: {:X}/{:X}", lsn >> 32, lsn as u32);
            println!("  Outcome:  {}", result.outcome);
            if !result.head.is_empty() {
                println!("  Head:     {}", result.head);
            }
        }
    }
    Ok(())
}
