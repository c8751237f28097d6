//! QuickTime / ISO-BMFF movie header creation time.
//!
//! Walks top-level boxes to `moov`, then its children to `mvhd`. Box payloads
//! other than those are skipped with a seek, so large `mdat` boxes are never read.

use super::{DateOrigin, DateSource};
use crate::core::scanner::SourceFile;
use crate::error::MetadataError;
use chrono::{DateTime, NaiveDateTime};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

/// Seconds between 1904-01-01 (QuickTime epoch) and 1970-01-01
const QUICKTIME_EPOCH_OFFSET: u64 = 2_082_844_800;

/// Upper bound on boxes visited per level; guards against looping on junk
const MAX_BOXES: usize = 1024;

const CONTAINER_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "3gp"];

/// Reads `moov/mvhd` creation time from MP4 and MOV files
pub struct QuickTimeDateSource;

impl DateSource for QuickTimeDateSource {
    fn origin(&self) -> DateOrigin {
        DateOrigin::QuickTime
    }

    fn capture_time(&self, file: &SourceFile) -> Result<NaiveDateTime, MetadataError> {
        let supported = file
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| CONTAINER_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);
        if !supported {
            return Err(MetadataError::Unsupported {
                source_kind: "QuickTime",
            });
        }

        let mut reader = BufReader::new(File::open(&file.path)?);
        let seconds = read_creation_time(&mut reader)?;
        to_datetime(seconds)
    }
}

struct BoxHeader {
    kind: [u8; 4],
    /// Payload length, or `None` when the box runs to end of file
    payload: Option<u64>,
}

/// Read one box header. `Ok(None)` at a clean end of input.
fn read_header<R: Read>(reader: &mut R) -> Result<Option<BoxHeader>, MetadataError> {
    let mut head = [0u8; 8];
    match reader.read_exact(&mut head) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let size = u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as u64;
    let kind = [head[4], head[5], head[6], head[7]];

    let payload = match size {
        0 => None,
        1 => {
            let mut large = [0u8; 8];
            reader.read_exact(&mut large).map_err(truncated)?;
            let large = u64::from_be_bytes(large);
            Some(large.checked_sub(16).ok_or_else(|| corrupt("box size below header"))?)
        }
        n => Some(n.checked_sub(8).ok_or_else(|| corrupt("box size below header"))?),
    };

    Ok(Some(BoxHeader { kind, payload }))
}

/// Advance to the first box of `kind` within `limit` bytes. Returns its payload length.
fn find_box<R: Read + Seek>(
    reader: &mut R,
    kind: &[u8; 4],
    limit: Option<u64>,
) -> Result<Option<Option<u64>>, MetadataError> {
    let mut consumed = 0u64;

    for _ in 0..MAX_BOXES {
        if limit.is_some_and(|l| consumed >= l) {
            return Ok(None);
        }
        let start = reader.stream_position()?;
        let Some(header) = read_header(reader)? else {
            return Ok(None);
        };
        if &header.kind == kind {
            return Ok(Some(header.payload));
        }
        let Some(payload) = header.payload else {
            // Runs to end of file and is not what we want
            return Ok(None);
        };
        let header_len = reader.stream_position()? - start;
        let skip = i64::try_from(payload).map_err(|_| corrupt("box too large"))?;
        reader.seek(SeekFrom::Current(skip))?;
        consumed += header_len + payload;
    }

    Err(corrupt("too many boxes"))
}

fn read_creation_time<R: Read + Seek>(reader: &mut R) -> Result<u64, MetadataError> {
    let moov = find_box(reader, b"moov", None)?.ok_or(MetadataError::MissingTag { tag: "moov" })?;
    find_box(reader, b"mvhd", moov)?.ok_or(MetadataError::MissingTag { tag: "mvhd" })?;

    let mut version = [0u8; 4];
    reader.read_exact(&mut version).map_err(truncated)?;

    let seconds = match version[0] {
        0 => {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf).map_err(truncated)?;
            u32::from_be_bytes(buf) as u64
        }
        1 => {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf).map_err(truncated)?;
            u64::from_be_bytes(buf)
        }
        v => return Err(corrupt(&format!("unknown mvhd version {v}"))),
    };

    if seconds == 0 {
        // Unset by the muxer
        return Err(MetadataError::MissingTag {
            tag: "mvhd creation_time",
        });
    }
    Ok(seconds)
}

fn to_datetime(quicktime_seconds: u64) -> Result<NaiveDateTime, MetadataError> {
    // Timestamps before 1970 are kept negative so the plausibility window can reject them
    let unix = quicktime_seconds as i64 - QUICKTIME_EPOCH_OFFSET as i64;
    DateTime::from_timestamp(unix, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| corrupt("creation time out of range"))
}

fn corrupt(reason: &str) -> MetadataError {
    MetadataError::CorruptContainer {
        reason: reason.to_string(),
    }
}

fn truncated(_: std::io::Error) -> MetadataError {
    corrupt("truncated box")
}
