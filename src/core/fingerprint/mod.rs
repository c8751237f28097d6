//! # Fingerprint Module
//!
//! Fast content identity for media files.
//!
//! A fingerprint is the CRC32 of the first [`PREFIX_BYTES`] of a file plus
//! its exact size. Reading is capped, so cost stays flat no matter how large
//! a video is. It is a probabilistic identity: two files that share a header
//! and a size but differ further in can collide. The organizer can confirm a
//! match byte for byte before trusting it (see `ArchiveConfig::verify_duplicates`).

use crate::error::ReadError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Maximum number of bytes read to fingerprint a file
pub const PREFIX_BYTES: usize = 64 * 1024;

/// Content identity token: prefix checksum plus total size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint {
    /// CRC32 of the leading bytes
    pub crc32: u32,
    /// Exact file size in bytes
    pub size: u64,
}

impl Fingerprint {
    /// Build a fingerprint from a prefix that was already read
    pub fn from_prefix(prefix: &[u8], size: u64) -> Self {
        let cap = prefix.len().min(PREFIX_BYTES);
        Self {
            crc32: crc32fast::hash(&prefix[..cap]),
            size,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}-{}", self.crc32, self.size)
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (crc, size) = s
            .split_once('-')
            .ok_or_else(|| format!("malformed fingerprint {s:?}"))?;
        if crc.len() != 8 {
            return Err(format!("malformed fingerprint {s:?}"));
        }
        let crc32 = u32::from_str_radix(crc, 16).map_err(|e| format!("bad checksum in {s:?}: {e}"))?;
        let size = size.parse().map_err(|e| format!("bad size in {s:?}: {e}"))?;
        Ok(Self { crc32, size })
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_string()
    }
}

/// Fingerprint a file on disk.
///
/// The size comes from the open handle, not from scan time, so a file that
/// grew or shrank since discovery is identified by what is there now.
/// Zero-length files are rejected: there is nothing to identify and they are
/// almost always truncated copies.
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint, ReadError> {
    let io_err = |source: std::io::Error| ReadError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    let size = file.metadata().map_err(io_err)?.len();
    if size == 0 {
        return Err(ReadError::Empty {
            path: path.to_path_buf(),
        });
    }

    let mut prefix = Vec::with_capacity(PREFIX_BYTES.min(size as usize));
    file.take(PREFIX_BYTES as u64)
        .read_to_end(&mut prefix)
        .map_err(io_err)?;

    Ok(Fingerprint::from_prefix(&prefix, size))
}
