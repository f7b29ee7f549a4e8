//! CRC-32 checksum calculation
//!
//! Uses the IEEE 802.3 polynomial (reflected 0xEDB88320) with the register
//! seeded and finalized with all-ones, i.e. the same value `cksum -a crc32b`
//! or zlib's `crc32()` produce. `crc32fast` picks a table-driven or SIMD
//! implementation at runtime; the result is identical either way.
//!
//! Files are streamed in [`CHUNK_SIZE`] chunks.

use crate::error::ChecksumError;
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Read buffer size used when streaming a file
pub const CHUNK_SIZE: usize = 16 * 1024;

/// A 32-bit CRC digest
///
/// Displays as eight lower-case hex digits, which is the form used in
/// mismatch reports and snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Crc32(pub u32);

impl Crc32 {
    /// Raw value
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Crc32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl From<u32> for Crc32 {
    fn from(value: u32) -> Self {
        Crc32(value)
    }
}

impl From<Crc32> for String {
    fn from(value: Crc32) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Crc32 {
    type Error = std::num::ParseIntError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        u32::from_str_radix(&value, 16).map(Crc32)
    }
}

/// Digest an in-memory buffer
///
/// # Example
///
/// ```
/// use crc_monitor::content::checksum::digest_bytes;
///
/// assert_eq!(digest_bytes(b"123456789").to_string(), "cbf43926");
/// ```
pub fn digest_bytes(content: &[u8]) -> Crc32 {
    let mut hasher = Hasher::new();
    hasher.update(content);
    Crc32(hasher.finalize())
}

/// Digest everything a reader yields, one chunk at a time
pub fn digest_reader<R: Read>(mut reader: R) -> Result<Crc32, ChecksumError> {
    let mut hasher = Hasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ChecksumError::Read(e)),
        }
    }

    Ok(Crc32(hasher.finalize()))
}

/// Digest the file at `path`
pub fn digest_file(path: &Path) -> Result<Crc32, ChecksumError> {
    let file = File::open(path).map_err(ChecksumError::Open)?;
    digest_reader(file)
}
