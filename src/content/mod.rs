//! Content checksums
//!
//! This module provides streaming CRC-32 digests of watched files. Memory
//! use is bounded by the chunk size, independent of the file size.

pub mod checksum;

pub use checksum::{digest_bytes, digest_file, digest_reader, Crc32, CHUNK_SIZE};
