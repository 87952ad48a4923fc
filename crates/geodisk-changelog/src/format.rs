// SPDX-License-Identifier: Apache-2.0
//! On-disk record framing.
//!
//! Each record is a fixed 20-byte header, a 1..65535-byte payload, and a
//! 4-byte trailer checksum — 24 bytes of overhead per record plus the
//! payload:
//!
//! ```text
//! offset  size  field
//! 0       2     magic            (constant MAGIC)
//! 2       2     padding          (reserved, always 0)
//! 4       2     payload_size     (1..=65535)
//! 6       1     record_type      (UPDATE_RECORD | REMOVE_RECORD)
//! 7       1     reserved_type    (reserved, always 0)
//! 8       8     prev_offset      (offset of the previous record's magic byte, 0 for the first)
//! 16      4     crc_header       (CRC32 over bytes [0, 16))
//! 20      N     payload
//! 20+N    4     crc_trailer      (CRC32 over the payload only)
//! ```
//!
//! `crc_header` and `crc_trailer` are independent: a single corrupted word
//! in the fixed header (magic, size, type, prev-offset) fails `crc_header`
//! without touching `crc_trailer`, and a corrupted payload byte fails only
//! `crc_trailer`. This is what lets [`crate::repair`] tell "wrong magic" /
//! "wrong size" apart from "wrong checksum on an otherwise-intact frame".

use geodisk_core::error::CoreError;

/// Magic constant identifying the start of a record.
pub const MAGIC: u16 = 0x4C43; // little-endian bytes: 'C', 'L' ("changelog")

/// Byte length of the fixed header, up to and including `crc_header`.
pub const HEADER_LEN: usize = 20;

/// Byte length of the trailer (`crc_trailer`).
pub const TRAILER_LEN: usize = 4;

/// Total per-record framing overhead (header + trailer, excluding payload).
pub const FRAME_OVERHEAD: usize = HEADER_LEN + TRAILER_LEN;

/// Smallest legal payload size.
pub const MIN_PAYLOAD: usize = 1;

/// Largest legal payload size (payload_size is a 16-bit field).
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Magic constant identifying the changelog file header (distinct from the
/// per-record magic, so a truncated file can't be mistaken for a record).
pub const FILE_MAGIC: u32 = 0x4753_4C43; // 'G' 'S' 'L' 'C'

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Byte length of the file header.
pub const FILE_HEADER_LEN: usize = 8;

/// Record type tag: an `UPDATE_RECORD`.
pub const UPDATE_RECORD: u8 = 1;

/// Record type tag: a `REMOVE_RECORD`.
pub const REMOVE_RECORD: u8 = 2;

/// A decoded record header, plus the type tag (which callers need
/// alongside the payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Declared payload length.
    pub payload_size: u16,
    /// Record type tag (`UPDATE_RECORD`/`REMOVE_RECORD`, or an unrecognized
    /// value — the store does not reject unknown type tags, only callers
    /// interpreting metadata semantics do).
    pub record_type: u8,
    /// Offset of the previous record's first magic byte (0 for the first
    /// record in the log).
    pub prev_offset: u64,
}

/// CRC32 over the fixed header fields at bytes `[0, 16)`:
/// magic, padding, payload_size, record_type, reserved_type, prev_offset.
fn crc_header(magic: u16, payload_size: u16, record_type: u8, prev_offset: u64) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&magic.to_le_bytes());
    hasher.update(&0u16.to_le_bytes()); // padding
    hasher.update(&payload_size.to_le_bytes());
    hasher.update(&[record_type, 0u8]); // record_type + reserved_type
    hasher.update(&prev_offset.to_le_bytes());
    hasher.finalize()
}

/// CRC32 over the payload bytes only.
fn crc_trailer(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Encodes a full record (header + payload + trailer) ready to be appended.
///
/// # Errors
///
/// Returns [`CoreError::Internal`] if `payload` is empty or longer than
/// 65535 bytes (payload is `1..65535` bytes).
pub fn encode_record(
    record_type: u8,
    prev_offset: u64,
    payload: &[u8],
) -> Result<Vec<u8>, CoreError> {
    if payload.is_empty() || payload.len() > MAX_PAYLOAD {
        return Err(CoreError::Internal(format!(
            "payload size {} out of range 1..=65535",
            payload.len()
        )));
    }
    let payload_size = payload.len() as u16;
    let mut buf = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    buf.extend_from_slice(&MAGIC.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // padding
    buf.extend_from_slice(&payload_size.to_le_bytes());
    buf.push(record_type);
    buf.push(0u8); // reserved_type
    buf.extend_from_slice(&prev_offset.to_le_bytes());
    buf.extend_from_slice(&crc_header(MAGIC, payload_size, record_type, prev_offset).to_le_bytes());
    debug_assert_eq!(buf.len(), HEADER_LEN);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&crc_trailer(payload).to_le_bytes());
    Ok(buf)
}

/// Result of decoding a record header: which checks passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderCheck {
    /// Whether the magic word matched [`MAGIC`].
    pub magic_ok: bool,
    /// Whether `crc_header` matched the recomputed value. Only meaningful
    /// when `magic_ok` is true.
    pub header_crc_ok: bool,
    /// The decoded header fields, regardless of whether checks passed
    /// (repair needs the raw values to reason about what's salvageable).
    pub header: RecordHeader,
}

/// Decodes and verifies the 20-byte fixed header starting at `bytes[0]`.
///
/// `bytes` must be at least [`HEADER_LEN`] long.
#[must_use]
pub fn check_header(bytes: &[u8]) -> HeaderCheck {
    debug_assert!(bytes.len() >= HEADER_LEN);
    let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
    let payload_size = u16::from_le_bytes([bytes[4], bytes[5]]);
    let record_type = bytes[6];
    let prev_offset = u64::from_le_bytes(bytes[8..16].try_into().unwrap_or([0; 8]));
    let stored_crc = u32::from_le_bytes(bytes[16..20].try_into().unwrap_or([0; 4]));
    let recomputed = crc_header(magic, payload_size, record_type, prev_offset);
    HeaderCheck {
        magic_ok: magic == MAGIC,
        header_crc_ok: stored_crc == recomputed,
        header: RecordHeader {
            payload_size,
            record_type,
            prev_offset,
        },
    }
}

/// Verifies the trailer checksum against `payload`.
#[must_use]
pub fn check_trailer(payload: &[u8], trailer_bytes: &[u8; TRAILER_LEN]) -> bool {
    let stored = u32::from_le_bytes(*trailer_bytes);
    stored == crc_trailer(payload)
}

/// Checks whether a header whose magic bytes don't verify would
/// nevertheless verify if the magic word were the true [`MAGIC`] constant.
/// A match means only the magic word itself was damaged — `payload_size`,
/// `record_type`, and `prev_offset` are all still trustworthy, so the
/// record can be repaired in place by rewriting the magic word rather than
/// relocating past it.
#[must_use]
pub fn header_would_verify_with_true_magic(bytes: &[u8]) -> Option<RecordHeader> {
    debug_assert!(bytes.len() >= HEADER_LEN);
    let payload_size = u16::from_le_bytes([bytes[4], bytes[5]]);
    let record_type = bytes[6];
    let prev_offset = u64::from_le_bytes(bytes[8..16].try_into().unwrap_or([0; 8]));
    let stored_crc = u32::from_le_bytes(bytes[16..20].try_into().unwrap_or([0; 4]));
    let recomputed = crc_header(MAGIC, payload_size, record_type, prev_offset);
    (stored_crc == recomputed).then_some(RecordHeader {
        payload_size,
        record_type,
        prev_offset,
    })
}

/// Encodes the changelog file header (written once, at file creation).
#[must_use]
pub fn encode_file_header() -> [u8; FILE_HEADER_LEN] {
    let mut buf = [0u8; FILE_HEADER_LEN];
    buf[0..4].copy_from_slice(&FILE_MAGIC.to_le_bytes());
    buf[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf
}

/// Validates a decoded file header.
#[must_use]
pub fn check_file_header(bytes: &[u8; FILE_HEADER_LEN]) -> bool {
    let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap_or([0; 4]));
    magic == FILE_MAGIC
}
