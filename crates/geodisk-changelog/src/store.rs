// SPDX-License-Identifier: Apache-2.0
//! The append-only changelog file: open/create, append, random-access read,
//! forward scan, and live follow.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use geodisk_core::error::{CoreError, CoreResult};
use tracing::{instrument, warn};

use crate::format::{
    self, check_header, check_trailer, encode_file_header, encode_record, FILE_HEADER_LEN,
    HEADER_LEN, TRAILER_LEN,
};

const MAX_IO_RETRIES: u32 = 3;

/// One decoded record as handed to a [`LogRecordScanner`].
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    /// Byte offset of the record's first magic byte.
    pub offset: u64,
    /// Record type tag (`UPDATE_RECORD`/`REMOVE_RECORD`).
    pub record_type: u8,
    /// The record's payload bytes.
    pub payload: Vec<u8>,
}

/// Receives records from [`ChangelogFile::scan_all_records`] and
/// [`ChangelogFile::follow`] in ascending offset order.
pub trait LogRecordScanner {
    /// Called once per decoded record. Returning `false` stops the scan
    /// (used by `follow` to terminate after an expected count, mirroring
    /// the "scanner signals stop" contract).
    fn process_record(&mut self, record: &DecodedRecord) -> bool;
}

/// What moved the follower's state machine forward on a given step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FollowState {
    Reading,
    Eof,
    Sleeping,
    Stopped,
}

/// An open changelog file: append-only, single-writer, many-reader.
///
/// The append point is guarded by a mutex ("writes are
/// single-producer... the store therefore needs only an append-point
/// lock"). Reads and the follower use independent `File` handles and may
/// proceed concurrently with writes.
pub struct ChangelogFile {
    path: PathBuf,
    writer: Mutex<File>,
    next_offset: Mutex<u64>,
    last_record_offset: Mutex<u64>,
}

impl ChangelogFile {
    /// Opens an existing changelog file, or creates one with a fresh file
    /// header if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Io`] on OS failures, or [`CoreError::CorruptRecord`]
    /// if an existing file's header magic doesn't match.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let existed = path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| CoreError::io(format!("open {}", path.display()), e))?;

        let (next_offset, last_record_offset) = if existed
            && file_len(&file, &path)? >= FILE_HEADER_LEN as u64
        {
            let mut header = [0u8; FILE_HEADER_LEN];
            file.seek(SeekFrom::Start(0))
                .map_err(|e| CoreError::io(format!("seek header {}", path.display()), e))?;
            file.read_exact(&mut header)
                .map_err(|e| CoreError::io(format!("read header {}", path.display()), e))?;
            if !format::check_file_header(&header) {
                return Err(CoreError::CorruptRecord {
                    offset: 0,
                    reason: "file header magic mismatch".to_owned(),
                });
            }
            let len = file_len(&file, &path)?;
            let last = find_last_record_offset(&mut file, len)?;
            (len, last)
        } else {
            file.set_len(0)
                .map_err(|e| CoreError::io(format!("truncate {}", path.display()), e))?;
            file.write_all(&encode_file_header())
                .map_err(|e| CoreError::io(format!("write header {}", path.display()), e))?;
            file.flush()
                .map_err(|e| CoreError::io(format!("flush header {}", path.display()), e))?;
            (FILE_HEADER_LEN as u64, 0)
        };

        Ok(Self {
            path,
            writer: Mutex::new(file),
            next_offset: Mutex::new(next_offset),
            last_record_offset: Mutex::new(last_record_offset),
        })
    }

    /// Returns the path this changelog file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a record and returns the byte offset of its first magic
    /// byte. Offsets returned across successive calls are monotonically
    /// increasing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Io`] after exhausting retries on a transient
    /// write failure, or [`CoreError::Internal`] if `payload` is out of the
    /// `1..=65535` range.
    #[instrument(skip(self, payload), fields(record_type, payload_len = payload.len()))]
    pub fn store_record(&self, record_type: u8, payload: &[u8]) -> CoreResult<u64> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| CoreError::Internal("changelog writer lock poisoned".to_owned()))?;
        let mut offset_guard = self
            .next_offset
            .lock()
            .map_err(|_| CoreError::Internal("changelog offset lock poisoned".to_owned()))?;
        let mut last_guard = self
            .last_record_offset
            .lock()
            .map_err(|_| CoreError::Internal("changelog last-offset lock poisoned".to_owned()))?;
        let offset = *offset_guard;
        let prev_offset = *last_guard;

        let frame = encode_record(record_type, prev_offset, payload)?;

        let mut attempt = 0;
        loop {
            match write_at(&mut writer, offset, &frame) {
                Ok(()) => break,
                Err(err) if attempt < MAX_IO_RETRIES => {
                    attempt += 1;
                    warn!(attempt, %err, "retrying changelog append");
                }
                Err(err) => return Err(err),
            }
        }
        writer
            .sync_data()
            .map_err(|e| CoreError::io("sync changelog append", e))?;

        *offset_guard = offset + frame.len() as u64;
        *last_guard = offset;
        Ok(offset)
    }

    /// Reads and verifies a single record starting at `offset`.
    ///
    /// # Errors
    ///
    /// [`CoreError::Truncated`] if fewer bytes are available than the
    /// framing declares; [`CoreError::CorruptRecord`] if magic or either
    /// CRC fails to verify.
    pub fn read_record(&self, offset: u64) -> CoreResult<DecodedRecord> {
        let mut file = self.reopen_reader()?;
        read_record_at(&mut file, offset)
    }

    /// Scans every record from the file header to EOF in ascending offset
    /// order, calling `scanner.process_record` for each. Stops early if the
    /// scanner returns `false`.
    ///
    /// # Errors
    ///
    /// [`CoreError::Truncated`] if a partial tail record is encountered;
    /// [`CoreError::CorruptRecord`] if a record fails to verify.
    pub fn scan_all_records(&self, scanner: &mut dyn LogRecordScanner) -> CoreResult<()> {
        let mut file = self.reopen_reader()?;
        let len = file_len(&file, &self.path)?;
        let mut offset = FILE_HEADER_LEN as u64;
        while offset < len {
            let record = read_record_at(&mut file, offset)?;
            let consumed = HEADER_LEN as u64
                + record.payload.len() as u64
                + TRAILER_LEN as u64;
            if !scanner.process_record(&record) {
                return Ok(());
            }
            offset += consumed;
        }
        Ok(())
    }

    /// Like [`Self::scan_all_records`], but blocks at EOF, polling every
    /// `poll_ms` milliseconds for newly appended records, until the scanner
    /// returns `false`.
    ///
    /// # Errors
    ///
    /// [`CoreError::CorruptRecord`] if a corrupted record is encountered;
    /// the follower transitions to `Stopped` and surfaces the error rather
    /// than looping forever.
    pub fn follow(&self, scanner: &mut dyn LogRecordScanner, poll_ms: u64) -> CoreResult<()> {
        let mut file = self.reopen_reader()?;
        let mut offset = FILE_HEADER_LEN as u64;
        let mut state = FollowState::Reading;
        loop {
            state = match state {
                FollowState::Reading => {
                    let len = file_len(&file, &self.path)?;
                    if offset + HEADER_LEN as u64 > len {
                        FollowState::Eof
                    } else {
                        match read_record_at(&mut file, offset) {
                            Ok(record) => {
                                let consumed = HEADER_LEN as u64
                                    + record.payload.len() as u64
                                    + TRAILER_LEN as u64;
                                if !scanner.process_record(&record) {
                                    return Ok(());
                                }
                                offset += consumed;
                                FollowState::Reading
                            }
                            Err(CoreError::Truncated { .. }) => FollowState::Eof,
                            Err(err @ CoreError::CorruptRecord { .. }) => {
                                return Err(err);
                            }
                            Err(err) => return Err(err),
                        }
                    }
                }
                FollowState::Eof => FollowState::Sleeping,
                FollowState::Sleeping => {
                    thread::sleep(Duration::from_millis(poll_ms));
                    FollowState::Reading
                }
                FollowState::Stopped => return Ok(()),
            };
        }
    }

    fn reopen_reader(&self) -> CoreResult<File> {
        File::open(&self.path).map_err(|e| CoreError::io(format!("reopen {}", self.path.display()), e))
    }
}

fn file_len(file: &File, path: &Path) -> CoreResult<u64> {
    file.metadata()
        .map(|m| m.len())
        .map_err(|e| CoreError::io(format!("stat {}", path.display()), e))
}

fn write_at(file: &mut File, offset: u64, bytes: &[u8]) -> CoreResult<()> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| CoreError::io("seek for append", e))?;
    file.write_all(bytes).map_err(|e| CoreError::io("write append", e))
}

/// Walks the log on open to find the offset of its last well-formed
/// record, so the next append can chain `prev_offset` correctly. A
/// best-effort walk: it stops (rather than erroring) at the first record
/// that fails to parse, since repairing a damaged tail is `repair`'s job,
/// not `open`'s.
fn find_last_record_offset(file: &mut File, len: u64) -> CoreResult<u64> {
    let mut offset = FILE_HEADER_LEN as u64;
    let mut last = 0u64;
    while offset < len {
        match read_record_at(file, offset) {
            Ok(record) => {
                last = offset;
                offset += HEADER_LEN as u64 + record.payload.len() as u64 + TRAILER_LEN as u64;
            }
            Err(_) => break,
        }
    }
    Ok(last)
}

/// Reads one framed record at `offset` from an already-open file handle,
/// verifying magic and both CRCs.
pub(crate) fn read_record_at(file: &mut File, offset: u64) -> CoreResult<DecodedRecord> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| CoreError::io("seek to record", e))?;

    let mut header_buf = [0u8; HEADER_LEN];
    let n = read_up_to(file, &mut header_buf)?;
    if n < HEADER_LEN {
        return Err(CoreError::Truncated {
            offset,
            available: n,
            expected: HEADER_LEN,
        });
    }

    let check = check_header(&header_buf);
    if !check.magic_ok {
        return Err(CoreError::CorruptRecord {
            offset,
            reason: "magic mismatch".to_owned(),
        });
    }
    if !check.header_crc_ok {
        return Err(CoreError::CorruptRecord {
            offset,
            reason: "header checksum mismatch".to_owned(),
        });
    }

    let payload_len = check.header.payload_size as usize;
    let mut payload = vec![0u8; payload_len];
    let n = read_up_to(file, &mut payload)?;
    if n < payload_len {
        return Err(CoreError::Truncated {
            offset,
            available: HEADER_LEN + n,
            expected: HEADER_LEN + payload_len + TRAILER_LEN,
        });
    }

    let mut trailer_buf = [0u8; TRAILER_LEN];
    let n = read_up_to(file, &mut trailer_buf)?;
    if n < TRAILER_LEN {
        return Err(CoreError::Truncated {
            offset,
            available: HEADER_LEN + payload_len + n,
            expected: HEADER_LEN + payload_len + TRAILER_LEN,
        });
    }
    if !check_trailer(&payload, &trailer_buf) {
        return Err(CoreError::CorruptRecord {
            offset,
            reason: "trailer checksum mismatch".to_owned(),
        });
    }

    Ok(DecodedRecord {
        offset,
        record_type: check.header.record_type,
        payload,
    })
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> CoreResult<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CoreError::io("read record bytes", e)),
        }
    }
    Ok(total)
}
