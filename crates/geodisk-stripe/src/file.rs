// SPDX-License-Identifier: Apache-2.0
//! A real-file-backed [`crate::StripeIo`] implementation, used for the
//! end-to-end RaidDP recovery scenario.

use std::path::{Path, PathBuf};
use std::time::Duration;

use geodisk_core::error::{CoreError, CoreResult};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::{OpenFlags, StripeIo, StripeStat};

/// A stripe target backed by one real file on local disk. All calls
/// serialize through an internal `tokio::sync::Mutex`, since `tokio::fs`
/// handles don't support concurrent positioned I/O without a seek-then-
/// read/write dance.
pub struct FileStripe {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileStripe {
    /// Creates a stripe bound to `path`; the file itself is opened lazily
    /// by [`StripeIo::open`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }
}

impl StripeIo for FileStripe {
    async fn open(
        &self,
        _url: &str,
        flags: OpenFlags,
        mode: u32,
        op_timeout: Duration,
    ) -> CoreResult<()> {
        let path = self.path.clone();
        let file = run_timed(op_timeout, async move {
            let mut options = OpenOptions::new();
            options.read(true).write(true);
            if matches!(flags, OpenFlags::Create) {
                options.create(true);
            }
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(mode);
            }
            #[cfg(not(unix))]
            let _ = mode;
            options
                .open(&path)
                .await
                .map_err(|e| CoreError::io(format!("open stripe {}", path.display()), e))
        })
        .await?;
        *self.file.lock().await = Some(file);
        Ok(())
    }

    async fn read(&self, offset: u64, len: usize, op_timeout: Duration) -> CoreResult<Vec<u8>> {
        let mut guard = self.file.lock().await;
        let file = require_open(&mut guard, &self.path)?;
        run_timed(op_timeout, async move {
            file.seek(std::io::SeekFrom::Start(offset))
                .await
                .map_err(|e| CoreError::io("seek stripe for read", e))?;
            let mut buf = vec![0u8; len];
            let mut total = 0;
            while total < len {
                let n = file
                    .read(&mut buf[total..])
                    .await
                    .map_err(|e| CoreError::io("read stripe", e))?;
                if n == 0 {
                    break;
                }
                total += n;
            }
            Ok(buf)
        })
        .await
    }

    async fn write(&self, offset: u64, buf: &[u8], op_timeout: Duration) -> CoreResult<()> {
        let mut guard = self.file.lock().await;
        let file = require_open(&mut guard, &self.path)?;
        run_timed(op_timeout, async move {
            file.seek(std::io::SeekFrom::Start(offset))
                .await
                .map_err(|e| CoreError::io("seek stripe for write", e))?;
            file.write_all(buf)
                .await
                .map_err(|e| CoreError::io("write stripe", e))
        })
        .await
    }

    async fn truncate(&self, offset: u64, op_timeout: Duration) -> CoreResult<()> {
        let mut guard = self.file.lock().await;
        let file = require_open(&mut guard, &self.path)?;
        run_timed(op_timeout, async move {
            file.set_len(offset).await.map_err(|e| CoreError::io("truncate stripe", e))
        })
        .await
    }

    async fn sync(&self, op_timeout: Duration) -> CoreResult<()> {
        let mut guard = self.file.lock().await;
        let file = require_open(&mut guard, &self.path)?;
        run_timed(op_timeout, async move {
            file.sync_data().await.map_err(|e| CoreError::io("sync stripe", e))
        })
        .await
    }

    async fn stat(&self, op_timeout: Duration) -> CoreResult<StripeStat> {
        let mut guard = self.file.lock().await;
        let file = require_open(&mut guard, &self.path)?;
        run_timed(op_timeout, async move {
            let metadata = file.metadata().await.map_err(|e| CoreError::io("stat stripe", e))?;
            let mtime_ms = metadata
                .modified()
                .ok()
                .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            Ok(StripeStat {
                size: metadata.len(),
                mtime_ms,
                mode: mode_bits(&metadata),
            })
        })
        .await
    }

    async fn close(&self, _timeout: Duration) -> CoreResult<()> {
        *self.file.lock().await = None;
        Ok(())
    }
}

fn require_open<'a>(
    guard: &'a mut Option<File>,
    path: &Path,
) -> CoreResult<&'a mut File> {
    guard
        .as_mut()
        .ok_or_else(|| CoreError::NotFound(format!("stripe {} not open", path.display())))
}

async fn run_timed<T, F>(op_timeout: Duration, fut: F) -> CoreResult<T>
where
    F: std::future::Future<Output = CoreResult<T>>,
{
    timeout(op_timeout, fut)
        .await
        .map_err(|_| CoreError::TimedOut(op_timeout))?
}

#[cfg(unix)]
fn mode_bits(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    metadata.mode()
}

#[cfg(not(unix))]
fn mode_bits(_metadata: &std::fs::Metadata) -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips_through_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stripe.bin");
        let stripe = FileStripe::new(&path);
        stripe
            .open("file://stripe", OpenFlags::Create, 0o644, Duration::from_secs(1))
            .await
            .unwrap();
        stripe
            .write(0, b"stripe contents", Duration::from_secs(1))
            .await
            .unwrap();
        stripe.sync(Duration::from_secs(1)).await.unwrap();
        let read = stripe.read(0, 15, Duration::from_secs(1)).await.unwrap();
        assert_eq!(&read, b"stripe contents");
    }

    #[tokio::test]
    async fn read_before_open_fails_with_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stripe.bin");
        let stripe = FileStripe::new(&path);
        let err = stripe.read(0, 4, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn truncate_shrinks_and_stat_reflects_new_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stripe.bin");
        let stripe = FileStripe::new(&path);
        stripe
            .open("file://stripe", OpenFlags::Create, 0o644, Duration::from_secs(1))
            .await
            .unwrap();
        stripe.write(0, &[1u8; 64], Duration::from_secs(1)).await.unwrap();
        stripe.truncate(16, Duration::from_secs(1)).await.unwrap();
        let stat = stripe.stat(Duration::from_secs(1)).await.unwrap();
        assert_eq!(stat.size, 16);
    }
}
