// SPDX-License-Identifier: Apache-2.0
//! An in-process, `Vec<u8>`-backed [`crate::StripeIo`] implementation, used
//! by every `geodisk-raiddp` unit and property test.

use std::sync::Mutex;
use std::time::Duration;

use geodisk_core::error::{CoreError, CoreResult};

use crate::{OpenFlags, StripeIo, StripeStat};

struct Inner {
    data: Vec<u8>,
    mode: u32,
    opened: bool,
    unavailable: bool,
}

/// A stripe target backed entirely by in-memory bytes. Deleting a range of
/// its contents (via [`MemoryStripe::corrupt`]) simulates the lost-block
/// scenarios RaidDP recovery tests exercise.
pub struct MemoryStripe {
    inner: Mutex<Inner>,
}

impl MemoryStripe {
    /// Creates an unopened, empty stripe.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                data: Vec::new(),
                mode: 0,
                opened: false,
                unavailable: false,
            }),
        }
    }

    /// Zeroes `len` bytes starting at `offset`, simulating the loss of a
    /// block's contents without changing the stripe's size.
    pub fn corrupt(&self, offset: u64, len: usize) {
        if let Ok(mut inner) = self.inner.lock() {
            let start = offset as usize;
            let end = (start + len).min(inner.data.len());
            if start < end {
                inner.data[start..end].fill(0);
            }
        }
    }

    /// Marks this target unavailable for reads: every subsequent `read`
    /// call fails with [`CoreError::Io`], simulating a bad block a RAID-DP
    /// group must recover from. Writes still succeed, modeling a target
    /// whose faulty sector a corrective write can overwrite.
    pub fn disable(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.unavailable = true;
        }
    }

    /// Reverses [`Self::disable`].
    pub fn enable(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.unavailable = false;
        }
    }

    /// Returns a copy of the current contents, for test assertions.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.lock().map(|i| i.data.clone()).unwrap_or_default()
    }
}

impl Default for MemoryStripe {
    fn default() -> Self {
        Self::new()
    }
}

impl StripeIo for MemoryStripe {
    async fn open(
        &self,
        _url: &str,
        flags: OpenFlags,
        mode: u32,
        _timeout: Duration,
    ) -> CoreResult<()> {
        let mut inner = lock(&self.inner)?;
        if matches!(flags, OpenFlags::ReadOnly) && inner.data.is_empty() {
            return Err(CoreError::NotFound("memory stripe has no data".to_owned()));
        }
        inner.opened = true;
        inner.mode = mode;
        Ok(())
    }

    async fn read(&self, offset: u64, len: usize, _timeout: Duration) -> CoreResult<Vec<u8>> {
        let inner = lock(&self.inner)?;
        if inner.unavailable {
            return Err(CoreError::io("memory stripe disabled", std::io::Error::from(std::io::ErrorKind::NotConnected)));
        }
        let start = offset as usize;
        let mut buf = vec![0u8; len];
        let available = inner.data.len().saturating_sub(start);
        let to_copy = available.min(len);
        if to_copy > 0 {
            buf[..to_copy].copy_from_slice(&inner.data[start..start + to_copy]);
        }
        Ok(buf)
    }

    async fn write(&self, offset: u64, buf: &[u8], _timeout: Duration) -> CoreResult<()> {
        let mut inner = lock(&self.inner)?;
        let start = offset as usize;
        let end = start + buf.len();
        if inner.data.len() < end {
            inner.data.resize(end, 0);
        }
        inner.data[start..end].copy_from_slice(buf);
        Ok(())
    }

    async fn truncate(&self, offset: u64, _timeout: Duration) -> CoreResult<()> {
        let mut inner = lock(&self.inner)?;
        inner.data.resize(offset as usize, 0);
        Ok(())
    }

    async fn sync(&self, _timeout: Duration) -> CoreResult<()> {
        Ok(())
    }

    async fn stat(&self, _timeout: Duration) -> CoreResult<StripeStat> {
        let inner = lock(&self.inner)?;
        Ok(StripeStat {
            size: inner.data.len() as u64,
            mtime_ms: 0,
            mode: inner.mode,
        })
    }

    async fn close(&self, _timeout: Duration) -> CoreResult<()> {
        let mut inner = lock(&self.inner)?;
        inner.opened = false;
        Ok(())
    }
}

fn lock(mutex: &Mutex<Inner>) -> CoreResult<std::sync::MutexGuard<'_, Inner>> {
    mutex
        .lock()
        .map_err(|_| CoreError::Internal("memory stripe lock poisoned".to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let stripe = MemoryStripe::new();
        stripe
            .open("mem://0", OpenFlags::Create, 0o644, Duration::from_secs(1))
            .await
            .unwrap();
        stripe
            .write(0, b"hello world", Duration::from_secs(1))
            .await
            .unwrap();
        let read = stripe.read(0, 11, Duration::from_secs(1)).await.unwrap();
        assert_eq!(&read, b"hello world");
    }

    #[tokio::test]
    async fn read_past_written_range_is_zero_filled() {
        let stripe = MemoryStripe::new();
        stripe
            .open("mem://0", OpenFlags::Create, 0o644, Duration::from_secs(1))
            .await
            .unwrap();
        stripe.write(0, b"ab", Duration::from_secs(1)).await.unwrap();
        let read = stripe.read(0, 8, Duration::from_secs(1)).await.unwrap();
        assert_eq!(&read, b"ab\0\0\0\0\0\0");
    }

    #[tokio::test]
    async fn corrupt_zeroes_a_range_without_resizing() {
        let stripe = MemoryStripe::new();
        stripe
            .open("mem://0", OpenFlags::Create, 0o644, Duration::from_secs(1))
            .await
            .unwrap();
        stripe
            .write(0, b"0123456789", Duration::from_secs(1))
            .await
            .unwrap();
        stripe.corrupt(2, 3);
        assert_eq!(stripe.snapshot(), vec![b'0', b'1', 0, 0, 0, b'5', b'6', b'7', b'8', b'9']);
    }

    #[tokio::test]
    async fn disabled_stripe_fails_reads_but_still_accepts_writes() {
        let stripe = MemoryStripe::new();
        stripe
            .open("mem://0", OpenFlags::Create, 0o644, Duration::from_secs(1))
            .await
            .unwrap();
        stripe.disable();
        assert!(stripe.read(0, 4, Duration::from_secs(1)).await.is_err());
        assert!(stripe.write(0, b"x", Duration::from_secs(1)).await.is_ok());
        stripe.enable();
        assert!(stripe.read(0, 4, Duration::from_secs(1)).await.is_ok());
    }
}
