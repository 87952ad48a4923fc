// SPDX-License-Identifier: Apache-2.0
//! The stripe I/O interface consumed by `geodisk-raiddp`, plus
//! two implementations: [`memory::MemoryStripe`] (in-process, used by
//! every `geodisk-raiddp` test) and [`file::FileStripe`] (real file,
//! `tokio::fs`-backed).
//!
//! Every call takes an explicit timeout ("every async I/O call
//! accepts a timeout"); exceeding it surfaces [`geodisk_core::CoreError::TimedOut`].

pub mod file;
pub mod memory;
pub mod meta_handler;

use std::time::Duration;

use geodisk_core::error::CoreResult;

pub use file::FileStripe;
pub use memory::MemoryStripe;
pub use meta_handler::MetaHandler;

/// Flags passed to [`StripeIo::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlags {
    /// Open for reading only.
    ReadOnly,
    /// Open for reading and writing; fails if the target doesn't exist.
    ReadWrite,
    /// Open for reading and writing, creating the target if absent.
    Create,
}

/// Metadata returned by [`StripeIo::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripeStat {
    /// Current size in bytes.
    pub size: u64,
    /// Last modification time, milliseconds since an arbitrary epoch.
    pub mtime_ms: u64,
    /// POSIX-style mode bits.
    pub mode: u32,
}

/// The async operations a single stripe target exposes.
///
/// Implementations are generic collaborators: `geodisk-raiddp` holds a
/// `Vec<S>` of `N+2` homogeneous stripes and fans calls out with
/// `futures::future::join_all`, so this trait does not need to be
/// object-safe.
pub trait StripeIo: Send + Sync {
    /// Opens (or creates, per `flags`) the stripe target at `url`.
    fn open(
        &self,
        url: &str,
        flags: OpenFlags,
        mode: u32,
        timeout: Duration,
    ) -> impl std::future::Future<Output = CoreResult<()>> + Send;

    /// Reads `len` bytes starting at `offset`.
    fn read(
        &self,
        offset: u64,
        len: usize,
        timeout: Duration,
    ) -> impl std::future::Future<Output = CoreResult<Vec<u8>>> + Send;

    /// Writes `buf` starting at `offset`.
    fn write(
        &self,
        offset: u64,
        buf: &[u8],
        timeout: Duration,
    ) -> impl std::future::Future<Output = CoreResult<()>> + Send;

    /// Truncates the stripe target to `offset` bytes.
    fn truncate(
        &self,
        offset: u64,
        timeout: Duration,
    ) -> impl std::future::Future<Output = CoreResult<()>> + Send;

    /// Flushes any buffered writes to durable storage.
    fn sync(&self, timeout: Duration) -> impl std::future::Future<Output = CoreResult<()>> + Send;

    /// Returns current size/mtime/mode.
    fn stat(&self, timeout: Duration) -> impl std::future::Future<Output = CoreResult<StripeStat>> + Send;

    /// Closes the stripe target. Implementations may treat this as a
    /// no-op if the underlying handle has no explicit close step.
    fn close(&self, timeout: Duration) -> impl std::future::Future<Output = CoreResult<()>> + Send;
}
