// SPDX-License-Identifier: Apache-2.0
//! Per-fs health snapshot and the watched-key set that drives it.

use serde::{Deserialize, Serialize};

use crate::geotag::GeoTag;

/// Link speed bucket a file system's penalties are indexed by. The
/// original engine buckets by uplink/downlink rate into eight classes;
/// `setParameter`'s score-penalty vectors are always exactly this long.
pub const NET_SPEED_CLASSES: usize = 8;

/// Runtime configuration status of a file system, mirroring EOS'
/// `configstatus` enum from most to least usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigStatus {
    /// Read-write, fully usable for placement and access.
    ReadWrite,
    /// Read-only: usable for access, never for placement.
    ReadOnly,
    /// Draining: usable for access, excluded from placement.
    Drain,
    /// Administratively off: excluded from placement and access.
    Off,
}

impl ConfigStatus {
    /// Whether a leaf in this status may receive new replicas.
    #[must_use]
    pub fn placeable(self) -> bool {
        matches!(self, Self::ReadWrite)
    }

    /// Whether a leaf in this status may serve reads.
    #[must_use]
    pub fn accessible(self) -> bool {
        matches!(self, Self::ReadWrite | Self::ReadOnly | Self::Drain)
    }
}

/// A point-in-time health snapshot for one file system leaf. Fields
/// mirror the watched key-set `geotag.rs`'s notification consumer
/// reduces incoming events down to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsHealth {
    /// Geographic location of this file system.
    pub geotag: GeoTag,
    /// Hostname serving this file system.
    pub host: String,
    /// Whether the file system has completed boot and joined the fleet.
    pub booted: bool,
    /// Administrative read/write/drain/off status.
    pub config_status: ConfigStatus,
    /// Whether a drain is currently in progress on this leaf.
    pub draining: bool,
    /// Whether a balancer job is currently running on this leaf.
    pub balancing: bool,
    /// Network speed bucket, `0..NET_SPEED_CLASSES`, used to index
    /// score-penalty vectors.
    pub net_speed_class: u8,
    /// Download score in `0.0..=100.0`; higher is more available.
    pub dl_score: f64,
    /// Upload score in `0.0..=100.0`; higher is more available.
    pub ul_score: f64,
    /// Fraction of capacity already used, `0.0..=100.0`.
    pub fill_ratio: f64,
    /// Number of files currently open against this leaf.
    pub outstanding_open: u64,
    /// Disk utilization percentage, `0.0..=100.0`.
    pub disk_util_percent: f64,
    /// Inbound network utilization percentage, `0.0..=100.0`.
    pub net_in_util_percent: f64,
    /// Outbound network utilization percentage, `0.0..=100.0`.
    pub net_out_util_percent: f64,
    /// Cumulative error count reported by the file system.
    pub err_count: u64,
}

impl FsHealth {
    /// Whether the download or upload score is below `threshold`, i.e.
    /// this leaf is "saturated" and should be skipped by a
    /// skip-saturated placement or access pass.
    #[must_use]
    pub fn saturated(&self, threshold: f64) -> bool {
        self.dl_score < threshold || self.ul_score < threshold
    }
}

/// The exhaustive set of notification keys a subscribed fs is watched
/// on. Order matches the bit position each key is reduced to in
/// [`WatchedKeyMask`].
pub const WATCHED_KEYS: [&str; 22] = [
    "id",
    "host",
    "stat.geotag",
    "stat.boot",
    "stat.active",
    "configstatus",
    "stat.drain",
    "stat.drainer",
    "stat.balancing.running",
    "stat.balancer.running",
    "stat.balance.threshold",
    "stat.nominal.filled",
    "stat.statfs.bavail",
    "stat.statfs.filled",
    "stat.disk.writeratemb",
    "stat.disk.readratemb",
    "stat.disk.load",
    "stat.net.ethratemib",
    "stat.net.inratemib",
    "stat.net.outratemib",
    "stat.errc",
    "stat.publishtimestamp",
];

/// A bitmask over [`WATCHED_KEYS`], accumulated across a frame's worth
/// of modification notifications for one fs before a single consolidated
/// health update is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchedKeyMask(u32);

impl WatchedKeyMask {
    /// An empty mask.
    #[must_use]
    pub fn empty() -> Self {
        Self(0)
    }

    /// Sets the bit for `key`, if it is one of [`WATCHED_KEYS`]. Unknown
    /// keys are silently ignored; the notification bus may carry keys no
    /// watcher cares about.
    pub fn set(&mut self, key: &str) {
        if let Some(idx) = WATCHED_KEYS.iter().position(|k| *k == key) {
            self.0 |= 1 << idx;
        }
    }

    /// Whether any bit is set.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether the bit for `key` is set.
    #[must_use]
    pub fn contains(self, key: &str) -> bool {
        WATCHED_KEYS.iter().position(|k| *k == key).is_some_and(|idx| self.0 & (1 << idx) != 0)
    }
}
