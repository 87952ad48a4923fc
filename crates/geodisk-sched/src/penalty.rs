// SPDX-License-Identifier: Apache-2.0
//! Score penalties applied during selection, and the periodic update
//! loop that recomputes them from aggregate per-class utilization.

use crate::fast_tree::FastLeaf;
use crate::health::{FsHealth, NET_SPEED_CLASSES};

/// Per-net-speed-class score penalties, applied to a leaf immediately
/// after it is selected so repeated calls within the same frame spread
/// choices across the candidate set.
#[derive(Debug, Clone, Copy)]
pub struct ScorePenalties {
    /// Download-score penalty applied after a placement pick, by class.
    pub plct_dl: [f64; NET_SPEED_CLASSES],
    /// Upload-score penalty applied after a placement pick, by class.
    pub plct_ul: [f64; NET_SPEED_CLASSES],
    /// Download-score penalty applied after an access pick, by class.
    pub access_dl: [f64; NET_SPEED_CLASSES],
    /// Upload-score penalty applied after an access pick, by class.
    pub access_ul: [f64; NET_SPEED_CLASSES],
}

impl Default for ScorePenalties {
    fn default() -> Self {
        Self {
            plct_dl: [0.0; NET_SPEED_CLASSES],
            plct_ul: [0.0; NET_SPEED_CLASSES],
            access_dl: [0.0; NET_SPEED_CLASSES],
            access_ul: [0.0; NET_SPEED_CLASSES],
        }
    }
}

impl ScorePenalties {
    fn class(class: u8) -> usize {
        (class as usize).min(NET_SPEED_CLASSES - 1)
    }

    /// Subtracts the configured penalty for `leaf`'s class from its
    /// scores, clamped at zero, mutating a working-copy leaf in place.
    pub fn apply(&self, leaf: &mut FastLeaf, is_placement: bool) {
        let class = Self::class(leaf.net_speed_class);
        let (dl, ul) = if is_placement {
            (self.plct_dl[class], self.plct_ul[class])
        } else {
            (self.access_dl[class], self.access_ul[class])
        };
        leaf.dl_score = (leaf.dl_score - dl).max(0.0);
        leaf.ul_score = (leaf.ul_score - ul).max(0.0);
    }
}

/// Aggregated per-class utilization sampled once per frame, the input to
/// [`candidate_penalty`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassUtilSample {
    /// Mean disk utilization percentage across leaves of this class.
    pub disk_util_percent: f64,
    /// Mean inbound network utilization percentage.
    pub net_in_percent: f64,
    /// Mean outbound network utilization percentage.
    pub net_out_percent: f64,
    /// Total outstanding-open count summed across leaves of this class.
    pub outstanding_open: u64,
}

/// Running per-class accumulator a frame's worth of [`FsHealth`] samples
/// are folded into before [`ClassUtilTotals::finish`] reduces them to the
/// [`ClassUtilSample`] means [`candidate_penalty`] reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassUtilTotals {
    disk_sum: f64,
    net_in_sum: f64,
    net_out_sum: f64,
    outstanding_open_sum: u64,
    count: u64,
}

impl ClassUtilTotals {
    /// Folds one leaf's health snapshot into the running totals.
    pub fn add(&mut self, health: &FsHealth) {
        self.disk_sum += health.disk_util_percent;
        self.net_in_sum += health.net_in_util_percent;
        self.net_out_sum += health.net_out_util_percent;
        self.outstanding_open_sum += health.outstanding_open;
        self.count += 1;
    }

    /// Whether no leaf has been folded in yet.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.count == 0
    }

    /// Reduces the running sums to per-class means (and a summed
    /// outstanding-open count), ready for [`candidate_penalty`]. An empty
    /// accumulator reduces to the all-zero sample.
    #[must_use]
    pub fn finish(self) -> ClassUtilSample {
        if self.count == 0 {
            return ClassUtilSample::default();
        }
        #[allow(clippy::cast_precision_loss)]
        let count = self.count as f64;
        ClassUtilSample {
            disk_util_percent: self.disk_sum / count,
            net_in_percent: self.net_in_sum / count,
            net_out_percent: self.net_out_sum / count,
            outstanding_open: self.outstanding_open_sum,
        }
    }
}

/// `100 * max(diskPenalty, networkPenalty)`, where each penalty is the
/// sampled utilization expressed as a `0.0..=1.0` fraction.
#[must_use]
pub fn candidate_penalty(sample: ClassUtilSample) -> f64 {
    let disk = sample.disk_util_percent / 100.0;
    let net = sample.net_in_percent.max(sample.net_out_percent) / 100.0;
    100.0 * disk.max(net)
}

/// Exponentially smooths `current` toward `candidate` by `rate_percent`,
/// unless `candidate` is at or beyond the `(1, 99)` band, in which case
/// the new value is applied immediately: an extreme reading should not
/// be slow-walked toward saturation.
#[must_use]
pub fn smooth(current: f64, candidate: f64, rate_percent: f64) -> f64 {
    if candidate > 1.0 && candidate < 99.0 {
        let rate = (rate_percent / 100.0).clamp(0.0, 1.0);
        current.mul_add(1.0 - rate, candidate * rate)
    } else {
        candidate
    }
}
