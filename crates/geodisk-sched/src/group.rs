// SPDX-License-Identifier: Apache-2.0
//! One scheduling group: a slow tree behind a read-write lock, plus one
//! double-buffered fast tree per operation class.

use std::sync::{Arc, RwLock};

use arc_swap::ArcSwap;
use geodisk_core::{CoreError, CoreResult, FsId, GroupId};

use crate::disabled::DisabledBranches;
use crate::fast_tree::{FastTree, FastTreeKind, ALL_KINDS};
use crate::geotag::GeoTag;
use crate::health::{FsHealth, NET_SPEED_CLASSES};
use crate::penalty::ClassUtilTotals;
use crate::slow_tree::SlowTree;

const fn index_of(kind: FastTreeKind) -> usize {
    match kind {
        FastTreeKind::Placement => 0,
        FastTreeKind::DrainPlacement => 1,
        FastTreeKind::BalancePlacement => 2,
        FastTreeKind::ReadAccess => 3,
        FastTreeKind::WriteAccess => 4,
        FastTreeKind::DrainAccess => 5,
        FastTreeKind::BalanceAccess => 6,
    }
}

/// A scheduling group: the owning unit for one slow tree and its seven
/// fast-tree projections.
pub struct SchedGroup {
    group_id: GroupId,
    slow: RwLock<SlowTree>,
    disabled: RwLock<DisabledBranches>,
    fast: [ArcSwap<FastTree>; 7],
}

impl SchedGroup {
    /// Creates an empty group with no leaves and every fast tree empty.
    #[must_use]
    pub fn new(group_id: GroupId) -> Self {
        Self {
            group_id,
            slow: RwLock::new(SlowTree::new()),
            disabled: RwLock::new(DisabledBranches::new()),
            fast: std::array::from_fn(|_| ArcSwap::from_pointee(FastTree::default())),
        }
    }

    /// This group's id.
    #[must_use]
    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    /// Inserts a leaf and rebuilds every fast tree from the updated slow
    /// tree, unless `update_fast` is false (the caller batches several
    /// structural changes and will rebuild once at the end).
    pub fn insert_fs(&self, fsid: FsId, health: FsHealth, update_fast: bool) -> CoreResult<()> {
        {
            let mut slow = self.lock_slow_mut()?;
            slow.insert(fsid, health)?;
        }
        if update_fast {
            self.rebuild_all_fast()?;
        }
        Ok(())
    }

    /// Removes a leaf and rebuilds the fast trees. Returns whether the
    /// group is now empty, so the caller can queue it for deletion.
    pub fn remove_fs(&self, fsid: FsId, update_fast: bool) -> CoreResult<bool> {
        let now_empty = {
            let mut slow = self.lock_slow_mut()?;
            slow.remove(fsid)?;
            slow.is_empty()
        };
        if update_fast {
            self.rebuild_all_fast()?;
        }
        Ok(now_empty)
    }

    /// Applies a new health snapshot for an existing leaf and rebuilds
    /// the fast trees.
    pub fn update_health(&self, fsid: FsId, health: FsHealth) -> CoreResult<()> {
        {
            let mut slow = self.lock_slow_mut()?;
            slow.update_health(fsid, health)?;
        }
        self.rebuild_all_fast()
    }

    /// Adds a disabled branch and rebuilds only the affected fast tree.
    pub fn disable_branch(&self, kind: FastTreeKind, geotag: GeoTag) -> CoreResult<()> {
        {
            let mut disabled = self.lock_disabled_mut()?;
            disabled.add(kind, geotag)?;
        }
        self.rebuild_fast(kind)
    }

    /// Removes a disabled branch and rebuilds only the affected fast tree.
    pub fn enable_branch(&self, kind: FastTreeKind, geotag: &GeoTag) -> CoreResult<()> {
        {
            let mut disabled = self.lock_disabled_mut()?;
            disabled.remove(kind, geotag);
        }
        self.rebuild_fast(kind)
    }

    /// A lock-free snapshot of one operation class' fast tree, safe to
    /// hold for the duration of a placement or access call without
    /// blocking concurrent updaters.
    #[must_use]
    pub fn snapshot(&self, kind: FastTreeKind) -> Arc<FastTree> {
        self.fast[index_of(kind)].load_full()
    }

    /// Replaces one fast tree's snapshot directly, without touching the
    /// slow tree. Used by the placement algorithm to publish post-pick
    /// score penalties so the next call within the same frame sees them,
    /// without forcing a full rebuild from the slow tree.
    pub fn store_fast_snapshot(&self, kind: FastTreeKind, tree: FastTree) {
        self.fast[index_of(kind)].store(Arc::new(tree));
    }

    /// Whether the slow tree currently has no leaves.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.lock_slow()?.is_empty())
    }

    /// Folds every leaf's health into `totals`, bucketed by net-speed
    /// class, for the caller's penalty-update frame.
    pub fn accumulate_util(&self, totals: &mut [ClassUtilTotals; NET_SPEED_CLASSES]) -> CoreResult<()> {
        let slow = self.lock_slow()?;
        for leaf in slow.leaves() {
            let class = (leaf.health.net_speed_class as usize).min(NET_SPEED_CLASSES - 1);
            totals[class].add(&leaf.health);
        }
        Ok(())
    }

    /// Applies a per-class score delta directly to one fast tree's
    /// leaves, publishing the result without a slow-tree rebuild. Used by
    /// the penalty-update frame to push a newly smoothed penalty out to
    /// every leaf of the affected class in one atomic swap.
    pub fn apply_penalty_delta(&self, kind: FastTreeKind, class: u8, dl_delta: f64, ul_delta: f64) {
        if dl_delta == 0.0 && ul_delta == 0.0 {
            return;
        }
        let mut tree = (*self.snapshot(kind)).clone();
        let mut changed = false;
        for leaf in &mut tree.leaves {
            if leaf.net_speed_class == class {
                leaf.dl_score = (leaf.dl_score - dl_delta).clamp(0.0, 100.0);
                leaf.ul_score = (leaf.ul_score - ul_delta).clamp(0.0, 100.0);
                changed = true;
            }
        }
        if changed {
            self.store_fast_snapshot(kind, tree);
        }
    }

    /// Rebuilds every one of the seven fast trees from the current slow
    /// tree and disabled-branch set.
    pub fn rebuild_all_fast(&self) -> CoreResult<()> {
        for kind in ALL_KINDS {
            self.rebuild_fast(kind)?;
        }
        Ok(())
    }

    fn rebuild_fast(&self, kind: FastTreeKind) -> CoreResult<()> {
        let slow = self.lock_slow()?;
        let disabled = self.lock_disabled()?;
        let tree = FastTree::build(&slow, kind, &disabled);
        self.fast[index_of(kind)].store(Arc::new(tree));
        Ok(())
    }

    fn lock_slow(&self) -> CoreResult<std::sync::RwLockReadGuard<'_, SlowTree>> {
        self.slow.read().map_err(|_| CoreError::Internal("slow tree lock poisoned".into()))
    }

    fn lock_slow_mut(&self) -> CoreResult<std::sync::RwLockWriteGuard<'_, SlowTree>> {
        self.slow.write().map_err(|_| CoreError::Internal("slow tree lock poisoned".into()))
    }

    fn lock_disabled(&self) -> CoreResult<std::sync::RwLockReadGuard<'_, DisabledBranches>> {
        self.disabled.read().map_err(|_| CoreError::Internal("disabled-branch lock poisoned".into()))
    }

    fn lock_disabled_mut(&self) -> CoreResult<std::sync::RwLockWriteGuard<'_, DisabledBranches>> {
        self.disabled.write().map_err(|_| CoreError::Internal("disabled-branch lock poisoned".into()))
    }
}
