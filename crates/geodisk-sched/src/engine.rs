// SPDX-License-Identifier: Apache-2.0
//! Top-level scheduler: owns every group and the live parameter set,
//! and exposes the full contract surface `insertFsIntoGroup` /
//! `removeFsFromGroup` / `placeNewReplicasOneGroup` /
//! `accessReplicasOneGroup` / `accessHeadReplicaMultipleGroup` /
//! `setParameter` is built from.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use geodisk_core::{CoreError, CoreResult, FsId, GroupId};
use geodisk_notify::NotifyBus;

use crate::access::{self, access_head_replica_multiple_group};
use crate::config::{Parameter, SchedulerParams};
use crate::fast_tree::{FastTree, FastTreeKind, ALL_KINDS};
use crate::geotag::GeoTag;
use crate::group::SchedGroup;
use crate::health::{FsHealth, NET_SPEED_CLASSES};
use crate::penalty::{candidate_penalty, smooth, ClassUtilTotals};
use crate::placement::{self, PlacementRequest};

/// The scheduler: a registry of groups, the live tunable parameters, and
/// the change-notification bus every inserted fs is implicitly watched
/// through (one shared subscription covers every fs; see
/// `crate::notify`).
pub struct Engine {
    groups: RwLock<HashMap<GroupId, Arc<SchedGroup>>>,
    params: RwLock<SchedulerParams>,
    bus: Arc<NotifyBus>,
}

impl Engine {
    /// Creates an engine with no groups, default parameters, and a fresh
    /// notification bus.
    #[must_use]
    pub fn new(bus: Arc<NotifyBus>) -> Self {
        Self { groups: RwLock::new(HashMap::new()), params: RwLock::new(SchedulerParams::default()), bus }
    }

    /// The notification bus this engine's fs entries are watched through.
    #[must_use]
    pub fn bus(&self) -> &Arc<NotifyBus> {
        &self.bus
    }

    fn groups_read(&self) -> CoreResult<std::sync::RwLockReadGuard<'_, HashMap<GroupId, Arc<SchedGroup>>>> {
        self.groups.read().map_err(|_| CoreError::Internal("group registry lock poisoned".into()))
    }

    fn groups_write(&self) -> CoreResult<std::sync::RwLockWriteGuard<'_, HashMap<GroupId, Arc<SchedGroup>>>> {
        self.groups.write().map_err(|_| CoreError::Internal("group registry lock poisoned".into()))
    }

    fn group(&self, group_id: GroupId) -> CoreResult<Arc<SchedGroup>> {
        self.groups_read()?.get(&group_id).cloned().ok_or_else(|| CoreError::NotFound(format!("group {group_id}")))
    }

    /// Registers `fsid` in `group_id`, creating the group if this is its
    /// first leaf. The change-notification watch is implicit: the
    /// engine's single shared bus subscription already covers every fs
    /// publishing under the shared queue path (see `crate::notify`), so
    /// no per-fs subscribe call is needed here.
    ///
    /// # Errors
    ///
    /// [`CoreError::AlreadyExists`] if `fsid` is already registered in
    /// `group_id`.
    pub fn insert_fs_into_group(&self, fsid: FsId, group_id: GroupId, health: FsHealth, update_fast: bool) -> CoreResult<()> {
        let group = {
            let mut groups = self.groups_write()?;
            groups.entry(group_id).or_insert_with(|| Arc::new(SchedGroup::new(group_id))).clone()
        };
        group.insert_fs(fsid, health, update_fast)
    }

    /// Unsubscribes and removes `fsid` from `group_id`. If the group
    /// becomes empty its entry is dropped from the registry; since
    /// groups are held behind an `Arc`, any in-flight placement or
    /// access call already holding a reference keeps it alive until
    /// that call returns, which is the reader-counted deferred-deletion
    /// guarantee expressed without a manual counter.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if `group_id` or `fsid` within it is
    /// absent.
    pub fn remove_fs_from_group(&self, fsid: FsId, group_id: GroupId, update_fast: bool) -> CoreResult<()> {
        let group = self.group(group_id)?;
        let now_empty = group.remove_fs(fsid, update_fast)?;
        if now_empty {
            self.groups_write()?.remove(&group_id);
        }
        Ok(())
    }

    /// Selects new-replica placement targets within one group.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if `group_id` is absent;
    /// [`CoreError::NoneAvailable`] or [`CoreError::InsufficientReplicas`]
    /// if the group can't satisfy the request.
    pub fn place_new_replicas_one_group(&self, group_id: GroupId, req: &PlacementRequest<'_>) -> CoreResult<Vec<FsId>> {
        let group = self.group(group_id)?;
        let penalties = self.params.read().map_err(|_| CoreError::Internal("params lock poisoned".into()))?.penalties;
        placement::place_new_replicas_one_group(&group, req, &penalties)
    }

    /// Selects access targets among a file's existing replicas within
    /// one group.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if `group_id` is absent;
    /// [`CoreError::NoneAvailable`] or [`CoreError::InsufficientReplicas`]
    /// if the group can't satisfy the request.
    pub fn access_replicas_one_group(
        &self,
        group_id: GroupId,
        kind: FastTreeKind,
        n: usize,
        existing: &[FsId],
        accesser_geotag: &GeoTag,
    ) -> CoreResult<Vec<FsId>> {
        let group = self.group(group_id)?;
        let threshold = self.params.read().map_err(|_| CoreError::Internal("params lock poisoned".into()))?.saturation_thres;
        access::access_replicas_one_group(&group, kind, n, existing, accesser_geotag, threshold)
    }

    /// Chooses one access-head replica across groups. Pure relative to
    /// the engine's own state — see [`access_head_replica_multiple_group`].
    ///
    /// # Errors
    ///
    /// See [`access::access_head_replica_multiple_group`].
    pub fn access_head_replica_multiple_group(
        &self,
        existing: &[FsId],
        group_geotags: &[GeoTag],
        reachable: &[bool],
        accesser_geotag: &GeoTag,
        saturation: &[bool],
        forced_fs: Option<FsId>,
    ) -> CoreResult<usize> {
        access_head_replica_multiple_group(existing, group_geotags, reachable, accesser_geotag, saturation, forced_fs)
    }

    /// Applies one scalar/boolean/vector `setParameter` knob.
    ///
    /// # Errors
    ///
    /// [`CoreError::PolicyViolation`] if the value or index is out of
    /// range.
    pub fn set_parameter(&self, parameter: Parameter) -> CoreResult<()> {
        self.params.write().map_err(|_| CoreError::Internal("params lock poisoned".into()))?.apply(parameter)
    }

    /// A snapshot of the current parameter set.
    ///
    /// # Errors
    ///
    /// [`CoreError::Internal`] if the parameter lock is poisoned.
    pub fn params(&self) -> CoreResult<SchedulerParams> {
        Ok(self.params.read().map_err(|_| CoreError::Internal("params lock poisoned".into()))?.clone())
    }

    /// Adds a disabled `(group, op-kind, geotag)` branch, rejecting an
    /// overlapping prefix already disabled for the same kind.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if `group_id` is absent;
    /// [`CoreError::PolicyViolation`] on an overlapping prefix.
    pub fn disable_branch(&self, group_id: GroupId, kind: FastTreeKind, geotag: GeoTag) -> CoreResult<()> {
        self.group(group_id)?.disable_branch(kind, geotag)
    }

    /// Removes a previously disabled branch.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if `group_id` is absent.
    pub fn enable_branch(&self, group_id: GroupId, kind: FastTreeKind, geotag: &GeoTag) -> CoreResult<()> {
        self.group(group_id)?.enable_branch(kind, geotag)
    }

    /// Applies a health-only update for an existing leaf (the common
    /// case driven by a coalesced frame of change notifications).
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if `group_id` or `fsid` within it is
    /// absent.
    pub fn update_health(&self, fsid: FsId, group_id: GroupId, health: FsHealth) -> CoreResult<()> {
        self.group(group_id)?.update_health(fsid, health)
    }

    /// Number of groups currently registered.
    pub fn group_count(&self) -> CoreResult<usize> {
        Ok(self.groups_read()?.len())
    }

    /// One penalty-update frame: aggregates outstanding-open counts and
    /// disk/network utilization across every group's leaves, bucketed by
    /// net-speed class, computes each class' candidate penalty, smooths
    /// it into the configured `plct`/`access` penalty vectors, and
    /// publishes the resulting delta to every group's fast trees. Meant
    /// to be called once per `timeFrameDurationMs`.
    ///
    /// # Errors
    ///
    /// [`CoreError::Internal`] if a group or parameter lock is poisoned.
    pub fn run_penalty_frame(&self) -> CoreResult<()> {
        let groups: Vec<Arc<SchedGroup>> = self.groups_read()?.values().cloned().collect();

        let mut totals = [ClassUtilTotals::default(); NET_SPEED_CLASSES];
        for group in &groups {
            group.accumulate_util(&mut totals)?;
        }

        let rate = self.params.read().map_err(|_| CoreError::Internal("params lock poisoned".into()))?.penalty_update_rate;
        let mut params = self.params.write().map_err(|_| CoreError::Internal("params lock poisoned".into()))?;

        for (class, class_totals) in totals.into_iter().enumerate() {
            if class_totals.is_empty() {
                continue;
            }
            let candidate = candidate_penalty(class_totals.finish());

            let old_plct_dl = params.penalties.plct_dl[class];
            let old_plct_ul = params.penalties.plct_ul[class];
            let old_access_dl = params.penalties.access_dl[class];
            let old_access_ul = params.penalties.access_ul[class];

            params.penalties.plct_dl[class] = smooth(old_plct_dl, candidate, rate);
            params.penalties.plct_ul[class] = smooth(old_plct_ul, candidate, rate);
            params.penalties.access_dl[class] = smooth(old_access_dl, candidate, rate);
            params.penalties.access_ul[class] = smooth(old_access_ul, candidate, rate);

            let plct_dl_delta = params.penalties.plct_dl[class] - old_plct_dl;
            let plct_ul_delta = params.penalties.plct_ul[class] - old_plct_ul;
            let access_dl_delta = params.penalties.access_dl[class] - old_access_dl;
            let access_ul_delta = params.penalties.access_ul[class] - old_access_ul;

            #[allow(clippy::cast_possible_truncation)]
            let class_u8 = class as u8;
            for kind in ALL_KINDS {
                let (dl_delta, ul_delta) =
                    if kind.is_placement() { (plct_dl_delta, plct_ul_delta) } else { (access_dl_delta, access_ul_delta) };
                for group in &groups {
                    group.apply_penalty_delta(kind, class_u8, dl_delta, ul_delta);
                }
            }
        }
        Ok(())
    }

    /// A snapshot of one group's fast tree for one operation class, for
    /// inspection after a call like [`Self::run_penalty_frame`].
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if `group_id` is absent.
    pub fn group_fast_tree(&self, group_id: GroupId, kind: FastTreeKind) -> CoreResult<Arc<FastTree>> {
        Ok(self.group(group_id)?.snapshot(kind))
    }
}
