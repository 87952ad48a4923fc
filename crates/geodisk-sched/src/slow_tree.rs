// SPDX-License-Identifier: Apache-2.0
//! The authoritative, rarely-read tree: every leaf in a group keyed by
//! fsid, with a geotag-ordered index for prefix queries. Updates go
//! through a `RwLock` at the [`crate::group::SchedGroup`] level; this type
//! itself holds no lock.

use std::collections::BTreeMap;

use geodisk_core::{CoreError, CoreResult, FsId};

use crate::geotag::GeoTag;
use crate::health::FsHealth;

/// One leaf: a file system's identity plus its latest health snapshot.
#[derive(Debug, Clone)]
pub struct SlowLeaf {
    /// The file system's id.
    pub fsid: FsId,
    /// Its current health snapshot.
    pub health: FsHealth,
}

/// Authoritative per-group tree: a geotag-keyed `BTreeMap` bucketing
/// fsids under each geotag, plus a flat lookup by fsid.
#[derive(Debug, Default)]
pub struct SlowTree {
    by_geotag: BTreeMap<GeoTag, Vec<FsId>>,
    by_fsid: BTreeMap<FsId, SlowLeaf>,
}

impl SlowTree {
    /// An empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new leaf. Returns [`CoreError::AlreadyExists`] if `fsid`
    /// is already present — callers must `remove` before re-inserting
    /// under a different geotag.
    pub fn insert(&mut self, fsid: FsId, health: FsHealth) -> CoreResult<()> {
        if self.by_fsid.contains_key(&fsid) {
            return Err(CoreError::AlreadyExists(format!("fs {fsid} already in group")));
        }
        self.by_geotag.entry(health.geotag.clone()).or_default().push(fsid);
        self.by_fsid.insert(fsid, SlowLeaf { fsid, health });
        Ok(())
    }

    /// Removes a leaf. Returns [`CoreError::NotFound`] if `fsid` is absent.
    pub fn remove(&mut self, fsid: FsId) -> CoreResult<()> {
        let leaf = self.by_fsid.remove(&fsid).ok_or_else(|| CoreError::NotFound(format!("fs {fsid}")))?;
        if let Some(bucket) = self.by_geotag.get_mut(&leaf.health.geotag) {
            bucket.retain(|id| *id != fsid);
            if bucket.is_empty() {
                self.by_geotag.remove(&leaf.health.geotag);
            }
        }
        Ok(())
    }

    /// Replaces the health snapshot for an existing leaf, re-bucketing it
    /// by geotag if the geotag changed.
    pub fn update_health(&mut self, fsid: FsId, health: FsHealth) -> CoreResult<()> {
        let old_geotag = {
            let leaf = self.by_fsid.get(&fsid).ok_or_else(|| CoreError::NotFound(format!("fs {fsid}")))?;
            leaf.health.geotag.clone()
        };
        if old_geotag != health.geotag {
            if let Some(bucket) = self.by_geotag.get_mut(&old_geotag) {
                bucket.retain(|id| *id != fsid);
                if bucket.is_empty() {
                    self.by_geotag.remove(&old_geotag);
                }
            }
            self.by_geotag.entry(health.geotag.clone()).or_default().push(fsid);
        }
        if let Some(leaf) = self.by_fsid.get_mut(&fsid) {
            leaf.health = health;
        }
        Ok(())
    }

    /// Looks up one leaf by fsid.
    #[must_use]
    pub fn get(&self, fsid: FsId) -> Option<&SlowLeaf> {
        self.by_fsid.get(&fsid)
    }

    /// Iterates every leaf in fsid order.
    pub fn leaves(&self) -> impl Iterator<Item = &SlowLeaf> {
        self.by_fsid.values()
    }

    /// Number of leaves in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_fsid.len()
    }

    /// Whether the tree has no leaves left; a group in this state is
    /// queued for deletion by the owning engine.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_fsid.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ConfigStatus;

    fn health(geotag: &str) -> FsHealth {
        FsHealth {
            geotag: GeoTag::new(geotag),
            host: "host".into(),
            booted: true,
            config_status: ConfigStatus::ReadWrite,
            draining: false,
            balancing: false,
            net_speed_class: 0,
            dl_score: 100.0,
            ul_score: 100.0,
            fill_ratio: 10.0,
            outstanding_open: 0,
            disk_util_percent: 0.0,
            net_in_util_percent: 0.0,
            net_out_util_percent: 0.0,
            err_count: 0,
        }
    }

    #[test]
    fn insert_remove_round_trips_and_empties_the_geotag_bucket() {
        let mut tree = SlowTree::new();
        tree.insert(FsId(1), health("eu::de")).unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree.get(FsId(1)).is_some());
        tree.remove(FsId(1)).unwrap();
        assert!(tree.is_empty());
        assert!(tree.by_geotag.is_empty());
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut tree = SlowTree::new();
        tree.insert(FsId(1), health("eu::de")).unwrap();
        assert!(tree.insert(FsId(1), health("eu::de")).is_err());
    }

    #[test]
    fn update_health_rebuckets_on_geotag_move() {
        let mut tree = SlowTree::new();
        tree.insert(FsId(1), health("eu::de")).unwrap();
        tree.update_health(FsId(1), health("eu::fr")).unwrap();
        assert!(tree.by_geotag.get(&GeoTag::new("eu::de")).is_none());
        assert_eq!(tree.by_geotag.get(&GeoTag::new("eu::fr")).map(Vec::len), Some(1));
    }
}
