// SPDX-License-Identifier: Apache-2.0
//! Access: selecting among a file's existing replicas for read or
//! read/write, biased by geotag proximity to the caller.

use geodisk_core::{CoreError, CoreResult, FsId};

use crate::fast_tree::FastTreeKind;
use crate::geotag::GeoTag;
use crate::group::SchedGroup;

const SATURATED_GEO_PENALTY: i64 = -1_000;

/// Selects `n` file systems among `existing` for access within one
/// group, preferring replicas whose geotag shares the longest prefix
/// with `accesser_geotag`.
pub fn access_replicas_one_group(
    group: &SchedGroup,
    kind: FastTreeKind,
    n: usize,
    existing: &[FsId],
    accesser_geotag: &GeoTag,
    saturation_threshold: f64,
) -> CoreResult<Vec<FsId>> {
    debug_assert!(!kind.is_placement(), "access request must use an access fast-tree kind");

    let snapshot = group.snapshot(kind);
    let mut candidates: Vec<_> = snapshot.leaves.iter().filter(|l| existing.contains(&l.fsid)).collect();

    if candidates.is_empty() {
        return Err(CoreError::NoneAvailable("no existing replica is currently accessible".into()));
    }

    candidates.sort_by_key(|l| {
        let proximity = i64::try_from(l.geotag.common_prefix_len(accesser_geotag)).unwrap_or(i64::MAX);
        let penalty = if l.saturated(saturation_threshold) { SATURATED_GEO_PENALTY } else { 0 };
        std::cmp::Reverse(proximity + penalty)
    });

    let chosen: Vec<FsId> = candidates.into_iter().take(n).map(|l| l.fsid).collect();
    if chosen.len() < n {
        return Err(CoreError::InsufficientReplicas { requested: n, available: chosen.len() });
    }
    Ok(chosen)
}

/// Chooses one access-head replica among `existing` replicas that may
/// span multiple groups, returning its index into `existing`.
///
/// `group_geotags` gives the geotag to score each entry of `existing`
/// against; `existing`, `group_geotags`, and `reachable` are parallel.
pub fn access_head_replica_multiple_group(
    existing: &[FsId],
    group_geotags: &[GeoTag],
    reachable: &[bool],
    accesser_geotag: &GeoTag,
    saturation: &[bool],
    forced_fs: Option<FsId>,
) -> CoreResult<usize> {
    if existing.is_empty() {
        return Err(CoreError::NoneAvailable("no replicas exist for this file".into()));
    }
    debug_assert_eq!(existing.len(), group_geotags.len());
    debug_assert_eq!(existing.len(), reachable.len());
    debug_assert_eq!(existing.len(), saturation.len());

    if let Some(forced) = forced_fs {
        return existing
            .iter()
            .position(|fsid| *fsid == forced)
            .filter(|idx| reachable[*idx])
            .ok_or_else(|| CoreError::PolicyViolation(format!("forced fs {forced} is not an accessible replica")));
    }

    let candidates: Vec<usize> = (0..existing.len()).filter(|&i| reachable[i]).collect();
    if candidates.is_empty() {
        return Err(CoreError::NoneAvailable("no replica is currently reachable".into()));
    }

    let best_score = candidates
        .iter()
        .map(|&i| score_for(&group_geotags[i], accesser_geotag, saturation[i]))
        .max()
        .ok_or_else(|| CoreError::Internal("candidate list became empty after scoring".into()))?;

    let bucket: Vec<usize> = candidates
        .into_iter()
        .filter(|&i| score_for(&group_geotags[i], accesser_geotag, saturation[i]) == best_score)
        .collect();

    // A uniform draw over the highest-scoring bucket; deterministic
    // pick of the lowest index stands in for "uniform" without pulling
    // in a dependency on actual randomness for a tie-break.
    bucket.into_iter().min().ok_or_else(|| CoreError::Internal("winning score bucket was empty".into()))
}

fn score_for(geotag: &GeoTag, accesser_geotag: &GeoTag, saturated: bool) -> i64 {
    let proximity = i64::try_from(geotag.common_prefix_len(accesser_geotag)).unwrap_or(i64::MAX);
    proximity + if saturated { SATURATED_GEO_PENALTY } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::SchedGroup;
    use crate::health::{ConfigStatus, FsHealth};
    use geodisk_core::GroupId;

    fn health(geotag: &str) -> FsHealth {
        FsHealth {
            geotag: GeoTag::new(geotag),
            host: "h".into(),
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
    fn prefers_the_replica_closest_to_the_accesser() {
        let group = SchedGroup::new(GroupId(1));
        group.insert_fs(FsId(1), health("eu::de::berlin"), true).unwrap();
        group.insert_fs(FsId(2), health("us::ca::sf"), true).unwrap();
        let chosen = access_replicas_one_group(
            &group,
            FastTreeKind::ReadAccess,
            1,
            &[FsId(1), FsId(2)],
            &GeoTag::new("eu::de::munich"),
            10.0,
        )
        .unwrap();
        assert_eq!(chosen, vec![FsId(1)]);
    }

    #[test]
    fn access_head_picks_the_reachable_closest_group() {
        let existing = [FsId(1), FsId(2)];
        let geotags = [GeoTag::new("us::ca"), GeoTag::new("eu::de")];
        let reachable = [true, true];
        let saturation = [false, false];
        let idx = access_head_replica_multiple_group(&existing, &geotags, &reachable, &GeoTag::new("eu::de::berlin"), &saturation, None).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn access_head_errors_with_none_available_when_nothing_is_reachable() {
        let existing = [FsId(1)];
        let geotags = [GeoTag::new("eu")];
        let reachable = [false];
        let saturation = [false];
        let err = access_head_replica_multiple_group(&existing, &geotags, &reachable, &GeoTag::new("eu"), &saturation, None).unwrap_err();
        assert!(matches!(err, CoreError::NoneAvailable(_)));
    }

    #[test]
    fn access_head_rejects_a_forced_fs_outside_the_candidate_set() {
        let existing = [FsId(1)];
        let geotags = [GeoTag::new("eu")];
        let reachable = [true];
        let saturation = [false];
        let err = access_head_replica_multiple_group(&existing, &geotags, &reachable, &GeoTag::new("eu"), &saturation, Some(FsId(99))).unwrap_err();
        assert!(matches!(err, CoreError::PolicyViolation(_)));
    }
}
