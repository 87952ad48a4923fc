// SPDX-License-Identifier: Apache-2.0
//! Placement: selecting fs to receive new replicas within one group.

use std::collections::HashSet;

use geodisk_core::{CoreError, CoreResult, FsId};

use crate::fast_tree::{FastLeaf, FastTreeKind};
use crate::geotag::GeoTag;
use crate::group::SchedGroup;
use crate::penalty::ScorePenalties;

/// Parameters for one `placeNewReplicasOneGroup` call.
#[derive(Debug, Clone)]
pub struct PlacementRequest<'a> {
    /// Which of the three placement fast trees to draw from.
    pub kind: FastTreeKind,
    /// Number of new replicas to select.
    pub n: usize,
    /// Replicas the file already has; never re-selected.
    pub existing_replicas: &'a [FsId],
    /// Fs explicitly excluded from consideration.
    pub exclude_fs: &'a [FsId],
    /// Geotag subtrees excluded from consideration.
    pub exclude_geotags: &'a [GeoTag],
    /// If set, only candidates under one of these geotags are eligible.
    pub force_geotags: Option<&'a [GeoTag]>,
    /// Maximum replicas placed under the same top-level geotag branch.
    pub n_collocated_replicas: usize,
    /// Whether to prefer unsaturated candidates first.
    pub skip_saturated: bool,
    /// Download/upload saturation threshold, `0.0..=100.0`.
    pub saturation_threshold: f64,
}

impl FastTreeKind {
    fn assert_is_placement(self) {
        debug_assert!(self.is_placement(), "placement request must use a placement fast-tree kind");
    }
}

fn top_level_branch(geotag: &GeoTag) -> String {
    geotag.as_str().split("::").next().unwrap_or("").to_string()
}

/// Selects `req.n` file systems within `group` for new replicas,
/// applying a per-fs score penalty after each pick so a single call
/// spreads its choices instead of piling onto the single best candidate.
pub fn place_new_replicas_one_group(
    group: &SchedGroup,
    req: &PlacementRequest<'_>,
    penalties: &ScorePenalties,
) -> CoreResult<Vec<FsId>> {
    req.kind.assert_is_placement();

    // Work on an owned clone of the whole fast tree (not just the
    // eligible subset) so post-pick penalties can be published back for
    // leaves this call didn't otherwise filter out.
    let snapshot = group.snapshot(req.kind);
    let mut working: Vec<FastLeaf> = snapshot.leaves.clone();

    let excluded: HashSet<FsId> = req.existing_replicas.iter().chain(req.exclude_fs).copied().collect();
    let eligible = |leaf: &FastLeaf| {
        !excluded.contains(&leaf.fsid)
            && !req.exclude_geotags.iter().any(|g| leaf.geotag.is_under(g))
            && req.force_geotags.is_none_or(|tags| tags.iter().any(|g| leaf.geotag.is_under(g)))
    };

    if !working.iter().any(eligible) {
        return Err(CoreError::NoneAvailable(format!("group {} has no placement candidates", group.group_id())));
    }

    let mut chosen = Vec::with_capacity(req.n);
    let mut chosen_set: HashSet<FsId> = HashSet::new();
    let mut branch_counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    while chosen.len() < req.n {
        let Some(idx) = find_free_slot(&working, &eligible, &chosen_set, req.skip_saturated, req.saturation_threshold, req.n_collocated_replicas, &branch_counts) else {
            break;
        };
        *branch_counts.entry(top_level_branch(&working[idx].geotag)).or_insert(0) += 1;
        chosen_set.insert(working[idx].fsid);
        chosen.push(working[idx].fsid);
        penalties.apply(&mut working[idx], true);
    }

    group.store_fast_snapshot(req.kind, crate::fast_tree::FastTree { leaves: working });

    if chosen.len() < req.n {
        return Err(CoreError::InsufficientReplicas { requested: req.n, available: chosen.len() });
    }
    Ok(chosen)
}

/// Picks the best-scoring eligible, not-yet-chosen candidate. Tries the
/// strict pass first (skip saturated, respect collocation budget); if
/// nothing qualifies and `skip_saturated` was requested, retries once
/// allowing saturated candidates, then once more ignoring the
/// collocation budget, before giving up.
#[allow(clippy::too_many_arguments)]
fn find_free_slot(
    candidates: &[FastLeaf],
    eligible: impl Fn(&FastLeaf) -> bool,
    chosen: &HashSet<FsId>,
    skip_saturated: bool,
    saturation_threshold: f64,
    n_collocated_replicas: usize,
    branch_counts: &std::collections::HashMap<String, usize>,
) -> Option<usize> {
    let under_budget = |leaf: &FastLeaf| {
        branch_counts.get(&top_level_branch(&leaf.geotag)).copied().unwrap_or(0) < n_collocated_replicas.max(1)
    };

    let pick = |allow_saturated: bool, enforce_budget: bool| {
        candidates
            .iter()
            .enumerate()
            .filter(|(_, l)| eligible(l) && !chosen.contains(&l.fsid))
            .filter(|(_, l)| allow_saturated || !l.saturated(saturation_threshold))
            .filter(|(_, l)| !enforce_budget || under_budget(l))
            .max_by(|(_, a), (_, b)| {
                a.composite_score().partial_cmp(&b.composite_score()).unwrap_or(std::cmp::Ordering::Equal).then(b.fsid.cmp(&a.fsid))
            })
            .map(|(idx, _)| idx)
    };

    pick(!skip_saturated, true)
        .or_else(|| if skip_saturated { pick(true, true) } else { None })
        .or_else(|| pick(true, false))
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

    fn group_with_fs(geotags: &[&str]) -> SchedGroup {
        let group = SchedGroup::new(GroupId(1));
        for (i, tag) in geotags.iter().enumerate() {
            group.insert_fs(FsId(i as u64 + 1), health(tag), true).unwrap();
        }
        group
    }

    #[test]
    fn selects_n_distinct_fs_not_in_existing_or_excluded() {
        let group = group_with_fs(&["eu::de", "eu::fr", "us::ca", "us::ny"]);
        let req = PlacementRequest {
            kind: FastTreeKind::Placement,
            n: 2,
            existing_replicas: &[FsId(1)],
            exclude_fs: &[FsId(2)],
            exclude_geotags: &[],
            force_geotags: None,
            n_collocated_replicas: 4,
            skip_saturated: false,
            saturation_threshold: 10.0,
        };
        let chosen = place_new_replicas_one_group(&group, &req, &ScorePenalties::default()).unwrap();
        assert_eq!(chosen.len(), 2);
        assert!(!chosen.contains(&FsId(1)));
        assert!(!chosen.contains(&FsId(2)));
    }

    #[test]
    fn collocation_budget_spreads_across_branches() {
        let group = group_with_fs(&["eu::de", "eu::fr", "us::ca"]);
        let req = PlacementRequest {
            kind: FastTreeKind::Placement,
            n: 2,
            existing_replicas: &[],
            exclude_fs: &[],
            exclude_geotags: &[],
            force_geotags: None,
            n_collocated_replicas: 1,
            skip_saturated: false,
            saturation_threshold: 10.0,
        };
        let chosen = place_new_replicas_one_group(&group, &req, &ScorePenalties::default()).unwrap();
        let branches: HashSet<String> = chosen
            .iter()
            .map(|fsid| {
                let tag = group.snapshot(FastTreeKind::Placement).leaves.iter().find(|l| l.fsid == *fsid).unwrap().geotag.clone();
                top_level_branch(&tag)
            })
            .collect();
        assert_eq!(branches.len(), 2, "with n_collocated_replicas=1 the two picks should land on different branches");
    }

    #[test]
    fn insufficient_candidates_reports_how_many_were_available() {
        let group = group_with_fs(&["eu::de"]);
        let req = PlacementRequest {
            kind: FastTreeKind::Placement,
            n: 3,
            existing_replicas: &[],
            exclude_fs: &[],
            exclude_geotags: &[],
            force_geotags: None,
            n_collocated_replicas: 10,
            skip_saturated: false,
            saturation_threshold: 10.0,
        };
        let err = place_new_replicas_one_group(&group, &req, &ScorePenalties::default()).unwrap_err();
        match err {
            CoreError::InsufficientReplicas { requested, available } => {
                assert_eq!(requested, 3);
                assert_eq!(available, 1);
            }
            other => panic!("expected InsufficientReplicas, got {other:?}"),
        }
    }

    #[test]
    fn force_geotags_restricts_to_the_whitelisted_subtree() {
        let group = group_with_fs(&["eu::de", "us::ca"]);
        let req = PlacementRequest {
            kind: FastTreeKind::Placement,
            n: 1,
            existing_replicas: &[],
            exclude_fs: &[],
            exclude_geotags: &[],
            force_geotags: Some(&[GeoTag::new("us")]),
            n_collocated_replicas: 4,
            skip_saturated: false,
            saturation_threshold: 10.0,
        };
        let chosen = place_new_replicas_one_group(&group, &req, &ScorePenalties::default()).unwrap();
        assert_eq!(chosen, vec![FsId(2)]);
    }
}
