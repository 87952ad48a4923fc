// SPDX-License-Identifier: Apache-2.0
//! The read-optimized projection of a group's slow tree: a flat, scored
//! candidate list per operation class, double-buffered behind an
//! [`arc_swap::ArcSwap`] so placement and access calls never block on the
//! slow tree's lock.
//!
//! The original engine packs this structure as a literal tree so a
//! traversal can prune whole saturated subtrees in one comparison; here
//! the same selection semantics (skip-saturated retry, geotag-prefix
//! proximity, per-branch disabling) are expressed over a flat `Vec`
//! instead, trading the traversal's early pruning for a simpler, equally
//! deterministic linear scan. Diversity and locality still fall out of
//! comparing each candidate's geotag, since neither property actually
//! depends on the nesting, only on the prefix relation between tags.

use geodisk_core::FsId;

use crate::disabled::DisabledBranches;
use crate::geotag::GeoTag;
use crate::health::FsHealth;
use crate::slow_tree::SlowTree;

/// Which of the seven operation classes a fast tree serves. Matches the
/// original engine's `rOAccessTree` / `rWAccessTree` / `blcAccessTree` /
/// `drnAccessTree` / `placementTree` / `blcPlacementTree` /
/// `drnPlacementTree` split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FastTreeKind {
    /// Normal placement of new replicas.
    Placement,
    /// Placement driven by a drain job relocating a replica off its fs.
    DrainPlacement,
    /// Placement driven by a balancer evening out fill ratios.
    BalancePlacement,
    /// Normal read access.
    ReadAccess,
    /// Read/write access.
    WriteAccess,
    /// Access performed by a drain job.
    DrainAccess,
    /// Access performed by a balancer job.
    BalanceAccess,
}

/// All seven kinds, in a fixed order used to size per-group arrays.
pub const ALL_KINDS: [FastTreeKind; 7] = [
    FastTreeKind::Placement,
    FastTreeKind::DrainPlacement,
    FastTreeKind::BalancePlacement,
    FastTreeKind::ReadAccess,
    FastTreeKind::WriteAccess,
    FastTreeKind::DrainAccess,
    FastTreeKind::BalanceAccess,
];

impl FastTreeKind {
    /// Whether this kind selects fs for new data (placement) as opposed
    /// to existing data (access).
    #[must_use]
    pub fn is_placement(self) -> bool {
        matches!(self, Self::Placement | Self::DrainPlacement | Self::BalancePlacement)
    }

    fn leaf_eligible(self, health: &FsHealth) -> bool {
        if !health.booted {
            return false;
        }
        if self.is_placement() {
            health.config_status.placeable() && !health.draining
        } else {
            health.config_status.accessible()
        }
    }
}

/// One candidate leaf in a fast tree: enough of its health snapshot to
/// score and select it without touching the slow tree.
#[derive(Debug, Clone)]
pub struct FastLeaf {
    /// The file system this candidate represents.
    pub fsid: FsId,
    /// Its geotag, used for proximity and branch-disabling checks.
    pub geotag: GeoTag,
    /// Net-speed bucket indexing the score-penalty vectors.
    pub net_speed_class: u8,
    /// Current download score; mutated by `apply_penalty` on a local
    /// clone during one placement call.
    pub dl_score: f64,
    /// Current upload score; mutated the same way.
    pub ul_score: f64,
}

impl FastLeaf {
    /// Whether this leaf is below the saturation threshold on either
    /// score.
    #[must_use]
    pub fn saturated(&self, threshold: f64) -> bool {
        self.dl_score < threshold || self.ul_score < threshold
    }

    /// A single composite score used to rank candidates: the lower of
    /// the two scores, since either running out saturates the leaf.
    #[must_use]
    pub fn composite_score(&self) -> f64 {
        self.dl_score.min(self.ul_score)
    }
}

/// A read-optimized snapshot of one group's leaves for one operation
/// class.
#[derive(Debug, Clone, Default)]
pub struct FastTree {
    /// Candidate leaves, in fsid order for deterministic tie-breaking.
    pub leaves: Vec<FastLeaf>,
}

impl FastTree {
    /// Rebuilds a fast tree of `kind` from the current slow tree,
    /// excluding leaves masked by `disabled` and leaves whose health
    /// makes them ineligible for this operation class.
    #[must_use]
    pub fn build(slow: &SlowTree, kind: FastTreeKind, disabled: &DisabledBranches) -> Self {
        let mut leaves: Vec<FastLeaf> = slow
            .leaves()
            .filter(|leaf| kind.leaf_eligible(&leaf.health))
            .filter(|leaf| !disabled.masks(kind, &leaf.health.geotag))
            .map(|leaf| FastLeaf {
                fsid: leaf.fsid,
                geotag: leaf.health.geotag.clone(),
                net_speed_class: leaf.health.net_speed_class,
                dl_score: leaf.health.dl_score,
                ul_score: leaf.health.ul_score,
            })
            .collect();
        leaves.sort_by_key(|l| l.fsid);
        Self { leaves }
    }
}
