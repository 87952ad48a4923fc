// SPDX-License-Identifier: Apache-2.0
//! The configured set of disabled `(op-kind, geotag)` branches that masks
//! subtrees from selection within one group.

use geodisk_core::{CoreError, CoreResult};

use crate::fast_tree::FastTreeKind;
use crate::geotag::GeoTag;

/// One disabled branch: every leaf under `geotag` is excluded from
/// selection for `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisabledBranch {
    /// Which of the seven fast trees this branch is masked from.
    pub kind: FastTreeKind,
    /// The geotag subtree root being masked.
    pub geotag: GeoTag,
}

/// Disabled branches configured for one group.
#[derive(Debug, Default, Clone)]
pub struct DisabledBranches {
    entries: Vec<DisabledBranch>,
}

impl DisabledBranches {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a branch. Rejected if its geotag overlaps (is the same as, is
    /// under, or already contains) an existing disabled branch for the
    /// same kind — only one disjoint mask per subtree is meaningful.
    pub fn add(&mut self, kind: FastTreeKind, geotag: GeoTag) -> CoreResult<()> {
        for existing in &self.entries {
            if existing.kind == kind && (geotag.is_under(&existing.geotag) || existing.geotag.is_under(&geotag)) {
                return Err(CoreError::PolicyViolation(format!(
                    "geotag {geotag} overlaps already-disabled branch {}",
                    existing.geotag
                )));
            }
        }
        self.entries.push(DisabledBranch { kind, geotag });
        Ok(())
    }

    /// Removes a previously added branch. A no-op if absent.
    pub fn remove(&mut self, kind: FastTreeKind, geotag: &GeoTag) {
        self.entries.retain(|e| !(e.kind == kind && e.geotag == *geotag));
    }

    /// Whether `leaf_geotag` is masked out for `kind`.
    #[must_use]
    pub fn masks(&self, kind: FastTreeKind, leaf_geotag: &GeoTag) -> bool {
        self.entries.iter().any(|e| e.kind == kind && leaf_geotag.is_under(&e.geotag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_everything_under_the_disabled_geotag() {
        let mut disabled = DisabledBranches::new();
        disabled.add(FastTreeKind::Placement, GeoTag::new("eu::de")).unwrap();
        assert!(disabled.masks(FastTreeKind::Placement, &GeoTag::new("eu::de::berlin")));
        assert!(!disabled.masks(FastTreeKind::Placement, &GeoTag::new("eu::fr")));
        assert!(!disabled.masks(FastTreeKind::ReadAccess, &GeoTag::new("eu::de::berlin")));
    }

    #[test]
    fn overlapping_prefix_is_rejected() {
        let mut disabled = DisabledBranches::new();
        disabled.add(FastTreeKind::Placement, GeoTag::new("eu::de")).unwrap();
        assert!(disabled.add(FastTreeKind::Placement, GeoTag::new("eu::de::berlin")).is_err());
        assert!(disabled.add(FastTreeKind::Placement, GeoTag::new("eu")).is_err());
        assert!(disabled.add(FastTreeKind::Placement, GeoTag::new("us")).is_ok());
    }

    #[test]
    fn remove_unmasks_the_branch() {
        let mut disabled = DisabledBranches::new();
        disabled.add(FastTreeKind::Placement, GeoTag::new("eu::de")).unwrap();
        disabled.remove(FastTreeKind::Placement, &GeoTag::new("eu::de"));
        assert!(!disabled.masks(FastTreeKind::Placement, &GeoTag::new("eu::de::berlin")));
    }
}
