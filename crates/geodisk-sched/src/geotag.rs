// SPDX-License-Identifier: Apache-2.0
//! Geotags: `::`-delimited location strings (`"eu::de::berlin"`) ordered
//! root-to-leaf, most general segment first.

use serde::{Deserialize, Serialize};

/// A geotag, stored as its raw `::`-delimited string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeoTag(String);

impl GeoTag {
    /// Wraps a raw geotag string as-is; no validation is performed since
    /// an empty string is a legal (root) geotag.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw geotag string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split("::").filter(|s| !s.is_empty())
    }

    /// Number of `::`-delimited segments shared with `other`, counted from
    /// the root. Two geotags with no common root segment return 0.
    #[must_use]
    pub fn common_prefix_len(&self, other: &GeoTag) -> usize {
        self.segments().zip(other.segments()).take_while(|(a, b)| a == b).count()
    }

    /// Whether `self` is `branch` or lies underneath it in the tree, i.e.
    /// every segment of `branch` is a prefix of `self`'s segments in order.
    #[must_use]
    pub fn is_under(&self, branch: &GeoTag) -> bool {
        let branch_len = branch.segments().count();
        branch_len == 0 || self.common_prefix_len(branch) == branch_len
    }
}

impl From<&str> for GeoTag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for GeoTag {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Display for GeoTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
