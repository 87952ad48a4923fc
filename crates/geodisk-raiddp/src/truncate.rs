// SPDX-License-Identifier: Apache-2.0
//! Truncate semantics ("Truncate semantics", resolved open question:
//! append-only write semantics are normative; mid-file rewrite is
//! unsupported). Ported from `RaidDpFile::truncate`.

use crate::layout::RaidLayout;

/// Computes the local byte offset each of the `n+2` stripe files should be
/// truncated to, for a user-facing truncate to `offset` group-relative
/// bytes. Rounds up to the nearest group boundary: every stripe holds `n`
/// blocks per group, so the local length is
/// `ceil(offset / size_group) * stripe_width * n + size_header`.
///
/// A user-facing truncate to `0` is a no-op in the source (`RaidDpFile::
/// truncate` returns immediately without touching any stripe); callers
/// should special-case `offset == 0` themselves rather than relying on
/// this function, which always computes the rounded value.
#[must_use]
pub fn stripe_truncate_offset(layout: &RaidLayout, offset: u64, size_header: u64) -> u64 {
    let size_group = layout.size_group() as u64;
    let groups = offset.div_ceil(size_group.max(1));
    groups * layout.stripe_width as u64 * layout.n as u64 + size_header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_within_one_group_rounds_up_to_a_full_group() {
        let layout = RaidLayout::new(4, 1024);
        let size_group = layout.size_group() as u64; // 4*4*1024 = 16384
        let offset = size_group / 2;
        let truncated = stripe_truncate_offset(&layout, offset, 128);
        assert_eq!(truncated, 1 * layout.stripe_width as u64 * layout.n as u64 + 128);
    }

    #[test]
    fn truncate_exactly_on_a_group_boundary_does_not_round_up_further() {
        let layout = RaidLayout::new(4, 1024);
        let size_group = layout.size_group() as u64;
        let truncated = stripe_truncate_offset(&layout, size_group, 128);
        assert_eq!(truncated, layout.stripe_width as u64 * layout.n as u64 + 128);
    }

    #[test]
    fn truncate_spanning_two_groups_rounds_to_the_second() {
        let layout = RaidLayout::new(4, 1024);
        let size_group = layout.size_group() as u64;
        let truncated = stripe_truncate_offset(&layout, size_group + 1, 128);
        assert_eq!(truncated, 2 * layout.stripe_width as u64 * layout.n as u64 + 128);
    }
}
