// SPDX-License-Identifier: Apache-2.0
//! RAID-DP (row + diagonal XOR) erasure coding: stripes a byte stream
//! across `n+2` async targets (`n` data, one row-parity, one diagonal-
//! parity), recovering any pair of simultaneous block losses that RAID-DP
//! geometry covers.
//!
//! [`RaidLayout`] holds the pure index math (which big index belongs to
//! which row/diagonal); [`encode::compute_parity`] and
//! [`recover::recover_group`] operate on one in-memory group of blocks;
//! [`RaidDpGroupIo`] is the async orchestration layer tying that math to a
//! [`geodisk_stripe::StripeIo`] fleet.

pub mod encode;
pub mod group;
pub mod layout;
pub mod readahead;
pub mod recover;
pub mod truncate;
pub mod xor;

pub use encode::compute_parity;
pub use group::RaidDpGroupIo;
pub use layout::{BlockAddress, RaidLayout};
pub use readahead::{Prefetched, ReadaheadQueue, DEFAULT_READAHEAD_DEPTH};
pub use recover::recover_group;
pub use truncate::stripe_truncate_offset;
pub use xor::xor_into;
