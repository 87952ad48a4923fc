// SPDX-License-Identifier: Apache-2.0
//! Geo-aware placement and access scheduler.
//!
//! Each scheduling group owns a slow tree (the authoritative, rarely-read
//! geotag-bucketed leaf set) and seven double-buffered fast trees, one per
//! operation class, rebuilt from the slow tree and swapped in behind an
//! `ArcSwap` so placement and access calls never block on the slow tree's
//! lock. [`engine::Engine`] is the entry point: it owns every group, the
//! live tunable parameter set, and the shared change-notification bus.

pub mod access;
pub mod config;
pub mod disabled;
pub mod engine;
pub mod fast_tree;
pub mod geotag;
pub mod group;
pub mod health;
pub mod notify;
pub mod penalty;
pub mod placement;
pub mod slow_tree;

pub use config::{Parameter, SchedulerParams};
pub use engine::Engine;
pub use fast_tree::{FastTree, FastTreeKind, ALL_KINDS};
pub use geotag::GeoTag;
pub use group::SchedGroup;
pub use health::{ConfigStatus, FsHealth, WatchedKeyMask, NET_SPEED_CLASSES, WATCHED_KEYS};
pub use placement::PlacementRequest;
