// SPDX-License-Identifier: Apache-2.0
//! Bounded readahead queue for sequential group reads ("Resource
//! policy": "readahead uses a bounded queue of pre-allocated blocks...
//! on read-miss, all outstanding prefetches are drained before a new
//! alignment is chosen").

use std::collections::VecDeque;
use std::sync::Mutex;

/// Default number of groups a [`ReadaheadQueue`] holds ahead of the reader.
pub const DEFAULT_READAHEAD_DEPTH: usize = 2;

/// One prefetched group: its index plus its already-decoded data bytes.
#[derive(Debug, Clone)]
pub struct Prefetched {
    /// Which group this holds.
    pub group_index: u64,
    /// The group's decoded, data-only bytes.
    pub data: Vec<u8>,
}

/// A small FIFO of prefetched groups, capped at `depth` entries. Pushing
/// past capacity evicts the oldest entry rather than growing.
#[derive(Debug)]
pub struct ReadaheadQueue {
    depth: usize,
    items: Mutex<VecDeque<Prefetched>>,
}

impl ReadaheadQueue {
    /// Builds a queue holding at most `depth` prefetched groups.
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            items: Mutex::new(VecDeque::with_capacity(depth.max(1))),
        }
    }

    /// Takes the prefetched entry for `group_index` if present, removing
    /// it from the queue (a hit consumes the slot).
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn take(&self, group_index: u64) -> Option<Prefetched> {
        let mut items = self.items.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let pos = items.iter().position(|p| p.group_index == group_index)?;
        items.remove(pos)
    }

    /// Pushes a freshly prefetched group, evicting the oldest entry if the
    /// queue is already at capacity.
    #[allow(clippy::missing_panics_doc)]
    pub fn push(&self, entry: Prefetched) {
        let mut items = self.items.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if items.len() >= self.depth {
            items.pop_front();
        }
        items.push_back(entry);
    }

    /// Drops every outstanding prefetch without returning them: called on
    /// a read-miss before the reader picks a new alignment.
    #[allow(clippy::missing_panics_doc)]
    pub fn drain(&self) {
        self.items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }

    /// Number of groups currently held.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// Whether the queue currently holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
