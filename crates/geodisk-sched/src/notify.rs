// SPDX-License-Identifier: Apache-2.0
//! Change-notification consumption: reduces a frame's worth of
//! `geodisk_notify` events into one watched-key bitmask per fs.
//!
//! Every watched fs shares the bus queue path `"fs"`; the specific fs a
//! notification is about rides in the key component as `"{fsid}:{field}"`
//! (`geodisk_notify::Event` carries no entity id of its own). Producers
//! call [`publish_field_change`]; consumers drive [`collect_frame`] once
//! per `timeFrameDurationMs` tick.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use geodisk_core::{CoreResult, FsId};
use geodisk_notify::{Event, NotifyBus, NotifyKind};

use crate::health::{WatchedKeyMask, WATCHED_KEYS};

/// Shared bus queue path every watched fs publishes under.
pub const QUEUE_PATH: &str = "fs";

/// Binds the calling thread as the scheduler's updater subscriber,
/// listening on [`QUEUE_PATH`] for every key in [`WATCHED_KEYS`].
///
/// # Errors
///
/// Propagates any [`geodisk_core::CoreError`] from the underlying bus.
pub fn subscribe_updater(bus: &NotifyBus, name: impl Into<String>) -> CoreResult<()> {
    bus.bind_current_thread(name)?;
    bus.subscribe(QUEUE_PATH, std::iter::empty())?;
    bus.start_notify_current_thread()
}

/// Publishes one field change for `fsid`. `field` should be one of
/// [`WATCHED_KEYS`]; an unrecognized field is still delivered but will
/// not set any bit when reduced by [`WatchedKeyMask::set`].
///
/// # Errors
///
/// Propagates any [`geodisk_core::CoreError`] from the underlying bus.
pub fn publish_field_change(bus: &NotifyBus, fsid: FsId, field: &str) -> CoreResult<()> {
    let subject = format!("{QUEUE_PATH};{fsid}:{field}");
    bus.publish(&subject, NotifyKind::Modification, "")
}

/// Publishes that `fsid` was deleted upstream.
///
/// # Errors
///
/// Propagates any [`geodisk_core::CoreError`] from the underlying bus.
pub fn publish_deletion(bus: &NotifyBus, fsid: FsId) -> CoreResult<()> {
    let subject = format!("{QUEUE_PATH};{fsid}:");
    bus.publish(&subject, NotifyKind::Deletion, "")
}

fn parse_key(key: &str) -> Option<(FsId, &str)> {
    let (fsid, field) = key.split_once(':')?;
    let fsid = fsid.parse::<u64>().ok()?;
    Some((FsId(fsid), field))
}

/// The outcome of collecting one frame's notifications: per-fs watched
/// key masks for modifications, and the set of fsids reported deleted.
#[derive(Debug, Default)]
pub struct FrameResult {
    /// Coalesced modification masks, keyed by fsid.
    pub modified: HashMap<FsId, WatchedKeyMask>,
    /// Fsids the bus reported as deleted during this frame.
    pub deleted: Vec<FsId>,
}

fn record(result: &mut FrameResult, event: &Event) {
    let Some((fsid, field)) = parse_key(&event.key) else { return };
    match event.kind {
        // Insertion into a group is explicit (`insertFsIntoGroup`); a bus
        // creation notification carries no new information on its own.
        NotifyKind::Creation => {}
        NotifyKind::Deletion => result.deleted.push(fsid),
        NotifyKind::Modification | NotifyKind::KeyDeletion => {
            result.modified.entry(fsid).or_insert_with(WatchedKeyMask::empty).set(field);
        }
    }
}

/// Drains events for up to `frame_duration`, coalescing them into one
/// [`FrameResult`]. Returns once the duration elapses, even if events
/// are still arriving — the next frame picks those up.
///
/// # Errors
///
/// Propagates any [`geodisk_core::CoreError`] from the underlying bus,
/// except a timeout waiting for the next event, which simply ends the
/// frame.
pub fn collect_frame(bus: &NotifyBus, frame_duration: Duration) -> CoreResult<FrameResult> {
    let deadline = Instant::now() + frame_duration;
    let mut result = FrameResult::default();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(result);
        }
        match bus.next_event(remaining)? {
            Some(event) => record(&mut result, &event),
            None => return Ok(result),
        }
    }
}
