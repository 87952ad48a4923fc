// SPDX-License-Identifier: Apache-2.0
//! A thread-safe, in-memory publish/subscribe bus ("Dynamic
//! publish/subscribe bus").
//!
//! The contract the scheduler needs is small: bind the calling thread to a
//! named subscriber, subscribe it to a subject prefix and a watched-key
//! set, then poll `next_event` for coalesced notifications. Any real
//! deployment could back this with a message broker; the in-memory queue
//! here is the whole contract a test (or `geodisk-sched`) requires.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use geodisk_core::error::{CoreError, CoreResult};

/// The kind of change a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyKind {
    /// A new subject was created. Creations are ignored by
    /// the scheduler (insertion is explicit) but still delivered here.
    Creation,
    /// A subject was deleted.
    Deletion,
    /// A subject's value changed.
    Modification,
    /// A single key under a subject was deleted.
    KeyDeletion,
}

/// One delivered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The raw subject string the event was published under (`"queue;key"`).
    pub subject: String,
    /// What kind of change occurred.
    pub kind: NotifyKind,
    /// The key component of the subject ("subject format
    /// `queue;key` is parsed").
    pub key: String,
}

/// Splits a `"queue;key"` subject into its two components.
fn parse_subject(subject: &str) -> Option<(&str, &str)> {
    subject.split_once(';')
}

struct SubscriberState {
    prefix: Mutex<String>,
    watched_keys: Mutex<HashSet<String>>,
    queue: Mutex<VecDeque<Event>>,
    cv: Condvar,
    active: Mutex<bool>,
}

impl SubscriberState {
    fn new() -> Self {
        Self {
            prefix: Mutex::new(String::new()),
            watched_keys: Mutex::new(HashSet::new()),
            queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            active: Mutex::new(false),
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<(String, Arc<SubscriberState>)>> = const { RefCell::new(None) };
}

/// A named publish/subscribe bus. Subscribers bind to a calling thread via
/// [`NotifyBus::bind_current_thread`], then poll events with
/// [`NotifyBus::next_event`] from that same thread.
#[derive(Default)]
pub struct NotifyBus {
    subscribers: Mutex<HashMap<String, Arc<SubscriberState>>>,
}

impl NotifyBus {
    /// Creates an empty bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or reuses) a named subscriber and binds it to the
    /// calling thread. Subsequent calls to [`Self::subscribe`],
    /// [`Self::start_notify_current_thread`], and [`Self::next_event`] from
    /// this thread act on that subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] if the subscriber registry lock is
    /// poisoned.
    pub fn bind_current_thread(&self, name: impl Into<String>) -> CoreResult<()> {
        let name = name.into();
        let state = {
            let mut subs = self
                .subscribers
                .lock()
                .map_err(|_| CoreError::Internal("notify subscriber registry poisoned".to_owned()))?;
            subs.entry(name.clone())
                .or_insert_with(|| Arc::new(SubscriberState::new()))
                .clone()
        };
        CURRENT.with(|cell| *cell.borrow_mut() = Some((name, state)));
        Ok(())
    }

    /// Marks the calling thread's subscriber active, so [`Self::publish`]
    /// starts delivering events to it.
    ///
    /// # Errors
    ///
    /// [`CoreError::PolicyViolation`] if the calling thread has no bound
    /// subscriber.
    pub fn start_notify_current_thread(&self) -> CoreResult<()> {
        with_current(|state| {
            *state
                .active
                .lock()
                .map_err(|_| CoreError::Internal("notify active flag poisoned".to_owned()))? = true;
            Ok(())
        })
    }

    /// Subscribes the calling thread's subscriber to every subject whose
    /// queue component equals `subject_prefix`, filtered to `keys` (an
    /// empty set means "every key").
    ///
    /// # Errors
    ///
    /// [`CoreError::PolicyViolation`] if the calling thread has no bound
    /// subscriber.
    pub fn subscribe(
        &self,
        subject_prefix: impl Into<String>,
        keys: impl IntoIterator<Item = String>,
    ) -> CoreResult<()> {
        let subject_prefix = subject_prefix.into();
        with_current(|state| {
            *state
                .prefix
                .lock()
                .map_err(|_| CoreError::Internal("notify prefix lock poisoned".to_owned()))? =
                subject_prefix;
            let mut watched = state
                .watched_keys
                .lock()
                .map_err(|_| CoreError::Internal("notify watched-keys lock poisoned".to_owned()))?;
            watched.extend(keys);
            Ok(())
        })
    }

    /// Publishes one event to every active subscriber whose prefix matches
    /// `subject`'s queue component and whose watched-key set (if
    /// non-empty) contains the key component.
    ///
    /// Malformed subjects (no `;` separator) are logged and discarded
    /// unless `kind` is [`NotifyKind::Modification`] ("non-
    /// modification events on unknown subjects are logged and discarded").
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] only if the subscriber registry lock
    /// is poisoned; a malformed subject is not an error.
    pub fn publish(&self, subject: &str, kind: NotifyKind, key_hint: &str) -> CoreResult<()> {
        let Some((queue, key)) = parse_subject(subject) else {
            if !matches!(kind, NotifyKind::Modification) {
                tracing::warn!(subject, ?kind, "discarding event on unparseable subject");
            }
            return Ok(());
        };
        let key = if key.is_empty() { key_hint } else { key };

        let subs = self
            .subscribers
            .lock()
            .map_err(|_| CoreError::Internal("notify subscriber registry poisoned".to_owned()))?;
        for state in subs.values() {
            let is_active = state.active.lock().map(|g| *g).unwrap_or(false);
            if !is_active {
                continue;
            }
            let prefix_matches = state
                .prefix
                .lock()
                .map(|p| p.as_str() == queue)
                .unwrap_or(false);
            if !prefix_matches {
                continue;
            }
            let key_matches = state
                .watched_keys
                .lock()
                .map(|w| w.is_empty() || w.contains(key))
                .unwrap_or(false);
            if !key_matches {
                continue;
            }
            if let Ok(mut queue_guard) = state.queue.lock() {
                queue_guard.push_back(Event {
                    subject: subject.to_owned(),
                    kind,
                    key: key.to_owned(),
                });
                state.cv.notify_one();
            }
        }
        Ok(())
    }

    /// Pops the next event for the calling thread's subscriber, waiting up
    /// to `timeout` if the queue is currently empty. Returns `Ok(None)` on
    /// timeout — this is the polling contract the scheduler's updater
    /// thread uses to evaluate `timeFrameDurationMs`.
    ///
    /// # Errors
    ///
    /// [`CoreError::PolicyViolation`] if the calling thread has no bound
    /// subscriber; [`CoreError::Internal`] if the queue lock is poisoned.
    pub fn next_event(&self, timeout: Duration) -> CoreResult<Option<Event>> {
        with_current(|state| {
            let mut queue = state
                .queue
                .lock()
                .map_err(|_| CoreError::Internal("notify queue lock poisoned".to_owned()))?;
            let deadline = Instant::now() + timeout;
            while queue.is_empty() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(None);
                }
                let (guard, _timed_out) = state
                    .cv
                    .wait_timeout(queue, remaining)
                    .map_err(|_| CoreError::Internal("notify queue lock poisoned".to_owned()))?;
                queue = guard;
            }
            Ok(queue.pop_front())
        })
    }
}

fn with_current<T>(f: impl FnOnce(&SubscriberState) -> CoreResult<T>) -> CoreResult<T> {
    CURRENT.with(|cell| {
        let borrowed = cell.borrow();
        let (_, state) = borrowed.as_ref().ok_or_else(|| {
            CoreError::PolicyViolation("no subscriber bound on this thread".to_owned())
        })?;
        f(state)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_and_publish_round_trips_an_event() {
        let bus = NotifyBus::new();
        bus.bind_current_thread("updater").unwrap();
        bus.subscribe("fs", ["stat.geotag".to_owned()]).unwrap();
        bus.start_notify_current_thread().unwrap();

        bus.publish("fs;stat.geotag", NotifyKind::Modification, "")
            .unwrap();

        let event = bus.next_event(Duration::from_millis(50)).unwrap();
        let event = event.expect("event should be delivered");
        assert_eq!(event.key, "stat.geotag");
        assert_eq!(event.kind, NotifyKind::Modification);
    }

    #[test]
    fn next_event_times_out_when_queue_is_empty() {
        let bus = NotifyBus::new();
        bus.bind_current_thread("idle").unwrap();
        bus.subscribe("fs", Vec::new()).unwrap();
        bus.start_notify_current_thread().unwrap();

        let event = bus.next_event(Duration::from_millis(20)).unwrap();
        assert!(event.is_none());
    }

    #[test]
    fn unwatched_keys_are_not_delivered() {
        let bus = NotifyBus::new();
        bus.bind_current_thread("picky").unwrap();
        bus.subscribe("fs", ["stat.geotag".to_owned()]).unwrap();
        bus.start_notify_current_thread().unwrap();

        bus.publish("fs;stat.errc", NotifyKind::Modification, "")
            .unwrap();
        let event = bus.next_event(Duration::from_millis(20)).unwrap();
        assert!(event.is_none());
    }

    #[test]
    fn inactive_subscriber_receives_nothing() {
        let bus = NotifyBus::new();
        bus.bind_current_thread("dormant").unwrap();
        bus.subscribe("fs", Vec::new()).unwrap();
        // Note: start_notify_current_thread() is never called.

        bus.publish("fs;stat.errc", NotifyKind::Modification, "")
            .unwrap();
        let event = bus.next_event(Duration::from_millis(20)).unwrap();
        assert!(event.is_none());
    }

    #[test]
    fn malformed_subject_is_discarded_without_error() {
        let bus = NotifyBus::new();
        assert!(bus
            .publish("not-a-valid-subject", NotifyKind::Deletion, "")
            .is_ok());
    }

    #[test]
    fn operations_without_a_bound_subscriber_fail_as_policy_violation() {
        let bus = NotifyBus::new();
        let err = bus.next_event(Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, CoreError::PolicyViolation(_)));
    }
}
