// SPDX-License-Identifier: Apache-2.0
//! Aggregates per-stripe completions into a single request status plus an
//! `{offset -> errno}` error map (an async meta-handler that
//! aggregates completions and surfaces a per-request status plus an
//! errors-map").

use std::collections::BTreeMap;
use std::sync::Mutex;

use geodisk_core::error::posix::PosixErrno;
use geodisk_core::error::CoreError;

/// Collects the outcome of a batch of concurrent stripe calls, keyed by the
/// byte offset each call targeted.
#[derive(Default)]
pub struct MetaHandler {
    errors: Mutex<BTreeMap<u64, PosixErrno>>,
}

impl MetaHandler {
    /// Creates an empty handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of one stripe call at `offset`. Call this once
    /// per completion in a batch (for example, once per stripe in a
    /// RaidDP group read).
    pub fn record(&self, offset: u64, result: &Result<(), CoreError>) {
        if let Err(err) = result {
            let errno = PosixErrno::from(err);
            if let Ok(mut errors) = self.errors.lock() {
                errors.insert(offset, errno);
            }
        }
    }

    /// Whether every recorded call succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.lock().map(|e| e.is_empty()).unwrap_or(true)
    }

    /// The accumulated `{offset -> errno}` map for every failed call.
    #[must_use]
    pub fn errors(&self) -> BTreeMap<u64, PosixErrno> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_handler_reports_ok() {
        let handler = MetaHandler::new();
        assert!(handler.is_ok());
        assert!(handler.errors().is_empty());
    }

    #[test]
    fn a_single_failure_is_recorded_at_its_offset() {
        let handler = MetaHandler::new();
        handler.record(0, &Ok(()));
        handler.record(4096, &Err(CoreError::NotFound("stripe 1".to_owned())));
        assert!(!handler.is_ok());
        let errors = handler.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[&4096], PosixErrno::Enoent);
    }
}
