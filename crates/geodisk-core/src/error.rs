// SPDX-License-Identifier: Apache-2.0
//! Error taxonomy shared by every `geodisk` crate.
//!
//! Lower layers return [`CoreError`] directly; only the outer boundary
//! (client-facing entry points) translates it into a [`posix::PosixErrno`].

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type CoreResult<T> = Result<T, CoreError>;

/// The shared error taxonomy. Each variant maps to a distinct
/// failure kind; callers match on the variant rather than parsing messages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// OS read/write/open failure.
    #[error("io error at {context}: {source}")]
    Io {
        /// What was being attempted (path, offset, or operation name).
        context: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Magic/checksum/size mismatch in a changelog record.
    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord {
        /// Byte offset of the record that failed to verify.
        offset: u64,
        /// Human-readable description of which check failed.
        reason: String,
    },

    /// Partial tail record: follow-safe, scan-fatal.
    #[error("truncated record at offset {offset}, {available} of {expected} bytes present")]
    Truncated {
        /// Byte offset where the partial record begins.
        offset: u64,
        /// Bytes actually available.
        available: usize,
        /// Bytes the framing declared.
        expected: usize,
    },

    /// Requested id absent from an index or arena.
    #[error("not found: {0}")]
    NotFound(String),

    /// Name or id clash within a container/group.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// No free slot in a scheduling tree; selection impossible.
    #[error("capacity full: {0}")]
    CapacityFull(String),

    /// An access requested more replicas than exist or are available.
    #[error("insufficient replicas: requested {requested}, available {available}")]
    InsufficientReplicas {
        /// Replicas requested by the caller.
        requested: usize,
        /// Replicas actually usable.
        available: usize,
    },

    /// No candidate at all exists for the request (as opposed to fewer
    /// than requested) — every replica, file system, or branch considered
    /// is absent, excluded, or unreachable.
    #[error("no candidate available: {0}")]
    NoneAvailable(String),

    /// Forced fs not in the candidate set, or a disabled-branch clash.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// A bounded wait was exceeded.
    #[error("timed out after {0:?}")]
    TimedOut(std::time::Duration),

    /// An invariant was violated; logged with enough context to locate the
    /// offending entity.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl CoreError {
    /// Builds an [`CoreError::Io`] variant, recording what was being
    /// attempted so the message is actionable without re-deriving state.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// POSIX-shaped numeric codes. Only constructed at the outer boundary
/// ("higher layers translate to POSIX-shape numeric codes only at
/// the outer boundary").
pub mod posix {
    use super::CoreError;

    /// The exhaustive set of POSIX-shape codes the outer boundary exposes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum PosixErrno {
        /// Read-only filesystem / no writable target (`EROFS`).
        Erofs,
        /// No network / no candidate available (`ENONET`).
        Enonet,
        /// No data / forced target not in candidate set (`ENODATA`).
        Enodata,
        /// Generic I/O error (`EIO`).
        Eio,
        /// Entity does not exist (`ENOENT`).
        Enoent,
    }

    impl From<&CoreError> for PosixErrno {
        fn from(err: &CoreError) -> Self {
            match err {
                CoreError::NotFound(_) => Self::Enoent,
                CoreError::CapacityFull(_) => Self::Erofs,
                CoreError::InsufficientReplicas { .. } => Self::Erofs,
                CoreError::NoneAvailable(_) => Self::Enonet,
                CoreError::PolicyViolation(_) => Self::Enodata,
                CoreError::Io { .. }
                | CoreError::CorruptRecord { .. }
                | CoreError::Truncated { .. }
                | CoreError::AlreadyExists(_)
                | CoreError::TimedOut(_)
                | CoreError::Internal(_) => Self::Eio,
            }
        }
    }
}
