// SPDX-License-Identifier: Apache-2.0
//! Shared ambient stack for the `geodisk` workspace.
//!
//! This crate carries nothing domain-specific: error taxonomy, id newtypes,
//! a small configuration port, a tracing init helper, and a clock port.
//! Everything else in the workspace depends on it.

pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod telemetry;

pub use error::{CoreError, CoreResult};
pub use ids::{ContainerId, FileId, FsId, GroupId};
