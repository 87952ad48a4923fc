// SPDX-License-Identifier: Apache-2.0
//! Strongly typed identifier newtypes.
//!
//! Thin wrappers over `u64`, following the `NodeId`/`TypeId`/`EdgeId`
//! newtype pattern used elsewhere in the workspace's lineage: a dedicated
//! type per id space prevents accidentally mixing a file id with a
//! container id or a file-system id with a scheduling-group id.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[repr(transparent)]
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            /// Returns the raw numeric value.
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(FileId, "Identifier for a file metadata entity.");
id_newtype!(ContainerId, "Identifier for a container (directory) metadata entity.");
id_newtype!(FsId, "Identifier for a file system (scheduling leaf).");
id_newtype!(GroupId, "Identifier for a scheduling group.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_u64() {
        let f = FileId::from(42);
        assert_eq!(f.as_u64(), 42);
        assert_eq!(f, FileId(42));
        assert_eq!(format!("{f}"), "42");
    }

    #[test]
    fn distinct_id_types_do_not_unify() {
        let file = FileId(7);
        let container = ContainerId(7);
        assert_eq!(file.as_u64(), container.as_u64());
        // Compile-time distinctness is the point; this just documents it.
    }
}
