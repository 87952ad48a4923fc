// SPDX-License-Identifier: Apache-2.0
//! Scenario: create five files, remove two, close and reopen the log, and
//! check that only the surviving three replay back.

use geodisk_core::error::CoreError;
use geodisk_core::ids::ContainerId;
use geodisk_changelog::MetadataStore;

#[test]
fn surviving_files_replay_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("namespace.log");
    let root = ContainerId::from(0);

    let ids = {
        let store = MetadataStore::open(&path).unwrap();
        let mut ids = Vec::new();
        for i in 1..=5 {
            ids.push(
                store
                    .create_file(root, format!("file{i}"), 0, 0, 0o644, (0, 0))
                    .unwrap(),
            );
        }
        store.remove_file(ids[1]).unwrap();
        store.remove_file(ids[3]).unwrap();
        ids
    };

    let reopened = MetadataStore::open(&path).unwrap();
    let surviving: Vec<&str> = ["file1", "file3", "file5"].to_vec();
    for (id, name) in [ids[0], ids[2], ids[4]].into_iter().zip(surviving) {
        let md = reopened.get_by_id(id).unwrap();
        assert_eq!(md.name, name);
    }

    for id in [ids[1], ids[3]] {
        assert!(matches!(reopened.get_by_id(id), Err(CoreError::NotFound(_))));
    }
}
