// SPDX-License-Identifier: Apache-2.0
//! File and container metadata: an in-memory arena replayed from (and kept
//! in sync with) the changelog.
//!
//! Entities reference their parent container by id only — the arena owns
//! every entity and is keyed by id, with no back-pointers ("the
//! parent holds children by id, not by shared ownership").

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use geodisk_core::error::{CoreError, CoreResult};
use geodisk_core::ids::{ContainerId, FileId};
use serde::{Deserialize, Serialize};

use crate::format::{REMOVE_RECORD, UPDATE_RECORD};
use crate::store::{ChangelogFile, DecodedRecord, LogRecordScanner};

/// REMOVE record payload tag: the 8-byte id that follows names a [`FileId`].
const REMOVE_TAG_FILE: u8 = 0;
/// REMOVE record payload tag: the 8-byte id that follows names a
/// [`ContainerId`].
const REMOVE_TAG_CONTAINER: u8 = 1;

/// A file metadata entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileMd {
    /// Unique identifier.
    pub id: FileId,
    /// Containing directory's id.
    pub container_id: ContainerId,
    /// Entry name, unique within `container_id`.
    pub name: String,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// POSIX-style mode bits.
    pub mode: u32,
    /// Creation time, seconds + nanoseconds.
    pub ctime: (i64, u32),
    /// Last modification time, seconds + nanoseconds.
    pub mtime: (i64, u32),
    /// Logical file size in bytes.
    pub size: u64,
    /// Checksum buffer (algorithm-agnostic opaque bytes).
    pub checksum: Vec<u8>,
    /// Layout id (e.g. replica count or `raid-dp` group parameters).
    pub layout_id: u32,
    /// Current (live) replica location ids.
    pub locations: Vec<u64>,
    /// Locations pending unlink (no longer referenced but not yet purged).
    pub unlinked_locations: Vec<u64>,
}

/// A container (directory) metadata entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerMd {
    /// Unique identifier.
    pub id: ContainerId,
    /// Parent container's id (0 for the root).
    pub parent_id: ContainerId,
    /// Entry name, unique within `parent_id`.
    pub name: String,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// POSIX-style mode bits.
    pub mode: u32,
    /// Creation time, seconds + nanoseconds.
    pub ctime: (i64, u32),
}

/// Either a file or a container record, tagged so a single changelog
/// payload encoding can carry both kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
enum Entity {
    File(FileMd),
    Container(ContainerMd),
}

/// The replayable, mutable view of the namespace: files and containers,
/// keyed by id, kept consistent with an underlying [`ChangelogFile`].
///
/// Name uniqueness within a container is enforced on create; cascade
/// deletion of a container recursively removes its children by id.
pub struct MetadataStore {
    log: ChangelogFile,
    files: Mutex<BTreeMap<FileId, FileMd>>,
    containers: Mutex<BTreeMap<ContainerId, ContainerMd>>,
    children: Mutex<BTreeMap<ContainerId, Vec<FileId>>>,
    child_containers: Mutex<BTreeMap<ContainerId, Vec<ContainerId>>>,
    next_file_id: AtomicU64,
    next_container_id: AtomicU64,
}

impl MetadataStore {
    /// Opens (or creates) the backing changelog and replays it into an
    /// empty in-memory arena.
    ///
    /// # Errors
    ///
    /// Propagates any [`CoreError`] from opening or replaying the log.
    pub fn open(path: impl AsRef<std::path::Path>) -> CoreResult<Self> {
        let log = ChangelogFile::open(path)?;
        let store = Self {
            log,
            files: Mutex::new(BTreeMap::new()),
            containers: Mutex::new(BTreeMap::new()),
            children: Mutex::new(BTreeMap::new()),
            child_containers: Mutex::new(BTreeMap::new()),
            next_file_id: AtomicU64::new(1),
            next_container_id: AtomicU64::new(1),
        };
        store.replay()?;
        Ok(store)
    }

    fn replay(&self) -> CoreResult<()> {
        let mut replayer = Replayer { store: self };
        self.log.scan_all_records(&mut replayer)
    }

    /// Allocates a fresh id and creates a file entry in `container_id`.
    ///
    /// # Errors
    ///
    /// [`CoreError::AlreadyExists`] if `name` is already taken within
    /// `container_id`.
    pub fn create_file(
        &self,
        container_id: ContainerId,
        name: impl Into<String>,
        uid: u32,
        gid: u32,
        mode: u32,
        now: (i64, u32),
    ) -> CoreResult<FileId> {
        let name = name.into();
        let mut files = self.lock_files()?;
        let mut children = self.lock_children()?;

        let siblings = children.entry(container_id).or_default();
        if siblings
            .iter()
            .filter_map(|id| files.get(id))
            .any(|f| f.name == name)
        {
            return Err(CoreError::AlreadyExists(format!(
                "{name} already exists in container {container_id}"
            )));
        }

        let id = FileId::from(self.next_file_id.fetch_add(1, Ordering::SeqCst));
        let md = FileMd {
            id,
            container_id,
            name,
            uid,
            gid,
            mode,
            ctime: now,
            mtime: now,
            size: 0,
            checksum: Vec::new(),
            layout_id: 0,
            locations: Vec::new(),
            unlinked_locations: Vec::new(),
        };

        self.append_update(&md)?;
        siblings.push(id);
        files.insert(id, md);
        Ok(id)
    }

    /// Persists a (possibly modified) file record: appends an UPDATE
    /// record and refreshes the in-memory index.
    ///
    /// # Errors
    ///
    /// Any [`CoreError`] from the underlying append.
    pub fn update_store(&self, md: FileMd) -> CoreResult<()> {
        self.append_update(&md)?;
        let mut files = self.lock_files()?;
        files.insert(md.id, md);
        Ok(())
    }

    /// Appends a REMOVE record for `id` and evicts it from the index.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if `id` is not currently present.
    pub fn remove_file(&self, id: FileId) -> CoreResult<()> {
        let container_id = {
            let files = self.lock_files()?;
            files
                .get(&id)
                .map(|f| f.container_id)
                .ok_or_else(|| CoreError::NotFound(format!("file {id}")))?
        };

        self.append_remove(id)?;

        let mut files = self.lock_files()?;
        files.remove(&id);
        drop(files);

        let mut children = self.lock_children()?;
        if let Some(siblings) = children.get_mut(&container_id) {
            siblings.retain(|cid| *cid != id);
        }
        Ok(())
    }

    /// Looks up a file by id.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if `id` is absent.
    pub fn get_by_id(&self, id: FileId) -> CoreResult<FileMd> {
        self.lock_files()?
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("file {id}")))
    }

    /// Lists every live file id in `container_id`, in creation order.
    ///
    /// # Errors
    ///
    /// Propagates a lock-poisoning [`CoreError::Internal`].
    pub fn list_container(&self, container_id: ContainerId) -> CoreResult<Vec<FileId>> {
        Ok(self
            .lock_children()?
            .get(&container_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Allocates a fresh id and creates a subcontainer of `parent_id`.
    ///
    /// # Errors
    ///
    /// [`CoreError::AlreadyExists`] if `name` is already taken among
    /// `parent_id`'s subcontainers.
    pub fn create_container(
        &self,
        parent_id: ContainerId,
        name: impl Into<String>,
        uid: u32,
        gid: u32,
        mode: u32,
        now: (i64, u32),
    ) -> CoreResult<ContainerId> {
        let name = name.into();
        let mut containers = self.lock_containers()?;
        let mut child_containers = self.lock_child_containers()?;

        let siblings = child_containers.entry(parent_id).or_default();
        if siblings.iter().filter_map(|id| containers.get(id)).any(|c| c.name == name) {
            return Err(CoreError::AlreadyExists(format!(
                "{name} already exists in container {parent_id}"
            )));
        }

        let id = ContainerId::from(self.next_container_id.fetch_add(1, Ordering::SeqCst));
        let md = ContainerMd { id, parent_id, name, uid, gid, mode, ctime: now };

        self.append_container_update(&md)?;
        siblings.push(id);
        containers.insert(id, md);
        Ok(id)
    }

    /// Looks up a container by id.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if `id` is absent.
    pub fn get_container(&self, id: ContainerId) -> CoreResult<ContainerMd> {
        self.lock_containers()?
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("container {id}")))
    }

    /// Lists every live subcontainer id of `parent_id`, in creation order.
    ///
    /// # Errors
    ///
    /// Propagates a lock-poisoning [`CoreError::Internal`].
    pub fn list_subcontainers(&self, parent_id: ContainerId) -> CoreResult<Vec<ContainerId>> {
        Ok(self.lock_child_containers()?.get(&parent_id).cloned().unwrap_or_default())
    }

    /// Removes `id` and, recursively, every file and subcontainer beneath
    /// it: the metadata-entity equivalent of deleting a graph node and its
    /// incident edges, walked depth-first since a container never holds
    /// its children by direct ownership.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if `id` is not currently present.
    pub fn remove_container(&self, id: ContainerId) -> CoreResult<()> {
        let parent_id = self.get_container(id)?.parent_id;

        for file_id in self.list_container(id)? {
            self.remove_file(file_id)?;
        }
        for child_id in self.list_subcontainers(id)? {
            self.remove_container(child_id)?;
        }

        self.append_container_remove(id)?;

        self.lock_containers()?.remove(&id);
        if let Some(siblings) = self.lock_child_containers()?.get_mut(&parent_id) {
            siblings.retain(|cid| *cid != id);
        }
        self.lock_child_containers()?.remove(&id);
        Ok(())
    }

    fn append_update(&self, md: &FileMd) -> CoreResult<u64> {
        let payload = serde_json::to_vec(&Entity::File(md.clone()))
            .map_err(|e| CoreError::Internal(format!("encode file record: {e}")))?;
        self.log.store_record(UPDATE_RECORD, &payload)
    }

    fn append_container_update(&self, md: &ContainerMd) -> CoreResult<u64> {
        let payload = serde_json::to_vec(&Entity::Container(md.clone()))
            .map_err(|e| CoreError::Internal(format!("encode container record: {e}")))?;
        self.log.store_record(UPDATE_RECORD, &payload)
    }

    fn append_remove(&self, id: FileId) -> CoreResult<u64> {
        let mut payload = vec![REMOVE_TAG_FILE];
        payload.extend_from_slice(&id.as_u64().to_le_bytes());
        self.log.store_record(REMOVE_RECORD, &payload)
    }

    fn append_container_remove(&self, id: ContainerId) -> CoreResult<u64> {
        let mut payload = vec![REMOVE_TAG_CONTAINER];
        payload.extend_from_slice(&id.as_u64().to_le_bytes());
        self.log.store_record(REMOVE_RECORD, &payload)
    }

    fn lock_files(&self) -> CoreResult<std::sync::MutexGuard<'_, BTreeMap<FileId, FileMd>>> {
        self.files
            .lock()
            .map_err(|_| CoreError::Internal("metadata files lock poisoned".to_owned()))
    }

    fn lock_containers(
        &self,
    ) -> CoreResult<std::sync::MutexGuard<'_, BTreeMap<ContainerId, ContainerMd>>> {
        self.containers
            .lock()
            .map_err(|_| CoreError::Internal("metadata containers lock poisoned".to_owned()))
    }

    fn lock_children(
        &self,
    ) -> CoreResult<std::sync::MutexGuard<'_, BTreeMap<ContainerId, Vec<FileId>>>> {
        self.children
            .lock()
            .map_err(|_| CoreError::Internal("metadata children lock poisoned".to_owned()))
    }

    fn lock_child_containers(
        &self,
    ) -> CoreResult<std::sync::MutexGuard<'_, BTreeMap<ContainerId, Vec<ContainerId>>>> {
        self.child_containers
            .lock()
            .map_err(|_| CoreError::Internal("metadata child-containers lock poisoned".to_owned()))
    }
}

struct Replayer<'a> {
    store: &'a MetadataStore,
}

impl LogRecordScanner for Replayer<'_> {
    fn process_record(&mut self, record: &DecodedRecord) -> bool {
        match record.record_type {
            t if t == UPDATE_RECORD => match serde_json::from_slice::<Entity>(&record.payload) {
                Ok(Entity::File(md)) => {
                    if let (Ok(mut files), Ok(mut children)) =
                        (self.store.lock_files(), self.store.lock_children())
                    {
                        let siblings = children.entry(md.container_id).or_default();
                        if !siblings.contains(&md.id) {
                            siblings.push(md.id);
                        }
                        if md.id.as_u64() >= self.store.next_file_id.load(Ordering::SeqCst) {
                            self.store.next_file_id.store(md.id.as_u64() + 1, Ordering::SeqCst);
                        }
                        files.insert(md.id, md);
                    }
                }
                Ok(Entity::Container(md)) => {
                    if let (Ok(mut containers), Ok(mut child_containers)) =
                        (self.store.lock_containers(), self.store.lock_child_containers())
                    {
                        let siblings = child_containers.entry(md.parent_id).or_default();
                        if !siblings.contains(&md.id) {
                            siblings.push(md.id);
                        }
                        if md.id.as_u64() >= self.store.next_container_id.load(Ordering::SeqCst) {
                            self.store.next_container_id.store(md.id.as_u64() + 1, Ordering::SeqCst);
                        }
                        containers.insert(md.id, md);
                    }
                }
                Err(_) => {}
            },
            t if t == REMOVE_RECORD => {
                if record.payload.len() == 9 {
                    let raw: [u8; 8] = record.payload[1..9].try_into().unwrap_or([0; 8]);
                    let raw_id = u64::from_le_bytes(raw);
                    match record.payload[0] {
                        REMOVE_TAG_FILE => {
                            let id = FileId::from(raw_id);
                            if let Ok(mut files) = self.store.lock_files() {
                                if let Some(md) = files.remove(&id) {
                                    if let Ok(mut children) = self.store.lock_children() {
                                        if let Some(siblings) = children.get_mut(&md.container_id) {
                                            siblings.retain(|cid| *cid != id);
                                        }
                                    }
                                }
                            }
                        }
                        REMOVE_TAG_CONTAINER => {
                            let id = ContainerId::from(raw_id);
                            if let Ok(mut containers) = self.store.lock_containers() {
                                if let Some(md) = containers.remove(&id) {
                                    if let Ok(mut child_containers) = self.store.lock_child_containers() {
                                        if let Some(siblings) = child_containers.get_mut(&md.parent_id) {
                                            siblings.retain(|cid| *cid != id);
                                        }
                                        child_containers.remove(&id);
                                    }
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        true
    }
}
