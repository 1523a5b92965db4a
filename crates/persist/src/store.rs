//! File-backed instance store.
//!
//! Layout inside the store directory:
//! ```text
//! store.meta.json   - schema version
//! instances.json    - saved instance copies
//! respawns.json     - respawn timers
//! corpses.json      - corpses
//! ```
//!
//! Everything is loaded on open; each mutation rewrites the file it touches.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use shardmap_common::{InstanceId, MapId, ParticipantId};
use shardmap_kernel::{CorpseRecord, InstanceIdError, MapStateLoader, RespawnTime};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::memory::MemoryInstanceStore;
use crate::records::{CorpseEntry, InstanceRecord, InstanceStore, RespawnEntry};

/// Current on-disk schema version.
pub const STORE_SCHEMA_VERSION: u32 = 1;

const META_FILE: &str = "store.meta.json";
const INSTANCES_FILE: &str = "instances.json";
const RESPAWNS_FILE: &str = "respawns.json";
const CORPSES_FILE: &str = "corpses.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("instance id 0 is reserved")]
    ReservedId,
    #[error("replaying instance ids: {0}")]
    InstanceId(#[from] InstanceIdError),
}

/// Metadata stored in `store.meta.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub schema_version: u32,
}

pub struct JsonInstanceStore {
    root: PathBuf,
    meta: StoreMeta,
    data: MemoryInstanceStore,
}

impl JsonInstanceStore {
    /// Open the store at `path`, creating it when absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        let meta_path = root.join(META_FILE);
        let meta = if meta_path.exists() {
            let meta: StoreMeta = read_json(&meta_path)?;
            if meta.schema_version != STORE_SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.schema_version,
                    expected_version: STORE_SCHEMA_VERSION,
                });
            }
            meta
        } else {
            let meta = StoreMeta {
                schema_version: STORE_SCHEMA_VERSION,
            };
            write_json(&meta_path, &meta)?;
            meta
        };

        let instances: Vec<InstanceRecord> = read_json_or_default(&root.join(INSTANCES_FILE))?;
        if instances.iter().any(|r| r.id.is_base()) {
            return Err(StoreError::ReservedId);
        }
        let respawns = read_json_or_default(&root.join(RESPAWNS_FILE))?;
        let corpses = read_json_or_default(&root.join(CORPSES_FILE))?;
        tracing::debug!(
            path = %root.display(),
            instances = instances.len(),
            "opened instance store"
        );

        Ok(Self {
            root,
            meta,
            data: MemoryInstanceStore::from_parts(instances, respawns, corpses),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    pub fn save_instance(&self, record: InstanceRecord) -> Result<(), StoreError> {
        self.data.save_instance(record)?;
        self.write_instances()
    }

    /// Drop a saved copy together with its respawn timers and corpses.
    pub fn remove_instance(&self, id: InstanceId) -> Result<Option<InstanceRecord>, StoreError> {
        let removed = self.data.remove_instance(id);
        if removed.is_some() {
            self.write_instances()?;
            self.write_respawns()?;
            self.write_corpses()?;
        }
        Ok(removed)
    }

    pub fn save_respawn(&self, entry: RespawnEntry) -> Result<(), StoreError> {
        self.data.save_respawn(entry);
        self.write_respawns()
    }

    pub fn save_corpse(&self, entry: CorpseEntry) -> Result<(), StoreError> {
        self.data.save_corpse(entry);
        self.write_corpses()
    }

    pub fn remove_corpse(&self, owner: ParticipantId) -> Result<bool, StoreError> {
        let removed = self.data.remove_corpse(owner);
        if removed {
            self.write_corpses()?;
        }
        Ok(removed)
    }

    fn write_instances(&self) -> Result<(), StoreError> {
        write_json(&self.root.join(INSTANCES_FILE), &self.data.instances()?)
    }

    fn write_respawns(&self) -> Result<(), StoreError> {
        write_json(&self.root.join(RESPAWNS_FILE), &self.data.respawn_entries())
    }

    fn write_corpses(&self) -> Result<(), StoreError> {
        write_json(&self.root.join(CORPSES_FILE), &self.data.corpse_entries())
    }
}

impl InstanceStore for JsonInstanceStore {
    fn instances(&self) -> Result<Vec<InstanceRecord>, StoreError> {
        self.data.instances()
    }

    fn highest_instance_id(&self) -> Result<u32, StoreError> {
        self.data.highest_instance_id()
    }
}

impl MapStateLoader for JsonInstanceStore {
    fn load_respawn_times(&self, map: MapId, instance: InstanceId) -> Vec<RespawnTime> {
        self.data.load_respawn_times(map, instance)
    }

    fn load_corpses(&self, map: MapId, instance: InstanceId) -> Vec<CorpseRecord> {
        self.data.load_corpses(map, instance)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    if path.exists() {
        read_json(path)
    } else {
        Ok(T::default())
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    serde_json::to_writer_pretty(File::create(path)?, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use shardmap_common::{Difficulty, WorldLocation};

    fn record(id: u32) -> InstanceRecord {
        InstanceRecord {
            id: InstanceId(id),
            map: MapId(36),
            difficulty: Difficulty::Heroic,
            reset_at: 1_700_000_000,
        }
    }

    #[test]
    fn open_creates_meta() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonInstanceStore::open(tmp.path().join("store")).unwrap();
        assert_eq!(store.meta().schema_version, STORE_SCHEMA_VERSION);
        assert!(store.root().join(META_FILE).is_file());
        assert!(store.instances().unwrap().is_empty());
    }

    #[test]
    fn reopen_preserves_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store");
        let owner = ParticipantId::new();
        {
            let store = JsonInstanceStore::open(&path).unwrap();
            store.save_instance(record(4)).unwrap();
            store.save_instance(record(2)).unwrap();
            store
                .save_respawn(RespawnEntry {
                    map: MapId(0),
                    instance: InstanceId::BASE,
                    spawn_id: 77,
                    respawn_at: 500,
                })
                .unwrap();
            store
                .save_corpse(CorpseEntry {
                    owner,
                    instance: InstanceId::BASE,
                    location: WorldLocation::new(MapId(0), Vec3::new(-5.0, 10.0, 0.5)),
                })
                .unwrap();
        }

        let store = JsonInstanceStore::open(&path).unwrap();
        let ids: Vec<InstanceId> = store.instances().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![InstanceId(2), InstanceId(4)]);
        assert_eq!(store.highest_instance_id().unwrap(), 4);
        assert_eq!(store.instances().unwrap()[0], record(2));

        let respawns = store.load_respawn_times(MapId(0), InstanceId::BASE);
        assert_eq!(respawns, vec![RespawnTime { spawn_id: 77, respawn_at: 500 }]);
        let corpses = store.load_corpses(MapId(0), InstanceId::BASE);
        assert_eq!(corpses.len(), 1);
        assert_eq!(corpses[0].owner, owner);
    }

    #[test]
    fn removal_is_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store");
        {
            let store = JsonInstanceStore::open(&path).unwrap();
            store.save_instance(record(9)).unwrap();
            assert!(store.remove_instance(InstanceId(9)).unwrap().is_some());
            assert!(store.remove_instance(InstanceId(9)).unwrap().is_none());
        }
        let store = JsonInstanceStore::open(&path).unwrap();
        assert_eq!(store.highest_instance_id().unwrap(), 0);
    }

    #[test]
    fn schema_mismatch_fail_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store");
        let _store = JsonInstanceStore::open(&path).unwrap();

        write_json(&path.join(META_FILE), &StoreMeta { schema_version: 999 }).unwrap();

        match JsonInstanceStore::open(&path) {
            Err(StoreError::SchemaMismatch {
                file_version,
                expected_version,
            }) => {
                assert_eq!(file_version, 999);
                assert_eq!(expected_version, STORE_SCHEMA_VERSION);
            }
            Err(e) => panic!("expected SchemaMismatch, got: {e}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn stored_id_zero_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(
            path.join(INSTANCES_FILE),
            r#"[{"id": 0, "map": 36, "difficulty": "normal"}]"#,
        )
        .unwrap();
        assert!(matches!(
            JsonInstanceStore::open(&path),
            Err(StoreError::ReservedId)
        ));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join(CORPSES_FILE), "{not json").unwrap();
        assert!(matches!(
            JsonInstanceStore::open(&path),
            Err(StoreError::Json(_))
        ));
    }
}
