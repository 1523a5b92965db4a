use parking_lot::RwLock;
use shardmap_common::{InstanceId, MapId, ParticipantId};
use shardmap_kernel::{CorpseRecord, MapStateLoader, RespawnTime};
use std::collections::BTreeMap;

use crate::records::{CorpseEntry, InstanceRecord, InstanceStore, RespawnEntry};
use crate::store::StoreError;

/// Store kept entirely in memory. Also the working set of
/// [`JsonInstanceStore`](crate::JsonInstanceStore).
#[derive(Debug, Default)]
pub struct MemoryInstanceStore {
    instances: RwLock<BTreeMap<InstanceId, InstanceRecord>>,
    respawns: RwLock<Vec<RespawnEntry>>,
    corpses: RwLock<Vec<CorpseEntry>>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        instances: Vec<InstanceRecord>,
        respawns: Vec<RespawnEntry>,
        corpses: Vec<CorpseEntry>,
    ) -> Self {
        Self {
            instances: RwLock::new(instances.into_iter().map(|r| (r.id, r)).collect()),
            respawns: RwLock::new(respawns),
            corpses: RwLock::new(corpses),
        }
    }

    /// Insert or replace the record for `record.id`.
    pub fn save_instance(&self, record: InstanceRecord) -> Result<(), StoreError> {
        if record.id.is_base() {
            return Err(StoreError::ReservedId);
        }
        self.instances.write().insert(record.id, record);
        Ok(())
    }

    pub fn remove_instance(&self, id: InstanceId) -> Option<InstanceRecord> {
        let removed = self.instances.write().remove(&id);
        if removed.is_some() {
            self.respawns.write().retain(|r| r.instance != id);
            self.corpses.write().retain(|c| c.instance != id);
        }
        removed
    }

    pub fn save_respawn(&self, entry: RespawnEntry) {
        let mut respawns = self.respawns.write();
        respawns.retain(|r| {
            !(r.map == entry.map && r.instance == entry.instance && r.spawn_id == entry.spawn_id)
        });
        respawns.push(entry);
    }

    pub fn save_corpse(&self, entry: CorpseEntry) {
        let mut corpses = self.corpses.write();
        corpses.retain(|c| c.owner != entry.owner);
        corpses.push(entry);
    }

    pub fn remove_corpse(&self, owner: ParticipantId) -> bool {
        let mut corpses = self.corpses.write();
        let before = corpses.len();
        corpses.retain(|c| c.owner != owner);
        corpses.len() != before
    }

    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    pub(crate) fn respawn_entries(&self) -> Vec<RespawnEntry> {
        self.respawns.read().clone()
    }

    pub(crate) fn corpse_entries(&self) -> Vec<CorpseEntry> {
        self.corpses.read().clone()
    }
}

impl InstanceStore for MemoryInstanceStore {
    fn instances(&self) -> Result<Vec<InstanceRecord>, StoreError> {
        Ok(self.instances.read().values().copied().collect())
    }

    fn highest_instance_id(&self) -> Result<u32, StoreError> {
        Ok(self.instances.read().keys().next_back().map_or(0, |id| id.0))
    }
}

impl MapStateLoader for MemoryInstanceStore {
    fn load_respawn_times(&self, map: MapId, instance: InstanceId) -> Vec<RespawnTime> {
        self.respawns
            .read()
            .iter()
            .filter(|r| r.map == map && r.instance == instance)
            .map(RespawnTime::from)
            .collect()
    }

    fn load_corpses(&self, map: MapId, instance: InstanceId) -> Vec<CorpseRecord> {
        self.corpses
            .read()
            .iter()
            .filter(|c| c.location.map == map && c.instance == instance)
            .map(CorpseRecord::from)
            .collect()
    }
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
            difficulty: Difficulty::Normal,
            reset_at: 0,
        }
    }

    #[test]
    fn instances_come_back_sorted() {
        let store = MemoryInstanceStore::new();
        for id in [7, 2, 5] {
            store.save_instance(record(id)).unwrap();
        }
        let ids: Vec<u32> = store.instances().unwrap().iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![2, 5, 7]);
        assert_eq!(store.highest_instance_id().unwrap(), 7);
    }

    #[test]
    fn empty_store_has_highest_zero() {
        assert_eq!(MemoryInstanceStore::new().highest_instance_id().unwrap(), 0);
    }

    #[test]
    fn id_zero_is_rejected() {
        let store = MemoryInstanceStore::new();
        assert!(matches!(
            store.save_instance(record(0)),
            Err(StoreError::ReservedId)
        ));
    }

    #[test]
    fn state_is_filtered_by_map_and_instance() {
        let store = MemoryInstanceStore::new();
        store.save_respawn(RespawnEntry {
            map: MapId(0),
            instance: InstanceId::BASE,
            spawn_id: 1,
            respawn_at: 100,
        });
        store.save_respawn(RespawnEntry {
            map: MapId(1),
            instance: InstanceId::BASE,
            spawn_id: 2,
            respawn_at: 100,
        });
        // same spawn saved again replaces the timer
        store.save_respawn(RespawnEntry {
            map: MapId(0),
            instance: InstanceId::BASE,
            spawn_id: 1,
            respawn_at: 250,
        });
        store.save_corpse(CorpseEntry {
            owner: ParticipantId::new(),
            instance: InstanceId::BASE,
            location: WorldLocation::new(MapId(0), Vec3::new(1.0, 2.0, 3.0)),
        });

        let respawns = store.load_respawn_times(MapId(0), InstanceId::BASE);
        assert_eq!(respawns.len(), 1);
        assert_eq!(respawns[0].respawn_at, 250);
        assert_eq!(store.load_corpses(MapId(0), InstanceId::BASE).len(), 1);
        assert!(store.load_corpses(MapId(1), InstanceId::BASE).is_empty());
    }

    #[test]
    fn removing_instance_drops_its_state() {
        let store = MemoryInstanceStore::new();
        store.save_instance(record(3)).unwrap();
        store.save_respawn(RespawnEntry {
            map: MapId(36),
            instance: InstanceId(3),
            spawn_id: 9,
            respawn_at: 1,
        });
        assert!(store.remove_instance(InstanceId(3)).is_some());
        assert!(store.load_respawn_times(MapId(36), InstanceId(3)).is_empty());
        assert_eq!(store.instance_count(), 0);
    }

    #[test]
    fn corpse_is_one_per_owner() {
        let store = MemoryInstanceStore::new();
        let owner = ParticipantId::new();
        for map in [0, 1] {
            store.save_corpse(CorpseEntry {
                owner,
                instance: InstanceId::BASE,
                location: WorldLocation::new(MapId(map), Vec3::ZERO),
            });
        }
        assert!(store.load_corpses(MapId(0), InstanceId::BASE).is_empty());
        assert_eq!(store.load_corpses(MapId(1), InstanceId::BASE).len(), 1);
        assert!(store.remove_corpse(owner));
        assert!(!store.remove_corpse(owner));
    }
}
