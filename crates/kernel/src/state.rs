//! Persistent per-map state loaded when a non-instanceable map is created.

use shardmap_common::{InstanceId, MapId, ParticipantId, WorldLocation};

/// Scheduled respawn of a spawn point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RespawnTime {
    pub spawn_id: u64,
    /// Unix time in seconds.
    pub respawn_at: u64,
}

/// A corpse left behind by a participant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorpseRecord {
    pub owner: ParticipantId,
    pub location: WorldLocation,
}

/// Storage collaborator for respawn timers and corpses.
pub trait MapStateLoader: Send + Sync {
    fn load_respawn_times(&self, map: MapId, instance: InstanceId) -> Vec<RespawnTime>;
    fn load_corpses(&self, map: MapId, instance: InstanceId) -> Vec<CorpseRecord>;
}

/// Loader for servers without persistent map state.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPersistence;

impl MapStateLoader for NoPersistence {
    fn load_respawn_times(&self, _map: MapId, _instance: InstanceId) -> Vec<RespawnTime> {
        Vec::new()
    }

    fn load_corpses(&self, _map: MapId, _instance: InstanceId) -> Vec<CorpseRecord> {
        Vec::new()
    }
}
