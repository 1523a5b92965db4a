use serde::{Deserialize, Serialize};
use shardmap_common::{Difficulty, InstanceId, MapId, ParticipantId, WorldLocation};
use shardmap_kernel::{CorpseRecord, RespawnTime};

use crate::store::StoreError;

/// A saved instance copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub map: MapId,
    pub difficulty: Difficulty,
    /// Unix time in seconds; 0 when the copy never resets.
    #[serde(default)]
    pub reset_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespawnEntry {
    pub map: MapId,
    #[serde(default)]
    pub instance: InstanceId,
    pub spawn_id: u64,
    pub respawn_at: u64,
}

impl From<&RespawnEntry> for RespawnTime {
    fn from(e: &RespawnEntry) -> Self {
        RespawnTime {
            spawn_id: e.spawn_id,
            respawn_at: e.respawn_at,
        }
    }
}

/// A corpse; its map is the one in `location`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorpseEntry {
    pub owner: ParticipantId,
    #[serde(default)]
    pub instance: InstanceId,
    pub location: WorldLocation,
}

impl From<&CorpseEntry> for CorpseRecord {
    fn from(e: &CorpseEntry) -> Self {
        CorpseRecord {
            owner: e.owner,
            location: e.location,
        }
    }
}

/// Read access to saved instances.
pub trait InstanceStore: Send + Sync {
    /// Every saved instance, ascending by id.
    fn instances(&self) -> Result<Vec<InstanceRecord>, StoreError>;

    /// Highest saved id, 0 when nothing is saved.
    fn highest_instance_id(&self) -> Result<u32, StoreError> {
        Ok(self.instances()?.iter().map(|r| r.id.0).max().unwrap_or(0))
    }
}
