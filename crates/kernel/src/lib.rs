//! Map kernel: live map registry, instance routing, instance id allocation.
//!
//! # Invariants
//! - One base map per definition; child terrain maps are only created by
//!   their root's creation.
//! - Instance id 0 is never allocated.
//! - Map content changes visible to other maps are applied in the delayed
//!   phase only.

pub mod error;
pub mod instance_id;
pub mod manager;
pub mod map;
pub mod registry;
pub mod router;
pub mod state;
pub mod terrain;

pub use error::MapError;
pub use instance_id::{InstanceIdAllocator, InstanceIdError, SharedInstanceIds};
pub use manager::{ERROR_EXIT_CODE, MapManager, MapServices};
pub use map::{
    EntryRequest, InstanceRequest, Map, MapContext, MapObserver, Transfer, UpdatePhase,
};
pub use registry::MapRegistry;
pub use router::InstanceRouter;
pub use state::{CorpseRecord, MapStateLoader, NoPersistence, RespawnTime};
pub use terrain::{DirectoryTerrain, GridCoord, NoTerrain, TerrainSource};

pub fn crate_info() -> &'static str {
    "shardmap-kernel v0.1.0"
}
