//! Facade tying the registry, router and instance id allocator together.

use shardmap_common::{InstanceId, MapCatalog, MapId, WorldConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::MapError;
use crate::instance_id::{InstanceIdAllocator, InstanceIdError, SharedInstanceIds};
use crate::map::{InstanceRequest, Map, MapContext, MapObserver};
use crate::registry::MapRegistry;
use crate::router::InstanceRouter;
use crate::state::{MapStateLoader, NoPersistence};
use crate::terrain::{self, NoTerrain, TerrainSource};

/// Exit code reported once a fatal condition requested shutdown.
pub const ERROR_EXIT_CODE: i32 = 1;

/// External collaborators wired into every map.
#[derive(Clone)]
pub struct MapServices {
    pub terrain: Arc<dyn TerrainSource>,
    pub state_loader: Arc<dyn MapStateLoader>,
    pub observer: Option<Arc<dyn MapObserver>>,
}

impl Default for MapServices {
    fn default() -> Self {
        Self {
            terrain: Arc::new(NoTerrain),
            state_loader: Arc::new(NoPersistence),
            observer: None,
        }
    }
}

pub struct MapManager {
    config: WorldConfig,
    registry: Arc<MapRegistry>,
    router: InstanceRouter,
    ids: SharedInstanceIds,
    shutdown: AtomicBool,
}

impl MapManager {
    pub fn new(config: WorldConfig, catalog: Arc<MapCatalog>, services: MapServices) -> Self {
        let ids = InstanceIdAllocator::default().wrap();
        let mut context = MapContext::new(&config, Arc::clone(&ids));
        if let Some(observer) = services.observer {
            context = context.with_observer(observer);
        }
        let registry = Arc::new(
            MapRegistry::new(catalog, context)
                .with_terrain(services.terrain)
                .with_state_loader(services.state_loader),
        );
        Self {
            config,
            router: InstanceRouter::new(Arc::clone(&registry)),
            registry,
            ids,
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MapRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<MapCatalog> {
        self.registry.catalog()
    }

    pub fn create_base_map(&self, id: MapId) -> Result<Arc<Map>, MapError> {
        self.registry.get_or_create_base(id)
    }

    /// Route a participant to the map or instance copy it should enter.
    pub fn create_map(
        &self,
        id: MapId,
        request: &InstanceRequest,
    ) -> Result<Option<Arc<Map>>, MapError> {
        self.router.resolve(id, request).inspect_err(|e| {
            if e.is_fatal() {
                self.request_shutdown(e);
            }
        })
    }

    pub fn find_base_map(&self, id: MapId) -> Option<Arc<Map>> {
        self.registry.find_base_map(id)
    }

    pub fn find_map(&self, id: MapId, instance: InstanceId) -> Option<Arc<Map>> {
        self.registry.find_map(id, instance)
    }

    pub fn is_valid_map(&self, id: MapId, startup: bool) -> bool {
        self.registry.is_valid_map(id, startup)
    }

    pub fn exist_map_and_vmap(&self, id: MapId, x: f32, y: f32) -> bool {
        terrain::exist_map_and_vmap(self.registry.terrain(), id, x, y)
    }

    // --- instance ids --------------------------------------------------

    /// Size the allocator for the highest id already in use.
    pub fn init_instance_ids(&self, highest_used: u32) {
        *self.ids.lock() = InstanceIdAllocator::new(highest_used);
    }

    /// Mark an id loaded from storage as used. Replay ids in ascending order.
    pub fn register_instance_id(&self, id: InstanceId) -> Result<(), InstanceIdError> {
        self.ids.lock().reserve(id)
    }

    pub fn generate_instance_id(&self) -> Result<InstanceId, InstanceIdError> {
        let result = self.ids.lock().allocate();
        if let Err(e) = &result {
            self.request_shutdown(&MapError::InstanceId(e.clone()));
        }
        result
    }

    pub fn free_instance_id(&self, id: InstanceId) -> Result<(), InstanceIdError> {
        self.ids.lock().release(id)
    }

    pub fn instance_ids(&self) -> &SharedInstanceIds {
        &self.ids
    }

    // --- counters & lifecycle ------------------------------------------

    pub fn num_instances(&self) -> usize {
        self.registry.num_instances()
    }

    pub fn num_participants_in_instances(&self) -> usize {
        self.registry.num_participants_in_instances()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Process exit code once shutdown was requested.
    pub fn exit_code(&self) -> Option<i32> {
        self.shutdown_requested().then_some(ERROR_EXIT_CODE)
    }

    fn request_shutdown(&self, cause: &MapError) {
        tracing::error!(error = %cause, "fatal map error, shutting down");
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Release and drop every map. Call after ticking has stopped.
    pub fn unload_all(&self) {
        self.registry.unload_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardmap_common::{Difficulty, MapDefinition, MapKind, ParticipantId};

    fn manager() -> MapManager {
        let catalog = MapCatalog::new(vec![
            MapDefinition::new(MapId(0), MapKind::Common),
            MapDefinition::new(MapId(36), MapKind::Dungeon),
        ])
        .unwrap();
        MapManager::new(
            WorldConfig::default(),
            Arc::new(catalog),
            MapServices::default(),
        )
    }

    #[test]
    fn startup_replay_then_allocate() {
        let mgr = manager();
        mgr.init_instance_ids(5);
        for id in [1, 2, 3, 5] {
            mgr.register_instance_id(InstanceId(id)).unwrap();
        }
        assert_eq!(mgr.generate_instance_id().unwrap(), InstanceId(4));
        assert_eq!(mgr.generate_instance_id().unwrap(), InstanceId(6));
        mgr.free_instance_id(InstanceId(2)).unwrap();
        assert_eq!(mgr.generate_instance_id().unwrap(), InstanceId(2));
        assert!(!mgr.shutdown_requested());
    }

    #[test]
    fn routed_instances_use_shared_allocator() {
        let mgr = manager();
        mgr.init_instance_ids(3);
        for id in 1..=3 {
            mgr.register_instance_id(InstanceId(id)).unwrap();
        }
        let request = InstanceRequest::new(ParticipantId::new(), Difficulty::Normal);
        let copy = mgr.create_map(MapId(36), &request).unwrap().unwrap();
        assert_eq!(copy.instance_id(), InstanceId(4));
        assert!(Arc::ptr_eq(
            &mgr.find_map(MapId(36), InstanceId(4)).unwrap(),
            &copy
        ));
        assert_eq!(mgr.num_instances(), 1);
    }

    #[test]
    fn exhaustion_latches_shutdown() {
        let mgr = manager();
        *mgr.instance_ids().lock() = InstanceIdAllocator::with_limit(0, 2);
        let request = InstanceRequest::new(ParticipantId::new(), Difficulty::Normal);
        mgr.create_map(MapId(36), &request).unwrap();
        assert_eq!(mgr.exit_code(), None);

        let err = mgr.create_map(MapId(36), &request).unwrap_err();
        assert!(matches!(err, MapError::InstanceId(InstanceIdError::Exhausted)));
        assert!(mgr.shutdown_requested());
        assert_eq!(mgr.exit_code(), Some(ERROR_EXIT_CODE));
    }

    #[test]
    fn unload_all_empties_registry() {
        let mgr = manager();
        mgr.create_base_map(MapId(0)).unwrap();
        mgr.unload_all();
        assert!(mgr.registry().is_empty());
    }
}
