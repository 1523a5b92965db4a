//! Registry of live base maps.
//!
//! # Invariants
//! - At most one base map exists per definition id; entries are never
//!   replaced, only dropped by [`MapRegistry::unload_all`].
//! - A definition with a parent is installed only by its root's creation.
//! - Creation is serialized by one mutex; lookups never take it.

use parking_lot::{Mutex, RwLock};
use shardmap_common::{InstanceId, MapCatalog, MapDefinition, MapId};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::MapError;
use crate::map::{Map, MapContext};
use crate::state::{MapStateLoader, NoPersistence};
use crate::terrain::{NoTerrain, TerrainSource};

pub struct MapRegistry {
    catalog: Arc<MapCatalog>,
    context: MapContext,
    terrain: Arc<dyn TerrainSource>,
    loader: Arc<dyn MapStateLoader>,
    maps: RwLock<BTreeMap<MapId, Arc<Map>>>,
    create_lock: Mutex<()>,
}

impl MapRegistry {
    pub fn new(catalog: Arc<MapCatalog>, context: MapContext) -> Self {
        Self {
            catalog,
            context,
            terrain: Arc::new(NoTerrain),
            loader: Arc::new(NoPersistence),
            maps: RwLock::new(BTreeMap::new()),
            create_lock: Mutex::new(()),
        }
    }

    pub fn with_terrain(mut self, terrain: Arc<dyn TerrainSource>) -> Self {
        self.terrain = terrain;
        self
    }

    pub fn with_state_loader(mut self, loader: Arc<dyn MapStateLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn catalog(&self) -> &Arc<MapCatalog> {
        &self.catalog
    }

    pub fn terrain(&self) -> &dyn TerrainSource {
        self.terrain.as_ref()
    }

    /// Return the base map for `id`, creating it and its whole terrain
    /// family on first use.
    ///
    /// A child definition is never built on its own: the parent is ensured
    /// first, then the child is looked up as installed by that creation.
    pub fn get_or_create_base(&self, id: MapId) -> Result<Arc<Map>, MapError> {
        if let Some(map) = self.find_base_map(id) {
            return Ok(map);
        }

        let definition = self.catalog.assert_get(id)?;
        if let Some(parent) = definition.terrain_parent() {
            self.get_or_create_base(parent)?;
            return self.find_base_map(id).ok_or(MapError::ChildNotInstalled(id));
        }

        let _guard = self.create_lock.lock();
        // another caller may have finished while we waited
        if let Some(map) = self.find_base_map(id) {
            return Ok(map);
        }
        let mut built = Vec::new();
        let map = self.create_root(definition, &mut built)?;
        // the whole family becomes visible at once
        let mut maps = self.maps.write();
        for m in built {
            maps.insert(m.id(), m);
        }
        Ok(map)
    }

    /// Build a map and, recursively, its child terrain. Callers hold
    /// `create_lock` and publish everything collected in `built`.
    fn create_root(
        &self,
        definition: &MapDefinition,
        built: &mut Vec<Arc<Map>>,
    ) -> Result<Arc<Map>, MapError> {
        let template = self.catalog.instance_template(definition.id).cloned();
        let map = Map::new_base(definition, template, self.context.clone());
        map.discover_terrain(self.terrain.as_ref());
        built.push(Arc::clone(&map));

        for &child_id in self.catalog.children_of(definition.id) {
            let child_def = self.catalog.assert_get(child_id)?;
            let child = self.create_root(child_def, built)?;
            map.add_child_terrain(child);
        }

        if !definition.instanceable() {
            map.load_persistent_state(self.loader.as_ref());
        }

        tracing::debug!(
            map = %definition.id,
            instanceable = definition.instanceable(),
            children = self.catalog.children_of(definition.id).len(),
            "created base map"
        );
        Ok(map)
    }

    pub fn find_base_map(&self, id: MapId) -> Option<Arc<Map>> {
        self.maps.read().get(&id).cloned()
    }

    pub fn find_base_non_instance_map(&self, id: MapId) -> Option<Arc<Map>> {
        self.find_base_map(id).filter(|map| !map.is_instanceable())
    }

    /// The map handling `(id, instance)`. Instance 0 addresses the base map
    /// of a non-instanceable definition.
    pub fn find_map(&self, id: MapId, instance: InstanceId) -> Option<Arc<Map>> {
        let base = self.find_base_map(id)?;
        if !base.is_instanceable() {
            return instance.is_base().then_some(base);
        }
        base.find_instance(instance)
    }

    /// Registered base maps in id order.
    pub fn maps(&self) -> Vec<Arc<Map>> {
        self.maps.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.maps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.read().is_empty()
    }

    /// At startup only existence counts; afterwards a dungeon also needs
    /// an instance template.
    pub fn is_valid_map(&self, id: MapId, startup: bool) -> bool {
        match self.catalog.get(id) {
            None => false,
            Some(_) if startup => true,
            Some(def) => !def.is_dungeon() || self.catalog.instance_template(id).is_some(),
        }
    }

    /// Live dungeon instance copies.
    pub fn num_instances(&self) -> usize {
        let _guard = self.create_lock.lock();
        self.maps
            .read()
            .values()
            .filter(|map| map.is_instanceable())
            .flat_map(|map| map.instances())
            .filter(|copy| copy.is_dungeon())
            .count()
    }

    /// Participants inside any dungeon instance copy.
    pub fn num_participants_in_instances(&self) -> usize {
        let _guard = self.create_lock.lock();
        self.maps
            .read()
            .values()
            .filter(|map| map.is_instanceable())
            .flat_map(|map| map.instances())
            .filter(|copy| copy.is_dungeon())
            .map(|copy| copy.participant_count())
            .sum()
    }

    /// Release every map's content, then drop the maps.
    ///
    /// Must only run once ticking has stopped.
    pub fn unload_all(&self) {
        let _guard = self.create_lock.lock();
        let maps = self.maps();
        for map in &maps {
            map.unload_all();
        }
        drop(maps);
        self.maps.write().clear();
        tracing::info!("unloaded all maps");
    }
}
