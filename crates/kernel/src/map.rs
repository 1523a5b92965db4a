//! Live maps: base maps, instance-capable base maps and their instance copies.
//!
//! # Invariants
//! - A map's participant set only changes in the delayed phase.
//! - Instance copies are owned by exactly one instance-capable base map.
//! - A destroyed copy's id goes back to the shared allocator.

use parking_lot::{Mutex, RwLock};
use shardmap_common::{
    Denial, Difficulty, InstanceId, InstanceTemplate, MapDefinition, MapId, MapKind,
    ParticipantId, WorldConfig,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::MapError;
use crate::instance_id::SharedInstanceIds;
use crate::state::{CorpseRecord, MapStateLoader, RespawnTime};
use crate::terrain::{TerrainSource, discover_grids};

/// Which half of a tick a map is being advanced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdatePhase {
    Primary,
    Delayed,
}

/// Instrumentation hooks around every map update.
pub trait MapObserver: Send + Sync {
    fn on_update(&self, map: MapId, instance: InstanceId, phase: UpdatePhase, diff: u32);

    /// Called once the update, including owned copies, has returned.
    fn on_updated(&self, _map: MapId, _instance: InstanceId, _phase: UpdatePhase) {}
}

/// Settings and shared services handed to every map on creation.
#[derive(Clone)]
pub struct MapContext {
    pub grid_clean_up_delay_ms: u32,
    /// 0 keeps empty instance copies alive forever.
    pub instance_unload_delay_ms: u32,
    pub ids: SharedInstanceIds,
    pub observer: Option<Arc<dyn MapObserver>>,
}

impl MapContext {
    pub fn new(config: &WorldConfig, ids: SharedInstanceIds) -> Self {
        Self {
            grid_clean_up_delay_ms: config.grid_clean_up_delay_ms,
            instance_unload_delay_ms: config.instance_unload_delay_ms,
            ids,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn MapObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// A participant movement applied in the delayed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Enter(ParticipantId),
    Leave(ParticipantId),
}

/// What an instance copy needs to know to judge a participant's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRequest {
    pub participant: ParticipantId,
    pub is_game_master: bool,
    /// Relogging into the map the participant was already in.
    pub reconnecting: bool,
    /// Copy the participant is permanently saved to, if any.
    pub permanent_bind: Option<InstanceId>,
}

impl EntryRequest {
    pub fn new(participant: ParticipantId) -> Self {
        Self {
            participant,
            is_game_master: false,
            reconnecting: false,
            permanent_bind: None,
        }
    }
}

/// Parameters for locating or creating an instance copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceRequest {
    pub participant: ParticipantId,
    pub difficulty: Difficulty,
    /// Previously bound copy to rejoin instead of allocating a new one.
    pub bound_instance: Option<InstanceId>,
}

impl InstanceRequest {
    pub fn new(participant: ParticipantId, difficulty: Difficulty) -> Self {
        Self {
            participant,
            difficulty,
            bound_instance: None,
        }
    }

    pub fn bound_to(mut self, instance: InstanceId) -> Self {
        self.bound_instance = Some(instance);
        self
    }
}

#[derive(Debug, Default)]
struct MapState {
    participants: BTreeSet<ParticipantId>,
    pending: Vec<Transfer>,
    ticks: u64,
    elapsed_ms: u64,
    idle_ms: u32,
    respawn_times: Vec<RespawnTime>,
    corpses: Vec<CorpseRecord>,
    unloaded: bool,
}

struct InstanceTable {
    template: Option<InstanceTemplate>,
    copies: RwLock<BTreeMap<InstanceId, Arc<Map>>>,
}

/// A live simulation partition bound to one map definition.
pub struct Map {
    definition: MapDefinition,
    instance_id: InstanceId,
    difficulty: Difficulty,
    max_players: Option<u32>,
    context: MapContext,
    state: Mutex<MapState>,
    grids: RwLock<BTreeSet<(u32, u32)>>,
    child_terrain: RwLock<Vec<Arc<Map>>>,
    instances: Option<InstanceTable>,
    encounter_in_progress: AtomicBool,
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("id", &self.definition.id)
            .field("instance_id", &self.instance_id)
            .field("kind", &self.definition.kind)
            .field("difficulty", &self.difficulty)
            .finish_non_exhaustive()
    }
}

impl Map {
    /// Create the base map for a definition. Instanceable definitions get
    /// an instance table; `template` supplies the copies' player cap.
    pub fn new_base(
        definition: &MapDefinition,
        template: Option<InstanceTemplate>,
        context: MapContext,
    ) -> Arc<Self> {
        let instances = definition.instanceable().then(|| InstanceTable {
            template,
            copies: RwLock::new(BTreeMap::new()),
        });
        Arc::new(Self::build(
            definition.clone(),
            InstanceId::BASE,
            Difficulty::None,
            None,
            instances,
            context,
        ))
    }

    fn build(
        definition: MapDefinition,
        instance_id: InstanceId,
        difficulty: Difficulty,
        max_players: Option<u32>,
        instances: Option<InstanceTable>,
        context: MapContext,
    ) -> Self {
        Self {
            definition,
            instance_id,
            difficulty,
            max_players,
            context,
            state: Mutex::new(MapState::default()),
            grids: RwLock::new(BTreeSet::new()),
            child_terrain: RwLock::new(Vec::new()),
            instances,
            encounter_in_progress: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> MapId {
        self.definition.id
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn definition(&self) -> &MapDefinition {
        &self.definition
    }

    pub fn kind(&self) -> MapKind {
        self.definition.kind
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn max_players(&self) -> Option<u32> {
        self.max_players
    }

    pub fn grid_clean_up_delay_ms(&self) -> u32 {
        self.context.grid_clean_up_delay_ms
    }

    /// True for base maps that own instance copies.
    pub fn is_instanceable(&self) -> bool {
        self.instances.is_some()
    }

    pub fn is_dungeon(&self) -> bool {
        self.definition.is_dungeon()
    }

    pub fn is_raid(&self) -> bool {
        self.definition.is_raid()
    }

    // --- terrain -------------------------------------------------------

    /// Record which grid tiles of this map have terrain geometry.
    pub fn discover_terrain(&self, source: &dyn TerrainSource) {
        let grids = discover_grids(source, self.id());
        tracing::debug!(map = %self.id(), grids = grids.len(), "discovered grid files");
        *self.grids.write() = grids;
    }

    pub fn grid_count(&self) -> usize {
        self.grids.read().len()
    }

    pub fn has_grid(&self, gx: u32, gy: u32) -> bool {
        self.grids.read().contains(&(gx, gy))
    }

    pub fn add_child_terrain(&self, child: Arc<Map>) {
        self.child_terrain.write().push(child);
    }

    pub fn child_terrain(&self) -> Vec<Arc<Map>> {
        self.child_terrain.read().clone()
    }

    // --- persistent state ----------------------------------------------

    pub fn load_persistent_state(&self, loader: &dyn MapStateLoader) {
        let respawns = loader.load_respawn_times(self.id(), self.instance_id);
        let corpses = loader.load_corpses(self.id(), self.instance_id);
        tracing::debug!(
            map = %self.id(),
            respawns = respawns.len(),
            corpses = corpses.len(),
            "loaded persistent map state"
        );
        let mut state = self.state.lock();
        state.respawn_times = respawns;
        state.corpses = corpses;
    }

    pub fn respawn_count(&self) -> usize {
        self.state.lock().respawn_times.len()
    }

    pub fn corpse_count(&self) -> usize {
        self.state.lock().corpses.len()
    }

    // --- participants --------------------------------------------------

    /// Queue a participant movement for the next delayed phase.
    pub fn queue_transfer(&self, transfer: Transfer) {
        self.state.lock().pending.push(transfer);
    }

    pub fn participant_count(&self) -> usize {
        self.state.lock().participants.len()
    }

    pub fn has_participant(&self, participant: ParticipantId) -> bool {
        self.state.lock().participants.contains(&participant)
    }

    pub fn set_encounter_in_progress(&self, in_progress: bool) {
        self.encounter_in_progress
            .store(in_progress, Ordering::Relaxed);
    }

    pub fn encounter_in_progress(&self) -> bool {
        self.encounter_in_progress.load(Ordering::Relaxed)
    }

    /// The copy's own entry rules. Base maps never deny.
    pub fn cannot_enter(&self, request: &EntryRequest) -> Option<Denial> {
        if self.instance_id.is_base() || request.is_game_master {
            return None;
        }

        if let Some(max) = self.max_players {
            let state = self.state.lock();
            let inside = state.participants.contains(&request.participant);
            if !inside && state.participants.len() >= max as usize {
                return Some(Denial::MaxPlayers);
            }
        }

        if !request.reconnecting && self.is_raid() && self.encounter_in_progress() {
            return Some(Denial::ZoneInCombat);
        }

        match request.permanent_bind {
            Some(bound) if bound != self.instance_id => Some(Denial::InstanceBindMismatch),
            _ => None,
        }
    }

    // --- ticking -------------------------------------------------------

    /// Primary phase: advance this map and every instance copy it owns.
    pub fn update(&self, diff: u32) {
        self.notify(UpdatePhase::Primary, diff);
        {
            let mut state = self.state.lock();
            state.ticks += 1;
            state.elapsed_ms += u64::from(diff);
            if state.participants.is_empty() && state.pending.is_empty() {
                state.idle_ms = state.idle_ms.saturating_add(diff);
            } else {
                state.idle_ms = 0;
            }
        }

        if let Some(table) = &self.instances {
            self.update_instances(table, diff);
        }
        self.notify_done(UpdatePhase::Primary);
    }

    /// Delayed phase: apply movements queued during the primary phase.
    pub fn delayed_update(&self, diff: u32) {
        self.notify(UpdatePhase::Delayed, diff);
        {
            let mut state = self.state.lock();
            let pending = std::mem::take(&mut state.pending);
            for transfer in pending {
                match transfer {
                    Transfer::Enter(p) => {
                        state.participants.insert(p);
                    }
                    Transfer::Leave(p) => {
                        state.participants.remove(&p);
                    }
                }
            }
        }

        if let Some(table) = &self.instances {
            for copy in Self::snapshot(table) {
                copy.delayed_update(diff);
            }
        }
        self.notify_done(UpdatePhase::Delayed);
    }

    pub fn ticks(&self) -> u64 {
        self.state.lock().ticks
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.state.lock().elapsed_ms
    }

    fn notify(&self, phase: UpdatePhase, diff: u32) {
        if let Some(observer) = &self.context.observer {
            observer.on_update(self.id(), self.instance_id, phase, diff);
        }
    }

    fn notify_done(&self, phase: UpdatePhase) {
        if let Some(observer) = &self.context.observer {
            observer.on_updated(self.id(), self.instance_id, phase);
        }
    }

    fn update_instances(&self, table: &InstanceTable, diff: u32) {
        let mut expired = Vec::new();
        for copy in Self::snapshot(table) {
            if copy.can_unload() {
                expired.push(copy.instance_id);
            } else {
                copy.update(diff);
            }
        }
        for id in expired {
            self.destroy_instance(table, id);
        }
    }

    fn can_unload(&self) -> bool {
        let delay = self.context.instance_unload_delay_ms;
        if delay == 0 {
            return false;
        }
        let state = self.state.lock();
        state.participants.is_empty() && state.pending.is_empty() && state.idle_ms >= delay
    }

    // --- instance copies -----------------------------------------------

    /// Find the bound copy or create one, allocating a fresh id when the
    /// request carries no binding.
    ///
    /// A bound id may be one replayed from storage or lie past the
    /// allocator's table; it is claimed either way. A bound id already
    /// backing another map's copy fails with [`InstanceIdError::InUse`].
    ///
    /// [`InstanceIdError::InUse`]: crate::instance_id::InstanceIdError::InUse
    pub fn create_instance(&self, request: &InstanceRequest) -> Result<Arc<Map>, MapError> {
        let table = self
            .instances
            .as_ref()
            .ok_or(MapError::NotInstanceable(self.id()))?;

        let mut copies = table.copies.write();
        let id = match request.bound_instance.filter(|id| !id.is_base()) {
            Some(id) => {
                if let Some(existing) = copies.get(&id) {
                    return Ok(Arc::clone(existing));
                }
                // replayed ids are reserved but unclaimed; another map's copy is not
                self.context.ids.lock().claim(id)?;
                id
            }
            None => {
                let mut ids = self.context.ids.lock();
                let id = ids.allocate()?;
                ids.claim(id)?;
                id
            }
        };

        let max_players = table.template.as_ref().map(|t| t.max_players);
        let copy = Arc::new(Self::build(
            self.definition.clone(),
            id,
            request.difficulty,
            max_players,
            None,
            self.context.clone(),
        ));
        copies.insert(id, Arc::clone(&copy));
        tracing::debug!(
            map = %self.id(),
            instance = %id,
            difficulty = ?request.difficulty,
            participant = ?request.participant,
            "created instance"
        );
        Ok(copy)
    }

    pub fn find_instance(&self, id: InstanceId) -> Option<Arc<Map>> {
        self.instances
            .as_ref()
            .and_then(|table| table.copies.read().get(&id).cloned())
    }

    /// Current copies in id order.
    pub fn instances(&self) -> Vec<Arc<Map>> {
        self.instances.as_ref().map(Self::snapshot).unwrap_or_default()
    }

    pub fn instance_count(&self) -> usize {
        self.instances
            .as_ref()
            .map_or(0, |table| table.copies.read().len())
    }

    fn snapshot(table: &InstanceTable) -> Vec<Arc<Map>> {
        table.copies.read().values().cloned().collect()
    }

    fn destroy_instance(&self, table: &InstanceTable, id: InstanceId) {
        let Some(copy) = table.copies.write().remove(&id) else {
            return;
        };
        copy.unload_all();
        if let Err(e) = self.context.ids.lock().release(id) {
            tracing::warn!(map = %self.id(), instance = %id, error = %e, "failed to release instance id");
        }
        tracing::debug!(map = %self.id(), instance = %id, "destroyed idle instance");
    }

    // --- teardown ------------------------------------------------------

    /// Release everything this map holds. The map stays registered until
    /// its owner drops it.
    pub fn unload_all(&self) {
        if let Some(table) = &self.instances {
            let copies = std::mem::take(&mut *table.copies.write());
            for copy in copies.values() {
                copy.unload_all();
            }
        }
        let mut state = self.state.lock();
        state.participants.clear();
        state.pending.clear();
        state.respawn_times.clear();
        state.corpses.clear();
        state.unloaded = true;
    }

    pub fn is_unloaded(&self) -> bool {
        self.state.lock().unloaded
    }
}
