//! Read-only static map data: definitions, instance templates, offered
//! difficulties and access requirements.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::types::{Difficulty, MapId};

/// Errors raised while building or loading a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate map definition {0}")]
    DuplicateMap(MapId),
    #[error("map {map} references unknown parent {parent}")]
    UnknownParent { map: MapId, parent: MapId },
    #[error("parent chain of map {0} loops back on itself")]
    ParentCycle(MapId),
    #[error("map {0} has no definition")]
    UnknownMap(MapId),
}

/// Map classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapKind {
    Common,
    Dungeon,
    Raid,
    Battleground,
    Arena,
    Scenario,
}

/// Static definition of a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDefinition {
    pub id: MapId,
    pub kind: MapKind,
    #[serde(default)]
    pub parent: Option<MapId>,
    #[serde(default)]
    pub cosmetic_parent: Option<MapId>,
    /// Minimum expansion tier the map belongs to.
    #[serde(default)]
    pub expansion: u8,
    /// Display name keyed by locale.
    #[serde(default)]
    pub names: BTreeMap<String, String>,
}

impl MapDefinition {
    pub fn new(id: MapId, kind: MapKind) -> Self {
        Self {
            id,
            kind,
            parent: None,
            cosmetic_parent: None,
            expansion: 0,
            names: BTreeMap::new(),
        }
    }

    pub fn with_parent(mut self, parent: MapId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_cosmetic_parent(mut self, parent: MapId) -> Self {
        self.cosmetic_parent = Some(parent);
        self
    }

    pub fn with_expansion(mut self, expansion: u8) -> Self {
        self.expansion = expansion;
        self
    }

    pub fn with_name(mut self, locale: &str, name: &str) -> Self {
        self.names.insert(locale.to_string(), name.to_string());
        self
    }

    /// The map whose creation installs this one as a child terrain.
    /// A real parent wins over a cosmetic one.
    pub fn terrain_parent(&self) -> Option<MapId> {
        self.parent.or(self.cosmetic_parent)
    }

    pub fn instanceable(&self) -> bool {
        !matches!(self.kind, MapKind::Common)
    }

    pub fn is_dungeon(&self) -> bool {
        matches!(
            self.kind,
            MapKind::Dungeon | MapKind::Raid | MapKind::Scenario
        )
    }

    pub fn is_raid(&self) -> bool {
        self.kind == MapKind::Raid
    }

    pub fn is_battleground_or_arena(&self) -> bool {
        matches!(self.kind, MapKind::Battleground | MapKind::Arena)
    }

    /// Localized display name, falling back to the map id.
    pub fn name(&self, locale: &str) -> String {
        self.names
            .get(locale)
            .cloned()
            .unwrap_or_else(|| format!("map {}", self.id))
    }
}

/// Per-map instance template. Only dungeons with a template can be entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceTemplate {
    pub map: MapId,
    /// Enclosing instance, for nested dungeons reached from inside another.
    #[serde(default)]
    pub parent: Option<MapId>,
    pub max_players: u32,
}

/// Requirement a participant must meet to enter a map at a difficulty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequirement {
    pub map: MapId,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub min_level: u8,
    #[serde(default)]
    pub required_item: Option<u32>,
    #[serde(default)]
    pub required_quest: Option<u32>,
    #[serde(default)]
    pub required_achievement: Option<u32>,
}

/// Offered difficulties for one map. The first entry is the map default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDifficulties {
    pub map: MapId,
    pub offered: Vec<Difficulty>,
}

/// Serialized catalog layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogData {
    pub maps: Vec<MapDefinition>,
    #[serde(default)]
    pub instance_templates: Vec<InstanceTemplate>,
    #[serde(default)]
    pub difficulties: Vec<MapDifficulties>,
    #[serde(default)]
    pub access_requirements: Vec<AccessRequirement>,
}

/// Read-only lookup service over all static map data.
#[derive(Debug, Clone, Default)]
pub struct MapCatalog {
    maps: BTreeMap<MapId, MapDefinition>,
    children: BTreeMap<MapId, Vec<MapId>>,
    templates: HashMap<MapId, InstanceTemplate>,
    difficulties: HashMap<MapId, Vec<Difficulty>>,
    access: HashMap<(MapId, Difficulty), AccessRequirement>,
}

impl MapCatalog {
    /// Build a catalog from definitions only.
    pub fn new(maps: Vec<MapDefinition>) -> Result<Self, CatalogError> {
        Self::from_data(CatalogData {
            maps,
            ..Default::default()
        })
    }

    /// Build and validate a catalog.
    pub fn from_data(data: CatalogData) -> Result<Self, CatalogError> {
        let mut maps = BTreeMap::new();
        for def in data.maps {
            let id = def.id;
            if maps.insert(id, def).is_some() {
                return Err(CatalogError::DuplicateMap(id));
            }
        }

        let mut children: BTreeMap<MapId, Vec<MapId>> = BTreeMap::new();
        for def in maps.values() {
            if let Some(parent) = def.terrain_parent() {
                if !maps.contains_key(&parent) {
                    return Err(CatalogError::UnknownParent {
                        map: def.id,
                        parent,
                    });
                }
                children.entry(parent).or_default().push(def.id);
            }
        }

        for id in maps.keys() {
            let mut seen = HashSet::new();
            let mut current = Some(*id);
            while let Some(c) = current {
                if !seen.insert(c) {
                    return Err(CatalogError::ParentCycle(*id));
                }
                current = maps.get(&c).and_then(MapDefinition::terrain_parent);
            }
        }

        let mut catalog = Self {
            maps,
            children,
            ..Default::default()
        };
        for t in data.instance_templates {
            catalog = catalog.with_instance_template(t);
        }
        for d in data.difficulties {
            catalog = catalog.with_difficulties(d.map, d.offered);
        }
        for r in data.access_requirements {
            catalog = catalog.with_access_requirement(r);
        }
        Ok(catalog)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Self::from_data(serde_json::from_str(json)?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn with_instance_template(mut self, template: InstanceTemplate) -> Self {
        self.templates.insert(template.map, template);
        self
    }

    pub fn with_difficulties(mut self, map: MapId, offered: Vec<Difficulty>) -> Self {
        self.difficulties.insert(map, offered);
        self
    }

    pub fn with_access_requirement(mut self, requirement: AccessRequirement) -> Self {
        self.access
            .insert((requirement.map, requirement.difficulty), requirement);
        self
    }

    pub fn get(&self, id: MapId) -> Option<&MapDefinition> {
        self.maps.get(&id)
    }

    /// Lookup for ids that static data guarantees to exist.
    pub fn assert_get(&self, id: MapId) -> Result<&MapDefinition, CatalogError> {
        self.maps.get(&id).ok_or(CatalogError::UnknownMap(id))
    }

    /// Child terrain maps declared under `id`, in id order.
    pub fn children_of(&self, id: MapId) -> &[MapId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &MapDefinition> {
        self.maps.values()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn instance_template(&self, id: MapId) -> Option<&InstanceTemplate> {
        self.templates.get(&id)
    }

    pub fn offers(&self, map: MapId, difficulty: Difficulty) -> bool {
        self.difficulties
            .get(&map)
            .is_some_and(|offered| offered.contains(&difficulty))
    }

    /// Highest offered difficulty at or below `requested`, following the
    /// fallback chain and finally the map default.
    pub fn downscale(&self, map: MapId, requested: Difficulty) -> Option<Difficulty> {
        let offered = self.difficulties.get(&map)?;
        let mut candidate = Some(requested);
        while let Some(d) = candidate {
            if offered.contains(&d) {
                return Some(d);
            }
            candidate = d.fallback();
        }
        offered.first().copied()
    }

    pub fn access_requirement(
        &self,
        map: MapId,
        difficulty: Difficulty,
    ) -> Option<&AccessRequirement> {
        self.access.get(&(map, difficulty))
    }
}
