use serde::{Deserialize, Serialize};
use shardmap_common::{
    AccessRequirement, Difficulty, InstanceId, MapDefinition, MapId, ParticipantId, WorldLocation,
};
use std::collections::BTreeSet;

/// Group membership as seen by admission.
pub trait Group {
    fn is_raid(&self) -> bool;
    /// Formed by the dungeon finder rather than by players.
    fn is_dungeon_finder(&self) -> bool;
    /// Instance copy the group is bound to for `map` at `difficulty`.
    fn bound_instance(&self, map: MapId, difficulty: Difficulty) -> Option<InstanceId>;
}

/// Participant state consulted by admission.
pub trait Participant {
    fn id(&self) -> ParticipantId;
    fn name(&self) -> &str;
    fn is_game_master(&self) -> bool;
    fn is_alive(&self) -> bool;
    fn corpse_location(&self) -> Option<WorldLocation>;
    /// Difficulty the participant asks for on this kind of map.
    fn difficulty_for(&self, map: &MapDefinition) -> Difficulty;
    fn satisfies(&self, requirement: Option<&AccessRequirement>, map: MapId, is_entry: bool)
    -> bool;
    fn group(&self) -> Option<&dyn Group>;
    /// Relogging into the map the participant was already in.
    fn is_reconnecting(&self) -> bool {
        false
    }
    /// The participant's own binding for `map`, if any.
    fn instance_bind(&self, map: MapId) -> Option<InstanceBind>;
    /// Instances entered within the last hour.
    fn recent_instances(&self) -> &[InstanceId];
}

/// A participant's saved binding to an instance copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceBind {
    pub map: MapId,
    pub instance: InstanceId,
    pub difficulty: Difficulty,
    /// Permanent binds survive until the instance resets.
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    #[default]
    Party,
    Raid,
}

/// Plain-data group, e.g. loaded from a session snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupState {
    pub kind: GroupKind,
    pub dungeon_finder: bool,
    pub binds: Vec<InstanceBind>,
}

impl GroupState {
    pub fn new(kind: GroupKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn from_dungeon_finder(mut self) -> Self {
        self.dungeon_finder = true;
        self
    }

    pub fn with_bind(mut self, bind: InstanceBind) -> Self {
        self.binds.push(bind);
        self
    }
}

impl Group for GroupState {
    fn is_raid(&self) -> bool {
        self.kind == GroupKind::Raid
    }

    fn is_dungeon_finder(&self) -> bool {
        self.dungeon_finder
    }

    fn bound_instance(&self, map: MapId, difficulty: Difficulty) -> Option<InstanceId> {
        self.binds
            .iter()
            .find(|b| b.map == map && b.difficulty == difficulty)
            .map(|b| b.instance)
    }
}

/// Plain-data participant used by tools and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantState {
    pub id: ParticipantId,
    pub name: String,
    pub level: u8,
    pub game_master: bool,
    pub alive: bool,
    pub corpse: Option<WorldLocation>,
    pub dungeon_difficulty: Difficulty,
    pub raid_difficulty: Difficulty,
    pub items: BTreeSet<u32>,
    pub completed_quests: BTreeSet<u32>,
    pub achievements: BTreeSet<u32>,
    pub group: Option<GroupState>,
    pub binds: Vec<InstanceBind>,
    pub recent_instances: Vec<InstanceId>,
    pub reconnecting: bool,
}

impl Default for ParticipantState {
    fn default() -> Self {
        Self {
            id: ParticipantId::new(),
            name: String::new(),
            level: 1,
            game_master: false,
            alive: true,
            corpse: None,
            dungeon_difficulty: Difficulty::Normal,
            raid_difficulty: Difficulty::Raid10Normal,
            items: BTreeSet::new(),
            completed_quests: BTreeSet::new(),
            achievements: BTreeSet::new(),
            group: None,
            binds: Vec::new(),
            recent_instances: Vec::new(),
            reconnecting: false,
        }
    }
}

impl ParticipantState {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl Participant for ParticipantState {
    fn id(&self) -> ParticipantId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_game_master(&self) -> bool {
        self.game_master
    }

    fn is_alive(&self) -> bool {
        self.alive
    }

    fn corpse_location(&self) -> Option<WorldLocation> {
        self.corpse
    }

    fn difficulty_for(&self, map: &MapDefinition) -> Difficulty {
        if map.is_raid() {
            self.raid_difficulty
        } else {
            self.dungeon_difficulty
        }
    }

    fn satisfies(
        &self,
        requirement: Option<&AccessRequirement>,
        _map: MapId,
        _is_entry: bool,
    ) -> bool {
        let Some(req) = requirement else {
            return true;
        };
        self.level >= req.min_level
            && req.required_item.is_none_or(|i| self.items.contains(&i))
            && req
                .required_quest
                .is_none_or(|q| self.completed_quests.contains(&q))
            && req
                .required_achievement
                .is_none_or(|a| self.achievements.contains(&a))
    }

    fn group(&self) -> Option<&dyn Group> {
        self.group.as_ref().map(|g| g as &dyn Group)
    }

    fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    fn instance_bind(&self, map: MapId) -> Option<InstanceBind> {
        self.binds.iter().find(|b| b.map == map).copied()
    }

    fn recent_instances(&self) -> &[InstanceId] {
        &self.recent_instances
    }
}
