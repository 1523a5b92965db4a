use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a static map definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapId(pub u32);

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one concrete copy of an instanceable map.
///
/// Zero is a sentinel: base maps carry it, and it is never handed out
/// by the allocator.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct InstanceId(pub u32);

impl InstanceId {
    /// The instance id carried by every base map.
    pub const BASE: InstanceId = InstanceId(0);

    pub fn is_base(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a participant (a connected player character).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

/// Difficulty setting a map copy runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    None,
    Normal,
    Heroic,
    Mythic,
    Raid10Normal,
    Raid25Normal,
    Raid10Heroic,
    Raid25Heroic,
}

impl Difficulty {
    /// The next lower difficulty tried when this one is not offered.
    pub fn fallback(self) -> Option<Difficulty> {
        match self {
            Difficulty::None | Difficulty::Normal | Difficulty::Raid10Normal => None,
            Difficulty::Heroic => Some(Difficulty::Normal),
            Difficulty::Mythic => Some(Difficulty::Heroic),
            Difficulty::Raid25Normal => Some(Difficulty::Raid10Normal),
            Difficulty::Raid10Heroic => Some(Difficulty::Raid10Normal),
            Difficulty::Raid25Heroic => Some(Difficulty::Raid25Normal),
        }
    }
}

/// A position inside a specific map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldLocation {
    pub map: MapId,
    pub position: Vec3,
}

impl WorldLocation {
    pub fn new(map: MapId, position: Vec3) -> Self {
        Self { map, position }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_id_uniqueness() {
        let a = ParticipantId::new();
        let b = ParticipantId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn base_instance_is_zero() {
        assert!(InstanceId::BASE.is_base());
        assert!(!InstanceId(7).is_base());
        assert_eq!(InstanceId::default(), InstanceId::BASE);
    }

    #[test]
    fn fallback_chain_terminates() {
        let mut d = Some(Difficulty::Raid25Heroic);
        let mut steps = 0;
        while let Some(current) = d {
            d = current.fallback();
            steps += 1;
        }
        assert_eq!(steps, 3); // 25H -> 25N -> 10N
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&MapId(571)).unwrap();
        assert_eq!(json, "571");
    }
}
