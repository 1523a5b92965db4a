use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason a participant may not enter a map right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Denial {
    /// No map definition exists for the requested id.
    NoEntry,
    /// A dungeon without an instance template.
    UninstancedDungeon,
    /// The map offers no difficulty the participant could run it at.
    DifficultyUnavailable,
    /// Generic denial, e.g. an unmet access requirement.
    UnspecifiedReason,
    NotInRaid,
    CorpseInDifferentInstance,
    TooManyInstances,
    /// The bound instance copy is at its player cap.
    MaxPlayers,
    /// The bound instance copy has an encounter in progress.
    ZoneInCombat,
    /// The participant is permanently bound to a different copy.
    InstanceBindMismatch,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Denial::NoEntry => "no such map",
            Denial::UninstancedDungeon => "dungeon has no instance template",
            Denial::DifficultyUnavailable => "requested difficulty unavailable",
            Denial::UnspecifiedReason => "entry denied",
            Denial::NotInRaid => "must be in a raid group",
            Denial::CorpseInDifferentInstance => "corpse is in a different instance",
            Denial::TooManyInstances => "too many instances entered recently",
            Denial::MaxPlayers => "instance is full",
            Denial::ZoneInCombat => "encounter in progress",
            Denial::InstanceBindMismatch => "bound to a different instance",
        };
        f.write_str(text)
    }
}

/// Outcome of one admission evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnterDecision {
    Allowed,
    Denied(Denial),
}

impl EnterDecision {
    pub fn is_allowed(self) -> bool {
        self == EnterDecision::Allowed
    }

    pub fn denial(self) -> Option<Denial> {
        match self {
            EnterDecision::Allowed => None,
            EnterDecision::Denied(d) => Some(d),
        }
    }
}

impl From<Option<Denial>> for EnterDecision {
    fn from(denial: Option<Denial>) -> Self {
        denial.map_or(EnterDecision::Allowed, EnterDecision::Denied)
    }
}
