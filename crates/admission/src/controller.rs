//! The ordered rule chain.
//!
//! Looking up the definition is the first step; every later rule sees it
//! through [`Evaluation`]. Rules return `Continue` to hand over to the next
//! rule or `Break` with the final decision.

use shardmap_common::{
    AdmissionConfig, Denial, Difficulty, EnterDecision, MapDefinition, MapId,
};
use shardmap_kernel::{EntryRequest, MapRegistry};
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::participant::Participant;

type Step = ControlFlow<EnterDecision>;
type Rule = fn(&mut Evaluation<'_>) -> Step;

const RULES: [(&str, Rule); 9] = [
    ("non_dungeon", non_dungeon),
    ("instance_template", instance_template),
    ("difficulty", difficulty),
    ("game_master", game_master),
    ("access_requirement", access_requirement),
    ("raid_group", raid_group),
    ("corpse_chain", corpse_chain),
    ("bound_instance", bound_instance),
    ("instance_cap", instance_cap),
];

/// Names of the rules in evaluation order, after the definition lookup.
pub fn rule_names() -> impl Iterator<Item = &'static str> {
    RULES.iter().map(|(name, _)| *name)
}

/// State shared by the rules of one evaluation.
struct Evaluation<'a> {
    registry: &'a MapRegistry,
    config: &'a AdmissionConfig,
    definition: &'a MapDefinition,
    participant: &'a dyn Participant,
    login: bool,
    /// Set by the difficulty rule.
    difficulty: Difficulty,
}

impl Evaluation<'_> {
    fn map(&self) -> MapId {
        self.definition.id
    }

    fn map_name(&self) -> String {
        self.definition.name(&self.config.default_locale)
    }
}

/// Decides whether participants may enter maps. Holds no mutable state.
pub struct AdmissionController {
    registry: Arc<MapRegistry>,
    config: AdmissionConfig,
}

impl AdmissionController {
    pub fn new(registry: Arc<MapRegistry>, config: AdmissionConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Run the rule chain for `participant` entering `map`.
    ///
    /// `login` skips the bound-instance rule, which would otherwise refuse
    /// a participant logging back into the copy they are already saved to.
    pub fn evaluate(&self, map: MapId, participant: &dyn Participant, login: bool) -> EnterDecision {
        let Some(definition) = self.registry.catalog().get(map) else {
            return EnterDecision::Denied(Denial::NoEntry);
        };

        let mut eval = Evaluation {
            registry: &self.registry,
            config: &self.config,
            definition,
            participant,
            login,
            difficulty: Difficulty::None,
        };

        for (name, rule) in RULES {
            if let ControlFlow::Break(decision) = rule(&mut eval) {
                if let EnterDecision::Denied(denial) = decision {
                    tracing::debug!(
                        map = %map,
                        participant = participant.name(),
                        rule = name,
                        %denial,
                        "entry denied"
                    );
                }
                return decision;
            }
        }
        EnterDecision::Allowed
    }
}

fn deny(denial: Denial) -> Step {
    ControlFlow::Break(EnterDecision::Denied(denial))
}

fn non_dungeon(e: &mut Evaluation<'_>) -> Step {
    if e.definition.is_dungeon() {
        ControlFlow::Continue(())
    } else {
        ControlFlow::Break(EnterDecision::Allowed)
    }
}

fn instance_template(e: &mut Evaluation<'_>) -> Step {
    match e.registry.catalog().instance_template(e.map()) {
        Some(_) => ControlFlow::Continue(()),
        None => deny(Denial::UninstancedDungeon),
    }
}

fn difficulty(e: &mut Evaluation<'_>) -> Step {
    let requested = e.participant.difficulty_for(e.definition);
    match e.registry.catalog().downscale(e.map(), requested) {
        Some(offered) => {
            e.difficulty = offered;
            ControlFlow::Continue(())
        }
        None => deny(Denial::DifficultyUnavailable),
    }
}

fn game_master(e: &mut Evaluation<'_>) -> Step {
    if e.participant.is_game_master() {
        ControlFlow::Break(EnterDecision::Allowed)
    } else {
        ControlFlow::Continue(())
    }
}

fn access_requirement(e: &mut Evaluation<'_>) -> Step {
    let requirement = e.registry.catalog().access_requirement(e.map(), e.difficulty);
    if e.participant.satisfies(requirement, e.map(), true) {
        ControlFlow::Continue(())
    } else {
        deny(Denial::UnspecifiedReason)
    }
}

/// Current-expansion raids need a raid group; older raids do not.
fn raid_group(e: &mut Evaluation<'_>) -> Step {
    let def = e.definition;
    if !def.is_raid() || def.expansion < e.config.active_expansion {
        return ControlFlow::Continue(());
    }
    let in_raid = e.participant.group().is_some_and(|g| g.is_raid());
    if in_raid || e.config.ignore_raid_requirement {
        ControlFlow::Continue(())
    } else {
        deny(Denial::NotInRaid)
    }
}

/// A ghost may enter only instances on the parent chain of the instance
/// holding its corpse. Finding the target only logs.
fn corpse_chain(e: &mut Evaluation<'_>) -> Step {
    let p = e.participant;
    if p.is_alive() {
        return ControlFlow::Continue(());
    }
    let Some(corpse) = p.corpse_location() else {
        tracing::debug!(participant = p.name(), "participant is dead but has no corpse");
        return ControlFlow::Continue(());
    };

    let catalog = e.registry.catalog();
    let mut visited = HashSet::new();
    let mut current = Some(corpse.map);
    while let Some(map) = current {
        if map == e.map() || !visited.insert(map) {
            break;
        }
        current = catalog.instance_template(map).and_then(|t| t.parent);
    }

    if current != Some(e.map()) {
        return deny(Denial::CorpseInDifferentInstance);
    }
    tracing::debug!(
        participant = p.name(),
        map = %e.map_name(),
        "participant has corpse in linked instance and may enter"
    );
    ControlFlow::Continue(())
}

/// The copy the group is bound to may refuse on its own terms.
fn bound_instance(e: &mut Evaluation<'_>) -> Step {
    if e.login {
        return ControlFlow::Continue(());
    }
    let Some(group) = e.participant.group() else {
        return ControlFlow::Continue(());
    };
    let Some(instance) = group.bound_instance(e.map(), e.difficulty) else {
        return ControlFlow::Continue(());
    };
    let Some(bound_map) = e.registry.find_map(e.map(), instance) else {
        return ControlFlow::Continue(());
    };

    let p = e.participant;
    let request = EntryRequest {
        participant: p.id(),
        is_game_master: p.is_game_master(),
        reconnecting: p.is_reconnecting(),
        permanent_bind: p
            .instance_bind(e.map())
            .filter(|b| b.permanent && b.difficulty == e.difficulty)
            .map(|b| b.instance),
    };
    match bound_map.cannot_enter(&request) {
        Some(denial) => deny(denial),
        None => ControlFlow::Continue(()),
    }
}

/// Hourly instance cap, waived for dungeon finder groups and the dead.
fn instance_cap(e: &mut Evaluation<'_>) -> Step {
    let p = e.participant;
    if p.group().is_some_and(|g| g.is_dungeon_finder()) {
        return ControlFlow::Continue(());
    }
    let recent = p.recent_instances();
    let under_cap = recent.len() < e.config.max_instances_per_hour as usize;
    let already_counted = p
        .instance_bind(e.map())
        .is_some_and(|b| recent.contains(&b.instance));
    if under_cap || already_counted || !p.is_alive() {
        ControlFlow::Continue(())
    } else {
        deny(Denial::TooManyInstances)
    }
}
