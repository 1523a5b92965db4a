//! Admission control: may this participant enter that map right now?
//!
//! # Invariants
//! - Evaluation never mutates map or registry state.
//! - Rules run in a fixed order; the first terminal rule decides.

mod controller;
mod participant;

pub use controller::{AdmissionController, rule_names};
pub use participant::{Group, GroupKind, GroupState, InstanceBind, Participant, ParticipantState};

pub fn crate_info() -> &'static str {
    "shardmap-admission v0.1.0"
}
