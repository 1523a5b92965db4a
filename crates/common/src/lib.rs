//! Shared identifiers, static map data and server configuration.
//!
//! # Invariants
//! - Static data is read-only once a [`MapCatalog`] is built.
//! - Map definitions form a forest: every definition has at most one parent.

pub mod catalog;
pub mod config;
pub mod enter;
pub mod types;

pub use catalog::{
    AccessRequirement, CatalogData, CatalogError, InstanceTemplate, MapCatalog, MapDefinition,
    MapKind,
};
pub use config::{AdmissionConfig, ConfigError, WorldConfig};
pub use enter::{Denial, EnterDecision};
pub use types::{Difficulty, InstanceId, MapId, ParticipantId, WorldLocation};

pub fn crate_info() -> &'static str {
    "shardmap-common v0.1.0"
}
