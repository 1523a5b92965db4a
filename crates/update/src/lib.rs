//! Tick driving: interval timer, map worker pool, two-phase scheduler.
//!
//! # Invariants
//! - Every registered base map receives exactly one primary and one
//!   delayed update per elapsed interval.
//! - No delayed update starts before every primary update has returned.
//! - Sub-threshold calls only accumulate time.

mod pool;
mod scheduler;
mod stats;
mod timer;

pub use pool::MapUpdater;
pub use scheduler::UpdateScheduler;
pub use stats::{PassHistory, PassStats};
pub use timer::IntervalTimer;

pub fn crate_info() -> &'static str {
    "shardmap-update v0.1.0"
}
