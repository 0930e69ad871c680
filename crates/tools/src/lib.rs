//! Developer tooling: inspectors over an entity manager and its worlds.
//!
//! # Invariants
//! - Inspection never mutates a manager or any of its stores.

mod inspector;

pub use inspector::{EntityInfo, LocalInfo, ManagerSummary, WorldInspector, WorldSummary};

pub fn crate_info() -> &'static str {
    "worldlink-tools v0.1.0"
}
