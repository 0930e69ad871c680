//! Shared identifier types used by every worldlink crate.

mod types;

pub use types::{EntityId, WorldId};

pub fn crate_info() -> &'static str {
    "worldlink-common v0.1.0"
}
