//! Per-world entity stores and the component plumbing shared by all worlds.
//!
//! Each world owns exactly one [`EntityStore`]. Handles are scoped to the
//! store that issued them and are plain values; cross-world references are
//! always held by value and checked with [`EntityStore::is_alive`].
//!
//! # Invariants
//! - A handle is only ever alive in the store that created it.
//! - Entities carrying [`DespawnMarker`] survive until the store is swept.
//! - [`ComponentCloner`] never copies types it was not told about.

mod cloner;
mod components;
mod store;

pub use cloner::ComponentCloner;
pub use components::{
    DespawnMarker, EventProcessed, NestedPrototype, PrototypeInstance, ResolvePayload,
    ResolveSource,
};
pub use hecs::{Component, Ref, RefMut};
pub use store::{EntityStore, Handle, StoreId};

pub fn crate_info() -> &'static str {
    "worldlink-ecs v0.1.0"
}
