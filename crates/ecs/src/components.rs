//! Lifecycle components understood by every world.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Set on a local entity once teardown has started.
///
/// Presence makes a second despawn a no-op. The store removes marked entities
/// on its next sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DespawnMarker;

/// Provenance tag: the template an entity was materialized from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrototypeInstance {
    pub template_id: String,
}

/// Marks a template as derived: clone `base_template_id` first, then overlay.
///
/// Only ever lives on templates. Materialization strips it from the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedPrototype {
    pub base_template_id: String,
}

/// Event entity that has already been consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventProcessed;

/// Opaque value handed to resolve systems: a scene object, a network packet, ...
#[derive(Clone)]
pub struct ResolveSource(Arc<dyn Any + Send + Sync>);

impl ResolveSource {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl fmt::Debug for ResolveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResolveSource(..)")
    }
}

/// Transient component present only while the resolve pipeline runs.
#[derive(Debug, Clone)]
pub struct ResolvePayload {
    pub source: ResolveSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_source_downcasts_to_stored_type() {
        let source = ResolveSource::new(String::from("scene/oak_01"));
        assert!(source.is::<String>());
        assert_eq!(source.downcast_ref::<String>().unwrap(), "scene/oak_01");
        assert!(source.downcast_ref::<u32>().is_none());
    }

    #[test]
    fn resolve_source_clones_share_the_value() {
        let source = ResolveSource::new(7u64);
        let copy = source.clone();
        assert_eq!(copy.downcast_ref::<u64>(), Some(&7));
    }
}
