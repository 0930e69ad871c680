//! The canonical world: one registry entity per external id.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use worldlink_common::WorldId;
use worldlink_ecs::{ComponentCloner, DespawnMarker, EntityStore, Handle, PrototypeInstance};

use crate::identity::IdentityScheme;
use crate::link::WorldLink;
use crate::prototype::{PrototypeRepository, materialize};

/// Owns the registry store.
///
/// Registry templates usually carry pending world-identity records naming
/// the template each participating world should spawn. The registry runs no
/// pipelines.
pub struct RegistryWorld<S> {
    world_id: WorldId,
    store: EntityStore,
    prototypes: PrototypeRepository,
    cloner: ComponentCloner,
    _scheme: PhantomData<fn() -> S>,
}

impl<S: IdentityScheme> RegistryWorld<S> {
    pub fn new(cloner: ComponentCloner) -> Self {
        Self {
            world_id: WorldId::REGISTRY,
            store: EntityStore::new(WorldId::REGISTRY.as_str()),
            prototypes: PrototypeRepository::new("registry/prototypes"),
            cloner,
            _scheme: PhantomData,
        }
    }

    /// Create the registry entity for `entity_id`.
    ///
    /// Materializes the registry template named `template_id` when there is
    /// one, otherwise starts empty. Always tagged with the id and the template.
    pub fn spawn_entity(&mut self, template_id: &str, entity_id: S::Id) -> Handle {
        let handle = if self.prototypes.contains(template_id) {
            match materialize(&self.prototypes, &self.cloner, &mut self.store, template_id) {
                Ok(handle) => handle,
                Err(err) => {
                    tracing::warn!(template = %template_id, %err, "registry template unusable; spawning an empty registry entity");
                    self.store.create()
                }
            }
        } else {
            self.store.create()
        };
        self.store.set(handle, S::make_component(entity_id));
        self.store.set(
            handle,
            PrototypeInstance {
                template_id: template_id.to_owned(),
            },
        );
        tracing::debug!(entity_id = ?entity_id, registry_entity = %handle, template = %template_id, "registry entity created");
        handle
    }

    /// Mark a registry entity for removal at the next sweep.
    pub fn despawn(&mut self, handle: Handle) -> bool {
        if !self.store.is_alive(handle) || self.store.has::<DespawnMarker>(handle) {
            return false;
        }
        self.store.set(handle, DespawnMarker)
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    pub fn prototypes(&self) -> &PrototypeRepository {
        &self.prototypes
    }

    pub fn prototypes_mut(&mut self) -> &mut PrototypeRepository {
        &mut self.prototypes
    }

    pub fn cloner(&self) -> &ComponentCloner {
        &self.cloner
    }
}

impl<S> fmt::Debug for RegistryWorld<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryWorld")
            .field("store", &self.store)
            .field("templates", &self.prototypes.len())
            .finish()
    }
}

impl<S: IdentityScheme> WorldLink<S> for RegistryWorld<S> {
    fn world_id(&self) -> &WorldId {
        &self.world_id
    }

    fn store(&self) -> &EntityStore {
        &self.store
    }

    fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    fn prototypes(&self) -> Option<&PrototypeRepository> {
        Some(&self.prototypes)
    }

    fn prototypes_mut(&mut self) -> Option<&mut PrototypeRepository> {
        Some(&mut self.prototypes)
    }

    fn despawn(&mut self, handle: Handle) -> bool {
        RegistryWorld::despawn(self, handle)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{GuidScheme, SimulationIdentity, ViewIdentity, WorldRecord};
    use worldlink_common::EntityId;

    fn registry() -> RegistryWorld<GuidScheme> {
        let cloner = ComponentCloner::new()
            .with::<SimulationIdentity>()
            .with::<ViewIdentity>();
        let mut registry = RegistryWorld::new(cloner);
        registry
            .prototypes_mut()
            .author("tree_oak")
            .with(SimulationIdentity::pending("tree_oak_sim"))
            .with(ViewIdentity::pending("tree_oak_view"))
            .register()
            .unwrap();
        registry
    }

    #[test]
    fn registry_template_seeds_pending_records() {
        let mut registry = registry();
        let id = EntityId::from_u128(9);
        let re = registry.spawn_entity("tree_oak", id);

        assert_eq!(WorldLink::entity_id_of(&registry, re), Some(id));
        let sim = registry.store().cloned::<SimulationIdentity>(re).unwrap();
        assert_eq!(sim.template_id(), "tree_oak_sim");
        assert!(sim.local().is_none());
        assert_eq!(
            registry.store().cloned::<PrototypeInstance>(re).unwrap().template_id,
            "tree_oak"
        );
    }

    #[test]
    fn unknown_registry_template_spawns_an_empty_entity() {
        let mut registry = registry();
        let re = registry.spawn_entity("rock", EntityId::from_u128(1));
        assert!(registry.store().is_alive(re));
        assert!(!registry.store().has::<SimulationIdentity>(re));
    }

    #[test]
    fn despawn_only_marks() {
        let mut registry = registry();
        let re = registry.spawn_entity("rock", EntityId::from_u128(1));
        assert!(registry.despawn(re));
        assert!(!registry.despawn(re));
        assert!(registry.store().is_alive(re));
        assert_eq!(WorldLink::flush_despawned(&mut registry), 1);
        assert!(!registry.store().is_alive(re));
    }
}
