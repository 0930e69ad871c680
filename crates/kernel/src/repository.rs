//! Directory of worlds keyed by world id.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use worldlink_common::WorldId;
use worldlink_ecs::{EntityStore, Handle, StoreId};

use crate::error::RepositoryError;
use crate::identity::IdentityScheme;
use crate::link::WorldLink;

/// Maps world ids to worlds, and store ids back to world ids.
pub struct WorldRepository<S: IdentityScheme> {
    worlds: BTreeMap<WorldId, Box<dyn WorldLink<S>>>,
    by_store: HashMap<StoreId, WorldId>,
}

impl<S: IdentityScheme> WorldRepository<S> {
    pub fn new() -> Self {
        Self {
            worlds: BTreeMap::new(),
            by_store: HashMap::new(),
        }
    }

    pub fn add_world(&mut self, world: impl WorldLink<S>) -> Result<(), RepositoryError> {
        self.add_boxed(Box::new(world))
    }

    pub fn add_boxed(&mut self, world: Box<dyn WorldLink<S>>) -> Result<(), RepositoryError> {
        let world_id = world.world_id().clone();
        if self.worlds.contains_key(&world_id) {
            return Err(RepositoryError::DuplicateWorld(world_id));
        }
        tracing::debug!(world = %world_id, store = %world.store().id(), "world registered");
        self.by_store.insert(world.store().id(), world_id.clone());
        self.worlds.insert(world_id, world);
        Ok(())
    }

    pub fn remove_world(&mut self, world_id: &WorldId) -> Option<Box<dyn WorldLink<S>>> {
        let world = self.worlds.remove(world_id)?;
        self.by_store.remove(&world.store().id());
        Some(world)
    }

    pub fn contains(&self, world_id: &WorldId) -> bool {
        self.worlds.contains_key(world_id)
    }

    pub fn get(&self, world_id: &WorldId) -> Option<&dyn WorldLink<S>> {
        self.worlds.get(world_id).map(|world| world.as_ref())
    }

    pub fn get_mut(&mut self, world_id: &WorldId) -> Option<&mut (dyn WorldLink<S> + 'static)> {
        self.worlds.get_mut(world_id).map(|world| world.as_mut())
    }

    pub fn store(&self, world_id: &WorldId) -> Option<&EntityStore> {
        self.get(world_id).map(|world| world.store())
    }

    /// World whose store issued `handle`.
    pub fn world_of(&self, handle: Handle) -> Option<&WorldId> {
        self.by_store.get(&handle.store())
    }

    /// Concrete world type behind `world_id`.
    pub fn downcast_ref<T: WorldLink<S>>(&self, world_id: &WorldId) -> Option<&T> {
        self.get(world_id)?.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: WorldLink<S>>(&mut self, world_id: &WorldId) -> Option<&mut T> {
        self.get_mut(world_id)?.as_any_mut().downcast_mut::<T>()
    }

    /// World ids in sorted order.
    pub fn world_ids(&self) -> impl Iterator<Item = &WorldId> {
        self.worlds.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WorldId, &(dyn WorldLink<S> + 'static))> {
        self.worlds.iter().map(|(id, world)| (id, world.as_ref()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&WorldId, &mut Box<dyn WorldLink<S>>)> {
        self.worlds.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }
}

impl<S: IdentityScheme> Default for WorldRepository<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: IdentityScheme> fmt::Debug for WorldRepository<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.worlds.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::WorldController;
    use crate::events::EventWorld;
    use crate::identity::{GuidScheme, SimulationIdentity, ViewIdentity};
    use worldlink_ecs::ComponentCloner;

    type Sim = WorldController<GuidScheme, SimulationIdentity>;
    type View = WorldController<GuidScheme, ViewIdentity>;

    fn repository() -> WorldRepository<GuidScheme> {
        let mut worlds = WorldRepository::new();
        worlds.add_world(Sim::new(WorldId::SIMULATION, ComponentCloner::new())).unwrap();
        worlds.add_world(View::new(WorldId::VIEW, ComponentCloner::new())).unwrap();
        worlds.add_world(EventWorld::<GuidScheme>::new()).unwrap();
        worlds
    }

    #[test]
    fn duplicate_world_ids_are_rejected() {
        let mut worlds = repository();
        let err = worlds
            .add_world(Sim::new(WorldId::SIMULATION, ComponentCloner::new()))
            .unwrap_err();
        assert_eq!(err, RepositoryError::DuplicateWorld(WorldId::SIMULATION));
        assert_eq!(worlds.len(), 3);
    }

    #[test]
    fn handles_map_back_to_their_world() {
        let mut worlds = repository();
        let handle = worlds
            .get_mut(&WorldId::VIEW)
            .unwrap()
            .store_mut()
            .create();
        assert_eq!(worlds.world_of(handle), Some(&WorldId::VIEW));

        let mut elsewhere = EntityStore::new("elsewhere");
        assert_eq!(worlds.world_of(elsewhere.create()), None);
    }

    #[test]
    fn downcasts_to_the_concrete_world() {
        let mut worlds = repository();
        assert!(worlds.downcast_ref::<Sim>(&WorldId::SIMULATION).is_some());
        assert!(worlds.downcast_ref::<View>(&WorldId::SIMULATION).is_none());
        let sim = worlds.downcast_mut::<Sim>(&WorldId::SIMULATION).unwrap();
        assert!(!sim.is_initialized());
    }

    #[test]
    fn participation_is_per_world() {
        let worlds = repository();
        assert!(worlds.get(&WorldId::SIMULATION).unwrap().participates());
        assert!(!worlds.get(&WorldId::EVENT).unwrap().participates());
    }

    #[test]
    fn removing_a_world_forgets_its_store() {
        let mut worlds = repository();
        let store = worlds.store(&WorldId::VIEW).unwrap().id();
        let removed = worlds.remove_world(&WorldId::VIEW).unwrap();
        assert_eq!(removed.store().id(), store);
        assert!(!worlds.contains(&WorldId::VIEW));
        assert_eq!(
            worlds.world_ids().cloned().collect::<Vec<_>>(),
            vec![WorldId::EVENT, WorldId::SIMULATION]
        );
    }
}
