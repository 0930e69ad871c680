use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use hecs::{Component, Ref, RefMut};

use crate::components::DespawnMarker;

/// Identifies one entity store. Unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(u32);

impl StoreId {
    fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Opaque, world-scoped entity handle.
///
/// Carries the id of the store that issued it, so a handle from world A is
/// never mistaken for a live entity of world B. Handles are values: holding
/// one keeps nothing alive, and a stale one is detected through
/// [`EntityStore::is_alive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    store: StoreId,
    entity: hecs::Entity,
}

impl Handle {
    pub fn store(&self) -> StoreId {
        self.store
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.store, self.entity)
    }
}

/// One world's entity store.
///
/// Thin adapter over a `hecs::World` exposing the create / has / get / set /
/// remove / is_alive contract the controllers are written against. Removal of
/// despawning entities happens in [`EntityStore::sweep_despawned`], normally
/// once per frame.
pub struct EntityStore {
    id: StoreId,
    label: String,
    pub(crate) world: hecs::World,
}

impl EntityStore {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: StoreId::next(),
            label: label.into(),
            world: hecs::World::new(),
        }
    }

    pub fn id(&self) -> StoreId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of entities currently stored, despawning ones included.
    pub fn len(&self) -> usize {
        self.world.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.world.len() == 0
    }

    /// Create an empty entity.
    pub fn create(&mut self) -> Handle {
        let entity = self.world.spawn(());
        self.wrap(entity)
    }

    /// True when the handle was issued by this store, alive or not.
    pub fn owns(&self, handle: Handle) -> bool {
        handle.store == self.id
    }

    pub fn is_alive(&self, handle: Handle) -> bool {
        self.owns(handle) && self.world.contains(handle.entity)
    }

    pub fn has<C: Component>(&self, handle: Handle) -> bool {
        self.get::<C>(handle).is_some()
    }

    pub fn get<C: Component>(&self, handle: Handle) -> Option<Ref<'_, C>> {
        if !self.owns(handle) {
            return None;
        }
        self.world.get::<&C>(handle.entity).ok()
    }

    pub fn get_mut<C: Component>(&mut self, handle: Handle) -> Option<RefMut<'_, C>> {
        if !self.owns(handle) {
            return None;
        }
        self.world.get::<&mut C>(handle.entity).ok()
    }

    /// Copy of a component value, releasing the borrow immediately.
    pub fn cloned<C: Component + Clone>(&self, handle: Handle) -> Option<C> {
        self.get::<C>(handle).map(|c| (*c).clone())
    }

    /// Attach or overwrite a component. Returns false for dead or foreign handles.
    pub fn set<C: Component>(&mut self, handle: Handle, value: C) -> bool {
        if !self.owns(handle) {
            return false;
        }
        self.world.insert_one(handle.entity, value).is_ok()
    }

    pub fn remove<C: Component>(&mut self, handle: Handle) -> Option<C> {
        if !self.owns(handle) {
            return None;
        }
        self.world.remove_one::<C>(handle.entity).ok()
    }

    /// Destroy an entity immediately, bypassing the despawn protocol.
    pub fn destroy(&mut self, handle: Handle) -> bool {
        self.owns(handle) && self.world.despawn(handle.entity).is_ok()
    }

    /// All live handles in storage order.
    pub fn handles(&self) -> Vec<Handle> {
        self.world
            .iter()
            .map(|entity_ref| self.wrap(entity_ref.entity()))
            .collect()
    }

    /// Snapshot of every entity carrying `C`, with a copy of the component.
    pub fn collect<C: Component + Clone>(&self) -> Vec<(Handle, C)> {
        self.world
            .query::<&C>()
            .iter()
            .map(|(entity, c)| (self.wrap(entity), c.clone()))
            .collect()
    }

    pub fn count_with<C: Component>(&self) -> usize {
        self.world.query::<&C>().iter().count()
    }

    /// Destroy every entity marked with [`DespawnMarker`]. Returns how many were removed.
    pub fn sweep_despawned(&mut self) -> usize {
        let doomed: Vec<hecs::Entity> = self
            .world
            .query::<&DespawnMarker>()
            .iter()
            .map(|(entity, _)| entity)
            .collect();
        for entity in &doomed {
            let _ = self.world.despawn(*entity);
        }
        if !doomed.is_empty() {
            tracing::trace!(store = %self.label, removed = doomed.len(), "swept despawned entities");
        }
        doomed.len()
    }

    fn wrap(&self, entity: hecs::Entity) -> Handle {
        Handle {
            store: self.id,
            entity,
        }
    }

    pub(crate) fn raw(handle: Handle) -> hecs::Entity {
        handle.entity
    }
}

impl fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("len", &self.len())
            .finish()
    }
}
