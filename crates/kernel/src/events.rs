//! Transient event world: spawn and despawn requests queued as entities.

use std::any::Any;
use std::fmt;

use worldlink_common::WorldId;
use worldlink_ecs::{DespawnMarker, EntityStore, EventProcessed, Handle};

use crate::identity::IdentityScheme;
use crate::link::WorldLink;
use crate::manager::SpawnRequest;

/// Queued request to spawn an entity across the participating worlds.
#[derive(Debug, Clone)]
pub struct EntitySpawnedEvent<Id> {
    pub request: SpawnRequest<Id>,
}

/// Queued request to despawn an entity everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDespawnedEvent<Id> {
    pub entity_id: Id,
}

/// Emission order, so events are consumed first-in first-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventOrder(u64);

/// Event store. Consumed events are tagged [`EventProcessed`] and marked for
/// despawn, so they disappear at the next sweep.
pub struct EventWorld<S: IdentityScheme> {
    world_id: WorldId,
    store: EntityStore,
    next: u64,
    _scheme: std::marker::PhantomData<fn() -> S>,
}

impl<S: IdentityScheme> EventWorld<S> {
    pub fn new() -> Self {
        Self {
            world_id: WorldId::EVENT,
            store: EntityStore::new(WorldId::EVENT.as_str()),
            next: 0,
            _scheme: std::marker::PhantomData,
        }
    }

    pub fn entity_spawned(&mut self, request: SpawnRequest<S::Id>) -> Handle {
        let event = self.emit();
        self.store.set(event, EntitySpawnedEvent { request });
        event
    }

    pub fn entity_despawned(&mut self, entity_id: S::Id) -> Handle {
        let event = self.emit();
        self.store.set(event, EntityDespawnedEvent { entity_id });
        event
    }

    /// Unprocessed spawn requests in emission order. Each is marked processed.
    pub fn take_pending_spawns(&mut self) -> Vec<SpawnRequest<S::Id>> {
        self.take_pending::<EntitySpawnedEvent<S::Id>>()
            .into_iter()
            .map(|event| event.request)
            .collect()
    }

    /// Unprocessed despawn requests in emission order. Each is marked processed.
    pub fn take_pending_despawns(&mut self) -> Vec<S::Id> {
        self.take_pending::<EntityDespawnedEvent<S::Id>>()
            .into_iter()
            .map(|event| event.entity_id)
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.store.len() - self.store.count_with::<EventProcessed>()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    fn emit(&mut self) -> Handle {
        let event = self.store.create();
        self.store.set(event, EventOrder(self.next));
        self.next += 1;
        event
    }

    fn take_pending<E: worldlink_ecs::Component + Clone>(&mut self) -> Vec<E> {
        let mut pending: Vec<(EventOrder, Handle, E)> = self
            .store
            .collect::<E>()
            .into_iter()
            .filter(|(handle, _)| !self.store.has::<EventProcessed>(*handle))
            .map(|(handle, event)| {
                let order = self.store.cloned::<EventOrder>(handle).unwrap_or(EventOrder(u64::MAX));
                (order, handle, event)
            })
            .collect();
        pending.sort_by_key(|(order, _, _)| *order);
        for (_, handle, _) in &pending {
            self.store.set(*handle, EventProcessed);
            self.store.set(*handle, DespawnMarker);
        }
        pending.into_iter().map(|(_, _, event)| event).collect()
    }
}

impl<S: IdentityScheme> Default for EventWorld<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: IdentityScheme> fmt::Debug for EventWorld<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWorld")
            .field("store", &self.store)
            .field("pending", &self.pending())
            .finish()
    }
}

impl<S: IdentityScheme> WorldLink<S> for EventWorld<S> {
    fn world_id(&self) -> &WorldId {
        &self.world_id
    }

    fn store(&self) -> &EntityStore {
        &self.store
    }

    fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    fn despawn(&mut self, handle: Handle) -> bool {
        if !self.store.is_alive(handle) || self.store.has::<DespawnMarker>(handle) {
            return false;
        }
        self.store.set(handle, DespawnMarker)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
