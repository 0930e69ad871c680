//! One external id, many worlds.

use std::collections::HashMap;
use std::fmt;

use worldlink_common::WorldId;
use worldlink_ecs::{Handle, ResolveSource};

use crate::error::{EntityError, RepositoryError, SpawnError};
use crate::events::EventWorld;
use crate::identity::{GuidScheme, IdentityScheme};
use crate::link::{LinkRequest, WorldLink};
use crate::pipeline::Pipelines;
use crate::registry::RegistryWorld;
use crate::repository::WorldRepository;

/// Pre-staged handle to merge over the template in one world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrototypeOverride {
    pub world_id: WorldId,
    pub handle: Handle,
}

/// Source handed to one world's resolve pipeline.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub world_id: WorldId,
    pub source: ResolveSource,
}

/// Everything [`EntityManager::spawn_with`] needs.
#[derive(Debug, Clone)]
pub struct SpawnRequest<Id> {
    /// Explicit id. `None` allocates a fresh one.
    pub entity_id: Option<Id>,
    pub template_id: String,
    pub overrides: Vec<PrototypeOverride>,
    pub resolves: Vec<ResolveRequest>,
}

impl<Id> SpawnRequest<Id> {
    pub fn new(template_id: impl Into<String>) -> Self {
        Self {
            entity_id: None,
            template_id: template_id.into(),
            overrides: Vec::new(),
            resolves: Vec::new(),
        }
    }

    pub fn with_id(mut self, entity_id: Id) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn with_override(mut self, world_id: WorldId, handle: Handle) -> Self {
        self.overrides.push(PrototypeOverride { world_id, handle });
        self
    }

    pub fn with_source(mut self, world_id: WorldId, source: ResolveSource) -> Self {
        self.resolves.push(ResolveRequest { world_id, source });
        self
    }

    fn link_request(&self, world_id: &WorldId, from_record: bool) -> LinkRequest {
        let mut request = if from_record {
            LinkRequest::from_record()
        } else {
            LinkRequest::template(self.template_id.as_str())
        };
        if let Some(o) = self.overrides.iter().find(|o| &o.world_id == world_id) {
            request = request.with_override(o.handle);
        }
        if let Some(r) = self.resolves.iter().find(|r| &r.world_id == world_id) {
            request = request.with_source(r.source.clone());
        }
        request
    }
}

/// Result of linking one participating world during a spawn.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldLinkOutcome {
    pub world_id: WorldId,
    pub outcome: Result<Handle, SpawnError>,
}

/// Per-world status of a spawn.
///
/// The entity exists as soon as its registry entity does. Worlds that failed
/// to link are not rolled back and simply have no local entity.
#[must_use = "some participating worlds may have failed to link"]
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnReport<Id> {
    pub entity_id: Id,
    pub registry_entity: Handle,
    pub links: Vec<WorldLinkOutcome>,
}

impl<Id> SpawnReport<Id> {
    /// True when every participating world linked.
    pub fn is_complete(&self) -> bool {
        self.links.iter().all(|link| link.outcome.is_ok())
    }

    pub fn missing_worlds(&self) -> Vec<&WorldId> {
        self.links
            .iter()
            .filter(|link| link.outcome.is_err())
            .map(|link| &link.world_id)
            .collect()
    }

    pub fn local(&self, world_id: &WorldId) -> Option<Handle> {
        self.links
            .iter()
            .find(|link| &link.world_id == world_id)
            .and_then(|link| link.outcome.as_ref().ok().copied())
    }

    pub fn error(&self, world_id: &WorldId) -> Option<&SpawnError> {
        self.links
            .iter()
            .find(|link| &link.world_id == world_id)
            .and_then(|link| link.outcome.as_ref().err())
    }
}

/// What one [`EntityManager::process_events`] call did.
#[derive(Debug)]
pub struct ProcessedEvents<Id> {
    pub spawned: Vec<SpawnReport<Id>>,
    pub despawned: Vec<Id>,
    pub rejected: Vec<EntityError>,
}

/// Façade over the registry and every participating world.
///
/// Each external id owns one registry entity. Participating worlds are
/// linked in configured order and each keeps its own record on that entity.
pub struct EntityManager<S: IdentityScheme = GuidScheme> {
    allocate_id: Box<dyn FnMut() -> S::Id>,
    registry: RegistryWorld<S>,
    events: EventWorld<S>,
    index: HashMap<S::Id, Handle>,
    worlds: WorldRepository<S>,
    participating: Vec<WorldId>,
}

impl<S: IdentityScheme> EntityManager<S> {
    /// Every id in `participating` must name a registered world that keeps
    /// registry records, and may appear once.
    pub fn new(
        allocate_id: impl FnMut() -> S::Id + 'static,
        registry: RegistryWorld<S>,
        worlds: WorldRepository<S>,
        participating: Vec<WorldId>,
    ) -> Result<Self, RepositoryError> {
        for (i, world_id) in participating.iter().enumerate() {
            if participating[..i].contains(world_id) {
                return Err(RepositoryError::DuplicateWorld(world_id.clone()));
            }
            let world = worlds
                .get(world_id)
                .ok_or_else(|| RepositoryError::UnknownWorld(world_id.clone()))?;
            if !world.participates() {
                return Err(RepositoryError::NotParticipating(world_id.clone()));
            }
        }
        tracing::info!(
            worlds = worlds.len(),
            participating = ?participating.iter().map(WorldId::as_str).collect::<Vec<_>>(),
            "entity manager ready"
        );
        Ok(Self {
            allocate_id: Box::new(allocate_id),
            registry,
            events: EventWorld::new(),
            index: HashMap::new(),
            worlds,
            participating,
        })
    }

    /// Spawn `template_id` in every participating world.
    pub fn spawn(&mut self, entity_id: Option<S::Id>, template_id: &str) -> Result<SpawnReport<S::Id>, EntityError> {
        let mut request = SpawnRequest::new(template_id);
        request.entity_id = entity_id;
        self.spawn_with(request)
    }

    /// Create the registry entity, then link each participating world.
    ///
    /// A world is linked from its record when the registry template left
    /// one, otherwise from the request's template. Link failures are logged
    /// and reported per world; the entity stays registered.
    pub fn spawn_with(&mut self, request: SpawnRequest<S::Id>) -> Result<SpawnReport<S::Id>, EntityError> {
        let entity_id = match request.entity_id {
            Some(id) if self.index.contains_key(&id) => {
                return Err(EntityError::DuplicateEntity(format!("{id:?}")));
            }
            Some(id) => id,
            None => self.allocate_free_id()?,
        };
        let registry_entity = self.registry.spawn_entity(&request.template_id, entity_id);
        self.index.insert(entity_id, registry_entity);

        let mut links = Vec::with_capacity(self.participating.len());
        for world_id in &self.participating {
            let outcome = match self.worlds.get_mut(world_id) {
                Some(world) => {
                    let from_record = world.has_record(self.registry.store(), registry_entity);
                    let link = request.link_request(world_id, from_record);
                    world.link(self.registry.store_mut(), registry_entity, link)
                }
                None => Err(SpawnError::NotParticipating(world_id.clone())),
            };
            if let Err(err) = &outcome {
                tracing::warn!(
                    world = %world_id,
                    entity_id = ?entity_id,
                    %err,
                    "world link failed; entity continues without it"
                );
            }
            links.push(WorldLinkOutcome {
                world_id: world_id.clone(),
                outcome,
            });
        }
        for staged in &request.overrides {
            if self.participating.contains(&staged.world_id) {
                continue;
            }
            if let Some(world) = self.worlds.get_mut(&staged.world_id) {
                tracing::warn!(world = %staged.world_id, "override for a non-participating world discarded");
                world.store_mut().destroy(staged.handle);
            }
        }
        tracing::debug!(entity_id = ?entity_id, template = %request.template_id, "entity spawned");
        Ok(SpawnReport {
            entity_id,
            registry_entity,
            links,
        })
    }

    /// Unlink and despawn every participating world, then the registry entity.
    pub fn despawn(&mut self, entity_id: S::Id) -> bool {
        let Some(registry_entity) = self.index.remove(&entity_id) else {
            tracing::trace!(entity_id = ?entity_id, "despawn of unknown entity");
            return false;
        };
        for world_id in &self.participating {
            if let Some(world) = self.worlds.get_mut(world_id) {
                world.unlink_and_despawn(self.registry.store_mut(), registry_entity);
            }
        }
        self.registry.despawn(registry_entity);
        tracing::debug!(entity_id = ?entity_id, "entity despawned");
        true
    }

    /// Local entity of `entity_id` in `world_id`. `None` for worlds that do not participate.
    pub fn get_local(&self, entity_id: S::Id, world_id: &WorldId) -> Option<Handle> {
        if !self.participating.contains(world_id) {
            return None;
        }
        let registry_entity = self.registry_entity(entity_id)?;
        self.worlds
            .get(world_id)?
            .get_local(self.registry.store(), registry_entity)
    }

    /// Template recorded for `entity_id` in `world_id`.
    pub fn linked_template(&self, entity_id: S::Id, world_id: &WorldId) -> Option<String> {
        let registry_entity = self.registry_entity(entity_id)?;
        self.worlds
            .get(world_id)?
            .linked_template(self.registry.store(), registry_entity)
    }

    pub fn registry_entity(&self, entity_id: S::Id) -> Option<Handle> {
        self.index.get(&entity_id).copied()
    }

    pub fn contains(&self, entity_id: S::Id) -> bool {
        self.index.contains_key(&entity_id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Registered ids, sorted.
    pub fn entity_ids(&self) -> Vec<S::Id> {
        let mut ids: Vec<S::Id> = self.index.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// External id carried by `handle` in `world_id`.
    pub fn entity_id_of(&self, world_id: &WorldId, handle: Handle) -> Option<S::Id> {
        if world_id == self.registry.world_id() {
            return WorldLink::entity_id_of(&self.registry, handle);
        }
        self.worlds.get(world_id)?.entity_id_of(handle)
    }

    /// World whose store issued `handle`.
    pub fn world_of(&self, handle: Handle) -> Option<&WorldId> {
        if self.registry.store().owns(handle) {
            return Some(WorldLink::world_id(&self.registry));
        }
        if self.events.store().owns(handle) {
            return Some(WorldLink::world_id(&self.events));
        }
        self.worlds.world_of(handle)
    }

    /// Swap the local entity in one world for a fresh spawn of `template_id`.
    pub fn replace(&mut self, entity_id: S::Id, world_id: &WorldId, template_id: &str) -> Result<Handle, EntityError> {
        self.replace_planned(entity_id, world_id, template_id, None)
    }

    pub fn replace_and_resolve(
        &mut self,
        entity_id: S::Id,
        world_id: &WorldId,
        template_id: &str,
        source: ResolveSource,
    ) -> Result<Handle, EntityError> {
        self.replace_planned(entity_id, world_id, template_id, Some(source))
    }

    /// Queue a spawn for the next [`EntityManager::process_events`].
    pub fn emit_spawn(&mut self, request: SpawnRequest<S::Id>) -> Handle {
        self.events.entity_spawned(request)
    }

    /// Queue a despawn for the next [`EntityManager::process_events`].
    ///
    /// Queued despawns run after every queued spawn of the same batch, so a
    /// despawn followed by a respawn of the same id is rejected as a
    /// duplicate. Process the despawn first to reuse an id.
    pub fn emit_despawn(&mut self, entity_id: S::Id) -> Handle {
        self.events.entity_despawned(entity_id)
    }

    /// Apply queued spawns, then queued despawns, in emission order.
    pub fn process_events(&mut self) -> ProcessedEvents<S::Id> {
        let spawns = self.events.take_pending_spawns();
        let despawns = self.events.take_pending_despawns();
        let mut processed = ProcessedEvents {
            spawned: Vec::with_capacity(spawns.len()),
            despawned: Vec::with_capacity(despawns.len()),
            rejected: Vec::new(),
        };
        for request in spawns {
            match self.spawn_with(request) {
                Ok(report) => processed.spawned.push(report),
                Err(err) => {
                    tracing::warn!(%err, "spawn event rejected");
                    processed.rejected.push(err);
                }
            }
        }
        for entity_id in despawns {
            if self.despawn(entity_id) {
                processed.despawned.push(entity_id);
            } else {
                processed
                    .rejected
                    .push(EntityError::UnknownEntity(format!("{entity_id:?}")));
            }
        }
        processed
    }

    /// Sweep despawning entities out of every store. Returns the total removed.
    pub fn flush_despawned(&mut self) -> usize {
        let mut removed = WorldLink::flush_despawned(&mut self.registry);
        removed += WorldLink::flush_despawned(&mut self.events);
        for (_, world) in self.worlds.iter_mut() {
            removed += world.flush_despawned();
        }
        removed
    }

    pub fn initialize_world(&mut self, world_id: &WorldId, pipelines: Pipelines) -> Result<bool, EntityError> {
        let world = self
            .worlds
            .get_mut(world_id)
            .ok_or_else(|| EntityError::UnknownWorld(world_id.clone()))?;
        Ok(world.initialize(pipelines))
    }

    /// Empty handle in `world_id` to fill and pass as a [`PrototypeOverride`].
    pub fn stage_override(&mut self, world_id: &WorldId) -> Result<Handle, EntityError> {
        let world = self
            .worlds
            .get_mut(world_id)
            .ok_or_else(|| EntityError::UnknownWorld(world_id.clone()))?;
        Ok(world.store_mut().create())
    }

    /// Dispose every world's pipelines.
    pub fn dispose(&mut self) {
        for (world_id, world) in self.worlds.iter_mut() {
            tracing::debug!(world = %world_id, "disposing world");
            world.dispose();
        }
    }

    pub fn participating(&self) -> &[WorldId] {
        &self.participating
    }

    pub fn registry(&self) -> &RegistryWorld<S> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RegistryWorld<S> {
        &mut self.registry
    }

    pub fn events(&self) -> &EventWorld<S> {
        &self.events
    }

    pub fn worlds(&self) -> &WorldRepository<S> {
        &self.worlds
    }

    pub fn worlds_mut(&mut self) -> &mut WorldRepository<S> {
        &mut self.worlds
    }

    /// Concrete world behind `world_id`.
    pub fn world<T: WorldLink<S>>(&self, world_id: &WorldId) -> Option<&T> {
        self.worlds.downcast_ref::<T>(world_id)
    }

    pub fn world_mut<T: WorldLink<S>>(&mut self, world_id: &WorldId) -> Option<&mut T> {
        self.worlds.downcast_mut::<T>(world_id)
    }

    /// Next allocator id not already registered. Gives up after as many
    /// collisions as there are entities.
    fn allocate_free_id(&mut self) -> Result<S::Id, EntityError> {
        let mut id = (self.allocate_id)();
        for _ in 0..self.index.len() {
            if !self.index.contains_key(&id) {
                return Ok(id);
            }
            tracing::debug!(entity_id = ?id, "allocated id already in use; retrying");
            id = (self.allocate_id)();
        }
        if self.index.contains_key(&id) {
            return Err(EntityError::DuplicateEntity(format!("{id:?}")));
        }
        Ok(id)
    }

    fn replace_planned(
        &mut self,
        entity_id: S::Id,
        world_id: &WorldId,
        template_id: &str,
        source: Option<ResolveSource>,
    ) -> Result<Handle, EntityError> {
        let registry_entity = self
            .registry_entity(entity_id)
            .ok_or_else(|| EntityError::UnknownEntity(format!("{entity_id:?}")))?;
        let world = self
            .worlds
            .get_mut(world_id)
            .ok_or_else(|| EntityError::UnknownWorld(world_id.clone()))?;
        Ok(world.replace(self.registry.store_mut(), registry_entity, template_id, source)?)
    }
}

impl<S: IdentityScheme> fmt::Debug for EntityManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityManager")
            .field("entities", &self.index.len())
            .field("registry", &self.registry)
            .field("worlds", &self.worlds)
            .field("participating", &self.participating)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::WorldController;
    use crate::identity::{NetworkIdentity, SimulationIdentity, ViewIdentity, WorldRecord};
    use crate::pipeline::{FnSystem, SequentialPipeline};
    use worldlink_common::EntityId;
    use worldlink_ecs::{ComponentCloner, EntityStore, ResolvePayload};

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);

    #[derive(Debug, Clone, PartialEq)]
    struct Sprite(String);

    #[derive(Debug, Clone, PartialEq)]
    struct SceneName(String);

    fn sim_pipelines() -> Pipelines {
        Pipelines::new(
            SequentialPipeline::new("resolve").with_system(FnSystem::new(
                "scene",
                |store: &mut EntityStore, entity: Handle| {
                    let name = store
                        .get::<ResolvePayload>(entity)
                        .and_then(|p| p.source.downcast_ref::<String>().cloned());
                    if let Some(name) = name {
                        store.set(entity, SceneName(name));
                    }
                },
            )),
            SequentialPipeline::new("initialization"),
            SequentialPipeline::new("deinitialization"),
        )
    }

    type Sim = WorldController<GuidScheme, SimulationIdentity>;
    type View = WorldController<GuidScheme, ViewIdentity>;
    type Net = WorldController<GuidScheme, NetworkIdentity>;

    fn counter() -> impl FnMut() -> EntityId {
        let mut next = 0u128;
        move || {
            next += 1;
            EntityId::from_u128(next)
        }
    }

    fn manager() -> EntityManager {
        let cloner = ComponentCloner::new().with::<Health>().with::<Sprite>();
        let mut sim = Sim::new(WorldId::SIMULATION, cloner.clone());
        sim.prototypes_mut().author("tree").with(Health(100)).register().unwrap();
        sim.initialize(sim_pipelines());
        let mut view = View::new(WorldId::VIEW, cloner.clone());
        view.prototypes_mut()
            .author("tree")
            .with(Sprite("tree.png".into()))
            .register()
            .unwrap();
        view.prototypes_mut()
            .author("tree_view")
            .with(Sprite("tree_lod.png".into()))
            .register()
            .unwrap();
        view.initialize(Pipelines::default());
        let mut net = Net::new(WorldId::NETWORK, cloner);
        net.prototypes_mut().author("tree").register().unwrap();
        net.initialize(Pipelines::default());
        let unlinked = Sim::new(WorldId::new("audio"), ComponentCloner::new());

        let mut worlds = WorldRepository::new();
        worlds.add_world(sim).unwrap();
        worlds.add_world(view).unwrap();
        worlds.add_world(net).unwrap();
        worlds.add_world(unlinked).unwrap();

        let registry_cloner = ComponentCloner::new()
            .with::<SimulationIdentity>()
            .with::<ViewIdentity>()
            .with::<NetworkIdentity>();
        let mut registry = RegistryWorld::new(registry_cloner);
        registry
            .prototypes_mut()
            .author("tree")
            .with(ViewIdentity::pending("tree_view"))
            .register()
            .unwrap();

        EntityManager::new(
            counter(),
            registry,
            worlds,
            vec![WorldId::SIMULATION, WorldId::VIEW, WorldId::NETWORK],
        )
        .unwrap()
    }

    fn store<'a>(manager: &'a EntityManager, world_id: &WorldId) -> &'a EntityStore {
        manager.worlds().store(world_id).unwrap()
    }

    #[test]
    fn spawn_links_every_participating_world() {
        let mut manager = manager();
        let report = manager.spawn(None, "tree").unwrap();
        assert!(report.is_complete());
        let id = report.entity_id;

        for world_id in [WorldId::SIMULATION, WorldId::VIEW, WorldId::NETWORK] {
            let local = manager.get_local(id, &world_id).unwrap();
            assert!(store(&manager, &world_id).is_alive(local));
            assert_eq!(manager.entity_id_of(&world_id, local), Some(id));
            assert_eq!(manager.world_of(local), Some(&world_id));
        }
        assert_eq!(manager.get_local(id, &WorldId::new("audio")), None);
        assert_eq!(manager.get_local(id, &WorldId::EVENT), None);
    }

    #[test]
    fn registry_records_choose_the_world_template() {
        let mut manager = manager();
        let id = manager.spawn(None, "tree").unwrap().entity_id;
        let view = manager.get_local(id, &WorldId::VIEW).unwrap();
        assert_eq!(
            store(&manager, &WorldId::VIEW).cloned::<Sprite>(view),
            Some(Sprite("tree_lod.png".into()))
        );
        assert_eq!(manager.linked_template(id, &WorldId::VIEW).as_deref(), Some("tree_view"));
        assert_eq!(manager.linked_template(id, &WorldId::SIMULATION).as_deref(), Some("tree"));
    }

    #[test]
    fn partial_failure_keeps_the_entity() {
        let mut manager = manager();
        manager
            .world_mut::<Net>(&WorldId::NETWORK)
            .unwrap()
            .prototypes_mut()
            .unregister("tree");

        let report = manager.spawn(None, "tree").unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.missing_worlds(), vec![&WorldId::NETWORK]);
        assert_eq!(
            report.error(&WorldId::NETWORK),
            Some(&SpawnError::UnknownTemplate("tree".into()))
        );
        assert!(manager.contains(report.entity_id));
        assert!(report.local(&WorldId::SIMULATION).is_some());
        assert_eq!(manager.get_local(report.entity_id, &WorldId::NETWORK), None);
    }

    #[test]
    fn explicit_ids_must_be_unique() {
        let mut manager = manager();
        let id = EntityId::from_u128(77);
        let report = manager.spawn(Some(id), "tree").unwrap();
        assert_eq!(report.entity_id, id);
        assert!(matches!(
            manager.spawn(Some(id), "tree"),
            Err(EntityError::DuplicateEntity(_))
        ));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn despawn_unlinks_everywhere() {
        let mut manager = manager();
        let report = manager.spawn(None, "tree").unwrap();
        let id = report.entity_id;
        let sim = report.local(&WorldId::SIMULATION).unwrap();

        assert!(manager.despawn(id));
        assert!(!manager.despawn(id));
        assert!(!manager.contains(id));
        assert_eq!(manager.get_local(id, &WorldId::SIMULATION), None);

        let removed = manager.flush_despawned();
        assert_eq!(removed, 4);
        assert!(!store(&manager, &WorldId::SIMULATION).is_alive(sim));
        assert!(!manager.registry().store().is_alive(report.registry_entity));
    }

    #[test]
    fn replace_swaps_one_world() {
        let mut manager = manager();
        let report = manager.spawn(None, "tree").unwrap();
        let id = report.entity_id;
        let old = report.local(&WorldId::VIEW).unwrap();

        let new = manager.replace(id, &WorldId::VIEW, "tree").unwrap();
        manager.flush_despawned();
        assert_eq!(manager.get_local(id, &WorldId::VIEW), Some(new));
        assert!(!store(&manager, &WorldId::VIEW).is_alive(old));
        assert_eq!(manager.get_local(id, &WorldId::SIMULATION), report.local(&WorldId::SIMULATION));

        assert!(matches!(
            manager.replace(EntityId::from_u128(999), &WorldId::VIEW, "tree"),
            Err(EntityError::UnknownEntity(_))
        ));
        assert!(matches!(
            manager.replace(id, &WorldId::new("nowhere"), "tree"),
            Err(EntityError::UnknownWorld(_))
        ));
    }

    #[test]
    fn overrides_reach_only_their_world() {
        let mut manager = manager();
        let staged = manager.stage_override(&WorldId::SIMULATION).unwrap();
        manager
            .worlds_mut()
            .get_mut(&WorldId::SIMULATION)
            .unwrap()
            .store_mut()
            .set(staged, Health(5));

        let report = manager
            .spawn_with(SpawnRequest::new("tree").with_override(WorldId::SIMULATION, staged))
            .unwrap();
        let sim = report.local(&WorldId::SIMULATION).unwrap();
        assert_eq!(store(&manager, &WorldId::SIMULATION).cloned::<Health>(sim), Some(Health(5)));
        assert!(!store(&manager, &WorldId::SIMULATION).is_alive(staged));
    }

    #[test]
    fn events_drive_spawn_and_despawn() {
        let mut manager = manager();
        manager.emit_spawn(SpawnRequest::new("tree").with_id(EntityId::from_u128(10)));
        manager.emit_spawn(SpawnRequest::new("tree").with_id(EntityId::from_u128(11)));
        manager.emit_despawn(EntityId::from_u128(10));
        manager.emit_despawn(EntityId::from_u128(12));

        let processed = manager.process_events();
        assert_eq!(processed.spawned.len(), 2);
        assert_eq!(processed.despawned, vec![EntityId::from_u128(10)]);
        assert_eq!(processed.rejected.len(), 1);
        assert_eq!(manager.entity_ids(), vec![EntityId::from_u128(11)]);
        assert_eq!(manager.events().pending(), 0);
    }

    #[test]
    fn participating_worlds_are_validated() {
        let registry = RegistryWorld::<GuidScheme>::new(ComponentCloner::new());
        let mut worlds = WorldRepository::new();
        worlds.add_world(EventWorld::<GuidScheme>::new()).unwrap();
        let err = EntityManager::new(counter(), registry, worlds, vec![WorldId::EVENT]).unwrap_err();
        assert_eq!(err, RepositoryError::NotParticipating(WorldId::EVENT));

        let registry = RegistryWorld::<GuidScheme>::new(ComponentCloner::new());
        let err = EntityManager::new(counter(), registry, WorldRepository::new(), vec![WorldId::VIEW])
            .unwrap_err();
        assert_eq!(err, RepositoryError::UnknownWorld(WorldId::VIEW));
    }

    #[test]
    fn allocated_ids_skip_ids_already_in_use() {
        let mut manager = manager();
        let explicit = manager.spawn(Some(EntityId::from_u128(1)), "tree").unwrap();
        let allocated = manager.spawn(None, "tree").unwrap();
        assert_ne!(allocated.entity_id, explicit.entity_id);
        assert_eq!(allocated.entity_id, EntityId::from_u128(2));
        assert_eq!(manager.len(), 2);

        let first_sim = explicit.local(&WorldId::SIMULATION).unwrap();
        assert!(manager.despawn(explicit.entity_id));
        manager.flush_despawned();
        assert!(!store(&manager, &WorldId::SIMULATION).is_alive(first_sim));
        assert!(manager.get_local(allocated.entity_id, &WorldId::SIMULATION).is_some());
    }

    #[test]
    fn an_allocator_stuck_on_a_used_id_is_rejected() {
        let mut worlds = WorldRepository::new();
        let mut sim = Sim::new(WorldId::SIMULATION, ComponentCloner::new());
        sim.initialize(Pipelines::default());
        worlds.add_world(sim).unwrap();
        let registry = RegistryWorld::<GuidScheme>::new(ComponentCloner::new());
        let mut stuck = EntityManager::new(
            || EntityId::from_u128(5),
            registry,
            worlds,
            vec![WorldId::SIMULATION],
        )
        .unwrap();

        let _ = stuck.spawn(None, "tree").unwrap();
        assert!(matches!(
            stuck.spawn(None, "tree"),
            Err(EntityError::DuplicateEntity(_))
        ));
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck.registry().store().len(), 1);
    }

    #[test]
    fn failed_link_consumes_the_staged_override() {
        let mut manager = manager();
        let staged = manager.stage_override(&WorldId::SIMULATION).unwrap();

        let report = manager
            .spawn_with(SpawnRequest::new("missing").with_override(WorldId::SIMULATION, staged))
            .unwrap();
        assert_eq!(
            report.error(&WorldId::SIMULATION),
            Some(&SpawnError::UnknownTemplate("missing".into()))
        );
        manager.flush_despawned();
        assert!(!store(&manager, &WorldId::SIMULATION).is_alive(staged));
        assert!(store(&manager, &WorldId::SIMULATION).is_empty());
    }

    #[test]
    fn overrides_for_non_participating_worlds_are_discarded() {
        let mut manager = manager();
        let audio = WorldId::new("audio");
        let staged = manager.stage_override(&audio).unwrap();

        let report = manager
            .spawn_with(SpawnRequest::new("tree").with_override(audio.clone(), staged))
            .unwrap();
        assert!(report.is_complete());
        assert!(!store(&manager, &audio).is_alive(staged));
    }

    #[test]
    fn replace_and_resolve_relinks_with_a_resolved_entity() {
        let mut manager = manager();
        let report = manager.spawn(None, "tree").unwrap();
        let id = report.entity_id;
        let old = report.local(&WorldId::SIMULATION).unwrap();

        let new = manager
            .replace_and_resolve(id, &WorldId::SIMULATION, "tree", ResolveSource::new(String::from("grove")))
            .unwrap();
        manager.flush_despawned();

        let sim = store(&manager, &WorldId::SIMULATION);
        assert!(!sim.is_alive(old));
        assert_eq!(sim.cloned::<SceneName>(new), Some(SceneName("grove".into())));
        assert!(!sim.has::<ResolvePayload>(new));
        assert_eq!(manager.get_local(id, &WorldId::SIMULATION), Some(new));
        assert_eq!(manager.entity_id_of(&WorldId::SIMULATION, new), Some(id));
        assert_eq!(manager.linked_template(id, &WorldId::SIMULATION).as_deref(), Some("tree"));

        assert!(matches!(
            manager.replace_and_resolve(id, &WorldId::new("nowhere"), "tree", ResolveSource::new(1u8)),
            Err(EntityError::UnknownWorld(_))
        ));
    }

    #[test]
    fn queued_despawns_run_after_queued_spawns() {
        let mut manager = manager();
        let id = manager.spawn(None, "tree").unwrap().entity_id;
        manager.emit_despawn(id);
        manager.emit_spawn(SpawnRequest::new("tree").with_id(id));

        let processed = manager.process_events();
        assert!(processed.spawned.is_empty());
        assert!(matches!(processed.rejected.as_slice(), [EntityError::DuplicateEntity(_)]));
        assert_eq!(processed.despawned, vec![id]);
        assert!(!manager.contains(id));

        // With the despawn processed first, the id can be reused.
        manager.emit_spawn(SpawnRequest::new("tree").with_id(id));
        let processed = manager.process_events();
        assert_eq!(processed.spawned.len(), 1);
        assert!(manager.contains(id));
    }

    #[test]
    fn records_on_the_registry_entity_point_at_live_locals() {
        let mut manager = manager();
        let report = manager.spawn(None, "tree").unwrap();
        let record = manager
            .registry()
            .store()
            .cloned::<SimulationIdentity>(report.registry_entity)
            .unwrap();
        assert_eq!(record.local(), report.local(&WorldId::SIMULATION));
    }
}
