//! Per-world spawn / resolve / despawn protocol.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use worldlink_common::WorldId;
use worldlink_ecs::{
    ComponentCloner, DespawnMarker, EntityStore, Handle, PrototypeInstance, ResolvePayload,
    ResolveSource,
};

use crate::error::SpawnError;
use crate::identity::{IdentityScheme, WorldRecord};
use crate::link::{LinkRequest, WorldLink};
use crate::pipeline::{EntitySystem, Pipelines};
use crate::prototype::{PrototypeRepository, materialize};

/// Everything one spawn needs, in the order it is applied.
struct SpawnPlan<'a, Id> {
    template_id: Option<&'a str>,
    override_handle: Option<Handle>,
    entity_id: Option<Id>,
    source: Option<ResolveSource>,
}

impl<'a, Id> SpawnPlan<'a, Id> {
    fn template(template_id: &'a str) -> Self {
        Self {
            template_id: Some(template_id),
            override_handle: None,
            entity_id: None,
            source: None,
        }
    }
}

/// Drives one world: owns its store, its templates and its pipelines.
///
/// `S` decides how external ids are written onto local entities and `R` is
/// the record this world leaves on registry entities. Spawning or despawning
/// before [`WorldController::initialize`] is a programmer error and panics.
///
/// Spawn order is fixed: materialize the template, merge the override,
/// tag provenance, attach the identifier, run the resolve pipeline with the
/// payload attached, strip the payload, run the initialization pipeline.
pub struct WorldController<S, R> {
    world_id: WorldId,
    store: EntityStore,
    prototypes: PrototypeRepository,
    cloner: ComponentCloner,
    pipelines: Option<Pipelines>,
    _identity: PhantomData<fn() -> (S, R)>,
}

impl<S: IdentityScheme, R: WorldRecord> WorldController<S, R> {
    pub fn new(world_id: WorldId, cloner: ComponentCloner) -> Self {
        let store = EntityStore::new(world_id.as_str());
        let prototypes = PrototypeRepository::new(format!("{world_id}/prototypes"));
        Self {
            world_id,
            store,
            prototypes,
            cloner,
            pipelines: None,
            _identity: PhantomData,
        }
    }

    /// Install the pipelines. Only the first call has any effect.
    pub fn initialize(&mut self, pipelines: Pipelines) -> bool {
        if self.pipelines.is_some() {
            tracing::warn!(world = %self.world_id, "controller already initialized; pipelines ignored");
            return false;
        }
        tracing::debug!(
            world = %self.world_id,
            resolve = pipelines.resolve.len(),
            initialization = pipelines.initialization.len(),
            deinitialization = pipelines.deinitialization.len(),
            "controller initialized"
        );
        self.pipelines = Some(pipelines);
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.pipelines.is_some()
    }

    pub fn world_id(&self) -> &WorldId {
        &self.world_id
    }

    pub fn pipelines(&self) -> Option<&Pipelines> {
        self.pipelines.as_ref()
    }

    pub fn pipelines_mut(&mut self) -> Option<&mut Pipelines> {
        self.pipelines.as_mut()
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

    /// Create an empty handle for a caller to fill before passing it as an
    /// override. Runs no pipelines.
    pub fn stage_override(&mut self) -> Handle {
        self.store.create()
    }

    pub fn spawn_bare(&mut self) -> Handle {
        self.assert_initialized();
        let handle = self.store.create();
        self.finish(handle, None);
        handle
    }

    pub fn spawn_and_resolve(&mut self, source: ResolveSource) -> Handle {
        self.assert_initialized();
        let handle = self.store.create();
        self.finish(handle, Some(source));
        handle
    }

    pub fn spawn_from_template(&mut self, template_id: &str) -> Result<Handle, SpawnError> {
        self.spawn_planned(SpawnPlan::template(template_id))
    }

    /// Spawn `template_id`, then merge `override_handle` over it and destroy
    /// the override. The override wins on conflict.
    pub fn spawn_from_template_with_override(
        &mut self,
        template_id: &str,
        override_handle: Handle,
    ) -> Result<Handle, SpawnError> {
        self.spawn_planned(SpawnPlan {
            override_handle: Some(override_handle),
            ..SpawnPlan::template(template_id)
        })
    }

    pub fn spawn_and_resolve_from_template(
        &mut self,
        template_id: &str,
        source: ResolveSource,
    ) -> Result<Handle, SpawnError> {
        self.spawn_planned(SpawnPlan {
            source: Some(source),
            ..SpawnPlan::template(template_id)
        })
    }

    pub fn spawn_and_resolve_from_template_with_override(
        &mut self,
        template_id: &str,
        override_handle: Handle,
        source: ResolveSource,
    ) -> Result<Handle, SpawnError> {
        self.spawn_planned(SpawnPlan {
            override_handle: Some(override_handle),
            source: Some(source),
            ..SpawnPlan::template(template_id)
        })
    }

    pub fn spawn_with_id_from_template(
        &mut self,
        template_id: &str,
        entity_id: S::Id,
    ) -> Result<Handle, SpawnError> {
        self.spawn_planned(SpawnPlan {
            entity_id: Some(entity_id),
            ..SpawnPlan::template(template_id)
        })
    }

    pub fn spawn_with_id_from_template_with_override(
        &mut self,
        template_id: &str,
        override_handle: Handle,
        entity_id: S::Id,
    ) -> Result<Handle, SpawnError> {
        self.spawn_planned(SpawnPlan {
            override_handle: Some(override_handle),
            entity_id: Some(entity_id),
            ..SpawnPlan::template(template_id)
        })
    }

    pub fn spawn_with_id_and_resolve_from_template(
        &mut self,
        template_id: &str,
        source: ResolveSource,
        entity_id: S::Id,
    ) -> Result<Handle, SpawnError> {
        self.spawn_planned(SpawnPlan {
            entity_id: Some(entity_id),
            source: Some(source),
            ..SpawnPlan::template(template_id)
        })
    }

    /// Mark `handle` despawning and run the deinitialization pipeline.
    ///
    /// Dead, foreign and already-despawning handles are no-ops returning
    /// false. The entity stays in the store until [`Self::flush_despawned`].
    pub fn despawn(&mut self, handle: Handle) -> bool {
        self.assert_initialized();
        if !self.store.is_alive(handle) {
            tracing::warn!(world = %self.world_id, entity = %handle, "despawn of a handle not alive in this world");
            return false;
        }
        if self.store.has::<DespawnMarker>(handle) {
            tracing::trace!(world = %self.world_id, entity = %handle, "already despawning");
            return false;
        }
        self.store.set(handle, DespawnMarker);
        if let Some(pipelines) = self.pipelines.as_mut() {
            let _span = tracing::debug_span!("deinitialization", world = %self.world_id).entered();
            pipelines.deinitialization.update(&mut self.store, handle);
        }
        tracing::debug!(world = %self.world_id, entity = %handle, "despawned");
        true
    }

    /// Remove every entity marked for despawn.
    pub fn flush_despawned(&mut self) -> usize {
        self.store.sweep_despawned()
    }

    pub fn entity_id_of(&self, handle: Handle) -> Option<S::Id> {
        self.store
            .get::<S::Component>(handle)
            .map(|component| S::extract_id(&component))
    }

    /// Local entity linked to `registry_entity`, if it is alive and not despawning.
    pub fn get_local(&self, registry: &EntityStore, registry_entity: Handle) -> Option<Handle> {
        let local = registry.get::<R>(registry_entity)?.local()?;
        self.is_live(local).then_some(local)
    }

    /// Spawn the template named by this world's record on `registry_entity`
    /// and write the new handle back into the record.
    pub fn spawn_and_link(
        &mut self,
        registry: &mut EntityStore,
        registry_entity: Handle,
    ) -> Result<Handle, SpawnError> {
        self.link(registry, registry_entity, LinkRequest::from_record())
    }

    pub fn spawn_and_link_with_override(
        &mut self,
        registry: &mut EntityStore,
        registry_entity: Handle,
        override_handle: Handle,
    ) -> Result<Handle, SpawnError> {
        self.link(
            registry,
            registry_entity,
            LinkRequest::from_record().with_override(override_handle),
        )
    }

    pub fn spawn_and_resolve_and_link(
        &mut self,
        registry: &mut EntityStore,
        registry_entity: Handle,
        source: ResolveSource,
    ) -> Result<Handle, SpawnError> {
        self.link(registry, registry_entity, LinkRequest::from_record().with_source(source))
    }

    /// Link using `template_id` instead of a record. Works without a record.
    pub fn spawn_from_template_and_link(
        &mut self,
        registry: &mut EntityStore,
        registry_entity: Handle,
        template_id: &str,
    ) -> Result<Handle, SpawnError> {
        self.link(registry, registry_entity, LinkRequest::template(template_id))
    }

    pub fn spawn_and_resolve_from_template_and_link(
        &mut self,
        registry: &mut EntityStore,
        registry_entity: Handle,
        template_id: &str,
        source: ResolveSource,
    ) -> Result<Handle, SpawnError> {
        self.link(
            registry,
            registry_entity,
            LinkRequest::template(template_id).with_source(source),
        )
    }

    /// General form of every `*_link` operation.
    ///
    /// Fails with [`SpawnError::AlreadyLinked`] while the recorded local
    /// entity is still live. Pending and stale records are overwritten. A
    /// staged override is consumed whether or not the link succeeds.
    pub fn link(
        &mut self,
        registry: &mut EntityStore,
        registry_entity: Handle,
        request: LinkRequest,
    ) -> Result<Handle, SpawnError> {
        let staged = request.override_handle;
        let linked = self.link_planned(registry, registry_entity, request);
        if let (Err(_), Some(staged)) = (&linked, staged) {
            self.discard_override(staged);
        }
        linked
    }

    fn link_planned(
        &mut self,
        registry: &mut EntityStore,
        registry_entity: Handle,
        request: LinkRequest,
    ) -> Result<Handle, SpawnError> {
        let entity_id = Self::registry_id(registry, registry_entity)?;
        let record = registry.cloned::<R>(registry_entity);
        if let Some(local) = record.as_ref().and_then(R::local) {
            if self.is_live(local) {
                return Err(SpawnError::AlreadyLinked(self.world_id.clone()));
            }
        }
        let template_id = match (request.template_id, record) {
            (Some(template_id), _) => template_id,
            (None, Some(record)) => record.template_id().to_owned(),
            (None, None) => return Err(SpawnError::NoWorldRecord(self.world_id.clone())),
        };
        let handle = self.spawn_planned(SpawnPlan {
            template_id: Some(&template_id),
            override_handle: request.override_handle,
            entity_id: Some(entity_id),
            source: request.source,
        })?;
        tracing::debug!(
            world = %self.world_id,
            registry_entity = %registry_entity,
            entity = %handle,
            template = %template_id,
            "linked"
        );
        registry.set(registry_entity, R::new(template_id, Some(handle)));
        Ok(handle)
    }

    /// Remove this world's record and despawn the local entity it named.
    /// Returns false when there was no record.
    pub fn unlink_and_despawn(&mut self, registry: &mut EntityStore, registry_entity: Handle) -> bool {
        let Some(record) = registry.remove::<R>(registry_entity) else {
            tracing::trace!(world = %self.world_id, registry_entity = %registry_entity, "nothing linked");
            return false;
        };
        if let Some(local) = record.local().filter(|local| self.store.is_alive(*local)) {
            self.despawn(local);
        }
        true
    }

    /// Despawn the current local entity and link a fresh one from `template_id`.
    ///
    /// On failure the record is removed, not restored: the registry entity is
    /// left without a presence in this world.
    pub fn replace_and_relink(
        &mut self,
        registry: &mut EntityStore,
        registry_entity: Handle,
        template_id: &str,
    ) -> Result<Handle, SpawnError> {
        self.replace_planned(registry, registry_entity, template_id, None)
    }

    pub fn replace_resolve_and_relink(
        &mut self,
        registry: &mut EntityStore,
        registry_entity: Handle,
        template_id: &str,
        source: ResolveSource,
    ) -> Result<Handle, SpawnError> {
        self.replace_planned(registry, registry_entity, template_id, Some(source))
    }

    /// Dispose pipelines. The controller must be initialized again before reuse.
    pub fn dispose(&mut self) {
        if let Some(mut pipelines) = self.pipelines.take() {
            pipelines.dispose();
        }
    }

    fn replace_planned(
        &mut self,
        registry: &mut EntityStore,
        registry_entity: Handle,
        template_id: &str,
        source: Option<ResolveSource>,
    ) -> Result<Handle, SpawnError> {
        let entity_id = Self::registry_id(registry, registry_entity)?;
        let previous = registry.get::<R>(registry_entity).and_then(|record| record.local());
        if let Some(previous) = previous.filter(|local| self.store.is_alive(*local)) {
            self.despawn(previous);
        }
        let spawned = self.spawn_planned(SpawnPlan {
            entity_id: Some(entity_id),
            source,
            ..SpawnPlan::template(template_id)
        });
        match spawned {
            Ok(handle) => {
                registry.set(registry_entity, R::new(template_id.to_owned(), Some(handle)));
                tracing::debug!(world = %self.world_id, entity = %handle, template = %template_id, "relinked");
                Ok(handle)
            }
            Err(err) => {
                registry.remove::<R>(registry_entity);
                tracing::warn!(
                    world = %self.world_id,
                    registry_entity = %registry_entity,
                    %err,
                    "replacement failed; world record removed"
                );
                Err(err)
            }
        }
    }

    fn spawn_planned(&mut self, plan: SpawnPlan<'_, S::Id>) -> Result<Handle, SpawnError> {
        self.assert_initialized();
        let handle = match plan.template_id {
            Some(template_id) => {
                match materialize(&self.prototypes, &self.cloner, &mut self.store, template_id) {
                    Ok(handle) => handle,
                    Err(err) => {
                        if let Some(staged) = plan.override_handle {
                            self.discard_override(staged);
                        }
                        return Err(err);
                    }
                }
            }
            None => self.store.create(),
        };
        if let Some(staged) = plan.override_handle {
            self.apply_override(staged, handle);
        }
        if let Some(template_id) = plan.template_id {
            self.store.set(
                handle,
                PrototypeInstance {
                    template_id: template_id.to_owned(),
                },
            );
        }
        if let Some(entity_id) = plan.entity_id {
            self.store.set(handle, S::make_component(entity_id));
        }
        self.finish(handle, plan.source);
        tracing::debug!(
            world = %self.world_id,
            entity = %handle,
            template = plan.template_id.unwrap_or("-"),
            "spawned"
        );
        Ok(handle)
    }

    fn apply_override(&mut self, staged: Handle, target: Handle) {
        if !self.store.is_alive(staged) {
            tracing::warn!(world = %self.world_id, entity = %staged, "override handle not alive in this world; ignored");
            return;
        }
        self.cloner.clone_components_within(&mut self.store, staged, target);
        self.store.destroy(staged);
    }

    /// Destroy a staged override whose spawn never happened.
    fn discard_override(&mut self, staged: Handle) {
        if self.store.destroy(staged) {
            tracing::debug!(world = %self.world_id, entity = %staged, "staged override discarded");
        }
    }

    /// Resolve (when a source is given) then initialize.
    fn finish(&mut self, handle: Handle, source: Option<ResolveSource>) {
        let Some(pipelines) = self.pipelines.as_mut() else {
            return;
        };
        if let Some(source) = source {
            self.store.set(handle, ResolvePayload { source });
            {
                let _span = tracing::debug_span!("resolve", world = %self.world_id).entered();
                pipelines.resolve.update(&mut self.store, handle);
            }
            self.store.remove::<ResolvePayload>(handle);
        }
        let _span = tracing::debug_span!("initialization", world = %self.world_id).entered();
        pipelines.initialization.update(&mut self.store, handle);
    }

    fn is_live(&self, handle: Handle) -> bool {
        self.store.is_alive(handle) && !self.store.has::<DespawnMarker>(handle)
    }

    fn registry_id(registry: &EntityStore, registry_entity: Handle) -> Result<S::Id, SpawnError> {
        if !registry.is_alive(registry_entity) {
            return Err(SpawnError::ForeignHandle(registry_entity));
        }
        registry
            .get::<S::Component>(registry_entity)
            .map(|component| S::extract_id(&component))
            .ok_or(SpawnError::MissingIdentifier)
    }

    fn assert_initialized(&self) {
        assert!(
            self.pipelines.is_some(),
            "world controller `{}` used before initialize",
            self.world_id
        );
    }
}

impl<S, R> fmt::Debug for WorldController<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldController")
            .field("world_id", &self.world_id)
            .field("store", &self.store)
            .field("templates", &self.prototypes.len())
            .field("initialized", &self.pipelines.is_some())
            .finish()
    }
}

impl<S: IdentityScheme, R: WorldRecord> WorldLink<S> for WorldController<S, R> {
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

    fn initialize(&mut self, pipelines: Pipelines) -> bool {
        WorldController::initialize(self, pipelines)
    }

    fn is_initialized(&self) -> bool {
        self.pipelines.is_some()
    }

    fn despawn(&mut self, handle: Handle) -> bool {
        WorldController::despawn(self, handle)
    }

    fn flush_despawned(&mut self) -> usize {
        WorldController::flush_despawned(self)
    }

    fn entity_id_of(&self, handle: Handle) -> Option<S::Id> {
        WorldController::entity_id_of(self, handle)
    }

    fn participates(&self) -> bool {
        true
    }

    fn has_record(&self, registry: &EntityStore, registry_entity: Handle) -> bool {
        registry.has::<R>(registry_entity)
    }

    fn get_local(&self, registry: &EntityStore, registry_entity: Handle) -> Option<Handle> {
        WorldController::get_local(self, registry, registry_entity)
    }

    fn linked_template(&self, registry: &EntityStore, registry_entity: Handle) -> Option<String> {
        registry
            .get::<R>(registry_entity)
            .map(|record| record.template_id().to_owned())
    }

    fn link(
        &mut self,
        registry: &mut EntityStore,
        registry_entity: Handle,
        request: LinkRequest,
    ) -> Result<Handle, SpawnError> {
        WorldController::link(self, registry, registry_entity, request)
    }

    fn replace(
        &mut self,
        registry: &mut EntityStore,
        registry_entity: Handle,
        template_id: &str,
        source: Option<ResolveSource>,
    ) -> Result<Handle, SpawnError> {
        self.replace_planned(registry, registry_entity, template_id, source)
    }

    fn unlink_and_despawn(&mut self, registry: &mut EntityStore, registry_entity: Handle) -> bool {
        WorldController::unlink_and_despawn(self, registry, registry_entity)
    }

    fn dispose(&mut self) {
        WorldController::dispose(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
