//! Object-safe view of a world, as seen by the entity manager.

use std::any::Any;

use worldlink_common::WorldId;
use worldlink_ecs::{EntityStore, Handle, ResolveSource};

use crate::error::SpawnError;
use crate::identity::IdentityScheme;
use crate::pipeline::Pipelines;
use crate::prototype::PrototypeRepository;

/// How a participating world should spawn the local entity for a registry entity.
#[derive(Debug, Clone, Default)]
pub struct LinkRequest {
    /// Template to spawn. `None` uses the template named by the world's record.
    pub template_id: Option<String>,
    /// Pre-staged handle in the target world, merged over the template.
    pub override_handle: Option<Handle>,
    /// Source handed to the resolve pipeline.
    pub source: Option<ResolveSource>,
}

impl LinkRequest {
    /// Spawn whatever the registry entity's record names.
    pub fn from_record() -> Self {
        Self::default()
    }

    pub fn template(template_id: impl Into<String>) -> Self {
        Self {
            template_id: Some(template_id.into()),
            ..Self::default()
        }
    }

    pub fn with_override(mut self, handle: Handle) -> Self {
        self.override_handle = Some(handle);
        self
    }

    pub fn with_source(mut self, source: ResolveSource) -> Self {
        self.source = Some(source);
        self
    }
}

/// One world registered with a [`WorldRepository`](crate::WorldRepository).
///
/// Only participating worlds implement the registry-linking methods; the
/// defaults describe a world that keeps no per-entity records.
pub trait WorldLink<S: IdentityScheme>: Any {
    fn world_id(&self) -> &WorldId;

    fn store(&self) -> &EntityStore;

    fn store_mut(&mut self) -> &mut EntityStore;

    fn prototypes(&self) -> Option<&PrototypeRepository> {
        None
    }

    fn prototypes_mut(&mut self) -> Option<&mut PrototypeRepository> {
        None
    }

    /// Hand the world its pipelines. Returns false when the world takes none
    /// or was already initialized.
    fn initialize(&mut self, _pipelines: Pipelines) -> bool {
        false
    }

    fn is_initialized(&self) -> bool {
        true
    }

    /// Begin teardown of a local entity. False when nothing happened.
    fn despawn(&mut self, handle: Handle) -> bool;

    /// Remove every entity marked for despawn.
    fn flush_despawned(&mut self) -> usize {
        self.store_mut().sweep_despawned()
    }

    /// External id carried by a local entity, if any.
    fn entity_id_of(&self, handle: Handle) -> Option<S::Id> {
        self.store()
            .get::<S::Component>(handle)
            .map(|component| S::extract_id(&component))
    }

    /// Whether this world keeps world-identity records on registry entities.
    fn participates(&self) -> bool {
        false
    }

    fn has_record(&self, _registry: &EntityStore, _registry_entity: Handle) -> bool {
        false
    }

    fn get_local(&self, _registry: &EntityStore, _registry_entity: Handle) -> Option<Handle> {
        None
    }

    /// Template id recorded for this world on the registry entity.
    fn linked_template(&self, _registry: &EntityStore, _registry_entity: Handle) -> Option<String> {
        None
    }

    fn link(
        &mut self,
        _registry: &mut EntityStore,
        _registry_entity: Handle,
        _request: LinkRequest,
    ) -> Result<Handle, SpawnError> {
        Err(SpawnError::NotParticipating(self.world_id().clone()))
    }

    fn replace(
        &mut self,
        _registry: &mut EntityStore,
        _registry_entity: Handle,
        _template_id: &str,
        _source: Option<ResolveSource>,
    ) -> Result<Handle, SpawnError> {
        Err(SpawnError::NotParticipating(self.world_id().clone()))
    }

    fn unlink_and_despawn(&mut self, _registry: &mut EntityStore, _registry_entity: Handle) -> bool {
        false
    }

    fn dispose(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
