//! Worldlink kernel: one external id per logical object, one local entity per world.
//!
//! A [`RegistryWorld`] holds the canonical entity for each id. Every
//! participating world is driven by a [`WorldController`] that materializes
//! templates, runs the resolve / initialization / deinitialization pipelines
//! and leaves a world-identity record on the registry entity. The
//! [`EntityManager`] ties them together.
//!
//! # Invariants
//! - A registry entity holds at most one record per world kind, and a record's
//!   local handle, when set, was issued by that world's store.
//! - Resolve systems see the resolve payload exactly once; initialization
//!   systems never see it.
//! - Despawn is idempotent: the deinitialization pipeline runs once per entity.
//! - Templates are never spawned in place, and materialized entities never
//!   carry the nested-template marker.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod factory;
pub mod identity;
pub mod link;
pub mod manager;
pub mod pipeline;
pub mod prototype;
pub mod registry;
pub mod repository;

pub use config::{AuthoringPreset, EntityManagerConfig};
pub use controller::WorldController;
pub use error::{ConfigError, EntityError, PrototypeError, RepositoryError, SpawnError};
pub use events::{EntityDespawnedEvent, EntitySpawnedEvent, EventWorld};
pub use factory::{EntityManagerBuilder, NetworkController, SimulationController, ViewController};
pub use identity::{
    GuidComponent, GuidScheme, IdentityScheme, NetworkIdentity, SimulationIdentity, ViewIdentity,
    WorldIdentity, WorldRecord,
};
pub use link::{LinkRequest, WorldLink};
pub use manager::{
    EntityManager, ProcessedEvents, PrototypeOverride, ResolveRequest, SpawnReport, SpawnRequest,
    WorldLinkOutcome,
};
pub use pipeline::{EntitySystem, FnSystem, PipelineMetrics, Pipelines, SequentialPipeline, SystemTiming};
pub use prototype::{PrototypeRepository, TemplateBuilder, materialize};
pub use registry::RegistryWorld;
pub use repository::WorldRepository;

pub fn crate_info() -> &'static str {
    "worldlink-kernel v0.1.0"
}
