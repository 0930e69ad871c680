//! Assembles an [`EntityManager`] from a configuration preset.

use std::collections::HashMap;

use worldlink_common::{EntityId, WorldId};
use worldlink_ecs::{ComponentCloner, PrototypeInstance};

use crate::config::{AuthoringPreset, EntityManagerConfig};
use crate::controller::WorldController;
use crate::error::ConfigError;
use crate::identity::{GuidScheme, NetworkIdentity, SimulationIdentity, ViewIdentity};
use crate::manager::EntityManager;
use crate::pipeline::Pipelines;
use crate::registry::RegistryWorld;
use crate::repository::WorldRepository;

pub type SimulationController = WorldController<GuidScheme, SimulationIdentity>;
pub type ViewController = WorldController<GuidScheme, ViewIdentity>;
pub type NetworkController = WorldController<GuidScheme, NetworkIdentity>;

/// Builds a GUID-keyed manager with the worlds a preset provides.
///
/// Worlds given no pipelines stay uninitialized unless
/// [`EntityManagerBuilder::with_default_pipelines`] is set, and spawning into
/// them panics until [`EntityManager::initialize_world`] is called.
pub struct EntityManagerBuilder {
    config: EntityManagerConfig,
    cloner: ComponentCloner,
    world_cloners: HashMap<WorldId, ComponentCloner>,
    registry_cloner: ComponentCloner,
    pipelines: HashMap<WorldId, Pipelines>,
    default_pipelines: bool,
    allocate_id: Box<dyn FnMut() -> EntityId>,
}

impl EntityManagerBuilder {
    pub fn new(config: EntityManagerConfig) -> Self {
        Self {
            config,
            cloner: ComponentCloner::new(),
            world_cloners: HashMap::new(),
            registry_cloner: ComponentCloner::new(),
            pipelines: HashMap::new(),
            default_pipelines: false,
            allocate_id: Box::new(EntityId::new),
        }
    }

    pub fn from_preset(preset: AuthoringPreset) -> Self {
        Self::new(EntityManagerConfig::from_preset(preset))
    }

    /// Component types every world clones from its templates.
    pub fn with_cloner(mut self, cloner: ComponentCloner) -> Self {
        self.cloner = cloner;
        self
    }

    /// Extra component types for one world, on top of the shared cloner.
    pub fn with_world_cloner(mut self, world_id: WorldId, cloner: ComponentCloner) -> Self {
        self.world_cloners.insert(world_id, cloner);
        self
    }

    /// Extra component types for registry templates. World-identity records
    /// are always registered.
    pub fn with_registry_cloner(mut self, cloner: ComponentCloner) -> Self {
        self.registry_cloner = cloner;
        self
    }

    pub fn with_pipelines(mut self, world_id: WorldId, pipelines: Pipelines) -> Self {
        self.pipelines.insert(world_id, pipelines);
        self
    }

    /// Initialize worlds without explicit pipelines with empty ones.
    pub fn with_default_pipelines(mut self) -> Self {
        self.default_pipelines = true;
        self
    }

    pub fn with_id_allocator(mut self, allocate_id: impl FnMut() -> EntityId + 'static) -> Self {
        self.allocate_id = Box::new(allocate_id);
        self
    }

    pub fn build(mut self) -> Result<EntityManager<GuidScheme>, ConfigError> {
        self.config.validate()?;

        let mut registry_cloner = ComponentCloner::new()
            .with::<SimulationIdentity>()
            .with::<ViewIdentity>()
            .with::<NetworkIdentity>()
            .with::<PrototypeInstance>();
        registry_cloner.extend(&self.registry_cloner);
        let registry = RegistryWorld::new(registry_cloner);

        let mut worlds = WorldRepository::new();
        for world_id in self.config.preset.worlds() {
            let cloner = self.cloner_for(&world_id);
            let pipelines = self.pipelines.remove(&world_id).or_else(|| {
                self.default_pipelines.then(Pipelines::default)
            });
            if world_id == WorldId::SIMULATION {
                worlds.add_world(Self::controller::<SimulationIdentity>(world_id, cloner, pipelines))?;
            } else if world_id == WorldId::VIEW {
                worlds.add_world(Self::controller::<ViewIdentity>(world_id, cloner, pipelines))?;
            } else if world_id == WorldId::NETWORK {
                worlds.add_world(Self::controller::<NetworkIdentity>(world_id, cloner, pipelines))?;
            }
        }
        for world_id in self.pipelines.keys() {
            tracing::warn!(world = %world_id, preset = %self.config.preset, "pipelines given for a world the preset does not provide");
        }

        let manager = EntityManager::new(
            self.allocate_id,
            registry,
            worlds,
            self.config.participating_worlds(),
        )?;
        Ok(manager)
    }

    fn cloner_for(&self, world_id: &WorldId) -> ComponentCloner {
        let mut cloner = self.cloner.clone();
        if let Some(extra) = self.world_cloners.get(world_id) {
            cloner.extend(extra);
        }
        cloner
    }

    fn controller<R>(
        world_id: WorldId,
        cloner: ComponentCloner,
        pipelines: Option<Pipelines>,
    ) -> WorldController<GuidScheme, R>
    where
        R: crate::identity::WorldRecord,
    {
        let mut controller = WorldController::new(world_id, cloner);
        if let Some(pipelines) = pipelines {
            controller.initialize(pipelines);
        }
        controller
    }
}

impl Default for EntityManagerBuilder {
    fn default() -> Self {
        Self::new(EntityManagerConfig::default())
    }
}
