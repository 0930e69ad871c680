use serde::Serialize;
use worldlink_common::{EntityId, WorldId};
use worldlink_ecs::{DespawnMarker, EntityStore, PrototypeInstance};
use worldlink_kernel::{EntityManager, WorldLink};

/// Manager inspector for developer tooling.
///
/// Provides read-only queries across the registry and every world for
/// debugging and development UI.
pub struct WorldInspector;

impl WorldInspector {
    /// Summarize every store the manager owns, registry first.
    pub fn summary(manager: &EntityManager) -> ManagerSummary {
        let registry = manager.registry();
        let events = manager.events();
        let mut worlds = vec![
            WorldSummary::of(
                WorldLink::world_id(registry),
                registry.store(),
                registry.prototypes().len(),
                true,
                false,
            ),
            WorldSummary::of(WorldLink::world_id(events), events.store(), 0, true, false),
        ];
        for (world_id, world) in manager.worlds().iter() {
            worlds.push(WorldSummary::of(
                world_id,
                world.store(),
                world.prototypes().map_or(0, |p| p.len()),
                world.is_initialized(),
                manager.participating().contains(world_id),
            ));
        }
        ManagerSummary {
            entities: manager.len(),
            pending_events: events.pending(),
            worlds,
        }
    }

    /// Where one entity lives in each participating world.
    pub fn inspect_entity(manager: &EntityManager, id: EntityId) -> Option<EntityInfo> {
        let registry_entity = manager.registry_entity(id)?;
        let template = manager
            .registry()
            .store()
            .cloned::<PrototypeInstance>(registry_entity)
            .map(|p| p.template_id);
        let locals = manager
            .participating()
            .iter()
            .map(|world_id| {
                let handle = manager.get_local(id, world_id);
                let despawning = handle.is_some_and(|h| {
                    manager
                        .worlds()
                        .store(world_id)
                        .is_some_and(|store| store.has::<DespawnMarker>(h))
                });
                LocalInfo {
                    world_id: world_id.clone(),
                    handle: handle.map(|h| h.to_string()),
                    template: manager.linked_template(id, world_id),
                    despawning,
                }
            })
            .collect();
        Some(EntityInfo {
            id,
            registry_entity: registry_entity.to_string(),
            template,
            locals,
        })
    }

    /// All registered entity ids, sorted.
    pub fn list_entities(manager: &EntityManager) -> Vec<EntityId> {
        manager.entity_ids()
    }
}

/// Summary of all stores for the inspector.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerSummary {
    pub entities: usize,
    pub pending_events: usize,
    pub worlds: Vec<WorldSummary>,
}

impl std::fmt::Display for ManagerSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Manager: entities={} pending_events={}",
            self.entities, self.pending_events
        )?;
        for world in &self.worlds {
            writeln!(f, "  {world}")?;
        }
        Ok(())
    }
}

/// One store's occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct WorldSummary {
    pub world_id: WorldId,
    pub live: usize,
    pub despawning: usize,
    pub templates: usize,
    pub initialized: bool,
    pub participating: bool,
}

impl WorldSummary {
    fn of(
        world_id: &WorldId,
        store: &EntityStore,
        templates: usize,
        initialized: bool,
        participating: bool,
    ) -> Self {
        let despawning = store.count_with::<DespawnMarker>();
        Self {
            world_id: world_id.clone(),
            live: store.len() - despawning,
            despawning,
            templates,
            initialized,
            participating,
        }
    }
}

impl std::fmt::Display for WorldSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<12} live={} despawning={} templates={}{}{}",
            self.world_id.as_str(),
            self.live,
            self.despawning,
            self.templates,
            if self.participating { " participating" } else { "" },
            if self.initialized { "" } else { " UNINITIALIZED" },
        )
    }
}

/// One entity across worlds.
#[derive(Debug, Clone, Serialize)]
pub struct EntityInfo {
    pub id: EntityId,
    pub registry_entity: String,
    pub template: Option<String>,
    pub locals: Vec<LocalInfo>,
}

/// One participating world's view of an entity.
#[derive(Debug, Clone, Serialize)]
pub struct LocalInfo {
    pub world_id: WorldId,
    pub handle: Option<String>,
    pub template: Option<String>,
    pub despawning: bool,
}

impl std::fmt::Display for EntityInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Entity [{:.8}] registry={} template={}",
            &self.id.0.to_string()[..8],
            self.registry_entity,
            self.template.as_deref().unwrap_or("-"),
        )?;
        for local in &self.locals {
            writeln!(
                f,
                "  {:<12} {} ({})",
                local.world_id.as_str(),
                local.handle.as_deref().unwrap_or("unlinked"),
                local.template.as_deref().unwrap_or("-"),
            )?;
        }
        Ok(())
    }
}
