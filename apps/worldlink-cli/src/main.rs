use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::Vec3;
use tracing_subscriber::EnvFilter;
use worldlink_common::WorldId;
use worldlink_ecs::{ComponentCloner, EntityStore, Handle, ResolvePayload, ResolveSource};
use worldlink_kernel::{
    AuthoringPreset, EntityManager, EntityManagerBuilder, EntityManagerConfig, FnSystem,
    PipelineMetrics, Pipelines, SequentialPipeline, SimulationController, SpawnRequest,
    ViewIdentity,
};
use worldlink_tools::WorldInspector;

#[derive(Parser)]
#[command(name = "worldlink-cli", about = "CLI tool for worldlink operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version and crate info
    Info,
    /// Spawn, replace and despawn entities across the preset's worlds
    Demo {
        /// World preset: none, default, server, networking_host, networking_client
        #[arg(short, long, default_value = "networking_host")]
        preset: AuthoringPreset,
        /// Number of entities to spawn
        #[arg(short, long, default_value = "5")]
        count: usize,
        /// YAML or JSON manager config; overrides --preset
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the final summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position(Vec3);

#[derive(Debug, Clone, Copy, PartialEq)]
struct Health(u32);

#[derive(Debug, Clone, Copy, PartialEq)]
struct Speed(f32);

#[derive(Debug, Clone, PartialEq)]
struct Mesh(&'static str);

#[derive(Debug, Clone, PartialEq)]
struct SceneName(String);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("worldlink-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", worldlink_common::crate_info());
            println!("ecs: {}", worldlink_ecs::crate_info());
            println!("kernel: {}", worldlink_kernel::crate_info());
            println!("tools: {}", worldlink_tools::crate_info());
        }
        Commands::Demo {
            preset,
            count,
            config,
            json,
        } => {
            let config = match config {
                Some(path) => EntityManagerConfig::load(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => EntityManagerConfig::from_preset(preset),
            };
            let mut manager = build_manager(config)?;
            author_templates(&mut manager)?;
            run_demo(&mut manager, count)?;

            let summary = WorldInspector::summary(&manager);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{summary}");
            }
            if let Some(sim) = manager.world::<SimulationController>(&WorldId::SIMULATION) {
                if let Some(metrics) = sim.pipelines().and_then(|p| p.initialization.metrics()) {
                    for (system, timing) in metrics.iter() {
                        println!(
                            "  init system {system}: calls={} mean={:?} max={:?}",
                            timing.calls,
                            timing.mean(),
                            timing.max
                        );
                    }
                }
            }
            manager.dispose();
        }
    }

    Ok(())
}

fn build_manager(config: EntityManagerConfig) -> anyhow::Result<EntityManager> {
    let cloner = ComponentCloner::new()
        .with::<Position>()
        .with::<Health>()
        .with::<Speed>();
    let builder = EntityManagerBuilder::new(config.clone())
        .with_cloner(cloner)
        .with_world_cloner(WorldId::VIEW, ComponentCloner::new().with::<Mesh>())
        .with_default_pipelines();
    let builder = if config.preset.worlds().contains(&WorldId::SIMULATION) {
        builder.with_pipelines(WorldId::SIMULATION, simulation_pipelines())
    } else {
        builder
    };
    Ok(builder.build()?)
}

fn simulation_pipelines() -> Pipelines {
    let resolve = SequentialPipeline::new("resolve").with_system(FnSystem::new(
        "scene_name",
        |store: &mut EntityStore, entity: Handle| {
            let name = store
                .get::<ResolvePayload>(entity)
                .and_then(|payload| payload.source.downcast_ref::<String>().cloned());
            if let Some(name) = name {
                store.set(entity, SceneName(name));
            }
        },
    ));
    let initialization = SequentialPipeline::new("initialization")
        .with_system(FnSystem::new("clamp_health", |store: &mut EntityStore, entity: Handle| {
            if let Some(mut health) = store.get_mut::<Health>(entity) {
                health.0 = health.0.min(100);
            }
        }))
        .with_metrics(PipelineMetrics::new());
    let deinitialization = SequentialPipeline::new("deinitialization").with_system(FnSystem::new(
        "log_despawn",
        |store: &mut EntityStore, entity: Handle| {
            let position = store.cloned::<Position>(entity).map(|p| p.0);
            tracing::debug!(entity = %entity, ?position, "simulation entity leaving");
        },
    ));
    Pipelines::new(resolve, initialization, deinitialization)
}

fn author_templates(manager: &mut EntityManager) -> anyhow::Result<()> {
    let world_ids: Vec<WorldId> = manager.worlds().world_ids().cloned().collect();
    for world_id in &world_ids {
        let prototypes = manager
            .worlds_mut()
            .get_mut(world_id)
            .and_then(|world| world.prototypes_mut())
            .with_context(|| format!("world `{world_id}` has no prototypes"))?;
        prototypes
            .author("unit")
            .with(Health(100))
            .with(Position(Vec3::ZERO))
            .register()?;
        prototypes
            .author("scout")
            .nested_on("unit")
            .with(Speed(6.5))
            .register()?;
        if *world_id == WorldId::VIEW {
            prototypes
                .author("scout_view")
                .with(Mesh("scout.glb"))
                .register()?;
        }
    }
    if world_ids.contains(&WorldId::VIEW) {
        manager
            .registry_mut()
            .prototypes_mut()
            .author("scout")
            .with(ViewIdentity::pending("scout_view"))
            .register()?;
    }
    Ok(())
}

fn run_demo(manager: &mut EntityManager, count: usize) -> anyhow::Result<()> {
    let has_sim = manager.participating().contains(&WorldId::SIMULATION);
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let template = if i % 2 == 0 { "unit" } else { "scout" };
        let mut request = SpawnRequest::new(template);
        if has_sim {
            let staged = manager.stage_override(&WorldId::SIMULATION)?;
            if let Some(store) = manager
                .worlds_mut()
                .get_mut(&WorldId::SIMULATION)
                .map(|world| world.store_mut())
            {
                store.set(staged, Position(Vec3::new(i as f32 * 2.0, 0.0, 0.0)));
            }
            request = request
                .with_override(WorldId::SIMULATION, staged)
                .with_source(WorldId::SIMULATION, ResolveSource::new(format!("spawn_point_{i}")));
        }
        let report = manager.spawn_with(request)?;
        if !report.is_complete() {
            tracing::warn!(entity_id = %report.entity_id, missing = ?report.missing_worlds(), "partially linked");
        }
        ids.push(report.entity_id);
    }
    println!("Spawned {} entities", ids.len());

    if let (Some(&first), true) = (ids.first(), has_sim) {
        let handle = manager.replace(first, &WorldId::SIMULATION, "scout")?;
        println!("Replaced {first} in simulation -> {handle}");
    }
    if let Some(&last) = ids.last() {
        manager.emit_despawn(last);
        let processed = manager.process_events();
        println!(
            "Processed events: spawned={} despawned={} rejected={}",
            processed.spawned.len(),
            processed.despawned.len(),
            processed.rejected.len()
        );
    }
    let removed = manager.flush_despawned();
    println!("Flushed {removed} despawned entities");

    if let Some(info) = ids
        .first()
        .and_then(|&id| WorldInspector::inspect_entity(manager, id))
    {
        print!("{info}");
    }
    Ok(())
}
