//! Per-entity systems and the ordered pipelines that run them.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use worldlink_ecs::{EntityStore, Handle};

/// A unit of per-entity work run by a world controller.
pub trait EntitySystem {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn update(&mut self, store: &mut EntityStore, entity: Handle);

    fn dispose(&mut self) {}

    /// Whether a metered pipeline should time this system.
    fn profiled(&self) -> bool {
        true
    }
}

/// Closure-backed system.
pub struct FnSystem<F> {
    name: String,
    enabled: bool,
    f: F,
}

impl<F> FnSystem<F>
where
    F: FnMut(&mut EntityStore, Handle),
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            f,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl<F> EntitySystem for FnSystem<F>
where
    F: FnMut(&mut EntityStore, Handle),
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn update(&mut self, store: &mut EntityStore, entity: Handle) {
        (self.f)(store, entity)
    }
}

/// Timing for one system inside a metered pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SystemTiming {
    pub calls: u64,
    pub total: Duration,
    pub max: Duration,
}

impl SystemTiming {
    pub fn mean(&self) -> Duration {
        if self.calls == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.calls);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Metrics registry owned by one pipeline, keyed by system name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineMetrics {
    systems: BTreeMap<String, SystemTiming>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, system: &str, elapsed: Duration) {
        let timing = self.systems.entry(system.to_owned()).or_default();
        timing.calls += 1;
        timing.total += elapsed;
        timing.max = timing.max.max(elapsed);
    }

    pub fn get(&self, system: &str) -> Option<&SystemTiming> {
        self.systems.get(system)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SystemTiming)> {
        self.systems.iter().map(|(name, t)| (name.as_str(), t))
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn reset(&mut self) {
        self.systems.clear();
    }
}

/// Systems run strictly in registration order.
///
/// A pipeline is itself an [`EntitySystem`], so pipelines nest. Disabled
/// members are skipped, never removed.
pub struct SequentialPipeline {
    name: String,
    enabled: bool,
    systems: Vec<Box<dyn EntitySystem>>,
    metrics: Option<PipelineMetrics>,
}

impl SequentialPipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            systems: Vec::new(),
            metrics: None,
        }
    }

    pub fn with_system(mut self, system: impl EntitySystem + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn push(&mut self, system: Box<dyn EntitySystem>) {
        self.systems.push(system);
    }

    /// Time every profiled member into `metrics`.
    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn metrics(&self) -> Option<&PipelineMetrics> {
        self.metrics.as_ref()
    }

    pub fn metrics_mut(&mut self) -> Option<&mut PipelineMetrics> {
        self.metrics.as_mut()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name()).collect()
    }
}

impl EntitySystem for SequentialPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn update(&mut self, store: &mut EntityStore, entity: Handle) {
        if !self.enabled {
            return;
        }
        for system in self.systems.iter_mut() {
            if !system.is_enabled() {
                continue;
            }
            match self.metrics.as_mut() {
                Some(metrics) if system.profiled() => {
                    let start = Instant::now();
                    system.update(store, entity);
                    metrics.record(system.name(), start.elapsed());
                }
                _ => system.update(store, entity),
            }
        }
    }

    /// Dispose members in reverse registration order.
    fn dispose(&mut self) {
        for system in self.systems.iter_mut().rev() {
            system.dispose();
        }
    }

    fn profiled(&self) -> bool {
        false
    }
}

impl fmt::Debug for SequentialPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialPipeline")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("systems", &self.system_names())
            .finish()
    }
}

/// The three pipelines a world controller drives.
#[derive(Debug)]
pub struct Pipelines {
    pub resolve: SequentialPipeline,
    pub initialization: SequentialPipeline,
    pub deinitialization: SequentialPipeline,
}

impl Pipelines {
    pub fn new(
        resolve: SequentialPipeline,
        initialization: SequentialPipeline,
        deinitialization: SequentialPipeline,
    ) -> Self {
        Self {
            resolve,
            initialization,
            deinitialization,
        }
    }

    pub fn dispose(&mut self) {
        self.deinitialization.dispose();
        self.initialization.dispose();
        self.resolve.dispose();
    }
}

impl Default for Pipelines {
    fn default() -> Self {
        Self::new(
            SequentialPipeline::new("resolve"),
            SequentialPipeline::new("initialization"),
            SequentialPipeline::new("deinitialization"),
        )
    }
}
