//! Named templates and their materialization into live entities.
//!
//! Templates live in a dedicated store and are never spawned in place: every
//! spawn clones outward into the target world. A template carrying
//! [`NestedPrototype`] derives from a base; materialization clones the whole
//! chain base first, so the most derived template wins on conflict.

use std::collections::{HashMap, HashSet};

use worldlink_ecs::{Component, ComponentCloner, EntityStore, Handle, NestedPrototype};

use crate::error::{PrototypeError, SpawnError};

/// Template store addressed by string id.
pub struct PrototypeRepository {
    store: EntityStore,
    templates: HashMap<String, Handle>,
}

impl PrototypeRepository {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            store: EntityStore::new(label),
            templates: HashMap::new(),
        }
    }

    /// Register an entity of the prototype store under `template_id`.
    ///
    /// Never overwrites: a second registration under the same id fails with
    /// [`PrototypeError::DuplicateTemplate`].
    pub fn register(&mut self, template_id: impl Into<String>, handle: Handle) -> Result<(), PrototypeError> {
        let template_id = template_id.into();
        if template_id.is_empty() {
            return Err(PrototypeError::EmptyTemplateId);
        }
        if !self.store.is_alive(handle) {
            return Err(PrototypeError::ForeignHandle(handle));
        }
        if self.templates.contains_key(&template_id) {
            return Err(PrototypeError::DuplicateTemplate(template_id));
        }
        tracing::debug!(store = %self.store.label(), template = %template_id, "registered template");
        self.templates.insert(template_id, handle);
        Ok(())
    }

    pub fn get(&self, template_id: &str) -> Option<Handle> {
        self.templates.get(template_id).copied()
    }

    pub fn contains(&self, template_id: &str) -> bool {
        self.templates.contains_key(template_id)
    }

    /// Drop a template and destroy its entity. Templates nested on it start
    /// failing with [`SpawnError::UnknownTemplate`].
    pub fn unregister(&mut self, template_id: &str) -> bool {
        match self.templates.remove(template_id) {
            Some(handle) => {
                self.store.destroy(handle);
                true
            }
            None => false,
        }
    }

    /// Registered ids, sorted.
    pub fn template_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Mutable access for authoring template components in place.
    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    /// Start authoring a new template entity.
    pub fn author(&mut self, template_id: impl Into<String>) -> TemplateBuilder<'_> {
        let handle = self.store.create();
        TemplateBuilder {
            repo: self,
            template_id: template_id.into(),
            handle,
        }
    }

    /// Template handles from the root base down to `template_id`.
    ///
    /// The whole chain is validated before anything is cloned, so a missing
    /// base or a cycle never leaves a half-built entity behind.
    pub fn resolve_chain(&self, template_id: &str) -> Result<Vec<Handle>, SpawnError> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = template_id.to_owned();
        loop {
            if !visited.insert(current.clone()) {
                return Err(SpawnError::CyclicTemplate(current));
            }
            let handle = self
                .get(&current)
                .ok_or_else(|| SpawnError::UnknownTemplate(current.clone()))?;
            chain.push(handle);
            match self.store.get::<NestedPrototype>(handle) {
                Some(nested) => current = nested.base_template_id.clone(),
                None => break,
            }
        }
        chain.reverse();
        Ok(chain)
    }
}

impl std::fmt::Debug for PrototypeRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrototypeRepository")
            .field("store", &self.store.label())
            .field("templates", &self.template_ids())
            .finish()
    }
}

/// Builder for one template entity. Dropping it without
/// [`TemplateBuilder::register`] leaves an unnamed entity in the prototype store.
pub struct TemplateBuilder<'a> {
    repo: &'a mut PrototypeRepository,
    template_id: String,
    handle: Handle,
}

impl TemplateBuilder<'_> {
    pub fn with<C: Component>(mut self, value: C) -> Self {
        self.repo.store.set(self.handle, value);
        self
    }

    /// Derive from `base_template_id`.
    pub fn nested_on(self, base_template_id: impl Into<String>) -> Self {
        self.with(NestedPrototype {
            base_template_id: base_template_id.into(),
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn register(self) -> Result<Handle, PrototypeError> {
        let TemplateBuilder {
            repo,
            template_id,
            handle,
        } = self;
        match repo.register(template_id, handle) {
            Ok(()) => Ok(handle),
            Err(err) => {
                repo.store.destroy(handle);
                Err(err)
            }
        }
    }
}

/// Clone `template_id` into a fresh entity of `dst`.
///
/// Walks the nested chain base first and overlays each derived template on
/// top. The result never carries [`NestedPrototype`]. Nothing is cached:
/// edits to a base are visible on the next spawn.
pub fn materialize(
    prototypes: &PrototypeRepository,
    cloner: &ComponentCloner,
    dst: &mut EntityStore,
    template_id: &str,
) -> Result<Handle, SpawnError> {
    let chain = prototypes.resolve_chain(template_id)?;
    let handle = dst.create();
    for template in chain {
        cloner.clone_components(prototypes.store(), template, dst, handle);
    }
    dst.remove::<NestedPrototype>(handle);
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);

    #[derive(Debug, Clone, PartialEq)]
    struct Sprite(String);

    fn cloner() -> ComponentCloner {
        ComponentCloner::new()
            .with::<Health>()
            .with::<Sprite>()
            .with::<NestedPrototype>()
    }

    fn trees() -> PrototypeRepository {
        let mut repo = PrototypeRepository::new("prototypes");
        repo.author("tree_base")
            .with(Health(100))
            .with(Sprite("tree.png".into()))
            .register()
            .unwrap();
        repo.author("tree_oak")
            .nested_on("tree_base")
            .with(Sprite("oak.png".into()))
            .register()
            .unwrap();
        repo
    }

    #[test]
    fn nested_template_overlays_its_base() {
        let repo = trees();
        let mut world = EntityStore::new("simulation");

        let oak = materialize(&repo, &cloner(), &mut world, "tree_oak").unwrap();
        assert_eq!(world.cloned::<Health>(oak), Some(Health(100)));
        assert_eq!(world.cloned::<Sprite>(oak), Some(Sprite("oak.png".into())));
        assert!(!world.has::<NestedPrototype>(oak));
    }

    #[test]
    fn materialization_leaves_templates_untouched() {
        let repo = trees();
        let mut world = EntityStore::new("simulation");
        let oak = materialize(&repo, &cloner(), &mut world, "tree_oak").unwrap();
        world.set(oak, Health(1));

        let template = repo.get("tree_base").unwrap();
        assert_eq!(repo.store().cloned::<Health>(template), Some(Health(100)));
        assert!(repo.store().has::<NestedPrototype>(repo.get("tree_oak").unwrap()));
    }

    #[test]
    fn base_edits_show_up_on_the_next_spawn() {
        let mut repo = trees();
        let base = repo.get("tree_base").unwrap();
        repo.store_mut().set(base, Health(250));

        let mut world = EntityStore::new("simulation");
        let oak = materialize(&repo, &cloner(), &mut world, "tree_oak").unwrap();
        assert_eq!(world.cloned::<Health>(oak), Some(Health(250)));
    }

    #[test]
    fn unknown_template_creates_nothing() {
        let repo = trees();
        let mut world = EntityStore::new("simulation");
        let err = materialize(&repo, &cloner(), &mut world, "tree_pine").unwrap_err();
        assert_eq!(err, SpawnError::UnknownTemplate("tree_pine".into()));
        assert!(world.is_empty());
    }

    #[test]
    fn missing_base_is_reported_by_name() {
        let mut repo = PrototypeRepository::new("prototypes");
        repo.author("orphan").nested_on("ghost").register().unwrap();
        let mut world = EntityStore::new("simulation");
        let err = materialize(&repo, &cloner(), &mut world, "orphan").unwrap_err();
        assert_eq!(err, SpawnError::UnknownTemplate("ghost".into()));
        assert!(world.is_empty());
    }

    #[test]
    fn cycles_are_rejected_before_spawning() {
        let mut repo = PrototypeRepository::new("prototypes");
        repo.author("a").nested_on("b").register().unwrap();
        repo.author("b").nested_on("a").register().unwrap();
        let mut world = EntityStore::new("simulation");
        let err = materialize(&repo, &cloner(), &mut world, "a").unwrap_err();
        assert_eq!(err, SpawnError::CyclicTemplate("a".into()));
        assert!(world.is_empty());
    }

    #[test]
    fn chain_is_ordered_root_first() {
        let mut repo = trees();
        repo.author("tree_oak_old").nested_on("tree_oak").register().unwrap();
        let chain = repo.resolve_chain("tree_oak_old").unwrap();
        assert_eq!(
            chain,
            vec![
                repo.get("tree_base").unwrap(),
                repo.get("tree_oak").unwrap(),
                repo.get("tree_oak_old").unwrap(),
            ]
        );
    }

    #[test]
    fn registration_rejects_duplicates_and_bad_input() {
        let mut repo = trees();
        let before = repo.store().len();
        let err = repo.author("tree_base").with(Health(1)).register().unwrap_err();
        assert_eq!(err, PrototypeError::DuplicateTemplate("tree_base".into()));
        assert_eq!(repo.store().len(), before);

        assert_eq!(repo.author("").register().unwrap_err(), PrototypeError::EmptyTemplateId);

        let mut elsewhere = EntityStore::new("other");
        let foreign = elsewhere.create();
        assert_eq!(
            repo.register("foreign", foreign),
            Err(PrototypeError::ForeignHandle(foreign))
        );
    }

    #[test]
    fn unregister_destroys_the_template() {
        let mut repo = trees();
        let base = repo.get("tree_base").unwrap();
        assert!(repo.unregister("tree_base"));
        assert!(!repo.store().is_alive(base));
        assert!(!repo.unregister("tree_base"));
        assert_eq!(repo.template_ids(), vec!["tree_oak"]);
    }
}
