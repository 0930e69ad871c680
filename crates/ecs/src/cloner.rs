use std::any::{TypeId, type_name};
use std::fmt;

use hecs::Component;

use crate::store::{EntityStore, Handle};

type CopyBetween = fn(&hecs::World, hecs::Entity, &mut hecs::World, hecs::Entity) -> bool;
type CopyWithin = fn(&mut hecs::World, hecs::Entity, hecs::Entity) -> bool;

#[derive(Clone)]
struct ClonerEntry {
    type_id: TypeId,
    name: &'static str,
    between: CopyBetween,
    within: CopyWithin,
}

/// Copies a registered set of component types from one entity to another.
///
/// Works across stores. Types that were never registered are skipped
/// silently. Values already present on the destination are overwritten, so
/// the source always wins a conflict.
#[derive(Clone, Default)]
pub struct ComponentCloner {
    entries: Vec<ClonerEntry>,
}

impl ComponentCloner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` for cloning. Registering twice is harmless.
    pub fn register<T: Component + Clone>(&mut self) -> &mut Self {
        let type_id = TypeId::of::<T>();
        if !self.entries.iter().any(|e| e.type_id == type_id) {
            self.entries.push(ClonerEntry {
                type_id,
                name: type_name::<T>(),
                between: copy_between::<T>,
                within: copy_within::<T>,
            });
        }
        self
    }

    /// Builder form of [`ComponentCloner::register`].
    pub fn with<T: Component + Clone>(mut self) -> Self {
        self.register::<T>();
        self
    }

    /// Append every registration of `other` not already present.
    pub fn extend(&mut self, other: &ComponentCloner) {
        for entry in &other.entries {
            if !self.entries.iter().any(|e| e.type_id == entry.type_id) {
                self.entries.push(entry.clone());
            }
        }
    }

    pub fn contains<T: Component>(&self) -> bool {
        let type_id = TypeId::of::<T>();
        self.entries.iter().any(|e| e.type_id == type_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn registered_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }

    /// Copy registered components from `src` in `src_store` onto `dst` in `dst_store`.
    ///
    /// Returns the number of components copied. Dead or foreign handles copy nothing.
    pub fn clone_components(
        &self,
        src_store: &EntityStore,
        src: Handle,
        dst_store: &mut EntityStore,
        dst: Handle,
    ) -> usize {
        if !src_store.is_alive(src) || !dst_store.is_alive(dst) {
            return 0;
        }
        let (s, d) = (EntityStore::raw(src), EntityStore::raw(dst));
        self.entries
            .iter()
            .filter(|entry| (entry.between)(&src_store.world, s, &mut dst_store.world, d))
            .count()
    }

    /// Same as [`ComponentCloner::clone_components`] with both entities in one store.
    pub fn clone_components_within(&self, store: &mut EntityStore, src: Handle, dst: Handle) -> usize {
        if !store.is_alive(src) || !store.is_alive(dst) || src == dst {
            return 0;
        }
        let (s, d) = (EntityStore::raw(src), EntityStore::raw(dst));
        self.entries
            .iter()
            .filter(|entry| (entry.within)(&mut store.world, s, d))
            .count()
    }

    /// Create a fresh entity in `dst_store` carrying copies of `src`'s components.
    pub fn copy_to(&self, src_store: &EntityStore, src: Handle, dst_store: &mut EntityStore) -> Handle {
        let dst = dst_store.create();
        self.clone_components(src_store, src, dst_store, dst);
        dst
    }
}

impl fmt::Debug for ComponentCloner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.registered_names()).finish()
    }
}

fn copy_between<T: Component + Clone>(
    src: &hecs::World,
    s: hecs::Entity,
    dst: &mut hecs::World,
    d: hecs::Entity,
) -> bool {
    let value = match src.get::<&T>(s) {
        Ok(component) => (*component).clone(),
        Err(_) => return false,
    };
    dst.insert_one(d, value).is_ok()
}

fn copy_within<T: Component + Clone>(world: &mut hecs::World, s: hecs::Entity, d: hecs::Entity) -> bool {
    let value = match world.get::<&T>(s) {
        Ok(component) => (*component).clone(),
        Err(_) => return false,
    };
    world.insert_one(d, value).is_ok()
}
