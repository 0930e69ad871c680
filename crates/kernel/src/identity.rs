//! Identity schemes and world-identity records.
//!
//! Worlds encode identity differently, so controllers are generic over an
//! [`IdentityScheme`] (EID <-> identifier component) and a [`WorldRecord`]
//! (template id + local handle stored on the registry entity).

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use worldlink_common::EntityId;
use worldlink_ecs::{Component, Handle};

/// Conversion between an external id and the component that carries it.
pub trait IdentityScheme: 'static {
    type Id: Copy + Eq + Hash + Ord + fmt::Debug + Send + Sync + 'static;
    type Component: Component;

    fn make_component(id: Self::Id) -> Self::Component;
    fn extract_id(component: &Self::Component) -> Self::Id;
}

/// UUID-keyed identity: the default scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuidScheme;

/// Identifier component for [`GuidScheme`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuidComponent {
    pub guid: EntityId,
}

impl IdentityScheme for GuidScheme {
    type Id = EntityId;
    type Component = GuidComponent;

    fn make_component(id: EntityId) -> GuidComponent {
        GuidComponent { guid: id }
    }

    fn extract_id(component: &GuidComponent) -> EntityId {
        component.guid
    }
}

/// Linkage data stored on a registry entity, one type per world kind.
///
/// A record without a local handle is *pending*: it names the template a
/// world should spawn but nothing has been spawned yet.
pub trait WorldRecord: Component + Clone {
    fn new(template_id: String, local: Option<Handle>) -> Self;
    fn template_id(&self) -> &str;
    fn local(&self) -> Option<Handle>;
}

/// Generic world-identity record, distinguished per world by the kind `K`.
pub struct WorldIdentity<K> {
    template_id: String,
    local: Option<Handle>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> WorldIdentity<K> {
    /// A record that only names the template to spawn.
    pub fn pending(template_id: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            local: None,
            _kind: PhantomData,
        }
    }
}

impl<K> Clone for WorldIdentity<K> {
    fn clone(&self) -> Self {
        Self {
            template_id: self.template_id.clone(),
            local: self.local,
            _kind: PhantomData,
        }
    }
}

impl<K> fmt::Debug for WorldIdentity<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldIdentity")
            .field("kind", &std::any::type_name::<K>())
            .field("template_id", &self.template_id)
            .field("local", &self.local)
            .finish()
    }
}

impl<K: 'static> WorldRecord for WorldIdentity<K> {
    fn new(template_id: String, local: Option<Handle>) -> Self {
        Self {
            template_id,
            local,
            _kind: PhantomData,
        }
    }

    fn template_id(&self) -> &str {
        &self.template_id
    }

    fn local(&self) -> Option<Handle> {
        self.local
    }
}

/// World kind markers.
pub mod kind {
    pub enum Simulation {}
    pub enum View {}
    pub enum Network {}
}

pub type SimulationIdentity = WorldIdentity<kind::Simulation>;
pub type ViewIdentity = WorldIdentity<kind::View>;
pub type NetworkIdentity = WorldIdentity<kind::Network>;
