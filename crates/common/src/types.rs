use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use uuid::Uuid;

/// Stable external identifier of a logical object.
///
/// Assigned once, never reused, and independent of any world's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Build an id from raw bits. Handy for fixtures and replays.
    pub const fn from_u128(bits: u128) -> Self {
        Self(Uuid::from_u128(bits))
    }

    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Key of an entity world (registry, simulation, view, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(Cow<'static, str>);

impl WorldId {
    /// Canonical per-EID records live here.
    pub const REGISTRY: WorldId = WorldId(Cow::Borrowed("registry"));
    /// Transient event entities.
    pub const EVENT: WorldId = WorldId(Cow::Borrowed("event"));
    pub const SIMULATION: WorldId = WorldId(Cow::Borrowed("simulation"));
    pub const VIEW: WorldId = WorldId(Cow::Borrowed("view"));
    pub const NETWORK: WorldId = WorldId(Cow::Borrowed("network"));

    pub fn new(id: impl Into<String>) -> Self {
        Self(Cow::Owned(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorldId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
