use worldlink_common::WorldId;
use worldlink_ecs::Handle;

/// Errors from spawning, materializing and registry linking.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    #[error("no template registered under id `{0}`")]
    UnknownTemplate(String),
    #[error("template `{0}` inherits from itself")]
    CyclicTemplate(String),
    #[error("registry entity {0} is not alive in the registry store")]
    ForeignHandle(Handle),
    #[error("registry entity carries no identifier component")]
    MissingIdentifier,
    #[error("registry entity has no record for world `{0}`")]
    NoWorldRecord(WorldId),
    #[error("registry entity is already linked to a live entity in world `{0}`")]
    AlreadyLinked(WorldId),
    #[error("world `{0}` does not take part in registry linking")]
    NotParticipating(WorldId),
}

/// Errors from registering templates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrototypeError {
    #[error("template `{0}` is already registered")]
    DuplicateTemplate(String),
    #[error("template id must not be empty")]
    EmptyTemplateId,
    #[error("template handle {0} does not belong to the prototype store")]
    ForeignHandle(Handle),
}

/// Errors from the world directory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("world `{0}` is already registered")]
    DuplicateWorld(WorldId),
    #[error("world `{0}` is not registered")]
    UnknownWorld(WorldId),
    #[error("world `{0}` cannot participate in registry linking")]
    NotParticipating(WorldId),
}

/// Errors from the entity manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityError {
    #[error("no entity registered under id {0}")]
    UnknownEntity(String),
    #[error("an entity is already registered under id {0}")]
    DuplicateEntity(String),
    #[error("world `{0}` is not registered")]
    UnknownWorld(WorldId),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

/// Errors from loading an entity-manager configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config extension `{0}` (expected yaml, yml or json)")]
    UnsupportedFormat(String),
    #[error("world `{world}` is not provided by preset `{preset}`")]
    WorldNotInPreset { world: WorldId, preset: String },
    #[error("world `{0}` is listed more than once")]
    DuplicateWorld(WorldId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
