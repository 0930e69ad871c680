//! Entity-manager configuration: which worlds exist and which participate.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use worldlink_common::WorldId;

use crate::error::ConfigError;

/// Which worlds a manager is built with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthoringPreset {
    /// Registry and event worlds only.
    None,
    /// Simulation and view.
    #[default]
    Default,
    /// Simulation and network, no presentation.
    Server,
    NetworkingHost,
    NetworkingClient,
}

impl AuthoringPreset {
    /// Worlds the preset provides, in link order.
    pub fn worlds(self) -> Vec<WorldId> {
        match self {
            AuthoringPreset::None => Vec::new(),
            AuthoringPreset::Default => vec![WorldId::SIMULATION, WorldId::VIEW],
            AuthoringPreset::Server => vec![WorldId::SIMULATION, WorldId::NETWORK],
            AuthoringPreset::NetworkingHost | AuthoringPreset::NetworkingClient => {
                vec![WorldId::SIMULATION, WorldId::VIEW, WorldId::NETWORK]
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AuthoringPreset::None => "none",
            AuthoringPreset::Default => "default",
            AuthoringPreset::Server => "server",
            AuthoringPreset::NetworkingHost => "networking_host",
            AuthoringPreset::NetworkingClient => "networking_client",
        }
    }
}

impl fmt::Display for AuthoringPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for AuthoringPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(AuthoringPreset::None),
            "default" => Ok(AuthoringPreset::Default),
            "server" => Ok(AuthoringPreset::Server),
            "networking_host" => Ok(AuthoringPreset::NetworkingHost),
            "networking_client" => Ok(AuthoringPreset::NetworkingClient),
            other => Err(format!("unknown preset `{other}`")),
        }
    }
}

/// Manager configuration, loadable from YAML or JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityManagerConfig {
    pub preset: AuthoringPreset,
    /// Ordered subset of the preset's worlds. `None` means all of them.
    pub participating: Option<Vec<WorldId>>,
}

impl EntityManagerConfig {
    pub fn from_preset(preset: AuthoringPreset) -> Self {
        Self {
            preset,
            participating: None,
        }
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load by extension: `.yaml`, `.yml` or `.json`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let text = std::fs::read_to_string(path)?;
        let config = match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&text)?,
            "json" => Self::from_json_str(&text)?,
            _ => return Err(ConfigError::UnsupportedFormat(extension)),
        };
        tracing::info!(path = %path.display(), preset = %config.preset, "loaded entity manager config");
        Ok(config)
    }

    /// Every participating world must come from the preset, once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(participating) = &self.participating else {
            return Ok(());
        };
        let provided = self.preset.worlds();
        for (i, world) in participating.iter().enumerate() {
            if participating[..i].contains(world) {
                return Err(ConfigError::DuplicateWorld(world.clone()));
            }
            if !provided.contains(world) {
                return Err(ConfigError::WorldNotInPreset {
                    world: world.clone(),
                    preset: self.preset.name().to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Worlds to link, in order.
    pub fn participating_worlds(&self) -> Vec<WorldId> {
        self.participating
            .clone()
            .unwrap_or_else(|| self.preset.worlds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_the_default_preset() {
        let config = EntityManagerConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.preset, AuthoringPreset::Default);
        assert_eq!(config.participating_worlds(), vec![WorldId::SIMULATION, WorldId::VIEW]);
    }

    #[test]
    fn yaml_selects_preset_and_subset() {
        let config = EntityManagerConfig::from_yaml_str(
            "preset: networking_client\nparticipating: [network, simulation]\n",
        )
        .unwrap();
        assert_eq!(config.preset, AuthoringPreset::NetworkingClient);
        assert_eq!(config.participating_worlds(), vec![WorldId::NETWORK, WorldId::SIMULATION]);
    }

    #[test]
    fn json_is_accepted() {
        let config = EntityManagerConfig::from_json_str(r#"{"preset":"server"}"#).unwrap();
        assert_eq!(config.participating_worlds(), vec![WorldId::SIMULATION, WorldId::NETWORK]);
    }

    #[test]
    fn worlds_outside_the_preset_are_rejected() {
        let err = EntityManagerConfig::from_yaml_str("preset: server\nparticipating: [view]\n").unwrap_err();
        assert!(matches!(err, ConfigError::WorldNotInPreset { ref world, .. } if *world == WorldId::VIEW));

        let err = EntityManagerConfig::from_yaml_str("participating: [view, view]\n").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateWorld(_)));
    }

    #[test]
    fn unknown_preset_fails_to_parse() {
        assert!(matches!(
            EntityManagerConfig::from_yaml_str("preset: arcade\n"),
            Err(ConfigError::Yaml(_))
        ));
        assert!("arcade".parse::<AuthoringPreset>().is_err());
        assert_eq!("server".parse::<AuthoringPreset>(), Ok(AuthoringPreset::Server));
    }

    #[test]
    fn load_dispatches_on_extension() {
        let dir = std::env::temp_dir().join(format!("worldlink-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let yaml = dir.join("manager.yaml");
        std::fs::write(&yaml, "preset: none\n").unwrap();
        assert_eq!(EntityManagerConfig::load(&yaml).unwrap().preset, AuthoringPreset::None);

        let toml = dir.join("manager.toml");
        std::fs::write(&toml, "preset = 'none'\n").unwrap();
        assert!(matches!(
            EntityManagerConfig::load(&toml),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "toml"
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
