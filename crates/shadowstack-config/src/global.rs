//! Global Configuration (~/.shadowstack/config.toml)
//!
//! User-level defaults for configuration properties. Project settings always
//! win over these.

use crate::properties::{BuildConfig, PropertyValue};
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.shadowstack/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default configuration properties
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub configuration: BTreeMap<String, PropertyValue>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.as_build_config().validate()?;
        Ok(config)
    }

    /// Path of the global configuration file
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".shadowstack").join("config.toml"))
    }

    /// The defaults as a build config with no permutations
    pub fn as_build_config(&self) -> BuildConfig {
        BuildConfig {
            configuration: self.configuration.clone(),
            permutations: Vec::new(),
        }
    }
}
