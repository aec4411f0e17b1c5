//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::properties::{BuildConfig, PermutationProperties, PropertyValue};
use crate::{
    ConfigResult, RECORD_FILE_NAMES_PROPERTY, RECORD_LINE_NUMBERS_PROPERTY, STACK_MODE_PROPERTY,
};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the project configuration file
pub const PROJECT_CONFIG_FILE: &str = "shadowstack.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.shadowstack/config.toml) - lowest priority
/// 2. Project config (./shadowstack.toml) - overrides global
/// 3. Environment variables (SHADOWSTACK_*) - overrides project
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Effective build configuration after merging
    pub build: BuildConfig,

    /// Project root directory (where shadowstack.toml was found)
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use an explicit global config file instead of ~/.shadowstack/config.toml
    pub fn with_global_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find shadowstack.toml, then merges it
    /// over the global config and applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;
        self.assemble(project_config, project_root)
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = BuildConfig::load_from_file(config_path)?;
        let project_root = config_path.parent().map(|p| p.to_path_buf());
        self.assemble(project_config, project_root)
    }

    fn assemble(
        &mut self,
        project_config: BuildConfig,
        project_root: Option<PathBuf>,
    ) -> ConfigResult<Config> {
        let mut build = self.load_global_config()?.as_build_config();
        build.merge(&project_config);
        apply_env_overrides(&mut build);
        build.validate()?;

        Ok(Config {
            build,
            project_root,
        })
    }

    /// Find project configuration by walking up directory tree
    ///
    /// Returns (project_root, project_config); a default config when no file exists.
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, BuildConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.exists() {
                let project_config = BuildConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, BuildConfig::default())),
            }
        }
    }

    /// Load global configuration; a missing file or home directory yields defaults
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => match GlobalConfig::global_config_path() {
                Ok(path) => {
                    self.global_config_path = Some(path.clone());
                    path
                }
                Err(_) => return Ok(GlobalConfig::default()),
            },
        };

        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply environment variable overrides
///
/// - SHADOWSTACK_STACK_MODE sets the stack mode of every permutation
/// - SHADOWSTACK_RECORD_FILE_NAMES / SHADOWSTACK_RECORD_LINE_NUMBERS set the record flags
fn apply_env_overrides(build: &mut BuildConfig) {
    if let Ok(mode) = env::var("SHADOWSTACK_STACK_MODE") {
        build.set_selection_everywhere(STACK_MODE_PROPERTY, &mode);
    }

    if let Ok(value) = env::var("SHADOWSTACK_RECORD_FILE_NAMES") {
        build.set_configuration(
            RECORD_FILE_NAMES_PROPERTY,
            PropertyValue::Bool(parse_flag(&value)),
        );
    }

    if let Ok(value) = env::var("SHADOWSTACK_RECORD_LINE_NUMBERS") {
        build.set_configuration(
            RECORD_LINE_NUMBERS_PROPERTY,
            PropertyValue::Bool(parse_flag(&value)),
        );
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

impl Config {
    /// Resolved properties for each permutation
    pub fn permutation_properties(&self) -> Vec<PermutationProperties> {
        self.build.permutation_properties()
    }

    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has shadowstack.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}
