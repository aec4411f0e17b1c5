//! Build Properties (shadowstack.toml)
//!
//! A build is compiled once per permutation. Each permutation fixes one value
//! for every selection property; configuration properties are shared by all
//! permutations of the build.

use crate::{
    ConfigError, ConfigResult, RECORD_FILE_NAMES_PROPERTY, RECORD_LINE_NUMBERS_PROPERTY,
    STACK_MODE_PROPERTY, STACK_MODE_VALUES,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Build configuration from shadowstack.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Configuration properties shared by every permutation
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub configuration: BTreeMap<String, PropertyValue>,

    /// Permutations compiled together, in declaration order
    #[serde(default, rename = "permutation")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub permutations: Vec<Permutation>,
}

/// Value of a configuration property
///
/// Accepts `true`, `"text"` or `["a", "b"]` in TOML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Text(String),
    List(Vec<String>),
}

impl PropertyValue {
    /// All values of the property as strings
    pub fn values(&self) -> Vec<String> {
        match self {
            PropertyValue::Bool(b) => vec![b.to_string()],
            PropertyValue::Text(s) => vec![s.clone()],
            PropertyValue::List(items) => items.clone(),
        }
    }
}

/// One permutation: a fixed value for each selection property
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct Permutation {
    pub selection: BTreeMap<String, String>,
}

impl Permutation {
    /// Build a permutation from `(name, value)` pairs
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            selection: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Resolved view of one permutation's properties
///
/// Combines the permutation's selection properties with the build's shared
/// configuration properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PermutationProperties {
    selection: BTreeMap<String, String>,
    configuration: BTreeMap<String, Vec<String>>,
}

impl PermutationProperties {
    pub fn new(
        selection: BTreeMap<String, String>,
        configuration: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            selection,
            configuration,
        }
    }

    /// Current value of a selection property
    pub fn selection_property(&self, name: &str) -> Option<&str> {
        self.selection.get(name).map(String::as_str)
    }

    /// Values of a configuration property
    pub fn configuration_property(&self, name: &str) -> Option<&[String]> {
        self.configuration.get(name).map(Vec::as_slice)
    }
}

impl BuildConfig {
    /// Load build configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        Self::parse(&content, path)
    }

    /// Parse build configuration from TOML text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Self::parse(content, Path::new("<inline>"))
    }

    fn parse(content: &str, origin: &Path) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: PathBuf::from(origin),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate property values the stack emulator understands
    pub fn validate(&self) -> ConfigResult<()> {
        for (index, permutation) in self.permutations.iter().enumerate() {
            if let Some(mode) = permutation.selection.get(STACK_MODE_PROPERTY) {
                let lowered = mode.to_lowercase();
                if !STACK_MODE_VALUES.contains(&lowered.as_str()) {
                    return Err(ConfigError::InvalidValue {
                        field: format!("permutation[{}].{}", index, STACK_MODE_PROPERTY),
                        reason: format!(
                            "'{}' is not one of {}",
                            mode,
                            STACK_MODE_VALUES.join(", ")
                        ),
                    });
                }
            }
        }

        for name in [RECORD_FILE_NAMES_PROPERTY, RECORD_LINE_NUMBERS_PROPERTY] {
            let Some(value) = self.configuration.get(name) else {
                continue;
            };
            let values = value.values();
            if values.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: name.to_string(),
                    reason: "expected at least one value".to_string(),
                });
            }
            for v in &values {
                if !is_boolean(v) {
                    return Err(ConfigError::InvalidValue {
                        field: name.to_string(),
                        reason: format!("'{}' is not a boolean", v),
                    });
                }
            }
        }

        Ok(())
    }

    /// Merge another build config into this one
    ///
    /// Configuration properties from `other` override ours key by key; a
    /// non-empty permutation list in `other` replaces ours.
    pub fn merge(&mut self, other: &BuildConfig) {
        for (name, value) in &other.configuration {
            self.configuration.insert(name.clone(), value.clone());
        }
        if !other.permutations.is_empty() {
            self.permutations = other.permutations.clone();
        }
    }

    /// Set a configuration property
    pub fn set_configuration(&mut self, name: &str, value: PropertyValue) {
        self.configuration.insert(name.to_string(), value);
    }

    /// Set a selection property on every permutation
    ///
    /// Creates a single permutation when none is declared.
    pub fn set_selection_everywhere(&mut self, name: &str, value: &str) {
        if self.permutations.is_empty() {
            self.permutations.push(Permutation::default());
        }
        for permutation in &mut self.permutations {
            permutation
                .selection
                .insert(name.to_string(), value.to_string());
        }
    }

    /// Resolved properties for each permutation, in declaration order
    pub fn permutation_properties(&self) -> Vec<PermutationProperties> {
        let configuration: BTreeMap<String, Vec<String>> = self
            .configuration
            .iter()
            .map(|(k, v)| (k.clone(), v.values()))
            .collect();

        self.permutations
            .iter()
            .map(|p| PermutationProperties::new(p.selection.clone(), configuration.clone()))
            .collect()
    }
}

fn is_boolean(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "false")
}
