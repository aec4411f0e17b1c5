//! Shadowstack Configuration System
//!
//! Provides the build-property universe the stack emulation pass reads:
//! - Per-permutation selection properties (`[[permutation]]` tables)
//! - Shared configuration properties (`[configuration]` table)
//! - Global user defaults (~/.shadowstack/config.toml)
//! - Environment overrides (SHADOWSTACK_*)
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.shadowstack/config.toml)
//! 2. Project config (./shadowstack.toml)
//! 3. Environment variables (SHADOWSTACK_*)
//!
//! # Example
//!
//! ```no_run
//! use shadowstack_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! for permutation in config.build.permutation_properties() {
//!     println!("{:?}", permutation.selection_property("compiler.stackMode"));
//! }
//! ```

pub mod global;
pub mod loader;
pub mod properties;

use std::path::PathBuf;
use thiserror::Error;

/// Selection property choosing how stack traces are produced
pub const STACK_MODE_PROPERTY: &str = "compiler.stackMode";

/// Configuration property enabling file names in recorded locations
pub const RECORD_FILE_NAMES_PROPERTY: &str = "compiler.emulatedStack.recordFileNames";

/// Configuration property enabling line numbers in recorded locations
pub const RECORD_LINE_NUMBERS_PROPERTY: &str = "compiler.emulatedStack.recordLineNumbers";

/// Accepted values of [`STACK_MODE_PROPERTY`] (compared case-insensitively)
pub const STACK_MODE_VALUES: [&str; 3] = ["strip", "native", "emulated"];

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader};
pub use properties::{BuildConfig, Permutation, PermutationProperties, PropertyValue};
