//! Stack mode resolution
//!
//! The pass only runs when every permutation agrees on
//! `compiler.stackMode = emulated`. Recording options are read from the
//! configuration properties of the first permutation.

use super::EmulatorError;
use shadowstack_config::{
    PermutationProperties, RECORD_FILE_NAMES_PROPERTY, RECORD_LINE_NUMBERS_PROPERTY,
    STACK_MODE_PROPERTY,
};
use std::fmt;
use std::str::FromStr;

/// How stack traces are produced in the compiled output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackMode {
    /// No stack information at all
    Strip,
    /// Rely on the runtime's native stack
    Native,
    /// Maintain an emulated call stack in program variables
    Emulated,
}

impl FromStr for StackMode {
    type Err = EmulatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "strip" => Ok(StackMode::Strip),
            "native" => Ok(StackMode::Native),
            "emulated" => Ok(StackMode::Emulated),
            _ => Err(EmulatorError::InvalidStackMode {
                property: STACK_MODE_PROPERTY.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for StackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StackMode::Strip => "strip",
            StackMode::Native => "native",
            StackMode::Emulated => "emulated",
        };
        f.write_str(name)
    }
}

/// Build properties of one permutation
pub trait PropertyOracle {
    /// Current value of a selection (deferred-binding) property
    fn selection_property(&self, name: &str) -> Option<&str>;

    /// Values of a configuration property
    fn configuration_property(&self, name: &str) -> Option<&[String]>;
}

impl PropertyOracle for PermutationProperties {
    fn selection_property(&self, name: &str) -> Option<&str> {
        PermutationProperties::selection_property(self, name)
    }

    fn configuration_property(&self, name: &str) -> Option<&[String]> {
        PermutationProperties::configuration_property(self, name)
    }
}

/// Determine the stack mode shared by all permutations
///
/// The first oracle must define the property. Later oracles may leave it
/// undefined, but any value they do define must match the first.
pub fn resolve_stack_mode<O: PropertyOracle>(oracles: &[O]) -> Result<StackMode, EmulatorError> {
    let first = oracles.first().ok_or(EmulatorError::NoPermutations)?;
    let value = first
        .selection_property(STACK_MODE_PROPERTY)
        .ok_or_else(|| EmulatorError::MissingProperty {
            property: STACK_MODE_PROPERTY.to_string(),
        })?;
    let mode = value.parse::<StackMode>()?;

    for oracle in &oracles[1..] {
        match oracle.selection_property(STACK_MODE_PROPERTY) {
            Some(other) if other != value => {
                return Err(EmulatorError::InconsistentProperty {
                    property: STACK_MODE_PROPERTY.to_string(),
                    first: value.to_string(),
                    other: other.to_string(),
                });
            }
            _ => {}
        }
    }

    Ok(mode)
}

/// Location recording options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmulationOptions {
    /// Prefix recorded locations with the source file's base name
    pub record_file_names: bool,
    /// Record the line of each potentially-throwing expression
    pub record_line_numbers: bool,
}

impl EmulationOptions {
    /// Read the recording flags; file names imply line numbers
    pub fn new(record_file_names: bool, record_line_numbers: bool) -> Self {
        Self {
            record_file_names,
            record_line_numbers: record_file_names || record_line_numbers,
        }
    }

    pub fn from_oracle<O: PropertyOracle + ?Sized>(oracle: &O) -> Self {
        let file_names = read_flag(oracle, RECORD_FILE_NAMES_PROPERTY);
        let line_numbers = read_flag(oracle, RECORD_LINE_NUMBERS_PROPERTY);
        Self::new(file_names, line_numbers)
    }
}

fn read_flag<O: PropertyOracle + ?Sized>(oracle: &O, property: &str) -> bool {
    match oracle
        .configuration_property(property)
        .and_then(|values| values.first())
    {
        Some(value) => value.eq_ignore_ascii_case("true"),
        None => {
            log::warn!("configuration property {} is not defined; assuming false", property);
            false
        }
    }
}
