//! Emulated call-stack instrumentation
//!
//! Rewrites a program so it maintains its own call stack, for targets where
//! the native stack is unavailable or useless:
//! - **Entry/exit**: every function pushes its frame on entry and pops it on
//!   every way out, `try/finally` and early returns included
//! - **Catch reset**: catching frames restore the depth after `wrap(e)`
//! - **Locations**: optionally, the line (and file) of the last
//!   potentially-throwing expression of every frame
//!
//! # Usage
//!
//! ```
//! use shadowstack_core::builder::Builder;
//! use shadowstack_core::emulator::{EmulationOptions, StackEmulator};
//!
//! let mut b = Builder::new("Main.java");
//! b.define_wrap_function();
//! let mut program = b.finish();
//!
//! let outcome = StackEmulator::new(EmulationOptions::default()).run(&mut program);
//! assert!(outcome.names.is_some());
//! ```

pub mod entry_exit;
pub mod location;
pub mod mode;
pub mod names;
pub mod substitute;

pub use location::{ExprContext, ExprHook, LocationRecorder, NoLocations};
pub use mode::{resolve_stack_mode, EmulationOptions, PropertyOracle, StackMode};
pub use names::{FinallyId, FunctionLocals, ProcessNames, ReservedRole, ReservedSymbols};

use crate::ast::{Program, WRAP_FUNCTION_KEY};
use thiserror::Error;

/// Fatal build-configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmulatorError {
    #[error("no permutations to resolve the stack mode for")]
    NoPermutations,

    #[error("expected property {property} not defined")]
    MissingProperty { property: String },

    #[error("invalid value '{value}' for {property}; expected strip, native or emulated")]
    InvalidStackMode { property: String, value: String },

    #[error("{property} has multiple values: '{first}' and '{other}'")]
    InconsistentProperty {
        property: String,
        first: String,
        other: String,
    },
}

// ============================================================================
// Public API: InstrumentationStats
// ============================================================================

/// Statistics collected during an instrumentation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentationStats {
    /// Functions that received entry/exit code
    pub functions_instrumented: usize,
    /// Empty or immortal functions left untouched
    pub functions_skipped: usize,
    /// Pop statements and guarded pops inserted
    pub pops_inserted: usize,
    /// Catch clauses synthesized for catch-less `try/finally`
    pub synthetic_catches: usize,
    /// Early-exit flags allocated
    pub early_exit_flags: usize,
    /// Depth resets inserted after `wrap(e)`
    pub catch_resets: usize,
    /// Expressions wrapped with a location update
    pub locations_recorded: usize,
    /// Reserved-name references redirected to process variables
    pub reserved_refs_substituted: usize,
}

impl InstrumentationStats {
    pub fn new() -> Self {
        Default::default()
    }

    /// Total number of synthesized insertions
    pub fn total_insertions(&self) -> usize {
        self.pops_inserted + self.synthetic_catches + self.catch_resets + self.locations_recorded
    }

    /// Merge another stats object into this one (sum all counts)
    pub fn merge(&mut self, other: &InstrumentationStats) {
        self.functions_instrumented += other.functions_instrumented;
        self.functions_skipped += other.functions_skipped;
        self.pops_inserted += other.pops_inserted;
        self.synthetic_catches += other.synthetic_catches;
        self.early_exit_flags += other.early_exit_flags;
        self.catch_resets += other.catch_resets;
        self.locations_recorded += other.locations_recorded;
        self.reserved_refs_substituted += other.reserved_refs_substituted;
    }
}

// ============================================================================
// Public API: StackEmulator
// ============================================================================

/// Result of running the pass
#[derive(Debug, Clone, PartialEq)]
pub struct EmulationOutcome {
    /// Resolved stack mode
    pub mode: StackMode,
    /// Process variables, when the program was instrumented
    pub names: Option<ProcessNames>,
    pub stats: InstrumentationStats,
}

impl EmulationOutcome {
    fn untouched(mode: StackMode) -> Self {
        Self {
            mode,
            names: None,
            stats: InstrumentationStats::new(),
        }
    }

    pub fn instrumented(&self) -> bool {
        self.names.is_some()
    }
}

/// The stack emulation pass
pub struct StackEmulator {
    options: EmulationOptions,
}

impl StackEmulator {
    pub fn new(options: EmulationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EmulationOptions {
        &self.options
    }

    /// Resolve the stack mode from the permutations and, when it is
    /// `emulated`, instrument the program
    pub fn exec<O: PropertyOracle>(
        program: &mut Program,
        oracles: &[O],
    ) -> Result<EmulationOutcome, EmulatorError> {
        let mode = resolve_stack_mode(oracles)?;
        log::info!("stack mode resolved to {}", mode);
        if mode != StackMode::Emulated {
            return Ok(EmulationOutcome::untouched(mode));
        }

        let first = oracles.first().ok_or(EmulatorError::NoPermutations)?;
        let options = EmulationOptions::from_oracle(first);
        Ok(Self::new(options).run(program))
    }

    /// Instrument the program with these options
    ///
    /// Without an indexed `Exceptions.wrap` function nothing can be caught,
    /// so the program is left as is.
    pub fn run(&self, program: &mut Program) -> EmulationOutcome {
        let Some(wrap) = program.indexed_function(WRAP_FUNCTION_KEY) else {
            log::info!("no {} function indexed; stack emulation skipped", WRAP_FUNCTION_KEY);
            return EmulationOutcome::untouched(StackMode::Emulated);
        };

        let reserved = ReservedSymbols::resolve(&program.scopes);
        let with_location = self.options.record_line_numbers
            || substitute::references_role(program, &reserved, ReservedRole::Location);
        let names = ProcessNames::allocate(&mut program.scopes, with_location);
        names.declare_in(&mut program.global_block);

        let mut stats = InstrumentationStats::new();
        stats.reserved_refs_substituted =
            substitute::substitute_reserved_names(program, &reserved, &names);
        stats.merge(&entry_exit::instrument_functions(
            program,
            &names,
            wrap,
            &self.options,
        ));

        log::info!(
            "stack emulation: {} functions instrumented, {} skipped, {} pops, {} locations",
            stats.functions_instrumented,
            stats.functions_skipped,
            stats.pops_inserted,
            stats.locations_recorded
        );

        EmulationOutcome {
            mode: StackMode::Emulated,
            names: Some(names),
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_merge() {
        let mut a = InstrumentationStats {
            pops_inserted: 2,
            catch_resets: 1,
            ..Default::default()
        };
        let b = InstrumentationStats {
            pops_inserted: 3,
            locations_recorded: 4,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.pops_inserted, 5);
        assert_eq!(a.total_insertions(), 10);
    }

    #[test]
    fn test_error_messages() {
        let err = EmulatorError::MissingProperty {
            property: "compiler.stackMode".into(),
        };
        assert_eq!(err.to_string(), "expected property compiler.stackMode not defined");
    }
}
