//! Shadowstack Core - emulated call stacks for JavaScript-shaped programs
//!
//! This library provides:
//! - A program tree with scoped symbols and per-node source positions
//! - The stack emulation pass: entry/exit bookkeeping, catch resets and
//!   location recording
//! - A tree-walking interpreter used to observe the emulated stack at runtime

/// Shadowstack version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public API modules
pub mod ast;
pub mod builder;
pub mod emulator;
pub mod interpreter;
pub mod span;
pub mod symbol;
pub mod value;
pub mod visit;

// Re-export commonly used types
pub use ast::{Program, VersionedProgram, AST_VERSION, WRAP_FUNCTION_KEY};
pub use builder::Builder;
pub use emulator::{
    EmulationOptions, EmulationOutcome, EmulatorError, InstrumentationStats, ProcessNames,
    PropertyOracle, StackEmulator, StackMode,
};
pub use interpreter::{Interpreter, ShadowStackProbe, StackSnapshot};
pub use span::SourceInfo;
pub use symbol::{ScopeTable, SymbolId};
pub use value::{RuntimeError, Value};
