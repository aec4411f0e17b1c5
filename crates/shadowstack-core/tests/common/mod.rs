//! Shared test utilities
//!
//! Helpers for building, instrumenting, printing and running programs so the
//! individual tests read as "source in, source out".

#![allow(dead_code)]

use shadowstack_config::{Permutation, PermutationProperties, STACK_MODE_PROPERTY};
use shadowstack_core::ast::{ExprKind, Function, Program, StmtKind};
use shadowstack_core::builder::Builder;
use shadowstack_core::emulator::{EmulationOptions, EmulationOutcome, StackEmulator};
use shadowstack_core::interpreter::{Interpreter, ShadowStackProbe, StackSnapshot};
use shadowstack_core::value::{RuntimeError, Value};
use std::collections::BTreeMap;

// Re-export testing utilities
pub use pretty_assertions::{assert_eq, assert_ne};

/// Builder with `Exceptions.wrap` already defined
pub fn builder(file: &str) -> Builder {
    let mut b = Builder::new(file);
    b.define_wrap_function();
    b
}

/// Instrument without location recording
pub fn emulate(program: &mut Program) -> EmulationOutcome {
    emulate_with(program, EmulationOptions::default())
}

pub fn emulate_with(program: &mut Program, options: EmulationOptions) -> EmulationOutcome {
    StackEmulator::new(options).run(program)
}

/// Top-level function declaration named `name`
pub fn find_function<'p>(program: &'p Program, name: &str) -> &'p Function {
    program
        .global_block
        .statements
        .iter()
        .find_map(|stmt| match &stmt.kind {
            StmtKind::Expr(expr) => match &expr.kind {
                ExprKind::Function(function)
                    if function.name.map(|n| program.scopes.ident(n)) == Some(name) =>
                {
                    Some(function.as_ref())
                }
                _ => None,
            },
            _ => None,
        })
        .unwrap_or_else(|| panic!("no function named {}", name))
}

/// Print one top-level function as JavaScript
pub fn print_function(program: &Program, name: &str) -> String {
    shadowstack_formatter::format_function(&program.scopes, find_function(program, name))
}

pub fn print(program: &Program) -> String {
    shadowstack_formatter::format_program(program)
}

/// Run the global code, then call `entry`; returns the snapshots taken at
/// each throw and the stack as it is afterwards
pub fn run_instrumented(
    program: &Program,
    outcome: &EmulationOutcome,
    entry: &str,
) -> (Result<Value, RuntimeError>, Vec<StackSnapshot>, Option<StackSnapshot>) {
    let names = outcome.names.as_ref().expect("program was instrumented");
    let mut interp = Interpreter::new(program).with_probe(ShadowStackProbe::new(names));
    interp.run().expect("global code runs");
    let result = interp.call_global(entry, vec![]);
    (result, interp.snapshots().to_vec(), interp.probe_now())
}

/// Run the global code, call `entry`, and read a global afterwards
pub fn run_and_read(program: &Program, entry: &str, global: &str) -> (Result<Value, RuntimeError>, Option<Value>) {
    let mut interp = Interpreter::new(program);
    interp.run().expect("global code runs");
    let result = interp.call_global(entry, vec![]);
    (result, interp.global(global))
}

/// Permutation properties with the given stack mode and configuration
pub fn oracle(mode: Option<&str>, configuration: &[(&str, &str)]) -> PermutationProperties {
    let selection = match mode {
        Some(mode) => Permutation::from_pairs([(STACK_MODE_PROPERTY, mode)]).selection,
        None => BTreeMap::new(),
    };
    let configuration = configuration
        .iter()
        .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
        .collect();
    PermutationProperties::new(selection, configuration)
}
