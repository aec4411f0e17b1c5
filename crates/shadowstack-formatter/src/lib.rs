//! Shadowstack Formatter
//!
//! Prints program trees back as JavaScript text, so rewrites can be read and
//! compared as source.

mod formatter;
mod visitor;

pub use formatter::{FormatConfig, Formatter};

use shadowstack_core::ast::{Expr, Function, Program};
use shadowstack_core::symbol::ScopeTable;

/// Print a program with default configuration
pub fn format_program(program: &Program) -> String {
    format_program_with_config(program, &FormatConfig::default())
}

/// Print a program with custom configuration
pub fn format_program_with_config(program: &Program, config: &FormatConfig) -> String {
    Formatter::new(config.clone()).format(program)
}

/// Print one function with default configuration
pub fn format_function(scopes: &ScopeTable, function: &Function) -> String {
    Formatter::new(FormatConfig::default()).format_function(scopes, function)
}

/// Print one expression with default configuration
pub fn format_expr(scopes: &ScopeTable, expr: &Expr) -> String {
    Formatter::new(FormatConfig::default()).format_expr(scopes, expr)
}
