//! Formatter core - configuration and entry point

use serde::{Deserialize, Serialize};
use shadowstack_core::ast::{Expr, Function, Program, Stmt};
use shadowstack_core::symbol::ScopeTable;

use crate::visitor::PrintVisitor;

/// Formatter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatConfig {
    /// Number of spaces per indentation level (default: 2)
    pub indent_size: usize,
    /// Print identifiers by their short names (default: false)
    pub short_idents: bool,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            indent_size: 2,
            short_idents: false,
        }
    }
}

impl FormatConfig {
    /// Create config with custom indent size
    pub fn with_indent_size(mut self, size: usize) -> Self {
        self.indent_size = size;
        self
    }

    /// Create config printing short identifiers
    pub fn with_short_idents(mut self, enabled: bool) -> Self {
        self.short_idents = enabled;
        self
    }
}

/// Prints program trees as JavaScript text
pub struct Formatter {
    config: FormatConfig,
}

impl Formatter {
    pub fn new(config: FormatConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FormatConfig {
        &self.config
    }

    /// Print the global block, one statement per line
    pub fn format(&self, program: &Program) -> String {
        self.format_statements(&program.scopes, &program.global_block.statements)
    }

    pub fn format_statements(&self, scopes: &ScopeTable, statements: &[Stmt]) -> String {
        let mut visitor = PrintVisitor::new(self.config.clone(), scopes);
        for stmt in statements {
            visitor.visit_statement(stmt);
        }
        visitor.into_output()
    }

    pub fn format_function(&self, scopes: &ScopeTable, function: &Function) -> String {
        let visitor = PrintVisitor::new(self.config.clone(), scopes);
        let mut text = visitor.function_text(function);
        text.push('\n');
        text
    }

    /// Print a single expression without a trailing newline
    pub fn format_expr(&self, scopes: &ScopeTable, expr: &Expr) -> String {
        PrintVisitor::new(self.config.clone(), scopes).expr_text(expr)
    }
}
