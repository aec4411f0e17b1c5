//! Location recording
//!
//! While a function is rewritten, every finished expression that can change
//! control flow is offered to an [`ExprHook`]. [`LocationRecorder`] wraps it
//! so the current frame's slot in the location array is updated first:
//!
//! ```text
//! foo(x)  =>  ($es_location[$es_stackIndex] = "Foo.java:" + "42", foo(x))
//! ```
//!
//! The recorder remembers the last location it emitted and skips nodes on
//! the same line, so a statement usually costs a single assignment. Loops
//! reset that memory before each condition and increment, since control
//! reaches them from more than one place.

use super::names::FunctionLocals;
use crate::ast::{BinaryOp, Expr};
use crate::span::SourceInfo;
use crate::symbol::{ScopeTable, SymbolId};

/// How an expression is used by its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprContext {
    /// Evaluated for its value
    Value,
    /// Written to: assignment target, operand of `++`, `--` or `delete`
    Lvalue,
    /// Must stay a reference: callee of an invocation, operand of `typeof`
    Reference,
}

/// Expression rewriting plugged into the entry/exit rewrite
pub trait ExprHook {
    /// Whether the rewriter needs to offer expressions at all
    const ENABLED: bool;

    /// Forget the last recorded location
    fn reset(&mut self) {}

    /// Offer a candidate whose children are already rewritten
    fn record(
        &mut self,
        expr: Expr,
        context: ExprContext,
        locals: &mut FunctionLocals,
        scopes: &mut ScopeTable,
    ) -> Expr;

    /// Number of expressions rewritten so far
    fn recorded(&self) -> usize {
        0
    }
}

/// Entry/exit instrumentation only
pub struct NoLocations;

impl ExprHook for NoLocations {
    const ENABLED: bool = false;

    fn record(
        &mut self,
        expr: Expr,
        _context: ExprContext,
        _locals: &mut FunctionLocals,
        _scopes: &mut ScopeTable,
    ) -> Expr {
        expr
    }
}

/// Records `file:line` (or just `line`) before potentially-throwing expressions
pub struct LocationRecorder {
    location: SymbolId,
    record_file_names: bool,
    last_file: String,
    last_line: Option<u32>,
    recorded: usize,
}

impl LocationRecorder {
    pub fn new(location: SymbolId, record_file_names: bool) -> Self {
        Self {
            location,
            record_file_names,
            last_file: String::new(),
            last_line: None,
            recorded: 0,
        }
    }

    fn is_last_location(&self, info: &SourceInfo) -> bool {
        self.last_line == Some(info.line)
            && (!self.record_file_names || info.file == self.last_file)
    }

    /// `"line"` or `"base:" + "line"`
    fn location_value(&self, info: &SourceInfo) -> Expr {
        let line = Expr::string(info.line.to_string(), info.clone());
        if self.record_file_names {
            let file = Expr::string(format!("{}:", info.base_name()), info.clone());
            Expr::binary(BinaryOp::Add, file, line, info.clone())
        } else {
            line
        }
    }
}

impl ExprHook for LocationRecorder {
    const ENABLED: bool = true;

    fn reset(&mut self) {
        self.last_file.clear();
        self.last_line = None;
    }

    fn record(
        &mut self,
        expr: Expr,
        context: ExprContext,
        locals: &mut FunctionLocals,
        scopes: &mut ScopeTable,
    ) -> Expr {
        if context != ExprContext::Value
            || expr.info.is_synthetic()
            || self.is_last_location(&expr.info)
        {
            return expr;
        }

        let info = expr.info.clone();
        self.last_line = Some(info.line);
        if self.record_file_names {
            self.last_file.clone_from(&info.file);
        }

        let index = locals.frame_index_var(scopes);
        let slot = Expr::index(
            Expr::name(self.location, info.clone()),
            Expr::name(index, info.clone()),
            info.clone(),
        );
        let update = Expr::assign(slot, self.location_value(&info), info.clone());
        self.recorded += 1;
        Expr::comma(update, expr, info)
    }

    fn recorded(&self) -> usize {
        self.recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, Literal};
    use crate::symbol::ScopeKind;

    fn setup() -> (ScopeTable, FunctionLocals, SymbolId) {
        let mut scopes = ScopeTable::new();
        let program = scopes.program();
        let location = scopes.declare(program, "$es_location");
        let f = scopes.new_scope(ScopeKind::Function, program);
        (scopes, FunctionLocals::new(f, SourceInfo::synthetic()), location)
    }

    #[test]
    fn test_same_line_recorded_once() {
        let (mut scopes, mut locals, location) = setup();
        let x = scopes.declare(scopes.program(), "x");
        let mut recorder = LocationRecorder::new(location, false);
        let info = SourceInfo::new("a/Foo.java", 4);

        let first = recorder.record(Expr::name(x, info.clone()), ExprContext::Value, &mut locals, &mut scopes);
        let second = recorder.record(Expr::name(x, info.clone()), ExprContext::Value, &mut locals, &mut scopes);

        assert!(matches!(first.kind, ExprKind::Binary { op: BinaryOp::Comma, .. }));
        assert_eq!(second, Expr::name(x, info));
        assert_eq!(recorder.recorded(), 1);

        recorder.reset();
        let third = recorder.record(second, ExprContext::Value, &mut locals, &mut scopes);
        assert!(matches!(third.kind, ExprKind::Binary { op: BinaryOp::Comma, .. }));
    }

    #[test]
    fn test_lvalue_and_reference_untouched() {
        let (mut scopes, mut locals, location) = setup();
        let x = scopes.declare(scopes.program(), "x");
        let mut recorder = LocationRecorder::new(location, false);
        let expr = Expr::name(x, SourceInfo::new("a.js", 9));

        for context in [ExprContext::Lvalue, ExprContext::Reference] {
            let out = recorder.record(expr.clone(), context, &mut locals, &mut scopes);
            assert_eq!(out, expr);
        }
        assert_eq!(recorder.recorded(), 0);
    }

    #[test]
    fn test_file_name_prefix_uses_base_name() {
        let (_, _, location) = setup();
        let recorder = LocationRecorder::new(location, true);
        let value = recorder.location_value(&SourceInfo::new("com/example/Foo.java", 42));

        match value.kind {
            ExprKind::Binary {
                op: BinaryOp::Add,
                left,
                right,
            } => {
                assert_eq!(left.kind, ExprKind::Literal(Literal::String("Foo.java:".into())));
                assert_eq!(right.kind, ExprKind::Literal(Literal::String("42".into())));
            }
            other => panic!("expected concatenation, got {:?}", other),
        }
    }

    #[test]
    fn test_file_change_on_same_line_records_again() {
        let (mut scopes, mut locals, location) = setup();
        let x = scopes.declare(scopes.program(), "x");
        let mut recorder = LocationRecorder::new(location, true);

        recorder.record(Expr::name(x, SourceInfo::new("A.java", 1)), ExprContext::Value, &mut locals, &mut scopes);
        recorder.record(Expr::name(x, SourceInfo::new("B.java", 1)), ExprContext::Value, &mut locals, &mut scopes);
        assert_eq!(recorder.recorded(), 2);
    }
}
