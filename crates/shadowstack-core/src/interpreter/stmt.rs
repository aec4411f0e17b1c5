//! Statement execution

use super::{Abrupt, Completion, ControlFlow, Interpreter};
use crate::ast::{Block, Catch, ExprKind, ForInit, Stmt, StmtKind, TryStmt, VarDecl};
use crate::value::{Env, Value};

impl Interpreter<'_> {
    /// Execute statements until one completes abruptly
    pub(super) fn exec_statements(&mut self, statements: &[Stmt], env: &Env) -> Completion<ControlFlow> {
        for stmt in statements {
            let flow = self.exec_stmt(stmt, env)?;
            if flow != ControlFlow::None {
                return Ok(flow);
            }
        }
        Ok(ControlFlow::None)
    }

    fn exec_block(&mut self, block: &Block, env: &Env) -> Completion<ControlFlow> {
        self.exec_statements(&block.statements, env)
    }

    /// Execute a single statement
    pub(super) fn exec_stmt(&mut self, stmt: &Stmt, env: &Env) -> Completion<ControlFlow> {
        self.tick()?;

        match &stmt.kind {
            StmtKind::Expr(expr) => {
                // declarations were bound when the body was entered
                let declaration = matches!(
                    &expr.kind,
                    ExprKind::Function(function) if function.name.is_some()
                );
                if !declaration {
                    self.eval_expr(expr, env)?;
                }
                Ok(ControlFlow::None)
            }
            StmtKind::Vars(decls) => {
                self.exec_decls(decls, env)?;
                Ok(ControlFlow::None)
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Value::Undefined,
                };
                Ok(ControlFlow::Return(value))
            }
            StmtKind::Throw(expr) => {
                let value = self.eval_expr(expr, env)?;
                self.record_throw();
                Err(Abrupt::Throw(value, stmt.info.clone()))
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval_expr(cond, env)?.is_truthy() {
                    self.exec_stmt(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch, env)
                } else {
                    Ok(ControlFlow::None)
                }
            }
            StmtKind::While { .. }
            | StmtKind::DoWhile { .. }
            | StmtKind::For { .. }
            | StmtKind::ForIn { .. } => self.exec_loop(stmt, None, env),
            StmtKind::Block(block) => self.exec_block(block, env),
            StmtKind::Try(t) => self.exec_try(t, env),
            StmtKind::Labeled { label, body } => {
                let flow = if is_loop(body) {
                    self.exec_loop(body, Some(label), env)?
                } else {
                    self.exec_stmt(body, env)?
                };
                match flow {
                    ControlFlow::Break(Some(l)) if l == *label => Ok(ControlFlow::None),
                    other => Ok(other),
                }
            }
            StmtKind::Break(label) => Ok(ControlFlow::Break(label.clone())),
            StmtKind::Continue(label) => Ok(ControlFlow::Continue(label.clone())),
            StmtKind::Switch {
                discriminant,
                cases,
            } => {
                let value = self.eval_expr(discriminant, env)?;
                let mut start = None;
                for (i, case) in cases.iter().enumerate() {
                    if let Some(test) = &case.test {
                        if self.eval_expr(test, env)?.strict_equals(&value) {
                            start = Some(i);
                            break;
                        }
                    }
                }
                let start = start.or_else(|| cases.iter().position(|c| c.test.is_none()));

                if let Some(start) = start {
                    for case in &cases[start..] {
                        match self.exec_statements(&case.body, env)? {
                            ControlFlow::None => {}
                            ControlFlow::Break(None) => return Ok(ControlFlow::None),
                            other => return Ok(other),
                        }
                    }
                }
                Ok(ControlFlow::None)
            }
            StmtKind::Empty => Ok(ControlFlow::None),
        }
    }

    fn exec_decls(&mut self, decls: &[VarDecl], env: &Env) -> Completion<()> {
        for decl in decls {
            match &decl.init {
                Some(init) => {
                    let value = self.eval_expr(init, env)?;
                    if !env.set(decl.name, value.clone()) {
                        env.define(decl.name, value);
                    }
                }
                None => env.declare(decl.name),
            }
        }
        Ok(())
    }

    /// Run a loop; `label` is the label it carries, if any
    fn exec_loop(&mut self, stmt: &Stmt, label: Option<&str>, env: &Env) -> Completion<ControlFlow> {
        match &stmt.kind {
            StmtKind::While { cond, body } => {
                while self.eval_expr(cond, env)?.is_truthy() {
                    if let Some(flow) = loop_exit(self.exec_stmt(body, env)?, label) {
                        return Ok(flow);
                    }
                }
            }
            StmtKind::DoWhile { body, cond } => loop {
                if let Some(flow) = loop_exit(self.exec_stmt(body, env)?, label) {
                    return Ok(flow);
                }
                if !self.eval_expr(cond, env)?.is_truthy() {
                    break;
                }
            },
            StmtKind::For {
                init,
                cond,
                incr,
                body,
            } => {
                match init {
                    Some(ForInit::Vars(decls)) => self.exec_decls(decls, env)?,
                    Some(ForInit::Expr(expr)) => {
                        self.eval_expr(expr, env)?;
                    }
                    None => {}
                }
                loop {
                    if let Some(cond) = cond {
                        if !self.eval_expr(cond, env)?.is_truthy() {
                            break;
                        }
                    }
                    if let Some(flow) = loop_exit(self.exec_stmt(body, env)?, label) {
                        return Ok(flow);
                    }
                    if let Some(incr) = incr {
                        self.eval_expr(incr, env)?;
                    }
                }
            }
            StmtKind::ForIn {
                key, object, body, ..
            } => {
                let keys: Vec<String> = match self.eval_expr(object, env)? {
                    Value::Object(obj) => obj.borrow().properties.keys().cloned().collect(),
                    Value::Array(elements) => {
                        (0..elements.borrow().len()).map(|i| i.to_string()).collect()
                    }
                    _ => Vec::new(),
                };
                for k in keys {
                    if !env.set(*key, Value::string(&k)) {
                        env.define(*key, Value::string(&k));
                    }
                    if let Some(flow) = loop_exit(self.exec_stmt(body, env)?, label) {
                        return Ok(flow);
                    }
                }
            }
            _ => return self.exec_stmt(stmt, env),
        }
        Ok(ControlFlow::None)
    }

    fn exec_try(&mut self, t: &TryStmt, env: &Env) -> Completion<ControlFlow> {
        let mut result = self.exec_block(&t.try_block, env);

        if let Err(Abrupt::Throw(value, _)) = &result {
            if let Some(catch) = t.catches.first() {
                let value = value.clone();
                result = self.exec_catch(catch, value, env);
            }
        }

        match &t.finally {
            // faults are not exceptions; they skip finally blocks
            Some(_) if matches!(result, Err(Abrupt::Fault(_))) => result,
            Some(finally) => match self.exec_block(finally, env)? {
                ControlFlow::None => result,
                overriding => Ok(overriding),
            },
            None => result,
        }
    }

    fn exec_catch(&mut self, catch: &Catch, value: Value, env: &Env) -> Completion<ControlFlow> {
        let catch_env = env.child();
        catch_env.define(catch.param, value);
        self.exec_block(&catch.body, &catch_env)
    }
}

fn is_loop(stmt: &Stmt) -> bool {
    matches!(
        stmt.kind,
        StmtKind::While { .. }
            | StmtKind::DoWhile { .. }
            | StmtKind::For { .. }
            | StmtKind::ForIn { .. }
    )
}

/// Decide whether a loop stops after one iteration's completion
///
/// Returns the flow to propagate, or None to keep looping.
fn loop_exit(flow: ControlFlow, label: Option<&str>) -> Option<ControlFlow> {
    match flow {
        ControlFlow::None | ControlFlow::Continue(None) => None,
        ControlFlow::Continue(Some(l)) if Some(l.as_str()) == label => None,
        ControlFlow::Break(None) => Some(ControlFlow::None),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{BinaryOp, ForInit, PostfixOp, SwitchCase};
    use crate::builder::Builder;
    use crate::interpreter::Interpreter;
    use crate::value::{RuntimeError, Value};
    use pretty_assertions::assert_eq;

    fn run_and_read(b: Builder, global: &str) -> Value {
        let program = b.finish();
        let mut interp = Interpreter::new(&program);
        interp.run().expect("program should run");
        interp.global(global).expect("global should be defined")
    }

    #[test]
    fn test_for_loop_accumulates() {
        let mut b = Builder::new("a.js");
        let sum = b.global("sum");
        let i = b.global("i");
        let zero = b.num(0.0);
        b.push(b.var_stmt(sum, Some(zero)));

        let init = ForInit::Vars(b.decls(vec![(i, Some(b.num(0.0)))]));
        let cond = b.binary(BinaryOp::Lt, b.name(i), b.num(4.0));
        let incr = b.postfix(PostfixOp::Inc, b.name(i));
        let body = b.expr_stmt(b.binary(BinaryOp::AddAssign, b.name(sum), b.name(i)));
        b.push(b.for_stmt(Some(init), Some(cond), Some(incr), body));

        assert_eq!(run_and_read(b, "sum"), Value::Number(6.0));
    }

    #[test]
    fn test_labeled_continue_skips_outer_iteration() {
        let mut b = Builder::new("a.js");
        let count = b.global("count");
        let i = b.global("i");
        let j = b.global("j");
        b.push(b.var_stmt(count, Some(b.num(0.0))));

        // outer: for (i = 0; i < 3; i++) for (j = 0; j < 3; j++) { count++; continue outer; }
        let inner_body = b.block(vec![
            b.expr_stmt(b.postfix(PostfixOp::Inc, b.name(count))),
            b.continue_stmt(Some("outer")),
        ]);
        let inner = b.for_stmt(
            Some(ForInit::Expr(b.assign(b.name(j), b.num(0.0)))),
            Some(b.binary(BinaryOp::Lt, b.name(j), b.num(3.0))),
            Some(b.postfix(PostfixOp::Inc, b.name(j))),
            inner_body,
        );
        let outer = b.for_stmt(
            Some(ForInit::Expr(b.assign(b.name(i), b.num(0.0)))),
            Some(b.binary(BinaryOp::Lt, b.name(i), b.num(3.0))),
            Some(b.postfix(PostfixOp::Inc, b.name(i))),
            inner,
        );
        b.push(b.labeled("outer", outer));

        assert_eq!(run_and_read(b, "count"), Value::Number(3.0));
    }

    #[test]
    fn test_switch_falls_through_to_break() {
        let mut b = Builder::new("a.js");
        let out = b.global("out");
        b.push(b.var_stmt(out, Some(b.string(""))));

        let append = |b: &Builder, s: &str| {
            b.expr_stmt(b.binary(BinaryOp::AddAssign, b.name(out), b.string(s)))
        };
        let cases = vec![
            SwitchCase {
                test: Some(b.num(1.0)),
                body: vec![append(&b, "a")],
            },
            SwitchCase {
                test: Some(b.num(2.0)),
                body: vec![append(&b, "b")],
            },
            SwitchCase {
                test: None,
                body: vec![append(&b, "c"), b.break_stmt(None)],
            },
            SwitchCase {
                test: Some(b.num(3.0)),
                body: vec![append(&b, "d")],
            },
        ];
        b.push(b.switch_stmt(b.num(2.0), cases));

        assert_eq!(run_and_read(b, "out"), Value::string("bc"));
    }

    #[test]
    fn test_finally_runs_after_catch() {
        let mut b = Builder::new("a.js");
        let log = b.global("log");
        b.push(b.var_stmt(log, Some(b.string(""))));

        let catch = b.catch_clause("e", |b, e| {
            vec![b.expr_stmt(b.binary(BinaryOp::AddAssign, b.name(log), b.name(e)))]
        });
        let finally = vec![b.expr_stmt(b.binary(
            BinaryOp::AddAssign,
            b.name(log),
            b.string("!"),
        ))];
        b.push(b.try_stmt(
            vec![b.throw_stmt(b.string("boom"))],
            vec![catch],
            Some(finally),
        ));

        assert_eq!(run_and_read(b, "log"), Value::string("boom!"));
    }

    #[test]
    fn test_finally_return_overrides_throw() {
        let mut b = Builder::new("a.js");
        let (_, decl) = b.function_decl("f", &[], |b, _| {
            vec![b.try_stmt(
                vec![b.throw_stmt(b.string("lost"))],
                vec![],
                Some(vec![b.return_stmt(Some(b.num(7.0)))]),
            )]
        });
        b.push(decl);
        let program = b.finish();

        let mut interp = Interpreter::new(&program);
        interp.run().expect("declarations only");
        assert_eq!(interp.call_global("f", vec![]), Ok(Value::Number(7.0)));
    }

    #[test]
    fn test_uncaught_throw_reports_location() {
        let mut b = Builder::new("Main.java");
        b.at_line(12);
        b.push(b.throw_stmt(b.string("bad")));
        let program = b.finish();

        let mut interp = Interpreter::new(&program);
        match interp.run() {
            Err(RuntimeError::UncaughtException { message, info }) => {
                assert_eq!(message, "bad");
                assert_eq!(info.line, 12);
            }
            other => panic!("expected uncaught exception, got {:?}", other),
        }
    }

    #[test]
    fn test_step_limit_stops_infinite_loop() {
        let mut b = Builder::new("a.js");
        b.push(b.while_stmt(b.boolean(true), b.empty()));
        let program = b.finish();

        let mut interp = Interpreter::new(&program).with_step_limit(100);
        assert_eq!(interp.run(), Err(RuntimeError::StepLimit { limit: 100 }));
    }

    #[test]
    fn test_for_in_visits_object_keys() {
        let mut b = Builder::new("a.js");
        let keys = b.global("keys");
        let k = b.global("k");
        b.push(b.var_stmt(keys, Some(b.string(""))));
        let object = b.object(vec![("x", b.num(1.0)), ("y", b.num(2.0))]);
        let body = b.expr_stmt(b.binary(BinaryOp::AddAssign, b.name(keys), b.name(k)));
        b.push(b.for_in_stmt(k, object, body));

        assert_eq!(run_and_read(b, "keys"), Value::string("xy"));
    }

    #[test]
    fn test_out_of_range_array_keys_are_plain_properties() {
        let mut b = Builder::new("a.js");
        let a = b.global("a");
        let len = b.global("len");
        b.push(b.var_stmt(a, Some(b.array(vec![]))));
        for key in [b.string("18446744073709551615"), b.num(4294967296.0), b.num(4294967295.0)] {
            let slot = b.index(b.name(a), key);
            b.push(b.expr_stmt(b.assign(slot, b.num(1.0))));
        }
        let last = b.index(b.name(a), b.num(2.0));
        b.push(b.expr_stmt(b.assign(last, b.num(1.0))));
        b.push(b.var_stmt(len, Some(b.prop(b.name(a), "length"))));

        assert_eq!(run_and_read(b, "len"), Value::Number(3.0));
    }

    #[test]
    fn test_huge_array_index_spends_step_budget() {
        let mut b = Builder::new("a.js");
        let a = b.global("a");
        b.push(b.var_stmt(a, Some(b.array(vec![]))));
        let slot = b.index(b.name(a), b.num(4294967294.0));
        b.push(b.expr_stmt(b.assign(slot, b.num(1.0))));
        let program = b.finish();

        let mut interp = Interpreter::new(&program).with_step_limit(1000);
        assert_eq!(interp.run(), Err(RuntimeError::StepLimit { limit: 1000 }));
    }

    #[test]
    fn test_invalid_array_length_throws_range_error() {
        let mut b = Builder::new("a.js");
        let a = b.global("a");
        b.push(b.var_stmt(a, Some(b.array(vec![]))));
        let length = b.prop(b.name(a), "length");
        b.push(b.expr_stmt(b.assign(length, b.num(1e12))));
        let program = b.finish();

        let mut interp = Interpreter::new(&program);
        match interp.run() {
            Err(RuntimeError::UncaughtException { message, .. }) => {
                assert!(message.starts_with("RangeError: Invalid array length"), "{}", message);
            }
            other => panic!("expected RangeError, got {:?}", other),
        }
    }
}
