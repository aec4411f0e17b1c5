//! Function entry/exit instrumentation
//!
//! Rewrites one function so that every way out of it pops exactly the frame
//! its entry pushed:
//!
//! ```text
//! function foo() {                     function foo() {
//!   var x = bar();                       var x = bar(), $es_stackIndex;
//!   if (x) return x.y;          =>       $es_stack[$es_stackIndex = ++$es_stackDepth] = foo;
//!   baz();                               if (x) {
//! }                                        $es_returnTemp = x.y;
//!                                          $es_stackDepth = $es_stackIndex - 1;
//!                                          return $es_returnTemp;
//!                                        }
//!                                        baz();
//!                                        $es_stackDepth = $es_stackIndex - 1;
//!                                      }
//! ```
//!
//! Returns inside the outermost `try/finally` set an early-exit flag instead
//! and the finally block pops when the flag is set. Exceptions are handled by
//! the catching frame: after `e = wrap(e)` in any catch body the depth is
//! reset to that frame's index. A catch-less outermost `try/finally` gets a
//! synthesized catch so the reset also happens on that path.

use super::location::{ExprContext, ExprHook, LocationRecorder, NoLocations};
use super::mode::EmulationOptions;
use super::names::{FinallyId, FunctionLocals, ProcessNames};
use super::InstrumentationStats;
use crate::ast::*;
use crate::span::SourceInfo;
use crate::symbol::{ScopeTable, SymbolId};
use crate::visit::{walk_function_mut, VisitorMut};
use std::collections::BTreeSet;

/// Instrument every function of a program, innermost first
pub(crate) fn instrument_functions(
    program: &mut Program,
    names: &ProcessNames,
    wrap: SymbolId,
    options: &EmulationOptions,
) -> InstrumentationStats {
    let Program {
        global_block,
        scopes,
        immortal_functions,
        ..
    } = program;

    let mut instrumenter = InstrumentAll {
        scopes,
        immortal: immortal_functions,
        names,
        wrap,
        options,
        stats: InstrumentationStats::new(),
    };
    instrumenter.visit_block_mut(global_block);
    instrumenter.stats
}

struct InstrumentAll<'a> {
    scopes: &'a mut ScopeTable,
    immortal: &'a BTreeSet<SymbolId>,
    names: &'a ProcessNames,
    wrap: SymbolId,
    options: &'a EmulationOptions,
    stats: InstrumentationStats,
}

impl VisitorMut for InstrumentAll<'_> {
    fn visit_function_mut(&mut self, function: &mut Function) {
        walk_function_mut(self, function);

        if function.body.is_empty() {
            self.stats.functions_skipped += 1;
            return;
        }
        if let Some(name) = function.name.filter(|n| self.immortal.contains(n)) {
            log::debug!("skipping immortal function {}", self.scopes.ident(name));
            self.stats.functions_skipped += 1;
            return;
        }

        let stats = match (self.options.record_line_numbers, self.names.location()) {
            (true, Some(location)) => {
                let hook = LocationRecorder::new(location, self.options.record_file_names);
                FunctionRewriter::new(self.scopes, self.names, self.wrap, function, hook)
                    .instrument(function)
            }
            _ => FunctionRewriter::new(self.scopes, self.names, self.wrap, function, NoLocations)
                .instrument(function),
        };

        log::debug!(
            "instrumented function {}: {} pops, {} locations",
            function
                .name
                .map(|n| self.scopes.ident(n).to_string())
                .unwrap_or_else(|| "<anonymous>".to_string()),
            stats.pops_inserted,
            stats.locations_recorded
        );
        self.stats.merge(&stats);
    }
}

/// Rewrites the body of a single function
///
/// Nested function expressions are left alone; they are instrumented on
/// their own.
pub(crate) struct FunctionRewriter<'a, H: ExprHook> {
    scopes: &'a mut ScopeTable,
    names: &'a ProcessNames,
    wrap: SymbolId,
    locals: FunctionLocals,
    hook: H,
    /// Outermost `try/finally` whose finally block is still ahead
    outer_finally: Option<FinallyId>,
    /// Number of enclosing catch bodies
    catch_depth: usize,
    stats: InstrumentationStats,
}

impl<'a, H: ExprHook> FunctionRewriter<'a, H> {
    pub(crate) fn new(
        scopes: &'a mut ScopeTable,
        names: &'a ProcessNames,
        wrap: SymbolId,
        function: &Function,
        hook: H,
    ) -> Self {
        Self {
            scopes,
            names,
            wrap,
            locals: FunctionLocals::new(function.scope, function.info.clone()),
            hook,
            outer_finally: None,
            catch_depth: 0,
            stats: InstrumentationStats::new(),
        }
    }

    pub(crate) fn instrument(mut self, function: &mut Function) -> InstrumentationStats {
        let info = function.info.clone();
        let push = self.push(function.name, &info);

        let statements = std::mem::take(&mut function.body.statements);
        let mut statements = self.rewrite_list(statements);

        // entry code goes after a leading var statement
        let at = usize::from(statements.first().is_some_and(Stmt::is_vars));
        statements.insert(at, push);
        function.body.statements = statements;

        if !function.body.ends_with_exit() {
            let pop = self.pop_stmt(&info);
            function.body.statements.push(pop);
        }

        self.stats.functions_instrumented += 1;
        self.stats.early_exit_flags += self.locals.early_exit_count();
        self.stats.locations_recorded += self.hook.recorded();
        self.locals.flush(&mut function.body);
        self.stats
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn rewrite_list(&mut self, statements: Vec<Stmt>) -> Vec<Stmt> {
        let mut out = Vec::with_capacity(statements.len());
        for stmt in statements {
            let reset = self.needs_catch_reset(&stmt);
            let info = stmt.info.clone();
            out.extend(self.rewrite_stmt(stmt));
            if reset {
                out.push(self.catch_reset(&info));
            }
        }
        out
    }

    /// Rewrite a statement that occupies a single-statement position
    fn rewrite_single(&mut self, stmt: Box<Stmt>) -> Box<Stmt> {
        let reset = self.needs_catch_reset(&stmt);
        let info = stmt.info.clone();
        let mut out = self.rewrite_stmt(*stmt);
        if reset {
            out.push(self.catch_reset(&info));
        }
        if out.len() == 1 {
            if let Some(stmt) = out.pop() {
                return Box::new(stmt);
            }
        }
        Box::new(Stmt::block(out, info))
    }

    fn rewrite_block(&mut self, block: Block) -> Block {
        Block::new(self.rewrite_list(block.statements), block.info)
    }

    fn rewrite_stmt(&mut self, stmt: Stmt) -> Vec<Stmt> {
        let Stmt { kind, info } = stmt;
        let kind = match kind {
            StmtKind::Expr(expr) => StmtKind::Expr(self.expr(expr)),
            StmtKind::Vars(decls) => StmtKind::Vars(self.decls(decls)),
            StmtKind::Return(expr) => return self.rewrite_return(expr, info),
            StmtKind::Throw(expr) => StmtKind::Throw(self.expr(expr)),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.expr(cond);
                let then_branch = self.rewrite_single(then_branch);
                let else_branch = else_branch.map(|s| self.rewrite_single(s));
                StmtKind::If {
                    cond,
                    then_branch,
                    else_branch,
                }
            }
            StmtKind::While { cond, body } => {
                self.hook.reset();
                let cond = self.expr(cond);
                let body = self.rewrite_single(body);
                StmtKind::While { cond, body }
            }
            StmtKind::DoWhile { body, cond } => {
                let body = self.rewrite_single(body);
                let cond = self.expr(cond);
                StmtKind::DoWhile { body, cond }
            }
            StmtKind::For {
                init,
                cond,
                incr,
                body,
            } => {
                let init = init.map(|init| match init {
                    ForInit::Vars(decls) => ForInit::Vars(self.decls(decls)),
                    ForInit::Expr(expr) => ForInit::Expr(self.expr(expr)),
                });
                let cond = cond.map(|cond| {
                    self.hook.reset();
                    self.expr(cond)
                });
                let incr = incr.map(|incr| {
                    self.hook.reset();
                    self.expr(incr)
                });
                let body = self.rewrite_single(body);
                StmtKind::For {
                    init,
                    cond,
                    incr,
                    body,
                }
            }
            StmtKind::ForIn {
                key,
                declared,
                object,
                body,
            } => {
                let object = self.expr(object);
                let body = self.rewrite_single(body);
                StmtKind::ForIn {
                    key,
                    declared,
                    object,
                    body,
                }
            }
            StmtKind::Block(block) => StmtKind::Block(self.rewrite_block(block)),
            StmtKind::Try(t) => StmtKind::Try(self.rewrite_try(t, &info)),
            StmtKind::Labeled { label, body } => StmtKind::Labeled {
                label,
                body: self.rewrite_single(body),
            },
            StmtKind::Switch {
                discriminant,
                cases,
            } => {
                let discriminant = self.expr(discriminant);
                let cases = cases
                    .into_iter()
                    .map(|case| SwitchCase {
                        test: case.test.map(|test| self.expr(test)),
                        body: self.rewrite_list(case.body),
                    })
                    .collect();
                StmtKind::Switch {
                    discriminant,
                    cases,
                }
            }
            kind @ (StmtKind::Break(_) | StmtKind::Continue(_) | StmtKind::Empty) => kind,
        };
        vec![Stmt::new(kind, info)]
    }

    fn decls(&mut self, decls: Vec<VarDecl>) -> Vec<VarDecl> {
        decls
            .into_iter()
            .map(|decl| VarDecl {
                init: decl.init.map(|init| self.expr(init)),
                ..decl
            })
            .collect()
    }

    fn rewrite_return(&mut self, expr: Option<Expr>, info: SourceInfo) -> Vec<Stmt> {
        let expr = expr.map(|expr| self.expr(expr));

        if let Some(finally) = self.outer_finally {
            // the finally block pops on our behalf
            let flag = self.locals.early_exit_var(finally, self.scopes);
            let set = Expr::assign(
                Expr::name(flag, info.clone()),
                Expr::bool(true, info.clone()),
                info.clone(),
            );
            return match expr {
                Some(expr) => vec![Stmt::ret(Some(Expr::comma(set, expr, info.clone())), info)],
                None => vec![Stmt::expr(set), Stmt::ret(None, info)],
            };
        }

        let mut out = Vec::with_capacity(3);
        let expr = match expr {
            Some(expr) if expr.has_side_effects() => {
                // evaluate before popping so a throw still sees our frame
                let temp = self.locals.return_temp_var(self.scopes);
                out.push(Stmt::expr(Expr::assign(
                    Expr::name(temp, info.clone()),
                    expr,
                    info.clone(),
                )));
                Some(Expr::name(temp, info.clone()))
            }
            other => other,
        };
        out.push(self.pop_stmt(&info));
        out.push(Stmt::ret(expr, info));
        out
    }

    fn rewrite_try(&mut self, t: TryStmt, info: &SourceInfo) -> TryStmt {
        let TryStmt {
            try_block,
            catches,
            finally,
        } = t;

        match finally {
            Some(finally) if self.outer_finally.is_none() => {
                let id = self.locals.next_finally();
                self.outer_finally = Some(id);

                let try_block = self.rewrite_block(try_block);
                let catches = if catches.is_empty() {
                    vec![self.synthetic_catch(info)]
                } else {
                    self.rewrite_catches(catches)
                };

                debug_assert_eq!(self.outer_finally, Some(id));
                self.outer_finally = None;

                let mut finally = self.rewrite_block(finally);
                if !finally.ends_with_exit() {
                    if let Some(flag) = self.locals.existing_early_exit(id) {
                        let guarded = Expr::binary(
                            BinaryOp::And,
                            Expr::name(flag, finally.info.clone()),
                            self.pop_expr(&finally.info),
                            finally.info.clone(),
                        );
                        finally.statements.push(Stmt::expr(guarded));
                    }
                }

                TryStmt {
                    try_block,
                    catches,
                    finally: Some(finally),
                }
            }
            finally => TryStmt {
                try_block: self.rewrite_block(try_block),
                catches: self.rewrite_catches(catches),
                finally: finally.map(|block| self.rewrite_block(block)),
            },
        }
    }

    fn rewrite_catches(&mut self, catches: Vec<Catch>) -> Vec<Catch> {
        catches
            .into_iter()
            .map(|catch| {
                self.catch_depth += 1;
                let body = self.rewrite_block(catch.body);
                self.catch_depth -= 1;
                Catch { body, ..catch }
            })
            .collect()
    }

    /// `catch (e) { e = wrap(e); $es_stackDepth = $es_stackIndex; throw e; }`
    fn synthetic_catch(&mut self, info: &SourceInfo) -> Catch {
        let (scope, e) = self.locals.catch_param(self.scopes);
        let wrapped = Expr::invoke(
            Expr::name(self.wrap, info.clone()),
            vec![Expr::name(e, info.clone())],
            info.clone(),
        );
        let body = vec![
            Stmt::expr(Expr::assign(Expr::name(e, info.clone()), wrapped, info.clone())),
            self.catch_reset(info),
            Stmt::new(StmtKind::Throw(Expr::name(e, info.clone())), info.clone()),
        ];

        self.stats.synthetic_catches += 1;
        Catch {
            param: e,
            scope,
            body: Block::new(body, info.clone()),
            info: info.clone(),
        }
    }

    /// Whether `stmt` is an `x = wrap(...)` statement inside a catch body
    fn needs_catch_reset(&self, stmt: &Stmt) -> bool {
        if self.catch_depth == 0 {
            return false;
        }
        let StmtKind::Expr(expr) = &stmt.kind else {
            return false;
        };
        let ExprKind::Binary {
            op: BinaryOp::Assign,
            right,
            ..
        } = &expr.kind
        else {
            return false;
        };
        matches!(
            &right.kind,
            ExprKind::Invocation { callee, .. } if callee.as_symbol() == Some(self.wrap)
        )
    }

    // ------------------------------------------------------------------------
    // Synthesized code
    // ------------------------------------------------------------------------

    /// `$es_stack[$es_stackIndex = ++$es_stackDepth] = <name or null>;`
    fn push(&mut self, name: Option<SymbolId>, info: &SourceInfo) -> Stmt {
        let index = self.locals.frame_index_var(self.scopes);
        let bump = Expr::prefix(
            PrefixOp::Inc,
            Expr::name(self.names.stack_depth(), info.clone()),
            info.clone(),
        );
        let slot = Expr::index(
            Expr::name(self.names.stack(), info.clone()),
            Expr::assign(Expr::name(index, info.clone()), bump, info.clone()),
            info.clone(),
        );
        let function = match name {
            Some(name) => Expr::name(name, info.clone()),
            None => Expr::null(info.clone()),
        };
        Stmt::expr(Expr::assign(slot, function, info.clone()))
    }

    /// `$es_stackDepth = $es_stackIndex - 1`
    fn pop_expr(&mut self, info: &SourceInfo) -> Expr {
        let index = self.locals.frame_index_var(self.scopes);
        self.stats.pops_inserted += 1;
        Expr::assign(
            Expr::name(self.names.stack_depth(), info.clone()),
            Expr::binary(
                BinaryOp::Sub,
                Expr::name(index, info.clone()),
                Expr::number(1.0, info.clone()),
                info.clone(),
            ),
            info.clone(),
        )
    }

    fn pop_stmt(&mut self, info: &SourceInfo) -> Stmt {
        Stmt::expr(self.pop_expr(info))
    }

    /// `$es_stackDepth = $es_stackIndex;`
    fn catch_reset(&mut self, info: &SourceInfo) -> Stmt {
        let index = self.locals.frame_index_var(self.scopes);
        self.stats.catch_resets += 1;
        Stmt::expr(Expr::assign(
            Expr::name(self.names.stack_depth(), info.clone()),
            Expr::name(index, info.clone()),
            info.clone(),
        ))
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn expr(&mut self, expr: Expr) -> Expr {
        if H::ENABLED {
            self.visit_expr(expr, ExprContext::Value)
        } else {
            expr
        }
    }

    /// Post-order rewrite in evaluation order; nested functions are opaque
    fn visit_expr(&mut self, expr: Expr, context: ExprContext) -> Expr {
        let Expr { kind, info } = expr;
        let (kind, candidate) = match kind {
            ExprKind::NameRef { qualifier, name } => {
                let qualifier = qualifier.map(|q| Box::new(self.visit_expr(*q, ExprContext::Value)));
                (ExprKind::NameRef { qualifier, name }, true)
            }
            ExprKind::ArrayAccess { array, index } => {
                let array = self.visit_boxed(array, ExprContext::Value);
                let index = self.visit_boxed(index, ExprContext::Value);
                (ExprKind::ArrayAccess { array, index }, true)
            }
            ExprKind::Invocation { callee, args } => {
                let callee = self.visit_boxed(callee, ExprContext::Reference);
                let args = self.visit_all(args);
                (ExprKind::Invocation { callee, args }, true)
            }
            ExprKind::New { ctor, args } => {
                let ctor = self.visit_boxed(ctor, ExprContext::Value);
                let args = self.visit_all(args);
                (ExprKind::New { ctor, args }, true)
            }
            ExprKind::Prefix { op, operand } => {
                let context = if op.modifies_operand() {
                    ExprContext::Lvalue
                } else if op == PrefixOp::Typeof {
                    ExprContext::Reference
                } else {
                    ExprContext::Value
                };
                let operand = self.visit_boxed(operand, context);
                (ExprKind::Prefix { op, operand }, true)
            }
            ExprKind::Postfix { op, operand } => {
                let operand = self.visit_boxed(operand, ExprContext::Lvalue);
                (ExprKind::Postfix { op, operand }, true)
            }
            ExprKind::Binary { op, left, right } => {
                let left_context = if op.is_assignment() {
                    ExprContext::Lvalue
                } else {
                    ExprContext::Value
                };
                let left = self.visit_boxed(left, left_context);
                let right = self.visit_boxed(right, ExprContext::Value);
                (ExprKind::Binary { op, left, right }, op.is_assignment())
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond = self.visit_boxed(cond, ExprContext::Value);
                let then_expr = self.visit_boxed(then_expr, ExprContext::Value);
                let else_expr = self.visit_boxed(else_expr, ExprContext::Value);
                (
                    ExprKind::Conditional {
                        cond,
                        then_expr,
                        else_expr,
                    },
                    false,
                )
            }
            ExprKind::ArrayLiteral(elements) => {
                (ExprKind::ArrayLiteral(self.visit_all(elements)), false)
            }
            ExprKind::ObjectLiteral(properties) => {
                let properties = properties
                    .into_iter()
                    .map(|p| Property {
                        key: p.key,
                        value: self.visit_expr(p.value, ExprContext::Value),
                    })
                    .collect();
                (ExprKind::ObjectLiteral(properties), false)
            }
            kind @ (ExprKind::Literal(_) | ExprKind::Function(_)) => (kind, false),
        };

        let expr = Expr::new(kind, info);
        if candidate {
            self.hook
                .record(expr, context, &mut self.locals, self.scopes)
        } else {
            expr
        }
    }

    fn visit_boxed(&mut self, expr: Box<Expr>, context: ExprContext) -> Box<Expr> {
        Box::new(self.visit_expr(*expr, context))
    }

    fn visit_all(&mut self, exprs: Vec<Expr>) -> Vec<Expr> {
        exprs
            .into_iter()
            .map(|e| self.visit_expr(e, ExprContext::Value))
            .collect()
    }
}
