//! Tree traversal
//!
//! [`Visitor`] and [`VisitorMut`] walk every node of a program, nested
//! functions included. Override a `visit_*` method to intercept a node kind and
//! call the matching `walk_*` function to continue into its children.

use crate::ast::{Block, Catch, Expr, ExprKind, ForInit, Function, Stmt, StmtKind, VarDecl};

/// Read-only traversal
pub trait Visitor {
    fn visit_block(&mut self, block: &Block) {
        walk_block(self, block);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    fn visit_function(&mut self, function: &Function) {
        walk_function(self, function);
    }
}

/// Mutating traversal
pub trait VisitorMut {
    fn visit_block_mut(&mut self, block: &mut Block) {
        walk_block_mut(self, block);
    }

    fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
        walk_stmt_mut(self, stmt);
    }

    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        walk_expr_mut(self, expr);
    }

    fn visit_function_mut(&mut self, function: &mut Function) {
        walk_function_mut(self, function);
    }
}

// ============================================================================
// Read-only walks
// ============================================================================

pub fn walk_block<V: Visitor + ?Sized>(v: &mut V, block: &Block) {
    for stmt in &block.statements {
        v.visit_stmt(stmt);
    }
}

pub fn walk_function<V: Visitor + ?Sized>(v: &mut V, function: &Function) {
    v.visit_block(&function.body);
}

fn walk_decls<V: Visitor + ?Sized>(v: &mut V, decls: &[VarDecl]) {
    for init in decls.iter().filter_map(|d| d.init.as_ref()) {
        v.visit_expr(init);
    }
}

fn walk_catch<V: Visitor + ?Sized>(v: &mut V, catch: &Catch) {
    v.visit_block(&catch.body);
}

pub fn walk_stmt<V: Visitor + ?Sized>(v: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Expr(expr) | StmtKind::Throw(expr) => v.visit_expr(expr),
        StmtKind::Vars(decls) => walk_decls(v, decls),
        StmtKind::Return(expr) => {
            if let Some(expr) = expr {
                v.visit_expr(expr);
            }
        }
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            v.visit_expr(cond);
            v.visit_stmt(then_branch);
            if let Some(else_branch) = else_branch {
                v.visit_stmt(else_branch);
            }
        }
        StmtKind::While { cond, body } => {
            v.visit_expr(cond);
            v.visit_stmt(body);
        }
        StmtKind::DoWhile { body, cond } => {
            v.visit_stmt(body);
            v.visit_expr(cond);
        }
        StmtKind::For {
            init,
            cond,
            incr,
            body,
        } => {
            match init {
                Some(ForInit::Vars(decls)) => walk_decls(v, decls),
                Some(ForInit::Expr(expr)) => v.visit_expr(expr),
                None => {}
            }
            if let Some(cond) = cond {
                v.visit_expr(cond);
            }
            if let Some(incr) = incr {
                v.visit_expr(incr);
            }
            v.visit_stmt(body);
        }
        StmtKind::ForIn { object, body, .. } => {
            v.visit_expr(object);
            v.visit_stmt(body);
        }
        StmtKind::Block(block) => v.visit_block(block),
        StmtKind::Try(t) => {
            v.visit_block(&t.try_block);
            for catch in &t.catches {
                walk_catch(v, catch);
            }
            if let Some(finally) = &t.finally {
                v.visit_block(finally);
            }
        }
        StmtKind::Labeled { body, .. } => v.visit_stmt(body),
        StmtKind::Switch {
            discriminant,
            cases,
        } => {
            v.visit_expr(discriminant);
            for case in cases {
                if let Some(test) = &case.test {
                    v.visit_expr(test);
                }
                for stmt in &case.body {
                    v.visit_stmt(stmt);
                }
            }
        }
        StmtKind::Break(_) | StmtKind::Continue(_) | StmtKind::Empty => {}
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(v: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::NameRef { qualifier, .. } => {
            if let Some(qualifier) = qualifier {
                v.visit_expr(qualifier);
            }
        }
        ExprKind::ArrayAccess { array, index } => {
            v.visit_expr(array);
            v.visit_expr(index);
        }
        ExprKind::Invocation { callee, args } | ExprKind::New { ctor: callee, args } => {
            v.visit_expr(callee);
            for arg in args {
                v.visit_expr(arg);
            }
        }
        ExprKind::Prefix { operand, .. } | ExprKind::Postfix { operand, .. } => {
            v.visit_expr(operand)
        }
        ExprKind::Binary { left, right, .. } => {
            v.visit_expr(left);
            v.visit_expr(right);
        }
        ExprKind::Conditional {
            cond,
            then_expr,
            else_expr,
        } => {
            v.visit_expr(cond);
            v.visit_expr(then_expr);
            v.visit_expr(else_expr);
        }
        ExprKind::Literal(_) => {}
        ExprKind::ArrayLiteral(elements) => {
            for element in elements {
                v.visit_expr(element);
            }
        }
        ExprKind::ObjectLiteral(properties) => {
            for property in properties {
                v.visit_expr(&property.value);
            }
        }
        ExprKind::Function(function) => v.visit_function(function),
    }
}

// ============================================================================
// Mutating walks
// ============================================================================

pub fn walk_block_mut<V: VisitorMut + ?Sized>(v: &mut V, block: &mut Block) {
    for stmt in &mut block.statements {
        v.visit_stmt_mut(stmt);
    }
}

pub fn walk_function_mut<V: VisitorMut + ?Sized>(v: &mut V, function: &mut Function) {
    v.visit_block_mut(&mut function.body);
}

fn walk_decls_mut<V: VisitorMut + ?Sized>(v: &mut V, decls: &mut [VarDecl]) {
    for init in decls.iter_mut().filter_map(|d| d.init.as_mut()) {
        v.visit_expr_mut(init);
    }
}

pub fn walk_stmt_mut<V: VisitorMut + ?Sized>(v: &mut V, stmt: &mut Stmt) {
    match &mut stmt.kind {
        StmtKind::Expr(expr) | StmtKind::Throw(expr) => v.visit_expr_mut(expr),
        StmtKind::Vars(decls) => walk_decls_mut(v, decls),
        StmtKind::Return(expr) => {
            if let Some(expr) = expr {
                v.visit_expr_mut(expr);
            }
        }
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            v.visit_expr_mut(cond);
            v.visit_stmt_mut(then_branch);
            if let Some(else_branch) = else_branch {
                v.visit_stmt_mut(else_branch);
            }
        }
        StmtKind::While { cond, body } => {
            v.visit_expr_mut(cond);
            v.visit_stmt_mut(body);
        }
        StmtKind::DoWhile { body, cond } => {
            v.visit_stmt_mut(body);
            v.visit_expr_mut(cond);
        }
        StmtKind::For {
            init,
            cond,
            incr,
            body,
        } => {
            match init {
                Some(ForInit::Vars(decls)) => walk_decls_mut(v, decls),
                Some(ForInit::Expr(expr)) => v.visit_expr_mut(expr),
                None => {}
            }
            if let Some(cond) = cond {
                v.visit_expr_mut(cond);
            }
            if let Some(incr) = incr {
                v.visit_expr_mut(incr);
            }
            v.visit_stmt_mut(body);
        }
        StmtKind::ForIn { object, body, .. } => {
            v.visit_expr_mut(object);
            v.visit_stmt_mut(body);
        }
        StmtKind::Block(block) => v.visit_block_mut(block),
        StmtKind::Try(t) => {
            v.visit_block_mut(&mut t.try_block);
            for catch in &mut t.catches {
                v.visit_block_mut(&mut catch.body);
            }
            if let Some(finally) = &mut t.finally {
                v.visit_block_mut(finally);
            }
        }
        StmtKind::Labeled { body, .. } => v.visit_stmt_mut(body),
        StmtKind::Switch {
            discriminant,
            cases,
        } => {
            v.visit_expr_mut(discriminant);
            for case in cases {
                if let Some(test) = &mut case.test {
                    v.visit_expr_mut(test);
                }
                for stmt in &mut case.body {
                    v.visit_stmt_mut(stmt);
                }
            }
        }
        StmtKind::Break(_) | StmtKind::Continue(_) | StmtKind::Empty => {}
    }
}

pub fn walk_expr_mut<V: VisitorMut + ?Sized>(v: &mut V, expr: &mut Expr) {
    match &mut expr.kind {
        ExprKind::NameRef { qualifier, .. } => {
            if let Some(qualifier) = qualifier {
                v.visit_expr_mut(qualifier);
            }
        }
        ExprKind::ArrayAccess { array, index } => {
            v.visit_expr_mut(array);
            v.visit_expr_mut(index);
        }
        ExprKind::Invocation { callee, args } | ExprKind::New { ctor: callee, args } => {
            v.visit_expr_mut(callee);
            for arg in args {
                v.visit_expr_mut(arg);
            }
        }
        ExprKind::Prefix { operand, .. } | ExprKind::Postfix { operand, .. } => {
            v.visit_expr_mut(operand)
        }
        ExprKind::Binary { left, right, .. } => {
            v.visit_expr_mut(left);
            v.visit_expr_mut(right);
        }
        ExprKind::Conditional {
            cond,
            then_expr,
            else_expr,
        } => {
            v.visit_expr_mut(cond);
            v.visit_expr_mut(then_expr);
            v.visit_expr_mut(else_expr);
        }
        ExprKind::Literal(_) => {}
        ExprKind::ArrayLiteral(elements) => {
            for element in elements {
                v.visit_expr_mut(element);
            }
        }
        ExprKind::ObjectLiteral(properties) => {
            for property in properties {
                v.visit_expr_mut(&mut property.value);
            }
        }
        ExprKind::Function(function) => v.visit_function_mut(function),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SourceInfo;
    use crate::symbol::ScopeTable;

    struct CountNames(usize);

    impl Visitor for CountNames {
        fn visit_expr(&mut self, expr: &Expr) {
            if matches!(expr.kind, ExprKind::NameRef { .. }) {
                self.0 += 1;
            }
            walk_expr(self, expr);
        }
    }

    #[test]
    fn test_walk_reaches_nested_functions() {
        let mut scopes = ScopeTable::new();
        let program = scopes.program();
        let x = scopes.declare(program, "x");
        let f_scope = scopes.new_scope(crate::symbol::ScopeKind::Function, program);
        let info = SourceInfo::new("a.js", 1);

        let inner = Function {
            name: None,
            params: vec![],
            body: Block::new(vec![Stmt::expr(Expr::name(x, info.clone()))], info.clone()),
            scope: f_scope,
            info: info.clone(),
        };
        let block = Block::new(
            vec![Stmt::expr(Expr::invoke(
                Expr::new(ExprKind::Function(Box::new(inner)), info.clone()),
                vec![Expr::name(x, info.clone())],
                info.clone(),
            ))],
            info,
        );

        let mut counter = CountNames(0);
        counter.visit_block(&block);
        assert_eq!(counter.0, 2);
    }
}
