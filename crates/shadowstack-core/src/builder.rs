//! Program construction
//!
//! [`Builder`] assembles a [`Program`] the way a front end would: it tracks
//! the current source position and scope, declares names as it goes, and
//! opens function and catch scopes for the duration of a closure.
//!
//! ```
//! use shadowstack_core::builder::Builder;
//!
//! let mut b = Builder::new("Hello.java");
//! let (_, decl) = b.function_decl("hello", &[], |b, _| {
//!     let s = b.string("hi");
//!     vec![b.return_stmt(Some(s))]
//! });
//! b.push(decl);
//! let program = b.finish();
//! assert_eq!(program.global_block.statements.len(), 1);
//! ```

use crate::ast::*;
use crate::span::SourceInfo;
use crate::symbol::{ScopeId, ScopeKind, SymbolId};

/// Incremental program builder
pub struct Builder {
    program: Program,
    info: SourceInfo,
    scope: ScopeId,
}

impl Builder {
    /// Start an empty program; nodes are attributed to `file`, line 1
    pub fn new(file: &str) -> Self {
        let program = Program::new();
        let scope = program.scopes.program();
        Self {
            program,
            info: SourceInfo::new(file, 1),
            scope,
        }
    }

    /// Attribute subsequent nodes to `line`
    pub fn at_line(&mut self, line: u32) -> &mut Self {
        self.info.line = line;
        self
    }

    /// Attribute subsequent nodes to `file`
    pub fn in_file(&mut self, file: &str) -> &mut Self {
        self.info.file = file.to_string();
        self
    }

    pub fn info(&self) -> SourceInfo {
        self.info.clone()
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    // ------------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------------

    /// Declare (or reuse) a name in the program scope
    pub fn global(&mut self, ident: &str) -> SymbolId {
        let program = self.program.scopes.program();
        self.program.scopes.declare(program, ident)
    }

    /// Declare (or reuse) a name in the current scope
    pub fn local(&mut self, ident: &str) -> SymbolId {
        self.program.scopes.declare(self.scope, ident)
    }

    /// Resolve a name from the current scope outward
    pub fn lookup(&self, ident: &str) -> Option<SymbolId> {
        self.program.scopes.lookup(self.scope, ident)
    }

    /// Unobfuscatable runtime name such as `$stackDepth` or `Error`
    pub fn root_name(&self, ident: &str) -> Option<SymbolId> {
        self.program.scopes.root_name(ident)
    }

    /// Register `symbol` under a well-known index key
    pub fn index_function(&mut self, key: &str, symbol: SymbolId) {
        self.program.indexed_functions.insert(key.to_string(), symbol);
    }

    /// Exclude the function named `symbol` from instrumentation
    pub fn mark_immortal(&mut self, symbol: SymbolId) {
        self.program.immortal_functions.insert(symbol);
    }

    /// Declare `function wrap(e) { return e; }` and index it as the
    /// exception wrapper
    pub fn define_wrap_function(&mut self) -> SymbolId {
        let (wrap, decl) = self.function_decl("wrap", &["e"], |b, params| {
            let e = b.name(params[0]);
            vec![b.return_stmt(Some(e))]
        });
        self.push(decl);
        self.index_function(WRAP_FUNCTION_KEY, wrap);
        wrap
    }

    // ------------------------------------------------------------------------
    // Scoped constructs
    // ------------------------------------------------------------------------

    /// Build a function; its name is declared in the enclosing scope, its
    /// parameters in a fresh function scope visible to `body`
    pub fn function<F>(&mut self, name: Option<&str>, params: &[&str], body: F) -> Function
    where
        F: FnOnce(&mut Builder, &[SymbolId]) -> Vec<Stmt>,
    {
        let info = self.info();
        let name = name.map(|n| self.local(n));
        let scope = self
            .program
            .scopes
            .new_scope(ScopeKind::Function, self.scope);
        let params: Vec<SymbolId> = params
            .iter()
            .map(|p| self.program.scopes.declare(scope, p))
            .collect();

        let outer = std::mem::replace(&mut self.scope, scope);
        let statements = body(self, &params);
        self.scope = outer;

        Function {
            name,
            params,
            body: Block::new(statements, info.clone()),
            scope,
            info,
        }
    }

    /// Named function as a declaration statement
    pub fn function_decl<F>(&mut self, name: &str, params: &[&str], body: F) -> (SymbolId, Stmt)
    where
        F: FnOnce(&mut Builder, &[SymbolId]) -> Vec<Stmt>,
    {
        let function = self.function(Some(name), params, body);
        let symbol = self.local(name);
        let expr = self.function_expr(function);
        (symbol, Stmt::expr(expr))
    }

    /// `catch (param) { body }` with the parameter in a fresh catch scope
    pub fn catch_clause<F>(&mut self, param: &str, body: F) -> Catch
    where
        F: FnOnce(&mut Builder, SymbolId) -> Vec<Stmt>,
    {
        let info = self.info();
        let scope = self.program.scopes.new_scope(ScopeKind::Catch, self.scope);
        let param = self.program.scopes.declare(scope, param);

        let outer = std::mem::replace(&mut self.scope, scope);
        let statements = body(self, param);
        self.scope = outer;

        Catch {
            param,
            scope,
            body: Block::new(statements, info.clone()),
            info,
        }
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    pub fn name(&self, symbol: SymbolId) -> Expr {
        Expr::name(symbol, self.info())
    }

    pub fn prop(&self, qualifier: Expr, property: &str) -> Expr {
        Expr::property(qualifier, property, self.info())
    }

    pub fn num(&self, value: f64) -> Expr {
        Expr::number(value, self.info())
    }

    pub fn string(&self, value: &str) -> Expr {
        Expr::string(value, self.info())
    }

    pub fn boolean(&self, value: bool) -> Expr {
        Expr::bool(value, self.info())
    }

    pub fn null(&self) -> Expr {
        Expr::null(self.info())
    }

    pub fn undefined(&self) -> Expr {
        Expr::undefined(self.info())
    }

    pub fn call(&self, callee: Expr, args: Vec<Expr>) -> Expr {
        Expr::invoke(callee, args, self.info())
    }

    pub fn new_expr(&self, ctor: Expr, args: Vec<Expr>) -> Expr {
        Expr::construct(ctor, args, self.info())
    }

    pub fn assign(&self, target: Expr, value: Expr) -> Expr {
        Expr::assign(target, value, self.info())
    }

    pub fn binary(&self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::binary(op, left, right, self.info())
    }

    pub fn comma(&self, first: Expr, second: Expr) -> Expr {
        Expr::comma(first, second, self.info())
    }

    pub fn prefix(&self, op: PrefixOp, operand: Expr) -> Expr {
        Expr::prefix(op, operand, self.info())
    }

    pub fn postfix(&self, op: PostfixOp, operand: Expr) -> Expr {
        Expr::postfix(op, operand, self.info())
    }

    pub fn index(&self, array: Expr, index: Expr) -> Expr {
        Expr::index(array, index, self.info())
    }

    pub fn conditional(&self, cond: Expr, then_expr: Expr, else_expr: Expr) -> Expr {
        Expr::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            self.info(),
        )
    }

    pub fn array(&self, elements: Vec<Expr>) -> Expr {
        Expr::new(ExprKind::ArrayLiteral(elements), self.info())
    }

    pub fn object(&self, properties: Vec<(&str, Expr)>) -> Expr {
        let properties = properties
            .into_iter()
            .map(|(key, value)| Property {
                key: key.to_string(),
                value,
            })
            .collect();
        Expr::new(ExprKind::ObjectLiteral(properties), self.info())
    }

    pub fn function_expr(&self, function: Function) -> Expr {
        let info = function.info.clone();
        Expr::new(ExprKind::Function(Box::new(function)), info)
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    pub fn expr_stmt(&self, expr: Expr) -> Stmt {
        Stmt::new(StmtKind::Expr(expr), self.info())
    }

    /// `var name = init;`
    pub fn var_stmt(&self, name: SymbolId, init: Option<Expr>) -> Stmt {
        self.vars_stmt(vec![(name, init)])
    }

    pub fn vars_stmt(&self, decls: Vec<(SymbolId, Option<Expr>)>) -> Stmt {
        Stmt::vars(self.decls(decls), self.info())
    }

    pub fn return_stmt(&self, expr: Option<Expr>) -> Stmt {
        Stmt::ret(expr, self.info())
    }

    pub fn throw_stmt(&self, expr: Expr) -> Stmt {
        Stmt::new(StmtKind::Throw(expr), self.info())
    }

    pub fn if_stmt(&self, cond: Expr, then_branch: Stmt, else_branch: Option<Stmt>) -> Stmt {
        Stmt::new(
            StmtKind::If {
                cond,
                then_branch: Box::new(then_branch),
                else_branch: else_branch.map(Box::new),
            },
            self.info(),
        )
    }

    pub fn while_stmt(&self, cond: Expr, body: Stmt) -> Stmt {
        Stmt::new(
            StmtKind::While {
                cond,
                body: Box::new(body),
            },
            self.info(),
        )
    }

    pub fn do_while_stmt(&self, body: Stmt, cond: Expr) -> Stmt {
        Stmt::new(
            StmtKind::DoWhile {
                body: Box::new(body),
                cond,
            },
            self.info(),
        )
    }

    pub fn for_stmt(
        &self,
        init: Option<ForInit>,
        cond: Option<Expr>,
        incr: Option<Expr>,
        body: Stmt,
    ) -> Stmt {
        Stmt::new(
            StmtKind::For {
                init,
                cond,
                incr,
                body: Box::new(body),
            },
            self.info(),
        )
    }

    /// `for (var key in object) body`
    pub fn for_in_stmt(&self, key: SymbolId, object: Expr, body: Stmt) -> Stmt {
        Stmt::new(
            StmtKind::ForIn {
                key,
                declared: true,
                object,
                body: Box::new(body),
            },
            self.info(),
        )
    }

    pub fn block(&self, statements: Vec<Stmt>) -> Stmt {
        Stmt::block(statements, self.info())
    }

    pub fn try_stmt(
        &self,
        try_block: Vec<Stmt>,
        catches: Vec<Catch>,
        finally: Option<Vec<Stmt>>,
    ) -> Stmt {
        let info = self.info();
        Stmt::new(
            StmtKind::Try(TryStmt {
                try_block: Block::new(try_block, info.clone()),
                catches,
                finally: finally.map(|statements| Block::new(statements, info.clone())),
            }),
            info,
        )
    }

    pub fn labeled(&self, label: &str, body: Stmt) -> Stmt {
        Stmt::new(
            StmtKind::Labeled {
                label: label.to_string(),
                body: Box::new(body),
            },
            self.info(),
        )
    }

    pub fn break_stmt(&self, label: Option<&str>) -> Stmt {
        Stmt::new(StmtKind::Break(label.map(str::to_string)), self.info())
    }

    pub fn continue_stmt(&self, label: Option<&str>) -> Stmt {
        Stmt::new(StmtKind::Continue(label.map(str::to_string)), self.info())
    }

    pub fn switch_stmt(&self, discriminant: Expr, cases: Vec<SwitchCase>) -> Stmt {
        Stmt::new(
            StmtKind::Switch {
                discriminant,
                cases,
            },
            self.info(),
        )
    }

    pub fn empty(&self) -> Stmt {
        Stmt::new(StmtKind::Empty, self.info())
    }

    /// Declarators for a `for (var ...)` initializer
    pub fn decls(&self, decls: Vec<(SymbolId, Option<Expr>)>) -> Vec<VarDecl> {
        decls
            .into_iter()
            .map(|(name, init)| VarDecl {
                name,
                init,
                info: self.info(),
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Program
    // ------------------------------------------------------------------------

    /// Append a top-level statement
    pub fn push(&mut self, stmt: Stmt) {
        self.program.global_block.statements.push(stmt);
    }

    pub fn finish(self) -> Program {
        self.program
    }
}
