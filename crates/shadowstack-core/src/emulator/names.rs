//! Names introduced by the pass
//!
//! Process-wide names live in the program scope and are declared once at the
//! top of the program. Function locals are allocated lazily while a function
//! is rewritten and declared in its leading `var` statement when the rewrite
//! finishes. All identifiers carry the `$es_` prefix and are made unique in
//! their scope.

use crate::ast::{Block, Expr, ExprKind, Stmt, StmtKind, VarDecl};
use crate::span::SourceInfo;
use crate::symbol::{ScopeId, ScopeKind, ScopeTable, SymbolId};

/// Role of an unobfuscatable runtime name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedRole {
    Stack,
    StackDepth,
    Location,
}

impl ReservedRole {
    pub const ALL: [ReservedRole; 3] = [
        ReservedRole::Stack,
        ReservedRole::StackDepth,
        ReservedRole::Location,
    ];

    /// Identifier in the root scope
    pub fn ident(self) -> &'static str {
        match self {
            ReservedRole::Stack => "$stack",
            ReservedRole::StackDepth => "$stackDepth",
            ReservedRole::Location => "$location",
        }
    }
}

/// Root-scope symbols of the reserved names, resolved once per program
#[derive(Debug, Clone, Default)]
pub struct ReservedSymbols {
    entries: Vec<(SymbolId, ReservedRole)>,
}

impl ReservedSymbols {
    pub fn resolve(scopes: &ScopeTable) -> Self {
        let entries = ReservedRole::ALL
            .iter()
            .filter_map(|role| scopes.root_name(role.ident()).map(|s| (s, *role)))
            .collect();
        Self { entries }
    }

    pub fn role_of(&self, symbol: SymbolId) -> Option<ReservedRole> {
        self.entries
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, role)| *role)
    }

    pub fn symbol(&self, role: ReservedRole) -> Option<SymbolId> {
        self.entries
            .iter()
            .find(|(_, r)| *r == role)
            .map(|(s, _)| *s)
    }
}

/// Program-scope variables holding the emulated stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessNames {
    stack: SymbolId,
    stack_depth: SymbolId,
    location: Option<SymbolId>,
}

impl ProcessNames {
    /// Declare the process variables in the program scope
    ///
    /// The location array is only allocated when `with_location` is set.
    pub fn allocate(scopes: &mut ScopeTable, with_location: bool) -> Self {
        let program = scopes.program();
        let stack = scopes.declare_unique(program, "$es_stack", "$stack");
        let stack_depth = scopes.declare_unique(program, "$es_stackDepth", "$stackDepth");
        let location =
            with_location.then(|| scopes.declare_unique(program, "$es_location", "$location"));
        Self {
            stack,
            stack_depth,
            location,
        }
    }

    /// Array of function references, one per active frame
    pub fn stack(&self) -> SymbolId {
        self.stack
    }

    /// Index of the innermost active frame, -1 when empty
    pub fn stack_depth(&self) -> SymbolId {
        self.stack_depth
    }

    /// Array of last recorded locations, parallel to the stack
    pub fn location(&self) -> Option<SymbolId> {
        self.location
    }

    /// Replacement for a reserved runtime name
    pub fn for_role(&self, role: ReservedRole) -> Option<SymbolId> {
        match role {
            ReservedRole::Stack => Some(self.stack),
            ReservedRole::StackDepth => Some(self.stack_depth),
            ReservedRole::Location => self.location,
        }
    }

    /// Emit `var $es_stack = [], $es_stackDepth = -1, $es_location = [];`
    ///
    /// Merged into the block's leading `var` statement when there is one.
    pub fn declare_in(&self, block: &mut Block) {
        let info = SourceInfo::synthetic();
        let mut decls = vec![
            VarDecl {
                name: self.stack,
                init: Some(Expr::new(
                    ExprKind::ArrayLiteral(Vec::new()),
                    info.clone(),
                )),
                info: info.clone(),
            },
            VarDecl {
                name: self.stack_depth,
                init: Some(Expr::number(-1.0, info.clone())),
                info: info.clone(),
            },
        ];
        if let Some(location) = self.location {
            decls.push(VarDecl {
                name: location,
                init: Some(Expr::new(
                    ExprKind::ArrayLiteral(Vec::new()),
                    info.clone(),
                )),
                info: info.clone(),
            });
        }
        merge_into_leading_vars(block, decls, info);
    }
}

/// Identifies one outermost `try/finally` within a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FinallyId(u32);

/// Lazily allocated locals of the function being rewritten
#[derive(Debug)]
pub struct FunctionLocals {
    scope: ScopeId,
    info: SourceInfo,
    frame_index: Option<SymbolId>,
    return_temp: Option<SymbolId>,
    early_exits: Vec<(FinallyId, SymbolId)>,
    next_finally: u32,
    pending: Vec<SymbolId>,
}

impl FunctionLocals {
    pub fn new(scope: ScopeId, info: SourceInfo) -> Self {
        Self {
            scope,
            info,
            frame_index: None,
            return_temp: None,
            early_exits: Vec::new(),
            next_finally: 0,
            pending: Vec::new(),
        }
    }

    /// `$es_stackIndex`: this invocation's slot in the stack
    pub fn frame_index_var(&mut self, scopes: &mut ScopeTable) -> SymbolId {
        if let Some(symbol) = self.frame_index {
            return symbol;
        }
        let symbol = self.declare(scopes, "$es_stackIndex", "stackIndex");
        self.frame_index = Some(symbol);
        symbol
    }

    /// `$es_returnTemp`: holds a side-effecting return value across the pop
    pub fn return_temp_var(&mut self, scopes: &mut ScopeTable) -> SymbolId {
        if let Some(symbol) = self.return_temp {
            return symbol;
        }
        let symbol = self.declare(scopes, "$es_returnTemp", "returnTemp");
        self.return_temp = Some(symbol);
        symbol
    }

    pub fn next_finally(&mut self) -> FinallyId {
        let id = FinallyId(self.next_finally);
        self.next_finally += 1;
        id
    }

    /// `$es_exitingEarlyN`: set when a `return` is routed through `finally`
    ///
    /// Each finally block gets its own flag; flags are never shared.
    pub fn early_exit_var(&mut self, finally: FinallyId, scopes: &mut ScopeTable) -> SymbolId {
        if let Some(symbol) = self.existing_early_exit(finally) {
            return symbol;
        }
        let ident = format!("$es_exitingEarly{}", self.early_exits.len());
        let symbol = self.declare(scopes, &ident, "exitingEarly");
        self.early_exits.push((finally, symbol));
        symbol
    }

    pub fn existing_early_exit(&self, finally: FinallyId) -> Option<SymbolId> {
        self.early_exits
            .iter()
            .find(|(id, _)| *id == finally)
            .map(|(_, symbol)| *symbol)
    }

    pub fn early_exit_count(&self) -> usize {
        self.early_exits.len()
    }

    /// Parameter of a synthesized catch clause, in its own catch scope
    pub fn catch_param(&self, scopes: &mut ScopeTable) -> (ScopeId, SymbolId) {
        let scope = scopes.new_scope(ScopeKind::Catch, self.scope);
        let param = scopes.declare(scope, "e");
        (scope, param)
    }

    /// Number of variables awaiting declaration
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Declare every allocated local in the body's leading `var` statement
    pub fn flush(self, body: &mut Block) {
        if self.pending.is_empty() {
            return;
        }
        let decls = self
            .pending
            .into_iter()
            .map(|name| VarDecl {
                name,
                init: None,
                info: self.info.clone(),
            })
            .collect();
        merge_into_leading_vars(body, decls, self.info);
    }

    fn declare(&mut self, scopes: &mut ScopeTable, ident: &str, short: &str) -> SymbolId {
        let symbol = scopes.declare_unique(self.scope, ident, short);
        self.pending.push(symbol);
        symbol
    }
}

fn merge_into_leading_vars(block: &mut Block, decls: Vec<VarDecl>, info: SourceInfo) {
    if let Some(Stmt {
        kind: StmtKind::Vars(existing),
        ..
    }) = block.statements.first_mut()
    {
        existing.extend(decls);
    } else {
        block.statements.insert(0, Stmt::vars(decls, info));
    }
}
