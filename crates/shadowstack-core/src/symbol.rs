//! Scopes and symbols
//!
//! Every name in the IR is a [`SymbolId`] into the program's [`ScopeTable`].
//! References are resolved by the front end, so two symbols with the same
//! identifier in different scopes are distinct.
//!
//! Scope layout:
//! - `Root` holds the unobfuscatable runtime names (`$stack`, `Error`, ...)
//! - `Program` is the global scope, child of `Root`
//! - `Function` and `Catch` scopes nest below it

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Names every runtime environment provides, declared in the root scope
pub const UNOBFUSCATABLE_NAMES: [&str; 7] = [
    "$stack",
    "$stackDepth",
    "$location",
    "Error",
    "TypeError",
    "ReferenceError",
    "RangeError",
];

/// Handle to a symbol in a [`ScopeTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(u32);

/// Handle to a scope in a [`ScopeTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ScopeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scope classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    Root,
    Program,
    Function,
    Catch,
}

/// Symbol information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    /// Identifier, unique within `scope`
    pub ident: String,
    /// Preferred short name for a later renaming pass
    pub short_ident: String,
    /// Declaring scope
    pub scope: ScopeId,
    /// Whether a renaming pass may change this name
    pub obfuscatable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ScopeData {
    kind: ScopeKind,
    parent: Option<ScopeId>,
    names: BTreeMap<String, SymbolId>,
}

/// Arena of scopes and symbols for one program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeTable {
    scopes: Vec<ScopeData>,
    symbols: Vec<Symbol>,
}

impl ScopeTable {
    /// Create a table with the root scope (unobfuscatable names) and the program scope
    pub fn new() -> Self {
        let mut table = Self {
            scopes: Vec::new(),
            symbols: Vec::new(),
        };
        let root = table.push_scope(ScopeKind::Root, None);
        for name in UNOBFUSCATABLE_NAMES {
            let id = table.push_symbol(root, name, name, false);
            table.scopes[root.index()].names.insert(name.to_string(), id);
        }
        table.push_scope(ScopeKind::Program, Some(root));
        table
    }

    /// The root scope
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// The program (global) scope
    pub fn program(&self) -> ScopeId {
        ScopeId(1)
    }

    /// Open a new scope below `parent`
    pub fn new_scope(&mut self, kind: ScopeKind, parent: ScopeId) -> ScopeId {
        debug_assert!(kind != ScopeKind::Root, "only one root scope");
        self.push_scope(kind, Some(parent))
    }

    /// Declare `ident` in `scope`, returning the existing symbol if already declared there
    pub fn declare(&mut self, scope: ScopeId, ident: &str) -> SymbolId {
        if let Some(existing) = self.find_in(scope, ident) {
            return existing;
        }
        let id = self.push_symbol(scope, ident, ident, true);
        self.scopes[scope.index()].names.insert(ident.to_string(), id);
        id
    }

    /// Declare a fresh symbol in `scope`
    ///
    /// Never returns an existing symbol: if `ident` is taken, `_1`, `_2`, ...
    /// is appended until the identifier is free.
    pub fn declare_unique(&mut self, scope: ScopeId, ident: &str, short_ident: &str) -> SymbolId {
        let mut candidate = ident.to_string();
        let mut suffix = 0;
        while self.find_in(scope, &candidate).is_some() {
            suffix += 1;
            candidate = format!("{}_{}", ident, suffix);
        }
        let id = self.push_symbol(scope, &candidate, short_ident, true);
        self.scopes[scope.index()].names.insert(candidate, id);
        id
    }

    /// Find `ident` declared directly in `scope`
    pub fn find_in(&self, scope: ScopeId, ident: &str) -> Option<SymbolId> {
        self.scopes[scope.index()].names.get(ident).copied()
    }

    /// Resolve `ident` from `scope` outward through its parents
    pub fn lookup(&self, scope: ScopeId, ident: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(s) = current {
            if let Some(id) = self.find_in(s, ident) {
                return Some(id);
            }
            current = self.scopes[s.index()].parent;
        }
        None
    }

    /// Look up an unobfuscatable root name
    pub fn root_name(&self, ident: &str) -> Option<SymbolId> {
        self.find_in(self.root(), ident)
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn ident(&self, id: SymbolId) -> &str {
        &self.symbols[id.index()].ident
    }

    pub fn scope_kind(&self, scope: ScopeId) -> ScopeKind {
        self.scopes[scope.index()].kind
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.index()].parent
    }

    /// Symbols declared directly in `scope`, in identifier order
    pub fn symbols_in(&self, scope: ScopeId) -> impl Iterator<Item = SymbolId> + '_ {
        self.scopes[scope.index()].names.values().copied()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    fn push_scope(&mut self, kind: ScopeKind, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(ScopeData {
            kind,
            parent,
            names: BTreeMap::new(),
        });
        id
    }

    fn push_symbol(
        &mut self,
        scope: ScopeId,
        ident: &str,
        short_ident: &str,
        obfuscatable: bool,
    ) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            ident: ident.to_string(),
            short_ident: short_ident.to_string(),
            scope,
            obfuscatable,
        });
        id
    }
}

impl Default for ScopeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_names_are_unobfuscatable() {
        let table = ScopeTable::new();
        for name in UNOBFUSCATABLE_NAMES {
            let id = table.root_name(name).unwrap();
            assert!(!table.symbol(id).obfuscatable);
            assert_eq!(table.symbol(id).scope, table.root());
        }
    }

    #[test]
    fn test_declare_returns_existing() {
        let mut table = ScopeTable::new();
        let program = table.program();
        let a = table.declare(program, "foo");
        let b = table.declare(program, "foo");
        assert_eq!(a, b);
    }

    #[test]
    fn test_declare_unique_suffixes() {
        let mut table = ScopeTable::new();
        let program = table.program();
        let user = table.declare(program, "$es_stack");
        let synthetic = table.declare_unique(program, "$es_stack", "$stack");
        let again = table.declare_unique(program, "$es_stack", "$stack");

        assert_ne!(user, synthetic);
        assert_eq!(table.ident(synthetic), "$es_stack_1");
        assert_eq!(table.ident(again), "$es_stack_2");
        assert_eq!(table.symbol(synthetic).short_ident, "$stack");
    }

    #[test]
    fn test_lookup_walks_parents() {
        let mut table = ScopeTable::new();
        let program = table.program();
        let outer = table.declare(program, "x");
        let f = table.new_scope(ScopeKind::Function, program);
        let c = table.new_scope(ScopeKind::Catch, f);

        assert_eq!(table.lookup(c, "x"), Some(outer));
        assert_eq!(table.lookup(c, "Error"), table.root_name("Error"));
        assert_eq!(table.lookup(c, "missing"), None);

        let inner = table.declare(f, "x");
        assert_eq!(table.lookup(c, "x"), Some(inner));
        assert_eq!(table.parent(c), Some(f));
        assert_eq!(table.scope_kind(c), ScopeKind::Catch);
    }
}
