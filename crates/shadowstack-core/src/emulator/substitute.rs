//! Reserved-name substitution
//!
//! Runtime support code refers to the stack through the unobfuscatable root
//! names `$stack`, `$stackDepth` and `$location`. Those references are
//! redirected to the program-scope variables the pass declares, which a
//! renaming pass is free to shorten.

use super::names::{ProcessNames, ReservedRole, ReservedSymbols};
use crate::ast::{Expr, ExprKind, Program, RefName};
use crate::symbol::SymbolId;
use crate::visit::{walk_expr, walk_expr_mut, Visitor, VisitorMut};

/// Whether any unqualified reference to the `role` name exists in the program
pub fn references_role(program: &Program, reserved: &ReservedSymbols, role: ReservedRole) -> bool {
    let Some(symbol) = reserved.symbol(role) else {
        return false;
    };

    struct Finder {
        symbol: SymbolId,
        found: bool,
    }

    impl Visitor for Finder {
        fn visit_expr(&mut self, expr: &Expr) {
            if expr.as_symbol() == Some(self.symbol) {
                self.found = true;
            }
            if !self.found {
                walk_expr(self, expr);
            }
        }
    }

    let mut finder = Finder {
        symbol,
        found: false,
    };
    finder.visit_block(&program.global_block);
    finder.found
}

/// Replace every unqualified reserved-name reference; returns the count
pub fn substitute_reserved_names(
    program: &mut Program,
    reserved: &ReservedSymbols,
    names: &ProcessNames,
) -> usize {
    let mut substitution = Substitution {
        reserved,
        names,
        replaced: 0,
    };
    substitution.visit_block_mut(&mut program.global_block);
    substitution.replaced
}

struct Substitution<'a> {
    reserved: &'a ReservedSymbols,
    names: &'a ProcessNames,
    replaced: usize,
}

impl VisitorMut for Substitution<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if let ExprKind::NameRef {
            qualifier: None,
            name: RefName::Symbol(symbol),
        } = &mut expr.kind
        {
            let replacement = self
                .reserved
                .role_of(*symbol)
                .and_then(|role| self.names.for_role(role));
            if let Some(replacement) = replacement {
                *symbol = replacement;
                self.replaced += 1;
            }
            return;
        }
        walk_expr_mut(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;

    fn reserved_refs(b: &mut Builder) -> SymbolId {
        let depth = b.root_name("$stackDepth").unwrap();
        let inner = b.function(None, &[], |b, _| {
            let read = b.name(depth);
            vec![b.return_stmt(Some(read))]
        });
        let outer = b.function(Some("outer"), &[], |b, _| {
            vec![b.expr_stmt(b.function_expr(inner))]
        });
        let stmt = b.expr_stmt(b.function_expr(outer));
        b.push(stmt);
        depth
    }

    #[test]
    fn test_nested_references_are_replaced() {
        let mut b = Builder::new("a.js");
        let depth = reserved_refs(&mut b);
        let mut program = b.finish();

        let reserved = ReservedSymbols::resolve(&program.scopes);
        assert!(references_role(&program, &reserved, ReservedRole::StackDepth));
        assert!(!references_role(&program, &reserved, ReservedRole::Location));

        let names = ProcessNames::allocate(&mut program.scopes, false);
        let replaced = substitute_reserved_names(&mut program, &reserved, &names);

        assert_eq!(replaced, 1);
        assert!(!references_role(&program, &reserved, ReservedRole::StackDepth));
        assert_eq!(reserved.role_of(depth), Some(ReservedRole::StackDepth));
    }
}
