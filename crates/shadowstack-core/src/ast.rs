//! Program tree definitions
//!
//! A lowered, JavaScript-shaped IR. Names are resolved to [`SymbolId`]s in the
//! program's [`ScopeTable`]; every statement and expression carries the
//! [`SourceInfo`] it was generated from.

use crate::span::SourceInfo;
use crate::symbol::{ScopeId, ScopeTable, SymbolId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// IR schema version
///
/// Included in JSON dumps. Increment when making breaking changes to the tree.
pub const AST_VERSION: u32 = 1;

/// Index key of the runtime function that converts thrown values into
/// exception objects
pub const WRAP_FUNCTION_KEY: &str = "Exceptions.wrap";

/// A whole program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Top-level statements
    pub global_block: Block,
    /// Scopes and symbols for every name in the program
    pub scopes: ScopeTable,
    /// Well-known runtime functions, by index key
    pub indexed_functions: BTreeMap<String, SymbolId>,
    /// Bootstrap functions that may run before anything else is defined
    pub immortal_functions: BTreeSet<SymbolId>,
}

impl Program {
    pub fn new() -> Self {
        Self {
            global_block: Block::new(Vec::new(), SourceInfo::synthetic()),
            scopes: ScopeTable::new(),
            indexed_functions: BTreeMap::new(),
            immortal_functions: BTreeSet::new(),
        }
    }

    /// Name symbol of an indexed runtime function
    pub fn indexed_function(&self, key: &str) -> Option<SymbolId> {
        self.indexed_functions.get(key).copied()
    }

    pub fn is_immortal(&self, function: &Function) -> bool {
        function
            .name
            .is_some_and(|name| self.immortal_functions.contains(&name))
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

/// Versioned program wrapper for JSON serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedProgram {
    /// IR schema version
    pub ast_version: u32,
    /// The wrapped program
    #[serde(flatten)]
    pub program: Program,
}

impl VersionedProgram {
    pub fn new(program: Program) -> Self {
        Self {
            ast_version: AST_VERSION,
            program,
        }
    }

    /// Serialize to a pretty-printed JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from a JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl From<Program> for VersionedProgram {
    fn from(program: Program) -> Self {
        Self::new(program)
    }
}

/// Statement list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub info: SourceInfo,
}

impl Block {
    pub fn new(statements: Vec<Stmt>, info: SourceInfo) -> Self {
        Self { statements, info }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Whether the last statement is a `return` or `throw`
    ///
    /// A purely syntactic check: a trailing `if` whose branches all return
    /// does not count.
    pub fn ends_with_exit(&self) -> bool {
        self.statements.last().is_some_and(Stmt::is_exit)
    }
}

/// Function expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Function name (None for anonymous functions)
    pub name: Option<SymbolId>,
    pub params: Vec<SymbolId>,
    pub body: Block,
    /// Scope holding the parameters and locals
    pub scope: ScopeId,
    pub info: SourceInfo,
}

/// Statement with its source location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub info: SourceInfo,
}

/// Statement kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// Expression statement
    Expr(Expr),
    /// `var a = 1, b;`
    Vars(Vec<VarDecl>),
    Return(Option<Expr>),
    Throw(Expr),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<ForInit>,
        cond: Option<Expr>,
        incr: Option<Expr>,
        body: Box<Stmt>,
    },
    /// `for (var key in object)` or `for (key in object)`
    ForIn {
        key: SymbolId,
        declared: bool,
        object: Expr,
        body: Box<Stmt>,
    },
    Block(Block),
    Try(TryStmt),
    Labeled {
        label: String,
        body: Box<Stmt>,
    },
    Break(Option<String>),
    Continue(Option<String>),
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Empty,
}

/// Variable declarator inside a `var` statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: SymbolId,
    pub init: Option<Expr>,
    pub info: SourceInfo,
}

/// `for` loop initializer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForInit {
    Vars(Vec<VarDecl>),
    Expr(Expr),
}

/// `try` statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryStmt {
    pub try_block: Block,
    pub catches: Vec<Catch>,
    pub finally: Option<Block>,
}

/// `catch (param) { body }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catch {
    pub param: SymbolId,
    /// Scope holding the parameter
    pub scope: ScopeId,
    pub body: Block,
    pub info: SourceInfo,
}

/// `case test:` or `default:` followed by statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// None for `default`
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

impl Stmt {
    pub fn new(kind: StmtKind, info: SourceInfo) -> Self {
        Self { kind, info }
    }

    /// Expression statement located at the expression
    pub fn expr(expr: Expr) -> Self {
        let info = expr.info.clone();
        Self::new(StmtKind::Expr(expr), info)
    }

    pub fn vars(decls: Vec<VarDecl>, info: SourceInfo) -> Self {
        Self::new(StmtKind::Vars(decls), info)
    }

    pub fn ret(expr: Option<Expr>, info: SourceInfo) -> Self {
        Self::new(StmtKind::Return(expr), info)
    }

    pub fn block(statements: Vec<Stmt>, info: SourceInfo) -> Self {
        let block = Block::new(statements, info.clone());
        Self::new(StmtKind::Block(block), info)
    }

    /// `return` or `throw`
    pub fn is_exit(&self) -> bool {
        matches!(self.kind, StmtKind::Return(_) | StmtKind::Throw(_))
    }

    pub fn is_vars(&self) -> bool {
        matches!(self.kind, StmtKind::Vars(_))
    }
}

/// Expression with its source location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub info: SourceInfo,
}

/// Expression kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// `name` or `qualifier.name`
    NameRef {
        qualifier: Option<Box<Expr>>,
        name: RefName,
    },
    /// `array[index]`
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    /// `callee(args)`
    Invocation {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `new ctor(args)`
    New {
        ctor: Box<Expr>,
        args: Vec<Expr>,
    },
    Prefix {
        op: PrefixOp,
        operand: Box<Expr>,
    },
    Postfix {
        op: PostfixOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `cond ? then_expr : else_expr`
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Literal(Literal),
    ArrayLiteral(Vec<Expr>),
    ObjectLiteral(Vec<Property>),
    Function(Box<Function>),
}

/// Referenced name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RefName {
    /// Resolved binding
    Symbol(SymbolId),
    /// Property name looked up on the qualifier
    Property(String),
}

/// Object literal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefixOp {
    Inc,
    Dec,
    Neg,
    Plus,
    Not,
    Typeof,
    Delete,
    Void,
}

impl PrefixOp {
    /// Whether the operand is written to
    pub fn modifies_operand(self) -> bool {
        matches!(self, PrefixOp::Inc | PrefixOp::Dec | PrefixOp::Delete)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            PrefixOp::Inc => "++",
            PrefixOp::Dec => "--",
            PrefixOp::Neg => "-",
            PrefixOp::Plus => "+",
            PrefixOp::Not => "!",
            PrefixOp::Typeof => "typeof",
            PrefixOp::Delete => "delete",
            PrefixOp::Void => "void",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostfixOp {
    Inc,
    Dec,
}

impl PostfixOp {
    pub fn symbol(self) -> &'static str {
        match self {
            PostfixOp::Inc => "++",
            PostfixOp::Dec => "--",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    Comma,
    Or,
    And,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    InstanceOf,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    /// `=` and the compound assignments
    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            BinaryOp::Assign
                | BinaryOp::AddAssign
                | BinaryOp::SubAssign
                | BinaryOp::MulAssign
                | BinaryOp::DivAssign
                | BinaryOp::ModAssign
        )
    }

    /// Arithmetic operator applied by a compound assignment
    pub fn compound_operator(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::AddAssign => Some(BinaryOp::Add),
            BinaryOp::SubAssign => Some(BinaryOp::Sub),
            BinaryOp::MulAssign => Some(BinaryOp::Mul),
            BinaryOp::DivAssign => Some(BinaryOp::Div),
            BinaryOp::ModAssign => Some(BinaryOp::Mod),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Assign => "=",
            BinaryOp::AddAssign => "+=",
            BinaryOp::SubAssign => "-=",
            BinaryOp::MulAssign => "*=",
            BinaryOp::DivAssign => "/=",
            BinaryOp::ModAssign => "%=",
            BinaryOp::Comma => ",",
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::InstanceOf => "instanceof",
            BinaryOp::In => "in",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, info: SourceInfo) -> Self {
        Self { kind, info }
    }

    /// Unqualified reference to a symbol
    pub fn name(symbol: SymbolId, info: SourceInfo) -> Self {
        Self::new(
            ExprKind::NameRef {
                qualifier: None,
                name: RefName::Symbol(symbol),
            },
            info,
        )
    }

    /// `qualifier.property`
    pub fn property(qualifier: Expr, property: impl Into<String>, info: SourceInfo) -> Self {
        Self::new(
            ExprKind::NameRef {
                qualifier: Some(Box::new(qualifier)),
                name: RefName::Property(property.into()),
            },
            info,
        )
    }

    pub fn number(value: f64, info: SourceInfo) -> Self {
        Self::new(ExprKind::Literal(Literal::Number(value)), info)
    }

    pub fn string(value: impl Into<String>, info: SourceInfo) -> Self {
        Self::new(ExprKind::Literal(Literal::String(value.into())), info)
    }

    pub fn bool(value: bool, info: SourceInfo) -> Self {
        Self::new(ExprKind::Literal(Literal::Bool(value)), info)
    }

    pub fn null(info: SourceInfo) -> Self {
        Self::new(ExprKind::Literal(Literal::Null), info)
    }

    pub fn undefined(info: SourceInfo) -> Self {
        Self::new(ExprKind::Literal(Literal::Undefined), info)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr, info: SourceInfo) -> Self {
        Self::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            info,
        )
    }

    pub fn assign(target: Expr, value: Expr, info: SourceInfo) -> Self {
        Self::binary(BinaryOp::Assign, target, value, info)
    }

    pub fn comma(first: Expr, second: Expr, info: SourceInfo) -> Self {
        Self::binary(BinaryOp::Comma, first, second, info)
    }

    pub fn prefix(op: PrefixOp, operand: Expr, info: SourceInfo) -> Self {
        Self::new(
            ExprKind::Prefix {
                op,
                operand: Box::new(operand),
            },
            info,
        )
    }

    pub fn postfix(op: PostfixOp, operand: Expr, info: SourceInfo) -> Self {
        Self::new(
            ExprKind::Postfix {
                op,
                operand: Box::new(operand),
            },
            info,
        )
    }

    pub fn index(array: Expr, index: Expr, info: SourceInfo) -> Self {
        Self::new(
            ExprKind::ArrayAccess {
                array: Box::new(array),
                index: Box::new(index),
            },
            info,
        )
    }

    pub fn invoke(callee: Expr, args: Vec<Expr>, info: SourceInfo) -> Self {
        Self::new(
            ExprKind::Invocation {
                callee: Box::new(callee),
                args,
            },
            info,
        )
    }

    pub fn construct(ctor: Expr, args: Vec<Expr>, info: SourceInfo) -> Self {
        Self::new(
            ExprKind::New {
                ctor: Box::new(ctor),
                args,
            },
            info,
        )
    }

    /// Symbol of an unqualified name reference
    pub fn as_symbol(&self) -> Option<SymbolId> {
        match &self.kind {
            ExprKind::NameRef {
                qualifier: None,
                name: RefName::Symbol(symbol),
            } => Some(*symbol),
            _ => None,
        }
    }

    /// Conservative side-effect analysis
    ///
    /// Returns true when evaluating the expression might write state, call
    /// code, or throw. Unqualified name reads and function expressions are
    /// treated as pure; property and element reads are not, since they can
    /// throw on `null`.
    pub fn has_side_effects(&self) -> bool {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Function(_) => false,
            ExprKind::NameRef { qualifier, .. } => qualifier.is_some(),
            ExprKind::ArrayAccess { .. }
            | ExprKind::Invocation { .. }
            | ExprKind::New { .. }
            | ExprKind::Postfix { .. } => true,
            ExprKind::Prefix { op, operand } => {
                op.modifies_operand() || operand.has_side_effects()
            }
            ExprKind::Binary { op, left, right } => {
                op.is_assignment()
                    || matches!(op, BinaryOp::InstanceOf | BinaryOp::In)
                    || left.has_side_effects()
                    || right.has_side_effects()
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                cond.has_side_effects()
                    || then_expr.has_side_effects()
                    || else_expr.has_side_effects()
            }
            ExprKind::ArrayLiteral(elements) => elements.iter().any(Expr::has_side_effects),
            ExprKind::ObjectLiteral(properties) => {
                properties.iter().any(|p| p.value.has_side_effects())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> SourceInfo {
        SourceInfo::new("a.js", 1)
    }

    #[test]
    fn test_side_effects() {
        let mut scopes = ScopeTable::new();
        let x = scopes.declare(scopes.program(), "x");

        assert!(!Expr::name(x, at()).has_side_effects());
        assert!(!Expr::number(1.0, at()).has_side_effects());
        assert!(!Expr::binary(BinaryOp::Add, Expr::name(x, at()), Expr::number(1.0, at()), at())
            .has_side_effects());

        assert!(Expr::property(Expr::name(x, at()), "y", at()).has_side_effects());
        assert!(Expr::invoke(Expr::name(x, at()), vec![], at()).has_side_effects());
        assert!(Expr::assign(Expr::name(x, at()), Expr::number(1.0, at()), at()).has_side_effects());
        assert!(Expr::postfix(PostfixOp::Inc, Expr::name(x, at()), at()).has_side_effects());
        assert!(Expr::prefix(PrefixOp::Delete, Expr::name(x, at()), at()).has_side_effects());
        assert!(!Expr::prefix(PrefixOp::Not, Expr::name(x, at()), at()).has_side_effects());
    }

    #[test]
    fn test_ends_with_exit() {
        let mut scopes = ScopeTable::new();
        let x = scopes.declare(scopes.program(), "x");
        let block = Block::new(
            vec![
                Stmt::expr(Expr::name(x, at())),
                Stmt::ret(None, at()),
            ],
            at(),
        );
        assert!(block.ends_with_exit());
        assert!(!Block::new(vec![], at()).ends_with_exit());
    }

    #[test]
    fn test_versioned_program_json() {
        let mut program = Program::new();
        let x = program.scopes.declare(program.scopes.program(), "x");
        program.global_block.statements.push(Stmt::vars(
            vec![VarDecl {
                name: x,
                init: Some(Expr::number(1.0, at())),
                info: at(),
            }],
            at(),
        ));

        let versioned = VersionedProgram::new(program.clone());
        let json = versioned.to_json().unwrap();
        assert!(json.contains("\"ast_version\": 1"));

        let restored = VersionedProgram::from_json(&json).unwrap();
        assert_eq!(restored.program, program);
    }
}
