//! Tree visitor for printing

use shadowstack_core::ast::*;
use shadowstack_core::symbol::{ScopeTable, SymbolId};

use crate::formatter::FormatConfig;

// Binding strength, loosest first
const PREC_COMMA: u8 = 1;
const PREC_ASSIGN: u8 = 2;
const PREC_CONDITIONAL: u8 = 3;
const PREC_PREFIX: u8 = 15;
const PREC_POSTFIX: u8 = 16;
const PREC_MEMBER: u8 = 18;
const PREC_PRIMARY: u8 = 20;

/// Visitor that produces JavaScript text
pub struct PrintVisitor<'a> {
    /// Output buffer
    output: String,
    /// Current indentation level
    indent_level: usize,
    config: FormatConfig,
    scopes: &'a ScopeTable,
}

impl<'a> PrintVisitor<'a> {
    pub fn new(config: FormatConfig, scopes: &'a ScopeTable) -> Self {
        Self {
            output: String::new(),
            indent_level: 0,
            config,
            scopes,
        }
    }

    pub fn into_output(self) -> String {
        self.output
    }

    fn nested(&self) -> PrintVisitor<'a> {
        PrintVisitor {
            output: String::new(),
            indent_level: self.indent_level + 1,
            config: self.config.clone(),
            scopes: self.scopes,
        }
    }

    fn write_indent(&mut self) {
        let spaces = " ".repeat(self.indent_level * self.config.indent_size);
        self.output.push_str(&spaces);
    }

    fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn writeln(&mut self) {
        self.output.push('\n');
    }

    fn ident(&self, symbol: SymbolId) -> &'a str {
        let symbol = self.scopes.symbol(symbol);
        if self.config.short_idents && symbol.obfuscatable {
            &symbol.short_ident
        } else {
            &symbol.ident
        }
    }

    // === Statements ===

    /// Print a statement on its own line(s)
    pub fn visit_statement(&mut self, stmt: &Stmt) {
        self.write_indent();
        self.visit_statement_inline(stmt);
        self.writeln();
    }

    /// Print a statement at the current position, without the final newline
    fn visit_statement_inline(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.visit_expr_stmt(expr),
            StmtKind::Vars(decls) => {
                let text = self.decls_text(decls);
                self.write(&text);
                self.write(";");
            }
            StmtKind::Return(expr) => {
                self.write("return");
                if let Some(expr) = expr {
                    let text = self.expr(expr, 0);
                    self.write(" ");
                    self.write(&text);
                }
                self.write(";");
            }
            StmtKind::Throw(expr) => {
                let text = self.expr(expr, 0);
                self.write("throw ");
                self.write(&text);
                self.write(";");
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.visit_if(cond, then_branch, else_branch.as_deref()),
            StmtKind::While { cond, body } => {
                let cond = self.expr(cond, 0);
                self.write(&format!("while ({})", cond));
                self.visit_body(body);
            }
            StmtKind::DoWhile { body, cond } => {
                self.write("do");
                self.visit_body(body);
                self.write_continuation(body);
                let cond = self.expr(cond, 0);
                self.write(&format!("while ({});", cond));
            }
            StmtKind::For {
                init,
                cond,
                incr,
                body,
            } => {
                let init = match init {
                    Some(ForInit::Vars(decls)) => self.decls_text(decls),
                    Some(ForInit::Expr(expr)) => self.expr(expr, 0),
                    None => String::new(),
                };
                let clause = |e: &Option<Expr>| {
                    e.as_ref()
                        .map(|e| format!(" {}", self.expr(e, 0)))
                        .unwrap_or_default()
                };
                let header = format!("for ({};{};{})", init, clause(cond), clause(incr));
                self.write(&header);
                self.visit_body(body);
            }
            StmtKind::ForIn {
                key,
                declared,
                object,
                body,
            } => {
                let object = self.expr(object, 0);
                let var = if *declared { "var " } else { "" };
                self.write(&format!("for ({}{} in {})", var, self.ident(*key), object));
                self.visit_body(body);
            }
            StmtKind::Block(block) => self.visit_block(block),
            StmtKind::Try(t) => self.visit_try(t),
            StmtKind::Labeled { label, body } => {
                self.write(label);
                self.write(": ");
                self.visit_statement_inline(body);
            }
            StmtKind::Break(label) => self.visit_jump("break", label.as_deref()),
            StmtKind::Continue(label) => self.visit_jump("continue", label.as_deref()),
            StmtKind::Switch {
                discriminant,
                cases,
            } => self.visit_switch(discriminant, cases),
            StmtKind::Empty => self.write(";"),
        }
    }

    fn visit_expr_stmt(&mut self, expr: &Expr) {
        if let ExprKind::Function(function) = &expr.kind {
            if function.name.is_some() {
                // declaration
                let text = self.function_text(function);
                self.write(&text);
                return;
            }
        }

        let text = self.expr(expr, 0);
        if text.starts_with('{') || text.starts_with("function") {
            self.write(&format!("({});", text));
        } else {
            self.write(&text);
            self.write(";");
        }
    }

    fn visit_if(&mut self, cond: &Expr, then_branch: &Stmt, else_branch: Option<&Stmt>) {
        let cond = self.expr(cond, 0);
        self.write(&format!("if ({})", cond));
        self.visit_body(then_branch);

        if let Some(else_branch) = else_branch {
            self.write_continuation(then_branch);
            self.write("else");
            if matches!(else_branch.kind, StmtKind::If { .. }) {
                self.write(" ");
                self.visit_statement_inline(else_branch);
            } else {
                self.visit_body(else_branch);
            }
        }
    }

    /// Body of a compound statement: a braced block on the same line, any
    /// other statement indented on the next line
    fn visit_body(&mut self, body: &Stmt) {
        match &body.kind {
            StmtKind::Block(block) => {
                self.write(" ");
                self.visit_block(block);
            }
            _ => {
                self.indent_level += 1;
                self.writeln();
                self.write_indent();
                self.visit_statement_inline(body);
                self.indent_level -= 1;
            }
        }
    }

    /// Separator before `else` or `while` following a body
    fn write_continuation(&mut self, body: &Stmt) {
        if matches!(body.kind, StmtKind::Block(_)) {
            self.write(" ");
        } else {
            self.writeln();
            self.write_indent();
        }
    }

    fn visit_block(&mut self, block: &Block) {
        self.write("{");
        if block.statements.is_empty() {
            self.write("}");
            return;
        }
        self.writeln();
        self.indent_level += 1;
        for stmt in &block.statements {
            self.visit_statement(stmt);
        }
        self.indent_level -= 1;
        self.write_indent();
        self.write("}");
    }

    fn visit_try(&mut self, t: &TryStmt) {
        self.write("try ");
        self.visit_block(&t.try_block);
        for catch in &t.catches {
            self.write(&format!(" catch ({}) ", self.ident(catch.param)));
            self.visit_block(&catch.body);
        }
        if let Some(finally) = &t.finally {
            self.write(" finally ");
            self.visit_block(finally);
        }
    }

    fn visit_jump(&mut self, keyword: &str, label: Option<&str>) {
        self.write(keyword);
        if let Some(label) = label {
            self.write(" ");
            self.write(label);
        }
        self.write(";");
    }

    fn visit_switch(&mut self, discriminant: &Expr, cases: &[SwitchCase]) {
        let discriminant = self.expr(discriminant, 0);
        self.write(&format!("switch ({}) {{", discriminant));
        self.writeln();
        self.indent_level += 1;
        for case in cases {
            self.write_indent();
            match &case.test {
                Some(test) => {
                    let test = self.expr(test, 0);
                    self.write(&format!("case {}:", test));
                }
                None => self.write("default:"),
            }
            self.writeln();
            self.indent_level += 1;
            for stmt in &case.body {
                self.visit_statement(stmt);
            }
            self.indent_level -= 1;
        }
        self.indent_level -= 1;
        self.write_indent();
        self.write("}");
    }

    fn decls_text(&self, decls: &[VarDecl]) -> String {
        let parts: Vec<String> = decls
            .iter()
            .map(|decl| match &decl.init {
                Some(init) => format!("{} = {}", self.ident(decl.name), self.expr(init, PREC_ASSIGN)),
                None => self.ident(decl.name).to_string(),
            })
            .collect();
        format!("var {}", parts.join(", "))
    }

    // === Functions ===

    pub fn function_text(&self, function: &Function) -> String {
        let name = match function.name {
            Some(name) => format!("function {}", self.ident(name)),
            None => "function ".to_string(),
        };
        let params: Vec<&str> = function.params.iter().map(|p| self.ident(*p)).collect();
        let mut text = format!("{}({}) {{", name, params.join(", "));

        if function.body.statements.is_empty() {
            text.push('}');
            return text;
        }

        let mut body = self.nested();
        for stmt in &function.body.statements {
            body.visit_statement(stmt);
        }
        text.push('\n');
        text.push_str(&body.into_output());
        text.push_str(&" ".repeat(self.indent_level * self.config.indent_size));
        text.push('}');
        text
    }

    // === Expressions ===

    pub fn expr_text(&self, expr: &Expr) -> String {
        self.expr(expr, 0)
    }

    /// Print `expr`, parenthesized when it binds looser than `min_prec`
    fn expr(&self, expr: &Expr, min_prec: u8) -> String {
        let (text, prec) = self.expr_with_prec(expr);
        if prec < min_prec {
            format!("({})", text)
        } else {
            text
        }
    }

    fn expr_with_prec(&self, expr: &Expr) -> (String, u8) {
        match &expr.kind {
            ExprKind::NameRef { qualifier, name } => {
                let name = match name {
                    RefName::Symbol(symbol) => self.ident(*symbol),
                    RefName::Property(property) => property.as_str(),
                };
                match qualifier {
                    Some(qualifier) => (
                        format!("{}.{}", self.expr(qualifier, PREC_MEMBER), name),
                        PREC_MEMBER,
                    ),
                    None => (name.to_string(), PREC_PRIMARY),
                }
            }
            ExprKind::ArrayAccess { array, index } => (
                format!("{}[{}]", self.expr(array, PREC_MEMBER), self.expr(index, 0)),
                PREC_MEMBER,
            ),
            ExprKind::Invocation { callee, args } => (
                format!("{}({})", self.expr(callee, PREC_MEMBER), self.args_text(args)),
                PREC_MEMBER,
            ),
            ExprKind::New { ctor, args } => {
                let ctor = if matches!(ctor.kind, ExprKind::Invocation { .. }) {
                    format!("({})", self.expr(ctor, 0))
                } else {
                    self.expr(ctor, PREC_MEMBER)
                };
                (format!("new {}({})", ctor, self.args_text(args)), PREC_MEMBER)
            }
            ExprKind::Prefix { op, operand } => {
                let operand = self.expr(operand, PREC_PREFIX);
                let symbol = op.symbol();
                let text = match op {
                    PrefixOp::Typeof | PrefixOp::Delete | PrefixOp::Void => {
                        format!("{} {}", symbol, operand)
                    }
                    // keep `- -x` and `+ +x` from merging into `--x`/`++x`
                    PrefixOp::Neg | PrefixOp::Dec if operand.starts_with('-') => {
                        format!("{} {}", symbol, operand)
                    }
                    PrefixOp::Plus | PrefixOp::Inc if operand.starts_with('+') => {
                        format!("{} {}", symbol, operand)
                    }
                    _ => format!("{}{}", symbol, operand),
                };
                (text, PREC_PREFIX)
            }
            ExprKind::Postfix { op, operand } => (
                format!("{}{}", self.expr(operand, PREC_POSTFIX), op.symbol()),
                PREC_POSTFIX,
            ),
            ExprKind::Binary { op, left, right } => {
                let prec = binary_prec(*op);
                let (left, right) = if op.is_assignment() {
                    (self.expr(left, PREC_CONDITIONAL + 1), self.expr(right, PREC_ASSIGN))
                } else if *op == BinaryOp::Comma {
                    (self.expr(left, PREC_COMMA), self.expr(right, PREC_COMMA))
                } else {
                    (self.expr(left, prec), self.expr(right, prec + 1))
                };
                let text = if *op == BinaryOp::Comma {
                    format!("{}, {}", left, right)
                } else {
                    format!("{} {} {}", left, op.symbol(), right)
                };
                (text, prec)
            }
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => (
                format!(
                    "{} ? {} : {}",
                    self.expr(cond, PREC_CONDITIONAL + 1),
                    self.expr(then_expr, PREC_ASSIGN),
                    self.expr(else_expr, PREC_ASSIGN)
                ),
                PREC_CONDITIONAL,
            ),
            ExprKind::Literal(Literal::Number(n)) if *n < 0.0 => (format_number(*n), PREC_PREFIX),
            ExprKind::Literal(literal) => (literal_text(literal), PREC_PRIMARY),
            ExprKind::ArrayLiteral(elements) => {
                (format!("[{}]", self.args_text(elements)), PREC_PRIMARY)
            }
            ExprKind::ObjectLiteral(properties) => {
                let parts: Vec<String> = properties
                    .iter()
                    .map(|p| format!("{}: {}", property_key(&p.key), self.expr(&p.value, PREC_ASSIGN)))
                    .collect();
                (format!("{{{}}}", parts.join(", ")), PREC_PRIMARY)
            }
            ExprKind::Function(function) => (self.function_text(function), PREC_ASSIGN),
        }
    }

    fn args_text(&self, args: &[Expr]) -> String {
        let parts: Vec<String> = args.iter().map(|a| self.expr(a, PREC_ASSIGN)).collect();
        parts.join(", ")
    }
}

fn binary_prec(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Comma => PREC_COMMA,
        BinaryOp::Assign
        | BinaryOp::AddAssign
        | BinaryOp::SubAssign
        | BinaryOp::MulAssign
        | BinaryOp::DivAssign
        | BinaryOp::ModAssign => PREC_ASSIGN,
        BinaryOp::Or => 4,
        BinaryOp::And => 5,
        BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::StrictEq | BinaryOp::StrictNotEq => 9,
        BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Gt
        | BinaryOp::Ge
        | BinaryOp::InstanceOf
        | BinaryOp::In => 10,
        BinaryOp::Add | BinaryOp::Sub => 12,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 13,
    }
}

fn literal_text(literal: &Literal) -> String {
    match literal {
        Literal::Number(n) => format_number(*n),
        Literal::String(s) => format!("\"{}\"", escape_string(s)),
        Literal::Bool(b) => b.to_string(),
        Literal::Null => "null".to_string(),
        Literal::Undefined => "undefined".to_string(),
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn property_key(key: &str) -> String {
    let is_ident = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if is_ident {
        key.to_string()
    } else {
        format!("\"{}\"", escape_string(key))
    }
}

fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            '\t' => result.push_str("\\t"),
            '\r' => result.push_str("\\r"),
            c => result.push(c),
        }
    }
    result
}
