//! Formatter tests - printing program trees as JavaScript

use pretty_assertions::assert_eq;
use rstest::rstest;
use shadowstack_core::ast::{BinaryOp, ForInit, PostfixOp, PrefixOp, SwitchCase};
use shadowstack_core::builder::Builder;
use shadowstack_formatter::{
    format_expr, format_function, format_program, format_program_with_config, FormatConfig,
};

fn print_statements<F>(build: F) -> String
where
    F: FnOnce(&mut Builder),
{
    let mut b = Builder::new("Test.java");
    build(&mut b);
    format_program(&b.finish())
}

// === Statements ===

#[test]
fn test_var_statement() {
    let out = print_statements(|b| {
        let x = b.global("x");
        let y = b.global("y");
        let one = b.num(1.0);
        b.push(b.vars_stmt(vec![(x, Some(one)), (y, None)]));
    });
    assert_eq!(out, "var x = 1, y;\n");
}

#[test]
fn test_function_declaration() {
    let out = print_statements(|b| {
        let (_, decl) = b.function_decl("add", &["a", "b"], |b, p| {
            let sum = b.binary(BinaryOp::Add, b.name(p[0]), b.name(p[1]));
            vec![b.return_stmt(Some(sum))]
        });
        b.push(decl);
    });
    assert_eq!(out, "function add(a, b) {\n  return a + b;\n}\n");
}

#[test]
fn test_empty_function_declaration() {
    let out = print_statements(|b| {
        let (_, decl) = b.function_decl("noop", &[], |_, _| vec![]);
        b.push(decl);
    });
    assert_eq!(out, "function noop() {}\n");
}

#[test]
fn test_if_else_chain() {
    let out = print_statements(|b| {
        let x = b.global("x");
        let inner = b.if_stmt(
            b.name(x),
            b.block(vec![b.return_stmt(None)]),
            Some(b.block(vec![b.empty()])),
        );
        let outer = b.if_stmt(b.boolean(false), b.block(vec![]), Some(inner));
        b.push(outer);
    });
    assert_eq!(
        out,
        "if (false) {} else if (x) {\n  return;\n} else {\n  ;\n}\n"
    );
}

#[test]
fn test_unbraced_if_body() {
    let out = print_statements(|b| {
        let x = b.global("x");
        let stmt = b.if_stmt(b.name(x), b.return_stmt(Some(b.num(1.0))), None);
        b.push(stmt);
    });
    assert_eq!(out, "if (x)\n  return 1;\n");
}

#[test]
fn test_for_loop_header() {
    let out = print_statements(|b| {
        let i = b.global("i");
        let init = ForInit::Vars(b.decls(vec![(i, Some(b.num(0.0)))]));
        let cond = b.binary(BinaryOp::Lt, b.name(i), b.num(3.0));
        let incr = b.postfix(PostfixOp::Inc, b.name(i));
        let body = b.block(vec![]);
        b.push(b.for_stmt(Some(init), Some(cond), Some(incr), body));
        b.push(b.for_stmt(None, None, None, b.block(vec![b.break_stmt(None)])));
    });
    assert_eq!(
        out,
        "for (var i = 0; i < 3; i++) {}\nfor (;;) {\n  break;\n}\n"
    );
}

#[test]
fn test_try_catch_finally() {
    let out = print_statements(|b| {
        let f = b.global("f");
        let catch = b.catch_clause("e", |b, e| vec![b.throw_stmt(b.name(e))]);
        let call = b.call(b.name(f), vec![]);
        let stmt = b.try_stmt(
            vec![b.expr_stmt(call.clone())],
            vec![catch],
            Some(vec![b.expr_stmt(call)]),
        );
        b.push(stmt);
    });
    assert_eq!(
        out,
        "try {\n  f();\n} catch (e) {\n  throw e;\n} finally {\n  f();\n}\n"
    );
}

#[test]
fn test_labeled_loop_and_do_while() {
    let out = print_statements(|b| {
        let body = b.block(vec![b.continue_stmt(Some("outer"))]);
        let do_while = b.do_while_stmt(body, b.boolean(true));
        b.push(b.labeled("outer", do_while));
    });
    assert_eq!(out, "outer: do {\n  continue outer;\n} while (true);\n");
}

#[test]
fn test_switch() {
    let out = print_statements(|b| {
        let x = b.global("x");
        let cases = vec![
            SwitchCase {
                test: Some(b.num(1.0)),
                body: vec![b.break_stmt(None)],
            },
            SwitchCase {
                test: None,
                body: vec![],
            },
        ];
        b.push(b.switch_stmt(b.name(x), cases));
    });
    assert_eq!(out, "switch (x) {\n  case 1:\n    break;\n  default:\n}\n");
}

#[test]
fn test_for_in() {
    let out = print_statements(|b| {
        let k = b.global("k");
        let o = b.global("o");
        b.push(b.for_in_stmt(k, b.name(o), b.block(vec![])));
    });
    assert_eq!(out, "for (var k in o) {}\n");
}

// === Expressions ===

#[rstest]
#[case::comma_in_argument(BinaryOp::Comma, "f((a, b))")]
#[case::assignment_in_argument(BinaryOp::Assign, "f(a = b)")]
#[case::addition_in_argument(BinaryOp::Add, "f(a + b)")]
fn test_argument_parentheses(#[case] op: BinaryOp, #[case] expected: &str) {
    let mut b = Builder::new("a.js");
    let f = b.global("f");
    let a = b.global("a");
    let c = b.global("b");
    let expr = b.call(b.name(f), vec![b.binary(op, b.name(a), b.name(c))]);
    let program = b.finish();
    assert_eq!(format_expr(&program.scopes, &expr), expected);
}

#[test]
fn test_precedence_parentheses() {
    let mut b = Builder::new("a.js");
    let a = b.global("a");
    let c = b.global("c");
    let sum = b.binary(BinaryOp::Add, b.name(a), b.name(c));
    let product = b.binary(BinaryOp::Mul, sum, b.num(2.0));
    let program = b.finish();
    assert_eq!(format_expr(&program.scopes, &product), "(a + c) * 2");
}

#[test]
fn test_stack_push_shape() {
    let mut b = Builder::new("a.js");
    let stack = b.global("$es_stack");
    let depth = b.global("$es_stackDepth");
    let index = b.global("$es_stackIndex");
    let foo = b.global("foo");

    let bump = b.prefix(PrefixOp::Inc, b.name(depth));
    let slot = b.assign(b.name(index), bump);
    let push = b.assign(b.index(b.name(stack), slot), b.name(foo));
    let program = b.finish();

    insta::assert_snapshot!(
        format_expr(&program.scopes, &push),
        @"$es_stack[$es_stackIndex = ++$es_stackDepth] = foo"
    );
}

#[test]
fn test_literals() {
    let mut b = Builder::new("a.js");
    let object = b.object(vec![
        ("name", b.string("say \"hi\"")),
        ("my-key", b.num(0.5)),
    ]);
    let array = b.array(vec![b.null(), b.undefined(), b.num(-1.0)]);
    let program = b.finish();

    assert_eq!(
        format_expr(&program.scopes, &object),
        "{name: \"say \\\"hi\\\"\", \"my-key\": 0.5}"
    );
    assert_eq!(format_expr(&program.scopes, &array), "[null, undefined, -1]");
}

#[test]
fn test_prefix_spacing() {
    let mut b = Builder::new("a.js");
    let x = b.global("x");
    let neg = b.prefix(PrefixOp::Neg, b.prefix(PrefixOp::Neg, b.name(x)));
    let type_of = b.prefix(PrefixOp::Typeof, b.name(x));
    let program = b.finish();

    assert_eq!(format_expr(&program.scopes, &neg), "- -x");
    assert_eq!(format_expr(&program.scopes, &type_of), "typeof x");
}

#[test]
fn test_new_and_member() {
    let mut b = Builder::new("a.js");
    let error = b.root_name("Error").expect("Error is a root name");
    let created = b.new_expr(b.name(error), vec![b.string("boom")]);
    let message = b.prop(created, "message");
    let program = b.finish();
    assert_eq!(
        format_expr(&program.scopes, &message),
        "new Error(\"boom\").message"
    );
}

// === Functions and configuration ===

#[test]
fn test_nested_function_indentation() {
    let mut b = Builder::new("a.js");
    let outer = b.function(Some("outer"), &[], |b, _| {
        let inner = b.function(None, &["x"], |b, p| vec![b.return_stmt(Some(b.name(p[0])))]);
        let inner = b.function_expr(inner);
        vec![b.return_stmt(Some(inner))]
    });
    let program = b.finish();

    assert_eq!(
        format_function(&program.scopes, &outer),
        "function outer() {\n  return function (x) {\n    return x;\n  };\n}\n"
    );
}

#[test]
fn test_indent_size_config() {
    let mut b = Builder::new("a.js");
    let stmt = b.block(vec![b.empty()]);
    b.push(stmt);
    let program = b.finish();

    let config = FormatConfig::default().with_indent_size(4);
    assert_eq!(format_program_with_config(&program, &config), "{\n    ;\n}\n");
}

#[test]
fn test_anonymous_function_statement_is_parenthesized() {
    let out = print_statements(|b| {
        let f = b.function(None, &[], |_, _| vec![]);
        let expr = b.function_expr(f);
        b.push(b.expr_stmt(expr));
    });
    assert_eq!(out, "(function () {});\n");
}
