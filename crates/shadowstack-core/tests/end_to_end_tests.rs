//! End-to-end tests: instrument a program, run it, and read the emulated stack

mod common;

use common::*;
#[allow(unused_imports)]
use common::{assert_eq, assert_ne};
use shadowstack_core::emulator::EmulationOptions;
use shadowstack_core::{Interpreter, Program, ShadowStackProbe, Value};

/// ```text
/// 1  function wrap(e) { return e; }
/// 3  function bar() { throw new Error("boom"); }
/// 6  function foo() { return bar(); }
/// 9  function main() { try { foo(); }
/// 10                   catch (e) { e = wrap(e); caught = e; } }
/// ```
fn throwing_program() -> Program {
    let mut b = builder("Main.java");
    let wrap = b.lookup("wrap").expect("wrap is declared");
    let error = b.root_name("Error").expect("Error is a root name");
    let caught = b.global("caught");
    b.push(b.var_stmt(caught, None));

    b.at_line(3);
    let (bar, decl) = b.function_decl("bar", &[], |b, _| {
        let created = b.new_expr(b.name(error), vec![b.string("boom")]);
        vec![b.throw_stmt(created)]
    });
    b.push(decl);

    b.at_line(6);
    let (foo, decl) = b.function_decl("foo", &[], |b, _| {
        vec![b.return_stmt(Some(b.call(b.name(bar), vec![])))]
    });
    b.push(decl);

    b.at_line(9);
    let (_, decl) = b.function_decl("main", &[], |b, _| {
        let call = b.expr_stmt(b.call(b.name(foo), vec![]));
        b.at_line(10);
        let handler = b.catch_clause("e", |b, e| {
            let wrapped = b.call(b.name(wrap), vec![b.name(e)]);
            vec![
                b.expr_stmt(b.assign(b.name(e), wrapped)),
                b.expr_stmt(b.assign(b.name(caught), b.name(e))),
            ]
        });
        b.at_line(9);
        vec![b.try_stmt(vec![call], vec![handler], None)]
    });
    b.push(decl);

    b.finish()
}

#[test]
fn test_stack_at_throw_shows_every_frame() {
    let mut program = throwing_program();
    let outcome = emulate(&mut program);

    let (result, snapshots, _) = run_instrumented(&program, &outcome, "main");

    assert!(result.is_ok(), "main should catch: {:?}", result);
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].depth, 2);
    assert_eq!(snapshots[0].frames, vec!["main", "foo", "bar"]);
    assert_eq!(snapshots[0].locations, vec![None::<String>; 3]);
}

#[test]
fn test_stack_unwound_after_catch() {
    let mut program = throwing_program();
    let outcome = emulate(&mut program);

    let (_, _, after) = run_instrumented(&program, &outcome, "main");

    let after = after.expect("stack variables are set");
    assert_eq!(after.depth, -1);
    assert!(after.frames.is_empty());
}

#[test]
fn test_recorded_lines_at_throw() {
    let mut program = throwing_program();
    let outcome = emulate_with(&mut program, EmulationOptions::new(false, true));

    let (result, snapshots, after) = run_instrumented(&program, &outcome, "main");

    assert!(result.is_ok());
    assert_eq!(
        snapshots[0].locations,
        vec![Some("9".to_string()), Some("6".to_string()), Some("3".to_string())]
    );
    assert_eq!(after.map(|s| s.depth), Some(-1));
}

#[test]
fn test_recorded_file_names_at_throw() {
    let mut program = throwing_program();
    let outcome = emulate_with(&mut program, EmulationOptions::new(true, false));

    let (_, snapshots, _) = run_instrumented(&program, &outcome, "main");

    assert_eq!(snapshots[0].locations[2], Some("Main.java:3".to_string()));
}

#[test]
fn test_instrumentation_preserves_behavior() {
    let original = throwing_program();
    let mut instrumented = original.clone();
    emulate_with(&mut instrumented, EmulationOptions::new(true, true));

    let (before, caught_before) = run_and_read(&original, "main", "caught");
    let (after, caught_after) = run_and_read(&instrumented, "main", "caught");

    assert_eq!(before, after);
    let describe = |v: Option<Value>| v.map(|v| v.to_string());
    assert_eq!(describe(caught_before), Some("Error: boom".to_string()));
    assert_eq!(describe(caught_after), Some("Error: boom".to_string()));
}

#[test]
fn test_uncaught_exception_leaves_frames_behind() {
    let mut program = throwing_program();
    let outcome = emulate(&mut program);

    let (result, snapshots, after) = run_instrumented(&program, &outcome, "foo");

    assert!(result.is_err());
    assert_eq!(snapshots[0].frames, vec!["foo", "bar"]);
    // nothing caught the exception, so no frame reset the depth
    assert_eq!(after.map(|s| s.depth), Some(1));
}

/// `f() { try { return g(); } finally { h(); } }` where `h` records the depth
#[test]
fn test_finally_runs_before_frame_is_popped() {
    let mut b = builder("Main.java");
    let depth = b.root_name("$stackDepth").expect("$stackDepth is a root name");
    let seen = b.global("seen");
    b.push(b.var_stmt(seen, None));

    let (g, decl) = b.function_decl("g", &[], |b, _| vec![b.return_stmt(Some(b.num(1.0)))]);
    b.push(decl);
    let (h, decl) = b.function_decl("h", &[], |b, _| {
        vec![b.expr_stmt(b.assign(b.name(seen), b.name(depth)))]
    });
    b.push(decl);
    let (_, decl) = b.function_decl("f", &[], |b, _| {
        let ret = b.return_stmt(Some(b.call(b.name(g), vec![])));
        let cleanup = b.expr_stmt(b.call(b.name(h), vec![]));
        vec![b.try_stmt(vec![ret], vec![], Some(vec![cleanup]))]
    });
    b.push(decl);
    let mut program = b.finish();

    let outcome = emulate(&mut program);
    let names = outcome.names.as_ref().expect("program was instrumented");
    let mut interp = Interpreter::new(&program).with_probe(ShadowStackProbe::new(names));
    interp.run().expect("global code runs");
    let result = interp.call_global("f", vec![]);

    assert_eq!(result, Ok(Value::Number(1.0)));
    // `f` still owns slot 0 while `h` runs in slot 1
    assert_eq!(interp.global("seen"), Some(Value::Number(1.0)));
    assert_eq!(interp.probe_now().map(|s| s.depth), Some(-1));
}
