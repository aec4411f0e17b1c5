//! Stack mode resolution and driver tests

mod common;

use common::*;
#[allow(unused_imports)]
use common::{assert_eq, assert_ne};
use rstest::rstest;
use shadowstack_config::{
    BuildConfig, PermutationProperties, RECORD_FILE_NAMES_PROPERTY, RECORD_LINE_NUMBERS_PROPERTY,
};
use shadowstack_core::emulator::{resolve_stack_mode, EmulationOptions, EmulatorError, StackMode};
use shadowstack_core::StackEmulator;

#[rstest]
#[case("strip", StackMode::Strip)]
#[case("native", StackMode::Native)]
#[case("emulated", StackMode::Emulated)]
#[case("EMULATED", StackMode::Emulated)]
#[case("Native", StackMode::Native)]
fn test_mode_values(#[case] value: &str, #[case] expected: StackMode) {
    let oracles = [oracle(Some(value), &[])];
    assert_eq!(resolve_stack_mode(&oracles), Ok(expected));
}

#[test]
fn test_resolution_is_repeatable() {
    let oracles = [oracle(Some("emulated"), &[]), oracle(Some("emulated"), &[])];
    let first = resolve_stack_mode(&oracles);
    let second = resolve_stack_mode(&oracles);
    assert_eq!(first, second);
    assert_eq!(first, Ok(StackMode::Emulated));
}

#[test]
fn test_no_permutations() {
    let oracles: [PermutationProperties; 0] = [];
    assert_eq!(resolve_stack_mode(&oracles), Err(EmulatorError::NoPermutations));
}

#[test]
fn test_missing_property_is_fatal() {
    let oracles = [oracle(None, &[])];
    assert_eq!(
        resolve_stack_mode(&oracles),
        Err(EmulatorError::MissingProperty {
            property: "compiler.stackMode".to_string()
        })
    );
}

#[test]
fn test_invalid_value() {
    let oracles = [oracle(Some("fancy"), &[])];
    assert!(matches!(
        resolve_stack_mode(&oracles),
        Err(EmulatorError::InvalidStackMode { value, .. }) if value == "fancy"
    ));
}

#[test]
fn test_inconsistent_permutations_are_fatal() {
    let oracles = [oracle(Some("emulated"), &[]), oracle(Some("native"), &[])];
    assert_eq!(
        resolve_stack_mode(&oracles),
        Err(EmulatorError::InconsistentProperty {
            property: "compiler.stackMode".to_string(),
            first: "emulated".to_string(),
            other: "native".to_string(),
        })
    );
}

#[test]
fn test_later_permutation_without_property_is_accepted() {
    let oracles = [oracle(Some("native"), &[]), oracle(None, &[])];
    assert_eq!(resolve_stack_mode(&oracles), Ok(StackMode::Native));
}

#[rstest]
#[case(&[], EmulationOptions::new(false, false))]
#[case(&[(RECORD_LINE_NUMBERS_PROPERTY, "true")], EmulationOptions::new(false, true))]
#[case(&[(RECORD_FILE_NAMES_PROPERTY, "TRUE")], EmulationOptions::new(true, true))]
#[case(&[(RECORD_FILE_NAMES_PROPERTY, "false"), (RECORD_LINE_NUMBERS_PROPERTY, "true")], EmulationOptions::new(false, true))]
fn test_options_from_configuration(
    #[case] configuration: &[(&str, &str)],
    #[case] expected: EmulationOptions,
) {
    let options = EmulationOptions::from_oracle(&oracle(Some("emulated"), configuration));
    assert_eq!(options, expected);
}

#[test]
fn test_file_names_imply_line_numbers() {
    let options = EmulationOptions::new(true, false);
    assert!(options.record_line_numbers);
}

#[rstest]
#[case("strip")]
#[case("native")]
fn test_non_emulated_modes_leave_program_alone(#[case] mode: &str) {
    let mut b = builder("Main.java");
    let (_, f) = b.function_decl("f", &[], |b, _| vec![b.return_stmt(None)]);
    b.push(f);
    let mut program = b.finish();
    let before = program.clone();

    let outcome = StackEmulator::exec(&mut program, &[oracle(Some(mode), &[])])
        .expect("mode resolves");

    assert!(!outcome.instrumented());
    assert_eq!(program, before);
}

#[test]
fn test_errors_leave_program_alone() {
    let mut program = builder("Main.java").finish();
    let before = program.clone();

    let result = StackEmulator::exec(&mut program, &[oracle(Some("bogus"), &[])]);

    assert!(result.is_err());
    assert_eq!(program, before);
}

#[test]
fn test_exec_from_build_config() {
    let config = BuildConfig::from_toml_str(
        r#"
[configuration]
"compiler.emulatedStack.recordFileNames" = true

[[permutation]]
"compiler.stackMode" = "emulated"
"user.agent" = "gecko1_8"

[[permutation]]
"compiler.stackMode" = "emulated"
"user.agent" = "safari"
"#,
    )
    .expect("valid configuration");

    let mut b = builder("src/Main.java");
    let g = b.global("g");
    let (_, f) = b.function_decl("f", &[], |b, _| {
        b.at_line(3);
        vec![b.expr_stmt(b.call(b.name(g), vec![]))]
    });
    b.push(f);
    let mut program = b.finish();

    let outcome = StackEmulator::exec(&mut program, &config.permutation_properties())
        .expect("mode resolves");

    assert_eq!(outcome.mode, StackMode::Emulated);
    assert!(outcome.instrumented());
    assert!(print_function(&program, "f").contains("\"Main.java:\" + \"3\", g();"));
}
