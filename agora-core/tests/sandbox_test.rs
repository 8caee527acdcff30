//! End-to-end behavior of the deterministic-compute sandbox: validation
//! gating, context discipline, limits, and the documented scenarios.

use agora_core::config::SandboxConfig;
use agora_core::sandbox::{
    ComputeMode, Evaluation, ExecutionContext, FailureKind, Sandbox, Validation, Value,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn sandbox() -> Sandbox {
    Sandbox::new(SandboxConfig::default())
}

fn evaluate(sandbox: &Sandbox, context: &mut ExecutionContext, source: &str) -> Evaluation {
    sandbox.evaluate(source, context, ComputeMode::Analytics)
}

#[test]
fn scenario_reversal() {
    let sandbox = sandbox();
    let mut context = ExecutionContext::new();

    let result = evaluate(&sandbox, &mut context, "'NcS9euQa'[::-1]");
    assert_eq!(
        result,
        Evaluation::Success {
            value: "aQue9ScN".to_string()
        }
    );
    assert_eq!(
        context.last_result(),
        Some(&Value::String("aQue9ScN".to_string()))
    );
}

#[test]
fn scenario_split_and_index() {
    let sandbox = sandbox();
    let mut context = ExecutionContext::new();

    let result = evaluate(
        &sandbox,
        &mut context,
        "'apple,banana,cherry'.split(',')[1]",
    );
    assert_eq!(
        result,
        Evaluation::Success {
            value: "banana".to_string()
        }
    );
}

#[test]
fn scenario_import_never_reaches_execution() {
    let sandbox = sandbox();
    let context = ExecutionContext::new();

    let validation = sandbox.validate("__import__('os').system('ls')", &context);
    match validation {
        Validation::Reject(rejection) => {
            assert!(matches!(
                rejection.kind,
                FailureKind::DisallowedName | FailureKind::DisallowedConstruct
            ));
        }
        Validation::Pass => panic!("escape vector passed validation"),
    }

    // Through evaluate as well: rejected, and the context is untouched.
    let mut context = ExecutionContext::new();
    let result = evaluate(&sandbox, &mut context, "__import__('os').system('ls')");
    assert!(!result.is_success());
    assert!(context.is_empty());
}

#[test]
fn scenario_cold_last_result_is_a_name_error() {
    let sandbox = sandbox();
    let mut context = ExecutionContext::new();

    let result = evaluate(&sandbox, &mut context, "last_result + '!'");
    assert!(matches!(
        result,
        Evaluation::Failure {
            kind: FailureKind::NameError,
            ..
        }
    ));
    assert!(context.is_empty());
}

#[test]
fn scenario_last_result_chain() {
    let sandbox = sandbox();
    let mut context = ExecutionContext::new();

    assert!(evaluate(&sandbox, &mut context, "'NcS9euQa'[::-1]").is_success());
    let result = evaluate(&sandbox, &mut context, "last_result.upper()");
    assert_eq!(
        result,
        Evaluation::Success {
            value: "AQUE9SCN".to_string()
        }
    );
    assert_eq!(
        context.last_result(),
        Some(&Value::String("AQUE9SCN".to_string()))
    );
}

#[test]
fn statement_forms_are_disallowed_constructs() {
    let sandbox = sandbox();
    let context = ExecutionContext::new();

    for source in [
        "import os",
        "from os import path",
        "while True",
        "def f(): pass",
        "class A: pass",
        "lambda x: x + 1",
        "del x",
        "1\n2",
    ] {
        match sandbox.validate(source, &context) {
            Validation::Reject(rejection) => {
                assert_eq!(
                    rejection.kind,
                    FailureKind::DisallowedConstruct,
                    "wrong kind for {:?}",
                    source
                );
            }
            Validation::Pass => panic!("{:?} passed validation", source),
        }
    }
}

#[test]
fn failures_leave_the_context_identical() {
    let sandbox = sandbox();
    let mut context = ExecutionContext::new();
    assert!(evaluate(&sandbox, &mut context, "'seed'").is_success());
    let snapshot = context.clone();

    for source in [
        "1 / 0",
        "unknown_name",
        "'a' + 1",
        "import os",
        "[x for x in range(999999999)]",
        "'x' * 5000",
    ] {
        let result = evaluate(&sandbox, &mut context, source);
        assert!(!result.is_success(), "{:?} unexpectedly succeeded", source);
        assert_eq!(context, snapshot, "context drifted after {:?}", source);
    }
}

#[test]
fn output_ceiling_is_stricter_for_validation_mode() {
    let sandbox = sandbox();
    let source = "'x' * 300";

    let mut context = ExecutionContext::new();
    assert!(sandbox
        .evaluate(source, &mut context, ComputeMode::Analytics)
        .is_success());

    let mut context = ExecutionContext::new();
    let result = sandbox.evaluate(source, &mut context, ComputeMode::Validation);
    assert!(matches!(
        result,
        Evaluation::Failure {
            kind: FailureKind::OutputTooLong,
            ..
        }
    ));

    // Past the analytics ceiling too
    let mut context = ExecutionContext::new();
    let result = sandbox.evaluate("'x' * 2000", &mut context, ComputeMode::Analytics);
    assert!(matches!(
        result,
        Evaluation::Failure {
            kind: FailureKind::OutputTooLong,
            ..
        }
    ));
}

#[test]
fn bindings_persist_for_later_steps() {
    let sandbox = sandbox();
    let mut context = ExecutionContext::new();

    assert!(evaluate(&sandbox, &mut context, "parts = 'a,b,c'.split(',')").is_success());
    let result = evaluate(&sandbox, &mut context, "len(parts)");
    assert_eq!(
        result,
        Evaluation::Success {
            value: "3".to_string()
        }
    );
}

#[test]
fn binding_can_be_disabled_by_policy() {
    let config = SandboxConfig {
        allow_binding: false,
        ..SandboxConfig::default()
    };
    let sandbox = Sandbox::new(config);
    let mut context = ExecutionContext::new();

    let result = evaluate(&sandbox, &mut context, "x = 1");
    assert!(matches!(
        result,
        Evaluation::Failure {
            kind: FailureKind::DisallowedConstruct,
            ..
        }
    ));
    // Plain expressions still work
    assert!(evaluate(&sandbox, &mut context, "1 + 1").is_success());
}

#[test]
fn empty_expression_is_a_syntax_error() {
    let sandbox = sandbox();
    let mut context = ExecutionContext::new();

    let result = evaluate(&sandbox, &mut context, "");
    assert!(matches!(
        result,
        Evaluation::Failure {
            kind: FailureKind::SyntaxError,
            ..
        }
    ));
}

proptest! {
    // Reversal is an involution and preserves length, regardless of input.
    #[test]
    fn reversal_round_trips(s in "[a-zA-Z0-9]{1,30}") {
        let sandbox = sandbox();
        let mut context = ExecutionContext::new();

        let source = format!("'{}'[::-1]", s);
        let reversed = match evaluate(&sandbox, &mut context, &source) {
            Evaluation::Success { value } => value,
            other => panic!("reversal failed: {:?}", other),
        };
        prop_assert_eq!(reversed.len(), s.len());

        let source = format!("'{}'[::-1]", reversed);
        let doubled = match evaluate(&sandbox, &mut context, &source) {
            Evaluation::Success { value } => value,
            other => panic!("reversal failed: {:?}", other),
        };
        prop_assert_eq!(doubled, s);
    }

    // Case transforms preserve length for ascii inputs.
    #[test]
    fn case_transforms_preserve_length(s in "[a-zA-Z0-9]{1,30}") {
        let sandbox = sandbox();
        let mut context = ExecutionContext::new();

        for method in ["upper", "lower"] {
            let source = format!("'{}'.{}()", s, method);
            match evaluate(&sandbox, &mut context, &source) {
                Evaluation::Success { value } => prop_assert_eq!(value.len(), s.len()),
                other => panic!("{} failed: {:?}", method, other),
            }
        }
    }

    // Evaluating the same pure expression twice in fresh contexts is
    // deterministic.
    #[test]
    fn evaluation_is_deterministic(s in "[a-zA-Z0-9,]{1,20}") {
        let sandbox = sandbox();
        let source = format!("sorted('{}'.split(','))", s);

        let mut first_context = ExecutionContext::new();
        let mut second_context = ExecutionContext::new();
        let first = evaluate(&sandbox, &mut first_context, &source);
        let second = evaluate(&sandbox, &mut second_context, &source);
        prop_assert_eq!(first, second);
    }
}
