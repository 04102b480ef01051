use crate::*;
use nhaml_compiler::{CodeHost, ReturnKind, UnitSharing};
use serde_json::{json, Value};

fn compile_one(source: &str, kind: ReturnKind) -> EntryPoint {
    let mut host = CodeHost::new("Value", UnitSharing::Dedupe);
    let unit = host.register(source, kind, 1);
    let units = host
        .compile(&Interpreter::new(), &["core".to_string()])
        .expect("Failed to compile");
    units.get(unit).cloned().expect("missing entry point")
}

fn text(source: &str, model: Value) -> Result<String, UnitError> {
    match compile_one(source, ReturnKind::Text) {
        EntryPoint::Text(call) => call(&model),
        other => panic!("unexpected {:?}", other),
    }
}

fn truth(source: &str, model: Value) -> Result<bool, UnitError> {
    match compile_one(source, ReturnKind::Boolean) {
        EntryPoint::Boolean(call) => call(&model),
        other => panic!("unexpected {:?}", other),
    }
}

fn eval_error(err: UnitError) -> EvalError {
    err.downcast_ref::<EvalError>()
        .cloned()
        .expect("expected an EvalError")
}

#[test]
fn test_member_paths_and_missing_data() {
    let model = json!({"user": {"name": "Ann", "tags": ["a", "b"]}});
    assert_eq!(text("model.user.name", model.clone()).unwrap(), "Ann");
    assert_eq!(text("model.user.tags[1]", model.clone()).unwrap(), "b");
    assert_eq!(text("model.user[\"name\"]", model.clone()).unwrap(), "Ann");
    assert_eq!(text("model.user.missing.deeper", model.clone()).unwrap(), "");
    assert_eq!(text("model.user.tags[9]", model.clone()).unwrap(), "");
    assert_eq!(text("model.user.tags", model).unwrap(), "[\"a\",\"b\"]");
}

#[test]
fn test_text_conversion() {
    assert_eq!(text("1 + 2", json!({})).unwrap(), "3");
    assert_eq!(text("7 / 2", json!({})).unwrap(), "3");
    assert_eq!(text("7.0 / 2", json!({})).unwrap(), "3.5");
    assert_eq!(text("7 % 4", json!({})).unwrap(), "3");
    assert_eq!(text("-model.n * 2", json!({"n": 4})).unwrap(), "-8");
    assert_eq!(text("true", json!({})).unwrap(), "true");
    assert_eq!(text("null", json!({})).unwrap(), "");
}

#[test]
fn test_string_concatenation() {
    assert_eq!(
        text("\"Hello \" + model.name + \"!\"", json!({"name": "Bo"})).unwrap(),
        "Hello Bo!"
    );
    assert_eq!(text("\"n=\" + 3", json!({})).unwrap(), "n=3");
    assert_eq!(text("\"\" + \"btn \" + (model.kind)", json!({"kind": "x"})).unwrap(), "btn x");
}

#[test]
fn test_core_functions_in_expressions() {
    let model = json!({"items": ["x", "y"], "name": "  ann "});
    assert_eq!(text("len(model.items)", model.clone()).unwrap(), "2");
    assert_eq!(text("upper(trim(model.name))", model.clone()).unwrap(), "ANN");
    assert_eq!(text("join(model.items, \"-\")", model.clone()).unwrap(), "x-y");
    assert_eq!(text("default(model.nick, \"anon\")", model.clone()).unwrap(), "anon");
    assert!(truth("contains(model.items, \"y\")", model).unwrap());
}

#[test]
fn test_boolean_units() {
    let model = json!({"count": 3, "admin": false, "name": "Ann"});
    assert!(truth("model.count > 2", model.clone()).unwrap());
    assert!(truth("model.count == 3.0", model.clone()).unwrap());
    assert!(truth("!model.admin && model.name != \"Bo\"", model.clone()).unwrap());
    assert!(truth("model.admin || len(model.name) >= 3", model.clone()).unwrap());
    assert!(truth("\"a\" < \"b\"", model.clone()).unwrap());
    // short circuit skips the ill-typed right side
    assert!(!truth("model.admin && model.name", model).unwrap());
}

#[test]
fn test_boolean_unit_rejects_non_bool() {
    let err = truth("model.name", json!({"name": "Ann"})).unwrap_err();
    assert_eq!(
        eval_error(err),
        EvalError::TypeMismatch {
            expected: "bool",
            found: "string"
        }
    );

    let err = truth("model.missing", json!({})).unwrap_err();
    assert!(matches!(
        eval_error(err),
        EvalError::TypeMismatch { found: "null", .. }
    ));
}

#[test]
fn test_runtime_errors() {
    assert_eq!(
        eval_error(text("1 / 0", json!({})).unwrap_err()),
        EvalError::DivisionByZero
    );
    assert!(matches!(
        eval_error(text("model.a - \"x\"", json!({"a": 1})).unwrap_err()),
        EvalError::InvalidOperands { operator: "-", .. }
    ));
    assert!(matches!(
        eval_error(text("model.a.b", json!({"a": 5})).unwrap_err()),
        EvalError::TypeMismatch { expected: "object", found: "number" }
    ));
    assert!(matches!(
        eval_error(text("model.a[\"k\"]", json!({"a": [1]})).unwrap_err()),
        EvalError::InvalidIndex { target: "array", index: "string" }
    ));
}

#[test]
fn test_unknown_reference_is_diagnosed() {
    let mut host = CodeHost::new("Value", UnitSharing::Dedupe);
    host.register("model.x", ReturnKind::Text, 1);
    let err = host
        .compile(&Interpreter::new(), &["core".to_string(), "extras".to_string()])
        .unwrap_err();
    let nhaml_compiler::CompileError::CompilationFailed { diagnostics, .. } = err else {
        panic!("expected CompilationFailed");
    };
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].message.contains("extras"));
}

#[test]
fn test_functions_need_a_reference() {
    let mut host = CodeHost::new("Value", UnitSharing::Dedupe);
    host.register("len(model.items)", ReturnKind::Text, 4);
    let err = host.compile(&Interpreter::new(), &[]).unwrap_err();
    let nhaml_compiler::CompileError::CompilationFailed { diagnostics, .. } = err else {
        panic!("expected CompilationFailed");
    };
    assert_eq!(diagnostics[0].template_line, Some(4));
    assert!(diagnostics[0].message.contains("Unknown function `len`"));
}

#[test]
fn test_all_failures_reported_together() {
    let mut host = CodeHost::new("Value", UnitSharing::Dedupe);
    host.register("model.", ReturnKind::Text, 1);
    host.register("model.ok", ReturnKind::Boolean, 2);
    host.register("missing(1)", ReturnKind::Text, 3);
    let err = host
        .compile(&Interpreter::new(), &["core".to_string()])
        .unwrap_err();
    let nhaml_compiler::CompileError::CompilationFailed { diagnostics, .. } = err else {
        panic!("expected CompilationFailed");
    };
    let lines: Vec<_> = diagnostics.iter().map(|d| d.template_line).collect();
    assert_eq!(lines, vec![Some(1), Some(3)]);
}

#[test]
fn test_format_diagnostics() {
    let mut host = CodeHost::new("Value", UnitSharing::Dedupe);
    host.register("nope(model)", ReturnKind::Text, 2);
    let source = host.program_source();
    let diagnostics = match host.compile(&Interpreter::new(), &["core".to_string()]) {
        Err(nhaml_compiler::CompileError::CompilationFailed { diagnostics, .. }) => diagnostics,
        other => panic!("unexpected {:?}", other.map(|units| units.len())),
    };

    let report = format_diagnostics(&source, &diagnostics);
    assert!(report.contains("Unknown function `nope`"));
    assert!(report.contains("template line 2"));
}
