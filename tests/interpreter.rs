use std::{cell::RefCell, rc::Rc};

use hellebore::{
    diagnostics::{DiagnosticKind, HelleboreError, RuntimeErrorKind},
    runtime::Interpreter,
    value::Value,
};

fn eval(source: &str) -> Value {
    let mut interpreter = Interpreter::new();
    interpreter
        .eval_source(source)
        .expect("evaluation should succeed")
}

fn eval_error(source: &str) -> HelleboreError {
    let mut interpreter = Interpreter::new();
    match interpreter.eval_source(source) {
        Ok(value) => panic!("expected error, received value {value}"),
        Err(err) => err,
    }
}

fn expect_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        _ => panic!("expected Number, found {}", value.type_name()),
    }
}

fn expect_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        _ => panic!("expected Bool, found {}", value.type_name()),
    }
}

fn expect_str(value: &Value) -> &str {
    match value {
        Value::Str(s) => s,
        _ => panic!("expected String, found {}", value.type_name()),
    }
}

fn runtime_kind(err: &HelleboreError) -> RuntimeErrorKind {
    err.runtime_kind()
        .unwrap_or_else(|| panic!("expected runtime error, found {err}"))
}

/// Interpreter with an `emit` native recording every argument, for asserting
/// on observable output without capturing stdout.
fn recording_interpreter() -> (Interpreter, Rc<RefCell<Vec<String>>>) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let mut interpreter = Interpreter::new();
    interpreter.register_native("emit", None, move |args| {
        for arg in args {
            sink.borrow_mut().push(arg.to_string());
        }
        Ok(Value::Nil)
    });
    (interpreter, log)
}

#[test]
fn evaluates_basic_arithmetic() {
    let value = eval("let x = 1; let y = 2; x + y;");
    assert_eq!(expect_number(&value), 3.0);
}

#[test]
fn respects_operator_precedence() {
    assert_eq!(expect_number(&eval("1 + 2 * 3;")), 7.0);
    assert_eq!(expect_number(&eval("(1 + 2) * 3;")), 9.0);
    assert_eq!(expect_number(&eval("10 - 4 - 3;")), 3.0);
    assert_eq!(expect_number(&eval("7 % 4;")), 3.0);
    assert_eq!(expect_bool(&eval("1 + 1 == 2;")), true);
}

#[test]
fn unary_operators() {
    assert_eq!(expect_number(&eval("-3 + 5;")), 2.0);
    assert_eq!(expect_bool(&eval("!false;")), true);
    assert_eq!(expect_bool(&eval("!0;")), true);
    assert_eq!(expect_bool(&eval("!\"text\";")), false);
}

#[test]
fn let_without_initializer_is_nil() {
    assert_eq!(expect_bool(&eval("let x; x == nil;")), true);
}

#[test]
fn block_shadowing_restores_outer_binding() {
    let value = eval("let x = 1; { let x = 2; } x;");
    assert_eq!(expect_number(&value), 1.0);
}

#[test]
fn inner_assignment_reaches_outer_binding() {
    let value = eval("let x = 1; { x = 2; } x;");
    assert_eq!(expect_number(&value), 2.0);
}

#[test]
fn control_statements_yield_nil() {
    // Only expression statements produce a program value.
    assert_eq!(eval("if (1 < 2) { 10; } else { 20; }"), Value::Nil);
    assert_eq!(eval("{ 5; }"), Value::Nil);
    assert_eq!(eval("let x = 0; while (x < 3) { x = x + 1; }"), Value::Nil);
}

#[test]
fn while_loop_accumulates() {
    let value = eval(
        r#"
        let i = 0;
        let total = 0;
        while (i < 5) {
            i = i + 1;
            total = total + i;
        }
        total;
        "#,
    );
    assert_eq!(expect_number(&value), 15.0);
}

#[test]
fn if_else_selects_branch() {
    let (mut interpreter, log) = recording_interpreter();
    interpreter
        .eval_source(r#"if (1 < 2) { emit("yes"); } else { emit("no"); }"#)
        .expect("evaluation should succeed");
    assert_eq!(log.borrow().as_slice(), ["yes"]);
}

#[test]
fn closures_mutate_their_captured_scope() {
    let (mut interpreter, log) = recording_interpreter();
    interpreter
        .eval_source(
            r#"
            fn make() {
                let n = 0;
                fn inc() {
                    n = n + 1;
                    return n;
                }
                return inc;
            }
            let c = make();
            emit(c());
            emit(c());
            "#,
        )
        .expect("evaluation should succeed");
    assert_eq!(log.borrow().as_slice(), ["1", "2"]);
}

#[test]
fn independent_closures_do_not_share_state() {
    let value = eval(
        r#"
        fn make() {
            let n = 0;
            fn inc() {
                n = n + 1;
                return n;
            }
            return inc;
        }
        let a = make();
        let b = make();
        a();
        a();
        b();
        "#,
    );
    assert_eq!(expect_number(&value), 1.0);
}

#[test]
fn closures_use_lexical_not_dynamic_scope() {
    let value = eval(
        r#"
        let x = "global";
        fn outer() {
            let x = "outer";
            fn inner() {
                return x;
            }
            return inner;
        }
        let f = outer();
        f();
        "#,
    );
    assert_eq!(expect_str(&value), "outer");
}

#[test]
fn function_literals_are_first_class() {
    let value = eval(
        r#"
        let twice = fn (f, x) {
            return f(f(x));
        };
        twice(fn (n) { return n + 1; }, 3);
        "#,
    );
    assert_eq!(expect_number(&value), 5.0);
}

#[test]
fn short_circuit_skips_right_operand() {
    let (mut interpreter, log) = recording_interpreter();
    let value = interpreter
        .eval_source(
            r#"
            fn boom() {
                emit("boom");
                return 1 / 0;
            }
            false && boom();
            "#,
        )
        .expect("right operand must not be evaluated");
    assert_eq!(expect_bool(&value), false);
    assert!(log.borrow().is_empty());

    let value = eval("fn boom() { return 1 / 0; } true || boom();");
    assert_eq!(expect_bool(&value), true);
}

#[test]
fn logical_operators_coerce_to_bool() {
    assert_eq!(expect_bool(&eval("1 && \"x\";")), true);
    assert_eq!(expect_bool(&eval("0 || \"\";")), false);
    assert_eq!(expect_bool(&eval("nil || 2;")), true);
}

#[test]
fn equality_is_structural_for_primitives() {
    assert_eq!(expect_bool(&eval("1 == 1.0;")), true);
    assert_eq!(expect_bool(&eval("\"a\" == \"a\";")), true);
    assert_eq!(expect_bool(&eval("1 == \"1\";")), false);
    assert_eq!(expect_bool(&eval("nil == nil;")), true);
    assert_eq!(expect_bool(&eval("true != false;")), true);
}

#[test]
fn function_equality_is_identity() {
    assert_eq!(expect_bool(&eval("fn f() {} let a = f; a == f;")), true);
    assert_eq!(expect_bool(&eval("fn f() {} fn g() {} f == g;")), false);
}

#[test]
fn string_concatenation_with_any_operand() {
    assert_eq!(expect_str(&eval("\"a\" + \"b\";")), "ab");
    assert_eq!(expect_str(&eval("\"n=\" + 42;")), "n=42");
    assert_eq!(expect_str(&eval("1 + \"up\";")), "1up");
    assert_eq!(expect_str(&eval("\"is \" + true;")), "is true");
}

#[test]
fn numeric_operators_reject_mixed_types() {
    let err = eval_error("1 - \"a\";");
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::TypeMismatch);
    let err = eval_error("\"a\" < \"b\";");
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::TypeMismatch);
}

#[test]
fn division_and_modulo_by_zero_are_checked() {
    let err = eval_error("1 / 0;");
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::DivisionByZero);
    let err = eval_error("1 % 0;");
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::DivisionByZero);
}

#[test]
fn undefined_variable_carries_location() {
    let err = eval_error("let a = 1;\nmissing;");
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::UndefinedVariable);
    match err {
        HelleboreError::Diagnostic(diag) => {
            let loc = diag.location.expect("location should be carried");
            assert_eq!(loc.line, 2);
            assert_eq!(loc.col, 1);
        }
        other => panic!("expected diagnostic, found {other}"),
    }
}

#[test]
fn assignment_to_undefined_variable_fails() {
    let err = eval_error("missing = 1;");
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::UndefinedVariable);
}

#[test]
fn arity_mismatch_is_always_an_error() {
    let err = eval_error("fn f(a) { return a; } f(1, 2);");
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::ArityMismatch);
    let err = eval_error("fn f(a, b) { return a; } f(1);");
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::ArityMismatch);
}

#[test]
fn calling_a_non_callable_value_fails() {
    let err = eval_error("let x = 1; x();");
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::NotCallable);
}

#[test]
fn functions_may_not_cross_the_native_boundary() {
    let mut interpreter = Interpreter::new();
    interpreter.register_native("id", Some(1), |args| Ok(args[0].clone()));
    let err = interpreter
        .eval_source("fn f() {} id(f);")
        .expect_err("function arguments must be rejected");
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::NativeBoundary);
}

#[test]
fn runaway_recursion_is_a_checked_error() {
    let mut interpreter = Interpreter::new().with_max_call_depth(32);
    let err = interpreter
        .eval_source("fn forever() { return forever(); } forever();")
        .expect_err("recursion must hit the depth limit");
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::StackOverflow);
}

#[test]
fn functions_without_return_yield_nil() {
    assert_eq!(expect_bool(&eval("fn noop() { 1 + 1; } noop() == nil;")), true);
}

#[test]
fn interpretation_is_deterministic() {
    let source = r#"
        fn fib(n) {
            if (n < 2) {
                return n;
            }
            return fib(n - 1) + fib(n - 2);
        }
        fib(12);
    "#;
    let first = eval(source);
    let second = eval(source);
    assert_eq!(first, second);
    assert_eq!(expect_number(&first), 144.0);
}

#[test]
fn parse_rejects_invalid_assignment_target() {
    let err = eval_error("1 = 2;");
    match err {
        HelleboreError::Diagnostic(diag) => assert_eq!(diag.kind, DiagnosticKind::Parser),
        other => panic!("expected parse error, found {other}"),
    }
}

#[test]
fn parse_rejects_return_outside_function() {
    let err = eval_error("return 1;");
    match err {
        HelleboreError::Diagnostic(diag) => {
            assert_eq!(diag.kind, DiagnosticKind::Parser);
            assert!(diag.message.contains("return"));
        }
        other => panic!("expected parse error, found {other}"),
    }
}

#[test]
fn lexer_numbers_support_separators_and_exponents() {
    assert_eq!(expect_number(&eval("1_000 + 0.5;")), 1000.5);
    assert_eq!(expect_number(&eval("1e2;")), 100.0);
    assert_eq!(expect_number(&eval("2.5e-1;")), 0.25);
}

#[test]
fn lexer_rejects_malformed_input() {
    for source in ["1e;", "\"open", "a & b;", "a | b;", "let x = @;"] {
        let err = eval_error(source);
        match err {
            HelleboreError::Diagnostic(diag) => assert_eq!(diag.kind, DiagnosticKind::Lexer),
            other => panic!("expected lex error for {source}, found {other}"),
        }
    }
}

#[test]
fn lexer_decodes_string_escapes() {
    assert_eq!(expect_str(&eval(r#""A\n";"#)), "A\n");
    assert_eq!(expect_str(&eval(r#""tab\there";"#)), "tab\there");
}

#[test]
fn identifiers_allow_query_and_bang_suffixes() {
    assert_eq!(expect_bool(&eval("let ready? = true; ready?;")), true);
    let value = eval("fn send!(msg) { return msg; } send!(\"go\");");
    assert_eq!(expect_str(&value), "go");
}

#[test]
fn comments_are_skipped() {
    let value = eval("// leading\nlet x = 1; /* inline */ x + 1;");
    assert_eq!(expect_number(&value), 2.0);
}
