use std::{cell::RefCell, rc::Rc};

use hellebore::{
    chunk::{Chunk, Constant, OpCode},
    compiler,
    diagnostics::{DiagnosticKind, HelleboreError, RuntimeErrorKind},
    parser,
    runtime::Interpreter,
    value::{NativeFunction, Value},
    vm::Vm,
};

fn compile(source: &str) -> Chunk {
    let program = parser::parse_program(source).expect("parse should succeed");
    compiler::compile(&program).expect("compile should succeed")
}

fn run_vm(source: &str) -> Value {
    Vm::new()
        .run(&compile(source))
        .expect("execution should succeed")
}

fn compile_error(source: &str) -> String {
    let program = parser::parse_program(source).expect("parse should succeed");
    match compiler::compile(&program) {
        Ok(_) => panic!("expected compile error for {source}"),
        Err(diag) => {
            assert_eq!(diag.kind, DiagnosticKind::Compile);
            diag.message
        }
    }
}

fn runtime_kind(err: &HelleboreError) -> RuntimeErrorKind {
    err.runtime_kind()
        .unwrap_or_else(|| panic!("expected runtime error, found {err}"))
}

/// Runs a program on both backends and asserts they agree.
fn assert_parity(source: &str) {
    let mut interpreter = Interpreter::new();
    let expected = interpreter
        .eval_source(source)
        .expect("interpreter should succeed");
    let actual = run_vm(source);
    assert_eq!(actual, expected, "backends disagree on {source}");
}

#[test]
fn backends_agree_on_core_programs() {
    for source in [
        "1 + 2 * 3;",
        "(1 + 2) * 3 - 4 / 2;",
        "10 % 4;",
        "-5 + 3;",
        "!0;",
        "let x = 1; let y = 2; x + y;",
        "let x; x == nil;",
        "let x = 1; x = x + 5; x;",
        "\"a\" + \"b\" + 1;",
        "1 == 1.0;",
        "\"a\" != \"b\";",
        "1 < 2 && 2 <= 2;",
        "0 || \"\";",
        "nil || 2;",
        "if (1 < 2) { 10; } else { 20; }",
        "let total = 0; let i = 0; while (i < 5) { i = i + 1; total = total + i; } total;",
        "let x = 1; { let x = 2; } x;",
        "let x = 1; { x = 2; } x;",
        "let x = 1; { let x = 2; { let x = 3; } } x;",
        "{ 5; }",
        "let p = print; 1;",
    ] {
        assert_parity(source);
    }
}

#[test]
fn native_names_load_as_values() {
    assert!(matches!(run_vm("clock;"), Value::Native(_)));
    assert_eq!(run_vm("let p = print; 1;"), Value::Number(1.0));
}

#[test]
fn block_shadowing_uses_distinct_slots() {
    let chunk = compile("let x = 1; { let x = 2; } x;");
    // The inner `let` must not store into the outer `x` slot.
    let x_slots: Vec<_> = chunk
        .names
        .iter()
        .filter(|name| name.starts_with('x'))
        .collect();
    assert_eq!(x_slots.len(), 2);
    assert_eq!(run_vm("let x = 1; { let x = 2; } x;"), Value::Number(1.0));
}

#[test]
fn while_loop_jumps_are_patched() {
    let chunk = compile("while (true) { 1; }");
    // 0: CONST true, 5: JMP_IF_FALSE exit, 10: CONST 1, 15: POP,
    // 16: JMP loop_start, 21: HALT
    assert_eq!(chunk.code[5], OpCode::JmpIfFalse as u8);
    assert_eq!(chunk.read_u32(6), Some(21));
    assert_eq!(chunk.code[16], OpCode::Jmp as u8);
    assert_eq!(chunk.read_u32(17), Some(0));
    assert_eq!(chunk.code[21], OpCode::Halt as u8);
}

#[test]
fn if_else_jumps_are_patched() {
    let chunk = compile("if (1 < 2) { 10; } else { 20; }");
    // 11: JMP_IF_FALSE else, 22: JMP end, 27: else branch, 33: HALT
    assert_eq!(chunk.code[11], OpCode::JmpIfFalse as u8);
    assert_eq!(chunk.read_u32(12), Some(27));
    assert_eq!(chunk.code[22], OpCode::Jmp as u8);
    assert_eq!(chunk.read_u32(23), Some(33));
}

#[test]
fn if_without_else_jumps_past_the_branch() {
    let chunk = compile("if (false) { 1; }");
    assert_eq!(chunk.code[5], OpCode::JmpIfFalse as u8);
    assert_eq!(chunk.read_u32(6), Some(16));
    assert_eq!(chunk.code[16], OpCode::Halt as u8);
}

#[test]
fn constants_are_appended_not_deduplicated() {
    let chunk = compile("1 + 1;");
    assert_eq!(
        chunk.constants,
        vec![Constant::Number(1.0), Constant::Number(1.0)]
    );
}

#[test]
fn names_are_interned_once() {
    let chunk = compile("let x = 1; x + x;");
    assert_eq!(chunk.names.iter().filter(|n| *n == "x").count(), 1);
}

#[test]
fn compiler_rejects_functions() {
    let message = compile_error("fn f() { return 1; }");
    assert!(message.contains("function declarations"));
    let message = compile_error("let f = fn () { return 1; };");
    assert!(message.contains("function literals"));
}

#[test]
fn compiler_rejects_assignment_to_undeclared_names() {
    let message = compile_error("missing = 1;");
    assert!(message.contains("missing"));
}

#[test]
fn compiler_rejects_calling_variables() {
    let message = compile_error("let f = 1; f();");
    assert!(message.contains("`f` is a variable"));
    compile_error("(1 + 2)();");
}

#[test]
fn vm_reports_undefined_variables_with_location() {
    let err = Vm::new()
        .run(&compile("let a = 1;\nmissing;"))
        .expect_err("load of an undefined name must fail");
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::UndefinedVariable);
    match err {
        HelleboreError::Diagnostic(diag) => {
            let loc = diag.location.expect("location should be carried");
            assert_eq!(loc.line, 2);
        }
        other => panic!("expected diagnostic, found {other}"),
    }
}

#[test]
fn vm_checks_division_and_modulo_by_zero() {
    let err = Vm::new().run(&compile("1 / 0;")).unwrap_err();
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::DivisionByZero);
    let err = Vm::new().run(&compile("1 % 0;")).unwrap_err();
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::DivisionByZero);
}

#[test]
fn vm_rejects_mixed_numeric_operands() {
    let err = Vm::new().run(&compile("1 - \"a\";")).unwrap_err();
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::TypeMismatch);
}

#[test]
fn vm_calls_registered_natives() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let mut vm = Vm::new();
    vm.register_native("emit", None, move |args| {
        for arg in args {
            sink.borrow_mut().push(arg.to_string());
        }
        Ok(Value::Nil)
    });
    vm.run(&compile("emit(1 + 2, \"go\"); emit(true);"))
        .expect("native calls should succeed");
    assert_eq!(log.borrow().as_slice(), ["3", "go", "true"]);
}

#[test]
fn vm_enforces_native_arity() {
    let mut vm = Vm::new();
    vm.register_native("one", Some(1), |args| Ok(args[0].clone()));
    let err = vm.run(&compile("one(1, 2);")).unwrap_err();
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::ArityMismatch);
}

#[test]
fn vm_rejects_unknown_callees() {
    let err = Vm::new().run(&compile("nothing_here();")).unwrap_err();
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::NotCallable);
}

#[test]
fn vm_rejects_non_primitive_native_results() {
    let mut vm = Vm::new();
    vm.register_native("leaky", Some(0), |_| {
        Ok(Value::Native(NativeFunction::new("inner", Some(0), |_| {
            Ok(Value::Nil)
        })))
    });
    let err = vm.run(&compile("leaky();")).unwrap_err();
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::NativeBoundary);
}

#[test]
fn step_limit_stops_runaway_loops() {
    let err = Vm::new()
        .with_step_limit(1_000)
        .run(&compile("while (true) { }"))
        .expect_err("the loop must hit the step limit");
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::StepLimit);
}

#[test]
fn independent_vms_do_not_share_globals() {
    let mut first = Vm::new();
    first
        .run(&compile("let shared = 1;"))
        .expect("definition should succeed");
    let err = Vm::new().run(&compile("shared;")).unwrap_err();
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::UndefinedVariable);
}

#[test]
fn truncated_chunk_is_a_checked_error() {
    let mut chunk = Chunk::new();
    chunk.code.push(OpCode::Jmp as u8);
    let err = Vm::new().run(&chunk).unwrap_err();
    assert_eq!(runtime_kind(&err), RuntimeErrorKind::BadChunk);
}

#[test]
fn disassembly_names_jump_targets() {
    let listing = compile("if (1 < 2) { 10; } else { 20; }").disassemble();
    assert!(listing.contains("JmpIfFalse -> 0027"));
    assert!(listing.contains("Jmp -> 0033"));
    assert!(listing.contains("Halt"));
}

#[test]
fn empty_program_halts_with_nil() {
    let chunk = compile("");
    assert_eq!(Vm::new().run(&chunk).unwrap(), Value::Nil);
}
