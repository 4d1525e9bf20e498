//! Prelude natives shared by both backends. Deliberately small: gameplay
//! hosts register their own natives for everything domain-specific.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::{diagnostics::Diagnostic, runtime::Interpreter, value::Value, vm::Vm};

pub fn install(interpreter: &mut Interpreter) {
    interpreter.register_native("print", None, prelude_print);
    interpreter.register_native("clock", Some(0), prelude_clock);
    interpreter.register_native("str", Some(1), prelude_str);
}

pub fn install_vm(vm: &mut Vm) {
    vm.register_native("print", None, prelude_print);
    vm.register_native("clock", Some(0), prelude_clock);
    vm.register_native("str", Some(1), prelude_str);
}

fn prelude_print(args: &[Value]) -> Result<Value, Diagnostic> {
    let line = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    println!("{line}");
    Ok(Value::Nil)
}

fn prelude_clock(_args: &[Value]) -> Result<Value, Diagnostic> {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0);
    Ok(Value::Number(seconds))
}

fn prelude_str(args: &[Value]) -> Result<Value, Diagnostic> {
    Ok(Value::string(args[0].to_string()))
}
