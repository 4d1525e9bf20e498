use std::{fmt, rc::Rc};

use crate::{
    ast::FunctionDef,
    diagnostics::{Diagnostic, RuntimeErrorKind},
    environment::ScopeId,
};

/// Runtime value. Primitives compare structurally; functions compare by
/// identity. The set of kinds is closed: neither backend materializes
/// anything outside these six.
#[derive(Clone)]
pub enum Value {
    Nil,
    Number(f64),
    Str(Rc<str>),
    Bool(bool),
    Function(Rc<FunctionValue>),
    Native(NativeFunction),
}

/// A closure: shared function AST plus the scope captured at its
/// definition site.
pub struct FunctionValue {
    pub def: Rc<FunctionDef>,
    pub closure: ScopeId,
}

pub type NativeCallback = dyn Fn(&[Value]) -> Result<Value, Diagnostic>;

/// Host-provided function reachable by name from script code. Only primitive
/// values may cross this boundary in either direction.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: Rc<str>,
    /// `None` accepts any argument count.
    pub arity: Option<usize>,
    pub callback: Rc<NativeCallback>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<Rc<str>>,
        arity: Option<usize>,
        callback: impl Fn(&[Value]) -> Result<Value, Diagnostic> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            arity,
            callback: Rc::new(callback),
        }
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, Diagnostic> {
        if let Some(arity) = self.arity {
            if args.len() != arity {
                return Err(Diagnostic::runtime(
                    RuntimeErrorKind::ArityMismatch,
                    format!(
                        "native `{}` expected {} arguments but received {}",
                        self.name,
                        arity,
                        args.len()
                    ),
                ));
            }
        }
        (self.callback)(args)
    }
}

impl Value {
    pub fn string(value: impl Into<Rc<str>>) -> Self {
        Value::Str(value.into())
    }

    /// Nil is false, Bool as-is, a Number is true unless zero, a Str is true
    /// unless empty, functions are always true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Function(_) | Value::Native(_) => true,
        }
    }

    /// Whether this value may cross the native-function boundary.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Function(_) | Value::Native(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Number(_) => "Number",
            Value::Str(_) => "String",
            Value::Bool(_) => "Bool",
            Value::Function(_) => "Function",
            Value::Native(_) => "NativeFunction",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(&a.callback, &b.callback),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Function(fun) => write!(
                f,
                "<fn {}>",
                fun.def.name.as_deref().unwrap_or("anonymous")
            ),
            Value::Native(fun) => write!(f, "<native fn {}>", fun.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "\"{s}\""),
            other => write!(f, "{other}"),
        }
    }
}
