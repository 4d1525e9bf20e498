use std::rc::Rc;

use crate::{
    ast::{BinaryOp, Expr, ExprKind, Literal, LogicalOp, Stmt, StmtKind, UnaryOp},
    diagnostics::{Diagnostic, Location, Result, RuntimeErrorKind},
    environment::{ScopeArena, ScopeId},
    parser,
    value::{FunctionValue, NativeFunction, Value},
};

/// Default bound on nested script calls. Unbounded recursion would otherwise
/// blow the native stack instead of failing with a checked error.
const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Outcome of executing a statement. `Return` is an ordinary control
/// transfer, not an error; it unwinds to the enclosing call site.
pub enum ControlFlow {
    Normal(Value),
    Return(Value),
}

/// Tree-walking evaluator over the full language. Each interpreter owns its
/// environment tree and native registry; independent script instances never
/// share state.
pub struct Interpreter {
    scopes: ScopeArena,
    globals: ScopeId,
    current: ScopeId,
    depth: usize,
    max_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let mut scopes = ScopeArena::new();
        let globals = scopes.root();
        let mut interpreter = Self {
            scopes,
            globals,
            current: globals,
            depth: 0,
            max_depth: DEFAULT_MAX_CALL_DEPTH,
        };
        crate::stdlib::install(&mut interpreter);
        interpreter
    }

    pub fn with_max_call_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Binds a host function into the global scope. Only primitive values
    /// cross this boundary in either direction.
    pub fn register_native<F>(&mut self, name: &str, arity: Option<usize>, callback: F)
    where
        F: Fn(&[Value]) -> std::result::Result<Value, Diagnostic> + 'static,
    {
        let native = NativeFunction::new(name, arity, callback);
        self.scopes
            .define(self.globals, name.to_string(), Value::Native(native));
    }

    /// Parses and runs a source unit, yielding the value of its last
    /// statement (Nil when the unit ends in a declaration).
    pub fn eval_source(&mut self, source: &str) -> Result<Value> {
        let program = parser::parse_program(source)?;
        self.run_program(&program)
    }

    pub fn run_program(&mut self, program: &[Stmt]) -> Result<Value> {
        let mut last = Value::Nil;
        for stmt in program {
            match self.execute(stmt)? {
                ControlFlow::Normal(value) => last = value,
                ControlFlow::Return(value) => return Ok(value),
            }
        }
        Ok(last)
    }

    /// Invokes a global function by name, as the host does for the `Start`,
    /// `Update` and `Stop` entry points. `None` when the name is unbound.
    pub fn call_global(&mut self, name: &str, args: &[Value]) -> Result<Option<Value>> {
        for arg in args {
            if !arg.is_primitive() {
                return Err(Diagnostic::runtime(
                    RuntimeErrorKind::NativeBoundary,
                    format!("cannot pass a {} across the host boundary", arg.type_name()),
                )
                .into());
            }
        }
        let Some(callee) = self.scopes.lookup(self.globals, name) else {
            return Ok(None);
        };
        let value = self.call_value(callee, args.to_vec(), None)?;
        Ok(Some(value))
    }

    fn execute(&mut self, stmt: &Stmt) -> std::result::Result<ControlFlow, Diagnostic> {
        match &stmt.kind {
            StmtKind::Expr(expr) => Ok(ControlFlow::Normal(self.evaluate(expr)?)),
            StmtKind::Let { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                self.scopes.define(self.current, name.clone(), value);
                Ok(ControlFlow::Normal(Value::Nil))
            }
            StmtKind::Function(def) => {
                let function = self.make_closure(def);
                let name = def.name.clone().unwrap_or_default();
                self.scopes.define(self.current, name, function);
                Ok(ControlFlow::Normal(Value::Nil))
            }
            StmtKind::Block(statements) => self.execute_block(statements),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let flow = if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)?
                } else if let Some(branch) = else_branch {
                    self.execute(branch)?
                } else {
                    ControlFlow::Normal(Value::Nil)
                };
                // Like blocks, `if` is a statement: its result is Nil unless
                // a `return` is unwinding through it.
                match flow {
                    ControlFlow::Return(value) => Ok(ControlFlow::Return(value)),
                    ControlFlow::Normal(_) => Ok(ControlFlow::Normal(Value::Nil)),
                }
            }
            StmtKind::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let ControlFlow::Return(value) = self.execute(body)? {
                        return Ok(ControlFlow::Return(value));
                    }
                }
                Ok(ControlFlow::Normal(Value::Nil))
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                Ok(ControlFlow::Return(value))
            }
        }
    }

    /// Blocks get a fresh child scope; the previous cursor is restored on
    /// every exit path, so an error mid-block never leaks a stale scope.
    fn execute_block(&mut self, statements: &[Stmt]) -> std::result::Result<ControlFlow, Diagnostic> {
        let prev = self.current;
        let scope = self.scopes.push(prev);
        self.current = scope;
        let result = self.run_sequence(statements);
        self.current = prev;
        self.scopes.release(scope);
        result
    }

    /// Only expression statements produce a value; a block as a statement
    /// yields Nil, so both backends agree on what a program evaluates to.
    fn run_sequence(&mut self, statements: &[Stmt]) -> std::result::Result<ControlFlow, Diagnostic> {
        for stmt in statements {
            if let flow @ ControlFlow::Return(_) = self.execute(stmt)? {
                return Ok(flow);
            }
        }
        Ok(ControlFlow::Normal(Value::Nil))
    }

    fn evaluate(&mut self, expr: &Expr) -> std::result::Result<Value, Diagnostic> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(literal_value(literal)),
            ExprKind::Variable(name) => self.scopes.get(self.current, name, expr.loc),
            ExprKind::Assign { name, value } => {
                let value = self.evaluate(value)?;
                self.scopes
                    .assign(self.current, name, value.clone(), expr.loc)?;
                Ok(value)
            }
            ExprKind::Unary { op, expr: operand } => {
                let value = self.evaluate(operand)?;
                self.unary(*op, value, expr.loc)
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                self.binary(*op, left, right, expr.loc)
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.evaluate(left)?.is_truthy();
                let result = match op {
                    // The right operand is not evaluated once the left side
                    // determines the result.
                    LogicalOp::And => left && self.evaluate(right)?.is_truthy(),
                    LogicalOp::Or => left || self.evaluate(right)?.is_truthy(),
                };
                Ok(Value::Bool(result))
            }
            ExprKind::Call { callee, args } => {
                let callee_value = self.evaluate(callee)?;
                let mut eval_args = Vec::with_capacity(args.len());
                for arg in args {
                    eval_args.push(self.evaluate(arg)?);
                }
                self.call_value(callee_value, eval_args, Some(expr.loc))
            }
            ExprKind::Function(def) => Ok(self.make_closure(def)),
        }
    }

    fn make_closure(&mut self, def: &Rc<crate::ast::FunctionDef>) -> Value {
        // The defining chain must outlive its lexical block.
        self.scopes.mark_captured(self.current);
        Value::Function(Rc::new(FunctionValue {
            def: Rc::clone(def),
            closure: self.current,
        }))
    }

    fn unary(
        &self,
        op: UnaryOp,
        value: Value,
        loc: Location,
    ) -> std::result::Result<Value, Diagnostic> {
        match op {
            UnaryOp::Negate => match value {
                Value::Number(n) => Ok(Value::Number(-n)),
                other => Err(Diagnostic::runtime(
                    RuntimeErrorKind::TypeMismatch,
                    format!("unary `-` expects a Number, found {}", other.type_name()),
                )
                .with_location(loc)),
            },
            UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        }
    }

    fn binary(
        &self,
        op: BinaryOp,
        left: Value,
        right: Value,
        loc: Location,
    ) -> std::result::Result<Value, Diagnostic> {
        match op {
            BinaryOp::Add => match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                // `+` concatenates when either side is a string, using the
                // canonical representation of the other operand.
                (Value::Str(_), _) | (_, Value::Str(_)) => {
                    Ok(Value::string(format!("{left}{right}")))
                }
                _ => Err(self.type_mismatch("+", &left, &right, loc)),
            },
            BinaryOp::Sub => self.numeric(left, right, loc, "-", |a, b| a - b),
            BinaryOp::Mul => self.numeric(left, right, loc, "*", |a, b| a * b),
            BinaryOp::Div => {
                let (a, b) = self.numbers(&left, &right, "/", loc)?;
                if b == 0.0 {
                    return Err(Diagnostic::runtime(
                        RuntimeErrorKind::DivisionByZero,
                        "division by zero",
                    )
                    .with_location(loc));
                }
                Ok(Value::Number(a / b))
            }
            BinaryOp::Mod => {
                let (a, b) = self.numbers(&left, &right, "%", loc)?;
                if b == 0.0 {
                    return Err(Diagnostic::runtime(
                        RuntimeErrorKind::DivisionByZero,
                        "modulo by zero",
                    )
                    .with_location(loc));
                }
                Ok(Value::Number(a % b))
            }
            BinaryOp::Equal => Ok(Value::Bool(left == right)),
            BinaryOp::NotEqual => Ok(Value::Bool(left != right)),
            BinaryOp::Less => self.comparison(left, right, loc, "<", |a, b| a < b),
            BinaryOp::LessEqual => self.comparison(left, right, loc, "<=", |a, b| a <= b),
            BinaryOp::Greater => self.comparison(left, right, loc, ">", |a, b| a > b),
            BinaryOp::GreaterEqual => self.comparison(left, right, loc, ">=", |a, b| a >= b),
        }
    }

    fn numeric<F>(
        &self,
        left: Value,
        right: Value,
        loc: Location,
        op: &str,
        func: F,
    ) -> std::result::Result<Value, Diagnostic>
    where
        F: Fn(f64, f64) -> f64,
    {
        let (a, b) = self.numbers(&left, &right, op, loc)?;
        Ok(Value::Number(func(a, b)))
    }

    fn comparison<F>(
        &self,
        left: Value,
        right: Value,
        loc: Location,
        op: &str,
        cmp: F,
    ) -> std::result::Result<Value, Diagnostic>
    where
        F: Fn(f64, f64) -> bool,
    {
        let (a, b) = self.numbers(&left, &right, op, loc)?;
        Ok(Value::Bool(cmp(a, b)))
    }

    fn numbers(
        &self,
        left: &Value,
        right: &Value,
        op: &str,
        loc: Location,
    ) -> std::result::Result<(f64, f64), Diagnostic> {
        match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
            _ => Err(self.type_mismatch(op, left, right, loc)),
        }
    }

    fn type_mismatch(&self, op: &str, left: &Value, right: &Value, loc: Location) -> Diagnostic {
        Diagnostic::runtime(
            RuntimeErrorKind::TypeMismatch,
            format!(
                "`{op}` expects numeric operands, found {} and {}",
                left.type_name(),
                right.type_name()
            ),
        )
        .with_location(loc)
    }

    fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        loc: Option<Location>,
    ) -> std::result::Result<Value, Diagnostic> {
        match callee {
            Value::Native(native) => {
                for arg in &args {
                    if !arg.is_primitive() {
                        return Err(locate(
                            Diagnostic::runtime(
                                RuntimeErrorKind::NativeBoundary,
                                format!(
                                    "cannot pass a {} to native `{}`",
                                    arg.type_name(),
                                    native.name
                                ),
                            ),
                            loc,
                        ));
                    }
                }
                let result = native.call(&args).map_err(|diag| locate(diag, loc))?;
                if !result.is_primitive() {
                    return Err(locate(
                        Diagnostic::runtime(
                            RuntimeErrorKind::NativeBoundary,
                            format!("native `{}` returned a non-primitive value", native.name),
                        ),
                        loc,
                    ));
                }
                Ok(result)
            }
            Value::Function(fun) => self.call_function(&fun, args, loc),
            other => Err(locate(
                Diagnostic::runtime(
                    RuntimeErrorKind::NotCallable,
                    format!("{} is not callable", other.type_name()),
                ),
                loc,
            )),
        }
    }

    fn call_function(
        &mut self,
        fun: &FunctionValue,
        args: Vec<Value>,
        loc: Option<Location>,
    ) -> std::result::Result<Value, Diagnostic> {
        if args.len() != fun.def.params.len() {
            return Err(locate(
                Diagnostic::runtime(
                    RuntimeErrorKind::ArityMismatch,
                    format!(
                        "function `{}` expected {} arguments but received {}",
                        fun.def.name.as_deref().unwrap_or("anonymous"),
                        fun.def.params.len(),
                        args.len()
                    ),
                ),
                loc,
            ));
        }
        if self.depth >= self.max_depth {
            return Err(locate(
                Diagnostic::runtime(
                    RuntimeErrorKind::StackOverflow,
                    format!("call depth exceeded the limit of {}", self.max_depth),
                ),
                loc,
            ));
        }

        // The frame's parent is the closure scope captured at the definition
        // site, not the caller's scope.
        let prev = self.current;
        let frame = self.scopes.push(fun.closure);
        self.current = frame;
        for (name, value) in fun.def.params.iter().zip(args) {
            self.scopes.define(frame, name.clone(), value);
        }
        self.depth += 1;
        let result = self.run_body(&fun.def.body);
        self.depth -= 1;
        self.current = prev;
        self.scopes.release(frame);
        result
    }

    fn run_body(&mut self, body: &[Stmt]) -> std::result::Result<Value, Diagnostic> {
        for stmt in body {
            if let ControlFlow::Return(value) = self.execute(stmt)? {
                return Ok(value);
            }
        }
        Ok(Value::Nil)
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Number(n) => Value::Number(*n),
        Literal::Str(s) => Value::string(s.as_str()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Nil => Value::Nil,
    }
}

fn locate(diag: Diagnostic, loc: Option<Location>) -> Diagnostic {
    match loc {
        Some(loc) if diag.location.is_none() => diag.with_location(loc),
        _ => diag,
    }
}
