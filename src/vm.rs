use indexmap::IndexMap;

use crate::{
    chunk::{Chunk, OpCode},
    diagnostics::{Diagnostic, Result, RuntimeErrorKind},
    value::{NativeFunction, Value},
};

/// Stack-based executor for compiled chunks. Globals and natives are
/// instance-held maps; independent VMs never share state.
pub struct Vm {
    globals: IndexMap<String, Value>,
    natives: IndexMap<String, NativeFunction>,
    step_limit: Option<u64>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        let mut vm = Self {
            globals: IndexMap::new(),
            natives: IndexMap::new(),
            step_limit: None,
        };
        crate::stdlib::install_vm(&mut vm);
        vm
    }

    /// Bounds the number of executed instructions, converting runaway loops
    /// into a checked runtime error.
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = Some(limit);
        self
    }

    pub fn register_native<F>(&mut self, name: &str, arity: Option<usize>, callback: F)
    where
        F: Fn(&[Value]) -> std::result::Result<Value, Diagnostic> + 'static,
    {
        self.natives
            .insert(name.to_string(), NativeFunction::new(name, arity, callback));
    }

    /// Executes a chunk to completion, returning the value left on top of
    /// the stack by `RET`/`HALT` (Nil when the stack is empty).
    pub fn run(&mut self, chunk: &Chunk) -> Result<Value> {
        let mut stack: Vec<Value> = Vec::new();
        let mut ip: usize = 0;
        let mut steps: u64 = 0;

        loop {
            if let Some(limit) = self.step_limit {
                steps += 1;
                if steps > limit {
                    return Err(Diagnostic::runtime(
                        RuntimeErrorKind::StepLimit,
                        format!("execution exceeded the limit of {limit} instructions"),
                    )
                    .into());
                }
            }

            let op_offset = ip as u32;
            let byte = *chunk
                .code
                .get(ip)
                .ok_or_else(|| bad_chunk("instruction pointer ran past the end of the chunk"))?;
            let op = OpCode::from_byte(byte)
                .ok_or_else(|| bad_chunk(&format!("invalid opcode {byte}")))?;
            ip += 1;

            match op {
                OpCode::Const => {
                    let index = self.read_u32(chunk, &mut ip)?;
                    let constant = chunk
                        .constants
                        .get(index as usize)
                        .ok_or_else(|| bad_chunk("constant index out of range"))?;
                    stack.push(constant.to_value());
                }
                OpCode::Load => {
                    let name = self.read_name(chunk, &mut ip)?;
                    // Natives are not globals but are still loadable by name,
                    // as they are in the interpreter's global scope.
                    let value = self
                        .globals
                        .get(name)
                        .cloned()
                        .or_else(|| self.natives.get(name).cloned().map(Value::Native))
                        .ok_or_else(|| {
                            locate(
                                Diagnostic::runtime(
                                    RuntimeErrorKind::UndefinedVariable,
                                    format!("undefined variable `{name}`"),
                                ),
                                chunk,
                                op_offset,
                            )
                        })?;
                    stack.push(value);
                }
                OpCode::Store => {
                    let name = self.read_name(chunk, &mut ip)?.to_string();
                    let value = pop(&mut stack)?;
                    self.globals.insert(name, value);
                }
                OpCode::Pop => {
                    pop(&mut stack)?;
                }
                OpCode::Add => {
                    let right = pop(&mut stack)?;
                    let left = pop(&mut stack)?;
                    let result = match (&left, &right) {
                        (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                        (Value::Str(_), _) | (_, Value::Str(_)) => {
                            Value::string(format!("{left}{right}"))
                        }
                        _ => {
                            return Err(locate(
                                type_mismatch("+", &left, &right),
                                chunk,
                                op_offset,
                            )
                            .into());
                        }
                    };
                    stack.push(result);
                }
                OpCode::Sub => self.arithmetic(chunk, op_offset, &mut stack, "-", |a, b| a - b)?,
                OpCode::Mul => self.arithmetic(chunk, op_offset, &mut stack, "*", |a, b| a * b)?,
                OpCode::Div => {
                    let (a, b) = self.operands(chunk, op_offset, &mut stack, "/")?;
                    if b == 0.0 {
                        return Err(locate(
                            Diagnostic::runtime(
                                RuntimeErrorKind::DivisionByZero,
                                "division by zero",
                            ),
                            chunk,
                            op_offset,
                        )
                        .into());
                    }
                    stack.push(Value::Number(a / b));
                }
                OpCode::Mod => {
                    let (a, b) = self.operands(chunk, op_offset, &mut stack, "%")?;
                    if b == 0.0 {
                        return Err(locate(
                            Diagnostic::runtime(
                                RuntimeErrorKind::DivisionByZero,
                                "modulo by zero",
                            ),
                            chunk,
                            op_offset,
                        )
                        .into());
                    }
                    stack.push(Value::Number(a % b));
                }
                OpCode::Neg => {
                    let value = pop(&mut stack)?;
                    match value {
                        Value::Number(n) => stack.push(Value::Number(-n)),
                        other => {
                            return Err(locate(
                                Diagnostic::runtime(
                                    RuntimeErrorKind::TypeMismatch,
                                    format!(
                                        "unary `-` expects a Number, found {}",
                                        other.type_name()
                                    ),
                                ),
                                chunk,
                                op_offset,
                            )
                            .into());
                        }
                    }
                }
                OpCode::Not => {
                    let value = pop(&mut stack)?;
                    stack.push(Value::Bool(!value.is_truthy()));
                }
                OpCode::Eq => {
                    let right = pop(&mut stack)?;
                    let left = pop(&mut stack)?;
                    stack.push(Value::Bool(left == right));
                }
                OpCode::Ne => {
                    let right = pop(&mut stack)?;
                    let left = pop(&mut stack)?;
                    stack.push(Value::Bool(left != right));
                }
                OpCode::Lt => self.compare(chunk, op_offset, &mut stack, "<", |a, b| a < b)?,
                OpCode::Le => self.compare(chunk, op_offset, &mut stack, "<=", |a, b| a <= b)?,
                OpCode::Gt => self.compare(chunk, op_offset, &mut stack, ">", |a, b| a > b)?,
                OpCode::Ge => self.compare(chunk, op_offset, &mut stack, ">=", |a, b| a >= b)?,
                OpCode::Jmp => {
                    let target = self.read_u32(chunk, &mut ip)?;
                    ip = target as usize;
                }
                OpCode::JmpIfFalse => {
                    let target = self.read_u32(chunk, &mut ip)?;
                    if !pop(&mut stack)?.is_truthy() {
                        ip = target as usize;
                    }
                }
                OpCode::Call => {
                    let index = self.read_u32(chunk, &mut ip)?;
                    let argc = *chunk
                        .code
                        .get(ip)
                        .ok_or_else(|| bad_chunk("missing call argument count"))?
                        as usize;
                    ip += 1;
                    let name = chunk
                        .names
                        .get(index as usize)
                        .ok_or_else(|| bad_chunk("name index out of range"))?;
                    let native = self.natives.get(name).cloned().ok_or_else(|| {
                        locate(
                            Diagnostic::runtime(
                                RuntimeErrorKind::NotCallable,
                                format!("no native function named `{name}`"),
                            ),
                            chunk,
                            op_offset,
                        )
                    })?;
                    if stack.len() < argc {
                        return Err(bad_chunk("call argument count exceeds stack depth").into());
                    }
                    let args = stack.split_off(stack.len() - argc);
                    let result = native
                        .call(&args)
                        .map_err(|diag| locate(diag, chunk, op_offset))?;
                    if !result.is_primitive() {
                        return Err(locate(
                            Diagnostic::runtime(
                                RuntimeErrorKind::NativeBoundary,
                                format!("native `{name}` returned a non-primitive value"),
                            ),
                            chunk,
                            op_offset,
                        )
                        .into());
                    }
                    stack.push(result);
                }
                OpCode::Ret | OpCode::Halt => {
                    return Ok(stack.pop().unwrap_or(Value::Nil));
                }
            }
        }
    }

    fn read_u32(&self, chunk: &Chunk, ip: &mut usize) -> std::result::Result<u32, Diagnostic> {
        let value = chunk
            .read_u32(*ip)
            .ok_or_else(|| bad_chunk("truncated operand"))?;
        *ip += 4;
        Ok(value)
    }

    fn read_name<'c>(
        &self,
        chunk: &'c Chunk,
        ip: &mut usize,
    ) -> std::result::Result<&'c str, Diagnostic> {
        let index = self.read_u32(chunk, ip)?;
        chunk
            .names
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| bad_chunk("name index out of range"))
    }

    fn operands(
        &self,
        chunk: &Chunk,
        op_offset: u32,
        stack: &mut Vec<Value>,
        op: &str,
    ) -> std::result::Result<(f64, f64), Diagnostic> {
        let right = pop(stack)?;
        let left = pop(stack)?;
        match (&left, &right) {
            (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
            _ => Err(locate(type_mismatch(op, &left, &right), chunk, op_offset)),
        }
    }

    fn arithmetic<F>(
        &self,
        chunk: &Chunk,
        op_offset: u32,
        stack: &mut Vec<Value>,
        op: &str,
        func: F,
    ) -> std::result::Result<(), Diagnostic>
    where
        F: Fn(f64, f64) -> f64,
    {
        let (a, b) = self.operands(chunk, op_offset, stack, op)?;
        stack.push(Value::Number(func(a, b)));
        Ok(())
    }

    fn compare<F>(
        &self,
        chunk: &Chunk,
        op_offset: u32,
        stack: &mut Vec<Value>,
        op: &str,
        cmp: F,
    ) -> std::result::Result<(), Diagnostic>
    where
        F: Fn(f64, f64) -> bool,
    {
        let (a, b) = self.operands(chunk, op_offset, stack, op)?;
        stack.push(Value::Bool(cmp(a, b)));
        Ok(())
    }
}

fn pop(stack: &mut Vec<Value>) -> std::result::Result<Value, Diagnostic> {
    stack.pop().ok_or_else(|| bad_chunk("operand stack underflow"))
}

fn bad_chunk(message: &str) -> Diagnostic {
    Diagnostic::runtime(RuntimeErrorKind::BadChunk, message)
}

fn type_mismatch(op: &str, left: &Value, right: &Value) -> Diagnostic {
    Diagnostic::runtime(
        RuntimeErrorKind::TypeMismatch,
        format!(
            "`{op}` expects numeric operands, found {} and {}",
            left.type_name(),
            right.type_name()
        ),
    )
}

fn locate(diag: Diagnostic, chunk: &Chunk, offset: u32) -> Diagnostic {
    match chunk.location_at(offset) {
        Some(loc) if diag.location.is_none() => diag.with_location(loc),
        _ => diag,
    }
}
