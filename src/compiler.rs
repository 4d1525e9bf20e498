use indexmap::IndexMap;

use crate::{
    ast::{BinaryOp, Expr, ExprKind, Literal, LogicalOp, Stmt, StmtKind, UnaryOp},
    chunk::{Chunk, Constant, OpCode},
    diagnostics::{Diagnostic, DiagnosticKind, Location},
};

/// Compiles the MVP subset to a [`Chunk`]. Function declarations and
/// literals are rejected; everything else lowers to the fixed instruction
/// set with back-patched absolute jumps.
pub fn compile(program: &[Stmt]) -> Result<Chunk, Diagnostic> {
    let mut compiler = Compiler::new();
    let last = program.len().checked_sub(1);
    for (index, stmt) in program.iter().enumerate() {
        // The final top-level expression is left on the stack so HALT
        // yields it, matching the interpreter's last-statement result.
        let keep = Some(index) == last && matches!(stmt.kind, StmtKind::Expr(_));
        compiler.stmt(stmt, keep)?;
    }
    let end = program.last().map(|stmt| stmt.loc).unwrap_or(Location::new(1, 1));
    compiler.chunk.emit_op(OpCode::Halt, end);
    Ok(compiler.chunk)
}

struct Compiler {
    chunk: Chunk,
    /// Static scope stack mapping source names to global slot names. Block
    /// locals are mangled into unique slots so shadowing behaves exactly as
    /// in the interpreter despite the VM's flat namespace.
    scopes: Vec<IndexMap<String, String>>,
    next_slot: u32,
}

impl Compiler {
    fn new() -> Self {
        Self {
            chunk: Chunk::new(),
            scopes: vec![IndexMap::new()],
            next_slot: 0,
        }
    }

    fn stmt(&mut self, stmt: &Stmt, keep: bool) -> Result<(), Diagnostic> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.expr(expr)?;
                if !keep {
                    self.chunk.emit_op(OpCode::Pop, stmt.loc);
                }
            }
            StmtKind::Let { name, initializer } => {
                match initializer {
                    Some(expr) => self.expr(expr)?,
                    None => {
                        let index = self.chunk.add_constant(Constant::Nil);
                        self.chunk.emit_op(OpCode::Const, stmt.loc);
                        self.chunk.emit_u32(index);
                    }
                }
                let slot = self.declare(name);
                let index = self.chunk.intern_name(&slot);
                self.chunk.emit_op(OpCode::Store, stmt.loc);
                self.chunk.emit_u32(index);
            }
            StmtKind::Block(statements) => {
                self.scopes.push(IndexMap::new());
                let result = self.block_body(statements);
                self.scopes.pop();
                result?;
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expr(condition)?;
                let else_jump = self.chunk.emit_jump(OpCode::JmpIfFalse, stmt.loc);
                self.stmt(then_branch, false)?;
                match else_branch {
                    Some(else_branch) => {
                        let end_jump = self.chunk.emit_jump(OpCode::Jmp, stmt.loc);
                        self.chunk.patch_jump(else_jump);
                        self.stmt(else_branch, false)?;
                        self.chunk.patch_jump(end_jump);
                    }
                    None => self.chunk.patch_jump(else_jump),
                }
            }
            StmtKind::While { condition, body } => {
                let loop_start = self.chunk.position();
                self.expr(condition)?;
                let exit_jump = self.chunk.emit_jump(OpCode::JmpIfFalse, stmt.loc);
                self.stmt(body, false)?;
                self.chunk.emit_op(OpCode::Jmp, stmt.loc);
                self.chunk.emit_u32(loop_start);
                self.chunk.patch_jump(exit_jump);
            }
            StmtKind::Function(_) => {
                return Err(unsupported(
                    "function declarations are not supported by the bytecode backend",
                    stmt.loc,
                ));
            }
            StmtKind::Return(expr) => {
                match expr {
                    Some(expr) => self.expr(expr)?,
                    None => {
                        let index = self.chunk.add_constant(Constant::Nil);
                        self.chunk.emit_op(OpCode::Const, stmt.loc);
                        self.chunk.emit_u32(index);
                    }
                }
                self.chunk.emit_op(OpCode::Ret, stmt.loc);
            }
        }
        Ok(())
    }

    fn block_body(&mut self, statements: &[Stmt]) -> Result<(), Diagnostic> {
        for stmt in statements {
            self.stmt(stmt, false)?;
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), Diagnostic> {
        match &expr.kind {
            ExprKind::Literal(literal) => {
                let constant = match literal {
                    Literal::Number(n) => Constant::Number(*n),
                    Literal::Str(s) => Constant::Str(s.clone()),
                    Literal::Bool(b) => Constant::Bool(*b),
                    Literal::Nil => Constant::Nil,
                };
                let index = self.chunk.add_constant(constant);
                self.chunk.emit_op(OpCode::Const, expr.loc);
                self.chunk.emit_u32(index);
            }
            ExprKind::Variable(name) => {
                let slot = self.resolve(name);
                let index = self.chunk.intern_name(&slot);
                self.chunk.emit_op(OpCode::Load, expr.loc);
                self.chunk.emit_u32(index);
            }
            ExprKind::Assign { name, value } => {
                self.expr(value)?;
                // Assignment never defines; reject names no `let` declared.
                let Some(slot) = self.lookup(name) else {
                    return Err(unsupported(
                        &format!("cannot assign to undefined variable `{name}`"),
                        expr.loc,
                    ));
                };
                let index = self.chunk.intern_name(&slot);
                // Store then reload, so the assignment still yields its
                // value as an expression.
                self.chunk.emit_op(OpCode::Store, expr.loc);
                self.chunk.emit_u32(index);
                self.chunk.emit_op(OpCode::Load, expr.loc);
                self.chunk.emit_u32(index);
            }
            ExprKind::Unary { op, expr: operand } => {
                self.expr(operand)?;
                let op = match op {
                    UnaryOp::Negate => OpCode::Neg,
                    UnaryOp::Not => OpCode::Not,
                };
                self.chunk.emit_op(op, expr.loc);
            }
            ExprKind::Binary { op, left, right } => {
                self.expr(left)?;
                self.expr(right)?;
                let op = match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                    BinaryOp::Mod => OpCode::Mod,
                    BinaryOp::Equal => OpCode::Eq,
                    BinaryOp::NotEqual => OpCode::Ne,
                    BinaryOp::Less => OpCode::Lt,
                    BinaryOp::LessEqual => OpCode::Le,
                    BinaryOp::Greater => OpCode::Gt,
                    BinaryOp::GreaterEqual => OpCode::Ge,
                };
                self.chunk.emit_op(op, expr.loc);
            }
            ExprKind::Logical { op, left, right } => self.logical(*op, left, right, expr.loc)?,
            ExprKind::Call { callee, args } => {
                let name = match &callee.kind {
                    ExprKind::Variable(name) => name,
                    _ => {
                        return Err(unsupported(
                            "the bytecode backend only supports calls to named functions",
                            expr.loc,
                        ));
                    }
                };
                if self.lookup(name).is_some() {
                    return Err(unsupported(
                        &format!("`{name}` is a variable; the bytecode backend cannot call it"),
                        expr.loc,
                    ));
                }
                if args.len() > u8::MAX as usize {
                    return Err(unsupported("too many call arguments", expr.loc));
                }
                for arg in args {
                    self.expr(arg)?;
                }
                let index = self.chunk.intern_name(name);
                self.chunk.emit_op(OpCode::Call, expr.loc);
                self.chunk.emit_u32(index);
                self.chunk.emit_u8(args.len() as u8);
            }
            ExprKind::Function(_) => {
                return Err(unsupported(
                    "function literals are not supported by the bytecode backend",
                    expr.loc,
                ));
            }
        }
        Ok(())
    }

    /// Short-circuit lowering; the result is always a Bool, matching the
    /// interpreter's truthiness coercion.
    fn logical(
        &mut self,
        op: LogicalOp,
        left: &Expr,
        right: &Expr,
        loc: Location,
    ) -> Result<(), Diagnostic> {
        match op {
            LogicalOp::And => {
                self.expr(left)?;
                let short = self.chunk.emit_jump(OpCode::JmpIfFalse, loc);
                self.expr(right)?;
                let fail = self.chunk.emit_jump(OpCode::JmpIfFalse, loc);
                self.emit_bool(true, loc);
                let end = self.chunk.emit_jump(OpCode::Jmp, loc);
                self.chunk.patch_jump(short);
                self.chunk.patch_jump(fail);
                self.emit_bool(false, loc);
                self.chunk.patch_jump(end);
            }
            LogicalOp::Or => {
                self.expr(left)?;
                let try_right = self.chunk.emit_jump(OpCode::JmpIfFalse, loc);
                self.emit_bool(true, loc);
                let end_left = self.chunk.emit_jump(OpCode::Jmp, loc);
                self.chunk.patch_jump(try_right);
                self.expr(right)?;
                let fail = self.chunk.emit_jump(OpCode::JmpIfFalse, loc);
                self.emit_bool(true, loc);
                let end_right = self.chunk.emit_jump(OpCode::Jmp, loc);
                self.chunk.patch_jump(fail);
                self.emit_bool(false, loc);
                self.chunk.patch_jump(end_left);
                self.chunk.patch_jump(end_right);
            }
        }
        Ok(())
    }

    fn emit_bool(&mut self, value: bool, loc: Location) {
        let index = self.chunk.add_constant(Constant::Bool(value));
        self.chunk.emit_op(OpCode::Const, loc);
        self.chunk.emit_u32(index);
    }

    /// Allocates a slot for a `let`. Top-level names keep their source
    /// spelling; block locals get a unique mangled slot.
    fn declare(&mut self, name: &str) -> String {
        let slot = if self.scopes.len() == 1 {
            name.to_string()
        } else {
            self.next_slot += 1;
            format!("{name}@{}", self.next_slot)
        };
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot.clone());
        }
        slot
    }

    fn lookup(&self, name: &str) -> Option<String> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }

    /// Loads fall back to the source name so natives and host-visible
    /// globals resolve at runtime.
    fn resolve(&self, name: &str) -> String {
        self.lookup(name).unwrap_or_else(|| name.to_string())
    }
}

fn unsupported(message: &str, loc: Location) -> Diagnostic {
    Diagnostic::new(DiagnosticKind::Compile, message).with_location(loc)
}
