use std::fmt::Write as _;

use crate::{diagnostics::Location, value::Value};

/// One-byte instruction tags. Operands, where present, are 4-byte
/// little-endian unsigned integers; `Call` carries an extra 1-byte argument
/// count after its name index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Push constant table entry. Operand: constant index.
    Const = 0,
    /// Push the global named by the name table entry. Operand: name index.
    Load,
    /// Pop and store into the named global. Operand: name index.
    Store,
    Pop,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Unconditional jump. Operand: absolute byte offset into `code`.
    Jmp,
    /// Pop; jump when the value is not truthy. Operand: absolute offset.
    JmpIfFalse,
    /// Call a native by name. Operands: name index, then a 1-byte arg count.
    Call,
    Ret,
    Halt,
}

impl OpCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        let op = match byte {
            0 => OpCode::Const,
            1 => OpCode::Load,
            2 => OpCode::Store,
            3 => OpCode::Pop,
            4 => OpCode::Add,
            5 => OpCode::Sub,
            6 => OpCode::Mul,
            7 => OpCode::Div,
            8 => OpCode::Mod,
            9 => OpCode::Neg,
            10 => OpCode::Not,
            11 => OpCode::Eq,
            12 => OpCode::Ne,
            13 => OpCode::Lt,
            14 => OpCode::Le,
            15 => OpCode::Gt,
            16 => OpCode::Ge,
            17 => OpCode::Jmp,
            18 => OpCode::JmpIfFalse,
            19 => OpCode::Call,
            20 => OpCode::Ret,
            21 => OpCode::Halt,
            _ => return None,
        };
        Some(op)
    }
}

/// Constant table entry; only primitive values exist in the VM subset.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Nil,
    Number(f64),
    Str(String),
    Bool(bool),
}

impl Constant {
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Nil => Value::Nil,
            Constant::Number(n) => Value::Number(*n),
            Constant::Str(s) => Value::string(s.as_str()),
            Constant::Bool(b) => Value::Bool(*b),
        }
    }
}

/// Placeholder operand emitted for a forward jump until it is back-patched.
const UNPATCHED: u32 = u32::MAX;

/// A compiled unit: instruction bytes plus constant and name tables.
/// Built once by the compiler, immutable while the VM executes it.
#[derive(Debug, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub constants: Vec<Constant>,
    pub names: Vec<String>,
    /// Run-length `(offset, location)` pairs for runtime diagnostics.
    locations: Vec<(u32, Location)>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn emit_op(&mut self, op: OpCode, loc: Location) {
        let offset = self.position();
        match self.locations.last() {
            Some((_, last)) if *last == loc => {}
            _ => self.locations.push((offset, loc)),
        }
        self.code.push(op as u8);
    }

    pub fn emit_u32(&mut self, value: u32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_u8(&mut self, value: u8) {
        self.code.push(value);
    }

    /// Emits a jump with a placeholder operand; returns the operand offset
    /// to hand back to [`Chunk::patch_jump`].
    pub fn emit_jump(&mut self, op: OpCode, loc: Location) -> usize {
        self.emit_op(op, loc);
        let operand_at = self.code.len();
        self.emit_u32(UNPATCHED);
        operand_at
    }

    /// Overwrites a placeholder with the current position, as an absolute
    /// byte offset (not a relative delta).
    pub fn patch_jump(&mut self, operand_at: usize) {
        let target = self.position();
        self.code[operand_at..operand_at + 4].copy_from_slice(&target.to_le_bytes());
    }

    /// Constants are appended, never deduplicated: two identical literals
    /// occupy two slots.
    pub fn add_constant(&mut self, constant: Constant) -> u32 {
        self.constants.push(constant);
        (self.constants.len() - 1) as u32
    }

    /// Names are interned once and referenced by index.
    pub fn intern_name(&mut self, name: &str) -> u32 {
        if let Some(index) = self.names.iter().position(|n| n == name) {
            return index as u32;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as u32
    }

    pub fn read_u32(&self, at: usize) -> Option<u32> {
        let bytes = self.code.get(at..at + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Source location of the instruction at `offset`, for diagnostics.
    pub fn location_at(&self, offset: u32) -> Option<Location> {
        self.locations
            .iter()
            .take_while(|(at, _)| *at <= offset)
            .last()
            .map(|(_, loc)| *loc)
    }

    /// Human-readable listing, used by the `disasm` subcommand and by tests
    /// checking jump targets.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let mut ip = 0usize;
        while ip < self.code.len() {
            let offset = ip;
            let Some(op) = OpCode::from_byte(self.code[ip]) else {
                let _ = writeln!(out, "{offset:04} <bad opcode {}>", self.code[ip]);
                break;
            };
            ip += 1;
            match op {
                OpCode::Const => {
                    let index = self.read_u32(ip).unwrap_or(UNPATCHED);
                    ip += 4;
                    let constant = self
                        .constants
                        .get(index as usize)
                        .map(|c| format!("{c:?}"))
                        .unwrap_or_else(|| "<missing>".into());
                    let _ = writeln!(out, "{offset:04} CONST {index} ; {constant}");
                }
                OpCode::Load | OpCode::Store => {
                    let index = self.read_u32(ip).unwrap_or(UNPATCHED);
                    ip += 4;
                    let name = self
                        .names
                        .get(index as usize)
                        .map(String::as_str)
                        .unwrap_or("<missing>");
                    let _ = writeln!(out, "{offset:04} {op:?} {index} ; {name}");
                }
                OpCode::Jmp | OpCode::JmpIfFalse => {
                    let target = self.read_u32(ip).unwrap_or(UNPATCHED);
                    ip += 4;
                    let _ = writeln!(out, "{offset:04} {op:?} -> {target:04}");
                }
                OpCode::Call => {
                    let index = self.read_u32(ip).unwrap_or(UNPATCHED);
                    ip += 4;
                    let argc = self.code.get(ip).copied().unwrap_or(0);
                    ip += 1;
                    let name = self
                        .names
                        .get(index as usize)
                        .map(String::as_str)
                        .unwrap_or("<missing>");
                    let _ = writeln!(out, "{offset:04} CALL {index}/{argc} ; {name}");
                }
                _ => {
                    let _ = writeln!(out, "{offset:04} {op:?}");
                }
            }
        }
        out
    }
}
