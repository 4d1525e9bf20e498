//! Core library for the Hellebore scripting language: lexing, parsing, a
//! tree-walking interpreter with lexical closures, and a bytecode compiler
//! plus stack VM for the restricted subset used by hot entity-update loops.

pub mod ast;
pub mod chunk;
pub mod compiler;
pub mod diagnostics;
pub mod environment;
pub mod host;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod runtime;
pub mod stdlib;
pub mod value;
pub mod vm;

pub use diagnostics::{Diagnostic, DiagnosticKind, HelleboreError, Location, RuntimeErrorKind};
pub use host::ScriptInstance;
pub use repl::Repl;
pub use runtime::Interpreter;
pub use vm::Vm;
