use std::fmt;

use thiserror::Error;

/// Line/column position of a character within a source file, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: u32,
    pub col: u32,
}

impl Location {
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Classification of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexer,
    Parser,
    Compile,
    Runtime(RuntimeErrorKind),
}

/// Fine-grained runtime failure classes. Tests and hosts match on these
/// rather than on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    UndefinedVariable,
    TypeMismatch,
    DivisionByZero,
    ArityMismatch,
    NotCallable,
    NativeBoundary,
    StackOverflow,
    StepLimit,
    BadChunk,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Lexer => write!(f, "lex error"),
            DiagnosticKind::Parser => write!(f, "parse error"),
            DiagnosticKind::Compile => write!(f, "compile error"),
            DiagnosticKind::Runtime(kind) => {
                let detail = match kind {
                    RuntimeErrorKind::UndefinedVariable => "undefined variable",
                    RuntimeErrorKind::TypeMismatch => "type mismatch",
                    RuntimeErrorKind::DivisionByZero => "division by zero",
                    RuntimeErrorKind::ArityMismatch => "arity mismatch",
                    RuntimeErrorKind::NotCallable => "not callable",
                    RuntimeErrorKind::NativeBoundary => "native boundary",
                    RuntimeErrorKind::StackOverflow => "stack overflow",
                    RuntimeErrorKind::StepLimit => "step limit",
                    RuntimeErrorKind::BadChunk => "bad chunk",
                };
                write!(f, "runtime error ({detail})")
            }
        }
    }
}

/// Rich diagnostic information surfaced to the host and, through it, to
/// editor tooling ("jump to error" needs the carried location).
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub location: Option<Location>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            notes: Vec::new(),
        }
    }

    pub fn runtime(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Runtime(kind), message)
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn runtime_kind(&self) -> Option<RuntimeErrorKind> {
        match self.kind {
            DiagnosticKind::Runtime(kind) => Some(kind),
            _ => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(location) = self.location {
            write!(f, " at {location}")?;
        }
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Unified error type for the Hellebore toolchain.
#[derive(Debug, Error)]
pub enum HelleboreError {
    #[error("{0}")]
    Diagnostic(#[from] Diagnostic),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HelleboreError {
    /// Runtime classification, when this error is a runtime diagnostic.
    pub fn runtime_kind(&self) -> Option<RuntimeErrorKind> {
        match self {
            HelleboreError::Diagnostic(diag) => diag.runtime_kind(),
            HelleboreError::Io(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, HelleboreError>;
