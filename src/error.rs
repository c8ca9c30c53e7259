use crate::token::Pos;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// Main error type for c5c
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Include(#[from] IncludeError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// Lexical errors (E001)
#[derive(Debug, Error, Clone)]
pub enum LexError {
    #[error("E001: unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Pos),

    #[error("E001: unterminated string literal at {0}")]
    UnterminatedString(Pos),

    #[error("E001: unterminated character literal at {0}")]
    UnterminatedChar(Pos),

    #[error("E001: unterminated block comment at {0}")]
    UnterminatedComment(Pos),

    #[error("E001: invalid escape sequence '\\{0}' at {1}")]
    BadEscape(char, Pos),

    #[error("E001: malformed number '{0}' at {1}")]
    BadNumber(String, Pos),
}

impl LexError {
    pub fn pos(&self) -> &Pos {
        match self {
            LexError::UnexpectedChar(_, p)
            | LexError::UnterminatedString(p)
            | LexError::UnterminatedChar(p)
            | LexError::UnterminatedComment(p)
            | LexError::BadEscape(_, p)
            | LexError::BadNumber(_, p) => p,
        }
    }
}

// Syntax errors (E002)
#[derive(Debug, Error, Clone)]
pub enum ParseError {
    #[error("E002: unexpected end of file")]
    UnexpectedEof,

    #[error("E002: unexpected token '{0}' at {1}")]
    UnexpectedToken(String, Pos),

    #[error("E002: expected {0}, got '{1}' at {2}")]
    Expected(&'static str, String, Pos),
}

impl ParseError {
    pub fn pos(&self) -> Option<&Pos> {
        match self {
            ParseError::UnexpectedEof => None,
            ParseError::UnexpectedToken(_, p) | ParseError::Expected(_, _, p) => Some(p),
        }
    }
}

// Include resolution errors (E010)
#[derive(Debug, Error)]
pub enum IncludeError {
    #[error("E010: include not found: <{name}>; searched {}", .trail.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    NotFound { name: String, trail: Vec<PathBuf> },

    #[error("failed to read include <{name}>: {source}")]
    Unreadable {
        name: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

// Driver and toolchain failures, exit code 2
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("input file does not exist: {0}")]
    InputMissing(PathBuf),

    #[error("expected a .c5 input file: {0}")]
    BadExtension(PathBuf),

    #[error("assembler failed with status {0}")]
    AssemblerFailed(i32),

    #[error("linker failed with status {0}")]
    LinkerFailed(i32),

    #[error("library directory not found: {0}")]
    LibSourceMissing(PathBuf),
}

/// Diagnostic severity. Errors block code generation; warnings do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One batched diagnostic from semantic analysis: a stable code, a source
/// location and a single-line message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: &'static str,
    pub severity: Severity,
    pub pos: Pos,
    pub message: String,
}

impl Diagnostic {
    pub fn error(code: &'static str, pos: Pos, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            severity: Severity::Error,
            pos,
            message: message.into(),
        }
    }

    pub fn warning(code: &'static str, pos: Pos, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            severity: Severity::Warning,
            pos,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{}: {} {}: {}",
            self.pos, kind, self.code, self.message
        )
    }
}
