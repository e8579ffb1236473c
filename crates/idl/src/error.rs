//! IDL compiler errors

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Category of a compile error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed characters, comments or literals
    Lexer,
    /// Token sequence that the grammar cannot place
    Syntax,
    /// Unresolvable scoped name
    Resolve,
    /// Non-extendable name declared twice in one scope
    Duplicate,
    /// Constant evaluation failure (overflow, incompatible operands, ...)
    Const,
    /// Circular, duplicate or too deeply nested inclusion
    Include,
    /// Malformed or unsupported preprocessor directive
    Preprocessor,
    /// Broken internal invariant
    Internal,
}

/// A compile error with optional source location.
///
/// Rendered as `<path>(<line>): <description>` when the line is known,
/// otherwise as the bare description.
#[derive(Debug, Clone, Error)]
#[error("{}", render(.path, .line, .description))]
pub struct CompileError {
    pub kind: ErrorKind,
    pub description: String,
    /// 1-based line
    pub line: Option<u32>,
    /// 1-based column
    pub col: Option<u32>,
    pub path: Option<PathBuf>,
}

fn render(path: &Option<PathBuf>, line: &Option<u32>, description: &str) -> String {
    match line {
        Some(line) => {
            let path = path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            format!("{}({}): {}", path, line, description)
        }
        None => description.to_string(),
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;

impl CompileError {
    pub fn new(kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            line: None,
            col: None,
            path: None,
        }
    }

    pub fn lexer(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Lexer, description)
    }

    pub fn syntax(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, description)
    }

    pub fn resolve(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resolve, description)
    }

    pub fn duplicate(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Duplicate, description)
    }

    pub fn constant(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Const, description)
    }

    pub fn include(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Include, description)
    }

    pub fn preprocessor(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Preprocessor, description)
    }

    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, format!("Internal error: {}", description.into()))
    }

    /// Attach a location
    pub fn at(mut self, line: u32, col: u32) -> Self {
        self.line = Some(line);
        self.col = Some(col);
        self
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Fill in location fields that are still missing; existing values win.
    pub fn or_location(mut self, line: u32, col: u32) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
            self.col = Some(col);
        }
        self
    }

    pub fn or_path(mut self, path: Option<&Path>) -> Self {
        if self.path.is_none() {
            self.path = path.map(Path::to_path_buf);
        }
        self
    }
}
