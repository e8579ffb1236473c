//! Source units and code cursors

use std::path::{Path, PathBuf};

/// Index of an opened source unit within a parse session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u32);

/// How a source unit entered the parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    Source,
    LocalInclude,
    GlobalInclude,
}

/// Byte cursor over source code with 1-based line/column tracking
#[derive(Debug, Clone)]
pub struct Cursor {
    code: String,
    pos: usize,
    line: u32,
    col: u32,
}

impl Cursor {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn col(&self) -> u32 {
        self.col
    }

    pub fn at_eof(&self) -> bool {
        self.pos >= self.code.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.code.as_bytes().get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.code.as_bytes().get(self.pos + offset).copied()
    }

    pub fn starts_with(&self, s: &str) -> bool {
        self.code.as_bytes()[self.pos..].starts_with(s.as_bytes())
    }

    pub fn bump(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    pub fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            if self.bump().is_none() {
                break;
            }
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn slice(&self, start: usize, end: usize) -> &str {
        self.code.get(start..end).unwrap_or("")
    }

    /// True when only spaces or tabs precede the cursor on its line
    pub fn at_line_start(&self) -> bool {
        self.code.as_bytes()[..self.pos]
            .iter()
            .rev()
            .take_while(|&&b| b != b'\n')
            .all(|&b| b == b' ' || b == b'\t' || b == b'\r')
    }

    /// Skip to the end of the current line; the newline itself is kept
    pub fn skip_line(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == b'\n' {
                break;
            }
            self.bump();
        }
    }

    /// Read the remainder of the logical line, joining `\`-continued lines.
    /// The terminating newline is consumed.
    pub fn read_logical_line(&mut self) -> String {
        let mut line = String::new();
        loop {
            let start = self.pos;
            self.skip_line();
            let mut text = self.slice(start, self.pos).to_string();
            if text.ends_with('\r') {
                text.pop();
            }
            self.bump();
            if let Some(stripped) = text.strip_suffix('\\') {
                line.push_str(stripped);
                line.push(' ');
                if self.at_eof() {
                    break;
                }
                continue;
            }
            line.push_str(&text);
            break;
        }
        line
    }
}

/// One open source unit on the parse stack
#[derive(Debug)]
pub struct SourceContext {
    pub id: SourceId,
    /// Resolved path; `None` for in-memory code
    pub path: Option<PathBuf>,
    pub cursor: Cursor,
    pub kind: IncludeKind,
}

impl SourceContext {
    pub fn new(id: SourceId, path: Option<PathBuf>, code: impl Into<String>, kind: IncludeKind) -> Self {
        Self {
            id,
            path,
            cursor: Cursor::new(code),
            kind,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Directory used to resolve local includes
    pub fn base_dir(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }
}

/// Metadata of every source unit opened during a session, kept after the
/// context itself has been popped
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub path: Option<PathBuf>,
    pub kind: IncludeKind,
}
