//! IDL Lexer
//!
//! Tokenizes IDL source code on demand from a [`Cursor`]. Comments and
//! preprocessor directive lines are returned as tokens of their own; the
//! parser decides what to do with them.

use crate::config::Environment;
use crate::error::{CompileError, Result};
use crate::source::{Cursor, SourceId};

/// Literal categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    DecInteger,
    HexInteger,
    OctInteger,
    BinInteger,
    Float,
    Fixed,
    Char,
    String,
    Boolean,
    Null,
}

/// Token categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Keyword,
    Literal(LiteralKind),
    /// `{ } ( ) [ ] ; , : ::`
    Separator,
    Operator,
    Comment,
    /// A `#` line; the text is the line after the number sign
    Directive,
    Eof,
}

/// A token with its source location
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub col: u32,
    pub end_line: u32,
    pub end_col: u32,
    pub source: SourceId,
    /// Produced by a macro expansion
    pub expanded: bool,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: u32, col: u32, source: SourceId) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            col,
            end_line: line,
            end_col: col,
            source,
            expanded: false,
        }
    }

    /// The canonical empty token signalling the end of all input
    pub fn eof(line: u32, col: u32, source: SourceId) -> Self {
        Self::new(TokenKind::Eof, "", line, col, source)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    /// Compare the token text (not applicable to literals and comments)
    pub fn is(&self, text: &str) -> bool {
        matches!(
            self.kind,
            TokenKind::Identifier | TokenKind::Keyword | TokenKind::Separator | TokenKind::Operator
        ) && self.text == text
    }

    pub fn is_identifier(&self) -> bool {
        self.kind == TokenKind::Identifier
    }

    pub fn is_keyword(&self) -> bool {
        self.kind == TokenKind::Keyword
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, TokenKind::Literal(_))
    }

    pub fn is_string_literal(&self) -> bool {
        self.kind == TokenKind::Literal(LiteralKind::String)
    }
}

const KEYWORDS: &[&str] = &[
    "any", "attribute", "bitfield", "bitmask", "bitset", "boolean", "byte", "case", "char", "const",
    "default", "double", "enum", "exception", "fixed", "float", "getraises", "in", "inout", "int",
    "int8", "int16", "int32", "int64", "interface", "local", "long", "map", "module", "native",
    "octet", "out", "raises", "readonly", "sequence", "setraises", "short", "string", "struct",
    "switch", "typedef", "uint", "uint8", "uint16", "uint32", "uint64", "union", "unsigned", "void",
    "wchar", "wstring",
];

const INTERFACE_KEYWORDS: &[&str] = &["interface_id", "interface_t"];
const EXCEPTION_KEYWORDS: &[&str] = &["exception_id"];
const POINTER_KEYWORDS: &[&str] = &["pointer"];
const UNICODE_KEYWORDS: &[&str] = &["char16", "char32", "u8string", "u16string", "u32string"];

/// Lexer configured with the keyword set of an environment
#[derive(Debug, Clone)]
pub struct Lexer {
    directives: bool,
    interface_type: bool,
    exception_type: bool,
    pointer_type: bool,
    unicode: bool,
}

impl Lexer {
    pub fn new(env: &Environment) -> Self {
        Self {
            directives: true,
            interface_type: env.interface_type,
            exception_type: env.exception_type,
            pointer_type: env.pointer_type,
            unicode: env.unicode,
        }
    }

    /// A lexer for macro bodies and directive lines, where `#` is an operator
    pub fn without_directives(mut self) -> Self {
        self.directives = false;
        self
    }

    pub fn is_keyword(&self, s: &str) -> bool {
        KEYWORDS.contains(&s)
            || (self.interface_type && INTERFACE_KEYWORDS.contains(&s))
            || (self.exception_type && EXCEPTION_KEYWORDS.contains(&s))
            || (self.pointer_type && POINTER_KEYWORDS.contains(&s))
            || (self.unicode && UNICODE_KEYWORDS.contains(&s))
    }

    fn is_null(&self, s: &str) -> bool {
        s == "nullptr" || (self.interface_type && s == "null")
    }

    /// Tokenize the entire input; used by tests and macro bodies
    pub fn tokenize(&self, code: &str, source: SourceId) -> Result<Vec<Token>> {
        let mut cursor = Cursor::new(code);
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token(&mut cursor, source)?;
            if tok.is_eof() {
                break;
            }
            if tok.kind != TokenKind::Comment {
                tokens.push(tok);
            }
        }
        Ok(tokens)
    }

    /// Get the next token
    pub fn next_token(&self, cursor: &mut Cursor, source: SourceId) -> Result<Token> {
        skip_whitespace(cursor);

        let (line, col) = (cursor.line(), cursor.col());
        let start = cursor.pos();

        let Some(ch) = cursor.peek() else {
            return Ok(Token::eof(line, col, source));
        };

        let kind = match ch {
            b'#' if self.directives && cursor.at_line_start() => {
                cursor.bump();
                let text = cursor.read_logical_line();
                let mut tok = Token::new(TokenKind::Directive, text.trim_start(), line, col, source);
                let newline = cursor.pos() > 0 && cursor.slice(cursor.pos() - 1, cursor.pos()) == "\n";
                tok.end_line = if newline { cursor.line() - 1 } else { cursor.line() };
                return Ok(tok);
            }
            b'/' if cursor.peek_at(1) == Some(b'/') => {
                cursor.skip_line();
                let text = cursor.slice(start, cursor.pos()).trim_end_matches('\r').to_string();
                return Ok(self.finish(TokenKind::Comment, text, line, col, cursor, source));
            }
            b'/' if cursor.peek_at(1) == Some(b'*') => return self.lex_block_comment(cursor, source),
            b'"' | b'\'' => return self.lex_quoted(cursor, start, source),
            b'0'..=b'9' => return self.lex_number(cursor, source),
            b'.' if matches!(cursor.peek_at(1), Some(b'0'..=b'9')) => return self.lex_number(cursor, source),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => return self.lex_ident(cursor, source),
            b'{' | b'}' | b'(' | b')' | b'[' | b']' | b';' | b',' => {
                cursor.bump();
                TokenKind::Separator
            }
            b':' => {
                cursor.bump();
                if cursor.peek() == Some(b':') {
                    cursor.bump();
                }
                TokenKind::Separator
            }
            b'<' | b'>' | b'=' | b'!' | b'&' | b'|' | b'#' => {
                cursor.bump();
                let next = cursor.peek();
                let double = match (ch, next) {
                    (b'<', Some(b'<' | b'=')) | (b'>', Some(b'>' | b'=')) => true,
                    (b'=' | b'!', Some(b'=')) => true,
                    (b'&', Some(b'&')) | (b'|', Some(b'|')) | (b'#', Some(b'#')) => true,
                    _ => false,
                };
                if double {
                    cursor.bump();
                }
                TokenKind::Operator
            }
            b'+' | b'-' | b'*' | b'/' | b'%' | b'^' | b'~' | b'.' | b'?' => {
                cursor.bump();
                TokenKind::Operator
            }
            _ => {
                return Err(CompileError::lexer(format!("Unexpected character '{}'.", ch as char)).at(line, col))
            }
        };

        let text = cursor.slice(start, cursor.pos()).to_string();
        Ok(self.finish(kind, text, line, col, cursor, source))
    }

    fn finish(&self, kind: TokenKind, text: String, line: u32, col: u32, cursor: &Cursor, source: SourceId) -> Token {
        let mut tok = Token::new(kind, text, line, col, source);
        tok.end_line = cursor.line();
        tok.end_col = cursor.col();
        tok
    }

    fn lex_block_comment(&self, cursor: &mut Cursor, source: SourceId) -> Result<Token> {
        let (line, col) = (cursor.line(), cursor.col());
        let start = cursor.pos();
        cursor.bump_n(2);
        loop {
            if cursor.at_eof() {
                return Err(CompileError::lexer("Unterminated comment.").at(line, col));
            }
            if cursor.starts_with("*/") {
                cursor.bump_n(2);
                break;
            }
            cursor.bump();
        }
        let text = cursor.slice(start, cursor.pos()).to_string();
        let mut tok = Token::new(TokenKind::Comment, text, line, col, source);
        // The end line is the line holding the terminator
        tok.end_line = cursor.line();
        tok.end_col = cursor.col();
        Ok(tok)
    }

    fn lex_ident(&self, cursor: &mut Cursor, source: SourceId) -> Result<Token> {
        let (line, col) = (cursor.line(), cursor.col());
        let start = cursor.pos();

        while let Some(ch) = cursor.peek() {
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                cursor.bump();
            } else {
                break;
            }
        }

        let s = cursor.slice(start, cursor.pos()).to_string();

        // Encoding prefix of a character or string literal
        if matches!(s.as_str(), "L" | "u" | "U" | "u8") && matches!(cursor.peek(), Some(b'"' | b'\'')) {
            return self.lex_quoted(cursor, start, source).map(|mut tok| {
                tok.line = line;
                tok.col = col;
                tok
            });
        }

        let kind = match s.as_str() {
            "TRUE" | "FALSE" | "true" | "false" => TokenKind::Literal(LiteralKind::Boolean),
            _ if self.is_null(&s) => TokenKind::Literal(LiteralKind::Null),
            _ if self.is_keyword(&s) => TokenKind::Keyword,
            _ => TokenKind::Identifier,
        };
        Ok(self.finish(kind, s, line, col, cursor, source))
    }

    /// Lex a character or string literal; `start` includes any prefix
    fn lex_quoted(&self, cursor: &mut Cursor, start: usize, source: SourceId) -> Result<Token> {
        let (line, col) = (cursor.line(), cursor.col());
        let quote = cursor.bump().unwrap_or(b'"');
        loop {
            match cursor.peek() {
                None | Some(b'\n') => {
                    let what = if quote == b'"' { "string" } else { "character" };
                    return Err(CompileError::lexer(format!("Unterminated {} literal.", what)).at(line, col));
                }
                Some(b'\\') => {
                    cursor.bump_n(2);
                }
                Some(ch) if ch == quote => {
                    cursor.bump();
                    break;
                }
                Some(_) => {
                    cursor.bump();
                }
            }
        }
        let kind = if quote == b'"' { LiteralKind::String } else { LiteralKind::Char };
        let text = cursor.slice(start, cursor.pos()).to_string();
        Ok(self.finish(TokenKind::Literal(kind), text, line, col, cursor, source))
    }

    fn lex_number(&self, cursor: &mut Cursor, source: SourceId) -> Result<Token> {
        let (line, col) = (cursor.line(), cursor.col());
        let start = cursor.pos();

        let radix_prefix = cursor.peek() == Some(b'0') && matches!(cursor.peek_at(1), Some(b'x' | b'X' | b'b' | b'B'));
        let kind = if radix_prefix {
            let hex = matches!(cursor.peek_at(1), Some(b'x' | b'X'));
            cursor.bump_n(2);
            let digits_start = cursor.pos();
            while let Some(ch) = cursor.peek() {
                let valid = if hex { ch.is_ascii_hexdigit() } else { ch == b'0' || ch == b'1' };
                if !valid {
                    break;
                }
                cursor.bump();
            }
            if cursor.pos() == digits_start {
                return Err(CompileError::lexer("Invalid number, missing digits.").at(line, col));
            }
            if hex {
                LiteralKind::HexInteger
            } else {
                LiteralKind::BinInteger
            }
        } else {
            let mut floating = false;
            while let Some(ch) = cursor.peek() {
                match ch {
                    b'0'..=b'9' => {}
                    b'.' if !floating => floating = true,
                    b'e' | b'E' => {
                        floating = true;
                        if matches!(cursor.peek_at(1), Some(b'+' | b'-')) {
                            cursor.bump();
                        }
                    }
                    _ => break,
                }
                cursor.bump();
            }
            let digits = cursor.slice(start, cursor.pos());
            if floating {
                LiteralKind::Float
            } else if digits.len() > 1 && digits.starts_with('0') {
                if digits.bytes().any(|b| b > b'7') {
                    return Err(CompileError::lexer("Invalid octal number.").at(line, col));
                }
                LiteralKind::OctInteger
            } else {
                LiteralKind::DecInteger
            }
        };

        // Suffixes
        let mut kind = kind;
        while let Some(ch) = cursor.peek() {
            match ch {
                b'u' | b'U' | b'l' | b'L' => {}
                b'f' | b'F' if kind == LiteralKind::Float || kind == LiteralKind::DecInteger => {
                    kind = LiteralKind::Float;
                }
                b'd' | b'D' if kind == LiteralKind::Float || kind == LiteralKind::DecInteger => {
                    kind = LiteralKind::Fixed;
                }
                _ => break,
            }
            cursor.bump();
        }

        if matches!(cursor.peek(), Some(ch) if ch.is_ascii_alphanumeric() || ch == b'_') {
            return Err(CompileError::lexer("Invalid suffix on numeric literal.").at(line, col));
        }

        let text = cursor.slice(start, cursor.pos()).to_string();
        Ok(self.finish(TokenKind::Literal(kind), text, line, col, cursor, source))
    }
}

fn skip_whitespace(cursor: &mut Cursor) {
    while let Some(ch) = cursor.peek() {
        if ch.is_ascii_whitespace() || ch == 0x0c {
            cursor.bump();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(code: &str) -> Vec<Token> {
        Lexer::new(&Environment::new()).tokenize(code, SourceId(0)).unwrap()
    }

    fn all(code: &str) -> Vec<Token> {
        let lexer = Lexer::new(&Environment::new());
        let mut cursor = Cursor::new(code);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token(&mut cursor, SourceId(0)).unwrap();
            if tok.is_eof() {
                break;
            }
            tokens.push(tok);
        }
        tokens
    }

    #[test]
    fn test_simple_struct() {
        let tokens = lex("struct Foo { long x; };");
        assert_eq!(tokens.len(), 8);
        assert!(tokens[0].is("struct"));
        assert_eq!(tokens[0].kind, TokenKind::Keyword);
        assert!(tokens[1].is_identifier());
        assert_eq!(tokens[3].kind, TokenKind::Keyword);
    }

    #[test]
    fn test_operators() {
        let tokens = lex("a::b << >> <= == != && || ~");
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "::", "b", "<<", ">>", "<=", "==", "!=", "&&", "||", "~"]);
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("10 0x1F 017 0b101 1.5 2e3 3.0f 1.25d 10ull");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Literal(LiteralKind::DecInteger),
                TokenKind::Literal(LiteralKind::HexInteger),
                TokenKind::Literal(LiteralKind::OctInteger),
                TokenKind::Literal(LiteralKind::BinInteger),
                TokenKind::Literal(LiteralKind::Float),
                TokenKind::Literal(LiteralKind::Float),
                TokenKind::Literal(LiteralKind::Float),
                TokenKind::Literal(LiteralKind::Fixed),
                TokenKind::Literal(LiteralKind::DecInteger),
            ]
        );
        assert_eq!(tokens[8].text, "10ull");
    }

    #[test]
    fn test_prefixed_literals() {
        let tokens = lex("L\"wide\" u8'a' U\"x\" 'c'");
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].text, "L\"wide\"");
        assert_eq!(tokens[1].kind, TokenKind::Literal(LiteralKind::Char));
        assert_eq!(tokens[3].text, "'c'");
    }

    #[test]
    fn test_comments_and_directives() {
        let tokens = all("// line\n/* block\n */ x\n  #define A 1\ny");
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[0].text, "// line");
        assert_eq!(tokens[1].kind, TokenKind::Comment);
        assert_eq!((tokens[1].line, tokens[1].end_line), (2, 3));
        assert!(tokens[2].is("x"));
        assert_eq!(tokens[3].kind, TokenKind::Directive);
        assert_eq!(tokens[3].text, "define A 1");
        assert!(tokens[4].is("y"));
        assert_eq!(tokens[4].line, 5);
    }

    #[test]
    fn test_extension_keywords() {
        let tokens = lex("char16 pointer null");
        assert_eq!(tokens[0].kind, TokenKind::Keyword);
        assert_eq!(tokens[2].kind, TokenKind::Literal(LiteralKind::Null));

        let strict = Lexer::new(&Environment::strict()).tokenize("char16 null", SourceId(0)).unwrap();
        assert!(strict[0].is_identifier());
        assert!(strict[1].is_identifier());
    }

    #[test]
    fn test_hash_operators_without_directives() {
        let lexer = Lexer::new(&Environment::new()).without_directives();
        let tokens = lexer.tokenize("#a ## b", SourceId(0)).unwrap();
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["#", "a", "##", "b"]);
    }

    #[test]
    fn test_unterminated() {
        let lexer = Lexer::new(&Environment::new());
        assert!(lexer.tokenize("/* open", SourceId(0)).is_err());
        assert!(lexer.tokenize("\"open", SourceId(0)).is_err());
        assert!(lexer.tokenize("$", SourceId(0)).is_err());
    }
}
