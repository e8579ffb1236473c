//! Constant expression evaluation
//!
//! Precedence climbing over a token list. Identifiers are handed to an
//! [`OperandResolver`], which lets the same evaluator serve declarations
//! (entity lookups) and the preprocessor (`defined`, macro names).

use tracing::trace;

use crate::const_variant::{BinaryOp, ConstVariant, UnaryOp};
use crate::error::{CompileError, Result};
use crate::lexer::{Token, TokenKind};

/// Level that accepts every binary operator
pub const LOWEST_PRECEDENCE: u32 = 100;

/// Result of an evaluation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Evaluated {
    pub value: ConstVariant,
    /// The value depends on something that is only known at runtime; the
    /// value itself is then zero.
    pub dynamic: bool,
}

impl Evaluated {
    pub fn constant(value: ConstVariant) -> Self {
        Self { value, dynamic: false }
    }

    pub fn dynamic() -> Self {
        Self {
            value: ConstVariant::default(),
            dynamic: true,
        }
    }
}

/// Cursor over a token list
#[derive(Debug)]
pub struct TokenCursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TokenCursor<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    pub fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset)
    }

    pub fn next(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Consume the token if it has the given text
    pub fn eat(&mut self, text: &str) -> bool {
        if self.peek().is_some_and(|t| t.is(text)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Location used for errors at the cursor
    pub fn location(&self) -> (u32, u32) {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|t| (t.line, t.col))
            .unwrap_or((0, 0))
    }

    pub fn expect(&mut self, text: &str) -> Result<()> {
        if self.eat(text) {
            Ok(())
        } else {
            let (line, col) = self.location();
            Err(CompileError::syntax(format!("Expecting '{}'.", text)).at(line, col))
        }
    }
}

/// Resolves identifier operands
pub trait OperandResolver {
    /// Resolve the operand starting at the cursor (an identifier, keyword
    /// or `::`) and consume its tokens.
    fn resolve(&mut self, cursor: &mut TokenCursor<'_>) -> Result<Evaluated>;
}

fn is_terminator(tok: &Token) -> bool {
    tok.kind == TokenKind::Separator && matches!(tok.text.as_str(), "}" | "]" | "," | ";" | ")")
}

/// Evaluate a complete token list
pub fn evaluate<R: OperandResolver + ?Sized>(tokens: &[Token], resolver: &mut R) -> Result<Evaluated> {
    let mut cursor = TokenCursor::new(tokens);
    if cursor.at_end() {
        return Err(CompileError::syntax("Missing expression."));
    }
    let result = evaluate_at(&mut cursor, resolver, LOWEST_PRECEDENCE)?;
    if let Some(tok) = cursor.peek() {
        return Err(CompileError::syntax("Expecting operator").at(tok.line, tok.col));
    }
    trace!(value = %result.value, dynamic = result.dynamic, "evaluated expression");
    Ok(result)
}

/// Evaluate one expression at the cursor, stopping at a terminator or an
/// operator that binds looser than `level`.
pub fn evaluate_at<R: OperandResolver + ?Sized>(
    cursor: &mut TokenCursor<'_>,
    resolver: &mut R,
    level: u32,
) -> Result<Evaluated> {
    let mut lhs = operand(cursor, resolver)?;

    while let Some(tok) = cursor.peek() {
        if is_terminator(tok) {
            break;
        }
        let op = match tok.kind {
            TokenKind::Operator => BinaryOp::from_token(&tok.text),
            _ => None,
        };
        let Some(op) = op else {
            return Err(CompileError::syntax("Expecting operator").at(tok.line, tok.col));
        };
        if op.precedence() >= level {
            break;
        }
        cursor.next();

        let rhs = evaluate_at(cursor, resolver, op.precedence())?;
        lhs = if lhs.dynamic || rhs.dynamic {
            Evaluated::dynamic()
        } else {
            let value = ConstVariant::binary(op, &lhs.value, &rhs.value).map_err(|e| e.or_location(tok.line, tok.col))?;
            Evaluated::constant(value)
        };
    }

    Ok(lhs)
}

fn operand<R: OperandResolver + ?Sized>(cursor: &mut TokenCursor<'_>, resolver: &mut R) -> Result<Evaluated> {
    let Some(tok) = cursor.peek() else {
        let (line, col) = cursor.location();
        return Err(CompileError::syntax("Missing operand.").at(line, col));
    };

    if tok.is("(") {
        cursor.next();
        let inner = evaluate_at(cursor, resolver, LOWEST_PRECEDENCE)?;
        cursor.expect(")")?;
        return Ok(inner);
    }

    if tok.kind == TokenKind::Operator {
        if let Some(op) = UnaryOp::from_token(&tok.text) {
            cursor.next();
            let inner = evaluate_at(cursor, resolver, 0)?;
            if inner.dynamic {
                return Ok(inner);
            }
            let value = ConstVariant::unary(op, &inner.value).map_err(|e| e.or_location(tok.line, tok.col))?;
            return Ok(Evaluated::constant(value));
        }
    }

    match tok.kind {
        TokenKind::Literal(_) => {
            cursor.next();
            Ok(Evaluated::constant(ConstVariant::from_literal(tok)?))
        }
        TokenKind::Identifier | TokenKind::Keyword => resolver.resolve(cursor),
        TokenKind::Separator if tok.text == "::" => resolver.resolve(cursor),
        _ => Err(CompileError::syntax(format!("Unexpected token '{}' in expression.", tok.text)).at(tok.line, tok.col)),
    }
}

/// Resolver for expressions that may only contain literals
pub struct LiteralOnly;

impl OperandResolver for LiteralOnly {
    fn resolve(&mut self, cursor: &mut TokenCursor<'_>) -> Result<Evaluated> {
        let (line, col) = cursor.location();
        Err(CompileError::syntax("Expecting a constant expression.").at(line, col))
    }
}
