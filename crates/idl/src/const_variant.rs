//! Constant values
//!
//! A closed set of value kinds with C++-style promotion, range-checked
//! casting and the operators usable in constant expressions.

use std::fmt;

use crate::error::{CompileError, Result};
use crate::lexer::{LiteralKind, Token, TokenKind};

const MSG_EXCEEDS: &str = "Cannot cast to type, the value exceeds the maximum possible value of the target type.";
const MSG_BELOW: &str = "Cannot cast to type, the value is below the minumum possible value of the target type.";
const MSG_BELOW_SIGNED: &str = "Cannot cast to type, the value is below the minumum possible value of the signed version \
                                of the target type.";
const MSG_PRECISION: &str =
    "Cannot cast to type, the value precision is below the smallest possible precision of the target type.";
const MSG_INCOMPATIBLE_CAST: &str = "Cannot cast to target type, the types are incompatible.";
const MSG_INCOMPATIBLE: &str = "The types of both operands are not compatible.";
const MSG_INTEGRAL: &str = "The operation requires integral operands.";

/// Fixed-point range is +/- 2^31
const FIXED_MAX: f64 = 2147483648.0;

/// Value kinds in rank order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueKind {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Fixed,
    Float,
    Double,
    LongDouble,
    String,
    U16String,
    U32String,
    WString,
}

impl ValueKind {
    pub fn rank(self) -> u32 {
        self as u32
    }

    pub fn is_integral(self) -> bool {
        self <= ValueKind::UInt64
    }

    pub fn is_signed(self) -> bool {
        matches!(self, ValueKind::Int8 | ValueKind::Int16 | ValueKind::Int32 | ValueKind::Int64)
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            ValueKind::Bool | ValueKind::UInt8 | ValueKind::UInt16 | ValueKind::UInt32 | ValueKind::UInt64
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(self, ValueKind::Fixed | ValueKind::Float | ValueKind::Double | ValueKind::LongDouble)
    }

    pub fn is_arithmetic(self) -> bool {
        self.is_integral() || self.is_floating()
    }

    pub fn is_string(self) -> bool {
        self >= ValueKind::String
    }

    /// Width in bits of an integral kind
    pub fn bits(self) -> u32 {
        match self {
            ValueKind::Bool => 1,
            ValueKind::Int8 | ValueKind::UInt8 => 8,
            ValueKind::Int16 | ValueKind::UInt16 => 16,
            ValueKind::Int32 | ValueKind::UInt32 | ValueKind::Float | ValueKind::Fixed => 32,
            _ => 64,
        }
    }

    fn signed_counterpart(self) -> Self {
        match self {
            ValueKind::UInt8 => ValueKind::Int8,
            ValueKind::UInt16 => ValueKind::Int16,
            ValueKind::UInt32 => ValueKind::Int32,
            ValueKind::UInt64 => ValueKind::Int64,
            other => other,
        }
    }

    fn unsigned_counterpart(self) -> Self {
        match self {
            ValueKind::Int8 => ValueKind::UInt8,
            ValueKind::Int16 => ValueKind::UInt16,
            ValueKind::Int32 => ValueKind::UInt32,
            ValueKind::Int64 => ValueKind::UInt64,
            other => other,
        }
    }

    fn int_bounds(self) -> (i128, i128) {
        match self {
            ValueKind::Bool => (0, 1),
            ValueKind::Int8 => (i8::MIN as i128, i8::MAX as i128),
            ValueKind::UInt8 => (0, u8::MAX as i128),
            ValueKind::Int16 => (i16::MIN as i128, i16::MAX as i128),
            ValueKind::UInt16 => (0, u16::MAX as i128),
            ValueKind::Int32 => (i32::MIN as i128, i32::MAX as i128),
            ValueKind::UInt32 => (0, u32::MAX as i128),
            ValueKind::Int64 => (i64::MIN as i128, i64::MAX as i128),
            _ => (0, u64::MAX as i128),
        }
    }

    /// Lowest and highest value of a floating kind
    fn float_bounds(self) -> (f64, f64) {
        match self {
            ValueKind::Fixed => (-FIXED_MAX, FIXED_MAX),
            ValueKind::Float => (f32::MIN as f64, f32::MAX as f64),
            _ => (f64::MIN, f64::MAX),
        }
    }

    /// Binary exponent of the smallest positive value of a floating kind
    fn min_exponent(self) -> i32 {
        match self {
            ValueKind::Fixed => frexp_exponent(1.0 / FIXED_MAX),
            ValueKind::Float => frexp_exponent(f32::MIN_POSITIVE as f64),
            _ => frexp_exponent(f64::MIN_POSITIVE),
        }
    }
}

/// Exponent `e` of `x = m * 2^e` with `0.5 <= |m| < 1`
fn frexp_exponent(x: f64) -> i32 {
    let bits = x.abs().to_bits();
    let exp = ((bits >> 52) & 0x7ff) as i32;
    if exp != 0 {
        return exp - 1022;
    }
    let mantissa = bits & ((1u64 << 52) - 1);
    if mantissa == 0 {
        return 0;
    }
    let top = 63 - mantissa.leading_zeros() as i32;
    top - 1073
}

/// A constant value
#[derive(Debug, Clone, PartialEq)]
pub enum ConstVariant {
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Fixed(f64),
    Float(f32),
    Double(f64),
    LongDouble(f64),
    String(String),
    U16String(String),
    U32String(String),
    WString(String),
}

impl Default for ConstVariant {
    fn default() -> Self {
        ConstVariant::Bool(false)
    }
}

/// Binary operators of constant expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinaryOp {
    pub fn from_token(text: &str) -> Option<Self> {
        let op = match text {
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "&" => BinaryOp::BitAnd,
            "^" => BinaryOp::BitXor,
            "|" => BinaryOp::BitOr,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        };
        Some(op)
    }

    /// Binding strength; lower binds tighter
    pub fn precedence(self) -> u32 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 1,
            BinaryOp::Add | BinaryOp::Sub => 2,
            BinaryOp::Shl | BinaryOp::Shr => 3,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
            BinaryOp::Eq | BinaryOp::Ne => 5,
            BinaryOp::BitAnd => 6,
            BinaryOp::BitXor => 7,
            BinaryOp::BitOr => 8,
            BinaryOp::And => 9,
            BinaryOp::Or => 10,
        }
    }

    fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::BitAnd | BinaryOp::BitXor | BinaryOp::BitOr
        )
    }
}

/// Unary operators of constant expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn from_token(text: &str) -> Option<Self> {
        match text {
            "+" => Some(UnaryOp::Plus),
            "-" => Some(UnaryOp::Minus),
            "!" => Some(UnaryOp::Not),
            "~" => Some(UnaryOp::BitNot),
            _ => None,
        }
    }
}

impl ConstVariant {
    pub fn kind(&self) -> ValueKind {
        match self {
            ConstVariant::Bool(_) => ValueKind::Bool,
            ConstVariant::Int8(_) => ValueKind::Int8,
            ConstVariant::UInt8(_) => ValueKind::UInt8,
            ConstVariant::Int16(_) => ValueKind::Int16,
            ConstVariant::UInt16(_) => ValueKind::UInt16,
            ConstVariant::Int32(_) => ValueKind::Int32,
            ConstVariant::UInt32(_) => ValueKind::UInt32,
            ConstVariant::Int64(_) => ValueKind::Int64,
            ConstVariant::UInt64(_) => ValueKind::UInt64,
            ConstVariant::Fixed(_) => ValueKind::Fixed,
            ConstVariant::Float(_) => ValueKind::Float,
            ConstVariant::Double(_) => ValueKind::Double,
            ConstVariant::LongDouble(_) => ValueKind::LongDouble,
            ConstVariant::String(_) => ValueKind::String,
            ConstVariant::U16String(_) => ValueKind::U16String,
            ConstVariant::U32String(_) => ValueKind::U32String,
            ConstVariant::WString(_) => ValueKind::WString,
        }
    }

    pub fn rank(&self) -> u32 {
        self.kind().rank()
    }

    fn int_value(&self) -> Option<i128> {
        let v = match *self {
            ConstVariant::Bool(b) => b as i128,
            ConstVariant::Int8(v) => v as i128,
            ConstVariant::UInt8(v) => v as i128,
            ConstVariant::Int16(v) => v as i128,
            ConstVariant::UInt16(v) => v as i128,
            ConstVariant::Int32(v) => v as i128,
            ConstVariant::UInt32(v) => v as i128,
            ConstVariant::Int64(v) => v as i128,
            ConstVariant::UInt64(v) => v as i128,
            _ => return None,
        };
        Some(v)
    }

    fn float_value(&self) -> Option<f64> {
        match *self {
            ConstVariant::Fixed(v) | ConstVariant::Double(v) | ConstVariant::LongDouble(v) => Some(v),
            ConstVariant::Float(v) => Some(v as f64),
            _ => self.int_value().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConstVariant::String(s)
            | ConstVariant::U16String(s)
            | ConstVariant::U32String(s)
            | ConstVariant::WString(s) => Some(s),
            _ => None,
        }
    }

    /// Build an integral value; the caller guarantees the range or wants
    /// modulo-2^n truncation.
    fn from_int(kind: ValueKind, v: i128) -> Self {
        match kind {
            ValueKind::Bool => ConstVariant::Bool(v != 0),
            ValueKind::Int8 => ConstVariant::Int8(v as i8),
            ValueKind::UInt8 => ConstVariant::UInt8(v as u8),
            ValueKind::Int16 => ConstVariant::Int16(v as i16),
            ValueKind::UInt16 => ConstVariant::UInt16(v as u16),
            ValueKind::Int32 => ConstVariant::Int32(v as i32),
            ValueKind::UInt32 => ConstVariant::UInt32(v as u32),
            ValueKind::Int64 => ConstVariant::Int64(v as i64),
            _ => ConstVariant::UInt64(v as u64),
        }
    }

    fn from_float(kind: ValueKind, v: f64) -> Self {
        match kind {
            ValueKind::Fixed => ConstVariant::Fixed(v),
            ValueKind::Float => ConstVariant::Float(v as f32),
            ValueKind::Double => ConstVariant::Double(v),
            _ => ConstVariant::LongDouble(v),
        }
    }

    /// Cast to another kind with full range checking
    pub fn cast(&self, target: ValueKind) -> Result<ConstVariant> {
        let source = self.kind();
        if source == target {
            return Ok(self.clone());
        }
        if source.is_string() || target.is_string() {
            return Err(CompileError::constant(MSG_INCOMPATIBLE_CAST));
        }

        if target.is_floating() {
            let v = self.float_value().unwrap_or_default();
            let (lowest, max) = target.float_bounds();
            if v > max {
                return Err(CompileError::constant(MSG_EXCEEDS));
            }
            if v < lowest {
                return Err(CompileError::constant(MSG_BELOW));
            }
            if source.is_floating() && v != 0.0 && frexp_exponent(v) < target.min_exponent() {
                return Err(CompileError::constant(MSG_PRECISION));
            }
            return Ok(Self::from_float(target, v));
        }

        let Some(v) = self.int_value() else {
            return Err(CompileError::constant(MSG_INCOMPATIBLE_CAST));
        };

        if target == ValueKind::Bool {
            return Ok(ConstVariant::Bool(v != 0));
        }

        let (min, max) = target.int_bounds();
        if source.is_signed() && target.is_unsigned() {
            if v > max {
                return Err(CompileError::constant(MSG_EXCEEDS));
            }
            let (signed_min, _) = target.signed_counterpart().int_bounds();
            if v < signed_min {
                return Err(CompileError::constant(MSG_BELOW_SIGNED));
            }
            // Negative values wrap around
            return Ok(Self::from_int(target, v));
        }

        if v > max {
            return Err(CompileError::constant(MSG_EXCEEDS));
        }
        if v < min {
            return Err(CompileError::constant(MSG_BELOW));
        }
        Ok(Self::from_int(target, v))
    }

    /// Truth value of an arithmetic value
    pub fn truthy(&self) -> Result<bool> {
        match self.float_value() {
            Some(v) => Ok(v != 0.0),
            None => Err(CompileError::constant(MSG_INCOMPATIBLE)),
        }
    }

    pub fn to_i64(&self) -> Result<i64> {
        match self.cast(ValueKind::Int64)? {
            ConstVariant::Int64(v) => Ok(v),
            _ => Err(CompileError::internal("unexpected cast result")),
        }
    }

    pub fn to_u64(&self) -> Result<u64> {
        match self.cast(ValueKind::UInt64)? {
            ConstVariant::UInt64(v) => Ok(v),
            _ => Err(CompileError::internal("unexpected cast result")),
        }
    }

    /// Integer promotion: kinds narrower than a 32-bit integer become `Int32`
    fn promote(&self) -> ConstVariant {
        match self.int_value() {
            Some(v) if self.kind() < ValueKind::Int32 => ConstVariant::Int32(v as i32),
            _ => self.clone(),
        }
    }

    /// Bring both operands to a common kind
    pub fn equalize(lhs: &ConstVariant, rhs: &ConstVariant) -> Result<(ConstVariant, ConstVariant)> {
        let (a, b) = (lhs.kind(), rhs.kind());
        if a == b {
            return Ok((lhs.clone(), rhs.clone()));
        }
        if !a.is_arithmetic() || !b.is_arithmetic() {
            return Err(CompileError::constant(MSG_INCOMPATIBLE));
        }

        let (ka, kb) = if a.is_floating() || b.is_floating() || a.is_signed() == b.is_signed() {
            let k = a.max(b);
            (k, k)
        } else {
            let (signed, unsigned) = if a.is_signed() { (a, b) } else { (b, a) };
            let common = if unsigned.rank() >= signed.rank() {
                unsigned
            } else if signed.bits() > unsigned.bits() {
                signed
            } else {
                signed.unsigned_counterpart()
            };
            (common, common)
        };
        Ok((lhs.cast(ka)?, rhs.cast(kb)?))
    }

    /// Apply a binary operator
    pub fn binary(op: BinaryOp, lhs: &ConstVariant, rhs: &ConstVariant) -> Result<ConstVariant> {
        let (a, b) = (lhs.kind(), rhs.kind());

        if a.is_string() || b.is_string() {
            return match (lhs.as_str(), rhs.as_str(), op) {
                (Some(x), Some(y), BinaryOp::Eq) if a == b => Ok(ConstVariant::Bool(x == y)),
                (Some(x), Some(y), BinaryOp::Ne) if a == b => Ok(ConstVariant::Bool(x != y)),
                _ => Err(CompileError::constant(MSG_INCOMPATIBLE)),
            };
        }

        match op {
            BinaryOp::And => return Ok(ConstVariant::Bool(lhs.truthy()? && rhs.truthy()?)),
            BinaryOp::Or => return Ok(ConstVariant::Bool(lhs.truthy()? || rhs.truthy()?)),
            _ if op.is_bitwise() && (a == ValueKind::Bool || b == ValueKind::Bool) => {
                return Err(CompileError::constant("Cannot execute bitwise operations on a boolean."))
            }
            BinaryOp::Div | BinaryOp::Rem if a == ValueKind::Bool && b == ValueKind::Bool => {
                return Err(CompileError::constant("Cannot divide a boolean."))
            }
            _ => {}
        }

        let (lhs, rhs) = Self::equalize(&lhs.promote(), &rhs.promote())?;
        let kind = lhs.kind();

        if kind.is_floating() {
            let (x, y) = (lhs.float_value().unwrap_or_default(), rhs.float_value().unwrap_or_default());
            let r = match op {
                BinaryOp::Mul => x * y,
                BinaryOp::Div => {
                    if y == 0.0 {
                        return Err(CompileError::constant("Division by zero."));
                    }
                    x / y
                }
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Lt => return Ok(ConstVariant::Bool(x < y)),
                BinaryOp::Le => return Ok(ConstVariant::Bool(x <= y)),
                BinaryOp::Gt => return Ok(ConstVariant::Bool(x > y)),
                BinaryOp::Ge => return Ok(ConstVariant::Bool(x >= y)),
                BinaryOp::Eq => return Ok(ConstVariant::Bool(x == y)),
                BinaryOp::Ne => return Ok(ConstVariant::Bool(x != y)),
                _ => return Err(CompileError::constant(MSG_INTEGRAL)),
            };
            return Ok(Self::from_float(kind, r));
        }

        let (x, y) = (lhs.int_value().unwrap_or_default(), rhs.int_value().unwrap_or_default());
        let r = match op {
            BinaryOp::Mul => x.wrapping_mul(y),
            BinaryOp::Div | BinaryOp::Rem => {
                if y == 0 {
                    return Err(CompileError::constant("Division by zero."));
                }
                if op == BinaryOp::Div {
                    x / y
                } else {
                    x % y
                }
            }
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Shl | BinaryOp::Shr => {
                if y < 0 || y >= kind.bits() as i128 {
                    return Err(CompileError::constant("The shift count is out of range."));
                }
                if op == BinaryOp::Shl {
                    x << y
                } else {
                    x >> y
                }
            }
            BinaryOp::Lt => return Ok(ConstVariant::Bool(x < y)),
            BinaryOp::Le => return Ok(ConstVariant::Bool(x <= y)),
            BinaryOp::Gt => return Ok(ConstVariant::Bool(x > y)),
            BinaryOp::Ge => return Ok(ConstVariant::Bool(x >= y)),
            BinaryOp::Eq => return Ok(ConstVariant::Bool(x == y)),
            BinaryOp::Ne => return Ok(ConstVariant::Bool(x != y)),
            BinaryOp::BitAnd => x & y,
            BinaryOp::BitXor => x ^ y,
            BinaryOp::BitOr => x | y,
            BinaryOp::And | BinaryOp::Or => return Err(CompileError::internal("logical operator not folded")),
        };
        // Truncation to the kind width gives the wrapping result
        Ok(Self::from_int(kind, r))
    }

    /// Apply a unary operator
    pub fn unary(op: UnaryOp, operand: &ConstVariant) -> Result<ConstVariant> {
        let kind = operand.kind();
        if kind.is_string() {
            return Err(CompileError::constant(MSG_INCOMPATIBLE));
        }
        if kind == ValueKind::Bool {
            return match op {
                UnaryOp::Not => Ok(ConstVariant::Bool(!operand.truthy()?)),
                UnaryOp::BitNot => Err(CompileError::constant("Cannot execute bitwise operations on a boolean.")),
                _ => Err(CompileError::constant("Cannot execute unary arithmic operations on a boolean.")),
            };
        }

        let value = operand.promote();
        let kind = value.kind();
        if kind.is_floating() {
            let v = value.float_value().unwrap_or_default();
            return match op {
                UnaryOp::Plus => Ok(value),
                UnaryOp::Minus => Ok(Self::from_float(kind, -v)),
                _ => Err(CompileError::constant(MSG_INTEGRAL)),
            };
        }

        let v = value.int_value().unwrap_or_default();
        let r = match op {
            UnaryOp::Plus => v,
            // Unsigned kinds get the two's complement through truncation
            UnaryOp::Minus => -v,
            UnaryOp::Not => return Ok(ConstVariant::Bool(v == 0)),
            UnaryOp::BitNot => !v,
        };
        Ok(Self::from_int(kind, r))
    }

    /// Convert a literal token into a value
    pub fn from_literal(token: &Token) -> Result<ConstVariant> {
        let TokenKind::Literal(kind) = token.kind else {
            return Err(CompileError::syntax("Expecting a literal.").at(token.line, token.col));
        };
        let text = token.text.as_str();
        let value = match kind {
            LiteralKind::Boolean => Ok(ConstVariant::Bool(text.eq_ignore_ascii_case("true"))),
            LiteralKind::Null => Ok(ConstVariant::Int32(0)),
            LiteralKind::DecInteger => parse_integer(text, 10, true),
            LiteralKind::HexInteger => parse_integer(&text[2..], 16, false),
            LiteralKind::BinInteger => parse_integer(&text[2..], 2, false),
            LiteralKind::OctInteger => parse_integer(&text[1..], 8, false),
            LiteralKind::Float => parse_float(text),
            LiteralKind::Fixed => text
                .trim_end_matches(['d', 'D'])
                .parse::<f64>()
                .map(ConstVariant::Fixed)
                .map_err(|_| CompileError::lexer("Invalid fixed-point literal.")),
            LiteralKind::Char => parse_char(text),
            LiteralKind::String => parse_string(text),
        };
        value.map_err(|e| e.or_location(token.line, token.col))
    }
}

fn parse_integer(text: &str, radix: u32, decimal: bool) -> Result<ConstVariant> {
    let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);
    let unsigned = text[digits.len()..].contains(['u', 'U']);
    let digits = if digits.is_empty() { "0" } else { digits };

    let v = u128::from_str_radix(digits, radix)
        .ok()
        .filter(|v| *v <= u64::MAX as u128)
        .ok_or_else(|| CompileError::lexer("Integer literal is too large."))? as i128;

    let ladder: &[ValueKind] = if unsigned {
        &[ValueKind::UInt8, ValueKind::UInt16, ValueKind::UInt32, ValueKind::UInt64]
    } else {
        &[ValueKind::Int8, ValueKind::Int16, ValueKind::Int32, ValueKind::Int64]
    };
    for kind in ladder {
        if v <= kind.int_bounds().1 {
            return Ok(ConstVariant::from_int(*kind, v));
        }
    }
    if decimal {
        return Err(CompileError::lexer("Integer literal is too large for a signed type."));
    }
    Ok(ConstVariant::UInt64(v as u64))
}

fn parse_float(text: &str) -> Result<ConstVariant> {
    let digits = text.trim_end_matches(['f', 'F', 'l', 'L']);
    let v = digits
        .parse::<f64>()
        .map_err(|_| CompileError::lexer("Invalid floating point literal."))?;
    match text[digits.len()..].chars().next() {
        Some('f' | 'F') => ConstVariant::Double(v).cast(ValueKind::Float),
        Some('l' | 'L') => Ok(ConstVariant::LongDouble(v)),
        _ => Ok(ConstVariant::Double(v)),
    }
}

/// Split an encoding prefix off a quoted literal
fn split_prefix(text: &str) -> (&str, &str) {
    let quote = text.find(['"', '\'']).unwrap_or(0);
    (&text[..quote], &text[quote..])
}

fn parse_char(text: &str) -> Result<ConstVariant> {
    let (prefix, quoted) = split_prefix(text);
    let inner = quoted.get(1..quoted.len().saturating_sub(1)).unwrap_or("");
    let content = unescape(inner)?;
    let Some(ch) = content.chars().next() else {
        return Err(CompileError::lexer("Empty character literal."));
    };
    let kind = match prefix {
        "u8" => ValueKind::UInt8,
        "u" => ValueKind::UInt16,
        "U" | "L" => ValueKind::UInt32,
        _ => ValueKind::Int8,
    };
    let code = ch as i128;
    if code > kind.int_bounds().1 {
        return Err(CompileError::lexer("Character literal value is out of range."));
    }
    Ok(ConstVariant::from_int(kind, code))
}

fn parse_string(text: &str) -> Result<ConstVariant> {
    let (prefix, quoted) = split_prefix(text);
    let inner = quoted.get(1..quoted.len().saturating_sub(1)).unwrap_or("");
    let content = unescape(inner)?;
    Ok(match prefix {
        "u" => ConstVariant::U16String(content),
        "U" => ConstVariant::U32String(content),
        "L" => ConstVariant::WString(content),
        _ => ConstVariant::String(content),
    })
}

/// Resolve C escape sequences
pub fn unescape(s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(esc) = chars.next() else {
            return Err(CompileError::lexer("Invalid escape sequence."));
        };
        let resolved = match esc {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0c',
            'v' => '\x0b',
            '\\' | '\'' | '"' | '?' => esc,
            'x' | 'u' | 'U' => {
                let max = match esc {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut code = 0u32;
                let mut count = 0;
                while count < max {
                    match chars.peek().and_then(|c| c.to_digit(16)) {
                        Some(d) => {
                            code = code * 16 + d;
                            chars.next();
                            count += 1;
                        }
                        None => break,
                    }
                }
                if count == 0 {
                    return Err(CompileError::lexer("Invalid escape sequence."));
                }
                char::from_u32(code).ok_or_else(|| CompileError::lexer("Invalid character code."))?
            }
            '0'..='7' => {
                let mut code = esc.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                char::from_u32(code).ok_or_else(|| CompileError::lexer("Invalid character code."))?
            }
            _ => return Err(CompileError::lexer("Invalid escape sequence.")),
        };
        out.push(resolved);
    }
    Ok(out)
}

impl fmt::Display for ConstVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstVariant::Bool(v) => write!(f, "{}", v),
            ConstVariant::Int8(v) => write!(f, "{}", v),
            ConstVariant::UInt8(v) => write!(f, "{}", v),
            ConstVariant::Int16(v) => write!(f, "{}", v),
            ConstVariant::UInt16(v) => write!(f, "{}", v),
            ConstVariant::Int32(v) => write!(f, "{}", v),
            ConstVariant::UInt32(v) => write!(f, "{}", v),
            ConstVariant::Int64(v) => write!(f, "{}", v),
            ConstVariant::UInt64(v) => write!(f, "{}", v),
            ConstVariant::Fixed(v) | ConstVariant::Double(v) | ConstVariant::LongDouble(v) => write!(f, "{}", v),
            ConstVariant::Float(v) => write!(f, "{}", v),
            ConstVariant::String(s) => write!(f, "\"{}\"", s),
            ConstVariant::U16String(s) => write!(f, "u\"{}\"", s),
            ConstVariant::U32String(s) => write!(f, "U\"{}\"", s),
            ConstVariant::WString(s) => write!(f, "L\"{}\"", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceId;

    fn lit(kind: LiteralKind, text: &str) -> ConstVariant {
        ConstVariant::from_literal(&Token::new(TokenKind::Literal(kind), text, 1, 1, SourceId(0))).unwrap()
    }

    #[test]
    fn test_unary_minus_on_unsigned_char() {
        let v = ConstVariant::unary(UnaryOp::Minus, &ConstVariant::UInt8(b'A')).unwrap();
        assert_eq!(v, ConstVariant::Int32(-65));
    }

    #[test]
    fn test_bit_not_cast_to_uint16() {
        let v = ConstVariant::unary(UnaryOp::BitNot, &ConstVariant::UInt8(0x0f)).unwrap();
        assert_eq!(v.cast(ValueKind::UInt16).unwrap(), ConstVariant::UInt16(0xfff0));
    }

    #[test]
    fn test_shift_promotes() {
        let v = ConstVariant::binary(BinaryOp::Shl, &ConstVariant::Int8(65), &ConstVariant::UInt8(2)).unwrap();
        assert_eq!(v, ConstVariant::Int32(260));
        assert!(ConstVariant::binary(BinaryOp::Shl, &ConstVariant::Int32(1), &ConstVariant::Int32(40)).is_err());
    }

    #[test]
    fn test_remainder() {
        let v = ConstVariant::binary(BinaryOp::Rem, &ConstVariant::Int32(90), &ConstVariant::Int32(40)).unwrap();
        assert_eq!(v, ConstVariant::Int32(10));
        assert!(ConstVariant::binary(BinaryOp::Rem, &ConstVariant::Double(100.0), &ConstVariant::Double(45.0)).is_err());
    }

    #[test]
    fn test_bitwise() {
        let a = ConstVariant::UInt8(0b1010_1010);
        let b = ConstVariant::UInt8(0b1111_0000);
        assert_eq!(ConstVariant::binary(BinaryOp::BitAnd, &a, &b).unwrap(), ConstVariant::Int32(0b1010_0000));
        assert_eq!(ConstVariant::binary(BinaryOp::BitXor, &a, &b).unwrap(), ConstVariant::Int32(0b0101_1010));
        assert_eq!(ConstVariant::binary(BinaryOp::BitOr, &a, &b).unwrap(), ConstVariant::Int32(0b1111_1010));

        let err = ConstVariant::binary(BinaryOp::BitAnd, &ConstVariant::Bool(true), &b).unwrap_err();
        assert_eq!(err.description, "Cannot execute bitwise operations on a boolean.");
    }

    #[test]
    fn test_mixed_sign_equality() {
        let v = ConstVariant::binary(BinaryOp::Eq, &ConstVariant::UInt64(65), &ConstVariant::Int8(65)).unwrap();
        assert_eq!(v, ConstVariant::Bool(true));
    }

    #[test]
    fn test_signed_to_unsigned_wraps() {
        assert_eq!(ConstVariant::Int8(-10).cast(ValueKind::UInt8).unwrap(), ConstVariant::UInt8(0xf6));
        let err = ConstVariant::Int16(-200).cast(ValueKind::UInt8).unwrap_err();
        assert!(err.description.contains("signed version"));
    }

    #[test]
    fn test_cast_failures() {
        let err = ConstVariant::UInt8(u8::MAX).cast(ValueKind::Int8).unwrap_err();
        assert!(err.description.contains("exceeds the maximum"));
        let err = ConstVariant::Float(90.0).cast(ValueKind::Int64).unwrap_err();
        assert_eq!(err.description, MSG_INCOMPATIBLE_CAST);
        assert!(ConstVariant::Double(f64::MAX).cast(ValueKind::Float).is_err());
        let err = ConstVariant::Double(f64::MIN_POSITIVE).cast(ValueKind::Float).unwrap_err();
        assert!(err.description.contains("precision"));
        assert!(ConstVariant::Int16(300).cast(ValueKind::Int8).is_err());
        assert_eq!(ConstVariant::Int16(100).cast(ValueKind::Int8).unwrap(), ConstVariant::Int8(100));
        assert!(ConstVariant::Int64(1 << 40).cast(ValueKind::Fixed).is_err());
    }

    #[test]
    fn test_equalize_ladder() {
        let (a, b) = ConstVariant::equalize(&ConstVariant::Int8(-3), &ConstVariant::Int64(5)).unwrap();
        assert_eq!((a, b), (ConstVariant::Int64(-3), ConstVariant::Int64(5)));

        let (a, _) = ConstVariant::equalize(&ConstVariant::Int32(-1), &ConstVariant::UInt32(1)).unwrap();
        assert_eq!(a, ConstVariant::UInt32(u32::MAX));

        let (_, b) = ConstVariant::equalize(&ConstVariant::Int64(1), &ConstVariant::UInt16(7)).unwrap();
        assert_eq!(b, ConstVariant::Int64(7));

        let (a, _) = ConstVariant::equalize(&ConstVariant::Int32(2), &ConstVariant::Float(0.5)).unwrap();
        assert_eq!(a, ConstVariant::Float(2.0));

        assert!(ConstVariant::equalize(&ConstVariant::Int32(2), &ConstVariant::String("x".into())).is_err());
    }

    #[test]
    fn test_strings() {
        let a = ConstVariant::String("abc".into());
        let b = ConstVariant::String("abc".into());
        assert_eq!(ConstVariant::binary(BinaryOp::Eq, &a, &b).unwrap(), ConstVariant::Bool(true));
        assert!(ConstVariant::binary(BinaryOp::Add, &a, &b).is_err());
        assert!(ConstVariant::binary(BinaryOp::Eq, &a, &ConstVariant::WString("abc".into())).is_err());
        assert!(a.cast(ValueKind::Int32).is_err());
    }

    #[test]
    fn test_division() {
        let err = ConstVariant::binary(BinaryOp::Div, &ConstVariant::Int32(1), &ConstVariant::Int32(0)).unwrap_err();
        assert_eq!(err.description, "Division by zero.");
        let v = ConstVariant::binary(BinaryOp::Div, &ConstVariant::Int32(i32::MIN), &ConstVariant::Int32(-1)).unwrap();
        assert_eq!(v, ConstVariant::Int32(i32::MIN));
    }

    #[test]
    fn test_bool_unary() {
        let err = ConstVariant::unary(UnaryOp::Minus, &ConstVariant::Bool(true)).unwrap_err();
        assert_eq!(err.description, "Cannot execute unary arithmic operations on a boolean.");
        assert_eq!(ConstVariant::unary(UnaryOp::Not, &ConstVariant::Bool(true)).unwrap(), ConstVariant::Bool(false));
    }

    #[test]
    fn test_literals() {
        assert_eq!(lit(LiteralKind::DecInteger, "10"), ConstVariant::Int8(10));
        assert_eq!(lit(LiteralKind::DecInteger, "300"), ConstVariant::Int16(300));
        assert_eq!(lit(LiteralKind::DecInteger, "65ull"), ConstVariant::UInt8(65));
        assert_eq!(lit(LiteralKind::HexInteger, "0xFFFFFFFFFFFFFFFF"), ConstVariant::UInt64(u64::MAX));
        assert_eq!(lit(LiteralKind::OctInteger, "017"), ConstVariant::Int8(15));
        assert_eq!(lit(LiteralKind::BinInteger, "0b101"), ConstVariant::Int8(5));
        assert_eq!(lit(LiteralKind::Float, "1.5"), ConstVariant::Double(1.5));
        assert_eq!(lit(LiteralKind::Float, "1.5f"), ConstVariant::Float(1.5));
        assert_eq!(lit(LiteralKind::Fixed, "1.25d"), ConstVariant::Fixed(1.25));
        assert_eq!(lit(LiteralKind::Char, "'A'"), ConstVariant::Int8(65));
        assert_eq!(lit(LiteralKind::Char, "u'c'"), ConstVariant::UInt16(99));
        assert_eq!(lit(LiteralKind::Char, "'\\n'"), ConstVariant::Int8(10));
        assert_eq!(lit(LiteralKind::String, "L\"ab\""), ConstVariant::WString("ab".into()));
        assert_eq!(lit(LiteralKind::String, "u8\"a\\tb\""), ConstVariant::String("a\tb".into()));
        assert_eq!(lit(LiteralKind::Boolean, "TRUE"), ConstVariant::Bool(true));
        assert_eq!(lit(LiteralKind::Null, "nullptr"), ConstVariant::Int32(0));
    }

    #[test]
    fn test_decimal_overflow() {
        let tok = Token::new(TokenKind::Literal(LiteralKind::DecInteger), "18446744073709551615", 4, 2, SourceId(0));
        let err = ConstVariant::from_literal(&tok).unwrap_err();
        assert_eq!(err.line, Some(4));
    }
}
