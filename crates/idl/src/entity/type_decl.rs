//! Declared types

use tracing::trace;

use super::{EntityId, Kind};
use crate::config::Environment;
use crate::const_variant::{ConstVariant, ValueKind};
use crate::error::{CompileError, Result};
use crate::lexer::{Token, TokenKind};
use crate::parser::Parser;

/// Base kind of a declared type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclType {
    Short,
    UnsignedShort,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Fixed,
    Float,
    Double,
    LongDouble,
    Char,
    WChar,
    Boolean,
    Native,
    Octet,
    String,
    WString,
    Enum,
    Struct,
    Union,
    Exception,
    Interface,
    Sequence,
    Map,
    Bitset,
    Bitfield,
    Bitmask,
    Any,
    Void,
    InterfaceId,
    InterfaceType,
    ExceptionId,
    Pointer,
    Char16,
    Char32,
    U8String,
    U16String,
    U32String,
}

const DECL_TYPES: &[(&str, DeclType)] = &[
    ("short", DeclType::Short),
    ("unsigned short", DeclType::UnsignedShort),
    ("long", DeclType::Long),
    ("unsigned long", DeclType::UnsignedLong),
    ("long long", DeclType::LongLong),
    ("unsigned long long", DeclType::UnsignedLongLong),
    ("fixed", DeclType::Fixed),
    ("float", DeclType::Float),
    ("double", DeclType::Double),
    ("long double", DeclType::LongDouble),
    ("char", DeclType::Char),
    ("wchar", DeclType::WChar),
    ("int8", DeclType::Char),
    ("int16", DeclType::Short),
    ("int32", DeclType::Long),
    ("int64", DeclType::LongLong),
    ("int", DeclType::Long),
    ("uint8", DeclType::Octet),
    ("uint16", DeclType::UnsignedShort),
    ("uint32", DeclType::UnsignedLong),
    ("uint64", DeclType::UnsignedLongLong),
    ("uint", DeclType::UnsignedLong),
    ("boolean", DeclType::Boolean),
    ("native", DeclType::Native),
    ("octet", DeclType::Octet),
    ("byte", DeclType::Octet),
    ("string", DeclType::String),
    ("wstring", DeclType::WString),
    ("enum", DeclType::Enum),
    ("struct", DeclType::Struct),
    ("union", DeclType::Union),
    ("interface", DeclType::Interface),
    ("sequence", DeclType::Sequence),
    ("map", DeclType::Map),
    ("bitset", DeclType::Bitset),
    ("bitfield", DeclType::Bitfield),
    ("bitmask", DeclType::Bitmask),
    ("any", DeclType::Any),
    ("void", DeclType::Void),
];

impl DeclType {
    /// Map type text such as `unsigned long` onto a base kind, honoring the
    /// extension switches of the environment
    pub fn from_text(text: &str, env: &Environment) -> Option<DeclType> {
        if let Some((_, ty)) = DECL_TYPES.iter().find(|(name, _)| *name == text) {
            return Some(*ty);
        }
        let ty = match text {
            "interface_id" if env.interface_type => DeclType::InterfaceId,
            "interface_t" if env.interface_type => DeclType::InterfaceType,
            "exception_id" if env.exception_type => DeclType::ExceptionId,
            "pointer" if env.pointer_type => DeclType::Pointer,
            "char16" if env.unicode => DeclType::Char16,
            "char32" if env.unicode => DeclType::Char32,
            "u8string" if env.unicode => DeclType::U8String,
            "u16string" if env.unicode => DeclType::U16String,
            "u32string" if env.unicode => DeclType::U32String,
            _ => return None,
        };
        Some(ty)
    }

    /// Value kind of constants of this type; `None` for types without a
    /// scalar value
    pub fn value_kind(self) -> Option<ValueKind> {
        let kind = match self {
            DeclType::Short => ValueKind::Int16,
            DeclType::UnsignedShort => ValueKind::UInt16,
            DeclType::Long | DeclType::Enum => ValueKind::Int32,
            DeclType::UnsignedLong => ValueKind::UInt32,
            DeclType::LongLong => ValueKind::Int64,
            DeclType::UnsignedLongLong => ValueKind::UInt64,
            DeclType::Fixed => ValueKind::Fixed,
            DeclType::Float => ValueKind::Float,
            DeclType::Double => ValueKind::Double,
            DeclType::LongDouble => ValueKind::LongDouble,
            DeclType::Char => ValueKind::Int8,
            DeclType::WChar | DeclType::Char32 => ValueKind::UInt32,
            DeclType::Char16 => ValueKind::UInt16,
            DeclType::Boolean => ValueKind::Bool,
            DeclType::Octet => ValueKind::UInt8,
            DeclType::String | DeclType::U8String => ValueKind::String,
            DeclType::WString => ValueKind::WString,
            DeclType::U16String => ValueKind::U16String,
            DeclType::U32String => ValueKind::U32String,
            _ => return None,
        };
        Some(kind)
    }

    /// Character types whose arrays may be initialised with a string
    pub fn is_character(self) -> bool {
        matches!(self, DeclType::Char | DeclType::WChar | DeclType::Char16 | DeclType::Char32)
    }

    fn is_string(self) -> bool {
        matches!(
            self,
            DeclType::String | DeclType::WString | DeclType::U8String | DeclType::U16String | DeclType::U32String
        )
    }
}

/// Type of a declaration
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDeclaration {
    pub base: DeclType,
    /// Type as written, e.g. `unsigned long` or `A::B`
    pub text: String,
    /// Entity defining a named type
    pub definition: Option<EntityId>,
    /// Bound of strings, sequences and maps, the digits of fixed and the bit
    /// count of bitfields; 0 is unbound
    pub fixed_len: u32,
    pub decimals: u32,
    /// Element type of sequences, maps and pointers; storage type of bitfields
    pub value_type: Option<Box<TypeDeclaration>>,
    pub key_type: Option<Box<TypeDeclaration>>,
}

impl TypeDeclaration {
    pub fn new(base: DeclType, text: impl Into<String>) -> Self {
        Self {
            base,
            text: text.into(),
            definition: None,
            fixed_len: 0,
            decimals: 0,
            value_type: None,
            key_type: None,
        }
    }

    pub fn value_kind(&self) -> Option<ValueKind> {
        self.base.value_kind()
    }
}

impl Parser {
    /// Parse a type at the current token
    pub(crate) fn process_type(&mut self, scope: EntityId) -> Result<TypeDeclaration> {
        let token = self.get_token()?;
        if !token.is_identifier() && !token.is_keyword() && !token.is("::") {
            return Err(syntax_at("Expecting a type identifier.", &token));
        }

        let mut text = token.text.clone();
        if token.is("long") {
            let next = self.get_token()?;
            if next.is("long") || next.is("double") {
                text.push(' ');
                text.push_str(&next.text);
            } else {
                self.prepend_token(next);
            }
        } else if token.is("unsigned") {
            let next = self.get_token()?;
            if next.is("short") {
                text.push_str(" short");
            } else if next.is("long") {
                text.push_str(" long");
                let next = self.get_token()?;
                if next.is("long") {
                    text.push_str(" long");
                } else {
                    self.prepend_token(next);
                }
            } else {
                return Err(syntax_at("Expecting 'short' or 'long' following 'unsigned'.", &next));
            }
        }

        let base = if token.is_keyword() {
            DeclType::from_text(&text, &self.env)
        } else {
            None
        };

        let decl = match base {
            Some(base @ (DeclType::Enum | DeclType::Struct | DeclType::Union | DeclType::Interface)) => {
                let first = self.get_token()?;
                let (name, definition) = self.resolve_type_name(scope, first)?;
                let expected = match base {
                    DeclType::Enum => Kind::Enum,
                    DeclType::Struct => Kind::Struct,
                    DeclType::Union => Kind::Union,
                    _ => Kind::Interface,
                };
                if self.tree.get(self.tree.resolved_entity(definition)).kind != expected {
                    return Err(syntax_at(format!("Provided identifier is not {} {}.", article(expected), expected), &token));
                }
                let mut decl = TypeDeclaration::new(base, name);
                decl.definition = Some(definition);
                decl
            }
            Some(base @ DeclType::Fixed) => {
                let mut decl = TypeDeclaration::new(base, text);
                if self.peek_token(0)?.is("<") {
                    self.get_token()?;
                    decl.fixed_len =
                        self.template_number(1, "Expecting a positive number for the fixed size of the fixed point type.")?;
                    self.expect_comma()?;
                    let tok = self.peek_token(0)?;
                    decl.decimals =
                        self.template_number(0, "Expecting a positive number or zero for the decimals of the fixed point type.")?;
                    if decl.decimals > decl.fixed_len {
                        return Err(syntax_at(
                            "Expecting a positive number or zero for the decimals of the fixed point type.",
                            &tok,
                        ));
                    }
                    self.close_template("Expecting '>' closing the template section of the string.")?;
                }
                decl
            }
            Some(base) if base.is_string() => {
                let mut decl = TypeDeclaration::new(base, text);
                if self.peek_token(0)?.is("<") {
                    self.get_token()?;
                    decl.fixed_len = self.template_number(1, "Expecting a positive number for the fixed size of the string.")?;
                    self.close_template("Expecting '>' closing the template section of the string.")?;
                }
                decl
            }
            Some(base @ DeclType::Bitfield) => {
                let mut decl = TypeDeclaration::new(base, text);
                let open = self.get_token()?;
                if !open.is("<") {
                    return Err(syntax_at("Expecting '<' defining the template section.", &open));
                }
                let tok = self.peek_token(0)?;
                decl.fixed_len = self.template_number(1, "Expecting a positive number for the amount of bits.")?;
                if decl.fixed_len > 64 {
                    return Err(syntax_at("A bitfield cannot hold more than 64 bits.", &tok));
                }
                if self.peek_token(0)?.is(",") {
                    self.get_token()?;
                    let value_type = self.process_type(scope)?;
                    if !value_type.value_kind().is_some_and(ValueKind::is_integral) {
                        return Err(syntax_at("Expecting an integral type for the bitfield.", &tok));
                    }
                    decl.value_type = Some(Box::new(value_type));
                }
                self.close_template("Expecting '>' closing the template section.")?;
                decl
            }
            Some(base @ (DeclType::Sequence | DeclType::Pointer | DeclType::Map)) => {
                let mut decl = TypeDeclaration::new(base, text);
                let open = self.get_token()?;
                if !open.is("<") {
                    return Err(syntax_at("Expecting '<' defining the template section.", &open));
                }
                if base == DeclType::Map {
                    decl.key_type = Some(Box::new(self.process_type(scope)?));
                    self.expect_comma()?;
                }
                decl.value_type = Some(Box::new(self.process_type(scope)?));
                if self.peek_token(0)?.is(",") {
                    self.get_token()?;
                    decl.fixed_len = self.template_number(1, "Expecting a positive number for the fixed size.")?;
                }
                self.close_template("Expecting '>' closing the template section.")?;
                decl
            }
            Some(base) => TypeDeclaration::new(base, text),
            None => {
                let (name, definition) = self.resolve_type_name(scope, token.clone())?;
                let target = self.tree.get(definition);
                let base = match target.kind {
                    Kind::Struct => DeclType::Struct,
                    Kind::Union => DeclType::Union,
                    Kind::Exception => DeclType::Exception,
                    Kind::Enum => DeclType::Enum,
                    Kind::Interface => DeclType::Interface,
                    Kind::Typedef => match target.declaration() {
                        Some(typedef) => typedef.decl_type.base,
                        None => return Err(CompileError::internal("typedef without declaration data")),
                    },
                    _ => return Err(syntax_at("Declaration type is invalid.", &token)),
                };
                let mut decl = TypeDeclaration::new(base, name);
                decl.definition = Some(definition);
                decl
            }
        };

        trace!(text = %decl.text, base = ?decl.base, "type processed");
        Ok(decl)
    }

    /// Read the rest of a scoped type name and look it up
    fn resolve_type_name(&mut self, scope: EntityId, first: Token) -> Result<(String, EntityId)> {
        let (name, last) = self.read_scoped_name(first)?;
        match self.tree.find_type(scope, &name) {
            Some(definition) => Ok((name, definition)),
            None => Err(CompileError::resolve(format!("Could not find the definition of '{}'.", name))
                .at(last.line, last.col)),
        }
    }

    /// Complete a scoped name that starts with `first` (an identifier or `::`)
    pub(crate) fn read_scoped_name(&mut self, first: Token) -> Result<(String, Token)> {
        let mut name = first.text.clone();
        let mut last = first;
        loop {
            if !name.ends_with(':') {
                let tok = self.get_token()?;
                if !tok.is("::") {
                    self.prepend_token(tok);
                    break;
                }
                name.push_str("::");
            }
            let tok = self.get_token()?;
            if !tok.is_identifier() {
                return Err(syntax_at("Expecting an identifier.", &tok));
            }
            name.push_str(&tok.text);
            last = tok;
        }
        Ok((name, last))
    }

    fn template_number(&mut self, min: u64, message: &str) -> Result<u32> {
        let tok = self.get_token()?;
        let value = match tok.kind {
            TokenKind::Literal(_) => ConstVariant::from_literal(&tok)?,
            _ => return Err(syntax_at(message, &tok)),
        };
        if !value.kind().is_integral() {
            return Err(syntax_at(message, &tok));
        }
        match value.cast(ValueKind::UInt32) {
            Ok(ConstVariant::UInt32(n)) if n as u64 >= min => Ok(n),
            _ => Err(syntax_at(message, &tok)),
        }
    }

    fn expect_comma(&mut self) -> Result<()> {
        let tok = self.get_token()?;
        if tok.is(",") {
            Ok(())
        } else {
            Err(syntax_at("Expecting a comma ','.", &tok))
        }
    }

    /// Expect `>`; a `>>` closes two nested template sections
    fn close_template(&mut self, message: &str) -> Result<()> {
        let tok = self.get_token()?;
        if tok.is(">>") {
            let mut inner = tok.clone();
            inner.text = ">".to_string();
            inner.col += 1;
            self.prepend_token(inner);
            return Ok(());
        }
        if tok.is(">") {
            Ok(())
        } else {
            Err(syntax_at(message, &tok))
        }
    }
}

fn article(kind: Kind) -> &'static str {
    match kind {
        Kind::Enum | Kind::Interface => "an",
        _ => "a",
    }
}

pub(crate) fn syntax_at(message: impl Into<String>, token: &Token) -> CompileError {
    CompileError::syntax(message).at(token.line, token.col)
}
