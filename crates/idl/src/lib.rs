//! IDL Compiler Front End
//!
//! This crate turns IDL source text into a scoped entity tree that code
//! generators can walk.
//!
//! # Architecture
//!
//! The front end consists of:
//! 1. Lexer: Tokenizes source units on demand
//! 2. Preprocessor: Conditional sections, macros, includes and verbatim text
//! 3. Parser: Serves tokens from a stack of open sources
//! 4. Entity model: Modules, definitions and declarations with their scopes
//! 5. Constant evaluation: Typed values for consts, enum entries, case
//!    labels and array sizes
//!
//! # Example
//!
//! ```ignore
//! use idl::{parse_str, Environment};
//!
//! let tree = parse_str("module M { const long X = 1 + 2; };", &Environment::new())?;
//! let value = tree.find_value_variant(tree.root(), "M::X");
//! assert_eq!(value.to_string(), "3");
//! ```

pub mod config;
pub mod const_variant;
pub mod entity;
pub mod expression;
pub mod lexer;
pub mod list_value;
pub mod macros;
pub mod parser;
mod preprocessor;
pub mod source;
mod error;

use std::path::Path;

pub use config::{Environment, Extension};
pub use const_variant::{ConstVariant, ValueKind};
pub use entity::{Entity, EntityData, EntityId, EntityTree, Kind, MetaKind};
pub use error::{CompileError, ErrorKind, Result};
pub use parser::Parser;

/// Parse in-memory IDL code
pub fn parse_str(code: &str, env: &Environment) -> Result<EntityTree> {
    Parser::with_code(code, env.clone())?.parse()
}

/// Parse an IDL file; local includes resolve relative to its directory
pub fn parse_file(path: impl AsRef<Path>, env: &Environment) -> Result<EntityTree> {
    Parser::with_file(path, env.clone())?.parse()
}
