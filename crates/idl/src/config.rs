//! Compiler environment
//!
//! Include search paths, predefined macros and the extension switches the
//! front end reads while parsing.

use std::path::PathBuf;

use crate::error::Result;
use crate::list_value;

/// Default bound on nested includes
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 48;

/// Optional language extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    /// `interface_id`, `interface_t` and `null`
    InterfaceType,
    /// `exception_id`
    ExceptionType,
    /// `pointer<T>`
    PointerType,
    /// `char16`, `char32`, `u8string`, `u16string` and `u32string`
    Unicode,
    /// Names are compared case-sensitively
    CaseSensitiveNames,
    /// Keywords may be used as declaration names
    ContextDependentNames,
    /// `T a[2][3]`
    MultiDimArray,
}

/// Compiler environment options
#[derive(Debug, Clone)]
pub struct Environment {
    pub include_dirs: Vec<PathBuf>,
    pub output_dir: Option<PathBuf>,
    /// Predefined macros, `NAME` or `NAME=VALUE`
    pub defines: Vec<String>,
    pub max_include_depth: usize,
    pub interface_type: bool,
    pub exception_type: bool,
    pub pointer_type: bool,
    pub unicode: bool,
    pub case_sensitive_names: bool,
    pub context_dependent_names: bool,
    pub multi_dim_array: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            include_dirs: Vec::new(),
            output_dir: None,
            defines: Vec::new(),
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            interface_type: true,
            exception_type: true,
            pointer_type: true,
            unicode: true,
            case_sensitive_names: false,
            context_dependent_names: true,
            multi_dim_array: true,
        }
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// All extensions disabled
    pub fn strict() -> Self {
        Self {
            interface_type: false,
            exception_type: false,
            pointer_type: false,
            unicode: false,
            case_sensitive_names: false,
            context_dependent_names: false,
            multi_dim_array: false,
            ..Self::default()
        }
    }

    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    pub fn with_define(mut self, define: impl Into<String>) -> Self {
        self.defines.push(define.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    pub fn with_extension(mut self, extension: Extension, enabled: bool) -> Self {
        *self.flag_mut(extension) = enabled;
        self
    }

    pub fn extension(&self, extension: Extension) -> bool {
        match extension {
            Extension::InterfaceType => self.interface_type,
            Extension::ExceptionType => self.exception_type,
            Extension::PointerType => self.pointer_type,
            Extension::Unicode => self.unicode,
            Extension::CaseSensitiveNames => self.case_sensitive_names,
            Extension::ContextDependentNames => self.context_dependent_names,
            Extension::MultiDimArray => self.multi_dim_array,
        }
    }

    fn flag_mut(&mut self, extension: Extension) -> &mut bool {
        match extension {
            Extension::InterfaceType => &mut self.interface_type,
            Extension::ExceptionType => &mut self.exception_type,
            Extension::PointerType => &mut self.pointer_type,
            Extension::Unicode => &mut self.unicode,
            Extension::CaseSensitiveNames => &mut self.case_sensitive_names,
            Extension::ContextDependentNames => &mut self.context_dependent_names,
            Extension::MultiDimArray => &mut self.multi_dim_array,
        }
    }

    /// Add include directories from a comma separated list
    pub fn add_include_list(&mut self, list: &str) -> Result<()> {
        for dir in list_value::split(list)? {
            if !dir.is_empty() {
                self.include_dirs.push(PathBuf::from(dir));
            }
        }
        Ok(())
    }

    /// Add predefined macros from a comma separated list (`A=1,B=(1,2),C`)
    pub fn add_define_list(&mut self, list: &str) -> Result<()> {
        for define in list_value::split(list)? {
            if !define.trim().is_empty() {
                self.defines.push(define);
            }
        }
        Ok(())
    }
}
