//! Preprocessor directives
//!
//! Conditional sections, macro definitions, includes and verbatim blocks.
//! Directives that produce output for the backend are recorded as meta
//! entities on the root.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::const_variant::ConstVariant;
use crate::entity::{MetaKind, Position};
use crate::error::{CompileError, Result};
use crate::expression::{evaluate, Evaluated, OperandResolver, TokenCursor};
use crate::lexer::{LiteralKind, Token, TokenKind};
use crate::macros::split_arguments;
use crate::parser::Parser;

/// Processing state of a conditional section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Processing {
    /// The current branch is processed
    Current,
    /// No branch taken yet; a later `#elif`/`#else` may be
    Future,
    /// A branch was taken already
    Previous,
    /// The enclosing section is disabled
    Disabled,
}

#[derive(Debug, Clone, Copy)]
struct Section {
    processing: Processing,
    in_else: bool,
}

/// Stack of open `#if` sections
#[derive(Debug, Default)]
pub(crate) struct Conditionals {
    stack: Vec<Section>,
}

impl Conditionals {
    pub(crate) fn enabled(&self) -> bool {
        self.stack.last().map_or(true, |s| s.processing == Processing::Current)
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Open a section; `condition` is `None` when the enclosing section is disabled
    fn open(&mut self, condition: Option<bool>) {
        let processing = match condition {
            Some(true) => Processing::Current,
            Some(false) => Processing::Future,
            None => Processing::Disabled,
        };
        self.stack.push(Section {
            processing,
            in_else: false,
        });
    }

    /// State of the section an `#elif` continues
    fn elif_state(&self) -> Result<Processing> {
        match self.stack.last() {
            None => Err(CompileError::preprocessor("Unexpected '#elif' directive.")),
            Some(section) if section.in_else => Err(CompileError::preprocessor("Duplicate '#elif' directive.")),
            Some(section) => Ok(section.processing),
        }
    }

    fn set_processing(&mut self, processing: Processing) {
        if let Some(section) = self.stack.last_mut() {
            section.processing = processing;
        }
    }

    fn else_branch(&mut self) -> Result<()> {
        let Some(section) = self.stack.last_mut() else {
            return Err(CompileError::preprocessor("Unexpected '#else' directive."));
        };
        if section.in_else {
            return Err(CompileError::preprocessor("Duplicate '#else' directive."));
        }
        section.in_else = true;
        section.processing = match section.processing {
            Processing::Future => Processing::Current,
            Processing::Current => Processing::Previous,
            other => other,
        };
        Ok(())
    }

    fn endif(&mut self) -> Result<()> {
        match self.stack.pop() {
            Some(_) => Ok(()),
            None => Err(CompileError::preprocessor("Unexpected '#endif' directive.")),
        }
    }

    /// Close sections left open by a file; fails when any are left
    pub(crate) fn close_to(&mut self, depth: usize) -> Result<()> {
        if self.stack.len() > depth {
            self.stack.truncate(depth);
            return Err(CompileError::preprocessor("Missing '#endif' directive."));
        }
        Ok(())
    }
}

/// Identifiers left after macro substitution evaluate to zero
struct ZeroIdentifiers;

impl OperandResolver for ZeroIdentifiers {
    fn resolve(&mut self, cursor: &mut TokenCursor<'_>) -> Result<Evaluated> {
        cursor.next();
        Ok(Evaluated::constant(ConstVariant::Int32(0)))
    }
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Parser {
    /// Handle a directive token
    pub(crate) fn process_directive(&mut self, directive: Token) -> Result<()> {
        let text = directive.text.as_str();
        let keyword_len = text
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(text.len());
        let (keyword, rest) = text.split_at(keyword_len);
        let enabled = self.conditionals.enabled();
        trace!(keyword, enabled, line = directive.line, "preprocessor directive");

        let result = match keyword {
            "if" => {
                let condition = if enabled {
                    Some(self.condition(rest, &directive)?)
                } else {
                    None
                };
                self.conditionals.open(condition);
                Ok(())
            }
            "ifdef" | "ifndef" => {
                let condition = if enabled {
                    let name = rest.trim();
                    if !is_name(name) {
                        return Err(CompileError::preprocessor("Definition name missing.").at(directive.line, directive.col));
                    }
                    Some(self.macros.is_defined(name) == (keyword == "ifdef"))
                } else {
                    None
                };
                self.conditionals.open(condition);
                Ok(())
            }
            "elif" => match self.conditionals.elif_state() {
                Ok(Processing::Future) => {
                    if self.condition(rest, &directive)? {
                        self.conditionals.set_processing(Processing::Current);
                    }
                    Ok(())
                }
                Ok(Processing::Current) => {
                    self.conditionals.set_processing(Processing::Previous);
                    Ok(())
                }
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            },
            "else" => self.conditionals.else_branch(),
            "endif" => self.conditionals.endif(),
            _ if !enabled => Ok(()),
            "define" => self.macros.define(rest).and_then(|name| {
                debug!(name = %name, "macro defined");
                self.add_meta(MetaKind::Define, rest.trim().to_string(), &directive)
            }),
            "undef" => {
                let name = rest.trim();
                if !is_name(name) {
                    Err(CompileError::preprocessor("Definition name missing."))
                } else {
                    self.macros.undef(name);
                    self.add_meta(MetaKind::Undef, name.to_string(), &directive)
                }
            }
            "include" => self.process_include(rest, &directive),
            "verbatim" => {
                let content = rest.trim_start_matches([' ', '\t']).to_string();
                self.add_meta(MetaKind::Verbatim, content, &directive)
            }
            "verbatim_begin" => self
                .read_verbatim_block()
                .and_then(|content| self.add_meta(MetaKind::VerbatimBlock, content, &directive)),
            "verbatim_end" => Err(CompileError::preprocessor(
                "Preprocessor directive \"#verbatim_end\" without \"verbatim_begin\" found.",
            )),
            "pragma" => Err(CompileError::preprocessor("Unsupported preprocessor directive \"#pragma\" found.")),
            _ => Err(CompileError::preprocessor("Unknown preprocessor directive.")),
        };
        result.map_err(|e| e.or_location(directive.line, directive.col))
    }

    /// Record a directive as meta entity together with the comments directly
    /// above it
    fn add_meta(&mut self, kind: MetaKind, content: String, directive: &Token) -> Result<()> {
        let mut comments = Vec::new();
        let mut line = directive.line;
        while let Some(comment) = self.comments.back() {
            if comment.source != directive.source || comment.end_line + 1 < line || comment.end_line > line {
                break;
            }
            line = comment.line;
            if let Some(comment) = self.comments.pop_back() {
                comments.push(comment);
            }
        }
        comments.reverse();

        let position = Position {
            begin_line: directive.line,
            begin_col: directive.col,
            end_line: directive.end_line,
            end_col: directive.end_col,
        };
        debug!(kind = ?kind, content = %content, "meta recorded");
        let id = self.tree.add_meta(kind, content, directive.source, position);
        self.set_comment_tokens(id, &comments, true)
    }

    fn process_include(&mut self, rest: &str, directive: &Token) -> Result<()> {
        let target = rest.trim();
        let (local, close) = match target.chars().next() {
            Some('"') => (true, '"'),
            Some('<') => (false, '>'),
            _ => return Err(CompileError::preprocessor("Invalid symbol.")),
        };
        let Some(end) = target[1..].find(close) else {
            return Err(CompileError::preprocessor("Unexpected end of line."));
        };
        let name = &target[1..end + 1];
        if name.is_empty() {
            return Err(CompileError::preprocessor("No filename supplied."));
        }

        let kind = if local { MetaKind::IncludeLocal } else { MetaKind::IncludeGlobal };
        self.add_meta(kind, target[..end + 2].to_string(), directive)?;

        let path = self
            .resolve_include(name, local)
            .ok_or_else(|| CompileError::include("Include file not found."))?;
        debug!(name = %name, path = %path.display(), local, "include resolved");
        self.include_file(&path, local)
    }

    /// Find an include file. Local includes are looked up next to the
    /// including file (the working directory for in-memory code) first.
    fn resolve_include(&self, name: &str, local: bool) -> Option<PathBuf> {
        let name = Path::new(name);
        if local {
            let base = match self.current_base_dir() {
                Some(dir) => Some(dir.to_path_buf()),
                None => std::env::current_dir().ok(),
            };
            let candidate = match base {
                Some(base) if !name.is_absolute() => base.join(name),
                _ => name.to_path_buf(),
            };
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        self.env
            .include_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Read raw lines up to `#verbatim_end`
    fn read_verbatim_block(&mut self) -> Result<String> {
        let cursor = self.current_cursor()?;
        let mut lines = Vec::new();
        loop {
            if cursor.at_eof() {
                return Err(CompileError::preprocessor("Missing '#verbatim_end' directive.").at(cursor.line(), cursor.col()));
            }
            let start = cursor.pos();
            cursor.skip_line();
            let line = cursor.slice(start, cursor.pos()).trim_end_matches('\r').to_string();
            cursor.bump();

            let is_end = line
                .trim_start()
                .strip_prefix('#')
                .is_some_and(|rest| rest.trim_start().starts_with("verbatim_end"));
            if is_end {
                break;
            }
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    /// Evaluate the expression of `#if`/`#elif`
    fn condition(&mut self, expression: &str, directive: &Token) -> Result<bool> {
        let mut tokens = self.directive_lexer.tokenize(expression, directive.source)?;
        for tok in &mut tokens {
            tok.line = directive.line;
            tok.end_line = directive.line;
        }
        let tokens = self.substitute_condition(tokens)?;
        let result = evaluate(&tokens, &mut ZeroIdentifiers)?;
        let value = result.value.truthy()?;
        trace!(expression = expression.trim(), value, "condition evaluated");
        Ok(value)
    }

    /// Replace `defined` operators and macro invocations in a condition
    fn substitute_condition(&self, tokens: Vec<Token>) -> Result<Vec<Token>> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut index = 0;
        while index < tokens.len() {
            let tok = &tokens[index];
            index += 1;

            if tok.is_identifier() && tok.text == "defined" {
                let paren = tokens.get(index).is_some_and(|t| t.is("("));
                if paren {
                    index += 1;
                }
                let name = match tokens.get(index) {
                    Some(name) if name.is_identifier() || name.is_keyword() => name,
                    _ if paren => {
                        return Err(CompileError::preprocessor(
                            "Expecting macro name between parenthesis of defined operator",
                        )
                        .at(tok.line, tok.col))
                    }
                    _ => {
                        return Err(
                            CompileError::preprocessor("Expecting macro name following defined operator").at(tok.line, tok.col)
                        )
                    }
                };
                index += 1;
                if paren {
                    if !tokens.get(index).is_some_and(|t| t.is(")")) {
                        return Err(CompileError::preprocessor("Expecting right parenthesis").at(tok.line, tok.col));
                    }
                    index += 1;
                }
                let value = if self.macros.is_defined(&name.text) { "1" } else { "0" };
                out.push(Token::new(
                    TokenKind::Literal(LiteralKind::DecInteger),
                    value,
                    tok.line,
                    tok.col,
                    tok.source,
                ));
                continue;
            }

            let Some(mac) = self.macros.get(&tok.text) else {
                out.push(tok.clone());
                continue;
            };
            if !(tok.is_identifier() || tok.is_keyword()) {
                out.push(tok.clone());
                continue;
            }

            let args = if mac.is_function_like() {
                if !tokens.get(index).is_some_and(|t| t.is("(")) {
                    out.push(tok.clone());
                    continue;
                }
                let (args, consumed) = split_arguments(&tokens[index + 1..])?;
                index += consumed + 1;
                Some(args)
            } else {
                None
            };
            out.extend(self.macros.expand(tok, args)?);
        }
        Ok(out)
    }
}
