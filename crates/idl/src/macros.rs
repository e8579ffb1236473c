//! Macro table and token-based macro expansion

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::{CompileError, Result};
use crate::lexer::{LiteralKind, Lexer, Token, TokenKind};
use crate::source::SourceId;

/// A `#define`d macro
#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    /// `None` for object-like macros
    pub params: Option<Vec<String>>,
    /// Replacement text
    pub body: String,
    tokens: Vec<Token>,
}

impl PartialEq for Macro {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.params == other.params && self.body == other.body
    }
}

impl Macro {
    pub fn is_function_like(&self) -> bool {
        self.params.is_some()
    }

    fn param_index(&self, tok: &Token) -> Option<usize> {
        if !tok.is_identifier() && !tok.is_keyword() {
            return None;
        }
        self.params.as_ref()?.iter().position(|p| *p == tok.text)
    }
}

/// The set of defined macros of one parse session
#[derive(Debug, Clone)]
pub struct MacroTable {
    macros: FxHashMap<String, Macro>,
    lexer: Lexer,
}

impl MacroTable {
    pub fn new(lexer: Lexer) -> Self {
        Self {
            macros: FxHashMap::default(),
            lexer: lexer.without_directives(),
        }
    }

    /// Define a macro from the text following `#define`, e.g. `F(a, b) a + b`.
    /// Returns the macro name.
    pub fn define(&mut self, definition: &str) -> Result<String> {
        let definition = definition.trim_start();
        let name_len = definition
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(definition.len());
        let name = &definition[..name_len];
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(CompileError::preprocessor("Definition name missing."));
        }

        let mut rest = &definition[name_len..];
        let params = if rest.starts_with('(') {
            let close = rest
                .find(')')
                .ok_or_else(|| CompileError::preprocessor("Unexpected symbol in parameter list."))?;
            let mut params: Vec<String> = Vec::new();
            let list = rest[1..close].trim();
            if !list.is_empty() {
                for param in list.split(',') {
                    let param = param.trim();
                    if param.is_empty() || !param.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                        return Err(CompileError::preprocessor("Expecting a parameter name."));
                    }
                    if params.iter().any(|p| p == param) {
                        return Err(CompileError::preprocessor("Duplicate parameter names for macro definition."));
                    }
                    params.push(param.to_string());
                }
            }
            rest = &rest[close + 1..];
            Some(params)
        } else {
            None
        };

        let body = rest.trim().to_string();
        let tokens = self.lexer.tokenize(&body, SourceId(0))?;
        let mac = Macro {
            name: name.to_string(),
            params,
            body,
            tokens,
        };

        if let Some(existing) = self.macros.get(name) {
            if *existing != mac {
                return Err(CompileError::preprocessor("Redefinition of macro with different content."));
            }
            return Ok(mac.name);
        }

        debug!(name = %mac.name, params = ?mac.params, body = %mac.body, "macro defined");
        let name = mac.name.clone();
        self.macros.insert(name.clone(), mac);
        Ok(name)
    }

    /// Define a macro from a `NAME` or `NAME=VALUE` option
    pub fn define_predefined(&mut self, define: &str) -> Result<String> {
        match define.split_once('=') {
            Some((name, value)) => self.define(&format!("{} {}", name.trim(), value)),
            None => self.define(define),
        }
    }

    pub fn undef(&mut self, name: &str) -> bool {
        debug!(name = %name, "macro removed");
        self.macros.remove(name).is_some()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    /// Expand an invocation of `name`. `args` holds the raw argument token
    /// lists for function-like macros. The result is fully rescanned and every
    /// token is flagged as expanded and placed at the invocation location.
    pub fn expand(&self, name: &Token, args: Option<Vec<Vec<Token>>>) -> Result<Vec<Token>> {
        let mut hide = vec![name.text.clone()];
        let mut tokens = self.expand_one(name, args, &mut hide)?;
        for tok in &mut tokens {
            tok.expanded = true;
            tok.line = name.line;
            tok.col = name.col;
            tok.end_line = name.line;
            tok.end_col = name.end_col;
            tok.source = name.source;
        }
        trace!(name = %name.text, count = tokens.len(), "macro expanded");
        Ok(tokens)
    }

    fn expand_one(&self, name: &Token, args: Option<Vec<Vec<Token>>>, hide: &mut Vec<String>) -> Result<Vec<Token>> {
        let mac = self
            .macros
            .get(&name.text)
            .ok_or_else(|| CompileError::internal(format!("macro '{}' is not defined", name.text)))?;

        let replaced = match (&mac.params, args) {
            (None, _) => mac.tokens.clone(),
            (Some(params), args) => {
                let mut args = args.unwrap_or_default();
                // `F()` passes no arguments
                if params.is_empty() && args.len() == 1 && args[0].is_empty() {
                    args.clear();
                }
                if args.len() < params.len() {
                    return Err(CompileError::preprocessor("Missing parameters while calling macro")
                        .at(name.line, name.col));
                }
                if args.len() > params.len() {
                    return Err(CompileError::preprocessor("Provided too many parameters while calling macro")
                        .at(name.line, name.col));
                }
                self.substitute(mac, &args, hide)?
            }
        };

        self.rescan(replaced, hide)
    }

    /// Replace parameters in the body; handles `#` and `##`
    fn substitute(&self, mac: &Macro, args: &[Vec<Token>], hide: &mut Vec<String>) -> Result<Vec<Token>> {
        let mut out: Vec<Token> = Vec::new();
        let body = &mac.tokens;
        let mut i = 0;
        while i < body.len() {
            let tok = &body[i];

            if tok.is("#") {
                let Some(index) = body.get(i + 1).and_then(|t| mac.param_index(t)) else {
                    return Err(CompileError::preprocessor(format!(
                        "Cannot stringificate while resolving macro {}",
                        mac.name
                    )));
                };
                out.push(stringify(&args[index], tok));
                i += 2;
                continue;
            }

            if tok.is("##") {
                let Some(left) = out.pop() else {
                    return Err(CompileError::preprocessor(format!(
                        "Double concatinating operator while resolving macro {}",
                        mac.name
                    )));
                };
                let Some(next) = body.get(i + 1) else {
                    return Err(CompileError::preprocessor(format!(
                        "Double concatinating operator while resolving macro {}",
                        mac.name
                    )));
                };
                let mut right: Vec<Token> = match mac.param_index(next) {
                    Some(index) => args[index].clone(),
                    None => vec![next.clone()],
                };
                let joined = match right.first() {
                    Some(first) => format!("{}{}", left.text, first.text),
                    None => left.text.clone(),
                };
                if !right.is_empty() {
                    right.remove(0);
                }
                out.extend(self.lexer.tokenize(&joined, tok.source)?);
                out.extend(right);
                i += 2;
                continue;
            }

            match mac.param_index(tok) {
                Some(index) => {
                    let next_is_concat = body.get(i + 1).is_some_and(|t| t.is("##"));
                    if next_is_concat {
                        out.extend(args[index].iter().cloned());
                    } else {
                        out.extend(self.rescan(args[index].clone(), hide)?);
                    }
                }
                None => out.push(tok.clone()),
            }
            i += 1;
        }
        Ok(out)
    }

    /// Expand macros found in an already substituted token list
    fn rescan(&self, tokens: Vec<Token>, hide: &mut Vec<String>) -> Result<Vec<Token>> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let tok = &tokens[i];
            let candidate = (tok.is_identifier() || tok.is_keyword())
                && !tok.expanded
                && !hide.contains(&tok.text)
                && self.macros.contains_key(&tok.text);
            if !candidate {
                out.push(tok.clone());
                i += 1;
                continue;
            }

            let function_like = self.macros.get(&tok.text).is_some_and(Macro::is_function_like);
            let args = if function_like {
                if !tokens.get(i + 1).is_some_and(|t| t.is("(")) {
                    out.push(tok.clone());
                    i += 1;
                    continue;
                }
                let (args, consumed) = split_arguments(&tokens[i + 2..])?;
                i += 2 + consumed;
                Some(args)
            } else {
                i += 1;
                None
            };

            hide.push(tok.text.clone());
            let expanded = self.expand_one(tok, args, hide);
            hide.pop();
            out.extend(expanded?);
        }
        Ok(out)
    }
}

/// Split the tokens following `(` into arguments. Returns the arguments and
/// the number of tokens consumed including the closing parenthesis.
pub fn split_arguments(tokens: &[Token]) -> Result<(Vec<Vec<Token>>, usize)> {
    let mut args = vec![Vec::new()];
    let mut depth = 0usize;
    for (index, tok) in tokens.iter().enumerate() {
        if tok.is(")") && depth == 0 {
            return Ok((args, index + 1));
        }
        if tok.is(",") && depth == 0 {
            args.push(Vec::new());
            continue;
        }
        if tok.is("(") {
            depth += 1;
        } else if tok.is(")") {
            depth -= 1;
        }
        if let Some(last) = args.last_mut() {
            last.push(tok.clone());
        }
    }
    Err(CompileError::preprocessor("Expecting a right parenthesis."))
}

fn stringify(arg: &[Token], at: &Token) -> Token {
    let text: Vec<&str> = arg.iter().map(|t| t.text.as_str()).collect();
    let escaped = text.join(" ").replace('\\', "\\\\").replace('"', "\\\"");
    Token::new(TokenKind::Literal(LiteralKind::String), format!("\"{}\"", escaped), at.line, at.col, at.source)
}
