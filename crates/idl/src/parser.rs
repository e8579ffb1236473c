//! IDL Parser
//!
//! Drives a parse session: owns the stack of open source units, serves
//! tokens to the entity layer through a lookahead cache, expands macros,
//! collects comments and hands directive lines to the preprocessor.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, trace, warn};

use crate::config::Environment;
use crate::entity::EntityTree;
use crate::error::{CompileError, Result};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::macros::{split_arguments, MacroTable};
use crate::preprocessor::Conditionals;
use crate::source::{Cursor, IncludeKind, SourceContext, SourceId, SourceInfo};

/// An open source unit and the conditional depth it started at
#[derive(Debug)]
struct Frame {
    context: SourceContext,
    conditional_depth: usize,
}

/// Parse session state
pub struct Parser {
    pub(crate) env: Environment,
    pub(crate) tree: EntityTree,
    lexer: Lexer,
    /// Lexer for directive expressions, where `#` is an operator
    pub(crate) directive_lexer: Lexer,
    pub(crate) macros: MacroTable,
    pub(crate) conditionals: Conditionals,
    stack: Vec<Frame>,
    sources: Vec<SourceInfo>,
    processed: FxHashSet<PathBuf>,
    /// Tokens peeked or put back by the grammar
    cache: VecDeque<Token>,
    /// Pending tokens of a macro expansion
    expansion: VecDeque<Token>,
    /// Raw token read while looking for macro arguments
    lookahead: Option<Token>,
    /// Comments collected while fetching the most recent token
    pub(crate) comments: VecDeque<Token>,
    anonymous: FxHashMap<String, u32>,
    last_valid: Option<Token>,
}

impl Parser {
    /// A parser without source code
    pub fn new(env: Environment) -> Result<Self> {
        let lexer = Lexer::new(&env);
        let directive_lexer = lexer.clone().without_directives();
        let mut macros = MacroTable::new(lexer.clone());
        for define in &env.defines {
            let name = macros.define_predefined(define)?;
            debug!(name = %name, "predefined macro");
        }
        Ok(Self {
            tree: EntityTree::new(env.case_sensitive_names),
            env,
            lexer,
            directive_lexer,
            macros,
            conditionals: Conditionals::default(),
            stack: Vec::new(),
            sources: Vec::new(),
            processed: FxHashSet::default(),
            cache: VecDeque::new(),
            expansion: VecDeque::new(),
            lookahead: None,
            comments: VecDeque::new(),
            anonymous: FxHashMap::default(),
            last_valid: None,
        })
    }

    /// A parser for in-memory code
    pub fn with_code(code: &str, env: Environment) -> Result<Self> {
        let mut parser = Self::new(env)?;
        parser.push_context(None, code.to_string(), IncludeKind::Source);
        Ok(parser)
    }

    /// A parser for a source file
    pub fn with_file(path: impl AsRef<Path>, env: Environment) -> Result<Self> {
        let path = path.as_ref();
        let canonical = fs::canonicalize(path)
            .map_err(|e| CompileError::include(format!("Cannot open source file '{}': {}", path.display(), e)))?;
        let code = fs::read_to_string(&canonical)
            .map_err(|e| CompileError::include(format!("Cannot read source file '{}': {}", path.display(), e)))?;
        let mut parser = Self::new(env)?;
        parser.processed.insert(canonical.clone());
        parser.push_context(Some(canonical), code, IncludeKind::Source);
        Ok(parser)
    }

    /// Parse all code into an entity tree
    pub fn parse(mut self) -> Result<EntityTree> {
        if self.stack.is_empty() {
            return Ok(self.finish());
        }

        let path = self.stack[0].context.path().map(Path::to_path_buf);
        info!(path = ?path, "parsing");
        if let Some(frame) = self.stack.first() {
            self.tree.get_mut(self.tree.root()).source = frame.context.id;
        }

        if let Err(err) = self.process_root() {
            let err = self.enrich(err);
            warn!(error = %err, "compilation failed");
            return Err(err);
        }

        let tree = self.finish();
        info!(entities = tree.len(), metas = tree.metas().len(), "parsing finished");
        Ok(tree)
    }

    /// Read all tokens without building entities
    pub fn lexical_check(mut self) -> Result<()> {
        while !self.get_token()?.is_eof() {}
        Ok(())
    }

    fn finish(mut self) -> EntityTree {
        self.tree.set_sources(self.sources);
        self.tree
    }

    /// Fill in the location of the last valid token and the path of its
    /// source when the error has none
    fn enrich(&self, err: CompileError) -> CompileError {
        let Some(tok) = &self.last_valid else {
            let path = self.stack.last().and_then(|frame| frame.context.path());
            return err.or_path(path);
        };
        let path = self
            .sources
            .get(tok.source.0 as usize)
            .and_then(|source| source.path.as_deref());
        err.or_location(tok.line, tok.col).or_path(path)
    }

    /// Open an include file; every file may be opened once per session
    pub(crate) fn include_file(&mut self, path: &Path, local: bool) -> Result<()> {
        let canonical = fs::canonicalize(path)
            .map_err(|e| CompileError::include(format!("Cannot open include file '{}': {}", path.display(), e)))?;
        if self.processed.contains(&canonical) {
            return Err(CompileError::include(format!(
                "The file '{}' was included before - circular inclusion of files?",
                canonical.display()
            )));
        }
        if self.stack.len() >= self.env.max_include_depth {
            return Err(CompileError::include(
                "Passed maximum amount of nested files - circular inclusion of files?",
            ));
        }
        let code = fs::read_to_string(&canonical)
            .map_err(|e| CompileError::include(format!("Cannot read include file '{}': {}", path.display(), e)))?;

        self.processed.insert(canonical.clone());
        let kind = if local { IncludeKind::LocalInclude } else { IncludeKind::GlobalInclude };
        self.push_context(Some(canonical), code, kind);
        Ok(())
    }

    fn push_context(&mut self, path: Option<PathBuf>, code: String, kind: IncludeKind) {
        let id = SourceId(self.sources.len() as u32);
        debug!(path = ?path, kind = ?kind, depth = self.stack.len() + 1, "source opened");
        self.sources.push(SourceInfo {
            path: path.clone(),
            kind,
        });
        self.stack.push(Frame {
            context: SourceContext::new(id, path, code, kind),
            conditional_depth: self.conditionals.depth(),
        });
    }

    fn pop_context(&mut self) -> Result<()> {
        let Some(frame) = self.stack.pop() else {
            return Ok(());
        };
        let context = frame.context;
        debug!(path = ?context.path, "source closed");
        self.conditionals
            .close_to(frame.conditional_depth)
            .map_err(|e| e.or_location(context.cursor.line(), context.cursor.col()).or_path(context.path()))
    }

    /// Directory used for local includes of the current source
    pub(crate) fn current_base_dir(&self) -> Option<&Path> {
        self.stack.last().and_then(|frame| frame.context.base_dir())
    }

    pub(crate) fn current_cursor(&mut self) -> Result<&mut Cursor> {
        self.stack
            .last_mut()
            .map(|frame| &mut frame.context.cursor)
            .ok_or_else(|| CompileError::internal("no open source"))
    }

    /// Next token; served from the cache first
    pub(crate) fn get_token(&mut self) -> Result<Token> {
        if let Some(tok) = self.cache.pop_front() {
            return Ok(tok);
        }
        self.fetch()
    }

    /// Look `index` tokens ahead without consuming
    pub(crate) fn peek_token(&mut self, index: usize) -> Result<Token> {
        while self.cache.len() <= index {
            let tok = self.fetch()?;
            if tok.is_eof() {
                return Ok(tok);
            }
            self.cache.push_back(tok);
        }
        Ok(self.cache[index].clone())
    }

    /// Put a token back in front of the cache; the end token is dropped
    pub(crate) fn prepend_token(&mut self, token: Token) {
        if !token.is_eof() {
            self.cache.push_front(token);
        }
    }

    /// Comments collected before the next token
    pub(crate) fn comments(&mut self) -> Result<Vec<Token>> {
        if self.comments.is_empty() {
            self.peek_token(0)?;
        }
        Ok(self.comments.iter().cloned().collect())
    }

    /// Drop the block of adjacent comments at the front of the list
    pub(crate) fn skip_adjacent_comments(&mut self) -> Result<()> {
        self.peek_token(0)?;
        let mut line = None;
        while let Some(comment) = self.comments.front() {
            if line.is_some_and(|line| comment.line > line + 1) {
                break;
            }
            line = Some(comment.line);
            self.comments.pop_front();
        }
        Ok(())
    }

    /// `prefix_<n>` with a counter per prefix
    pub(crate) fn generate_anonymous_name(&mut self, prefix: &str) -> String {
        let counter = self.anonymous.entry(prefix.to_string()).or_insert(0);
        let name = format!("{}_{}", prefix, counter);
        *counter += 1;
        name
    }

    fn fetch(&mut self) -> Result<Token> {
        self.token_from_lexer().map_err(|err| {
            let path = self.stack.last().and_then(|frame| frame.context.path());
            err.or_path(path)
        })
    }

    /// Read the next token of the current source, ignoring the lookahead
    fn raw_token(&mut self) -> Result<Token> {
        if let Some(tok) = self.lookahead.take() {
            return Ok(tok);
        }
        let Some(frame) = self.stack.last_mut() else {
            return Ok(self.end_token());
        };
        self.lexer.next_token(&mut frame.context.cursor, frame.context.id)
    }

    fn end_token(&self) -> Token {
        match &self.last_valid {
            Some(tok) => Token::eof(tok.end_line, tok.end_col, tok.source),
            None => Token::eof(0, 0, SourceId(0)),
        }
    }

    fn token_from_lexer(&mut self) -> Result<Token> {
        self.comments.clear();
        loop {
            if let Some(tok) = self.expansion.pop_front() {
                self.last_valid = Some(tok.clone());
                return Ok(tok);
            }
            if self.stack.is_empty() {
                return Ok(self.end_token());
            }

            if !self.conditionals.enabled() && self.lookahead.is_none() {
                if let Some(frame) = self.stack.last_mut() {
                    skip_disabled_lines(&mut frame.context.cursor);
                }
            }

            let tok = self.raw_token()?;
            match tok.kind {
                TokenKind::Eof => self.pop_context()?,
                TokenKind::Directive => self.process_directive(tok)?,
                _ if !self.conditionals.enabled() => {}
                TokenKind::Comment => self.comments.push_back(tok),
                TokenKind::Identifier | TokenKind::Keyword if !tok.expanded && self.macros.is_defined(&tok.text) => {
                    if !self.expand_macro(&tok)? {
                        self.last_valid = Some(tok.clone());
                        return Ok(tok);
                    }
                }
                _ => {
                    self.last_valid = Some(tok.clone());
                    return Ok(tok);
                }
            }
        }
    }

    /// Expand a macro invocation into the expansion queue. Returns false for
    /// a function-like macro that is not followed by arguments.
    fn expand_macro(&mut self, name: &Token) -> Result<bool> {
        let function_like = self.macros.get(&name.text).is_some_and(|m| m.is_function_like());
        let args = if function_like {
            let next = self.next_raw_significant()?;
            if !next.is("(") {
                self.lookahead = Some(next);
                return Ok(false);
            }
            let mut raw = Vec::new();
            let mut depth = 1usize;
            while depth > 0 {
                let tok = self.next_raw_significant()?;
                if tok.is_eof() || tok.kind == TokenKind::Directive {
                    return Err(CompileError::preprocessor(format!(
                        "Missing ')' closing the arguments of macro '{}'.",
                        name.text
                    ))
                    .at(name.line, name.col));
                }
                if tok.is("(") {
                    depth += 1;
                } else if tok.is(")") {
                    depth -= 1;
                }
                raw.push(tok);
            }
            let (args, _) = split_arguments(&raw)?;
            Some(args)
        } else {
            None
        };

        let tokens = self.macros.expand(name, args)?;
        trace!(name = %name.text, tokens = tokens.len(), "macro expanded");
        self.expansion.extend(tokens);
        Ok(true)
    }

    /// Next raw token that is not a comment; comments are kept for
    /// attribution
    fn next_raw_significant(&mut self) -> Result<Token> {
        loop {
            let tok = self.raw_token()?;
            if tok.kind != TokenKind::Comment {
                return Ok(tok);
            }
            self.comments.push_back(tok);
        }
    }
}

/// Skip the lines of a disabled section up to the next directive
fn skip_disabled_lines(cursor: &mut Cursor) {
    loop {
        while matches!(cursor.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            cursor.bump();
        }
        if cursor.at_eof() || (cursor.peek() == Some(b'#') && cursor.at_line_start()) {
            return;
        }
        cursor.skip_line();
    }
}
