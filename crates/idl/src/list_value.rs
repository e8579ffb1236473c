//! Comma-separated value lists
//!
//! Splits configuration strings such as `a,"b,c",f(1,2)` into their
//! parts. `\` escapes the next character, quotes group a value and commas
//! inside quotes or brackets do not separate.

use crate::error::{CompileError, Result};

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Start of a value: a plain value or an opening quote may follow
    ValueOrQuote,
    /// Inside an unquoted value
    ValueOrComma,
    /// Inside a quoted string
    QuoteString,
    /// After a closing quote; only a separator or the end may follow
    CommaOrEnd,
}

/// Classified input character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Quote,
    Separator,
    Open,
    Close,
    Other,
    End,
}

/// What to do with the character that caused a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Append to the current value
    Keep,
    /// Drop the character
    Skip,
    /// Drop the character and finish the current value
    Emit,
}

impl Input {
    pub fn classify(ch: char) -> Self {
        match ch {
            '"' => Input::Quote,
            ',' | ';' => Input::Separator,
            '(' | '{' => Input::Open,
            ')' | '}' => Input::Close,
            _ => Input::Other,
        }
    }
}

/// The transition function. `nested` is true while inside brackets.
pub fn transition(state: State, input: Input, nested: bool) -> Result<(State, Action)> {
    use Action::*;
    use State::*;

    let next = match (state, input) {
        (QuoteString, Input::Quote) => (CommaOrEnd, Skip),
        (QuoteString, Input::End) => {
            return Err(CompileError::syntax("Incorrect value (unterminated quoted string)!"))
        }
        (QuoteString, _) => (QuoteString, Keep),

        (ValueOrQuote, Input::Quote) => (QuoteString, Skip),
        (ValueOrComma | CommaOrEnd, Input::Quote) => {
            return Err(CompileError::syntax(
                "Incorrect value (quoted string cannot start in the middle of another string)!",
            ))
        }

        (_, Input::Separator) if nested => (ValueOrComma, Keep),
        (ValueOrQuote, Input::Separator) => {
            return Err(CompileError::syntax("Incorrect value (string part cannot start with a comma)!"))
        }
        (ValueOrComma | CommaOrEnd, Input::Separator) => (ValueOrQuote, Emit),

        (_, Input::End) => (ValueOrQuote, Emit),

        (_, Input::Open | Input::Close | Input::Other) => (ValueOrComma, Keep),
    };
    Ok(next)
}

/// Drives the state machine over a string
struct Splitter {
    state: State,
    depth: usize,
    current: String,
    values: Vec<String>,
}

impl Splitter {
    fn new() -> Self {
        Self {
            state: State::ValueOrQuote,
            depth: 0,
            current: String::new(),
            values: Vec::new(),
        }
    }

    fn feed(&mut self, ch: Option<char>, escaped: bool) -> Result<()> {
        let input = match ch {
            None => Input::End,
            Some(_) if escaped => Input::Other,
            Some(c) => Input::classify(c),
        };

        if self.state != State::QuoteString {
            match input {
                Input::Open => self.depth += 1,
                Input::Close => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
        }

        let (state, action) = transition(self.state, input, self.depth > 0)?;
        self.state = state;
        match action {
            Action::Keep => {
                if let Some(c) = ch {
                    self.current.push(c);
                }
            }
            Action::Skip => {}
            Action::Emit => self.values.push(std::mem::take(&mut self.current)),
        }
        Ok(())
    }
}

/// Split a comma separated list.
///
/// An empty input yields no values.
pub fn split(value: &str) -> Result<Vec<String>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }

    let mut splitter = Splitter::new();
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(next) => splitter.feed(Some(next), true)?,
                // A trailing backslash is kept literally
                None => splitter.feed(Some('\\'), true)?,
            }
            continue;
        }
        splitter.feed(Some(ch), false)?;
    }
    splitter.feed(None, false)?;
    Ok(splitter.values)
}
