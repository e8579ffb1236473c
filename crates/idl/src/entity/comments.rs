//! Comment attribution
//!
//! Comment tokens collected by the parser are bound to the entity they
//! precede or follow. Block and line comments are stripped of their markers,
//! indentation and leading asterisks; adjacent comments merge into one
//! multi-line text.

use bitflags::bitflags;
use tracing::trace;

use super::EntityId;
use crate::error::Result;
use crate::lexer::Token;
use crate::parser::Parser;

bitflags! {
    /// Style, format and location of an attached comment
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct CommentFlags: u32 {
        /// `/* */`
        const C_STYLE = 0x1;
        /// `//`
        const CPP_STYLE = 0x2;
        /// `/**` or `///`
        const FORMAT_JAVADOC = 0x10;
        /// `/*!` or `//!`
        const FORMAT_QT = 0x20;
        const FORMAT_MASK = 0x30;
        /// The comment follows the entity
        const LOC_SUCCEEDING = 0x100;
    }
}

impl CommentFlags {
    /// Carries Javadoc or Qt format information
    pub fn is_formatted(self) -> bool {
        self.intersects(Self::FORMAT_MASK)
    }
}

/// Classify a block comment by its opening marker. Returns the flags and the
/// offset of the comment text.
fn block_marker(text: &str) -> (CommentFlags, usize) {
    let c = CommentFlags::C_STYLE;
    if text.starts_with("/**<") {
        (c | CommentFlags::FORMAT_JAVADOC | CommentFlags::LOC_SUCCEEDING, 4)
    } else if text.starts_with("/*!<") {
        (c | CommentFlags::FORMAT_QT | CommentFlags::LOC_SUCCEEDING, 4)
    } else if text.starts_with("/**") {
        (c | CommentFlags::FORMAT_JAVADOC, 3)
    } else if text.starts_with("/*!") {
        (c | CommentFlags::FORMAT_QT, 3)
    } else {
        (c, 2)
    }
}

fn line_marker(text: &str) -> (CommentFlags, usize) {
    let cpp = CommentFlags::CPP_STYLE;
    if text.starts_with("///<") {
        (cpp | CommentFlags::FORMAT_JAVADOC | CommentFlags::LOC_SUCCEEDING, 4)
    } else if text.starts_with("//!<") {
        (cpp | CommentFlags::FORMAT_QT | CommentFlags::LOC_SUCCEEDING, 4)
    } else if text.starts_with("///") {
        (cpp | CommentFlags::FORMAT_JAVADOC, 3)
    } else if text.starts_with("//!") {
        (cpp | CommentFlags::FORMAT_QT, 3)
    } else {
        (cpp, 2)
    }
}

/// Append the lines of a block comment to `out`.
///
/// Indentation and one leading `*` (plus one space) per line are removed.
/// Everything up to the last non-space character before the final two
/// terminator characters is kept, so `/** text **/` yields `text *`.
fn strip_block(text: &str, mut pos: usize, out: &mut Vec<String>) {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let at = |i: usize| bytes.get(i).copied().unwrap_or(0);
    let mut emit = |start: usize, stop: usize| {
        out.push(String::from_utf8_lossy(&bytes[start..=stop]).into_owned());
    };

    let mut initial = true;
    while pos < len - 3 {
        if at(pos) == b' ' || at(pos) == b'\t' {
            while at(pos) == b' ' || at(pos) == b'\t' {
                pos += 1;
            }
            continue;
        }

        if initial {
            if at(pos) == b'\n' {
                pos += 1;
                continue;
            }
            if at(pos) == b'\r' && at(pos + 1) == b'\n' {
                pos += 2;
                continue;
            }
        }

        if at(pos) == b'*' {
            pos += 1;
            if at(pos) == b' ' {
                pos += 1;
            }
        }

        // Only the terminator is left on this line
        if pos == len - 2 {
            continue;
        }

        let start = pos;
        let mut stop = start;
        loop {
            if at(pos) == b'\n' {
                emit(start, stop);
                pos += 1;
                break;
            }
            if at(pos) == b'\r' && at(pos + 1) == b'\n' {
                emit(start, stop);
                pos += 2;
                break;
            }
            if pos >= len - 3 {
                if pos != start {
                    emit(start, stop);
                }
                break;
            }
            pos += 1;
            if !at(pos).is_ascii_whitespace() {
                stop = pos;
            }
        }
        initial = false;
    }
}

fn strip_line(text: &str, mut pos: usize, out: &mut Vec<String>) {
    if text.as_bytes().get(pos) == Some(&b' ') {
        pos += 1;
    }
    let line = text.get(pos..).unwrap_or("").trim_end();
    if !line.is_empty() {
        out.push(line.to_string());
    }
}

/// Merge the flags of a following comment into the flags collected so far
fn merge_flags(mut flags: CommentFlags, local: CommentFlags) -> CommentFlags {
    let format = CommentFlags::FORMAT_MASK;
    if (local | flags) & format == format {
        flags.remove(format);
        flags.insert(CommentFlags::FORMAT_JAVADOC);
    }
    if local.is_formatted() && !flags.is_formatted() {
        flags.insert(local & format);
    }
    if local & CommentFlags::CPP_STYLE != flags & CommentFlags::CPP_STYLE {
        flags.remove(CommentFlags::CPP_STYLE);
        flags.insert(CommentFlags::C_STYLE);
    }
    if local & CommentFlags::LOC_SUCCEEDING != flags & CommentFlags::LOC_SUCCEEDING {
        flags.remove(CommentFlags::LOC_SUCCEEDING);
    }
    flags
}

/// Combine comment tokens into one text with the resulting flags
pub fn combine_comments<'a>(comments: impl IntoIterator<Item = &'a Token>) -> (String, CommentFlags) {
    let mut lines: Vec<String> = Vec::new();
    let mut flags = CommentFlags::empty();

    for comment in comments {
        let text = comment.text.as_str();
        let empty = lines.is_empty();

        let local = if text.starts_with("/*") {
            let (local, pos) = block_marker(text);
            if text.len() < 4 || !text.ends_with("*/") {
                continue;
            }
            strip_block(text, pos, &mut lines);
            local
        } else if text.starts_with("//") {
            let (local, pos) = line_marker(text);
            strip_line(text, pos, &mut lines);
            local
        } else {
            continue;
        };

        flags = if empty { local } else { merge_flags(flags, local) };
    }

    (lines.join("\n"), flags)
}

impl Parser {
    /// Comments preceding the next token. Each comment must end at most one
    /// line above the token or the comment collected before it.
    pub(crate) fn pre_comment_tokens(&mut self) -> Result<Vec<Token>> {
        let token = self.peek_token(0)?;
        let mut line = token.line;
        let comments = self.comments()?;

        let mut pre = Vec::new();
        for comment in comments.iter().rev() {
            if comment.source != token.source {
                continue;
            }
            if comment.end_line + 1 < line {
                break;
            }
            pre.push(comment.clone());
            line = comment.line;
        }
        pre.reverse();
        Ok(pre)
    }

    /// Attach the comments starting on `line` (or continuing on the lines
    /// directly after) as succeeding comments of `id`
    pub(crate) fn process_post_comments(&mut self, id: EntityId, line: u32) -> Result<()> {
        let source = self.tree.get(id).source;
        let comments = self.comments()?;

        let mut line = line;
        let mut post = Vec::new();
        for comment in comments.iter() {
            if comment.source != source {
                continue;
            }
            if comment.line > line {
                break;
            }
            post.push(comment.clone());
            line = comment.end_line + 1;
        }

        if !post.is_empty() {
            self.set_comment_tokens(id, &post, false)?;
        }
        Ok(())
    }

    /// Attach comments to an entity. Existing comments are only replaced
    /// when they carry no format information.
    pub(crate) fn set_comment_tokens(&mut self, id: EntityId, comments: &[Token], preceding: bool) -> Result<()> {
        let (text, flags) = combine_comments(comments);
        if text.is_empty() {
            return Ok(());
        }

        let entity = self.tree.get_mut(id);
        if !entity.comment_flags.is_formatted() {
            trace!(name = %entity.name, preceding, "comments attached");
            entity.comments = text;
            entity.comment_flags = flags;
        }

        if !preceding {
            entity.comment_flags |= CommentFlags::LOC_SUCCEEDING;
            self.skip_adjacent_comments()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::TokenKind;
    use crate::source::SourceId;

    fn comment(text: &str, line: u32) -> Token {
        let mut tok = Token::new(TokenKind::Comment, text, line, 1, SourceId(0));
        tok.end_line = line + text.matches('\n').count() as u32;
        tok
    }

    fn strip(texts: &[&str]) -> (String, CommentFlags) {
        let tokens: Vec<Token> = texts.iter().enumerate().map(|(i, t)| comment(t, i as u32 + 1)).collect();
        combine_comments(&tokens)
    }

    #[test]
    fn test_c_style() {
        let (text, flags) = strip(&["/* Comments */"]);
        assert_eq!(text, "Comments");
        assert_eq!(flags, CommentFlags::C_STYLE);
    }

    #[test]
    fn test_javadoc_terminator_keeps_stray_asterisk() {
        let (text, flags) = strip(&["/** Comments **/"]);
        assert_eq!(text, "Comments *");
        assert!(flags.contains(CommentFlags::FORMAT_JAVADOC));

        let (text, _) = strip(&["/** Comments */"]);
        assert_eq!(text, "Comments");
    }

    #[test]
    fn test_qt_and_post_markers() {
        let (text, flags) = strip(&["/*! Comments **/"]);
        assert_eq!(text, "Comments *");
        assert!(flags.contains(CommentFlags::FORMAT_QT));

        let (_, flags) = strip(&["/**< trailing */"]);
        assert!(flags.contains(CommentFlags::FORMAT_JAVADOC | CommentFlags::LOC_SUCCEEDING));

        let (text, flags) = strip(&["//!< trailing  "]);
        assert_eq!(text, "trailing");
        assert_eq!(flags, CommentFlags::CPP_STYLE | CommentFlags::FORMAT_QT | CommentFlags::LOC_SUCCEEDING);
    }

    #[test]
    fn test_multiline_block() {
        let (text, _) = strip(&["/**\n * First line\n *   indented\n */"]);
        assert_eq!(text, "First line\n  indented");
    }

    #[test]
    fn test_line_comments_merge() {
        let (text, flags) = strip(&["// Comments", "// More comments"]);
        assert_eq!(text, "Comments\nMore comments");
        assert_eq!(flags, CommentFlags::CPP_STYLE);
    }

    #[test]
    fn test_flag_merging() {
        // Formatted wins over unformatted; mixed styles become C style
        let (_, flags) = strip(&["// plain", "/** doc */"]);
        assert!(flags.contains(CommentFlags::FORMAT_JAVADOC));
        assert!(flags.contains(CommentFlags::C_STYLE));
        assert!(!flags.contains(CommentFlags::CPP_STYLE));

        // Javadoc wins over Qt
        let (_, flags) = strip(&["/*! qt */", "/** doc */"]);
        assert!(flags.contains(CommentFlags::FORMAT_JAVADOC));
        assert!(!flags.contains(CommentFlags::FORMAT_QT));
    }

    #[test]
    fn test_empty_and_malformed() {
        let (text, _) = strip(&["/**/"]);
        assert!(text.is_empty());
        let (text, _) = strip(&["//"]);
        assert!(text.is_empty());
    }
}
