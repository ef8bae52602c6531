//! Line-level parser for the configuration format.
//!
//! The format is strictly line-oriented: every line is a blank, a comment,
//! a `[path]` group header or a `key=value` pair. Parsing preserves enough
//! of the source (raw comment/blank text, whitespace around `=`, EOL style,
//! presence of a final terminator) that serializing an unmodified document
//! reproduces it byte-for-byte.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::config::error::{ParseError, ParseErrorKind};
use crate::config::group::{ConfigState, ConfigurationGroup, Item};
use crate::config::ConfigurationFlags;

/// End-of-line style of a document. Detected from the first terminator in
/// the source; every line is normalized to it on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Eol {
    Unix,
    Windows,
}

impl Eol {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Eol::Unix => "\n",
            Eol::Windows => "\r\n",
        }
    }

    fn detect(text: &str) -> Option<Eol> {
        let first = text.find('\n')?;
        if first > 0 && text.as_bytes()[first - 1] == b'\r' {
            Some(Eol::Windows)
        } else {
            Some(Eol::Unix)
        }
    }
}

pub(crate) struct ParseResult {
    pub root: ConfigurationGroup,
    /// `None` when the source contained no terminator at all.
    pub eol: Option<Eol>,
    /// Whether the source ended with a line terminator.
    pub final_newline: bool,
    /// First offending line, if any. Its enclosing group has been dropped
    /// and the caller must mark the document invalid.
    pub error: Option<ParseError>,
}

enum Line<'a> {
    Blank,
    Comment,
    Header(Vec<&'a str>),
    KeyValue {
        key: &'a str,
        pre: &'a str,
        post: &'a str,
        value: &'a str,
    },
    Invalid(ParseErrorKind),
}

fn classify(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Line::Blank;
    }
    if trimmed.starts_with('#') || trimmed.starts_with(';') {
        return Line::Comment;
    }
    if let Some(rest) = trimmed.strip_prefix('[') {
        let Some(path) = rest.strip_suffix(']') else {
            return Line::Invalid(ParseErrorKind::MalformedHeader);
        };
        let names: Vec<&str> = path.split('/').collect();
        if names.iter().any(|n| n.is_empty()) {
            return Line::Invalid(ParseErrorKind::EmptyGroupName);
        }
        return Line::Header(names);
    }
    let Some(eq) = line.find('=') else {
        return Line::Invalid(ParseErrorKind::Unrecognized);
    };
    let key_part = &line[..eq];
    let key_end = key_part.trim_end();
    let pre = &key_part[key_end.len()..];
    let key = key_end.trim_start();
    if key.is_empty() || key.contains('/') || key.chars().any(char::is_whitespace) {
        return Line::Invalid(ParseErrorKind::MalformedKey);
    }
    let value_part = &line[eq + 1..];
    let value_start = value_part.len() - value_part.trim_start().len();
    let post = &value_part[..value_start];
    let value = value_part[value_start..].trim_end();
    if value.starts_with('"') && !quoted_value_terminated(value) {
        return Line::Invalid(ParseErrorKind::UnterminatedQuote);
    }
    Line::KeyValue { key, pre, post, value }
}

/// A value starting with `"` must end with an unescaped `"`.
fn quoted_value_terminated(value: &str) -> bool {
    if value.len() < 2 || !value.ends_with('"') {
        return false;
    }
    let interior = &value.as_bytes()[1..value.len() - 1];
    let trailing_backslashes = interior.iter().rev().take_while(|&&b| b == b'\\').count();
    trailing_backslashes % 2 == 0
}

/// Resolve a header path against the tree, creating groups as needed.
/// Intermediate components reuse the most recent sibling of that name; the
/// final component opens a new sibling, except under `UNIQUE_GROUPS` where
/// an existing one is reused (the second occurrence merges into the first).
/// Returns the child-index path of the opened group.
fn open_group(root: &mut ConfigurationGroup, names: &[&str], state: &Arc<ConfigState>) -> Vec<usize> {
    let mut path = Vec::with_capacity(names.len());
    let mut current = root;
    let (last, intermediates) = names.split_last().expect("header path is never empty");
    for name in intermediates {
        let index = match current.children.iter().rposition(|g| g.name() == *name) {
            Some(i) => i,
            None => {
                current
                    .children
                    .push(ConfigurationGroup::new((*name).to_string(), state.clone()));
                current.children.len() - 1
            }
        };
        path.push(index);
        current = &mut current.children[index];
    }
    let index = if state.unique_groups {
        match current.children.iter().position(|g| g.name() == *last) {
            Some(i) => i,
            None => {
                current
                    .children
                    .push(ConfigurationGroup::new((*last).to_string(), state.clone()));
                current.children.len() - 1
            }
        }
    } else {
        current
            .children
            .push(ConfigurationGroup::new((*last).to_string(), state.clone()));
        current.children.len() - 1
    };
    path.push(index);
    path
}

fn group_at_path<'a>(root: &'a mut ConfigurationGroup, path: &[usize]) -> &'a mut ConfigurationGroup {
    let mut current = root;
    for &index in path {
        current = &mut current.children[index];
    }
    current
}

pub(crate) fn parse_document(
    text: &str,
    flags: ConfigurationFlags,
    state: &Arc<ConfigState>,
) -> ParseResult {
    let mut root = ConfigurationGroup::new(String::new(), state.clone());
    let eol = Eol::detect(text);
    let final_newline = text.is_empty() || text.ends_with('\n');
    let skip_comments = flags.contains(ConfigurationFlags::SKIP_COMMENTS);

    let mut current_path: Vec<usize> = Vec::new();
    let mut error: Option<ParseError> = None;
    // Set after an unparseable line: content is discarded until the next
    // valid group header.
    let mut skipping = false;

    for (line_index, raw_line) in text.split_inclusive('\n').enumerate() {
        let line = match raw_line.strip_suffix('\n') {
            Some(stripped) => stripped.strip_suffix('\r').unwrap_or(stripped),
            None => raw_line,
        };
        match classify(line) {
            Line::Blank => {
                if !skipping {
                    group_at_path(&mut root, &current_path)
                        .items
                        .push(Item::Blank(line.to_string()));
                }
            }
            Line::Comment => {
                if !skipping && !skip_comments {
                    group_at_path(&mut root, &current_path)
                        .items
                        .push(Item::Comment(line.to_string()));
                }
            }
            Line::Header(names) => {
                current_path = open_group(&mut root, &names, state);
                skipping = false;
            }
            Line::KeyValue { key, pre, post, value } => {
                if skipping {
                    continue;
                }
                let group = group_at_path(&mut root, &current_path);
                let replaced = state.unique_keys
                    && group.items.iter_mut().any(|item| match item {
                        Item::KeyValue { key: k, value: v, .. } if k == key => {
                            *v = value.to_string();
                            true
                        }
                        _ => false,
                    });
                if !replaced {
                    group.items.push(Item::KeyValue {
                        key: key.to_string(),
                        value: value.to_string(),
                        pre: pre.to_string(),
                        post: post.to_string(),
                    });
                }
            }
            Line::Invalid(kind) => {
                if skipping {
                    continue;
                }
                if error.is_none() {
                    error = Some(ParseError { line: line_index + 1, kind });
                }
                log::warn!(
                    "dropping group over unparseable line {}: {}",
                    line_index + 1,
                    kind
                );
                // The whole enclosing group is dropped, not just the line.
                match current_path.split_last() {
                    Some((&last, parent_path)) => {
                        group_at_path(&mut root, parent_path).children.remove(last);
                    }
                    None => {
                        root.items.clear();
                    }
                }
                current_path.clear();
                skipping = true;
            }
        }
    }

    if error.is_some() {
        state.valid.store(false, Ordering::Relaxed);
    }

    ParseResult {
        root,
        eol,
        final_newline,
        error,
    }
}
