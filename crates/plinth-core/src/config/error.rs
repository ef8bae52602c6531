//! Error types for the configuration engine.
//!
//! The public configuration API reports failure through success flags and
//! `Option`s, never through `Result` (see [`crate::config`]). These types
//! exist for diagnostics: I/O failures are logged through the `log` facade,
//! and the first parse error of a document is retained and exposed via
//! [`Configuration::parse_error`](crate::config::Configuration::parse_error).

use std::path::PathBuf;

use thiserror::Error;

/// Why a single source line could not be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// A line starting with `[` that is not a well-formed `[path]` header.
    #[error("malformed group header")]
    MalformedHeader,
    /// A header path with an empty component, such as `[a//b]` or `[/a]`.
    #[error("empty name in group header path")]
    EmptyGroupName,
    /// A key that is empty or contains whitespace or `/`.
    #[error("malformed key")]
    MalformedKey,
    /// A quoted value without a closing quote.
    #[error("unterminated quoted value")]
    UnterminatedQuote,
    /// A line that is no group header, key-value pair, comment or blank.
    #[error("unrecognized line")]
    Unrecognized,
}

/// The first offending line of an invalid document.
///
/// Parsing drops the whole enclosing group of such a line and marks the
/// document invalid; this record is what is left for the caller to inspect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at line {line}: {kind}")]
pub struct ParseError {
    /// 1-based line number in the source.
    pub line: usize,
    pub kind: ParseErrorKind,
}

/// Internal configuration failure, logged rather than returned.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("i/o error during {operation} on '{}': {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
}
