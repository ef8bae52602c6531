//! # Hierarchical configuration engine
//!
//! A parser/serializer for a line-based configuration format with repeated
//! and nested groups, repeated keys, typed value conversion and lossless
//! round trips: a document that is parsed and saved without modification is
//! reproduced byte-for-byte, including comments, blank lines, whitespace
//! around `=` and the end-of-line style of the source.
//!
//! ## Submodules
//!
//! - [`configuration`]: the [`Configuration`] document root — open, parse,
//!   save, document-wide flags.
//! - [`group`]: [`ConfigurationGroup`] — the ordered item/child tree with
//!   all queries and mutators.
//! - [`value`]: the [`ConfigurationValue`] conversion trait and the
//!   [`ValueFlags`] format variants.
//! - [`error`]: diagnostic types; the public API itself reports failure
//!   through success flags.
//!
//! Failure is never an exception path here: queries return `Option`s or
//! defaults and every mutator returns a success flag. A document that fails
//! to parse stays queryable for whatever survived, but rejects every
//! mutation and `save`.

pub mod configuration;
pub mod error;
pub mod group;
pub(crate) mod parse;
pub mod value;

pub use configuration::{Configuration, ConfigurationFlags};
pub use error::{ParseError, ParseErrorKind};
pub use group::ConfigurationGroup;
pub use value::{ConfigurationValue, ValueFlags};

#[cfg(test)]
mod tests;
