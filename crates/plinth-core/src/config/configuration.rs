//! The [`Configuration`] document root.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bitflags::bitflags;

use crate::config::error::{ConfigurationError, ParseError};
use crate::config::group::{ConfigState, ConfigurationGroup};
use crate::config::parse::{self, Eol};
use crate::utils::fs as fsutil;

bitflags! {
    /// Behavior flags applied when opening a configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ConfigurationFlags: u8 {
        /// Reject every mutation and `save`.
        const READ_ONLY = 0b0000_0001;
        /// Discard the file contents instead of parsing them.
        const TRUNCATE = 0b0000_0010;
        /// A parent never holds two groups of the same name; repeated
        /// headers merge into the first occurrence.
        const UNIQUE_GROUPS = 0b0000_0100;
        /// A group never holds two values with the same key; a repeated key
        /// replaces the first occurrence.
        const UNIQUE_KEYS = 0b0000_1000;
        /// Drop comment lines while parsing.
        const SKIP_COMMENTS = 0b0001_0000;
        /// Write `\n` terminators regardless of the detected style.
        const FORCE_UNIX_EOL = 0b0010_0000;
        /// Write `\r\n` terminators regardless of the detected style.
        const FORCE_WINDOWS_EOL = 0b0100_0000;
    }
}

/// A parsed configuration document bound to a file path or to an in-memory
/// text source.
///
/// The document derefs to its root [`ConfigurationGroup`], so every group
/// query and mutator is available directly on it. Mutations happen in
/// memory; [`save`](Configuration::save) serializes back to the bound path.
/// An unmodified document saves back byte-for-byte (for sources whose group
/// headers are canonical `[path]` lines).
pub struct Configuration {
    path: Option<PathBuf>,
    flags: ConfigurationFlags,
    eol: Eol,
    final_newline: bool,
    root: ConfigurationGroup,
    state: Arc<ConfigState>,
    parse_error: Option<ParseError>,
}

impl Configuration {
    /// Open and eagerly parse the file at `path`.
    ///
    /// A nonexistent file yields a valid empty document (created on the
    /// first `save`) unless `READ_ONLY` is set, in which case the document
    /// is invalid. An unreadable file yields an invalid document: queries
    /// see an empty tree and every mutator and `save` fails.
    pub fn open<P: AsRef<Path>>(path: P, flags: ConfigurationFlags) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = Arc::new(ConfigState::new(flags));

        if flags.contains(ConfigurationFlags::TRUNCATE) {
            let root = ConfigurationGroup::new(String::new(), state.clone());
            return Self::assemble(Some(path), flags, root, None, true, state, None);
        }

        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let parsed = parse::parse_document(&text, flags, &state);
                Self::assemble(
                    Some(path),
                    flags,
                    parsed.root,
                    parsed.eol,
                    parsed.final_newline,
                    state,
                    parsed.error,
                )
            }
            Err(source) if source.kind() == std::io::ErrorKind::NotFound
                && !flags.contains(ConfigurationFlags::READ_ONLY) =>
            {
                let root = ConfigurationGroup::new(String::new(), state.clone());
                Self::assemble(Some(path), flags, root, None, true, state, None)
            }
            Err(source) => {
                log::warn!(
                    "{}",
                    ConfigurationError::Io {
                        operation: "open",
                        path: path.clone(),
                        source,
                    }
                );
                state.valid.store(false, Ordering::Relaxed);
                let root = ConfigurationGroup::new(String::new(), state.clone());
                Self::assemble(Some(path), flags, root, None, true, state, None)
            }
        }
    }

    /// Parse an in-memory text source. The resulting document is
    /// permanently read-only and not bound to any path; `save` always
    /// fails.
    pub fn from_text(text: &str) -> Self {
        Self::from_text_with(text, ConfigurationFlags::empty())
    }

    /// [`from_text`](Self::from_text) with additional parse flags
    /// (`UNIQUE_GROUPS`, `UNIQUE_KEYS`, `SKIP_COMMENTS`).
    pub fn from_text_with(text: &str, flags: ConfigurationFlags) -> Self {
        let flags = flags | ConfigurationFlags::READ_ONLY;
        let state = Arc::new(ConfigState::new(flags));
        let parsed = parse::parse_document(text, flags, &state);
        Self::assemble(
            None,
            flags,
            parsed.root,
            parsed.eol,
            parsed.final_newline,
            state,
            parsed.error,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        path: Option<PathBuf>,
        flags: ConfigurationFlags,
        root: ConfigurationGroup,
        detected_eol: Option<Eol>,
        final_newline: bool,
        state: Arc<ConfigState>,
        parse_error: Option<ParseError>,
    ) -> Self {
        let eol = if flags.contains(ConfigurationFlags::FORCE_WINDOWS_EOL) {
            Eol::Windows
        } else if flags.contains(ConfigurationFlags::FORCE_UNIX_EOL) {
            Eol::Unix
        } else {
            detected_eol.unwrap_or(Eol::Unix)
        };
        Self {
            path,
            flags,
            eol,
            final_newline,
            root,
            state,
            parse_error,
        }
    }

    /// Whether the document parsed cleanly and accepts mutation attempts.
    pub fn is_valid(&self) -> bool {
        self.state.is_valid()
    }

    /// The bound file path; `None` for in-memory documents.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn flags(&self) -> ConfigurationFlags {
        self.flags
    }

    /// The first line the parser rejected, if any.
    pub fn parse_error(&self) -> Option<&ParseError> {
        self.parse_error.as_ref()
    }

    /// Materialize missing groups on lookup through
    /// [`group_mut`](ConfigurationGroup::group_mut).
    pub fn set_automatic_group_creation(&self, enabled: bool) {
        self.state.auto_groups.store(enabled, Ordering::Relaxed);
    }

    /// Materialize missing keys on typed reads, writing the caller-supplied
    /// default back into the store.
    pub fn set_automatic_key_creation(&self, enabled: bool) {
        self.state.auto_keys.store(enabled, Ordering::Relaxed);
    }

    /// Serialize the tree back to the bound path. Fails for read-only,
    /// invalid or in-memory documents and on I/O errors. The file is
    /// replaced through a sibling temporary file and an atomic rename, so
    /// no partial file is ever observable.
    pub fn save(&self) -> bool {
        let Some(path) = self.path.as_deref() else {
            return false;
        };
        if !self.state.can_modify() {
            return false;
        }
        let mut out = String::new();
        self.root.write_into(&mut out, "", self.eol.as_str());
        if !self.final_newline {
            let eol = self.eol.as_str();
            if out.ends_with(eol) {
                out.truncate(out.len() - eol.len());
            }
        }
        match fsutil::write_atomic(path, out.as_bytes()) {
            Ok(()) => true,
            Err(source) => {
                log::warn!(
                    "{}",
                    ConfigurationError::Io {
                        operation: "save",
                        path: path.to_path_buf(),
                        source,
                    }
                );
                false
            }
        }
    }
}

impl Deref for Configuration {
    type Target = ConfigurationGroup;

    fn deref(&self) -> &ConfigurationGroup {
        &self.root
    }
}

impl DerefMut for Configuration {
    fn deref_mut(&mut self) -> &mut ConfigurationGroup {
        &mut self.root
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("path", &self.path)
            .field("valid", &self.is_valid())
            .field("groups", &self.root.group_count())
            .finish()
    }
}
