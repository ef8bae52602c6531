//! Plugin metadata, read from a configuration file.

use crate::config::Configuration;

/// Typed view over a plugin's metadata configuration.
///
/// The metadata file is an ordinary configuration file whose root group
/// carries `depends`, `replaces` and `conflicts` keys (zero or more
/// occurrences each, one plugin name per occurrence) plus free-form
/// human-readable keys. Only the dependency list drives manager behavior;
/// `replaces`/`conflicts` are advisory and everything else is passed
/// through untouched.
#[derive(Debug, Clone, Default)]
pub struct PluginMetadata {
    depends: Vec<String>,
    replaces: Vec<String>,
    conflicts: Vec<String>,
    description: Option<String>,
    author: Option<String>,
}

impl PluginMetadata {
    pub fn from_configuration(configuration: &Configuration) -> Self {
        Self {
            depends: configuration.values("depends"),
            replaces: configuration.values("replaces"),
            conflicts: configuration.values("conflicts"),
            description: optional(configuration, "description"),
            author: optional(configuration, "author"),
        }
    }

    /// Names of the plugins this plugin requires, in declaration order.
    pub fn depends(&self) -> &[String] {
        &self.depends
    }

    /// Names of the plugins this plugin can stand in for.
    pub fn replaces(&self) -> &[String] {
        &self.replaces
    }

    /// Names of the plugins this plugin refuses to coexist with.
    pub fn conflicts(&self) -> &[String] {
        &self.conflicts
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }
}

fn optional(configuration: &Configuration, key: &str) -> Option<String> {
    let text: String = configuration.get(key);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
