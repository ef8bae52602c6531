//! Plugin load states.

use std::fmt;

/// State of a plugin record, doubling as the result of every lifecycle
/// operation. The failure states are values, not errors: the manager never
/// returns a `Result` across its public surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    /// The plugin (or its binary) cannot be found.
    NotFound,
    /// The module was built against a different manager version.
    WrongPluginVersion,
    /// The module implements a different plugin interface.
    WrongInterfaceVersion,
    /// The metadata file is missing or does not parse.
    WrongMetadataFile,
    /// A dependency could not be loaded (including dependency cycles).
    UnresolvedDependency,
    /// Opening the module failed.
    LoadFailed,
    /// The plugin is loaded and usable.
    LoadOk,
    /// The plugin is known but not loaded.
    NotLoaded,
    /// Closing the module failed.
    UnloadFailed,
    /// Another loaded plugin depends on this one; unload that first.
    IsRequired,
    /// Statically linked: always loaded, never unloadable.
    IsStatic,
    /// Live instances exist; destroy them before unloading.
    IsUsed,
}

impl LoadState {
    /// Whether a plugin in this state is usable (dynamic and loaded, or
    /// static).
    pub fn is_loaded(self) -> bool {
        matches!(self, LoadState::LoadOk | LoadState::IsStatic)
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LoadState::NotFound => "not found",
            LoadState::WrongPluginVersion => "wrong plugin version",
            LoadState::WrongInterfaceVersion => "wrong interface version",
            LoadState::WrongMetadataFile => "wrong metadata file",
            LoadState::UnresolvedDependency => "unresolved dependency",
            LoadState::LoadFailed => "load failed",
            LoadState::LoadOk => "loaded",
            LoadState::NotLoaded => "not loaded",
            LoadState::UnloadFailed => "unload failed",
            LoadState::IsRequired => "required by another plugin",
            LoadState::IsStatic => "static",
            LoadState::IsUsed => "has live instances",
        };
        f.write_str(text)
    }
}
