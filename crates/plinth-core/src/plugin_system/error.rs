//! Plugin system error types.
//!
//! These carry the OS-level detail (dlopen failure text, missing symbols)
//! that the [`LoadState`](crate::plugin_system::LoadState) values
//! deliberately flatten away. They stay internal to the crate: the manager
//! logs them and surfaces only the corresponding state.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginSystemError {
    #[error("cannot open module '{}': {message}", path.display())]
    ModuleOpen { path: PathBuf, message: String },

    #[error("symbol '{symbol}' missing or unusable in '{}': {message}", path.display())]
    SymbolResolution {
        path: PathBuf,
        symbol: &'static str,
        message: String,
    },

    #[error("cannot close module of plugin: {message}")]
    ModuleClose { message: String },
}
