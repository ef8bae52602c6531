//! Module loading seam.
//!
//! [`ModuleLoader`] abstracts how a plugin binary becomes a [`Module`], the
//! same way storage backends sit behind a provider trait: the manager only
//! ever talks to the trait, [`DynamicLibraryLoader`] is the production
//! backend over `libloading`, and tests substitute an in-memory fake.
//!
//! Every dynamic plugin binary exposes three symbols with fixed names:
//!
//! - `pluginVersion`: an `i32` that must equal
//!   [`PLUGIN_VERSION`](crate::plugin_system::PLUGIN_VERSION),
//! - `pluginInterface`: a NUL-terminated byte string naming the interface
//!   the plugin implements,
//! - `pluginInstancer`: the [`Instancer`] factory.

use std::ffi::{c_char, c_void, CStr};
use std::path::Path;

use libloading::{Library, Symbol};

use crate::plugin_system::error::PluginSystemError;

/// Factory producing an opaque plugin instance. The instance is expected to
/// call back into
/// [`PluginManager::register_instance`](crate::plugin_system::PluginManager::register_instance)
/// during construction and to unregister symmetrically on destruction.
/// Static plugins register a plain Rust `extern "C"` function of the same
/// shape, so the manager treats both origins uniformly.
pub type Instancer =
    unsafe extern "C" fn(manager: *mut crate::plugin_system::PluginManager, name: *const c_char) -> *mut c_void;

/// A loaded plugin binary.
pub trait Module: Send {
    /// The `pluginVersion` constant baked into the binary.
    fn version(&self) -> i32;

    /// The `pluginInterface` string baked into the binary.
    fn interface(&self) -> &str;

    /// The instance factory.
    fn instancer(&self) -> Instancer;

    /// Release the binary. Consumes the module; after a failed close the
    /// handle is gone either way.
    fn close(self: Box<Self>) -> Result<(), PluginSystemError>;
}

/// Opens plugin binaries.
pub trait ModuleLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn Module>, PluginSystemError>;
}

/// Production loader over the platform dynamic linker.
#[derive(Debug, Default)]
pub struct DynamicLibraryLoader;

struct DynamicModule {
    library: Option<Library>,
    version: i32,
    interface: String,
    instancer: Instancer,
}

impl ModuleLoader for DynamicLibraryLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn Module>, PluginSystemError> {
        let library = unsafe { Library::new(path) }.map_err(|e| PluginSystemError::ModuleOpen {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        // Symbol resolution failures drop (and thereby close) the library.
        let version = unsafe {
            let symbol: Symbol<*const i32> =
                library
                    .get(b"pluginVersion\0")
                    .map_err(|e| PluginSystemError::SymbolResolution {
                        path: path.to_path_buf(),
                        symbol: "pluginVersion",
                        message: e.to_string(),
                    })?;
            **symbol
        };

        let interface = unsafe {
            let symbol: Symbol<*const c_char> =
                library
                    .get(b"pluginInterface\0")
                    .map_err(|e| PluginSystemError::SymbolResolution {
                        path: path.to_path_buf(),
                        symbol: "pluginInterface",
                        message: e.to_string(),
                    })?;
            CStr::from_ptr(*symbol)
                .to_str()
                .map_err(|e| PluginSystemError::SymbolResolution {
                    path: path.to_path_buf(),
                    symbol: "pluginInterface",
                    message: format!("interface string is not valid UTF-8: {}", e),
                })?
                .to_owned()
        };

        let instancer = unsafe {
            let symbol: Symbol<Instancer> =
                library
                    .get(b"pluginInstancer\0")
                    .map_err(|e| PluginSystemError::SymbolResolution {
                        path: path.to_path_buf(),
                        symbol: "pluginInstancer",
                        message: e.to_string(),
                    })?;
            *symbol
        };

        Ok(Box::new(DynamicModule {
            library: Some(library),
            version,
            interface,
            instancer,
        }))
    }
}

impl Module for DynamicModule {
    fn version(&self) -> i32 {
        self.version
    }

    fn interface(&self) -> &str {
        &self.interface
    }

    fn instancer(&self) -> Instancer {
        self.instancer
    }

    fn close(mut self: Box<Self>) -> Result<(), PluginSystemError> {
        match self.library.take() {
            Some(library) => library.close().map_err(|e| PluginSystemError::ModuleClose {
                message: e.to_string(),
            }),
            None => Ok(()),
        }
    }
}
