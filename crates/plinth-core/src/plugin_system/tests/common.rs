//! Shared fixtures for plugin system tests.
//!
//! The record map is process-wide and the test harness runs tests in
//! parallel, so every test must use plugin names and interface strings of
//! its own; the helpers here take both explicitly.

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::{tempdir, TempDir};

use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::loader::{Instancer, Module, ModuleLoader};
use crate::plugin_system::manager::PluginManager;
use crate::plugin_system::PLUGIN_VERSION;

/// Description of one fake module binary.
#[derive(Clone)]
pub struct FakeModuleSpec {
    pub version: i32,
    pub interface: &'static str,
    pub fail_open: bool,
    pub fail_close: bool,
}

impl FakeModuleSpec {
    pub fn good(interface: &'static str) -> Self {
        Self {
            version: PLUGIN_VERSION,
            interface,
            fail_open: false,
            fail_close: false,
        }
    }
}

/// In-memory stand-in for the dynamic linker, keyed by module path.
#[derive(Default)]
pub struct FakeLoader {
    modules: Mutex<HashMap<PathBuf, FakeModuleSpec>>,
}

impl FakeLoader {
    pub fn insert(&self, path: PathBuf, spec: FakeModuleSpec) {
        self.modules.lock().expect("fake loader lock").insert(path, spec);
    }
}

impl ModuleLoader for FakeLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn Module>, PluginSystemError> {
        let spec = {
            let modules = self.modules.lock().expect("fake loader lock");
            modules.get(path).cloned()
        };
        let Some(spec) = spec else {
            return Err(PluginSystemError::ModuleOpen {
                path: path.to_path_buf(),
                message: "no such fake module".into(),
            });
        };
        if spec.fail_open {
            return Err(PluginSystemError::ModuleOpen {
                path: path.to_path_buf(),
                message: "simulated open failure".into(),
            });
        }
        Ok(Box::new(FakeModule { spec }))
    }
}

struct FakeModule {
    spec: FakeModuleSpec,
}

impl Module for FakeModule {
    fn version(&self) -> i32 {
        self.spec.version
    }

    fn interface(&self) -> &str {
        self.spec.interface
    }

    fn instancer(&self) -> Instancer {
        registering_instancer
    }

    fn close(self: Box<Self>) -> Result<(), PluginSystemError> {
        if self.spec.fail_close {
            Err(PluginSystemError::ModuleClose {
                message: "simulated close failure".into(),
            })
        } else {
            Ok(())
        }
    }
}

/// What a real plugin instance does in its constructor: allocate, then
/// register the address with the manager. Returns null when registration is
/// refused.
pub unsafe extern "C" fn registering_instancer(
    manager: *mut PluginManager,
    name: *const c_char,
) -> *mut c_void {
    let manager = unsafe { &*manager };
    let name = unsafe { CStr::from_ptr(name) }
        .to_str()
        .expect("plugin name is UTF-8");
    let instance = Box::into_raw(Box::new(0u8)) as *mut c_void;
    if manager.register_instance(name, instance).is_none() {
        unsafe { drop(Box::from_raw(instance as *mut u8)) };
        return std::ptr::null_mut();
    }
    instance
}

/// Counterpart of [`registering_instancer`]: unregister, then free.
pub fn destroy_instance(manager: &PluginManager, name: &str, instance: *mut c_void) {
    manager.unregister_instance(name, instance);
    unsafe { drop(Box::from_raw(instance as *mut u8)) };
}

/// A plugin directory on disk plus the fake loader serving its binaries.
pub struct TestEnv {
    pub dir: TempDir,
    pub loader: Arc<FakeLoader>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            dir: tempdir().expect("Failed to create temp directory"),
            loader: Arc::new(FakeLoader::default()),
        }
    }

    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!("{}.conf", name))
    }

    pub fn module_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!(
            "{}{}{}",
            std::env::consts::DLL_PREFIX,
            name,
            std::env::consts::DLL_SUFFIX
        ))
    }

    pub fn write_metadata(&self, name: &str, metadata: &str) {
        fs::write(self.metadata_path(name), metadata).expect("Failed to write metadata");
    }

    /// Complete plugin: metadata file, module binary and a well-behaved
    /// fake module.
    pub fn add_plugin(&self, name: &str, interface: &'static str, metadata: &str) {
        self.add_plugin_spec(name, metadata, FakeModuleSpec::good(interface));
    }

    /// Plugin whose fake module behaves according to `spec`.
    pub fn add_plugin_spec(&self, name: &str, metadata: &str, spec: FakeModuleSpec) {
        self.write_metadata(name, metadata);
        fs::write(self.module_path(name), b"").expect("Failed to write module file");
        self.loader.insert(self.module_path(name), spec);
    }

    /// Metadata file without any module binary behind it.
    pub fn add_metadata_only(&self, name: &str, metadata: &str) {
        self.write_metadata(name, metadata);
    }

    pub fn remove_metadata(&self, name: &str) {
        fs::remove_file(self.metadata_path(name)).expect("Failed to remove metadata");
    }

    pub fn manager(&self, interface: &str) -> PluginManager {
        PluginManager::with_loader(interface, self.dir.path(), self.loader.clone())
    }
}
