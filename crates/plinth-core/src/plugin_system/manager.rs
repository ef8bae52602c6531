//! The plugin manager.

use std::collections::{HashMap, HashSet};
use std::ffi::{c_void, CString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Configuration, ConfigurationFlags};
use crate::plugin_system::loader::{DynamicLibraryLoader, ModuleLoader};
use crate::plugin_system::metadata::PluginMetadata;
use crate::plugin_system::registry::{self, PluginRecord};
use crate::plugin_system::state::LoadState;
use crate::plugin_system::PLUGIN_VERSION;
use crate::utils::fs as fsutil;

/// Discovers plugins through metadata files in a directory, loads and
/// unloads their modules, and tracks dependencies and live instances.
///
/// All managers in a process share one record map (see
/// [`registry`](crate::plugin_system::registry)); each record is owned by
/// the manager that discovered it. A manager only loads plugins whose
/// interface matches its own, so one manager corresponds to one plugin
/// interface.
///
/// Plugin `name` in directory `dir` consists of two files:
/// `dir/name.conf` (metadata, configuration-file syntax) and the module
/// binary `dir/<platform prefix>name<platform suffix>`.
pub struct PluginManager {
    id: usize,
    interface: String,
    plugin_dir: PathBuf,
    loader: Arc<dyn ModuleLoader>,
}

impl PluginManager {
    /// Construct a manager for `interface`, scanning `plugin_dir`.
    ///
    /// The first manager constructed in a process also merges all queued
    /// static plugin registrations into the record map; static plugins with
    /// this interface are claimed by this manager.
    pub fn new<P: AsRef<Path>>(interface: &str, plugin_dir: P) -> Self {
        Self::with_loader(interface, plugin_dir, Arc::new(DynamicLibraryLoader))
    }

    /// [`new`](Self::new) with a custom module loader. The production
    /// loader opens platform dynamic libraries; tests substitute fakes.
    pub fn with_loader<P: AsRef<Path>>(
        interface: &str,
        plugin_dir: P,
        loader: Arc<dyn ModuleLoader>,
    ) -> Self {
        let mut manager = Self {
            id: registry::next_manager_id(),
            interface: interface.to_string(),
            plugin_dir: plugin_dir.as_ref().to_path_buf(),
            loader,
        };
        manager.reload_plugin_directory();
        manager
    }

    /// The interface identifier this manager loads plugins for.
    pub fn plugin_interface(&self) -> &str {
        &self.interface
    }

    pub fn plugin_directory(&self) -> &Path {
        &self.plugin_dir
    }

    /// Change the plugin directory and reconcile the records with it.
    pub fn set_plugin_directory<P: AsRef<Path>>(&mut self, plugin_dir: P) {
        self.plugin_dir = plugin_dir.as_ref().to_path_buf();
        self.reload_plugin_directory();
    }

    /// Reconcile the record map with the directory contents: records of
    /// unloaded plugins whose metadata file vanished are dropped, newly
    /// appeared metadata files are registered, loaded plugins are left
    /// untouched. A dynamic plugin whose name collides with an existing
    /// record (notably a static plugin) is skipped.
    pub fn reload_plugin_directory(&mut self) {
        let mut plugins = registry::plugins();

        for record in plugins.values_mut() {
            if record.state == LoadState::IsStatic
                && record.manager.is_none()
                && record.interface == self.interface
            {
                record.manager = Some(self.id);
            }
        }

        // Snapshot the key set first; removals must not disturb iteration.
        let known: Vec<String> = plugins.keys().cloned().collect();
        for name in &known {
            let vanished = plugins.get(name).map_or(false, |record| {
                record.manager == Some(self.id)
                    && record.state != LoadState::IsStatic
                    && !record.state.is_loaded()
                    && !self.metadata_path(name).exists()
            });
            if vanished {
                plugins.remove(name);
            }
        }

        let files = match fsutil::list_files_with_extension(&self.plugin_dir, "conf") {
            Ok(files) => files,
            Err(source) => {
                log::debug!(
                    "cannot scan plugin directory '{}': {}",
                    self.plugin_dir.display(),
                    source
                );
                return;
            }
        };
        for file in files {
            let Some(name) = file.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if plugins.contains_key(name) {
                continue;
            }
            if let Some(record) = self.discover(name) {
                plugins.insert(name.to_string(), record);
            }
        }
    }

    /// Names of all plugins known to this manager, sorted.
    pub fn plugin_list(&self) -> Vec<String> {
        let plugins = registry::plugins();
        let mut names: Vec<String> = plugins
            .iter()
            .filter(|(_, record)| record.manager == Some(self.id))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Load state of a plugin; `NotFound` for unknown names.
    pub fn load_state(&self, name: &str) -> LoadState {
        registry::plugins()
            .get(name)
            .map_or(LoadState::NotFound, |record| record.state)
    }

    /// Metadata of a plugin, shared with its live instances.
    pub fn metadata(&self, name: &str) -> Option<Arc<PluginMetadata>> {
        registry::plugins().get(name).map(|record| record.metadata.clone())
    }

    /// The metadata configuration file of a plugin.
    pub fn configuration(&self, name: &str) -> Option<Arc<Configuration>> {
        registry::plugins()
            .get(name)
            .map(|record| record.configuration.clone())
    }

    /// Load a plugin and, recursively, its declared dependencies.
    ///
    /// Already loaded and static plugins return their state unchanged.
    /// Dependencies that loaded successfully stay loaded even when a later
    /// dependency fails; cycles resolve to `UnresolvedDependency`.
    pub fn load(&mut self, name: &str) -> LoadState {
        let mut plugins = registry::plugins();
        let mut in_progress = HashSet::new();
        self.load_inner(&mut plugins, name, &mut in_progress)
    }

    /// Unload a plugin. `NotLoaded` signals success; `IsStatic`, `IsUsed`,
    /// `IsRequired` and `UnloadFailed` signal why nothing was unloaded. An
    /// unloaded plugin has its metadata re-read and reports its state.
    pub fn unload(&mut self, name: &str) -> LoadState {
        let mut plugins = registry::plugins();
        self.unload_inner(&mut plugins, name)
    }

    /// Reload a plugin: unload + load when loaded, metadata re-read
    /// otherwise.
    pub fn reload(&mut self, name: &str) -> LoadState {
        if self.load_state(name) == LoadState::LoadOk {
            let unloaded = self.unload(name);
            if unloaded != LoadState::NotLoaded {
                return unloaded;
            }
            self.load(name)
        } else {
            let mut plugins = registry::plugins();
            self.refresh_metadata(&mut plugins, name);
            plugins.get(name).map_or(LoadState::NotFound, |record| record.state)
        }
    }

    /// Construct an instance of a loaded plugin through its instancer. The
    /// instance is expected to register itself (the instancer receives this
    /// manager); returns the opaque instance pointer, or `None` when the
    /// plugin is not loaded or construction failed.
    pub fn instantiate(&mut self, name: &str) -> Option<*mut c_void> {
        let instancer = {
            let plugins = registry::plugins();
            let record = plugins.get(name)?;
            if !record.state.is_loaded() {
                return None;
            }
            record.instancer?
        };
        // The registry lock is released: the instancer calls back into
        // register_instance.
        let c_name = CString::new(name).ok()?;
        let instance = unsafe { instancer(self as *mut _, c_name.as_ptr()) };
        if instance.is_null() {
            None
        } else {
            Some(instance)
        }
    }

    /// Called by a plugin instance on construction. Records the instance
    /// address (blocking unload while it lives) and hands back the plugin's
    /// metadata and configuration for cheap access.
    pub fn register_instance(
        &self,
        name: &str,
        instance: *mut c_void,
    ) -> Option<(Arc<PluginMetadata>, Arc<Configuration>)> {
        let mut plugins = registry::plugins();
        let record = plugins.get_mut(name)?;
        record.instances.insert(instance as usize);
        Some((record.metadata.clone(), record.configuration.clone()))
    }

    /// Called by a plugin instance on destruction. Unknown names and
    /// addresses are ignored.
    pub fn unregister_instance(&self, name: &str, instance: *mut c_void) {
        if let Some(record) = registry::plugins().get_mut(name) {
            record.instances.remove(&(instance as usize));
        }
    }

    // --- internals ---

    fn metadata_path(&self, name: &str) -> PathBuf {
        self.plugin_dir.join(format!("{}.conf", name))
    }

    fn module_path(&self, name: &str) -> PathBuf {
        self.plugin_dir.join(format!(
            "{}{}{}",
            std::env::consts::DLL_PREFIX,
            name,
            std::env::consts::DLL_SUFFIX
        ))
    }

    /// Build a record for a newly appeared metadata file. `None` when the
    /// file declares a different interface; such plugins belong to another
    /// manager.
    fn discover(&self, name: &str) -> Option<PluginRecord> {
        let configuration = Configuration::open(self.metadata_path(name), ConfigurationFlags::READ_ONLY);
        let record = if configuration.is_valid() {
            let interface: String = configuration.get("interface");
            if !interface.is_empty() && interface != self.interface {
                return None;
            }
            let state = if self.module_path(name).exists() {
                LoadState::NotLoaded
            } else {
                LoadState::NotFound
            };
            let metadata = Arc::new(PluginMetadata::from_configuration(&configuration));
            PluginRecord {
                state,
                interface,
                configuration: Arc::new(configuration),
                metadata,
                manager: Some(self.id),
                instancer: None,
                module: None,
                used_by: Vec::new(),
                instances: HashSet::new(),
            }
        } else {
            PluginRecord {
                state: LoadState::WrongMetadataFile,
                interface: String::new(),
                configuration: Arc::new(configuration),
                metadata: Arc::new(PluginMetadata::default()),
                manager: Some(self.id),
                instancer: None,
                module: None,
                used_by: Vec::new(),
                instances: HashSet::new(),
            }
        };
        Some(record)
    }

    /// Re-read the metadata file of an unloaded dynamic plugin owned by
    /// this manager, picking up on-disk changes to dependency declarations.
    /// Loaded, static and foreign records are left untouched.
    fn refresh_metadata(&self, plugins: &mut HashMap<String, PluginRecord>, name: &str) {
        let Some(record) = plugins.get_mut(name) else {
            return;
        };
        if record.manager != Some(self.id)
            || record.state == LoadState::IsStatic
            || record.state.is_loaded()
        {
            return;
        }
        let configuration = Configuration::open(self.metadata_path(name), ConfigurationFlags::READ_ONLY);
        if configuration.is_valid() {
            record.interface = configuration.get("interface");
            record.metadata = Arc::new(PluginMetadata::from_configuration(&configuration));
            record.configuration = Arc::new(configuration);
            record.state = if self.module_path(name).exists() {
                LoadState::NotLoaded
            } else {
                LoadState::NotFound
            };
        } else {
            record.metadata = Arc::new(PluginMetadata::default());
            record.configuration = Arc::new(configuration);
            record.state = LoadState::WrongMetadataFile;
        }
    }

    fn load_inner(
        &self,
        plugins: &mut HashMap<String, PluginRecord>,
        name: &str,
        in_progress: &mut HashSet<String>,
    ) -> LoadState {
        match plugins.get(name) {
            None => return LoadState::NotFound,
            Some(record) if record.state.is_loaded() => return record.state,
            Some(_) => {}
        }
        // Dependency cycles: re-entering a name that is still being loaded
        // can never succeed.
        if in_progress.contains(name) {
            return LoadState::UnresolvedDependency;
        }
        in_progress.insert(name.to_string());
        let state = self.load_attempt(plugins, name, in_progress);
        in_progress.remove(name);
        state
    }

    fn load_attempt(
        &self,
        plugins: &mut HashMap<String, PluginRecord>,
        name: &str,
        in_progress: &mut HashSet<String>,
    ) -> LoadState {
        self.refresh_metadata(plugins, name);
        let deps: Vec<String> = match plugins.get(name) {
            None => return LoadState::NotFound,
            Some(record) => match record.state {
                LoadState::WrongMetadataFile => return LoadState::WrongMetadataFile,
                LoadState::NotFound => return LoadState::NotFound,
                _ => record.metadata.depends().to_vec(),
            },
        };

        // Dependencies that did load are not rolled back when a later one
        // fails; partial graph loads are permitted.
        for dep in &deps {
            let dep_state = self.load_inner(plugins, dep, in_progress);
            if !dep_state.is_loaded() {
                log::warn!(
                    "cannot load plugin '{}': dependency '{}' is {}",
                    name,
                    dep,
                    dep_state
                );
                if let Some(record) = plugins.get_mut(name) {
                    record.state = LoadState::UnresolvedDependency;
                }
                return LoadState::UnresolvedDependency;
            }
        }

        let module_path = self.module_path(name);
        let module = match self.loader.open(&module_path) {
            Ok(module) => module,
            Err(source) => {
                log::warn!("cannot load plugin '{}': {}", name, source);
                if let Some(record) = plugins.get_mut(name) {
                    record.state = LoadState::LoadFailed;
                }
                return LoadState::LoadFailed;
            }
        };

        if module.version() != PLUGIN_VERSION {
            log::warn!(
                "cannot load plugin '{}': module version {} does not match manager version {}",
                name,
                module.version(),
                PLUGIN_VERSION
            );
            if let Err(source) = module.close() {
                log::warn!("closing rejected module of plugin '{}': {}", name, source);
            }
            if let Some(record) = plugins.get_mut(name) {
                record.state = LoadState::WrongPluginVersion;
            }
            return LoadState::WrongPluginVersion;
        }

        if module.interface() != self.interface {
            log::warn!(
                "cannot load plugin '{}': module interface '{}' does not match '{}'",
                name,
                module.interface(),
                self.interface
            );
            if let Err(source) = module.close() {
                log::warn!("closing rejected module of plugin '{}': {}", name, source);
            }
            if let Some(record) = plugins.get_mut(name) {
                record.state = LoadState::WrongInterfaceVersion;
            }
            return LoadState::WrongInterfaceVersion;
        }

        if let Some(record) = plugins.get_mut(name) {
            record.instancer = Some(module.instancer());
            record.module = Some(module);
            record.state = LoadState::LoadOk;
        }
        for dep in &deps {
            if let Some(record) = plugins.get_mut(dep) {
                record.add_used_by(name);
            }
        }
        LoadState::LoadOk
    }

    fn unload_inner(&self, plugins: &mut HashMap<String, PluginRecord>, name: &str) -> LoadState {
        let state = match plugins.get(name) {
            None => return LoadState::NotFound,
            Some(record) => record.state,
        };
        match state {
            LoadState::IsStatic => return LoadState::IsStatic,
            LoadState::LoadOk => {}
            _ => {
                // Not loaded: re-read metadata and report the state.
                self.refresh_metadata(plugins, name);
                return plugins.get(name).map_or(LoadState::NotFound, |r| r.state);
            }
        }

        let (module, deps) = {
            let Some(record) = plugins.get_mut(name) else {
                return LoadState::NotFound;
            };
            if !record.instances.is_empty() {
                return LoadState::IsUsed;
            }
            if !record.used_by.is_empty() {
                return LoadState::IsRequired;
            }
            record.instancer = None;
            (record.module.take(), record.metadata.depends().to_vec())
        };

        if let Some(module) = module {
            if let Err(source) = module.close() {
                log::warn!("cannot unload plugin '{}': {}", name, source);
                if let Some(record) = plugins.get_mut(name) {
                    record.state = LoadState::UnloadFailed;
                }
                return LoadState::UnloadFailed;
            }
        }

        for dep in &deps {
            if let Some(record) = plugins.get_mut(dep) {
                record.remove_used_by(name);
            }
        }
        if let Some(record) = plugins.get_mut(name) {
            record.state = LoadState::NotLoaded;
        }
        self.refresh_metadata(plugins, name);
        plugins.get(name).map_or(LoadState::NotLoaded, |r| r.state)
    }
}

impl Drop for PluginManager {
    /// Destroys instance bookkeeping, unloads every still-loaded dynamic
    /// plugin of this manager, and releases its records. Static records
    /// persist for the process lifetime and merely lose their manager
    /// association.
    fn drop(&mut self) {
        let mut plugins = registry::plugins();
        let owned: Vec<String> = plugins
            .iter()
            .filter(|(_, record)| record.manager == Some(self.id))
            .map(|(name, _)| name.clone())
            .collect();

        for name in &owned {
            if let Some(record) = plugins.get_mut(name) {
                if !record.instances.is_empty() {
                    log::warn!(
                        "destroying manager with {} live instance(s) of plugin '{}'",
                        record.instances.len(),
                        name
                    );
                    record.instances.clear();
                }
            }
        }

        // Unload leaves first so used-by never blocks; repeat until a pass
        // makes no progress.
        loop {
            let ready: Vec<String> = owned
                .iter()
                .filter(|name| {
                    plugins
                        .get(*name)
                        .map_or(false, |r| r.state == LoadState::LoadOk && r.used_by.is_empty())
                })
                .cloned()
                .collect();
            if ready.is_empty() {
                break;
            }
            let mut progress = false;
            for name in &ready {
                if self.unload_inner(&mut plugins, name).is_loaded() {
                    continue;
                }
                progress = true;
            }
            if !progress {
                break;
            }
        }

        // Whatever a dependency cycle or close failure kept loaded gets
        // force-closed.
        for name in &owned {
            let module = plugins.get_mut(name).and_then(|record| {
                if record.state == LoadState::LoadOk {
                    record.state = LoadState::NotLoaded;
                    record.instancer = None;
                    record.module.take()
                } else {
                    None
                }
            });
            if let Some(module) = module {
                log::warn!("force-closing module of plugin '{}'", name);
                if let Err(source) = module.close() {
                    log::warn!("force-closing module of plugin '{}' failed: {}", name, source);
                }
            }
        }

        let mut removed: HashSet<String> = HashSet::new();
        for name in &owned {
            let is_static = plugins
                .get(name)
                .map_or(false, |record| record.state == LoadState::IsStatic);
            if is_static {
                if let Some(record) = plugins.get_mut(name) {
                    record.manager = None;
                }
            } else {
                plugins.remove(name);
                removed.insert(name.clone());
            }
        }
        // Scrub dangling used-by references left by force-closed plugins.
        for record in plugins.values_mut() {
            record.used_by.retain(|name| !removed.contains(name));
        }
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("interface", &self.interface)
            .field("plugin_dir", &self.plugin_dir)
            .finish()
    }
}
