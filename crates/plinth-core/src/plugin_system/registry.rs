//! Process-wide plugin records and static plugin registration.
//!
//! Both stores are lazily initialized singletons: the record map is shared
//! by every manager in the process (this is what makes plugin names
//! globally unique across managers and origins), and the static queue
//! collects registrations performed before any manager exists. The queue is
//! drained into the record map the first time the map is accessed, which is
//! why embedders must finish all static registrations before constructing
//! the first manager.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::Lazy;

use crate::config::Configuration;
use crate::plugin_system::loader::{Instancer, Module};
use crate::plugin_system::metadata::PluginMetadata;
use crate::plugin_system::state::LoadState;
use crate::plugin_system::PLUGIN_VERSION;

/// Everything the process knows about one plugin name.
pub(crate) struct PluginRecord {
    pub state: LoadState,
    /// Interface identifier. Filled from the metadata file for dynamic
    /// plugins (may be empty until then), from the registration for static
    /// ones.
    pub interface: String,
    /// The metadata configuration file, kept for instances to read.
    pub configuration: Arc<Configuration>,
    pub metadata: Arc<PluginMetadata>,
    /// Id of the owning manager. `None` for static records imported before
    /// any manager with a matching interface existed.
    pub manager: Option<usize>,
    pub instancer: Option<Instancer>,
    /// Module handle; dynamic plugins only, present exactly in `LoadOk`.
    pub module: Option<Box<dyn Module>>,
    /// Names of loaded plugins depending on this one. Non-empty blocks
    /// unload.
    pub used_by: Vec<String>,
    /// Addresses of live instances. Non-empty blocks unload.
    pub instances: HashSet<usize>,
}

impl PluginRecord {
    pub(crate) fn add_used_by(&mut self, dependent: &str) {
        if !self.used_by.iter().any(|name| name == dependent) {
            self.used_by.push(dependent.to_string());
        }
    }

    pub(crate) fn remove_used_by(&mut self, dependent: &str) {
        self.used_by.retain(|name| name != dependent);
    }
}

/// A static plugin registration, queued by the registration hook until the
/// first manager drains it.
pub struct StaticPluginRegistration {
    pub name: &'static str,
    pub interface: &'static str,
    /// Must equal [`PLUGIN_VERSION`]; mismatching registrations are
    /// skipped.
    pub version: i32,
    pub instancer: Instancer,
    /// Metadata in configuration-file syntax, parsed as an in-memory
    /// read-only document.
    pub metadata: &'static str,
}

static STATIC_QUEUE: Lazy<Mutex<Vec<StaticPluginRegistration>>> = Lazy::new(|| Mutex::new(Vec::new()));

static PLUGINS: Lazy<Mutex<HashMap<String, PluginRecord>>> = Lazy::new(|| Mutex::new(HashMap::new()));

static NEXT_MANAGER_ID: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn next_manager_id() -> usize {
    NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Queue a static plugin. Must complete before the first manager is
/// constructed; the registration is merged into the record map when a
/// manager next reads it.
pub fn register_static_plugin(registration: StaticPluginRegistration) {
    lock(&STATIC_QUEUE).push(registration);
}

/// Lock the process-wide record map, draining any pending static
/// registrations first.
pub(crate) fn plugins() -> MutexGuard<'static, HashMap<String, PluginRecord>> {
    let mut plugins = lock(&PLUGINS);
    let queued: Vec<StaticPluginRegistration> = std::mem::take(&mut *lock(&STATIC_QUEUE));
    for registration in queued {
        if registration.version != PLUGIN_VERSION {
            log::warn!(
                "skipping static plugin '{}': built against manager version {} (expected {})",
                registration.name,
                registration.version,
                PLUGIN_VERSION
            );
            continue;
        }
        if plugins.contains_key(registration.name) {
            log::warn!("skipping duplicate static plugin '{}'", registration.name);
            continue;
        }
        let configuration = Arc::new(Configuration::from_text(registration.metadata));
        let metadata = Arc::new(PluginMetadata::from_configuration(&configuration));
        plugins.insert(
            registration.name.to_string(),
            PluginRecord {
                state: LoadState::IsStatic,
                interface: registration.interface.to_string(),
                configuration,
                metadata,
                manager: None,
                instancer: Some(registration.instancer),
                module: None,
                used_by: Vec::new(),
                instances: HashSet::new(),
            },
        );
    }
    plugins
}

/// Mutex poisoning only happens after a panic in another test thread; the
/// registry data itself stays consistent, so keep going with it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
