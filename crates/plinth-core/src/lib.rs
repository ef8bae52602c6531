//! # Plinth Core
//!
//! Core of the Plinth utility library. Two subsystems share this crate:
//!
//! - [`config`] — a parser/serializer for a line-based hierarchical
//!   configuration format with byte-exact round-trip preservation of
//!   unmodified files, plus typed value conversion.
//! - [`plugin_system`] — a plugin manager that discovers plugins through
//!   configuration metadata files, loads and unloads dynamic modules, and
//!   tracks dependencies, dependents and live instances.
//!
//! Both subsystems are synchronous and single-threaded by design; embedders
//! that need concurrent access must serialize calls externally.

pub mod config;
pub mod plugin_system;
pub mod utils;

pub use config::{Configuration, ConfigurationFlags, ConfigurationGroup, ConfigurationValue, ValueFlags};
pub use plugin_system::{LoadState, PluginManager, PluginMetadata, PLUGIN_VERSION};
