//! Groups and items of a configuration tree.
//!
//! A [`ConfigurationGroup`] owns an ordered run of [`Item`]s (key-value
//! pairs interleaved with verbatim comment and blank lines) followed by its
//! child groups. The owning [`Configuration`](crate::config::Configuration)
//! holds every group through this tree; groups carry no parent pointers,
//! only a shared handle onto the document-wide state so that mutators can
//! check read-only, validity and uniqueness rules locally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::value::{ConfigurationValue, ValueFlags};
use crate::config::ConfigurationFlags;

/// Document-wide state shared between a `Configuration` and every group it
/// owns.
#[derive(Debug)]
pub(crate) struct ConfigState {
    pub read_only: bool,
    pub unique_groups: bool,
    pub unique_keys: bool,
    pub valid: AtomicBool,
    pub auto_groups: AtomicBool,
    pub auto_keys: AtomicBool,
}

impl ConfigState {
    pub(crate) fn new(flags: ConfigurationFlags) -> Self {
        Self {
            read_only: flags.contains(ConfigurationFlags::READ_ONLY),
            unique_groups: flags.contains(ConfigurationFlags::UNIQUE_GROUPS),
            unique_keys: flags.contains(ConfigurationFlags::UNIQUE_KEYS),
            valid: AtomicBool::new(true),
            auto_groups: AtomicBool::new(false),
            auto_keys: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Relaxed)
    }

    pub(crate) fn can_modify(&self) -> bool {
        self.is_valid() && !self.read_only
    }
}

/// One line of a group's body.
///
/// Comment and blank lines keep their raw text so that an unmodified
/// document serializes back byte-for-byte. Key-value pairs keep the
/// whitespace runs around `=` and the value in its serialized form.
#[derive(Debug, Clone)]
pub(crate) enum Item {
    /// Raw comment line, including leading whitespace and the `#`/`;`.
    Comment(String),
    /// Raw blank line (may consist of whitespace).
    Blank(String),
    KeyValue {
        key: String,
        /// Serialized value text; quotes included when quoted.
        value: String,
        /// Whitespace between the key and `=`.
        pre: String,
        /// Whitespace between `=` and the value.
        post: String,
    },
}

/// A named, ordered container of items and child groups.
pub struct ConfigurationGroup {
    name: String,
    pub(crate) items: Vec<Item>,
    pub(crate) children: Vec<ConfigurationGroup>,
    pub(crate) state: Arc<ConfigState>,
}

fn valid_group_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/')
}

fn valid_key(key: &str) -> bool {
    !key.is_empty() && !key.contains('/') && !key.chars().any(char::is_whitespace)
}

impl ConfigurationGroup {
    pub(crate) fn new(name: String, state: Arc<ConfigState>) -> Self {
        Self {
            name,
            items: Vec::new(),
            children: Vec::new(),
            state,
        }
    }

    /// Group name; empty for the root group.
    pub fn name(&self) -> &str {
        &self.name
    }

    // --- group queries ---

    /// Number of direct child groups.
    pub fn group_count(&self) -> usize {
        self.children.len()
    }

    /// Number of direct child groups with the given name.
    pub fn group_count_of(&self, name: &str) -> usize {
        self.children.iter().filter(|g| g.name == name).count()
    }

    pub fn group_exists(&self, name: &str) -> bool {
        self.children.iter().any(|g| g.name == name)
    }

    /// First child group with the given name.
    pub fn group(&self, name: &str) -> Option<&ConfigurationGroup> {
        self.group_at(name, 0)
    }

    /// `index`-th child group with the given name, counting occurrences in
    /// document order.
    pub fn group_at(&self, name: &str, index: usize) -> Option<&ConfigurationGroup> {
        self.children.iter().filter(|g| g.name == name).nth(index)
    }

    /// All child groups with the given name, in document order.
    pub fn groups(&self, name: &str) -> Vec<&ConfigurationGroup> {
        self.children.iter().filter(|g| g.name == name).collect()
    }

    /// First child group with the given name, mutable. With automatic group
    /// creation enabled a missing group is materialized.
    pub fn group_mut(&mut self, name: &str) -> Option<&mut ConfigurationGroup> {
        let missing = !self.group_exists(name);
        if missing {
            if !(self.state.auto_groups.load(Ordering::Relaxed) && valid_group_name(name)) {
                return None;
            }
            let state = self.state.clone();
            if !state.can_modify() {
                return None;
            }
            self.children.push(ConfigurationGroup::new(name.to_string(), state));
        }
        self.group_mut_at(name, 0)
    }

    /// `index`-th child group with the given name, mutable. Never creates.
    pub fn group_mut_at(&mut self, name: &str, index: usize) -> Option<&mut ConfigurationGroup> {
        self.children.iter_mut().filter(|g| g.name == name).nth(index)
    }

    // --- group mutators ---

    /// Append a child group, returning it for further population. Fails on
    /// a read-only or invalid document, an invalid name, or a duplicate
    /// name under `UNIQUE_GROUPS`.
    pub fn add_group(&mut self, name: &str) -> Option<&mut ConfigurationGroup> {
        if !self.state.can_modify() || !valid_group_name(name) {
            return None;
        }
        if self.state.unique_groups && self.group_exists(name) {
            return None;
        }
        let state = self.state.clone();
        self.children.push(ConfigurationGroup::new(name.to_string(), state));
        self.children.last_mut()
    }

    /// Remove the `index`-th child group with the given name.
    pub fn remove_group(&mut self, name: &str, index: usize) -> bool {
        if !self.state.can_modify() {
            return false;
        }
        let position = self
            .children
            .iter()
            .enumerate()
            .filter(|(_, g)| g.name == name)
            .map(|(i, _)| i)
            .nth(index);
        match position {
            Some(i) => {
                self.children.remove(i);
                true
            }
            None => false,
        }
    }

    /// Remove every child group with the given name.
    pub fn remove_all_groups(&mut self, name: &str) -> bool {
        if !self.state.can_modify() {
            return false;
        }
        self.children.retain(|g| g.name != name);
        true
    }

    /// Remove all items and child groups.
    pub fn clear(&mut self) -> bool {
        if !self.state.can_modify() {
            return false;
        }
        self.items.clear();
        self.children.clear();
        true
    }

    // --- value queries ---

    pub fn key_exists(&self, key: &str) -> bool {
        self.raw(key, 0).is_some()
    }

    /// Number of key-value items with the given key.
    pub fn key_count(&self, key: &str) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, Item::KeyValue { key: k, .. } if k == key))
            .count()
    }

    /// Serialized text of the `index`-th occurrence of a key.
    pub fn raw(&self, key: &str, index: usize) -> Option<&str> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Item::KeyValue { key: k, value, .. } if k == key => Some(value.as_str()),
                _ => None,
            })
            .nth(index)
    }

    /// Typed read with an output parameter. Returns whether `out` was
    /// filled. With automatic key creation enabled, a missing key is
    /// appended with the serialized current content of `out` and the read
    /// reports success.
    pub fn value<T: ConfigurationValue>(
        &mut self,
        key: &str,
        out: &mut T,
        index: usize,
        flags: ValueFlags,
    ) -> bool {
        if let Some(raw) = self.raw(key, index) {
            return match T::from_conf(raw, flags) {
                Some(parsed) => {
                    *out = parsed;
                    true
                }
                None => false,
            };
        }
        if index == 0
            && self.state.auto_keys.load(Ordering::Relaxed)
            && self.state.can_modify()
            && valid_key(key)
        {
            let serialized = out.to_conf(flags);
            self.push_value(key, serialized);
            return true;
        }
        false
    }

    /// First occurrence of a key as `T`, or a default-constructed `T` when
    /// the key is missing or does not parse.
    pub fn get<T: ConfigurationValue>(&self, key: &str) -> T {
        self.get_with(key, 0, ValueFlags::empty())
    }

    /// Indexed, flagged variant of [`get`](Self::get).
    pub fn get_with<T: ConfigurationValue>(&self, key: &str, index: usize, flags: ValueFlags) -> T {
        self.raw(key, index)
            .and_then(|raw| T::from_conf(raw, flags))
            .unwrap_or_default()
    }

    /// Every occurrence of a key as `T`, in document order. Occurrences
    /// that do not parse are skipped.
    pub fn values<T: ConfigurationValue>(&self, key: &str) -> Vec<T> {
        self.values_with(key, ValueFlags::empty())
    }

    pub fn values_with<T: ConfigurationValue>(&self, key: &str, flags: ValueFlags) -> Vec<T> {
        self.items
            .iter()
            .filter_map(|item| match item {
                Item::KeyValue { key: k, value, .. } if k == key => T::from_conf(value, flags),
                _ => None,
            })
            .collect()
    }

    // --- value mutators ---

    /// Append a key-value pair. Fails on a duplicate key under
    /// `UNIQUE_KEYS`.
    pub fn add_value<T: ConfigurationValue>(&mut self, key: &str, value: &T, flags: ValueFlags) -> bool {
        if !self.state.can_modify() || !valid_key(key) {
            return false;
        }
        if self.state.unique_keys && self.key_exists(key) {
            return false;
        }
        self.push_value(key, value.to_conf(flags));
        true
    }

    /// Replace the `index`-th occurrence of a key; appends instead when the
    /// key is absent and `index` is 0.
    pub fn set_value<T: ConfigurationValue>(
        &mut self,
        key: &str,
        value: &T,
        index: usize,
        flags: ValueFlags,
    ) -> bool {
        if !self.state.can_modify() || !valid_key(key) {
            return false;
        }
        let mut seen = 0;
        for item in &mut self.items {
            if let Item::KeyValue { key: k, value: v, .. } = item {
                if k == key {
                    if seen == index {
                        *v = value.to_conf(flags);
                        return true;
                    }
                    seen += 1;
                }
            }
        }
        if index == 0 {
            self.push_value(key, value.to_conf(flags));
            return true;
        }
        false
    }

    /// Remove the `index`-th occurrence of a key.
    pub fn remove_value(&mut self, key: &str, index: usize) -> bool {
        if !self.state.can_modify() {
            return false;
        }
        let mut seen = 0;
        let position = self.items.iter().position(|item| {
            if let Item::KeyValue { key: k, .. } = item {
                if k == key {
                    if seen == index {
                        return true;
                    }
                    seen += 1;
                }
            }
            false
        });
        match position {
            Some(i) => {
                self.items.remove(i);
                true
            }
            None => false,
        }
    }

    /// Remove every occurrence of a key.
    pub fn remove_all_values(&mut self, key: &str) -> bool {
        if !self.state.can_modify() {
            return false;
        }
        self.items
            .retain(|item| !matches!(item, Item::KeyValue { key: k, .. } if k == key));
        true
    }

    // --- internal ---

    fn push_value(&mut self, key: &str, value: String) {
        self.items.push(Item::KeyValue {
            key: key.to_string(),
            value,
            pre: String::new(),
            post: String::new(),
        });
    }

    /// Serialize this group's body and all descendants. `path` is the full
    /// `/`-joined path of this group (empty for the root). Headers of
    /// groups that carry no items of their own but do carry children are
    /// omitted; their children spell out the full path instead.
    pub(crate) fn write_into(&self, out: &mut String, path: &str, eol: &str) {
        for item in &self.items {
            match item {
                Item::Comment(raw) | Item::Blank(raw) => out.push_str(raw),
                Item::KeyValue { key, value, pre, post } => {
                    out.push_str(key);
                    out.push_str(pre);
                    out.push('=');
                    out.push_str(post);
                    out.push_str(value);
                }
            }
            out.push_str(eol);
        }
        for child in &self.children {
            let child_path = if path.is_empty() {
                child.name.clone()
            } else {
                format!("{}/{}", path, child.name)
            };
            if !(child.items.is_empty() && !child.children.is_empty()) {
                out.push('[');
                out.push_str(&child_path);
                out.push(']');
                out.push_str(eol);
            }
            child.write_into(out, &child_path, eol);
        }
    }
}

impl std::fmt::Debug for ConfigurationGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationGroup")
            .field("name", &self.name)
            .field("items", &self.items.len())
            .field("groups", &self.children.len())
            .finish()
    }
}
