//! Hierarchical key/value settings with nested scopes.
//!
//! The trace tree persists its shape through [`SettingsStore`], which only needs to open and
//! close nested scopes and read and write scalar values in the current scope. Scopes should be
//! opened through [`ScopedGroup`], which closes them again when dropped.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// Key holding the number of children persisted in a scope.
pub const ITEMS_KEY: &str = "items";
/// Key holding the name of a persisted trace.
pub const TRACE_KEY: &str = "trace";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Int(i64),
    String(String),
}

pub trait SettingsStore {
    /// Enters the nested scope `name` of the current scope.
    fn begin_group(&mut self, name: &str);

    /// Leaves the innermost scope opened with [`begin_group`](Self::begin_group).
    fn end_group(&mut self);

    /// Whether `key` is present in the current scope.
    fn contains(&self, key: &str) -> bool;

    fn value(&self, key: &str) -> Option<SettingValue>;

    fn set_value(&mut self, key: &str, value: SettingValue);

    /// Names of the nested scopes in the current scope.
    fn child_groups(&self) -> Vec<String>;

    fn int_value(&self, key: &str) -> Option<i64> {
        match self.value(key)? {
            SettingValue::Int(value) => Some(value),
            SettingValue::String(value) => value.trim().parse().ok(),
        }
    }

    fn string_value(&self, key: &str) -> Option<String> {
        match self.value(key)? {
            SettingValue::String(value) => Some(value),
            SettingValue::Int(value) => Some(value.to_string()),
        }
    }

    fn set_int(&mut self, key: &str, value: i64) {
        self.set_value(key, SettingValue::Int(value));
    }

    fn set_string(&mut self, key: &str, value: &str) {
        self.set_value(key, SettingValue::String(value.to_owned()));
    }
}

/// A settings scope that stays open for as long as the guard lives.
pub struct ScopedGroup<'a, S: SettingsStore + ?Sized> {
    settings: &'a mut S,
}

impl<'a, S: SettingsStore + ?Sized> ScopedGroup<'a, S> {
    pub fn new(settings: &'a mut S, name: &str) -> Self {
        settings.begin_group(name);
        Self { settings }
    }
}

impl<S: SettingsStore + ?Sized> Deref for ScopedGroup<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.settings
    }
}

impl<S: SettingsStore + ?Sized> DerefMut for ScopedGroup<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.settings
    }
}

impl<S: SettingsStore + ?Sized> Drop for ScopedGroup<'_, S> {
    fn drop(&mut self) {
        self.settings.end_group();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum Entry {
    Value(SettingValue),
    Group(BTreeMap<String, Entry>),
    /// Anything else found in a loaded file. Kept for saving, but reads as absent.
    Other(serde_json::Value),
}

/// In-memory settings, serializable to JSON.
///
/// Scopes are created lazily: opening a scope that doesn't exist reads as empty, and the scope
/// only appears once something is written into it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemorySettings {
    root: BTreeMap<String, Entry>,
    path: Vec<String>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let root = serde_json::from_str(json).context("error parsing settings")?;
        Ok(Self {
            root,
            path: Vec::new(),
        })
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(&self.root).context("error serializing settings")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("error reading {path:?}"))?;
        let settings = Self::from_json(&json).with_context(|| format!("error loading {path:?}"))?;
        debug!("loaded settings from {path:?}");
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("error creating {parent:?}"))?;
        }
        std::fs::write(path, self.to_json()?).with_context(|| format!("error writing {path:?}"))?;
        debug!("saved settings to {path:?}");
        Ok(())
    }

    /// Number of scopes currently open.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Drops every key in the current scope.
    pub fn clear(&mut self) {
        if self.path.is_empty() {
            self.root.clear();
        } else if let Some(Entry::Group(group)) = self.current_entry_mut() {
            group.clear();
        }
    }

    fn current(&self) -> Option<&BTreeMap<String, Entry>> {
        let mut group = &self.root;
        for name in &self.path {
            match group.get(name)? {
                Entry::Group(inner) => group = inner,
                Entry::Value(_) | Entry::Other(_) => return None,
            }
        }
        Some(group)
    }

    fn current_entry_mut(&mut self) -> Option<&mut Entry> {
        let (last, parents) = self.path.split_last()?;
        let mut group = &mut self.root;
        for name in parents {
            match group.get_mut(name)? {
                Entry::Group(inner) => group = inner,
                Entry::Value(_) | Entry::Other(_) => return None,
            }
        }
        group.get_mut(last)
    }

    fn current_mut(&mut self) -> &mut BTreeMap<String, Entry> {
        let mut group = &mut self.root;
        for name in &self.path {
            let entry = group
                .entry(name.clone())
                .or_insert_with(|| Entry::Group(BTreeMap::new()));
            if !matches!(entry, Entry::Group(_)) {
                *entry = Entry::Group(BTreeMap::new());
            }
            group = match entry {
                Entry::Group(inner) => inner,
                Entry::Value(_) | Entry::Other(_) => unreachable!(),
            };
        }
        group
    }
}

impl SettingsStore for MemorySettings {
    fn begin_group(&mut self, name: &str) {
        self.path.push(name.to_owned());
    }

    fn end_group(&mut self) {
        let popped = self.path.pop();
        debug_assert!(popped.is_some(), "end_group() without a matching begin_group()");
    }

    fn contains(&self, key: &str) -> bool {
        self.current().is_some_and(|group| group.contains_key(key))
    }

    fn value(&self, key: &str) -> Option<SettingValue> {
        match self.current()?.get(key)? {
            Entry::Value(value) => Some(value.clone()),
            Entry::Group(_) | Entry::Other(_) => None,
        }
    }

    fn set_value(&mut self, key: &str, value: SettingValue) {
        self.current_mut().insert(key.to_owned(), Entry::Value(value));
    }

    fn child_groups(&self) -> Vec<String> {
        let Some(group) = self.current() else {
            return Vec::new();
        };
        group
            .iter()
            .filter(|(_, entry)| matches!(entry, Entry::Group(_)))
            .map(|(name, _)| name.clone())
            .collect()
    }
}
