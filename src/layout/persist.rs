//! Saving and restoring the shape of the trace tree.
//!
//! Each owner is written as a scope holding one numbered sub-scope per child (`"0"`, `"1"`,
//! ...) and the number of children under `"items"`. A group child is written the same way
//! recursively; an item child writes its name under `"trace"`:
//!
//! ```text
//! items = 2
//! 0/trace = "CLK"
//! 1/items = 2
//! 1/0/trace = "D0"
//! 1/1/trace = "D1"
//! ```

use std::collections::HashMap;

use super::tree::{NodeData, NodeKey, TraceTree};
use super::TraceItem;
use crate::settings::{ScopedGroup, SettingsStore, ITEMS_KEY, TRACE_KEY};

impl<T: TraceItem> TraceTree<T> {
    /// Writes the children of `owner` into the current scope of `settings`.
    pub fn save_tree(&self, owner: NodeKey, settings: &mut dyn SettingsStore) {
        let children = self.tree_child_items(owner);
        for (idx, &child) in children.iter().enumerate() {
            let mut group = ScopedGroup::new(&mut *settings, &idx.to_string());
            self.save_node(child, &mut *group);
        }
        settings.set_int(ITEMS_KEY, children.len() as i64);
    }

    fn save_node(&self, key: NodeKey, settings: &mut dyn SettingsStore) {
        match &self.nodes[key].data {
            NodeData::Item(item) => item.save(settings),
            NodeData::View | NodeData::Group(_) => self.save_tree(key, settings),
        }
    }

    /// Rebuilds the children of `owner` from the current scope of `settings`.
    ///
    /// Persisted traces are matched to live items through `items`. Entries that can't be
    /// matched are skipped, and so are groups that end up empty. `owner` is restacked
    /// afterwards.
    pub fn restore_tree(
        &mut self,
        owner: NodeKey,
        settings: &mut dyn SettingsStore,
        items: &HashMap<String, NodeKey>,
    ) {
        let count = match settings.int_value(ITEMS_KEY) {
            Some(count) if count >= 0 => count,
            Some(count) => {
                warn!("ignoring negative item count {count}");
                0
            }
            None => {
                if settings.contains(ITEMS_KEY) {
                    warn!("ignoring item count that is not a number");
                }
                0
            }
        };

        // Only walk the numbered scopes that exist, the count alone can't be trusted.
        let mut indices: Vec<i64> = settings
            .child_groups()
            .iter()
            .filter_map(|name| name.parse::<i64>().ok().filter(|idx| idx.to_string() == *name))
            .filter(|idx| (0..count).contains(idx))
            .collect();
        indices.sort_unstable();
        if indices.len() as i64 != count {
            warn!("item count is {count} but {} entries are stored", indices.len());
        }

        for idx in indices {
            let mut group = ScopedGroup::new(&mut *settings, &idx.to_string());

            if group.contains(ITEMS_KEY) {
                let new_group = self.new_group();
                self.restore_tree(new_group, &mut *group, items);

                if self.child_items(new_group).is_empty() {
                    debug!("dropping empty group at index {idx}");
                    self.discard_group(new_group);
                } else {
                    self.add_child_item(owner, new_group);
                }
            } else if let Some(name) = group.string_value(TRACE_KEY) {
                let Some(&key) = items.get(&name) else {
                    debug!("skipping trace {name:?} which no longer exists");
                    continue;
                };
                if self.item(key).is_none() {
                    warn!("skipping trace {name:?} which doesn't map to an item");
                    continue;
                }
                if let Some(current) = self.owner(key) {
                    warn!("skipping trace {name:?} which is already owned by {current:?}");
                    continue;
                }
                if self.is_in_subtree(owner, key) {
                    warn!("skipping trace {name:?} which would end up inside itself");
                    continue;
                }

                self.add_child_item(owner, key);
                if let Some(item) = self.item_mut(key) {
                    item.restore(&*group);
                }
                if self.is_owner(key) {
                    self.restore_tree(key, &mut *group, items);
                }
            } else {
                debug!("skipping unrecognized entry at index {idx}");
            }
        }

        self.restack_items(owner);
    }
}
