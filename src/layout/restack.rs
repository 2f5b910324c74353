//! Vertical packing of sibling items.

use super::tree::{NodeKey, TraceTree};
use super::{center_line, ExtentChange, TraceItem};

impl<T: TraceItem> TraceTree<T> {
    /// Stacks the children of `owner` top to bottom without overlap.
    ///
    /// Children are ordered by their current center line, keeping the child order for equal
    /// centers. Children without extents are left alone. Disabled children take no space and
    /// park right below the previous enabled child, where they would reappear if re-enabled.
    /// Dragged children keep their offset but still take up their space in the stack.
    pub fn restack_items(&mut self, owner: NodeKey) {
        let mut items: Vec<(NodeKey, i32)> = self
            .tree_child_items(owner)
            .into_iter()
            .map(|key| (key, center_line(self.layout_v_offset(key), self.v_extents(key))))
            .collect();

        // Stable, so equal centers keep the child order.
        items.sort_by_key(|&(_, center)| center);

        let mut total_offset = 0;
        for (key, _) in items {
            let (top, bottom) = self.v_extents(key);
            if top == 0 && bottom == 0 {
                trace!("skipping {key:?} without extents");
                continue;
            }

            let enabled = self.enabled(key);
            if enabled {
                total_offset += -top;
            }

            if !self.dragging(key) {
                trace!("placing {key:?} at {total_offset}");
                self.set_layout_v_offset(key, total_offset);
            }

            if enabled {
                total_offset += bottom;
            }
        }
    }

    /// Restacks every owner in the tree, deepest first.
    ///
    /// Nested groups get packed before their owners measure them.
    pub fn restack_all(&mut self) {
        for key in self.owners_deepest_first(|_| true) {
            self.restack_items(key);
            self.nodes[key].layout_dirty = false;
        }
    }

    /// Restacks the owners whose children changed extents since they were last restacked,
    /// deepest first, and takes the changes that reached the view.
    pub fn restack_pending(&mut self) -> ExtentChange {
        let dirty = self.owners_deepest_first(|node| node.layout_dirty);
        if !dirty.is_empty() {
            debug!("restacking {} owners", dirty.len());
        }

        for key in dirty {
            self.restack_items(key);
            self.nodes[key].layout_dirty = false;
        }

        std::mem::take(&mut self.pending)
    }

    fn owners_deepest_first(
        &self,
        mut filter: impl FnMut(&super::tree::Node<T>) -> bool,
    ) -> Vec<NodeKey> {
        let mut owners: Vec<(usize, NodeKey)> = self
            .nodes
            .iter()
            .filter(|&(key, node)| !node.children.is_empty() && filter(node) && self.is_owner(key))
            .map(|(key, _)| (self.depth(key), key))
            .collect();
        owners.sort_by(|a, b| b.0.cmp(&a.0));
        owners.into_iter().map(|(_, key)| key).collect()
    }
}
