//! Trace tree storage and ownership.
//!
//! All nodes live in a SlotMap owned by the tree. The owning edge is the ordered `children` list
//! of the owner; each node points back at its owner through a plain key, which doesn't keep
//! anything alive.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::Serialize;
use slotmap::{new_key_type, SlotMap};

use super::{ExtentChange, TraceItem};

// ============================================================================
// SlotMap Key Types
// ============================================================================

new_key_type! {
    /// Key to reference a node in the trace tree
    pub struct NodeKey;
}

// ============================================================================
// Node Types
// ============================================================================

/// Node type in the trace tree
#[derive(Debug)]
pub(super) enum NodeData<T> {
    /// The view at the root of the tree
    View,
    /// Group of nested items
    Group(GroupData),
    /// Item supplied by the caller
    Item(T),
}

#[derive(Debug, Default)]
pub(super) struct GroupData {
    /// Set by the input handling while the group is being dragged.
    pub(super) dragging: bool,
}

#[derive(Debug)]
pub(super) struct Node<T> {
    /// Owner of this node, `None` while detached.
    pub(super) owner: Option<NodeKey>,
    /// Owned nodes, in paint and persistence order.
    pub(super) children: Vec<NodeKey>,
    pub(super) layout_v_offset: i32,
    /// Set when the vertical extents of the children changed since the last restack.
    pub(super) layout_dirty: bool,
    pub(super) data: NodeData<T>,
}

impl<T> Node<T> {
    fn new(data: NodeData<T>) -> Self {
        Self {
            owner: None,
            children: Vec::new(),
            layout_v_offset: 0,
            layout_dirty: false,
            data,
        }
    }
}

/// Serializable snapshot of a node and its subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutNode {
    pub kind: LayoutNodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub offset: i32,
    pub extents: (i32, i32),
    pub enabled: bool,
    pub dragging: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LayoutNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutNodeKind {
    View,
    Group,
    Trace,
}

/// Tree of traces and groups rooted at a view.
#[derive(Debug)]
pub struct TraceTree<T> {
    /// SlotMap storing all nodes, attached or not
    pub(super) nodes: SlotMap<NodeKey, Node<T>>,
    /// The view
    pub(super) root: NodeKey,
    /// Items in registration order
    pub(super) items: Vec<NodeKey>,
    /// Extent changes that reached the view since they were last taken
    pub(super) pending: ExtentChange,
}

impl<T> Default for TraceTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Node registration
// ============================================================================

impl<T> TraceTree<T> {
    /// Create a tree holding just the view
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new(NodeData::View));
        Self {
            nodes,
            root,
            items: Vec::new(),
            pending: ExtentChange::empty(),
        }
    }

    /// Key of the view at the root of the tree
    pub fn root(&self) -> NodeKey {
        self.root
    }

    /// Registers an item with the tree. The item starts out detached.
    pub fn insert_item(&mut self, item: T) -> NodeKey {
        let key = self.nodes.insert(Node::new(NodeData::Item(item)));
        self.items.push(key);
        key
    }

    /// Unregisters a detached item and hands it back.
    ///
    /// Returns `None` if `key` doesn't refer to an item.
    pub fn take_item(&mut self, key: NodeKey) -> Option<T> {
        let node = self.nodes.get(key)?;
        if !matches!(node.data, NodeData::Item(_)) {
            return None;
        }
        assert!(node.owner.is_none(), "{key:?} must be detached before it is taken");
        assert!(
            node.children.is_empty(),
            "{key:?} must not own items when it is taken"
        );

        self.items.retain(|k| *k != key);
        match self.nodes.remove(key)?.data {
            NodeData::Item(item) => Some(item),
            _ => None,
        }
    }

    /// Creates a new, empty and detached group.
    pub fn new_group(&mut self) -> NodeKey {
        self.nodes
            .insert(Node::new(NodeData::Group(GroupData::default())))
    }

    /// Drops a detached group, detaching its children.
    pub fn discard_group(&mut self, key: NodeKey) {
        let node = &self.nodes[key];
        assert!(matches!(node.data, NodeData::Group(_)), "{key:?} is not a group");
        assert!(node.owner.is_none(), "{key:?} must be detached before it is discarded");

        self.clear_child_items(key);
        self.nodes.remove(key);
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn item(&self, key: NodeKey) -> Option<&T> {
        match &self.nodes.get(key)?.data {
            NodeData::Item(item) => Some(item),
            _ => None,
        }
    }

    /// Mutable access to an item.
    ///
    /// If the change affects the item's extents, follow up with
    /// [`extents_changed`](Self::extents_changed) on its owner.
    pub fn item_mut(&mut self, key: NodeKey) -> Option<&mut T> {
        match &mut self.nodes.get_mut(key)?.data {
            NodeData::Item(item) => Some(item),
            _ => None,
        }
    }

    pub fn is_group(&self, key: NodeKey) -> bool {
        matches!(self.nodes[key].data, NodeData::Group(_))
    }

    pub fn owner(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes[key].owner
    }

    pub fn layout_v_offset(&self, key: NodeKey) -> i32 {
        self.nodes[key].layout_v_offset
    }

    /// Moves a node within its owner, e.g. while it is being dragged.
    pub fn set_layout_v_offset(&mut self, key: NodeKey, offset: i32) {
        self.nodes[key].layout_v_offset = offset;
    }

    /// Marks a group as being dragged, which keeps restacking from moving it.
    pub fn set_group_dragging(&mut self, key: NodeKey, dragging: bool) {
        match &mut self.nodes[key].data {
            NodeData::Group(group) => group.dragging = dragging,
            _ => panic!("{key:?} is not a group"),
        }
    }

    /// Number of owners above the node.
    pub fn depth(&self, key: NodeKey) -> usize {
        let mut depth = 0;
        let mut current = self.nodes[key].owner;
        while let Some(owner) = current {
            depth += 1;
            current = self.nodes[owner].owner;
        }
        depth
    }

    /// Offset of the node in the coordinates of the outermost owner.
    pub fn absolute_v_offset(&self, key: NodeKey) -> i32 {
        let mut offset = self.nodes[key].layout_v_offset;
        let mut current = self.nodes[key].owner;
        while let Some(owner) = current {
            offset += self.nodes[owner].layout_v_offset;
            current = self.nodes[owner].owner;
        }
        offset
    }

    /// Registered items that currently have no owner, in registration order.
    pub fn unplaced_items(&self) -> Vec<NodeKey> {
        self.items
            .iter()
            .copied()
            .filter(|key| self.nodes[*key].owner.is_none())
            .collect()
    }

    pub(super) fn is_in_subtree(&self, key: NodeKey, subtree: NodeKey) -> bool {
        let mut current = Some(key);
        while let Some(node) = current {
            if node == subtree {
                return true;
            }
            current = self.nodes[node].owner;
        }
        false
    }

    // ========================================================================
    // Ownership
    // ========================================================================

    /// Owned children of `owner`, in order.
    pub fn child_items(&self, owner: NodeKey) -> &[NodeKey] {
        &self.nodes[owner].children
    }

    /// Owned children of `owner`, checked to be live nodes that point back at `owner`.
    pub fn tree_child_items(&self, owner: NodeKey) -> Vec<NodeKey> {
        let children = &self.nodes[owner].children;
        for child in children {
            debug_assert!(
                self.nodes
                    .get(*child)
                    .is_some_and(|node| node.owner == Some(owner)),
                "{owner:?} holds {child:?} which is not a trace tree item it owns"
            );
        }
        children.clone()
    }

    /// Detaches every child of `owner` at once.
    pub fn clear_child_items(&mut self, owner: NodeKey) {
        let children = std::mem::take(&mut self.nodes[owner].children);
        for child in children {
            let node = &mut self.nodes[child];
            debug_assert_eq!(node.owner, Some(owner));
            node.owner = None;
        }
    }

    /// Detaches every node and drops every group, leaving all items registered and unowned.
    pub fn dissolve_groups(&mut self) {
        for node in self.nodes.values_mut() {
            node.owner = None;
            node.children.clear();
            node.layout_dirty = false;
        }
        self.nodes
            .retain(|_, node| !matches!(node.data, NodeData::Group(_)));

        self.nodes[self.root].layout_dirty = true;
        self.pending |= ExtentChange::all();
        debug!("dissolved all groups");
    }

    /// Reports that the extents of `key` changed.
    ///
    /// Every owner from `key` up to the outermost one is marked for restacking on a vertical
    /// change; changes reaching the view are accumulated until
    /// [`restack_pending`](Self::restack_pending) takes them.
    pub fn extents_changed(&mut self, key: NodeKey, change: ExtentChange) {
        let mut current = Some(key);
        while let Some(key) = current {
            let node = &mut self.nodes[key];
            if change.contains(ExtentChange::VERTICAL) && !node.children.is_empty() {
                node.layout_dirty = true;
            }
            if matches!(node.data, NodeData::View) {
                self.pending |= change;
            }
            current = node.owner;
        }
    }

    /// Extent changes that reached the view and were not yet taken.
    pub fn pending_extent_changes(&self) -> ExtentChange {
        self.pending
    }
}

impl<T: TraceItem> TraceTree<T> {
    /// Whether the node can own child items.
    pub fn is_owner(&self, key: NodeKey) -> bool {
        match &self.nodes[key].data {
            NodeData::View | NodeData::Group(_) => true,
            NodeData::Item(item) => item.accepts_children(),
        }
    }

    /// Attaches a detached node at the end of `owner`'s children.
    ///
    /// # Panics
    ///
    /// Panics if `item` already has an owner, if `item` is the view, if `owner` can't own
    /// items, or if `owner` lies inside `item`'s subtree.
    pub fn add_child_item(&mut self, owner: NodeKey, item: NodeKey) {
        assert!(item != self.root, "the view can't be owned");
        assert!(self.is_owner(owner), "{owner:?} can't own items");
        assert!(
            self.nodes[item].owner.is_none(),
            "{item:?} already has an owner"
        );
        assert!(
            !self.is_in_subtree(owner, item),
            "adding {item:?} to {owner:?} would create a cycle"
        );

        self.nodes[item].owner = Some(owner);
        self.nodes[owner].children.push(item);
        trace!("added {item:?} to {owner:?}");

        self.extents_changed(owner, ExtentChange::all());
    }

    /// Detaches `item` from `owner`.
    ///
    /// # Panics
    ///
    /// Panics if `item` is not owned by `owner`.
    pub fn remove_child_item(&mut self, owner: NodeKey, item: NodeKey) {
        assert_eq!(
            self.nodes[item].owner,
            Some(owner),
            "{item:?} is not owned by {owner:?}"
        );

        self.nodes[item].owner = None;
        let children = &mut self.nodes[owner].children;
        let idx = children
            .iter()
            .position(|child| *child == item)
            .expect("owned item must be among its owner's children");
        children.remove(idx);
        trace!("removed {item:?} from {owner:?}");

        self.extents_changed(owner, ExtentChange::all());
    }

    /// Detaches and drops attached groups that have no children left, including owners that
    /// become empty in the process. Returns how many groups were dropped.
    pub fn prune_empty_groups(&mut self) -> usize {
        let mut pruned = 0;
        loop {
            let empty: Vec<NodeKey> = self
                .nodes
                .iter()
                .filter(|(_, node)| {
                    matches!(node.data, NodeData::Group(_))
                        && node.children.is_empty()
                        && node.owner.is_some()
                })
                .map(|(key, _)| key)
                .collect();
            if empty.is_empty() {
                return pruned;
            }

            for key in empty {
                if let Some(owner) = self.nodes[key].owner {
                    self.remove_child_item(owner, key);
                }
                self.discard_group(key);
                pruned += 1;
            }
        }
    }

    pub fn enabled(&self, key: NodeKey) -> bool {
        let node = &self.nodes[key];
        match &node.data {
            NodeData::View => true,
            NodeData::Group(_) => node.children.iter().any(|child| self.enabled(*child)),
            NodeData::Item(item) => item.enabled(),
        }
    }

    pub fn dragging(&self, key: NodeKey) -> bool {
        match &self.nodes[key].data {
            NodeData::View => false,
            NodeData::Group(group) => group.dragging,
            NodeData::Item(item) => item.dragging(),
        }
    }

    /// Vertical extents of a node relative to its own layout offset.
    pub fn v_extents(&self, key: NodeKey) -> (i32, i32) {
        match &self.nodes[key].data {
            NodeData::View | NodeData::Group(_) => self.owner_v_extents(key),
            NodeData::Item(item) => item.v_extents(),
        }
    }

    /// Union of the extents of the enabled children of `owner`, each shifted by its offset.
    ///
    /// `(0, 0)` if no child is enabled.
    pub fn owner_v_extents(&self, owner: NodeKey) -> (i32, i32) {
        let mut extents: Option<(i32, i32)> = None;
        for &child in &self.nodes[owner].children {
            if !self.enabled(child) {
                continue;
            }

            let offset = self.nodes[child].layout_v_offset;
            let (top, bottom) = self.v_extents(child);
            let (top, bottom) = (top + offset, bottom + offset);
            extents = Some(match extents {
                Some((min, max)) => (min.min(top), max.max(bottom)),
                None => (top, bottom),
            });
        }
        extents.unwrap_or((0, 0))
    }

    /// Items below `owner` that don't own anything themselves (depth-first traversal).
    pub fn leaf_items(&self, owner: NodeKey) -> Vec<NodeKey> {
        let mut leaves = Vec::new();
        self.collect_leaf_items(owner, &mut leaves);
        leaves
    }

    /// Helper: collect leaves from a node
    fn collect_leaf_items(&self, owner: NodeKey, leaves: &mut Vec<NodeKey>) {
        for &child in &self.nodes[owner].children {
            if self.is_owner(child) {
                self.collect_leaf_items(child, leaves);
            } else {
                leaves.push(child);
            }
        }
    }

    /// Map from name to key over all registered items, attached or not.
    ///
    /// If several items share a name, the first registered one wins.
    pub fn items_by_name(&self) -> HashMap<String, NodeKey> {
        let mut map = HashMap::with_capacity(self.items.len());
        for &key in &self.items {
            let Some(item) = self.item(key) else {
                continue;
            };
            let name = item.name();
            if map.contains_key(name) {
                warn!("duplicate trace name {name:?}, keeping the first one");
                continue;
            }
            map.insert(name.to_owned(), key);
        }
        map
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn layout_tree(&self) -> LayoutNode {
        self.build_layout_node(self.root)
    }

    fn build_layout_node(&self, key: NodeKey) -> LayoutNode {
        let node = &self.nodes[key];
        let (kind, name) = match &node.data {
            NodeData::View => (LayoutNodeKind::View, None),
            NodeData::Group(_) => (LayoutNodeKind::Group, None),
            NodeData::Item(item) => (LayoutNodeKind::Trace, Some(item.name().to_owned())),
        };
        LayoutNode {
            kind,
            name,
            offset: node.layout_v_offset,
            extents: self.v_extents(key),
            enabled: self.enabled(key),
            dragging: self.dragging(key),
            children: node
                .children
                .iter()
                .map(|child| self.build_layout_node(*child))
                .collect(),
        }
    }

    /// Text rendering of the tree, one node per line.
    ///
    /// Each line shows the layout offset and the extents of the node, followed by `(off)` for
    /// disabled nodes and `(dragging)` for dragged ones.
    pub fn debug_tree(&self) -> String {
        let mut out = String::new();
        self.debug_tree_node(self.root, 0, &mut out);
        out
    }

    fn debug_tree_node(&self, key: NodeKey, level: usize, out: &mut String) {
        let indent = "  ".repeat(level);
        let node = &self.nodes[key];
        let (top, bottom) = self.v_extents(key);

        let _ = match &node.data {
            NodeData::View => write!(out, "{indent}View"),
            NodeData::Group(_) => write!(out, "{indent}Group"),
            NodeData::Item(item) => write!(out, "{indent}Trace {}", item.name()),
        };
        let _ = write!(out, " @{} [{top}, {bottom}]", node.layout_v_offset);
        if !self.enabled(key) {
            out.push_str(" (off)");
        }
        if self.dragging(key) {
            out.push_str(" (dragging)");
        }
        out.push('\n');

        for child in &node.children {
            self.debug_tree_node(*child, level + 1, out);
        }
    }
}
