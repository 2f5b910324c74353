//! Trace tree layout.
//!
//! A view shows its traces stacked vertically. Traces can be nested into groups, which are
//! themselves stacked like traces. The whole hierarchy lives in a [`TraceTree`]:
//!
//! - Every node has at most one owner, and appears exactly once in that owner's children.
//! - Owners are the view (the root), groups, and items that opt into owning children.
//! - Extents are never cached; they are recomputed from the current offsets on every query.
//! - Restacking packs the enabled children of an owner top to bottom, ordered by their
//!   current centers, so that dragging a trace past another one reorders them.
//!
//! The shape of the tree (grouping and order) is persisted to a [`SettingsStore`] and can be
//! restored onto a fresh set of items, matching them up by name.

use bitflags::bitflags;

use crate::settings::{SettingsStore, TRACE_KEY};

mod persist;
mod restack;
mod tree;

pub use tree::{LayoutNode, LayoutNodeKind, NodeKey, TraceTree};


bitflags! {
    /// Which extents of an owner changed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ExtentChange : u8 {
        const HORIZONTAL = 1;
        const VERTICAL = 1 << 1;
    }
}

/// An item that can be placed into a [`TraceTree`].
///
/// The tree stores the owner and the layout offset of every item itself, so implementors only
/// describe the item.
pub trait TraceItem {
    /// Name identifying the item across sessions.
    fn name(&self) -> &str;

    /// Whether the item is shown.
    ///
    /// Disabled items take no space in the stack and don't count towards the extents of their
    /// owner.
    fn enabled(&self) -> bool;

    /// Whether the item is currently being dragged by the user.
    ///
    /// Restacking never moves a dragged item.
    fn dragging(&self) -> bool {
        false
    }

    /// Vertical extents `(top, bottom)` relative to the item's layout offset.
    ///
    /// `(0, 0)` means the item has no footprint and is skipped when restacking.
    fn v_extents(&self) -> (i32, i32);

    /// Whether the item can own child items, like a group.
    fn accepts_children(&self) -> bool {
        false
    }

    /// Writes whatever identifies this item into the current settings scope.
    fn save(&self, settings: &mut dyn SettingsStore) {
        settings.set_string(TRACE_KEY, self.name());
    }

    /// Restores item-specific state after the item was matched by name.
    fn restore(&mut self, _settings: &dyn SettingsStore) {}
}

/// Center line of `v_extents` placed at `offset`, used to order items when restacking.
///
/// The halving truncates toward zero, so `(-5, 2)` centers at `-1` rather than `-2`.
pub fn center_line(offset: i32, (top, bottom): (i32, i32)) -> i32 {
    offset + (top + bottom) / 2
}
