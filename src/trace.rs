//! Plain signal trace rows.

use tracetree_config::TraceDecl;

use crate::layout::TraceItem;

/// A single row of the view, identified by its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    name: String,
    height: u16,
    enabled: bool,
    dragging: bool,
}

impl Trace {
    pub fn new(name: impl Into<String>, height: u16) -> Self {
        Self {
            name: name.into(),
            height,
            enabled: true,
            dragging: false,
        }
    }

    pub fn from_decl(decl: &TraceDecl, default_height: u16) -> Self {
        let mut trace = Self::new(decl.name.clone(), decl.height_or(default_height));
        trace.enabled = !decl.off;
        trace
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn set_height(&mut self, height: u16) {
        self.height = height;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
    }
}

impl TraceItem for Trace {
    fn name(&self) -> &str {
        &self.name
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn dragging(&self) -> bool {
        self.dragging
    }

    /// The row is centered on its offset; odd heights put the extra pixel below.
    fn v_extents(&self) -> (i32, i32) {
        let height = i32::from(self.height);
        (-(height / 2), height - height / 2)
    }
}
