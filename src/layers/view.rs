use super::{GroupId, LayerId};

/// Per-node draw-ordering record.
///
/// `parent_group`/`parent_layer`, `z_index` and `z_order` are set by the
/// application. The orders are written by the compositor on every display
/// update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct View {
    pub(crate) parent_group: Option<GroupId>,
    pub(crate) parent_layer: Option<LayerId>,
    /// Effective layer of this view for the current display pass
    pub(crate) active_parent_layer: Option<LayerId>,

    /// Distance from the screen: larger values are drawn first within a layer
    pub z_order: f32,
    /// Primary sort key within a layer, ascending
    pub z_index: i32,

    pub(crate) tree_order: u32,
    pub(crate) display_order: u32,
    pub(crate) layer_order: u32,
}

impl View {
    pub fn parent_group(&self) -> Option<GroupId> {
        self.parent_group
    }

    pub fn parent_layer(&self) -> Option<LayerId> {
        self.parent_layer
    }

    /// Layer this view was routed to by the last display update.
    pub fn active_parent_layer(&self) -> Option<LayerId> {
        self.active_parent_layer
    }

    /// Depth-first position in the last tree walk.
    pub fn tree_order(&self) -> u32 {
        self.tree_order
    }

    /// Position in final draw order.
    pub fn display_order(&self) -> u32 {
        self.display_order
    }

    /// Position inside the owning layer's sorted list.
    pub fn layer_order(&self) -> u32 {
        self.layer_order
    }
}
