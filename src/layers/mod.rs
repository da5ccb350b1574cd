//! Layer/group compositor.
//!
//! Re-linearizes the scene tree into draw lists that do not have to follow
//! tree order:
//!
//! - [`View`]: per-node ordering record (z-index, z-order, computed orders)
//! - [`Group`]: sorting policy a view opts into
//! - [`Layer`]: draw list owned by a node, filled with the views of its group
//! - [`LayerCollection`]: the layers of one stage and the display pass
//!
//! A display update walks the tree once to assign tree order and route views
//! into layers, sorts every layer, then walks again in final draw order to
//! assign display order. Views with neither group nor layer are drawn in
//! tree order by their parent.

mod collection;
mod group;
mod layer;
mod view;

pub use collection::LayerCollection;
pub use group::{Group, SortHook, compare_z_index};
pub use layer::Layer;
pub use view::View;

pub(crate) use group::ConflictLog;

/// Handle to a [`Group`] owned by the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupId(pub(crate) usize);

/// Handle to a [`Layer`] owned by the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerId(pub(crate) usize);
