use std::cmp::Ordering;
use std::time::{Duration, Instant};

use crate::scene::{CollectionId, NodeId};

use super::{LayerId, View};

/// Hook run on every view of a sorted layer before sorting, typically to
/// compute `z_order`.
pub type SortHook = Box<dyn FnMut(&mut View)>;

/// Sorting policy shared by one or more layers.
pub struct Group {
    /// Default z-index for layers created with this group
    pub z_index: i32,
    pub enable_sort: bool,
    /// Whether views may be drawn by a layer of an enclosing stage
    pub can_draw_in_parent_stage: bool,
    pub(crate) on_sort: Option<SortHook>,

    pub(crate) active_layer: Option<LayerId>,
    pub(crate) active_stage: Option<CollectionId>,
    /// Views found before this group's layer in the current pass
    pub(crate) active_children: Vec<NodeId>,
    pub(crate) last_layer_update_id: Option<u64>,

    view_update_id: u64,
    last_view_update_id: Option<u64>,
}

impl Group {
    pub fn new(z_index: i32, enable_sort: bool) -> Self {
        Self {
            z_index,
            enable_sort,
            can_draw_in_parent_stage: true,
            on_sort: None,
            active_layer: None,
            active_stage: None,
            active_children: Vec::new(),
            last_layer_update_id: None,
            view_update_id: 0,
            last_view_update_id: None,
        }
    }

    /// A sorting group with a per-view hook run before each sort.
    pub fn with_sort_hook(z_index: i32, hook: impl FnMut(&mut View) + 'static) -> Self {
        let mut group = Self::new(z_index, true);
        group.on_sort = Some(Box::new(hook));
        group
    }

    pub fn active_layer(&self) -> Option<LayerId> {
        self.active_layer
    }

    fn clear(&mut self) {
        self.active_layer = None;
        self.active_stage = None;
        self.active_children.clear();
    }

    /// Reset per-pass state on the first touch of display update `update_id`.
    pub(crate) fn check(&mut self, stage: CollectionId, update_id: u64) {
        self.last_view_update_id = Some(self.view_update_id);

        if self.last_layer_update_id.is_none_or(|last| last < update_id) {
            self.last_layer_update_id = Some(update_id);
            self.clear();
            self.active_stage = Some(stage);
        } else if self.can_draw_in_parent_stage && self.active_stage != Some(stage) {
            self.clear();
        }
    }

    /// Route a view found during the tree walk. Returns the layer it now
    /// belongs to, or `None` if it waits for the group's layer to show up.
    pub(crate) fn add_display_object(
        &mut self,
        stage: CollectionId,
        view: NodeId,
        update_id: u64,
    ) -> Option<LayerId> {
        self.check(stage, update_id);
        if self.active_layer.is_none() {
            self.active_children.push(view);
        }
        self.active_layer
    }

    /// Record `layer` as the layer of this group for the current pass.
    ///
    /// Returns `true` when another layer already claimed the group in this
    /// pass. The first layer keeps it.
    pub(crate) fn found_layer(&mut self, stage: CollectionId, layer: LayerId, update_id: u64) -> bool {
        self.check(stage, update_id);
        if self.active_layer.is_some_and(|active| active != layer) {
            return true;
        }
        self.active_layer = Some(layer);
        self.active_stage = Some(stage);
        false
    }

    /// Mark views of this group as changed.
    pub fn invalidate_view(&mut self) {
        self.view_update_id += 1;
    }

    /// Whether views changed since the group was last processed.
    pub fn is_dirty_view(&self) -> bool {
        self.last_view_update_id != Some(self.view_update_id)
    }

    pub fn set_sort_hook(&mut self, hook: Option<SortHook>) {
        self.on_sort = hook;
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("z_index", &self.z_index)
            .field("enable_sort", &self.enable_sort)
            .field("active_layer", &self.active_layer)
            .field("active_children", &self.active_children.len())
            .finish()
    }
}

/// Default view order: `z_index` ascending, then `z_order` descending, then
/// tree order.
pub fn compare_z_index(a: &View, b: &View) -> Ordering {
    a.z_index
        .cmp(&b.z_index)
        .then_with(|| b.z_order.total_cmp(&a.z_order))
        .then_with(|| a.tree_order.cmp(&b.tree_order))
}

const CONFLICT_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Rate limiter for the "two layers share one group" warning.
#[derive(Debug, Default)]
pub(crate) struct ConflictLog {
    last: Option<Instant>,
}

impl ConflictLog {
    /// Log a group conflict unless one was logged recently.
    /// Returns whether a warning was emitted.
    pub(crate) fn report(&mut self, group: usize) -> bool {
        let now = Instant::now();
        if self
            .last
            .is_some_and(|last| now.duration_since(last) < CONFLICT_LOG_INTERVAL)
        {
            return false;
        }
        self.last = Some(now);
        log::warn!(
            "Group {} is used by two layers in one stage; the first one found keeps it",
            group
        );
        true
    }
}
