use std::cmp::Ordering;

use crate::scene::{CollectionId, NodeId, Scene};
use crate::signal::Signal;

use super::group::compare_z_index;
use super::{GroupId, LayerId};

/// A draw list owned by a node.
///
/// Views routed to the layer's group during a display update are collected
/// here and drawn when the renderer reaches the layer's node, in the group's
/// sort order, regardless of where they sit in the tree.
pub struct Layer {
    node: NodeId,
    group: GroupId,
    pub(crate) views: Vec<NodeId>,
    pub(crate) sorted_views: Vec<NodeId>,
    /// Fired with the layer's node after its views are sorted
    pub on_display: Signal<NodeId>,
}

impl Layer {
    pub(crate) fn new(node: NodeId, group: GroupId) -> Self {
        Self {
            node,
            group,
            views: Vec::new(),
            sorted_views: Vec::new(),
            on_display: Signal::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Views in draw order, as of the last display update.
    pub fn sorted_views(&self) -> &[NodeId] {
        &self.sorted_views
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("node", &self.node)
            .field("group", &self.group)
            .field("sorted_views", &self.sorted_views.len())
            .finish()
    }
}

impl Scene {
    /// Claim the layer's group for this pass and take over views the group
    /// collected before the layer was found.
    pub(crate) fn begin_layer_work(&mut self, stage: CollectionId, id: LayerId, update_id: u64) {
        let Scene {
            nodes,
            groups,
            layers,
            conflict_log,
            ..
        } = self;
        let Some(layer) = layers.get_mut(id.0) else {
            return;
        };
        let Some(group) = groups.get_mut(layer.group.0) else {
            return;
        };

        if group.found_layer(stage, id, update_id) {
            conflict_log.report(layer.group.0);
        }

        layer.views.clear();
        for view in group.active_children.drain(..) {
            if let Some(node) = nodes.get_mut(view) {
                node.view.active_parent_layer = Some(id);
            }
            layer.views.push(view);
        }
    }

    /// Publish the collected views, sorted if the group asks for it.
    pub(crate) fn end_layer_work(&mut self, id: LayerId) {
        let Scene {
            nodes,
            groups,
            layers,
            ..
        } = self;
        let Some(layer) = layers.get_mut(id.0) else {
            return;
        };

        layer.sorted_views.clear();
        layer.sorted_views.extend_from_slice(&layer.views);

        if let Some(group) = groups
            .get_mut(layer.group.0)
            .filter(|group| group.enable_sort)
        {
            if let Some(hook) = group.on_sort.as_mut() {
                for &view in &layer.sorted_views {
                    if let Some(node) = nodes.get_mut(view) {
                        hook(&mut node.view);
                    }
                }
            }
            layer
                .sorted_views
                .sort_by(|a, b| match (nodes.get(*a), nodes.get(*b)) {
                    (Some(a), Some(b)) => compare_z_index(&a.view, &b.view),
                    _ => Ordering::Equal,
                });
        }

        let node = layer.node;
        layer.on_display.emit(&node);
    }
}
