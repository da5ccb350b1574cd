use crate::error::{Result, SceneError};
use crate::scene::{CollectionId, NodeId, Scene};
use crate::signal::Signal;

use super::{Group, GroupId, Layer, LayerId};

/// Layers registered with one stage, plus the display pass that fills them.
pub struct LayerCollection {
    pub(crate) list: Vec<LayerId>,
    tree_order_count: u32,
    display_order_count: u32,
    /// Fired with the stage node before each display update
    pub on_before_display: Signal<NodeId>,
    /// Fired with the stage node after each display update
    pub on_display: Signal<NodeId>,
}

impl Default for LayerCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerCollection {
    pub fn new() -> Self {
        Self {
            list: Vec::new(),
            tree_order_count: 0,
            display_order_count: 0,
            on_before_display: Signal::new(),
            on_display: Signal::new(),
        }
    }

    pub fn layers(&self) -> &[LayerId] {
        &self.list
    }

    /// Nodes visited by the last tree walk.
    pub fn tree_order_count(&self) -> u32 {
        self.tree_order_count
    }

    /// Views ordered by the last display pass.
    pub fn display_order_count(&self) -> u32 {
        self.display_order_count
    }
}

impl std::fmt::Debug for LayerCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerCollection")
            .field("list", &self.list)
            .field("tree_order_count", &self.tree_order_count)
            .field("display_order_count", &self.display_order_count)
            .finish()
    }
}

impl Scene {
    // === Groups ===

    pub fn create_group(&mut self, group: Group) -> GroupId {
        self.groups.push(group);
        GroupId(self.groups.len() - 1)
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(id.0)
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(id.0)
    }

    // === Layers ===

    /// Make `node` own a layer sorted by `group`, or by a private unsorted
    /// group when none is given.
    pub fn create_layer(&mut self, node: NodeId, group: Option<GroupId>) -> Result<LayerId> {
        self.node_ref(node)?;
        let group = match group {
            Some(group) if group.0 < self.groups.len() => group,
            Some(group) => return Err(SceneError::StaleGroup(group.0)),
            None => self.create_group(Group::new(0, false)),
        };

        let id = LayerId(self.layers.len());
        self.layers.push(Layer::new(node, group));
        if let Some(old) = self.node_mut(node)?.layer.replace(id) {
            self.forget_layer(old);
        }
        Ok(id)
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id.0)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.get_mut(id.0)
    }

    /// Add `layer` to the display pass of `stage`.
    pub fn register_layer(&mut self, stage: NodeId, layer: LayerId) -> Result<()> {
        if layer.0 >= self.layers.len() {
            return Err(SceneError::StaleLayer(layer.0));
        }
        let list = &mut self.layer_collection_mut(stage)?.list;
        if !list.contains(&layer) {
            list.push(layer);
        }
        Ok(())
    }

    /// Remove `layer` from the display pass of `stage`.
    pub fn unregister_layer(&mut self, stage: NodeId, layer: LayerId) -> Result<bool> {
        let list = &mut self.layer_collection_mut(stage)?.list;
        let Some(index) = list.iter().position(|&l| l == layer) else {
            return Ok(false);
        };
        list.remove(index);
        if let Some(layer) = self.layers.get_mut(layer.0) {
            layer.views.clear();
            layer.sorted_views.clear();
        }
        Ok(true)
    }

    /// Drop `layer` from every stage.
    pub(crate) fn forget_layer(&mut self, layer: LayerId) {
        for collection in self.collections.iter_mut().flatten() {
            collection.layers.list.retain(|&l| l != layer);
        }
    }

    pub fn layer_collection(&self, stage: NodeId) -> Result<&LayerCollection> {
        let coll = self.stage_collection(stage)?;
        self.collection(coll)
            .map(|c| c.layers())
            .ok_or(SceneError::NotAStage(stage.as_u64()))
    }

    pub fn layer_collection_mut(&mut self, stage: NodeId) -> Result<&mut LayerCollection> {
        let coll = self.stage_collection(stage)?;
        self.collection_mut(coll)
            .map(|c| &mut c.layers)
            .ok_or(SceneError::NotAStage(stage.as_u64()))
    }

    // === Views ===

    /// Route `node` through `group`. Takes precedence over a parent layer.
    pub fn set_parent_group(&mut self, node: NodeId, group: Option<GroupId>) -> Result<()> {
        if let Some(group) = group.filter(|g| g.0 >= self.groups.len()) {
            return Err(SceneError::StaleGroup(group.0));
        }
        self.invalidate_view_of(node)?;
        self.node_mut(node)?.view.parent_group = group;
        self.invalidate_view_of(node)
    }

    /// Route `node` through the group of `layer`.
    pub fn set_parent_layer(&mut self, node: NodeId, layer: Option<LayerId>) -> Result<()> {
        if let Some(layer) = layer.filter(|l| l.0 >= self.layers.len()) {
            return Err(SceneError::StaleLayer(layer.0));
        }
        self.invalidate_view_of(node)?;
        self.node_mut(node)?.view.parent_layer = layer;
        self.invalidate_view_of(node)
    }

    pub fn set_z_index(&mut self, node: NodeId, z_index: i32) -> Result<()> {
        self.node_mut(node)?.view.z_index = z_index;
        self.invalidate_view_of(node)
    }

    pub fn set_z_order(&mut self, node: NodeId, z_order: f32) -> Result<()> {
        self.node_mut(node)?.view.z_order = z_order;
        self.invalidate_view_of(node)
    }

    /// Mark the group the view of `node` is routed through as changed.
    fn invalidate_view_of(&mut self, node: NodeId) -> Result<()> {
        let view = &self.node_ref(node)?.view;
        let group = view.parent_group.or_else(|| {
            view.parent_layer
                .and_then(|l| self.layers.get(l.0))
                .map(|l| l.group())
        });
        if let Some(group) = group.and_then(|g| self.groups.get_mut(g.0)) {
            group.invalidate_view();
        }
        Ok(())
    }

    // === Display pass ===

    /// Rebuild the draw lists of every layer registered with `stage`.
    ///
    /// Assigns tree order to every node, routes views into layers through
    /// their groups, sorts each layer and finally assigns display and layer
    /// order in the order the renderer will draw.
    pub fn update_display(&mut self, stage: NodeId) -> Result<()> {
        let coll = self.stage_collection(stage)?;
        let Some(collection) = self.collection_mut(coll) else {
            return Ok(());
        };
        collection.layers.on_before_display.emit(&stage);
        let list = std::mem::take(&mut collection.layers.list);

        self.display_update_counter += 1;
        let update_id = self.display_update_counter;

        for &layer in &list {
            self.begin_layer_work(coll, layer, update_id);
        }
        let tree_order_count = self.visit_tree(coll, stage, update_id);
        for &layer in &list {
            self.end_layer_work(layer);
        }
        let display_order_count = self.visit_view(stage);

        if let Some(collection) = self.collection_mut(coll) {
            let layers = &mut collection.layers;
            layers.list = list;
            layers.tree_order_count = tree_order_count;
            layers.display_order_count = display_order_count;
            layers.on_display.emit(&stage);
        }
        Ok(())
    }

    /// Whether any group used by the layers of `stage` saw view changes
    /// since the last display update.
    pub fn check_dirty(&self, stage: NodeId) -> Result<bool> {
        let collection = self.layer_collection(stage)?;
        Ok(collection.list.iter().any(|&l| {
            self.layers
                .get(l.0)
                .and_then(|layer| self.groups.get(layer.group().0))
                .is_some_and(Group::is_dirty_view)
        }))
    }

    /// Depth-first walk assigning tree order and routing views to groups.
    fn visit_tree(&mut self, stage: CollectionId, root: NodeId, update_id: u64) -> u32 {
        let mut stack = self.take_walk_stack();
        stack.push(root);
        let mut order = 0;

        let Scene {
            nodes,
            groups,
            layers,
            ..
        } = self;
        while let Some(x) = stack.pop() {
            let Some(node) = nodes.get_mut(x) else {
                continue;
            };
            order += 1;
            node.view.tree_order = order;

            let group = node.view.parent_group.or_else(|| {
                node.view
                    .parent_layer
                    .and_then(|l| layers.get(l.0))
                    .map(|l| l.group())
            });
            node.view.active_parent_layer = match group.and_then(|g| groups.get_mut(g.0)) {
                Some(group) => {
                    let active = group.add_display_object(stage, x, update_id);
                    if let Some(layer) = active.and_then(|l| layers.get_mut(l.0)) {
                        layer.views.push(x);
                    }
                    active
                }
                None => None,
            };

            stack.extend(node.children.iter().rev());
        }

        self.return_walk_stack(stack);
        order
    }

    /// Depth-first walk in draw order: a layer's sorted views first, then
    /// the children that no layer claimed.
    fn visit_view(&mut self, root: NodeId) -> u32 {
        let mut stack = self.take_walk_stack();
        stack.push(root);
        let mut order = 0;

        let Scene { nodes, layers, .. } = self;
        while let Some(x) = stack.pop() {
            let Some(node) = nodes.get_mut(x) else {
                continue;
            };
            order += 1;
            node.view.display_order = order;
            let layer = node.layer;

            let children = std::mem::take(&mut node.children);
            for &child in children.iter().rev() {
                if nodes
                    .get(child)
                    .is_some_and(|c| c.view.active_parent_layer.is_none())
                {
                    stack.push(child);
                }
            }
            if let Some(node) = nodes.get_mut(x) {
                node.children = children;
            }

            if let Some(layer) = layer.and_then(|l| layers.get(l.0)) {
                for (i, &view) in layer.sorted_views.iter().enumerate() {
                    if let Some(node) = nodes.get_mut(view) {
                        node.view.layer_order = i as u32 + 1;
                    }
                }
                stack.extend(layer.sorted_views.iter().rev());
            }
        }

        self.return_walk_stack(stack);
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display_orders(scene: &Scene, ids: &[NodeId]) -> Vec<u32> {
        ids.iter()
            .map(|&id| scene.node(id).unwrap().view().display_order())
            .collect()
    }

    #[test]
    fn test_tree_order_is_depth_first() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let a = scene.create_node();
        let b = scene.create_node();
        let c = scene.create_node();
        scene.add_child(stage, a).unwrap();
        scene.add_child(a, b).unwrap();
        scene.add_child(stage, c).unwrap();

        scene.update_display(stage).unwrap();
        let orders: Vec<u32> = [stage, a, b, c]
            .iter()
            .map(|&id| scene.node(id).unwrap().view().tree_order())
            .collect();
        assert_eq!(orders, vec![1, 2, 3, 4]);
        assert_eq!(display_orders(&scene, &[stage, a, b, c]), vec![1, 2, 3, 4]);
        assert_eq!(scene.layer_collection(stage).unwrap().tree_order_count(), 4);
    }

    #[test]
    fn test_layer_reorders_views() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let layer_node = scene.create_node();
        let a = scene.create_node();
        let b = scene.create_node();
        // Tree order: a, b, layer_node.
        scene.add_child(stage, a).unwrap();
        scene.add_child(stage, b).unwrap();
        scene.add_child(stage, layer_node).unwrap();

        let group = scene.create_group(Group::new(0, true));
        let layer = scene.create_layer(layer_node, Some(group)).unwrap();
        scene.register_layer(stage, layer).unwrap();
        scene.set_parent_group(a, Some(group)).unwrap();
        scene.set_parent_group(b, Some(group)).unwrap();
        scene.set_z_index(a, 1).unwrap();

        scene.update_display(stage).unwrap();

        assert_eq!(scene.layer(layer).unwrap().sorted_views(), &[b, a]);
        assert_eq!(scene.node(a).unwrap().view().active_parent_layer(), Some(layer));
        // stage, layer_node, then its sorted views.
        assert_eq!(display_orders(&scene, &[stage, layer_node, b, a]), vec![1, 2, 3, 4]);
        assert_eq!(scene.node(b).unwrap().view().layer_order(), 1);
        assert_eq!(scene.node(a).unwrap().view().layer_order(), 2);
    }

    #[test]
    fn test_equal_keys_sort_is_stable_across_runs() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let layer_node = scene.create_node();
        scene.add_child(stage, layer_node).unwrap();
        let group = scene.create_group(Group::new(0, true));
        let layer = scene.create_layer(layer_node, Some(group)).unwrap();
        scene.register_layer(stage, layer).unwrap();

        let views: Vec<NodeId> = (0..16)
            .map(|_| {
                let v = scene.create_node();
                scene.add_child(stage, v).unwrap();
                scene.set_parent_layer(v, Some(layer)).unwrap();
                v
            })
            .collect();

        scene.update_display(stage).unwrap();
        let first = scene.layer(layer).unwrap().sorted_views().to_vec();
        assert_eq!(first, views);
        for _ in 0..5 {
            scene.update_display(stage).unwrap();
            assert_eq!(scene.layer(layer).unwrap().sorted_views(), first.as_slice());
        }
    }

    #[test]
    fn test_sort_hook_sets_z_order() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let layer_node = scene.create_node();
        let a = scene.create_node();
        let b = scene.create_node();
        scene.add_child(stage, layer_node).unwrap();
        scene.add_child(stage, a).unwrap();
        scene.add_child(stage, b).unwrap();

        // Later tree order gets the larger z_order and draws first.
        let group = scene.create_group(Group::with_sort_hook(0, |view| {
            view.z_order = view.tree_order() as f32;
        }));
        let layer = scene.create_layer(layer_node, Some(group)).unwrap();
        scene.register_layer(stage, layer).unwrap();
        scene.set_parent_group(a, Some(group)).unwrap();
        scene.set_parent_group(b, Some(group)).unwrap();

        scene.update_display(stage).unwrap();
        assert_eq!(scene.layer(layer).unwrap().sorted_views(), &[b, a]);
    }

    #[test]
    fn test_group_without_layer_draws_in_tree_order() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let a = scene.create_node();
        scene.add_child(stage, a).unwrap();
        let group = scene.create_group(Group::new(0, true));
        scene.set_parent_group(a, Some(group)).unwrap();

        scene.update_display(stage).unwrap();
        assert!(scene.node(a).unwrap().view().active_parent_layer().is_none());
        assert_eq!(display_orders(&scene, &[stage, a]), vec![1, 2]);
    }

    #[test]
    fn test_shared_group_first_layer_wins() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let l1 = scene.create_node();
        let l2 = scene.create_node();
        let a = scene.create_node();
        for n in [l1, l2, a] {
            scene.add_child(stage, n).unwrap();
        }
        let group = scene.create_group(Group::new(0, false));
        let first = scene.create_layer(l1, Some(group)).unwrap();
        let second = scene.create_layer(l2, Some(group)).unwrap();
        scene.register_layer(stage, first).unwrap();
        scene.register_layer(stage, second).unwrap();
        scene.set_parent_group(a, Some(group)).unwrap();

        scene.update_display(stage).unwrap();
        assert_eq!(scene.layer(first).unwrap().sorted_views(), &[a]);
        assert!(scene.layer(second).unwrap().sorted_views().is_empty());
    }

    #[test]
    fn test_check_dirty_tracks_view_changes() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let layer_node = scene.create_node();
        let a = scene.create_node();
        scene.add_child(stage, layer_node).unwrap();
        scene.add_child(stage, a).unwrap();
        let layer = scene.create_layer(layer_node, None).unwrap();
        scene.register_layer(stage, layer).unwrap();
        scene.set_parent_layer(a, Some(layer)).unwrap();

        assert!(scene.check_dirty(stage).unwrap());
        scene.update_display(stage).unwrap();
        assert!(!scene.check_dirty(stage).unwrap());
        scene.set_z_order(a, 3.0).unwrap();
        assert!(scene.check_dirty(stage).unwrap());
    }

    #[test]
    fn test_display_signals_fire() {
        use std::cell::Cell;
        use std::rc::Rc;

        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let fired = Rc::new(Cell::new(0));
        let before = fired.clone();
        let after = fired.clone();
        let layers = scene.layer_collection_mut(stage).unwrap();
        layers
            .on_before_display
            .add_listener(0, move |_| before.set(before.get() + 1));
        layers
            .on_display
            .add_listener(0, move |_| after.set(after.get() + 10));

        scene.update_display(stage).unwrap();
        assert_eq!(fired.get(), 11);
    }

    #[test]
    fn test_unregister_and_destroy_drop_layers() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let l = scene.create_node();
        scene.add_child(stage, l).unwrap();
        let layer = scene.create_layer(l, None).unwrap();
        scene.register_layer(stage, layer).unwrap();
        assert_eq!(scene.unregister_layer(stage, layer), Ok(true));
        assert_eq!(scene.unregister_layer(stage, layer), Ok(false));

        scene.register_layer(stage, layer).unwrap();
        scene.destroy(l, true).unwrap();
        assert!(scene.layer_collection(stage).unwrap().layers().is_empty());
    }
}
