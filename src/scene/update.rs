//! Dirty-flag propagation.
//!
//! Each node carries five component masks:
//!
//! - `u_flags`: components dirty on the node itself
//! - `u_flags_stop`: components that do not propagate past the node
//! - `u_flags_parent`: components the parent pushed down and the node has not consumed
//! - `u_flags_children`: components the node still has to push to its children
//! - `u_flags_pushed`: components already pushed to the children this epoch
//!
//! [`Scene::invalidate`] queues a node at most once per dirty session. The
//! queue flush runs [`Scene::update_search`] for every queued node: it climbs
//! to the highest ancestor not yet validated in the current epoch and walks
//! back down with [`UpdateMode::MarkEpoch`]. Read paths use
//! [`Scene::update_bubble`] instead, which validates only the stale part of
//! the ancestor chain.
//!
//! Nodes in the null collection have no queue: invalidating them recomputes
//! the node immediately and leaves the children flagged for when they are
//! next read or attached.

use crate::error::Result;
use crate::math::Matrix;
use crate::stats;

use super::arena::NodeId;
use super::collection::CollectionId;
use super::flags::{Components, CullFlags, UpdateMode};
use super::Scene;

impl Scene {
    /// Mark `mask` dirty on `id`.
    pub fn invalidate(&mut self, id: NodeId, mask: Components) -> Result<()> {
        let node = self.node_mut(id)?;
        let was_clean = (node.u_flags | node.u_flags_pushed).is_empty();
        node.u_flags |= mask;
        let coll = node.collection;

        if coll.is_null() {
            self.update_with_children_inner(id, Components::ALL);
            return Ok(());
        }

        debug_assert!(
            self.collection(coll)
                .is_some_and(|c| c.is_attached(id) || c.is_detached(id)),
            "invalidated node is not tracked by its collection"
        );
        if let Some(queue) = self.queue_mut(coll) {
            queue.mark(mask);
            if was_clean {
                queue.push(id);
            }
        }
        Ok(())
    }

    /// Hand `id` to the queue of `coll` without touching its flags.
    pub(crate) fn invalidate_node(&mut self, coll: CollectionId, id: NodeId) {
        if coll.is_null() {
            self.update_with_children_inner(id, Components::ALL);
        } else if let Some(queue) = self.queue_mut(coll) {
            queue.push(id);
        }
    }

    /// Recompute the components in `comp_mask` that are dirty on `id`.
    ///
    /// Returns the components that were actually recomputed.
    pub fn update_node(&mut self, id: NodeId, comp_mask: Components) -> Result<Components> {
        self.node_ref(id)?;
        Ok(self.update_node_inner(id, comp_mask))
    }

    fn update_node_inner(&mut self, id: NodeId, comp_mask: Components) -> Components {
        let Some(node) = self.nodes.get(id) else {
            return Components::empty();
        };
        let mask = comp_mask & (node.u_flags | node.u_flags_parent);
        if mask.is_empty() {
            stats::record_node_update_skipped();
            return mask;
        }

        // A root inherits nothing.
        let (parent_stop, parent_world, parent_tint, parent_cull) =
            match node.parent.and_then(|p| self.nodes.get(p)) {
                Some(p) => (
                    p.u_flags_stop,
                    *p.transform.world_transform(),
                    p.world_tint,
                    p.world_cull_flags,
                ),
                None => (
                    Components::ALL,
                    Matrix::IDENTITY,
                    [1.0; 4],
                    CullFlags::empty(),
                ),
            };

        let Some(node) = self.nodes.get_mut(id) else {
            return Components::empty();
        };

        if mask.contains(Components::TRANSFORM) {
            if parent_stop.contains(Components::TRANSFORM) {
                node.transform.update_transform(&Matrix::IDENTITY);
            } else {
                node.transform.update_transform(&parent_world);
            }
        }

        if mask.contains(Components::ALPHATINT) {
            node.world_tint = if parent_stop.contains(Components::ALPHATINT) {
                node.tint
            } else {
                std::array::from_fn(|i| parent_tint[i] * node.tint[i])
            };
        }

        if mask.contains(Components::CULL) {
            node.world_cull_flags = if parent_stop.contains(Components::CULL) {
                node.cull_flags
            } else {
                parent_cull | node.cull_flags
            };
        }

        node.u_flags.remove(mask);
        node.u_flags_parent.remove(mask);
        node.u_flags_children |= mask & !node.u_flags_stop;
        node.recompute_count += 1;
        stats::record_node_update();

        mask
    }

    /// Update `id` and push whatever became ready to its direct children.
    pub fn update_with_children(&mut self, id: NodeId, comp_mask: Components) -> Result<()> {
        self.node_ref(id)?;
        self.update_with_children_inner(id, comp_mask);
        Ok(())
    }

    fn update_with_children_inner(&mut self, id: NodeId, comp_mask: Components) {
        self.update_node_inner(id, comp_mask);

        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let pass = node.u_flags_children & !node.u_flags;
        node.u_flags_pushed |= pass;
        if pass.is_empty() {
            return;
        }
        node.u_flags_children.remove(pass);

        let children = std::mem::take(&mut node.children);
        for &child in children.iter().rev() {
            if let Some(child) = self.nodes.get_mut(child) {
                child.u_flags_parent |= pass;
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.children = children;
        }
    }

    /// Update `id` and the part of its subtree selected by `mode`.
    pub fn update_recursive(
        &mut self,
        id: NodeId,
        comp_mask: Components,
        mode: UpdateMode,
    ) -> Result<()> {
        self.node_ref(id)?;
        self.update_recursive_inner(id, comp_mask, mode);
        Ok(())
    }

    fn update_recursive_inner(&mut self, root: NodeId, comp_mask: Components, mode: UpdateMode) {
        // Children are pushed in order so the last child is visited first.
        let mut stack = self.take_walk_stack();
        stack.push(root);

        while let Some(id) = stack.pop() {
            if mode == UpdateMode::IgnoreMask {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.u_flags_parent |= comp_mask;
                }
            }
            self.update_node_inner(id, comp_mask);

            let epoch = match self.nodes.get(id) {
                Some(node) => self.queue_update_id(node.collection),
                None => continue,
            };
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };

            let mut pass = node.u_flags_children & !node.u_flags;
            if mode == UpdateMode::MarkEpoch {
                node.last_ctx_update_id = epoch;
                pass |= node.u_flags_pushed;
                node.u_flags_pushed = Components::empty();
            }

            if pass.is_empty() && !mode.always_recurses() {
                continue;
            }
            node.u_flags_children.remove(pass);

            let children = std::mem::take(&mut node.children);
            for &child in &children {
                if let Some(child_node) = self.nodes.get_mut(child) {
                    child_node.u_flags_parent |= pass;
                    stack.push(child);
                }
            }
            if let Some(node) = self.nodes.get_mut(id) {
                node.children = children;
            }
        }

        self.return_walk_stack(stack);
    }

    /// Validate `id` against the current epoch of its queue.
    ///
    /// Climbs to the highest ancestor not yet validated this epoch and walks
    /// back down from there. Hidden nodes are skipped unless their culling
    /// itself is pending. Returns the epoch.
    pub fn update_search(&mut self, id: NodeId) -> Result<i64> {
        self.node_ref(id)?;
        Ok(self.update_search_inner(id))
    }

    fn update_search_inner(&mut self, id: NodeId) -> i64 {
        let Some(node) = self.nodes.get(id) else {
            return 0;
        };
        let coll = node.collection;
        let hidden = node.world_cull_flags.contains(CullFlags::INVISIBLE)
            && !(node.u_flags | node.u_flags_parent).contains(Components::CULL);

        let Some(queue) = self.queue_mut(coll) else {
            return 0;
        };
        queue.flush_update_flags();
        let epoch = queue.update_id();
        if hidden {
            return epoch;
        }
        let mut stack = std::mem::take(&mut queue.temp_parent_stack);

        let mut current = Some(id);
        while let Some(x) = current {
            let Some(node) = self.nodes.get(x) else {
                break;
            };
            if node.last_ctx_update_id >= epoch {
                break;
            }
            stack.push(x);
            current = node.parent;
        }

        for &x in stack.iter().rev() {
            self.update_recursive_inner(x, Components::ALL, UpdateMode::MarkEpoch);
        }

        stack.clear();
        if let Some(queue) = self.queue_mut(coll) {
            queue.temp_parent_stack = stack;
        }
        epoch
    }

    /// Bring `id` up to date by validating its stale ancestors top-down.
    ///
    /// With `max_ctx_update_id <= 0` the whole ancestor chain is visited;
    /// otherwise the climb stops at the first ancestor validated in that
    /// epoch or later.
    pub fn update_bubble(
        &mut self,
        id: NodeId,
        comp_mask: Components,
        max_ctx_update_id: i64,
    ) -> Result<()> {
        self.node_ref(id)?;
        self.update_bubble_inner(id, comp_mask, max_ctx_update_id);
        Ok(())
    }

    pub(crate) fn update_bubble_inner(
        &mut self,
        id: NodeId,
        comp_mask: Components,
        max_ctx_update_id: i64,
    ) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let coll = node.collection;
        let Some(queue) = self.queue_mut(coll) else {
            return;
        };
        let mut stack = std::mem::take(&mut queue.temp_parent_stack);

        let mut current = Some(id);
        while let Some(x) = current {
            let Some(node) = self.nodes.get(x) else {
                break;
            };
            if max_ctx_update_id > 0 && node.last_ctx_update_id >= max_ctx_update_id {
                break;
            }
            stack.push(x);
            current = node.parent;
        }

        for &x in stack.iter().rev() {
            self.update_with_children_inner(x, comp_mask);
        }

        stack.clear();
        if let Some(queue) = self.queue_mut(coll) {
            queue.temp_parent_stack = stack;
        }
    }

    /// Start a new epoch on the queue of the stage rooted at `stage` if any
    /// component was invalidated since the last one.
    pub fn flush_update_flags(&mut self, stage: NodeId) -> Result<bool> {
        let coll = self.stage_collection(stage)?;
        Ok(self
            .queue_mut(coll)
            .is_some_and(|queue| queue.flush_update_flags()))
    }

    /// Flush the queue of the stage rooted at `stage`: every node queued
    /// before the call is validated exactly once. Nodes queued while the flush
    /// runs wait for the next one.
    ///
    /// Returns how many nodes were searched.
    pub fn flush_queue(&mut self, stage: NodeId) -> Result<usize> {
        let coll = self.stage_collection(stage)?;
        Ok(self.flush_queue_in(coll))
    }

    pub(crate) fn flush_queue_in(&mut self, coll: CollectionId) -> usize {
        let Some(queue) = self.queue_mut(coll) else {
            return 0;
        };
        let pending = queue.take_queue();

        let mut searched = 0;
        for &id in &pending {
            // Nodes that moved to another collection since they were queued
            // are validated by that collection.
            if self.nodes.get(id).is_some_and(|n| n.collection == coll) {
                self.update_search_inner(id);
                searched += 1;
            }
        }

        if !pending.is_empty() {
            log::debug!(
                "Flushed update queue of {:?}: {} queued, {} searched",
                coll,
                pending.len(),
                searched
            );
        }
        stats::record_queue_flush(searched);

        if let Some(queue) = self.queue_mut(coll) {
            queue.recycle(pending);
        }
        searched
    }

    /// Make the world state of `id` and its subtree current.
    ///
    /// For a stage this flushes its queue. Any other node is refreshed with
    /// [`UpdateMode::IgnoreMask`], recomputing the whole subtree.
    pub fn update_transform(&mut self, id: NodeId) -> Result<()> {
        if self.is_stage(id) {
            let coll = self.node_ref(id)?.collection;
            self.flush_queue_in(coll);
            Ok(())
        } else {
            self.force_update(id)
        }
    }

    /// Recompute every component of `id` and its whole subtree.
    pub fn force_update(&mut self, id: NodeId) -> Result<()> {
        self.update_recursive(id, Components::ALL, UpdateMode::IgnoreMask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    fn recomputes(scene: &Scene, id: NodeId) -> u64 {
        scene.node(id).unwrap().recompute_count()
    }

    /// stage -> a -> b -> c
    fn chain(scene: &mut Scene) -> (NodeId, NodeId, NodeId, NodeId) {
        let stage = scene.create_stage();
        let a = scene.create_node();
        let b = scene.create_node();
        let c = scene.create_node();
        scene.add_child(stage, a).unwrap();
        scene.add_child(a, b).unwrap();
        scene.add_child(b, c).unwrap();
        scene.flush_queue(stage).unwrap();
        (stage, a, b, c)
    }

    #[test]
    fn test_invalidate_queues_once_per_session() {
        let mut scene = Scene::new();
        let (stage, _, _, c) = chain(&mut scene);
        let coll = scene.node(stage).unwrap().collection();

        scene.invalidate(c, Components::TRANSFORM).unwrap();
        scene.invalidate(c, Components::ALPHATINT).unwrap();
        scene.invalidate(c, Components::TRANSFORM).unwrap();

        let queue = scene.collection(coll).unwrap().queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.u_flags(),
            Components::TRANSFORM | Components::ALPHATINT
        );
    }

    #[test]
    fn test_update_node_fast_path() {
        let mut scene = Scene::new();
        let (_, a, _, _) = chain(&mut scene);
        let before = recomputes(&scene, a);
        let done = scene.update_node(a, Components::ALL).unwrap();
        assert!(done.is_empty());
        assert_eq!(recomputes(&scene, a), before);
    }

    #[test]
    fn test_update_search_is_idempotent_within_epoch() {
        let mut scene = Scene::new();
        let (_, _, b, c) = chain(&mut scene);

        scene.set_position(b, 3.0, 0.0).unwrap();
        let epoch = scene.update_search(b).unwrap();
        let b_count = recomputes(&scene, b);
        let c_count = recomputes(&scene, c);

        assert_eq!(scene.update_search(b).unwrap(), epoch);
        assert_eq!(recomputes(&scene, b), b_count);
        assert_eq!(recomputes(&scene, c), c_count);
    }

    #[test]
    fn test_update_search_revalidates_whole_stale_chain() {
        let mut scene = Scene::new();
        let (stage, a, b, c) = chain(&mut scene);

        scene.invalidate(c, Components::TRANSFORM).unwrap();
        let epoch = scene.update_search(c).unwrap();

        for id in [stage, a, b, c] {
            assert_eq!(scene.node(id).unwrap().last_ctx_update_id(), epoch);
        }
        assert!(!scene.node(c).unwrap().is_dirty());
    }

    #[test]
    fn test_update_search_stops_at_validated_ancestor() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let a = scene.create_node();
        let b1 = scene.create_node();
        let b2 = scene.create_node();
        scene.add_child(stage, a).unwrap();
        scene.add_child(a, b1).unwrap();
        scene.add_child(a, b2).unwrap();
        scene.flush_queue(stage).unwrap();

        scene.invalidate(b1, Components::TRANSFORM).unwrap();
        scene.invalidate(b2, Components::TRANSFORM).unwrap();
        let epoch = scene.update_search(b1).unwrap();
        assert_eq!(scene.node(a).unwrap().last_ctx_update_id(), epoch);

        // Plant a pending flag on the stage without queuing it. If the second
        // search climbed past `a` it would consume it.
        scene.nodes.get_mut(stage).unwrap().u_flags |= Components::BIT_3;
        let stage_count = recomputes(&scene, stage);

        scene.update_search(b2).unwrap();
        assert_eq!(scene.node(b2).unwrap().last_ctx_update_id(), epoch);
        assert!(!scene.node(b2).unwrap().is_dirty());
        assert_eq!(recomputes(&scene, stage), stage_count);
        assert!(scene.node(stage).unwrap().u_flags().contains(Components::BIT_3));
    }

    #[test]
    fn test_hidden_node_is_skipped_by_search() {
        let mut scene = Scene::new();
        let (stage, a, b, _) = chain(&mut scene);
        scene.set_visible(a, false).unwrap();
        scene.flush_queue(stage).unwrap();
        assert!(scene.node(b).unwrap().world_cull_flags().contains(CullFlags::INVISIBLE));

        scene.set_position(b, 1.0, 1.0).unwrap();
        scene.flush_queue(stage).unwrap();
        assert!(scene.node(b).unwrap().u_flags().contains(Components::TRANSFORM));

        scene.set_visible(a, true).unwrap();
        scene.flush_queue(stage).unwrap();
        assert!(scene.node(b).unwrap().world_cull_flags().is_empty());
        assert!(!scene.node(b).unwrap().is_dirty());
        assert!(approx_eq(scene.node(b).unwrap().world_transform().tx, 1.0));
    }

    #[test]
    fn test_world_transform_matches_parent_times_local() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let a = scene.create_node();
        let b = scene.create_node();
        let c = scene.create_node();
        scene.add_child(stage, a).unwrap();
        scene.add_child(a, b).unwrap();
        scene.add_child(a, c).unwrap();

        scene.set_position(a, 10.0, 20.0).unwrap();
        scene.set_rotation(a, 30.0).unwrap();
        scene.set_scale(b, 2.0, 0.5).unwrap();
        scene.set_pivot(b, 4.0, 4.0).unwrap();
        scene.set_shear(c, 10.0, -5.0).unwrap();
        scene.set_position(c, -3.0, 7.0).unwrap();
        scene.flush_queue(stage).unwrap();

        for (parent, child) in [(stage, a), (a, b), (a, c)] {
            let mut expected = *scene.node(parent).unwrap().world_transform();
            expected.append(scene.node(child).unwrap().transform().local_transform());
            assert!(
                scene
                    .node(child)
                    .unwrap()
                    .world_transform()
                    .approx_eq(&expected, 1e-4)
            );
        }

        // Out of draw order: change the parent, read the child through a bubble.
        scene.set_position(a, -5.0, 0.0).unwrap();
        scene.update_bubble(b, Components::ALL, 0).unwrap();
        let mut expected = *scene.node(a).unwrap().world_transform();
        expected.append(scene.node(b).unwrap().transform().local_transform());
        assert!(
            scene
                .node(b)
                .unwrap()
                .world_transform()
                .approx_eq(&expected, 1e-4)
        );
    }

    #[test]
    fn test_tint_multiplies_down_the_chain() {
        let mut scene = Scene::new();
        let (stage, a, b, _) = chain(&mut scene);
        scene.set_alpha(a, 0.5).unwrap();
        scene.set_tint(b, [1.0, 0.5, 1.0, 0.5]).unwrap();
        scene.flush_queue(stage).unwrap();

        let tint = scene.node(b).unwrap().world_tint();
        assert!(approx_eq(tint[1], 0.5));
        assert!(approx_eq(tint[3], 0.25));
    }

    #[test]
    fn test_stop_bits_block_inheritance() {
        let mut scene = Scene::new();
        let (stage, a, b, _) = chain(&mut scene);
        scene.set_update_stop(a, Components::TRANSFORM).unwrap();
        scene.set_position(a, 50.0, 0.0).unwrap();
        scene.set_position(b, 1.0, 0.0).unwrap();
        scene.flush_queue(stage).unwrap();

        assert!(approx_eq(scene.node(b).unwrap().world_transform().tx, 1.0));
    }

    #[test]
    fn test_changing_stop_bits_revalidates_children() {
        let mut scene = Scene::new();
        let (stage, a, b, c) = chain(&mut scene);
        scene.set_position(a, 50.0, 0.0).unwrap();
        scene.flush_queue(stage).unwrap();
        assert!(approx_eq(scene.node(b).unwrap().world_transform().tx, 50.0));

        scene.set_update_stop(a, Components::TRANSFORM).unwrap();
        scene.flush_queue(stage).unwrap();
        for id in [b, c] {
            assert!(approx_eq(scene.node(id).unwrap().world_transform().tx, 0.0));
        }

        scene.set_update_stop(a, Components::empty()).unwrap();
        assert!(approx_eq(scene.world_transform(c).unwrap().tx, 50.0));
        scene.flush_queue(stage).unwrap();
        assert!(approx_eq(scene.node(b).unwrap().world_transform().tx, 50.0));
    }

    #[test]
    fn test_optimized_mode_skips_clean_subtree() {
        let mut scene = Scene::new();
        let (_, a, b, c) = chain(&mut scene);
        let b_count = recomputes(&scene, b);
        let c_count = recomputes(&scene, c);

        scene
            .update_recursive(a, Components::ALL, UpdateMode::Optimized)
            .unwrap();
        assert_eq!(recomputes(&scene, b), b_count);
        assert_eq!(recomputes(&scene, c), c_count);

        scene
            .update_recursive(a, Components::ALL, UpdateMode::IgnoreMask)
            .unwrap();
        assert_eq!(recomputes(&scene, b), b_count + 1);
        assert_eq!(recomputes(&scene, c), c_count + 1);
    }

    #[test]
    fn test_full_mode_visits_but_does_not_recompute_clean_nodes() {
        let mut scene = Scene::new();
        let (_, a, b, c) = chain(&mut scene);
        scene.nodes.get_mut(c).unwrap().u_flags |= Components::BIT_4;

        scene
            .update_recursive(a, Components::ALL, UpdateMode::Full)
            .unwrap();
        assert!(scene.node(c).unwrap().u_flags().is_empty());
        assert!(!scene.node(b).unwrap().is_dirty());
    }

    #[test]
    fn test_reparent_updates_only_moved_branch() {
        let mut scene = Scene::new();
        let root = scene.create_stage();
        let a = scene.create_node();
        let b = scene.create_node();
        scene.add_child(root, a).unwrap();
        scene.add_child(a, b).unwrap();
        scene.set_rotation(b, 90.0).unwrap();
        scene.force_update(root).unwrap();

        let mut expected = Matrix::IDENTITY;
        expected.append(&Matrix::IDENTITY);
        expected.append(&Matrix::from_rotation_deg(90.0));
        assert!(
            scene
                .node(b)
                .unwrap()
                .world_transform()
                .approx_eq(&expected, 1e-5)
        );

        let c = scene.create_node();
        scene.set_position(c, 10.0, 0.0).unwrap();
        scene.add_child(root, c).unwrap();
        scene.flush_queue(root).unwrap();

        let root_count = recomputes(&scene, root);
        let a_count = recomputes(&scene, a);

        scene.add_child(c, b).unwrap();
        scene.invalidate(b, Components::TRANSFORM).unwrap();
        scene.flush_queue(root).unwrap();
        let epoch = scene.collection_of(root).unwrap().queue().update_id();
        scene.update_bubble(b, Components::ALL, epoch).unwrap();

        assert!(approx_eq(scene.node(b).unwrap().world_transform().tx, 10.0));
        assert_eq!(recomputes(&scene, root), root_count);
        assert_eq!(recomputes(&scene, a), a_count);
    }

    #[test]
    fn test_changes_before_search_fold_into_session() {
        let mut scene = Scene::new();
        let (stage, a, _, _) = chain(&mut scene);
        scene.set_position(a, 1.0, 0.0).unwrap();

        let pending = scene.take_queue_for_test(stage);
        scene.set_position(a, 2.0, 0.0).unwrap();
        for id in pending {
            scene.update_search(id).unwrap();
        }
        // The second change was folded into the same session.
        assert!(approx_eq(scene.node(a).unwrap().world_transform().tx, 2.0));
    }

    impl Scene {
        fn take_queue_for_test(&mut self, stage: NodeId) -> Vec<NodeId> {
            let coll = self.stage_collection(stage).unwrap();
            self.queue_mut(coll).unwrap().take_queue()
        }
    }
}
