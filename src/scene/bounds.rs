//! World-space queries.
//!
//! Every read here first validates the stale part of the ancestor chain, so
//! the result is current even in the middle of a frame.

use crate::error::Result;
use crate::math::{Bounds, Matrix, Point, Rectangle};

use super::arena::NodeId;
use super::flags::{Components, UpdateMode};
use super::Scene;

impl Scene {
    /// Bring `id` up to date with the current epoch of its queue.
    fn validate_for_read(&mut self, id: NodeId) -> Result<()> {
        let coll = self.node_ref(id)?.collection;
        let epoch = match self.queue_mut(coll) {
            Some(queue) => {
                queue.flush_update_flags();
                queue.update_id()
            }
            None => 0,
        };
        self.update_bubble_inner(id, Components::ALL, epoch);
        Ok(())
    }

    /// Current world matrix of `id`.
    pub fn world_transform(&mut self, id: NodeId) -> Result<Matrix> {
        self.validate_for_read(id)?;
        Ok(*self.node_ref(id)?.transform.world_transform())
    }

    /// Map a point from the local space of `id` to world space.
    pub fn to_global(&mut self, id: NodeId, position: Point) -> Result<Point> {
        Ok(self.world_transform(id)?.apply(position))
    }

    /// Map a point to the local space of `id`. The point is in world space,
    /// or in the local space of `from` when given.
    pub fn to_local(&mut self, id: NodeId, position: Point, from: Option<NodeId>) -> Result<Point> {
        let global = match from {
            Some(from) => self.to_global(from, position)?,
            None => position,
        };
        Ok(self.world_transform(id)?.apply_inverse(global))
    }

    /// World-space bounds of `id` and its subtree, as reported by payloads.
    pub fn get_bounds(&mut self, id: NodeId) -> Result<Rectangle> {
        self.validate_for_read(id)?;
        // Descendants may hold their own pending changes.
        self.update_recursive(id, Components::ALL, UpdateMode::Full)?;

        let mut bounds = Bounds::new();
        let mut queue = self.take_walk_stack();
        queue.push(id);
        let mut i = 0;
        while i < queue.len() {
            let x = queue[i];
            i += 1;
            let Some(node) = self.nodes.get_mut(x) else {
                continue;
            };
            if let Some(mut payload) = node.payload.take() {
                if let Some(node) = self.nodes.get(x) {
                    payload.calculate_bounds(node, &mut bounds);
                }
                if let Some(node) = self.nodes.get_mut(x) {
                    node.payload = Some(payload);
                }
            }
            if let Some(node) = self.nodes.get(x) {
                queue.extend_from_slice(&node.children);
            }
        }
        self.return_walk_stack(queue);

        Ok(bounds.rectangle())
    }

    /// Bounds of the subtree with the world scale of `id` divided out.
    ///
    /// Exact only while `id` is not rotated or skewed.
    pub fn get_local_bounds(&mut self, id: NodeId) -> Result<Rectangle> {
        let mut rect = self.get_bounds(id)?;
        if !rect.is_empty() {
            let wt = self.node_ref(id)?.transform.world_transform();
            // A collapsed axis has no scale to divide out.
            if wt.a.abs() > f32::EPSILON {
                rect.width /= wt.a.abs();
            }
            if wt.d.abs() > f32::EPSILON {
                rect.height /= wt.d.abs();
            }
        }
        Ok(rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{Renderable, RenderContext};
    use crate::scene::Node;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    /// Unit square at the node's origin.
    struct Square;

    impl Renderable for Square {
        fn render(&mut self, _ctx: &mut RenderContext<'_>, _node: &Node) {}

        fn calculate_bounds(&mut self, node: &Node, bounds: &mut Bounds) {
            let wt = node.world_transform();
            for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                let p = wt.apply(Point::new(x, y));
                bounds.add_point(p.x, p.y);
            }
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_world_transform_reads_through_stale_parents() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let a = scene.create_node();
        let b = scene.create_node();
        scene.add_child(stage, a).unwrap();
        scene.add_child(a, b).unwrap();
        scene.flush_queue(stage).unwrap();

        scene.set_position(a, 5.0, 0.0).unwrap();
        scene.set_position(b, 0.0, 2.0).unwrap();
        let wt = scene.world_transform(b).unwrap();
        assert!(approx_eq(wt.tx, 5.0));
        assert!(approx_eq(wt.ty, 2.0));
    }

    #[test]
    fn test_to_global_and_back() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let a = scene.create_node();
        scene.add_child(stage, a).unwrap();
        scene.set_position(a, 10.0, 10.0).unwrap();
        scene.set_scale(a, 2.0, 2.0).unwrap();

        let global = scene.to_global(a, Point::new(1.0, 1.0)).unwrap();
        assert!(approx_eq(global.x, 12.0) && approx_eq(global.y, 12.0));

        let local = scene.to_local(a, global, None).unwrap();
        assert!(approx_eq(local.x, 1.0) && approx_eq(local.y, 1.0));
    }

    #[test]
    fn test_get_bounds_covers_subtree() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let a = scene.create_node_with(Box::new(Square));
        let b = scene.create_node_with(Box::new(Square));
        scene.add_child(stage, a).unwrap();
        scene.add_child(a, b).unwrap();
        scene.set_position(a, 1.0, 1.0).unwrap();
        scene.set_position(b, 4.0, 0.0).unwrap();

        let rect = scene.get_bounds(a).unwrap();
        assert!(approx_eq(rect.x, 1.0) && approx_eq(rect.y, 1.0));
        assert!(approx_eq(rect.width, 5.0) && approx_eq(rect.height, 1.0));

        scene.set_scale(a, 2.0, 2.0).unwrap();
        let local = scene.get_local_bounds(a).unwrap();
        assert!(approx_eq(local.width, 5.0));
    }

    #[test]
    fn test_local_bounds_with_collapsed_axis() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let a = scene.create_node_with(Box::new(Square));
        scene.add_child(stage, a).unwrap();
        scene.set_rotation(a, 90.0).unwrap();

        let local = scene.get_local_bounds(a).unwrap();
        assert!(local.width.is_finite() && local.height.is_finite());
        assert!(approx_eq(local.width, 1.0) && approx_eq(local.height, 1.0));
    }

    #[test]
    fn test_empty_bounds() {
        let mut scene = Scene::new();
        let a = scene.create_node();
        assert_eq!(scene.get_bounds(a).unwrap(), Rectangle::EMPTY);
    }
}
