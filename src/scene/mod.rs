//! Retained scene graph with lazy, incremental state propagation.
//!
//! The [`Scene`] owns every node, collection, layer and group. Nodes are
//! addressed by generational [`NodeId`]s; collaborators never hold references
//! into the graph.
//!
//! ## Key Features
//!
//! - **Dirty-flag engine**: each node tracks which components (transform,
//!   tint, culling, custom bits) are stale and pushes staleness to its
//!   children only when something actually changed. See [`update`].
//!
//! - **Update queues**: a stage's collection queues invalidated nodes once per
//!   dirty session and validates them in one flush per frame.
//!
//! - **Two-phase detach**: subtrees detached and re-added in the same frame
//!   keep their bookkeeping; leftovers are reconciled by
//!   [`Scene::flush_detached`].
//!
//! - **Out-of-order reads**: world-space queries bubble validation up the
//!   stale part of the ancestor chain first, so they are always current.
//!
//! Scratch buffers owned by the scene and its collections are reused across
//! calls and are not reentrant. Signal listeners only receive ids, so they
//! cannot mutate the graph while a walk is in progress.

mod arena;
mod bounds;
mod collection;
mod flags;
mod hierarchy;
mod node;
mod queue;
pub mod update;

pub use arena::NodeId;
pub use collection::{CollectionId, NodeCollection};
pub use flags::{Components, CullFlags, UpdateMode};
pub use node::{Node, NodeEvent};
pub use queue::UpdateQueue;

use crate::display::Renderable;
use crate::error::{Result, SceneError};
use crate::layers::{ConflictLog, Group, Layer};
use crate::signal::Signal;
use crate::transform::Transform;

use arena::NodeArena;

pub struct Scene {
    pub(crate) nodes: NodeArena,
    /// Index 0 is the null collection
    pub(crate) collections: Vec<Option<NodeCollection>>,
    pub(crate) groups: Vec<Group>,
    pub(crate) layers: Vec<Layer>,
    pub(crate) display_update_counter: u64,
    pub(crate) conflict_log: ConflictLog,
    /// Worklist for recursive updates
    walk_stack: Vec<NodeId>,
    next_uid: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            nodes: NodeArena::new(),
            collections: vec![Some(NodeCollection::new(CollectionId::NULL))],
            groups: Vec::new(),
            layers: Vec::new(),
            display_update_counter: 0,
            conflict_log: ConflictLog::default(),
            walk_stack: Vec::new(),
            next_uid: 1,
        }
    }

    /// Create a standalone node in the null collection.
    pub fn create_node(&mut self) -> NodeId {
        let uid = self.next_uid;
        self.next_uid += 1;
        self.nodes.insert_with(|id| Node::new(id, uid))
    }

    /// Create a standalone node carrying a renderable payload.
    pub fn create_node_with(&mut self, payload: Box<dyn Renderable>) -> NodeId {
        let id = self.create_node();
        if let Some(node) = self.nodes.get_mut(id) {
            node.payload = Some(payload);
        }
        id
    }

    /// Create the root of a new stage.
    ///
    /// A stage owns its own collection (with update queue and layer
    /// collection) and stops every component, so its children compute world
    /// state from identity.
    pub fn create_stage(&mut self) -> NodeId {
        let coll = CollectionId::from_index(self.collections.len());
        let mut collection = NodeCollection::new(coll);

        let stage = self.create_node();
        collection.set_stage(stage);
        collection.attached.insert(stage);
        self.collections.push(Some(collection));

        if let Some(node) = self.nodes.get_mut(stage) {
            node.collection = coll;
            node.u_flags_stop = Components::ALL;
        }
        log::debug!("Created stage {:#x} with collection {:?}", stage.as_u64(), coll);
        stage
    }

    pub fn is_alive(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node_ref(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id).ok_or(SceneError::StaleNode(id.as_u64()))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or(SceneError::StaleNode(id.as_u64()))
    }

    pub fn collection(&self, id: CollectionId) -> Option<&NodeCollection> {
        self.collections.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn collection_mut(&mut self, id: CollectionId) -> Option<&mut NodeCollection> {
        self.collections.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Collection the node currently belongs to.
    pub fn collection_of(&self, id: NodeId) -> Result<&NodeCollection> {
        let coll = self.node_ref(id)?.collection;
        self.collection(coll)
            .ok_or(SceneError::StaleNode(id.as_u64()))
    }

    pub(crate) fn queue_mut(&mut self, coll: CollectionId) -> Option<&mut UpdateQueue> {
        self.collection_mut(coll).map(|c| &mut c.queue)
    }

    /// Epoch of the queue the node is validated against.
    pub(crate) fn queue_update_id(&self, coll: CollectionId) -> i64 {
        self.collection(coll)
            .map(|c| c.queue.update_id())
            .unwrap_or(0)
    }

    pub fn is_stage(&self, id: NodeId) -> bool {
        self.nodes
            .get(id)
            .and_then(|n| self.collection(n.collection))
            .is_some_and(|c| c.stage() == Some(id))
    }

    /// Collection owned by the stage rooted at `stage`.
    pub(crate) fn stage_collection(&self, stage: NodeId) -> Result<CollectionId> {
        let coll = self.node_ref(stage)?.collection;
        if coll.is_null() || !self.is_stage(stage) {
            return Err(SceneError::NotAStage(stage.as_u64()));
        }
        Ok(coll)
    }

    /// Root of the stage the node is attached to, if any.
    pub fn stage_of(&self, id: NodeId) -> Option<NodeId> {
        let node = self.nodes.get(id)?;
        self.collection(node.collection)?.stage()
    }

    pub(crate) fn take_walk_stack(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.walk_stack)
    }

    pub(crate) fn return_walk_stack(&mut self, mut stack: Vec<NodeId>) {
        stack.clear();
        self.walk_stack = stack;
    }

    // === Payload ===

    pub fn set_payload(&mut self, id: NodeId, payload: Option<Box<dyn Renderable>>) -> Result<()> {
        self.node_mut(id)?.payload = payload;
        Ok(())
    }

    /// Borrow the payload as its concrete type.
    pub fn payload_mut<T: Renderable + 'static>(&mut self, id: NodeId) -> Option<&mut T> {
        self.nodes
            .get_mut(id)?
            .payload
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// Signal fired when the node joins a stage collection.
    pub fn on_added(&mut self, id: NodeId) -> Result<&mut Signal<NodeEvent>> {
        Ok(&mut self.node_mut(id)?.on_added)
    }

    /// Signal fired when the node leaves a stage collection.
    pub fn on_removed(&mut self, id: NodeId) -> Result<&mut Signal<NodeEvent>> {
        Ok(&mut self.node_mut(id)?.on_removed)
    }

    // === Transform component ===

    fn modify_transform(&mut self, id: NodeId, f: impl FnOnce(&mut Transform) -> bool) -> Result<()> {
        let became_dirty = f(&mut self.node_mut(id)?.transform);
        if became_dirty {
            self.invalidate(id, Components::TRANSFORM)?;
        }
        Ok(())
    }

    pub fn set_position(&mut self, id: NodeId, x: f32, y: f32) -> Result<()> {
        self.modify_transform(id, |t| t.set_position(x, y))
    }

    pub fn set_scale(&mut self, id: NodeId, x: f32, y: f32) -> Result<()> {
        self.modify_transform(id, |t| t.set_scale(x, y))
    }

    pub fn set_pivot(&mut self, id: NodeId, x: f32, y: f32) -> Result<()> {
        self.modify_transform(id, |t| t.set_pivot(x, y))
    }

    /// Set rotation in degrees.
    pub fn set_rotation(&mut self, id: NodeId, degrees: f32) -> Result<()> {
        self.modify_transform(id, |t| t.set_rotation(degrees))
    }

    /// Set shear angles in degrees.
    pub fn set_shear(&mut self, id: NodeId, x: f32, y: f32) -> Result<()> {
        self.modify_transform(id, |t| t.set_shear(x, y))
    }

    pub fn set_skew(&mut self, id: NodeId, x: f32, y: f32) -> Result<()> {
        self.modify_transform(id, |t| t.set_skew(x, y))
    }

    /// Decompose `matrix` into the node's local transform.
    pub fn set_from_matrix(&mut self, id: NodeId, matrix: &crate::math::Matrix) -> Result<()> {
        self.modify_transform(id, |t| t.set_from_matrix(matrix))
    }

    // === Tint component ===

    /// Set the local RGBA multiplier.
    pub fn set_tint(&mut self, id: NodeId, rgba: [f32; 4]) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.tint == rgba {
            return Ok(());
        }
        node.tint = rgba;
        self.invalidate(id, Components::ALPHATINT)
    }

    pub fn set_alpha(&mut self, id: NodeId, alpha: f32) -> Result<()> {
        let mut rgba = self.node_ref(id)?.tint;
        rgba[3] = alpha;
        self.set_tint(id, rgba)
    }

    // === Cull component ===

    /// Show or hide the subtree. Hidden subtrees are neither drawn nor
    /// validated by queue flushes.
    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.is_visible() == visible {
            return Ok(());
        }
        node.cull_flags.toggle(CullFlags::INVISIBLE);

        if visible {
            // A hidden node may already hold pending flags that the queue
            // skipped; make sure it is searched again.
            node.u_flags |= Components::CULL;
            let coll = node.collection;
            if let Some(queue) = self.queue_mut(coll) {
                queue.mark(Components::CULL);
            }
            self.invalidate_node(coll, id);
            Ok(())
        } else {
            self.invalidate(id, Components::CULL)
        }
    }

    /// Exclude the subtree from drawing while keeping it validated.
    pub fn set_renderable(&mut self, id: NodeId, renderable: bool) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.is_renderable() == renderable {
            return Ok(());
        }
        node.cull_flags.toggle(CullFlags::NON_RENDERABLE);
        self.invalidate(id, Components::CULL)
    }

    /// Set which components do not propagate past this node.
    ///
    /// Children validated under the old mask are pushed the changed
    /// components again.
    pub fn set_update_stop(&mut self, id: NodeId, stop: Components) -> Result<()> {
        let node = self.node_mut(id)?;
        let changed = node.u_flags_stop ^ stop;
        if changed.is_empty() {
            return Ok(());
        }
        node.u_flags_stop = stop;
        node.u_flags_children |= changed;
        let coll = node.collection;
        if coll.is_null() {
            return self.update_with_children(id, Components::ALL);
        }
        if let Some(queue) = self.queue_mut(coll) {
            queue.mark(changed);
            queue.push(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_node_defaults() {
        let mut scene = Scene::new();
        let id = scene.create_node();
        let node = scene.node(id).unwrap();
        assert_eq!(node.collection(), CollectionId::NULL);
        assert!(node.parent().is_none());
        assert!(node.is_visible());
        assert_eq!(node.world_tint(), [1.0; 4]);
    }

    #[test]
    fn test_uids_are_unique() {
        let mut scene = Scene::new();
        let a = scene.create_node();
        let b = scene.create_node();
        assert_ne!(scene.node(a).unwrap().uid(), scene.node(b).unwrap().uid());
    }

    #[test]
    fn test_stage_owns_collection() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        assert!(scene.is_stage(stage));
        assert_eq!(scene.stage_of(stage), Some(stage));
        assert_eq!(scene.node(stage).unwrap().u_flags_stop(), Components::ALL);

        let plain = scene.create_node();
        assert!(!scene.is_stage(plain));
        assert_eq!(
            scene.flush_detached(plain),
            Err(SceneError::NotAStage(plain.as_u64()))
        );
    }

    #[test]
    fn test_standalone_changes_apply_immediately() {
        let mut scene = Scene::new();
        let id = scene.create_node();
        scene.set_position(id, 4.0, 5.0).unwrap();
        let wt = *scene.node(id).unwrap().world_transform();
        assert_eq!((wt.tx, wt.ty), (4.0, 5.0));
        assert!(!scene.node(id).unwrap().is_dirty());
    }

    #[test]
    fn test_tint_unchanged_is_noop() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        scene.set_tint(stage, [1.0; 4]).unwrap();
        assert!(scene.node(stage).unwrap().u_flags().is_empty());
    }

    #[test]
    fn test_stale_node_errors() {
        let mut scene = Scene::new();
        let id = scene.create_node();
        scene.destroy(id, true).unwrap();
        assert!(matches!(
            scene.set_position(id, 1.0, 1.0),
            Err(SceneError::StaleNode(_))
        ));
    }
}
