use crate::display::Renderable;
use crate::layers::{LayerId, View};
use crate::math::Matrix;
use crate::signal::Signal;
use crate::transform::Transform;

use super::arena::NodeId;
use super::collection::CollectionId;
use super::flags::{Components, CullFlags};

/// Payload of [`Node::on_added`] and [`Node::on_removed`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeEvent {
    pub node: NodeId,
    pub collection: CollectionId,
}

/// A scene graph entity.
///
/// Nodes are owned by the [`Scene`](super::Scene) arena and addressed by
/// [`NodeId`]. Everything that changes inherited state goes through the scene so
/// the dirty flags stay consistent; this type only exposes reads.
pub struct Node {
    id: NodeId,
    uid: u64,

    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,

    pub(crate) transform: Transform,
    pub(crate) tint: [f32; 4],
    pub(crate) world_tint: [f32; 4],
    pub(crate) cull_flags: CullFlags,
    pub(crate) world_cull_flags: CullFlags,

    // Dirty-flag state machine
    pub(crate) u_flags: Components,
    pub(crate) u_flags_stop: Components,
    pub(crate) u_flags_parent: Components,
    pub(crate) u_flags_children: Components,
    pub(crate) u_flags_pushed: Components,
    pub(crate) last_ctx_update_id: i64,

    pub(crate) collection: CollectionId,

    pub(crate) payload: Option<Box<dyn Renderable>>,
    pub(crate) view: View,
    pub(crate) layer: Option<LayerId>,

    /// Number of updates that recomputed at least one component
    pub(crate) recompute_count: u64,

    pub on_added: Signal<NodeEvent>,
    pub on_removed: Signal<NodeEvent>,
}

impl Node {
    pub(crate) fn new(id: NodeId, uid: u64) -> Self {
        Self {
            id,
            uid,
            parent: None,
            children: Vec::new(),
            transform: Transform::new(),
            tint: [1.0; 4],
            world_tint: [1.0; 4],
            cull_flags: CullFlags::empty(),
            world_cull_flags: CullFlags::empty(),
            u_flags: Components::empty(),
            u_flags_stop: Components::empty(),
            u_flags_parent: Components::empty(),
            u_flags_children: Components::empty(),
            u_flags_pushed: Components::empty(),
            last_ctx_update_id: 0,
            collection: CollectionId::NULL,
            payload: None,
            view: View::default(),
            layer: None,
            recompute_count: 0,
            on_added: Signal::new(),
            on_removed: Signal::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Process-unique integer id; never reused, unlike arena slots.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// World matrix as of the last update that reached this node.
    ///
    /// Use [`Scene::world_transform`](super::Scene::world_transform) for a
    /// value that is guaranteed current.
    pub fn world_transform(&self) -> &Matrix {
        self.transform.world_transform()
    }

    /// Local RGBA multiplier.
    pub fn tint(&self) -> [f32; 4] {
        self.tint
    }

    pub fn world_tint(&self) -> [f32; 4] {
        self.world_tint
    }

    pub fn world_alpha(&self) -> f32 {
        self.world_tint[3]
    }

    pub fn cull_flags(&self) -> CullFlags {
        self.cull_flags
    }

    pub fn world_cull_flags(&self) -> CullFlags {
        self.world_cull_flags
    }

    pub fn is_visible(&self) -> bool {
        !self.cull_flags.contains(CullFlags::INVISIBLE)
    }

    pub fn is_renderable(&self) -> bool {
        !self.cull_flags.contains(CullFlags::NON_RENDERABLE)
    }

    /// Components locally dirty on this node.
    pub fn u_flags(&self) -> Components {
        self.u_flags
    }

    /// Components that do not propagate past this node.
    pub fn u_flags_stop(&self) -> Components {
        self.u_flags_stop
    }

    /// Components the parent marked dirty that this node has not consumed.
    pub fn u_flags_parent(&self) -> Components {
        self.u_flags_parent
    }

    /// Components still to be pushed to the children.
    pub fn u_flags_children(&self) -> Components {
        self.u_flags_children
    }

    /// Components already pushed to the children this epoch.
    pub fn u_flags_pushed(&self) -> Components {
        self.u_flags_pushed
    }

    /// Queue epoch this node was last fully validated against.
    pub fn last_ctx_update_id(&self) -> i64 {
        self.last_ctx_update_id
    }

    pub fn collection(&self) -> CollectionId {
        self.collection
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    /// Layer owned by this node, if any.
    pub fn layer(&self) -> Option<LayerId> {
        self.layer
    }

    pub fn payload(&self) -> Option<&dyn Renderable> {
        self.payload.as_deref()
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    pub fn recompute_count(&self) -> u64 {
        self.recompute_count
    }

    /// Whether any component is pending on this node or pushed by its parent.
    pub fn is_dirty(&self) -> bool {
        !(self.u_flags | self.u_flags_parent).is_empty()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("uid", &self.uid)
            .field("parent", &self.parent)
            .field("children", &self.children.len())
            .field("u_flags", &self.u_flags)
            .field("last_ctx_update_id", &self.last_ctx_update_id)
            .field("collection", &self.collection)
            .finish()
    }
}
