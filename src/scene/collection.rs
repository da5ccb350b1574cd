//! Attach/detach bookkeeping for subtrees.
//!
//! Every node belongs to exactly one collection. A stage owns a real collection
//! with its own [`UpdateQueue`]; every other node lives in the null collection,
//! whose invalidations are applied immediately instead of being queued.
//!
//! Detaching is two-phase: [`Scene::detach_child`] only moves the subtree to the
//! collection's detached set, and [`Scene::flush_detached`] removes whatever is
//! still there once per frame. A subtree detached and re-added in between keeps
//! its membership and never pays for a removal.

use std::collections::HashSet;

use crate::layers::LayerCollection;

use super::Scene;
use super::arena::NodeId;
use super::node::NodeEvent;
use super::queue::UpdateQueue;

/// Handle to a [`NodeCollection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CollectionId(u32);

impl CollectionId {
    /// The collection of nodes that are not part of any stage.
    pub const NULL: Self = Self(0);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

pub struct NodeCollection {
    id: CollectionId,
    stage: Option<NodeId>,
    pub(crate) attached: HashSet<NodeId>,
    pub(crate) detached: HashSet<NodeId>,
    pub(crate) queue: UpdateQueue,
    pub(crate) layers: LayerCollection,
    walk_pool: Vec<Vec<NodeId>>,
}

impl NodeCollection {
    pub(crate) fn new(id: CollectionId) -> Self {
        Self {
            id,
            stage: None,
            attached: HashSet::new(),
            detached: HashSet::new(),
            queue: UpdateQueue::new(),
            layers: LayerCollection::new(),
            walk_pool: Vec::new(),
        }
    }

    pub fn id(&self) -> CollectionId {
        self.id
    }

    /// Root node of the stage owning this collection.
    pub fn stage(&self) -> Option<NodeId> {
        self.stage
    }

    pub(crate) fn set_stage(&mut self, stage: NodeId) {
        self.stage = Some(stage);
    }

    pub fn queue(&self) -> &UpdateQueue {
        &self.queue
    }

    pub fn layers(&self) -> &LayerCollection {
        &self.layers
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        self.attached.contains(&node)
    }

    pub fn is_detached(&self, node: NodeId) -> bool {
        self.detached.contains(&node)
    }

    pub fn attached_len(&self) -> usize {
        self.attached.len()
    }

    pub fn detached_len(&self) -> usize {
        self.detached.len()
    }

    fn allocate_walk(&mut self) -> Vec<NodeId> {
        self.walk_pool.pop().unwrap_or_default()
    }

    fn return_walk(&mut self, mut walk: Vec<NodeId>) {
        walk.clear();
        self.walk_pool.push(walk);
    }
}

impl Scene {
    /// Adopt `root` and its descendants into `coll`.
    ///
    /// Every adopted node is forced to revalidate. Nodes coming from another
    /// collection are re-homed; nodes that were detached from `coll` earlier
    /// in the frame are simply taken off the detached set.
    pub(crate) fn add_subtree(&mut self, coll: CollectionId, root: NodeId) {
        if coll.is_null() {
            return;
        }
        let Scene {
            nodes, collections, ..
        } = self;
        let Some(collection) = collections.get_mut(coll.index()).and_then(Option::as_mut) else {
            return;
        };

        let mut walk = collection.allocate_walk();
        walk.push(root);
        let mut i = 0;
        while i < walk.len() {
            let x = walk[i];
            i += 1;
            let Some(node) = nodes.get_mut(x) else {
                continue;
            };

            // Reattached nodes were validated under their old parent.
            node.last_ctx_update_id = -1;
            if node.collection != coll {
                node.collection = coll;
                node.on_added.emit(&NodeEvent {
                    node: x,
                    collection: coll,
                });
            } else {
                collection.detached.remove(&x);
            }
            collection.attached.insert(x);
            debug_assert!(!collection.detached.contains(&x));

            walk.extend_from_slice(&node.children);
        }
        collection.return_walk(walk);
    }

    /// Move `root` and its descendants to the detached set of `coll`.
    pub(crate) fn detach_subtree(&mut self, coll: CollectionId, root: NodeId) {
        if coll.is_null() {
            return;
        }
        let Scene {
            nodes, collections, ..
        } = self;
        let Some(collection) = collections.get_mut(coll.index()).and_then(Option::as_mut) else {
            return;
        };

        let mut walk = collection.allocate_walk();
        walk.push(root);
        let mut i = 0;
        while i < walk.len() {
            let x = walk[i];
            i += 1;
            let Some(node) = nodes.get(x) else {
                continue;
            };
            // Already moved elsewhere, e.g. by an earlier removal.
            if node.collection != coll {
                continue;
            }
            collection.detached.insert(x);
            collection.attached.remove(&x);
            walk.extend_from_slice(&node.children);
        }
        collection.return_walk(walk);
    }

    /// Remove `root` and its descendants from `coll` right away.
    pub(crate) fn remove_subtree(&mut self, coll: CollectionId, root: NodeId) {
        if coll.is_null() {
            return;
        }
        let Scene {
            nodes, collections, ..
        } = self;
        let Some(collection) = collections.get_mut(coll.index()).and_then(Option::as_mut) else {
            return;
        };

        let mut walk = collection.allocate_walk();
        walk.push(root);
        let mut i = 0;
        while i < walk.len() {
            let x = walk[i];
            i += 1;
            let Some(node) = nodes.get_mut(x) else {
                continue;
            };
            if node.collection == coll {
                node.collection = CollectionId::NULL;
                node.on_removed.emit(&NodeEvent {
                    node: x,
                    collection: coll,
                });
            }
            collection.attached.remove(&x);
            collection.detached.remove(&x);
            walk.extend_from_slice(&node.children);
        }
        collection.return_walk(walk);
    }

    /// Remove every node still detached from the stage owning `stage`.
    ///
    /// Returns how many nodes were removed.
    pub fn flush_detached(&mut self, stage: NodeId) -> crate::Result<usize> {
        let coll = self.stage_collection(stage)?;
        Ok(self.flush_detached_in(coll))
    }

    pub(crate) fn flush_detached_in(&mut self, coll: CollectionId) -> usize {
        let Scene {
            nodes, collections, ..
        } = self;
        let Some(collection) = collections.get_mut(coll.index()).and_then(Option::as_mut) else {
            return 0;
        };
        if collection.detached.is_empty() {
            return 0;
        }

        let detached = std::mem::take(&mut collection.detached);
        let count = detached.len();
        for x in detached {
            let Some(node) = nodes.get_mut(x) else {
                continue;
            };
            if node.collection == coll {
                node.collection = CollectionId::NULL;
                node.on_removed.emit(&NodeEvent {
                    node: x,
                    collection: coll,
                });
            }
        }
        log::debug!("Flushed {} detached nodes from collection {:?}", count, coll);
        count
    }
}
