//! Child list operations.
//!
//! Attaching a child adopts its whole subtree into the parent's collection
//! and forces it to inherit every component again. Removing cuts the subtree
//! back to the null collection right away; detaching leaves it in the
//! collection's detached set until [`Scene::flush_detached`], so it can be
//! re-added in the same frame without another walk.

use crate::error::{Result, SceneError};

use super::arena::NodeId;
use super::collection::CollectionId;
use super::flags::Components;
use super::Scene;

impl Scene {
    /// Append `child` to the children of `parent`, taking it away from its
    /// current parent first. Returns `child`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<NodeId> {
        let len = self.node_ref(parent)?.children.len();
        self.add_child_at(parent, child, len)
    }

    /// Insert `child` at `index` among the children of `parent`.
    pub fn add_child_at(&mut self, parent: NodeId, child: NodeId, index: usize) -> Result<NodeId> {
        let len = self.node_ref(parent)?.children.len();
        self.node_ref(child)?;
        if index > len {
            return Err(SceneError::IndexOutOfBounds { index, len });
        }
        if self.contains(child, parent) {
            return Err(SceneError::CyclicHierarchy);
        }

        self.adopt(parent, child);

        let node = self.node_mut(parent)?;
        let index = index.min(node.children.len());
        node.children.insert(index, child);
        Ok(child)
    }

    fn adopt(&mut self, parent: NodeId, child: NodeId) {
        let Some(node) = self.nodes.get(child) else {
            return;
        };
        if let Some(old_parent) = node.parent {
            self.remove_child_entry(old_parent, child);
        }

        let parent_coll = self
            .nodes
            .get(parent)
            .map(|p| p.collection)
            .unwrap_or(CollectionId::NULL);
        let child_coll = self
            .nodes
            .get(child)
            .map(|c| c.collection)
            .unwrap_or(CollectionId::NULL);
        if child_coll != parent_coll {
            self.remove_subtree(child_coll, child);
        }

        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
            node.u_flags_parent = Components::ALL;
        }
        self.invalidate_node(parent_coll, child);
        self.add_subtree(parent_coll, child);
    }

    /// Drop `child` from the list of `parent` and cut it loose.
    fn remove_child_entry(&mut self, parent: NodeId, child: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(parent) else {
            return false;
        };
        let Some(index) = node.children.iter().position(|&c| c == child) else {
            return false;
        };
        node.children.remove(index);
        let coll = node.collection;
        self.release(coll, child, false);
        true
    }

    /// Clear the parent link of `child` and take its subtree out of `coll`.
    fn release(&mut self, coll: CollectionId, child: NodeId, detach: bool) {
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
            node.u_flags_parent = Components::ALL;
        }
        if detach {
            self.detach_subtree(coll, child);
        } else {
            self.remove_subtree(coll, child);
        }
    }

    pub fn swap_children(&mut self, parent: NodeId, child1: NodeId, child2: NodeId) -> Result<()> {
        let index1 = self.get_child_index(parent, child1)?;
        let index2 = self.get_child_index(parent, child2)?;
        self.node_mut(parent)?.children.swap(index1, index2);
        Ok(())
    }

    pub fn swap_children_at(&mut self, parent: NodeId, index1: usize, index2: usize) -> Result<()> {
        let node = self.node_mut(parent)?;
        let len = node.children.len();
        for index in [index1, index2] {
            if index >= len {
                return Err(SceneError::IndexOutOfBounds { index, len });
            }
        }
        node.children.swap(index1, index2);
        Ok(())
    }

    pub fn get_child_index(&self, parent: NodeId, child: NodeId) -> Result<usize> {
        self.node_ref(parent)?
            .children
            .iter()
            .position(|&c| c == child)
            .ok_or(SceneError::NotAChild)
    }

    /// Move `child` to `index` within the children of `parent`.
    pub fn set_child_index(&mut self, parent: NodeId, child: NodeId, index: usize) -> Result<()> {
        let len = self.node_ref(parent)?.children.len();
        if index >= len {
            return Err(SceneError::IndexOutOfBounds { index, len });
        }
        let current = self.get_child_index(parent, child)?;
        let children = &mut self.node_mut(parent)?.children;
        children.remove(current);
        children.insert(index, child);
        Ok(())
    }

    pub fn get_child_at(&self, parent: NodeId, index: usize) -> Result<NodeId> {
        let children = &self.node_ref(parent)?.children;
        children
            .get(index)
            .copied()
            .ok_or(SceneError::IndexOutOfBounds {
                index,
                len: children.len(),
            })
    }

    /// Remove `child` from `parent`. Returns `None` if it is not a child.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<Option<NodeId>> {
        self.node_ref(parent)?;
        Ok(self.remove_child_entry(parent, child).then_some(child))
    }

    pub fn remove_child_at(&mut self, parent: NodeId, index: usize) -> Result<NodeId> {
        let child = self.get_child_at(parent, index)?;
        let node = self.node_mut(parent)?;
        node.children.remove(index);
        let coll = node.collection;
        self.release(coll, child, false);
        Ok(child)
    }

    /// Remove the children in `begin..end` (`end` defaults to the child count).
    pub fn remove_children(
        &mut self,
        parent: NodeId,
        begin: usize,
        end: Option<usize>,
    ) -> Result<Vec<NodeId>> {
        self.take_children(parent, begin, end, false)
    }

    /// Detach `child` from `parent`, keeping its collection membership until
    /// the next [`Scene::flush_detached`]. Returns `None` if it is not a child.
    pub fn detach_child(&mut self, parent: NodeId, child: NodeId) -> Result<Option<NodeId>> {
        let node = self.node_mut(parent)?;
        let Some(index) = node.children.iter().position(|&c| c == child) else {
            return Ok(None);
        };
        node.children.remove(index);
        let coll = node.collection;
        self.release(coll, child, true);
        Ok(Some(child))
    }

    pub fn detach_child_at(&mut self, parent: NodeId, index: usize) -> Result<NodeId> {
        let child = self.get_child_at(parent, index)?;
        let node = self.node_mut(parent)?;
        node.children.remove(index);
        let coll = node.collection;
        self.release(coll, child, true);
        Ok(child)
    }

    /// Detach the children in `begin..end` (`end` defaults to the child count).
    pub fn detach_children(
        &mut self,
        parent: NodeId,
        begin: usize,
        end: Option<usize>,
    ) -> Result<Vec<NodeId>> {
        self.take_children(parent, begin, end, true)
    }

    fn take_children(
        &mut self,
        parent: NodeId,
        begin: usize,
        end: Option<usize>,
        detach: bool,
    ) -> Result<Vec<NodeId>> {
        let node = self.node_mut(parent)?;
        let len = node.children.len();
        let end = end.unwrap_or(len);

        if begin < end && end <= len {
            let removed: Vec<NodeId> = node.children.drain(begin..end).collect();
            let coll = node.collection;
            for &child in &removed {
                self.release(coll, child, detach);
            }
            Ok(removed)
        } else if begin == end && len == 0 {
            Ok(Vec::new())
        } else {
            Err(SceneError::InvalidRange { begin, end, len })
        }
    }

    /// Whether `node` is `ancestor` itself or one of its descendants.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(x) = current {
            if x == ancestor {
                return true;
            }
            current = self.nodes.get(x).and_then(|n| n.parent);
        }
        false
    }

    /// Destroy `id`. With `children` the whole subtree is destroyed
    /// breadth-first; otherwise the children become standalone roots.
    pub fn destroy(&mut self, id: NodeId, children: bool) -> Result<()> {
        let node = self.node_ref(id)?;
        if let Some(parent) = node.parent {
            self.remove_child_entry(parent, id);
        }
        let coll = self.node_ref(id)?.collection;
        self.remove_subtree(coll, id);

        let mut queue = self.remove_children(id, 0, None)?;
        self.destroy_node(id);

        if children {
            let mut i = 0;
            while i < queue.len() {
                let x = queue[i];
                i += 1;
                let grandchildren = self.remove_children(x, 0, None)?;
                self.destroy_node(x);
                queue.extend(grandchildren);
            }
            log::debug!("Destroyed subtree of {} nodes", queue.len() + 1);
        }
        Ok(())
    }

    fn destroy_node(&mut self, id: NodeId) {
        let Some(mut node) = self.nodes.remove(id) else {
            return;
        };
        if let Some(layer) = node.layer {
            self.forget_layer(layer);
        }
        if let Some(mut payload) = node.payload.take() {
            payload.destroy();
        }
    }
}
