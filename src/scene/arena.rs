//! Arena storage for scene nodes.
//!
//! Nodes live in a dense `Vec` for cache-friendly iteration, with a sparse map
//! from stable [`NodeId`]s to dense positions:
//!
//! - **Generational ids**: a `NodeId` carries the generation of its slot, so a
//!   stale id never resolves to a node later allocated in the same slot.
//! - **Swap-remove**: removal moves the last node into the hole, keeping the
//!   dense array packed; the moved node's sparse entry is patched.

use super::node::Node;

/// Handle to a node in a [`Scene`](crate::scene::Scene).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Combine generation (high bits) and index (low bits), e.g. for logging.
    pub fn as_u64(self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }
}

struct SparseEntry {
    dense_index: usize,
    generation: u32,
}

pub(crate) struct NodeArena {
    dense: Vec<Node>,
    /// Sparse slot index of each dense node, for swap-remove fixup
    dense_owner: Vec<u32>,
    sparse: Vec<Option<SparseEntry>>,
    /// Last generation handed out per sparse slot
    generations: Vec<u32>,
    free_indices: Vec<u32>,
}

impl NodeArena {
    pub(crate) fn new() -> Self {
        Self {
            dense: Vec::new(),
            dense_owner: Vec::new(),
            sparse: Vec::new(),
            generations: Vec::new(),
            free_indices: Vec::new(),
        }
    }

    /// Store a node built by `make`, which receives the id it will live under.
    pub(crate) fn insert_with(&mut self, make: impl FnOnce(NodeId) -> Node) -> NodeId {
        let (sparse_index, generation) = if let Some(idx) = self.free_indices.pop() {
            let generation = self.generations[idx as usize].wrapping_add(1);
            self.generations[idx as usize] = generation;
            (idx, generation)
        } else {
            let idx = self.sparse.len() as u32;
            self.sparse.push(None);
            self.generations.push(0);
            (idx, 0)
        };

        let id = NodeId::new(sparse_index, generation);
        let dense_index = self.dense.len();
        self.dense.push(make(id));
        self.dense_owner.push(sparse_index);
        self.sparse[sparse_index as usize] = Some(SparseEntry {
            dense_index,
            generation,
        });
        id
    }

    /// Remove a node, returning it. Stale ids return `None`.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node> {
        let dense_index = self.dense_index(id)?;
        let last = self.dense.len() - 1;

        let removed = self.dense.swap_remove(dense_index);
        self.dense_owner.swap_remove(dense_index);

        if dense_index != last {
            let moved = self.dense_owner[dense_index];
            if let Some(entry) = self.sparse[moved as usize].as_mut() {
                entry.dense_index = dense_index;
            }
        }

        self.sparse[id.index as usize] = None;
        self.free_indices.push(id.index);
        Some(removed)
    }

    fn dense_index(&self, id: NodeId) -> Option<usize> {
        self.sparse
            .get(id.index as usize)
            .and_then(|e| e.as_ref())
            .filter(|e| e.generation == id.generation)
            .map(|e| e.dense_index)
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.dense_index(id).is_some()
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.dense_index(id).map(|idx| &self.dense[idx])
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.dense_index(id).map(|idx| &mut self.dense[idx])
    }

    /// Mutable access to two distinct nodes at once.
    pub(crate) fn pair_mut(&mut self, a: NodeId, b: NodeId) -> Option<(&mut Node, &mut Node)> {
        let ia = self.dense_index(a)?;
        let ib = self.dense_index(b)?;
        if ia == ib {
            return None;
        }
        if ia < ib {
            let (lo, hi) = self.dense.split_at_mut(ib);
            Some((&mut lo[ia], &mut hi[0]))
        } else {
            let (lo, hi) = self.dense.split_at_mut(ia);
            Some((&mut hi[0], &mut lo[ib]))
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.dense.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Node> {
        self.dense.iter()
    }
}
