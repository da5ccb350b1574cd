use super::arena::NodeId;
use super::flags::Components;

/// Per-collection update queue.
///
/// Holds the epoch counter nodes are validated against, the union of component
/// flags invalidated since the last epoch, and the nodes waiting for a search
/// pass. The scratch stack is reused by searches and bubbles; it is not
/// reentrant.
#[derive(Debug, Default)]
pub struct UpdateQueue {
    update_id: i64,
    u_flags: Components,
    queue: Vec<NodeId>,
    queue_update_id: u64,
    pub(crate) temp_parent_stack: Vec<NodeId>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current validation epoch.
    pub fn update_id(&self) -> i64 {
        self.update_id
    }

    /// Union of components invalidated since the last epoch bump.
    pub fn u_flags(&self) -> Components {
        self.u_flags
    }

    /// Number of completed queue flushes.
    pub fn queue_update_id(&self) -> u64 {
        self.queue_update_id
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn pending(&self) -> &[NodeId] {
        &self.queue
    }

    pub(crate) fn mark(&mut self, mask: Components) {
        self.u_flags |= mask;
    }

    pub(crate) fn push(&mut self, node: NodeId) {
        self.queue.push(node);
    }

    /// Start a new epoch if anything was invalidated since the last one.
    /// Returns whether the epoch advanced.
    pub fn flush_update_flags(&mut self) -> bool {
        if self.u_flags.is_empty() {
            return false;
        }
        self.u_flags = Components::empty();
        self.update_id += 1;
        true
    }

    /// Swap out the pending nodes. Nodes queued from now on wait for the next flush.
    pub(crate) fn take_queue(&mut self) -> Vec<NodeId> {
        self.queue_update_id += 1;
        std::mem::take(&mut self.queue)
    }

    /// Hand back a drained buffer so its allocation is reused.
    pub(crate) fn recycle(&mut self, mut buffer: Vec<NodeId>) {
        buffer.clear();
        if self.queue.is_empty() && self.queue.capacity() < buffer.capacity() {
            self.queue = buffer;
        }
    }
}
