//! Synchronous multi-listener signals.
//!
//! Listeners are called in priority order (higher first; equal priorities in
//! insertion order). A panicking listener is logged and skipped so the rest
//! still run.
//!
//! Listeners only receive the payload, never the scene. Any tree mutation a
//! listener wants must be recorded and applied by the caller afterwards; it is
//! then picked up by the next queue flush.

use std::panic::{AssertUnwindSafe, catch_unwind};

/// Handle returned by [`Signal::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener<T> {
    id: ListenerId,
    priority: i32,
    callback: Box<dyn FnMut(&T)>,
}

pub struct Signal<T> {
    listeners: Vec<Listener<T>>,
    next_id: u64,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    /// Register a listener. Higher `priority` runs earlier.
    pub fn add_listener(&mut self, priority: i32, callback: impl FnMut(&T) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;

        let pos = self
            .listeners
            .iter()
            .position(|l| l.priority < priority)
            .unwrap_or(self.listeners.len());
        self.listeners.insert(
            pos,
            Listener {
                id,
                priority,
                callback: Box::new(callback),
            },
        );
        id
    }

    pub fn has_listener(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|l| l.id == id)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Call every listener with `args`. Returns how many listeners panicked.
    pub fn emit(&mut self, args: &T) -> usize {
        let mut failed = 0;
        for listener in &mut self.listeners {
            let callback = &mut listener.callback;
            if catch_unwind(AssertUnwindSafe(|| callback(args))).is_err() {
                log::error!("Signal listener {:?} panicked", listener.id);
                failed += 1;
            }
        }
        failed
    }
}
