use bitflags::bitflags;

bitflags! {
    /// Per-node components tracked by the dirty-flag engine.
    ///
    /// The low three bits have built-in meaning; the remaining bits are free for
    /// application components that piggyback on the same propagation.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Components: u32 {
        /// World transform must be recomputed from the parent
        const TRANSFORM = 1 << 0;
        /// World tint/alpha must be recomputed from the parent
        const ALPHATINT = 1 << 1;
        /// World cull flags must be recomputed from the parent
        const CULL      = 1 << 2;
        const BIT_3     = 1 << 3;
        const BIT_4     = 1 << 4;
        const BIT_5     = 1 << 5;
        const BIT_6     = 1 << 6;
        const BIT_7     = 1 << 7;
        /// Every bit, including ones without a name
        const ALL       = !0;
    }
}

bitflags! {
    /// Culling state. A node is drawn only when its world flags are empty.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CullFlags: u8 {
        /// Hidden: the subtree is skipped by traversal and by queue validation
        const INVISIBLE      = 0b01;
        /// Not drawn, but still validated
        const NON_RENDERABLE = 0b10;
    }
}

/// Traversal intent for [`Scene::update_recursive`](crate::scene::Scene::update_recursive).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdateMode {
    /// Recurse into children only when something must be pushed down.
    Optimized = 0,
    /// Stamp each visited node with the queue epoch and merge flags already
    /// pushed by an out-of-order query.
    MarkEpoch = 1,
    /// Visit the whole subtree regardless of masks.
    Full = 2,
    /// Like `Full`, but every visited node first treats the whole mask as
    /// dirty from its parent.
    IgnoreMask = 3,
}

impl UpdateMode {
    /// Whether this mode walks children even when nothing is pushed.
    pub fn always_recurses(self) -> bool {
        self >= UpdateMode::Full
    }
}
