//! Single-active-renderer batching.
//!
//! Exactly one [`ObjectRenderer`] owns draw authority at a time. Switching
//! stops the previous one, which flushes whatever it had queued, then
//! applies the new renderer's fixed-function state and starts it. Payloads
//! of different kinds can interleave freely without flushing by hand.

use std::any::Any;

use crate::settings::RendererSettings;
use crate::stats;

use super::blend::GlState;
use super::sink::GpuSink;
use super::sprite::{SpriteEntry, SpriteRenderer};
use super::state::{DrawTarget, StateSystem};

/// A renderer that batches one kind of payload.
pub trait ObjectRenderer {
    /// Fixed-function state applied when this renderer takes over.
    fn state(&self) -> GlState {
        GlState::for_2d()
    }

    /// The GPU context was (re)created. Drop anything tied to the old one.
    fn context_change(&mut self, _max_texture_units: u32) {}

    /// Called once at the start of every frame.
    fn prerender(&mut self) {}

    fn start(&mut self, _gl: &mut DrawTarget<'_>) {}

    fn stop(&mut self, gl: &mut DrawTarget<'_>) {
        self.flush(gl);
    }

    /// Draw everything queued so far.
    fn flush(&mut self, gl: &mut DrawTarget<'_>);

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Placeholder that holds authority between real renderers.
#[derive(Debug, Default)]
pub struct EmptyRenderer;

impl ObjectRenderer for EmptyRenderer {
    fn flush(&mut self, _gl: &mut DrawTarget<'_>) {}

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Which renderer of a [`BatchSystem`] is meant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RendererSlot {
    Empty,
    Sprite,
    /// Index returned by [`BatchSystem::add_renderer`]
    Custom(usize),
}

pub struct BatchSystem {
    state: StateSystem,
    empty: EmptyRenderer,
    sprite: SpriteRenderer,
    custom: Vec<Box<dyn ObjectRenderer>>,
    current: RendererSlot,
}

impl BatchSystem {
    pub fn new(settings: &RendererSettings) -> Self {
        Self {
            state: StateSystem::new(),
            empty: EmptyRenderer,
            sprite: SpriteRenderer::new(settings),
            custom: Vec::new(),
            current: RendererSlot::Empty,
        }
    }

    /// Register an extra object renderer.
    pub fn add_renderer(&mut self, renderer: Box<dyn ObjectRenderer>) -> RendererSlot {
        self.custom.push(renderer);
        RendererSlot::Custom(self.custom.len() - 1)
    }

    pub fn current(&self) -> RendererSlot {
        self.current
    }

    pub fn sprite_renderer(&self) -> &SpriteRenderer {
        &self.sprite
    }

    pub fn sprite_renderer_mut(&mut self) -> &mut SpriteRenderer {
        &mut self.sprite
    }

    /// A registered renderer by concrete type.
    pub fn renderer_mut<T: ObjectRenderer + 'static>(&mut self, slot: RendererSlot) -> Option<&mut T> {
        pick(&mut self.empty, &mut self.sprite, &mut self.custom, slot)?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// Hand draw authority to `slot`. No-op if it already has it.
    pub fn set_object_renderer(&mut self, slot: RendererSlot, sink: &mut dyn GpuSink) {
        if slot == self.current {
            return;
        }
        if let RendererSlot::Custom(i) = slot {
            if i >= self.custom.len() {
                log::warn!("No object renderer registered in slot {}", i);
                return;
            }
        }

        let previous = self.current;
        let Self {
            state,
            empty,
            sprite,
            custom,
            current,
        } = self;

        let mut gl = DrawTarget::new(sink, state);
        if let Some(renderer) = pick(empty, sprite, custom, previous) {
            renderer.stop(&mut gl);
        }
        *current = slot;
        if let Some(renderer) = pick(empty, sprite, custom, slot) {
            gl.set_state(renderer.state());
            renderer.start(&mut gl);
        }

        log::trace!("Object renderer {:?} -> {:?}", previous, slot);
        stats::record_renderer_switch();
    }

    /// Start the renderer that currently holds authority.
    pub fn start_current(&mut self, sink: &mut dyn GpuSink) {
        let current = self.current;
        let Self {
            state,
            empty,
            sprite,
            custom,
            ..
        } = self;
        if let Some(renderer) = pick(empty, sprite, custom, current) {
            let mut gl = DrawTarget::new(sink, state);
            gl.set_state(renderer.state());
            renderer.start(&mut gl);
        }
    }

    /// Flush the renderer that currently holds authority, keeping it active.
    pub fn flush_current(&mut self, sink: &mut dyn GpuSink) {
        let current = self.current;
        let Self {
            state,
            empty,
            sprite,
            custom,
            ..
        } = self;
        if let Some(renderer) = pick(empty, sprite, custom, current) {
            renderer.flush(&mut DrawTarget::new(sink, state));
        }
    }

    /// Flush and hand authority back to the empty renderer.
    pub fn flush(&mut self, sink: &mut dyn GpuSink) {
        self.set_object_renderer(RendererSlot::Empty, sink);
    }

    /// Queue a sprite with the sprite batcher, switching to it if needed.
    pub fn render_sprite(&mut self, sprite: SpriteEntry, sink: &mut dyn GpuSink) {
        self.set_object_renderer(RendererSlot::Sprite, sink);
        self.sprite
            .render(sprite, &mut DrawTarget::new(sink, &mut self.state));
    }

    pub fn prerender(&mut self) {
        self.empty.prerender();
        self.sprite.prerender();
        for renderer in &mut self.custom {
            renderer.prerender();
        }
    }

    /// Forget all GPU-side state and tell every renderer about the new
    /// context.
    pub fn context_change(&mut self, max_texture_units: u32) {
        self.state.reset();
        self.current = RendererSlot::Empty;
        self.empty.context_change(max_texture_units);
        self.sprite.context_change(max_texture_units);
        for renderer in &mut self.custom {
            renderer.context_change(max_texture_units);
        }
    }
}

fn pick<'a>(
    empty: &'a mut EmptyRenderer,
    sprite: &'a mut SpriteRenderer,
    custom: &'a mut [Box<dyn ObjectRenderer>],
    slot: RendererSlot,
) -> Option<&'a mut dyn ObjectRenderer> {
    match slot {
        RendererSlot::Empty => Some(empty),
        RendererSlot::Sprite => Some(sprite),
        RendererSlot::Custom(i) => custom.get_mut(i).map(|r| r.as_mut() as &mut dyn ObjectRenderer),
    }
}

impl std::fmt::Debug for BatchSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSystem")
            .field("current", &self.current)
            .field("sprite", &self.sprite)
            .field("custom", &self.custom.len())
            .finish()
    }
}
