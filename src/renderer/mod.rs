//! Frame rendering: scene traversal, batching and the GPU sink.
//!
//! [`Renderer::render`] brings a scene up to date, then walks it in draw
//! order and hands every visible payload a [`RenderContext`]. Payloads queue
//! geometry with an object renderer of the [`BatchSystem`]; the sprite
//! batcher turns queued sprites into as few draw calls as draw order allows.
//! Everything ends up as calls on a [`GpuSink`].
//!
//! ## Draw order
//!
//! The root is always drawn. For every other node, culled nodes are skipped
//! along with their subtree. A node that owns a layer draws the layer's
//! sorted views first, then its own payload, then those children that are
//! not claimed by an active layer.

mod batch;
mod blend;
mod gpu;
mod gpu_context;
pub mod shader;
mod sink;
mod sprite;
mod state;
mod wgpu_backend;

pub use batch::{BatchSystem, EmptyRenderer, ObjectRenderer, RendererSlot};
pub use blend::{BlendFactor, BlendMode, BlendState, GlState};
pub use gpu::{MAX_QUADS_PER_DRAW, ProjectionUniforms, SpriteVertex, pack_color, quad_indices};
pub use gpu_context::GpuContext;
pub use sink::{CommandRecorder, DrawMode, FrameDesc, GpuCommand, GpuSink, projection_matrix};
pub use sprite::{BatchGroup, SpriteEntry, SpriteRenderer};
pub use state::{DrawTarget, StateSystem};
pub use wgpu_backend::{RenderTarget, WgpuBackend};

use crate::display::RenderContext;
use crate::error::Result;
use crate::scene::{NodeId, Scene};
use crate::settings::RendererSettings;
use crate::signal::Signal;
use crate::stats;

/// One step of the draw-order walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RenderTask {
    /// Expand a node into its layer views, its payload and its children
    Visit(NodeId),
    /// Render a node's payload
    Draw(NodeId),
}

pub struct Renderer<S: GpuSink = CommandRecorder> {
    settings: RendererSettings,
    batch: BatchSystem,
    sink: S,
    render_stack: Vec<RenderTask>,
    /// Emitted before the scene is updated
    pub on_prerender: Signal<()>,
    /// Emitted after the final flush, before the frame ends
    pub on_postrender: Signal<()>,
}

impl<S: GpuSink> Renderer<S> {
    pub fn new(settings: RendererSettings, sink: S) -> Self {
        let mut renderer = Self {
            batch: BatchSystem::new(&settings),
            settings,
            sink,
            render_stack: Vec::new(),
            on_prerender: Signal::new(),
            on_postrender: Signal::new(),
        };
        let units = renderer.sink.max_texture_units();
        renderer.context_change(units);
        log::info!(
            "Renderer created: {}x{} at {}x",
            renderer.settings.width,
            renderer.settings.height,
            renderer.settings.resolution
        );
        renderer
    }

    /// The GPU context was replaced. Every cached GPU-side value is dropped.
    pub fn context_change(&mut self, max_texture_units: u32) {
        self.batch.context_change(max_texture_units);
    }

    /// Change the viewport, in logical pixels.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.settings.width = width;
        self.settings.height = height;
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn batch(&self) -> &BatchSystem {
        &self.batch
    }

    pub fn batch_mut(&mut self) -> &mut BatchSystem {
        &mut self.batch
    }

    /// Register an extra object renderer; see [`BatchSystem::add_renderer`].
    pub fn add_renderer(&mut self, mut renderer: Box<dyn ObjectRenderer>) -> RendererSlot {
        renderer.context_change(self.sink.max_texture_units());
        self.batch.add_renderer(renderer)
    }

    /// Update and draw the tree rooted at `root`.
    ///
    /// A stage root reconciles detached nodes, flushes its update queue and
    /// rebuilds its layers. Any other root is refreshed in full.
    pub fn render(&mut self, scene: &mut Scene, root: NodeId) -> Result<()> {
        self.on_prerender.emit(&());
        self.batch.prerender();

        if scene.is_stage(root) {
            scene.flush_detached(root)?;
            scene.update_transform(root)?;
            scene.update_display(root)?;
        } else {
            scene.update_transform(root)?;
        }

        let clear = self
            .settings
            .clear_before_render
            .then_some(self.settings.background_color);
        self.sink.begin_frame(&FrameDesc::new(
            self.settings.width,
            self.settings.height,
            self.settings.resolution,
            clear,
        ));
        self.batch.start_current(&mut self.sink);

        let result = self.render_tree(scene, root);

        self.batch.flush_current(&mut self.sink);
        self.on_postrender.emit(&());
        self.sink.end_frame();
        stats::end_frame();
        result
    }

    fn render_tree(&mut self, scene: &mut Scene, root: NodeId) -> Result<()> {
        scene.node_ref(root)?;

        let mut stack = std::mem::take(&mut self.render_stack);
        stack.clear();
        stack.push(RenderTask::Visit(root));

        while let Some(task) = stack.pop() {
            match task {
                RenderTask::Visit(id) => {
                    let start = stack.len();
                    expand(scene, id, &mut stack);
                    stack[start..].reverse();
                }
                RenderTask::Draw(id) => self.draw_payload(scene, id),
            }
        }

        self.render_stack = stack;
        Ok(())
    }

    fn draw_payload(&mut self, scene: &mut Scene, id: NodeId) {
        let Some(mut payload) = scene.nodes.get_mut(id).and_then(|n| n.payload.take()) else {
            return;
        };
        if let Some(node) = scene.nodes.get(id) {
            let mut ctx = RenderContext::new(&mut self.batch, &mut self.sink, &self.settings);
            payload.render(&mut ctx, node);
        }
        if let Some(node) = scene.nodes.get_mut(id) {
            node.payload = Some(payload);
        }
    }
}

/// Push the tasks of one visited node in draw order.
fn expand(scene: &Scene, id: NodeId, stack: &mut Vec<RenderTask>) {
    let Some(node) = scene.nodes.get(id) else {
        return;
    };

    if let Some(layer) = node.layer.and_then(|l| scene.layers.get(l.0)) {
        for &view in &layer.sorted_views {
            if scene
                .nodes
                .get(view)
                .is_some_and(|v| v.world_cull_flags.is_empty())
            {
                stack.push(RenderTask::Visit(view));
            }
        }
    }

    if node.payload.is_some() {
        stack.push(RenderTask::Draw(id));
    }

    for &child in &node.children {
        if scene.nodes.get(child).is_some_and(|c| {
            c.world_cull_flags.is_empty() && c.view.active_parent_layer.is_none()
        }) {
            stack.push(RenderTask::Visit(child));
        }
    }
}

impl<S: GpuSink + std::fmt::Debug> std::fmt::Debug for Renderer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("settings", &self.settings)
            .field("batch", &self.batch)
            .field("sink", &self.sink)
            .finish()
    }
}
