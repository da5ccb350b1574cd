//! Renderable payloads.
//!
//! A [`Node`] optionally holds a boxed [`Renderable`]. The renderer calls it
//! once per frame for every visible node, in draw order, with a
//! [`RenderContext`] giving access to the batch system.

use std::any::Any;

use crate::math::{Bounds, Point};
use crate::renderer::{BatchSystem, BlendMode, GpuSink, ObjectRenderer, RendererSlot, SpriteEntry};
use crate::scene::Node;
use crate::settings::RendererSettings;
use crate::texture::Texture;

/// Drawing capability attached to a node.
pub trait Renderable {
    /// Queue this payload's geometry. `node` is already up to date.
    fn render(&mut self, ctx: &mut RenderContext<'_>, node: &Node);

    /// Grow `bounds` by this payload's world-space extent.
    fn calculate_bounds(&mut self, _node: &Node, _bounds: &mut Bounds) {}

    /// Called once when the owning node is destroyed.
    fn destroy(&mut self) {}

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// What a payload sees while rendering.
pub struct RenderContext<'a> {
    batch: &'a mut BatchSystem,
    sink: &'a mut dyn GpuSink,
    settings: &'a RendererSettings,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(
        batch: &'a mut BatchSystem,
        sink: &'a mut dyn GpuSink,
        settings: &'a RendererSettings,
    ) -> Self {
        Self {
            batch,
            sink,
            settings,
        }
    }

    pub fn settings(&self) -> &RendererSettings {
        self.settings
    }

    /// Give draw authority to `slot`, flushing the previous renderer.
    pub fn set_object_renderer(&mut self, slot: RendererSlot) {
        self.batch.set_object_renderer(slot, &mut *self.sink);
    }

    /// A custom renderer to queue work with, after
    /// [`set_object_renderer`](Self::set_object_renderer).
    pub fn renderer_mut<T: ObjectRenderer + 'static>(&mut self, slot: RendererSlot) -> Option<&mut T> {
        self.batch.renderer_mut(slot)
    }

    /// Queue a sprite with the sprite batcher.
    pub fn render_sprite(&mut self, sprite: SpriteEntry) {
        self.batch.render_sprite(sprite, &mut *self.sink);
    }

    /// Flush whatever the active renderer holds.
    pub fn flush(&mut self) {
        self.batch.flush_current(&mut *self.sink);
    }
}

/// A textured quad.
///
/// Vertex positions are cached and only rebuilt when the node's world
/// matrix or the texture changed since the last build.
#[derive(Debug, Clone)]
pub struct SpriteObject {
    texture: Texture,
    anchor: Point,
    pub blend_mode: BlendMode,
    vertex_data: [f32; 8],
    transform_id: Option<u32>,
    texture_id: Option<u32>,
}

impl SpriteObject {
    pub fn new(texture: Texture) -> Self {
        Self {
            texture,
            anchor: Point::ZERO,
            blend_mode: BlendMode::Normal,
            vertex_data: [0.0; 8],
            transform_id: None,
            texture_id: None,
        }
    }

    pub fn with_anchor(mut self, x: f32, y: f32) -> Self {
        self.set_anchor(x, y);
        self
    }

    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn set_texture(&mut self, texture: Texture) {
        if self.texture == texture {
            return;
        }
        self.texture = texture;
        self.texture_id = None;
    }

    /// Mutable access to the texture; cached vertices are dropped.
    pub fn texture_mut(&mut self) -> &mut Texture {
        self.texture_id = None;
        &mut self.texture
    }

    pub fn anchor(&self) -> Point {
        self.anchor
    }

    /// Fraction of the frame placed at the node's origin; `(0.5, 0.5)`
    /// centers it.
    pub fn set_anchor(&mut self, x: f32, y: f32) {
        if self.anchor == Point::new(x, y) {
            return;
        }
        self.anchor = Point::new(x, y);
        self.transform_id = None;
    }

    /// World-space corners as of the last build.
    pub fn vertex_data(&self) -> &[f32; 8] {
        &self.vertex_data
    }

    /// Rebuild the world-space corners if the node moved or the texture
    /// changed.
    pub fn calculate_vertices(&mut self, node: &Node) {
        let transform = node.transform();
        let world_id = transform.world_id();
        let texture_id = self.texture.update_id();
        if self.transform_id == Some(world_id) && self.texture_id == Some(texture_id) {
            return;
        }
        self.transform_id = Some(world_id);
        self.texture_id = Some(texture_id);

        let wt = transform.world_transform();
        let orig = self.texture.orig();
        let (w1, h1, w0, h0) = match self.texture.trim() {
            Some(trim) => {
                let w1 = trim.x - self.anchor.x * orig.width;
                let h1 = trim.y - self.anchor.y * orig.height;
                (w1, h1, w1 + trim.width, h1 + trim.height)
            }
            None => {
                let w1 = -self.anchor.x * orig.width;
                let h1 = -self.anchor.y * orig.height;
                (w1, h1, w1 + orig.width, h1 + orig.height)
            }
        };

        let corners = [(w1, h1), (w0, h1), (w0, h0), (w1, h0)];
        for (i, (x, y)) in corners.into_iter().enumerate() {
            let p = wt.apply(Point::new(x, y));
            self.vertex_data[i * 2] = p.x;
            self.vertex_data[i * 2 + 1] = p.y;
        }
    }
}

impl Renderable for SpriteObject {
    fn render(&mut self, ctx: &mut RenderContext<'_>, node: &Node) {
        self.calculate_vertices(node);
        ctx.render_sprite(SpriteEntry {
            vertex_data: self.vertex_data,
            uvs: self.texture.uvs().packed,
            tint: node.world_tint(),
            texture: *self.texture.base(),
            blend_mode: self.blend_mode,
        });
    }

    fn calculate_bounds(&mut self, node: &Node, bounds: &mut Bounds) {
        self.calculate_vertices(node);
        bounds.add_quad(&self.vertex_data);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Rectangle;
    use crate::scene::Scene;
    use crate::texture::{BaseTexture, TextureId};

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    fn texture(w: u32, h: u32) -> Texture {
        Texture::new(BaseTexture::new(TextureId(1), w, h))
    }

    #[test]
    fn test_vertices_follow_world_transform() {
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        let node = scene.create_node_with(Box::new(SpriteObject::new(texture(10, 20))));
        scene.add_child(stage, node).unwrap();
        scene.set_position(node, 5.0, 5.0).unwrap();

        let rect = scene.get_bounds(node).unwrap();
        assert!(approx_eq(rect.x, 5.0) && approx_eq(rect.y, 5.0));
        assert!(approx_eq(rect.width, 10.0) && approx_eq(rect.height, 20.0));
    }

    #[test]
    fn test_anchor_centers_frame() {
        let mut scene = Scene::new();
        let node = scene.create_node_with(Box::new(
            SpriteObject::new(texture(10, 10)).with_anchor(0.5, 0.5),
        ));
        let rect = scene.get_bounds(node).unwrap();
        assert!(approx_eq(rect.x, -5.0) && approx_eq(rect.y, -5.0));
    }

    #[test]
    fn test_trim_offsets_quad() {
        let base = BaseTexture::new(TextureId(1), 32, 32);
        let tex = Texture::with_frame(base, Rectangle::new(0.0, 0.0, 8.0, 8.0))
            .with_trim(Rectangle::new(0.0, 0.0, 16.0, 16.0), Rectangle::new(4.0, 2.0, 8.0, 8.0));
        let mut scene = Scene::new();
        let node = scene.create_node_with(Box::new(SpriteObject::new(tex)));
        let rect = scene.get_bounds(node).unwrap();
        assert!(approx_eq(rect.x, 4.0) && approx_eq(rect.y, 2.0));
        assert!(approx_eq(rect.width, 8.0));
    }

    #[test]
    fn test_vertex_cache_rebuilds_on_texture_change() {
        let mut scene = Scene::new();
        let node = scene.create_node_with(Box::new(SpriteObject::new(texture(10, 10))));
        scene.get_bounds(node).unwrap();

        let sprite = scene.payload_mut::<SpriteObject>(node).unwrap();
        sprite.texture_mut().set_frame(Rectangle::new(0.0, 0.0, 4.0, 4.0));
        let rect = scene.get_bounds(node).unwrap();
        assert!(approx_eq(rect.width, 4.0));
    }
}
