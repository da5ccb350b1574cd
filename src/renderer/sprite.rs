//! The sprite batcher.
//!
//! Sprites are queued until the batch is full or another object renderer
//! takes over. A flush writes every queued sprite into one vertex buffer and
//! splits the run into draw groups: a group ends when the blend mode changes
//! or when a new texture would need more units than a draw call has. Groups
//! only ever merge consecutive sprites, so draw order is preserved.

use std::any::Any;
use std::collections::HashMap;

use crate::settings::RendererSettings;
use crate::stats;
use crate::texture::{BaseTexture, TextureId};

use super::batch::ObjectRenderer;
use super::blend::{BlendMode, BlendState};
use super::gpu::{MAX_QUADS_PER_DRAW, SpriteVertex, pack_color, quad_indices};
use super::sink::DrawMode;
use super::state::DrawTarget;

/// Everything the batcher needs from one sprite, copied at render time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpriteEntry {
    /// World-space corners, clockwise from the top-left: `x0, y0, .. x3, y3`
    pub vertex_data: [f32; 8],
    /// Packed corner UVs, see [`TextureUvs`](crate::texture::TextureUvs)
    pub uvs: [u32; 4],
    /// World tint, straight alpha
    pub tint: [f32; 4],
    pub texture: BaseTexture,
    pub blend_mode: BlendMode,
}

/// A run of consecutive sprites drawn with one call.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchGroup {
    /// Textures bound for this call; position is the texture unit
    pub textures: Vec<TextureId>,
    /// First sprite of the run
    pub start: usize,
    /// Number of sprites
    pub size: usize,
    pub blend: BlendState,
}

impl BatchGroup {
    fn new(start: usize, blend: BlendState) -> Self {
        Self {
            textures: Vec::new(),
            start,
            size: 0,
            blend,
        }
    }
}

/// Unit a texture got in the current group, valid while `tick` matches.
#[derive(Clone, Copy, Debug, Default)]
struct TextureSlot {
    tick: u64,
    unit: u32,
}

pub struct SpriteRenderer {
    size: usize,
    max_textures: u32,
    settings_max_textures: u32,
    round_pixels: bool,
    resolution: f32,
    can_upload_same_buffer: bool,

    sprites: Vec<SpriteEntry>,
    /// Vertex buffers by power of two: `buffers[k]` holds up to `2^k` sprites
    buffers: Vec<Vec<SpriteVertex>>,
    indices: Vec<u16>,
    indices_uploaded: bool,

    groups: Vec<BatchGroup>,
    slots: HashMap<TextureId, TextureSlot>,
    tick: u64,
    /// Next vertex slot when slots are not reused within a frame
    vertex_count: usize,
}

impl SpriteRenderer {
    pub fn new(settings: &RendererSettings) -> Self {
        let size = settings.sprite_batch_size.clamp(1, MAX_QUADS_PER_DRAW);
        let pools = size.next_power_of_two().trailing_zeros() as usize + 1;
        Self {
            size,
            max_textures: 1,
            settings_max_textures: settings.sprite_max_textures.max(1),
            round_pixels: settings.round_pixels,
            resolution: settings.resolution,
            can_upload_same_buffer: settings.can_upload_same_buffer,
            sprites: Vec::with_capacity(size),
            buffers: vec![Vec::new(); pools],
            indices: quad_indices(size),
            indices_uploaded: false,
            groups: Vec::new(),
            slots: HashMap::new(),
            tick: 0,
            vertex_count: 0,
        }
    }

    /// Sprites flushed at most per draw batch.
    pub fn batch_size(&self) -> usize {
        self.size
    }

    /// Texture units one draw call uses.
    pub fn max_textures(&self) -> u32 {
        self.max_textures
    }

    /// Sprites queued since the last flush.
    pub fn pending(&self) -> usize {
        self.sprites.len()
    }

    /// Draw groups of the most recent flush.
    pub fn last_groups(&self) -> &[BatchGroup] {
        &self.groups
    }

    /// Queue a sprite, flushing first if the batch is full.
    pub fn render(&mut self, sprite: SpriteEntry, gl: &mut DrawTarget<'_>) {
        if self.sprites.len() >= self.size {
            self.flush(gl);
        }
        self.sprites.push(sprite);
    }

    /// Split the queued sprites into draw groups and write their vertices
    /// into `vertices`.
    fn build_groups(&mut self, vertices: &mut Vec<SpriteVertex>) {
        let Self {
            sprites,
            groups,
            slots,
            tick,
            max_textures,
            round_pixels,
            resolution,
            ..
        } = self;
        let max_textures = *max_textures;

        groups.clear();
        *tick += 1;

        let Some(first) = sprites.first() else {
            return;
        };
        let mut blend = first.blend_mode.state(first.texture.premultiplied_alpha);
        let mut group = BatchGroup::new(0, blend);
        let mut texture_count = 0;
        let mut current_texture = None;

        for (i, sprite) in sprites.iter().enumerate() {
            let sprite_blend = sprite.blend_mode.state(sprite.texture.premultiplied_alpha);
            if sprite_blend != blend {
                blend = sprite_blend;
                current_texture = None;
                // Forces a new group below
                texture_count = max_textures;
                *tick += 1;
            }

            let texture = sprite.texture.id;
            if current_texture != Some(texture) {
                current_texture = Some(texture);
                let slot = slots.entry(texture).or_default();
                if slot.tick != *tick {
                    if texture_count == max_textures {
                        *tick += 1;
                        texture_count = 0;
                        group.size = i - group.start;
                        if group.size > 0 {
                            groups.push(group);
                        }
                        group = BatchGroup::new(i, blend);
                    }
                    slot.tick = *tick;
                    slot.unit = texture_count;
                    group.textures.push(texture);
                    texture_count += 1;
                }
            }

            let unit = slots.get(&texture).map_or(0, |s| s.unit) as f32;
            let color = pack_color(sprite.tint);
            for (corner, &uv) in sprite.uvs.iter().enumerate() {
                let mut x = sprite.vertex_data[corner * 2];
                let mut y = sprite.vertex_data[corner * 2 + 1];
                if *round_pixels {
                    x = ((x * *resolution) as i32) as f32 / *resolution;
                    y = ((y * *resolution) as i32) as f32 / *resolution;
                }
                vertices.push(SpriteVertex {
                    position: [x, y],
                    uv,
                    color,
                    texture_id: unit,
                });
            }
        }

        group.size = sprites.len() - group.start;
        groups.push(group);
    }
}

impl ObjectRenderer for SpriteRenderer {
    fn context_change(&mut self, max_texture_units: u32) {
        self.max_textures = max_texture_units.min(self.settings_max_textures).max(1);
        self.slots.clear();
        self.indices_uploaded = false;
        log::info!("Sprite batcher uses {} texture units", self.max_textures);
    }

    fn prerender(&mut self) {
        self.vertex_count = 0;
    }

    fn start(&mut self, gl: &mut DrawTarget<'_>) {
        gl.bind_shader(self.max_textures);
    }

    fn flush(&mut self, gl: &mut DrawTarget<'_>) {
        if self.sprites.is_empty() {
            return;
        }

        let count = self.sprites.len();
        let pool = count.next_power_of_two().trailing_zeros() as usize;
        let mut vertices = std::mem::take(&mut self.buffers[pool]);
        vertices.clear();
        vertices.reserve_exact((1 << pool) * 4);

        self.build_groups(&mut vertices);

        if !self.indices_uploaded {
            gl.upload_indices(&self.indices);
            self.indices_uploaded = true;
        }
        let slot = if self.can_upload_same_buffer {
            0
        } else {
            self.vertex_count += 1;
            self.vertex_count - 1
        };
        gl.upload_vertices(slot, bytemuck::cast_slice(&vertices));
        self.buffers[pool] = vertices;

        for group in &self.groups {
            for (unit, &texture) in group.textures.iter().enumerate() {
                gl.bind_texture(texture, unit as u32);
            }
            gl.set_blend_mode(group.blend);
            gl.draw(
                DrawMode::Triangles,
                (group.size * 6) as u32,
                (group.start * 6) as u32,
                1,
            );
        }

        log::debug!(
            "Sprite batch flushed: {} sprites in {} draw calls",
            count,
            self.groups.len()
        );
        stats::record_batch_flush(count, self.groups.len());
        self.sprites.clear();
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl std::fmt::Debug for SpriteRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpriteRenderer")
            .field("size", &self.size)
            .field("max_textures", &self.max_textures)
            .field("pending", &self.sprites.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::sink::{CommandRecorder, GpuCommand};
    use crate::renderer::state::StateSystem;

    fn sprite(texture: u32, blend_mode: BlendMode) -> SpriteEntry {
        SpriteEntry {
            vertex_data: [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
            uvs: [0, 0xFFFF, u32::MAX, 0xFFFF_0000],
            tint: [1.0; 4],
            texture: BaseTexture::new(TextureId(texture), 8, 8),
            blend_mode,
        }
    }

    fn renderer(units: u32, settings: RendererSettings) -> SpriteRenderer {
        let mut r = SpriteRenderer::new(&settings);
        r.context_change(units);
        r
    }

    fn flush_all(r: &mut SpriteRenderer, sprites: &[SpriteEntry]) -> CommandRecorder {
        let mut sink = CommandRecorder::new(r.max_textures());
        let mut state = StateSystem::new();
        let mut gl = DrawTarget::new(&mut sink, &mut state);
        for s in sprites {
            r.render(*s, &mut gl);
        }
        r.flush(&mut gl);
        sink
    }

    fn first_upload(sink: &CommandRecorder) -> Vec<SpriteVertex> {
        let data = sink
            .commands()
            .iter()
            .find_map(|c| match c {
                GpuCommand::UploadVertices { data, .. } => Some(data.as_slice()),
                _ => None,
            })
            .unwrap();
        data.chunks_exact(20).map(bytemuck::pod_read_unaligned).collect()
    }

    fn uploaded_vertices(sink: &CommandRecorder) -> usize {
        sink.commands()
            .iter()
            .map(|c| match c {
                GpuCommand::UploadVertices { data, .. } => data.len() / 20,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_alternating_textures_one_group() {
        let mut r = renderer(8, RendererSettings::default());
        let sprites: Vec<_> = (0..10).map(|i| sprite(i % 2, BlendMode::Normal)).collect();
        let sink = flush_all(&mut r, &sprites);

        assert_eq!(r.last_groups().len(), 1);
        assert_eq!(r.last_groups()[0].textures, vec![TextureId(0), TextureId(1)]);
        assert_eq!(sink.draw_calls(), vec![(60, 0)]);
        assert_eq!(uploaded_vertices(&sink), 40);
    }

    #[test]
    fn test_blend_change_starts_group() {
        let mut r = renderer(8, RendererSettings::default());
        let mut sprites: Vec<_> = (0..6).map(|i| sprite(i % 2, BlendMode::Normal)).collect();
        sprites[4].blend_mode = BlendMode::Add;
        sprites[5].blend_mode = BlendMode::Add;
        let sink = flush_all(&mut r, &sprites);

        let groups = r.last_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!((groups[0].start, groups[0].size), (0, 4));
        assert_eq!((groups[1].start, groups[1].size), (4, 2));
        assert_eq!(groups[1].blend.mode, BlendMode::Add);
        // Both textures are bound again for the new call.
        assert_eq!(groups[1].textures, vec![TextureId(0), TextureId(1)]);
        assert_eq!(sink.draw_calls(), vec![(24, 0), (12, 24)]);
        let total: usize = groups.iter().map(|g| g.size).sum();
        assert_eq!(total, sprites.len());
    }

    #[test]
    fn test_more_textures_than_units() {
        let mut r = renderer(2, RendererSettings::default());
        let sprites: Vec<_> = (0..5).map(|i| sprite(i, BlendMode::Normal)).collect();
        flush_all(&mut r, &sprites);

        let groups = r.last_groups();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].textures, vec![TextureId(0), TextureId(1)]);
        assert_eq!(groups[2].textures, vec![TextureId(4)]);
        assert_eq!(groups.iter().map(|g| g.size).sum::<usize>(), 5);
    }

    #[test]
    fn test_texture_units_in_vertices() {
        let mut r = renderer(4, RendererSettings::default());
        let sink = flush_all(&mut r, &[sprite(7, BlendMode::Normal), sprite(3, BlendMode::Normal)]);
        let vertices = first_upload(&sink);
        assert_eq!(vertices[0].texture_id, 0.0);
        assert_eq!(vertices[4].texture_id, 1.0);
        assert_eq!(vertices[5].uv, 0xFFFF);
    }

    #[test]
    fn test_full_batch_flushes_early() {
        let settings = RendererSettings::default().sprite_batch_size(4);
        let mut r = renderer(4, settings);
        let sprites: Vec<_> = (0..6).map(|_| sprite(0, BlendMode::Normal)).collect();
        let sink = flush_all(&mut r, &sprites);
        assert_eq!(sink.draw_calls(), vec![(24, 0), (12, 0)]);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn test_round_pixels() {
        let settings = RendererSettings::default().round_pixels(true).resolution(2.0);
        let mut r = renderer(4, settings);
        let mut s = sprite(0, BlendMode::Normal);
        s.vertex_data[0] = 1.3;
        let sink = flush_all(&mut r, &[s]);
        let vertices = first_upload(&sink);
        assert_eq!(vertices[0].position[0], 1.0);
    }

    #[test]
    fn test_vertex_slots_when_buffer_not_reused() {
        let settings = RendererSettings::default().can_upload_same_buffer(false);
        let mut r = renderer(4, settings);
        let mut sink = CommandRecorder::new(4);
        let mut state = StateSystem::new();
        {
            let mut gl = DrawTarget::new(&mut sink, &mut state);
            r.render(sprite(0, BlendMode::Normal), &mut gl);
            r.flush(&mut gl);
            r.render(sprite(0, BlendMode::Normal), &mut gl);
            r.flush(&mut gl);
        }
        let slots: Vec<usize> = sink
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::UploadVertices { slot, .. } => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(slots, vec![0, 1]);
        r.prerender();
        assert_eq!(r.vertex_count, 0);
    }

    #[test]
    fn test_straight_alpha_resolves_npm_blend() {
        let mut r = renderer(4, RendererSettings::default());
        let mut s = sprite(0, BlendMode::Normal);
        s.texture = s.texture.with_premultiplied_alpha(false);
        flush_all(&mut r, &[s]);
        assert!(!r.last_groups()[0].blend.premultiplied);
    }
}
