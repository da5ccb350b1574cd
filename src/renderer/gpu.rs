//! GPU data structures for the sprite batch.
//!
//! One [`SpriteVertex`] per sprite corner, four per sprite, indexed as two
//! triangles per quad.

use wgpu::{VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode};

use crate::math::Matrix;

/// Largest quad count whose vertices are still addressable by `u16` indices.
pub const MAX_QUADS_PER_DRAW: usize = 16384;

/// Uniform buffer data passed to the sprite shader.
///
/// The projection matrix as its two non-trivial rows, padded to `vec4`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ProjectionUniforms {
    /// `[a, c, tx, _]`
    pub row0: [f32; 4],
    /// `[b, d, ty, _]`
    pub row1: [f32; 4],
}

impl ProjectionUniforms {
    pub fn new(projection: &Matrix) -> Self {
        Self {
            row0: [projection.a, projection.c, projection.tx, 0.0],
            row1: [projection.b, projection.d, projection.ty, 0.0],
        }
    }
}

/// A single sprite corner.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SpriteVertex {
    /// Position in logical pixels
    pub position: [f32; 2],
    /// Packed `u | v << 16`, both normalized 16-bit
    pub uv: u32,
    /// Packed RGBA8 tint, straight alpha
    pub color: u32,
    /// Texture unit within the current draw call
    pub texture_id: f32,
}

impl SpriteVertex {
    /// Vertex buffer layout for the sprite batch.
    pub fn desc() -> VertexBufferLayout<'static> {
        VertexBufferLayout {
            array_stride: std::mem::size_of::<SpriteVertex>() as u64,
            step_mode: VertexStepMode::Vertex,
            attributes: &[
                // position
                VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: VertexFormat::Float32x2,
                },
                // uv
                VertexAttribute {
                    offset: 8,
                    shader_location: 1,
                    format: VertexFormat::Unorm16x2,
                },
                // color
                VertexAttribute {
                    offset: 12,
                    shader_location: 2,
                    format: VertexFormat::Unorm8x4,
                },
                // texture_id
                VertexAttribute {
                    offset: 16,
                    shader_location: 3,
                    format: VertexFormat::Float32,
                },
            ],
        }
    }
}

/// Pack an RGBA color in 0..1 into the byte order `Unorm8x4` reads.
pub fn pack_color(rgba: [f32; 4]) -> u32 {
    let [r, g, b, a] = rgba.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
    u32::from_le_bytes([r, g, b, a])
}

/// Two triangles per quad: `(0, 1, 2)` and `(0, 2, 3)`.
pub fn quad_indices(quads: usize) -> Vec<u16> {
    let quads = quads.min(MAX_QUADS_PER_DRAW);
    let mut indices = Vec::with_capacity(quads * 6);
    for i in 0..quads {
        let j = (i * 4) as u16;
        indices.extend_from_slice(&[j, j + 1, j + 2, j, j + 2, j + 3]);
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sprite_vertex_size() {
        assert_eq!(std::mem::size_of::<SpriteVertex>(), 20);
        assert_eq!(SpriteVertex::desc().attributes.len(), 4);
    }

    #[test]
    fn test_quad_indices() {
        let indices = quad_indices(2);
        assert_eq!(indices, vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]);
        assert_eq!(*quad_indices(MAX_QUADS_PER_DRAW).last().unwrap(), u16::MAX);
    }

    #[test]
    fn test_pack_color_byte_order() {
        let packed = pack_color([1.0, 0.0, 0.5, 1.0]);
        assert_eq!(packed.to_le_bytes(), [255, 0, 128, 255]);
        assert_eq!(pack_color([1.0; 4]), u32::MAX);
    }

    #[test]
    fn test_projection_uniforms_rows() {
        let m = Matrix::new(2.0, 0.0, 0.0, -2.0, -1.0, 1.0);
        let u = ProjectionUniforms::new(&m);
        assert_eq!(u.row0, [2.0, 0.0, -1.0, 0.0]);
        assert_eq!(u.row1, [0.0, -2.0, 1.0, 0.0]);
    }
}
