//! The GPU pipeline sink contract.
//!
//! The batcher never touches GPU objects. It hands fully formed vertex data
//! and draw ranges to a [`GpuSink`], which is either a real backend
//! ([`WgpuBackend`](super::WgpuBackend)) or the headless [`CommandRecorder`].

use crate::math::Matrix;
use crate::texture::TextureId;

use super::blend::{BlendState, GlState};

/// Primitive assembly for [`GpuSink::draw`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrawMode {
    Triangles,
    TriangleStrip,
}

/// Per-frame setup passed to [`GpuSink::begin_frame`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameDesc {
    /// Viewport in logical pixels
    pub width: u32,
    pub height: u32,
    pub resolution: f32,
    /// Clear color, or `None` to draw over the previous contents
    pub clear: Option<[f32; 4]>,
    /// Maps logical pixels to clip space
    pub projection: Matrix,
}

impl FrameDesc {
    pub fn new(width: u32, height: u32, resolution: f32, clear: Option<[f32; 4]>) -> Self {
        Self {
            width,
            height,
            resolution,
            clear,
            projection: projection_matrix(width as f32, height as f32),
        }
    }
}

/// Screen-space to clip-space matrix with a top-left origin and y down.
pub fn projection_matrix(width: f32, height: f32) -> Matrix {
    Matrix::new(2.0 / width.max(1.0), 0.0, 0.0, -2.0 / height.max(1.0), -1.0, 1.0)
}

pub trait GpuSink {
    /// Texture units one draw call may sample from.
    fn max_texture_units(&self) -> u32;

    fn begin_frame(&mut self, frame: &FrameDesc);

    fn set_state(&mut self, state: GlState);

    fn set_blend_mode(&mut self, blend: BlendState);

    /// Bind the sprite shader compiled for `texture_units` samplers.
    fn bind_shader(&mut self, texture_units: u32);

    fn bind_texture(&mut self, texture: TextureId, unit: u32);

    /// Upload interleaved vertex bytes into vertex slot `slot`. Later draws
    /// read from the most recent upload.
    fn upload_vertices(&mut self, slot: usize, data: &[u8]);

    fn upload_indices(&mut self, indices: &[u16]);

    /// Draw `count` indices starting at index `start`.
    fn draw(&mut self, mode: DrawMode, count: u32, start: u32, instances: u32);

    fn end_frame(&mut self);
}

/// One recorded [`GpuSink`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum GpuCommand {
    BeginFrame(FrameDesc),
    SetState(GlState),
    SetBlendMode(BlendState),
    BindShader {
        texture_units: u32,
    },
    BindTexture {
        texture: TextureId,
        unit: u32,
    },
    UploadVertices {
        slot: usize,
        data: Vec<u8>,
    },
    UploadIndices(Vec<u16>),
    Draw {
        mode: DrawMode,
        count: u32,
        start: u32,
        instances: u32,
    },
    EndFrame,
}

/// Headless sink that records every call.
#[derive(Debug)]
pub struct CommandRecorder {
    max_texture_units: u32,
    commands: Vec<GpuCommand>,
}

impl Default for CommandRecorder {
    fn default() -> Self {
        Self::new(16)
    }
}

impl CommandRecorder {
    pub fn new(max_texture_units: u32) -> Self {
        Self {
            max_texture_units: max_texture_units.max(1),
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// `(count, start)` of every recorded draw, in order.
    pub fn draw_calls(&self) -> Vec<(u32, u32)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                GpuCommand::Draw { count, start, .. } => Some((*count, *start)),
                _ => None,
            })
            .collect()
    }

    /// Simulate a context that exposes a different number of units.
    pub fn set_max_texture_units(&mut self, units: u32) {
        self.max_texture_units = units.max(1);
    }
}

impl GpuSink for CommandRecorder {
    fn max_texture_units(&self) -> u32 {
        self.max_texture_units
    }

    fn begin_frame(&mut self, frame: &FrameDesc) {
        self.commands.push(GpuCommand::BeginFrame(*frame));
    }

    fn set_state(&mut self, state: GlState) {
        self.commands.push(GpuCommand::SetState(state));
    }

    fn set_blend_mode(&mut self, blend: BlendState) {
        self.commands.push(GpuCommand::SetBlendMode(blend));
    }

    fn bind_shader(&mut self, texture_units: u32) {
        self.commands.push(GpuCommand::BindShader { texture_units });
    }

    fn bind_texture(&mut self, texture: TextureId, unit: u32) {
        self.commands.push(GpuCommand::BindTexture { texture, unit });
    }

    fn upload_vertices(&mut self, slot: usize, data: &[u8]) {
        self.commands.push(GpuCommand::UploadVertices {
            slot,
            data: data.to_vec(),
        });
    }

    fn upload_indices(&mut self, indices: &[u16]) {
        self.commands.push(GpuCommand::UploadIndices(indices.to_vec()));
    }

    fn draw(&mut self, mode: DrawMode, count: u32, start: u32, instances: u32) {
        self.commands.push(GpuCommand::Draw {
            mode,
            count,
            start,
            instances,
        });
    }

    fn end_frame(&mut self) {
        self.commands.push(GpuCommand::EndFrame);
    }
}
