//! `wgpu` implementation of [`GpuSink`].
//!
//! Sink calls between [`begin_frame`](GpuSink::begin_frame) and
//! [`end_frame`](GpuSink::end_frame) are recorded. The end of the frame
//! resolves pipelines and bind groups for every recorded draw, uploads all
//! vertex data in one write and replays the draws in a single render pass.

use std::collections::HashMap;
use std::sync::Arc;

use wgpu::util::DeviceExt;
use wgpu::{
    BindGroup, BindGroupLayout, Buffer, BufferUsages, Device, Extent3d, PipelineLayout, Queue,
    RenderPipeline, Sampler, ShaderModule, TextureDimension, TextureFormat, TextureUsages,
    TextureView,
};

use crate::error::GpuError;
use crate::texture::{BaseTexture, TextureId};

use super::blend::{BlendFactor, BlendState, GlState};
use super::gpu::{ProjectionUniforms, SpriteVertex};
use super::shader::{FIRST_TEXTURE_BINDING, generate_multi_texture_shader};
use super::sink::{DrawMode, FrameDesc, GpuSink};

/// Upper bound on texture units, whatever the device allows.
const MAX_TEXTURE_UNITS: u32 = 16;

/// Color format of uploaded textures.
const TEXTURE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

struct GpuTexture {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: TextureView,
}

/// Shader, bind group layout and pipeline layout compiled for one unit count.
struct ShaderProgram {
    module: ShaderModule,
    bind_group_layout: BindGroupLayout,
    pipeline_layout: PipelineLayout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    units: u32,
    state: GlState,
    blend: BlendState,
    mode: DrawMode,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct BindGroupKey {
    units: u32,
    textures: Vec<Option<TextureId>>,
}

struct PendingDraw {
    pipeline: PipelineKey,
    bind_group: BindGroupKey,
    vertex_offset: u64,
    start: u32,
    count: u32,
    instances: u32,
}

/// Offscreen color target the frame is drawn into.
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: TextureView,
    pub width: u32,
    pub height: u32,
}

pub struct WgpuBackend {
    device: Arc<Device>,
    queue: Arc<Queue>,
    format: TextureFormat,
    max_texture_units: u32,

    sampler: Sampler,
    uniform_buffer: Buffer,
    white: GpuTexture,
    textures: HashMap<TextureId, GpuTexture>,

    programs: HashMap<u32, ShaderProgram>,
    pipelines: HashMap<PipelineKey, RenderPipeline>,
    bind_groups: HashMap<BindGroupKey, BindGroup>,

    vertex_buffer: Buffer,
    vertex_buffer_capacity: u64,
    index_buffer: Buffer,
    index_buffer_capacity: u64,
    target: Option<RenderTarget>,

    // Per-frame recording
    frame: Option<FrameDesc>,
    state: GlState,
    blend: BlendState,
    units: u32,
    bound: Vec<Option<TextureId>>,
    vertex_data: Vec<u8>,
    vertex_offset: u64,
    draws: Vec<PendingDraw>,
}

impl WgpuBackend {
    pub fn new(device: Arc<Device>, queue: Arc<Queue>, format: TextureFormat) -> Self {
        let max_texture_units = device
            .limits()
            .max_sampled_textures_per_shader_stage
            .min(MAX_TEXTURE_UNITS)
            .max(1);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Sprite Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let uniforms = ProjectionUniforms::new(&super::sink::projection_matrix(800.0, 600.0));
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sprite Uniform Buffer"),
            contents: bytemuck::cast_slice(&[uniforms]),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });

        let white = create_texture(&device, &queue, "White Texture", 1, 1, &[255; 4]);

        let vertex_buffer_capacity = 4096 * std::mem::size_of::<SpriteVertex>() as u64;
        let vertex_buffer = create_buffer(
            &device,
            "Sprite Vertex Buffer",
            vertex_buffer_capacity,
            BufferUsages::VERTEX,
        );
        let index_buffer_capacity = 4096 * 6 * 2;
        let index_buffer = create_buffer(
            &device,
            "Sprite Index Buffer",
            index_buffer_capacity,
            BufferUsages::INDEX,
        );

        log::info!(
            "wgpu sprite backend ready: {:?}, {} texture units",
            format,
            max_texture_units
        );

        Self {
            device,
            queue,
            format,
            max_texture_units,
            sampler,
            uniform_buffer,
            white,
            textures: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            bind_groups: HashMap::new(),
            vertex_buffer,
            vertex_buffer_capacity,
            index_buffer,
            index_buffer_capacity,
            target: None,
            frame: None,
            state: GlState::for_2d(),
            blend: BlendState::default(),
            units: 1,
            bound: Vec::new(),
            vertex_data: Vec::new(),
            vertex_offset: 0,
            draws: Vec::new(),
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// (Re)create the offscreen target in physical pixels.
    pub fn create_target(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Target"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: self.format,
            usage: TextureUsages::RENDER_ATTACHMENT
                | TextureUsages::COPY_SRC
                | TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::debug!("Created {}x{} render target", width, height);
        self.target = Some(RenderTarget {
            texture,
            view,
            width,
            height,
        });
    }

    /// The target the last frame was drawn into.
    pub fn target(&self) -> Option<&RenderTarget> {
        self.target.as_ref()
    }

    /// Upload RGBA8 pixels for `base`, replacing an earlier upload with the
    /// same id.
    pub fn upload_texture(&mut self, base: &BaseTexture, rgba: &[u8]) -> Result<(), GpuError> {
        let (width, height) = (base.width as u32, base.height as u32);
        let expected = width as usize * height as usize * 4;
        if expected == 0 || rgba.len() != expected {
            return Err(GpuError::TextureSize {
                id: base.id.0,
                expected,
                actual: rgba.len(),
            });
        }

        let texture = create_texture(
            &self.device,
            &self.queue,
            "Sprite Texture",
            width,
            height,
            rgba,
        );
        self.textures.insert(base.id, texture);
        // Bind groups hold views of the replaced texture.
        self.bind_groups.clear();
        Ok(())
    }

    pub fn has_texture(&self, id: TextureId) -> bool {
        self.textures.contains_key(&id)
    }

    pub fn remove_texture(&mut self, id: TextureId) {
        if self.textures.remove(&id).is_some() {
            self.bind_groups.clear();
        }
    }

    fn ensure_program(&mut self, units: u32) {
        if self.programs.contains_key(&units) {
            return;
        }

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Sprite Shader"),
                source: wgpu::ShaderSource::Wgsl(generate_multi_texture_shader(units).into()),
            });

        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        for unit in 0..units {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: FIRST_TEXTURE_BINDING + unit,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            });
        }

        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Sprite Bind Group Layout"),
                    entries: &entries,
                });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Sprite Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

        log::debug!("Compiled sprite shader for {} texture units", units);
        self.programs.insert(
            units,
            ShaderProgram {
                module,
                bind_group_layout,
                pipeline_layout,
            },
        );
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        self.ensure_program(key.units);
        let Some(program) = self.programs.get(&key.units) else {
            return;
        };

        let blend = key.state.contains(GlState::BLEND).then(|| wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: to_wgpu_factor(key.blend.src_rgb),
                dst_factor: to_wgpu_factor(key.blend.dst_rgb),
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: to_wgpu_factor(key.blend.src_alpha),
                dst_factor: to_wgpu_factor(key.blend.dst_alpha),
                operation: wgpu::BlendOperation::Add,
            },
        });
        let (topology, strip_index_format) = match key.mode {
            DrawMode::Triangles => (wgpu::PrimitiveTopology::TriangleList, None),
            DrawMode::TriangleStrip => (
                wgpu::PrimitiveTopology::TriangleStrip,
                Some(wgpu::IndexFormat::Uint16),
            ),
        };

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Sprite Pipeline"),
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.module,
                    entry_point: Some("vs_main"),
                    buffers: &[SpriteVertex::desc()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.format,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    strip_index_format,
                    front_face: if key.state.contains(GlState::WINDING) {
                        wgpu::FrontFace::Cw
                    } else {
                        wgpu::FrontFace::Ccw
                    },
                    cull_mode: key
                        .state
                        .contains(GlState::CULLING)
                        .then_some(wgpu::Face::Back),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                // No depth attachment; DEPTH_TEST and OFFSET have nothing to act on.
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });
        self.pipelines.insert(key, pipeline);
    }

    fn ensure_bind_group(&mut self, key: &BindGroupKey) {
        if self.bind_groups.contains_key(key) {
            return;
        }
        self.ensure_program(key.units);
        let Some(program) = self.programs.get(&key.units) else {
            return;
        };

        let mut views = Vec::with_capacity(key.units as usize);
        for unit in 0..key.units as usize {
            let view = match key.textures.get(unit).copied().flatten() {
                Some(id) => match self.textures.get(&id) {
                    Some(texture) => &texture.view,
                    None => {
                        log::error!("{}", GpuError::UnknownTexture(id.0));
                        &self.white.view
                    }
                },
                None => &self.white.view,
            };
            views.push(view);
        }

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: self.uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        for (unit, view) in views.into_iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: FIRST_TEXTURE_BINDING + unit as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sprite Bind Group"),
            layout: &program.bind_group_layout,
            entries: &entries,
        });
        self.bind_groups.insert(key.clone(), bind_group);
    }

    fn write_vertices(&mut self) {
        pad_to_copy_alignment(&mut self.vertex_data);
        let size = self.vertex_data.len() as u64;
        if size > self.vertex_buffer_capacity {
            self.vertex_buffer_capacity = size.next_power_of_two();
            self.vertex_buffer = create_buffer(
                &self.device,
                "Sprite Vertex Buffer",
                self.vertex_buffer_capacity,
                BufferUsages::VERTEX,
            );
        }
        if size > 0 {
            self.queue
                .write_buffer(&self.vertex_buffer, 0, &self.vertex_data);
        }
    }

    fn ensure_target(&mut self, width: u32, height: u32) {
        let matches = self
            .target
            .as_ref()
            .is_some_and(|t| t.width == width && t.height == height);
        if !matches {
            self.create_target(width, height);
        }
    }
}

impl GpuSink for WgpuBackend {
    fn max_texture_units(&self) -> u32 {
        self.max_texture_units
    }

    fn begin_frame(&mut self, frame: &FrameDesc) {
        self.frame = Some(*frame);
        self.vertex_data.clear();
        self.vertex_offset = 0;
        self.draws.clear();
        self.bound.clear();
    }

    fn set_state(&mut self, state: GlState) {
        self.state = state;
    }

    fn set_blend_mode(&mut self, blend: BlendState) {
        self.blend = blend;
    }

    fn bind_shader(&mut self, texture_units: u32) {
        self.units = texture_units.clamp(1, self.max_texture_units);
    }

    fn bind_texture(&mut self, texture: TextureId, unit: u32) {
        let unit = unit as usize;
        if unit >= self.max_texture_units as usize {
            log::warn!("Texture unit {} out of range", unit);
            return;
        }
        if self.bound.len() <= unit {
            self.bound.resize(unit + 1, None);
        }
        self.bound[unit] = Some(texture);
    }

    fn upload_vertices(&mut self, _slot: usize, data: &[u8]) {
        // Every upload is appended; draws keep the offset of the one they read.
        pad_to_copy_alignment(&mut self.vertex_data);
        self.vertex_offset = self.vertex_data.len() as u64;
        self.vertex_data.extend_from_slice(data);
    }

    fn upload_indices(&mut self, indices: &[u16]) {
        let mut indices = indices.to_vec();
        if indices.len() % 2 == 1 {
            indices.push(0);
        }
        let size = (indices.len() * 2) as u64;
        if size > self.index_buffer_capacity {
            self.index_buffer_capacity = size.next_power_of_two();
            self.index_buffer = create_buffer(
                &self.device,
                "Sprite Index Buffer",
                self.index_buffer_capacity,
                BufferUsages::INDEX,
            );
        }
        self.queue
            .write_buffer(&self.index_buffer, 0, bytemuck::cast_slice(&indices));
    }

    fn draw(&mut self, mode: DrawMode, count: u32, start: u32, instances: u32) {
        if count == 0 {
            return;
        }
        let units = self.units;
        let mut textures: Vec<Option<TextureId>> = self.bound.clone();
        textures.resize(units as usize, None);
        self.draws.push(PendingDraw {
            pipeline: PipelineKey {
                units,
                state: self.state,
                blend: self.blend,
                mode,
            },
            bind_group: BindGroupKey { units, textures },
            vertex_offset: self.vertex_offset,
            start,
            count,
            instances: instances.max(1),
        });
    }

    fn end_frame(&mut self) {
        let Some(frame) = self.frame.take() else {
            log::warn!("end_frame without begin_frame");
            return;
        };

        let width = (frame.width as f32 * frame.resolution).round() as u32;
        let height = (frame.height as f32 * frame.resolution).round() as u32;
        self.ensure_target(width.max(1), height.max(1));

        let uniforms = ProjectionUniforms::new(&frame.projection);
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));
        self.write_vertices();

        let draws = std::mem::take(&mut self.draws);
        for draw in &draws {
            self.ensure_pipeline(draw.pipeline);
            self.ensure_bind_group(&draw.bind_group);
        }

        let Some(target) = self.target.as_ref() else {
            return;
        };

        let load = match frame.clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Sprite Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sprite Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            render_pass
                .set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);

            for draw in &draws {
                let (Some(pipeline), Some(bind_group)) = (
                    self.pipelines.get(&draw.pipeline),
                    self.bind_groups.get(&draw.bind_group),
                ) else {
                    log::error!("Skipping draw without pipeline or bind group");
                    continue;
                };
                if draw.vertex_offset >= self.vertex_data.len() as u64 {
                    continue;
                }
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, bind_group, &[]);
                render_pass.set_vertex_buffer(
                    0,
                    self.vertex_buffer
                        .slice(draw.vertex_offset..self.vertex_data.len() as u64),
                );
                render_pass.draw_indexed(
                    draw.start..draw.start + draw.count,
                    0,
                    0..draw.instances,
                );
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        log::trace!("Submitted frame with {} draws", draws.len());
        self.draws = draws;
        self.draws.clear();
    }
}

fn create_buffer(device: &Device, label: &str, size: u64, usage: BufferUsages) -> Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: usage | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_texture(
    device: &Device,
    queue: &Queue,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> GpuTexture {
    let size = Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture { texture, view }
}

/// `write_buffer` sizes and vertex buffer offsets must be multiples of 4.
fn pad_to_copy_alignment(data: &mut Vec<u8>) {
    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    let rem = data.len() % align;
    if rem != 0 {
        data.resize(data.len() + align - rem, 0);
    }
}

fn to_wgpu_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
    }
}
