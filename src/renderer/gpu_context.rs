use std::sync::Arc;

use wgpu::{Adapter, Device, Instance, Queue};

use crate::error::GpuError;

/// A `wgpu` device without a surface, for offscreen rendering.
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: Adapter,
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
}

impl GpuContext {
    /// Pick an adapter and open a device on it. Blocks until both are ready.
    pub fn new_headless() -> Result<Self, GpuError> {
        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Stagegraph Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))?;

        let info = adapter.get_info();
        log::info!("Using GPU adapter {} ({:?})", info.name, info.backend);

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Sampled textures a fragment shader may bind on this device.
    pub fn max_texture_units(&self) -> u32 {
        self.device.limits().max_sampled_textures_per_shader_stage
    }
}
