/// Renderer configuration, passed to [`Renderer::new`](crate::renderer::Renderer::new).
#[derive(Clone, Debug, PartialEq)]
pub struct RendererSettings {
    /// Sprites accumulated before a batch is forced to flush
    pub sprite_batch_size: usize,
    /// Upper bound on texture units a single sprite draw call may use
    pub sprite_max_textures: u32,
    /// Snap sprite vertices to the device pixel grid
    pub round_pixels: bool,
    /// Device pixels per logical pixel
    pub resolution: f32,
    /// Reuse vertex slot 0 for every flush instead of a fresh slot per flush
    pub can_upload_same_buffer: bool,
    pub clear_before_render: bool,
    pub background_color: [f32; 4],
    /// Viewport size in logical pixels
    pub width: u32,
    pub height: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            sprite_batch_size: 4096,
            sprite_max_textures: 32,
            round_pixels: false,
            resolution: 1.0,
            can_upload_same_buffer: true,
            clear_before_render: true,
            background_color: [0.0, 0.0, 0.0, 1.0],
            width: 800,
            height: 600,
        }
    }
}

impl RendererSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sprite_batch_size(mut self, size: usize) -> Self {
        self.sprite_batch_size = size.max(1);
        self
    }

    pub fn sprite_max_textures(mut self, count: u32) -> Self {
        self.sprite_max_textures = count.max(1);
        self
    }

    pub fn round_pixels(mut self, round: bool) -> Self {
        self.round_pixels = round;
        self
    }

    pub fn resolution(mut self, resolution: f32) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn can_upload_same_buffer(mut self, can: bool) -> Self {
        self.can_upload_same_buffer = can;
        self
    }

    pub fn clear_before_render(mut self, clear: bool) -> Self {
        self.clear_before_render = clear;
        self
    }

    pub fn background_color(mut self, color: [f32; 4]) -> Self {
        self.background_color = color;
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}
