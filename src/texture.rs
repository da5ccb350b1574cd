//! Texture handles consumed by the sprite batcher.
//!
//! The scene never owns pixel data. A [`BaseTexture`] names an image the GPU
//! collaborator already holds; a [`Texture`] is a sub-rectangle of it with
//! precomputed, packed UVs.

use crate::math::Rectangle;

/// Identifier of an image known to the GPU sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// An image as seen by the batcher: its id, pixel size and alpha mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BaseTexture {
    pub id: TextureId,
    pub width: f32,
    pub height: f32,
    /// Whether texels already carry premultiplied alpha
    pub premultiplied_alpha: bool,
}

impl BaseTexture {
    pub fn new(id: TextureId, width: u32, height: u32) -> Self {
        Self {
            id,
            width: width as f32,
            height: height as f32,
            premultiplied_alpha: true,
        }
    }

    pub fn with_premultiplied_alpha(mut self, premultiplied: bool) -> Self {
        self.premultiplied_alpha = premultiplied;
        self
    }
}

/// Corner UVs of a frame, clockwise from the top-left, plus the packed form
/// written into vertex data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureUvs {
    pub corners: [[f32; 2]; 4],
    /// `(v * 65535) << 16 | (u * 65535)` per corner
    pub packed: [u32; 4],
}

impl Default for TextureUvs {
    fn default() -> Self {
        let mut uvs = Self {
            corners: [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            packed: [0; 4],
        };
        uvs.pack();
        uvs
    }
}

impl TextureUvs {
    /// UVs of `frame` inside a `width` x `height` image.
    pub fn from_frame(frame: &Rectangle, width: f32, height: f32) -> Self {
        let x0 = frame.x / width;
        let y0 = frame.y / height;
        let x1 = frame.right() / width;
        let y1 = frame.bottom() / height;

        let mut uvs = Self {
            corners: [[x0, y0], [x1, y0], [x1, y1], [x0, y1]],
            packed: [0; 4],
        };
        uvs.pack();
        uvs
    }

    fn pack(&mut self) {
        for (packed, [u, v]) in self.packed.iter_mut().zip(self.corners) {
            *packed = (unorm16(v) << 16) | unorm16(u);
        }
    }
}

fn unorm16(value: f32) -> u32 {
    ((value * 65535.0) as i64 as u32) & 0xFFFF
}

/// A frame of a [`BaseTexture`].
#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
    base: BaseTexture,
    frame: Rectangle,
    /// Untrimmed size of the frame
    orig: Rectangle,
    /// Where the frame sits inside `orig` when transparent borders were cut
    trim: Option<Rectangle>,
    uvs: TextureUvs,
    update_id: u32,
}

impl Texture {
    /// The whole image.
    pub fn new(base: BaseTexture) -> Self {
        let frame = Rectangle::new(0.0, 0.0, base.width, base.height);
        Self::with_frame(base, frame)
    }

    pub fn with_frame(base: BaseTexture, frame: Rectangle) -> Self {
        Self {
            base,
            frame,
            orig: Rectangle::new(0.0, 0.0, frame.width, frame.height),
            trim: None,
            uvs: TextureUvs::from_frame(&frame, base.width, base.height),
            update_id: 0,
        }
    }

    /// Mark `frame` as the visible part of an `orig`-sized sprite.
    pub fn with_trim(mut self, orig: Rectangle, trim: Rectangle) -> Self {
        self.orig = orig;
        self.trim = Some(trim);
        self.update_id = self.update_id.wrapping_add(1);
        self
    }

    pub fn base(&self) -> &BaseTexture {
        &self.base
    }

    pub fn frame(&self) -> &Rectangle {
        &self.frame
    }

    pub fn orig(&self) -> &Rectangle {
        &self.orig
    }

    pub fn trim(&self) -> Option<&Rectangle> {
        self.trim.as_ref()
    }

    pub fn uvs(&self) -> &TextureUvs {
        &self.uvs
    }

    /// Bumped on every change that invalidates cached vertex data.
    pub fn update_id(&self) -> u32 {
        self.update_id
    }

    pub fn set_frame(&mut self, frame: Rectangle) {
        self.frame = frame;
        if self.trim.is_none() {
            self.orig = Rectangle::new(0.0, 0.0, frame.width, frame.height);
        }
        self.uvs = TextureUvs::from_frame(&frame, self.base.width, self.base.height);
        self.update_id = self.update_id.wrapping_add(1);
    }

    /// Point at a resized or re-uploaded image; UVs are rebuilt for the
    /// current frame.
    pub fn set_base(&mut self, base: BaseTexture) {
        self.base = base;
        self.uvs = TextureUvs::from_frame(&self.frame, base.width, base.height);
        self.update_id = self.update_id.wrapping_add(1);
    }
}
