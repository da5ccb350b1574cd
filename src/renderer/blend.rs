//! Blend modes and fixed-function state bits.

use bitflags::bitflags;

/// Source/destination multipliers of a blend equation. The equation is
/// always `src * src_factor + dst * dst_factor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    OneMinusSrcColor,
    DstAlpha,
    DstColor,
}

/// How a sprite is composited over what is already drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    Normal,
    Add,
    Multiply,
    Screen,
    /// Overwrite the destination
    None,
}

impl BlendMode {
    pub const ALL: [BlendMode; 5] = [
        BlendMode::Normal,
        BlendMode::Add,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::None,
    ];

    /// Resolve the blend equation for a texture with or without
    /// premultiplied alpha.
    ///
    /// Normal, multiply and screen have a separate variant for straight
    /// alpha that scales the source color by its alpha; the others use one
    /// equation for both.
    pub fn state(self, premultiplied_alpha: bool) -> BlendState {
        use BlendFactor::*;

        let (src, dst) = match self {
            BlendMode::Normal => (One, OneMinusSrcAlpha),
            BlendMode::Add => (One, DstAlpha),
            BlendMode::Multiply => (DstColor, OneMinusSrcAlpha),
            BlendMode::Screen => (One, OneMinusSrcColor),
            BlendMode::None => (One, Zero),
        };
        let has_npm = matches!(self, BlendMode::Normal | BlendMode::Multiply | BlendMode::Screen);
        let premultiplied = premultiplied_alpha || !has_npm;

        BlendState {
            mode: self,
            premultiplied,
            src_rgb: if premultiplied { src } else { SrcAlpha },
            dst_rgb: dst,
            src_alpha: src,
            dst_alpha: dst,
        }
    }
}

/// A fully resolved blend equation, as handed to the GPU sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub mode: BlendMode,
    /// `false` for the straight-alpha variant of a mode
    pub premultiplied: bool,
    pub src_rgb: BlendFactor,
    pub dst_rgb: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
}

impl Default for BlendState {
    fn default() -> Self {
        BlendMode::Normal.state(true)
    }
}

bitflags! {
    /// Fixed-function switches an object renderer declares.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct GlState: u8 {
        const BLEND      = 1 << 0;
        /// Polygon offset
        const OFFSET     = 1 << 1;
        /// Back-face culling
        const CULLING    = 1 << 2;
        const DEPTH_TEST = 1 << 3;
        /// Clockwise front faces
        const WINDING    = 1 << 4;
    }
}

impl GlState {
    /// Blending on, everything else off.
    pub fn for_2d() -> Self {
        GlState::BLEND
    }
}
