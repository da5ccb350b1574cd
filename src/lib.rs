//! A retained-mode 2D scene graph with batched rendering.
//!
//! Build a tree of nodes in a [`Scene`](scene::Scene), mutate transforms,
//! tints and visibility freely, and let a [`Renderer`](renderer::Renderer)
//! bring everything up to date once per frame. Only nodes whose state
//! actually changed are recomputed. Layers let nodes draw in an order
//! independent of the tree, and sprites are batched into as few draw calls
//! as their textures and blend modes allow.
//!
//! ```no_run
//! use stagegraph::prelude::*;
//!
//! let mut scene = Scene::new();
//! let stage = scene.create_stage();
//! let texture = Texture::new(BaseTexture::new(TextureId(0), 64, 64));
//! let sprite = scene.create_node_with(Box::new(SpriteObject::new(texture)));
//! scene.add_child(stage, sprite)?;
//! scene.set_position(sprite, 100.0, 50.0)?;
//!
//! let mut renderer = Renderer::new(RendererSettings::default(), CommandRecorder::default());
//! renderer.render(&mut scene, stage)?;
//! # Ok::<(), stagegraph::SceneError>(())
//! ```

pub mod display;
pub mod error;
pub mod layers;
pub mod math;
pub mod scene;
pub mod settings;
pub mod signal;
pub mod stats;
pub mod texture;
pub mod transform;

// Public for custom object renderers and GPU backends
pub mod renderer;

pub use error::{GpuError, Result, SceneError};

pub mod prelude {
    pub use crate::display::{RenderContext, Renderable, SpriteObject};
    pub use crate::layers::{Group, GroupId, LayerId};
    pub use crate::math::{Matrix, Point, Rectangle};
    pub use crate::renderer::{
        BlendMode, CommandRecorder, GpuContext, GpuSink, ObjectRenderer, Renderer, RendererSlot,
        WgpuBackend,
    };
    pub use crate::scene::{Components, NodeId, Scene};
    pub use crate::settings::RendererSettings;
    pub use crate::texture::{BaseTexture, Texture, TextureId};
    pub use crate::{GpuError, Result, SceneError};
}
