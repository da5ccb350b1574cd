//! Error types for scene and GPU operations.

use thiserror::Error;

/// Structural errors raised by scene graph operations.
///
/// These signal programmer error: they are returned to the caller and never
/// recovered from internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("node {0:#x} does not exist or was destroyed")]
    StaleNode(u64),

    #[error("the supplied node must be a child of the caller")]
    NotAChild,

    #[error("the supplied index {index} is out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("child range {begin}..{end} is outside the acceptable range (len {len})")]
    InvalidRange { begin: usize, end: usize, len: usize },

    #[error("a node cannot be added to itself or to one of its descendants")]
    CyclicHierarchy,

    #[error("node {0:#x} is not the root of a stage")]
    NotAStage(u64),

    #[error("layer {0} does not exist")]
    StaleLayer(usize),

    #[error("group {0} does not exist")]
    StaleGroup(usize),
}

/// Errors from the wgpu backend.
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("texture {0} was never uploaded")]
    UnknownTexture(u32),

    #[error("texture data for {id} is {actual} bytes, expected {expected}")]
    TextureSize {
        id: u32,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T, E = SceneError> = std::result::Result<T, E>;
