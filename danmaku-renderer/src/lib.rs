//! Danmaku Renderer Library
//!
//! This library drives the danmaku layout frame by frame and paints the visible set
//! onto host-provided canvases. It also ships a software canvas backed by
//! `image::RgbaImage`, a recording canvas for tests, and the shared image cache.

pub mod events;
pub mod host;
pub mod image_cache;
pub mod raster;
pub mod recording;
pub mod renderer;

pub use events::{RendererEvent, SubscriptionId};
pub use host::{Canvas, FrameHandle, Host};
pub use image_cache::{CompletionHandle, FileImageLoader, ImageCache, ImageLoader, MemoryImageLoader};
pub use raster::RgbaSurface;
pub use recording::{DrawCommand, RecordingSurface};
pub use renderer::{DanmakuRenderer, FilterFn, RendererOptions};

/// Result type for danmaku-renderer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for danmaku-renderer operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Danmaku core error: {0}")]
    Core(#[from] danmaku_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Font error: {0}")]
    Font(String),

    #[error("Unable to obtain container element")]
    NoContainer,

    #[error("Unable to obtain drawing surface")]
    NoSurface,
}
