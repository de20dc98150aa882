//! Danmaku Core Library
//!
//! This library provides the data model and layout algorithms of the danmaku
//! (bullet comment) overlay engine: segment measurement, scroll track allocation,
//! fixed-position stacking and the orchestration that merges them per frame.

pub mod asset;
pub mod color;
pub mod config;
pub mod danmaku;
pub mod fixed_layout;
pub mod layout;
pub mod paint;
pub mod scroll_layout;
pub mod segment;
pub mod store;
pub mod surface;
pub mod timeline;

#[cfg(test)]
pub(crate) mod testing;

pub use asset::{DanmakuImage, ImageRegistry};
pub use color::Color;
pub use config::{DevConfig, RenderConfig};
pub use danmaku::{
    CustomRender, Danmaku, DanmakuKind, DanmakuOptions, DanmakuType, FixedPosition, FixedState,
    ScrollState,
};
pub use layout::{DanmakuLayout, LayoutOptions, Size};
pub use paint::{paint, PaintContext, PaintFn};
pub use store::DanmakuKey;
pub use surface::{Font, ImageHandle, ImageSource, ImageStatus, NoImages, Surface, TextMeasure};
pub use timeline::TimeOrigin;

/// Result type for danmaku-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for danmaku-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid color: {0:?}")]
    InvalidColor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
