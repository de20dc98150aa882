//! What the renderer needs from its embedding environment

use danmaku_core::{Size, Surface};

/// Identifies a frame request so it can be cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// A drawing surface with its own pixel buffer.
///
/// Drawing happens in logical pixels; the canvas maps them to device pixels with the
/// scale set through [`set_scale`](Canvas::set_scale).
pub trait Canvas: Surface {
    /// Resizes the backing buffer, clearing it
    fn set_pixel_size(&mut self, width: u32, height: u32);
    fn pixel_size(&self) -> (u32, u32);

    /// Logical-to-device pixel factor
    fn set_scale(&mut self, scale: f64);
    fn scale(&self) -> f64;

    /// Draws the whole of `source` scaled into the logical rectangle
    /// `(0, 0, width, height)`, honouring the current global alpha
    fn composite_from(&mut self, source: &Self, width: f64, height: f64);
}

/// Embedding environment of a renderer: clock, container, frame scheduling and
/// canvas creation.
///
/// The host calls [`DanmakuRenderer::tick`](crate::DanmakuRenderer::tick) when a frame
/// obtained through [`request_frame`](Host::request_frame) fires.
pub trait Host {
    type Canvas: Canvas;

    /// Creates a new, empty canvas; `None` when no drawing surface is available
    fn create_canvas(&mut self) -> Option<Self::Canvas>;

    /// Logical size of the container the canvases cover; `None` when there is no container
    fn container_size(&self) -> Option<Size>;

    fn device_pixel_ratio(&self) -> f64;

    /// Shows or hides the container
    fn set_visible(&mut self, visible: bool);

    /// Schedules one call to `tick`
    fn request_frame(&mut self) -> FrameHandle;

    /// Cancels a pending frame; unknown or fired handles are ignored
    fn cancel_frame(&mut self, handle: FrameHandle);

    /// Current wall-clock time in milliseconds
    fn now_ms(&self) -> i64;
}
