//! Drawing-surface and image-source contracts
//!
//! The engine never touches pixels itself. Everything it draws goes through
//! [`Surface`], and every bitmap it needs is looked up through [`ImageSource`].

use crate::Color;
use image::RgbaImage;
use std::sync::Arc;

/// Decoded bitmap shared between the cache and the surfaces drawing it
pub type ImageHandle = Arc<RgbaImage>;

/// Font used for measuring and drawing a text segment
#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    pub family: String,
    pub weight: String,
    /// Font size in logical pixels
    pub size: f64,
}

impl Font {
    /// Creates a font description
    pub fn new(family: impl Into<String>, weight: impl Into<String>, size: f64) -> Self {
        Self {
            family: family.into(),
            weight: weight.into(),
            size,
        }
    }

    /// CSS shorthand, e.g. `normal 18px Microsoft YaHei`
    pub fn css(&self) -> String {
        format!("{} {}px {}", self.weight, self.size, self.family)
    }
}

/// Text measurement capability
pub trait TextMeasure {
    /// Advance width of `text` drawn with `font`, in logical pixels
    fn measure_text(&mut self, text: &str, font: &Font) -> f64;
}

/// 2D drawing capability the renderer paints danmaku onto.
///
/// Coordinates are logical pixels. `fill_text` takes the top-left corner of the
/// text's em box. Paths are built with `begin_path`, `round_rect`, `move_to` and
/// `line_to`, then painted with `fill` or `stroke`.
pub trait Surface: TextMeasure {
    fn clear_rect(&mut self, x: f64, y: f64, width: f64, height: f64);

    fn set_fill_style(&mut self, color: Color);
    fn fill_style(&self) -> Color;
    fn set_stroke_style(&mut self, color: Color);
    fn stroke_style(&self) -> Color;

    fn set_global_alpha(&mut self, alpha: f32);
    fn global_alpha(&self) -> f32;

    fn set_font(&mut self, font: &Font);
    fn fill_text(&mut self, text: &str, x: f64, y: f64);

    /// Draws `image` scaled into the destination rectangle
    fn draw_image(&mut self, image: &RgbaImage, x: f64, y: f64, width: f64, height: f64);

    fn begin_path(&mut self);
    fn round_rect(&mut self, x: f64, y: f64, width: f64, height: f64, radius: f64);
    fn move_to(&mut self, x: f64, y: f64);
    fn line_to(&mut self, x: f64, y: f64);
    /// Dash pattern for subsequent strokes; an empty slice means solid lines
    fn set_line_dash(&mut self, segments: &[f64]);
    fn fill(&mut self);
    fn stroke(&mut self);
}

/// Load state of an image requested by URL
#[derive(Debug, Clone)]
pub enum ImageStatus {
    /// The request is in flight; draw nothing this tick
    Loading,
    /// The image is decoded and ready to draw
    Ready(ImageHandle),
    /// Loading failed; the segment is never drawn
    Failed,
}

/// Image-resolution capability.
///
/// The first request for a URL starts loading and reports [`ImageStatus::Loading`].
/// Later calls observe the result once the owner has applied the completion.
pub trait ImageSource {
    fn fetch(&mut self, url: &str) -> ImageStatus;
}

/// Source that never resolves anything, for measuring-only contexts
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImages;

impl ImageSource for NoImages {
    fn fetch(&mut self, _url: &str) -> ImageStatus {
        ImageStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_css_shorthand() {
        let font = Font::new("Noto Sans", "700", 24.0);
        assert_eq!(font.css(), "700 24px Noto Sans");
    }
}
