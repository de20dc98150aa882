//! Software canvas backed by an `RgbaImage`
//!
//! Text is rasterized with `ab_glyph`. Shapes are anti-aliased from their signed
//! distance, and every write is a source-over blend with straight alpha.

use crate::host::Canvas;
use crate::{Error, Result};
use ab_glyph::{point, Font as GlyphFont, FontArc, PxScale, ScaleFont};
use danmaku_core::{Color, Font, Surface, TextMeasure};
use image::{Rgba, RgbaImage};
use std::path::Path;

/// Width of stroked lines in logical pixels
const LINE_WIDTH: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
enum PathOp {
    RoundRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        radius: f64,
    },
    Line {
        from: (f64, f64),
        to: (f64, f64),
    },
}

/// [`Surface`] and [`Canvas`] drawing into memory.
///
/// Without a typeface text is measured approximately and not drawn.
#[derive(Clone)]
pub struct RgbaSurface {
    pixels: RgbaImage,
    scale: f64,
    fill: Color,
    stroke: Color,
    alpha: f32,
    font: Font,
    typeface: Option<FontArc>,
    dash: Vec<f64>,
    path: Vec<PathOp>,
    cursor: Option<(f64, f64)>,
}

impl RgbaSurface {
    /// Creates a transparent surface of the given pixel size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            scale: 1.0,
            fill: Color::BLACK,
            stroke: Color::BLACK,
            alpha: 1.0,
            font: Font::new("sans-serif", "normal", 10.0),
            typeface: None,
            dash: Vec::new(),
            path: Vec::new(),
            cursor: None,
        }
    }

    /// Uses `typeface` for measuring and drawing text
    pub fn with_typeface(mut self, typeface: FontArc) -> Self {
        self.typeface = Some(typeface);
        self
    }

    pub fn set_typeface(&mut self, typeface: Option<FontArc>) {
        self.typeface = typeface;
    }

    /// Loads a TrueType/OpenType file
    pub fn load_typeface(path: impl AsRef<Path>) -> Result<FontArc> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        FontArc::try_from_vec(data).map_err(|e| Error::Font(format!("{}: {e}", path.display())))
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    /// Writes the pixel buffer as an image file, format chosen by extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.pixels.save(path)?;
        Ok(())
    }

    /// Pixel range covering `start..end` device pixels, clipped to `0..limit`
    fn span(start: f64, end: f64, limit: u32) -> std::ops::Range<u32> {
        let lo = (start.floor().max(0.0) as u32).min(limit);
        let hi = (end.ceil().max(0.0) as u32).min(limit);
        lo..hi.max(lo)
    }

    fn blend(&mut self, x: i64, y: i64, color: Color, coverage: f32) {
        if x < 0 || y < 0 || x >= self.pixels.width() as i64 || y >= self.pixels.height() as i64 {
            return;
        }
        let src_a = (color.a * self.alpha * coverage).clamp(0.0, 1.0);
        if src_a <= 0.0 {
            return;
        }
        let pixel = self.pixels.get_pixel_mut(x as u32, y as u32);
        let [dr, dg, db, da] = pixel.0;
        let dst_a = da as f32 / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);
        let mix = |s: u8, d: u8| {
            ((s as f32 * src_a + d as f32 * dst_a * (1.0 - src_a)) / out_a)
                .round()
                .clamp(0.0, 255.0) as u8
        };
        *pixel = Rgba([
            mix(color.r, dr),
            mix(color.g, dg),
            mix(color.b, db),
            (out_a * 255.0).round() as u8,
        ]);
    }

    /// Signed distance from a device-space point to a rounded rectangle
    fn round_rect_distance(px: f64, py: f64, rect: (f64, f64, f64, f64), radius: f64) -> f64 {
        let (x, y, w, h) = rect;
        let (hw, hh) = (w / 2.0, h / 2.0);
        let qx = (px - (x + hw)).abs() - (hw - radius);
        let qy = (py - (y + hh)).abs() - (hh - radius);
        let outside = qx.max(0.0).hypot(qy.max(0.0));
        outside + qx.max(qy).min(0.0) - radius
    }

    fn paint_round_rect(&mut self, op: (f64, f64, f64, f64, f64), color: Color, stroke: bool) {
        let s = self.scale;
        let (x, y, w, h, r) = op;
        let (x, y, w, h) = if w < 0.0 { (x + w, y, -w, h) } else { (x, y, w, h) };
        let (x, y, w, h) = if h < 0.0 { (x, y + h, w, -h) } else { (x, y, w, h) };
        let rect = (x * s, y * s, w * s, h * s);
        let radius = r.max(0.0).min(w / 2.0).min(h / 2.0) * s;
        let half_line = LINE_WIDTH * s / 2.0;

        let pad = half_line + 1.0;
        let xs = Self::span(rect.0 - pad, rect.0 + rect.2 + pad, self.pixels.width());
        let ys = Self::span(rect.1 - pad, rect.1 + rect.3 + pad, self.pixels.height());
        for py in ys {
            for px in xs.clone() {
                let d = Self::round_rect_distance(px as f64 + 0.5, py as f64 + 0.5, rect, radius);
                let coverage = if stroke {
                    half_line + 0.5 - d.abs()
                } else {
                    0.5 - d
                };
                let coverage = coverage.clamp(0.0, 1.0) as f32;
                if coverage > 0.0 {
                    self.blend(px as i64, py as i64, color, coverage);
                }
            }
        }
    }

    fn stroke_line(&mut self, from: (f64, f64), to: (f64, f64), color: Color) {
        let s = self.scale;
        let (x0, y0) = (from.0 * s, from.1 * s);
        let (x1, y1) = (to.0 * s, to.1 * s);
        let (dx, dy) = (x1 - x0, y1 - y0);
        let length = dx.hypot(dy);
        let half_line = LINE_WIDTH * s / 2.0;
        let pad = half_line + 1.0;

        let xs = Self::span(x0.min(x1) - pad, x0.max(x1) + pad, self.pixels.width());
        let ys = Self::span(y0.min(y1) - pad, y0.max(y1) + pad, self.pixels.height());
        for py in ys {
            for px in xs.clone() {
                let (cx, cy) = (px as f64 + 0.5, py as f64 + 0.5);
                let along = if length > 0.0 {
                    (((cx - x0) * dx + (cy - y0) * dy) / length).clamp(0.0, length)
                } else {
                    0.0
                };
                let (nx, ny) = if length > 0.0 {
                    (x0 + dx * along / length, y0 + dy * along / length)
                } else {
                    (x0, y0)
                };
                if !dash_on(&self.dash, along / s) {
                    continue;
                }
                let distance = (cx - nx).hypot(cy - ny);
                let coverage = (half_line + 0.5 - distance).clamp(0.0, 1.0) as f32;
                if coverage > 0.0 {
                    self.blend(px as i64, py as i64, color, coverage);
                }
            }
        }
    }

    fn approximate_width(text: &str, size: f64) -> f64 {
        text.chars()
            .filter(|c| !c.is_control())
            .map(|c| if c.is_ascii() { size / 2.0 } else { size })
            .sum()
    }
}

/// Whether `distance` along a stroke falls on a dash. An empty pattern is solid.
fn dash_on(pattern: &[f64], distance: f64) -> bool {
    let total: f64 = pattern.iter().sum();
    if pattern.is_empty() || total <= 0.0 {
        return true;
    }
    let mut position = distance.rem_euclid(total);
    for (i, segment) in pattern.iter().enumerate() {
        if position < *segment {
            return i % 2 == 0;
        }
        position -= segment;
    }
    true
}

impl TextMeasure for RgbaSurface {
    fn measure_text(&mut self, text: &str, font: &Font) -> f64 {
        let Some(typeface) = &self.typeface else {
            return Self::approximate_width(text, font.size);
        };
        let scaled = typeface.as_scaled(PxScale::from(font.size as f32));
        let mut width = 0.0f32;
        let mut previous = None;
        for ch in text.chars() {
            if ch.is_control() {
                continue;
            }
            let glyph = scaled.glyph_id(ch);
            if let Some(prev) = previous {
                width += scaled.kern(prev, glyph);
            }
            width += scaled.h_advance(glyph);
            previous = Some(glyph);
        }
        width.max(0.0) as f64
    }
}

impl Surface for RgbaSurface {
    fn clear_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        let s = self.scale;
        let xs = Self::span(x * s, (x + width) * s, self.pixels.width());
        let ys = Self::span(y * s, (y + height) * s, self.pixels.height());
        for py in ys {
            for px in xs.clone() {
                self.pixels.put_pixel(px, py, Rgba([0, 0, 0, 0]));
            }
        }
    }

    fn set_fill_style(&mut self, color: Color) {
        self.fill = color;
    }

    fn fill_style(&self) -> Color {
        self.fill
    }

    fn set_stroke_style(&mut self, color: Color) {
        self.stroke = color;
    }

    fn stroke_style(&self) -> Color {
        self.stroke
    }

    fn set_global_alpha(&mut self, alpha: f32) {
        if alpha.is_finite() && (0.0..=1.0).contains(&alpha) {
            self.alpha = alpha;
        }
    }

    fn global_alpha(&self) -> f32 {
        self.alpha
    }

    fn set_font(&mut self, font: &Font) {
        self.font = font.clone();
    }

    /// `y` is the top of the em box; the baseline sits one ascent below it
    fn fill_text(&mut self, text: &str, x: f64, y: f64) {
        let Some(typeface) = self.typeface.clone() else {
            return;
        };
        let color = self.fill;
        let scaled = typeface.as_scaled(PxScale::from((self.font.size * self.scale) as f32));
        let baseline = (y * self.scale) as f32 + scaled.ascent();
        let mut cursor = (x * self.scale) as f32;
        let mut previous = None;

        for ch in text.chars() {
            if ch.is_control() {
                continue;
            }
            let glyph_id = scaled.glyph_id(ch);
            if let Some(prev) = previous {
                cursor += scaled.kern(prev, glyph_id);
            }
            let mut glyph = scaled.scaled_glyph(ch);
            glyph.position = point(cursor, baseline);
            if let Some(outline) = typeface.outline_glyph(glyph) {
                let bounds = outline.px_bounds();
                let (left, top) = (bounds.min.x as i64, bounds.min.y as i64);
                outline.draw(|gx, gy, coverage| {
                    self.blend(left + gx as i64, top + gy as i64, color, coverage);
                });
            }
            cursor += scaled.h_advance(glyph_id);
            previous = Some(glyph_id);
        }
    }

    /// Nearest-neighbour scaling into the destination rectangle
    fn draw_image(&mut self, image: &RgbaImage, x: f64, y: f64, width: f64, height: f64) {
        let (sw, sh) = image.dimensions();
        if sw == 0 || sh == 0 || width <= 0.0 || height <= 0.0 {
            return;
        }
        let s = self.scale;
        let (dx, dy, dw, dh) = (x * s, y * s, width * s, height * s);
        let xs = Self::span(dx, dx + dw, self.pixels.width());
        let ys = Self::span(dy, dy + dh, self.pixels.height());
        for py in ys {
            let v = ((py as f64 + 0.5 - dy) / dh * sh as f64).floor();
            if v < 0.0 || v >= sh as f64 {
                continue;
            }
            for px in xs.clone() {
                let u = ((px as f64 + 0.5 - dx) / dw * sw as f64).floor();
                if u < 0.0 || u >= sw as f64 {
                    continue;
                }
                let [r, g, b, a] = image.get_pixel(u as u32, v as u32).0;
                self.blend(px as i64, py as i64, Color::rgba(r, g, b, a as f32 / 255.0), 1.0);
            }
        }
    }

    fn begin_path(&mut self) {
        self.path.clear();
        self.cursor = None;
    }

    fn round_rect(&mut self, x: f64, y: f64, width: f64, height: f64, radius: f64) {
        self.path.push(PathOp::RoundRect {
            x,
            y,
            width,
            height,
            radius,
        });
        self.cursor = Some((x, y));
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.cursor = Some((x, y));
    }

    fn line_to(&mut self, x: f64, y: f64) {
        if let Some(from) = self.cursor {
            self.path.push(PathOp::Line { from, to: (x, y) });
        }
        self.cursor = Some((x, y));
    }

    /// Odd-length patterns are repeated once; patterns with negative or
    /// non-finite entries are ignored
    fn set_line_dash(&mut self, segments: &[f64]) {
        if segments.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return;
        }
        self.dash = segments.to_vec();
        if self.dash.len() % 2 == 1 {
            self.dash.extend_from_slice(segments);
        }
    }

    fn fill(&mut self) {
        let color = self.fill;
        for op in self.path.clone() {
            if let PathOp::RoundRect {
                x,
                y,
                width,
                height,
                radius,
            } = op
            {
                self.paint_round_rect((x, y, width, height, radius), color, false);
            }
        }
    }

    fn stroke(&mut self) {
        let color = self.stroke;
        for op in self.path.clone() {
            match op {
                PathOp::RoundRect {
                    x,
                    y,
                    width,
                    height,
                    radius,
                } => self.paint_round_rect((x, y, width, height, radius), color, true),
                PathOp::Line { from, to } => self.stroke_line(from, to, color),
            }
        }
    }
}

impl Canvas for RgbaSurface {
    fn set_pixel_size(&mut self, width: u32, height: u32) {
        self.pixels = RgbaImage::new(width, height);
    }

    fn pixel_size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    fn set_scale(&mut self, scale: f64) {
        if scale.is_finite() && scale > 0.0 {
            self.scale = scale;
        }
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn composite_from(&mut self, source: &Self, width: f64, height: f64) {
        self.draw_image(&source.pixels, 0.0, 0.0, width, height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(surface: &RgbaSurface, x: u32, y: u32) -> [u8; 4] {
        surface.image().get_pixel(x, y).0
    }

    #[test]
    fn test_fill_rect_and_clear() {
        let mut surface = RgbaSurface::new(20, 20);
        surface.begin_path();
        surface.round_rect(2.0, 2.0, 10.0, 10.0, 0.0);
        surface.set_fill_style(Color::RED);
        surface.fill();

        assert_eq!(pixel(&surface, 6, 6), [255, 0, 0, 255]);
        assert_eq!(pixel(&surface, 15, 15), [0, 0, 0, 0]);

        surface.clear_rect(0.0, 0.0, 8.0, 20.0);
        assert_eq!(pixel(&surface, 6, 6), [0, 0, 0, 0]);
        assert_eq!(pixel(&surface, 10, 6), [255, 0, 0, 255]);
    }

    #[test]
    fn test_rounded_corners_are_cut() {
        let mut surface = RgbaSurface::new(40, 40);
        surface.begin_path();
        surface.round_rect(0.0, 0.0, 40.0, 40.0, 20.0);
        surface.set_fill_style(Color::WHITE);
        surface.fill();

        assert_eq!(pixel(&surface, 0, 0)[3], 0);
        assert_eq!(pixel(&surface, 20, 20), [255, 255, 255, 255]);
    }

    #[test]
    fn test_global_alpha_blends_over_existing_pixels() {
        let mut surface = RgbaSurface::new(4, 4);
        surface.begin_path();
        surface.round_rect(0.0, 0.0, 4.0, 4.0, 0.0);
        surface.set_fill_style(Color::WHITE);
        surface.fill();

        surface.set_global_alpha(0.5);
        surface.set_fill_style(Color::BLACK);
        surface.fill();

        let [r, g, b, a] = pixel(&surface, 1, 1);
        assert_eq!(a, 255);
        assert!((127..=128).contains(&r) && r == g && g == b);
    }

    #[test]
    fn test_dashed_line_leaves_gaps() {
        let mut surface = RgbaSurface::new(40, 5);
        surface.set_stroke_style(Color::WHITE);
        surface.set_line_dash(&[5.0]);
        surface.begin_path();
        surface.move_to(0.0, 2.5);
        surface.line_to(40.0, 2.5);
        surface.stroke();

        assert_eq!(pixel(&surface, 2, 2)[3], 255);
        assert_eq!(pixel(&surface, 7, 2)[3], 0);
        assert_eq!(pixel(&surface, 12, 2)[3], 255);
        assert_eq!(pixel(&surface, 2, 0)[3], 0);
    }

    #[test]
    fn test_draw_image_scales_nearest_neighbour() {
        let mut source = RgbaImage::new(2, 1);
        source.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        source.put_pixel(1, 0, Rgba([0, 0, 255, 255]));

        let mut surface = RgbaSurface::new(8, 4);
        surface.draw_image(&source, 0.0, 0.0, 8.0, 4.0);
        assert_eq!(pixel(&surface, 1, 3), [255, 0, 0, 255]);
        assert_eq!(pixel(&surface, 6, 0), [0, 0, 255, 255]);
    }

    #[test]
    fn test_composite_maps_device_pixels_back() {
        let mut offscreen = RgbaSurface::new(20, 20);
        offscreen.set_scale(2.0);
        offscreen.begin_path();
        offscreen.round_rect(0.0, 0.0, 5.0, 5.0, 0.0);
        offscreen.set_fill_style(Color::RED);
        offscreen.fill();
        assert_eq!(pixel(&offscreen, 9, 9), [255, 0, 0, 255]);
        assert_eq!(pixel(&offscreen, 10, 10), [0, 0, 0, 0]);

        let mut primary = RgbaSurface::new(20, 20);
        primary.set_scale(2.0);
        primary.composite_from(&offscreen, 10.0, 10.0);
        assert_eq!(primary.image(), offscreen.image());
    }

    #[test]
    fn test_measure_without_typeface_is_approximate() {
        let mut surface = RgbaSurface::new(1, 1);
        let font = Font::new("any", "normal", 20.0);
        assert_eq!(surface.measure_text("ab", &font), 20.0);
        assert_eq!(surface.measure_text("弹幕", &font), 40.0);
    }

    #[test]
    fn test_dash_pattern() {
        assert!(dash_on(&[], 3.0));
        assert!(dash_on(&[4.0, 2.0], 3.9));
        assert!(!dash_on(&[4.0, 2.0], 5.0));
        assert!(dash_on(&[4.0, 2.0], 6.5));
    }
}
