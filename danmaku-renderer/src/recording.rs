//! A canvas that records draw calls instead of rasterizing them

use crate::host::Canvas;
use danmaku_core::{Color, Font, Surface, TextMeasure};
use image::RgbaImage;

/// One recorded drawing operation, in logical pixels
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    ClearRect { x: f64, y: f64, width: f64, height: f64 },
    FillText { text: String, x: f64, y: f64, color: Color, alpha: f32, font: String },
    DrawImage { x: f64, y: f64, width: f64, height: f64 },
    RoundRect { x: f64, y: f64, width: f64, height: f64, radius: f64 },
    MoveTo { x: f64, y: f64 },
    LineTo { x: f64, y: f64 },
    Fill { color: Color, alpha: f32 },
    Stroke { color: Color, dash: Vec<f64> },
    Composite { width: f64, height: f64, alpha: f32, source_commands: usize },
}

/// Records every call for later inspection.
///
/// Text is measured as half an em per character so layouts are reproducible.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    commands: Vec<DrawCommand>,
    fill: Color,
    stroke: Color,
    alpha: f32,
    font: Font,
    dash: Vec<f64>,
    pixel_size: (u32, u32),
    scale: f64,
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            fill: Color::BLACK,
            stroke: Color::BLACK,
            alpha: 1.0,
            font: Font::new("sans-serif", "normal", 10.0),
            dash: Vec::new(),
            pixel_size: (0, 0),
            scale: 1.0,
        }
    }
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Texts drawn so far, in draw order
    pub fn texts(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::FillText { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl TextMeasure for RecordingSurface {
    fn measure_text(&mut self, text: &str, font: &Font) -> f64 {
        text.chars().count() as f64 * font.size / 2.0
    }
}

impl Surface for RecordingSurface {
    fn clear_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.commands.push(DrawCommand::ClearRect { x, y, width, height });
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
        self.alpha = alpha;
    }

    fn global_alpha(&self) -> f32 {
        self.alpha
    }

    fn set_font(&mut self, font: &Font) {
        self.font = font.clone();
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64) {
        self.commands.push(DrawCommand::FillText {
            text: text.to_string(),
            x,
            y,
            color: self.fill,
            alpha: self.alpha,
            font: self.font.css(),
        });
    }

    fn draw_image(&mut self, _image: &RgbaImage, x: f64, y: f64, width: f64, height: f64) {
        self.commands.push(DrawCommand::DrawImage { x, y, width, height });
    }

    fn begin_path(&mut self) {}

    fn round_rect(&mut self, x: f64, y: f64, width: f64, height: f64, radius: f64) {
        self.commands.push(DrawCommand::RoundRect {
            x,
            y,
            width,
            height,
            radius,
        });
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.commands.push(DrawCommand::MoveTo { x, y });
    }

    fn line_to(&mut self, x: f64, y: f64) {
        self.commands.push(DrawCommand::LineTo { x, y });
    }

    fn set_line_dash(&mut self, segments: &[f64]) {
        self.dash = segments.to_vec();
    }

    fn fill(&mut self) {
        self.commands.push(DrawCommand::Fill {
            color: self.fill,
            alpha: self.alpha,
        });
    }

    fn stroke(&mut self) {
        self.commands.push(DrawCommand::Stroke {
            color: self.stroke,
            dash: self.dash.clone(),
        });
    }
}

impl Canvas for RecordingSurface {
    fn set_pixel_size(&mut self, width: u32, height: u32) {
        self.pixel_size = (width, height);
        self.commands.clear();
    }

    fn pixel_size(&self) -> (u32, u32) {
        self.pixel_size
    }

    fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn composite_from(&mut self, source: &Self, width: f64, height: f64) {
        self.commands.push(DrawCommand::Composite {
            width,
            height,
            alpha: self.alpha,
            source_commands: source.commands.len(),
        });
    }
}
