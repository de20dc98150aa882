//! Text/image segments of a danmaku and their measurement
//!
//! Raw text such as `hi[smile]there` is split into segments, each segment is
//! measured, and the results are composed into the danmaku's bounding box with
//! per-segment offsets relative to that box.

use crate::asset::ImageRegistry;
use crate::surface::{Font, TextMeasure};

/// Inner padding of a danmaku box
pub const PADDING_LEFT: f64 = 5.0;
pub const PADDING_RIGHT: f64 = 5.0;
pub const PADDING_TOP: f64 = 4.0;
pub const PADDING_BOTTOM: f64 = 4.0;

/// Horizontal padding on each side of a text segment
pub const TEXT_PADDING: f64 = 3.0;

/// A piece of raw danmaku text before measurement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text
    Text(String),
    /// A bracket token such as `[smile]`, brackets included
    Image(String),
}

/// Splits `text` into literal text and `[id]` tokens.
///
/// Text without any token is returned as a single text segment, even when empty.
/// Whitespace-only text after the last token is dropped.
pub fn parse_segments(text: &str) -> Vec<Segment> {
    if find_token(text).is_none() {
        return vec![Segment::Text(text.to_string())];
    }

    let mut segments = Vec::new();
    let mut rest = text;
    while let Some((start, end)) = find_token(rest) {
        if start > 0 {
            segments.push(Segment::Text(rest[..start].to_string()));
        }
        segments.push(Segment::Image(rest[start..end].to_string()));
        rest = &rest[end..];
    }
    if !rest.trim().is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }
    segments
}

/// Byte range of the first `[...]` token. A token never spans a line break.
fn find_token(text: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(offset) = text[from..].find('[') {
        let start = from + offset;
        let body = &text[start + 1..];
        match body.find([']', '\n']) {
            Some(i) if body[i..].starts_with(']') => return Some((start, start + 1 + i + 1)),
            _ => from = start + 1,
        }
    }
    None
}

/// What a measured section draws
#[derive(Debug, Clone, PartialEq)]
pub enum SectionContent {
    Text(String),
    Image { id: String, url: String },
}

/// A measured segment positioned inside its danmaku's box
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub content: SectionContent,
    pub width: f64,
    pub height: f64,
    /// Offset from the danmaku's left edge
    pub left_offset: f64,
    /// Offset from the danmaku's top edge
    pub top_offset: f64,
}

impl Section {
    pub fn is_text(&self) -> bool {
        matches!(self.content, SectionContent::Text(_))
    }
}

/// Inputs that influence a danmaku's measured size
#[derive(Debug, Clone, Copy)]
pub struct MeasureParams<'a> {
    pub font: &'a Font,
    pub line_height: f64,
    /// Overrides the composed width
    pub custom_width: Option<f64>,
    /// Overrides the composed height
    pub custom_height: Option<f64>,
    pub images: &'a ImageRegistry,
}

/// Bounding box and sections of a composed danmaku
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub width: f64,
    pub height: f64,
    pub sections: Vec<Section>,
}

/// Measures `text` and lays its sections out inside one box.
///
/// Tokens that do not resolve in the image registry are measured as literal text.
pub fn compose(text: &str, params: MeasureParams<'_>, measure: &mut dyn TextMeasure) -> Metrics {
    let mut sections: Vec<Section> = Vec::new();
    let mut total_width = 0.0;
    let mut max_height: f64 = 0.0;

    for segment in parse_segments(text) {
        let preceding: f64 = sections.iter().map(|s| s.width).sum();

        let image = match &segment {
            Segment::Image(token) => params.images.resolve_token(token),
            Segment::Text(_) => None,
        };

        if let Some(image) = image {
            total_width += image.width;
            max_height = max_height.max(image.height);
            sections.push(Section {
                content: SectionContent::Image {
                    id: image.id.clone(),
                    url: image.url.clone(),
                },
                width: image.width,
                height: image.height,
                left_offset: preceding + PADDING_LEFT,
                top_offset: 0.0,
            });
            continue;
        }

        let text = match segment {
            Segment::Text(text) | Segment::Image(text) => text,
        };
        let mut width = measure.measure_text(&text, params.font);
        if width != 0.0 {
            width += TEXT_PADDING * 2.0;
        }
        let height = params.font.size * params.line_height;
        total_width += width;
        max_height = max_height.max(height);
        sections.push(Section {
            content: SectionContent::Text(text),
            width,
            height,
            left_offset: preceding + PADDING_LEFT + TEXT_PADDING,
            top_offset: 0.0,
        });
    }

    let width = params
        .custom_width
        .unwrap_or(total_width + PADDING_LEFT + PADDING_RIGHT);
    let height = params
        .custom_height
        .unwrap_or(max_height + PADDING_TOP + PADDING_BOTTOM);

    for section in &mut sections {
        section.top_offset = if section.is_text() {
            (height - params.font.size) / 2.0
        } else {
            (height - section.height) / 2.0
        };
    }

    Metrics {
        width,
        height,
        sections,
    }
}
