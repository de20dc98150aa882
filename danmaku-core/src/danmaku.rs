//! Danmaku records and their measured, laid-out instances

use crate::asset::ImageRegistry;
use crate::config::RenderConfig;
use crate::paint::PaintFn;
use crate::segment::{self, MeasureParams, Section};
use crate::surface::{Font, TextMeasure};
use crate::timeline::sweep_offset;
use crate::Color;
use std::fmt;

pub const DEFAULT_FONT_SIZE: f64 = 18.0;
pub const DEFAULT_LINE_HEIGHT: f64 = 1.0;
/// Display duration of fixed danmaku when none is given, in seconds
pub const DEFAULT_FIXED_DURATION_SECS: f64 = 1.0;
/// Danmaku whose id contains this marker survive the time filter
pub const DEFAULT_DANMAKU_ID: &str = "default";

/// Placement behaviour requested by a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DanmakuType {
    /// Sweeps right to left across the render region
    Scroll,
    /// Centred, stacked down from the top edge
    Top,
    /// Centred, stacked up from the bottom edge
    Bottom,
}

/// Size override and painter supplied for one danmaku
#[derive(Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CustomRender {
    pub width: Option<f64>,
    pub height: Option<f64>,
    /// Replaces the default painting entirely when set
    #[cfg_attr(feature = "serde", serde(skip))]
    pub painter: Option<PaintFn>,
}

impl fmt::Debug for CustomRender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRender")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("painter", &self.painter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// A danmaku submission, as delivered in bulk or by a single send
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct DanmakuOptions {
    pub id: String,
    /// Submission timestamp in milliseconds
    pub time: i64,
    pub text: String,
    pub danmaku_type: DanmakuType,
    #[cfg_attr(feature = "serde", serde(default))]
    pub font_size: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub line_height: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub color: Option<String>,
    /// Important (e.g. self-sent) danmaku are never dropped by the layouts
    #[cfg_attr(feature = "serde", serde(default))]
    pub prior: bool,
    /// Display duration of fixed danmaku in seconds
    #[cfg_attr(feature = "serde", serde(default))]
    pub duration: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub custom_render: Option<CustomRender>,
}

impl DanmakuOptions {
    /// Creates a submission with default styling
    pub fn new(
        id: impl Into<String>,
        time: i64,
        text: impl Into<String>,
        danmaku_type: DanmakuType,
    ) -> Self {
        Self {
            id: id.into(),
            time,
            text: text.into(),
            danmaku_type,
            font_size: None,
            line_height: None,
            color: None,
            prior: false,
            duration: None,
            custom_render: None,
        }
    }

    /// Marks the submission as important
    pub fn prior(mut self) -> Self {
        self.prior = true;
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_font_size(mut self, font_size: f64) -> Self {
        self.font_size = Some(font_size);
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_custom_render(mut self, custom_render: CustomRender) -> Self {
        self.custom_render = Some(custom_render);
        self
    }
}

/// Which half of the surface a fixed danmaku stacks in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedPosition {
    Top,
    Bottom,
}

/// Layout state of a scrolling danmaku
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollState {
    /// Left edge at the time origin
    pub original_left: f64,
    /// Right edge at the time origin
    pub original_right: f64,
    /// Number of real tracks spanned; zero until the first layout pass
    pub grade: usize,
    /// Whether the last placement found room for this danmaku
    pub show: bool,
}

/// Layout state of a fixed danmaku
#[derive(Debug, Clone, PartialEq)]
pub struct FixedState {
    pub position: FixedPosition,
    /// Last visible instant in milliseconds
    pub end_time: i64,
}

/// Kind-specific part of a danmaku
#[derive(Debug, Clone, PartialEq)]
pub enum DanmakuKind {
    Scroll(ScrollState),
    Fixed(FixedState),
}

/// Canvas geometry and settings a danmaku is measured against
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub config: &'a RenderConfig,
    pub images: &'a ImageRegistry,
    /// Logical canvas width
    pub canvas_width: f64,
    /// Resolved time origin in milliseconds
    pub origin_ms: i64,
}

/// A measured danmaku instance.
///
/// `top` and `left` are written only by the layout that placed the danmaku and by the
/// per-frame sweep translation.
#[derive(Debug, Clone)]
pub struct Danmaku {
    pub id: String,
    pub time: i64,
    pub text: String,
    pub prior: bool,
    pub font_size: f64,
    pub line_height: f64,
    pub color: Color,
    pub width: f64,
    pub height: f64,
    pub left: f64,
    /// `None` until a layout assigns a vertical position
    pub top: Option<f64>,
    pub sections: Vec<Section>,
    pub custom_render: Option<CustomRender>,
    pub kind: DanmakuKind,
}

impl Danmaku {
    /// Measures a submission and derives its kind-specific geometry
    pub fn build(
        options: DanmakuOptions,
        ctx: BuildContext<'_>,
        measure: &mut dyn TextMeasure,
    ) -> Self {
        let font_size = options.font_size.unwrap_or(DEFAULT_FONT_SIZE);
        let line_height = options.line_height.unwrap_or(DEFAULT_LINE_HEIGHT);
        let color = match options.color.as_deref() {
            None => Color::WHITE,
            Some(raw) => Color::parse(raw).unwrap_or_else(|e| {
                log::warn!("danmaku {}: {}, using white", options.id, e);
                Color::WHITE
            }),
        };

        let font = Font::new(
            ctx.config.font_family.clone(),
            ctx.config.font_weight.clone(),
            font_size,
        );
        let custom = options.custom_render.as_ref();
        let metrics = segment::compose(
            &options.text,
            MeasureParams {
                font: &font,
                line_height,
                custom_width: custom.and_then(|c| c.width),
                custom_height: custom.and_then(|c| c.height),
                images: ctx.images,
            },
            measure,
        );

        let (kind, left) = match options.danmaku_type {
            DanmakuType::Scroll => {
                let original_left = ctx.canvas_width
                    + sweep_offset(options.time, ctx.origin_ms, ctx.config.speed);
                let state = ScrollState {
                    original_left,
                    original_right: original_left + metrics.width,
                    grade: 0,
                    show: true,
                };
                (DanmakuKind::Scroll(state), original_left)
            }
            DanmakuType::Top | DanmakuType::Bottom => {
                let seconds = options
                    .duration
                    .filter(|d| *d > 0.0)
                    .unwrap_or(DEFAULT_FIXED_DURATION_SECS);
                let position = if options.danmaku_type == DanmakuType::Top {
                    FixedPosition::Top
                } else {
                    FixedPosition::Bottom
                };
                let state = FixedState {
                    position,
                    end_time: options.time + (seconds * 1000.0).round() as i64,
                };
                (
                    DanmakuKind::Fixed(state),
                    (ctx.canvas_width - metrics.width) / 2.0,
                )
            }
        };

        Self {
            id: options.id,
            time: options.time,
            text: options.text,
            prior: options.prior,
            font_size,
            line_height,
            color,
            width: metrics.width,
            height: metrics.height,
            left,
            top: None,
            sections: metrics.sections,
            custom_render: options.custom_render,
            kind,
        }
    }

    /// The submission type this danmaku was built from
    pub fn danmaku_type(&self) -> DanmakuType {
        match &self.kind {
            DanmakuKind::Scroll(_) => DanmakuType::Scroll,
            DanmakuKind::Fixed(f) => match f.position {
                FixedPosition::Top => DanmakuType::Top,
                FixedPosition::Bottom => DanmakuType::Bottom,
            },
        }
    }

    pub fn is_scroll(&self) -> bool {
        matches!(self.kind, DanmakuKind::Scroll(_))
    }

    pub fn scroll(&self) -> Option<&ScrollState> {
        match &self.kind {
            DanmakuKind::Scroll(state) => Some(state),
            DanmakuKind::Fixed(_) => None,
        }
    }

    pub fn scroll_mut(&mut self) -> Option<&mut ScrollState> {
        match &mut self.kind {
            DanmakuKind::Scroll(state) => Some(state),
            DanmakuKind::Fixed(_) => None,
        }
    }

    pub fn fixed(&self) -> Option<&FixedState> {
        match &self.kind {
            DanmakuKind::Fixed(state) => Some(state),
            DanmakuKind::Scroll(_) => None,
        }
    }

    /// Font this danmaku's text is drawn with
    pub fn font(&self, config: &RenderConfig) -> Font {
        Font::new(
            config.font_family.clone(),
            config.font_weight.clone(),
            self.font_size,
        )
    }

    /// Whether the id marks this danmaku as a long-lived sentinel
    pub fn is_sentinel(&self) -> bool {
        self.id.contains(DEFAULT_DANMAKU_ID)
    }
}
