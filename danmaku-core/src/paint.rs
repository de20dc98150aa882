//! Painting a single danmaku onto a surface

use crate::config::{DevConfig, RenderConfig};
use crate::danmaku::Danmaku;
use crate::segment::SectionContent;
use crate::surface::{ImageSource, ImageStatus, Surface};
use crate::Color;
use std::rc::Rc;

/// Custom painter for a danmaku or for the priority border
pub type PaintFn = Rc<dyn Fn(&mut dyn Surface, &Danmaku, &mut dyn ImageSource)>;

/// Fill behind priority danmaku when no custom border painter is set
pub const PRIOR_BACKGROUND: Color = Color::rgba(0, 0, 0, 0.5);

/// Everything painting needs besides the danmaku itself
pub struct PaintContext<'a> {
    pub surface: &'a mut dyn Surface,
    pub images: &'a mut dyn ImageSource,
    pub config: &'a RenderConfig,
    pub dev: &'a DevConfig,
    /// Replaces the default priority border
    pub prior_painter: Option<&'a PaintFn>,
}

/// Paints `danmaku` at its current position.
///
/// Image segments whose bitmap is still loading (or failed) are skipped.
pub fn paint(danmaku: &Danmaku, ctx: &mut PaintContext<'_>) {
    let surface = &mut *ctx.surface;
    surface.begin_path();

    if let Some(painter) = danmaku.custom_render.as_ref().and_then(|c| c.painter.as_ref()) {
        painter(&mut *surface, danmaku, &mut *ctx.images);
        return;
    }

    let left = danmaku.left;
    let top = danmaku.top.unwrap_or(0.0);
    let radius = danmaku.height;

    if ctx.dev.render_border && !danmaku.prior {
        surface.set_stroke_style(Color::RED);
        surface.round_rect(left, top, danmaku.width, danmaku.height, radius);
        surface.stroke();
    }

    if danmaku.prior {
        match ctx.prior_painter {
            Some(painter) => painter(&mut *surface, danmaku, &mut *ctx.images),
            None => {
                surface.set_stroke_style(Color::WHITE);
                surface.round_rect(left, top, danmaku.width, danmaku.height, radius);
                surface.set_fill_style(PRIOR_BACKGROUND);
                surface.fill();
            }
        }
    }

    surface.set_font(&danmaku.font(ctx.config));
    surface.set_fill_style(danmaku.color);
    for section in &danmaku.sections {
        let x = left + section.left_offset;
        let y = top + section.top_offset;
        match &section.content {
            SectionContent::Text(text) => surface.fill_text(text, x, y),
            SectionContent::Image { url, .. } => {
                if let ImageStatus::Ready(image) = ctx.images.fetch(url) {
                    surface.draw_image(&image, x, y, section.width, section.height);
                }
            }
        }
    }
}
