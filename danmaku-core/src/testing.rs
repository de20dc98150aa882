//! Deterministic helpers shared by the unit tests

use crate::asset::ImageRegistry;
use crate::config::RenderConfig;
use crate::danmaku::{BuildContext, CustomRender, Danmaku, DanmakuOptions, DanmakuType};
use crate::store::{DanmakuKey, DanmakuStore};
use crate::surface::{Font, TextMeasure};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Every char is half an em wide
#[derive(Debug, Default)]
pub struct HalfEm;

impl TextMeasure for HalfEm {
    fn measure_text(&mut self, text: &str, font: &Font) -> f64 {
        text.chars().count() as f64 * font.size / 2.0
    }
}

pub fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

/// Submission whose box size is forced to `width` x `height`
pub fn sized(id: &str, time: i64, kind: DanmakuType, width: f64, height: f64) -> DanmakuOptions {
    DanmakuOptions::new(id, time, id, kind).with_custom_render(CustomRender {
        width: Some(width),
        height: Some(height),
        painter: None,
    })
}

/// Builds `options` against a canvas of `canvas_width` with origin 0 and stores it
pub fn store_built(
    store: &mut DanmakuStore,
    options: DanmakuOptions,
    config: &RenderConfig,
    canvas_width: f64,
) -> DanmakuKey {
    let images = ImageRegistry::default();
    let ctx = BuildContext {
        config,
        images: &images,
        canvas_width,
        origin_ms: 0,
    };
    store.insert(Danmaku::build(options, ctx, &mut HalfEm))
}
