//! Layout orchestration across scrolling and fixed danmaku
//!
//! [`DanmakuLayout`] owns every danmaku instance, keeps the time-ordered and
//! per-kind lists, and routes submissions to the scroll or fixed allocator.

use crate::asset::ImageRegistry;
use crate::config::{DevConfig, RenderConfig};
use crate::danmaku::{BuildContext, Danmaku, DanmakuKind, DanmakuOptions};
use crate::fixed_layout::FixedLayout;
use crate::scroll_layout::{ScrollEnv, ScrollLayout};
use crate::store::{DanmakuKey, DanmakuStore};
use crate::surface::TextMeasure;
use crate::timeline::insertion_index;
use crate::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

/// Logical size of the drawing surface
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Everything a [`DanmakuLayout`] is created with
#[derive(Debug, Clone, Default)]
pub struct LayoutOptions {
    pub config: RenderConfig,
    pub dev: DevConfig,
    pub images: ImageRegistry,
    pub canvas: Size,
}

/// Owns active danmaku and decides where each one is drawn
pub struct DanmakuLayout {
    store: DanmakuStore,
    /// Every live danmaku, ordered by submission time
    timeline: Vec<DanmakuKey>,
    scroll_keys: Vec<DanmakuKey>,
    fixed_keys: Vec<DanmakuKey>,
    scroll: ScrollLayout,
    fixed: FixedLayout,
    config: RenderConfig,
    dev: DevConfig,
    images: ImageRegistry,
    canvas: Size,
    rng: StdRng,
}

impl DanmakuLayout {
    /// Creates a layout whose random fallbacks are seeded from the OS
    pub fn new(options: LayoutOptions) -> Self {
        Self::with_rng(options, StdRng::from_os_rng())
    }

    /// Creates a layout with an explicit random source, for reproducible placement
    pub fn with_rng(options: LayoutOptions, rng: StdRng) -> Self {
        Self {
            store: DanmakuStore::new(),
            timeline: Vec::new(),
            scroll_keys: Vec::new(),
            fixed_keys: Vec::new(),
            scroll: ScrollLayout::new(),
            fixed: FixedLayout::new(),
            config: options.config,
            dev: options.dev,
            images: options.images,
            canvas: options.canvas,
            rng,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Replaces the render configuration after validating it
    pub fn set_config(&mut self, config: RenderConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn dev(&self) -> &DevConfig {
        &self.dev
    }

    pub fn set_dev(&mut self, dev: DevConfig) {
        self.dev = dev;
    }

    pub fn images(&self) -> &ImageRegistry {
        &self.images
    }

    /// Replaces the image registry; only danmaku measured afterwards see the change
    pub fn set_images(&mut self, images: ImageRegistry) {
        self.images = images;
    }

    pub fn canvas_size(&self) -> Size {
        self.canvas
    }

    /// Updates the logical canvas size used for new danmaku and fixed ranges.
    ///
    /// Track geometry is kept until [`reset_tracks`](Self::reset_tracks).
    pub fn set_canvas_size(&mut self, size: Size) {
        self.canvas = size;
    }

    pub fn scroll_layout(&self) -> &ScrollLayout {
        &self.scroll
    }

    pub fn fixed_layout(&self) -> &FixedLayout {
        &self.fixed
    }

    pub fn get(&self, key: DanmakuKey) -> Option<&Danmaku> {
        self.store.get(key)
    }

    /// Live danmaku in submission-time order
    pub fn iter(&self) -> impl Iterator<Item = (DanmakuKey, &Danmaku)> + '_ {
        self.timeline
            .iter()
            .filter_map(|k| self.store.get(*k).map(|d| (*k, d)))
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    fn scroll_env(&self, origin_ms: i64) -> ScrollEnv {
        ScrollEnv {
            canvas_height: self.canvas.height,
            render_region: self.config.render_region,
            speed: self.config.speed,
            allow_overlap: self.config.allow_overlap,
            origin_ms,
            log_key_data: self.dev.log_key_data,
        }
    }

    fn build(&self, options: DanmakuOptions, origin_ms: i64, measure: &mut dyn TextMeasure) -> Danmaku {
        let ctx = BuildContext {
            config: &self.config,
            images: &self.images,
            canvas_width: self.canvas.width,
            origin_ms,
        };
        Danmaku::build(options, ctx, measure)
    }

    fn insert_sorted(&mut self, key: DanmakuKey, time: i64, scroll: bool) {
        let store = &self.store;
        let time_of = |k: &DanmakuKey| store.get(*k).map_or(i64::MIN, |d| d.time);

        let at = insertion_index(&self.timeline, time, time_of);
        self.timeline.insert(at, key);
        let list = if scroll {
            &mut self.scroll_keys
        } else {
            &mut self.fixed_keys
        };
        let at = insertion_index(list.as_slice(), time, time_of);
        list.insert(at, key);
    }

    /// Adds a batch of submissions and re-runs the full scroll layout pass
    pub fn set_danmakus(&mut self, mut batch: Vec<DanmakuOptions>, measure: &mut dyn TextMeasure) {
        batch.sort_by_key(|options| options.time);
        let origin_ms = self.config.time_origin.resolve();

        for options in batch {
            let danmaku = self.build(options, origin_ms, measure);
            let (time, scroll) = (danmaku.time, danmaku.is_scroll());
            let key = self.store.insert(danmaku);
            self.insert_sorted(key, time, scroll);
        }
        log::debug!(
            "set {} danmaku ({} scrolling, {} fixed)",
            self.timeline.len(),
            self.scroll_keys.len(),
            self.fixed_keys.len()
        );

        let env = self.scroll_env(origin_ms);
        self.scroll
            .layout(&mut self.store, &self.scroll_keys, &env, &mut self.rng);
    }

    /// Adds one submission, placing it without re-running the full layout
    pub fn send(&mut self, options: DanmakuOptions, measure: &mut dyn TextMeasure) -> DanmakuKey {
        let origin_ms = self.config.time_origin.resolve();
        let danmaku = self.build(options, origin_ms, measure);
        let (time, scroll) = (danmaku.time, danmaku.is_scroll());
        let key = self.store.insert(danmaku);

        if scroll {
            let env = self.scroll_env(origin_ms);
            self.scroll.send(&mut self.store, key, &env, &mut self.rng);
        } else {
            self.fixed
                .send(&mut self.store, key, self.canvas.height, &mut self.rng);
        }
        self.insert_sorted(key, time, scroll);
        key
    }

    /// Discards danmaku that have expired by `cutoff`.
    ///
    /// Scroll danmaku expire once they have swept past the left edge, fixed danmaku
    /// once their end time has passed. Sentinel ids always survive.
    pub fn filter(&mut self, cutoff: i64) {
        let translate_x = self.scroll_env(self.config.time_origin.resolve()).translate_x(cutoff);
        let keep = |danmaku: &Danmaku| {
            danmaku.is_sentinel()
                || match &danmaku.kind {
                    DanmakuKind::Scroll(state) => state.original_right - translate_x >= 0.0,
                    DanmakuKind::Fixed(state) => state.end_time >= cutoff,
                }
        };

        let before = self.timeline.len();
        let store = &self.store;
        let kept: HashSet<DanmakuKey> = self
            .timeline
            .iter()
            .copied()
            .filter(|k| store.get(*k).is_some_and(|d| keep(d)))
            .collect();

        self.store.retain(|key, _| kept.contains(&key));
        self.timeline.retain(|k| kept.contains(k));

        let store = &self.store;
        let (scroll, fixed): (Vec<DanmakuKey>, Vec<DanmakuKey>) = self
            .timeline
            .iter()
            .copied()
            .partition(|k| store.get(*k).is_some_and(Danmaku::is_scroll));
        self.scroll_keys = scroll;
        self.fixed_keys = fixed;
        self.fixed.retain_stored(&self.store);

        log::debug!(
            "filtered at {cutoff}: kept {} of {before} danmaku",
            self.timeline.len()
        );
    }

    /// Danmaku to draw at `now`, in ascending submission time.
    ///
    /// Danmaku whose display window has ended are dropped from the layout.
    pub fn visible(&mut self, now: i64) -> Vec<&Danmaku> {
        let env = self.scroll_env(self.config.time_origin.resolve());
        let mut expired = Vec::new();
        let mut keys = self.scroll.visible(
            &mut self.store,
            &mut self.scroll_keys,
            &mut expired,
            now,
            &env,
        );
        keys.extend(self.fixed.visible(
            &mut self.store,
            &mut self.fixed_keys,
            &mut expired,
            now,
            self.canvas.height,
            &mut self.rng,
        ));
        self.discard(&expired);

        let mut items: Vec<&Danmaku> = keys.iter().filter_map(|k| self.store.get(*k)).collect();
        items.sort_by_key(|d| d.time);
        items
    }

    fn discard(&mut self, expired: &[DanmakuKey]) {
        if expired.is_empty() {
            return;
        }
        for key in expired {
            self.store.remove(*key);
        }
        let store = &self.store;
        self.timeline.retain(|k| store.contains(*k));
        log::trace!("discarded {} expired danmaku", expired.len());
    }

    /// Discards track geometry; the next full layout pass rebuilds it
    pub fn reset_tracks(&mut self) {
        self.scroll.reset_tracks();
    }

    /// Re-runs the full scroll layout pass over the active scrolling danmaku
    pub fn relayout(&mut self) {
        let env = self.scroll_env(self.config.time_origin.resolve());
        self.scroll
            .layout(&mut self.store, &self.scroll_keys, &env, &mut self.rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::danmaku::DanmakuType;
    use crate::testing::{rng, sized, HalfEm};
    use crate::timeline::TimeOrigin;

    fn layout(width: f64, height: f64) -> DanmakuLayout {
        let options = LayoutOptions {
            config: RenderConfig {
                time_origin: TimeOrigin::Fixed(0),
                ..Default::default()
            },
            canvas: Size::new(width, height),
            ..Default::default()
        };
        DanmakuLayout::with_rng(options, rng())
    }

    fn ids(items: &[&Danmaku]) -> Vec<String> {
        items.iter().map(|d| d.id.clone()).collect()
    }

    #[test]
    fn test_set_danmakus_sorts_and_partitions() {
        let mut layout = layout(500.0, 400.0);
        layout.set_danmakus(
            vec![
                sized("c", 300, DanmakuType::Scroll, 100.0, 30.0),
                sized("a", 100, DanmakuType::Top, 100.0, 30.0),
                sized("b", 200, DanmakuType::Scroll, 100.0, 30.0),
            ],
            &mut HalfEm,
        );

        let order: Vec<_> = layout.iter().map(|(_, d)| d.id.clone()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(layout.scroll_keys.len(), 2);
        assert_eq!(layout.fixed_keys.len(), 1);
        assert_eq!(layout.scroll_layout().track_height(), 40.0);
    }

    #[test]
    fn test_send_keeps_time_order() {
        let mut layout = layout(500.0, 400.0);
        layout.set_danmakus(
            vec![
                sized("a", 100, DanmakuType::Scroll, 100.0, 30.0),
                sized("c", 300, DanmakuType::Scroll, 100.0, 30.0),
            ],
            &mut HalfEm,
        );
        let key = layout.send(sized("b", 200, DanmakuType::Scroll, 100.0, 30.0), &mut HalfEm);
        let top = layout.send(sized("t", 150, DanmakuType::Top, 100.0, 30.0), &mut HalfEm);

        let order: Vec<_> = layout.iter().map(|(_, d)| d.id.clone()).collect();
        assert_eq!(order, vec!["a", "t", "b", "c"]);
        assert!(layout.get(key).unwrap().top.is_some());
        assert_eq!(layout.get(top).unwrap().top, Some(4.0));
        assert_eq!(layout.fixed_layout().top_stack(), &[top]);
    }

    #[test]
    fn test_visible_merges_kinds_by_time() {
        let mut layout = layout(500.0, 400.0);
        layout.set_danmakus(
            vec![
                sized("s1", 0, DanmakuType::Scroll, 100.0, 30.0),
                sized("top", 500, DanmakuType::Top, 100.0, 30.0).with_duration(5.0),
                sized("s2", 1_000, DanmakuType::Scroll, 100.0, 30.0),
                sized("bottom", 200, DanmakuType::Bottom, 100.0, 30.0).with_duration(5.0),
            ],
            &mut HalfEm,
        );

        let visible = layout.visible(1_000);
        assert_eq!(ids(&visible), vec!["s1", "bottom", "top", "s2"]);
        assert_eq!(visible[0].left, 400.0);
    }

    #[test]
    fn test_visible_discards_ended_danmaku() {
        let mut layout = layout(500.0, 400.0);
        for i in 0..20 {
            let time = i * 500;
            layout.send(sized(&format!("s{i}"), time, DanmakuType::Scroll, 100.0, 30.0), &mut HalfEm);
            layout.send(sized(&format!("t{i}"), time, DanmakuType::Top, 100.0, 30.0), &mut HalfEm);
        }
        let late = layout.send(sized("late", 999_000, DanmakuType::Bottom, 100.0, 30.0), &mut HalfEm);
        assert_eq!(layout.len(), 41);

        let visible = layout.visible(1_000_000);
        assert_eq!(ids(&visible), vec!["late"]);
        assert_eq!(layout.len(), 1);
        assert_eq!(layout.store.len(), 1);
        assert!(layout.scroll_keys.is_empty());
        assert_eq!(layout.fixed_keys, vec![late]);
        assert_eq!(layout.fixed_layout().bottom_stack(), &[late]);

        layout.visible(2_000_000);
        assert!(layout.is_empty());
        assert_eq!(layout.store.len(), 0);
        assert_eq!(layout.iter().count(), 0);
    }

    #[test]
    fn test_filter_drops_expired_and_keeps_sentinels() {
        let mut layout = layout(500.0, 400.0);
        layout.set_danmakus(
            vec![
                // sweeps past x = 0 at 6s
                sized("gone", 0, DanmakuType::Scroll, 100.0, 30.0),
                sized("default-welcome", 0, DanmakuType::Scroll, 100.0, 30.0),
                sized("soon", 5_000, DanmakuType::Scroll, 100.0, 30.0),
                sized("fixed-old", 0, DanmakuType::Top, 100.0, 30.0).with_duration(1.0),
                sized("fixed-new", 9_000, DanmakuType::Top, 100.0, 30.0).with_duration(1.0),
            ],
            &mut HalfEm,
        );

        layout.filter(7_000);
        let order: Vec<_> = layout.iter().map(|(_, d)| d.id.clone()).collect();
        assert_eq!(order, vec!["default-welcome", "soon", "fixed-new"]);
        assert_eq!(layout.scroll_keys.len(), 2);
        assert_eq!(layout.fixed_keys.len(), 1);
        assert_eq!(layout.store.len(), 3);
    }

    #[test]
    fn test_reset_and_relayout() {
        let mut layout = layout(500.0, 400.0);
        layout.set_danmakus(
            vec![sized("a", 0, DanmakuType::Scroll, 100.0, 30.0)],
            &mut HalfEm,
        );
        layout.set_canvas_size(Size::new(500.0, 200.0));
        assert_eq!(layout.scroll_layout().real_tracks().len(), 10);

        layout.reset_tracks();
        layout.relayout();
        assert_eq!(layout.scroll_layout().real_tracks().len(), 5);
    }

    #[test]
    fn test_set_config_validates() {
        let mut layout = layout(500.0, 400.0);
        let bad = RenderConfig {
            opacity: 2.0,
            ..Default::default()
        };
        assert!(layout.set_config(bad).is_err());
        assert_eq!(layout.config().opacity, 1.0);
    }
}
