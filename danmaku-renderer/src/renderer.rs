//! Frame scheduler driving the layout and painting onto host canvases

use crate::events::{Listeners, RendererEvent, SubscriptionId};
use crate::host::{Canvas, FrameHandle, Host};
use crate::image_cache::ImageCache;
use crate::{Error, Result};
use danmaku_core::{
    paint, Color, Danmaku, DanmakuKey, DanmakuLayout, DanmakuOptions, DevConfig, ImageRegistry,
    LayoutOptions, PaintContext, PaintFn, RenderConfig, Size, Surface,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::rc::Rc;

/// Per-frame predicate; danmaku for which it returns false are not drawn
pub type FilterFn = Rc<dyn Fn(&Danmaku) -> bool>;

/// Dash pattern of the track guide lines
const GUIDE_DASH: [f64; 2] = [5.0, 15.0];

/// Everything a renderer is created with
#[derive(Clone, Default)]
pub struct RendererOptions {
    pub config: RenderConfig,
    pub dev: DevConfig,
    pub images: ImageRegistry,
    /// Initial bulk submission
    pub danmakus: Vec<DanmakuOptions>,
    pub filter: Option<FilterFn>,
    /// Replaces the default priority border
    pub prior_painter: Option<PaintFn>,
    /// Seed for the random placement fallbacks; OS entropy when unset
    pub seed: Option<u64>,
}

/// Drives a [`DanmakuLayout`] frame by frame on behalf of a [`Host`].
///
/// Each tick paints the visible set onto an off-screen canvas with the configured
/// opacity, then composites it onto the primary canvas. The renderer starts
/// disabled with the container hidden.
pub struct DanmakuRenderer<H: Host> {
    host: H,
    layout: DanmakuLayout,
    canvas: H::Canvas,
    offscreen: H::Canvas,
    debug_canvas: Option<H::Canvas>,
    images: ImageCache,
    filter: Option<FilterFn>,
    prior_painter: Option<PaintFn>,
    listeners: Listeners,
    dpr: f64,
    frame: Option<FrameHandle>,
    enabled: bool,
    current_time: i64,
    drawn_guides: Vec<f64>,
}

/// Sizes `canvas` to cover `size` logical pixels at `dpr`
fn fit_canvas<C: Canvas>(canvas: &mut C, size: Size, dpr: f64) {
    let width = (size.width * dpr).round().max(0.0) as u32;
    let height = (size.height * dpr).round().max(0.0) as u32;
    canvas.set_pixel_size(width, height);
    canvas.set_scale(dpr);
}

fn sanitize_dpr(dpr: f64) -> f64 {
    if dpr.is_finite() && dpr > 0.0 {
        dpr
    } else {
        1.0
    }
}

impl<H: Host> DanmakuRenderer<H> {
    /// Creates a renderer on `host`, bitmaps resolved through `images`.
    ///
    /// Fails when the host has no container or cannot create canvases.
    pub fn new(mut host: H, images: ImageCache, options: RendererOptions) -> Result<Self> {
        options.config.validate()?;

        let size = host.container_size().ok_or_else(|| {
            log::error!("Unable to obtain container element");
            Error::NoContainer
        })?;
        let create = |host: &mut H| {
            host.create_canvas().ok_or_else(|| {
                log::error!("Unable to obtain drawing surface");
                Error::NoSurface
            })
        };
        let canvas = create(&mut host)?;
        let offscreen = create(&mut host)?;
        let debug_canvas = if options.dev.scroll_debug_mode {
            Some(create(&mut host)?)
        } else {
            None
        };

        let layout_options = LayoutOptions {
            config: options.config,
            dev: options.dev,
            images: options.images,
            canvas: size,
        };
        let layout = match options.seed {
            Some(seed) => DanmakuLayout::with_rng(layout_options, StdRng::seed_from_u64(seed)),
            None => DanmakuLayout::new(layout_options),
        };

        let dpr = sanitize_dpr(host.device_pixel_ratio());
        let mut renderer = Self {
            host,
            layout,
            canvas,
            offscreen,
            debug_canvas,
            images,
            filter: options.filter,
            prior_painter: options.prior_painter,
            listeners: Listeners::new(),
            dpr,
            frame: None,
            enabled: false,
            current_time: 0,
            drawn_guides: Vec::new(),
        };
        renderer.fit_canvases(size);
        renderer.host.set_visible(false);
        log::debug!(
            "renderer created: {}x{} logical px at dpr {}",
            size.width,
            size.height,
            dpr
        );

        if !options.danmakus.is_empty() {
            renderer.set_danmakus(options.danmakus);
        }
        Ok(renderer)
    }

    fn fit_canvases(&mut self, size: Size) {
        fit_canvas(&mut self.canvas, size, self.dpr);
        fit_canvas(&mut self.offscreen, size, self.dpr);
        if let Some(debug) = &mut self.debug_canvas {
            fit_canvas(debug, size, self.dpr);
        }
        self.drawn_guides.clear();
    }

    /// Logical size of the primary canvas
    pub fn canvas_size(&self) -> Size {
        let (width, height) = self.canvas.pixel_size();
        Size::new(width as f64 / self.dpr, height as f64 / self.dpr)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a frame is scheduled
    pub fn is_running(&self) -> bool {
        self.frame.is_some()
    }

    /// Time captured at the start of the last tick
    pub fn current_time(&self) -> i64 {
        self.current_time
    }

    pub fn layout(&self) -> &DanmakuLayout {
        &self.layout
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn canvas(&self) -> &H::Canvas {
        &self.canvas
    }

    pub fn offscreen_canvas(&self) -> &H::Canvas {
        &self.offscreen
    }

    /// Canvas with the track guides, present when scroll debugging is on
    pub fn debug_canvas(&self) -> Option<&H::Canvas> {
        self.debug_canvas.as_ref()
    }

    pub fn image_cache(&self) -> &ImageCache {
        &self.images
    }

    pub fn set_config(&mut self, config: RenderConfig) -> Result<()> {
        self.layout.set_config(config)?;
        Ok(())
    }

    /// Replaces the developer switches, creating the debug canvas on demand
    pub fn set_dev(&mut self, dev: DevConfig) {
        if dev.scroll_debug_mode && self.debug_canvas.is_none() {
            match self.host.create_canvas() {
                Some(mut debug) => {
                    fit_canvas(&mut debug, self.layout.canvas_size(), self.dpr);
                    self.debug_canvas = Some(debug);
                }
                None => log::warn!("unable to create debug canvas"),
            }
        } else if !dev.scroll_debug_mode {
            self.debug_canvas = None;
        }
        self.layout.set_dev(dev);
        self.drawn_guides.clear();
        self.refresh_track_guides();
    }

    pub fn set_images(&mut self, images: ImageRegistry) {
        self.layout.set_images(images);
    }

    pub fn set_filter(&mut self, filter: Option<FilterFn>) {
        self.filter = filter;
    }

    pub fn set_prior_painter(&mut self, painter: Option<PaintFn>) {
        self.prior_painter = painter;
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&RendererEvent) + 'static) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Adds a batch of danmaku and re-runs the full layout
    pub fn set_danmakus(&mut self, danmakus: Vec<DanmakuOptions>) {
        self.layout.set_danmakus(danmakus, &mut self.offscreen);
        self.refresh_track_guides();
    }

    /// Adds a single danmaku
    pub fn send(&mut self, options: DanmakuOptions) -> DanmakuKey {
        let key = self.layout.send(options, &mut self.offscreen);
        self.refresh_track_guides();
        key
    }

    /// Discards the track geometry and lays the active danmaku out again
    pub fn reset_layout(&mut self) {
        self.layout.reset_tracks();
        self.layout.relayout();
        self.refresh_track_guides();
    }

    /// Starts or stops playback.
    ///
    /// Danmaku already expired at `now + delay` are discarded first. Disabling
    /// cancels the pending frame and clears the primary canvas.
    pub fn set_enabled(&mut self, enabled: bool) {
        let cutoff = self.host.now_ms() + self.layout.config().delay;
        self.layout.filter(cutoff);

        self.enable_change(enabled);
        self.cancel_frame();
        if enabled {
            self.render(false);
        } else {
            let size = self.canvas_size();
            self.canvas.clear_rect(0.0, 0.0, size.width, size.height);
        }
    }

    /// Stops the frame loop without hiding anything
    pub fn pause(&mut self) {
        self.cancel_frame();
    }

    /// Renders exactly one frame, unless the loop is running
    pub fn render_frame(&mut self) {
        if self.frame.is_none() {
            self.enable_change(true);
            self.render(true);
        }
    }

    /// Called by the host when a requested frame fires
    pub fn tick(&mut self) {
        self.frame = None;
        self.render(false);
    }

    /// Re-reads the container size and device pixel ratio and resizes every canvas.
    ///
    /// Danmaku and track geometry are kept.
    pub fn resize(&mut self) {
        let Some(size) = self.host.container_size() else {
            log::error!("Unable to obtain container element");
            return;
        };
        self.dpr = sanitize_dpr(self.host.device_pixel_ratio());
        self.fit_canvases(size);
        self.layout.set_canvas_size(size);
        self.refresh_track_guides();
        log::debug!("resized to {}x{} at dpr {}", size.width, size.height, self.dpr);
    }

    fn enable_change(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.host.set_visible(enabled);
        self.listeners.emit(&RendererEvent::Enabled { enabled });
    }

    fn cancel_frame(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.host.cancel_frame(frame);
        }
    }

    fn render(&mut self, one_frame: bool) {
        self.current_time = self.host.now_ms();
        if !self.enabled {
            return;
        }
        self.images.poll();

        let size = self.canvas_size();
        let config = self.layout.config().clone();
        let dev = self.layout.dev().clone();

        let mut visible = self.layout.visible(self.current_time);
        if let Some(filter) = &self.filter {
            visible.retain(|danmaku| filter(*danmaku));
        }

        self.offscreen.clear_rect(0.0, 0.0, size.width, size.height);
        self.offscreen.set_global_alpha(config.opacity);
        let mut ctx = PaintContext {
            surface: &mut self.offscreen,
            images: &mut self.images,
            config: &config,
            dev: &dev,
            prior_painter: self.prior_painter.as_ref(),
        };
        for danmaku in &visible {
            paint(danmaku, &mut ctx);
        }
        let painted = visible.len();

        self.canvas.clear_rect(0.0, 0.0, size.width, size.height);
        if self.canvas.pixel_size().0 > 0 {
            self.canvas
                .composite_from(&self.offscreen, size.width, size.height);
        }
        log::trace!("frame at {}: {painted} danmaku", self.current_time);

        if !one_frame {
            self.frame = Some(self.host.request_frame());
        }
    }

    /// Redraws the track guides on the debug canvas when the tracks changed
    fn refresh_track_guides(&mut self) {
        let Some(debug) = &mut self.debug_canvas else {
            return;
        };
        let guides = self.layout.scroll_layout().track_guides();
        if guides == self.drawn_guides {
            return;
        }
        let size = self.layout.canvas_size();

        debug.clear_rect(0.0, 0.0, size.width, size.height);
        debug.set_line_dash(&[]);
        debug.set_stroke_style(Color::RED);
        debug.begin_path();
        debug.round_rect(0.0, 0.0, size.width, size.height, 0.0);
        debug.stroke();

        debug.set_stroke_style(Color::BLACK);
        debug.set_line_dash(&GUIDE_DASH);
        debug.begin_path();
        for y in &guides {
            debug.move_to(0.0, *y);
            debug.line_to(size.width, *y);
        }
        debug.stroke();
        self.drawn_guides = guides;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_cache::MemoryImageLoader;
    use crate::recording::{DrawCommand, RecordingSurface};
    use danmaku_core::{CustomRender, DanmakuImage, DanmakuType, TimeOrigin};
    use image::RgbaImage;
    use std::cell::RefCell;

    struct TestHost {
        now: i64,
        size: Option<Size>,
        dpr: f64,
        canvases: bool,
        visible: Option<bool>,
        next_frame: u64,
        pending: Vec<FrameHandle>,
        cancelled: Vec<FrameHandle>,
    }

    impl TestHost {
        fn new(width: f64, height: f64) -> Self {
            Self {
                now: 0,
                size: Some(Size::new(width, height)),
                dpr: 1.0,
                canvases: true,
                visible: None,
                next_frame: 0,
                pending: Vec::new(),
                cancelled: Vec::new(),
            }
        }
    }

    impl Host for TestHost {
        type Canvas = RecordingSurface;

        fn create_canvas(&mut self) -> Option<RecordingSurface> {
            self.canvases.then(RecordingSurface::new)
        }

        fn container_size(&self) -> Option<Size> {
            self.size
        }

        fn device_pixel_ratio(&self) -> f64 {
            self.dpr
        }

        fn set_visible(&mut self, visible: bool) {
            self.visible = Some(visible);
        }

        fn request_frame(&mut self) -> FrameHandle {
            self.next_frame += 1;
            let handle = FrameHandle(self.next_frame);
            self.pending.push(handle);
            handle
        }

        fn cancel_frame(&mut self, handle: FrameHandle) {
            self.pending.retain(|h| *h != handle);
            self.cancelled.push(handle);
        }

        fn now_ms(&self) -> i64 {
            self.now
        }
    }

    fn options() -> RendererOptions {
        RendererOptions {
            config: RenderConfig {
                time_origin: TimeOrigin::Fixed(0),
                ..Default::default()
            },
            seed: Some(7),
            ..Default::default()
        }
    }

    fn renderer(host: TestHost, options: RendererOptions) -> DanmakuRenderer<TestHost> {
        DanmakuRenderer::new(host, ImageCache::new(MemoryImageLoader::new()), options).unwrap()
    }

    fn top(id: &str, time: i64) -> DanmakuOptions {
        DanmakuOptions::new(id, time, id, DanmakuType::Top)
    }

    #[test]
    fn test_initialization_faults() {
        let mut host = TestHost::new(100.0, 100.0);
        host.size = None;
        let result = DanmakuRenderer::new(host, ImageCache::new(MemoryImageLoader::new()), options());
        assert!(matches!(result, Err(Error::NoContainer)));

        let mut host = TestHost::new(100.0, 100.0);
        host.canvases = false;
        let result = DanmakuRenderer::new(host, ImageCache::new(MemoryImageLoader::new()), options());
        assert!(matches!(result, Err(Error::NoSurface)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut options = options();
        options.config.opacity = 2.0;
        let result = DanmakuRenderer::new(
            TestHost::new(100.0, 100.0),
            ImageCache::new(MemoryImageLoader::new()),
            options,
        );
        assert!(matches!(result, Err(Error::Core(_))));
    }

    #[test]
    fn test_canvases_follow_device_pixel_ratio() {
        let mut host = TestHost::new(400.0, 300.0);
        host.dpr = 2.0;
        let renderer = renderer(host, options());

        assert_eq!(renderer.canvas().pixel_size(), (800, 600));
        assert_eq!(renderer.offscreen_canvas().pixel_size(), (800, 600));
        assert_eq!(renderer.canvas().scale(), 2.0);
        assert_eq!(renderer.canvas_size(), Size::new(400.0, 300.0));
        assert_eq!(renderer.host().visible, Some(false));
        assert!(!renderer.enabled());
        assert!(renderer.debug_canvas().is_none());
    }

    #[test]
    fn test_enable_runs_loop_and_pause_is_idempotent() {
        let mut r = renderer(TestHost::new(400.0, 300.0), options());
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        r.subscribe(move |e| sink.borrow_mut().push(*e));

        r.set_enabled(true);
        assert!(r.enabled());
        assert!(r.is_running());
        assert_eq!(r.host().visible, Some(true));
        assert_eq!(r.host().pending.len(), 1);

        r.host_mut().pending.clear();
        r.tick();
        assert_eq!(r.host().pending.len(), 1);

        r.pause();
        r.pause();
        assert!(!r.is_running());
        assert!(r.host().pending.is_empty());
        assert_eq!(r.host().cancelled.len(), 1);
        assert!(r.enabled());

        r.set_enabled(false);
        assert_eq!(r.host().visible, Some(false));
        assert!(matches!(
            r.canvas().commands().last(),
            Some(DrawCommand::ClearRect { .. })
        ));
        assert_eq!(
            *events.borrow(),
            vec![
                RendererEvent::Enabled { enabled: true },
                RendererEvent::Enabled { enabled: false },
            ]
        );
    }

    #[test]
    fn test_disable_cancels_pending_tick() {
        let mut r = renderer(TestHost::new(400.0, 300.0), options());
        r.set_enabled(true);
        assert_eq!(r.host().pending, vec![FrameHandle(1)]);

        r.set_enabled(false);
        assert!(!r.enabled());
        assert!(!r.is_running());
        assert!(r.host().pending.is_empty());
        assert_eq!(r.host().cancelled, vec![FrameHandle(1)]);
    }

    #[test]
    fn test_frame_paints_in_time_order_with_opacity() {
        let mut options = options();
        options.config.opacity = 0.5;
        options.danmakus = vec![top("b", 1000), top("a", 500)];
        let mut host = TestHost::new(400.0, 300.0);
        host.now = 1200;
        let mut r = renderer(host, options);

        r.render_frame();
        assert!(!r.is_running());
        assert_eq!(r.current_time(), 1200);
        assert_eq!(r.offscreen_canvas().texts(), vec!["a", "b"]);
        assert!(r.offscreen_canvas().commands().iter().all(|c| match c {
            DrawCommand::FillText { alpha, .. } => *alpha == 0.5,
            _ => true,
        }));
        assert!(matches!(
            r.canvas().commands().last(),
            Some(DrawCommand::Composite { width, height, .. }) if *width == 400.0 && *height == 300.0
        ));
    }

    #[test]
    fn test_render_frame_is_skipped_while_looping() {
        let mut options = options();
        options.danmakus = vec![top("a", 0)];
        let mut r = renderer(TestHost::new(400.0, 300.0), options);
        r.set_enabled(true);
        let painted = r.offscreen_canvas().texts().len();

        r.render_frame();
        assert_eq!(r.offscreen_canvas().texts().len(), painted);
        assert_eq!(r.host().next_frame, 1);
    }

    #[test]
    fn test_filter_predicate_hides_danmaku() {
        let mut options = options();
        options.danmakus = vec![top("a", 0), top("b", 0)];
        options.filter = Some(Rc::new(|d: &Danmaku| d.id != "b"));
        let mut r = renderer(TestHost::new(400.0, 300.0), options);

        r.render_frame();
        assert_eq!(r.offscreen_canvas().texts(), vec!["a"]);
    }

    #[test]
    fn test_toggle_discards_expired_danmaku() {
        let mut options = options();
        options.danmakus = vec![top("old", 1000), top("default-notice", 1000), top("new", 5500)];
        let mut host = TestHost::new(400.0, 300.0);
        host.now = 5000;
        let mut r = renderer(host, options);
        assert_eq!(r.layout().len(), 3);

        r.set_enabled(false);
        let ids: Vec<&str> = r.layout().iter().map(|(_, d)| d.id.as_str()).collect();
        assert_eq!(ids, vec!["default-notice", "new"]);

        // once drawn, an ended sentinel leaves like any other danmaku
        r.set_enabled(true);
        let ids: Vec<&str> = r.layout().iter().map(|(_, d)| d.id.as_str()).collect();
        assert_eq!(ids, vec!["new"]);
    }

    #[test]
    fn test_images_appear_once_loaded() {
        let loader = MemoryImageLoader::new().with_image("smile.png", RgbaImage::new(8, 8));
        let mut options = options();
        options.images = ImageRegistry::new(vec![DanmakuImage::new("smile", "smile.png", 20.0, 20.0)]);
        options.danmakus = vec![top("a", 0).with_duration(10.0)];
        let mut host = TestHost::new(400.0, 300.0);
        host.now = 100;
        let mut r = DanmakuRenderer::new(host, ImageCache::new(loader), options).unwrap();
        r.send(DanmakuOptions::new("img", 0, "hi[smile]", DanmakuType::Top).with_duration(10.0));

        let draws = |r: &DanmakuRenderer<TestHost>| {
            r.offscreen_canvas()
                .commands()
                .iter()
                .filter(|c| matches!(c, DrawCommand::DrawImage { .. }))
                .count()
        };
        r.render_frame();
        assert_eq!(draws(&r), 0);
        r.render_frame();
        assert_eq!(draws(&r), 1);
    }

    #[test]
    fn test_resize_keeps_danmaku() {
        let mut options = options();
        options.danmakus = vec![top("a", 0)];
        let mut r = renderer(TestHost::new(400.0, 300.0), options);

        r.host_mut().size = Some(Size::new(640.0, 360.0));
        r.host_mut().dpr = 1.5;
        r.resize();
        assert_eq!(r.canvas().pixel_size(), (960, 540));
        assert_eq!(r.layout().canvas_size(), Size::new(640.0, 360.0));
        assert_eq!(r.layout().len(), 1);
    }

    #[test]
    fn test_debug_canvas_draws_track_guides() {
        let mut options = options();
        options.dev.scroll_debug_mode = true;
        options.danmakus = (0..3)
            .map(|i| {
                DanmakuOptions::new(format!("s{i}"), i * 100, "x", DanmakuType::Scroll)
                    .with_custom_render(CustomRender {
                        width: Some(50.0),
                        height: Some(30.0),
                        painter: None,
                    })
            })
            .collect();
        let r = renderer(TestHost::new(400.0, 200.0), options);

        let debug = r.debug_canvas().unwrap();
        let guides: Vec<f64> = debug
            .commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::MoveTo { y, .. } => Some(*y),
                _ => None,
            })
            .collect();
        assert_eq!(guides, vec![40.0, 80.0, 120.0, 160.0]);
        assert!(debug.commands().iter().any(|c| matches!(
            c,
            DrawCommand::Stroke { dash, .. } if dash == &GUIDE_DASH.to_vec()
        )));
    }
}
