//! Danmaku CLI Tool
//!
//! Command-line interface for laying out danmaku and rendering them to frames
//! against a simulated clock.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use danmaku_core::{
    DanmakuImage, DanmakuKind, DanmakuLayout, DanmakuOptions, DevConfig, ImageRegistry,
    LayoutOptions, RenderConfig, Size, TimeOrigin,
};
use danmaku_renderer::{
    DanmakuRenderer, FileImageLoader, FrameHandle, Host, ImageCache, RendererOptions,
    RgbaSurface,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "danmaku")]
#[command(about = "Danmaku overlay engine - lay out and render bullet comments")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate playback and write one PNG per frame
    Render {
        /// Input JSON file: { "images": [...], "danmaku": [...] }
        input: PathBuf,

        /// Output directory for frames
        #[arg(short, long)]
        output: PathBuf,

        /// Frames per second
        #[arg(long, default_value = "30")]
        fps: f64,

        /// Length of the simulation in seconds
        #[arg(long, default_value = "10")]
        duration: f64,

        /// Simulated start time in ms; defaults to the earliest danmaku
        #[arg(long)]
        start: Option<i64>,

        /// Device pixel ratio of the output frames
        #[arg(long, default_value = "1")]
        dpr: f64,

        /// Outline non-priority danmaku in red
        #[arg(long)]
        border: bool,

        #[command(flatten)]
        stage: StageArgs,
    },

    /// Run the layout once and print track geometry and placements
    Layout {
        /// Input JSON file: { "images": [...], "danmaku": [...] }
        input: PathBuf,

        /// Instant to inspect in ms; defaults to the earliest danmaku
        #[arg(long)]
        at: Option<i64>,

        #[command(flatten)]
        stage: StageArgs,
    },
}

/// Settings shared by every subcommand
#[derive(Args)]
struct StageArgs {
    /// Logical canvas width
    #[arg(long, default_value = "1280")]
    width: f64,

    /// Logical canvas height
    #[arg(long, default_value = "720")]
    height: f64,

    /// TrueType/OpenType font used for measuring and drawing text
    #[arg(long)]
    font: Option<PathBuf>,

    /// JSON render configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scroll speed in pixels per second
    #[arg(long)]
    speed: Option<f64>,

    /// Overlay opacity (0-1)
    #[arg(long)]
    opacity: Option<f64>,

    /// Let scrolling danmaku overlap instead of dropping them
    #[arg(long)]
    allow_overlap: bool,

    /// Time origin of the scroll sweep in ms
    #[arg(long, default_value = "0")]
    origin: i64,

    /// Seed for the random placement fallbacks
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Deserialize)]
struct Input {
    #[serde(default)]
    images: Vec<DanmakuImage>,
    danmaku: Vec<DanmakuOptions>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::builder().filter_level(level).init();

    match cli.command {
        Commands::Render {
            input,
            output,
            fps,
            duration,
            start,
            dpr,
            border,
            stage,
        } => render(input, output, fps, duration, start, dpr, border, stage)?,

        Commands::Layout { input, at, stage } => layout(input, at, stage)?,
    }

    Ok(())
}

fn read_input(path: &Path) -> Result<Input> {
    let file = File::open(path).context("Failed to open input file")?;
    serde_json::from_reader(BufReader::new(file)).context("Failed to parse input file")
}

impl StageArgs {
    fn render_config(&self) -> Result<RenderConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let file = File::open(path).context("Failed to open config file")?;
                serde_json::from_reader(BufReader::new(file)).context("Failed to parse config file")?
            }
            None => RenderConfig::default(),
        };
        if let Some(speed) = self.speed {
            config.speed = speed;
        }
        if let Some(opacity) = self.opacity {
            config.opacity = opacity as f32;
        }
        if self.allow_overlap {
            config.allow_overlap = true;
        }
        config.time_origin = TimeOrigin::Fixed(self.origin);
        config.validate().context("Invalid render configuration")?;
        Ok(config)
    }

    fn surface(&self) -> Result<RgbaSurface> {
        let mut surface = RgbaSurface::new(0, 0);
        match &self.font {
            Some(path) => {
                let typeface = RgbaSurface::load_typeface(path).context("Failed to load font")?;
                surface.set_typeface(Some(typeface));
            }
            None => log::warn!("no --font given: text is measured approximately and not drawn"),
        }
        Ok(surface)
    }

    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Host with a simulated clock whose canvases are in-memory bitmaps
struct OfflineHost {
    now: i64,
    size: Size,
    dpr: f64,
    template: RgbaSurface,
    next_frame: u64,
    pending: Option<FrameHandle>,
}

impl Host for OfflineHost {
    type Canvas = RgbaSurface;

    fn create_canvas(&mut self) -> Option<RgbaSurface> {
        Some(self.template.clone())
    }

    fn container_size(&self) -> Option<Size> {
        Some(self.size)
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.dpr
    }

    fn set_visible(&mut self, visible: bool) {
        log::debug!("overlay {}", if visible { "shown" } else { "hidden" });
    }

    fn request_frame(&mut self) -> FrameHandle {
        self.next_frame += 1;
        let handle = FrameHandle(self.next_frame);
        self.pending = Some(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if self.pending == Some(handle) {
            self.pending = None;
        }
    }

    fn now_ms(&self) -> i64 {
        self.now
    }
}

#[allow(clippy::too_many_arguments)]
fn render(
    input: PathBuf,
    output: PathBuf,
    fps: f64,
    duration: f64,
    start: Option<i64>,
    dpr: f64,
    border: bool,
    stage: StageArgs,
) -> Result<()> {
    if !fps.is_finite() || fps <= 0.0 || !duration.is_finite() || duration < 0.0 {
        bail!("fps must be positive and duration non-negative");
    }
    println!("Rendering danmaku: {}", input.display());

    let data = read_input(&input)?;
    let start = start
        .or_else(|| data.danmaku.iter().map(|d| d.time).min())
        .unwrap_or(stage.origin);
    let frame_count = ((duration * fps).floor() as u64).max(1);

    let root = input.parent().map(Path::to_path_buf).unwrap_or_default();
    let host = OfflineHost {
        now: start,
        size: stage.size(),
        dpr,
        template: stage.surface()?,
        next_frame: 0,
        pending: None,
    };
    let options = RendererOptions {
        config: stage.render_config()?,
        dev: DevConfig {
            render_border: border,
            ..Default::default()
        },
        images: ImageRegistry::new(data.images),
        danmakus: data.danmaku,
        seed: stage.seed,
        ..Default::default()
    };
    let cache = ImageCache::new(FileImageLoader::with_root(root));
    let mut renderer =
        DanmakuRenderer::new(host, cache, options).context("Failed to create renderer")?;

    println!(
        "Loaded {} danmaku, canvas {}x{} @ {}x",
        renderer.layout().len(),
        stage.width,
        stage.height,
        dpr
    );

    std::fs::create_dir_all(&output).context("Failed to create output directory")?;
    println!("Writing {} frames to {}", frame_count, output.display());

    renderer.set_enabled(true);
    for i in 0..frame_count {
        if i > 0 {
            renderer.host_mut().now = start + (i as f64 * 1000.0 / fps).round() as i64;
            if renderer.host_mut().pending.take().is_some() {
                renderer.tick();
            }
        }

        let frame_path = output.join(format!("frame_{:06}.png", i));
        renderer
            .canvas()
            .save(&frame_path)
            .context("Failed to save frame")?;

        if (i + 1) % 30 == 0 {
            println!("Rendered {} / {} frames", i + 1, frame_count);
        }
    }
    renderer.set_enabled(false);

    println!("Successfully rendered all frames");
    Ok(())
}

fn layout(input: PathBuf, at: Option<i64>, stage: StageArgs) -> Result<()> {
    let data = read_input(&input)?;
    let at = at
        .or_else(|| data.danmaku.iter().map(|d| d.time).min())
        .unwrap_or(stage.origin);

    let options = LayoutOptions {
        config: stage.render_config()?,
        dev: DevConfig::default(),
        images: ImageRegistry::new(data.images),
        canvas: stage.size(),
    };
    let mut layout = match stage.seed {
        Some(seed) => DanmakuLayout::with_rng(options, StdRng::seed_from_u64(seed)),
        None => DanmakuLayout::new(options),
    };
    let mut measure = stage.surface()?;
    layout.set_danmakus(data.danmaku, &mut measure);

    print_layout(&mut layout, at);
    Ok(())
}

fn print_layout(layout: &mut DanmakuLayout, at: i64) {
    let scroll = layout.scroll_layout();
    println!("\n=== Tracks ===");
    if scroll.is_initialized() {
        println!("Track height: {}", scroll.track_height());
        println!("Real tracks: {}", scroll.real_tracks().len());
        println!("Virtual tracks: {}", scroll.virtual_track_count());
    } else {
        println!("No scrolling danmaku, tracks not built");
    }

    let total = layout.len();
    let hidden: Vec<String> = layout
        .iter()
        .filter_map(|(_, d)| match &d.kind {
            DanmakuKind::Scroll(state) if !state.show => Some(d.id.clone()),
            _ => None,
        })
        .collect();

    let visible = layout.visible(at);
    println!("\n=== Visible at {}ms ({} of {}) ===", at, visible.len(), total);
    for danmaku in &visible {
        println!(
            "  {:<12} {:<6} left={:>8.1} top={:>6.1} {}x{}  {:?}",
            danmaku.id,
            format!("{:?}", danmaku.danmaku_type()).to_lowercase(),
            danmaku.left,
            danmaku.top.unwrap_or(f64::NAN),
            danmaku.width,
            danmaku.height,
            danmaku.text
        );
    }

    if !hidden.is_empty() {
        println!("\n=== Without a track ({}) ===", hidden.len());
        for id in hidden.iter().take(10) {
            println!("  {}", id);
        }
        if hidden.len() > 10 {
            println!("  ... and {} more", hidden.len() - 10);
        }
    }
}
