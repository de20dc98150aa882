//! Render and developer configuration

use crate::timeline::TimeOrigin;
use crate::{Error, Result};

/// Default font family used for measuring and drawing text
pub const DEFAULT_FONT_FAMILY: &str = "Microsoft YaHei";

/// Configuration that controls how danmaku are laid out and drawn
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct RenderConfig {
    /// Font family for all danmaku text
    pub font_family: String,
    /// Font weight keyword or number, e.g. `normal` or `700`
    pub font_weight: String,
    /// Opacity of the whole overlay (0.0 - 1.0)
    pub opacity: f32,
    /// Fraction of the surface height used by scrolling danmaku (0.0 - 1.0)
    pub render_region: f64,
    /// Scroll speed in pixels per second
    pub speed: f64,
    /// Whether scrolling danmaku may overlap each other
    pub allow_overlap: bool,
    /// Playback delay in milliseconds applied when the overlay is re-enabled
    pub delay: i64,
    /// Instant that corresponds to scroll offset zero
    pub time_origin: TimeOrigin,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_weight: "normal".to_string(),
            opacity: 1.0,
            render_region: 1.0,
            speed: 100.0,
            allow_overlap: false,
            delay: 600,
            time_origin: TimeOrigin::default(),
        }
    }
}

impl RenderConfig {
    /// Checks that every numeric field is inside its documented range
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(Error::InvalidConfig(format!(
                "opacity must be within 0..=1, got {}",
                self.opacity
            )));
        }
        if !(0.0..=1.0).contains(&self.render_region) {
            return Err(Error::InvalidConfig(format!(
                "render region must be within 0..=1, got {}",
                self.render_region
            )));
        }
        if !(self.speed > 0.0 && self.speed.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "speed must be a positive number, got {}",
                self.speed
            )));
        }
        Ok(())
    }
}

/// Developer switches for inspecting layout decisions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct DevConfig {
    /// Stroke a red border around every non-priority danmaku
    pub render_border: bool,
    /// Log track metrics and layout timings at `info` level
    pub log_key_data: bool,
    /// Draw real-track guide lines onto a secondary debug surface
    pub scroll_debug_mode: bool,
}
