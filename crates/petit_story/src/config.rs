//! Story configuration
//!
//! The story is described by a TOML file with four parts:
//! - `messages` - the ordered caption list
//! - `[canvas]` - design canvas, target window and global scale
//! - `[[assets]]` - image layers in draw order
//! - `[timing]` - durations of each stage and the flicker loops
//!
//! A default story is embedded in the crate so the screen runs without any
//! file on disk.

use crate::error::{Result, StoryError};
use crate::layout::Anchor;
use petit_animation::{Iterations, Vec2};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const BUILTIN_STORY: &str = include_str!("../assets/story.toml");

/// Complete story configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoryConfig {
    /// Captions, shown one after another
    pub messages: Vec<String>,
    #[serde(default)]
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Design canvas and target window
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Size of the canvas the artwork was drawn on
    pub design_width: f32,
    pub design_height: f32,
    /// Size of the screen the story is shown on
    pub window_width: f32,
    pub window_height: f32,
    /// Scale applied to assets that don't set their own
    pub global_scale: f32,
    /// Asset whose height defines the star field the layers sit in
    pub field: String,
    /// Gap between right-edge anchored layers and the bottom of the window
    pub bottom_margin: f32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            design_width: 1682.0,
            design_height: 2480.0,
            window_width: 390.0,
            window_height: 844.0,
            global_scale: 0.24,
            field: "fixed_stars".to_string(),
            bottom_margin: 150.0,
        }
    }
}

impl CanvasConfig {
    /// Scale factors that fit the design canvas into the window
    pub fn fit_scale(&self) -> Vec2 {
        Vec2::new(
            self.window_width / self.design_width,
            self.window_height / self.design_height,
        )
    }
}

/// One image layer
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AssetConfig {
    pub name: String,
    /// Image path, passed through to the renderer
    pub source: String,
    /// Natural width in pixels
    pub width: f32,
    /// Natural height in pixels
    pub height: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_y: Option<f32>,
    /// Offset from the anchored position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<Vec2>,
    /// Where the layer travels to, if it moves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intended: Option<Vec2>,
    #[serde(default)]
    pub anchor: Anchor,
    /// Fade in with the canvas when the story starts
    #[serde(default)]
    pub reveal: bool,
}

impl AssetConfig {
    /// Effective (x, y) scale factors
    pub fn scale_factors(&self, global_scale: f32) -> (f32, f32) {
        let base = self.scale.unwrap_or(global_scale);
        (self.scale_x.unwrap_or(base), self.scale_y.unwrap_or(base))
    }
}

/// Stage durations (milliseconds) and flicker loops
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Starter panel fade-out
    pub starter_fade_ms: f32,
    /// Canvas fade-in
    pub fade_in_ms: f32,
    /// Time each caption stays on screen
    pub caption_interval_ms: f32,
    /// Caption entrance (fade and slide)
    pub caption_entrance_ms: f32,
    /// Vertical offset a caption slides in from
    pub caption_offset: f32,
    /// Asset that travels from its initial to its intended position
    pub traveler: String,
    pub travel_ms: f32,
    /// Restart control fade-in after the last caption
    pub restart_fade_ms: f32,
    pub flicker: Vec<FlickerConfig>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            starter_fade_ms: 500.0,
            fade_in_ms: 1500.0,
            caption_interval_ms: 3500.0,
            caption_entrance_ms: 700.0,
            caption_offset: 16.0,
            traveler: "prince".to_string(),
            travel_ms: 20_000.0,
            restart_fade_ms: 800.0,
            flicker: Vec::new(),
        }
    }
}

/// Opacity loop of one star layer
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FlickerConfig {
    pub asset: String,
    /// Full dim-and-brighten cycle
    pub period_ms: f32,
    /// Opacity at the dimmest point
    pub low: f32,
    pub iterations: Iterations,
}

impl StoryConfig {
    /// The story embedded in this crate
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_STORY)
    }

    /// Load and validate a story file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| StoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(
            "loaded story from {} ({} assets, {} messages)",
            path.display(),
            config.assets.len(),
            config.messages.len()
        );
        Ok(config)
    }

    /// Parse and validate a story from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StoryConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn asset(&self, name: &str) -> Option<&AssetConfig> {
        self.assets.iter().find(|a| a.name == name)
    }

    /// Check the config for inconsistencies
    pub fn validate(&self) -> Result<()> {
        if self.messages.is_empty() {
            return Err(config_error("at least one message is required"));
        }

        let canvas = &self.canvas;
        for (what, v) in [
            ("canvas.design_width", canvas.design_width),
            ("canvas.design_height", canvas.design_height),
            ("canvas.window_width", canvas.window_width),
            ("canvas.window_height", canvas.window_height),
            ("canvas.global_scale", canvas.global_scale),
        ] {
            check_positive(what, v)?;
        }
        check_non_negative("canvas.bottom_margin", canvas.bottom_margin)?;

        let mut names = FxHashSet::default();
        for asset in &self.assets {
            if !names.insert(asset.name.as_str()) {
                return Err(config_error(format!("duplicate asset `{}`", asset.name)));
            }
            check_positive(&format!("{}.width", asset.name), asset.width)?;
            check_positive(&format!("{}.height", asset.name), asset.height)?;
            let (sx, sy) = asset.scale_factors(canvas.global_scale);
            check_positive(&format!("{}.scale_x", asset.name), sx)?;
            check_positive(&format!("{}.scale_y", asset.name), sy)?;
            for point in [asset.initial, asset.intended].into_iter().flatten() {
                if !point.is_finite() {
                    return Err(config_error(format!(
                        "asset `{}` has a non-finite position",
                        asset.name
                    )));
                }
            }
        }

        if !names.contains(canvas.field.as_str()) {
            return Err(config_error(format!(
                "canvas.field refers to unknown asset `{}`",
                canvas.field
            )));
        }

        let timing = &self.timing;
        if !names.contains(timing.traveler.as_str()) {
            return Err(config_error(format!(
                "timing.traveler refers to unknown asset `{}`",
                timing.traveler
            )));
        }
        for (what, v) in [
            ("timing.starter_fade_ms", timing.starter_fade_ms),
            ("timing.fade_in_ms", timing.fade_in_ms),
            ("timing.caption_entrance_ms", timing.caption_entrance_ms),
            ("timing.travel_ms", timing.travel_ms),
            ("timing.restart_fade_ms", timing.restart_fade_ms),
        ] {
            check_non_negative(what, v)?;
        }
        check_positive("timing.caption_interval_ms", timing.caption_interval_ms)?;
        if !timing.caption_offset.is_finite() {
            return Err(config_error("timing.caption_offset must be finite"));
        }

        let mut flickering = FxHashSet::default();
        for flicker in &timing.flicker {
            if !names.contains(flicker.asset.as_str()) {
                return Err(config_error(format!(
                    "flicker refers to unknown asset `{}`",
                    flicker.asset
                )));
            }
            if !flickering.insert(flicker.asset.as_str()) {
                return Err(config_error(format!(
                    "asset `{}` has more than one flicker loop",
                    flicker.asset
                )));
            }
            check_positive(
                &format!("{} flicker period_ms", flicker.asset),
                flicker.period_ms,
            )?;
            if !(0.0..=1.0).contains(&flicker.low) {
                return Err(config_error(format!(
                    "flicker low opacity for `{}` must be within 0..=1, got {}",
                    flicker.asset, flicker.low
                )));
            }
            if flicker.iterations == Iterations::Count(0) {
                return Err(config_error(format!(
                    "flicker for `{}` must run at least once",
                    flicker.asset
                )));
            }
        }

        Ok(())
    }
}

fn config_error(msg: impl Into<String>) -> StoryError {
    StoryError::Config(msg.into())
}

fn check_positive(what: &str, v: f32) -> Result<()> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(config_error(format!("{what} must be positive, got {v}")))
    }
}

fn check_non_negative(what: &str, v: f32) -> Result<()> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(config_error(format!("{what} must be non-negative, got {v}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
messages = ["one", "two"]

[[assets]]
name = "fixed_stars"
source = "stars.png"
width = 100
height = 200

[[assets]]
name = "prince"
source = "prince.png"
width = 10
height = 10
scale_y = 0.5
"#;

    #[test]
    fn test_builtin_story_is_valid() {
        let config = StoryConfig::builtin().unwrap();
        assert_eq!(config.messages.len(), 12);
        assert_eq!(config.assets.len(), 9);
        assert_eq!(config.timing.flicker.len(), 3);
        assert_eq!(config.timing.flicker[2].iterations, Iterations::Count(40));
        assert_eq!(config.timing.flicker[0].iterations, Iterations::Unbounded);

        let cloud = config.asset("cloud").unwrap();
        assert_eq!(
            cloud.scale_factors(config.canvas.global_scale),
            (0.26, 0.26)
        );
        assert_eq!(cloud.anchor, Anchor::FieldBottom);
        assert!(config.messages[1].contains("\n\nMy friend."));
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = StoryConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.canvas, CanvasConfig::default());
        assert_eq!(config.timing.traveler, "prince");
        assert!(config.timing.flicker.is_empty());

        let prince = config.asset("prince").unwrap();
        assert_eq!(prince.scale_factors(0.24), (0.24, 0.5));
        assert_eq!(prince.anchor, Anchor::Origin);
        assert!(!prince.reveal);
    }

    #[test]
    fn test_fit_scale() {
        let canvas = CanvasConfig {
            window_width: 841.0,
            window_height: 1240.0,
            ..CanvasConfig::default()
        };
        assert_eq!(canvas.fit_scale(), Vec2::new(0.5, 0.5));
    }

    fn expect_config_error(config: &StoryConfig, needle: &str) {
        match config.validate() {
            Err(StoryError::Config(msg)) => {
                assert!(msg.contains(needle), "unexpected message: {msg}")
            }
            other => panic!("expected config error containing `{needle}`, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_errors() {
        let base = StoryConfig::from_toml_str(MINIMAL).unwrap();

        let mut config = base.clone();
        config.messages.clear();
        expect_config_error(&config, "message");

        let mut config = base.clone();
        config.assets.push(config.assets[0].clone());
        expect_config_error(&config, "duplicate asset `fixed_stars`");

        let mut config = base.clone();
        config.assets[1].width = 0.0;
        expect_config_error(&config, "prince.width");

        let mut config = base.clone();
        config.timing.traveler = "fox".to_string();
        expect_config_error(&config, "unknown asset `fox`");

        let mut config = base.clone();
        config.canvas.field = "sky".to_string();
        expect_config_error(&config, "canvas.field");

        let mut config = base.clone();
        config.timing.flicker.push(FlickerConfig {
            asset: "fixed_stars".to_string(),
            period_ms: 1000.0,
            low: 1.5,
            iterations: Iterations::Unbounded,
        });
        expect_config_error(&config, "low opacity");

        let mut config = base;
        config.timing.caption_interval_ms = 0.0;
        expect_config_error(&config, "caption_interval_ms");
    }

    #[test]
    fn test_parse_errors() {
        let bad_iterations = MINIMAL.to_string()
            + "\n[[timing.flicker]]\nasset = \"fixed_stars\"\nperiod_ms = 10\nlow = 0.5\n"
            + "iterations = \"forever\"\n";
        assert!(matches!(
            StoryConfig::from_toml_str(&bad_iterations),
            Err(StoryError::Parse(_))
        ));
        assert!(matches!(
            StoryConfig::from_toml_str("messages = 3"),
            Err(StoryError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = StoryConfig::load(Path::new("/nonexistent/story.toml")).unwrap_err();
        assert!(matches!(err, StoryError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/story.toml"));
    }
}
