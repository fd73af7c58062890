//! Layer layout
//!
//! All layers live in one group the size of the window, shifted down so the
//! bottom of the star field sits on the bottom of the window:
//!
//! ```text
//! group offset    = (0, window.height - field.height)
//! Origin          = (0, 0)
//! FieldBottom     = (0, field.height - layer.height)
//! RightEdge       = (window.width - layer.width,
//!                    window.height - bottom_margin - layer.height)
//! ```
//!
//! A layer's `initial` and `intended` offsets are added to its anchor.

use crate::asset::{Asset, Size};
use crate::config::StoryConfig;
use crate::error::{Result, StoryError};
use petit_animation::Vec2;
use serde::{Deserialize, Serialize};

/// Where a layer is pinned inside the group
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    #[default]
    Origin,
    /// Bottom-aligned with the star field
    FieldBottom,
    /// Right edge of the window, above the bottom margin
    RightEdge,
}

impl Anchor {
    pub fn resolve(&self, layer: Size, field: Size, window: Size, bottom_margin: f32) -> Vec2 {
        match self {
            Anchor::Origin => Vec2::ZERO,
            Anchor::FieldBottom => Vec2::new(0.0, field.height - layer.height),
            Anchor::RightEdge => Vec2::new(
                window.width - layer.width,
                (window.height - bottom_margin) - layer.height,
            ),
        }
    }
}

/// Resolved sizes and positions of every layer
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Layout {
    pub window: Size,
    /// Display size of the star field asset
    pub field: Size,
    /// Translation applied to the whole layer group
    pub group_offset: Vec2,
    /// Scale that would fit the design canvas into the window
    pub fit_scale: Vec2,
    /// Layers in draw order
    pub assets: Vec<Asset>,
}

impl Layout {
    pub fn new(config: &StoryConfig) -> Result<Self> {
        let canvas = &config.canvas;
        let window = Size::new(canvas.window_width, canvas.window_height);

        let field_config = config.asset(&canvas.field).ok_or_else(|| {
            StoryError::Config(format!(
                "canvas.field refers to unknown asset `{}`",
                canvas.field
            ))
        })?;
        let field = Asset::from_config(field_config, canvas.global_scale).size;

        let assets = config
            .assets
            .iter()
            .map(|asset_config| {
                let mut asset = Asset::from_config(asset_config, canvas.global_scale);
                let anchor =
                    asset_config
                        .anchor
                        .resolve(asset.size, field, window, canvas.bottom_margin);
                let initial = anchor + asset_config.initial.unwrap_or(Vec2::ZERO);
                let intended = asset_config
                    .intended
                    .map_or(initial, |offset| anchor + offset);
                asset.place(initial, intended);
                asset
            })
            .collect();

        Ok(Self {
            window,
            field,
            group_offset: Vec2::new(0.0, window.height - field.height),
            fit_scale: canvas.fit_scale(),
            assets,
        })
    }

    pub fn asset(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.name == name)
    }

    /// Position in window coordinates of a point given in group coordinates
    pub fn to_window(&self, position: Vec2) -> Vec2 {
        self.group_offset + position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    fn builtin() -> Layout {
        Layout::new(&StoryConfig::builtin().unwrap()).unwrap()
    }

    #[test]
    fn test_group_is_bottom_aligned_to_field() {
        let layout = builtin();
        assert!(close(layout.field.width, 353.52));
        assert!(close(layout.field.height, 529.92));
        assert!(close(layout.group_offset.y, 844.0 - 529.92));
        assert_eq!(layout.group_offset.x, 0.0);
    }

    #[test]
    fn test_anchored_positions() {
        let layout = builtin();

        let cloud = layout.asset("cloud").unwrap();
        assert!(close(cloud.size.height, 1122.0 * 0.26));
        assert!(close(cloud.initial_position.y, 529.92 - 1122.0 * 0.26));

        let world = layout.asset("world").unwrap();
        assert!(close(world.initial_position.y, 529.92 - 980.0 * 0.24));

        let planets = layout.asset("planets").unwrap();
        assert!(close(planets.initial_position.x, 390.0 - 342.0 * 0.24));
        assert!(close(planets.initial_position.y, 844.0 - 150.0 - 267.0 * 0.24));
        assert!(!planets.travels());

        let prince = layout.asset("prince").unwrap();
        assert_eq!(prince.initial_position, Vec2::new(60.0, 22.0));
        assert_eq!(prince.intended_position, Vec2::new(150.0, 120.0));
        assert!(prince.travels());
    }

    #[test]
    fn test_draw_order_follows_config() {
        let layout = builtin();
        let names: Vec<_> = layout.assets.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names.first(), Some(&"cosmos"));
        assert_eq!(names.last(), Some(&"prince"));
    }

    #[test]
    fn test_to_window() {
        let layout = builtin();
        let p = layout.to_window(Vec2::new(10.0, 10.0));
        assert!(close(p.y, 10.0 + 844.0 - 529.92));
    }
}
