//! Image assets

use crate::config::AssetConfig;
use petit_animation::Vec2;
use serde::{Deserialize, Serialize};

/// Width and height in pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Scale each dimension independently
    pub fn scaled(&self, scale_x: f32, scale_y: f32) -> Size {
        Size::new(self.width * scale_x, self.height * scale_y)
    }
}

/// An image layer with its display size and resolved positions
///
/// Positions are filled in once by the layout and only read afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Asset {
    pub name: String,
    pub source: String,
    pub natural_size: Size,
    /// Display size: natural size times the scale factors
    pub size: Size,
    pub initial_position: Vec2,
    pub intended_position: Vec2,
}

impl Asset {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        scale_x: f32,
        scale_y: f32,
        natural_size: Size,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            natural_size,
            size: natural_size.scaled(scale_x, scale_y),
            initial_position: Vec2::ZERO,
            intended_position: Vec2::ZERO,
        }
    }

    pub fn from_config(config: &AssetConfig, global_scale: f32) -> Self {
        let (scale_x, scale_y) = config.scale_factors(global_scale);
        Self::new(
            &config.name,
            &config.source,
            scale_x,
            scale_y,
            Size::new(config.width, config.height),
        )
    }

    pub(crate) fn place(&mut self, initial: Vec2, intended: Vec2) {
        self.initial_position = initial;
        self.intended_position = intended;
    }

    /// Whether the asset moves between its two positions
    pub fn travels(&self) -> bool {
        self.initial_position != self.intended_position
    }
}
