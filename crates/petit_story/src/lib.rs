//! Le Petit Prince
//!
//! An illustrated story screen built on `petit_animation`: a starter panel,
//! a stack of image layers that fade in, flickering stars, a traveling
//! prince and captions that change in step with the story.
//!
//! # Modules
//!
//! - [`config`] - TOML story description (assets, captions, timings)
//! - [`asset`] / [`layout`] - display sizes and anchored positions
//! - [`story`] - animated values and the choreography
//! - [`projector`] - per-layer styles derived from the animated values
//! - [`screen`] - the screen object: start, restart, tick, frame
//!
//! # Example
//!
//! ```rust
//! use petit_story::{StoryConfig, StoryScreen};
//!
//! let mut screen = StoryScreen::new(StoryConfig::builtin().unwrap()).unwrap();
//! let first = screen.frame();
//! assert_eq!(first.starter.opacity, 1.0);
//!
//! screen.tap_start().unwrap();
//! while !screen.is_finished() {
//!     screen.tick_ms(16.0);
//! }
//! assert_eq!(screen.frame().restart.opacity, 1.0);
//! ```

pub mod asset;
pub mod config;
pub mod error;
pub mod layout;
pub mod projector;
pub mod screen;
pub mod story;

pub use asset::{Asset, Size};
pub use config::{AssetConfig, CanvasConfig, FlickerConfig, StoryConfig, TimingConfig};
pub use error::{Result, StoryError};
pub use layout::{Anchor, Layout};
pub use projector::{CaptionFrame, Frame, Layer, LayerFrame, LayerStyle, Projector};
pub use screen::StoryScreen;
pub use story::{StoryPlan, StoryValues};
