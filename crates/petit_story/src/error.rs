//! Error types for petit_story

use petit_animation::AnimationError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or building the story
#[derive(Error, Debug)]
pub enum StoryError {
    /// Failed to read a story file
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Story file is not valid TOML for the story schema
    #[error("failed to parse story config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Story config parsed but is inconsistent
    #[error("invalid story config: {0}")]
    Config(String),

    /// The choreography could not be built or launched
    #[error(transparent)]
    Animation(#[from] AnimationError),
}

/// Result type for petit_story operations
pub type Result<T> = std::result::Result<T, StoryError>;
