//! Error types for petit_animation

use crate::easing::Easing;
use crate::values::ValueKind;
use thiserror::Error;

/// Errors raised while building or launching a timeline
///
/// Everything here is a configuration error detected before any value moves.
/// Runtime no-ops (stopping an idle timeline, writing a disposed value) are
/// logged instead of returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimationError {
    /// A transition or reset targets a value of a different kind
    #[error("value `{label}` holds a {expected} but was given a {found}")]
    KindMismatch {
        label: String,
        expected: ValueKind,
        found: ValueKind,
    },

    /// Durations and delays must be finite and non-negative
    #[error("invalid duration {0}ms: durations and delays must be finite and non-negative")]
    InvalidDuration(f32),

    /// Easing curve cannot satisfy f(0) = 0, f(1) = 1
    #[error("invalid easing {easing:?}: {reason}")]
    InvalidEasing {
        easing: Easing,
        reason: &'static str,
    },

    /// Loops must run at least once
    #[error("loop iterations must be at least 1")]
    InvalidIterations,

    /// A target value contains NaN or infinity
    #[error("non-finite target for value `{0}`")]
    NonFiniteTarget(String),

    /// The referenced value was disposed (or never existed)
    #[error("value `{0}` has been disposed")]
    DisposedValue(String),

    /// The timeline touches a value the player has no initial state for
    #[error("value `{0}` is not owned by this player and has no initial state")]
    UnownedValue(String),

    /// A caption index outside the configured caption list
    #[error("caption index {index} is out of range (0..{len})")]
    CaptionIndexOutOfRange { index: i64, len: usize },

    /// The scheduler backing a handle has been dropped
    #[error("animation scheduler is no longer alive")]
    SchedulerGone,
}

/// Result type for petit_animation operations
pub type Result<T> = std::result::Result<T, AnimationError>;
