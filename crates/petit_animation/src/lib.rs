//! Petit Animation System
//!
//! Timed value transitions composed into replayable timelines.
//!
//! # Features
//!
//! - **Animated Values**: scalar and 2D cells set instantly or driven over time
//! - **Easing Curves**: standard, overshooting (back, elastic, bounce), cubic-bezier and steps
//! - **Combinators**: sequence, parallel, loop (with per-iteration reset hooks), delay, stagger
//! - **Deterministic Scheduler**: single-threaded, tick-driven, with a simulated clock for tests
//! - **Message Synchronizer**: integers a selector value lands on or passes drive caption changes
//! - **Timeline Player**: start / stop / restart with idempotent replay
//!
//! # Example
//!
//! ```rust
//! use petit_animation::{parallel, AnimationScheduler, AnimatedTimeline, Easing};
//!
//! let scheduler = AnimationScheduler::new();
//! let opacity = scheduler.value("opacity", 0.0);
//! let offset = scheduler.value("offset", 24.0);
//!
//! let entrance = parallel([
//!     opacity.to(1.0, 300.0).into(),
//!     offset.to(0.0, 300.0).easing(Easing::EaseOut).into(),
//! ]);
//!
//! let mut timeline = AnimatedTimeline::new(scheduler.handle(), entrance).unwrap();
//! timeline.start().unwrap();
//! scheduler.advance(300.0, 16.0);
//!
//! assert_eq!(opacity.as_f32(), 1.0);
//! assert_eq!(offset.as_f32(), 0.0);
//! ```

pub mod combinator;
pub mod easing;
pub mod error;
pub mod observer;
pub mod player;
pub mod scheduler;
pub mod synchronizer;
pub mod timeline;
pub mod transition;
pub mod values;

pub use combinator::{
    delay, parallel, repeat, sequence, set, stagger, Combinator, Iterations, Reset,
};
pub use easing::Easing;
pub use error::{AnimationError, Result};
pub use observer::{derive, Derived, ListenerId, Observable, ReadOnly, Subscription};
pub use player::TimelinePlayer;
pub use scheduler::{
    AnimatedTimeline, AnimatedValue, AnimationScheduler, SchedulerHandle, TimelineId, ValueId,
};
pub use synchronizer::{
    crossed_indices, landing_index, CaptionSink, MessageSynchronizer, SyncState, LANDING_EPSILON,
};
pub use timeline::NodeState;
pub use transition::Transition;
pub use values::{Interpolate, Value, ValueKind, Vec2};
