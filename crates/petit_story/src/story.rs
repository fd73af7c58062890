//! Story choreography
//!
//! The run, from a tap on the starter button:
//!
//! ```text
//! parallel
//! ├── flicker loop per star layer (dim to `low`, brighten back, repeat)
//! └── sequence
//!     ├── parallel: starter panel fades out, canvas fades in
//!     ├── parallel: traveler moves to its intended position,
//!     │             caption index steps 0, 1, .. N-1 every interval
//!     ├── restart control fades in
//!     └── finished flag set
//! ```
//!
//! Unbounded flicker loops never finish on their own; the run ends when the
//! screen restarts or is dropped.

use crate::config::{StoryConfig, TimingConfig};
use crate::error::{Result, StoryError};
use crate::layout::Layout;
use petit_animation::{
    delay, parallel, repeat, sequence, AnimatedValue, AnimationError, AnimationScheduler,
    Combinator, Easing, Reset, Value, Vec2,
};

/// Every animated value on the story screen
#[derive(Clone, Debug)]
pub struct StoryValues {
    pub starter_opacity: AnimatedValue,
    pub canvas_opacity: AnimatedValue,
    pub traveler_position: AnimatedValue,
    /// Selector for the message synchronizer; -1 before the first caption
    pub caption_index: AnimatedValue,
    pub caption_opacity: AnimatedValue,
    pub caption_offset: AnimatedValue,
    pub restart_opacity: AnimatedValue,
    /// 1 once the last stage has run
    pub finished: AnimatedValue,
    /// Opacity of each flickering layer, keyed by asset name
    pub flicker: Vec<(String, AnimatedValue)>,
    initial: Vec<(AnimatedValue, Value)>,
}

impl StoryValues {
    pub fn new(
        scheduler: &AnimationScheduler,
        layout: &Layout,
        config: &StoryConfig,
    ) -> Result<Self> {
        let traveler = layout.asset(&config.timing.traveler).ok_or_else(|| {
            StoryError::Config(format!("unknown traveler `{}`", config.timing.traveler))
        })?;

        let mut initial = Vec::new();
        let mut value = |label: &str, v: Value| {
            let animated = scheduler.value(label, v);
            initial.push((animated.clone(), v));
            animated
        };

        let starter_opacity = value("starter_opacity", Value::Float(1.0));
        let canvas_opacity = value("canvas_opacity", Value::Float(0.0));
        let traveler_position = value("traveler_position", Value::Vec2(traveler.initial_position));
        let caption_index = value("caption_index", Value::Float(-1.0));
        let caption_opacity = value("caption_opacity", Value::Float(0.0));
        let caption_offset = value("caption_offset", Value::Float(config.timing.caption_offset));
        let restart_opacity = value("restart_opacity", Value::Float(0.0));
        let finished = value("finished", Value::Float(0.0));
        let flicker = config
            .timing
            .flicker
            .iter()
            .map(|f| {
                let label = format!("flicker:{}", f.asset);
                (f.asset.clone(), value(&label, Value::Float(1.0)))
            })
            .collect();

        Ok(Self {
            starter_opacity,
            canvas_opacity,
            traveler_position,
            caption_index,
            caption_opacity,
            caption_offset,
            restart_opacity,
            finished,
            flicker,
            initial,
        })
    }

    pub fn flicker(&self, asset: &str) -> Option<&AnimatedValue> {
        self.flicker
            .iter()
            .find_map(|(name, value)| (name == asset).then_some(value))
    }

    /// Every value with the state a restart returns it to
    pub fn initial_state(&self) -> &[(AnimatedValue, Value)] {
        &self.initial
    }
}

/// What the choreography needs from the config, resolved once
#[derive(Clone, Debug, PartialEq)]
pub struct StoryPlan {
    pub timing: TimingConfig,
    pub traveler_target: Vec2,
    pub captions: usize,
}

impl StoryPlan {
    pub fn new(config: &StoryConfig, layout: &Layout) -> Result<Self> {
        let traveler = layout.asset(&config.timing.traveler).ok_or_else(|| {
            StoryError::Config(format!("unknown traveler `{}`", config.timing.traveler))
        })?;
        Ok(Self {
            timing: config.timing.clone(),
            traveler_target: traveler.intended_position,
            captions: config.messages.len(),
        })
    }

    /// The whole run
    pub fn build(&self, values: &StoryValues) -> petit_animation::Result<Combinator> {
        let mut branches = self.flickers(values);
        branches.push(self.main(values)?);
        Ok(parallel(branches))
    }

    /// One loop per flickering layer
    pub fn flickers(&self, values: &StoryValues) -> Vec<Combinator> {
        self.timing
            .flicker
            .iter()
            .filter_map(|f| {
                let Some(v) = values.flicker(&f.asset) else {
                    tracing::warn!("no flicker value for `{}`", f.asset);
                    return None;
                };
                let half = f.period_ms / 2.0;
                let body = sequence([
                    v.to(f.low, half).easing(Easing::EaseInOut).into(),
                    v.to(1.0, half).easing(Easing::EaseInOut).into(),
                ]);
                Some(repeat(body, f.iterations).reset_each(v.id(), 1.0))
            })
            .collect()
    }

    /// The finite part of the run
    pub fn main(&self, values: &StoryValues) -> petit_animation::Result<Combinator> {
        let t = &self.timing;
        Ok(sequence([
            parallel([
                values
                    .starter_opacity
                    .to(0.0, t.starter_fade_ms)
                    .easing(Easing::EaseOut)
                    .into(),
                values
                    .canvas_opacity
                    .to(1.0, t.fade_in_ms)
                    .easing(Easing::EaseInOut)
                    .into(),
            ]),
            parallel([
                values
                    .traveler_position
                    .to(self.traveler_target, t.travel_ms)
                    .easing(Easing::EaseInOut)
                    .into(),
                self.caption_sweep(&values.caption_index)?,
            ]),
            values
                .restart_opacity
                .to(1.0, t.restart_fade_ms)
                .easing(Easing::EaseOut)
                .into(),
            values.finished.set_to(1.0),
        ]))
    }

    /// Caption index from 0 to the last caption, one step per interval
    ///
    /// `Steps` easing makes the index land exactly on each integer and hold
    /// it for the whole interval.
    fn caption_sweep(&self, index: &AnimatedValue) -> petit_animation::Result<Combinator> {
        let last = self
            .captions
            .checked_sub(1)
            .ok_or(AnimationError::CaptionIndexOutOfRange { index: 0, len: 0 })?;
        let interval = self.timing.caption_interval_ms;

        let mut steps = vec![index.set_to(0.0)];
        if last > 0 {
            steps.push(
                index
                    .to(last as f32, last as f32 * interval)
                    .easing(Easing::Steps(last as u32))
                    .into(),
            );
        }
        steps.push(delay(interval));
        Ok(sequence(steps))
    }

    /// Fade and slide replayed on every caption
    pub fn caption_entrance(&self, values: &StoryValues) -> Combinator {
        let ms = self.timing.caption_entrance_ms;
        parallel([
            values
                .caption_opacity
                .to(1.0, ms)
                .easing(Easing::EaseOut)
                .into(),
            values
                .caption_offset
                .to(0.0, ms)
                .easing(Easing::EaseOut)
                .into(),
        ])
    }

    /// State the caption entrance starts from
    pub fn caption_entrance_resets(&self, values: &StoryValues) -> Vec<Reset> {
        vec![
            Reset::new(values.caption_opacity.id(), 0.0),
            Reset::new(values.caption_offset.id(), self.timing.caption_offset),
        ]
    }

    /// Length of the finite part of the run
    pub fn duration_ms(&self) -> f32 {
        let t = &self.timing;
        let captions = self.captions.max(1) as f32 * t.caption_interval_ms;
        t.starter_fade_ms.max(t.fade_in_ms) + t.travel_ms.max(captions) + t.restart_fade_ms
    }
}
