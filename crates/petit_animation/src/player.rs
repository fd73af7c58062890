//! Timeline player
//!
//! Owns a set of animated values together with their initial state and a
//! builder for the root combinator. Every run starts from the same initial
//! values and a freshly built tree, so replays are deterministic.

use crate::combinator::Combinator;
use crate::error::{AnimationError, Result};
use crate::scheduler::{AnimatedTimeline, AnimatedValue, SchedulerHandle, ValueId};
use crate::values::Value;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use std::fmt;

type Builder = Box<dyn Fn() -> Result<Combinator>>;

/// Start / stop / restart control over one root timeline
///
/// ```
/// use petit_animation::{sequence, AnimationScheduler, TimelinePlayer};
///
/// let scheduler = AnimationScheduler::new();
/// let x = scheduler.value("x", 0.0);
///
/// let mut player = TimelinePlayer::new(scheduler.handle(), {
///     let x = x.clone();
///     move || Ok(sequence([x.to(10.0, 100.0).into()]))
/// });
/// player.own(&x, 0.0);
///
/// player.play().unwrap();
/// scheduler.advance(50.0, 10.0);
/// player.restart();
/// assert_eq!(x.as_f32(), 0.0);
/// ```
pub struct TimelinePlayer {
    handle: SchedulerHandle,
    build: Builder,
    owned: IndexMap<ValueId, (AnimatedValue, Value), FxBuildHasher>,
    timeline: Option<AnimatedTimeline>,
    runs: u32,
}

impl TimelinePlayer {
    /// Create a player; `build` is called for every run
    pub fn new<F>(handle: SchedulerHandle, build: F) -> Self
    where
        F: Fn() -> Result<Combinator> + 'static,
    {
        Self {
            handle,
            build: Box::new(build),
            owned: IndexMap::default(),
            timeline: None,
            runs: 0,
        }
    }

    /// Take ownership of a value and record the state `restart` returns it to
    pub fn own(&mut self, value: &AnimatedValue, initial: impl Into<Value>) -> &mut Self {
        self.owned
            .insert(value.id(), (value.clone(), initial.into()));
        self
    }

    pub fn owned_count(&self) -> usize {
        self.owned.len()
    }

    /// Stop the current run and reset every owned value to its initial state
    ///
    /// The previous tree is discarded.
    pub fn restart(&mut self) {
        if let Some(mut timeline) = self.timeline.take() {
            timeline.stop();
        }
        for (value, initial) in self.owned.values() {
            value.set(*initial);
        }
        tracing::debug!(values = self.owned.len(), "player reset");
    }

    /// Build a fresh tree and launch it
    ///
    /// Any current run is stopped first. Fails if the tree is invalid or
    /// touches a value the player does not own.
    pub fn start(&mut self) -> Result<()> {
        self.launch(None)
    }

    /// Like [`start`](Self::start), calling `on_done` when the run completes
    pub fn start_with<F>(&mut self, on_done: F) -> Result<()>
    where
        F: FnOnce() + 'static,
    {
        self.launch(Some(Box::new(on_done)))
    }

    /// Restart then start
    pub fn play(&mut self) -> Result<()> {
        self.restart();
        self.start()
    }

    fn launch(&mut self, on_done: Option<Box<dyn FnOnce()>>) -> Result<()> {
        if let Some(mut previous) = self.timeline.take() {
            previous.stop();
        }

        let combinator = (self.build)()?;
        if let Some(stray) = combinator
            .targets()
            .into_iter()
            .find(|id| !self.owned.contains_key(id))
        {
            let label = self
                .handle
                .value_label(stray)
                .unwrap_or_else(|| format!("{stray:?}"));
            return Err(AnimationError::UnownedValue(label));
        }

        let mut timeline = AnimatedTimeline::new(self.handle.clone(), combinator)?
            .labeled(format!("run {}", self.runs + 1));
        match on_done {
            Some(on_done) => timeline.start_with(on_done)?,
            None => timeline.start()?,
        }
        self.runs += 1;
        self.timeline = Some(timeline);
        Ok(())
    }

    /// Cancel the current run; values keep their state
    pub fn stop(&mut self) {
        match self.timeline.as_mut() {
            Some(timeline) => timeline.stop(),
            None => tracing::debug!("stop on player that never started"),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.timeline
            .as_ref()
            .is_some_and(AnimatedTimeline::is_playing)
    }

    /// Number of runs launched so far
    pub fn run_count(&self) -> u32 {
        self.runs
    }

    /// The timeline of the current (or last) run
    pub fn timeline(&self) -> Option<&AnimatedTimeline> {
        self.timeline.as_ref()
    }
}

impl fmt::Debug for TimelinePlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimelinePlayer")
            .field("owned", &self.owned.len())
            .field("runs", &self.runs)
            .field("playing", &self.is_playing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::{delay, parallel, repeat, sequence, Iterations};
    use crate::easing::Easing;
    use crate::scheduler::AnimationScheduler;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    struct Fixture {
        scheduler: AnimationScheduler,
        x: AnimatedValue,
        stars: AnimatedValue,
        player: TimelinePlayer,
    }

    fn fixture() -> Fixture {
        let scheduler = AnimationScheduler::new();
        let x = scheduler.value("x", 0.0);
        let stars = scheduler.value("stars", 1.0);

        let mut player = TimelinePlayer::new(scheduler.handle(), {
            let x = x.clone();
            let stars = stars.clone();
            move || {
                Ok(parallel([
                    repeat(
                        sequence([stars.to(0.3, 70.0).into(), stars.to(1.0, 70.0).into()]),
                        Iterations::Unbounded,
                    )
                    .reset_each(stars.id(), 1.0),
                    sequence([
                        delay(40.0),
                        x.to(100.0, 300.0).easing(Easing::EaseInOut).into(),
                        x.to(20.0, 150.0).easing(Easing::Bounce).into(),
                    ]),
                ]))
            }
        });
        player.own(&x, 0.0).own(&stars, 1.0);

        Fixture {
            scheduler,
            x,
            stars,
            player,
        }
    }

    fn record(f: &Fixture, frames: usize) -> Vec<(f32, f32)> {
        (0..frames)
            .map(|_| {
                f.scheduler.tick_ms(16.0);
                (f.x.as_f32(), f.stars.as_f32())
            })
            .collect()
    }

    #[test]
    fn test_replay_is_bit_identical() {
        let mut f = fixture();

        f.player.play().unwrap();
        let first = record(&f, 40);

        f.player.play().unwrap();
        let second = record(&f, 40);

        f.player.restart();
        f.player.start().unwrap();
        let third = record(&f, 40);

        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(f.player.run_count(), 3);
    }

    #[test]
    fn test_restart_resets_owned_values() {
        let mut f = fixture();
        f.player.play().unwrap();
        f.scheduler.advance(200.0, 16.0);
        assert!(f.x.as_f32() > 0.0);

        f.player.restart();
        assert_eq!(f.x.as_f32(), 0.0);
        assert_eq!(f.stars.as_f32(), 1.0);
        assert!(!f.player.is_playing());

        // Nothing from the stopped run keeps moving values
        f.scheduler.advance(500.0, 16.0);
        assert_eq!(f.x.as_f32(), 0.0);
        assert_eq!(f.stars.as_f32(), 1.0);
        assert_eq!(f.scheduler.timeline_count(), 0);
    }

    #[test]
    fn test_start_twice_does_not_double_schedule() {
        let mut f = fixture();
        f.player.start().unwrap();
        f.player.start().unwrap();
        assert_eq!(f.scheduler.timeline_count(), 1);
        assert!(f.player.is_playing());

        f.player.stop();
        f.player.stop();
        assert!(!f.player.is_playing());
        assert_eq!(f.scheduler.timeline_count(), 0);
    }

    #[test]
    fn test_unowned_value_is_rejected() {
        let scheduler = AnimationScheduler::new();
        let owned = scheduler.value("owned", 0.0);
        let stray = scheduler.value("stray", 0.0);

        let mut player = TimelinePlayer::new(scheduler.handle(), {
            let owned = owned.clone();
            let stray = stray.clone();
            move || Ok(sequence([owned.to(1.0, 10.0).into(), stray.to(1.0, 10.0).into()]))
        });
        player.own(&owned, 0.0);

        assert_eq!(
            player.start(),
            Err(AnimationError::UnownedValue("stray".to_string()))
        );
        assert!(!player.is_playing());
        assert_eq!(player.run_count(), 0);
    }

    #[test]
    fn test_build_errors_propagate() {
        let scheduler = AnimationScheduler::new();
        let v = scheduler.value("v", 0.0);
        let mut player = TimelinePlayer::new(scheduler.handle(), {
            let v = v.clone();
            move || Ok(v.to(1.0, -1.0).into())
        });
        player.own(&v, 0.0);
        assert!(matches!(player.start(), Err(AnimationError::InvalidDuration(_))));

        let mut failing = TimelinePlayer::new(scheduler.handle(), || {
            Err(AnimationError::CaptionIndexOutOfRange { index: 9, len: 3 })
        });
        assert!(failing.play().is_err());
    }

    #[test]
    fn test_start_with_reports_completion() {
        let scheduler = AnimationScheduler::new();
        let v = scheduler.value("v", 0.0);
        let mut player = TimelinePlayer::new(scheduler.handle(), {
            let v = v.clone();
            move || Ok(v.to(1.0, 100.0).into())
        });
        player.own(&v, 0.0);

        let done = Rc::new(Cell::new(0));
        let order = Rc::new(RefCell::new(Vec::new()));
        {
            let done = Rc::clone(&done);
            let order = Rc::clone(&order);
            let v = v.clone();
            player
                .start_with(move || {
                    done.set(done.get() + 1);
                    order.borrow_mut().push(v.as_f32());
                })
                .unwrap();
        }

        // A replaced run never reports completion
        scheduler.advance(50.0, 10.0);
        player.play().unwrap();
        scheduler.advance(200.0, 10.0);
        assert_eq!(done.get(), 0);

        player
            .start_with({
                let done = Rc::clone(&done);
                move || done.set(done.get() + 1)
            })
            .unwrap();
        scheduler.advance(100.0, 10.0);
        assert_eq!(done.get(), 1);
        assert!(order.borrow().is_empty());
    }
}
