//! The story screen
//!
//! Ties the story together: values, the timeline player, the caption
//! synchronizer and the projector. The caller drives the clock and reacts to
//! two taps, start and restart.

use crate::config::StoryConfig;
use crate::error::Result;
use crate::layout::Layout;
use crate::projector::{Frame, Projector};
use crate::story::{StoryPlan, StoryValues};
use petit_animation::{
    AnimatedTimeline, AnimationScheduler, CaptionSink, MessageSynchronizer, ReadOnly,
    TimelinePlayer,
};
use std::fmt;

/// A "Le Petit Prince" screen
///
/// ```
/// use petit_story::{StoryConfig, StoryScreen};
///
/// let mut screen = StoryScreen::new(StoryConfig::builtin().unwrap()).unwrap();
/// screen.tap_start().unwrap();
/// screen.advance(2_000.0, 16.0);
///
/// assert_eq!(
///     screen.current_caption().get().as_deref(),
///     Some("This is the story of a little space child")
/// );
/// ```
pub struct StoryScreen {
    config: StoryConfig,
    layout: Layout,
    plan: StoryPlan,
    player: TimelinePlayer,
    synchronizer: MessageSynchronizer,
    projector: Projector,
    values: StoryValues,
    scheduler: AnimationScheduler,
}

impl StoryScreen {
    /// Build the screen in its initial (static) frame
    ///
    /// Fails if the config is invalid or the choreography can't be built.
    pub fn new(config: StoryConfig) -> Result<Self> {
        config.validate()?;
        let layout = Layout::new(&config)?;
        let plan = StoryPlan::new(&config, &layout)?;
        let scheduler = AnimationScheduler::new();
        let values = StoryValues::new(&scheduler, &layout, &config)?;

        let entrance = AnimatedTimeline::new(scheduler.handle(), plan.caption_entrance(&values))?
            .labeled("caption entrance");
        let synchronizer = MessageSynchronizer::new(config.messages.clone())
            .with_entrance(entrance, plan.caption_entrance_resets(&values));
        synchronizer.attach(&values.caption_index)?;

        // Fail fast: the run must build before anyone taps
        plan.build(&values)?;

        let mut player = TimelinePlayer::new(scheduler.handle(), {
            let plan = plan.clone();
            let values = values.clone();
            move || plan.build(&values)
        });
        for (value, initial) in values.initial_state() {
            player.own(value, *initial);
        }

        let projector = Projector::new(&layout, &config, &values, synchronizer.current_caption());

        tracing::info!(
            "story ready: {} layers, {} captions, {:.0}ms",
            layout.assets.len(),
            config.messages.len(),
            plan.duration_ms()
        );

        Ok(Self {
            config,
            layout,
            plan,
            player,
            synchronizer,
            projector,
            values,
            scheduler,
        })
    }

    /// Send every published caption to a text display
    pub fn with_caption_sink(self, sink: impl CaptionSink + 'static) -> Self {
        let synchronizer = self.synchronizer.clone().with_sink(sink);
        Self {
            synchronizer,
            ..self
        }
    }

    /// The starter button: begin the story
    ///
    /// Ignored while a run is already in progress. If the run can't start the
    /// screen stays on its initial frame and the error is returned.
    pub fn tap_start(&mut self) -> Result<()> {
        if self.player.is_playing() {
            tracing::debug!("start tapped while playing, ignored");
            return Ok(());
        }
        self.play()
    }

    /// The restart control: replay from the initial frame
    pub fn tap_restart(&mut self) -> Result<()> {
        tracing::info!("restarting story");
        self.play()
    }

    fn play(&mut self) -> Result<()> {
        self.synchronizer.reset();
        if let Err(err) = self.player.play() {
            tracing::warn!("story failed to start: {}", err);
            self.restart();
            return Err(err.into());
        }
        tracing::info!(run = self.player.run_count(), "story started");
        Ok(())
    }

    /// Stop the run and return to the initial frame
    pub fn restart(&mut self) {
        self.synchronizer.reset();
        self.player.restart();
    }

    /// Freeze the run where it is
    pub fn stop(&mut self) {
        self.player.stop();
    }

    /// Advance by a fixed step; returns true while anything is animating
    pub fn tick_ms(&self, dt_ms: f32) -> bool {
        self.scheduler.tick_ms(dt_ms)
    }

    /// Advance using wall-clock time since the previous tick
    pub fn tick(&self) -> bool {
        self.scheduler.tick()
    }

    pub fn advance(&self, total_ms: f32, frame_ms: f32) -> bool {
        self.scheduler.advance(total_ms, frame_ms)
    }

    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    /// Whether the last stage of the current run has completed
    pub fn is_finished(&self) -> bool {
        self.values.finished.as_f32() >= 1.0
    }

    /// Read-only view of the caption on screen
    pub fn current_caption(&self) -> ReadOnly<Option<String>> {
        self.synchronizer.current_caption()
    }

    /// Snapshot of every layer style
    pub fn frame(&self) -> Frame {
        self.projector.frame()
    }

    /// Length of the story excluding open-ended flicker loops
    pub fn duration_ms(&self) -> f32 {
        self.plan.duration_ms()
    }

    pub fn config(&self) -> &StoryConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn values(&self) -> &StoryValues {
        &self.values
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    pub fn synchronizer(&self) -> &MessageSynchronizer {
        &self.synchronizer
    }

    pub fn scheduler(&self) -> &AnimationScheduler {
        &self.scheduler
    }

    /// Number of runs started so far
    pub fn run_count(&self) -> u32 {
        self.player.run_count()
    }
}

impl fmt::Debug for StoryScreen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoryScreen")
            .field("player", &self.player)
            .field("synchronizer", &self.synchronizer)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
