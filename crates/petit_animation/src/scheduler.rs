//! Animation scheduler
//!
//! Owns every animated value and running timeline and advances them each frame.
//! Values and timelines are reached through wrapper types holding a weak
//! [`SchedulerHandle`]:
//! - `AnimatedValue` - a scalar or 2D cell that can be set or driven over time
//! - `AnimatedTimeline` - a combinator tree that can be started, stopped, restarted
//!
//! Scheduling is single-threaded and cooperative. A tick advances every
//! running timeline, and only after all of them have written their values are
//! listeners notified (once per changed value, with the final value of the
//! tick). Completion callbacks run last.

use crate::combinator::Combinator;
use crate::easing::Easing;
use crate::error::{AnimationError, Result};
use crate::observer::{Listener, Listeners, Subscription};
use crate::timeline::{Node, NodeState, ValueStore};
use crate::transition::Transition;
use crate::values::{Value, ValueKind, Vec2};
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Instant;

new_key_type! {
    /// Handle to an animated value
    pub struct ValueId;
    /// Handle to a running timeline
    pub struct TimelineId;
}

type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Listeners to invoke and the value to hand them
type Notification = (SmallVec<[Listener<Value>; 4]>, Value);

/// Values a leaf settled on during one tick, in write order
type Settled = SmallVec<[Value; 2]>;

struct ValueNode {
    label: String,
    value: Value,
    listeners: Listeners<Value>,
}

/// Values owned by the scheduler, plus the set changed during the current tick
#[derive(Default)]
struct ValueTable {
    nodes: SlotMap<ValueId, ValueNode>,
    changed: FxIndexMap<ValueId, Settled>,
}

impl ValueTable {
    fn lookup(&self, id: ValueId) -> Option<(String, ValueKind)> {
        self.nodes
            .get(id)
            .map(|node| (node.label.clone(), node.value.kind()))
    }

    /// Take the values changed this tick, in first-changed order
    fn drain_changes(&mut self) -> FxIndexMap<ValueId, Settled> {
        std::mem::take(&mut self.changed)
    }

    /// Store `value`; returns the change record if it differs from the current one
    fn store(&mut self, id: ValueId, value: Value) -> Option<&mut Settled> {
        let Some(node) = self.nodes.get_mut(id) else {
            tracing::debug!("timeline write to disposed value {:?} ignored", id);
            return None;
        };
        if node.value == value {
            return None;
        }
        node.value = value;
        Some(self.changed.entry(id).or_default())
    }
}

impl ValueStore for ValueTable {
    fn read(&self, id: ValueId) -> Option<Value> {
        self.nodes.get(id).map(|node| node.value)
    }

    fn write(&mut self, id: ValueId, value: Value) {
        self.store(id, value);
    }

    fn settle(&mut self, id: ValueId, value: Value) {
        if let Some(settled) = self.store(id, value) {
            settled.push(value);
        }
    }
}

struct RunningTimeline {
    label: String,
    root: Node,
    on_done: Option<Box<dyn FnOnce()>>,
}

/// Internal state of the animation scheduler
struct SchedulerInner {
    values: ValueTable,
    timelines: SlotMap<TimelineId, RunningTimeline>,
    elapsed_ms: f64,
    frames: u64,
    last_frame: Instant,
}

/// The animation scheduler that ticks all running timelines
///
/// This is typically held by the screen (or the frame driver) and shared with
/// components via [`SchedulerHandle`].
///
/// ```
/// use petit_animation::AnimationScheduler;
///
/// let scheduler = AnimationScheduler::new();
/// let opacity = scheduler.value("opacity", 0.0);
/// let mut fade = opacity
///     .animate_to(1.0, 100.0, 0.0, Default::default())
///     .unwrap();
///
/// assert!(fade.is_playing());
/// scheduler.advance(100.0, 10.0);
/// assert_eq!(opacity.as_f32(), 1.0);
/// assert!(!fade.is_playing());
/// fade.stop(); // already finished: tolerated
/// ```
pub struct AnimationScheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

impl AnimationScheduler {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                values: ValueTable::default(),
                timelines: SlotMap::with_key(),
                elapsed_ms: 0.0,
                frames: 0,
                last_frame: Instant::now(),
            })),
        }
    }

    /// Get a handle to this scheduler for passing to components
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Create an animated value owned by this scheduler
    pub fn value(&self, label: &str, initial: impl Into<Value>) -> AnimatedValue {
        let id = insert_value(&self.inner, label, initial.into());
        AnimatedValue {
            handle: self.handle(),
            id,
        }
    }

    /// Tick using wall-clock time since the previous frame
    ///
    /// Returns true if any timelines are still running.
    pub fn tick(&self) -> bool {
        let dt_ms = {
            let mut inner = self.inner.borrow_mut();
            let now = Instant::now();
            let dt = (now - inner.last_frame).as_secs_f32() * 1000.0;
            inner.last_frame = now;
            dt
        };
        self.tick_ms(dt_ms)
    }

    /// Tick by a fixed number of milliseconds
    ///
    /// This is the deterministic clock: the same sequence of `tick_ms` calls
    /// always produces the same value trajectories.
    pub fn tick_ms(&self, dt_ms: f32) -> bool {
        let dt_ms = if dt_ms.is_finite() && dt_ms >= 0.0 {
            dt_ms
        } else {
            tracing::warn!("ignoring invalid frame delta {}ms", dt_ms);
            0.0
        };

        let (changed, completions) = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            inner.elapsed_ms += f64::from(dt_ms);
            inner.frames += 1;

            let mut finished: SmallVec<[TimelineId; 4]> = SmallVec::new();
            for (id, timeline) in inner.timelines.iter_mut() {
                timeline.root.advance(dt_ms, &mut inner.values);
                if timeline.root.state() == NodeState::Done {
                    finished.push(id);
                }
            }

            let mut completions: Vec<Box<dyn FnOnce()>> = Vec::new();
            for id in finished {
                if let Some(timeline) = inner.timelines.remove(id) {
                    tracing::debug!(
                        timeline = %timeline.label,
                        elapsed_ms = inner.elapsed_ms,
                        "timeline completed"
                    );
                    completions.extend(timeline.on_done);
                }
            }

            (inner.values.drain_changes(), completions)
        };

        // Every leaf has written this tick's values; now notify dependents.
        // Settled values are delivered in order, then the current value
        // unless it is the last settled one. The current value is read at
        // call time, so it may already reflect a reset made by an earlier
        // listener.
        for (id, settled) in changed {
            for value in &settled {
                self.notify(id, value);
            }
            let Some((listeners, value)) = self.notification(id) else {
                continue;
            };
            if settled.last() == Some(&value) {
                continue;
            }
            for listener in listeners.iter() {
                listener(&value);
            }
        }
        for done in completions {
            done();
        }

        self.has_active_animations()
    }

    /// Call the listeners of `id` with `value`
    fn notify(&self, id: ValueId, value: &Value) {
        let Some((listeners, _)) = self.notification(id) else {
            return;
        };
        for listener in listeners.iter() {
            listener(value);
        }
    }

    fn notification(&self, id: ValueId) -> Option<Notification> {
        let inner = self.inner.borrow();
        inner
            .values
            .nodes
            .get(id)
            .map(|node| (node.listeners.snapshot(), node.value))
    }

    /// Run the clock forward by `total_ms` in frames of at most `frame_ms`
    ///
    /// Returns true if any timelines are still running afterwards.
    pub fn advance(&self, total_ms: f32, frame_ms: f32) -> bool {
        let frame_ms = if frame_ms.is_finite() && frame_ms > 0.0 {
            frame_ms
        } else {
            tracing::warn!("invalid frame size {}ms, advancing in one step", frame_ms);
            total_ms.max(0.0)
        };

        let mut remaining = total_ms.max(0.0);
        let mut active = self.has_active_animations();
        while remaining > 0.0 {
            let step = remaining.min(frame_ms);
            active = self.tick_ms(step);
            remaining -= step;
        }
        active
    }

    /// Simulated time elapsed across all ticks
    pub fn elapsed_ms(&self) -> f64 {
        self.inner.borrow().elapsed_ms
    }

    pub fn frame_count(&self) -> u64 {
        self.inner.borrow().frames
    }

    /// Check if any timelines are still running
    pub fn has_active_animations(&self) -> bool {
        !self.inner.borrow().timelines.is_empty()
    }

    /// Get the number of running timelines
    pub fn timeline_count(&self) -> usize {
        self.inner.borrow().timelines.len()
    }

    /// Get the number of live animated values
    pub fn value_count(&self) -> usize {
        self.inner.borrow().values.nodes.len()
    }

    /// Number of leaves currently mid-flight across all timelines
    pub fn active_leaf_count(&self) -> usize {
        self.inner
            .borrow()
            .timelines
            .values()
            .map(|t| t.root.active_leaves())
            .sum()
    }
}

impl Default for AnimationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AnimationScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("AnimationScheduler")
            .field("values", &inner.values.nodes.len())
            .field("timelines", &inner.timelines.len())
            .field("elapsed_ms", &inner.elapsed_ms)
            .finish()
    }
}

fn insert_value(inner: &Rc<RefCell<SchedulerInner>>, label: &str, initial: Value) -> ValueId {
    inner.borrow_mut().values.nodes.insert(ValueNode {
        label: label.to_string(),
        value: initial,
        listeners: Listeners::new(),
    })
}

/// A weak handle to the animation scheduler
///
/// This is passed to components that need to create values or timelines.
/// It won't keep the scheduler alive; operations on a dead handle are no-ops.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Weak<RefCell<SchedulerInner>>,
}

impl SchedulerHandle {
    /// Check if the scheduler is still alive
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    fn with_inner<R>(&self, f: impl FnOnce(&SchedulerInner) -> R) -> Option<R> {
        let inner = self.inner.upgrade()?;
        let guard = inner.borrow();
        Some(f(&guard))
    }

    fn with_inner_mut<R>(&self, f: impl FnOnce(&mut SchedulerInner) -> R) -> Option<R> {
        let inner = self.inner.upgrade()?;
        let mut guard = inner.borrow_mut();
        Some(f(&mut guard))
    }

    // =========================================================================
    // Value Operations
    // =========================================================================

    /// Create an animated value
    pub fn create_value(&self, label: &str, initial: impl Into<Value>) -> Result<AnimatedValue> {
        let inner = self.inner.upgrade().ok_or(AnimationError::SchedulerGone)?;
        let id = insert_value(&inner, label, initial.into());
        Ok(AnimatedValue {
            handle: self.clone(),
            id,
        })
    }

    /// Get current value
    pub fn get_value(&self, id: ValueId) -> Option<Value> {
        self.with_inner(|inner| inner.values.nodes.get(id).map(|n| n.value))
            .flatten()
    }

    pub fn value_label(&self, id: ValueId) -> Option<String> {
        self.with_inner(|inner| inner.values.nodes.get(id).map(|n| n.label.clone()))
            .flatten()
    }

    /// Assign a value and notify its listeners synchronously
    ///
    /// Returns false (and logs) when the value is disposed or of another kind.
    pub fn set_value(&self, id: ValueId, value: Value) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            tracing::warn!("set on value {:?} after scheduler shutdown ignored", id);
            return false;
        };

        let listeners = {
            let mut guard = inner.borrow_mut();
            let Some(node) = guard.values.nodes.get_mut(id) else {
                tracing::warn!("set on disposed value {:?} ignored", id);
                return false;
            };
            if node.value.kind() != value.kind() {
                tracing::warn!(
                    "set on `{}` ignored: expected {}, got {}",
                    node.label,
                    node.value.kind(),
                    value.kind()
                );
                return false;
            }
            node.value = value;
            node.listeners.snapshot()
        };

        for listener in listeners.iter() {
            listener(&value);
        }
        true
    }

    /// Register a change listener on a value
    pub fn subscribe_value<F>(&self, id: ValueId, f: F) -> Subscription
    where
        F: Fn(&Value) + 'static,
    {
        let Some(inner) = self.inner.upgrade() else {
            return Subscription::inert();
        };
        let Some(listener_id) = inner
            .borrow_mut()
            .values
            .nodes
            .get_mut(id)
            .map(|node| node.listeners.insert(Rc::new(f)))
        else {
            tracing::warn!("subscribe on disposed value {:?} ignored", id);
            return Subscription::inert();
        };

        let handle = self.clone();
        Subscription::new(move || {
            handle
                .with_inner_mut(|inner| {
                    inner
                        .values
                        .nodes
                        .get_mut(id)
                        .map(|node| node.listeners.remove(listener_id))
                })
                .flatten()
                .unwrap_or(false)
        })
    }

    /// Remove a value; later reads return `None` and writes are ignored
    pub fn dispose_value(&self, id: ValueId) -> bool {
        self.with_inner_mut(|inner| inner.values.nodes.remove(id).is_some())
            .unwrap_or(false)
    }

    /// Resolve a value's label and kind, `None` if disposed
    pub fn describe_value(&self, id: ValueId) -> Option<(String, ValueKind)> {
        self.with_inner(|inner| inner.values.lookup(id)).flatten()
    }

    // =========================================================================
    // Timeline Operations
    // =========================================================================

    /// Check a combinator tree against the values it targets
    pub fn validate(&self, combinator: &Combinator) -> Result<()> {
        self.with_inner(|inner| combinator.validate(&|id| inner.values.lookup(id)))
            .unwrap_or(Err(AnimationError::SchedulerGone))
    }

    /// Validate and start running a combinator tree
    pub fn register_timeline(
        &self,
        label: &str,
        combinator: &Combinator,
        on_done: Option<Box<dyn FnOnce()>>,
    ) -> Result<TimelineId> {
        self.validate(combinator)?;
        let id = self
            .with_inner_mut(|inner| {
                // Reset last_frame so a wall-clock tick after a long idle doesn't jump
                inner.last_frame = Instant::now();
                inner.timelines.insert(RunningTimeline {
                    label: label.to_string(),
                    root: Node::build(combinator),
                    on_done,
                })
            })
            .ok_or(AnimationError::SchedulerGone)?;
        tracing::debug!(
            timeline = label,
            leaves = combinator.leaf_count(),
            "timeline started"
        );
        Ok(id)
    }

    /// Check if a timeline is still running
    pub fn is_timeline_playing(&self, id: TimelineId) -> bool {
        self.with_inner(|inner| inner.timelines.contains_key(id))
            .unwrap_or(false)
    }

    /// Cancel a running timeline
    ///
    /// Values keep whatever they were last set to. Returns false if the
    /// timeline had already finished or been stopped.
    pub fn stop_timeline(&self, id: TimelineId) -> bool {
        let removed = self
            .with_inner_mut(|inner| inner.timelines.remove(id))
            .flatten();
        match removed {
            Some(mut timeline) => {
                timeline.root.cancel();
                tracing::debug!(timeline = %timeline.label, "timeline cancelled");
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

// ============================================================================
// Animated Value
// ============================================================================

/// A value cell that automatically registers with the scheduler
///
/// Clones refer to the same cell. The cell lives until [`dispose`] is
/// called or the scheduler is dropped.
///
/// [`dispose`]: AnimatedValue::dispose
#[derive(Clone)]
pub struct AnimatedValue {
    handle: SchedulerHandle,
    id: ValueId,
}

impl AnimatedValue {
    pub fn id(&self) -> ValueId {
        self.id
    }

    pub fn handle(&self) -> &SchedulerHandle {
        &self.handle
    }

    pub fn label(&self) -> String {
        self.handle
            .value_label(self.id)
            .unwrap_or_else(|| "<disposed>".to_string())
    }

    /// Get the current value, `None` once disposed
    pub fn get(&self) -> Option<Value> {
        self.handle.get_value(self.id)
    }

    /// Current scalar value, or 0 if disposed or not a scalar
    pub fn as_f32(&self) -> f32 {
        self.get().and_then(|v| v.as_float()).unwrap_or(0.0)
    }

    /// Current 2D value, or zero if disposed or not a vector
    pub fn as_vec2(&self) -> Vec2 {
        self.get().and_then(|v| v.as_vec2()).unwrap_or(Vec2::ZERO)
    }

    pub fn kind(&self) -> Option<ValueKind> {
        self.get().map(|v| v.kind())
    }

    /// Set value immediately and notify listeners
    pub fn set(&self, value: impl Into<Value>) {
        self.handle.set_value(self.id, value.into());
    }

    /// Describe a transition of this value (not scheduled)
    pub fn to(&self, target: impl Into<Value>, duration_ms: f32) -> Transition {
        Transition::new(self.id, target, duration_ms)
    }

    /// Describe an instant assignment of this value (not scheduled)
    pub fn set_to(&self, value: impl Into<Value>) -> Combinator {
        crate::combinator::set(self.id, value)
    }

    /// Start a single transition toward `target`
    ///
    /// On a disposed value this is a no-op that logs a warning and returns an
    /// idle timeline. Other configuration mistakes are returned as errors.
    pub fn animate_to(
        &self,
        target: impl Into<Value>,
        duration_ms: f32,
        delay_ms: f32,
        easing: Easing,
    ) -> Result<AnimatedTimeline> {
        let transition = self.to(target, duration_ms).delay(delay_ms).easing(easing);
        let mut timeline = AnimatedTimeline::idle(self.handle.clone(), transition.into());
        if self.is_disposed() {
            tracing::warn!("animate_to on disposed value {:?} ignored", self.id);
            return Ok(timeline);
        }
        timeline.label = format!("animate:{}", self.label());
        timeline.start()?;
        Ok(timeline)
    }

    /// Register a change listener
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Value) + 'static,
    {
        self.handle.subscribe_value(self.id, f)
    }

    /// Remove the value from the scheduler
    pub fn dispose(&self) {
        if !self.handle.dispose_value(self.id) {
            tracing::warn!("dispose on already disposed value {:?}", self.id);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.get().is_none()
    }
}

impl fmt::Debug for AnimatedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimatedValue")
            .field("id", &self.id)
            .field("label", &self.label())
            .field("value", &self.get())
            .finish()
    }
}

// ============================================================================
// Animated Timeline
// ============================================================================

/// A combinator tree that automatically registers with the scheduler
///
/// Starting an already running timeline replaces the previous run, so a
/// timeline is never scheduled twice. Dropping it cancels the run.
///
/// # Example
///
/// ```
/// use petit_animation::{repeat, sequence, AnimatedTimeline, AnimationScheduler, Iterations};
///
/// let scheduler = AnimationScheduler::new();
/// let stars = scheduler.value("stars", 1.0);
///
/// let flicker = repeat(
///     sequence([stars.to(0.2, 400.0).into(), stars.to(1.0, 400.0).into()]),
///     Iterations::Count(2),
/// );
/// let mut timeline = AnimatedTimeline::new(scheduler.handle(), flicker).unwrap();
/// timeline.start().unwrap();
///
/// scheduler.advance(1600.0, 16.0);
/// assert!(!timeline.is_playing());
/// ```
#[must_use = "dropping an AnimatedTimeline cancels it"]
pub struct AnimatedTimeline {
    handle: SchedulerHandle,
    label: String,
    combinator: Combinator,
    timeline_id: Option<TimelineId>,
}

impl AnimatedTimeline {
    /// Create a timeline, validating the tree up front
    pub fn new(handle: SchedulerHandle, combinator: Combinator) -> Result<Self> {
        handle.validate(&combinator)?;
        Ok(Self::idle(handle, combinator))
    }

    fn idle(handle: SchedulerHandle, combinator: Combinator) -> Self {
        Self {
            handle,
            label: "timeline".to_string(),
            combinator,
            timeline_id: None,
        }
    }

    /// Name used in log output
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn handle(&self) -> &SchedulerHandle {
        &self.handle
    }

    /// The tree this timeline runs
    pub fn combinator(&self) -> &Combinator {
        &self.combinator
    }

    /// Start (or restart) from the beginning of the tree
    pub fn start(&mut self) -> Result<()> {
        self.launch(None)
    }

    /// Start and call `on_done` once the whole tree has completed
    ///
    /// `on_done` is dropped without being called if the run is stopped or
    /// replaced first.
    pub fn start_with<F>(&mut self, on_done: F) -> Result<()>
    where
        F: FnOnce() + 'static,
    {
        self.launch(Some(Box::new(on_done)))
    }

    fn launch(&mut self, on_done: Option<Box<dyn FnOnce()>>) -> Result<()> {
        if let Some(previous) = self.timeline_id.take() {
            self.handle.stop_timeline(previous);
        }
        let id = self
            .handle
            .register_timeline(&self.label, &self.combinator, on_done)?;
        self.timeline_id = Some(id);
        Ok(())
    }

    /// Cancel the run; values keep their current state
    pub fn stop(&mut self) {
        match self.timeline_id.take() {
            Some(id) => {
                if !self.handle.stop_timeline(id) {
                    tracing::debug!("stop on finished timeline `{}`", self.label);
                }
            }
            None => tracing::debug!("stop on idle timeline `{}`", self.label),
        }
    }

    /// Stop and start again from the beginning
    pub fn restart(&mut self) -> Result<()> {
        self.start()
    }

    pub fn is_playing(&self) -> bool {
        self.timeline_id
            .map(|id| self.handle.is_timeline_playing(id))
            .unwrap_or(false)
    }
}

impl Drop for AnimatedTimeline {
    fn drop(&mut self) {
        if let Some(id) = self.timeline_id.take() {
            self.handle.stop_timeline(id);
        }
    }
}

impl fmt::Debug for AnimatedTimeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimatedTimeline")
            .field("label", &self.label)
            .field("playing", &self.is_playing())
            .finish()
    }
}
