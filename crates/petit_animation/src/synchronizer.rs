//! Message synchronizer
//!
//! Turns a numeric selector value into caption changes. Whenever the selector
//! lands on or passes through an integer `i` inside the caption list, caption
//! `i` is published (to the current-caption observable and the optional sink)
//! and the shared caption entrance timeline is reset and replayed.
//!
//! The synchronizer is a ratchet: it remembers the last selector value it saw
//! and, on every change, publishes each in-range integer between the previous
//! value (excluded) and the new one (included) in the order of travel. Frame
//! size therefore never drops a caption. Values that cross no integer publish
//! nothing, and staying on the same integer publishes once.
//!
//! ```
//! use petit_animation::{AnimationScheduler, MessageSynchronizer, SyncState};
//!
//! let scheduler = AnimationScheduler::new();
//! let selector = scheduler.value("caption", -1.0);
//!
//! let sync = MessageSynchronizer::new(vec!["hello".into(), "world".into()]);
//! sync.attach(&selector).unwrap();
//!
//! selector.set(-0.5);
//! assert_eq!(sync.state(), SyncState::Idle);
//! selector.set(1.0);
//! assert_eq!(sync.state(), SyncState::Showing(1));
//! assert_eq!(sync.published_count(), 2);
//! assert_eq!(sync.current_caption().get().as_deref(), Some("world"));
//! ```

use crate::combinator::Reset;
use crate::error::{AnimationError, Result};
use crate::observer::{Observable, ReadOnly, Subscription};
use crate::scheduler::{AnimatedTimeline, AnimatedValue};
use crate::values::ValueKind;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Distance from an integer within which the selector counts as landed
pub const LANDING_EPSILON: f32 = 1e-4;

/// Index the selector has landed on, if any
///
/// Returns `None` for non-finite values, values further than
/// [`LANDING_EPSILON`] from an integer, and integers outside `0..len`.
pub fn landing_index(value: f32, len: usize) -> Option<usize> {
    if !value.is_finite() {
        return None;
    }
    let rounded = value.round();
    if (value - rounded).abs() > LANDING_EPSILON || rounded < 0.0 {
        return None;
    }
    let index = rounded as usize;
    (index < len).then_some(index)
}

/// Indices in `0..len` crossed moving the selector from `from` to `to`
///
/// `from` is excluded and `to` included, both within [`LANDING_EPSILON`].
/// Indices come in the order of travel.
pub fn crossed_indices(from: f32, to: f32, len: usize) -> SmallVec<[usize; 4]> {
    let mut crossed = SmallVec::new();
    if len == 0 || !from.is_finite() || !to.is_finite() {
        return crossed;
    }
    let last = (len - 1) as f32;
    if to > from {
        let end = (to + LANDING_EPSILON).floor().min(last);
        let mut i = ((from + LANDING_EPSILON).floor() + 1.0).max(0.0);
        while i <= end {
            crossed.push(i as usize);
            i += 1.0;
        }
    } else if to < from {
        let end = (to - LANDING_EPSILON).ceil().max(0.0);
        let mut i = ((from - LANDING_EPSILON).ceil() - 1.0).min(last);
        while i >= end {
            crossed.push(i as usize);
            i -= 1.0;
        }
    }
    crossed
}

/// Text display that receives published captions
pub trait CaptionSink {
    fn show(&self, index: usize, text: &str);
}

impl<F> CaptionSink for F
where
    F: Fn(usize, &str),
{
    fn show(&self, index: usize, text: &str) {
        self(index, text)
    }
}

/// Synchronizer state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    /// No caption published since construction or the last reset
    #[default]
    Idle,
    Showing(usize),
}

/// Caption entrance replayed on every landing
struct Entrance {
    timeline: AnimatedTimeline,
    /// Applied synchronously before the timeline restarts
    resets: Vec<Reset>,
}

impl Entrance {
    fn replay(&mut self) {
        let handle = self.timeline.handle().clone();
        for reset in &self.resets {
            handle.set_value(reset.target, reset.value);
        }
        if let Err(err) = self.timeline.restart() {
            tracing::warn!("caption entrance could not restart: {}", err);
        }
    }
}

#[derive(Default)]
struct Progress {
    state: SyncState,
    /// Last selector value seen; `None` until the first one after a reset
    last: Option<f32>,
    published: u64,
}

struct Shared {
    captions: Vec<String>,
    progress: RefCell<Progress>,
    caption: Observable<Option<String>>,
    sink: RefCell<Option<Rc<dyn CaptionSink>>>,
    entrance: RefCell<Option<Entrance>>,
    subscription: RefCell<Option<Subscription>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.get_mut().take() {
            subscription.unsubscribe();
        }
    }
}

/// Selects captions from integer landings of a selector value
///
/// Clones share the same state.
#[derive(Clone)]
pub struct MessageSynchronizer {
    shared: Rc<Shared>,
}

impl MessageSynchronizer {
    pub fn new(captions: Vec<String>) -> Self {
        Self {
            shared: Rc::new(Shared {
                captions,
                progress: RefCell::new(Progress::default()),
                caption: Observable::new(None),
                sink: RefCell::new(None),
                entrance: RefCell::new(None),
                subscription: RefCell::new(None),
            }),
        }
    }

    /// Forward published captions to a display sink
    pub fn with_sink(self, sink: impl CaptionSink + 'static) -> Self {
        *self.shared.sink.borrow_mut() = Some(Rc::new(sink));
        self
    }

    /// Replay `timeline` on every landing, applying `resets` first
    pub fn with_entrance(self, timeline: AnimatedTimeline, resets: Vec<Reset>) -> Self {
        *self.shared.entrance.borrow_mut() = Some(Entrance { timeline, resets });
        self
    }

    /// Follow a scalar selector value
    ///
    /// Replaces any previously attached selector.
    pub fn attach(&self, selector: &AnimatedValue) -> Result<()> {
        match selector.kind() {
            Some(ValueKind::Float) => {}
            Some(found) => {
                return Err(AnimationError::KindMismatch {
                    label: selector.label(),
                    expected: ValueKind::Float,
                    found,
                })
            }
            None => return Err(AnimationError::DisposedValue(format!("{:?}", selector.id()))),
        }

        self.detach();
        let weak: Weak<Shared> = Rc::downgrade(&self.shared);
        let subscription = selector.subscribe(move |value| {
            let (Some(shared), Some(x)) = (weak.upgrade(), value.as_float()) else {
                return;
            };
            MessageSynchronizer { shared }.observe(x);
        });
        *self.shared.subscription.borrow_mut() = Some(subscription);
        self.shared.progress.borrow_mut().last = selector
            .get()
            .and_then(|value| value.as_float())
            .filter(|value| value.is_finite());
        Ok(())
    }

    /// Stop following the selector
    pub fn detach(&self) {
        let subscription = self.shared.subscription.borrow_mut().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
    }

    /// Feed one selector value; returns the indices it published, in order
    ///
    /// The first value after construction or a reset publishes only if it
    /// sits on an integer.
    pub fn observe(&self, value: f32) -> SmallVec<[usize; 4]> {
        let len = self.shared.captions.len();
        let crossed = {
            let mut progress = self.shared.progress.borrow_mut();
            let next = value.is_finite().then_some(value);
            let previous = std::mem::replace(&mut progress.last, next);
            match previous {
                Some(from) => crossed_indices(from, value, len),
                None => landing_index(value, len).into_iter().collect(),
            }
        };
        for &index in &crossed {
            self.publish(index);
        }
        crossed
    }

    /// Publish caption `index` directly
    pub fn show(&self, index: usize) -> Result<()> {
        let index = self.check_index(index as i64)?;
        self.publish(index);
        Ok(())
    }

    fn publish(&self, index: usize) {
        let Some(text) = self.shared.captions.get(index) else {
            return;
        };
        {
            let mut progress = self.shared.progress.borrow_mut();
            progress.state = SyncState::Showing(index);
            progress.published += 1;
        }
        tracing::info!(index, text = %text, "caption");

        // Borrows are released before any callback runs
        let entrance = self.shared.entrance.borrow_mut().take();
        if let Some(mut entrance) = entrance {
            entrance.replay();
            self.shared.entrance.borrow_mut().get_or_insert(entrance);
        }
        self.shared.caption.set(Some(text.clone()));
        let sink = self.shared.sink.borrow().clone();
        if let Some(sink) = sink {
            sink.show(index, text);
        }
    }

    /// Back to idle with no caption shown; the entrance is stopped
    pub fn reset(&self) {
        *self.shared.progress.borrow_mut() = Progress::default();
        if let Some(entrance) = self.shared.entrance.borrow_mut().as_mut() {
            entrance.timeline.stop();
        }
        self.shared.caption.set(None);
    }

    pub fn state(&self) -> SyncState {
        self.shared.progress.borrow().state
    }

    /// Read-only view of the caption currently shown
    pub fn current_caption(&self) -> ReadOnly<Option<String>> {
        self.shared.caption.read_only()
    }

    /// Number of captions published since construction
    pub fn published_count(&self) -> u64 {
        self.shared.progress.borrow().published
    }

    /// Validate a caption index against the list
    pub fn check_index(&self, index: i64) -> Result<usize> {
        let len = self.shared.captions.len();
        usize::try_from(index)
            .ok()
            .filter(|i| *i < len)
            .ok_or(AnimationError::CaptionIndexOutOfRange { index, len })
    }

    pub fn captions(&self) -> &[String] {
        &self.shared.captions
    }

    pub fn len(&self) -> usize {
        self.shared.captions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.captions.is_empty()
    }
}

impl fmt::Debug for MessageSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSynchronizer")
            .field("captions", &self.shared.captions.len())
            .field("state", &self.state())
            .field("published", &self.published_count())
            .finish()
    }
}
