//! Observers and subscriptions
//!
//! Listener registries shared by animated values and plain observables,
//! modelled on the subscriber lists of a reactive graph:
//! - listeners are stored in a slot map and identified by [`ListenerId`]
//! - notification snapshots the listener list first, so callbacks may freely
//!   read or write other cells (or unsubscribe themselves) while running
//! - [`Subscription::unsubscribe`] detaches a listener; dropping the handle
//!   leaves the listener attached

use crate::scheduler::AnimatedValue;
use crate::values::Value;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

new_key_type! {
    /// Handle to a registered listener
    pub struct ListenerId;
}

/// A change callback
pub type Listener<T> = Rc<dyn Fn(&T)>;

/// Registry of change callbacks
pub struct Listeners<T> {
    entries: SlotMap<ListenerId, Listener<T>>,
}

impl<T> Listeners<T> {
    pub fn new() -> Self {
        Self {
            entries: SlotMap::with_key(),
        }
    }

    pub fn insert(&mut self, listener: Listener<T>) -> ListenerId {
        self.entries.insert(listener)
    }

    /// Remove a listener, returning whether it was still registered
    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clone the current listeners so they can be invoked outside a borrow
    pub fn snapshot(&self) -> SmallVec<[Listener<T>; 4]> {
        self.entries.values().cloned().collect()
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for detaching a listener
///
/// Dropping a `Subscription` does not detach the listener.
#[must_use = "keep the subscription to be able to unsubscribe later"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() -> bool>>,
}

impl Subscription {
    pub(crate) fn new<F>(detach: F) -> Self
    where
        F: FnOnce() -> bool + 'static,
    {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A subscription with nothing to detach
    pub(crate) fn inert() -> Self {
        Self { detach: None }
    }

    /// Detach the listener
    ///
    /// Returns `true` if the listener was still attached.
    pub fn unsubscribe(mut self) -> bool {
        self.detach.take().map(|detach| detach()).unwrap_or(false)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

// ============================================================================
// Observable
// ============================================================================

struct ObservableInner<T> {
    value: T,
    version: u64,
    listeners: Listeners<T>,
}

/// A shared, observable cell
///
/// Clones share the same cell. `set` notifies listeners synchronously.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Observable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value: initial,
                version: 0,
                listeners: Listeners::new(),
            })),
        }
    }

    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Number of times the cell has been set
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    pub fn set(&self, value: T) {
        let listeners = {
            let mut inner = self.inner.borrow_mut();
            inner.value = value.clone();
            inner.version += 1;
            inner.listeners.snapshot()
        };
        for listener in listeners {
            listener(&value);
        }
    }

    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        let id = self.inner.borrow_mut().listeners.insert(Rc::new(f));
        let weak: Weak<RefCell<ObservableInner<T>>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            let removed = inner.borrow_mut().listeners.remove(id);
            removed
        })
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    /// A view that can read and subscribe but not write
    pub fn read_only(&self) -> ReadOnly<T> {
        ReadOnly {
            source: self.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .finish()
    }
}

/// Read-only view of an [`Observable`]
#[derive(Clone)]
pub struct ReadOnly<T> {
    source: Observable<T>,
}

impl<T: Clone + 'static> ReadOnly<T> {
    pub fn get(&self) -> T {
        self.source.get()
    }

    pub fn version(&self) -> u64 {
        self.source.version()
    }

    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        self.source.subscribe(f)
    }
}

// ============================================================================
// Derived values
// ============================================================================

/// A value computed from one or more animated values
///
/// Recomputed whenever any input changes. Used to project animated cells
/// into render styles. Dropping it stops the recomputation.
pub struct Derived<T> {
    output: Observable<T>,
    subscriptions: Vec<Subscription>,
}

impl<T: Clone + 'static> Derived<T> {
    pub fn get(&self) -> T {
        self.output.get()
    }

    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        self.output.subscribe(f)
    }

    pub fn read_only(&self) -> ReadOnly<T> {
        self.output.read_only()
    }

    /// Stop recomputing; the last value stays readable
    pub fn detach(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}

impl<T> Drop for Derived<T> {
    fn drop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}

/// Build a [`Derived`] from a set of input values
///
/// `compute` receives the current input values in the order given. Disposed
/// inputs are passed as `None`.
pub fn derive<T, F>(inputs: &[AnimatedValue], compute: F) -> Derived<T>
where
    T: Clone + 'static,
    F: Fn(&[Option<Value>]) -> T + 'static,
{
    let sources: Rc<[AnimatedValue]> = inputs.iter().cloned().collect();
    let compute = Rc::new(compute);
    let evaluate = {
        let sources = Rc::clone(&sources);
        let compute = Rc::clone(&compute);
        move || {
            let current: SmallVec<[Option<Value>; 4]> = sources.iter().map(|v| v.get()).collect();
            compute(&current)
        }
    };

    let output = Observable::new(evaluate());
    let evaluate = Rc::new(evaluate);
    let subscriptions = sources
        .iter()
        .map(|source| {
            let output = output.clone();
            let evaluate = Rc::clone(&evaluate);
            source.subscribe(move |_| output.set(evaluate()))
        })
        .collect();

    Derived {
        output,
        subscriptions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::AnimationScheduler;
    use std::cell::Cell;

    #[test]
    fn test_observable_notifies_and_unsubscribes() {
        let cell = Observable::new(0_i32);
        let seen = Rc::new(Cell::new(0));

        let sub = {
            let seen = Rc::clone(&seen);
            cell.subscribe(move |v| seen.set(*v))
        };

        cell.set(5);
        assert_eq!(seen.get(), 5);
        assert_eq!(cell.version(), 1);

        assert!(sub.unsubscribe());
        cell.set(9);
        assert_eq!(seen.get(), 5);
        assert_eq!(cell.get(), 9);
    }

    #[test]
    fn test_listener_may_write_back_during_notification() {
        let source = Observable::new(1_i32);
        let mirror = Observable::new(0_i32);

        let _sub = {
            let mirror = mirror.clone();
            let source_again = source.clone();
            source.subscribe(move |v| {
                // Reading the source while it notifies must not panic
                mirror.set(*v + source_again.get());
            })
        };

        source.set(3);
        assert_eq!(mirror.get(), 6);
    }

    #[test]
    fn test_unsubscribe_after_drop_is_harmless() {
        let sub = {
            let cell = Observable::new(0_u8);
            cell.subscribe(|_| {})
        };
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn test_derived_recomputes_on_input_change() {
        let scheduler = AnimationScheduler::new();
        let a = scheduler.value("a", 1.0);
        let b = scheduler.value("b", 2.0);

        let mut sum = derive(&[a.clone(), b.clone()], |values| {
            values
                .iter()
                .map(|v| v.and_then(|v| v.as_float()).unwrap_or(0.0))
                .sum::<f32>()
        });
        assert_eq!(sum.get(), 3.0);

        a.set(10.0);
        assert_eq!(sum.get(), 12.0);

        sum.detach();
        b.set(100.0);
        assert_eq!(sum.get(), 12.0);
    }
}
