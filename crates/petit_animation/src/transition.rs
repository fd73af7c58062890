//! Timing transitions
//!
//! A [`Transition`] is a stateless descriptor: move one value to a target
//! over a duration, after an optional delay, through an easing curve.
//! Scheduling it produces a running node (see [`crate::timeline`]).

use crate::easing::Easing;
use crate::scheduler::ValueId;
use crate::values::Value;

/// Descriptor for a single timed value change
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// Value being driven
    pub target: ValueId,
    /// Value reached at progress 1
    pub to: Value,
    /// Duration in milliseconds
    pub duration_ms: f32,
    /// Wait before the transition starts (ms)
    pub delay_ms: f32,
    pub easing: Easing,
}

impl Transition {
    pub fn new(target: ValueId, to: impl Into<Value>, duration_ms: f32) -> Self {
        Self {
            target,
            to: to.into(),
            duration_ms,
            delay_ms: 0.0,
            easing: Easing::Linear,
        }
    }

    /// Set delay before the transition starts (in milliseconds)
    pub fn delay(mut self, delay_ms: f32) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Delay plus duration
    pub fn total_ms(&self) -> f32 {
        self.delay_ms + self.duration_ms
    }

    /// Value at the given normalized progress, starting from `from`
    ///
    /// Progress 1 returns `to` exactly rather than an interpolated
    /// approximation.
    pub fn sample(&self, from: &Value, progress: f32) -> Value {
        if progress >= 1.0 {
            return self.to;
        }
        from.lerp(&self.to, self.easing.apply(progress))
            .unwrap_or(self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::Vec2;

    fn id() -> ValueId {
        ValueId::default()
    }

    #[test]
    fn test_builder_defaults() {
        let t = Transition::new(id(), 1.0, 250.0);
        assert_eq!(t.delay_ms, 0.0);
        assert_eq!(t.easing, Easing::Linear);
        assert_eq!(t.total_ms(), 250.0);

        let t = t.delay(100.0).easing(Easing::EaseOut);
        assert_eq!(t.total_ms(), 350.0);
        assert_eq!(t.easing, Easing::EaseOut);
    }

    #[test]
    fn test_sample_endpoints() {
        let t = Transition::new(id(), 0.7, 100.0);
        let from = Value::Float(0.1);

        assert_eq!(t.sample(&from, 0.0), from);
        // No drift at the end even when lerp would round
        assert_eq!(t.sample(&from, 1.0), Value::Float(0.7));
    }

    #[test]
    fn test_sample_vec2() {
        let t = Transition::new(id(), Vec2::new(10.0, 20.0), 100.0);
        let mid = t.sample(&Value::Vec2(Vec2::ZERO), 0.5);
        assert_eq!(mid, Value::Vec2(Vec2::new(5.0, 10.0)));
    }
}
