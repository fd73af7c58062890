//! Combinator trees
//!
//! A [`Combinator`] is an inspectable description of a timeline:
//!
//! ```text
//! Sequence ── run children in order
//! Parallel ── run children together, done when all are done
//! Loop ────── repeat a body, applying reset hooks before each iteration
//! Transition / Set / Delay ── leaves
//! ```
//!
//! Trees are built with the free functions in this module ([`sequence`],
//! [`parallel`], [`repeat`], [`stagger`], ...) and validated before they are
//! scheduled, so configuration mistakes surface as errors instead of values
//! animating somewhere unexpected.

use crate::error::{AnimationError, Result};
use crate::scheduler::ValueId;
use crate::transition::Transition;
use crate::values::{Value, ValueKind};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How many times a loop body runs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IterationsRepr", into = "IterationsRepr")]
pub enum Iterations {
    Count(u32),
    /// Runs until the timeline is stopped
    Unbounded,
}

impl Iterations {
    /// Whether `completed` iterations exhaust the loop
    pub fn is_exhausted(&self, completed: u32) -> bool {
        match self {
            Iterations::Count(n) => completed >= *n,
            Iterations::Unbounded => false,
        }
    }
}

impl fmt::Display for Iterations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Iterations::Count(n) => write!(f, "{n}"),
            Iterations::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Config form: an integer or the word "unbounded"
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum IterationsRepr {
    Count(u32),
    Word(String),
}

impl TryFrom<IterationsRepr> for Iterations {
    type Error = String;

    fn try_from(repr: IterationsRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            IterationsRepr::Count(n) => Ok(Iterations::Count(n)),
            IterationsRepr::Word(word) if word.eq_ignore_ascii_case("unbounded") => {
                Ok(Iterations::Unbounded)
            }
            IterationsRepr::Word(word) => Err(format!(
                "expected an iteration count or \"unbounded\", got \"{word}\""
            )),
        }
    }
}

impl From<Iterations> for IterationsRepr {
    fn from(iterations: Iterations) -> Self {
        match iterations {
            Iterations::Count(n) => IterationsRepr::Count(n),
            Iterations::Unbounded => IterationsRepr::Word("unbounded".to_string()),
        }
    }
}

/// Instant assignment of a value
///
/// Used both as a timeline leaf and as a loop's per-iteration reset hook.
#[derive(Clone, Debug, PartialEq)]
pub struct Reset {
    pub target: ValueId,
    pub value: Value,
}

impl Reset {
    pub fn new(target: ValueId, value: impl Into<Value>) -> Self {
        Self {
            target,
            value: value.into(),
        }
    }
}

/// A node in a timeline tree
#[derive(Clone, Debug, PartialEq)]
pub enum Combinator {
    Transition(Transition),
    Set(Reset),
    /// Wait for the given milliseconds
    Delay(f32),
    Sequence(Vec<Combinator>),
    Parallel(Vec<Combinator>),
    Loop {
        body: Box<Combinator>,
        iterations: Iterations,
        /// Applied before every iteration, including the first
        reset: Vec<Reset>,
    },
}

impl From<Transition> for Combinator {
    fn from(transition: Transition) -> Self {
        Combinator::Transition(transition)
    }
}

impl From<Reset> for Combinator {
    fn from(reset: Reset) -> Self {
        Combinator::Set(reset)
    }
}

/// Run children one after another
pub fn sequence<I>(children: I) -> Combinator
where
    I: IntoIterator<Item = Combinator>,
{
    Combinator::Sequence(children.into_iter().collect())
}

/// Run children together; completes when the last one completes
pub fn parallel<I>(children: I) -> Combinator
where
    I: IntoIterator<Item = Combinator>,
{
    Combinator::Parallel(children.into_iter().collect())
}

/// Repeat `body` for the given number of iterations
pub fn repeat(body: impl Into<Combinator>, iterations: Iterations) -> Combinator {
    Combinator::Loop {
        body: Box::new(body.into()),
        iterations,
        reset: Vec::new(),
    }
}

/// Wait without touching any value
pub fn delay(ms: f32) -> Combinator {
    Combinator::Delay(ms)
}

/// Assign a value instantly
pub fn set(target: ValueId, value: impl Into<Value>) -> Combinator {
    Combinator::Set(Reset::new(target, value))
}

/// Run children in parallel, starting child `k` after `k * offset_ms`
pub fn stagger<I>(children: I, offset_ms: f32) -> Combinator
where
    I: IntoIterator<Item = Combinator>,
{
    parallel(children.into_iter().enumerate().map(|(k, child)| {
        if k == 0 {
            child
        } else {
            sequence([delay(offset_ms * k as f32), child])
        }
    }))
}

impl Combinator {
    /// Add a per-iteration reset hook to a loop
    ///
    /// Has no effect (and logs a warning) on anything but a loop.
    pub fn reset_each(mut self, target: ValueId, value: impl Into<Value>) -> Self {
        match &mut self {
            Combinator::Loop { reset, .. } => reset.push(Reset::new(target, value)),
            other => tracing::warn!(
                "reset_each ignored on non-loop combinator {:?}",
                other.tag()
            ),
        }
        self
    }

    /// Short name of the variant
    pub fn tag(&self) -> &'static str {
        match self {
            Combinator::Transition(_) => "transition",
            Combinator::Set(_) => "set",
            Combinator::Delay(_) => "delay",
            Combinator::Sequence(_) => "sequence",
            Combinator::Parallel(_) => "parallel",
            Combinator::Loop { .. } => "loop",
        }
    }

    /// Nominal duration in milliseconds, `None` if it contains an unbounded loop
    pub fn duration_ms(&self) -> Option<f32> {
        match self {
            Combinator::Transition(t) => Some(t.total_ms()),
            Combinator::Set(_) => Some(0.0),
            Combinator::Delay(ms) => Some(*ms),
            Combinator::Sequence(children) => children
                .iter()
                .try_fold(0.0, |acc, child| Some(acc + child.duration_ms()?)),
            Combinator::Parallel(children) => children
                .iter()
                .try_fold(0.0_f32, |acc, child| Some(acc.max(child.duration_ms()?))),
            Combinator::Loop {
                body, iterations, ..
            } => match iterations {
                Iterations::Count(n) => body.duration_ms().map(|d| d * *n as f32),
                Iterations::Unbounded => None,
            },
        }
    }

    /// Every value the tree writes, in first-touched order
    pub fn targets(&self) -> Vec<ValueId> {
        let mut out = IndexSet::new();
        self.collect_targets(&mut out);
        out.into_iter().collect()
    }

    fn collect_targets(&self, out: &mut IndexSet<ValueId>) {
        match self {
            Combinator::Transition(t) => {
                out.insert(t.target);
            }
            Combinator::Set(reset) => {
                out.insert(reset.target);
            }
            Combinator::Delay(_) => {}
            Combinator::Sequence(children) | Combinator::Parallel(children) => {
                for child in children {
                    child.collect_targets(out);
                }
            }
            Combinator::Loop { body, reset, .. } => {
                for r in reset {
                    out.insert(r.target);
                }
                body.collect_targets(out);
            }
        }
    }

    /// Number of leaves (transitions, sets and delays)
    pub fn leaf_count(&self) -> usize {
        match self {
            Combinator::Transition(_) | Combinator::Set(_) | Combinator::Delay(_) => 1,
            Combinator::Sequence(children) | Combinator::Parallel(children) => {
                children.iter().map(Combinator::leaf_count).sum()
            }
            Combinator::Loop { body, .. } => body.leaf_count(),
        }
    }

    /// Check the tree against the values it targets
    ///
    /// `lookup` resolves a value id to its label and kind, or `None` when the
    /// value no longer exists.
    pub fn validate<F>(&self, lookup: &F) -> Result<()>
    where
        F: Fn(ValueId) -> Option<(String, ValueKind)>,
    {
        match self {
            Combinator::Transition(t) => {
                check_duration(t.duration_ms)?;
                check_duration(t.delay_ms)?;
                t.easing.validate()?;
                check_target(lookup, t.target, &t.to)
            }
            Combinator::Set(reset) => check_target(lookup, reset.target, &reset.value),
            Combinator::Delay(ms) => check_duration(*ms),
            Combinator::Sequence(children) | Combinator::Parallel(children) => {
                children.iter().try_for_each(|child| child.validate(lookup))
            }
            Combinator::Loop {
                body,
                iterations,
                reset,
            } => {
                if *iterations == Iterations::Count(0) {
                    return Err(AnimationError::InvalidIterations);
                }
                for r in reset {
                    check_target(lookup, r.target, &r.value)?;
                }
                body.validate(lookup)
            }
        }
    }
}

fn check_duration(ms: f32) -> Result<()> {
    if ms.is_finite() && ms >= 0.0 {
        Ok(())
    } else {
        Err(AnimationError::InvalidDuration(ms))
    }
}

fn check_target<F>(lookup: &F, target: ValueId, value: &Value) -> Result<()>
where
    F: Fn(ValueId) -> Option<(String, ValueKind)>,
{
    let (label, kind) = lookup(target)
        .ok_or_else(|| AnimationError::DisposedValue(format!("{target:?}")))?;
    if kind != value.kind() {
        return Err(AnimationError::KindMismatch {
            label,
            expected: kind,
            found: value.kind(),
        });
    }
    if !value.is_finite() {
        return Err(AnimationError::NonFiniteTarget(label));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::Vec2;
    use slotmap::SlotMap;

    struct Fixture {
        values: SlotMap<ValueId, (String, ValueKind)>,
        opacity: ValueId,
        position: ValueId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut values = SlotMap::with_key();
            let opacity = values.insert(("opacity".to_string(), ValueKind::Float));
            let position = values.insert(("position".to_string(), ValueKind::Vec2));
            Self {
                values,
                opacity,
                position,
            }
        }

        fn lookup(&self) -> impl Fn(ValueId) -> Option<(String, ValueKind)> + '_ {
            move |id| self.values.get(id).cloned()
        }
    }

    #[test]
    fn test_nominal_durations() {
        let f = Fixture::new();
        let tree = parallel([
            Transition::new(f.opacity, 1.0, 100.0).into(),
            Transition::new(f.opacity, 1.0, 200.0).into(),
            Transition::new(f.opacity, 1.0, 300.0).into(),
        ]);
        assert_eq!(tree.duration_ms(), Some(300.0));

        let tree = sequence([
            Transition::new(f.opacity, 1.0, 100.0).delay(50.0).into(),
            delay(25.0),
            Transition::new(f.opacity, 0.0, 200.0).into(),
        ]);
        assert_eq!(tree.duration_ms(), Some(375.0));

        let looped = repeat(tree.clone(), Iterations::Count(3));
        assert_eq!(looped.duration_ms(), Some(1125.0));

        let forever = parallel([tree, repeat(delay(10.0), Iterations::Unbounded)]);
        assert_eq!(forever.duration_ms(), None);
    }

    #[test]
    fn test_empty_sequence_has_zero_duration() {
        assert_eq!(sequence([]).duration_ms(), Some(0.0));
        assert_eq!(parallel([]).duration_ms(), Some(0.0));
    }

    #[test]
    fn test_stagger_offsets_children() {
        let f = Fixture::new();
        let tree = stagger(
            (0..3).map(|_| Transition::new(f.opacity, 1.0, 100.0).into()),
            50.0,
        );

        let Combinator::Parallel(children) = &tree else {
            panic!("stagger should build a parallel");
        };
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].tag(), "transition");
        assert_eq!(
            children[2],
            sequence([delay(100.0), Transition::new(f.opacity, 1.0, 100.0).into()])
        );
        assert_eq!(tree.duration_ms(), Some(200.0));
    }

    #[test]
    fn test_targets_are_deduplicated_in_order() {
        let f = Fixture::new();
        let tree = sequence([
            Transition::new(f.position, Vec2::new(1.0, 1.0), 10.0).into(),
            repeat(Transition::new(f.opacity, 0.2, 10.0), Iterations::Count(2))
                .reset_each(f.opacity, 1.0),
            set(f.position, Vec2::ZERO),
        ]);
        assert_eq!(tree.targets(), vec![f.position, f.opacity]);
        assert_eq!(tree.leaf_count(), 3);
    }

    #[test]
    fn test_reset_each_only_applies_to_loops() {
        let f = Fixture::new();
        let leaf: Combinator = Transition::new(f.opacity, 1.0, 10.0).into();
        assert_eq!(leaf.clone().reset_each(f.opacity, 0.0), leaf);
    }

    #[test]
    fn test_validate_rejects_kind_mismatch() {
        let f = Fixture::new();
        let tree: Combinator = Transition::new(f.position, 1.0, 100.0).into();
        assert_eq!(
            tree.validate(&f.lookup()),
            Err(AnimationError::KindMismatch {
                label: "position".to_string(),
                expected: ValueKind::Vec2,
                found: ValueKind::Float,
            })
        );
    }

    #[test]
    fn test_validate_rejects_bad_configuration() {
        let f = Fixture::new();
        let lookup = f.lookup();

        let negative: Combinator = Transition::new(f.opacity, 1.0, -5.0).into();
        assert!(matches!(
            negative.validate(&lookup),
            Err(AnimationError::InvalidDuration(_))
        ));

        let nan_delay = delay(f32::NAN);
        assert!(nan_delay.validate(&lookup).is_err());

        let bad_easing: Combinator = Transition::new(f.opacity, 1.0, 5.0)
            .easing(crate::Easing::Steps(0))
            .into();
        assert!(matches!(
            bad_easing.validate(&lookup),
            Err(AnimationError::InvalidEasing { .. })
        ));

        let zero_loop = repeat(delay(1.0), Iterations::Count(0));
        assert_eq!(
            zero_loop.validate(&lookup),
            Err(AnimationError::InvalidIterations)
        );

        let infinite_target = set(f.opacity, f32::INFINITY);
        assert!(matches!(
            infinite_target.validate(&lookup),
            Err(AnimationError::NonFiniteTarget(_))
        ));

        let dangling = set(ValueId::default(), 1.0);
        assert!(matches!(
            dangling.validate(&lookup),
            Err(AnimationError::DisposedValue(_))
        ));
    }

    #[test]
    fn test_iterations_config_forms() {
        #[derive(Deserialize)]
        struct Holder {
            a: Iterations,
            b: Iterations,
        }
        let holder: Holder = toml::from_str("a = 12\nb = \"unbounded\"").unwrap();
        assert_eq!(holder.a, Iterations::Count(12));
        assert_eq!(holder.b, Iterations::Unbounded);

        assert!(toml::from_str::<Holder>("a = 1\nb = \"forever\"").is_err());
    }
}
