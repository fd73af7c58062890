//! Running timelines
//!
//! A running [`Node`] tree mirrors a [`Combinator`] and carries the
//! per-run state: elapsed time, captured start values, the active child of a
//! sequence, the completed iterations of a loop. Nodes are advanced by the
//! scheduler one tick at a time.
//!
//! Time that a finishing child does not need is handed to the next child in
//! the same tick, so a sequence of 100ms + 200ms completes at exactly 300ms
//! regardless of frame size.

use crate::combinator::{Combinator, Iterations, Reset};
use crate::scheduler::ValueId;
use crate::transition::Transition;
use crate::values::Value;

/// Read/write access to the animated values a timeline drives
pub(crate) trait ValueStore {
    fn read(&self, id: ValueId) -> Option<Value>;
    fn write(&mut self, id: ValueId, value: Value);

    /// Write a value a leaf settles on (a set, a reset, a transition's end)
    ///
    /// Listeners see settled values even when a later leaf overwrites them in
    /// the same tick.
    fn settle(&mut self, id: ValueId, value: Value) {
        self.write(id, value);
    }
}

/// Lifecycle of a running node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Not started yet (or reset by a loop)
    Idle,
    Running,
    Done,
    Cancelled,
}

#[derive(Debug)]
enum NodeKind {
    Transition {
        transition: Transition,
        elapsed: f32,
        /// Captured when the delay has elapsed
        from: Option<Value>,
    },
    Set(Reset),
    Delay {
        duration: f32,
        elapsed: f32,
    },
    Sequence {
        children: Vec<Node>,
        current: usize,
    },
    Parallel {
        children: Vec<Node>,
    },
    Loop {
        body: Box<Node>,
        iterations: Iterations,
        completed: u32,
        reset: Vec<Reset>,
    },
}

/// A running instance of a combinator
#[derive(Debug)]
pub(crate) struct Node {
    state: NodeState,
    kind: NodeKind,
}

impl Node {
    pub(crate) fn build(combinator: &Combinator) -> Self {
        let kind = match combinator {
            Combinator::Transition(transition) => NodeKind::Transition {
                transition: transition.clone(),
                elapsed: 0.0,
                from: None,
            },
            Combinator::Set(reset) => NodeKind::Set(reset.clone()),
            Combinator::Delay(ms) => NodeKind::Delay {
                duration: *ms,
                elapsed: 0.0,
            },
            Combinator::Sequence(children) => NodeKind::Sequence {
                children: children.iter().map(Node::build).collect(),
                current: 0,
            },
            Combinator::Parallel(children) => NodeKind::Parallel {
                children: children.iter().map(Node::build).collect(),
            },
            Combinator::Loop {
                body,
                iterations,
                reset,
            } => NodeKind::Loop {
                body: Box::new(Node::build(body)),
                iterations: *iterations,
                completed: 0,
                reset: reset.clone(),
            },
        };
        Self {
            state: NodeState::Idle,
            kind,
        }
    }

    pub(crate) fn state(&self) -> NodeState {
        self.state
    }

    /// Advance by `dt` milliseconds
    ///
    /// Returns the unused part of `dt` once the node is done; `0.0` while it
    /// is still running.
    pub(crate) fn advance(&mut self, dt: f32, store: &mut dyn ValueStore) -> f32 {
        match self.state {
            NodeState::Done => return dt,
            NodeState::Cancelled => return 0.0,
            NodeState::Idle => self.state = NodeState::Running,
            NodeState::Running => {}
        }

        let finished = match &mut self.kind {
            NodeKind::Transition {
                transition,
                elapsed,
                from,
            } => {
                *elapsed += dt;
                if *elapsed < transition.delay_ms {
                    None
                } else {
                    let start = *from.get_or_insert_with(|| {
                        store.read(transition.target).unwrap_or(transition.to)
                    });
                    let active = *elapsed - transition.delay_ms;
                    if transition.duration_ms <= 0.0 || active >= transition.duration_ms {
                        store.settle(transition.target, transition.to);
                        Some(active - transition.duration_ms.max(0.0))
                    } else {
                        let value = transition.sample(&start, active / transition.duration_ms);
                        store.write(transition.target, value);
                        None
                    }
                }
            }
            NodeKind::Set(reset) => {
                store.settle(reset.target, reset.value);
                Some(dt)
            }
            NodeKind::Delay { duration, elapsed } => {
                *elapsed += dt;
                (*elapsed >= *duration).then(|| *elapsed - *duration)
            }
            NodeKind::Sequence { children, current } => {
                let mut budget = dt;
                loop {
                    let Some(child) = children.get_mut(*current) else {
                        break Some(budget);
                    };
                    let rest = child.advance(budget, store);
                    if child.state() != NodeState::Done {
                        break None;
                    }
                    *current += 1;
                    budget = rest;
                }
            }
            NodeKind::Parallel { children } => {
                let mut rest = dt;
                let mut all_done = true;
                for child in children.iter_mut() {
                    if child.state() == NodeState::Done {
                        continue;
                    }
                    let child_rest = child.advance(dt, store);
                    if child.state() == NodeState::Done {
                        rest = rest.min(child_rest);
                    } else {
                        all_done = false;
                    }
                }
                all_done.then_some(rest)
            }
            NodeKind::Loop {
                body,
                iterations,
                completed,
                reset,
            } => {
                let mut budget = dt;
                loop {
                    if body.state() == NodeState::Idle {
                        for r in reset.iter() {
                            store.settle(r.target, r.value);
                        }
                    }
                    let rest = body.advance(budget, store);
                    if body.state() != NodeState::Done {
                        break None;
                    }
                    *completed += 1;
                    if iterations.is_exhausted(*completed) {
                        break Some(rest);
                    }
                    body.reset();
                    // A zero-length body of an unbounded loop yields until the next tick
                    if *iterations == Iterations::Unbounded && rest >= budget {
                        break None;
                    }
                    budget = rest;
                }
            }
        };

        match finished {
            Some(rest) => {
                self.state = NodeState::Done;
                rest.max(0.0)
            }
            None => 0.0,
        }
    }

    /// Return the subtree to its initial declared state
    pub(crate) fn reset(&mut self) {
        self.state = NodeState::Idle;
        match &mut self.kind {
            NodeKind::Transition { elapsed, from, .. } => {
                *elapsed = 0.0;
                *from = None;
            }
            NodeKind::Set(_) => {}
            NodeKind::Delay { elapsed, .. } => *elapsed = 0.0,
            NodeKind::Sequence { children, current } => {
                *current = 0;
                children.iter_mut().for_each(Node::reset);
            }
            NodeKind::Parallel { children } => children.iter_mut().for_each(Node::reset),
            NodeKind::Loop {
                body, completed, ..
            } => {
                *completed = 0;
                body.reset();
            }
        }
    }

    /// Cancel this node and every unfinished descendant
    pub(crate) fn cancel(&mut self) {
        if self.state == NodeState::Done {
            return;
        }
        self.state = NodeState::Cancelled;
        match &mut self.kind {
            NodeKind::Sequence { children, .. } | NodeKind::Parallel { children } => {
                children.iter_mut().for_each(Node::cancel);
            }
            NodeKind::Loop { body, .. } => body.cancel(),
            _ => {}
        }
    }

    /// Number of leaves currently mid-flight
    pub(crate) fn active_leaves(&self) -> usize {
        if self.state != NodeState::Running {
            return 0;
        }
        match &self.kind {
            NodeKind::Transition { .. } | NodeKind::Set(_) | NodeKind::Delay { .. } => 1,
            NodeKind::Sequence { children, .. } | NodeKind::Parallel { children } => {
                children.iter().map(Node::active_leaves).sum()
            }
            NodeKind::Loop { body, .. } => body.active_leaves(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::{delay, parallel, repeat, sequence, set};
    use crate::easing::Easing;
    use slotmap::SlotMap;

    /// Store that records every write
    #[derive(Default)]
    struct Recorder {
        values: SlotMap<ValueId, Value>,
        writes: Vec<(ValueId, Value)>,
        settled: Vec<(ValueId, Value)>,
    }

    impl ValueStore for Recorder {
        fn read(&self, id: ValueId) -> Option<Value> {
            self.values.get(id).copied()
        }

        fn write(&mut self, id: ValueId, value: Value) {
            if let Some(slot) = self.values.get_mut(id) {
                if *slot != value {
                    *slot = value;
                    self.writes.push((id, value));
                }
            }
        }

        fn settle(&mut self, id: ValueId, value: Value) {
            self.settled.push((id, value));
            self.write(id, value);
        }
    }

    impl Recorder {
        fn float(&self, id: ValueId) -> f32 {
            self.values[id].as_float().unwrap()
        }
    }

    fn run(node: &mut Node, store: &mut Recorder, dt: f32, ticks: usize) {
        for _ in 0..ticks {
            node.advance(dt, store);
        }
    }

    #[test]
    fn test_transition_respects_delay_and_lands_exactly() {
        let mut store = Recorder::default();
        let v = store.values.insert(Value::Float(0.1));
        let combinator: Combinator = Transition::new(v, 0.7, 100.0)
            .delay(50.0)
            .easing(Easing::EaseInOut)
            .into();
        let mut node = Node::build(&combinator);

        node.advance(40.0, &mut store);
        assert_eq!(store.float(v), 0.1);
        assert!(store.writes.is_empty());

        node.advance(60.0, &mut store);
        let mid = store.float(v);
        assert!(mid > 0.1 && mid < 0.7);

        node.advance(50.0, &mut store);
        assert_eq!(store.float(v), 0.7);
        assert_eq!(node.state(), NodeState::Done);
    }

    #[test]
    fn test_sequence_carries_leftover_time() {
        let mut store = Recorder::default();
        let a = store.values.insert(Value::Float(0.0));
        let b = store.values.insert(Value::Float(0.0));
        let combinator = sequence([
            Transition::new(a, 1.0, 100.0).into(),
            Transition::new(b, 1.0, 200.0).into(),
        ]);
        let mut node = Node::build(&combinator);

        node.advance(150.0, &mut store);
        assert_eq!(store.float(a), 1.0);
        assert!((store.float(b) - 0.25).abs() < 1e-6);

        let rest = node.advance(170.0, &mut store);
        assert_eq!(node.state(), NodeState::Done);
        assert_eq!(store.float(b), 1.0);
        assert!((rest - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_sequence_children_do_not_overlap() {
        let mut store = Recorder::default();
        let a = store.values.insert(Value::Float(0.0));
        let b = store.values.insert(Value::Float(0.0));
        let combinator = sequence([
            Transition::new(a, 1.0, 100.0).into(),
            Transition::new(b, 1.0, 100.0).delay(20.0).into(),
        ]);
        let mut node = Node::build(&combinator);

        for _ in 0..10 {
            node.advance(10.0, &mut store);
            assert_eq!(store.float(b), 0.0, "b moved before a finished");
        }
        assert_eq!(store.float(a), 1.0);

        run(&mut node, &mut store, 10.0, 2);
        assert_eq!(store.float(b), 0.0, "b moved during its delay");
        run(&mut node, &mut store, 10.0, 10);
        assert_eq!(node.state(), NodeState::Done);
    }

    #[test]
    fn test_parallel_completes_with_last_child() {
        let mut store = Recorder::default();
        let ids: Vec<_> = (0..3).map(|_| store.values.insert(Value::Float(0.0))).collect();
        let combinator = parallel(
            ids.iter()
                .zip([100.0, 200.0, 300.0])
                .map(|(id, ms)| Transition::new(*id, 1.0, ms).into()),
        );
        let mut node = Node::build(&combinator);

        run(&mut node, &mut store, 50.0, 5);
        assert_eq!(node.state(), NodeState::Running);
        assert_eq!(store.float(ids[0]), 1.0);
        assert_eq!(store.float(ids[1]), 1.0);

        let rest = node.advance(70.0, &mut store);
        assert_eq!(node.state(), NodeState::Done);
        assert!((rest - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_empty_combinators_finish_immediately() {
        let mut store = Recorder::default();
        let mut seq = Node::build(&sequence([]));
        assert_eq!(seq.advance(0.0, &mut store), 0.0);
        assert_eq!(seq.state(), NodeState::Done);

        let mut par = Node::build(&parallel([]));
        assert_eq!(par.advance(16.0, &mut store), 16.0);
        assert_eq!(par.state(), NodeState::Done);
    }

    #[test]
    fn test_loop_resets_body_each_iteration() {
        let mut store = Recorder::default();
        let v = store.values.insert(Value::Float(0.5));
        let combinator = repeat(Transition::new(v, 0.0, 100.0), Iterations::Count(3))
            .reset_each(v, 1.0);
        let mut node = Node::build(&combinator);

        run(&mut node, &mut store, 10.0, 29);
        assert_eq!(node.state(), NodeState::Running);
        node.advance(10.0, &mut store);
        assert_eq!(node.state(), NodeState::Done);
        assert_eq!(store.float(v), 0.0);

        let count = |target: Value| {
            store
                .writes
                .iter()
                .filter(|(id, value)| *id == v && *value == target)
                .count()
        };
        assert_eq!(
            count(Value::Float(1.0)),
            3,
            "reset hook runs before every iteration"
        );
        assert_eq!(
            count(Value::Float(0.0)),
            3,
            "body reaches its target every iteration"
        );

        // Further ticks do nothing once exhausted
        let writes = store.writes.len();
        run(&mut node, &mut store, 10.0, 10);
        assert_eq!(store.writes.len(), writes);
    }

    #[test]
    fn test_zero_length_unbounded_loop_yields() {
        let mut store = Recorder::default();
        let v = store.values.insert(Value::Float(0.0));
        let mut node = Node::build(&repeat(set(v, 1.0), Iterations::Unbounded));

        assert_eq!(node.advance(16.0, &mut store), 0.0);
        assert_eq!(node.state(), NodeState::Running);
        assert_eq!(store.writes.len(), 1);
    }

    #[test]
    fn test_cancel_halts_descendants() {
        let mut store = Recorder::default();
        let v = store.values.insert(Value::Float(0.0));
        let combinator = sequence([delay(10.0), Transition::new(v, 1.0, 100.0).into()]);
        let mut node = Node::build(&combinator);

        node.advance(30.0, &mut store);
        let before = store.float(v);
        assert!(before > 0.0);
        assert_eq!(node.active_leaves(), 1);

        node.cancel();
        node.advance(30.0, &mut store);
        assert_eq!(store.float(v), before);
        assert_eq!(node.state(), NodeState::Cancelled);
        assert_eq!(node.active_leaves(), 0);
    }

    #[test]
    fn test_leaf_endpoints_are_settled() {
        let mut store = Recorder::default();
        let v = store.values.insert(Value::Float(3.0));
        let combinator = repeat(
            sequence([set(v, 2.0), Transition::new(v, 0.0, 10.0).into()]),
            Iterations::Count(2),
        )
        .reset_each(v, 1.0);
        let mut node = Node::build(&combinator);

        node.advance(25.0, &mut store);
        assert_eq!(node.state(), NodeState::Done);

        let settled: Vec<f32> = store
            .settled
            .iter()
            .map(|(_, value)| value.as_float().unwrap())
            .collect();
        assert_eq!(settled, vec![1.0, 2.0, 0.0, 1.0, 2.0, 0.0]);

        // Mid-flight samples are plain writes
        let leaf: Combinator = Transition::new(v, 1.0, 10.0).into();
        let mut node = Node::build(&leaf);
        store.settled.clear();
        node.advance(5.0, &mut store);
        assert!(store.settled.is_empty());
    }
}
