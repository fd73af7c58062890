//! Easing curves
//!
//! Every curve maps normalized elapsed time in `[0, 1]` to normalized
//! progress with `f(0) = 0` and `f(1) = 1`. Between the endpoints some curves
//! leave the unit range (`Back`, `Elastic`) to produce overshoot.

use crate::error::{AnimationError, Result};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

const BACK_OVERSHOOT: f32 = 1.70158;
const BEZIER_NEWTON_ITERATIONS: usize = 8;
const BEZIER_EPSILON: f32 = 1e-6;

/// An easing curve
///
/// Unit variants serialize as snake_case strings (`"ease_in_out"`),
/// parameterized ones as single-key tables (`{ steps = 4 }`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    /// CSS `ease-in`, cubic-bezier(0.42, 0, 1, 1)
    EaseIn,
    /// CSS `ease-out`, cubic-bezier(0, 0, 0.58, 1)
    EaseOut,
    /// CSS `ease-in-out`, cubic-bezier(0.42, 0, 0.58, 1)
    EaseInOut,
    EaseInQuad,
    EaseOutQuad,
    EaseInOutQuad,
    EaseInCubic,
    EaseOutCubic,
    EaseInOutCubic,
    /// Pulls back below zero before moving forward
    Back,
    /// Springy oscillation that settles on the target
    Elastic,
    /// Bounces against the target like a dropped ball
    Bounce,
    /// Arbitrary cubic-bezier with control points (x1, y1, x2, y2)
    CubicBezier(f32, f32, f32, f32),
    /// Discrete jumps: `n` equal steps, landing exactly on each step
    Steps(u32),
}

impl Easing {
    /// Apply easing to a normalized time value
    pub fn apply(&self, t: f32) -> f32 {
        if t.is_nan() || t <= 0.0 {
            return 0.0;
        }
        if t >= 1.0 {
            return 1.0;
        }

        match *self {
            Easing::Linear => t,
            Easing::EaseIn => cubic_bezier(0.42, 0.0, 1.0, 1.0, t),
            Easing::EaseOut => cubic_bezier(0.0, 0.0, 0.58, 1.0, t),
            Easing::EaseInOut => cubic_bezier(0.42, 0.0, 0.58, 1.0, t),
            Easing::EaseInQuad => t * t,
            Easing::EaseOutQuad => t * (2.0 - t),
            Easing::EaseInOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Easing::EaseInCubic => t * t * t,
            Easing::EaseOutCubic => {
                let t = t - 1.0;
                t * t * t + 1.0
            }
            Easing::EaseInOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Easing::Back => t * t * ((BACK_OVERSHOOT + 1.0) * t - BACK_OVERSHOOT),
            Easing::Elastic => 1.0 - (t * PI / 2.0).cos().powi(3) * (t * PI).cos(),
            Easing::Bounce => bounce(t),
            Easing::CubicBezier(x1, y1, x2, y2) => cubic_bezier(x1, y1, x2, y2, t),
            Easing::Steps(n) => {
                let n = n.max(1) as f32;
                (t * n).floor() / n
            }
        }
    }

    /// Check that the curve is well formed
    ///
    /// Cubic-bezier x coordinates must stay in `[0, 1]` so time stays
    /// monotonic, and step counts must be positive.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Easing::CubicBezier(x1, y1, x2, y2) => {
                if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
                    return Err(AnimationError::InvalidEasing {
                        easing: *self,
                        reason: "control points must be finite",
                    });
                }
                if !(0.0..=1.0).contains(&x1) || !(0.0..=1.0).contains(&x2) {
                    return Err(AnimationError::InvalidEasing {
                        easing: *self,
                        reason: "control point x coordinates must lie in [0, 1]",
                    });
                }
                Ok(())
            }
            Easing::Steps(0) => Err(AnimationError::InvalidEasing {
                easing: *self,
                reason: "step count must be at least 1",
            }),
            _ => Ok(()),
        }
    }

    /// Whether the curve leaves `[0, 1]` between its endpoints
    pub fn overshoots(&self) -> bool {
        match *self {
            Easing::Back | Easing::Elastic => true,
            Easing::CubicBezier(_, y1, _, y2) => {
                !(0.0..=1.0).contains(&y1) || !(0.0..=1.0).contains(&y2)
            }
            _ => false,
        }
    }
}

fn bounce(t: f32) -> f32 {
    const N: f32 = 7.5625;
    const D: f32 = 2.75;

    if t < 1.0 / D {
        N * t * t
    } else if t < 2.0 / D {
        let t = t - 1.5 / D;
        N * t * t + 0.75
    } else if t < 2.5 / D {
        let t = t - 2.25 / D;
        N * t * t + 0.9375
    } else {
        let t = t - 2.625 / D;
        N * t * t + 0.984375
    }
}

/// Evaluate a unit cubic-bezier at time `t`
///
/// Solves x(u) = t with Newton's method, falling back to bisection when the
/// slope is too flat, then returns y(u).
fn cubic_bezier(x1: f32, y1: f32, x2: f32, y2: f32, t: f32) -> f32 {
    let sample = |a1: f32, a2: f32, u: f32| {
        let inv = 1.0 - u;
        3.0 * inv * inv * u * a1 + 3.0 * inv * u * u * a2 + u * u * u
    };
    let slope = |a1: f32, a2: f32, u: f32| {
        let inv = 1.0 - u;
        3.0 * inv * inv * a1 + 6.0 * inv * u * (a2 - a1) + 3.0 * u * u * (1.0 - a2)
    };

    let mut u = t;
    for _ in 0..BEZIER_NEWTON_ITERATIONS {
        let err = sample(x1, x2, u) - t;
        if err.abs() < BEZIER_EPSILON {
            return sample(y1, y2, u);
        }
        let d = slope(x1, x2, u);
        if d.abs() < BEZIER_EPSILON {
            break;
        }
        u -= err / d;
        if !(0.0..=1.0).contains(&u) {
            break;
        }
    }

    let (mut lo, mut hi) = (0.0_f32, 1.0_f32);
    u = t;
    for _ in 0..32 {
        let x = sample(x1, x2, u);
        if (x - t).abs() < BEZIER_EPSILON {
            break;
        }
        if x < t {
            lo = u;
        } else {
            hi = u;
        }
        u = (lo + hi) / 2.0;
    }
    sample(y1, y2, u)
}
