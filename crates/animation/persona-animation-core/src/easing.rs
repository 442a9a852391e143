//! Easing curves and cross-fade weight math.
//!
//! Everything here is a pure function of (elapsed, duration, curve) so the
//! transition state machines can be tested separately from the curves.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    QuadraticIn,
    QuadraticOut,
    QuadraticInOut,
    CubicIn,
    CubicOut,
    CubicInOut,
    SineInOut,
    /// Holds 0 until the transition completes, then jumps to 1.
    Step,
}

impl From<&str> for Easing {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "quadratic_in" | "ease_in" => Self::QuadraticIn,
            "quadratic_out" | "ease_out" => Self::QuadraticOut,
            "quadratic_in_out" | "ease_in_out" => Self::QuadraticInOut,
            "cubic_in" => Self::CubicIn,
            "cubic_out" => Self::CubicOut,
            "cubic_in_out" => Self::CubicInOut,
            "sine_in_out" => Self::SineInOut,
            "step" => Self::Step,
            _ => Self::Linear,
        }
    }
}

impl Easing {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::QuadraticIn => "quadratic_in",
            Self::QuadraticOut => "quadratic_out",
            Self::QuadraticInOut => "quadratic_in_out",
            Self::CubicIn => "cubic_in",
            Self::CubicOut => "cubic_out",
            Self::CubicInOut => "cubic_in_out",
            Self::SineInOut => "sine_in_out",
            Self::Step => "step",
        }
    }

    #[inline]
    pub fn apply(self, t: f32) -> f32 {
        ease(self, t)
    }
}

/// Map normalized progress `t` through `easing`. Input is clamped to [0,1].
pub fn ease(easing: Easing, t: f32) -> f32 {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    match easing {
        Easing::Linear => t,
        Easing::QuadraticIn => t * t,
        Easing::QuadraticOut => t * (2.0 - t),
        Easing::QuadraticInOut => {
            if t < 0.5 {
                2.0 * t * t
            } else {
                let u = 1.0 - t;
                1.0 - 2.0 * u * u
            }
        }
        Easing::CubicIn => t * t * t,
        Easing::CubicOut => {
            let u = 1.0 - t;
            1.0 - u * u * u
        }
        Easing::CubicInOut => {
            if t < 0.5 {
                4.0 * t * t * t
            } else {
                let u = 1.0 - t;
                1.0 - 4.0 * u * u * u
            }
        }
        Easing::SineInOut => 0.5 - 0.5 * (std::f32::consts::PI * t).cos(),
        Easing::Step => {
            if t >= 1.0 {
                1.0
            } else {
                0.0
            }
        }
    }
}

/// Ratios this close to 1 count as complete. Elapsed time is a running f32
/// sum of frame deltas and can land a few ulps short of the duration.
const COMPLETION_TOLERANCE: f32 = 1e-5;

/// Elapsed / duration clamped to [0,1]. Zero or invalid durations complete at once.
#[inline]
pub fn transition_ratio(elapsed: f32, duration: f32) -> f32 {
    if !duration.is_finite() || duration <= 0.0 {
        return 1.0;
    }
    let ratio = elapsed / duration;
    if ratio >= 1.0 - COMPLETION_TOLERANCE {
        return 1.0;
    }
    ratio.clamp(0.0, 1.0)
}

/// Eased blend weight for a cross-fade `elapsed` seconds into `duration`.
#[inline]
pub fn blend_weight(elapsed: f32, duration: f32, easing: Easing) -> f32 {
    ease(easing, transition_ratio(elapsed, duration))
}
