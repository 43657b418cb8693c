//! Interpolation kernels for the automation curves.
//!
//! Each kernel maps a query time between two automation points to a value.
//! Callers guarantee `t0 <= t <= t1` and `t0 < t1`.

use serde::{Deserialize, Serialize};

/// Smallest magnitude an exponential endpoint may have (the smallest
/// positive subnormal `f32`). Below this the ramp degrades to a step.
pub const EXPONENTIAL_FLOOR: f64 = 1.4013e-45;

/// Interpolation shape leading into an automation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    /// Jump to the value at the event's time.
    Step,
    /// Ramp linearly from the previous point.
    Linear,
    /// Ramp exponentially from the previous point.
    Exponential,
    /// Approach the value exponentially from the event's time, with
    /// the event's duration as time constant.
    Target,
}

impl Curve {
    /// Whether the curve shapes the segment *before* its event.
    pub fn is_ramp(self) -> bool {
        matches!(self, Curve::Linear | Curve::Exponential)
    }

    pub fn name(self) -> &'static str {
        match self {
            Curve::Step => "step",
            Curve::Linear => "linear",
            Curve::Exponential => "exponential",
            Curve::Target => "target",
        }
    }

    /// Parse a curve name, also accepting `set` as an alias of `step`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "step" | "set" => Some(Curve::Step),
            "linear" => Some(Curve::Linear),
            "exponential" => Some(Curve::Exponential),
            "target" => Some(Curve::Target),
            _ => None,
        }
    }
}

impl std::fmt::Display for Curve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Linear interpolation between `(t0, v0)` and `(t1, v1)`.
pub fn linear(v0: f64, v1: f64, t0: f64, t1: f64, t: f64) -> f64 {
    v0 + (v1 - v0) * (t - t0) / (t1 - t0)
}

/// Whether an exponential ramp between `v0` and `v1` can be rendered.
///
/// Both endpoints must share a sign and sit above `floor` in magnitude.
pub fn exponential_renderable(v0: f64, v1: f64, floor: f64) -> bool {
    v0.abs() > floor && v1.abs() > floor && (v0 > 0.0) == (v1 > 0.0)
}

/// Exponential interpolation, degrading to a step at `v0` when the
/// endpoints are not renderable.
pub fn exponential(v0: f64, v1: f64, t0: f64, t1: f64, t: f64, floor: f64) -> f64 {
    if !exponential_renderable(v0, v1, floor) {
        return v0;
    }
    v0 * (v1 / v0).powf((t - t0) / (t1 - t0))
}

/// Exponential approach from `prior` toward `value`, starting at `t0`.
pub fn target(prior: f64, value: f64, t0: f64, duration: f64, t: f64) -> f64 {
    if duration <= 0.0 {
        return value;
    }
    value + (prior - value) * (-(t - t0) / duration).exp()
}
