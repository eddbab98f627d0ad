//! Fade curve implementations for gain ramps
//!
//! A curve maps normalized fade progress `t` in [0.0, 1.0] to ramp progress
//! in [0.0, 1.0]. The gain at `t` is `from + (to - from) * curve(t)`, so the
//! same curve serves fade-ins and fade-outs. Every curve is monotonic and
//! satisfies `curve(0) == 0`, `curve(1) == 1`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};
use std::str::FromStr;

/// Fade curve types
///
/// - Linear: constant rate of change (default)
/// - Exponential: slow start, fast finish
/// - SCurve: smooth acceleration and deceleration
/// - EqualPower: fast start, gentle finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// v(t) = t
    #[default]
    Linear,

    /// v(t) = t²
    Exponential,

    /// v(t) = 0.5 × (1 - cos(π × t))
    SCurve,

    /// v(t) = sin(t × π/2)
    EqualPower,
}

impl FadeCurve {
    /// Ramp progress for normalized position `t` (clamped to [0, 1])
    pub fn progress(&self, t: f32) -> f32 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };

        match self {
            FadeCurve::Linear => t,
            FadeCurve::Exponential => t * t,
            FadeCurve::SCurve => 0.5 * (1.0 - (PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin(),
        }
    }

    /// Gain between `from` and `to` at normalized position `t`
    ///
    /// Returns exactly `to` once `t >= 1.0`, so completion never lands on a
    /// floating-point approximation of the target.
    pub fn interpolate(&self, from: f32, to: f32, t: f32) -> f32 {
        if t >= 1.0 {
            return to;
        }
        from + (to - from) * self.progress(t)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "linear",
            FadeCurve::Exponential => "exponential",
            FadeCurve::SCurve => "s_curve",
            FadeCurve::EqualPower => "equal_power",
        }
    }
}

impl FromStr for FadeCurve {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(FadeCurve::Linear),
            "exponential" => Ok(FadeCurve::Exponential),
            "s_curve" | "scurve" | "cosine" => Ok(FadeCurve::SCurve),
            "equal_power" | "equalpower" => Ok(FadeCurve::EqualPower),
            other => Err(Error::InvalidInput(format!("Unknown fade curve: {}", other))),
        }
    }
}
