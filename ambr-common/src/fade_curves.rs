//! Gain curves for soundscape crossfades
//!
//! Curves map normalized ramp progress `t` in [0, 1] to a normalized gain.
//! A ramp always interpolates between the gain a source had when the ramp
//! started and its target, so a ramp that is restarted mid-fade continues
//! from the current level instead of jumping.

use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

/// Crossfade curve shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// v(t) = t
    #[default]
    Linear,
    /// v(t) = 0.5 × (1 - cos(π × t))
    SCurve,
    /// v(t) = sin(t × π/2); constant perceived loudness across a crossfade
    EqualPower,
}

impl FadeCurve {
    /// Shape value for progress `t`, rising from 0.0 to 1.0
    pub fn shape(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => t,
            FadeCurve::SCurve => 0.5 * (1.0 - (PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin(),
        }
    }

    /// Gain at progress `t` of a ramp from `from` to `to`
    pub fn interpolate(&self, from: f32, to: f32, t: f32) -> f32 {
        from + (to - from) * self.shape(t)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "linear" => Some(FadeCurve::Linear),
            "s_curve" | "scurve" | "cosine" => Some(FadeCurve::SCurve),
            "equal_power" | "equalpower" => Some(FadeCurve::EqualPower),
            _ => None,
        }
    }

    pub fn all_variants() -> &'static [FadeCurve] {
        &[FadeCurve::Linear, FadeCurve::SCurve, FadeCurve::EqualPower]
    }
}

impl std::fmt::Display for FadeCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FadeCurve::Linear => "Linear",
            FadeCurve::SCurve => "S-Curve",
            FadeCurve::EqualPower => "Equal Power",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_bounds() {
        for curve in FadeCurve::all_variants() {
            assert!(curve.shape(0.0).abs() < 0.001, "{:?} at 0", curve);
            assert!((curve.shape(1.0) - 1.0).abs() < 0.001, "{:?} at 1", curve);
            // Out-of-range progress is clamped
            assert!((curve.shape(2.0) - 1.0).abs() < 0.001);
        }
    }

    #[test]
    fn test_linear_midpoint() {
        assert!((FadeCurve::Linear.interpolate(0.0, 0.8, 0.5) - 0.4).abs() < 0.001);
        assert!((FadeCurve::Linear.interpolate(0.8, 0.0, 0.5) - 0.4).abs() < 0.001);
    }

    #[test]
    fn test_interpolate_from_partial_level() {
        // Fade-out restarted from 0.6 ends at 0
        let curve = FadeCurve::Linear;
        assert!((curve.interpolate(0.6, 0.0, 0.0) - 0.6).abs() < 0.001);
        assert!(curve.interpolate(0.6, 0.0, 1.0).abs() < 0.001);
    }

    #[test]
    fn test_parse() {
        assert_eq!(FadeCurve::parse("LINEAR"), Some(FadeCurve::Linear));
        assert_eq!(FadeCurve::parse("cosine"), Some(FadeCurve::SCurve));
        assert_eq!(FadeCurve::parse("equal_power"), Some(FadeCurve::EqualPower));
        assert_eq!(FadeCurve::parse("bogus"), None);
        assert_eq!(FadeCurve::default(), FadeCurve::Linear);
    }
}
