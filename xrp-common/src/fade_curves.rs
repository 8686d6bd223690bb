//! Fade curve implementations for volume ramps
//!
//! The seek fade guard ramps the output volume down before a seek and back up
//! after it. Each curve maps normalized fade progress (0.0 to 1.0) to a gain
//! multiplier.

use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;

/// Fade curve types
///
/// - Linear: constant rate of change
/// - Exponential: slow start, fast finish, `x^2` (default fade-in)
/// - Logarithmic: fast start, slow finish, `(1-x)^2` on fade-out (default fade-out)
/// - SCurve: smooth acceleration and deceleration
/// - EqualPower: constant perceived loudness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// v(t) = t
    Linear,

    /// v(t) = t²
    Exponential,

    /// v(t) = (1-t)² when fading out
    Logarithmic,

    /// v(t) = 0.5 × (1 - cos(π × t))
    #[serde(alias = "cosine")]
    SCurve,

    /// v(t) = sin(t × π/2)
    EqualPower,
}

impl FadeCurve {
    /// Gain multiplier for a fade-in at `position` (0.0 = silence, 1.0 = full)
    pub fn calculate_fade_in(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => t,
            FadeCurve::Exponential => t * t,
            // Inverse of the quadratic fade-out shape
            FadeCurve::Logarithmic => t.sqrt(),
            FadeCurve::SCurve => 0.5 * (1.0 - (std::f32::consts::PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin(),
        }
    }

    /// Gain multiplier for a fade-out at `position` (1.0 at start, 0.0 at end)
    pub fn calculate_fade_out(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => 1.0 - t,
            FadeCurve::Exponential | FadeCurve::Logarithmic => {
                let inv = 1.0 - t;
                inv * inv
            }
            FadeCurve::SCurve => 0.5 * (1.0 + (std::f32::consts::PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).cos(),
        }
    }

    /// Parse curve from a configuration string
    ///
    /// Case-insensitive; accepts 'cosine', 's_curve', 'scurve' and 's-curve'
    /// for the S-curve and 'equalpower' for equal power.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "linear" => Some(FadeCurve::Linear),
            "exponential" => Some(FadeCurve::Exponential),
            "logarithmic" => Some(FadeCurve::Logarithmic),
            "cosine" | "scurve" | "s-curve" | "s_curve" => Some(FadeCurve::SCurve),
            "equal_power" | "equalpower" => Some(FadeCurve::EqualPower),
            _ => None,
        }
    }

    /// Get human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "Linear",
            FadeCurve::Exponential => "Exponential",
            FadeCurve::Logarithmic => "Logarithmic",
            FadeCurve::SCurve => "S-Curve",
            FadeCurve::EqualPower => "Equal Power",
        }
    }

    /// Get all available fade curve variants
    pub fn all_variants() -> &'static [FadeCurve] {
        &[
            FadeCurve::Linear,
            FadeCurve::Exponential,
            FadeCurve::Logarithmic,
            FadeCurve::SCurve,
            FadeCurve::EqualPower,
        ]
    }
}

impl std::fmt::Display for FadeCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_in_bounds() {
        for curve in FadeCurve::all_variants() {
            let start_val = curve.calculate_fade_in(0.0);
            let end_val = curve.calculate_fade_in(1.0);
            assert!(
                start_val.abs() < 0.01,
                "{:?} fade-in at 0.0 should be ~0.0, got {}",
                curve,
                start_val
            );
            assert!(
                (end_val - 1.0).abs() < 0.01,
                "{:?} fade-in at 1.0 should be ~1.0, got {}",
                curve,
                end_val
            );
        }
    }

    #[test]
    fn test_fade_out_bounds() {
        for curve in FadeCurve::all_variants() {
            let start_val = curve.calculate_fade_out(0.0);
            let end_val = curve.calculate_fade_out(1.0);
            assert!((start_val - 1.0).abs() < 0.01, "{:?} fade-out start {}", curve, start_val);
            assert!(end_val.abs() < 0.01, "{:?} fade-out end {}", curve, end_val);
        }
    }

    #[test]
    fn test_seek_guard_shapes() {
        // Seek fade-out follows (1-x)^2, fade-in follows x^2
        assert!((FadeCurve::Logarithmic.calculate_fade_out(0.5) - 0.25).abs() < 1e-6);
        assert!((FadeCurve::Exponential.calculate_fade_in(0.5) - 0.25).abs() < 1e-6);
        assert!((FadeCurve::Exponential.calculate_fade_in(0.1) - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_position_is_clamped() {
        assert_eq!(FadeCurve::Linear.calculate_fade_in(-1.0), 0.0);
        assert_eq!(FadeCurve::Linear.calculate_fade_in(2.0), 1.0);
        assert_eq!(FadeCurve::Linear.calculate_fade_out(2.0), 0.0);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(FadeCurve::from_str("cosine"), Some(FadeCurve::SCurve));
        assert_eq!(FadeCurve::from_str("s-curve"), Some(FadeCurve::SCurve));
        assert_eq!(FadeCurve::from_str("equalpower"), Some(FadeCurve::EqualPower));
        assert_eq!(FadeCurve::from_str("EXPONENTIAL"), Some(FadeCurve::Exponential));
        assert_eq!(FadeCurve::from_str("invalid"), None);
    }

    #[test]
    fn test_serde_names() {
        #[derive(Deserialize)]
        struct Holder {
            curve: FadeCurve,
        }
        let holder: Holder = toml::from_str("curve = \"equal_power\"").unwrap();
        assert_eq!(holder.curve, FadeCurve::EqualPower);
        let holder: Holder = toml::from_str("curve = \"cosine\"").unwrap();
        assert_eq!(holder.curve, FadeCurve::SCurve);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", FadeCurve::Linear), "Linear");
        assert_eq!(format!("{}", FadeCurve::EqualPower), "Equal Power");
    }
}
