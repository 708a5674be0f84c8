//! Response curves for normalized controller values

use serde::{Deserialize, Serialize};

/// Response curve applied to normalized gesture values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveType {
    /// Identity
    #[default]
    Linear,
    /// x², more precision at the low end
    Exponential,
    /// √x, reaches high values quickly
    Logarithmic,
}

/// Shape a normalized value through the selected curve
///
/// Input is clamped to [0, 1] first, so the result is always in [0, 1].
/// NaN is treated as 0.
pub fn shape(x: f32, curve: CurveType) -> f32 {
    let x = if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };

    match curve {
        CurveType::Linear => x,
        CurveType::Exponential => x * x,
        CurveType::Logarithmic => x.sqrt(),
    }
}

/// Convert a normalized value to a 7-bit controller value (truncating)
pub fn to_7bit(normalized: f32) -> u8 {
    (shape(normalized, CurveType::Linear) * 127.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [CurveType; 3] = [CurveType::Linear, CurveType::Exponential, CurveType::Logarithmic];

    #[test]
    fn test_endpoints_fixed_for_all_curves() {
        for curve in ALL {
            assert_eq!(shape(0.0, curve), 0.0);
            assert_eq!(shape(1.0, curve), 1.0);
        }
    }

    #[test]
    fn test_midpoints() {
        assert_eq!(shape(0.5, CurveType::Linear), 0.5);
        assert_eq!(shape(0.5, CurveType::Exponential), 0.25);
        assert!((shape(0.5, CurveType::Logarithmic) - 0.7071).abs() < 1e-4);
    }

    #[test]
    fn test_input_clamped() {
        assert_eq!(shape(-3.0, CurveType::Logarithmic), 0.0);
        assert_eq!(shape(7.5, CurveType::Exponential), 1.0);
        assert_eq!(shape(f32::NAN, CurveType::Linear), 0.0);
    }

    #[test]
    fn test_to_7bit() {
        assert_eq!(to_7bit(0.0), 0);
        assert_eq!(to_7bit(1.0), 127);
        assert_eq!(to_7bit(0.5), 63);
    }

    proptest! {
        #[test]
        fn prop_output_in_unit_range(x in -10.0f32..10.0, idx in 0usize..3) {
            let y = shape(x, ALL[idx]);
            prop_assert!((0.0..=1.0).contains(&y));
        }

        #[test]
        fn prop_monotonic(a in 0.0f32..=1.0, b in 0.0f32..=1.0, idx in 0usize..3) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(shape(lo, ALL[idx]) <= shape(hi, ALL[idx]));
        }
    }
}
