use serde::{Deserialize, Serialize};

/// Post-reduction unit transform applied to a layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rescale {
    /// Leave values as reduced
    #[default]
    Identity,
    /// `value * scale + offset`
    Linear { scale: f64, offset: f64 },
    /// `(value - lo) / (hi - lo)` clamped to [0, 1]
    UnitInterval { lo: f64, hi: f64 },
}

impl Rescale {
    pub fn linear(scale: f64, offset: f64) -> Self {
        Rescale::Linear { scale, offset }
    }

    pub fn unit_interval(lo: f64, hi: f64) -> Self {
        Rescale::UnitInterval { lo, hi }
    }

    /// Evaluate the transform on one pixel value
    pub fn apply(&self, value: f64) -> f64 {
        match *self {
            Rescale::Identity => value,
            Rescale::Linear { scale, offset } => value * scale + offset,
            Rescale::UnitInterval { lo, hi } => unit_scale(value, lo, hi),
        }
    }

    /// Check the transform parameters, returning a human readable reason on failure
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Rescale::Identity => Ok(()),
            Rescale::Linear { scale, offset } => {
                if scale.is_finite() && offset.is_finite() {
                    Ok(())
                } else {
                    Err(format!("linear rescale needs finite parameters, got {scale} and {offset}"))
                }
            }
            Rescale::UnitInterval { lo, hi } => {
                if lo.is_finite() && hi.is_finite() && lo < hi {
                    Ok(())
                } else {
                    Err(format!("unit-interval rescale needs lo < hi, got [{lo}, {hi}]"))
                }
            }
        }
    }
}

/// Normalise `value` to [0, 1] over `[lo, hi]`
pub fn unit_scale(value: f64, lo: f64, hi: f64) -> f64 {
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_kelvin_to_celsius() {
        // MODIS LST digital number to degrees Celsius
        let heat = Rescale::linear(0.02, -273.15);
        assert_relative_eq!(heat.apply(15000.0), 26.85, epsilon = 1e-9);
    }

    #[test]
    fn test_unit_interval_clamps() {
        let rain = Rescale::unit_interval(0.0, 2000.0);
        assert_eq!(rain.apply(1000.0), 0.5);
        assert_eq!(rain.apply(-5.0), 0.0);
        assert_eq!(rain.apply(4000.0), 1.0);
    }

    #[test]
    fn test_negated_elevation_range() {
        // 1500 m elevation, negated, over [-2000, -1000]
        assert_eq!(unit_scale(-1500.0, -2000.0, -1000.0), 0.5);
    }

    #[test]
    fn test_validate() {
        assert!(Rescale::Identity.validate().is_ok());
        assert!(Rescale::unit_interval(1.0, 1.0).validate().is_err());
        assert!(Rescale::linear(f64::NAN, 0.0).validate().is_err());
    }
}
