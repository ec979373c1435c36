//! Effective sample-count weights for combining amplitude statistics
//!
//! Images are ordered oldest to newest. The weight `N_i` is the number of
//! samples image `i` is treated as contributing to the combined statistics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Exponential decay rate per image
const EXPONENTIAL_ALPHA: f64 = 0.5;

/// Weighted combination of older and current amplitude statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightScheme {
    /// `N_i = num_slc * i / (n - 1)`: oldest 0, newest `num_slc`
    Linear,
    /// `N_i = num_slc` for every image
    Equal,
    /// `N_i = round(exp(a*i) / exp(a*(n-1)))`: newest 1
    #[default]
    Exponential,
}

impl WeightScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightScheme::Linear => "linear",
            WeightScheme::Equal => "equal",
            WeightScheme::Exponential => "exponential",
        }
    }

    /// Weights for `num_images` images, the newest of which holds `num_slc`
    /// real acquisitions.
    ///
    /// A single image under `Linear` takes the full `num_slc`, not the 0 a
    /// one-point linspace would give; a zero total weight leaves the combined
    /// statistics undefined.
    pub fn weights(&self, num_images: usize, num_slc: usize) -> Vec<f64> {
        let num_slc = num_slc as f64;
        match self {
            WeightScheme::Linear => {
                if num_images <= 1 {
                    return vec![num_slc; num_images];
                }
                let last = (num_images - 1) as f64;
                (0..num_images)
                    .map(|i| num_slc * i as f64 / last)
                    .collect()
            }
            WeightScheme::Equal => vec![num_slc; num_images],
            WeightScheme::Exponential => exponential_normalized(num_images)
                .into_iter()
                .map(f64::round)
                .collect(),
        }
    }
}

/// Exponential recency weights before rounding; the newest is exactly 1.
pub fn exponential_normalized(num_images: usize) -> Vec<f64> {
    let Some(last) = num_images.checked_sub(1) else {
        return Vec::new();
    };
    (0..num_images)
        .map(|i| (EXPONENTIAL_ALPHA * (i as f64 - last as f64)).exp())
        .collect()
}

impl fmt::Display for WeightScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeightScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(WeightScheme::Linear),
            "equal" => Ok(WeightScheme::Equal),
            "exponential" => Ok(WeightScheme::Exponential),
            other => Err(Error::UnknownWeightScheme(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_endpoints() {
        let w = WeightScheme::Linear.weights(5, 12);
        assert_eq!(w, vec![0.0, 3.0, 6.0, 9.0, 12.0]);
    }

    #[test]
    fn test_linear_single_image() {
        assert_eq!(WeightScheme::Linear.weights(1, 7), vec![7.0]);
    }

    #[test]
    fn test_equal() {
        assert_eq!(WeightScheme::Equal.weights(3, 10), vec![10.0, 10.0, 10.0]);
    }

    #[test]
    fn test_exponential_newest_is_one_before_rounding() {
        for n in 1..10 {
            let raw = exponential_normalized(n);
            assert_eq!(raw.len(), n);
            assert!((raw[n - 1] - 1.0).abs() < 1e-12);
            assert!(raw.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_exponential_rounds_old_images_to_zero() {
        // exp(-0.5) ~ 0.61 rounds up; exp(-1.0) ~ 0.37 rounds down
        let w = WeightScheme::Exponential.weights(4, 20);
        assert_eq!(w, vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_exponential_ignores_num_slc() {
        assert_eq!(
            WeightScheme::Exponential.weights(3, 1),
            WeightScheme::Exponential.weights(3, 100)
        );
    }

    #[test]
    fn test_from_str() {
        assert_eq!("EQUAL".parse::<WeightScheme>().unwrap(), WeightScheme::Equal);
        assert!(matches!(
            "quadratic".parse::<WeightScheme>(),
            Err(Error::UnknownWeightScheme(_))
        ));
    }
}
