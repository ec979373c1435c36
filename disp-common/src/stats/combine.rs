//! Weighted recombination of amplitude mean and dispersion
//!
//! Each image `i` summarizes `N_i` samples with mean `m_i` and dispersion
//! `d_i = s_i / m_i`. The combined statistics are those of the pooled
//! samples:
//!
//! ```text
//! N   = sum(N_i)
//! m   = sum(N_i * m_i) / N
//! s^2 = sum(N_i * ((d_i * m_i)^2 + (m_i - m)^2)) / N
//! d   = s / m
//! ```
//!
//! Pixels with no weight at all come out as NaN before cleanup, and are
//! written as 0.

use ndarray::{Array2, ArrayView3, Axis};

use crate::{Error, Result};

/// Combine `(num_images, rows, cols)` stacks of dispersions and means.
///
/// Returns `(dispersion, mean)` with non-finite values cleaned up.
pub fn combine_amplitude_dispersions(
    dispersions: ArrayView3<'_, f32>,
    means: ArrayView3<'_, f32>,
    weights: &[f64],
) -> Result<(Array2<f32>, Array2<f32>)> {
    if dispersions.shape() != means.shape() {
        return Err(Error::RasterMismatch(format!(
            "dispersion stack {:?} and mean stack {:?} differ in shape",
            dispersions.shape(),
            means.shape()
        )));
    }
    let num_images = dispersions.len_of(Axis(0));
    if num_images != weights.len() {
        return Err(Error::RasterMismatch(format!(
            "{} images but {} weights",
            num_images,
            weights.len()
        )));
    }

    let (_, rows, cols) = dispersions.dim();
    let total: f64 = weights.iter().sum();
    let mut out_dispersion = Array2::<f32>::zeros((rows, cols));
    let mut out_mean = Array2::<f32>::zeros((rows, cols));

    for r in 0..rows {
        for c in 0..cols {
            let mut weighted_sum = 0.0f64;
            for (i, w) in weights.iter().enumerate() {
                weighted_sum += w * means[[i, r, c]] as f64;
            }
            let mean = weighted_sum / total;

            let mut spread = 0.0f64;
            for (i, w) in weights.iter().enumerate() {
                let m_i = means[[i, r, c]] as f64;
                let s_i = dispersions[[i, r, c]] as f64 * m_i;
                spread += w * (s_i * s_i + (m_i - mean) * (m_i - mean));
            }
            let std = (spread / total).sqrt();

            out_mean[[r, c]] = nan_to_num(mean);
            out_dispersion[[r, c]] = nan_to_num(std / mean);
        }
    }

    Ok((out_dispersion, out_mean))
}

/// NaN becomes 0; infinities clamp to the largest finite `f32`.
pub fn nan_to_num(value: f64) -> f32 {
    if value.is_nan() {
        0.0
    } else if value == f64::INFINITY {
        f32::MAX
    } else if value == f64::NEG_INFINITY {
        f32::MIN
    } else {
        value as f32
    }
}
