//! Reduction of a flattened tensor into a fixed-size plotting sample.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SummaryError};
use crate::kde::{BandwidthRule, GaussianKde};

/// How a tensor is reduced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReduceMode {
    /// First `sample_len` values in row-major order, density 1.
    #[default]
    Truncate,
    /// `sample_len` draws from a Gaussian KDE with their densities.
    Kde,
}

/// Parameters of a single reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReduceOptions {
    /// Reduction mode.
    pub mode: ReduceMode,
    /// Maximum number of output rows.
    pub sample_len: usize,
    /// RNG seed for KDE resampling.
    pub seed: u64,
    /// KDE bandwidth rule.
    pub bandwidth: BandwidthRule,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            mode: ReduceMode::Truncate,
            sample_len: 200,
            seed: 31,
            bandwidth: BandwidthRule::Scott,
        }
    }
}

/// Representative values of one (leaf, metric) with their densities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReducedSample {
    /// Sample values.
    pub values: Vec<f32>,
    /// Density at each value; all 1 in truncate mode.
    pub densities: Vec<f32>,
}

impl ReducedSample {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the source tensor was empty (truncate mode only).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(value, density)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.values.iter().copied().zip(self.densities.iter().copied())
    }
}

/// Reduce a row-major flattened tensor.
///
/// In truncate mode a tensor shorter than `sample_len` yields
/// `min(sample_len, len)` rows: nothing is padded and no error is raised.
/// Truncation keeps the leading values only, which may not represent the
/// whole distribution.
///
/// In KDE mode every value contributes to the fit and exactly `sample_len`
/// rows are returned. A fresh [`ChaCha8Rng`] is seeded per call, so results do
/// not depend on how reductions are scheduled.
///
/// # Errors
///
/// KDE mode returns [`SummaryError::DegenerateDistribution`] for tensors
/// with fewer than two values or zero variance, and when the spread is so
/// narrow that a density does not fit in an `f32`.
///
/// # Example
///
/// ```rust
/// use param_summary_rs::reducer::{reduce, ReduceMode, ReduceOptions};
///
/// # fn main() -> param_summary_rs::Result<()> {
/// let bias = [0.1, 0.2];
/// let sample = reduce(&bias, &ReduceOptions::default())?;
/// assert_eq!(sample.values, vec![0.1, 0.2]);
/// assert_eq!(sample.densities, vec![1.0, 1.0]);
///
/// let options = ReduceOptions { mode: ReduceMode::Kde, sample_len: 50, ..Default::default() };
/// let sample = reduce(&bias, &options)?;
/// assert_eq!(sample.len(), 50);
/// # Ok(())
/// # }
/// ```
pub fn reduce(values: &[f32], options: &ReduceOptions) -> Result<ReducedSample> {
    match options.mode {
        ReduceMode::Truncate => {
            let values: Vec<f32> = values.iter().take(options.sample_len).copied().collect();
            let densities = vec![1.0; values.len()];
            Ok(ReducedSample { values, densities })
        }
        ReduceMode::Kde => {
            let kde = GaussianKde::fit(values, options.bandwidth)?;
            let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
            let draws = kde.resample(options.sample_len, &mut rng);
            let densities: Vec<f32> = draws.iter().map(|&x| kde.evaluate(x) as f32).collect();
            let values: Vec<f32> = draws.into_iter().map(|x| x as f32).collect();
            if densities.iter().chain(&values).any(|v| !v.is_finite()) {
                return Err(SummaryError::DegenerateDistribution(format!(
                    "bandwidth {:e} gives densities outside the f32 range",
                    kde.bandwidth()
                )));
            }
            Ok(ReducedSample { values, densities })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kde_options(sample_len: usize) -> ReduceOptions {
        ReduceOptions {
            mode: ReduceMode::Kde,
            sample_len,
            ..Default::default()
        }
    }

    #[test]
    fn test_truncate_takes_leading_values() {
        let values: Vec<f32> = (0..500).map(|i| i as f32).collect();
        let sample = reduce(&values, &ReduceOptions::default()).unwrap();
        assert_eq!(sample.len(), 200);
        assert_eq!(sample.values[..3], [0.0, 1.0, 2.0]);
        assert_eq!(sample.values[199], 199.0);
        assert!(sample.densities.iter().all(|&d| d == 1.0));
    }

    #[test]
    fn test_truncate_short_tensor_is_not_padded() {
        for len in [0, 1, 7, 199, 200, 201] {
            let values = vec![0.5f32; len];
            let sample = reduce(&values, &ReduceOptions::default()).unwrap();
            assert_eq!(sample.len(), len.min(200));
            assert_eq!(sample.densities.len(), sample.len());
        }
    }

    #[test]
    fn test_truncate_accepts_constant_tensor() {
        let sample = reduce(&[0.0; 10], &ReduceOptions::default()).unwrap();
        assert_eq!(sample.len(), 10);
    }

    #[test]
    fn test_kde_returns_exact_count() {
        let values: Vec<f32> = (0..1000).map(|i| ((i * 7919) % 1000) as f32 / 1000.0).collect();
        for sample_len in [1, 10, 200, 2000] {
            let sample = reduce(&values, &kde_options(sample_len)).unwrap();
            assert_eq!(sample.len(), sample_len);
            assert!(sample.densities.iter().all(|&d| d.is_finite() && d >= 0.0));
        }
    }

    #[test]
    fn test_kde_is_deterministic() {
        let values: Vec<f32> = (0..64).map(|i| (i as f32).cos()).collect();
        let a = reduce(&values, &kde_options(200)).unwrap();
        let b = reduce(&values, &kde_options(200)).unwrap();
        assert_eq!(a, b);

        let other_seed = ReduceOptions {
            seed: 7,
            ..kde_options(200)
        };
        assert_ne!(a, reduce(&values, &other_seed).unwrap());
    }

    #[test]
    fn test_kde_uses_full_population() {
        // The leading 200 values are constant; only the tail varies.
        let mut values = vec![1.0f32; 200];
        values.extend((0..200).map(|i| i as f32));
        let sample = reduce(&values, &kde_options(200)).unwrap();
        assert_eq!(sample.len(), 200);
    }

    #[test]
    fn test_kde_degenerate() {
        let result = reduce(&[0.25; 32], &kde_options(200));
        assert!(matches!(
            result,
            Err(SummaryError::DegenerateDistribution(_))
        ));
    }

    #[test]
    fn test_kde_density_overflow_is_degenerate() {
        let result = reduce(&[0.0, 1e-44, 2e-44, 0.0], &kde_options(5));
        assert!(matches!(
            result,
            Err(SummaryError::DegenerateDistribution(_))
        ));
    }

    #[test]
    fn test_kde_narrow_but_representable_spread() {
        let values: Vec<f32> = (0..32).map(|i| 1.0 + i as f32 * 1e-6).collect();
        let sample = reduce(&values, &kde_options(20)).unwrap();
        assert!(sample.densities.iter().all(|d| d.is_finite()));
    }

    #[test]
    fn test_iter_pairs() {
        let sample = reduce(&[0.1, 0.2], &ReduceOptions::default()).unwrap();
        let pairs: Vec<(f32, f32)> = sample.iter().collect();
        assert_eq!(pairs, vec![(0.1, 1.0), (0.2, 1.0)]);
    }
}
