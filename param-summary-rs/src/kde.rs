//! One-dimensional Gaussian kernel density estimation.
//!
//! The estimator keeps the full population and a single bandwidth
//! `h = factor · σ`, where σ is the sample standard deviation (n − 1
//! denominator) and `factor` comes from [`BandwidthRule`]:
//!
//! - Scott: `n^(-1/5)`
//! - Silverman: `(3n / 4)^(-1/5)`
//!
//! Densities are probability-density values of the fitted mixture
//! `f(x) = 1 / (n h √(2π)) · Σ exp(-½ ((x - xᵢ) / h)²)`.

use std::f64::consts::PI;

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SummaryError};

/// Automatic bandwidth selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandwidthRule {
    /// Scott's rule of thumb.
    #[default]
    Scott,
    /// Silverman's rule of thumb.
    Silverman,
}

impl BandwidthRule {
    /// Multiplier applied to the standard deviation for `n` points.
    #[must_use]
    pub fn factor(self, n: usize) -> f64 {
        let n = n as f64;
        match self {
            BandwidthRule::Scott => n.powf(-0.2),
            BandwidthRule::Silverman => (n * 0.75).powf(-0.2),
        }
    }
}

/// Gaussian KDE fitted to a flattened tensor.
#[derive(Debug, Clone)]
pub struct GaussianKde {
    dataset: Vec<f64>,
    bandwidth: f64,
}

impl GaussianKde {
    /// Fit the estimator to every value of `values`.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::DegenerateDistribution`] when there are fewer
    /// than two values or the variance is zero or not finite.
    pub fn fit(values: &[f32], rule: BandwidthRule) -> Result<Self> {
        let n = values.len();
        if n < 2 {
            return Err(SummaryError::DegenerateDistribution(format!(
                "need at least 2 values, got {n}"
            )));
        }
        let dataset: Vec<f64> = values.iter().map(|&v| f64::from(v)).collect();
        let mean = dataset.iter().sum::<f64>() / n as f64;
        let variance =
            dataset.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        if !variance.is_finite() {
            return Err(SummaryError::DegenerateDistribution(
                "variance is not finite".into(),
            ));
        }
        if variance <= 0.0 {
            return Err(SummaryError::DegenerateDistribution(format!(
                "zero variance over {n} values"
            )));
        }
        let bandwidth = rule.factor(n) * variance.sqrt();
        Ok(Self { dataset, bandwidth })
    }

    /// Kernel bandwidth `h`.
    #[must_use]
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Number of fitted points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Always false for a fitted estimator.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Draw `count` samples: a uniformly chosen data point plus `h · N(0, 1)`.
    pub fn resample<R: Rng>(&self, count: usize, rng: &mut R) -> Vec<f64> {
        (0..count)
            .map(|_| {
                let center = self.dataset[rng.gen_range(0..self.dataset.len())];
                let noise: f64 = rng.sample(StandardNormal);
                center + self.bandwidth * noise
            })
            .collect()
    }

    /// Probability density at `x`.
    #[must_use]
    pub fn evaluate(&self, x: f64) -> f64 {
        let h = self.bandwidth;
        let norm = 1.0 / (self.dataset.len() as f64 * h * (2.0 * PI).sqrt());
        let sum: f64 = self
            .dataset
            .iter()
            .map(|&xi| {
                let z = (x - xi) / h;
                (-0.5 * z * z).exp()
            })
            .sum();
        norm * sum
    }
}
