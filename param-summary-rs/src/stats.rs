//! Descriptive statistics per (leaf, metric).

use serde::{Deserialize, Serialize};

/// Summary of one captured tensor, written to the summary file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    /// Leaf node id.
    pub id: usize,
    /// Full layer name as captured.
    pub layer: String,
    /// Metric (tensor) name.
    pub metric: String,
    /// Tensor shape.
    pub shape: Vec<usize>,
    /// Number of finite values.
    pub count: usize,
    /// Number of NaN or infinite values.
    pub non_finite: usize,
    /// Mean of finite values.
    pub mean: f64,
    /// Sample standard deviation of finite values.
    pub std: f64,
    /// Minimum finite value.
    pub min: f64,
    /// Maximum finite value.
    pub max: f64,
}

/// Moments and range of a flattened tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorMoments {
    /// Number of finite values.
    pub count: usize,
    /// Number of NaN or infinite values.
    pub non_finite: usize,
    /// Mean.
    pub mean: f64,
    /// Sample standard deviation (0 for fewer than two values).
    pub std: f64,
    /// Minimum.
    pub min: f64,
    /// Maximum.
    pub max: f64,
}

impl TensorMoments {
    /// Compute moments over the finite values of `values`.
    ///
    /// Empty input, or input with no finite values, gives zeros.
    #[must_use]
    pub fn from_slice(values: &[f32]) -> Self {
        let finite: Vec<f64> = values
            .iter()
            .filter(|v| v.is_finite())
            .map(|&v| f64::from(v))
            .collect();
        let non_finite = values.len() - finite.len();
        if finite.is_empty() {
            return Self {
                count: 0,
                non_finite,
                mean: 0.0,
                std: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }

        let n = finite.len();
        let mean = finite.iter().sum::<f64>() / n as f64;
        let std = if n > 1 {
            (finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            count: n,
            non_finite,
            mean,
            std,
            min,
            max,
        }
    }
}

impl LayerSummary {
    /// Summarize a tensor attached to leaf `id`.
    #[must_use]
    pub fn new(id: usize, layer: &str, metric: &str, shape: &[usize], values: &[f32]) -> Self {
        let m = TensorMoments::from_slice(values);
        Self {
            id,
            layer: layer.to_owned(),
            metric: metric.to_owned(),
            shape: shape.to_vec(),
            count: m.count,
            non_finite: m.non_finite,
            mean: m.mean,
            std: m.std,
            min: m.min,
            max: m.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moments() {
        let m = TensorMoments::from_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(m.count, 4);
        assert!((m.mean - 2.5).abs() < 1e-12);
        assert!((m.std - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(m.min, 1.0);
        assert_eq!(m.max, 4.0);
    }

    #[test]
    fn test_moments_skip_non_finite() {
        let m = TensorMoments::from_slice(&[1.0, f32::NAN, 3.0, f32::INFINITY]);
        assert_eq!(m.count, 2);
        assert_eq!(m.non_finite, 2);
        assert!((m.mean - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_moments_empty() {
        let m = TensorMoments::from_slice(&[]);
        assert_eq!(m.count, 0);
        assert_eq!(m.mean, 0.0);
        assert_eq!(m.std, 0.0);
    }

    #[test]
    fn test_layer_summary_serializes() {
        let summary = LayerSummary::new(3, "bert.encoder.layer.0.output.dense", "bias", &[2], &[0.1, 0.2]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["metric"], "bias");
        assert_eq!(json["shape"], serde_json::json!([2]));
        assert_eq!(json["count"], 2);
    }
}
