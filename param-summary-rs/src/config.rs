//! Configuration parsing and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SummaryError};
use crate::kde::BandwidthRule;
use crate::naming::NamingRule;
use crate::reducer::{ReduceMode, ReduceOptions};

/// Main configuration for a summary run.
///
/// # Example
///
/// ```rust
/// use param_summary_rs::SummaryConfig;
///
/// # fn main() -> param_summary_rs::Result<()> {
/// let config = SummaryConfig::from_preset("bert")?;
/// config.validate()?;
/// assert_eq!(config.metrics, vec!["bias".to_string()]);
/// assert_eq!(config.reduce.sample_len, 200);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Directory holding one capture file per layer.
    pub capture_dir: String,

    /// Directory the output artifacts are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Tensor names to summarize, in emission order.
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,

    /// Layer-name decomposition rule.
    #[serde(default)]
    pub naming: NamingRule,

    /// Reduction settings.
    #[serde(default)]
    pub reduce: ReduceSettings,

    /// Output file names, relative to `output_dir`.
    #[serde(default)]
    pub output: OutputSettings,
}

fn default_output_dir() -> String {
    "./data".into()
}

fn default_metrics() -> Vec<String> {
    vec!["bias".into()]
}

/// What to do when a tensor cannot be density-estimated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegeneratePolicy {
    /// Log the leaf and metric, leave them out of the stats table, continue.
    #[default]
    Skip,
    /// Stop the run with the reduction error.
    Abort,
}

/// Statistics reduction settings.
///
/// # Example
///
/// ```rust
/// use param_summary_rs::config::{DegeneratePolicy, ReduceSettings};
/// use param_summary_rs::ReduceMode;
///
/// let reduce = ReduceSettings {
///     mode: ReduceMode::Kde,
///     sample_len: 100,
///     on_degenerate: DegeneratePolicy::Abort,
///     ..Default::default()
/// };
///
/// assert_eq!(reduce.options().seed, 31);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceSettings {
    /// Truncate or KDE resampling.
    #[serde(default)]
    pub mode: ReduceMode,

    /// Rows emitted per (leaf, metric).
    #[serde(default = "default_sample_len")]
    pub sample_len: usize,

    /// Seed for KDE resampling.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// KDE bandwidth rule.
    #[serde(default)]
    pub bandwidth: BandwidthRule,

    /// Degenerate-distribution policy.
    #[serde(default)]
    pub on_degenerate: DegeneratePolicy,

    /// Reduce leaves on the rayon thread pool.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

fn default_sample_len() -> usize {
    200
}
fn default_seed() -> u64 {
    31
}
fn default_true() -> bool {
    true
}

impl Default for ReduceSettings {
    fn default() -> Self {
        Self {
            mode: ReduceMode::default(),
            sample_len: default_sample_len(),
            seed: default_seed(),
            bandwidth: BandwidthRule::default(),
            on_degenerate: DegeneratePolicy::default(),
            parallel: true,
        }
    }
}

impl ReduceSettings {
    /// Options passed to every individual reduction.
    #[must_use]
    pub fn options(&self) -> ReduceOptions {
        ReduceOptions {
            mode: self.mode,
            sample_len: self.sample_len,
            seed: self.seed,
            bandwidth: self.bandwidth,
        }
    }
}

/// Output artifact names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Tree file (JSON array of nodes).
    #[serde(default = "default_tree_file")]
    pub tree_file: String,

    /// Stats table (CSV).
    #[serde(default = "default_stats_file")]
    pub stats_file: String,

    /// Per-leaf descriptive statistics (JSON). `None` disables it.
    #[serde(default = "default_summary_file")]
    pub summary_file: Option<String>,

    /// Parquet copy of the stats table. Requires the `parquet` feature.
    #[serde(default)]
    pub parquet_file: Option<String>,
}

fn default_tree_file() -> String {
    "tree.json".into()
}
fn default_stats_file() -> String {
    "stats.csv".into()
}
#[allow(clippy::unnecessary_wraps)]
fn default_summary_file() -> Option<String> {
    Some("summary.json".into())
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            tree_file: default_tree_file(),
            stats_file: default_stats_file(),
            summary_file: default_summary_file(),
            parquet_file: None,
        }
    }
}

impl SummaryConfig {
    /// Create a configuration with defaults for the given capture directory.
    #[must_use]
    pub fn new(capture_dir: impl Into<String>) -> Self {
        Self {
            capture_dir: capture_dir.into(),
            output_dir: default_output_dir(),
            metrics: default_metrics(),
            naming: NamingRule::default(),
            reduce: ReduceSettings::default(),
            output: OutputSettings::default(),
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create a configuration from a preset.
    ///
    /// Available presets:
    /// - `"bert"` - BERT biases, truncated samples
    /// - `"bert-kde"` - BERT weights and biases, KDE resampling
    /// - `"vit"` - ViT weights and biases, KDE resampling
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "bert" => Ok(Self::bert_preset()),
            "bert-kde" => Ok(Self::bert_kde_preset()),
            "vit" => Ok(Self::vit_preset()),
            _ => Err(SummaryError::Config(format!("Unknown preset: {preset}"))),
        }
    }

    /// BERT captures, bias only, first `sample_len` values per layer.
    #[must_use]
    pub fn bert_preset() -> Self {
        Self::new("./data/meta_data")
    }

    /// BERT captures with density-estimated weights and biases.
    #[must_use]
    pub fn bert_kde_preset() -> Self {
        Self {
            metrics: vec!["weights".into(), "bias".into()],
            reduce: ReduceSettings {
                mode: ReduceMode::Kde,
                ..Default::default()
            },
            ..Self::bert_preset()
        }
    }

    /// ViT captures (`vit.encoder.layer.N...`) with KDE resampling.
    #[must_use]
    pub fn vit_preset() -> Self {
        Self {
            naming: NamingRule {
                root: "vit".into(),
                ..Default::default()
            },
            ..Self::bert_kde_preset()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.capture_dir.is_empty() {
            return Err(SummaryError::Config("capture_dir cannot be empty".into()));
        }
        if self.metrics.is_empty() {
            return Err(SummaryError::Config("at least one metric is required".into()));
        }
        for metric in &self.metrics {
            if metric.is_empty() || metric.contains([',', '"', '\n', '\r']) {
                return Err(SummaryError::Config(format!(
                    "metric name {metric:?} is not a plain tensor name"
                )));
            }
        }
        if self.reduce.sample_len == 0 {
            return Err(SummaryError::Config("sample_len must be positive".into()));
        }
        if self.output.tree_file.is_empty() || self.output.stats_file.is_empty() {
            return Err(SummaryError::Config("output file names cannot be empty".into()));
        }
        if self.output.parquet_file.is_some() && !cfg!(feature = "parquet") {
            return Err(SummaryError::Config(
                "parquet_file requires the `parquet` feature".into(),
            ));
        }
        self.naming.validate()
    }

    /// Full path of an output artifact.
    #[must_use]
    pub fn output_path(&self, file: &str) -> PathBuf {
        Path::new(&self.output_dir).join(file)
    }
}
