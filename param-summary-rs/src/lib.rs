//! # param-summary-rs
//!
//! Hierarchical per-layer parameter statistics for model visualization.
//!
//! Given one capture file per layer of a trained model, this crate derives a
//! tree from the module names (`bert` → `encoder.layer.4` →
//! `attention.self.key`), reduces each layer's weights and biases to a
//! fixed-size sample, and writes the artifacts a charting layer consumes:
//!
//! - `tree.json` - `[{id, name, parent}]` in creation order
//! - `stats.csv` - `id,metric,layer_name,layer_member,value,density`
//! - `summary.json` - count, mean, std and range per layer and metric
//!
//! ## Features
//!
//! - **Stable ids** - ordering by numeric block index, level-order assignment
//! - **Truncated or KDE samples** - seeded Gaussian KDE with Scott's rule
//! - **Parallel reduction** - leaves are reduced on the rayon pool
//! - **Parquet** - optional columnar stats table (`parquet` feature)
//!
//! ## Quick Start (CLI)
//!
//! ```bash
//! # Write a starting configuration
//! param-summary init summary.yaml --preset bert-kde
//!
//! # Check it
//! param-summary validate summary.yaml
//!
//! # Produce tree.json and stats.csv
//! param-summary run summary.yaml
//! ```
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use param_summary_rs::{Pipeline, SummaryConfig};
//!
//! # fn main() -> param_summary_rs::Result<()> {
//! let mut config = SummaryConfig::from_preset("bert")?;
//! config.capture_dir = "./data/meta_data".into();
//!
//! let report = Pipeline::new(config)?.run()?;
//! println!("{} nodes, {} rows", report.nodes, report.rows);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

pub mod capture;
pub mod config;
pub mod emit;
pub mod error;
pub mod hierarchy;
pub mod kde;
pub mod naming;
#[cfg(feature = "parquet")]
pub mod parquet_export;
pub mod pipeline;
pub mod reducer;
pub mod stats;

pub use capture::{load_all, save_capture, RawLayerRecord, TensorData};
pub use config::{DegeneratePolicy, SummaryConfig};
pub use emit::{write_stats_csv, write_tree_json, OutputRow};
pub use error::{Result, SummaryError};
pub use hierarchy::{HierarchyBuilder, HierarchyIndex, TreeNode, ROOT_ID};
pub use kde::{BandwidthRule, GaussianKde};
pub use naming::{tokenize, HierarchyLevels, LayerName, NamingRule};
pub use pipeline::{Pipeline, RunReport, SkippedReduction, Summary};
pub use reducer::{reduce, ReduceMode, ReduceOptions, ReducedSample};
pub use stats::LayerSummary;
