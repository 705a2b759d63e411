//! Batch pipeline: captures in, tree and stats table out.
//!
//! ```text
//! load_all ─▶ decompose ─▶ insertion_order ─▶ HierarchyBuilder::insert_all
//!                                                   │
//!                          reduce (rayon, per leaf × metric) ◀─┘
//!                                                   │
//!                            tree.json, stats.csv, summary.json
//! ```
//!
//! The hierarchy pass is sequential and finishes before any reduction
//! starts. Reductions only read their own tensor and the finished index.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::capture::{load_all, RawLayerRecord, TensorData};
use crate::config::{DegeneratePolicy, SummaryConfig};
use crate::emit::{rows_for, write_stats_csv, write_summary_json, write_tree_json, OutputRow};
use crate::error::{Result, SummaryError};
use crate::hierarchy::{insertion_order, HierarchyBuilder, HierarchyIndex};
use crate::naming::LayerName;
use crate::reducer::{reduce, ReducedSample};
use crate::stats::LayerSummary;

/// A leaf of the finished tree with the record it came from.
#[derive(Debug, Clone)]
pub struct LeafEntry<'a> {
    /// Leaf node id.
    pub id: usize,
    /// Decomposed name.
    pub layer: LayerName,
    /// Source record.
    pub record: &'a RawLayerRecord,
}

/// A (leaf, metric) pair left out of the stats table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedReduction {
    /// Full layer name.
    pub layer: String,
    /// Metric name.
    pub metric: String,
    /// Why it was skipped.
    pub reason: String,
}

/// In-memory result of a summary pass.
#[derive(Debug, Clone)]
pub struct Summary {
    /// Finished hierarchy.
    pub index: HierarchyIndex,
    /// Number of leaves, one per record.
    pub leaves: usize,
    /// Stats table rows.
    pub rows: Vec<OutputRow>,
    /// Descriptive statistics per reduced (leaf, metric).
    pub summaries: Vec<LayerSummary>,
    /// Pairs that produced no rows.
    pub skipped: Vec<SkippedReduction>,
    /// Number of input records.
    pub records: usize,
}

/// Outcome of [`Pipeline::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Number of input records.
    pub records: usize,
    /// Number of tree nodes, including the synthetic root.
    pub nodes: usize,
    /// Number of leaf nodes.
    pub leaves: usize,
    /// Number of stats rows.
    pub rows: usize,
    /// Pairs that produced no rows.
    pub skipped: Vec<SkippedReduction>,
    /// Tree file written.
    pub tree_file: PathBuf,
    /// Stats table written.
    pub stats_file: PathBuf,
    /// Summary file written, if enabled.
    pub summary_file: Option<PathBuf>,
    /// Parquet file written, if enabled.
    pub parquet_file: Option<PathBuf>,
}

struct Job<'a> {
    leaf: usize,
    metric: &'a str,
    data: &'a TensorData,
}

fn descends_from(index: &HierarchyIndex, node: usize, ancestor: usize) -> bool {
    let mut current = index.node(node).and_then(|n| n.parent);
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        current = index.node(id).and_then(|n| n.parent);
    }
    false
}

/// Summary pipeline driven by a [`SummaryConfig`].
///
/// # Example
///
/// ```no_run
/// use param_summary_rs::{Pipeline, SummaryConfig};
///
/// # fn main() -> param_summary_rs::Result<()> {
/// let config = SummaryConfig::from_file("summary.yaml")?;
/// let report = Pipeline::new(config)?.run()?;
/// println!("{} rows, {} skipped", report.rows, report.skipped.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: SummaryConfig,
}

impl Pipeline {
    /// Validate `config` and create a pipeline.
    pub fn new(config: SummaryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &SummaryConfig {
        &self.config
    }

    /// Load captures, summarize and write every artifact.
    pub fn run(&self) -> Result<RunReport> {
        let records = load_all(&self.config.capture_dir)?;
        let summary = self.summarize(&records)?;
        self.write(&summary)
    }

    /// Decompose, order and insert every record; return the index and the
    /// leaves in insertion order.
    ///
    /// # Errors
    ///
    /// A name without tokens aborts with [`SummaryError::MalformedName`];
    /// two names that resolve to the same leaf abort with
    /// [`SummaryError::LeafCollision`].
    pub fn build_hierarchy<'a>(
        &self,
        records: &'a [RawLayerRecord],
    ) -> Result<(HierarchyIndex, Vec<LeafEntry<'a>>)> {
        let rule = &self.config.naming;
        let layers = records
            .iter()
            .map(|r| rule.decompose(&r.name))
            .collect::<Result<Vec<_>>>()?;

        let order = insertion_order(&layers);
        let levels: Vec<_> = order.iter().map(|&i| layers[i].levels.clone()).collect();

        let mut builder = HierarchyBuilder::new(rule);
        let ids = builder.insert_all(&levels)?;
        let index = builder.finish();

        let mut owners: HashMap<usize, usize> = HashMap::with_capacity(ids.len());
        for (&i, &id) in order.iter().zip(&ids) {
            if let Some(&first) = owners.get(&id) {
                return Err(SummaryError::LeafCollision {
                    path: index.path_of(id).unwrap_or_default(),
                    first: records[first].name.clone(),
                    second: records[i].name.clone(),
                });
            }
            owners.insert(id, i);
        }
        let interior: HashSet<usize> = index.nodes().iter().filter_map(|n| n.parent).collect();
        for (&i, &id) in order.iter().zip(&ids) {
            if !interior.contains(&id) {
                continue;
            }
            let below = order
                .iter()
                .zip(&ids)
                .find(|&(_, &other)| descends_from(&index, other, id))
                .map_or_else(String::new, |(&j, _)| records[j].name.clone());
            return Err(SummaryError::LeafCollision {
                path: index.path_of(id).unwrap_or_default(),
                first: records[i].name.clone(),
                second: below,
            });
        }

        let leaves = order
            .into_iter()
            .zip(ids)
            .map(|(i, id)| LeafEntry {
                id,
                layer: layers[i].clone(),
                record: &records[i],
            })
            .collect();

        tracing::info!(
            "Built hierarchy: {} records, {} nodes",
            records.len(),
            index.len()
        );
        Ok((index, leaves))
    }

    /// Build the hierarchy and reduce every configured metric of every leaf.
    pub fn summarize(&self, records: &[RawLayerRecord]) -> Result<Summary> {
        let (index, leaves) = self.build_hierarchy(records)?;
        let mut skipped = Vec::new();

        let mut jobs = Vec::new();
        for (leaf, entry) in leaves.iter().enumerate() {
            for metric in &self.config.metrics {
                match entry.record.tensor(metric) {
                    Some(data) => jobs.push(Job {
                        leaf,
                        metric: metric.as_str(),
                        data,
                    }),
                    None => {
                        tracing::warn!(
                            layer = %entry.record.name,
                            metric = %metric,
                            "capture has no such tensor, skipping"
                        );
                        skipped.push(SkippedReduction {
                            layer: entry.record.name.clone(),
                            metric: metric.clone(),
                            reason: "missing tensor".into(),
                        });
                    }
                }
            }
        }

        let options = self.config.reduce.options();
        let run_job = |job: &Job<'_>| -> (Result<ReducedSample>, LayerSummary) {
            let entry = &leaves[job.leaf];
            let summary = LayerSummary::new(
                entry.id,
                &entry.record.name,
                job.metric,
                &job.data.shape,
                &job.data.values,
            );
            (reduce(&job.data.values, &options), summary)
        };
        let results: Vec<_> = if self.config.reduce.parallel {
            jobs.par_iter().map(run_job).collect()
        } else {
            jobs.iter().map(run_job).collect()
        };

        let mut rows = Vec::new();
        let mut summaries = Vec::with_capacity(results.len());
        for (job, (result, summary)) in jobs.iter().zip(results) {
            let entry = &leaves[job.leaf];
            summaries.push(summary);
            match result {
                Ok(sample) => {
                    rows.extend(rows_for(entry.id, job.metric, &entry.layer.levels, &sample));
                }
                Err(e)
                    if e.is_degenerate()
                        && self.config.reduce.on_degenerate == DegeneratePolicy::Skip =>
                {
                    tracing::warn!(
                        layer = %entry.record.name,
                        metric = %job.metric,
                        "skipping reduction: {e}"
                    );
                    skipped.push(SkippedReduction {
                        layer: entry.record.name.clone(),
                        metric: job.metric.to_owned(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    return Err(SummaryError::Reduction {
                        layer: entry.record.name.clone(),
                        metric: job.metric.to_owned(),
                        source: Box::new(e),
                    });
                }
            }
        }

        tracing::info!(
            "Reduced {} tensors into {} rows ({} skipped)",
            jobs.len(),
            rows.len(),
            skipped.len()
        );
        Ok(Summary {
            leaves: leaves.len(),
            index,
            rows,
            summaries,
            skipped,
            records: records.len(),
        })
    }

    /// Write the artifacts of `summary` under the output directory.
    pub fn write(&self, summary: &Summary) -> Result<RunReport> {
        let output = &self.config.output;
        std::fs::create_dir_all(&self.config.output_dir)?;

        let tree_file = self.config.output_path(&output.tree_file);
        write_tree_json(summary.index.nodes(), &tree_file)?;

        let stats_file = self.config.output_path(&output.stats_file);
        write_stats_csv(&summary.rows, &stats_file)?;

        let summary_file = match &output.summary_file {
            Some(name) => {
                let path = self.config.output_path(name);
                write_summary_json(&summary.summaries, &path)?;
                Some(path)
            }
            None => None,
        };

        let parquet_file = match &output.parquet_file {
            Some(name) => Some(self.write_parquet(&summary.rows, name)?),
            None => None,
        };

        tracing::info!("Wrote {:?} and {:?}", tree_file, stats_file);
        Ok(RunReport {
            records: summary.records,
            nodes: summary.index.len(),
            leaves: summary.leaves,
            rows: summary.rows.len(),
            skipped: summary.skipped.clone(),
            tree_file,
            stats_file,
            summary_file,
            parquet_file,
        })
    }

    #[cfg(feature = "parquet")]
    fn write_parquet(&self, rows: &[OutputRow], name: &str) -> Result<PathBuf> {
        let path = self.config.output_path(name);
        crate::parquet_export::export_rows_to_parquet(rows, &path)?;
        Ok(path)
    }

    #[cfg(not(feature = "parquet"))]
    fn write_parquet(&self, _rows: &[OutputRow], _name: &str) -> Result<PathBuf> {
        Err(SummaryError::Config(
            "parquet_file requires the `parquet` feature".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::ReduceMode;

    fn record(name: &str, bias: Vec<f32>) -> RawLayerRecord {
        RawLayerRecord::new(name).with_tensor("bias", TensorData::vector(bias))
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(SummaryConfig::new("./unused")).unwrap()
    }

    #[test]
    fn test_leaves_follow_block_order() {
        let records = vec![
            record("bert.encoder.layer.1.output.dense", vec![1.0]),
            record("qa_outputs", vec![2.0]),
            record("bert.encoder.layer.0.output.dense", vec![3.0]),
        ];
        let p = pipeline();
        let (index, leaves) = p.build_hierarchy(&records).unwrap();
        let names: Vec<&str> = leaves.iter().map(|l| l.record.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "bert.encoder.layer.0.output.dense",
                "bert.encoder.layer.1.output.dense",
                "qa_outputs"
            ]
        );
        assert_eq!(index.len(), 6);
        assert_eq!(leaves.len(), 3);
    }

    #[test]
    fn test_malformed_name_aborts() {
        let records = vec![record("--", vec![1.0])];
        let result = pipeline().summarize(&records);
        assert!(matches!(result, Err(SummaryError::MalformedName(_))));
    }

    #[test]
    fn test_names_sharing_tokens_collide() {
        let records = vec![
            record("bert.encoder.layer.0.output.dense", vec![0.1, 0.2]),
            record("bert.encoder.layer.0.output-dense", vec![0.3, 0.4]),
        ];
        match pipeline().summarize(&records) {
            Err(SummaryError::LeafCollision { path, first, second }) => {
                assert_eq!(path, "bert.encoder.layer.0.output.dense");
                assert_eq!(first, "bert.encoder.layer.0.output.dense");
                assert_eq!(second, "bert.encoder.layer.0.output-dense");
            }
            other => panic!("expected LeafCollision, got {other:?}"),
        }
    }

    #[test]
    fn test_leaf_on_group_node_collides() {
        let records = vec![
            record("bert.encoder.layer.0.output.dense", vec![0.1, 0.2]),
            record("encoder.layer.0", vec![0.3, 0.4]),
        ];
        let err = pipeline().build_hierarchy(&records).unwrap_err();
        match err {
            SummaryError::LeafCollision { first, second, .. } => {
                assert_eq!(first, "encoder.layer.0");
                assert_eq!(second, "bert.encoder.layer.0.output.dense");
            }
            other => panic!("expected LeafCollision, got {other:?}"),
        }
    }

    #[test]
    fn test_leaf_ids_are_unique() {
        let records = vec![
            record("bert.encoder.layer.0.output.dense", vec![0.1]),
            record("bert.encoder.layer.0.intermediate.dense", vec![0.2]),
            record("bert.encoder.layer.1.output.dense", vec![0.3]),
            record("qa_outputs", vec![0.4]),
        ];
        let (_, leaves) = pipeline().build_hierarchy(&records).unwrap();
        let mut ids: Vec<usize> = leaves.iter().map(|l| l.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), records.len());
    }

    #[test]
    fn test_missing_metric_is_skipped() {
        let records = vec![RawLayerRecord::new("qa_outputs")];
        let summary = pipeline().summarize(&records).unwrap();
        assert!(summary.rows.is_empty());
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].reason, "missing tensor");
    }

    #[test]
    fn test_degenerate_skip_policy() {
        let mut config = SummaryConfig::new("./unused");
        config.reduce.mode = ReduceMode::Kde;
        config.reduce.sample_len = 10;
        let records = vec![
            record("bert.encoder.layer.0.output.dense", vec![0.5; 8]),
            record("bert.encoder.layer.1.output.dense", vec![0.1, 0.2, 0.3]),
        ];
        let summary = Pipeline::new(config).unwrap().summarize(&records).unwrap();
        assert_eq!(summary.rows.len(), 10);
        assert!(summary.rows.iter().all(|r| r.layer_name == "encoder.layer.1"));
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.skipped[0].layer, "bert.encoder.layer.0.output.dense");
        assert_eq!(summary.summaries.len(), 2);
    }

    #[test]
    fn test_degenerate_abort_policy() {
        let mut config = SummaryConfig::new("./unused");
        config.reduce.mode = ReduceMode::Kde;
        config.reduce.on_degenerate = DegeneratePolicy::Abort;
        let records = vec![record("bert.encoder.layer.0.output.dense", vec![0.5; 8])];
        let err = Pipeline::new(config).unwrap().summarize(&records).unwrap_err();
        assert!(matches!(err, SummaryError::Reduction { .. }));
        assert!(err.is_degenerate());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let records: Vec<RawLayerRecord> = (0..6)
            .map(|b| {
                record(
                    &format!("bert.encoder.layer.{b}.output.dense"),
                    (0..50).map(|i| (i * (b + 1)) as f32 / 17.0).collect(),
                )
            })
            .collect();

        let mut config = SummaryConfig::new("./unused");
        config.reduce.mode = ReduceMode::Kde;
        config.reduce.sample_len = 20;
        let parallel = Pipeline::new(config.clone()).unwrap().summarize(&records).unwrap();
        config.reduce.parallel = false;
        let sequential = Pipeline::new(config).unwrap().summarize(&records).unwrap();

        assert_eq!(parallel.rows, sequential.rows);
        assert_eq!(parallel.summaries, sequential.summaries);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SummaryConfig::new("./unused");
        config.reduce.sample_len = 0;
        assert!(Pipeline::new(config).is_err());
    }
}
