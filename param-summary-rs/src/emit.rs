//! Output artifacts: stats table, tree file and summary file.
//!
//! All writers truncate the destination on open. A failure midway leaves the
//! file incomplete; the whole run is meant to be repeated, not resumed.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hierarchy::TreeNode;
use crate::naming::HierarchyLevels;
use crate::reducer::ReducedSample;
use crate::stats::LayerSummary;

/// Header of the stats table.
pub const STATS_HEADER: [&str; 6] = ["id", "metric", "layer_name", "layer_member", "value", "density"];

/// One row of the stats table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    /// Leaf node id.
    pub id: usize,
    /// Metric (tensor) name.
    pub metric: String,
    /// Group label (`encoder.layer.4`), or the whole name for single-level leaves.
    pub layer_name: String,
    /// Member label (`attention.self.key`), or the whole name for single-level leaves.
    pub layer_member: String,
    /// Sample value.
    pub value: f32,
    /// Density at `value`.
    pub density: f32,
}

/// Rows for one reduced (leaf, metric), in sample order.
#[must_use]
pub fn rows_for(
    id: usize,
    metric: &str,
    levels: &HierarchyLevels,
    sample: &ReducedSample,
) -> Vec<OutputRow> {
    sample
        .iter()
        .map(|(value, density)| OutputRow {
            id,
            metric: metric.to_owned(),
            layer_name: levels.group_label().to_owned(),
            layer_member: levels.member_label().to_owned(),
            value,
            density,
        })
        .collect()
}

fn csv_field(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\"")).into()
    } else {
        field.into()
    }
}

/// Write the stats table as CSV, rows in the given order.
pub fn write_stats_csv<P: AsRef<Path>>(rows: &[OutputRow], path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_stats(rows, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Write the stats table to any writer.
pub fn write_stats<W: Write>(rows: &[OutputRow], writer: &mut W) -> Result<()> {
    writeln!(writer, "{}", STATS_HEADER.join(","))?;
    for row in rows {
        writeln!(
            writer,
            "{},{},{},{},{},{}",
            row.id,
            csv_field(&row.metric),
            csv_field(&row.layer_name),
            csv_field(&row.layer_member),
            row.value,
            row.density
        )?;
    }
    Ok(())
}

/// Write the tree file: a JSON array of `{id, name, parent}` in creation order.
pub fn write_tree_json<P: AsRef<Path>>(nodes: &[TreeNode], path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, nodes)?;
    writer.flush()?;
    Ok(())
}

/// Write per-leaf descriptive statistics as pretty JSON.
pub fn write_summary_json<P: AsRef<Path>>(summaries: &[LayerSummary], path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, summaries)?;
    writer.flush()?;
    Ok(())
}
