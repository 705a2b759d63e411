//! Parquet export for the stats table.
//!
//! Writes the same columns as the CSV table, for loading into pandas, DuckDB
//! or Polars without re-parsing text.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow_array::{Array, Float32Array, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::emit::OutputRow;
use crate::error::{Result, SummaryError};

fn parquet_err(e: impl std::fmt::Display) -> SummaryError {
    SummaryError::Parquet(e.to_string())
}

/// Schema of the stats table.
fn create_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::UInt64, false),
        Field::new("metric", DataType::Utf8, false),
        Field::new("layer_name", DataType::Utf8, false),
        Field::new("layer_member", DataType::Utf8, false),
        Field::new("value", DataType::Float32, false),
        Field::new("density", DataType::Float32, false),
    ]))
}

/// Export stats rows to a ZSTD-compressed Parquet file.
///
/// An empty row set produces a file with the schema and no row groups.
pub fn export_rows_to_parquet<P: AsRef<Path>>(rows: &[OutputRow], path: P) -> Result<()> {
    let schema = create_schema();

    let ids: UInt64Array = rows.iter().map(|r| Some(r.id as u64)).collect();
    let metrics: StringArray = rows.iter().map(|r| Some(r.metric.as_str())).collect();
    let layer_names: StringArray = rows.iter().map(|r| Some(r.layer_name.as_str())).collect();
    let members: StringArray = rows.iter().map(|r| Some(r.layer_member.as_str())).collect();
    let values: Float32Array = rows.iter().map(|r| Some(r.value)).collect();
    let densities: Float32Array = rows.iter().map(|r| Some(r.density)).collect();

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(ids) as Arc<dyn Array>,
            Arc::new(metrics),
            Arc::new(layer_names),
            Arc::new(members),
            Arc::new(values),
            Arc::new(densities),
        ],
    )
    .map_err(parquet_err)?;

    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(Default::default()))
        .build();

    let mut writer = ArrowWriter::try_new(file, schema, Some(props)).map_err(parquet_err)?;
    if !rows.is_empty() {
        writer.write(&batch).map_err(parquet_err)?;
    }
    writer.close().map_err(parquet_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sample_rows() -> Vec<OutputRow> {
        (0..4)
            .map(|i| OutputRow {
                id: 3,
                metric: "bias".into(),
                layer_name: "encoder.layer.0".into(),
                layer_member: "output.dense".into(),
                value: i as f32 * 0.1,
                density: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_export_rows_to_parquet() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.parquet");

        export_rows_to_parquet(&sample_rows(), &path).unwrap();

        assert!(path.exists());
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_export_empty_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        export_rows_to_parquet(&[], &path).unwrap();
        assert!(path.exists());
    }
}
