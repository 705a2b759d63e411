//! Per-layer capture files.
//!
//! One `.safetensors` file per layer. The header metadata carries the module
//! name under `layer_name` (and optionally `layer_type`); the tensors are the
//! layer's parameters, conventionally `weights` and `bias`. Files written by
//! other tools without metadata fall back to the file stem, with a trailing
//! `_data` removed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use safetensors::SafeTensors;

use crate::error::{Result, SummaryError};

/// Metadata key holding the full module name.
pub const LAYER_NAME_KEY: &str = "layer_name";
/// Metadata key holding the module type (`Linear`, `Conv2d`, ...).
pub const LAYER_TYPE_KEY: &str = "layer_type";
/// File extension of capture files.
pub const CAPTURE_EXTENSION: &str = "safetensors";

/// A captured tensor, flattened row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    /// Original shape.
    pub shape: Vec<usize>,
    /// Row-major values.
    pub values: Vec<f32>,
}

impl TensorData {
    /// Create tensor data, checking that the shape matches the value count.
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(SummaryError::Capture(format!(
                "shape {shape:?} needs {expected} values, got {}",
                values.len()
            )));
        }
        Ok(Self { shape, values })
    }

    /// One-dimensional tensor.
    #[must_use]
    pub fn vector(values: Vec<f32>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }
}

/// Parameters captured from one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLayerRecord {
    /// Full module name, e.g. `bert.encoder.layer.0.attention.self.key`.
    pub name: String,
    /// Module type, when recorded.
    pub layer_type: Option<String>,
    /// Tensors by name.
    pub tensors: BTreeMap<String, TensorData>,
}

impl RawLayerRecord {
    /// Empty record for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layer_type: None,
            tensors: BTreeMap::new(),
        }
    }

    /// Builder-style tensor insertion.
    #[must_use]
    pub fn with_tensor(mut self, metric: impl Into<String>, data: TensorData) -> Self {
        self.tensors.insert(metric.into(), data);
        self
    }

    /// Builder-style layer type.
    #[must_use]
    pub fn with_layer_type(mut self, layer_type: impl Into<String>) -> Self {
        self.layer_type = Some(layer_type.into());
        self
    }

    /// Tensor by metric name.
    #[must_use]
    pub fn tensor(&self, metric: &str) -> Option<&TensorData> {
        self.tensors.get(metric)
    }
}

fn fallback_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.strip_suffix("_data") {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_owned(),
        _ => stem,
    }
}

/// Load a single capture file.
pub fn load_capture<P: AsRef<Path>>(path: P) -> Result<RawLayerRecord> {
    let path = path.as_ref();
    let buffer = std::fs::read(path)?;

    let (_, header) = SafeTensors::read_metadata(&buffer)?;
    let metadata = header.metadata().clone().unwrap_or_default();
    let name = metadata
        .get(LAYER_NAME_KEY)
        .cloned()
        .unwrap_or_else(|| fallback_name(path));
    let layer_type = metadata.get(LAYER_TYPE_KEY).cloned();

    let mut tensors = BTreeMap::new();
    for (metric, tensor) in candle_core::safetensors::load_buffer(&buffer, &Device::Cpu)? {
        let shape = tensor.dims().to_vec();
        let values = tensor.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        tensors.insert(metric, TensorData { shape, values });
    }

    tracing::debug!(
        layer = %name,
        tensors = tensors.len(),
        file = %path.display(),
        "loaded capture"
    );
    Ok(RawLayerRecord {
        name,
        layer_type,
        tensors,
    })
}

/// Load every capture file in `dir`.
///
/// Files are read in lexicographic order of their file names, which defines
/// the encounter order used to break ties when ordering the hierarchy. Files
/// without the `.safetensors` extension are ignored.
///
/// # Errors
///
/// Fails if the directory is unreadable, a file cannot be parsed, or two
/// files carry the same layer name.
pub fn load_all<P: AsRef<Path>>(dir: P) -> Result<Vec<RawLayerRecord>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(SummaryError::Capture(format!(
            "capture directory not found: {}",
            dir.display()
        )));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    files.retain(|p| p.is_file() && p.extension().is_some_and(|e| e == CAPTURE_EXTENSION));
    files.sort();

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(files.len());
    for file in &files {
        let record = load_capture(file)?;
        if !seen.insert(record.name.clone()) {
            return Err(SummaryError::Capture(format!(
                "duplicate layer name {:?} in {}",
                record.name,
                file.display()
            )));
        }
        records.push(record);
    }

    tracing::info!("Loaded {} captures from {:?}", records.len(), dir);
    Ok(records)
}

/// File name used for a layer's capture.
#[must_use]
pub fn capture_file_name(layer: &str) -> String {
    let safe: String = layer
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}_data.{CAPTURE_EXTENSION}")
}

/// Write a record to `dir` and return the file path.
pub fn save_capture<P: AsRef<Path>>(dir: P, record: &RawLayerRecord) -> Result<PathBuf> {
    let path = dir.as_ref().join(capture_file_name(&record.name));

    let mut tensors: Vec<(&str, Tensor)> = Vec::with_capacity(record.tensors.len());
    for (metric, data) in &record.tensors {
        let tensor = Tensor::from_vec(data.values.clone(), data.shape.clone(), &Device::Cpu)?;
        tensors.push((metric.as_str(), tensor));
    }

    let mut metadata = HashMap::new();
    metadata.insert(LAYER_NAME_KEY.to_owned(), record.name.clone());
    if let Some(layer_type) = &record.layer_type {
        metadata.insert(LAYER_TYPE_KEY.to_owned(), layer_type.clone());
    }

    safetensors::tensor::serialize_to_file(tensors, &Some(metadata), &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn linear(name: &str) -> RawLayerRecord {
        RawLayerRecord::new(name)
            .with_layer_type("Linear")
            .with_tensor(
                "weights",
                TensorData::new(vec![2, 3], vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]).unwrap(),
            )
            .with_tensor("bias", TensorData::vector(vec![0.1, 0.2]))
    }

    #[test]
    fn test_tensor_data_shape_check() {
        assert!(TensorData::new(vec![2, 2], vec![1.0; 3]).is_err());
        assert!(TensorData::new(vec![2, 2], vec![1.0; 4]).is_ok());
    }

    #[test]
    fn test_save_and_load_capture() {
        let dir = tempdir().unwrap();
        let record = linear("bert.encoder.layer.0.attention.self.key");
        let path = save_capture(dir.path(), &record).unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("_data.safetensors"));

        let loaded = load_capture(&path).unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_load_all_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        save_capture(dir.path(), &linear("bert.encoder.layer.1.output.dense")).unwrap();
        save_capture(dir.path(), &linear("bert.encoder.layer.0.output.dense")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a capture").unwrap();

        let records = load_all(dir.path()).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "bert.encoder.layer.0.output.dense",
                "bert.encoder.layer.1.output.dense"
            ]
        );
    }

    #[test]
    fn test_load_all_rejects_duplicates() {
        let dir = tempdir().unwrap();
        let record = linear("qa_outputs");
        save_capture(dir.path(), &record).unwrap();

        let other = dir.path().join("copy.safetensors");
        std::fs::copy(dir.path().join(capture_file_name("qa_outputs")), other).unwrap();

        let result = load_all(dir.path());
        assert!(matches!(result, Err(SummaryError::Capture(_))));
    }

    #[test]
    fn test_load_all_missing_dir() {
        let result = load_all("/nonexistent/captures");
        assert!(matches!(result, Err(SummaryError::Capture(_))));
    }

    #[test]
    fn test_name_falls_back_to_file_stem() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bert.pooler.dense_data.safetensors");
        let bias = Tensor::from_vec(vec![1.0f32, 2.0], 2, &Device::Cpu).unwrap();
        safetensors::tensor::serialize_to_file(vec![("bias", bias)], &None, &path).unwrap();

        let record = load_capture(&path).unwrap();
        assert_eq!(record.name, "bert.pooler.dense");
        assert_eq!(record.layer_type, None);
        assert_eq!(record.tensor("bias").unwrap().values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_capture_file_name_is_path_safe() {
        assert_eq!(
            capture_file_name("encoder/block 1"),
            "encoder_block_1_data.safetensors"
        );
    }
}
