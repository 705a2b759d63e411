//! Error types for param-summary-rs.
//!
//! Every fallible operation in the crate returns [`Result`]. None of the
//! errors are retryable: the batch is a deterministic function of its input,
//! so the recovery path is to fix the captures or the configuration and run
//! the whole pass again.
//!
//! # Example - Pattern Matching
//!
//! ```rust
//! use param_summary_rs::{NamingRule, SummaryError};
//!
//! match NamingRule::default().decompose("...") {
//!     Ok(levels) => println!("levels: {:?}", levels),
//!     Err(SummaryError::MalformedName(name)) => eprintln!("rejected {name:?}"),
//!     Err(e) => eprintln!("other error: {e}"),
//! }
//! ```

use thiserror::Error;

/// Result type alias for param-summary-rs operations.
pub type Result<T> = std::result::Result<T, SummaryError>;

/// Errors that can occur while building a parameter summary.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SummaryError {
    /// A layer name produced no tokens.
    #[error("malformed layer name: {0:?} contains no alphanumeric tokens")]
    MalformedName(String),

    /// A hierarchy path was inserted before its parent path.
    ///
    /// This is a traversal bug, not bad input, and aborts the run.
    #[error("orphan path {path:?}: parent {parent:?} is not registered")]
    OrphanPathInvariantViolation {
        /// Path that was being inserted.
        path: String,
        /// Parent path that was expected to exist.
        parent: String,
    },

    /// Two distinct layer names resolve to the same tree node, or one
    /// resolves to a node the other nests under.
    #[error("layers {first:?} and {second:?} collide at tree path {path:?}")]
    LeafCollision {
        /// Tree path of the contested node.
        path: String,
        /// Layer owning the contested node as its leaf.
        first: String,
        /// Other layer involved.
        second: String,
    },

    /// A tensor cannot support a kernel density estimate.
    #[error("degenerate distribution: {0}")]
    DegenerateDistribution(String),

    /// A reduction failed for a specific leaf and metric.
    #[error("reduction failed for {layer} ({metric}): {source}")]
    Reduction {
        /// Full layer name.
        layer: String,
        /// Metric (tensor) name.
        metric: String,
        /// Underlying failure.
        #[source]
        source: Box<SummaryError>,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid configuration file.
    #[error("invalid config file: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Capture store error.
    #[error("capture error: {0}")]
    Capture(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Candle error.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Safetensors header or serialization error.
    #[error("safetensors error: {0}")]
    SafeTensors(#[from] safetensors::SafeTensorError),

    /// Parquet export error.
    #[error("parquet error: {0}")]
    Parquet(String),
}

impl SummaryError {
    /// Whether this error was caused by a degenerate input distribution.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        match self {
            SummaryError::DegenerateDistribution(_) => true,
            SummaryError::Reduction { source, .. } => source.is_degenerate(),
            _ => false,
        }
    }
}
