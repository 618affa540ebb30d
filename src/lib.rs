//! Feature extraction for phishing-page classification.
//!
//! A labelled corpus of (URL, saved HTML page) pairs becomes one numeric table:
//! lexical URL features, structural HTML features, and a document embedding of
//! each page's tag sequence.

pub mod config;
pub mod csv;
pub mod dataset;
pub mod db;
pub mod embedding;
pub mod error;
pub mod features;
pub mod merge;
pub mod pipeline;

pub use config::{FailurePolicy, PipelineConfig};
pub use dataset::{Dataset, Sample};
pub use error::{ExtractionError, ParseError, PipelineError, SchemaError, TrainingError};
pub use merge::{merge, FeatureTable};
pub use pipeline::{Pipeline, PipelineOutput};
