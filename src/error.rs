use std::io;

use thiserror::Error;

/// Markup that cannot be treated as an HTML document at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("document is empty")]
    Empty,
    #[error("document contains no markup")]
    NotMarkup,
}

/// Per-row failure. Caught at the task boundary and never fatal to a run.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read {reference}: {source}")]
    Io {
        reference: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {reference}: {source}")]
    Parse {
        reference: String,
        #[source]
        source: ParseError,
    },
}

/// Dataset does not have the shape the pipeline needs. Fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("dataset has no header row")]
    EmptyHeader,
    #[error("dataset is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("row {row}: label must be 0 or 1, got {value:?}")]
    InvalidLabel { row: usize, value: String },
    #[error("row {row}: expected {expected} fields, found {found}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// The embedding trainer cannot produce a model from its input. Fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrainingError {
    #[error("training corpus is empty")]
    EmptyCorpus,
    #[error("no token occurs at least {min_count} times; vocabulary is empty")]
    EmptyVocabulary { min_count: usize },
    #[error("embedding dimension must be greater than zero")]
    InvalidDimension,
    #[error("epoch count must be greater than zero")]
    InvalidEpochs,
    #[error("document tag {0:?} appears more than once")]
    DuplicateTag(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error("column group {group} has {found} rows, expected {expected}")]
    LengthMismatch {
        group: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("extraction worker aborted: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}
