// src/error.rs

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Every way a row, a group or a query can go wrong inside the pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("malformed metadata label `{label}`: expected {expected} segments, found {found}")]
    MalformedMetadata {
        label: String,
        expected: usize,
        found: usize,
    },

    #[error("unknown code `{code}` in column `{column}` (codelist {codelist})")]
    UnknownCode {
        column: String,
        codelist: String,
        code: String,
    },

    #[error("duplicate key {key} for measure `{measure}`")]
    DuplicateKey { key: String, measure: String },

    #[error("fetch of `{query}` failed after {attempts} attempt(s): {reason}")]
    FetchFailure {
        query: String,
        attempts: u32,
        reason: String,
    },

    #[error("invalid value `{value}` in column `{column}`")]
    InvalidValue { column: String, value: String },

    #[error("invalid period `{0}`")]
    InvalidPeriod(String),

    #[error("axis {axis} carries near-identical labels `{first}` and `{second}`")]
    InconsistentPlaceholder {
        axis: String,
        first: String,
        second: String,
    },

    #[error("payload for `{source_name}` has no column `{column}`")]
    MissingColumn { source_name: String, column: String },
}

/// Coarse category used for counting and for deciding the run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    MalformedMetadata,
    UnknownCode,
    DuplicateKey,
    FetchFailure,
    InvalidValue,
    InvalidPeriod,
    InconsistentPlaceholder,
    MissingColumn,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::MalformedMetadata { .. } => ErrorKind::MalformedMetadata,
            PipelineError::UnknownCode { .. } => ErrorKind::UnknownCode,
            PipelineError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            PipelineError::FetchFailure { .. } => ErrorKind::FetchFailure,
            PipelineError::InvalidValue { .. } => ErrorKind::InvalidValue,
            PipelineError::InvalidPeriod(_) => ErrorKind::InvalidPeriod,
            PipelineError::InconsistentPlaceholder { .. } => ErrorKind::InconsistentPlaceholder,
            PipelineError::MissingColumn { .. } => ErrorKind::MissingColumn,
        }
    }
}

impl ErrorKind {
    /// Fatal kinds corrupt aggregates if ignored, so they fail the run.
    /// The rest only drop the structurally unusable row.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::UnknownCode
                | ErrorKind::DuplicateKey
                | ErrorKind::InconsistentPlaceholder
                | ErrorKind::MissingColumn
        )
    }

    /// Kinds that leave nothing trustworthy to publish for the dataset.
    /// Other fatal kinds only withhold their row or group.
    pub fn aborts_dataset(self) -> bool {
        matches!(
            self,
            ErrorKind::InconsistentPlaceholder | ErrorKind::MissingColumn
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::MalformedMetadata => "MALFORMED_METADATA",
            ErrorKind::UnknownCode => "UNKNOWN_CODE",
            ErrorKind::DuplicateKey => "DUPLICATE_KEY",
            ErrorKind::FetchFailure => "FETCH_FAILURE",
            ErrorKind::InvalidValue => "INVALID_VALUE",
            ErrorKind::InvalidPeriod => "INVALID_PERIOD",
            ErrorKind::InconsistentPlaceholder => "INCONSISTENT_PLACEHOLDER",
            ErrorKind::MissingColumn => "MISSING_COLUMN",
        };
        f.write_str(s)
    }
}
