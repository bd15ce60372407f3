//! Error taxonomy for an extraction call.
//!
//! Fatal conditions are `ExtractError` variants. A stage that empties only
//! one of the two streams is not an error: it is recorded as an
//! `EmptyResultWarning` on the returned extraction and logged.

use std::fmt;

use thiserror::Error;

use crate::model::Stream;

pub type Result<T> = std::result::Result<T, ExtractError>;

/// Pipeline stages that can narrow a stream's working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    SiteLookup,
    SampleLookup,
    DateRange,
    ProjectCode,
    ResultJoin,
    ParameterSelection,
    ReviewStatus,
    MediumCode,
}

impl Stage {
    /// Stages where both streams being empty terminates the call.
    pub fn is_joint_empty_checkpoint(self) -> bool {
        matches!(
            self,
            Stage::SiteLookup | Stage::ResultJoin | Stage::ParameterSelection
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::SiteLookup => "site lookup",
            Stage::SampleLookup => "sample lookup",
            Stage::DateRange => "date-range filter",
            Stage::ProjectCode => "project-code filter",
            Stage::ResultJoin => "result join",
            Stage::ParameterSelection => "parameter selection",
            Stage::ReviewStatus => "review-status filter",
            Stage::MediumCode => "medium-code filter",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    /// Malformed or empty caller input. Never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The data source could not be reached at all.
    #[error("Could not connect to data source '{data_source}': {message}")]
    BackendConnection { data_source: String, message: String },

    /// A table query failed. `missing_table` marks the configuration case
    /// (wrong database or partition identifier).
    #[error("Query on {table} failed for partition '{partition}': {message}")]
    Query {
        partition: String,
        table: String,
        message: String,
        missing_table: bool,
    },

    /// Both streams came up empty at a checkpoint stage.
    #[error("Environmental and QA streams are both empty after {0}")]
    JointEmpty(Stage),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One stream emptied by a stage while the other stream still had rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyResultWarning {
    pub stream: Stream,
    pub partition: String,
    pub stage: Stage,
}

impl fmt::Display for EmptyResultWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stream (partition '{}') has no rows after {}",
            self.stream, self.partition, self.stage
        )
    }
}
