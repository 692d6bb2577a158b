use mapsearch_sources::SourceError;
use thiserror::Error;

use crate::store::CandidateId;

#[derive(Error, Debug)]
pub enum SearchError {
    /// Every enabled source failed for one query.
    #[error("{message}")]
    AggregateFailure { failed: usize, message: String },
    /// A secondary lookup succeeded but returned no features.
    #[error("No data available: {0}")]
    NoData(String),
    /// Resolution reached no rule, or a required option is missing.
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Unknown layer '{0}'")]
    UnknownLayer(String),
    #[error("Candidate has no '{0}' attribute")]
    MissingAttribute(String),
    #[error("No suggestion with id {0}")]
    UnknownCandidate(CandidateId),
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Init Logging error: {0}")]
    InitLogging(#[from] tracing_subscriber::filter::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SearchError {
    /// Errors that must be shown to the user as a blocking notice rather than logged.
    pub const fn is_notice(&self) -> bool {
        matches!(self, Self::NoData(_))
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
