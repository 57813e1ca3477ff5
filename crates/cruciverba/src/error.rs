use thiserror::Error;

/// Errors raised by the record loader, the aggregator and the filter engine
#[derive(Debug, Error)]
pub enum Error {
    /// A date matched neither `YYYY-MM-DD` nor `M/D/YYYY`, or names a day
    /// that does not exist
    #[error("unrecognized date {value:?}: expected YYYY-MM-DD or M/D/YYYY")]
    DataFormat { value: String },

    /// The record document could not be turned into a list of records
    #[error("failed to load records: {0}")]
    Load(String),

    #[error("failed to read record document")]
    Io(#[from] std::io::Error),

    #[error("failed to parse record document")]
    Json(#[from] serde_json::Error),

    /// Programmer error: a filter category or option that was never declared
    #[error("invalid filter configuration: {0}")]
    Configuration(String),
}

impl Error {
    pub(crate) fn data_format(value: impl Into<String>) -> Self {
        Self::DataFormat {
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
