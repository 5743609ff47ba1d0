use std::path::PathBuf;

use crate::chart::ChartError;
use crate::inspector::InspectError;

/// Failure of one pipeline stage. The first one encountered aborts the run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("failed to retrieve repository {url}: {message}")]
    Retrieval { url: String, message: String },

    #[error("failed to read {}: {source}", .path.display())]
    Structure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("failed to pull image {image}: {message}")]
    RuntimeUnavailable { image: String, message: String },

    #[error("{0}")]
    Metadata(String),
}

impl PipelineError {
    /// HTTP status class the web front end reports for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::Structure { .. } | Self::NotFound(_) => 404,
            _ => 500,
        }
    }
}

impl From<ChartError> for PipelineError {
    fn from(err: ChartError) -> Self {
        match err {
            ChartError::ChartsDirUnreadable { path, source } => Self::Structure { path, source },
            ChartError::NoValidChart => Self::NotFound(err.to_string()),
            // A chart file that exists but cannot be opened is an I/O failure
            // inside the repository layout.
            ChartError::FileRead { path, source } => Self::Structure { path, source },
        }
    }
}

impl From<InspectError> for PipelineError {
    fn from(err: InspectError) -> Self {
        match err {
            InspectError::Pull { image, message } => Self::RuntimeUnavailable { image, message },
            other => Self::Metadata(other.to_string()),
        }
    }
}
