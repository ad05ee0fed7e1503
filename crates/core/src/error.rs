use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("{backend} call failed: {details}")]
    DependencyFailure { backend: String, details: String },

    #[error("{backend} call timed out")]
    DependencyTimeout { backend: String },

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("search request failed: {0}")]
    Request(String),
}

impl SearchError {
    /// Classifies a transport error from an external collaborator.
    pub fn dependency(backend: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::DependencyTimeout {
                backend: backend.to_string(),
            }
        } else {
            Self::DependencyFailure {
                backend: backend.to_string(),
                details: error.to_string(),
            }
        }
    }

    pub fn is_dependency(&self) -> bool {
        matches!(
            self,
            Self::DependencyFailure { .. } | Self::DependencyTimeout { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("concept extractor setup failed: {0}")]
    Extractor(#[from] IngestError),

    #[error("graph batch {batch} failed: {source}")]
    Batch {
        batch: usize,
        #[source]
        source: SearchError,
    },
}
