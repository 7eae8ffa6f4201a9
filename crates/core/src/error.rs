use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("{engine} produced only {chars} characters")]
    InsufficientText { engine: String, chars: usize },

    #[error("{engine} unavailable: {reason}")]
    EngineUnavailable { engine: String, reason: String },

    #[error("malformed recognition output: {0}")]
    MalformedOutput(#[from] serde_json::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("background task failed: {0}")]
    Join(String),
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{backend} is rate limited")]
    RateLimited { backend: String },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("{backend} returned an empty response")]
    EmptyResponse { backend: String },

    #[error("{backend} cannot accept {mime_type} attachments")]
    UnsupportedAttachment { backend: String, mime_type: String },
}

impl InferenceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, InferenceError::RateLimited { .. })
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
