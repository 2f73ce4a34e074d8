use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Task {task_id} cancelled")]
    Cancelled { task_id: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl BlobError {
    /// True when the underlying bridge reported a missing path
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::Bridge(e) if e.is_not_found())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BlobError::Cancelled { .. })
    }
}

impl From<std::io::Error> for BlobError {
    fn from(err: std::io::Error) -> Self {
        BlobError::Bridge(BridgeError::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, BlobError>;
