//! 错误类型 (Error handling)

use std::path::PathBuf;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file parse error
    #[error("Config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] Box<ureq::Error>),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Frame resize failure
    #[error("Resize error: {0}")]
    Resize(String),

    /// Capture source failure (transient from the worker's point of view)
    #[error("Capture error: {0}")]
    Capture(String),

    /// Detector collaborator failure
    #[error("Detector error: {0}")]
    Detector(String),

    /// Encoder exited unsuccessfully
    #[error("Encoder failed (status {status}): {stderr}")]
    Encode { status: String, stderr: String },

    /// Encoded output is missing or suspiciously small
    #[error("Encoded clip {path:?} too small: {size} bytes (min {min})")]
    ClipTooSmall { path: PathBuf, size: u64, min: u64 },

    /// Clip job queue is full
    #[error("Clip queue full ({0} pending)")]
    QueueFull(usize),

    /// Nothing to encode
    #[error("No frames to write")]
    NoFrames,

    /// Camera id not present in the registry
    #[error("Unknown camera: {0}")]
    UnknownCamera(String),

    /// Camera id already started
    #[error("Camera already running: {0}")]
    AlreadyRunning(String),
}

impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        Error::Http(Box::new(e))
    }
}
