//! Error types for deskgrab

use thiserror::Error;

/// Main error type for capture operations
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Could not locate the `{0}` service")]
    ServiceUnavailable(String),

    #[error("Screenshot request was declined or failed (status {status})")]
    Declined { status: u32 },

    #[error("Helper capture tool failed: {0}")]
    HelperTool(String),

    #[error("Helper capture tool `{program}` did not finish within {timeout_ms} ms")]
    HelperToolTimeout { program: String, timeout_ms: u64 },

    #[error("Unable to detect desktop environment")]
    EnvironmentDetection,

    #[error("Monitor introspection failed: {0}")]
    GeometryIntrospection(String),

    #[error("D-Bus error: {0}")]
    Bus(String),

    #[error("Invalid portal response: {0}")]
    InvalidResponse(String),

    #[error("X11 connection error: {0}")]
    X11Connection(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using [`CaptureError`]
pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::Image(err.to_string())
    }
}
