//! Error types for the cycle engine

use thiserror::Error;

/// Result type for cycle operations
pub type Result<T> = std::result::Result<T, CycleError>;

/// Errors that can occur while running a capture/inference cycle
///
/// Apart from [`CycleError::CameraInit`] and [`CycleError::Config`], which
/// surface at startup, every variant is confined to the cycle that raised it.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Camera produced no frame
    #[error("capture failed: {0}")]
    Capture(String),

    /// Cycle buffer could not be acquired
    #[error("failed to allocate {requested} byte buffer: {reason}")]
    Allocation { requested: usize, reason: String },

    /// Encoded frame was malformed or did not match the sensor resolution
    #[error("decode failed: {0}")]
    Decode(String),

    /// Crop/resize to model resolution failed
    #[error("resize failed: {0}")]
    Resize(String),

    /// Thumbnail re-encode failed (cycle continues without a thumbnail)
    #[error("encode failed: {0}")]
    Encode(String),

    /// Classifier reported a non-OK status
    #[error("inference failed (status {code}): {message}")]
    Inference { code: i32, message: String },

    /// Pass exceeded the configured per-cycle deadline
    #[error("cycle exceeded {deadline_ms}ms deadline after {stage}")]
    Timeout {
        deadline_ms: u64,
        stage: &'static str,
    },

    /// Cancel token was set between stages
    #[error("cycle cancelled after {0}")]
    Cancelled(&'static str),

    /// Camera collaborator failed to initialize
    #[error("camera init failed: {0}")]
    CameraInit(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl CycleError {
    /// Stable name of the failure kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Capture(_) => "capture",
            Self::Allocation { .. } => "allocation",
            Self::Decode(_) => "decode",
            Self::Resize(_) => "resize",
            Self::Encode(_) => "encode",
            Self::Inference { .. } => "inference",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled(_) => "cancelled",
            Self::CameraInit(_) => "camera_init",
            Self::Config(_) => "config",
        }
    }
}

/// Startup failures surface through the shared error type
impl From<CycleError> for autoeye::Error {
    fn from(err: CycleError) -> Self {
        match err {
            CycleError::Config(msg) => autoeye::Error::Config(msg),
            other => autoeye::Error::Internal(other.to_string()),
        }
    }
}
