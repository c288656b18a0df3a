/// Core error types for the depthfx engine.
use std::path::PathBuf;

/// A specialized Result type for depthfx operations.
pub type DepthFxResult<T> = Result<T, DepthFxError>;

/// Top-level error type encompassing all depthfx subsystems.
#[derive(Debug, thiserror::Error)]
pub enum DepthFxError {
    #[error("invalid depth keyframes: {0}")]
    InvalidKeyframes(String),

    #[error("depth asset error: {message} ({path:?})")]
    Asset { message: String, path: PathBuf },

    #[error("GPU backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("pass graph error: {0}")]
    Graph(String),

    #[error("texture slot '{name}' (unit {unit}) is not bound")]
    SlotUnbound { name: String, unit: u32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("depth worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Other(String),
}

impl DepthFxError {
    /// Create a keyframe validation error.
    pub fn keyframes(message: impl Into<String>) -> Self {
        DepthFxError::InvalidKeyframes(message.into())
    }

    /// Create an asset error.
    pub fn asset(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        DepthFxError::Asset {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Create a GPU error from anything printable.
    pub fn gpu(message: impl std::fmt::Display) -> Self {
        DepthFxError::Gpu(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyframes_error_display() {
        let err = DepthFxError::keyframes("frame 3 has 10 bytes, expected 16");
        assert_eq!(
            err.to_string(),
            "invalid depth keyframes: frame 3 has 10 bytes, expected 16"
        );
    }

    #[test]
    fn test_slot_unbound_display() {
        let err = DepthFxError::SlotUnbound {
            name: "coc".into(),
            unit: 3,
        };
        assert!(err.to_string().contains("'coc' (unit 3)"));
    }

    #[test]
    fn test_asset_error_display() {
        let err = DepthFxError::asset("file not found", "/assets/depth.bin");
        assert!(err.to_string().contains("file not found"));
    }
}
