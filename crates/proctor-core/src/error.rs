//! Error types for the proctoring core

use thiserror::Error;

/// Result type alias for proctoring operations
pub type ProctorResult<T> = Result<T, ProctorError>;

/// Errors that can occur while supervising an exam session.
///
/// None of these ever escape a detector callback; they are either turned into a
/// violation (capability failures) or logged and dropped.
#[derive(Error, Debug)]
pub enum ProctorError {
    #[error("Media permission denied: {0}")]
    PermissionDenied(String),

    #[error("Media device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Host API unsupported: {0}")]
    Unsupported(String),

    #[error("Frame capture error: {0}")]
    Capture(String),

    #[error("Fullscreen request rejected: {0}")]
    Fullscreen(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ProctorError {
    /// True for failures that come from camera/microphone acquisition.
    pub fn is_capability_error(&self) -> bool {
        matches!(
            self,
            ProctorError::PermissionDenied(_) | ProctorError::DeviceUnavailable(_)
        )
    }
}
