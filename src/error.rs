use thiserror::Error;

/// Main error type for the reconstruction tool
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Dimension mismatch: buffer of {left} bytes combined with buffer of {right} bytes")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RecoveryError {
    /// Fails with `DimensionMismatch` unless both lengths agree.
    pub fn check_lengths(left: usize, right: usize) -> Result<()> {
        if left == right {
            Ok(())
        } else {
            Err(RecoveryError::DimensionMismatch { left, right })
        }
    }
}

/// Result type alias for reconstruction operations
pub type Result<T> = std::result::Result<T, RecoveryError>;
