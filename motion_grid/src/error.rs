//! Error types for the motion grid engine.

/// Top-level error type for every fallible operation in the engine.
#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("Frame acquisition unavailable: {message}")]
    AcquisitionUnavailable { message: String },

    #[error("Failed to bind outbound transport on {address}: {source}")]
    TransportBind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Dimension mismatch: expected {}x{}, got {}x{}", expected.0, expected.1, actual.0, actual.1)]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("OSC error: {message}")]
    Osc { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Result type alias using MotionError.
pub type MotionResult<T> = Result<T, MotionError>;

impl MotionError {
    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::AcquisitionUnavailable {
            message: msg.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn osc(msg: impl Into<String>) -> Self {
        Self::Osc {
            message: msg.into(),
        }
    }

    pub fn dimension_mismatch(expected: (u32, u32), actual: (u32, u32)) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Acquisition failures are skipped per tick; everything else is not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AcquisitionUnavailable { .. } | Self::Transport { .. }
        )
    }
}
