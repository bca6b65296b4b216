use thiserror::Error;

/// Errors surfaced by the replay buffer and the algorithm wrappers.
///
/// None of these are retried internally. A failed training step never leaves a
/// partially applied update behind.
#[derive(Debug, Error)]
pub enum RlError {
    /// Malformed or inconsistent tensor dimensions. Indicates caller misuse.
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// Sampling was requested before the buffer held enough transitions.
    #[error("insufficient data: requested {requested} transitions, buffer holds {available}")]
    InsufficientData {
        requested: usize,
        available: usize,
    },

    /// A loss or a gradient contained NaN or infinite values.
    #[error("numeric divergence in {context}")]
    Divergence { context: String },

    /// Invalid hyperparameters or an unreadable configuration file.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

impl RlError {
    pub(crate) fn shape_mismatch(
        context: impl Into<String>,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }

    /// Whether the caller can simply skip this training step and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }

    pub fn is_divergence(&self) -> bool {
        matches!(self, Self::Divergence { .. })
    }
}

pub type Result<T> = std::result::Result<T, RlError>;
