use {
    crate::error::{
        Result,
        RlError,
    },
    serde::{
        Deserialize,
        Serialize,
    },
};

/// How live parameters are carried over into the target network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TargetSync {
    /// Copy live parameters exactly, once every `every` training steps.
    Hard { every: usize },

    /// Polyak averaging after every training step:
    /// `target = tau * live + (1 - tau) * target`.
    Soft { tau: f64 },
}

impl Default for TargetSync {
    fn default() -> Self {
        Self::Soft { tau: 0.005 }
    }
}

impl TargetSync {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Hard { every } if every == 0 => Err(RlError::Config(
                "hard target sync frequency must be at least 1".into(),
            )),
            Self::Soft { tau } if tau.is_nan() || tau <= 0.0 || tau > 1.0 => Err(RlError::Config(format!(
                "soft target sync rate must lie in (0, 1], got {tau}"
            ))),
            _ => Ok(()),
        }
    }

    /// The blending rate to apply once training step `step` (1-based) is done.
    ///
    /// A hard sync is a blend with rate 1.0; `None` means the target is left
    /// untouched on this step.
    pub fn blend_at(
        &self,
        step: usize,
    ) -> Option<f64> {
        match *self {
            Self::Hard { every } => (every > 0 && step % every == 0).then_some(1.0),
            Self::Soft { tau } => Some(tau),
        }
    }
}
