mod ddpg;
mod dqn;

pub use ddpg::DdpgConfig;
pub use dqn::DqnConfig;

use {
    crate::{
        components::{
            ReplayBuffer,
            TargetSync,
        },
        error::{
            Result,
            RlError,
        },
    },
    serde::{
        de::DeserializeOwned,
        Deserialize,
        Deserializer,
        Serialize,
    },
    std::{
        fs,
        path::Path,
        sync::Arc,
    },
};

pub trait ActorCriticConfig {
    fn actor_lr(&self) -> f64;
    fn critic_lr(&self) -> f64;
    fn actor_sync(&self) -> TargetSync;
    fn critic_sync(&self) -> TargetSync;
    fn set_actor_lr(&mut self, lr: f64);
    fn set_critic_lr(&mut self, lr: f64);
    /// Soft-update both target networks with the same rate.
    fn set_tau(&mut self, tau: f64);
}

pub trait OffPolicyConfig {
    fn replay_buffer_capacity(&self) -> usize;
    fn training_batch_size(&self) -> usize;
    fn gamma(&self) -> f64;
    fn seed(&self) -> u64;
    fn set_replay_buffer_capacity(&mut self, capacity: usize);
    fn set_training_batch_size(&mut self, batch_size: usize);
    fn set_gamma(&mut self, gamma: f64);

    /// A replay buffer sized and seeded by this config, ready to be shared.
    fn build_replay_buffer(&self) -> Result<Arc<ReplayBuffer>> {
        Ok(Arc::new(ReplayBuffer::with_seed(
            self.replay_buffer_capacity(),
            self.seed(),
        )?))
    }
}

/// Range checks shared by every off-policy config.
pub(crate) fn validate_off_policy(config: &impl OffPolicyConfig) -> Result<()> {
    let gamma = config.gamma();
    if !(0.0..=1.0).contains(&gamma) {
        return Err(RlError::Config(format!("gamma must lie in [0, 1], got {gamma}")));
    }
    if config.replay_buffer_capacity() == 0 {
        return Err(RlError::Config("replay buffer capacity must be at least 1".into()));
    }
    if config.training_batch_size() == 0 {
        return Err(RlError::Config("training batch size must be at least 1".into()));
    }
    if config.training_batch_size() > config.replay_buffer_capacity() {
        return Err(RlError::Config(format!(
            "training batch size {} can never be sampled from a buffer of capacity {}",
            config.training_batch_size(),
            config.replay_buffer_capacity(),
        )));
    }
    Ok(())
}

pub(crate) fn validate_learning_rate(
    name: &str,
    lr: f64,
) -> Result<()> {
    if lr > 0.0 && lr.is_finite() {
        Ok(())
    } else {
        Err(RlError::Config(format!("{name} must be positive, got {lr}")))
    }
}

/// Read a bare value into `Some`, so optional keys are written `tau: 0.5`
/// rather than `tau: Some(0.5)`.
pub(crate) fn some<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// The sync policy named by the `tau` / `hard_update_frequency` shorthand keys.
pub(crate) fn sync_shorthand(
    tau: Option<f64>,
    hard_update_frequency: Option<usize>,
) -> std::result::Result<Option<TargetSync>, String> {
    match (tau, hard_update_frequency) {
        (Some(_), Some(_)) => Err("`tau` and `hard_update_frequency` are mutually exclusive".into()),
        (Some(tau), None) => Ok(Some(TargetSync::Soft { tau })),
        (None, Some(every)) => Ok(Some(TargetSync::Hard { every })),
        (None, None) => Ok(None),
    }
}

/// Pick the sync policy for `field` from its explicit value or the shorthand.
pub(crate) fn resolve_sync(
    field: &str,
    explicit: Option<TargetSync>,
    shorthand: Option<TargetSync>,
    default: TargetSync,
) -> std::result::Result<TargetSync, String> {
    match (explicit, shorthand) {
        (Some(_), Some(_)) => Err(format!(
            "`{field}` cannot be combined with `tau` or `hard_update_frequency`"
        )),
        (Some(sync), None) | (None, Some(sync)) => Ok(sync),
        (None, None) => Ok(default),
    }
}

/// Reading and writing configs as RON.
pub trait RonConfig: Serialize + DeserializeOwned {
    fn from_ron_str(s: &str) -> Result<Self> {
        ron::from_str(s).map_err(|e| RlError::Config(format!("cannot parse config: {e}")))
    }

    fn from_ron_file(path: &dyn AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .map_err(|e| RlError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_ron_str(&s)
    }

    fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| RlError::Config(format!("cannot serialize config: {e}")))
    }

    fn save_ron(
        &self,
        path: &dyn AsRef<Path>,
    ) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_ron_string()?)
            .map_err(|e| RlError::Config(format!("cannot write {}: {e}", path.display())))
    }
}

impl RonConfig for DqnConfig {}
impl RonConfig for DdpgConfig {}
