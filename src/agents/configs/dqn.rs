use {
    super::{
        resolve_sync,
        some,
        sync_shorthand,
        validate_learning_rate,
        validate_off_policy,
        OffPolicyConfig,
    },
    crate::{
        components::{
            EpsilonGreedy,
            ExplorerConfig,
            LossFunction,
            TargetSync,
        },
        error::Result,
    },
    serde::{
        Deserialize,
        Serialize,
    },
};

/// Hyperparameters of [`Dqn`](crate::agents::Dqn).
///
/// Missing keys take their [`Default`] value and unknown keys are rejected.
/// `tau: t` and `hard_update_frequency: n` are accepted as shorthands for
/// `target_sync: Soft(tau: t)` and `target_sync: Hard(every: n)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DqnConfigRon")]
pub struct DqnConfig {
    // The learning rate of the Q network.
    pub learning_rate: f64,
    // The impact of the q value of the next state on the current state's q value.
    pub gamma: f64,
    // How the target network follows the Q network.
    pub target_sync: TargetSync,
    // The number of neurons in the hidden layers of the Q network.
    pub hidden_1_size: usize,
    pub hidden_2_size: usize,
    // The capacity of the replay buffer used for sampling training data.
    pub replay_buffer_capacity: usize,
    // The training batch size for each training iteration.
    pub training_batch_size: usize,
    pub loss_function: LossFunction,
    // Select the next action with the live network, evaluate it with the target.
    pub double_dqn: bool,
    // Used by `Algorithm::actions` in train mode.
    pub explorer: ExplorerConfig,
    pub seed: u64,
}

/// The accepted RON surface of [`DqnConfig`], aliases and shorthands included.
#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DqnConfigRon {
    #[serde(alias = "lr")]
    learning_rate: f64,
    gamma: f64,
    #[serde(deserialize_with = "some")]
    target_sync: Option<TargetSync>,
    #[serde(deserialize_with = "some")]
    tau: Option<f64>,
    #[serde(deserialize_with = "some")]
    hard_update_frequency: Option<usize>,
    hidden_1_size: usize,
    hidden_2_size: usize,
    #[serde(alias = "capacity", alias = "buffer_size")]
    replay_buffer_capacity: usize,
    #[serde(alias = "batch_size")]
    training_batch_size: usize,
    loss_function: LossFunction,
    double_dqn: bool,
    explorer: ExplorerConfig,
    seed: u64,
}

impl Default for DqnConfigRon {
    fn default() -> Self {
        let config = DqnConfig::default();
        Self {
            learning_rate: config.learning_rate,
            gamma: config.gamma,
            target_sync: None,
            tau: None,
            hard_update_frequency: None,
            hidden_1_size: config.hidden_1_size,
            hidden_2_size: config.hidden_2_size,
            replay_buffer_capacity: config.replay_buffer_capacity,
            training_batch_size: config.training_batch_size,
            loss_function: config.loss_function,
            double_dqn: config.double_dqn,
            explorer: config.explorer,
            seed: config.seed,
        }
    }
}

impl TryFrom<DqnConfigRon> for DqnConfig {
    type Error = String;

    fn try_from(ron: DqnConfigRon) -> std::result::Result<Self, String> {
        let shorthand = sync_shorthand(ron.tau, ron.hard_update_frequency)?;
        Ok(Self {
            learning_rate: ron.learning_rate,
            gamma: ron.gamma,
            target_sync: resolve_sync("target_sync", ron.target_sync, shorthand, DqnConfig::default().target_sync)?,
            hidden_1_size: ron.hidden_1_size,
            hidden_2_size: ron.hidden_2_size,
            replay_buffer_capacity: ron.replay_buffer_capacity,
            training_batch_size: ron.training_batch_size,
            loss_function: ron.loss_function,
            double_dqn: ron.double_dqn,
            explorer: ron.explorer,
            seed: ron.seed,
        })
    }
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            gamma: 0.99,
            target_sync: TargetSync::Soft { tau: 0.005 },
            hidden_1_size: 64,
            hidden_2_size: 64,
            replay_buffer_capacity: 1_000_000,
            training_batch_size: 256,
            loss_function: LossFunction::Mse,
            double_dqn: false,
            explorer: ExplorerConfig::EpsilonGreedy(EpsilonGreedy::exponential(1.0, 0.95, 1e-3)),
            seed: 10,
        }
    }
}

impl DqnConfig {
    pub fn cartpole() -> Self {
        Self {
            learning_rate: 1e-3,
            gamma: 0.99,
            target_sync: TargetSync::Hard { every: 500 },
            hidden_1_size: 256,
            hidden_2_size: 256,
            replay_buffer_capacity: 10_000,
            training_batch_size: 64,
            loss_function: LossFunction::SmoothL1,
            double_dqn: false,
            explorer: ExplorerConfig::EpsilonGreedy(EpsilonGreedy::linear(1.0, 0.02, 10_000)),
            seed: 42,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_off_policy(self)?;
        validate_learning_rate("learning_rate", self.learning_rate)?;
        self.explorer.validate()?;
        self.target_sync.validate()
    }
}

impl OffPolicyConfig for DqnConfig {
    fn replay_buffer_capacity(&self) -> usize {
        self.replay_buffer_capacity
    }
    fn training_batch_size(&self) -> usize {
        self.training_batch_size
    }
    fn gamma(&self) -> f64 {
        self.gamma
    }
    fn seed(&self) -> u64 {
        self.seed
    }
    fn set_replay_buffer_capacity(&mut self, capacity: usize) {
        self.replay_buffer_capacity = capacity;
    }
    fn set_training_batch_size(&mut self, batch_size: usize) {
        self.training_batch_size = batch_size;
    }
    fn set_gamma(&mut self, gamma: f64) {
        self.gamma = gamma;
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            agents::configs::RonConfig,
            error::RlError,
        },
    };

    #[test]
    fn presets_are_valid() -> anyhow::Result<()> {
        DqnConfig::default().validate()?;
        DqnConfig::cartpole().validate()?;
        Ok(())
    }

    #[test]
    fn ron_round_trip_and_aliases() -> anyhow::Result<()> {
        let config = DqnConfig::cartpole();
        assert_eq!(DqnConfig::from_ron_str(&config.to_ron_string()?)?, config);

        let parsed = DqnConfig::from_ron_str(
            "(capacity: 500, batch_size: 32, target_sync: Hard(every: 10), loss_function: SmoothL1)",
        )?;
        assert_eq!(parsed.replay_buffer_capacity, 500);
        assert_eq!(parsed.training_batch_size, 32);
        assert_eq!(parsed.target_sync, TargetSync::Hard { every: 10 });
        assert_eq!(parsed.gamma, DqnConfig::default().gamma);
        Ok(())
    }

    #[test]
    fn sync_shorthands_and_learning_rate() -> anyhow::Result<()> {
        let config = DqnConfig::from_ron_str("(tau: 0.5, learning_rate: 0.1)")?;
        assert_eq!(config.target_sync, TargetSync::Soft { tau: 0.5 });
        assert_eq!(config.learning_rate, 0.1);

        let config = DqnConfig::from_ron_str("(hard_update_frequency: 7, lr: 0.01, buffer_size: 100)")?;
        assert_eq!(config.target_sync, TargetSync::Hard { every: 7 });
        assert_eq!(config.learning_rate, 0.01);
        assert_eq!(config.replay_buffer_capacity, 100);

        for conflicting in [
            "(tau: 0.5, hard_update_frequency: 7)",
            "(tau: 0.5, target_sync: Hard(every: 2))",
        ] {
            assert!(matches!(DqnConfig::from_ron_str(conflicting), Err(RlError::Config(_))));
        }
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = DqnConfig::from_ron_str("(learning_rat: 0.1)").unwrap_err();
        assert!(matches!(err, RlError::Config(_)), "{err}");
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = DqnConfig::default();
        config.set_gamma(1.5);
        assert!(matches!(config.validate(), Err(RlError::Config(_))));

        let mut config = DqnConfig::default();
        config.target_sync = TargetSync::Soft { tau: 0.0 };
        assert!(config.validate().is_err());

        let mut config = DqnConfig::default();
        config.set_replay_buffer_capacity(10);
        config.set_training_batch_size(11);
        assert!(config.validate().is_err());

        let config = DqnConfig {
            learning_rate: -1.0,
            ..DqnConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DqnConfig {
            explorer: ExplorerConfig::Softmax(crate::components::Softmax { temperature: 0.0 }),
            ..DqnConfig::default()
        };
        assert!(matches!(config.validate(), Err(RlError::Config(_))));
    }
}
