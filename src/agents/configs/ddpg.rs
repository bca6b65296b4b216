use {
    super::{
        resolve_sync,
        some,
        sync_shorthand,
        validate_learning_rate,
        validate_off_policy,
        ActorCriticConfig,
        OffPolicyConfig,
    },
    crate::{
        components::{
            LossFunction,
            NoiseConfig,
            TargetSync,
        },
        error::{
            Result,
            RlError,
        },
    },
    serde::{
        Deserialize,
        Serialize,
    },
};

/// Hyperparameters of [`Ddpg`](crate::agents::Ddpg).
///
/// Missing keys take their [`Default`] value and unknown keys are rejected.
/// The shorthands `tau` / `hard_update_frequency` set both target sync
/// policies, and `learning_rate` sets both learning rates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DdpgConfigRon")]
pub struct DdpgConfig {
    // The learning rates for the Actor and Critic networks
    pub actor_learning_rate: f64,
    pub critic_learning_rate: f64,
    // The impact of the q value of the next state on the current state's q value.
    pub gamma: f64,
    // How each target network follows its live network.
    pub actor_sync: TargetSync,
    pub critic_sync: TargetSync,
    // The number of neurons in the hidden layers of the Actor and Critic networks.
    pub hidden_1_size: usize,
    pub hidden_2_size: usize,
    // The capacity of the replay buffer used for sampling training data.
    pub replay_buffer_capacity: usize,
    // The training batch size for each training iteration.
    pub training_batch_size: usize,
    pub loss_function: LossFunction,
    // Exploration noise added to the actor's output in train mode.
    pub noise: NoiseConfig,
    // Actions are clipped to [-max_action, max_action] when set.
    pub max_action: Option<f64>,
    pub seed: u64,
}

impl Default for DdpgConfig {
    fn default() -> Self {
        Self {
            actor_learning_rate: 1e-4,
            critic_learning_rate: 1e-3,
            gamma: 0.99,
            actor_sync: TargetSync::Soft { tau: 0.005 },
            critic_sync: TargetSync::Soft { tau: 0.005 },
            hidden_1_size: 256,
            hidden_2_size: 256,
            replay_buffer_capacity: 1_000_000,
            training_batch_size: 256,
            loss_function: LossFunction::Mse,
            noise: NoiseConfig::OrnsteinUhlenbeck {
                mu: 0.0,
                theta: 0.15,
                sigma: 0.2,
            },
            max_action: Some(1.0),
            seed: 10,
        }
    }
}

/// The accepted RON surface of [`DdpgConfig`], aliases and shorthands included.
#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DdpgConfigRon {
    #[serde(alias = "actor_lr", deserialize_with = "some")]
    actor_learning_rate: Option<f64>,
    #[serde(alias = "critic_lr", deserialize_with = "some")]
    critic_learning_rate: Option<f64>,
    #[serde(deserialize_with = "some")]
    learning_rate: Option<f64>,
    gamma: f64,
    #[serde(deserialize_with = "some")]
    actor_sync: Option<TargetSync>,
    #[serde(deserialize_with = "some")]
    critic_sync: Option<TargetSync>,
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
    noise: NoiseConfig,
    max_action: Option<f64>,
    seed: u64,
}

impl Default for DdpgConfigRon {
    fn default() -> Self {
        let config = DdpgConfig::default();
        Self {
            actor_learning_rate: None,
            critic_learning_rate: None,
            learning_rate: None,
            gamma: config.gamma,
            actor_sync: None,
            critic_sync: None,
            tau: None,
            hard_update_frequency: None,
            hidden_1_size: config.hidden_1_size,
            hidden_2_size: config.hidden_2_size,
            replay_buffer_capacity: config.replay_buffer_capacity,
            training_batch_size: config.training_batch_size,
            loss_function: config.loss_function,
            noise: config.noise,
            max_action: config.max_action,
            seed: config.seed,
        }
    }
}

impl TryFrom<DdpgConfigRon> for DdpgConfig {
    type Error = String;

    fn try_from(ron: DdpgConfigRon) -> std::result::Result<Self, String> {
        let defaults = DdpgConfig::default();
        let shared_lr = ron.learning_rate;
        let learning_rate = |field: &str, explicit: Option<f64>, default: f64| match (explicit, shared_lr) {
            (Some(_), Some(_)) => Err(format!("`{field}` cannot be combined with `learning_rate`")),
            (Some(lr), None) | (None, Some(lr)) => Ok(lr),
            (None, None) => Ok(default),
        };
        let shorthand = sync_shorthand(ron.tau, ron.hard_update_frequency)?;
        Ok(Self {
            actor_learning_rate: learning_rate(
                "actor_learning_rate",
                ron.actor_learning_rate,
                defaults.actor_learning_rate,
            )?,
            critic_learning_rate: learning_rate(
                "critic_learning_rate",
                ron.critic_learning_rate,
                defaults.critic_learning_rate,
            )?,
            gamma: ron.gamma,
            actor_sync: resolve_sync("actor_sync", ron.actor_sync, shorthand, defaults.actor_sync)?,
            critic_sync: resolve_sync("critic_sync", ron.critic_sync, shorthand, defaults.critic_sync)?,
            hidden_1_size: ron.hidden_1_size,
            hidden_2_size: ron.hidden_2_size,
            replay_buffer_capacity: ron.replay_buffer_capacity,
            training_batch_size: ron.training_batch_size,
            loss_function: ron.loss_function,
            noise: ron.noise,
            max_action: ron.max_action,
            seed: ron.seed,
        })
    }
}

impl DdpgConfig {
    pub fn pendulum() -> Self {
        Self {
            actor_learning_rate: 1e-4,
            critic_learning_rate: 1e-3,
            gamma: 0.99,
            actor_sync: TargetSync::Soft { tau: 0.005 },
            critic_sync: TargetSync::Soft { tau: 0.005 },
            hidden_1_size: 400,
            hidden_2_size: 300,
            replay_buffer_capacity: 100_000,
            training_batch_size: 100,
            loss_function: LossFunction::Mse,
            noise: NoiseConfig::OrnsteinUhlenbeck {
                mu: 0.0,
                theta: 0.15,
                sigma: 0.1,
            },
            max_action: Some(1.0),
            seed: 42,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_off_policy(self)?;
        validate_learning_rate("actor_learning_rate", self.actor_learning_rate)?;
        validate_learning_rate("critic_learning_rate", self.critic_learning_rate)?;
        self.actor_sync.validate()?;
        self.critic_sync.validate()?;
        match self.max_action {
            Some(m) if m.is_nan() || m <= 0.0 => Err(RlError::Config(format!("max_action must be positive, got {m}"))),
            _ => Ok(()),
        }
    }
}

impl ActorCriticConfig for DdpgConfig {
    fn actor_lr(&self) -> f64 {
        self.actor_learning_rate
    }
    fn critic_lr(&self) -> f64 {
        self.critic_learning_rate
    }
    fn actor_sync(&self) -> TargetSync {
        self.actor_sync
    }
    fn critic_sync(&self) -> TargetSync {
        self.critic_sync
    }
    fn set_actor_lr(&mut self, lr: f64) {
        self.actor_learning_rate = lr;
    }
    fn set_critic_lr(&mut self, lr: f64) {
        self.critic_learning_rate = lr;
    }
    fn set_tau(&mut self, tau: f64) {
        self.actor_sync = TargetSync::Soft { tau };
        self.critic_sync = TargetSync::Soft { tau };
    }
}

impl OffPolicyConfig for DdpgConfig {
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
