use {
    super::{
        batch_actions,
        bootstrap_target,
        configs::DdpgConfig,
        ensure_finite_grads,
        ensure_finite_loss,
        Algorithm,
        OffPolicyAlgorithm,
        RunMode,
        TrainStats,
    },
    crate::{
        components::{
            Batch,
            NetworkPair,
            NoiseProcess,
            OutputActivation,
            ReplayBuffer,
        },
        error::Result,
    },
    candle_core::{
        DType,
        Device,
        Tensor,
        Var,
    },
    candle_nn::{
        AdamW,
        Optimizer,
        ParamsAdamW,
    },
    std::sync::Arc,
    tracing::{
        debug,
        info,
    },
};

/// The policy network pair. Outputs are squashed into [-1, 1] by a tanh.
struct Actor {
    pair: NetworkPair,
    vars: Vec<Var>,
    optim: AdamW,
}

impl Actor {
    fn new(
        device: &Device,
        dims: &[usize],
        lr: f64,
    ) -> Result<Self> {
        let pair = NetworkPair::mlp("actor", dims, OutputActivation::Tanh, DType::F64, device)?;
        let vars = pair.live_vars()?;
        let optim = AdamW::new(
            vars.clone(),
            ParamsAdamW {
                lr,
                ..Default::default()
            },
        )?;
        Ok(Self { pair, vars, optim })
    }

    fn forward(
        &self,
        state: &Tensor,
    ) -> Result<Tensor> {
        self.pair.predict(state)
    }

    fn target_forward(
        &self,
        state: &Tensor,
    ) -> Result<Tensor> {
        self.pair.predict_target(state)
    }
}

/// The action-value network pair, fed the action and state concatenated.
struct Critic {
    pair: NetworkPair,
    vars: Vec<Var>,
    optim: AdamW,
}

impl Critic {
    fn new(
        device: &Device,
        dims: &[usize],
        lr: f64,
    ) -> Result<Self> {
        let pair = NetworkPair::mlp("critic", dims, OutputActivation::Identity, DType::F64, device)?;
        let vars = pair.live_vars()?;
        let optim = AdamW::new(
            vars.clone(),
            ParamsAdamW {
                lr,
                ..Default::default()
            },
        )?;
        Ok(Self { pair, vars, optim })
    }

    fn forward(
        &self,
        state: &Tensor,
        action: &Tensor,
    ) -> Result<Tensor> {
        let xs = Tensor::cat(&[action, state], 1)?;
        Ok(self.pair.predict(&xs)?.squeeze(1)?)
    }

    fn target_forward(
        &self,
        state: &Tensor,
        action: &Tensor,
    ) -> Result<Tensor> {
        let xs = Tensor::cat(&[action, state], 1)?;
        Ok(self.pair.predict_target(&xs)?.squeeze(1)?)
    }

    fn snapshot(&self) -> Result<Vec<Tensor>> {
        self.vars
            .iter()
            .map(|var| Ok(var.as_tensor().copy()?))
            .collect()
    }

    fn restore(
        &self,
        snapshot: &[Tensor],
    ) -> Result<()> {
        for (var, saved) in self.vars.iter().zip(snapshot) {
            var.set(saved)?;
        }
        Ok(())
    }
}

/// Deep deterministic policy gradient over a continuous action space.
pub struct Ddpg {
    config: DdpgConfig,
    actor: Actor,
    critic: Critic,
    replay_buffer: Arc<ReplayBuffer>,
    noise: Box<dyn NoiseProcess>,
    size_state: usize,
    size_action: usize,
    steps: usize,
    run_mode: RunMode,
}

impl Ddpg {
    pub fn new(
        device: &Device,
        config: &DdpgConfig,
        size_state: usize,
        size_action: usize,
        replay_buffer: Arc<ReplayBuffer>,
        noise: Box<dyn NoiseProcess>,
    ) -> Result<Self> {
        config.validate()?;
        let actor = Actor::new(
            device,
            &[size_state, config.hidden_1_size, config.hidden_2_size, size_action],
            config.actor_learning_rate,
        )?;
        let critic = Critic::new(
            device,
            &[size_state + size_action, config.hidden_1_size, config.hidden_2_size, 1],
            config.critic_learning_rate,
        )?;
        info!(
            size_state,
            size_action,
            actor_sync = ?config.actor_sync,
            critic_sync = ?config.critic_sync,
            "constructed DDPG agent",
        );

        Ok(Self {
            config: config.clone(),
            actor,
            critic,
            replay_buffer,
            noise,
            size_state,
            size_action,
            steps: 0,
            run_mode: RunMode::Train,
        })
    }

    pub fn actor(&self) -> &NetworkPair {
        &self.actor.pair
    }

    pub fn critic(&self) -> &NetworkPair {
        &self.critic.pair
    }

    pub fn size_state(&self) -> usize {
        self.size_state
    }

    pub fn size_action(&self) -> usize {
        self.size_action
    }

    /// Replace the exploration noise process.
    pub fn set_noise(
        &mut self,
        noise: Box<dyn NoiseProcess>,
    ) {
        self.noise = noise;
    }

    /// Reset the noise process at the start of an episode.
    pub fn reset_episode(&mut self) -> Result<()> {
        self.noise.reset()
    }

    /// The actor's action for a single observation, noisy when `explore` is set.
    pub fn select_action(
        &mut self,
        observation: &Tensor,
        explore: bool,
    ) -> Result<Tensor> {
        let action = self
            .actor
            .pair
            .predict_item(&observation.to_dtype(DType::F64)?)?;
        let action = if explore {
            action.add(&self.noise.sample()?.to_dtype(DType::F64)?)?
        } else {
            action
        };
        Ok(match self.config.max_action {
            Some(max) => action.clamp(-max, max)?,
            None => action,
        })
    }

    /// Regression loss of the live critic against the bootstrapped target.
    fn critic_loss(
        &self,
        batch: &Batch,
    ) -> Result<Tensor> {
        let n = batch.len();
        let states = batch.observations.to_dtype(DType::F64)?;
        let next_states = batch.next_observations.to_dtype(DType::F64)?;
        let rewards = batch.rewards.to_dtype(DType::F64)?;
        let actions = batch_actions(&batch.actions, n, self.size_action, DType::F64)?;

        let q_target = self
            .critic
            .target_forward(&next_states, &self.actor.target_forward(&next_states)?)?;
        let q_target = bootstrap_target(&rewards, &batch.dones, &q_target, self.config.gamma)?;
        let q = self.critic.forward(&states, &actions)?;
        Ok(self.config.loss_function.compute(&q, &q_target)?)
    }

    /// `-mean Q(s, actor(s))` under the live critic.
    fn actor_loss(
        &self,
        states: &Tensor,
    ) -> Result<Tensor> {
        Ok(self
            .critic
            .forward(states, &self.actor.forward(states)?)?
            .mean_all()?
            .neg()?)
    }

    fn actor_step(
        &mut self,
        states: &Tensor,
    ) -> Result<f64> {
        let actor_loss = self.actor_loss(states)?;
        let value = ensure_finite_loss(&actor_loss, "DDPG actor")?;
        let actor_grads = actor_loss.backward()?;
        ensure_finite_grads(&actor_grads, &self.actor.vars, "DDPG actor")?;
        self.actor.optim.step(&actor_grads)?;
        Ok(value)
    }
}

impl Algorithm for Ddpg {
    type Config = DdpgConfig;

    fn config(&self) -> &DdpgConfig {
        &self.config
    }

    fn from_config(
        device: &Device,
        config: &DdpgConfig,
        size_state: usize,
        size_action: usize,
        replay_buffer: Arc<ReplayBuffer>,
    ) -> Result<Self> {
        let noise = config.noise.build(size_action, config.seed, device)?;
        Self::new(device, config, size_state, size_action, replay_buffer, noise)
    }

    fn actions(
        &mut self,
        state: &Tensor,
    ) -> Result<Tensor> {
        let explore = self.run_mode == RunMode::Train;
        self.select_action(state, explore)
    }

    /// One critic and one actor update on the same batch.
    ///
    /// The critic is stepped first, and the actor's gradient is then taken
    /// through the updated critic in a separate backward pass that only the
    /// actor's optimiser sees. If the actor half turns out non-finite, the
    /// critic parameters are restored before the error is returned.
    fn train_policy(&mut self) -> Result<TrainStats> {
        let batch = self.replay_buffer.sample(self.config.training_batch_size)?;
        let states = batch.observations.to_dtype(DType::F64)?;

        let critic_loss = self.critic_loss(&batch)?;
        let critic_loss_value = ensure_finite_loss(&critic_loss, "DDPG critic")?;
        let critic_grads = critic_loss.backward()?;
        ensure_finite_grads(&critic_grads, &self.critic.vars, "DDPG critic")?;

        let critic_before = self.critic.snapshot()?;
        self.critic.optim.step(&critic_grads)?;
        let actor_loss_value = match self.actor_step(&states) {
            Ok(value) => value,
            Err(err) => {
                self.critic.restore(&critic_before)?;
                return Err(err);
            }
        };

        self.steps += 1;
        let critic_synced = self.critic.pair.sync(&self.config.critic_sync, self.steps)?;
        let actor_synced = self.actor.pair.sync(&self.config.actor_sync, self.steps)?;
        debug!(
            step = self.steps,
            critic_loss = critic_loss_value,
            actor_loss = actor_loss_value,
            critic_synced,
            actor_synced,
            "DDPG training step",
        );

        Ok(TrainStats {
            step: self.steps,
            critic_loss: critic_loss_value,
            actor_loss: Some(actor_loss_value),
        })
    }

    fn steps(&self) -> usize {
        self.steps
    }

    fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    fn set_run_mode(
        &mut self,
        mode: RunMode,
    ) {
        self.run_mode = mode;
    }
}

impl OffPolicyAlgorithm for Ddpg {
    fn replay_buffer(&self) -> &Arc<ReplayBuffer> {
        &self.replay_buffer
    }
}
