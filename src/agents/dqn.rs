use {
    super::{
        batch_actions,
        bootstrap_target,
        configs::DqnConfig,
        ensure_finite_grads,
        ensure_finite_loss,
        Algorithm,
        OffPolicyAlgorithm,
        RunMode,
        TrainStats,
    },
    crate::{
        components::{
            Explorer,
            Greedy,
            NetworkPair,
            OutputActivation,
            ReplayBuffer,
            TargetSync,
        },
        error::{
            Result,
            RlError,
        },
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
    rand::{
        rngs::StdRng,
        SeedableRng,
    },
    std::sync::Arc,
    tracing::{
        debug,
        info,
    },
};

/// Deep Q-learning over a discrete action space.
///
/// Actions are indices `0..n_actions`. Stored transitions carry them as a
/// single-element tensor of any numeric dtype.
pub struct Dqn {
    config: DqnConfig,
    qnet: NetworkPair,
    qnet_vars: Vec<Var>,
    optimizer: AdamW,
    replay_buffer: Arc<ReplayBuffer>,
    explorer: Box<dyn Explorer>,
    rng: StdRng,
    n_actions: usize,
    steps: usize,
    device: Device,
    run_mode: RunMode,
}

impl Dqn {
    pub fn new(
        device: &Device,
        config: &DqnConfig,
        size_state: usize,
        n_actions: usize,
        replay_buffer: Arc<ReplayBuffer>,
        explorer: Box<dyn Explorer>,
    ) -> Result<Self> {
        config.validate()?;
        let qnet = NetworkPair::mlp(
            "qnet",
            &[size_state, config.hidden_1_size, config.hidden_2_size, n_actions],
            OutputActivation::Identity,
            DType::F64,
            device,
        )?;
        let qnet_vars = qnet.live_vars()?;
        let optimizer = AdamW::new(
            qnet_vars.clone(),
            ParamsAdamW {
                lr: config.learning_rate,
                ..Default::default()
            },
        )?;
        info!(size_state, n_actions, target_sync = ?config.target_sync, "constructed DQN agent");

        Ok(Self {
            config: config.clone(),
            qnet,
            qnet_vars,
            optimizer,
            replay_buffer,
            explorer,
            rng: StdRng::seed_from_u64(config.seed),
            n_actions,
            steps: 0,
            device: device.clone(),
            run_mode: RunMode::Train,
        })
    }

    pub fn network(&self) -> &NetworkPair {
        &self.qnet
    }

    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    /// Action values of the live network for a single observation.
    pub fn q_values(
        &self,
        observation: &Tensor,
    ) -> Result<Vec<f64>> {
        let q = self.qnet.predict_item(&observation.to_dtype(DType::F64)?)?;
        Ok(q.to_vec1::<f64>()?)
    }

    /// Pick an action index with the given exploration strategy.
    pub fn select_action(
        &mut self,
        observation: &Tensor,
        explorer: &mut dyn Explorer,
    ) -> Result<usize> {
        let q = self.q_values(observation)?;
        explorer.action(&q, &mut self.rng)
    }

    /// Replace the explorer used by [`Algorithm::actions`].
    pub fn set_explorer(
        &mut self,
        explorer: Box<dyn Explorer>,
    ) {
        self.explorer = explorer;
    }

    /// `max_a Q_target(s', a)`, or `Q_target(s', argmax_a Q(s', a))` for double DQN.
    fn next_values(
        &self,
        next_observations: &Tensor,
    ) -> Result<Tensor> {
        let target_q = self.qnet.predict_target(next_observations)?;
        let values = if self.config.double_dqn {
            let best = self
                .qnet
                .predict(next_observations)?
                .detach()
                .argmax_keepdim(1)?;
            target_q.gather(&best, 1)?.squeeze(1)?
        } else {
            target_q.max(1)?
        };
        Ok(values)
    }

    /// The taken actions as `(n, 1)` u32 indices, all within `0..n_actions`.
    fn action_indices(
        &self,
        actions: &Tensor,
        n: usize,
    ) -> Result<Tensor> {
        let actions = batch_actions(actions, n, 1, DType::F64)?;
        let values = actions.flatten_all()?.to_vec1::<f64>()?;
        if let Some(bad) = values
            .iter()
            .find(|a| a.fract() != 0.0 || **a < 0.0 || **a >= self.n_actions as f64)
        {
            return Err(RlError::shape_mismatch(
                "DQN action index",
                0..self.n_actions,
                bad,
            ));
        }
        Ok(actions.to_dtype(DType::U32)?)
    }
}

impl Algorithm for Dqn {
    type Config = DqnConfig;

    fn config(&self) -> &DqnConfig {
        &self.config
    }

    fn from_config(
        device: &Device,
        config: &DqnConfig,
        size_state: usize,
        size_action: usize,
        replay_buffer: Arc<ReplayBuffer>,
    ) -> Result<Self> {
        Self::new(
            device,
            config,
            size_state,
            size_action,
            replay_buffer,
            config.explorer.build()?,
        )
    }

    fn actions(
        &mut self,
        state: &Tensor,
    ) -> Result<Tensor> {
        let q = self.q_values(state)?;
        let action = match self.run_mode {
            RunMode::Train => self.explorer.action(&q, &mut self.rng)?,
            RunMode::Test => Greedy.action(&q, &mut self.rng)?,
        };
        Ok(Tensor::new(&[action as u32], &self.device)?)
    }

    fn train_policy(&mut self) -> Result<TrainStats> {
        let batch = self.replay_buffer.sample(self.config.training_batch_size)?;
        let n = batch.len();

        let observations = batch.observations.to_dtype(DType::F64)?;
        let next_observations = batch.next_observations.to_dtype(DType::F64)?;
        let rewards = batch.rewards.to_dtype(DType::F64)?;
        let actions = self.action_indices(&batch.actions, n)?;

        let pred = self.qnet.predict(&observations)?.gather(&actions, 1)?.squeeze(1)?;
        let next_values = self.next_values(&next_observations)?;
        let target = bootstrap_target(&rewards, &batch.dones, &next_values, self.config.gamma)?;

        let loss = self.config.loss_function.compute(&pred, &target)?;
        let loss_value = ensure_finite_loss(&loss, "DQN")?;
        let grads = loss.backward()?;
        ensure_finite_grads(&grads, &self.qnet_vars, "DQN")?;
        self.optimizer.step(&grads)?;

        self.steps += 1;
        if self.qnet.sync(&self.config.target_sync, self.steps)? {
            if let TargetSync::Hard { .. } = self.config.target_sync {
                info!(step = self.steps, "hard update of the DQN target network");
            }
        }
        debug!(step = self.steps, loss = loss_value, "DQN training step");

        Ok(TrainStats {
            step: self.steps,
            critic_loss: loss_value,
            actor_loss: None,
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

impl OffPolicyAlgorithm for Dqn {
    fn replay_buffer(&self) -> &Arc<ReplayBuffer> {
        &self.replay_buffer
    }
}
