//! # Agents
//!
//! Algorithm wrappers that tie a [`ReplayBuffer`], one or more
//! [`NetworkPair`](crate::components::NetworkPair)s and their target sync
//! policies together behind a common update protocol:
//!
//! 1. sample a batch,
//! 2. compute every loss and gradient the algorithm needs,
//! 3. check that all of them are finite,
//! 4. apply the optimiser steps,
//! 5. advance the step counter and sync the target networks.
//!
//! Nothing is applied before step 3 succeeds, so a failed
//! [`Algorithm::train_policy`] leaves every parameter as it was.

mod ddpg;
mod dqn;

pub mod configs;

pub use configs::{
    ActorCriticConfig,
    DdpgConfig,
    DqnConfig,
    OffPolicyConfig,
    RonConfig,
};
pub use ddpg::Ddpg;
pub use dqn::Dqn;

use {
    crate::{
        components::{
            ReplayBuffer,
            Transition,
        },
        error::{
            Result,
            RlError,
        },
    },
    candle_core::{
        backprop::GradStore,
        DType,
        Device,
        Tensor,
        Var,
    },
    std::{
        fmt::Display,
        sync::Arc,
    },
    tracing::warn,
};

/// The execution mode of an agent is either training or testing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunMode {
    #[default]
    Train,
    Test,
}

impl Display for RunMode {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            RunMode::Train => write!(f, "Train"),
            RunMode::Test => write!(f, "Test"),
        }
    }
}

/// What a successful training step did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainStats {
    /// The training step counter after this step.
    pub step: usize,
    /// Loss of the value function (the Q network, or the critic).
    pub critic_loss: f64,
    /// Loss of the policy, for actor-critic algorithms.
    pub actor_loss: Option<f64>,
}

pub trait Algorithm {
    type Config;

    fn config(&self) -> &Self::Config;

    fn from_config(
        device: &Device,
        config: &Self::Config,
        size_state: usize,
        size_action: usize,
        replay_buffer: Arc<ReplayBuffer>,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Pick an action for a single observation, exploring in [`RunMode::Train`].
    fn actions(
        &mut self,
        state: &Tensor,
    ) -> Result<Tensor>;

    /// Run one update on a freshly sampled batch.
    fn train_policy(&mut self) -> Result<TrainStats>;

    /// Number of successful training steps so far.
    fn steps(&self) -> usize;

    fn run_mode(&self) -> RunMode;

    fn set_run_mode(
        &mut self,
        mode: RunMode,
    );
}

pub trait OffPolicyAlgorithm: Algorithm {
    fn remember(
        &self,
        transition: Transition,
    ) -> Result<()> {
        self.replay_buffer().add(transition)
    }

    fn replay_buffer(&self) -> &Arc<ReplayBuffer>;
}

/// `reward + gamma * next_value`, or just `reward` where `done` is set.
///
/// Terminal entries are selected rather than multiplied away, so they equal the
/// reward exactly whatever the target network produced, even NaN or infinity.
pub fn bootstrap_target(
    rewards: &Tensor,
    dones: &Tensor,
    next_values: &Tensor,
    gamma: f64,
) -> Result<Tensor> {
    if rewards.dims() != next_values.dims() || rewards.dims() != dones.dims() {
        return Err(RlError::shape_mismatch(
            "bootstrap target",
            rewards.dims(),
            (dones.dims(), next_values.dims()),
        ));
    }
    let bootstrapped = rewards.add(&(gamma * next_values.detach())?)?;
    let target = dones.to_dtype(DType::U8)?.where_cond(rewards, &bootstrapped)?;
    Ok(target.detach())
}

fn all_finite(t: &Tensor) -> Result<bool> {
    Ok(t
        .flatten_all()?
        .to_dtype(DType::F64)?
        .to_vec1::<f64>()?
        .iter()
        .all(|v| v.is_finite()))
}

/// Fails with [`RlError::Divergence`] if the loss is NaN or infinite.
pub(crate) fn ensure_finite_loss(
    loss: &Tensor,
    context: &str,
) -> Result<f64> {
    let value = loss.to_dtype(DType::F64)?.to_scalar::<f64>()?;
    if !value.is_finite() {
        warn!(context, value, "rejecting update with non-finite loss");
        return Err(RlError::Divergence {
            context: format!("{context} loss is {value}"),
        });
    }
    Ok(value)
}

/// Fails with [`RlError::Divergence`] if any gradient of `vars` is non-finite.
pub(crate) fn ensure_finite_grads(
    grads: &GradStore,
    vars: &[Var],
    context: &str,
) -> Result<()> {
    for var in vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            if !all_finite(grad)? {
                warn!(context, "rejecting update with non-finite gradients");
                return Err(RlError::Divergence {
                    context: format!("{context} gradients"),
                });
            }
        }
    }
    Ok(())
}

/// Reshape a batch of actions to `(n, width)` in the given dtype.
pub(crate) fn batch_actions(
    actions: &Tensor,
    n: usize,
    width: usize,
    dtype: DType,
) -> Result<Tensor> {
    if actions.elem_count() != n * width || actions.dims().first() != Some(&n) {
        return Err(RlError::shape_mismatch("action batch", (n, width), actions.dims()));
    }
    Ok(actions.reshape((n, width))?.to_dtype(dtype)?)
}
