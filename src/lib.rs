//! # replay_rl
//!
//! Off-policy reinforcement learning building blocks on top of `candle`:
//!
//! - a bounded, thread-safe experience [`ReplayBuffer`] with uniform sampling,
//! - [`NetworkPair`]s holding a live network and its target copy, kept in step
//!   by a [`TargetSync`] policy (hard copy or Polyak averaging),
//! - the [`Dqn`](agents::Dqn) and [`Ddpg`](agents::Ddpg) algorithm wrappers,
//!   whose training steps are atomic: a step that fails changes nothing.
//!
//! Environments and training loops live outside this crate. A loop drives an
//! agent through [`Algorithm::actions`](agents::Algorithm::actions),
//! [`OffPolicyAlgorithm::remember`](agents::OffPolicyAlgorithm::remember) and
//! [`Algorithm::train_policy`](agents::Algorithm::train_policy).

pub mod logging;

pub mod error;
pub mod components;
pub mod agents;

pub use {
    agents::{
        Algorithm,
        OffPolicyAlgorithm,
        RunMode,
        TrainStats,
    },
    components::{
        Batch,
        NetworkPair,
        ReplayBuffer,
        TargetSync,
        Transition,
    },
    error::{
        Result,
        RlError,
    },
};
