//! # Components
//!
//! This module contains the components that algorithm wrappers are built from.
//!
//! ## Transitions and the Replay Buffer
//!
//! A [`Transition`] records one environment step. The [`ReplayBuffer`] keeps a
//! bounded number of them and hands out uniformly sampled [`Batch`]es, which is
//! what off-policy algorithms such as [`crate::agents::Dqn`] and
//! [`crate::agents::Ddpg`] train on.
//!
//! ## Networks
//!
//! A [`NetworkPair`] owns a live network and its target copy. The
//! [`TargetSync`] policy decides when and how strongly the target follows the
//! live network.
//!
//! ## Strategies
//!
//! Exploration ([`Explorer`], [`NoiseProcess`]) and the regression loss
//! ([`LossFunction`]) are plugged into the wrappers rather than hard-coded.

mod explorer;
mod loss;
mod network_pair;
mod noise;
mod replay_buffer;
mod target_sync;
mod transition;

pub use explorer::{
    argmax,
    EpsilonGreedy,
    EpsilonSchedule,
    Explorer,
    ExplorerConfig,
    Greedy,
    Softmax,
};
pub use loss::{
    smooth_l1_loss,
    LossFunction,
};
pub use network_pair::{
    NetworkPair,
    OutputActivation,
};
pub use noise::{
    GaussianNoise,
    NoiseConfig,
    NoiseProcess,
    OuNoise,
};
pub use replay_buffer::ReplayBuffer;
pub use target_sync::TargetSync;
pub use transition::{
    Batch,
    ConsecutiveBatch,
    Transition,
};
