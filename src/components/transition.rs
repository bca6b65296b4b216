use {
    crate::error::{
        Result,
        RlError,
    },
    candle_core::{
        DType,
        DeviceLocation,
        Shape,
        Tensor,
    },
};

/// One recorded environment step.
///
/// # Fields
///
/// * `observation` - The observation the action was taken in.
/// * `action` - The action that was taken.
/// * `reward` - The scalar reward received.
/// * `next_observation` - The observation after the step.
/// * `done` - Whether the step ended the episode.
///
/// Transitions are immutable once created. The tensors are reference counted,
/// so cloning a transition never copies the underlying data.
#[derive(Clone, Debug)]
pub struct Transition {
    observation: Tensor,
    action: Tensor,
    reward: f64,
    next_observation: Tensor,
    done: bool,
}

impl Transition {
    /// Create a transition, checking that both observations have the same shape.
    pub fn new(
        observation: &Tensor,
        action: &Tensor,
        reward: f64,
        next_observation: &Tensor,
        done: bool,
    ) -> Result<Self> {
        if observation.shape() != next_observation.shape() || observation.dtype() != next_observation.dtype() {
            return Err(RlError::shape_mismatch(
                "transition next_observation",
                (observation.shape(), observation.dtype()),
                (next_observation.shape(), next_observation.dtype()),
            ));
        }
        Ok(Self {
            observation: observation.detach(),
            action: action.detach(),
            reward,
            next_observation: next_observation.detach(),
            done,
        })
    }

    pub fn observation(&self) -> &Tensor {
        &self.observation
    }

    pub fn action(&self) -> &Tensor {
        &self.action
    }

    pub fn reward(&self) -> f64 {
        self.reward
    }

    pub fn next_observation(&self) -> &Tensor {
        &self.next_observation
    }

    pub fn done(&self) -> bool {
        self.done
    }

    pub(crate) fn layout(&self) -> Layout {
        Layout {
            observation: self.observation.shape().clone(),
            observation_dtype: self.observation.dtype(),
            action: self.action.shape().clone(),
            action_dtype: self.action.dtype(),
            location: self.observation.device().location(),
        }
    }
}

/// The per-field shapes and dtypes, and the device, every transition in a
/// buffer has to agree on for batches to stack.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Layout {
    pub observation: Shape,
    pub observation_dtype: DType,
    pub action: Shape,
    pub action_dtype: DType,
    pub location: DeviceLocation,
}

impl Layout {
    pub fn check(
        &self,
        other: &Layout,
    ) -> Result<()> {
        if (&self.observation, self.observation_dtype) != (&other.observation, other.observation_dtype) {
            return Err(RlError::shape_mismatch(
                "replay buffer observation",
                (&self.observation, self.observation_dtype),
                (&other.observation, other.observation_dtype),
            ));
        }
        if (&self.action, self.action_dtype) != (&other.action, other.action_dtype) {
            return Err(RlError::shape_mismatch(
                "replay buffer action",
                (&self.action, self.action_dtype),
                (&other.action, other.action_dtype),
            ));
        }
        if self.location != other.location {
            return Err(RlError::shape_mismatch(
                "replay buffer device",
                self.location,
                other.location,
            ));
        }
        Ok(())
    }
}

/// A batch of transitions, stacked field by field along a new leading dimension.
///
/// * `observations` - `(B, ..obs)`
/// * `actions` - `(B, ..act)`
/// * `rewards` - `(B,)`, `f64`
/// * `next_observations` - `(B, ..obs)`
/// * `dones` - `(B,)`, `u8` (1 for terminal transitions)
#[derive(Clone, Debug)]
pub struct Batch {
    pub observations: Tensor,
    pub actions: Tensor,
    pub rewards: Tensor,
    pub next_observations: Tensor,
    pub dones: Tensor,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rewards.dims().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A batch whose entries are each followed by the next step of the same episode.
///
/// `next_actions` and `next_rewards` are the action and reward of the
/// transition that directly succeeded each sampled one.
#[derive(Clone, Debug)]
pub struct ConsecutiveBatch {
    pub batch: Batch,
    pub next_actions: Tensor,
    pub next_rewards: Tensor,
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        candle_core::Device,
    };

    #[test]
    fn rejects_mismatched_observations() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let obs = Tensor::new(&[0.0f64, 1.0], &device)?;
        let next_obs = Tensor::new(&[0.0f64, 1.0, 2.0], &device)?;
        let action = Tensor::new(&[1u32], &device)?;

        let err = Transition::new(&obs, &action, 1.0, &next_obs, false).unwrap_err();
        assert!(matches!(err, RlError::ShapeMismatch { .. }));
        Ok(())
    }

    #[test]
    fn layout_detects_action_change() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let obs = Tensor::new(&[0.0f64, 1.0], &device)?;
        let t1 = Transition::new(&obs, &Tensor::new(&[0.5f64], &device)?, 0.0, &obs, false)?;
        let t2 = Transition::new(&obs, &Tensor::new(&[0.5f64, 0.5], &device)?, 0.0, &obs, true)?;

        assert!(t1.layout().check(&t1.layout()).is_ok());
        assert!(t1.layout().check(&t2.layout()).is_err());
        Ok(())
    }

    #[test]
    fn layout_detects_dtype_change() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let action = Tensor::new(&[1u32], &device)?;
        let obs64 = Tensor::new(&[0.0f64, 1.0], &device)?;
        let obs32 = Tensor::new(&[0.0f32, 1.0], &device)?;
        let t1 = Transition::new(&obs64, &action, 0.0, &obs64, false)?;
        let t2 = Transition::new(&obs32, &action, 0.0, &obs32, false)?;

        let err = t1.layout().check(&t2.layout()).unwrap_err();
        assert!(matches!(err, RlError::ShapeMismatch { .. }));
        assert!(Transition::new(&obs64, &action, 0.0, &obs32, false).is_err());
        Ok(())
    }
}
