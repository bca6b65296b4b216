use {
    super::transition::{
        Batch,
        ConsecutiveBatch,
        Layout,
        Transition,
    },
    crate::error::{
        Result,
        RlError,
    },
    candle_core::Tensor,
    parking_lot::Mutex,
    rand::{
        distributions::Uniform,
        rngs::StdRng,
        seq::index,
        Rng,
        SeedableRng,
    },
    std::collections::VecDeque,
    tracing::trace,
    unzip_n::unzip_n,
};

unzip_n!(5);

struct Storage {
    buffer: VecDeque<Transition>,
    layout: Option<Layout>,
}

/// A fixed-capacity replay buffer for off-policy algorithms.
///
/// The buffer is a ring buffer / VecDeque: once `capacity` transitions are
/// stored, every insertion evicts the oldest one. Insertion goes through an
/// exclusive lock, so several producers may call [`ReplayBuffer::add`]
/// concurrently while a single trainer samples. Share it with `Arc`.
///
/// # Fields
///
/// * `storage` - The stored transitions and the shape layout they agree on.
/// * `rng` - The randomness source used for sampling.
/// * `capacity` - The capacity of the buffer.
pub struct ReplayBuffer {
    storage: Mutex<Storage>,
    rng: Mutex<StdRng>,
    capacity: usize,
}

impl ReplayBuffer {
    /// Create a new replay buffer with the given capacity, seeded from entropy.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_rng(capacity, StdRng::from_entropy())
    }

    /// Create a new replay buffer whose sampling is reproducible.
    pub fn with_seed(
        capacity: usize,
        seed: u64,
    ) -> Result<Self> {
        Self::with_rng(capacity, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(
        capacity: usize,
        rng: StdRng,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(RlError::Config("replay buffer capacity must be at least 1".into()));
        }
        Ok(Self {
            storage: Mutex::new(Storage {
                buffer: VecDeque::with_capacity(capacity),
                layout: None,
            }),
            rng: Mutex::new(rng),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of stored transitions.
    pub fn size(&self) -> usize {
        self.storage.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Check if the buffer is full.
    pub fn is_full(&self) -> bool {
        self.size() == self.capacity
    }

    /// Push a transition into the buffer.
    ///
    /// If the buffer is full, the oldest transition is removed to make room for
    /// the new transition. Transitions whose observation or action shape
    /// differs from the ones already stored are rejected.
    pub fn add(
        &self,
        transition: Transition,
    ) -> Result<()> {
        let layout = transition.layout();
        let mut storage = self.storage.lock();
        match &storage.layout {
            Some(expected) => expected.check(&layout)?,
            None => storage.layout = Some(layout),
        }

        if storage.buffer.len() == self.capacity {
            storage.buffer.pop_front();
        }
        storage.buffer.push_back(transition);
        trace!(size = storage.buffer.len(), "transition added to replay buffer");
        Ok(())
    }

    /// Sample a random batch of transitions from the buffer.
    ///
    /// Indices are drawn independently and uniformly, with replacement. Fails
    /// with [`RlError::InsufficientData`] when the buffer holds fewer than
    /// `batch_size` transitions.
    pub fn sample(
        &self,
        batch_size: usize,
    ) -> Result<Batch> {
        check_batch_size(batch_size)?;
        let transitions: Vec<Transition> = {
            let storage = self.storage.lock();
            let size = storage.buffer.len();
            if size < batch_size {
                return Err(RlError::InsufficientData {
                    requested: batch_size,
                    available: size,
                });
            }
            let mut rng = self.rng.lock();
            (&mut *rng)
                .sample_iter(Uniform::from(0..size))
                .take(batch_size)
                .map(|i| storage.buffer[i].clone())
                .collect()
        };
        stack(&transitions)
    }

    /// Sample transitions together with the step that directly followed each.
    ///
    /// Only non-terminal transitions that have a stored successor are eligible,
    /// and indices are drawn without replacement. The successor is the next
    /// inserted transition, so this is only meaningful with a single producer.
    pub fn sample_consecutive(
        &self,
        batch_size: usize,
    ) -> Result<ConsecutiveBatch> {
        check_batch_size(batch_size)?;
        let (transitions, successors): (Vec<Transition>, Vec<Transition>) = {
            let storage = self.storage.lock();
            let eligible: Vec<usize> = (0..storage.buffer.len().saturating_sub(1))
                .filter(|&i| !storage.buffer[i].done())
                .collect();
            if eligible.len() < batch_size {
                return Err(RlError::InsufficientData {
                    requested: batch_size,
                    available: eligible.len(),
                });
            }
            let mut rng = self.rng.lock();
            index::sample(&mut *rng, eligible.len(), batch_size)
                .into_iter()
                .map(|k| {
                    let i = eligible[k];
                    (storage.buffer[i].clone(), storage.buffer[i + 1].clone())
                })
                .unzip()
        };

        let batch = stack(&transitions)?;
        let device = batch.rewards.device().clone();
        let next_actions = Tensor::stack(
            &successors.iter().map(|t| t.action().clone()).collect::<Vec<_>>(),
            0,
        )?;
        let next_rewards = Tensor::from_vec(
            successors.iter().map(Transition::reward).collect::<Vec<f64>>(),
            successors.len(),
            &device,
        )?;

        Ok(ConsecutiveBatch {
            batch,
            next_actions,
            next_rewards,
        })
    }

    /// Remove and return every stored transition, oldest first.
    pub fn flush(&self) -> Vec<Transition> {
        let mut storage = self.storage.lock();
        storage.layout = None;
        storage.buffer.drain(..).collect()
    }

    /// Clear the buffer, forgetting the recorded shapes as well.
    pub fn clear(&self) {
        let mut storage = self.storage.lock();
        storage.buffer.clear();
        storage.layout = None;
    }

    /// Copies of the stored transitions, oldest first.
    pub fn transitions(&self) -> Vec<Transition> {
        self.storage.lock().buffer.iter().cloned().collect()
    }
}

fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(RlError::Config("batch size must be at least 1".into()));
    }
    Ok(())
}

fn stack(transitions: &[Transition]) -> Result<Batch> {
    let device = transitions
        .first()
        .map(|t| t.observation().device().clone())
        .ok_or(RlError::InsufficientData {
            requested: 1,
            available: 0,
        })?;
    let n = transitions.len();

    let (observations, actions, rewards, next_observations, dones) = transitions
        .iter()
        .map(|t| {
            (
                t.observation().clone(),
                t.action().clone(),
                t.reward(),
                t.next_observation().clone(),
                t.done() as u8,
            )
        })
        .unzip_n_vec();

    Ok(Batch {
        observations: Tensor::stack(&observations, 0)?,
        actions: Tensor::stack(&actions, 0)?,
        rewards: Tensor::from_vec(rewards, n, &device)?,
        next_observations: Tensor::stack(&next_observations, 0)?,
        dones: Tensor::from_vec(dones, n, &device)?,
    })
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        candle_core::Device,
        std::{
            sync::Arc,
            thread,
        },
    };

    /// A transition whose reward doubles as its identity.
    fn transition(
        id: usize,
        done: bool,
    ) -> Transition {
        let device = Device::Cpu;
        let obs = Tensor::new(&[id as f64, 0.0], &device).unwrap();
        let next_obs = Tensor::new(&[id as f64 + 1.0, 0.0], &device).unwrap();
        let action = Tensor::new(&[id as u32 % 2], &device).unwrap();
        Transition::new(&obs, &action, id as f64, &next_obs, done).unwrap()
    }

    fn rewards(batch: &Batch) -> Vec<f64> {
        batch.rewards.to_vec1::<f64>().unwrap()
    }

    #[test]
    fn evicts_oldest_first() -> anyhow::Result<()> {
        let buffer = ReplayBuffer::with_seed(3, 0)?;
        for id in 1..=5 {
            buffer.add(transition(id, false))?;
        }

        assert_eq!(buffer.size(), 3);
        assert!(buffer.is_full());
        let kept: Vec<f64> = buffer.transitions().iter().map(Transition::reward).collect();
        assert_eq!(kept, vec![3.0, 4.0, 5.0]);

        for _ in 0..50 {
            let batch = buffer.sample(3)?;
            assert_eq!(batch.len(), 3);
            assert!(rewards(&batch).iter().all(|r| *r >= 3.0));
        }
        Ok(())
    }

    #[test]
    fn size_never_exceeds_capacity() -> anyhow::Result<()> {
        let buffer = ReplayBuffer::with_seed(7, 1)?;
        for id in 0..100 {
            buffer.add(transition(id, id % 9 == 0))?;
            assert!(buffer.size() <= 7);
        }
        let kept: Vec<f64> = buffer.transitions().iter().map(Transition::reward).collect();
        assert_eq!(kept, (93..100).map(|i| i as f64).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn sample_requires_enough_data() -> anyhow::Result<()> {
        let buffer = ReplayBuffer::with_seed(10, 0)?;
        buffer.add(transition(0, false))?;
        buffer.add(transition(1, false))?;

        let err = buffer.sample(3).unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(
            err,
            RlError::InsufficientData {
                requested: 3,
                available: 2
            }
        ));
        Ok(())
    }

    #[test]
    fn sample_is_with_replacement_and_batched() -> anyhow::Result<()> {
        let buffer = ReplayBuffer::with_seed(4, 3)?;
        buffer.add(transition(7, true))?;

        let batch = buffer.sample(1)?;
        assert_eq!(batch.observations.dims(), &[1, 2]);
        assert_eq!(batch.actions.dims(), &[1, 1]);
        assert_eq!(batch.dones.to_vec1::<u8>()?, vec![1]);

        buffer.add(transition(8, false))?;
        let batch = buffer.sample(2)?;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.next_observations.dims(), &[2, 2]);

        let repeated = (0..50).any(|_| {
            let ids = rewards(&buffer.sample(2).unwrap());
            ids[0] == ids[1]
        });
        assert!(repeated);
        Ok(())
    }

    #[test]
    fn seeded_buffers_sample_identically() -> anyhow::Result<()> {
        let a = ReplayBuffer::with_seed(16, 42)?;
        let b = ReplayBuffer::with_seed(16, 42)?;
        for id in 0..16 {
            a.add(transition(id, false))?;
            b.add(transition(id, false))?;
        }
        assert_eq!(rewards(&a.sample(8)?), rewards(&b.sample(8)?));
        Ok(())
    }

    #[test]
    fn sample_does_not_mutate() -> anyhow::Result<()> {
        let buffer = ReplayBuffer::with_seed(5, 0)?;
        for id in 0..5 {
            buffer.add(transition(id, false))?;
        }
        let before: Vec<f64> = buffer.transitions().iter().map(Transition::reward).collect();
        buffer.sample(5)?;
        let after: Vec<f64> = buffer.transitions().iter().map(Transition::reward).collect();
        assert_eq!(before, after);
        Ok(())
    }

    #[test]
    fn rejects_inconsistent_shapes() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let buffer = ReplayBuffer::with_seed(5, 0)?;
        buffer.add(transition(0, false))?;

        let obs = Tensor::new(&[0.0f64, 0.0, 0.0], &device)?;
        let action = Tensor::new(&[0u32], &device)?;
        let odd = Transition::new(&obs, &action, 0.0, &obs, false)?;
        assert!(matches!(buffer.add(odd), Err(RlError::ShapeMismatch { .. })));
        assert_eq!(buffer.size(), 1);

        buffer.clear();
        let odd = Transition::new(&obs, &action, 0.0, &obs, false)?;
        buffer.add(odd)?;
        assert_eq!(buffer.size(), 1);
        Ok(())
    }

    #[test]
    fn consecutive_skips_terminal_steps() -> anyhow::Result<()> {
        let buffer = ReplayBuffer::with_seed(10, 9)?;
        for id in 0..6 {
            buffer.add(transition(id, id == 2))?;
        }
        // Eligible: 0, 1, 3, 4 (2 is terminal, 5 has no successor).
        let sampled = buffer.sample_consecutive(4)?;
        let mut ids = rewards(&sampled.batch);
        ids.sort_by(f64::total_cmp);
        assert_eq!(ids, vec![0.0, 1.0, 3.0, 4.0]);

        let batch_ids = rewards(&sampled.batch);
        let next_ids = sampled.next_rewards.to_vec1::<f64>()?;
        for (id, next) in batch_ids.iter().zip(next_ids) {
            assert_eq!(id + 1.0, next);
        }

        assert!(buffer.sample_consecutive(5).is_err());
        Ok(())
    }

    #[test]
    fn flush_drains_in_order() -> anyhow::Result<()> {
        let buffer = ReplayBuffer::with_seed(3, 0)?;
        for id in 0..4 {
            buffer.add(transition(id, false))?;
        }
        let drained: Vec<f64> = buffer.flush().iter().map(Transition::reward).collect();
        assert_eq!(drained, vec![1.0, 2.0, 3.0]);
        assert!(buffer.is_empty());
        Ok(())
    }

    #[test]
    fn concurrent_producers() -> anyhow::Result<()> {
        let buffer = Arc::new(ReplayBuffer::with_seed(64, 0)?);
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..50 {
                        buffer.add(transition(p * 100 + i, false)).unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            if buffer.size() >= 8 {
                assert_eq!(buffer.sample(8)?.len(), 8);
            }
        }
        for producer in producers {
            producer.join().unwrap();
        }
        assert_eq!(buffer.size(), 64);
        Ok(())
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(ReplayBuffer::new(0), Err(RlError::Config(_))));
    }

    #[test]
    fn zero_batch_size_is_a_config_error() -> anyhow::Result<()> {
        let buffer = ReplayBuffer::with_seed(4, 0)?;
        for id in 0..3 {
            buffer.add(transition(id, false))?;
        }
        assert!(matches!(buffer.sample(0), Err(RlError::Config(_))));
        assert!(matches!(buffer.sample_consecutive(0), Err(RlError::Config(_))));
        assert_eq!(buffer.sample(3)?.len(), 3);
        Ok(())
    }

    #[test]
    fn rejects_dtype_changes_at_add() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let buffer = ReplayBuffer::with_seed(4, 0)?;
        let action = Tensor::new(&[0u32], &device)?;
        let obs = Tensor::new(&[1.0f64, 0.0], &device)?;
        buffer.add(Transition::new(&obs, &action, 0.0, &obs, false)?)?;

        let obs32 = Tensor::new(&[1.0f32, 0.0], &device)?;
        let err = buffer.add(Transition::new(&obs32, &action, 0.0, &obs32, false)?).unwrap_err();
        assert!(matches!(err, RlError::ShapeMismatch { .. }), "{err}");

        let float_action = Tensor::new(&[0.0f64], &device)?;
        let err = buffer.add(Transition::new(&obs, &float_action, 0.0, &obs, false)?).unwrap_err();
        assert!(matches!(err, RlError::ShapeMismatch { .. }), "{err}");

        assert_eq!(buffer.size(), 1);
        for _ in 0..20 {
            buffer.sample(2)?;
        }
        Ok(())
    }
}
