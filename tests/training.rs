use {
    candle_core::{
        Device,
        Tensor,
    },
    replay_rl::{
        agents::{
            bootstrap_target,
            Ddpg,
            DdpgConfig,
            Dqn,
            DqnConfig,
            OffPolicyConfig,
        },
        components::{
            ExplorerConfig,
            NoiseConfig,
        },
        Algorithm,
        OffPolicyAlgorithm,
        ReplayBuffer,
        RlError,
        RunMode,
        TargetSync,
        Transition,
    },
    std::{
        sync::Arc,
        thread,
    },
};

fn scalar_transition(
    id: f64,
    done: bool,
) -> anyhow::Result<Transition> {
    let device = Device::Cpu;
    let obs = Tensor::new(&[id], &device)?;
    let action = Tensor::new(&[0u32], &device)?;
    Ok(Transition::new(&obs, &action, id, &obs, done)?)
}

#[test]
fn capacity_three_keeps_the_three_newest() -> anyhow::Result<()> {
    let buffer = ReplayBuffer::with_seed(3, 0)?;
    for id in 1..=5 {
        buffer.add(scalar_transition(id as f64, false)?)?;
    }
    assert_eq!(buffer.size(), 3);

    let ids: Vec<f64> = buffer.transitions().iter().map(|t| t.reward()).collect();
    assert_eq!(ids, vec![3.0, 4.0, 5.0]);

    for _ in 0..20 {
        let batch = buffer.sample(3)?;
        for r in batch.rewards.to_vec1::<f64>()? {
            assert!([3.0, 4.0, 5.0].contains(&r));
        }
    }
    Ok(())
}

#[test]
fn terminal_transition_target_is_its_reward() -> anyhow::Result<()> {
    let device = Device::Cpu;
    let rewards = Tensor::new(&[5.0f64], &device)?;
    let dones = Tensor::new(&[1u8], &device)?;
    let next = Tensor::new(&[123.0f64], &device)?;
    let target = bootstrap_target(&rewards, &dones, &next, 0.99)?;
    assert_eq!(target.to_vec1::<f64>()?, vec![5.0]);
    Ok(())
}

#[test]
fn dqn_learns_a_one_step_bandit() -> anyhow::Result<()> {
    let config = DqnConfig {
        learning_rate: 1e-2,
        hidden_1_size: 16,
        hidden_2_size: 16,
        replay_buffer_capacity: 256,
        training_batch_size: 16,
        target_sync: TargetSync::Hard { every: 10 },
        explorer: ExplorerConfig::Greedy,
        ..DqnConfig::default()
    };
    let buffer = config.build_replay_buffer()?;
    let mut agent = Dqn::from_config(&Device::Cpu, &config, 2, 2, buffer)?;

    let device = Device::Cpu;
    let obs = Tensor::new(&[1.0f64, 0.0], &device)?;
    for i in 0..64 {
        let action = (i % 2) as u32;
        let reward = if action == 0 { 1.0 } else { 0.0 };
        agent.remember(Transition::new(&obs, &Tensor::new(&[action], &device)?, reward, &obs, true)?)?;
    }

    for _ in 0..300 {
        agent.train_policy()?;
    }
    assert_eq!(agent.steps(), 300);

    let q = agent.q_values(&obs)?;
    assert!(q[0] > q[1], "{q:?}");
    assert!((q[0] - 1.0).abs() < 0.2, "{q:?}");
    assert!(q[1].abs() < 0.2, "{q:?}");

    agent.set_run_mode(RunMode::Test);
    assert_eq!(agent.actions(&obs)?.to_vec1::<u32>()?, vec![0]);
    Ok(())
}

#[test]
fn ddpg_trains_from_concurrent_producers() -> anyhow::Result<()> {
    let config = DdpgConfig {
        hidden_1_size: 32,
        hidden_2_size: 32,
        replay_buffer_capacity: 1_000,
        training_batch_size: 32,
        actor_sync: TargetSync::Soft { tau: 0.05 },
        critic_sync: TargetSync::Hard { every: 5 },
        noise: NoiseConfig::OrnsteinUhlenbeck {
            mu: 0.0,
            theta: 0.15,
            sigma: 0.2,
        },
        ..DdpgConfig::default()
    };
    let buffer: Arc<ReplayBuffer> = config.build_replay_buffer()?;

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || -> replay_rl::Result<()> {
                let device = Device::Cpu;
                for i in 0..50 {
                    let x = (p * 50 + i) as f64 / 200.0;
                    let obs = Tensor::new(&[x, 1.0 - x], &device)?;
                    let next = Tensor::new(&[1.0 - x, x], &device)?;
                    let action = Tensor::new(&[2.0 * x - 1.0], &device)?;
                    let reward = -(action.to_vec1::<f64>()?[0] - 0.5).powi(2);
                    buffer.add(Transition::new(&obs, &action, reward, &next, i % 10 == 9)?)?;
                }
                Ok(())
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer thread panicked")?;
    }
    assert_eq!(buffer.size(), 200);

    let mut agent = Ddpg::from_config(&Device::Cpu, &config, 2, 1, Arc::clone(&buffer))?;
    for step in 1..=20 {
        let stats = agent.train_policy()?;
        assert_eq!(stats.step, step);
        assert!(stats.critic_loss.is_finite());
        assert!(stats.actor_loss.is_some_and(f64::is_finite));
    }
    assert_eq!(
        agent.critic().target_parameters()?.len(),
        agent.critic().live_parameters()?.len()
    );

    agent.reset_episode()?;
    let obs = Tensor::new(&[0.3f64, 0.7], &Device::Cpu)?;
    let action = agent.actions(&obs)?.to_vec1::<f64>()?;
    assert_eq!(action.len(), 1);
    assert!(action[0].abs() <= 1.0);
    Ok(())
}

#[test]
fn training_before_enough_data_is_recoverable() -> anyhow::Result<()> {
    let config = DqnConfig {
        training_batch_size: 4,
        replay_buffer_capacity: 16,
        ..DqnConfig::default()
    };
    let buffer = config.build_replay_buffer()?;
    let mut agent = Dqn::from_config(&Device::Cpu, &config, 1, 2, buffer)?;
    agent.remember(scalar_transition(1.0, false)?)?;

    match agent.train_policy() {
        Err(RlError::InsufficientData { requested, available }) => {
            assert_eq!((requested, available), (4, 1));
        }
        other => panic!("expected InsufficientData, got {other:?}"),
    }
    assert_eq!(agent.steps(), 0);
    Ok(())
}
