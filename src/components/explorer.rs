//! Exploration strategies for value-based agents.
use {
    crate::error::{
        Result,
        RlError,
    },
    rand::{
        distributions::WeightedIndex,
        rngs::StdRng,
        Rng,
    },
    serde::{
        Deserialize,
        Serialize,
    },
};

/// Picks a discrete action from the action values of a single observation.
pub trait Explorer {
    fn action(
        &mut self,
        q_values: &[f64],
        rng: &mut StdRng,
    ) -> Result<usize>;
}

/// Index of the largest value, the first one on ties.
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

fn greedy(q_values: &[f64]) -> Result<usize> {
    argmax(q_values).ok_or_else(|| RlError::shape_mismatch("action values", "at least one action", 0))
}

/// Always take the best action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Greedy;

impl Explorer for Greedy {
    fn action(
        &mut self,
        q_values: &[f64],
        _rng: &mut StdRng,
    ) -> Result<usize> {
        greedy(q_values)
    }
}

/// How epsilon evolves with the number of actions taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EpsilonSchedule {
    /// Linear interpolation from `eps_start` to `eps_final` over `final_step` actions.
    Linear {
        eps_start: f64,
        eps_final: f64,
        final_step: usize,
    },

    /// `eps_start * exploration_decay^n`, floored at `exploration_min`.
    Exponential {
        eps_start: f64,
        exploration_decay: f64,
        exploration_min: f64,
    },
}

/// Epsilon-greedy explorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpsilonGreedy {
    pub schedule: EpsilonSchedule,
    pub n_actions_taken: usize,
}

impl Default for EpsilonGreedy {
    fn default() -> Self {
        Self::linear(1.0, 0.02, 100_000)
    }
}

impl EpsilonGreedy {
    pub fn linear(
        eps_start: f64,
        eps_final: f64,
        final_step: usize,
    ) -> Self {
        Self {
            schedule: EpsilonSchedule::Linear {
                eps_start,
                eps_final,
                final_step,
            },
            n_actions_taken: 0,
        }
    }

    pub fn exponential(
        eps_start: f64,
        exploration_decay: f64,
        exploration_min: f64,
    ) -> Self {
        Self {
            schedule: EpsilonSchedule::Exponential {
                eps_start,
                exploration_decay,
                exploration_min,
            },
            n_actions_taken: 0,
        }
    }

    /// The probability of acting randomly on the next call.
    pub fn epsilon(&self) -> f64 {
        let n = self.n_actions_taken as f64;
        match self.schedule {
            EpsilonSchedule::Linear {
                eps_start,
                eps_final,
                final_step,
            } => {
                let d = (eps_start - eps_final) / final_step.max(1) as f64;
                (eps_start - d * n).max(eps_final)
            }
            EpsilonSchedule::Exponential {
                eps_start,
                exploration_decay,
                exploration_min,
            } => (eps_start * exploration_decay.powf(n)).max(exploration_min),
        }
    }
}

impl Explorer for EpsilonGreedy {
    fn action(
        &mut self,
        q_values: &[f64],
        rng: &mut StdRng,
    ) -> Result<usize> {
        let eps = self.epsilon();
        self.n_actions_taken += 1;
        if q_values.is_empty() {
            return greedy(q_values);
        }
        if rng.gen::<f64>() < eps {
            Ok(rng.gen_range(0..q_values.len()))
        } else {
            greedy(q_values)
        }
    }
}

/// Boltzmann exploration: sample proportionally to `exp(q / temperature)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Softmax {
    pub temperature: f64,
}

impl Default for Softmax {
    fn default() -> Self {
        Self { temperature: 1.0 }
    }
}

impl Softmax {
    pub fn new(temperature: f64) -> Result<Self> {
        let softmax = Self { temperature };
        softmax.validate()?;
        Ok(softmax)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(RlError::Config(format!(
                "softmax temperature must be finite and positive, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

impl Explorer for Softmax {
    fn action(
        &mut self,
        q_values: &[f64],
        rng: &mut StdRng,
    ) -> Result<usize> {
        let best = greedy(q_values)?;
        let max = q_values[best];
        let weights: Vec<f64> = q_values
            .iter()
            .map(|q| ((q - max) / self.temperature).exp())
            .collect();
        let dist = WeightedIndex::new(&weights).map_err(|e| RlError::Divergence {
            context: format!("softmax exploration weights: {e}"),
        })?;
        Ok(rng.sample(dist))
    }
}

/// Serializable choice of explorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExplorerConfig {
    Greedy,
    EpsilonGreedy(EpsilonGreedy),
    Softmax(Softmax),
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self::EpsilonGreedy(EpsilonGreedy::default())
    }
}

impl ExplorerConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Softmax(s) => s.validate(),
            _ => Ok(()),
        }
    }

    pub fn build(&self) -> Result<Box<dyn Explorer>> {
        self.validate()?;
        Ok(match self {
            Self::Greedy => Box::new(Greedy),
            Self::EpsilonGreedy(e) => Box::new(e.clone()),
            Self::Softmax(s) => Box::new(s.clone()),
        })
    }
}
