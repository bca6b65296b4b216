use {
    crate::error::{
        Result,
        RlError,
    },
    candle_core::{
        Device,
        Tensor,
    },
    rand::{
        rngs::StdRng,
        SeedableRng,
    },
    rand_distr::{
        Distribution,
        Normal,
    },
    serde::{
        Deserialize,
        Serialize,
    },
};

/// A source of exploration noise that is added to continuous actions.
///
/// Noise processes may carry internal state across calls (e.g. temporally
/// correlated noise), which must be reset at the start of every episode.
pub trait NoiseProcess: Send {
    /// Draw the next noise sample, with the same shape as the action.
    fn sample(&mut self) -> Result<Tensor>;

    /// Reset any internal state.
    fn reset(&mut self) -> Result<()>;
}

/// Parameters of the exploration noise used by the actor-critic wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NoiseConfig {
    /// Ornstein-Uhlenbeck process.
    OrnsteinUhlenbeck { mu: f64, theta: f64, sigma: f64 },

    /// Uncorrelated zero-mean gaussian noise.
    Gaussian { sigma: f64 },
}

impl NoiseConfig {
    pub fn build(
        &self,
        size_action: usize,
        seed: u64,
        device: &Device,
    ) -> Result<Box<dyn NoiseProcess>> {
        Ok(match *self {
            Self::OrnsteinUhlenbeck { mu, theta, sigma } => {
                Box::new(OuNoise::new(mu, theta, sigma, size_action, seed, device)?)
            }
            Self::Gaussian { sigma } => {
                Box::new(GaussianNoise::new(sigma, size_action, seed, device)?)
            }
        })
    }
}

/// `N(0, sigma)`, for a finite `sigma >= 0`. `Normal::new` alone lets a
/// negative standard deviation through.
fn std_normal(
    context: &str,
    sigma: f64,
) -> Result<Normal<f64>> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(RlError::Config(format!("{context} needs a finite sigma >= 0, got {sigma}")));
    }
    Normal::new(0.0, sigma).map_err(|e| RlError::Config(format!("{context}: {e}")))
}

/// The Ornstein-Uhlenbeck process.
///
/// `x <- x + theta * (mu - x) + sigma * N(0, 1)`, starting from `mu`.
pub struct OuNoise {
    mu: f64,
    theta: f64,
    diffusion: Normal<f64>,
    state: Vec<f64>,
    rng: StdRng,
    device: Device,
}

impl OuNoise {
    pub fn new(
        mu: f64,
        theta: f64,
        sigma: f64,
        size_action: usize,
        seed: u64,
        device: &Device,
    ) -> Result<Self> {
        if !theta.is_finite() || theta < 0.0 {
            return Err(RlError::Config(format!("OU noise needs a finite theta >= 0, got {theta}")));
        }
        let diffusion = std_normal("OU noise", sigma)?;
        Ok(Self {
            mu,
            theta,
            diffusion,
            state: vec![mu; size_action],
            rng: StdRng::seed_from_u64(seed),
            device: device.clone(),
        })
    }
}

impl NoiseProcess for OuNoise {
    fn sample(&mut self) -> Result<Tensor> {
        for x in self.state.iter_mut() {
            *x += self.theta * (self.mu - *x) + self.diffusion.sample(&mut self.rng);
        }
        Ok(Tensor::from_slice(&self.state, self.state.len(), &self.device)?)
    }

    fn reset(&mut self) -> Result<()> {
        self.state.iter_mut().for_each(|x| *x = self.mu);
        Ok(())
    }
}

/// Independent gaussian noise with a fixed standard deviation.
pub struct GaussianNoise {
    normal: Normal<f64>,
    size_action: usize,
    rng: StdRng,
    device: Device,
}

impl GaussianNoise {
    pub fn new(
        sigma: f64,
        size_action: usize,
        seed: u64,
        device: &Device,
    ) -> Result<Self> {
        let normal = std_normal("gaussian noise", sigma)?;
        Ok(Self {
            normal,
            size_action,
            rng: StdRng::seed_from_u64(seed),
            device: device.clone(),
        })
    }
}

impl NoiseProcess for GaussianNoise {
    fn sample(&mut self) -> Result<Tensor> {
        let data: Vec<f64> = (0..self.size_action)
            .map(|_| self.normal.sample(&mut self.rng))
            .collect();
        Ok(Tensor::from_vec(data, self.size_action, &self.device)?)
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}
