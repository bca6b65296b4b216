use {
    super::target_sync::TargetSync,
    crate::error::{
        Result,
        RlError,
    },
    candle_core::{
        DType,
        Device,
        Module,
        Tensor,
        Var,
    },
    candle_nn::{
        func,
        linear,
        sequential::seq,
        Activation,
        Sequential,
        VarBuilder,
        VarMap,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        collections::HashMap,
        sync::MutexGuard,
    },
    tracing::trace,
};

const TARGET_PREFIX: &str = "target-";

/// Activation applied after the last linear layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputActivation {
    #[default]
    Identity,
    Tanh,
}

fn make_network(
    vb: &VarBuilder,
    prefix: &str,
    dims: &[(usize, usize)],
    output: OutputActivation,
) -> candle_core::Result<Sequential> {
    let mut network = seq();
    for (i, &(in_dim, out_dim)) in dims.iter().enumerate() {
        network = network.add(linear(in_dim, out_dim, vb.pp(format!("{prefix}-fc{i}")))?);
        if i + 1 < dims.len() {
            network = network.add(Activation::Relu);
        }
    }
    Ok(match output {
        OutputActivation::Identity => network,
        OutputActivation::Tanh => network.add(func(|xs| xs.tanh())),
    })
}

/// A live network and its target copy.
///
/// Both networks are multilayer perceptrons with ReLU hidden activations whose
/// parameters live in one [`VarMap`], under `{name}-fc{i}` for the live network
/// and `target-{name}-fc{i}` for the target. The target starts as an exact copy
/// of the live network and only ever changes through [`NetworkPair::sync`].
///
/// # Fields
///
/// * `name` - Prefix of the live parameters.
/// * `varmap` - Holds the parameters of both networks.
/// * `network` - The live network, trained by gradient descent.
/// * `target_network` - The slowly tracking target network.
/// * `dims` - `(in, out)` of every linear layer.
pub struct NetworkPair {
    name: String,
    varmap: VarMap,
    network: Sequential,
    target_network: Sequential,
    dims: Vec<(usize, usize)>,
    dtype: DType,
}

impl NetworkPair {
    /// Build a pair of MLPs with the given layer sizes, `[input, hidden.., output]`.
    pub fn mlp(
        name: &str,
        sizes: &[usize],
        output: OutputActivation,
        dtype: DType,
        device: &Device,
    ) -> Result<Self> {
        if sizes.len() < 2 || sizes.contains(&0) {
            return Err(RlError::Config(format!(
                "network {name} needs at least an input and an output size, all non-zero, got {sizes:?}"
            )));
        }
        let dims: Vec<(usize, usize)> = sizes.windows(2).map(|w| (w[0], w[1])).collect();

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, dtype, device);
        let network = make_network(&vb, name, &dims, output)?;
        let target_network = make_network(&vb, &format!("{TARGET_PREFIX}{name}"), &dims, output)?;

        let pair = Self {
            name: name.to_owned(),
            varmap,
            network,
            target_network,
            dims,
            dtype,
        };
        pair.hard_update()?;
        Ok(pair)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_dim(&self) -> usize {
        self.dims[0].0
    }

    pub fn output_dim(&self) -> usize {
        self.dims[self.dims.len() - 1].1
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Forward pass through the live network. `input` is `(batch, input_dim)`.
    pub fn predict(
        &self,
        input: &Tensor,
    ) -> Result<Tensor> {
        self.check_input(input)?;
        Ok(self.network.forward(input)?)
    }

    /// Forward pass through the target network, cut from the autograd graph.
    pub fn predict_target(
        &self,
        input: &Tensor,
    ) -> Result<Tensor> {
        self.check_input(input)?;
        Ok(self.target_network.forward(input)?.detach())
    }

    /// Live forward pass on a single unbatched input, without gradient tracking.
    pub fn predict_item(
        &self,
        input: &Tensor,
    ) -> Result<Tensor> {
        Ok(self.predict(&input.detach().unsqueeze(0)?)?.squeeze(0)?.detach())
    }

    fn check_input(
        &self,
        input: &Tensor,
    ) -> Result<()> {
        match input.dims() {
            [_, d] if *d == self.input_dim() => Ok(()),
            dims => Err(RlError::shape_mismatch(
                format!("{} input", self.name),
                ("batch", self.input_dim()),
                dims,
            )),
        }
    }

    /// The live parameters, for handing to an optimiser.
    pub fn live_vars(&self) -> Result<Vec<Var>> {
        let live_prefix = format!("{}-fc", self.name);
        let mut vars: Vec<(String, Var)> = self
            .lock_vars()?
            .iter()
            .filter_map(|(name, var)| name.starts_with(&live_prefix).then(|| (name.clone(), var.clone())))
            .collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(vars.into_iter().map(|(_, var)| var).collect())
    }

    /// Snapshot of the live parameters, sorted by layer name.
    pub fn live_parameters(&self) -> Result<Vec<(String, Tensor)>> {
        self.snapshot(&format!("{}-fc", self.name))
    }

    /// Snapshot of the target parameters, named like their live counterparts.
    pub fn target_parameters(&self) -> Result<Vec<(String, Tensor)>> {
        self.snapshot(&format!("{TARGET_PREFIX}{}-fc", self.name))
    }

    fn snapshot(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, Tensor)>> {
        let vars = self.lock_vars()?;
        let mut params = Vec::new();
        for (name, var) in vars.iter().filter(|(name, _)| name.starts_with(prefix)) {
            let layer = &name[prefix.len()..];
            params.push((format!("fc{layer}"), var.as_tensor().copy()?));
        }
        params.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(params)
    }

    /// Update the target network as the sync policy prescribes after `step`.
    ///
    /// Returns whether the target network was touched.
    pub fn sync(
        &self,
        mode: &TargetSync,
        step: usize,
    ) -> Result<bool> {
        match mode.blend_at(step) {
            Some(tau) => {
                self.track(tau)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Copy the live parameters into the target network exactly.
    pub fn hard_update(&self) -> Result<()> {
        self.track(1.0)
    }

    /// `target = tau * live + (1 - tau) * target`
    pub fn soft_update(
        &self,
        tau: f64,
    ) -> Result<()> {
        TargetSync::Soft { tau }.validate()?;
        self.track(tau)
    }

    fn track(
        &self,
        tau: f64,
    ) -> Result<()> {
        let vars = self.lock_vars()?;
        let target_prefix = format!("{TARGET_PREFIX}{}-fc", self.name);
        for (name, target) in vars.iter().filter(|(name, _)| name.starts_with(&target_prefix)) {
            let live_name = &name[TARGET_PREFIX.len()..];
            let live = vars.get(live_name).ok_or_else(|| {
                RlError::Candle(candle_core::Error::Msg(format!("no live parameter {live_name}")))
            })?;
            if tau == 1.0 {
                target.set(live.as_tensor())?;
            } else {
                let blended = ((tau * live.as_tensor())? + ((1.0 - tau) * target.as_tensor())?)?;
                target.set(&blended)?;
            }
        }
        trace!(network = self.name, tau, "target network tracked");
        Ok(())
    }

    fn lock_vars(&self) -> Result<MutexGuard<'_, HashMap<String, Var>>> {
        self.varmap
            .data()
            .lock()
            .map_err(|_| RlError::Candle(candle_core::Error::Msg(format!("{} parameters poisoned", self.name))))
    }
}
