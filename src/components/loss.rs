use {
    candle_core::{
        Result,
        Tensor,
    },
    candle_nn::loss::mse,
    serde::{
        Deserialize,
        Serialize,
    },
    strum::EnumIter,
};

/// Regression loss between predicted and bootstrapped values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumIter)]
pub enum LossFunction {
    /// Mean squared error.
    #[default]
    Mse,

    /// Smooth L1 (Huber with delta 1) loss.
    SmoothL1,
}

impl LossFunction {
    /// Mean loss over the batch.
    pub fn compute(
        &self,
        pred: &Tensor,
        target: &Tensor,
    ) -> Result<Tensor> {
        match self {
            Self::Mse => mse(pred, target),
            Self::SmoothL1 => smooth_l1_loss(pred, target),
        }
    }
}

/// `0.5 * d^2` where `|d| < 1`, `|d| - 0.5` elsewhere, averaged.
pub fn smooth_l1_loss(
    pred: &Tensor,
    target: &Tensor,
) -> Result<Tensor> {
    let d = (pred - target)?.abs()?;
    let quadratic = d.lt(1.0)?.to_dtype(d.dtype())?;
    let linear = (1.0 - &quadratic)?;
    let loss = ((0.5 * &quadratic)?.mul(&d.sqr()?)? + linear.mul(&(&d - 0.5)?)?)?;
    loss.mean_all()
}
