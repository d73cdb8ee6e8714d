//! # Dropout Variants
//!
//! A [`DropoutLayer`] applies one of several [`DropoutKind`] regularizers
//! to a channels-first tensor.
//!
//! Like ``burn::nn::Dropout``, every kind is only active when the backend
//! tracks gradients (``B::ad_enabled()``); otherwise the layer is the identity.

use crate::compat::activation_wrapper::{SELU_ALPHA, SELU_SCALE};
use crate::utility::probability::try_drop_probability;
use burn::module::Ignored;
use burn::prelude::{Backend, Config, Module, Tensor};
use burn::tensor::Distribution;
use serde::{Deserialize, Serialize};

/// The ``SELU`` negative saturation value, ``-scale * alpha``.
pub const SELU_NEGATIVE_SATURATION: f64 = -SELU_SCALE * SELU_ALPHA;

/// The kind of dropout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropoutKind {
    /// Element-wise dropout; survivors are rescaled by ``1 / (1 - prob)``.
    #[default]
    Plain,

    /// Drops whole channels; survivors are rescaled by ``1 / (1 - prob)``.
    Spatial,

    /// Gaussian dropout: multiplicative ``N(1, prob / (1 - prob))`` noise.
    Multiplicative,

    /// Scale-invariant additive Gaussian noise.
    ///
    /// The noise std is ``prob * std(sample)``, computed per batch item.
    Additive,

    /// Alpha dropout; preserves the mean and variance of ``SELU`` activations.
    Alpha,
}

/// [`DropoutLayer`] Config.
#[derive(Config, Debug)]
pub struct DropoutConfig {
    /// The kind of dropout.
    #[config(default = "DropoutKind::Plain")]
    pub kind: DropoutKind,

    /// The drop probability.
    ///
    /// For [`DropoutKind::Additive`], the maximal relative noise std.
    #[config(default = 0.3)]
    pub prob: f64,
}

impl DropoutConfig {
    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        try_drop_probability(self.prob).map(|_| ())
    }

    /// Initialize a [`DropoutLayer`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init(&self) -> DropoutLayer {
        if let Err(msg) = self.try_validate() {
            panic!("Invalid DropoutConfig: {msg}");
        }
        DropoutLayer {
            kind: Ignored(self.kind),
            prob: self.prob,
        }
    }
}

/// Dropout layer; see [`DropoutKind`].
#[derive(Module, Clone, Debug)]
pub struct DropoutLayer {
    /// The kind of dropout.
    pub kind: Ignored<DropoutKind>,

    /// The drop probability.
    pub prob: f64,
}

impl DropoutLayer {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, *spatial]``.
    ///
    /// # Returns
    ///
    /// A tensor of the same shape.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn forward<B: Backend, const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        if !B::ad_enabled() || self.prob == 0.0 {
            return input;
        }

        let keep = 1.0 - self.prob;
        match *self.kind {
            DropoutKind::Plain => {
                let mask = input.random_like(Distribution::Bernoulli(keep));
                input * mask / keep
            }
            DropoutKind::Spatial => {
                let dims = input.dims();
                let mask_shape: [usize; D] =
                    core::array::from_fn(|i| if i < 2 { dims[i] } else { 1 });
                let mask: Tensor<B, D> =
                    Tensor::random(mask_shape, Distribution::Bernoulli(keep), &input.device());
                input * mask / keep
            }
            DropoutKind::Multiplicative => {
                let std = (self.prob / keep).sqrt();
                let noise = input.random_like(Distribution::Normal(1.0, std));
                input * noise
            }
            DropoutKind::Additive => {
                let dims = input.dims();
                let std_shape: [usize; D] = core::array::from_fn(|i| if i == 0 { dims[0] } else { 1 });
                let sample_std = input
                    .clone()
                    .detach()
                    .flatten::<2>(1, D - 1)
                    .var(1)
                    .sqrt()
                    .reshape(std_shape);
                let noise = input.random_like(Distribution::Normal(0.0, 1.0));
                input + noise * sample_std * self.prob
            }
            DropoutKind::Alpha => {
                let alpha = SELU_NEGATIVE_SATURATION;
                let a = (keep * (1.0 + self.prob * alpha * alpha)).powf(-0.5);
                let b = -a * alpha * self.prob;

                let mask = input.random_like(Distribution::Bernoulli(keep));
                let dropped = mask.clone().neg().add_scalar(1.0) * alpha;
                (input * mask + dropped) * a + b
            }
        }
    }
}
