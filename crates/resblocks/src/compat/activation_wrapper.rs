//! # Activation Layer Wrapper
//!
//! Blocks hold an `Option<ActivationConfig>`; `None` is the linear activation.
//!
//! One [`ActivationConfig`] is shared by every unit of a block, while the
//! units differ in width. Layers with per-channel state are therefore sized
//! at init time, from the channels of the unit they run in, the same way
//! the norm layers are.

use burn::module::Ignored;
use burn::nn::{
    Gelu, HardSigmoid, HardSigmoidConfig, LeakyRelu, LeakyReluConfig, PRelu, PReluConfig, Relu,
    Sigmoid, Tanh,
};
use burn::prelude::{Backend, Module, Tensor};
use burn::tensor::activation::{silu, softplus};
use serde::{Deserialize, Serialize};

/// The ``SELU`` ``alpha`` constant.
pub const SELU_ALPHA: f64 = 1.673_263_242_354_377_3;

/// The ``SELU`` ``scale`` constant.
pub const SELU_SCALE: f64 = 1.050_700_987_355_480_5;

/// [`Activation`] Configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivationConfig {
    /// ``max(x, 0)``.
    Relu,

    /// ``"lrelu"``: ``x`` if ``x > 0``, else ``negative_slope * x``.
    LeakyRelu {
        /// The slope for ``x < 0``.
        negative_slope: f64,
    },

    /// ``"prelu"``: a leaky relu with a learned slope.
    PRelu {
        /// The initial slope.
        alpha: f64,

        /// Use one slope for all channels, rather than one per channel.
        shared: bool,
    },

    /// ``x`` if ``x > 0``, else ``alpha * (exp(x) - 1)``.
    Elu {
        /// The negative saturation.
        alpha: f64,
    },

    /// Scaled [`ActivationConfig::Elu`]; pairs with alpha dropout.
    Selu,

    /// Gaussian error linear unit.
    Gelu,

    /// ``x * sigmoid(x)``.
    Swish,

    /// ``ln(1 + exp(x))``.
    Softplus,

    /// ``x / (1 + |x|)``.
    Softsign,

    /// Logistic sigmoid.
    Sigmoid,

    /// ``clamp(0.2 * x + 0.5, 0, 1)``.
    HardSigmoid,

    /// Hyperbolic tangent.
    Tanh,

    /// ``exp(x)``.
    Exponential,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self::Relu
    }
}

impl ActivationConfig {
    /// ``"lrelu"`` with the default ``0.3`` slope.
    pub fn lrelu() -> Self {
        Self::LeakyRelu {
            negative_slope: 0.3,
        }
    }

    /// ``"prelu"`` with a zero initial slope per channel.
    pub fn prelu() -> Self {
        Self::PRelu {
            alpha: 0.0,
            shared: false,
        }
    }

    /// Does the layer carry learned parameters?
    pub fn is_parametric(&self) -> bool {
        matches!(self, Self::PRelu { .. })
    }

    /// Initialize an activation layer over `channels` input channels.
    pub fn init<B: Backend>(
        &self,
        channels: usize,
        device: &B::Device,
    ) -> Activation<B> {
        match *self {
            Self::Relu => Activation::Relu(Relu),
            Self::LeakyRelu { negative_slope } => Activation::LeakyRelu(
                LeakyReluConfig::new()
                    .with_negative_slope(negative_slope)
                    .init(),
            ),
            Self::PRelu { alpha, shared } => Activation::PRelu(
                PReluConfig::new()
                    .with_num_parameters(if shared { 1 } else { channels })
                    .with_alpha(alpha)
                    .init(device),
            ),
            Self::Gelu => Activation::Gelu(Gelu),
            Self::Sigmoid => Activation::Sigmoid(Sigmoid),
            Self::HardSigmoid => Activation::HardSigmoid(HardSigmoidConfig::new().init()),
            Self::Tanh => Activation::Tanh(Tanh),
            Self::Elu { alpha } => Elementwise::from(ElementwiseKind::Elu { alpha }).into(),
            Self::Selu => Elementwise::from(ElementwiseKind::Selu).into(),
            Self::Swish => Elementwise::from(ElementwiseKind::Swish).into(),
            Self::Softplus => Elementwise::from(ElementwiseKind::Softplus).into(),
            Self::Softsign => Elementwise::from(ElementwiseKind::Softsign).into(),
            Self::Exponential => Elementwise::from(ElementwiseKind::Exponential).into(),
        }
    }
}

/// Stateless functions with no ``burn::nn`` layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ElementwiseKind {
    /// See [`ActivationConfig::Elu`].
    Elu {
        /// The negative saturation.
        alpha: f64,
    },

    /// See [`ActivationConfig::Selu`].
    Selu,

    /// See [`ActivationConfig::Swish`].
    Swish,

    /// See [`ActivationConfig::Softplus`].
    Softplus,

    /// See [`ActivationConfig::Softsign`].
    Softsign,

    /// See [`ActivationConfig::Exponential`].
    Exponential,
}

/// A stateless element-wise activation.
#[derive(Module, Clone, Debug)]
pub struct Elementwise {
    /// The function.
    pub kind: Ignored<ElementwiseKind>,
}

impl From<ElementwiseKind> for Elementwise {
    fn from(kind: ElementwiseKind) -> Self {
        Self {
            kind: Ignored(kind),
        }
    }
}

impl Elementwise {
    /// Forward pass.
    pub fn forward<B: Backend, const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match *self.kind {
            ElementwiseKind::Elu { alpha } => elu(input, alpha),
            ElementwiseKind::Selu => elu(input, SELU_ALPHA).mul_scalar(SELU_SCALE),
            ElementwiseKind::Swish => silu(input),
            ElementwiseKind::Softplus => softplus(input, 1.0),
            ElementwiseKind::Softsign => input.clone().div(input.abs().add_scalar(1.0)),
            ElementwiseKind::Exponential => input.exp(),
        }
    }
}

fn elu<B: Backend, const D: usize>(
    input: Tensor<B, D>,
    alpha: f64,
) -> Tensor<B, D> {
    let negative = input.clone().clamp_max(0.0).exp().sub_scalar(1.0).mul_scalar(alpha);
    input.clamp_min(0.0) + negative
}

/// Activation layer, built from an [`ActivationConfig`].
#[derive(Module, Debug)]
pub enum Activation<B: Backend> {
    /// [`Relu`] activation layer.
    Relu(Relu),

    /// [`LeakyRelu`] activation layer.
    LeakyRelu(LeakyRelu),

    /// [`PRelu`] activation layer.
    PRelu(PRelu<B>),

    /// [`Gelu`] activation layer.
    Gelu(Gelu),

    /// [`Sigmoid`] activation layer.
    Sigmoid(Sigmoid),

    /// [`HardSigmoid`] activation layer.
    HardSigmoid(HardSigmoid),

    /// [`Tanh`] activation layer.
    Tanh(Tanh),

    /// Stateless activations without a ``burn::nn`` layer.
    Elementwise(Elementwise),
}

impl<B: Backend> From<Elementwise> for Activation<B> {
    fn from(layer: Elementwise) -> Self {
        Self::Elementwise(layer)
    }
}

impl<B: Backend> Activation<B> {
    /// The number of learned slopes, for [`Activation::PRelu`].
    pub fn num_parameters(&self) -> Option<usize> {
        match self {
            Activation::PRelu(layer) => Some(layer.alpha.val().dims()[0]),
            _ => None,
        }
    }

    /// Forward pass over ``[batch, channels, *shape]``.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match self {
            Activation::Relu(layer) => layer.forward(input),
            Activation::LeakyRelu(layer) => layer.forward(input),
            Activation::PRelu(layer) => layer.forward(input),
            Activation::Gelu(layer) => layer.forward(input),
            Activation::Sigmoid(layer) => layer.forward(input),
            Activation::HardSigmoid(layer) => layer.forward(input),
            Activation::Tanh(layer) => layer.forward(input),
            Activation::Elementwise(layer) => layer.forward(input),
        }
    }
}
