//! # `Projection` - pointwise shortcut projection.
//!
//! The left branch of a residual block, when the identity will not do:
//! a strided ``1x1`` [`ConvNd`] followed by an optional [`Normalization`].
//! There is no activation.

use crate::compat::normalization_wrapper::{Normalization, NormalizationPolicy};
use crate::layers::conv::{ConvNd, ConvNdConfig, ConvNdMeta, GLOROT_UNIFORM};
use burn::nn::Initializer;
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`Projection`] Config.
#[derive(Config, Debug)]
pub struct ProjectionConfig {
    /// The spatial rank.
    pub rank: usize,

    /// ``[in_channels, out_channels]``.
    pub channels: [usize; 2],

    /// Stride; one per spatial axis, or a single shared value.
    #[config(default = "vec![1]")]
    pub stride: Vec<usize>,

    /// The normalization policy.
    #[config(default = "NormalizationPolicy::default()")]
    pub norm: NormalizationPolicy,

    /// Kernel initializer.
    #[config(default = "GLOROT_UNIFORM")]
    pub initializer: Initializer,
}

impl ProjectionConfig {
    /// The pointwise conv config.
    ///
    /// The conv carries a bias only under [`NormalizationPolicy::Bias`].
    pub fn conv_config(&self) -> ConvNdConfig {
        ConvNdConfig::new(self.channels, vec![1; self.rank])
            .with_stride(self.stride.clone())
            .with_bias(self.norm.conv_bias())
            .with_initializer(self.initializer.clone())
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        self.conv_config().try_validate()?;
        self.norm.try_validate_features(self.channels[1])
    }

    /// Initialize a [`Projection`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Projection<B> {
        if let Err(msg) = self.try_validate() {
            panic!("Invalid ProjectionConfig: {msg}");
        }
        Projection {
            conv: self.conv_config().init(device),
            norm: self.norm.init(self.channels[1], device),
        }
    }
}

/// Pointwise conv/norm shortcut.
#[derive(Module, Debug)]
pub struct Projection<B: Backend> {
    /// Pointwise conv.
    pub conv: ConvNd<B>,

    /// Norm layer, over the conv output.
    pub norm: Option<Normalization<B>>,
}

impl<B: Backend> Projection<B> {
    /// Number of input channels.
    pub fn in_channels(&self) -> usize {
        self.conv.in_channels()
    }

    /// Number of output channels.
    pub fn out_channels(&self) -> usize {
        self.conv.out_channels()
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, *in_shape]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, *out_shape]``, ``out_shape[i] = ceil(in_shape[i] / stride[i])``.
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        let x = self.conv.forward(input);
        match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        }
    }
}
