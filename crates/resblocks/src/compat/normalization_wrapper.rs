//! # Normalization Wrapper
//!
//! Provides support for the channels-first ``burn::nn::norm`` norm layers:
//! * [`Batch`] - [`BatchNorm`]
//! * [`Group`] - [`GroupNorm`]
//! * [`Instance`] - [`InstanceNorm`]
//!
//! All wrapped layers normalize ``[batch, channels, *spatial]`` tensors
//! of any spatial rank.
//!
//! [`NormalizationPolicy`] selects between a norm layer, a plain conv bias,
//! or neither; and is the normalization knob of every block in this crate.
//!
//! The enums are non-exhaustive, to prepare for future additions.

use burn::nn::{
    BatchNorm, BatchNormConfig, GroupNorm, GroupNormConfig, InstanceNorm, InstanceNormConfig,
};
use burn::prelude::{Backend, Config, Module, Tensor};

/// ['Normalization'] Configuration.
#[derive(Config, Debug)]
#[non_exhaustive]
pub enum NormalizationConfig {
    /// ['`BatchNorm`'] Configuration.
    Batch(BatchNormConfig),

    /// ['`GroupNorm`'] Configuration.
    Group(GroupNormConfig),

    /// ['`InstanceNorm`'] Configuration.
    Instance(InstanceNormConfig),
}

impl From<BatchNormConfig> for NormalizationConfig {
    fn from(config: BatchNormConfig) -> Self {
        Self::Batch(config)
    }
}

impl From<GroupNormConfig> for NormalizationConfig {
    fn from(config: GroupNormConfig) -> Self {
        Self::Group(config)
    }
}

impl From<InstanceNormConfig> for NormalizationConfig {
    fn from(config: InstanceNormConfig) -> Self {
        Self::Instance(config)
    }
}

impl NormalizationConfig {
    /// Initialize a ['Normalization'] layer.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Normalization<B> {
        match self {
            NormalizationConfig::Batch(config) => Normalization::Batch(config.init(device)),
            NormalizationConfig::Group(config) => config.init(device).into(),
            NormalizationConfig::Instance(config) => config.init(device).into(),
        }
    }

    /// Adjust a norm config to the feature size.
    pub fn with_num_features(
        self,
        num_features: usize,
    ) -> Self {
        match self {
            NormalizationConfig::Batch(config) => BatchNormConfig {
                num_features,
                ..config
            }
            .into(),
            NormalizationConfig::Group(config) => GroupNormConfig {
                num_channels: num_features,
                ..config
            }
            .into(),
            NormalizationConfig::Instance(config) => InstanceNormConfig {
                num_channels: num_features,
                ..config
            }
            .into(),
        }
    }

    /// Get the number of features.
    pub fn num_features(&self) -> usize {
        match self {
            NormalizationConfig::Batch(config) => config.num_features,
            NormalizationConfig::Group(config) => config.num_channels,
            NormalizationConfig::Instance(config) => config.num_channels,
        }
    }

    /// Check that the norm can be applied to `num_features` channels.
    pub fn try_validate_features(
        &self,
        num_features: usize,
    ) -> Result<(), String> {
        match self {
            NormalizationConfig::Group(config) if num_features % config.num_groups != 0 => {
                Err(format!(
                    "GroupNorm num_groups({}) does not divide {num_features} channels",
                    config.num_groups
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Normalization Layer Wrapper
///
/// Provides support for channels-first ``burn::nn::norm`` norm layers:
/// * [`Batch`] - [`BatchNorm`]
/// * [`Group`] - [`GroupNorm`]
/// * [`Instance`] - [`InstanceNorm`]
///
/// The enum is non-exhaustive, to prepare for future additions.
#[derive(Module, Debug)]
#[non_exhaustive]
pub enum Normalization<B: Backend> {
    /// [`BatchNorm`] layer.
    ///
    /// Stored as a `BatchNorm<1>`; spatial axes are flattened on the way in,
    /// which leaves the per-channel statistics unchanged for every rank.
    Batch(BatchNorm<B, 1>),

    /// [`GroupNorm`] layer.
    Group(GroupNorm<B>),

    /// ['`InstanceNorm`'] layer.
    Instance(InstanceNorm<B>),
}

impl<B: Backend> From<BatchNorm<B, 1>> for Normalization<B> {
    fn from(layer: BatchNorm<B, 1>) -> Self {
        Self::Batch(layer)
    }
}

impl<B: Backend> From<GroupNorm<B>> for Normalization<B> {
    fn from(layer: GroupNorm<B>) -> Self {
        Self::Group(layer)
    }
}

impl<B: Backend> From<InstanceNorm<B>> for Normalization<B> {
    fn from(layer: InstanceNorm<B>) -> Self {
        Self::Instance(layer)
    }
}

impl<B: Backend> Normalization<B> {
    /// Applies normalization to a tensor.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, channels, *spatial]`` tensor, ``D >= 3``.
    ///
    /// # Returns
    ///
    /// A tensor of the same shape.
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match self {
            Normalization::Batch(norm) => {
                let dims = input.dims();
                let spatial: usize = dims[2..].iter().product();
                let x: Tensor<B, 3> = input.reshape([dims[0], dims[1], spatial]);
                norm.forward(x).reshape(dims)
            }
            Normalization::Group(norm) => norm.forward(input),
            Normalization::Instance(norm) => norm.forward(input),
        }
    }

    /// Get the number of features.
    pub fn num_features(&self) -> usize {
        match self {
            Normalization::Batch(norm) => norm.gamma.shape().dims[0],
            Normalization::Group(norm) => norm.num_channels,
            Normalization::Instance(norm) => norm.num_channels,
        }
    }
}

/// How a block normalizes its convolutions.
///
/// Replaces the ``None | "bias" | "batch" | "inst" | "group"`` switch:
/// * [`Disabled`] - no normalization, and no conv bias.
/// * [`Bias`] - no normalization; convs carry a bias instead.
/// * [`Norm`] - a [`Normalization`] layer; the feature size is auto-matched.
#[derive(Config, Debug)]
#[non_exhaustive]
pub enum NormalizationPolicy {
    /// No normalization, no bias.
    Disabled,

    /// No normalization; convolution bias.
    Bias,

    /// A normalization layer.
    Norm(NormalizationConfig),
}

impl Default for NormalizationPolicy {
    fn default() -> Self {
        Self::Norm(InstanceNormConfig::new(0).into())
    }
}

impl From<NormalizationConfig> for NormalizationPolicy {
    fn from(config: NormalizationConfig) -> Self {
        Self::Norm(config)
    }
}

impl NormalizationPolicy {
    /// Should convolutions under this policy carry a bias?
    pub fn conv_bias(&self) -> bool {
        matches!(self, Self::Bias)
    }

    /// The norm config, if any.
    pub fn norm_config(&self) -> Option<&NormalizationConfig> {
        match self {
            Self::Norm(config) => Some(config),
            _ => None,
        }
    }

    /// Check that the policy can be applied to `num_features` channels.
    pub fn try_validate_features(
        &self,
        num_features: usize,
    ) -> Result<(), String> {
        match self.norm_config() {
            Some(config) => config.try_validate_features(num_features),
            None => Ok(()),
        }
    }

    /// Initialize the norm layer (if any), sized to `num_features`.
    pub fn init<B: Backend>(
        &self,
        num_features: usize,
        device: &B::Device,
    ) -> Option<Normalization<B>> {
        self.norm_config().map(|config| {
            config
                .clone()
                .with_num_features(num_features)
                .init(device)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestBackend, TrainBackend};
    use burn::tensor::Distribution;

    #[test]
    fn test_batch_norm() {
        type B = TrainBackend;
        let device = Default::default();

        let num_features = 12;
        let input: Tensor<B, 4> =
            Tensor::random([2, num_features, 3, 4], Distribution::Default, &device);

        let config: NormalizationConfig = BatchNormConfig::new(num_features).into();
        let layer: Normalization<B> = config.init(&device);
        assert_eq!(layer.num_features(), num_features);

        let expected = match &layer {
            Normalization::Batch(inner) => inner
                .forward(input.clone().reshape([2, num_features, 12]))
                .reshape([2, num_features, 3, 4]),
            _ => panic!("Unexpected layer type"),
        };

        let output = layer.forward(input);

        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_batch_norm_any_rank() {
        type B = TestBackend;
        let device = Default::default();

        let layer: Normalization<B> = NormalizationConfig::from(BatchNormConfig::new(3))
            .init(&device);

        let output = layer.forward(Tensor::<B, 3>::ones([2, 3, 5], &device));
        assert_eq!(output.dims(), [2, 3, 5]);

        let output = layer.forward(Tensor::<B, 5>::ones([2, 3, 2, 2, 2], &device));
        assert_eq!(output.dims(), [2, 3, 2, 2, 2]);
    }

    #[test]
    fn test_group_norm() {
        type B = TestBackend;
        let device = Default::default();

        let num_features = 12;
        let input: Tensor<B, 4> = Tensor::ones([2, num_features, 3, 4], &device);

        let config: NormalizationConfig = GroupNormConfig::new(3, num_features).into();

        let layer: Normalization<B> = config.init(&device);

        let expected = match &layer {
            Normalization::Group(inner) => inner.forward(input.clone()),
            _ => panic!("Unexpected layer type"),
        };

        let output = layer.forward(input);

        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_instance_norm() {
        type B = TestBackend;
        let device = Default::default();

        let num_features = 12;
        let input: Tensor<B, 3> = Tensor::ones([2, num_features, 7], &device);

        let config: NormalizationConfig = InstanceNormConfig::new(num_features).into();

        let layer: Normalization<B> = config.init(&device);

        let expected = match &layer {
            Normalization::Instance(inner) => inner.forward(input.clone()),
            _ => panic!("Unexpected layer type"),
        };

        let output = layer.forward(input);

        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_with_num_features() {
        let config: NormalizationConfig = GroupNormConfig::new(4, 0).into();
        let config = config.with_num_features(16);
        assert_eq!(config.num_features(), 16);
        assert!(config.try_validate_features(16).is_ok());
        assert!(config.try_validate_features(10).is_err());
    }

    #[test]
    fn test_policy() {
        type B = TestBackend;
        let device = Default::default();

        let policy = NormalizationPolicy::default();
        assert!(!policy.conv_bias());
        let norm: Option<Normalization<B>> = policy.init(8, &device);
        match norm {
            Some(Normalization::Instance(norm)) => assert_eq!(norm.num_channels, 8),
            _ => panic!("Expected an instance norm"),
        }

        let policy = NormalizationPolicy::Bias;
        assert!(policy.conv_bias());
        assert!(policy.init::<B>(8, &device).is_none());

        let policy = NormalizationPolicy::Disabled;
        assert!(!policy.conv_bias());
        assert!(policy.init::<B>(8, &device).is_none());

        let policy: NormalizationPolicy = NormalizationConfig::from(BatchNormConfig::new(0)).into();
        let norm: Option<Normalization<B>> = policy.init(5, &device);
        assert_eq!(norm.map(|n| n.num_features()), Some(5));
    }
}
