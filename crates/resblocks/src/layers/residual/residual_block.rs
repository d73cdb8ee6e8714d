//! # `ResidualBlock` - residual and `ResNeXt` blocks.
//!
//! Pre-activation residual blocks, for 1D, 2D and 3D inputs:
//! * ``LatentWidth::Residual`` - a plain bottleneck branch.
//! * ``LatentWidth::Resnext`` - a grouped bottleneck branch.
//!
//! A block with ``stride > 1`` reduces the resolution to ``ceil(in / stride)``,
//! and projects its shortcut to match.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::conv_shape::same_output_size;
use crate::compat::normalization_wrapper::NormalizationPolicy;
use crate::layers::blocks::NacUnitMeta;
use crate::layers::conv::GLOROT_UNIFORM;
use crate::layers::drop::DropoutConfig;
use crate::layers::residual::latent::{LatentWidth, ResnextLatent};
use crate::layers::residual::stack::{ResidualStack, ResidualStackConfig};
use crate::utility::rank::{expand_to_rank, try_expand_to_rank, try_spatial_rank};
use burn::nn::Initializer;
use burn::prelude::{Backend, Config, Module, Tensor};

/// Residual block Meta.
///
/// Implemented by the block configs and modules.
pub trait ResidualBlockMeta {
    /// The spatial rank.
    fn rank(&self) -> usize;

    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Number of NAC units, including the two pointwise units.
    fn depth(&self) -> usize;

    /// The resolved latent sizes.
    fn latent(&self) -> ResnextLatent;

    /// The block stride, per spatial axis.
    fn stride(&self) -> Vec<usize>;

    /// Get the output resolution for a given input resolution.
    ///
    /// ``out[i] = ceil(in[i] / stride[i])``
    fn output_resolution(
        &self,
        input_resolution: &[usize],
    ) -> Vec<usize> {
        assert_eq!(
            input_resolution.len(),
            self.rank(),
            "input_resolution {input_resolution:?} does not match rank {}",
            self.rank()
        );
        input_resolution
            .iter()
            .zip(self.stride())
            .map(|(&size, stride)| same_output_size(size, stride))
            .collect()
    }
}

/// [`ResidualBlock`] Config.
///
/// Implements [`ResidualBlockMeta`].
#[derive(Config, Debug)]
pub struct ResidualBlockConfig {
    /// The spatial rank.
    pub rank: usize,

    /// ``[in_channels, out_channels]``.
    pub channels: [usize; 2],

    /// Kernel size of the middle units; one per spatial axis, or a single shared value.
    pub kernel_size: Vec<usize>,

    /// The latent branch width policy.
    #[config(default = "LatentWidth::residual()")]
    pub latent: LatentWidth,

    /// Number of NAC units, including the two pointwise units; ``>= 3``.
    #[config(default = 3)]
    pub depth: usize,

    /// Stride.
    #[config(default = "vec![1]")]
    pub stride: Vec<usize>,

    /// Dilation of the first middle unit; not supported with ``stride > 1``.
    #[config(default = "vec![1]")]
    pub dilation: Vec<usize>,

    /// The normalization policy.
    #[config(default = "NormalizationPolicy::default()")]
    pub norm: NormalizationPolicy,

    /// The activation; `None` is linear.
    #[config(default = "None")]
    pub act: Option<ActivationConfig>,

    /// Dropout on the right branch input.
    #[config(default = "None")]
    pub dropout: Option<DropoutConfig>,

    /// Kernel initializer.
    #[config(default = "GLOROT_UNIFORM")]
    pub initializer: Initializer,
}

impl ResidualBlockMeta for ResidualBlockConfig {
    fn rank(&self) -> usize {
        self.rank
    }

    fn in_channels(&self) -> usize {
        self.channels[0]
    }

    fn out_channels(&self) -> usize {
        self.channels[1]
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn latent(&self) -> ResnextLatent {
        self.latent.resolve(
            self.in_channels(),
            self.out_channels(),
            self.depth,
            kernel_volume(&self.kernel_size, self.rank),
        )
    }

    fn stride(&self) -> Vec<usize> {
        expand_to_rank("stride", &self.stride, self.rank)
    }
}

/// The product of a kernel size, expanded to `rank`.
pub(crate) fn kernel_volume(
    kernel_size: &[usize],
    rank: usize,
) -> usize {
    match kernel_size {
        [k] => k.pow(rank as u32),
        _ => kernel_size.iter().product(),
    }
}

impl ResidualBlockConfig {
    /// A 1D block config.
    pub fn new_1d(
        channels: [usize; 2],
        kernel_size: usize,
    ) -> Self {
        Self::new(1, channels, vec![kernel_size])
    }

    /// A 2D block config.
    pub fn new_2d(
        channels: [usize; 2],
        kernel_size: usize,
    ) -> Self {
        Self::new(2, channels, vec![kernel_size])
    }

    /// A 3D block config.
    pub fn new_3d(
        channels: [usize; 2],
        kernel_size: usize,
    ) -> Self {
        Self::new(3, channels, vec![kernel_size])
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        let rank = try_spatial_rank(self.rank)?;
        try_expand_to_rank("kernel_size", &self.kernel_size, rank)?;
        try_expand_to_rank("stride", &self.stride, rank)?;
        self.stack_config().try_validate()
    }

    /// The [`ResidualStack`] config of this block.
    pub fn stack_config(&self) -> ResidualStackConfig {
        let latent = self.latent();
        ResidualStackConfig::new(
            self.rank,
            self.channels,
            self.kernel_size.clone(),
            latent.channels(),
        )
        .with_latent_groups(latent.groups)
        .with_depth(self.depth)
        .with_stride(self.stride.clone())
        .with_dilation(self.dilation.clone())
        .with_norm(self.norm.clone())
        .with_act(self.act.clone())
        .with_dropout(self.dropout.clone())
        .with_initializer(self.initializer.clone())
    }

    /// Initialize a [`ResidualBlock`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResidualBlock<B> {
        if let Err(msg) = self.try_validate() {
            panic!("Invalid ResidualBlockConfig: {msg}\n{self:#?}");
        }
        ResidualBlock {
            stack: self.stack_config().init(device),
        }
    }
}

/// Residual / `ResNeXt` block.
///
/// Implements [`ResidualBlockMeta`].
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    /// The sub-layer chain.
    pub stack: ResidualStack<B>,
}

impl<B: Backend> ResidualBlockMeta for ResidualBlock<B> {
    fn rank(&self) -> usize {
        self.stack.rank()
    }

    fn in_channels(&self) -> usize {
        self.stack.first.in_channels()
    }

    fn out_channels(&self) -> usize {
        self.stack.last.out_channels()
    }

    fn depth(&self) -> usize {
        self.stack.middle.len() + 2
    }

    fn latent(&self) -> ResnextLatent {
        let groups = self
            .stack
            .middle
            .first()
            .map(|unit| unit.groups())
            .unwrap_or(1);
        ResnextLatent {
            groups,
            filters: self.stack.first.out_channels() / groups,
        }
    }

    fn stride(&self) -> Vec<usize> {
        self.stack.first.stride()
    }
}

impl<B: Backend> ResidualBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, *in_shape]``, with ``D = rank + 2``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, *out_shape]``, ``out_shape[i] = ceil(in_shape[i] / stride[i])``.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        self.stack.forward(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::normalization_wrapper::NormalizationConfig;
    use crate::layers::conv::ConvNdMeta;
    use crate::layers::drop::DropoutKind;
    use crate::testing::{TestBackend, TrainBackend};
    use bimm_contracts::assert_shape_contract;
    use burn::nn::BatchNormConfig;
    use burn::tensor::Distribution;
    use hamcrest::prelude::*;

    #[test]
    fn test_residual_config() {
        let config = ResidualBlockConfig::new_2d([64, 64], 3);
        assert_eq!(config.rank(), 2);
        assert_eq!(config.in_channels(), 64);
        assert_eq!(config.out_channels(), 64);
        assert_eq!(config.depth(), 3);
        assert_eq!(config.stride(), vec![1, 1]);
        assert_eq!(
            config.latent(),
            ResnextLatent {
                groups: 1,
                filters: 32
            }
        );
        assert!(config.act.is_none());
        assert!(config.dropout.is_none());
        assert!(config.try_validate().is_ok());

        let config = config.with_stride(vec![2]);
        assert_eq!(config.output_resolution(&[7, 8]), vec![4, 4]);
    }

    #[test]
    fn test_resnext_config() {
        let config = ResidualBlockConfig::new_2d([64, 64], 3).with_latent(LatentWidth::resnext());
        assert_eq!(
            config.latent(),
            ResnextLatent {
                groups: 32,
                filters: 3
            }
        );

        let stack = config.stack_config();
        assert_eq!(stack.latent_channels, 96);
        assert_eq!(stack.latent_groups, 32);

        let config = config.with_latent(LatentWidth::Resnext {
            groups: None,
            filters: Some(4),
        });
        assert_eq!(config.latent().groups, 20);
    }

    #[test]
    fn test_kernel_volume() {
        assert_eq!(kernel_volume(&[3], 1), 3);
        assert_eq!(kernel_volume(&[3], 2), 9);
        assert_eq!(kernel_volume(&[3], 3), 27);
        assert_eq!(kernel_volume(&[3, 5], 2), 15);
    }

    #[test]
    fn test_validation() {
        let config = ResidualBlockConfig::new_1d([8, 8], 3);
        assert!(config.try_validate().is_ok());

        assert!(config.clone().with_depth(2).try_validate().is_err());
        assert!(
            config
                .clone()
                .with_stride(vec![2])
                .with_dilation(vec![2])
                .try_validate()
                .is_err()
        );
        assert!(
            ResidualBlockConfig::new(4, [8, 8], vec![3])
                .try_validate()
                .is_err()
        );
        assert!(
            ResidualBlockConfig::new(2, [8, 8], vec![3, 3, 3])
                .try_validate()
                .is_err()
        );
        assert!(
            ResidualBlockConfig::new(2, [8, 8], vec![3])
                .with_stride(vec![1, 1, 1])
                .try_validate()
                .is_err()
        );
    }

    #[test]
    #[should_panic(expected = "Invalid ResidualBlockConfig")]
    fn test_init_panic() {
        let device = Default::default();
        let _block: ResidualBlock<TestBackend> = ResidualBlockConfig::new_1d([8, 8], 3)
            .with_depth(1)
            .init(&device);
    }

    #[test]
    fn test_residual_1d() {
        let device = Default::default();
        let block: ResidualBlock<TestBackend> = ResidualBlockConfig::new_1d([4, 4], 3)
            .with_act(Some(ActivationConfig::Relu))
            .init(&device);

        assert!(block.stack.projection.is_none());
        assert_eq!(block.depth(), 3);
        assert_eq!(block.latent().channels(), 2);

        let input: Tensor<TestBackend, 3> =
            Tensor::random([2, 4, 9], Distribution::Default, &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "channels", "length"],
            &output,
            &[("batch", 2), ("channels", 4), ("length", 9)],
        );
    }

    #[test]
    fn test_residual_2d_strided() {
        let device = Default::default();
        let config = ResidualBlockConfig::new_2d([4, 8], 3)
            .with_stride(vec![2])
            .with_depth(4);
        let block: ResidualBlock<TestBackend> = config.init(&device);

        assert!(block.stack.projection.is_some());
        assert_eq!(block.depth(), 4);
        assert_eq!(block.stack.middle.len(), 2);
        assert_eq!(block.stride(), vec![2, 2]);
        assert_eq!(block.in_channels(), 4);
        assert_eq!(block.out_channels(), 8);

        let input: Tensor<TestBackend, 4> =
            Tensor::random([2, 4, 7, 8], Distribution::Default, &device);
        let output = block.forward(input);

        let out_shape = block.output_resolution(&[7, 8]);
        assert_eq!(out_shape, vec![4, 4]);
        assert_shape_contract!(
            ["batch", "channels", "height", "width"],
            &output,
            &[
                ("batch", 2),
                ("channels", 8),
                ("height", out_shape[0]),
                ("width", out_shape[1])
            ],
        );
    }

    #[test]
    fn test_resnext_3d() {
        let device = Default::default();
        let config = ResidualBlockConfig::new_3d([8, 16], 3)
            .with_latent(LatentWidth::Resnext {
                groups: Some(4),
                filters: None,
            })
            .with_stride(vec![1, 2, 2])
            .with_norm(NormalizationConfig::from(BatchNormConfig::new(0)).into())
            .with_act(Some(ActivationConfig::Relu));
        let block: ResidualBlock<TrainBackend> = config.init(&device);

        let latent = config.latent();
        assert_eq!(block.latent(), latent);
        for unit in &block.stack.middle {
            assert_eq!(unit.groups(), 4);
            assert_eq!(unit.conv.kernel_size(), vec![3, 3, 3]);
        }

        let input: Tensor<TrainBackend, 5> =
            Tensor::random([2, 8, 3, 5, 6], Distribution::Default, &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "channels", "depth", "height", "width"],
            &output,
            &[
                ("batch", 2),
                ("channels", 16),
                ("depth", 3),
                ("height", 3),
                ("width", 3)
            ],
        );
    }

    #[test]
    fn test_dilated_block() {
        let device = Default::default();
        let block: ResidualBlock<TestBackend> = ResidualBlockConfig::new_2d([4, 4], 3)
            .with_depth(4)
            .with_dilation(vec![2, 3])
            .init(&device);

        assert_eq!(block.stack.middle[0].conv.dilation(), vec![2, 3]);
        assert_eq!(block.stack.middle[1].conv.dilation(), vec![1, 1]);

        let output = block.forward(Tensor::<TestBackend, 4>::ones([1, 4, 6, 7], &device));
        assert_eq!(output.dims(), [1, 4, 6, 7]);
    }

    #[test]
    fn test_dropout_block() {
        let device = Default::default();
        let block: ResidualBlock<TrainBackend> = ResidualBlockConfig::new_1d([4, 4], 3)
            .with_dropout(Some(
                DropoutConfig::new()
                    .with_kind(DropoutKind::Spatial)
                    .with_prob(0.5),
            ))
            .init(&device);

        assert!(block.stack.dropout.is_some());
        let output = block.forward(Tensor::<TrainBackend, 3>::ones([2, 4, 5], &device));
        assert_eq!(output.dims(), [2, 4, 5]);
    }

    #[test]
    fn test_prelu_block() {
        let device = Default::default();
        let block: ResidualBlock<TestBackend> = ResidualBlockConfig::new_2d([8, 8], 3)
            .with_act(Some(ActivationConfig::prelu()))
            .init(&device);

        let stack = &block.stack;
        let slopes = |unit: &crate::layers::blocks::NacUnit<TestBackend>| {
            unit.act.as_ref().and_then(|a| a.num_parameters())
        };
        assert_eq!(slopes(&stack.first), Some(8));
        assert_eq!(slopes(&stack.middle[0]), Some(4));
        assert_eq!(slopes(&stack.last), Some(4));

        let input: Tensor<TestBackend, 4> =
            Tensor::random([2, 8, 5, 5], Distribution::Default, &device);
        assert_eq!(block.forward(input).dims(), [2, 8, 5, 5]);
    }

    #[test]
    fn test_num_params() {
        let device = Default::default();
        let residual: ResidualBlock<TestBackend> = ResidualBlockConfig::new_2d([64, 64], 3)
            .with_norm(NormalizationPolicy::Disabled)
            .init(&device);
        let resnext: ResidualBlock<TestBackend> = ResidualBlockConfig::new_2d([64, 64], 3)
            .with_latent(LatentWidth::resnext())
            .with_norm(NormalizationPolicy::Disabled)
            .init(&device);

        // 64*32 + 9*32*32 + 32*64
        assert_eq!(residual.num_params(), 13_312);

        let ratio = resnext.num_params() as f64 / residual.num_params() as f64;
        assert_that!(ratio, is(close_to(1.0, 0.2)));
    }

    #[test]
    fn test_config_save_load() {
        let config = ResidualBlockConfig::new_2d([16, 32], 3)
            .with_latent(LatentWidth::Resnext {
                groups: Some(4),
                filters: None,
            })
            .with_stride(vec![2, 1])
            .with_act(Some(ActivationConfig::Relu))
            .with_dropout(Some(DropoutConfig::new().with_kind(DropoutKind::Alpha)));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("block.json");
        config.save(&path).unwrap();

        let loaded = ResidualBlockConfig::load(&path).unwrap();
        assert_eq!(loaded.latent, config.latent);
        assert_eq!(loaded.stride, config.stride);
        assert_eq!(loaded.latent(), config.latent());
        assert!(matches!(loaded.act, Some(ActivationConfig::Relu)));
        assert_eq!(loaded.dropout.map(|d| d.kind), Some(DropoutKind::Alpha));
    }
}
