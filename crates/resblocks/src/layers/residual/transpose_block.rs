//! # `ResidualTranspose` - upsampling residual and `ResNeXt` blocks.
//!
//! ```text
//! x = upsample_nearest(x, stride)
//! x = zero_pad(x, output_padding)      # optional
//! x = stack(x)                         # stride 1; projection iff out != in
//! x = crop(x, output_cropping)         # optional
//! ```
//!
//! The output resolution is ``in * stride + padding - cropping``;
//! [`ResidualTransposeConfig::fit_output_resolution`] solves the padding and
//! cropping for a desired output resolution.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationPolicy;
use crate::layers::blocks::NacUnitMeta;
use crate::layers::conv::GLOROT_UNIFORM;
use crate::layers::drop::DropoutConfig;
use crate::layers::resize::{
    Crop, CropConfig, UpsampleNearest, UpsampleNearestConfig, ZeroPad, ZeroPadConfig,
    infer_resize_plan, try_crop_output_size,
};
use crate::layers::residual::latent::{LatentWidth, ResnextLatent};
use crate::layers::residual::residual_block::{ResidualBlockMeta, kernel_volume};
use crate::layers::residual::stack::{ResidualStack, ResidualStackConfig};
use crate::utility::rank::{assert_tensor_rank, expand_to_rank, try_expand_to_rank, try_spatial_rank};
use burn::nn::Initializer;
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`ResidualTranspose`] Config.
///
/// Implements [`ResidualBlockMeta`].
#[derive(Config, Debug)]
pub struct ResidualTransposeConfig {
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

    /// Upsampling factor.
    #[config(default = "vec![1]")]
    pub stride: Vec<usize>,

    /// Dilation of the first middle unit; not supported with ``stride > 1``.
    #[config(default = "vec![1]")]
    pub dilation: Vec<usize>,

    /// ``(before, after)`` zero padding after upsampling.
    #[config(default = "None")]
    pub output_padding: Option<Vec<[usize; 2]>>,

    /// ``(before, after)`` cropping of the block output.
    #[config(default = "None")]
    pub output_cropping: Option<Vec<[usize; 2]>>,

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

impl ResidualBlockMeta for ResidualTransposeConfig {
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

    /// ``out[i] = in[i] * stride[i] + padding[i] - cropping[i]``
    fn output_resolution(
        &self,
        input_resolution: &[usize],
    ) -> Vec<usize> {
        self.try_output_resolution(input_resolution)
            .unwrap_or_else(|msg| panic!("{msg}"))
    }
}

/// ``in * stride``, padded, then cropped.
fn try_resize_output_resolution(
    input_resolution: &[usize],
    stride: &[usize],
    padding: Option<&[[usize; 2]]>,
    cropping: Option<&[[usize; 2]]>,
) -> Result<Vec<usize>, String> {
    assert_eq!(
        input_resolution.len(),
        stride.len(),
        "input_resolution {input_resolution:?} does not match rank {}",
        stride.len()
    );
    (0..stride.len())
        .map(|i| {
            let mut size = input_resolution[i] * stride[i];
            if let Some(padding) = padding {
                size += padding[i][0] + padding[i][1];
            }
            match cropping {
                Some(cropping) => try_crop_output_size(size, cropping[i]),
                None => Ok(size),
            }
        })
        .collect()
}

impl ResidualTransposeConfig {
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

    /// Fit the padding and cropping to a desired output resolution.
    ///
    /// Replaces any explicit `output_padding` / `output_cropping`.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: the expected input resolution.
    /// - `target_resolution`: the desired output resolution.
    pub fn fit_output_resolution(
        self,
        input_resolution: &[usize],
        target_resolution: &[usize],
    ) -> Self {
        let stride = self.stride();
        assert_eq!(
            input_resolution.len(),
            stride.len(),
            "input_resolution {input_resolution:?} does not match rank {}",
            stride.len()
        );
        let upsampled: Vec<usize> = input_resolution
            .iter()
            .zip(&stride)
            .map(|(&size, &s)| size * s)
            .collect();

        let plan = infer_resize_plan(&upsampled, target_resolution);
        Self {
            output_padding: plan.padding,
            output_cropping: plan.cropping,
            ..self
        }
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Returns
    ///
    /// An error if the cropping would leave nothing of any axis.
    pub fn try_output_resolution(
        &self,
        input_resolution: &[usize],
    ) -> Result<Vec<usize>, String> {
        try_resize_output_resolution(
            input_resolution,
            &self.stride(),
            self.padding().as_deref(),
            self.cropping().as_deref(),
        )
    }

    /// The per-axis padding, if any.
    pub fn padding(&self) -> Option<Vec<[usize; 2]>> {
        self.output_padding
            .as_ref()
            .map(|padding| expand_to_rank("output_padding", padding, self.rank))
    }

    /// The per-axis cropping, if any.
    pub fn cropping(&self) -> Option<Vec<[usize; 2]>> {
        self.output_cropping
            .as_ref()
            .map(|cropping| expand_to_rank("output_cropping", cropping, self.rank))
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        let rank = try_spatial_rank(self.rank)?;
        try_expand_to_rank("kernel_size", &self.kernel_size, rank)?;
        let stride = try_expand_to_rank("stride", &self.stride, rank)?;
        let dilation = try_expand_to_rank("dilation", &self.dilation, rank)?;

        if stride.contains(&0) {
            return Err(format!("stride must be > 0: {stride:?}"));
        }
        if stride.iter().any(|&s| s != 1) && dilation.iter().any(|&d| d != 1) {
            return Err(format!(
                "dilation {dilation:?} is not supported with stride {stride:?}"
            ));
        }
        if let Some(padding) = &self.output_padding {
            try_expand_to_rank("output_padding", padding, rank)?;
        }
        if let Some(cropping) = &self.output_cropping {
            try_expand_to_rank("output_cropping", cropping, rank)?;
        }

        self.stack_config().try_validate()
    }

    /// The [`ResidualStack`] config of this block; always stride 1.
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
        .with_dilation(self.dilation.clone())
        .with_norm(self.norm.clone())
        .with_act(self.act.clone())
        .with_dropout(self.dropout.clone())
        .with_initializer(self.initializer.clone())
    }

    /// Initialize a [`ResidualTranspose`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResidualTranspose<B> {
        if let Err(msg) = self.try_validate() {
            panic!("Invalid ResidualTransposeConfig: {msg}\n{self:#?}");
        }
        ResidualTranspose {
            upsample: UpsampleNearestConfig::new(self.stride.clone()).init(self.rank),
            padding: self
                .output_padding
                .as_ref()
                .map(|padding| ZeroPadConfig::new(padding.clone()).init(self.rank)),
            stack: self.stack_config().init(device),
            cropping: self
                .output_cropping
                .as_ref()
                .map(|cropping| CropConfig::new(cropping.clone()).init(self.rank)),
        }
    }
}

/// Upsampling residual / `ResNeXt` block.
///
/// Implements [`ResidualBlockMeta`].
#[derive(Module, Debug)]
pub struct ResidualTranspose<B: Backend> {
    /// Nearest-neighbour upsampling by the block stride.
    pub upsample: UpsampleNearest,

    /// Zero padding after upsampling.
    pub padding: Option<ZeroPad>,

    /// The sub-layer chain.
    pub stack: ResidualStack<B>,

    /// Output cropping.
    pub cropping: Option<Crop>,
}

impl<B: Backend> ResidualBlockMeta for ResidualTranspose<B> {
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
        self.upsample.scale.to_vec()
    }

    fn output_resolution(
        &self,
        input_resolution: &[usize],
    ) -> Vec<usize> {
        try_resize_output_resolution(
            input_resolution,
            &self.upsample.scale,
            self.padding.as_ref().map(|p| p.padding.as_slice()),
            self.cropping.as_ref().map(|c| c.cropping.as_slice()),
        )
        .unwrap_or_else(|msg| panic!("{msg}"))
    }
}

impl<B: Backend> ResidualTranspose<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, *in_shape]``, with ``D = rank + 2``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, *out_shape]``,
    /// ``out_shape[i] = in_shape[i] * stride[i] + padding[i] - cropping[i]``.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        assert_tensor_rank::<D>(self.rank());

        let x = self.upsample.forward(input);
        let x = match &self.padding {
            Some(padding) => padding.forward(x),
            None => x,
        };
        let x = self.stack.forward(x);
        match &self.cropping {
            Some(cropping) => cropping.forward(x),
            None => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::conv::ConvNdMeta;
    use crate::testing::{TestBackend, TrainBackend};
    use bimm_contracts::assert_shape_contract;
    use burn::tensor::Distribution;

    #[test]
    fn test_transpose_config() {
        let config = ResidualTransposeConfig::new_2d([8, 4], 3).with_stride(vec![2]);
        assert!(config.try_validate().is_ok());
        assert_eq!(config.stride(), vec![2, 2]);
        assert_eq!(config.output_resolution(&[4, 5]), vec![8, 10]);
        assert_eq!(
            config.latent(),
            ResnextLatent {
                groups: 1,
                filters: 4
            }
        );

        let stack = config.stack_config();
        assert_eq!(stack.stride, vec![1]);
        assert!(stack.needs_projection());

        let config = config
            .with_output_padding(Some(vec![[1, 0]]))
            .with_output_cropping(Some(vec![[0, 0], [1, 2]]));
        assert_eq!(config.padding(), Some(vec![[1, 0], [1, 0]]));
        assert_eq!(config.output_resolution(&[4, 5]), vec![9, 8]);
    }

    #[test]
    fn test_fit_output_resolution() {
        let config = ResidualTransposeConfig::new_2d([4, 4], 3)
            .with_stride(vec![2])
            .with_output_padding(Some(vec![[3, 3]]))
            .fit_output_resolution(&[4, 5], &[9, 9]);

        assert_eq!(config.output_padding, Some(vec![[0, 1], [0, 0]]));
        assert_eq!(config.output_cropping, Some(vec![[0, 0], [0, 1]]));
        assert_eq!(config.output_resolution(&[4, 5]), vec![9, 9]);

        let config = config.fit_output_resolution(&[4, 5], &[8, 10]);
        assert_eq!(config.output_padding, None);
        assert_eq!(config.output_cropping, None);
    }

    #[test]
    fn test_transpose_oversized_cropping() {
        let config = ResidualTransposeConfig::new_1d([4, 4], 3)
            .with_stride(vec![2])
            .with_output_cropping(Some(vec![[3, 2]]));

        assert_eq!(config.try_output_resolution(&[3]), Ok(vec![1]));
        assert_eq!(
            config.try_output_resolution(&[2]),
            Err("Cannot crop [3, 2] from an extent of 4".to_string())
        );
        assert_eq!(
            config.try_output_resolution(&[1]),
            Err("Cannot crop [3, 2] from an extent of 2".to_string())
        );
    }

    #[test]
    #[should_panic(expected = "Cannot crop [3, 2] from an extent of 4")]
    fn test_transpose_oversized_cropping_panics() {
        ResidualTransposeConfig::new_1d([4, 4], 3)
            .with_stride(vec![2])
            .with_output_cropping(Some(vec![[3, 2]]))
            .output_resolution(&[2]);
    }

    #[test]
    fn test_transpose_validation() {
        let config = ResidualTransposeConfig::new_1d([4, 4], 3);
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
        assert!(config.clone().with_stride(vec![0]).try_validate().is_err());
        assert!(
            config
                .clone()
                .with_output_padding(Some(vec![[1, 1], [1, 1]]))
                .try_validate()
                .is_err()
        );
        assert!(
            ResidualTransposeConfig::new(0, [4, 4], vec![3])
                .try_validate()
                .is_err()
        );
    }

    #[test]
    fn test_transpose_1d() {
        let device = Default::default();
        let block: ResidualTranspose<TestBackend> = ResidualTransposeConfig::new_1d([4, 4], 3)
            .with_stride(vec![2])
            .with_act(Some(ActivationConfig::Relu))
            .init(&device);

        assert!(block.stack.projection.is_none());
        assert!(block.padding.is_none());
        assert!(block.cropping.is_none());
        assert_eq!(block.stride(), vec![2]);
        assert_eq!(block.stack.first.stride(), vec![1]);

        let input: Tensor<TestBackend, 3> =
            Tensor::random([2, 4, 5], Distribution::Default, &device);
        let output = block.forward(input.clone());
        assert_eq!(output.dims(), [2, 4, 10]);

        let expected = block
            .stack
            .forward(crate::layers::resize::upsample_nearest(input, &[2]));
        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_transpose_2d_fit() {
        let device = Default::default();
        let config = ResidualTransposeConfig::new_2d([8, 4], 3)
            .with_stride(vec![2])
            .with_depth(4)
            .fit_output_resolution(&[4, 5], &[9, 9]);
        let block: ResidualTranspose<TestBackend> = config.init(&device);

        assert!(block.stack.projection.is_some());
        assert!(block.padding.is_some());
        assert!(block.cropping.is_some());
        assert_eq!(block.depth(), 4);
        assert_eq!(block.output_resolution(&[4, 5]), vec![9, 9]);

        let input: Tensor<TestBackend, 4> =
            Tensor::random([2, 8, 4, 5], Distribution::Default, &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "channels", "height", "width"],
            &output,
            &[
                ("batch", 2),
                ("channels", 4),
                ("height", 9),
                ("width", 9)
            ],
        );
    }

    #[test]
    fn test_resnext_transpose_3d() {
        let device = Default::default();
        let config = ResidualTransposeConfig::new_3d([8, 8], 3)
            .with_latent(LatentWidth::Resnext {
                groups: Some(2),
                filters: Some(3),
            })
            .with_stride(vec![1, 2, 2])
            .with_output_cropping(Some(vec![[0, 0], [0, 1], [1, 0]]));
        let block: ResidualTranspose<TrainBackend> = config.init(&device);

        assert_eq!(
            block.latent(),
            ResnextLatent {
                groups: 2,
                filters: 3
            }
        );
        assert_eq!(block.stack.middle[0].conv.groups(), 2);
        assert!(block.stack.projection.is_none());

        let input: Tensor<TrainBackend, 5> =
            Tensor::random([1, 8, 2, 3, 3], Distribution::Default, &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "channels", "depth", "height", "width"],
            &output,
            &[
                ("batch", 1),
                ("channels", 8),
                ("depth", 2),
                ("height", 5),
                ("width", 5)
            ],
        );
    }

    #[test]
    fn test_transpose_config_save_load() {
        let config = ResidualTransposeConfig::new_1d([4, 2], 5)
            .with_stride(vec![3])
            .with_output_padding(Some(vec![[0, 1]]));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transpose.json");
        config.save(&path).unwrap();

        let loaded = ResidualTransposeConfig::load(&path).unwrap();
        assert_eq!(loaded.output_padding, config.output_padding);
        assert_eq!(loaded.output_cropping, None);
        assert_eq!(loaded.output_resolution(&[4]), vec![13]);
    }
}
