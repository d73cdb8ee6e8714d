//! # `ResidualStack` - the shared residual sub-layer chain.
//!
//! ```text
//! left  = projection(x)              # or x, when shapes already match
//! right = dropout(x)                 # optional
//! right = first(right)               # NAC, 1x1, latent, stride
//! right = middle[i](right)           # NAC, kernel, latent, groups; i in 0..depth-2
//! right = last(right)                # NAC, 1x1, out_channels
//! y     = left + right
//! ```
//!
//! Only the first middle unit is dilated.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::conv_shape::same_output_size;
use crate::compat::normalization_wrapper::NormalizationPolicy;
use crate::layers::blocks::{NacUnit, NacUnitConfig, NacUnitMeta, Projection, ProjectionConfig};
use crate::layers::conv::{ConvNdConfig, GLOROT_UNIFORM};
use crate::layers::drop::{DropoutConfig, DropoutLayer};
use crate::utility::rank::{assert_tensor_rank, expand_to_rank, try_expand_to_rank, try_spatial_rank};
use burn::nn::Initializer;
use burn::prelude::{Backend, Config, Module, Tensor};

/// The minimum block depth: the two pointwise units and one middle unit.
pub const MIN_DEPTH: usize = 3;

/// [`ResidualStack`] Config.
#[derive(Config, Debug)]
pub struct ResidualStackConfig {
    /// The spatial rank.
    pub rank: usize,

    /// ``[in_channels, out_channels]``.
    pub channels: [usize; 2],

    /// Kernel size of the middle units; one per spatial axis, or a single shared value.
    pub kernel_size: Vec<usize>,

    /// Total latent width, ``groups * filters_per_group``.
    pub latent_channels: usize,

    /// Latent conv groups.
    #[config(default = 1)]
    pub latent_groups: usize,

    /// Number of NAC units, including the two pointwise units.
    #[config(default = 3)]
    pub depth: usize,

    /// Stride of the first unit and the projection.
    #[config(default = "vec![1]")]
    pub stride: Vec<usize>,

    /// Dilation of the first middle unit.
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

impl ResidualStackConfig {
    /// Number of input channels.
    pub fn in_channels(&self) -> usize {
        self.channels[0]
    }

    /// Number of output channels.
    pub fn out_channels(&self) -> usize {
        self.channels[1]
    }

    /// Does the left branch need a projection?
    ///
    /// True when any stride is not 1, or the channel count changes.
    pub fn needs_projection(&self) -> bool {
        self.stride.iter().any(|&s| s != 1) || self.in_channels() != self.out_channels()
    }

    /// Get the output resolution for a given input resolution.
    pub fn output_resolution(
        &self,
        input_resolution: &[usize],
    ) -> Vec<usize> {
        let stride = expand_to_rank("stride", &self.stride, self.rank);
        input_resolution
            .iter()
            .zip(stride)
            .map(|(&size, stride)| same_output_size(size, stride))
            .collect()
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        let rank = try_spatial_rank(self.rank)?;
        let kernel_size = try_expand_to_rank("kernel_size", &self.kernel_size, rank)?;
        let stride = try_expand_to_rank("stride", &self.stride, rank)?;
        let dilation = try_expand_to_rank("dilation", &self.dilation, rank)?;

        if self.depth < MIN_DEPTH {
            return Err(format!(
                "depth must be >= {MIN_DEPTH}, found {}",
                self.depth
            ));
        }
        if stride.iter().any(|&s| s != 1) && dilation.iter().any(|&d| d != 1) {
            return Err(format!(
                "dilation {dilation:?} is not supported with stride {stride:?}"
            ));
        }
        if kernel_size.contains(&0) || stride.contains(&0) || dilation.contains(&0) {
            return Err(format!(
                "kernel_size {kernel_size:?}, stride {stride:?} and dilation {dilation:?} must be > 0"
            ));
        }
        if self.latent_channels == 0 || self.latent_groups == 0 {
            return Err(format!(
                "latent channels({}) and groups({}) must be > 0",
                self.latent_channels, self.latent_groups
            ));
        }
        if self.latent_channels % self.latent_groups != 0 {
            return Err(format!(
                "latent groups({}) must divide latent channels({})",
                self.latent_groups, self.latent_channels
            ));
        }

        for features in [self.in_channels(), self.latent_channels] {
            self.norm.try_validate_features(features)?;
        }
        if self.needs_projection() {
            self.norm.try_validate_features(self.out_channels())?;
        }

        if let Some(dropout) = &self.dropout {
            dropout.try_validate()?;
        }

        Ok(())
    }

    fn nac_config(
        &self,
        conv: ConvNdConfig,
    ) -> NacUnitConfig {
        NacUnitConfig::new(conv.with_initializer(self.initializer.clone()))
            .with_norm(self.norm.clone())
            .with_act(self.act.clone())
    }

    /// The branch-left projection config, if any.
    pub fn projection_config(&self) -> Option<ProjectionConfig> {
        self.needs_projection().then(|| {
            ProjectionConfig::new(self.rank, self.channels)
                .with_stride(self.stride.clone())
                .with_norm(self.norm.clone())
                .with_initializer(self.initializer.clone())
        })
    }

    /// The first unit config: pointwise, strided.
    pub fn first_config(&self) -> NacUnitConfig {
        self.nac_config(
            ConvNdConfig::new(
                [self.in_channels(), self.latent_channels],
                vec![1; self.rank],
            )
            .with_stride(self.stride.clone())
            .with_bias(self.norm.conv_bias()),
        )
    }

    /// The middle unit configs: ``depth - 2`` grouped kernel convs.
    pub fn middle_configs(&self) -> Vec<NacUnitConfig> {
        (0..self.depth.saturating_sub(2))
            .map(|i| {
                let dilation = if i == 0 {
                    self.dilation.clone()
                } else {
                    vec![1]
                };
                self.nac_config(
                    ConvNdConfig::new(
                        [self.latent_channels, self.latent_channels],
                        expand_to_rank("kernel_size", &self.kernel_size, self.rank),
                    )
                    .with_dilation(dilation)
                    .with_groups(self.latent_groups)
                    .with_bias(self.norm.conv_bias()),
                )
            })
            .collect()
    }

    /// The last unit config: pointwise, to `out_channels`.
    ///
    /// The conv bias is dropped when a projection is present.
    pub fn last_config(&self) -> NacUnitConfig {
        self.nac_config(
            ConvNdConfig::new(
                [self.latent_channels, self.out_channels()],
                vec![1; self.rank],
            )
            .with_bias(self.norm.conv_bias() && !self.needs_projection()),
        )
    }

    /// Initialize a [`ResidualStack`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResidualStack<B> {
        if let Err(msg) = self.try_validate() {
            panic!("Invalid ResidualStackConfig: {msg}\n{self:#?}");
        }
        ResidualStack {
            projection: self.projection_config().map(|c| c.init(device)),
            dropout: self.dropout.as_ref().map(|c| c.init()),
            first: self.first_config().init(device),
            middle: self
                .middle_configs()
                .iter()
                .map(|c| c.init(device))
                .collect(),
            last: self.last_config().init(device),
        }
    }
}

/// Residual sub-layer chain; see the module docs.
#[derive(Module, Debug)]
pub struct ResidualStack<B: Backend> {
    /// Branch-left projection; `None` is the identity.
    pub projection: Option<Projection<B>>,

    /// Right branch dropout.
    pub dropout: Option<DropoutLayer>,

    /// Pointwise, strided, to the latent width.
    pub first: NacUnit<B>,

    /// Grouped kernel units, at the latent width.
    pub middle: Vec<NacUnit<B>>,

    /// Pointwise, to the output width.
    pub last: NacUnit<B>,
}

impl<B: Backend> ResidualStack<B> {
    /// The spatial rank.
    pub fn rank(&self) -> usize {
        self.first.rank()
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
        assert_tensor_rank::<D>(self.rank());

        let left = match &self.projection {
            Some(projection) => projection.forward(input.clone()),
            None => input.clone(),
        };

        let right = match &self.dropout {
            Some(dropout) => dropout.forward(input),
            None => input,
        };
        let right = self.first.forward(right);
        let right = self
            .middle
            .iter()
            .fold(right, |x, unit| unit.forward(x));
        let right = self.last.forward(right);

        assert_eq!(
            left.dims(),
            right.dims(),
            "Residual branch shapes do not match"
        );
        left + right
    }
}
