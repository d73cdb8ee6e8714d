//! # `ConvNd` - rank-dispatched ``"same"`` convolution.
//!
//! A [`ConvNd`] wraps a ``burn`` [`Conv1d`], [`Conv2d`] or [`Conv3d`],
//! chosen by the spatial rank of its [`ConvNdConfig`], and always applies
//! ``"same"`` padding: the output resolution is ``ceil(in / stride)``.
//!
//! The symmetric part of the padding is baked into the wrapped layer;
//! any remainder (even kernels, strided kernels) is zero-padded onto the
//! input before the convolution, with the extra element on the trailing side.

use crate::compat::conv_shape::{
    expect_conv_output_shape, expect_conv1d_output_size, same_output_size, same_padding,
    static_same_padding,
};
use crate::layers::resize::zero_pad::zero_pad;
use crate::utility::rank::{
    assert_tensor_rank, cast_rank, expand_to_rank, try_expand_to_rank, try_spatial_rank,
};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::conv::{Conv1d, Conv1dConfig, Conv2d, Conv2dConfig, Conv3d, Conv3dConfig};
use burn::nn::{Initializer, PaddingConfig1d, PaddingConfig2d, PaddingConfig3d};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Glorot / Xavier uniform kernel initialization.
pub const GLOROT_UNIFORM: Initializer = Initializer::XavierUniform { gain: 1.0 };

/// [`ConvNd`] Meta trait.
pub trait ConvNdMeta {
    /// The spatial rank.
    fn rank(&self) -> usize;

    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Number of groups.
    fn groups(&self) -> usize;

    /// Kernel size, per spatial axis.
    fn kernel_size(&self) -> Vec<usize>;

    /// Stride, per spatial axis.
    fn stride(&self) -> Vec<usize>;

    /// Dilation, per spatial axis.
    fn dilation(&self) -> Vec<usize>;

    /// Does the conv have a bias?
    fn has_bias(&self) -> bool;

    /// The symmetric padding baked into the conv layer.
    fn static_padding(&self) -> Vec<usize> {
        let kernel_size = self.kernel_size();
        let stride = self.stride();
        let dilation = self.dilation();
        (0..self.rank())
            .map(|i| static_same_padding(kernel_size[i], stride[i], dilation[i]))
            .collect()
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: the spatial shape, one entry per axis.
    ///
    /// # Returns
    ///
    /// ``[ceil(in_i / stride_i), ...]``
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

/// [`ConvNd`] Config.
///
/// The length of `kernel_size` sets the spatial rank;
/// `stride` and `dilation` may be given per axis or as a single value.
///
/// Implements [`ConvNdMeta`].
#[derive(Config, Debug)]
pub struct ConvNdConfig {
    /// ``[in_channels, out_channels]``.
    pub channels: [usize; 2],

    /// Kernel size, per spatial axis.
    pub kernel_size: Vec<usize>,

    /// Stride.
    #[config(default = "vec![1]")]
    pub stride: Vec<usize>,

    /// Dilation.
    #[config(default = "vec![1]")]
    pub dilation: Vec<usize>,

    /// Number of groups.
    #[config(default = 1)]
    pub groups: usize,

    /// Enable the conv bias.
    #[config(default = true)]
    pub bias: bool,

    /// Kernel initializer.
    #[config(default = "GLOROT_UNIFORM")]
    pub initializer: Initializer,
}

impl ConvNdMeta for ConvNdConfig {
    fn rank(&self) -> usize {
        self.kernel_size.len()
    }

    fn in_channels(&self) -> usize {
        self.channels[0]
    }

    fn out_channels(&self) -> usize {
        self.channels[1]
    }

    fn groups(&self) -> usize {
        self.groups
    }

    fn kernel_size(&self) -> Vec<usize> {
        self.kernel_size.clone()
    }

    fn stride(&self) -> Vec<usize> {
        expand_to_rank("stride", &self.stride, self.rank())
    }

    fn dilation(&self) -> Vec<usize> {
        expand_to_rank("dilation", &self.dilation, self.rank())
    }

    fn has_bias(&self) -> bool {
        self.bias
    }
}

impl ConvNdConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        let rank = try_spatial_rank(self.rank())?;
        let stride = try_expand_to_rank("stride", &self.stride, rank)?;
        let dilation = try_expand_to_rank("dilation", &self.dilation, rank)?;

        for (name, values) in [
            ("kernel_size", &self.kernel_size),
            ("stride", &stride),
            ("dilation", &dilation),
        ] {
            if values.contains(&0) {
                return Err(format!("{name} must be > 0: {values:?}"));
            }
        }

        let [in_channels, out_channels] = self.channels;
        if self.groups == 0 || in_channels % self.groups != 0 || out_channels % self.groups != 0 {
            return Err(format!(
                "groups({}) must divide in_channels({in_channels}) and out_channels({out_channels})",
                self.groups
            ));
        }

        Ok(())
    }

    /// Initialize a [`ConvNd`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ConvNd<B> {
        if let Err(msg) = self.try_validate() {
            panic!("Invalid ConvNdConfig: {msg}\n{self:#?}");
        }

        let [in_channels, out_channels] = self.channels;
        let k = self.kernel_size();
        let s = self.stride();
        let d = self.dilation();
        let p = self.static_padding();

        match self.rank() {
            1 => {
                // Conv1dConfig does not pass fan_out to the initializer.
                let mut conv = Conv1dConfig::new(in_channels, out_channels, k[0])
                    .with_stride(s[0])
                    .with_dilation(d[0])
                    .with_padding(PaddingConfig1d::Explicit(p[0]))
                    .with_groups(self.groups)
                    .with_bias(self.bias)
                    .with_initializer(Initializer::Zeros)
                    .init(device);

                let fan_in = in_channels / self.groups * k[0];
                let fan_out = out_channels / self.groups * k[0];
                conv.weight = self.initializer.init_with(
                    [out_channels, in_channels / self.groups, k[0]],
                    Some(fan_in),
                    Some(fan_out),
                    device,
                );
                conv.bias = conv.bias.map(|_| {
                    self.initializer
                        .init_with([out_channels], Some(fan_in), Some(fan_out), device)
                });
                conv.into()
            }
            2 => Conv2dConfig::new(self.channels, [k[0], k[1]])
                .with_stride([s[0], s[1]])
                .with_dilation([d[0], d[1]])
                .with_padding(PaddingConfig2d::Explicit(p[0], p[1]))
                .with_groups(self.groups)
                .with_bias(self.bias)
                .with_initializer(self.initializer.clone())
                .init(device)
                .into(),
            _ => Conv3dConfig::new(self.channels, [k[0], k[1], k[2]])
                .with_stride([s[0], s[1], s[2]])
                .with_dilation([d[0], d[1], d[2]])
                .with_padding(PaddingConfig3d::Explicit(p[0], p[1], p[2]))
                .with_groups(self.groups)
                .with_bias(self.bias)
                .with_initializer(self.initializer.clone())
                .init(device)
                .into(),
        }
    }
}

/// Rank-dispatched ``"same"`` convolution.
///
/// Implements [`ConvNdMeta`].
#[derive(Module, Debug)]
pub enum ConvNd<B: Backend> {
    /// 1D convolution, over ``[batch, channels, length]``.
    Conv1d(Conv1d<B>),

    /// 2D convolution, over ``[batch, channels, height, width]``.
    Conv2d(Conv2d<B>),

    /// 3D convolution, over ``[batch, channels, depth, height, width]``.
    Conv3d(Conv3d<B>),
}

impl<B: Backend> From<Conv1d<B>> for ConvNd<B> {
    fn from(conv: Conv1d<B>) -> Self {
        Self::Conv1d(conv)
    }
}

impl<B: Backend> From<Conv2d<B>> for ConvNd<B> {
    fn from(conv: Conv2d<B>) -> Self {
        Self::Conv2d(conv)
    }
}

impl<B: Backend> From<Conv3d<B>> for ConvNd<B> {
    fn from(conv: Conv3d<B>) -> Self {
        Self::Conv3d(conv)
    }
}

impl<B: Backend> ConvNdMeta for ConvNd<B> {
    fn rank(&self) -> usize {
        match self {
            Self::Conv1d(_) => 1,
            Self::Conv2d(_) => 2,
            Self::Conv3d(_) => 3,
        }
    }

    fn in_channels(&self) -> usize {
        let per_group = match self {
            Self::Conv1d(conv) => conv.weight.shape().dims[1],
            Self::Conv2d(conv) => conv.weight.shape().dims[1],
            Self::Conv3d(conv) => conv.weight.shape().dims[1],
        };
        per_group * self.groups()
    }

    fn out_channels(&self) -> usize {
        match self {
            Self::Conv1d(conv) => conv.weight.shape().dims[0],
            Self::Conv2d(conv) => conv.weight.shape().dims[0],
            Self::Conv3d(conv) => conv.weight.shape().dims[0],
        }
    }

    fn groups(&self) -> usize {
        match self {
            Self::Conv1d(conv) => conv.groups,
            Self::Conv2d(conv) => conv.groups,
            Self::Conv3d(conv) => conv.groups,
        }
    }

    fn kernel_size(&self) -> Vec<usize> {
        match self {
            Self::Conv1d(conv) => vec![conv.kernel_size],
            Self::Conv2d(conv) => conv.kernel_size.to_vec(),
            Self::Conv3d(conv) => conv.kernel_size.to_vec(),
        }
    }

    fn stride(&self) -> Vec<usize> {
        match self {
            Self::Conv1d(conv) => vec![conv.stride],
            Self::Conv2d(conv) => conv.stride.to_vec(),
            Self::Conv3d(conv) => conv.stride.to_vec(),
        }
    }

    fn dilation(&self) -> Vec<usize> {
        match self {
            Self::Conv1d(conv) => vec![conv.dilation],
            Self::Conv2d(conv) => conv.dilation.to_vec(),
            Self::Conv3d(conv) => conv.dilation.to_vec(),
        }
    }

    fn has_bias(&self) -> bool {
        match self {
            Self::Conv1d(conv) => conv.bias.is_some(),
            Self::Conv2d(conv) => conv.bias.is_some(),
            Self::Conv3d(conv) => conv.bias.is_some(),
        }
    }
}

impl<B: Backend> ConvNd<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: \
    ///   ``[batch, in_channels, *in_shape]``, with ``D = rank + 2``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, *out_shape]``, where ``out_shape[i] = ceil(in_shape[i] / stride[i])``.
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        assert_tensor_rank::<D>(self.rank());
        let input = self.pad_same(input);
        let padding = self.static_padding();

        match self {
            Self::Conv1d(conv) => {
                let x: Tensor<B, 3> = cast_rank(input);
                let [batch, in_length] = unpack_shape_contract!(
                    ["batch", "in_channels", "in_length"],
                    &x,
                    &["batch", "in_length"],
                    &[("in_channels", self.in_channels())]
                );
                let out_length = expect_conv1d_output_size(
                    in_length,
                    conv.kernel_size,
                    conv.stride,
                    padding[0],
                    conv.dilation,
                );

                let y = conv.forward(x);

                assert_shape_contract_periodically!(
                    ["batch", "out_channels", "out_length"],
                    &y,
                    &[
                        ("batch", batch),
                        ("out_channels", self.out_channels()),
                        ("out_length", out_length)
                    ]
                );
                cast_rank(y)
            }
            Self::Conv2d(conv) => {
                let x: Tensor<B, 4> = cast_rank(input);
                let [batch, in_height, in_width] = unpack_shape_contract!(
                    ["batch", "in_channels", "in_height", "in_width"],
                    &x,
                    &["batch", "in_height", "in_width"],
                    &[("in_channels", self.in_channels())]
                );
                let [out_height, out_width] = expect_conv_output_shape(
                    [in_height, in_width],
                    conv.kernel_size,
                    conv.stride,
                    [padding[0], padding[1]],
                    conv.dilation,
                );

                let y = conv.forward(x);

                assert_shape_contract_periodically!(
                    ["batch", "out_channels", "out_height", "out_width"],
                    &y,
                    &[
                        ("batch", batch),
                        ("out_channels", self.out_channels()),
                        ("out_height", out_height),
                        ("out_width", out_width)
                    ]
                );
                cast_rank(y)
            }
            Self::Conv3d(conv) => {
                let x: Tensor<B, 5> = cast_rank(input);
                let [batch, in_depth, in_height, in_width] = unpack_shape_contract!(
                    ["batch", "in_channels", "in_depth", "in_height", "in_width"],
                    &x,
                    &["batch", "in_depth", "in_height", "in_width"],
                    &[("in_channels", self.in_channels())]
                );
                let [out_depth, out_height, out_width] = expect_conv_output_shape(
                    [in_depth, in_height, in_width],
                    conv.kernel_size,
                    conv.stride,
                    [padding[0], padding[1], padding[2]],
                    conv.dilation,
                );

                let y = conv.forward(x);

                assert_shape_contract_periodically!(
                    ["batch", "out_channels", "out_depth", "out_height", "out_width"],
                    &y,
                    &[
                        ("batch", batch),
                        ("out_channels", self.out_channels()),
                        ("out_depth", out_depth),
                        ("out_height", out_height),
                        ("out_width", out_width)
                    ]
                );
                cast_rank(y)
            }
        }
    }

    /// Zero-pad the part of the ``"same"`` padding not baked into the conv layer.
    fn pad_same<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        let dims = input.dims();
        let kernel_size = self.kernel_size();
        let stride = self.stride();
        let dilation = self.dilation();
        let baked = self.static_padding();

        let extra: Vec<[usize; 2]> = (0..self.rank())
            .map(|i| {
                let [before, after] = same_padding(dims[i + 2], kernel_size[i], stride[i], dilation[i]);
                [before - baked[i], after - baked[i]]
            })
            .collect();

        if extra.iter().all(|p| *p == [0, 0]) {
            input
        } else {
            zero_pad(input, &extra)
        }
    }
}
