//! # `NacUnit` - norm/activation/conv unit.
//!
//! A [`NacUnit`] is the pre-activation ordering of a [`ConvNd`]:
//! * an optional [`Normalization`] layer, sized to the conv input,
//! * an optional [`Activation`] layer,
//! * a [`ConvNd`] layer.

use crate::compat::activation_wrapper::{Activation, ActivationConfig};
use crate::compat::normalization_wrapper::{Normalization, NormalizationPolicy};
use crate::layers::conv::{ConvNd, ConvNdConfig, ConvNdMeta};
use crate::utility::rank::assert_tensor_rank;
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`NacUnit`] Meta.
pub trait NacUnitMeta {
    /// The wrapped conv meta.
    fn conv_meta(&self) -> &dyn ConvNdMeta;

    /// The spatial rank.
    fn rank(&self) -> usize {
        self.conv_meta().rank()
    }

    /// Number of input channels.
    fn in_channels(&self) -> usize {
        self.conv_meta().in_channels()
    }

    /// Number of output channels.
    fn out_channels(&self) -> usize {
        self.conv_meta().out_channels()
    }

    /// Number of conv groups.
    fn groups(&self) -> usize {
        self.conv_meta().groups()
    }

    /// Conv stride, per spatial axis.
    fn stride(&self) -> Vec<usize> {
        self.conv_meta().stride()
    }
}

/// [`NacUnit`] Config.
///
/// Implements [`NacUnitMeta`].
#[derive(Config, Debug)]
pub struct NacUnitConfig {
    /// The [`ConvNd`] config.
    pub conv: ConvNdConfig,

    /// The normalization policy.
    ///
    /// The conv bias is taken from `conv`, not from the policy.
    #[config(default = "NormalizationPolicy::default()")]
    pub norm: NormalizationPolicy,

    /// The activation; `None` is linear.
    #[config(default = "None")]
    pub act: Option<ActivationConfig>,
}

impl NacUnitMeta for NacUnitConfig {
    fn conv_meta(&self) -> &dyn ConvNdMeta {
        &self.conv
    }
}

impl NacUnitConfig {
    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        self.conv.try_validate()?;
        self.norm.try_validate_features(self.in_channels())
    }

    /// Initialize a [`NacUnit`].
    ///
    /// The norm and activation layers are feature matched to the conv input channels.
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> NacUnit<B> {
        if let Err(msg) = self.try_validate() {
            panic!("Invalid NacUnitConfig: {msg}");
        }
        NacUnit {
            norm: self.norm.init(self.in_channels(), device),
            act: self.act.as_ref().map(|act| act.init(self.in_channels(), device)),
            conv: self.conv.init(device),
        }
    }
}

/// Sequenced norm/activation/conv unit.
///
/// Implements [`NacUnitMeta`].
#[derive(Module, Debug)]
pub struct NacUnit<B: Backend> {
    /// Norm layer, over the conv input.
    pub norm: Option<Normalization<B>>,

    /// Activation layer.
    pub act: Option<Activation<B>>,

    /// Conv layer.
    pub conv: ConvNd<B>,
}

impl<B: Backend> NacUnitMeta for NacUnit<B> {
    fn conv_meta(&self) -> &dyn ConvNdMeta {
        &self.conv
    }
}

impl<B: Backend> NacUnit<B> {
    /// Forward Pass.
    ///
    /// ```rust,ignore
    /// let x = self.norm.forward(input);
    /// let x = self.act.forward(x);
    /// let x = self.conv.forward(x);
    /// return x
    /// ```
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
        let dims = input.dims();
        assert_eq!(
            dims[1],
            self.in_channels(),
            "Expected {} input channels, found shape {dims:?}",
            self.in_channels()
        );

        let x = match &self.norm {
            Some(norm) => norm.forward(input),
            None => input,
        };
        let x = match &self.act {
            Some(act) => act.forward(x),
            None => x,
        };
        let x = self.conv.forward(x);

        let out_dims = x.dims();
        assert_eq!(
            [out_dims[0], out_dims[1]],
            [dims[0], self.out_channels()],
            "Unexpected NacUnit output shape {out_dims:?}"
        );
        x
    }
}
