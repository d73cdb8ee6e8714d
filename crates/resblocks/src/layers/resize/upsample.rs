//! # `UpsampleNearest` - nearest-neighbour upsampling.
//!
//! Repeats every element ``scale[i]`` times along spatial axis ``i``.

use crate::utility::rank::{assert_tensor_rank, try_expand_to_rank, try_spatial_rank};
use burn::module::Ignored;
use burn::prelude::{Backend, Config, Module, Tensor};
use burn::tensor::Int;

/// Nearest-neighbour upsample the spatial axes of a channels-first tensor.
///
/// # Arguments
///
/// - `input`: ``[batch, channels, *spatial]``.
/// - `scale`: the integer scale factor per spatial axis.
///
/// # Returns
///
/// ``[batch, channels, spatial[i] * scale[i], ...]``
pub fn upsample_nearest<B: Backend, const D: usize>(
    input: Tensor<B, D>,
    scale: &[usize],
) -> Tensor<B, D> {
    assert_tensor_rank::<D>(scale.len());
    let device = input.device();

    scale
        .iter()
        .enumerate()
        .fold(input, |x, (i, &factor)| {
            assert!(factor > 0, "scale must be > 0: {scale:?}");
            if factor == 1 {
                return x;
            }
            let axis = i + 2;
            let size = x.dims()[axis];
            let indices = Tensor::<B, 1, Int>::arange(0..(size * factor) as i64, &device)
                .div_scalar(factor as i64);
            x.select(axis, indices)
        })
}

/// [`UpsampleNearest`] Config.
#[derive(Config, Debug)]
pub struct UpsampleNearestConfig {
    /// Scale factor; one per spatial axis, or a single shared factor.
    pub scale: Vec<usize>,
}

impl UpsampleNearestConfig {
    /// Initialize an [`UpsampleNearest`] for a spatial rank.
    ///
    /// # Panics
    ///
    /// If the rank or scale is invalid.
    pub fn init(
        &self,
        rank: usize,
    ) -> UpsampleNearest {
        let scale = try_spatial_rank(rank)
            .and_then(|rank| try_expand_to_rank("scale", &self.scale, rank))
            .and_then(|scale| {
                if scale.contains(&0) {
                    Err(format!("scale must be > 0: {scale:?}"))
                } else {
                    Ok(scale)
                }
            })
            .unwrap_or_else(|msg| panic!("Invalid UpsampleNearestConfig: {msg}"));
        UpsampleNearest {
            scale: Ignored(scale),
        }
    }
}

/// Nearest-neighbour upsampling layer.
#[derive(Module, Clone, Debug)]
pub struct UpsampleNearest {
    /// Scale factor per spatial axis.
    pub scale: Ignored<Vec<usize>>,
}

impl UpsampleNearest {
    /// The spatial rank.
    pub fn rank(&self) -> usize {
        self.scale.len()
    }

    /// Get the output resolution for a given input resolution.
    pub fn output_resolution(
        &self,
        input_resolution: &[usize],
    ) -> Vec<usize> {
        input_resolution
            .iter()
            .zip(self.scale.iter())
            .map(|(&size, &factor)| size * factor)
            .collect()
    }

    /// Forward Pass.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn forward<B: Backend, const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        upsample_nearest(input, &self.scale)
    }
}
