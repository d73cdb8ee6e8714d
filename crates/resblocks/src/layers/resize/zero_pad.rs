//! # `ZeroPad` - per-axis zero padding.

use crate::utility::rank::{assert_tensor_rank, try_expand_to_rank, try_spatial_rank};
use burn::module::Ignored;
use burn::prelude::{Backend, Config, Module, Tensor};
use core::ops::Range;

/// Zero-pad the spatial axes of a channels-first tensor.
///
/// # Arguments
///
/// - `input`: ``[batch, channels, *spatial]``.
/// - `padding`: ``(before, after)`` per spatial axis.
///
/// # Returns
///
/// ``[batch, channels, spatial[i] + before[i] + after[i], ...]``
pub fn zero_pad<B: Backend, const D: usize>(
    input: Tensor<B, D>,
    padding: &[[usize; 2]],
) -> Tensor<B, D> {
    assert_tensor_rank::<D>(padding.len());

    let dims = input.dims();
    let mut out_dims = dims;
    for (i, [before, after]) in padding.iter().enumerate() {
        out_dims[i + 2] += before + after;
    }

    let ranges: [Range<usize>; D] = core::array::from_fn(|i| {
        let offset = if i < 2 { 0 } else { padding[i - 2][0] };
        offset..offset + dims[i]
    });

    Tensor::zeros(out_dims, &input.device()).slice_assign(ranges, input)
}

/// [`ZeroPad`] Config.
#[derive(Config, Debug)]
pub struct ZeroPadConfig {
    /// ``(before, after)`` padding; one pair per spatial axis, or a single shared pair.
    pub padding: Vec<[usize; 2]>,
}

impl ZeroPadConfig {
    /// Initialize a [`ZeroPad`] for a spatial rank.
    ///
    /// # Panics
    ///
    /// If the rank or padding length is invalid.
    pub fn init(
        &self,
        rank: usize,
    ) -> ZeroPad {
        let padding = try_spatial_rank(rank)
            .and_then(|rank| try_expand_to_rank("padding", &self.padding, rank))
            .unwrap_or_else(|msg| panic!("Invalid ZeroPadConfig: {msg}"));
        ZeroPad {
            padding: Ignored(padding),
        }
    }
}

/// Per-axis zero padding layer.
#[derive(Module, Clone, Debug)]
pub struct ZeroPad {
    /// ``(before, after)`` padding per spatial axis.
    pub padding: Ignored<Vec<[usize; 2]>>,
}

impl ZeroPad {
    /// The spatial rank.
    pub fn rank(&self) -> usize {
        self.padding.len()
    }

    /// Get the output resolution for a given input resolution.
    pub fn output_resolution(
        &self,
        input_resolution: &[usize],
    ) -> Vec<usize> {
        input_resolution
            .iter()
            .zip(self.padding.iter())
            .map(|(&size, [before, after])| size + before + after)
            .collect()
    }

    /// Forward Pass.
    pub fn forward<B: Backend, const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        zero_pad(input, &self.padding)
    }
}
