//! # `Crop` - per-axis cropping.

use crate::utility::rank::{assert_tensor_rank, try_expand_to_rank, try_spatial_rank};
use burn::module::Ignored;
use burn::prelude::{Backend, Config, Module, Tensor};
use core::ops::Range;

/// The extent left after cropping ``(before, after)`` from `size`.
///
/// # Returns
///
/// ``size - before - after``, or an error if nothing would be left.
pub fn try_crop_output_size(
    size: usize,
    cropping: [usize; 2],
) -> Result<usize, String> {
    let [before, after] = cropping;
    before
        .checked_add(after)
        .and_then(|total| size.checked_sub(total))
        .filter(|&rem| rem > 0)
        .ok_or_else(|| format!("Cannot crop {cropping:?} from an extent of {size}"))
}

/// Crop the spatial axes of a channels-first tensor.
///
/// # Arguments
///
/// - `input`: ``[batch, channels, *spatial]``.
/// - `cropping`: ``(before, after)`` per spatial axis.
///
/// # Returns
///
/// ``[batch, channels, spatial[i] - before[i] - after[i], ...]``
///
/// # Panics
///
/// If any axis would be cropped to nothing.
pub fn crop<B: Backend, const D: usize>(
    input: Tensor<B, D>,
    cropping: &[[usize; 2]],
) -> Tensor<B, D> {
    assert_tensor_rank::<D>(cropping.len());

    let dims = input.dims();
    let ranges: [Range<usize>; D] = core::array::from_fn(|i| {
        if i < 2 {
            return 0..dims[i];
        }
        let [before, _] = cropping[i - 2];
        match try_crop_output_size(dims[i], cropping[i - 2]) {
            Ok(size) => before..before + size,
            Err(msg) => panic!("{msg}: axis {i} of {dims:?}"),
        }
    });

    input.slice(ranges)
}

/// [`Crop`] Config.
#[derive(Config, Debug)]
pub struct CropConfig {
    /// ``(before, after)`` cropping; one pair per spatial axis, or a single shared pair.
    pub cropping: Vec<[usize; 2]>,
}

impl CropConfig {
    /// Initialize a [`Crop`] for a spatial rank.
    ///
    /// # Panics
    ///
    /// If the rank or cropping length is invalid.
    pub fn init(
        &self,
        rank: usize,
    ) -> Crop {
        let cropping = try_spatial_rank(rank)
            .and_then(|rank| try_expand_to_rank("cropping", &self.cropping, rank))
            .unwrap_or_else(|msg| panic!("Invalid CropConfig: {msg}"));
        Crop {
            cropping: Ignored(cropping),
        }
    }
}

/// Per-axis cropping layer.
#[derive(Module, Clone, Debug)]
pub struct Crop {
    /// ``(before, after)`` cropping per spatial axis.
    pub cropping: Ignored<Vec<[usize; 2]>>,
}

impl Crop {
    /// The spatial rank.
    pub fn rank(&self) -> usize {
        self.cropping.len()
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Returns
    ///
    /// An error if any axis would be cropped to nothing.
    pub fn try_output_resolution(
        &self,
        input_resolution: &[usize],
    ) -> Result<Vec<usize>, String> {
        input_resolution
            .iter()
            .zip(self.cropping.iter())
            .map(|(&size, &cropping)| try_crop_output_size(size, cropping))
            .collect()
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Panics
    ///
    /// If any axis would be cropped to nothing.
    pub fn output_resolution(
        &self,
        input_resolution: &[usize],
    ) -> Vec<usize> {
        self.try_output_resolution(input_resolution)
            .unwrap_or_else(|msg| panic!("{msg}"))
    }

    /// Forward Pass.
    pub fn forward<B: Backend, const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        crop(input, &self.cropping)
    }
}
