//! # Spatial Rank Utilities
//!
//! Blocks in this crate are configured with a runtime spatial rank
//! (1, 2, or 3), and run on channels-first tensors of rank ``D = rank + 2``:
//! ``[batch, channels, *spatial]``.

use burn::prelude::{Backend, Tensor};
use core::fmt::Debug;

/// The supported spatial ranks.
pub const SUPPORTED_RANKS: core::ops::RangeInclusive<usize> = 1..=3;

/// Check that a spatial rank is supported.
pub fn try_spatial_rank(rank: usize) -> Result<usize, String> {
    if SUPPORTED_RANKS.contains(&rank) {
        Ok(rank)
    } else {
        Err(format!("rank must be 1, 2 or 3, found {rank}"))
    }
}

/// Expand a per-axis parameter to a given rank.
///
/// A single value is broadcast to every axis; a full-rank list is returned as-is.
///
/// # Arguments
///
/// - `name`: the parameter name, for error messages.
/// - `values`: either ``[v]`` or ``[v_0, .., v_{rank-1}]``.
/// - `rank`: the target rank.
///
/// # Returns
///
/// A `Result<Vec<usize>, String>` of length `rank`.
pub fn try_expand_to_rank<T: Clone + Debug>(
    name: &str,
    values: &[T],
    rank: usize,
) -> Result<Vec<T>, String> {
    match values.len() {
        1 => Ok(vec![values[0].clone(); rank]),
        n if n == rank => Ok(values.to_vec()),
        n => Err(format!(
            "{name} must have 1 or {rank} values, found {n}: {values:?}"
        )),
    }
}

/// Expand a per-axis parameter to a given rank.
///
/// This is the ``panic``-ing variant of [`try_expand_to_rank`].
pub fn expand_to_rank<T: Clone + Debug>(
    name: &str,
    values: &[T],
    rank: usize,
) -> Vec<T> {
    match try_expand_to_rank(name, values, rank) {
        Ok(values) => values,
        Err(msg) => panic!("{msg}"),
    }
}

/// Assert that a tensor of rank `D` carries `rank` spatial axes.
///
/// # Panics
///
/// If ``D != rank + 2``.
#[inline(always)]
pub fn assert_tensor_rank<const D: usize>(rank: usize) {
    assert_eq!(
        D,
        rank + 2,
        "Expected a rank {} [batch, channels, ..{rank} spatial] tensor, found rank {D}",
        rank + 2,
    );
}

/// Re-type a tensor of rank `S` as a tensor of rank `T`.
///
/// Used to hand a const-generic tensor to a rank-specific ``burn`` layer,
/// after the runtime rank has been checked.
///
/// # Panics
///
/// If ``S != T``.
pub fn cast_rank<B: Backend, const S: usize, const T: usize>(
    tensor: Tensor<B, S>
) -> Tensor<B, T> {
    assert_eq!(S, T, "Cannot cast a rank {S} tensor to rank {T}");
    let dims = tensor.dims();
    let shape: [usize; T] = core::array::from_fn(|i| dims[i]);
    tensor.reshape(shape)
}
