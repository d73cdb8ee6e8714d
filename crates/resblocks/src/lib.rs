#![warn(missing_docs)]
//!# resblocks - Residual Blocks for Burn
//!
//! Pre-activation (`ResNet` v2) residual blocks and `ResNeXt` blocks,
//! in plain and transposed (upsampling) forms, for 1D, 2D and 3D inputs.
//!
//! ## Notable Components
//!
//! * [`compat`] - compat code, wrapping ``burn`` layers for rank-generic use.
//!   * [`compat::activation_wrapper::Activation`] - activation layer abstraction wrapper.
//!   * [`compat::normalization_wrapper::Normalization`] - norm layer abstraction wrapper.
//!   * [`compat::conv_shape`] - convolution shape arithmetic.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::conv`] - rank-dispatched ``"same"`` convolution.
//!   * [`layers::resize`] - upsampling, zero padding and cropping.
//!   * [`layers::drop`] - dropout variants.
//!   * [`layers::blocks`] - `NAC` units and projection shortcuts.
//!   * [`layers::residual`] - the residual / `ResNeXt` block family.
//!     * [`layers::residual::residual_block`] - downsampling blocks.
//!     * [`layers::residual::transpose_block`] - upsampling blocks.
//!     * [`layers::residual::latent`] - latent width heuristics.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod compat;

#[cfg(test)]
pub(crate) mod testing;

pub mod layers;
pub mod utility;
