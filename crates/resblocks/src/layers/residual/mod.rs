//! # Residual Blocks
//!
//! Pre-activation (`ResNet` v2) residual blocks and `ResNeXt` blocks,
//! for 1D, 2D and 3D inputs.
//!
//! * [`residual_block`] - blocks that keep or reduce (``stride``) the resolution.
//! * [`transpose_block`] - blocks that upsample (``stride``) the resolution.
//!
//! Both are assembled around a shared [`stack::ResidualStack`].
pub mod latent;
pub mod residual_block;
pub mod stack;
pub mod transpose_block;

pub use latent::*;
pub use residual_block::*;
pub use stack::*;
pub use transpose_block::*;
