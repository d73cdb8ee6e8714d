//! # Spatial Resize Layers
//!
//! Channels-first resizing of the spatial axes of
//! ``[batch, channels, *spatial]`` tensors.
pub mod crop;
pub mod resize_plan;
pub mod upsample;
pub mod zero_pad;

pub use crop::*;
pub use resize_plan::*;
pub use upsample::*;
pub use zero_pad::*;
