//! # Convolution Layers
pub mod conv_nd;

pub use conv_nd::*;
