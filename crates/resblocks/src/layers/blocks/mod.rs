//! # Building Blocks
//!
//! The sub-layers residual blocks are assembled from.
pub mod nac;
pub mod projection;

pub use nac::*;
pub use projection::*;
