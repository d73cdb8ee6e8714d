//! # Dropout Layers
pub mod dropout;

pub use dropout::*;
