//! # Neural Network Layers
pub mod blocks;
pub mod conv;
pub mod drop;
pub mod resize;
pub mod residual;
