//! Shared test helpers.

use burn::backend::{Autodiff, NdArray};
use burn::prelude::{Backend, Tensor};

/// Inference backend; dropout layers are inactive.
pub type TestBackend = NdArray<f32>;

/// Training backend; dropout layers are active.
pub type TrainBackend = Autodiff<NdArray<f32>>;

/// Flatten a tensor's data into a `Vec<f32>`.
pub fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().to_vec::<f32>().unwrap()
}
