//! # Compat
//!
//! Wrappers which lift ``burn`` layers into the channels-first,
//! rank-generic form used by the blocks in this crate.
pub mod activation_wrapper;
pub mod conv_shape;
pub mod normalization_wrapper;
