//! # Utilities

pub mod probability;
pub mod rank;
