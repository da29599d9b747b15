//! Long-running sampling tasks

pub mod sampler;
