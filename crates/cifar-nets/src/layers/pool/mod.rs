//! # Pooling Layers
pub mod global_avg_pool;

pub use global_avg_pool::*;
