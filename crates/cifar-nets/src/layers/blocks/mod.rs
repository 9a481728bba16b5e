//! # Miscellaneous Blocks
pub mod cand;
pub mod conv_norm;
