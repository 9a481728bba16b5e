//! # Compat
//!
//! Shape arithmetic mirroring the behavior of ``burn`` layers,
//! so structure can be inspected without running a forward pass.
pub mod conv_shape;
