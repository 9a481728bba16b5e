//! # Plain Net
//!
//! A non-residual CIFAR classifier: four [`conv_block::ConvBlock`]s of
//! conv/activation/norm/dropout units, max-pooled between blocks,
//! with a conv class projection and global average pooling.
//!
//! Block 3 uses depthwise-separable convs; block 4 uses a dilated conv.

pub mod conv_block;
pub mod plain_net;

pub use conv_block::*;
pub use plain_net::*;
