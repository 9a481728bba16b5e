//! # Global Average Pooling

use burn::module::Module;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::prelude::{Backend, Tensor};

/// Global Average Pooling.
///
/// Reduces every channel of a feature map to its spatial mean,
/// mapping ``[batch, channels, height, width]`` to ``[batch, channels]``.
///
/// Works for any spatial resolution ``>= 1x1``.
#[derive(Module, Clone, Debug)]
pub struct GlobalAvgPool2d {
    pool: AdaptiveAvgPool2d,
}

impl Default for GlobalAvgPool2d {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalAvgPool2d {
    /// Create a new [`GlobalAvgPool2d`].
    pub fn new() -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }

    /// Pool to a ``[batch, channels, 1, 1]`` map.
    pub fn forward_map<B: Backend>(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.pool.forward(input)
    }

    /// Pool to a ``[batch, channels]`` vector.
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch, channels, _, _] = input.dims();
        self.forward_map(input).reshape([batch, channels])
    }
}
