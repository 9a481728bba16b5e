//! # Receptive Field Arithmetic
//!
//! Tracks the receptive field of a feature map position back to input pixels,
//! through a stack of convolution and pooling layers.
//!
//! For each layer, per axis:
//!
//! ```text
//! k_eff = dilation * (kernel - 1) + 1
//! size_out = size_in + (k_eff - 1) * jump_in
//! jump_out = jump_in * stride
//! ```

use burn::nn::conv::Conv2dConfig;

/// Receptive field of one feature map position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceptiveField {
    /// ``[height, width]`` extent, in input pixels.
    pub size: [usize; 2],

    /// ``[height, width]`` distance, in input pixels, between adjacent positions.
    pub jump: [usize; 2],
}

impl Default for ReceptiveField {
    fn default() -> Self {
        Self::pixel()
    }
}

impl ReceptiveField {
    /// The receptive field of a single input pixel.
    pub fn pixel() -> Self {
        Self {
            size: [1, 1],
            jump: [1, 1],
        }
    }

    /// Extend through a windowed layer.
    ///
    /// # Arguments
    ///
    /// - `kernel_size`: ``[height, width]`` window.
    /// - `stride`: ``[height, width]`` stride.
    /// - `dilation`: ``[height, width]`` dilation.
    pub fn window(
        self,
        kernel_size: [usize; 2],
        stride: [usize; 2],
        dilation: [usize; 2],
    ) -> Self {
        let mut size = self.size;
        let mut jump = self.jump;
        for i in 0..2 {
            let effective_kernel = dilation[i] * (kernel_size[i] - 1) + 1;
            size[i] += (effective_kernel - 1) * self.jump[i];
            jump[i] *= stride[i];
        }
        Self { size, jump }
    }

    /// Extend through a [`Conv2dConfig`].
    pub fn conv2d(
        self,
        conv: &Conv2dConfig,
    ) -> Self {
        self.window(conv.kernel_size, conv.stride, conv.dilation)
    }

    /// Extend through an undilated pooling window.
    pub fn pool2d(
        self,
        kernel_size: [usize; 2],
        stride: [usize; 2],
    ) -> Self {
        self.window(kernel_size, stride, [1, 1])
    }
}
