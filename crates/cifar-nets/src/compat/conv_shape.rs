//! # Convolution Shape Utilities
//!
//! Utilities for computing the output shape of convolution and pooling operations.

use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;

/// Predict the output size of a 1D convolution operation.
///
/// ```text
/// out_size = floor( ((in_size + 2*padding - dilation*(kernel_size-1) - 1) / stride) + 1 )
/// ```
///
/// # Reference
///
/// - [conv_arithmetic diagram](https://github.com/vdumoulin/conv_arithmetic/blob/master/README.md)
///   visual explanations of these convolution parameters.
///
/// # Arguments
///
/// - `input_size`: The input dimension size; 0 yields `None`.
/// - `kernel_size`: The kernel size, must be > 0.
/// - `stride`: The stride of the convolution, must be > 0.
/// - `padding`: The padding of the convolution, added evenly to all sides of the input.
/// - `dilation`: The dilation of the convolution, must be > 0.
///
/// # Returns
///
/// An `Option<usize>` representing the output size; or `None` for <= 0.
pub fn maybe_conv1d_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> Option<usize> {
    assert!(kernel_size > 0);
    assert!(stride > 0);
    assert!(dilation > 0);

    if input_size == 0 {
        return None;
    }

    let effective_size = input_size + 2 * padding;
    let pos = effective_size + stride;
    let kernel_width = 1 + dilation * (kernel_size - 1);

    if pos < kernel_width {
        return None;
    }
    let x = (pos - kernel_width) / stride;
    if x < 1 { None } else { Some(x) }
}

/// Predict the output shape of a D convolution operation.
///
/// This is the generalization of [`maybe_conv1d_output_size`] to D dimensions.
///
/// # Returns
///
/// An `Option<[usize; D]>` representing the output shape; or `None` for <= 0.
pub fn maybe_conv_output_shape<const D: usize>(
    input_shape: [usize; D],
    kernel_shape: [usize; D],
    stride: [usize; D],
    padding: [usize; D],
    dilation: [usize; D],
) -> Option<[usize; D]> {
    let mut output_shape = input_shape;
    for i in 0..D {
        output_shape[i] = maybe_conv1d_output_size(
            input_shape[i],
            kernel_shape[i],
            stride[i],
            padding[i],
            dilation[i],
        )?;
    }
    Some(output_shape)
}

/// Predict the output shape of a D convolution operation.
///
/// This is the ``panic``-ing variant of [`maybe_conv_output_shape`].
///
/// # Panics
///
/// If any output dimension would be <= 0.
pub fn expect_conv_output_shape<const D: usize>(
    input_shape: [usize; D],
    kernel_shape: [usize; D],
    stride: [usize; D],
    padding: [usize; D],
    dilation: [usize; D],
) -> [usize; D] {
    match maybe_conv_output_shape(input_shape, kernel_shape, stride, padding, dilation) {
        Some(shape) => shape,
        None => panic!(
            "No legal output size for conv with:\n input_shape:{input_shape:?}\n kernel_shape:{kernel_shape:?}\n stride:{stride:?}\n dilation:{dilation:?}\n padding:{padding:?}",
        ),
    }
}

/// Resolve a [`PaddingConfig2d`] to explicit ``[pad_height, pad_width]`` values.
///
/// `Same` padding resolves to ``(dilation * (kernel - 1)) / 2``,
/// which matches ``burn``'s behavior for odd kernels at stride 1.
pub fn resolve_padding2d(
    padding: &PaddingConfig2d,
    kernel_size: [usize; 2],
    dilation: [usize; 2],
) -> [usize; 2] {
    match padding {
        PaddingConfig2d::Valid => [0, 0],
        PaddingConfig2d::Explicit(h, w) => [*h, *w],
        PaddingConfig2d::Same => [
            (dilation[0] * (kernel_size[0] - 1)) / 2,
            (dilation[1] * (kernel_size[1] - 1)) / 2,
        ],
    }
}

/// Predict the ``[height, width]`` output resolution of a [`Conv2dConfig`].
///
/// # Returns
///
/// `None` if the convolution has no legal output for `input_resolution`.
pub fn maybe_conv2d_output_resolution(
    conv: &Conv2dConfig,
    input_resolution: [usize; 2],
) -> Option<[usize; 2]> {
    maybe_conv_output_shape(
        input_resolution,
        conv.kernel_size,
        conv.stride,
        resolve_padding2d(&conv.padding, conv.kernel_size, conv.dilation),
        conv.dilation,
    )
}

/// Predict the ``[height, width]`` output resolution of a [`Conv2dConfig`].
///
/// # Panics
///
/// If the convolution has no legal output for `input_resolution`.
pub fn conv2d_output_resolution(
    conv: &Conv2dConfig,
    input_resolution: [usize; 2],
) -> [usize; 2] {
    expect_conv_output_shape(
        input_resolution,
        conv.kernel_size,
        conv.stride,
        resolve_padding2d(&conv.padding, conv.kernel_size, conv.dilation),
        conv.dilation,
    )
}

/// Predict the ``[height, width]`` output resolution of an unpadded pooling window.
///
/// # Returns
///
/// `None` if the pooling window is larger than the input.
pub fn maybe_pool2d_output_resolution(
    input_resolution: [usize; 2],
    kernel_size: [usize; 2],
    stride: [usize; 2],
) -> Option<[usize; 2]> {
    maybe_conv_output_shape(input_resolution, kernel_size, stride, [0, 0], [1, 1])
}

/// Predict the ``[height, width]`` output resolution of an unpadded pooling window.
///
/// # Panics
///
/// If the pooling window is larger than the input.
pub fn pool2d_output_resolution(
    input_resolution: [usize; 2],
    kernel_size: [usize; 2],
    stride: [usize; 2],
) -> [usize; 2] {
    expect_conv_output_shape(input_resolution, kernel_size, stride, [0, 0], [1, 1])
}
