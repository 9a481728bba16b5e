//! # `ResNet` Utilities
use crate::compat::conv_shape::expect_conv_output_shape;

/// Broadcast a scalar to a square array.
#[inline(always)]
pub fn scalar_to_array<const D: usize>(value: usize) -> [usize; D] {
    [value; D]
}

/// Get the output resolution of a strided `ResNet` path.
///
/// Both the padded 3x3 convs and the unpadded 1x1 projections of a
/// block reduce a side of ``size`` to ``(size - 1) / stride + 1``.
///
/// # Arguments
///
/// - `input_resolution`: ``[in_height, in_width]``.
/// - `stride`: the (combined) stride.
///
/// # Returns
///
/// ``[out_height, out_width]``
///
/// # Panics
///
/// If the input resolution has a zero side.
#[inline(always)]
pub fn strided_output_resolution(
    input_resolution: [usize; 2],
    stride: usize,
) -> [usize; 2] {
    expect_conv_output_shape(
        input_resolution,
        [1, 1],
        scalar_to_array(stride),
        [0, 0],
        [1, 1],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_to_array() {
        assert_eq!(scalar_to_array::<2>(3), [3, 3]);
    }

    #[test]
    fn test_strided_output_resolution() {
        assert_eq!(strided_output_resolution([32, 16], 1), [32, 16]);
        assert_eq!(strided_output_resolution([32, 16], 2), [16, 8]);
        assert_eq!(strided_output_resolution([7, 8], 2), [4, 4]);
        assert_eq!(strided_output_resolution([36, 33], 8), [5, 5]);
    }

    #[test]
    fn test_strided_output_resolution_chains() {
        // Applying the stage strides one at a time matches their product.
        for size in 1..70 {
            let stepwise = [1, 2, 2, 2]
                .iter()
                .fold([size, size], |res, &stride| strided_output_resolution(res, stride));
            assert_eq!(stepwise, strided_output_resolution([size, size], 8));
        }
    }

    #[test]
    #[should_panic(expected = "No legal output size")]
    fn test_strided_output_resolution_empty() {
        strided_output_resolution([0, 8], 2);
    }
}
