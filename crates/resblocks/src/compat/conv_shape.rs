//! # Convolution Shape Utilities
//!
//! Utilities for computing the output shape of convolution operations,
//! and the ``"same"`` padding which preserves ``ceil(in / stride)``.

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
/// - `input_size`: The input dimension size, must be > 0.
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
    assert!(input_size > 0);
    assert!(kernel_size > 0);
    assert!(stride > 0);
    assert!(dilation > 0);

    let effective_size = input_size + 2 * padding;
    let pos = effective_size + stride;
    let kernel_width = 1 + dilation * (kernel_size - 1);

    if pos < kernel_width {
        return None;
    }
    let x = (pos - kernel_width) / stride;
    if x < 1 { None } else { Some(x) }
}

/// Predict the output size of a 1D convolution operation.
///
/// This is the ``panic``-ing variant of [`maybe_conv1d_output_size`].
///
/// # Panics
///
/// If the output size would be <= 0.
pub fn expect_conv1d_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> usize {
    match maybe_conv1d_output_size(input_size, kernel_size, stride, padding, dilation) {
        Some(x) => x,
        None => panic!(
            "No legal output size for conv1d with:\n input_size:{input_size}\n kernel_size:{kernel_size}\n stride:{stride}\n dilation:{dilation}\n padding:{padding}",
        ),
    }
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

/// The output size of a ``"same"`` padded convolution.
///
/// ```text
/// out_size = ceil(in_size / stride)
/// ```
#[inline(always)]
pub fn same_output_size(
    input_size: usize,
    stride: usize,
) -> usize {
    assert!(stride > 0);
    input_size.div_ceil(stride)
}

/// Compute ``"same"`` padding for one axis of a convolution.
///
/// Matches TensorFlow's ``padding="same"``: the total padding is the
/// amount needed for `same_output_size(input_size, stride)` outputs,
/// and an odd total puts the extra element on the trailing side.
///
/// # Arguments
///
/// - `input_size`: The input dimension size, must be > 0.
/// - `kernel_size`: The kernel size, must be > 0.
/// - `stride`: The stride of the convolution, must be > 0.
/// - `dilation`: The dilation of the convolution, must be > 0.
///
/// # Returns
///
/// ``[before, after]`` padding amounts.
pub fn same_padding(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    dilation: usize,
) -> [usize; 2] {
    assert!(input_size > 0);
    assert!(kernel_size > 0);
    assert!(dilation > 0);

    let output_size = same_output_size(input_size, stride);
    let kernel_width = 1 + dilation * (kernel_size - 1);
    let total = ((output_size - 1) * stride + kernel_width).saturating_sub(input_size);

    let before = total / 2;
    [before, total - before]
}

/// The symmetric padding a ``"same"`` convolution can bake into the layer.
///
/// For ``stride == 1`` the ``"same"`` padding is independent of the input size,
/// and its symmetric part is ``dilation*(kernel_size-1)/2``. Strided convolutions
/// get their padding at call time from [`same_padding`].
#[inline(always)]
pub fn static_same_padding(
    kernel_size: usize,
    stride: usize,
    dilation: usize,
) -> usize {
    if stride == 1 {
        dilation * (kernel_size - 1) / 2
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv1d_output_shape() {
        pub fn conv1d_output_size_reference(
            input_shape: usize,
            kernel_shape: usize,
            stride: usize,
            padding: usize,
            dilation: usize,
        ) -> Option<usize> {
            let input_shape = input_shape as f64;
            let kernel_shape = kernel_shape as f64;
            let stride = stride as f64;
            let dilation = dilation as f64;
            let padding = padding as f64;

            let effective_shape = input_shape + 2.0 * padding;
            let kernel_width = 1.0 + dilation * (kernel_shape - 1.0);

            let x = (((effective_shape - kernel_width) / stride) + 1.0).floor();
            if x < 1.0 { None } else { Some(x as usize) }
        }

        for input_shape in 1..10 {
            for stride in 1..3 {
                for kernel_shape in 1..4 {
                    for padding in 0..4 {
                        assert_eq!(
                            maybe_conv1d_output_size(input_shape, kernel_shape, stride, padding, 1),
                            conv1d_output_size_reference(input_shape, kernel_shape, stride, padding, 1)
                        )
                    }
                }
            }
        }
    }

    #[test]
    fn test_expect_conv_output_shape() {
        assert_eq!(
            expect_conv_output_shape([8, 7], [3, 3], [1, 1], [1, 1], [1, 1]),
            [8, 7]
        );
        assert_eq!(
            expect_conv_output_shape([8, 7], [1, 1], [2, 2], [0, 0], [1, 1]),
            [4, 4]
        );
    }

    #[test]
    #[should_panic(expected = "No legal output size for conv1d")]
    fn test_expect_conv1d_output_size_panic() {
        expect_conv1d_output_size(2, 5, 1, 0, 1);
    }

    #[test]
    fn test_same_output_size() {
        assert_eq!(same_output_size(8, 1), 8);
        assert_eq!(same_output_size(8, 2), 4);
        assert_eq!(same_output_size(7, 2), 4);
        assert_eq!(same_output_size(1, 3), 1);
    }

    #[test]
    fn test_same_padding() {
        // Odd kernels pad symmetrically.
        assert_eq!(same_padding(8, 3, 1, 1), [1, 1]);
        assert_eq!(same_padding(8, 3, 1, 2), [2, 2]);
        assert_eq!(same_padding(8, 5, 1, 1), [2, 2]);

        // Even kernels put the extra element last.
        assert_eq!(same_padding(8, 2, 1, 1), [0, 1]);
        assert_eq!(same_padding(8, 4, 1, 1), [1, 2]);

        // Pointwise strided convs never pad.
        assert_eq!(same_padding(8, 1, 2, 1), [0, 0]);
        assert_eq!(same_padding(7, 1, 2, 1), [0, 0]);

        // Strided padding depends upon the input size.
        assert_eq!(same_padding(8, 3, 2, 1), [0, 1]);
        assert_eq!(same_padding(7, 3, 2, 1), [1, 1]);
    }

    #[test]
    fn test_same_padding_preserves_same_output_size() {
        for input_size in 1..12 {
            for kernel_size in 1..5 {
                for stride in 1..4 {
                    for dilation in 1..3 {
                        if stride > 1 && dilation > 1 {
                            continue;
                        }
                        let [before, after] =
                            same_padding(input_size, kernel_size, stride, dilation);
                        let kernel_width = 1 + dilation * (kernel_size - 1);
                        let padded = input_size + before + after;
                        let out = (padded - kernel_width) / stride + 1;
                        assert_eq!(out, same_output_size(input_size, stride));
                    }
                }
            }
        }
    }

    #[test]
    fn test_static_same_padding() {
        assert_eq!(static_same_padding(3, 1, 1), 1);
        assert_eq!(static_same_padding(3, 1, 2), 2);
        assert_eq!(static_same_padding(4, 1, 1), 1);
        assert_eq!(static_same_padding(3, 2, 1), 0);
        for kernel_size in 1..6 {
            for dilation in 1..3 {
                let [before, _] = same_padding(16, kernel_size, 1, dilation);
                assert_eq!(static_same_padding(kernel_size, 1, dilation), before);
            }
        }
    }
}
