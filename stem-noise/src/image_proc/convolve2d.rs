//! 2D convolution and Gaussian blur for ndarray images
//!
//! Provides kernel correlation with configurable edge handling, with optional
//! parallel processing using rayon, plus the separable Gaussian blur used to
//! model probe/detector smoothing.

use ndarray::{Array1, Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

/// Kernel reach of the Gaussian blur, in standard deviations.
pub const GAUSSIAN_TRUNCATE: f64 = 4.0;

/// Options for controlling the convolution operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvolveOptions {
    /// Whether to use parallel processing with rayon
    pub parallel: bool,

    /// Controls how edges are handled
    pub edge_mode: EdgeMode,
}

impl Default for ConvolveOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            edge_mode: EdgeMode::Extend,
        }
    }
}

/// Edge handling modes for convolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeMode {
    /// Uses a constant value for pixels outside image bounds
    Constant(f64),

    /// Reflects the image at the edges (`d c b a | a b c d | d c b a`)
    Reflect,

    /// Wraps around to the other side of the image
    Wrap,

    /// Extends the edge pixels outward
    #[default]
    Extend,
}

/// Correlate a 2D image with a kernel, keeping the input size.
///
/// The kernel is centred at `(rows / 2, cols / 2)` and is not flipped, so
/// symmetric kernels give the usual convolution result.
///
/// # Arguments
/// * `input` - Input image
/// * `kernel` - Kernel of any (non-empty) shape
/// * `options` - Parallelism and edge handling
///
/// # Returns
/// A new array with the same shape as `input`
pub fn convolve2d(
    input: &ArrayView2<f64>,
    kernel: &ArrayView2<f64>,
    options: ConvolveOptions,
) -> Array2<f64> {
    let (kernel_rows, kernel_cols) = kernel.dim();
    let kr = kernel_rows / 2;
    let kc = kernel_cols / 2;

    let mut output = Array2::zeros(input.dim());

    if input.is_empty() || kernel.is_empty() {
        return output;
    }

    let edge_mode = options.edge_mode;
    let apply = |(i, j): (usize, usize), out: &mut f64| {
        let mut sum = 0.0;
        for ki in 0..kernel_rows {
            for kj in 0..kernel_cols {
                let ii = i as isize + ki as isize - kr as isize;
                let jj = j as isize + kj as isize - kc as isize;
                sum += get_pixel(input, ii, jj, edge_mode) * kernel[[ki, kj]];
            }
        }
        *out = sum;
    };

    if options.parallel {
        Zip::indexed(&mut output).par_for_each(apply);
    } else {
        Zip::indexed(&mut output).for_each(apply);
    }

    output
}

// Pixel lookup with edge handling
fn get_pixel(input: &ArrayView2<f64>, i: isize, j: isize, edge_mode: EdgeMode) -> f64 {
    let (rows, cols) = input.dim();
    let (rows, cols) = (rows as isize, cols as isize);

    if i >= 0 && i < rows && j >= 0 && j < cols {
        return input[[i as usize, j as usize]];
    }

    let (ii, jj) = match edge_mode {
        EdgeMode::Constant(value) => return value,
        EdgeMode::Reflect => (reflect_index(i, rows), reflect_index(j, cols)),
        EdgeMode::Wrap => (i.rem_euclid(rows), j.rem_euclid(cols)),
        EdgeMode::Extend => (i.clamp(0, rows - 1), j.clamp(0, cols - 1)),
    };
    input[[ii as usize, jj as usize]]
}

// Half-sample symmetric reflection, valid for any distance outside the image
fn reflect_index(idx: isize, size: isize) -> isize {
    let period = 2 * size;
    let m = idx.rem_euclid(period);
    if m >= size {
        period - m - 1
    } else {
        m
    }
}

/// Create a normalized 1D Gaussian kernel of length `2 * radius + 1`.
pub fn gaussian_kernel_1d(radius: usize, sigma: f64) -> Array1<f64> {
    let mut kernel = Array1::from_shape_fn(2 * radius + 1, |i| {
        let x = i as f64 - radius as f64;
        (-(x * x) / (2.0 * sigma * sigma)).exp()
    });

    let sum = kernel.sum();
    if sum > 0.0 {
        kernel.mapv_inplace(|v| v / sum);
    }
    kernel
}

/// Create a Gaussian kernel with specified size and sigma
///
/// # Arguments
/// * `size` - Size of the kernel (must be odd)
/// * `sigma` - Standard deviation of the Gaussian
///
/// # Returns
/// * Gaussian kernel as a 2D array, normalized to sum 1
pub fn gaussian_kernel(size: usize, sigma: f64) -> Array2<f64> {
    assert!(size % 2 == 1, "Kernel size must be odd");

    let line = gaussian_kernel_1d(size / 2, sigma);
    Array2::from_shape_fn((size, size), |(i, j)| line[i] * line[j])
}

/// Isotropic Gaussian blur of standard deviation `sigma`.
///
/// Applied as two 1D passes (rows then columns) with a kernel truncated at
/// [`GAUSSIAN_TRUNCATE`] standard deviations. A `sigma` of zero returns an
/// unchanged copy of the input.
///
/// The kernel radius is capped at twice the larger image dimension. Taps past
/// that only sample the edge-mode extension, so very wide kernels are cut
/// there instead of being allocated in full.
pub fn gaussian_blur(
    input: &ArrayView2<f64>,
    sigma: f64,
    options: ConvolveOptions,
) -> Array2<f64> {
    if sigma <= 0.0 {
        return input.to_owned();
    }

    let (rows, cols) = input.dim();
    let max_radius = 2 * rows.max(cols);
    let radius = (GAUSSIAN_TRUNCATE * sigma).round().min(max_radius as f64) as usize;
    let line = gaussian_kernel_1d(radius, sigma);
    let width = line.len();

    let horizontal = Array2::from_shape_fn((1, width), |(_, j)| line[j]);
    let vertical = Array2::from_shape_fn((width, 1), |(i, _)| line[i]);

    let pass = convolve2d(input, &horizontal.view(), options);
    convolve2d(&pass.view(), &vertical.view(), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    fn ramp(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(i, j)| (i * cols + j) as f64 + 1.0)
    }

    #[test]
    fn test_convolution_identity() {
        let input = ramp(3, 3);
        let kernel = arr2(&[[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]]);

        let output = convolve2d(&input.view(), &kernel.view(), ConvolveOptions::default());

        assert_eq!(output, input);
    }

    #[test]
    fn test_edge_modes() {
        let input = ramp(3, 3);
        // Picks the right-hand neighbour of each pixel
        let kernel = arr2(&[[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 0.0]]);

        let run = |edge_mode| {
            convolve2d(
                &input.view(),
                &kernel.view(),
                ConvolveOptions {
                    parallel: false,
                    edge_mode,
                },
            )
        };

        let constant = run(EdgeMode::Constant(0.0));
        assert_eq!(constant[[0, 0]], 2.0);
        assert_eq!(constant[[0, 1]], 3.0);
        assert_eq!(constant[[0, 2]], 0.0);
        assert_eq!(constant[[1, 1]], 6.0);

        assert_eq!(run(EdgeMode::Wrap)[[0, 2]], 1.0);
        assert_eq!(run(EdgeMode::Extend)[[0, 2]], 3.0);
        assert_eq!(run(EdgeMode::Reflect)[[2, 2]], 9.0);
        assert_eq!(EdgeMode::default(), EdgeMode::Extend);
    }

    #[test]
    fn test_reflect_index_far_outside() {
        assert_eq!(reflect_index(-1, 3), 0);
        assert_eq!(reflect_index(-3, 3), 2);
        assert_eq!(reflect_index(3, 3), 2);
        assert_eq!(reflect_index(6, 3), 0);
        assert_eq!(reflect_index(-7, 3), 0);
    }

    #[test]
    fn test_parallel() {
        let input = ramp(5, 5);
        let kernel = gaussian_kernel(3, 1.0);

        let seq = convolve2d(
            &input.view(),
            &kernel.view(),
            ConvolveOptions {
                parallel: false,
                edge_mode: EdgeMode::Constant(0.0),
            },
        );
        let par = convolve2d(
            &input.view(),
            &kernel.view(),
            ConvolveOptions {
                parallel: true,
                edge_mode: EdgeMode::Constant(0.0),
            },
        );

        for (a, b) in seq.iter().zip(par.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_gaussian_kernel() {
        let kernel = gaussian_kernel(5, 1.0);
        let sum: f64 = kernel.iter().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-10);

        // Centre is the peak
        let peak = kernel[[2, 2]];
        assert!(kernel.iter().all(|&v| v <= peak));
    }

    #[test]
    fn test_gaussian_kernel_1d_symmetric() {
        let kernel = gaussian_kernel_1d(4, 1.5);
        assert_eq!(kernel.len(), 9);
        assert_relative_eq!(kernel.sum(), 1.0, epsilon = 1e-12);
        for i in 0..4 {
            assert_relative_eq!(kernel[i], kernel[8 - i], epsilon = 1e-15);
        }
    }

    #[test]
    fn test_gaussian_blur_zero_sigma_is_identity() {
        let input = ramp(4, 6);
        let output = gaussian_blur(&input.view(), 0.0, ConvolveOptions::default());
        assert_eq!(output, input);
    }

    #[test]
    fn test_gaussian_blur_preserves_flat_field() {
        let input = Array2::from_elem((8, 8), 3.0);
        for edge_mode in [EdgeMode::Extend, EdgeMode::Reflect, EdgeMode::Wrap] {
            let output = gaussian_blur(
                &input.view(),
                1.3,
                ConvolveOptions {
                    parallel: false,
                    edge_mode,
                },
            );
            for &v in output.iter() {
                assert_relative_eq!(v, 3.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_gaussian_blur_huge_sigma_is_bounded() {
        let input = ramp(4, 4);
        let flat = Array2::from_elem((4, 4), 2.5);

        for sigma in [1e10, 1e300] {
            let output = gaussian_blur(&input.view(), sigma, ConvolveOptions::default());
            assert_eq!(output.dim(), (4, 4));
            // Each output is a weighted average of input values
            assert!(output.iter().all(|&v| (1.0..=16.0).contains(&v)));

            let flat_out = gaussian_blur(&flat.view(), sigma, ConvolveOptions::default());
            for &v in flat_out.iter() {
                assert_relative_eq!(v, 2.5, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_gaussian_blur_matches_2d_kernel() {
        let mut input = Array2::zeros((9, 9));
        input[[4, 4]] = 1.0;
        input[[1, 7]] = 2.0;

        let sigma = 1.0;
        let separable = gaussian_blur(&input.view(), sigma, ConvolveOptions::default());
        let kernel = gaussian_kernel(9, sigma);
        let direct = convolve2d(&input.view(), &kernel.view(), ConvolveOptions::default());

        for (a, b) in separable.iter().zip(direct.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_gaussian_blur_spreads_impulse() {
        let mut input = Array2::zeros((11, 11));
        input[[5, 5]] = 1.0;

        let output = gaussian_blur(&input.view(), 1.0, ConvolveOptions::default());

        assert!(output[[5, 5]] < 1.0);
        assert!(output[[5, 6]] > 0.0);
        assert_relative_eq!(output[[5, 4]], output[[5, 6]], epsilon = 1e-15);
        assert_relative_eq!(output.sum(), 1.0, epsilon = 1e-9);
    }
}
