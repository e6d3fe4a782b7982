//! Detector noise generation for normalized STEM intensity images.
//!
//! Provides the dose-dependent stages of the synthesis pipeline:
//! - **Poisson dose**: shot noise from a finite number of detected electrons
//! - **Dark noise**: additive Gaussian read noise, independent of dose
//!
//! Both operate on intensity images normalized to mean 1, where one unit of
//! intensity corresponds to `counts_per_pixel` electrons.

use ndarray::{Array2, ArrayView2};

use super::source::NoiseSource;

/// Apply electron shot noise to an intensity image.
///
/// Each pixel is clamped to non-negative, scaled by `counts_per_pixel` to a
/// mean electron count, replaced by one Poisson draw with that mean, and
/// scaled back to intensity units. Draws are taken in row-major order.
///
/// # Arguments
/// * `intensity` - Mean intensity image (mean 1 for a normalized image)
/// * `counts_per_pixel` - Electrons per unit intensity (must be > 0)
/// * `source` - Random draw source
///
/// # Returns
/// An image of detected counts divided by `counts_per_pixel`
pub fn apply_poisson_dose<S: NoiseSource + ?Sized>(
    intensity: &ArrayView2<f64>,
    counts_per_pixel: f64,
    source: &mut S,
) -> Array2<f64> {
    Array2::from_shape_fn(intensity.dim(), |(row, col)| {
        let mean_counts = intensity[[row, col]].max(0.0) * counts_per_pixel;
        source.poisson(mean_counts) / counts_per_pixel
    })
}

/// Add zero-mean Gaussian dark noise of standard deviation `sigma`.
///
/// A `sigma` of zero leaves the image untouched and consumes no draws.
pub fn apply_dark_noise<S: NoiseSource + ?Sized>(
    image: &mut Array2<f64>,
    sigma: f64,
    source: &mut S,
) {
    if sigma <= 0.0 {
        return;
    }
    for pixel in image.iter_mut() {
        *pixel += source.dark_noise(sigma);
    }
}

/// Count pixels below zero and clamp them to zero.
///
/// Physical intensities cannot be negative; the return value is the number of
/// pixels that had to be clamped.
pub fn clamp_non_negative(image: &mut Array2<f64>) -> usize {
    let mut clamped = 0;
    image.map_inplace(|pixel| {
        if *pixel < 0.0 {
            *pixel = 0.0;
            clamped += 1;
        }
    });
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_proc::noise::source::{RngNoiseSource, ScriptedNoiseSource};
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_poisson_dose_uses_scripted_counts() {
        let image = array![[1.0, 2.0], [0.5, -1.0]];
        let mut source = ScriptedNoiseSource::new().with_counts(vec![9.0, 21.0, 4.0, 0.0]);

        let noisy = apply_poisson_dose(&image.view(), 10.0, &mut source);

        assert_eq!(noisy, array![[0.9, 2.1], [0.4, 0.0]]);
    }

    #[test]
    fn test_poisson_dose_clamps_negative_mean() {
        let image = array![[-2.0, 1.0]];
        // No script: the source returns the requested mean
        let mut source = ScriptedNoiseSource::new();

        let noisy = apply_poisson_dose(&image.view(), 100.0, &mut source);

        assert_eq!(noisy, array![[0.0, 1.0]]);
    }

    #[test]
    fn test_poisson_dose_statistics() {
        let image = Array2::from_elem((100, 100), 1.0);
        let mut source = RngNoiseSource::new(StdRng::seed_from_u64(11));
        let counts_per_pixel = 25.0;

        let noisy = apply_poisson_dose(&image.view(), counts_per_pixel, &mut source);

        let mean = noisy.mean().unwrap();
        let std = noisy.std(0.0);
        assert_relative_eq!(mean, 1.0, epsilon = 0.01);
        // Relative shot noise is 1 / sqrt(counts)
        assert_relative_eq!(std, 1.0 / counts_per_pixel.sqrt(), epsilon = 0.01);

        // Values are quantized to whole electrons
        for &v in noisy.iter() {
            let electrons = v * counts_per_pixel;
            assert_relative_eq!(electrons, electrons.round(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_dark_noise_zero_sigma_is_noop() {
        let mut image = array![[1.0, 2.0]];
        let mut source = ScriptedNoiseSource::new().with_dark_noise(vec![5.0, 5.0]);

        apply_dark_noise(&mut image, 0.0, &mut source);

        assert_eq!(image, array![[1.0, 2.0]]);
        // Script untouched
        assert_eq!(source.dark_noise(1.0), 5.0);
    }

    #[test]
    fn test_dark_noise_adds_draws_in_order() {
        let mut image = array![[1.0, 2.0], [3.0, 4.0]];
        let mut source = ScriptedNoiseSource::new().with_dark_noise(vec![0.5, -0.5, 0.25, -5.0]);

        apply_dark_noise(&mut image, 1.0, &mut source);

        assert_eq!(image, array![[1.5, 1.5], [3.25, -1.0]]);
    }

    #[test]
    fn test_clamp_non_negative_counts() {
        let mut image = array![[1.0, -0.1], [-3.0, 0.0]];

        let clamped = clamp_non_negative(&mut image);

        assert_eq!(clamped, 2);
        assert_eq!(image, array![[1.0, 0.0], [0.0, 0.0]]);
    }
}
