//! STEM detector noise synthesis.
//!
//! Turns a pristine simulated intensity image into one that looks like a real
//! scanning transmission electron microscope acquisition. The pipeline runs in
//! a single pass:
//!
//! 1. **Normalize**: scale to mean 1, add the detector background, rescale to
//!    mean 1 again so the background keeps its relative contribution
//! 2. **Blur**: isotropic Gaussian smoothing, rescaled to mean 1
//! 3. **Scanline jitter**: one horizontal offset per row, no vertical offset
//! 4. **Resample**: bilinear scatter of every pixel to its jittered position
//! 5. **Dose**: Poisson shot noise at `counts_per_pixel` electrons per unit
//!    intensity, plus optional Gaussian dark noise
//! 6. **Clamp**: negative intensities are set to zero
//!
//! Scanline instability is modelled as horizontal only; the vertical origin of
//! every line is exact.

use std::path::Path;

use log::{debug, warn};
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algo::accumulate::AccumulateError;
use crate::image_proc::convolve2d::{gaussian_blur, ConvolveOptions, EdgeMode};
use crate::image_proc::noise::{
    apply_dark_noise, apply_poisson_dose, clamp_non_negative, NoiseSource, RngNoiseSource,
};
use crate::image_proc::scanline::{draw_scanline_offsets, resample_scanlines};

/// Errors from noise synthesis.
#[derive(Error, Debug)]
pub enum NoiseError {
    /// An image or parameter outside its allowed domain.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Resampling produced inconsistent accumulation data. Indicates a bug.
    #[error("resampling failed: {0}")]
    Accumulate(#[from] AccumulateError),
}

/// Parameters of one noise synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StemNoiseParams {
    /// Gaussian blur standard deviation in pixels (>= 0)
    pub sigma_blur: f64,
    /// Mean detected electrons per pixel at unit intensity (> 0)
    pub counts_per_pixel: f64,
    /// Standard deviation of the per-row horizontal jitter in pixels (>= 0)
    pub scanline_horizontal: f64,
    /// Detector background added after the first normalization
    pub background_value: f64,
    /// Standard deviation of additive dark noise in intensity units (>= 0)
    #[serde(default)]
    pub dark_noise_sigma: f64,
    /// Edge handling for the blur
    #[serde(default)]
    pub blur_edge_mode: EdgeMode,
    /// Run the blur convolution on the rayon thread pool
    #[serde(default)]
    pub parallel_blur: bool,
}

impl StemNoiseParams {
    pub fn new(
        sigma_blur: f64,
        counts_per_pixel: f64,
        scanline_horizontal: f64,
        background_value: f64,
    ) -> Self {
        Self {
            sigma_blur,
            counts_per_pixel,
            scanline_horizontal,
            background_value,
            dark_noise_sigma: 0.0,
            blur_edge_mode: EdgeMode::default(),
            parallel_blur: false,
        }
    }

    pub fn with_dark_noise_sigma(mut self, sigma: f64) -> Self {
        self.dark_noise_sigma = sigma;
        self
    }

    pub fn with_blur_edge_mode(mut self, edge_mode: EdgeMode) -> Self {
        self.blur_edge_mode = edge_mode;
        self
    }

    pub fn with_parallel_blur(mut self, parallel: bool) -> Self {
        self.parallel_blur = parallel;
        self
    }

    /// Check every parameter against its domain.
    pub fn validate(&self) -> Result<(), NoiseError> {
        let checks = [
            ("sigma_blur", self.sigma_blur, self.sigma_blur >= 0.0),
            (
                "counts_per_pixel",
                self.counts_per_pixel,
                self.counts_per_pixel > 0.0,
            ),
            (
                "scanline_horizontal",
                self.scanline_horizontal,
                self.scanline_horizontal >= 0.0,
            ),
            ("background_value", self.background_value, true),
            (
                "dark_noise_sigma",
                self.dark_noise_sigma,
                self.dark_noise_sigma >= 0.0,
            ),
        ];

        for (name, value, in_domain) in checks {
            if !value.is_finite() {
                return Err(NoiseError::InvalidInput(format!(
                    "{name} must be finite, got {value}"
                )));
            }
            if !in_domain {
                return Err(NoiseError::InvalidInput(format!(
                    "{name} is out of range, got {value}"
                )));
            }
        }

        if let EdgeMode::Constant(value) = self.blur_edge_mode {
            if !value.is_finite() {
                return Err(NoiseError::InvalidInput(format!(
                    "blur edge constant must be finite, got {value}"
                )));
            }
        }

        Ok(())
    }

    /// Save as pretty-printed JSON
    pub fn save_to_file(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Load from JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, std::io::Error> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Scale `image` in place to mean 1.
///
/// `stage` names the pipeline step for error messages.
///
/// # Returns
/// The mean before scaling
pub fn normalize_mean(image: &mut Array2<f64>, stage: &str) -> Result<f64, NoiseError> {
    let mean = image
        .mean()
        .ok_or_else(|| NoiseError::InvalidInput(format!("{stage}: image is empty")))?;

    if !mean.is_finite() || mean == 0.0 {
        return Err(NoiseError::InvalidInput(format!(
            "{stage}: cannot normalize image with mean {mean}"
        )));
    }

    image.mapv_inplace(|v| v / mean);
    Ok(mean)
}

/// Applies STEM acquisition noise to pristine images.
#[derive(Debug, Clone)]
pub struct NoiseSynthesizer {
    params: StemNoiseParams,
}

impl NoiseSynthesizer {
    /// Create a synthesizer, validating `params`.
    pub fn new(params: StemNoiseParams) -> Result<Self, NoiseError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &StemNoiseParams {
        &self.params
    }

    /// Synthesize a noisy image using the calling thread's generator.
    pub fn synthesize<A>(&self, image: &ArrayView2<A>) -> Result<Array2<f64>, NoiseError>
    where
        A: Copy + Into<f64>,
    {
        let mut source = RngNoiseSource::new(rand::thread_rng());
        self.synthesize_with_source(image, &mut source)
    }

    /// Synthesize a noisy image from a seeded generator.
    pub fn synthesize_with_seed<A>(
        &self,
        image: &ArrayView2<A>,
        seed: u64,
    ) -> Result<Array2<f64>, NoiseError>
    where
        A: Copy + Into<f64>,
    {
        let mut source = RngNoiseSource::new(StdRng::seed_from_u64(seed));
        self.synthesize_with_source(image, &mut source)
    }

    /// Synthesize a noisy image drawing all randomness from `source`.
    ///
    /// Draws are taken in a fixed order: one scanline offset per row, then one
    /// Poisson count per pixel in row-major order, then (only when dark noise
    /// is enabled) one dark-noise value per pixel in row-major order.
    ///
    /// # Errors
    /// [`NoiseError::InvalidInput`] if the image is empty, holds non-finite
    /// values, normalizes to a zero or non-finite mean at any stage, or its
    /// brightest pixel times `counts_per_pixel` overflows `f64`.
    pub fn synthesize_with_source<A, S>(
        &self,
        image: &ArrayView2<A>,
        source: &mut S,
    ) -> Result<Array2<f64>, NoiseError>
    where
        A: Copy + Into<f64>,
        S: NoiseSource + ?Sized,
    {
        let params = &self.params;

        if image.is_empty() {
            return Err(NoiseError::InvalidInput("image is empty".to_string()));
        }

        let mut scaled: Array2<f64> = image.mapv(Into::into);
        if scaled.iter().any(|v| !v.is_finite()) {
            return Err(NoiseError::InvalidInput(
                "image contains non-finite values".to_string(),
            ));
        }

        let input_mean = normalize_mean(&mut scaled, "input")?;
        scaled += params.background_value;

        let negative = scaled.iter().filter(|&&v| v < 0.0).count();
        if negative > 0 {
            warn!(
                "{negative} pixels are negative after adding background {}",
                params.background_value
            );
        }
        normalize_mean(&mut scaled, "background")?;

        let blur_options = ConvolveOptions {
            parallel: params.parallel_blur,
            edge_mode: params.blur_edge_mode,
        };
        let mut blurred = gaussian_blur(&scaled.view(), params.sigma_blur, blur_options);
        normalize_mean(&mut blurred, "blur")?;

        let (rows, cols) = blurred.dim();
        let offsets = draw_scanline_offsets(rows, params.scanline_horizontal, source);
        let max_offset = offsets.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        debug!(
            "Synthesizing {rows}x{cols} image: input mean {input_mean:.4}, \
             largest scanline offset {max_offset:.3} px"
        );

        let resampled = resample_scanlines(&blurred.view(), &offsets.view())?;

        let peak = resampled.fold(0.0_f64, |acc, &v| acc.max(v));
        if !(peak * params.counts_per_pixel).is_finite() {
            return Err(NoiseError::InvalidInput(format!(
                "counts_per_pixel {} overflows the dose of the brightest pixel ({peak:.4})",
                params.counts_per_pixel
            )));
        }

        let mut noisy = apply_poisson_dose(&resampled.view(), params.counts_per_pixel, source);
        apply_dark_noise(&mut noisy, params.dark_noise_sigma, source);

        let clamped = clamp_non_negative(&mut noisy);
        if clamped > 0 {
            debug!("Clamped {clamped} negative pixels after dark noise");
        }

        Ok(noisy)
    }
}

/// Add STEM acquisition noise to `image` in one call.
///
/// Equivalent to building a [`NoiseSynthesizer`] from
/// [`StemNoiseParams::new`] and calling [`NoiseSynthesizer::synthesize`].
///
/// # Example
/// ```
/// use ndarray::Array2;
/// use stem_noise::add_stem_noise;
///
/// let pristine = Array2::from_shape_fn((32, 32), |(r, c)| 1.0 + ((r + c) % 4) as f64);
/// let noisy = add_stem_noise(&pristine.view(), 1.0, 500.0, 0.5, 0.1).unwrap();
/// assert_eq!(noisy.dim(), pristine.dim());
/// assert!(noisy.iter().all(|&v| v >= 0.0));
/// ```
pub fn add_stem_noise<A>(
    image: &ArrayView2<A>,
    sigma_blur: f64,
    counts_per_pixel: f64,
    scanline_horizontal: f64,
    background_value: f64,
) -> Result<Array2<f64>, NoiseError>
where
    A: Copy + Into<f64>,
{
    let params = StemNoiseParams::new(
        sigma_blur,
        counts_per_pixel,
        scanline_horizontal,
        background_value,
    );
    NoiseSynthesizer::new(params)?.synthesize(image)
}
