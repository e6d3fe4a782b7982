//! Random draw sources for the noise pipeline.
//!
//! Every random quantity in a synthesis run goes through [`NoiseSource`], so
//! the same pipeline can run on a live generator, a seeded generator, or a
//! replay of pre-generated draws.

use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson};

/// Largest mean drawn from an exact Poisson distribution.
///
/// Above this the rejection sampler loses precision, so counts come from the
/// Normal(mean, sqrt(mean)) limit instead, rounded to whole electrons.
pub const EXACT_POISSON_MAX_MEAN: f64 = 1e12;

/// Supplier of the three kinds of random draws the pipeline consumes.
pub trait NoiseSource {
    /// Horizontal offset for one scanline, drawn from Normal(0, `sigma`).
    fn scanline_offset(&mut self, sigma: f64) -> f64;

    /// Detected count for one pixel, drawn from Poisson(`mean`).
    ///
    /// A non-positive mean yields zero counts. An infinite mean yields an
    /// infinite count without drawing.
    fn poisson(&mut self, mean: f64) -> f64;

    /// Additive dark (read) noise for one pixel, drawn from Normal(0, `sigma`).
    fn dark_noise(&mut self, sigma: f64) -> f64;
}

/// [`NoiseSource`] backed by any `rand` generator.
#[derive(Debug, Clone)]
pub struct RngNoiseSource<R> {
    rng: R,
}

impl<R: Rng> RngNoiseSource<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    fn normal(&mut self, sigma: f64) -> f64 {
        if sigma <= 0.0 {
            return 0.0;
        }
        Normal::new(0.0, sigma)
            .expect("Normal parameters must be valid (sigma > 0 and finite)")
            .sample(&mut self.rng)
    }
}

impl<R: Rng> NoiseSource for RngNoiseSource<R> {
    fn scanline_offset(&mut self, sigma: f64) -> f64 {
        self.normal(sigma)
    }

    fn poisson(&mut self, mean: f64) -> f64 {
        if mean.is_nan() || mean <= 0.0 {
            return 0.0;
        }
        if mean.is_infinite() {
            return mean;
        }
        if mean > EXACT_POISSON_MAX_MEAN {
            let normal = Normal::new(mean, mean.sqrt())
                .expect("Normal parameters must be valid (finite mean and sigma)");
            return normal.sample(&mut self.rng).round().clamp(0.0, f64::MAX);
        }
        let poisson =
            Poisson::new(mean).expect("Poisson parameter must be valid (mean > 0 and finite)");
        poisson.sample(&mut self.rng)
    }

    fn dark_noise(&mut self, sigma: f64) -> f64 {
        self.normal(sigma)
    }
}

/// [`NoiseSource`] that replays pre-generated draws in order.
///
/// Once a script is exhausted it falls back to the noiseless value: zero
/// offsets, the Poisson mean itself, and zero dark noise. An empty script is
/// therefore a fully deterministic, noise-free source.
#[derive(Debug, Clone, Default)]
pub struct ScriptedNoiseSource {
    offsets: Vec<f64>,
    counts: Vec<f64>,
    dark: Vec<f64>,
    next_offset: usize,
    next_count: usize,
    next_dark: usize,
}

impl ScriptedNoiseSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scanline offsets to return, one per row, in row order.
    pub fn with_offsets(mut self, offsets: Vec<f64>) -> Self {
        self.offsets = offsets;
        self
    }

    /// Poisson counts to return, one per pixel, in row-major order.
    pub fn with_counts(mut self, counts: Vec<f64>) -> Self {
        self.counts = counts;
        self
    }

    /// Dark-noise draws to return, one per pixel, in row-major order.
    pub fn with_dark_noise(mut self, dark: Vec<f64>) -> Self {
        self.dark = dark;
        self
    }

    /// Restart every script from its first draw.
    pub fn rewind(&mut self) {
        self.next_offset = 0;
        self.next_count = 0;
        self.next_dark = 0;
    }
}

fn next_draw(script: &[f64], cursor: &mut usize) -> Option<f64> {
    let value = script.get(*cursor).copied();
    if value.is_some() {
        *cursor += 1;
    }
    value
}

impl NoiseSource for ScriptedNoiseSource {
    fn scanline_offset(&mut self, _sigma: f64) -> f64 {
        next_draw(&self.offsets, &mut self.next_offset).unwrap_or(0.0)
    }

    fn poisson(&mut self, mean: f64) -> f64 {
        next_draw(&self.counts, &mut self.next_count).unwrap_or(mean.max(0.0))
    }

    fn dark_noise(&mut self, _sigma: f64) -> f64 {
        next_draw(&self.dark, &mut self.next_dark).unwrap_or(0.0)
    }
}
