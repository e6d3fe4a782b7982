//! Realistic detector noise for STEM simulation images
//!
//! This crate degrades pristine (noise-free) scanning transmission electron
//! microscopy simulations so they resemble real acquisitions: intensity blur,
//! per-scanline horizontal jitter from scan-coil instability, and electron
//! shot noise from a finite dose.
//!
//! The entry points are [`NoiseSynthesizer`] and the one-shot
//! [`add_stem_noise`]; the individual stages live in [`image_proc`] and the
//! scatter-accumulation primitive in [`algo`].

pub mod algo;
pub mod image_proc;
pub mod synthesize;

// Re-exports for easier access
pub use algo::accumulate::{accumulate, accumulate_2d, accumulate_with, AccumulateError};
pub use image_proc::convolve2d::EdgeMode;
pub use image_proc::noise::{NoiseSource, RngNoiseSource, ScriptedNoiseSource};
pub use synthesize::{add_stem_noise, NoiseError, NoiseSynthesizer, StemNoiseParams};
