//! Noise processing for STEM detector simulation
//!
//! - **source**: random draw sources (live, seeded, or scripted)
//! - **generate**: dose-dependent shot noise and dark noise

pub mod generate;
pub mod source;

pub use generate::{apply_dark_noise, apply_poisson_dose, clamp_non_negative};
pub use source::{NoiseSource, RngNoiseSource, ScriptedNoiseSource};
