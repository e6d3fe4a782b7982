//! Image processing stages of the STEM noise pipeline.
//!
//! # Module Organization
//!
//! - **convolve2d**: kernel correlation with edge modes and Gaussian blur
//! - **scanline**: per-row jitter and bilinear scatter resampling
//! - **noise**: random draw sources, Poisson dose and dark noise
//! - **io**: 16-bit grayscale file exchange for the command-line tool

pub mod convolve2d;
pub mod io;
pub mod noise;
pub mod scanline;

pub use convolve2d::{
    convolve2d, gaussian_blur, gaussian_kernel, gaussian_kernel_1d, ConvolveOptions, EdgeMode,
};
pub use io::{load_grayscale, save_counts_u16, ImageIoError};
pub use noise::{NoiseSource, RngNoiseSource, ScriptedNoiseSource};
pub use scanline::{
    draw_scanline_offsets, jittered_sample_points, resample_scanlines, sample_point,
    wrap_coordinate, SamplePoint,
};
