//! Grayscale image file I/O for the command-line wrapper.
//!
//! Images are exchanged as 16-bit grayscale so that detected electron counts
//! survive a round trip without quantization to 8 bits. Any format the `image`
//! crate can decode is accepted on input; the output format follows the file
//! extension (PNG and TIFF both store 16-bit luma).
//!
//! Handles the coordinate system conversion between ndarray (`[row, col]`)
//! and the image crate (`(x, y)`).

use std::path::Path;

use image::{ImageBuffer, Luma};
use ndarray::{Array2, ArrayView2};
use thiserror::Error;

/// Errors from reading or writing image files.
#[derive(Error, Debug)]
pub enum ImageIoError {
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("image has no pixels")]
    Empty,

    #[error("invalid output scale {0}, must be positive and finite")]
    InvalidScale(f64),
}

/// Load an image file as a 2D array of 16-bit luma values.
///
/// Colour images are converted to luma. The returned array has shape
/// `(height, width)`.
pub fn load_grayscale<P: AsRef<Path>>(path: P) -> Result<Array2<f64>, ImageIoError> {
    let luma = image::open(path)?.into_luma16();
    let (width, height) = luma.dimensions();

    if width == 0 || height == 0 {
        return Err(ImageIoError::Empty);
    }

    Ok(Array2::from_shape_fn(
        (height as usize, width as usize),
        |(y, x)| luma.get_pixel(x as u32, y as u32)[0] as f64,
    ))
}

/// Quantize `image × scale` to 16-bit values.
///
/// Values are rounded to the nearest integer and clipped into
/// `[0, u16::MAX]`. Returns the quantized array and the number of pixels that
/// saturated at the top of the range.
pub fn quantize_u16(image: &ArrayView2<f64>, scale: f64) -> (Array2<u16>, usize) {
    let mut saturated = 0;
    let quantized = image.mapv(|v| {
        let scaled = (v * scale).round();
        if scaled >= u16::MAX as f64 {
            saturated += 1;
            u16::MAX
        } else if scaled > 0.0 {
            scaled as u16
        } else {
            0
        }
    });
    (quantized, saturated)
}

/// Save `image × scale` as a 16-bit grayscale file.
///
/// # Returns
/// The number of pixels that saturated at `u16::MAX`
pub fn save_counts_u16<P: AsRef<Path>>(
    image: &ArrayView2<f64>,
    scale: f64,
    path: P,
) -> Result<usize, ImageIoError> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(ImageIoError::InvalidScale(scale));
    }
    if image.is_empty() {
        return Err(ImageIoError::Empty);
    }

    let (quantized, saturated) = quantize_u16(image, scale);
    let (height, width) = quantized.dim();

    let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
            Luma([quantized[[y as usize, x as usize]]])
        });
    buffer.save(path)?;

    Ok(saturated)
}
