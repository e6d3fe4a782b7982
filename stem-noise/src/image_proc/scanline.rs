//! Scanline jitter resampling.
//!
//! A STEM image is acquired one horizontal scanline at a time. Instability in
//! the scan coils shifts each line sideways by a random amount while the line
//! still starts at the correct vertical position. This module models that
//! instability:
//!
//! 1. one horizontal offset is drawn per row ([`draw_scanline_offsets`])
//! 2. every source pixel is moved to its jittered continuous position and split
//!    across the four surrounding grid cells with bilinear weights
//!    ([`sample_point`])
//! 3. the weighted contributions are scatter-summed into the output grid
//!    ([`resample_scanlines`])
//!
//! Neighbour coordinates outside the image are clamped into a one-pixel halo
//! around it and then wrapped toroidally, so a contribution landing one pixel
//! past the right edge reappears in column 0 of the same row.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use super::noise::NoiseSource;
use crate::algo::accumulate::{accumulate_2d, AccumulateError};

/// A jittered source pixel and its bilinear footprint on the output grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    /// Continuous `(row, col)` position after jitter
    pub position: [f64; 2],
    /// Wrapped `[row, col]` of the four neighbours: floor, +row, +col, +row+col
    pub neighbors: [[usize; 2]; 4],
    /// Bilinear weight of each neighbour, summing to 1
    pub weights: [f64; 4],
}

/// Draw one horizontal offset per scanline from Normal(0, `sigma`).
///
/// Offsets are drawn in row order, row 0 first.
pub fn draw_scanline_offsets<S: NoiseSource + ?Sized>(
    rows: usize,
    sigma: f64,
    source: &mut S,
) -> Array1<f64> {
    Array1::from_shape_fn(rows, |_| source.scanline_offset(sigma))
}

/// Clamp a grid coordinate into the halo `[-1, dim]`, then wrap it into `[0, dim)`.
///
/// # Panics
/// Panics if `dim` is zero.
pub fn wrap_coordinate(coord: i64, dim: usize) -> usize {
    assert!(dim > 0, "Cannot wrap into an empty dimension");
    let dim = dim as i64;
    coord.clamp(-1, dim).rem_euclid(dim) as usize
}

/// Bilinear footprint of the source pixel `(row, col)` displaced by the given offsets.
///
/// # Arguments
/// * `row`, `col` - Source pixel
/// * `row_offset`, `col_offset` - Displacement in pixels
/// * `shape` - `(rows, cols)` of the output grid
pub fn sample_point(
    row: usize,
    col: usize,
    row_offset: f64,
    col_offset: f64,
    shape: (usize, usize),
) -> SamplePoint {
    let (rows, cols) = shape;
    let x = row as f64 + row_offset;
    let y = col as f64 + col_offset;

    let x_floor = x.floor();
    let y_floor = y.floor();
    let dx = x - x_floor;
    let dy = y - y_floor;

    // Pin to the halo before converting so large offsets cannot overflow
    let xf = x_floor.clamp(-1.0, rows as f64) as i64;
    let yf = y_floor.clamp(-1.0, cols as f64) as i64;
    let wrap = |r: i64, c: i64| [wrap_coordinate(r, rows), wrap_coordinate(c, cols)];

    SamplePoint {
        position: [x, y],
        neighbors: [
            wrap(xf, yf),
            wrap(xf + 1, yf),
            wrap(xf, yf + 1),
            wrap(xf + 1, yf + 1),
        ],
        weights: [
            (1.0 - dx) * (1.0 - dy),
            dx * (1.0 - dy),
            (1.0 - dx) * dy,
            dx * dy,
        ],
    }
}

/// Footprints of every pixel of a `shape` image under per-row horizontal offsets.
///
/// Rows are not displaced vertically. Points are returned in row-major order
/// of their source pixel.
///
/// # Panics
/// Panics if `offsets` does not hold exactly one entry per row.
pub fn jittered_sample_points(
    shape: (usize, usize),
    offsets: &ArrayView1<f64>,
) -> Vec<SamplePoint> {
    let (rows, cols) = shape;
    assert_eq!(offsets.len(), rows, "Expected one scanline offset per row");

    let mut points = Vec::with_capacity(rows * cols);
    for (row, &offset) in offsets.iter().enumerate() {
        for col in 0..cols {
            points.push(sample_point(row, col, 0.0, offset, shape));
        }
    }
    points
}

/// Resample `image` with per-row horizontal offsets.
///
/// Each source pixel's value is split over its four bilinear neighbours at the
/// jittered position and all contributions landing on the same output pixel
/// are summed. Total intensity is preserved. With all offsets zero the result
/// equals the input.
///
/// # Panics
/// Panics if `offsets` does not hold exactly one entry per row.
pub fn resample_scanlines(
    image: &ArrayView2<f64>,
    offsets: &ArrayView1<f64>,
) -> Result<Array2<f64>, AccumulateError> {
    let shape = image.dim();
    let points = jittered_sample_points(shape, offsets);

    let mut destinations = Vec::with_capacity(points.len() * 4);
    let mut values = Vec::with_capacity(points.len() * 4);

    for (point, &value) in points.iter().zip(image.iter()) {
        for (neighbor, weight) in point.neighbors.iter().zip(point.weights) {
            destinations.push(*neighbor);
            values.push(weight * value);
        }
    }

    accumulate_2d(&destinations, &values, shape, 0.0)
}
