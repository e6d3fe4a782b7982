//! Grouped scatter-accumulation of values into an output grid.
//!
//! Given a list of contributions and a parallel list of destination indices,
//! every output cell holds the reduction (sum by default) of all contributions
//! that target it. Cells that receive nothing hold a fill value.
//!
//! Two entry points are provided:
//! - [`accumulate_2d`]: the specialized 2D scatter-sum used by the resampler
//! - [`accumulate`] / [`accumulate_with`]: N-dimensional variants where the
//!   destination of value `i` is row `i` of an index matrix

use ndarray::{Array2, ArrayD, ArrayView1, ArrayView2, IxDyn};
use thiserror::Error;

/// Errors raised while building an accumulation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccumulateError {
    /// Destination count does not match the value count.
    #[error("accumulation map has {destinations} destinations but {values} values were given")]
    ShapeMismatch { destinations: usize, values: usize },

    /// Destination index arity does not match the output dimensionality.
    #[error("destination indices have {index_dims} dimensions but output has {output_dims}")]
    DimensionMismatch {
        index_dims: usize,
        output_dims: usize,
    },

    /// A destination lies outside the requested output shape.
    #[error("destination index {index:?} is outside output shape {shape:?}")]
    IndexOutOfBounds {
        index: Vec<usize>,
        shape: Vec<usize>,
    },
}

/// Scatter-sum `values` into a `shape` grid at `destinations`.
///
/// `destinations[i]` is the `[row, col]` cell receiving `values[i]`. Cells
/// with no contributions are set to `fill_value`; cells with one or more hold
/// the plain sum (the fill value is not added).
///
/// # Errors
/// * [`AccumulateError::ShapeMismatch`] if the two slices differ in length
/// * [`AccumulateError::IndexOutOfBounds`] if a destination is outside `shape`
pub fn accumulate_2d(
    destinations: &[[usize; 2]],
    values: &[f64],
    shape: (usize, usize),
    fill_value: f64,
) -> Result<Array2<f64>, AccumulateError> {
    if destinations.len() != values.len() {
        return Err(AccumulateError::ShapeMismatch {
            destinations: destinations.len(),
            values: values.len(),
        });
    }

    let (rows, cols) = shape;
    let mut output = Array2::<f64>::zeros(shape);
    let mut touched = Array2::from_elem(shape, false);

    for (&[r, c], &value) in destinations.iter().zip(values) {
        if r >= rows || c >= cols {
            return Err(AccumulateError::IndexOutOfBounds {
                index: vec![r, c],
                shape: vec![rows, cols],
            });
        }
        output[[r, c]] += value;
        touched[[r, c]] = true;
    }

    if fill_value != 0.0 {
        output.zip_mut_with(&touched, |out, &hit| {
            if !hit {
                *out = fill_value;
            }
        });
    }

    Ok(output)
}

/// Sum `values` into an N-dimensional output.
///
/// Row `i` of `destinations` is the output index of `values[i]`, so the
/// matrix has one row per value and one column per output dimension. When
/// `output_shape` is `None` the shape is inferred as one more than the largest
/// index along each dimension.
///
/// Contributions are always a flat `f64` list. A multi-dimensional block of
/// contributions is passed flattened in row-major order (for example
/// `Array1::from_iter(block.iter().copied())`), with `destinations` holding
/// one row per element in that same order.
///
/// # Example
/// ```
/// use ndarray::{array, Array1};
/// use stem_noise::algo::accumulate::accumulate;
///
/// let destinations = array![[0usize], [0], [1]];
/// let values = Array1::from(vec![1.0, 2.0, 3.0]);
/// let out = accumulate(destinations.view(), values.view(), Some(&[2]), 0.0).unwrap();
/// assert_eq!(out.as_slice().unwrap(), &[3.0, 3.0]);
/// ```
pub fn accumulate(
    destinations: ArrayView2<usize>,
    values: ArrayView1<f64>,
    output_shape: Option<&[usize]>,
    fill_value: f64,
) -> Result<ArrayD<f64>, AccumulateError> {
    accumulate_with(destinations, values, output_shape, fill_value, |cell| {
        cell.iter().sum()
    })
}

/// Like [`accumulate`], but reduces each cell's contributions with `reduce`.
///
/// `reduce` receives the contributions for one cell in input order and is only
/// called for cells that received at least one value.
pub fn accumulate_with<F>(
    destinations: ArrayView2<usize>,
    values: ArrayView1<f64>,
    output_shape: Option<&[usize]>,
    fill_value: f64,
    reduce: F,
) -> Result<ArrayD<f64>, AccumulateError>
where
    F: Fn(&[f64]) -> f64,
{
    let (n_dest, index_dims) = destinations.dim();
    if n_dest != values.len() {
        return Err(AccumulateError::ShapeMismatch {
            destinations: n_dest,
            values: values.len(),
        });
    }

    let shape: Vec<usize> = match output_shape {
        Some(shape) => {
            if shape.len() != index_dims {
                return Err(AccumulateError::DimensionMismatch {
                    index_dims,
                    output_dims: shape.len(),
                });
            }
            shape.to_vec()
        }
        None => destinations
            .columns()
            .into_iter()
            .map(|col| col.iter().max().map_or(0, |&m| m + 1))
            .collect(),
    };

    // Contributions grouped per flat output cell, kept in input order
    let cells: usize = shape.iter().product();
    let mut groups: Vec<Vec<f64>> = vec![Vec::new(); cells];

    for (index, &value) in destinations.rows().into_iter().zip(values.iter()) {
        let mut flat = 0;
        for (&i, &extent) in index.iter().zip(&shape) {
            if i >= extent {
                return Err(AccumulateError::IndexOutOfBounds {
                    index: index.to_vec(),
                    shape: shape.clone(),
                });
            }
            flat = flat * extent + i;
        }
        groups[flat].push(value);
    }

    let data: Vec<f64> = groups
        .iter()
        .map(|group| {
            if group.is_empty() {
                fill_value
            } else {
                reduce(group)
            }
        })
        .collect();

    // Row-major flat layout matches the standard ndarray layout for IxDyn
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), data)
        .expect("flat cell count equals product of shape"))
}
