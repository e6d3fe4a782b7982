//! Array algorithms shared by the noise pipeline.

pub mod accumulate;

pub use accumulate::{accumulate, accumulate_2d, accumulate_with, AccumulateError};
