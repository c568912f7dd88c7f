//! Domain logic for sumlab.
//!
//! This crate is intentionally I/O-free: it does reductions and scoring.
//! Every function here is a pure function of its inputs, so the harness may
//! run them on any thread and in any order across disjoint trials.

mod matrix;
mod operand;
mod progress;
mod reduce;
mod score;

pub use matrix::{Matrix, Scalar};
pub use operand::{Operand, Widen};
pub use progress::{NoProgress, ProgressSink, percent_of};
pub use reduce::{
    ground_truth, ground_truth_value, linear, reduce, sort_then_linear, sort_then_merge,
    split_merge, split_merge_range,
};
pub use score::{absolute_error, relative_error, summarize_errors};
