//! Discretized probability densities for sumlab.
//!
//! A [`Distribution`] is built once, either from an analytic template
//! (`U`, `N`, `E`, `G`) or by compiling a specification string with
//! [`parse`], and is immutable afterwards. Densities are sampled at bin edges
//! with the trapezoid rule; the cumulative array is the running prefix sum and
//! is left unnormalized.
//!
//! [`ArrayGenerator`] and [`MatrixGenerator`] draw datasets from a valid
//! distribution by inverse-CDF lookup with uniform interpolation inside the
//! selected bin.

mod distribution;
mod parser;
mod sampler;
mod template;

pub use distribution::{Distribution, valid_params};
pub use parser::{Parser, parse};
pub use sampler::{ArrayGenerator, MatrixGenerator};
pub use template::Template;
