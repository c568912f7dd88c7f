//! Sumlab workspace-level test utilities.
//!
//! This crate exists solely to support workspace-level integration tests,
//! particularly the BDD/cucumber tests in `tests/cucumber.rs`.
//!
//! The actual sumlab functionality is in the workspace member crates:
//! - `sumlab-error`: Error taxonomy
//! - `sumlab-types`: Shared types and JSON schemas
//! - `sumlab-precision`: Exact decimal arithmetic for the ground truth
//! - `sumlab-distribution`: Distributions, the expression parser and samplers
//! - `sumlab-domain`: Reductions and error scoring
//! - `sumlab-app`: Experiment harness, run coordinator, and use cases
//! - `sumlab` (sumlab-cli): CLI interface
