//! Shared types for sumlab.
//!
//! Design goal: versioned, explicit, boring.
//! These structs are what collaborators (writers, plotting, the CLI) consume;
//! nothing here knows how the numbers were produced.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use sumlab_error::RequestError;

pub mod float_repr;

pub const DISTRIBUTION_SCHEMA_V1: &str = "sumlab.distribution.v1";
pub const DATASET_SCHEMA_V1: &str = "sumlab.dataset.v1";
pub const EXPERIMENT_SCHEMA_V1: &str = "sumlab.experiment.v1";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RunMeta {
    pub id: String,
    pub started_at: String,
    pub ended_at: String,
}

/// Binary operation folded over the dataset.
#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Scalar addition, entry-wise for matrices.
    Add,
    /// Scalar multiplication, entry-wise (Hadamard) for matrices.
    Multiply,
    /// Matrix product. Only defined for matrix datasets.
    #[serde(rename = "matmul")]
    MatMul,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Multiply => "multiply",
            Operation::MatMul => "matmul",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "add" | "sum" => Ok(Operation::Add),
            "multiply" | "mul" | "multiplication" => Ok(Operation::Multiply),
            "matmul" => Ok(Operation::MatMul),
            _ => Err(RequestError::UnknownName {
                what: "operation",
                value: s.to_string(),
            }),
        }
    }
}

/// The four reduction strategies under test.
#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Linear,
    SplitMerge,
    SortLinear,
    SortMerge,
}

impl Algorithm {
    /// Canonical execution order within a trial.
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Linear,
        Algorithm::SplitMerge,
        Algorithm::SortLinear,
        Algorithm::SortMerge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Linear => "linear",
            Algorithm::SplitMerge => "split_merge",
            Algorithm::SortLinear => "sort_linear",
            Algorithm::SortMerge => "sort_merge",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "linear" => Ok(Algorithm::Linear),
            "split_merge" => Ok(Algorithm::SplitMerge),
            "sort_linear" | "sort" => Ok(Algorithm::SortLinear),
            "sort_merge" | "sort_append" => Ok(Algorithm::SortMerge),
            _ => Err(RequestError::UnknownName {
                what: "algorithm",
                value: s.to_string(),
            }),
        }
    }
}

/// Normalize an algorithm selection: deduplicated, canonical order.
pub fn normalize_selection(selected: &[Algorithm]) -> Vec<Algorithm> {
    Algorithm::ALL
        .into_iter()
        .filter(|a| selected.contains(a))
        .collect()
}

/// What a [`ResultRecord`] was produced by.
#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum ResultTag {
    GroundTruth,
    Linear,
    SplitMerge,
    SortLinear,
    SortMerge,
}

impl ResultTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultTag::GroundTruth => "ground_truth",
            ResultTag::Linear => "linear",
            ResultTag::SplitMerge => "split_merge",
            ResultTag::SortLinear => "sort_linear",
            ResultTag::SortMerge => "sort_merge",
        }
    }

    pub fn algorithm(self) -> Option<Algorithm> {
        match self {
            ResultTag::GroundTruth => None,
            ResultTag::Linear => Some(Algorithm::Linear),
            ResultTag::SplitMerge => Some(Algorithm::SplitMerge),
            ResultTag::SortLinear => Some(Algorithm::SortLinear),
            ResultTag::SortMerge => Some(Algorithm::SortMerge),
        }
    }
}

impl From<Algorithm> for ResultTag {
    fn from(a: Algorithm) -> Self {
        match a {
            Algorithm::Linear => ResultTag::Linear,
            Algorithm::SplitMerge => ResultTag::SplitMerge,
            Algorithm::SortLinear => ResultTag::SortLinear,
            Algorithm::SortMerge => ResultTag::SortMerge,
        }
    }
}

/// How the dataset changes between trials.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[serde(rename_all = "snake_case")]
pub enum ExperimentMode {
    /// Permute the same dataset in place. The ground truth stays valid.
    #[default]
    Shuffle,
    /// Draw a fresh dataset of the same size from the same distribution.
    Regenerate,
}

impl ExperimentMode {
    pub fn from_regenerate_flag(regenerate_each_trial: bool) -> Self {
        if regenerate_each_trial {
            ExperimentMode::Regenerate
        } else {
            ExperimentMode::Shuffle
        }
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    #[default]
    Array,
    Matrix,
}

/// One scored value: `(value, tag, is_ground_truth)`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ResultRecord {
    #[serde(
        serialize_with = "float_repr::serialize",
        deserialize_with = "float_repr::deserialize"
    )]
    #[schemars(with = "float_repr::FloatRepr")]
    pub value: f64,
    pub tag: ResultTag,
    pub ground_truth: bool,

    /// 1-based trial number; absent for the ground truth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial: Option<u32>,
}

impl ResultRecord {
    pub fn ground_truth(value: f64) -> Self {
        Self {
            value,
            tag: ResultTag::GroundTruth,
            ground_truth: true,
            trial: None,
        }
    }

    pub fn trial(value: f64, algorithm: Algorithm, trial: u32) -> Self {
        Self {
            value,
            tag: algorithm.into(),
            ground_truth: false,
            trial: Some(trial),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ExperimentSpec {
    pub operation: Operation,
    pub trials: u32,
    pub algorithms: Vec<Algorithm>,
    pub mode: ExperimentMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct DatasetSummary {
    pub kind: DataKind,
    pub count: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub matrix_size: Option<usize>,
}

/// Per-algorithm absolute error vs. the ground truth.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ErrorSummary {
    pub count: usize,
    #[serde(
        serialize_with = "float_repr::serialize",
        deserialize_with = "float_repr::deserialize"
    )]
    #[schemars(with = "float_repr::FloatRepr")]
    pub min: f64,
    #[serde(
        serialize_with = "float_repr::serialize",
        deserialize_with = "float_repr::deserialize"
    )]
    #[schemars(with = "float_repr::FloatRepr")]
    pub median: f64,
    #[serde(
        serialize_with = "float_repr::serialize",
        deserialize_with = "float_repr::deserialize"
    )]
    #[schemars(with = "float_repr::FloatRepr")]
    pub max: f64,
    #[serde(
        serialize_with = "float_repr::serialize",
        deserialize_with = "float_repr::deserialize"
    )]
    #[schemars(with = "float_repr::FloatRepr")]
    pub mean: f64,

    /// Median relative error; absent when the ground truth is zero.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "float_repr::serialize_option",
        deserialize_with = "float_repr::deserialize_option"
    )]
    #[schemars(with = "Option<float_repr::FloatRepr>")]
    pub median_relative: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ExperimentReport {
    pub schema: String,
    pub tool: ToolInfo,
    pub run: RunMeta,
    pub experiment: ExperimentSpec,
    pub dataset: DatasetSummary,

    /// False in regenerate mode: the ground truth was computed on the first dataset only.
    pub ground_truth_applies_to_all_trials: bool,

    /// Ground truth first, then one record per algorithm per trial, in execution order.
    pub records: Vec<ResultRecord>,

    pub errors: BTreeMap<Algorithm, ErrorSummary>,
}

impl ExperimentReport {
    pub fn ground_truth(&self) -> Option<f64> {
        self.records
            .iter()
            .find(|r| r.ground_truth)
            .map(|r| r.value)
    }
}

/// A discretized distribution as handed to collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct DistributionReceipt {
    pub schema: String,
    pub tool: ToolInfo,
    pub spec: String,
    pub bins: usize,
    pub lower: f64,
    pub upper: f64,
    pub pdf: Vec<f64>,
    pub cdf: Vec<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clamped_bins: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dataset {
    Array {
        values: Vec<f64>,
    },
    Matrix {
        size: usize,
        /// Row-major entries, `size * size` per matrix.
        matrices: Vec<Vec<f64>>,
    },
}

impl Dataset {
    pub fn kind(&self) -> DataKind {
        match self {
            Dataset::Array { .. } => DataKind::Array,
            Dataset::Matrix { .. } => DataKind::Matrix,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Dataset::Array { values } => values.len(),
            Dataset::Matrix { matrices, .. } => matrices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            kind: self.kind(),
            count: self.len(),
            matrix_size: match self {
                Dataset::Array { .. } => None,
                Dataset::Matrix { size, .. } => Some(*size),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct DatasetFile {
    pub schema: String,
    pub tool: ToolInfo,
    pub data: Dataset,
}

// ----------------------------
// Optional config file schema
// ----------------------------

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub distribution: DistributionConfig,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub experiment: ExperimentConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct DistributionConfig {
    /// e.g. `"U(0,10) + N(5,1)"` or `"exp(-x) * x"`.
    pub spec: String,

    #[serde(default = "default_bins")]
    pub bins: i64,

    #[serde(default)]
    pub lower: f64,

    #[serde(default = "default_upper")]
    pub upper: f64,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            spec: "U(0,1)".to_string(),
            bins: default_bins(),
            lower: 0.0,
            upper: default_upper(),
        }
    }
}

fn default_bins() -> i64 {
    1000
}

fn default_upper() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct DataConfig {
    #[serde(default)]
    pub kind: DataKind,

    #[serde(default = "default_count")]
    pub count: i64,

    /// Required when `kind = "matrix"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matrix_size: Option<i64>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            kind: DataKind::Array,
            count: default_count(),
            matrix_size: None,
        }
    }
}

fn default_count() -> i64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ExperimentConfig {
    #[serde(default = "default_operation")]
    pub operation: Operation,

    #[serde(default = "default_trials")]
    pub trials: u32,

    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<Algorithm>,

    #[serde(default)]
    pub mode: ExperimentMode,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            operation: default_operation(),
            trials: default_trials(),
            algorithms: default_algorithms(),
            mode: ExperimentMode::default(),
        }
    }
}

fn default_operation() -> Operation {
    Operation::Add
}

fn default_trials() -> u32 {
    10
}

fn default_algorithms() -> Vec<Algorithm> {
    Algorithm::ALL.to_vec()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_out_dir")]
    pub dir: String,

    #[serde(default)]
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_out_dir(),
            pretty: false,
        }
    }
}

fn default_out_dir() -> String {
    "artifacts/sumlab".to_string()
}
