//! Error taxonomy for sumlab.
//!
//! Each failure family has its own enum so that the crate raising it can stay
//! narrow. [`SumlabError`] aggregates all of them for callers that sit at an
//! asynchronous boundary and only need to know *what kind* of thing failed.

use std::fmt;

/// The coarse failure categories a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Bad bin count, range, shape parameter, or experiment request.
    Configuration,
    /// Malformed distribution expression or unknown template.
    Parse,
    /// Sampling from an invalid distribution or with a bad count.
    Sampling,
    /// A reduction was invoked on an empty dataset (or an empty split).
    EmptyInput,
    /// Bin or element access outside bounds.
    IndexOutOfRange,
    /// Another long-running operation already holds the run permit.
    ResourceBusy,
    /// File or encoding failures outside the numeric core.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Parse => "parse",
            ErrorKind::Sampling => "sampling",
            ErrorKind::EmptyInput => "empty_input",
            ErrorKind::IndexOutOfRange => "index_out_of_range",
            ErrorKind::ResourceBusy => "resource_busy",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

/// Failures while constructing a discretized distribution.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DistributionError {
    #[error("bin number must be > 1 (got {0})")]
    InvalidBinCount(i64),

    #[error("bin number {0} is too large to allocate")]
    TooManyBins(i64),

    #[error("upper bound must be > lower bound (got [{lower}, {upper}])")]
    InvalidRange { lower: f64, upper: f64 },

    #[error("{template}: parameter `{name}` out of domain (got {value})")]
    InvalidParameter {
        template: &'static str,
        name: &'static str,
        value: f64,
    },

    #[error("density is not finite in bin {bin}")]
    NonFiniteDensity { bin: usize },

    #[error("density has zero total mass over [{lower}, {upper}]")]
    ZeroMass { lower: f64, upper: f64 },

    #[error("cumulative mass disagrees with the densities at bin {bin}")]
    InconsistentCdf { bin: usize },

    #[error("pdf and cdf lengths disagree with bin number {bins} (pdf {pdf}, cdf {cdf})")]
    LengthMismatch { bins: usize, pdf: usize, cdf: usize },
}

/// Failures while compiling a distribution specification string.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("empty distribution specification")]
    Empty,

    #[error("unexpected character {ch:?} at offset {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unexpected token `{found}` at offset {pos}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        pos: usize,
    },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("invalid number literal `{literal}` at offset {pos}")]
    InvalidNumber { literal: String, pos: usize },

    #[error("unknown distribution template `{name}`")]
    UnknownTemplate { name: String },

    #[error("unknown function `{name}`")]
    UnknownFunction { name: String },

    #[error("unknown identifier `{name}`")]
    UnknownIdentifier { name: String },

    #[error("`{name}` takes {expected} argument(s), got {found}")]
    WrongArity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("argument {index} of `{name}` must not depend on x")]
    NonConstantArgument { name: String, index: usize },

    #[error("trailing input at offset {pos}")]
    TrailingInput { pos: usize },

    #[error("expression nested too deeply at offset {pos}")]
    TooDeep { pos: usize },

    #[error("expression has more than {limit} operators or calls (offset {pos})")]
    TooComplex { limit: usize, pos: usize },
}

/// Failures while drawing datasets from a distribution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SamplingError {
    #[error("cannot sample from an invalid distribution")]
    InvalidDistribution,

    #[error("sample count must be > 0 (got {0})")]
    InvalidCount(i64),

    #[error("matrix dimension must be > 0 (got {0})")]
    InvalidDimension(i64),
}

/// Failures raised by the reduction algorithms.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReductionError {
    #[error("{algorithm}: input is empty")]
    EmptyInput { algorithm: &'static str },

    #[error("split merge: l ({l}) must not exceed r ({r})")]
    InvalidSplit { l: usize, r: usize },

    #[error("operation {operation} is not defined for {operand}")]
    UnsupportedOperation {
        operation: &'static str,
        operand: &'static str,
    },

    #[error("matrix dimensions disagree ({left} vs {right})")]
    DimensionMismatch { left: usize, right: usize },

    #[error("element {index} is not finite and has no exact decimal value")]
    NonFiniteInput { index: usize },

    #[error(transparent)]
    IndexOutOfRange(#[from] IndexOutOfRange),
}

/// Out-of-bounds access on a bin or dataset element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("index {index} out of range for length {len}")]
pub struct IndexOutOfRange {
    pub index: usize,
    pub len: usize,
}

/// A second long-running operation was attempted while one is in flight.
///
/// This is an expected, recoverable condition: retry once the active job finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("another operation is in progress, retry later")]
pub struct ResourceBusy;

/// Invalid experiment requests and dataset shapes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("trial count must be > 0")]
    ZeroTrials,

    #[error("at least one algorithm must be selected")]
    NoAlgorithms,

    #[error("regenerate mode needs the distribution the dataset was drawn from")]
    MissingDistribution,

    #[error("matrix {index} has {found} entries, expected {expected}")]
    RaggedMatrix {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("matrix size {size} is too large")]
    MatrixTooLarge { size: usize },

    #[error("trial count {trials} is too large for {algorithms} algorithm(s)")]
    TooManyTrials { trials: u32, algorithms: usize },

    #[error("unknown {what} `{value}`")]
    UnknownName { what: &'static str, value: String },
}

/// Aggregate error for callers that cross the worker boundary.
#[derive(Debug, thiserror::Error)]
pub enum SumlabError {
    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Sampling(#[from] SamplingError),

    #[error(transparent)]
    Reduction(#[from] ReductionError),

    #[error(transparent)]
    IndexOutOfRange(#[from] IndexOutOfRange),

    #[error(transparent)]
    ResourceBusy(#[from] ResourceBusy),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl SumlabError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SumlabError::Distribution(_) => ErrorKind::Configuration,
            SumlabError::Parse(_) => ErrorKind::Parse,
            SumlabError::Sampling(_) => ErrorKind::Sampling,
            SumlabError::Reduction(e) => match e {
                ReductionError::EmptyInput { .. } | ReductionError::InvalidSplit { .. } => {
                    ErrorKind::EmptyInput
                }
                ReductionError::IndexOutOfRange(_) => ErrorKind::IndexOutOfRange,
                ReductionError::UnsupportedOperation { .. }
                | ReductionError::DimensionMismatch { .. }
                | ReductionError::NonFiniteInput { .. } => ErrorKind::Configuration,
            },
            SumlabError::IndexOutOfRange(_) => ErrorKind::IndexOutOfRange,
            SumlabError::ResourceBusy(_) => ErrorKind::ResourceBusy,
            SumlabError::Request(_) => ErrorKind::Configuration,
            SumlabError::Json(_) | SumlabError::Toml(_) | SumlabError::Io(_) => ErrorKind::Io,
        }
    }

    /// True when the caller should simply try again later.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ResourceBusy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bin_count_error_is_configuration() {
        let err = SumlabError::from(DistributionError::InvalidBinCount(1));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "bin number must be > 1 (got 1)");
    }

    #[test]
    fn unknown_template_is_parse() {
        let err = SumlabError::from(ParseError::UnknownTemplate {
            name: "Q".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("`Q`"));
    }

    #[test]
    fn empty_input_is_its_own_kind() {
        let err = SumlabError::from(ReductionError::EmptyInput {
            algorithm: "linear",
        });
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
        assert!(!err.is_retryable());
    }

    #[test]
    fn busy_is_retryable_not_fatal() {
        let err = SumlabError::from(ResourceBusy);
        assert_eq!(err.kind(), ErrorKind::ResourceBusy);
        assert!(err.is_retryable());
    }

    #[test]
    fn nested_index_error_keeps_its_kind() {
        let err = SumlabError::from(ReductionError::from(IndexOutOfRange { index: 9, len: 4 }));
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
        assert_eq!(err.to_string(), "index 9 out of range for length 4");
    }

    proptest! {
        #[test]
        fn index_message_names_offender(index in 0usize..10_000, len in 0usize..10_000) {
            let msg = IndexOutOfRange { index, len }.to_string();
            prop_assert!(msg.contains(&index.to_string()));
            prop_assert!(msg.contains(&len.to_string()));
        }
    }
}
