//! Conversions between wire contracts and in-memory values.

use sumlab_distribution::Distribution;
use sumlab_domain::Matrix;
use sumlab_error::{DistributionError, RequestError};
use sumlab_types::{DISTRIBUTION_SCHEMA_V1, Dataset, DistributionReceipt, ToolInfo};

pub fn array_dataset(values: Vec<f64>) -> Dataset {
    Dataset::Array { values }
}

/// Flatten matrices into a dataset; `size` is taken from the first matrix.
pub fn matrix_dataset(matrices: Vec<Matrix<f64>>, size: usize) -> Dataset {
    Dataset::Matrix {
        size,
        matrices: matrices.into_iter().map(Matrix::into_entries).collect(),
    }
}

/// Rebuild square matrices, rejecting any with the wrong entry count.
pub fn matrices_from_dataset(size: usize, matrices: Vec<Vec<f64>>) -> Result<Vec<Matrix<f64>>, RequestError> {
    let expected = size
        .checked_mul(size)
        .ok_or(RequestError::MatrixTooLarge { size })?;
    matrices
        .into_iter()
        .enumerate()
        .map(|(index, entries)| {
            let found = entries.len();
            Matrix::new(size, entries).map_err(|_| RequestError::RaggedMatrix {
                index,
                expected,
                found,
            })
        })
        .collect()
}

pub fn distribution_receipt(tool: ToolInfo, spec: &str, distribution: &Distribution) -> DistributionReceipt {
    DistributionReceipt {
        schema: DISTRIBUTION_SCHEMA_V1.to_string(),
        tool,
        spec: spec.to_string(),
        bins: distribution.bins(),
        lower: distribution.lower(),
        upper: distribution.upper(),
        pdf: distribution.pdf().to_vec(),
        cdf: distribution.cdf().to_vec(),
        clamped_bins: distribution.clamped_bins().to_vec(),
    }
}

/// Restore a distribution from its receipt, re-checking every invariant.
pub fn distribution_from_receipt(receipt: &DistributionReceipt) -> Result<Distribution, DistributionError> {
    if receipt.pdf.len() != receipt.bins || receipt.cdf.len() != receipt.bins {
        return Err(DistributionError::LengthMismatch {
            bins: receipt.bins,
            pdf: receipt.pdf.len(),
            cdf: receipt.cdf.len(),
        });
    }
    Distribution::from_parts(
        receipt.lower,
        receipt.upper,
        receipt.pdf.clone(),
        receipt.cdf.clone(),
        receipt.clamped_bins.clone(),
    )
}
