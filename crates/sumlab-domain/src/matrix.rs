use std::fmt;
use sumlab_error::{IndexOutOfRange, ReductionError};
use sumlab_precision::HighPrecision;

/// Element type a [`Matrix`] can be built over.
pub trait Scalar: Clone + fmt::Debug {
    fn zero() -> Self;
    fn plus(&self, rhs: &Self) -> Self;
    fn times(&self, rhs: &Self) -> Self;
    fn to_f64(&self) -> f64;
}

impl Scalar for f64 {
    fn zero() -> Self {
        0.0
    }

    fn plus(&self, rhs: &Self) -> Self {
        self + rhs
    }

    fn times(&self, rhs: &Self) -> Self {
        self * rhs
    }

    fn to_f64(&self) -> f64 {
        *self
    }
}

impl Scalar for HighPrecision {
    fn zero() -> Self {
        HighPrecision::zero()
    }

    fn plus(&self, rhs: &Self) -> Self {
        self + rhs
    }

    fn times(&self, rhs: &Self) -> Self {
        self * rhs
    }

    fn to_f64(&self) -> f64 {
        HighPrecision::to_f64(self)
    }
}

/// Square matrix stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    size: usize,
    entries: Vec<T>,
}

impl<T: Scalar> Matrix<T> {
    /// Build a `size x size` matrix from row-major entries.
    pub fn new(size: usize, entries: Vec<T>) -> Result<Self, ReductionError> {
        // an overflowing square can never match a real entry count
        let expected = size.checked_mul(size).unwrap_or(usize::MAX);
        if entries.len() != expected {
            return Err(ReductionError::DimensionMismatch {
                left: expected,
                right: entries.len(),
            });
        }
        Ok(Self { size, entries })
    }

    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            entries: vec![T::zero(); size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<T> {
        self.entries
    }

    pub fn get(&self, row: usize, col: usize) -> Result<&T, IndexOutOfRange> {
        if row >= self.size || col >= self.size {
            return Err(IndexOutOfRange {
                index: row.max(col),
                len: self.size,
            });
        }
        Ok(&self.entries[row * self.size + col])
    }

    pub fn map<U: Scalar>(&self, f: impl Fn(&T) -> U) -> Matrix<U> {
        Matrix {
            size: self.size,
            entries: self.entries.iter().map(f).collect(),
        }
    }

    pub fn try_map<U: Scalar, E>(&self, f: impl Fn(&T) -> Result<U, E>) -> Result<Matrix<U>, E> {
        Ok(Matrix {
            size: self.size,
            entries: self.entries.iter().map(f).collect::<Result<_, _>>()?,
        })
    }

    fn check_same_size(&self, rhs: &Self) -> Result<(), ReductionError> {
        if self.size != rhs.size {
            return Err(ReductionError::DimensionMismatch {
                left: self.size,
                right: rhs.size,
            });
        }
        Ok(())
    }

    fn zip_with(&self, rhs: &Self, f: impl Fn(&T, &T) -> T) -> Result<Self, ReductionError> {
        self.check_same_size(rhs)?;
        Ok(Self {
            size: self.size,
            entries: self
                .entries
                .iter()
                .zip(&rhs.entries)
                .map(|(a, b)| f(a, b))
                .collect(),
        })
    }

    /// Entry-wise sum.
    pub fn add(&self, rhs: &Self) -> Result<Self, ReductionError> {
        self.zip_with(rhs, T::plus)
    }

    /// Entry-wise (Hadamard) product.
    pub fn hadamard(&self, rhs: &Self) -> Result<Self, ReductionError> {
        self.zip_with(rhs, T::times)
    }

    /// Matrix product `self * rhs`; each dot product is accumulated left to right.
    pub fn matmul(&self, rhs: &Self) -> Result<Self, ReductionError> {
        self.check_same_size(rhs)?;
        let n = self.size;
        let mut entries = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                let mut acc = T::zero();
                for k in 0..n {
                    acc = acc.plus(&self.entries[i * n + k].times(&rhs.entries[k * n + j]));
                }
                entries.push(acc);
            }
        }
        Ok(Self { size: n, entries })
    }

    pub fn entry_sum(&self) -> T {
        self.entries.iter().fold(T::zero(), |acc, x| acc.plus(x))
    }

    pub fn frobenius_norm(&self) -> f64 {
        self.entries
            .iter()
            .map(|x| {
                let v = x.to_f64();
                v * v
            })
            .sum::<f64>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(entries: &[f64]) -> Matrix<f64> {
        let size = (entries.len() as f64).sqrt() as usize;
        Matrix::new(size, entries.to_vec()).unwrap()
    }

    #[test]
    fn new_rejects_ragged_entries() {
        let err = Matrix::new(2, vec![1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err, ReductionError::DimensionMismatch { left: 4, right: 3 });

        let err = Matrix::new(usize::MAX, vec![1.0]).unwrap_err();
        assert_eq!(err, ReductionError::DimensionMismatch { left: usize::MAX, right: 1 });
    }

    #[test]
    fn matmul_is_row_by_column() {
        let a = m(&[1.0, 2.0, 3.0, 4.0]);
        let b = m(&[5.0, 6.0, 7.0, 8.0]);
        assert_eq!(a.matmul(&b).unwrap(), m(&[19.0, 22.0, 43.0, 50.0]));
        assert_eq!(b.matmul(&a).unwrap(), m(&[23.0, 34.0, 31.0, 46.0]));
    }

    #[test]
    fn entry_wise_ops() {
        let a = m(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(a.add(&a).unwrap(), m(&[2.0, 4.0, 6.0, 8.0]));
        assert_eq!(a.hadamard(&a).unwrap(), m(&[1.0, 4.0, 9.0, 16.0]));
        assert_eq!(a.entry_sum(), 10.0);
        assert_eq!(Matrix::<f64>::zeros(2).entry_sum(), 0.0);
    }

    #[test]
    fn size_mismatch_is_reported() {
        let a = m(&[1.0]);
        let b = m(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(
            a.matmul(&b).unwrap_err(),
            ReductionError::DimensionMismatch { left: 1, right: 2 }
        );
    }

    #[test]
    fn get_checks_bounds() {
        let a = m(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(*a.get(1, 0).unwrap(), 3.0);
        assert_eq!(a.get(0, 2).unwrap_err(), IndexOutOfRange { index: 2, len: 2 });
    }

    #[test]
    fn frobenius_norm_of_identity() {
        let id = m(&[1.0, 0.0, 0.0, 1.0]);
        assert_eq!(id.frobenius_norm(), 2f64.sqrt());
    }

    #[test]
    fn high_precision_entries() {
        let a = m(&[1e16, 1.0, -1e16, 1.0]);
        let wide = a.try_map(|&x| HighPrecision::from_f64(x)).unwrap();
        assert_eq!(wide.entry_sum().to_f64(), 2.0);
        assert_eq!(a.entry_sum(), 1.0);
    }
}
