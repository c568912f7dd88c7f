use crate::matrix::{Matrix, Scalar};
use sumlab_error::ReductionError;
use sumlab_precision::{HighPrecision, NonFiniteValue};
use sumlab_types::Operation;

/// A value the reduction strategies can fold.
pub trait Operand: Clone {
    /// Short name used in error messages.
    const KIND: &'static str;

    /// Fails for operations the operand does not define (`MatMul` on scalars).
    fn check_operation(op: Operation) -> Result<(), ReductionError>;

    fn combine(&self, rhs: &Self, op: Operation) -> Result<Self, ReductionError>;

    /// Ordering key used by the sorting strategies (`|x|`, or the Frobenius norm).
    fn magnitude(&self) -> f64;

    /// Tie-breaker between operands of equal magnitude.
    fn signed_key(&self) -> f64;

    /// The single number recorded in a result (the value, or a matrix's entry sum).
    fn report_value(&self) -> f64;
}

/// Operands with a high-precision counterpart for ground-truth accumulation.
pub trait Widen: Operand {
    type Wide: Operand;

    fn widen(&self) -> Result<Self::Wide, NonFiniteValue>;

    fn narrow(wide: &Self::Wide) -> Self;
}

macro_rules! scalar_operand {
    ($ty:ty, $kind:literal) => {
        impl Operand for $ty {
            const KIND: &'static str = $kind;

            fn check_operation(op: Operation) -> Result<(), ReductionError> {
                match op {
                    Operation::Add | Operation::Multiply => Ok(()),
                    Operation::MatMul => Err(ReductionError::UnsupportedOperation {
                        operation: op.as_str(),
                        operand: Self::KIND,
                    }),
                }
            }

            fn combine(&self, rhs: &Self, op: Operation) -> Result<Self, ReductionError> {
                match op {
                    Operation::Add => Ok(self.plus(rhs)),
                    Operation::Multiply => Ok(self.times(rhs)),
                    Operation::MatMul => Self::check_operation(op).map(|()| self.clone()),
                }
            }

            fn magnitude(&self) -> f64 {
                Scalar::to_f64(self).abs()
            }

            fn signed_key(&self) -> f64 {
                Scalar::to_f64(self)
            }

            fn report_value(&self) -> f64 {
                Scalar::to_f64(self)
            }
        }
    };
}

scalar_operand!(f64, "scalars");
scalar_operand!(HighPrecision, "high-precision scalars");

impl<T: Scalar> Operand for Matrix<T> {
    const KIND: &'static str = "matrices";

    fn check_operation(_op: Operation) -> Result<(), ReductionError> {
        Ok(())
    }

    fn combine(&self, rhs: &Self, op: Operation) -> Result<Self, ReductionError> {
        match op {
            Operation::Add => self.add(rhs),
            Operation::Multiply => self.hadamard(rhs),
            Operation::MatMul => self.matmul(rhs),
        }
    }

    fn magnitude(&self) -> f64 {
        self.frobenius_norm()
    }

    fn signed_key(&self) -> f64 {
        self.entry_sum().to_f64()
    }

    fn report_value(&self) -> f64 {
        self.entry_sum().to_f64()
    }
}

impl Widen for f64 {
    type Wide = HighPrecision;

    fn widen(&self) -> Result<HighPrecision, NonFiniteValue> {
        HighPrecision::from_f64(*self)
    }

    fn narrow(wide: &HighPrecision) -> Self {
        wide.to_f64()
    }
}

impl Widen for Matrix<f64> {
    type Wide = Matrix<HighPrecision>;

    fn widen(&self) -> Result<Matrix<HighPrecision>, NonFiniteValue> {
        self.try_map(|&x| HighPrecision::from_f64(x))
    }

    fn narrow(wide: &Matrix<HighPrecision>) -> Self {
        wide.map(HighPrecision::to_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_reject_matmul() {
        assert_eq!(
            f64::check_operation(Operation::MatMul).unwrap_err(),
            ReductionError::UnsupportedOperation {
                operation: "matmul",
                operand: "scalars",
            }
        );
        assert!(2.0f64.combine(&3.0, Operation::MatMul).is_err());
    }

    #[test]
    fn scalar_combine() {
        assert_eq!(2.0f64.combine(&3.0, Operation::Add).unwrap(), 5.0);
        assert_eq!(2.0f64.combine(&3.0, Operation::Multiply).unwrap(), 6.0);
    }

    #[test]
    fn matrix_multiply_is_hadamard() {
        let a = Matrix::new(2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let p = a.combine(&a, Operation::Multiply).unwrap();
        assert_eq!(p.entries(), &[1.0, 4.0, 9.0, 16.0]);
        assert_eq!(p.report_value(), 30.0);
    }

    #[test]
    fn widen_narrow_round_trip() {
        let a = Matrix::new(1, vec![0.1]).unwrap();
        assert_eq!(Matrix::narrow(&a.widen().unwrap()), a);
        assert_eq!(f64::narrow(&0.25f64.widen().unwrap()), 0.25);
        assert!(f64::NAN.widen().is_err());
    }
}
