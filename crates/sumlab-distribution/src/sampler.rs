use crate::distribution::Distribution;
use rand::Rng;
use sumlab_domain::{Matrix, ProgressSink, percent_of};
use sumlab_error::SamplingError;

fn checked_count(count: i64) -> Result<usize, SamplingError> {
    usize::try_from(count)
        .ok()
        .filter(|&n| n > 0)
        .ok_or(SamplingError::InvalidCount(count))
}

/// Emit a percentage only when it changes.
struct Ticker<'p, P: ProgressSink + ?Sized> {
    sink: &'p P,
    last: Option<u8>,
    total: u64,
}

impl<'p, P: ProgressSink + ?Sized> Ticker<'p, P> {
    fn new(sink: &'p P, total: usize) -> Self {
        Self {
            sink,
            last: None,
            total: total as u64,
        }
    }

    fn tick(&mut self, done: usize) {
        let percent = percent_of(done as u64, self.total);
        if self.last != Some(percent) {
            self.last = Some(percent);
            self.sink.report(percent);
        }
    }
}

/// Draws flat `f64` datasets from a distribution.
#[derive(Debug, Clone, Copy)]
pub struct ArrayGenerator<'d> {
    distribution: &'d Distribution,
}

impl<'d> ArrayGenerator<'d> {
    pub fn new(distribution: &'d Distribution) -> Self {
        Self { distribution }
    }

    pub fn generate<R, P>(&self, count: i64, rng: &mut R, progress: &P) -> Result<Vec<f64>, SamplingError>
    where
        R: Rng + ?Sized,
        P: ProgressSink + ?Sized,
    {
        if !self.distribution.valid() {
            return Err(SamplingError::InvalidDistribution);
        }
        let n = checked_count(count)?;

        let mut ticker = Ticker::new(progress, n);
        let mut values = Vec::new();
        values
            .try_reserve_exact(n)
            .map_err(|_| SamplingError::InvalidCount(count))?;
        for i in 0..n {
            values.push(self.distribution.sample(rng));
            ticker.tick(i + 1);
        }
        Ok(values)
    }
}

/// Draws datasets of `size x size` matrices; every entry is an independent draw.
#[derive(Debug, Clone, Copy)]
pub struct MatrixGenerator<'d> {
    distribution: &'d Distribution,
}

impl<'d> MatrixGenerator<'d> {
    pub fn new(distribution: &'d Distribution) -> Self {
        Self { distribution }
    }

    pub fn generate<R, P>(
        &self,
        count: i64,
        size: i64,
        rng: &mut R,
        progress: &P,
    ) -> Result<Vec<Matrix<f64>>, SamplingError>
    where
        R: Rng + ?Sized,
        P: ProgressSink + ?Sized,
    {
        if !self.distribution.valid() {
            return Err(SamplingError::InvalidDistribution);
        }
        let n = checked_count(count)?;
        let m = usize::try_from(size)
            .ok()
            .filter(|&m| m > 0)
            .ok_or(SamplingError::InvalidDimension(size))?;
        let per_matrix = m
            .checked_mul(m)
            .ok_or(SamplingError::InvalidDimension(size))?;
        if n.checked_mul(per_matrix).is_none() {
            return Err(SamplingError::InvalidCount(count));
        }

        let mut ticker = Ticker::new(progress, n);
        let mut matrices = Vec::new();
        matrices
            .try_reserve_exact(n)
            .map_err(|_| SamplingError::InvalidCount(count))?;
        for i in 0..n {
            let mut entries = Vec::new();
            entries
                .try_reserve_exact(per_matrix)
                .map_err(|_| SamplingError::InvalidDimension(size))?;
            entries.extend((0..per_matrix).map(|_| self.distribution.sample(rng)));
            let matrix = Matrix::new(m, entries).map_err(|_| SamplingError::InvalidDimension(size))?;
            matrices.push(matrix);
            ticker.tick(i + 1);
        }
        Ok(matrices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::cell::RefCell;
    use sumlab_domain::NoProgress;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<u8>>);

    impl ProgressSink for Recorder {
        fn report(&self, percent: u8) {
            self.0.borrow_mut().push(percent);
        }
    }

    #[test]
    fn uniform_sample_mean_converges() {
        let d = parse("U(0,10)", 100, 0.0, 10.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let values = ArrayGenerator::new(&d).generate(10_000, &mut rng, &NoProgress).unwrap();
        assert_eq!(values.len(), 10_000);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        assert_relative_eq!(mean, 5.0, max_relative = 0.05);
        assert!(values.iter().all(|v| (0.0..10.0).contains(v)));
    }

    #[test]
    fn samples_fill_bins_not_just_left_edges() {
        let d = Distribution::from_fn(2, 0.0, 2.0, |_| 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let values = ArrayGenerator::new(&d).generate(1000, &mut rng, &NoProgress).unwrap();
        assert!(values.iter().any(|v| v.fract() != 0.0));
    }

    #[test]
    fn zero_density_bins_are_never_drawn() {
        let d = parse("x - 1", 4, 0.0, 4.0).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let values = ArrayGenerator::new(&d).generate(5000, &mut rng, &NoProgress).unwrap();
        assert!(values.iter().all(|&v| v >= 1.0));
    }

    #[test]
    fn invalid_requests() {
        let d = Distribution::default();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            ArrayGenerator::new(&d).generate(10, &mut rng, &NoProgress),
            Err(SamplingError::InvalidDistribution)
        );

        let d = parse("U(0,1)", 10, 0.0, 1.0).unwrap();
        assert_eq!(
            ArrayGenerator::new(&d).generate(0, &mut rng, &NoProgress),
            Err(SamplingError::InvalidCount(0))
        );
        assert_eq!(
            MatrixGenerator::new(&d).generate(-3, 2, &mut rng, &NoProgress),
            Err(SamplingError::InvalidCount(-3))
        );
        assert_eq!(
            MatrixGenerator::new(&d).generate(3, 0, &mut rng, &NoProgress),
            Err(SamplingError::InvalidDimension(0))
        );
    }

    #[test]
    fn oversized_requests_fail_without_allocating() {
        let d = parse("U(0,1)", 10, 0.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            ArrayGenerator::new(&d).generate(i64::MAX, &mut rng, &NoProgress),
            Err(SamplingError::InvalidCount(i64::MAX))
        );
        assert_eq!(
            MatrixGenerator::new(&d).generate(i64::MAX, 1, &mut rng, &NoProgress),
            Err(SamplingError::InvalidCount(i64::MAX))
        );
        assert_eq!(
            MatrixGenerator::new(&d).generate(1, i64::MAX, &mut rng, &NoProgress),
            Err(SamplingError::InvalidDimension(i64::MAX))
        );
        assert_eq!(
            MatrixGenerator::new(&d).generate(1, 1 << 31, &mut rng, &NoProgress),
            Err(SamplingError::InvalidDimension(1 << 31))
        );
    }

    #[test]
    fn matrices_are_square_and_in_range() {
        let d = parse("U(-1,1)", 20, -1.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let matrices = MatrixGenerator::new(&d).generate(5, 3, &mut rng, &NoProgress).unwrap();
        assert_eq!(matrices.len(), 5);
        for m in &matrices {
            assert_eq!(m.size(), 3);
            assert!(m.entries().iter().all(|v| (-1.0..1.0).contains(v)));
        }
    }

    #[test]
    fn progress_is_monotone_and_ends_at_100() {
        let d = parse("U(0,1)", 10, 0.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let recorder = Recorder::default();
        ArrayGenerator::new(&d).generate(250, &mut rng, &recorder).unwrap();
        let seen = recorder.0.into_inner();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last(), Some(&100));
    }

    proptest! {
        #[test]
        fn samples_stay_inside_bounds(seed in any::<u64>(), lower in -50.0f64..50.0, span in 0.5f64..20.0) {
            let upper = lower + span;
            let d = Distribution::from_fn(16, lower, upper, |x| (x - lower) + 0.1).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            let values = ArrayGenerator::new(&d).generate(200, &mut rng, &NoProgress).unwrap();
            prop_assert!(values.iter().all(|&v| v >= lower && v <= upper));
        }
    }
}
