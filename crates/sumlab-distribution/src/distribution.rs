use crate::template::Template;
use rand::Rng;
use sumlab_error::{DistributionError, IndexOutOfRange};
use tracing::warn;

/// Reject bin counts and ranges no distribution can be built on.
///
/// Cheap enough to call before parsing a specification.
pub fn valid_params(bins: i64, lower: f64, upper: f64) -> Result<(), DistributionError> {
    if bins <= 1 {
        return Err(DistributionError::InvalidBinCount(bins));
    }
    if !lower.is_finite() || !upper.is_finite() || upper <= lower {
        return Err(DistributionError::InvalidRange { lower, upper });
    }
    Ok(())
}

fn too_many_bins(bins: usize) -> DistributionError {
    DistributionError::TooManyBins(i64::try_from(bins).unwrap_or(i64::MAX))
}

/// Densities sampled with the trapezoid rule on a uniform bin grid.
///
/// `pdf[i] = (f(left) + f(right)) / 2` where `left = lower + i * w` and
/// `right = left + w`. Negative averages are clamped to zero and their bins
/// returned alongside the densities.
pub(crate) fn trapezoid_densities(
    bins: usize,
    lower: f64,
    upper: f64,
    f: impl Fn(f64) -> f64,
) -> Result<(Vec<f64>, Vec<usize>), DistributionError> {
    let width = (upper - lower) / bins as f64;
    let mut pdf = Vec::new();
    pdf.try_reserve_exact(bins).map_err(|_| too_many_bins(bins))?;
    let mut clamped = Vec::new();

    for i in 0..bins {
        let left = lower + i as f64 * width;
        let right = left + width;
        let density = (f(left) + f(right)) / 2.0;
        if !density.is_finite() {
            return Err(DistributionError::NonFiniteDensity { bin: i });
        }
        if density < 0.0 {
            clamped.push(i);
            pdf.push(0.0);
        } else {
            pdf.push(density);
        }
    }

    Ok((pdf, clamped))
}

/// An immutable discretized density and its running prefix sum over
/// `[lower, upper]`.
///
/// The cumulative array is not normalized: `cdf[bins - 1]` is the total mass
/// of the discretized density.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Distribution {
    bins: usize,
    lower: f64,
    upper: f64,
    pdf: Vec<f64>,
    cdf: Vec<f64>,
    clamped: Vec<usize>,
}

impl Distribution {
    /// Build from per-bin densities, deriving the cumulative array.
    pub(crate) fn from_density(
        lower: f64,
        upper: f64,
        pdf: Vec<f64>,
        clamped: Vec<usize>,
    ) -> Result<Self, DistributionError> {
        let bins = pdf.len();
        valid_params(bins as i64, lower, upper)?;

        let mut cdf = Vec::new();
        cdf.try_reserve_exact(bins).map_err(|_| too_many_bins(bins))?;
        let mut running = 0.0;
        for (i, &p) in pdf.iter().enumerate() {
            if !p.is_finite() || p < 0.0 {
                return Err(DistributionError::NonFiniteDensity { bin: i });
            }
            running = if i == 0 { p } else { running + p };
            cdf.push(running);
        }
        if running <= 0.0 || !running.is_finite() {
            return Err(DistributionError::ZeroMass { lower, upper });
        }

        if !clamped.is_empty() {
            warn!(
                count = clamped.len(),
                first_bin = clamped[0],
                "negative density clamped to zero"
            );
        }

        Ok(Self {
            bins,
            lower,
            upper,
            pdf,
            cdf,
            clamped,
        })
    }

    /// Discretize an arbitrary density function.
    pub fn from_fn(
        bins: i64,
        lower: f64,
        upper: f64,
        f: impl Fn(f64) -> f64,
    ) -> Result<Self, DistributionError> {
        valid_params(bins, lower, upper)?;
        let n = usize::try_from(bins).map_err(|_| DistributionError::TooManyBins(bins))?;
        let (pdf, clamped) = trapezoid_densities(n, lower, upper, f)?;
        Self::from_density(lower, upper, pdf, clamped)
    }

    /// Rebuild a distribution from stored arrays, checking every invariant.
    pub fn from_parts(
        lower: f64,
        upper: f64,
        pdf: Vec<f64>,
        cdf: Vec<f64>,
        clamped: Vec<usize>,
    ) -> Result<Self, DistributionError> {
        if pdf.len() != cdf.len() {
            return Err(DistributionError::LengthMismatch {
                bins: pdf.len(),
                pdf: pdf.len(),
                cdf: cdf.len(),
            });
        }
        let rebuilt = Self::from_density(lower, upper, pdf, clamped)?;
        // stored prefix sums must match the densities bit for bit
        if let Some(bin) = rebuilt
            .cdf
            .iter()
            .zip(&cdf)
            .position(|(a, b)| a.to_bits() != b.to_bits())
        {
            return Err(DistributionError::InconsistentCdf { bin });
        }
        Ok(rebuilt)
    }

    pub(crate) fn from_template(
        bins: i64,
        lower: f64,
        upper: f64,
        template: &Template,
    ) -> Result<Self, DistributionError> {
        Self::from_fn(bins, lower, upper, |x| template.density(x))
    }

    /// `U(a, b)`.
    pub fn uniform(bins: i64, lower: f64, upper: f64, a: f64, b: f64) -> Result<Self, DistributionError> {
        valid_params(bins, lower, upper)?;
        Self::from_template(bins, lower, upper, &Template::uniform(a, b)?)
    }

    /// `N(mean, variance)`; the mean must lie inside `[lower, upper]`.
    pub fn normal(
        bins: i64,
        lower: f64,
        upper: f64,
        mean: f64,
        variance: f64,
    ) -> Result<Self, DistributionError> {
        valid_params(bins, lower, upper)?;
        Self::from_template(bins, lower, upper, &Template::normal(mean, variance, lower, upper)?)
    }

    /// `E(rate)`.
    pub fn exponential(bins: i64, lower: f64, upper: f64, rate: f64) -> Result<Self, DistributionError> {
        valid_params(bins, lower, upper)?;
        Self::from_template(bins, lower, upper, &Template::exponential(rate)?)
    }

    /// `G(shape, rate)`.
    pub fn gamma(
        bins: i64,
        lower: f64,
        upper: f64,
        shape: f64,
        rate: f64,
    ) -> Result<Self, DistributionError> {
        valid_params(bins, lower, upper)?;
        Self::from_template(bins, lower, upper, &Template::gamma(shape, rate)?)
    }

    /// True when construction completed and every invariant holds.
    ///
    /// Only [`Distribution::default`] is invalid among values this crate hands
    /// out.
    pub fn valid(&self) -> bool {
        self.bins > 1
            && self.lower < self.upper
            && self.pdf.len() == self.bins
            && self.cdf.len() == self.bins
            && self.pdf.iter().all(|p| p.is_finite() && *p >= 0.0)
            && self.cdf.windows(2).all(|w| w[0] <= w[1])
            && self.total_mass() > 0.0
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn bin_width(&self) -> f64 {
        if self.bins == 0 {
            return 0.0;
        }
        (self.upper - self.lower) / self.bins as f64
    }

    /// `[left, right)` of bin `i`, computed exactly as during discretization.
    pub fn bin_edges(&self, i: usize) -> Result<(f64, f64), IndexOutOfRange> {
        if i >= self.bins {
            return Err(IndexOutOfRange {
                index: i,
                len: self.bins,
            });
        }
        Ok(self.edges(i))
    }

    fn edges(&self, i: usize) -> (f64, f64) {
        let width = self.bin_width();
        let left = self.lower + i as f64 * width;
        (left, left + width)
    }

    /// Density of bin `i`.
    pub fn density(&self, i: usize) -> Result<f64, IndexOutOfRange> {
        self.pdf.get(i).copied().ok_or(IndexOutOfRange {
            index: i,
            len: self.pdf.len(),
        })
    }

    pub fn pdf(&self) -> &[f64] {
        &self.pdf
    }

    pub fn cdf(&self) -> &[f64] {
        &self.cdf
    }

    /// Bins whose trapezoid average came out negative and was stored as zero.
    pub fn clamped_bins(&self) -> &[usize] {
        &self.clamped
    }

    pub fn total_mass(&self) -> f64 {
        self.cdf.last().copied().unwrap_or(0.0)
    }

    /// Mean of the discretized law, taking each bin's midpoint as its value.
    pub fn mean(&self) -> f64 {
        let total = self.total_mass();
        if total <= 0.0 {
            return f64::NAN;
        }
        let weighted: f64 = self
            .pdf
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let (left, right) = self.edges(i);
                p * (left + right) / 2.0
            })
            .sum();
        weighted / total
    }

    /// Inverse-CDF draw: pick the first bin whose cumulative mass exceeds
    /// `u * total`, then a uniform point inside that bin.
    ///
    /// The distribution must be [`valid`](Self::valid).
    pub(crate) fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let total = self.total_mass();
        let u = rng.random::<f64>() * total;
        let mut bin = self.cdf.partition_point(|&c| c <= u);
        if bin >= self.bins {
            // u rounded up to the total; take the bin where the total is reached
            bin = self.cdf.partition_point(|&c| c < total).min(self.bins - 1);
        }
        let (left, right) = self.edges(bin);
        left + rng.random::<f64>() * (right - left)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn valid_params_rejects_each_precondition() {
        assert_eq!(valid_params(1, 0.0, 1.0), Err(DistributionError::InvalidBinCount(1)));
        assert_eq!(valid_params(-5, 0.0, 1.0), Err(DistributionError::InvalidBinCount(-5)));
        assert_eq!(
            valid_params(10, 1.0, 1.0),
            Err(DistributionError::InvalidRange { lower: 1.0, upper: 1.0 })
        );
        assert!(valid_params(10, f64::NAN, 1.0).is_err());
        assert!(valid_params(10, 0.0, f64::INFINITY).is_err());
        assert!(valid_params(2, -1.0, 1.0).is_ok());
    }

    #[test]
    fn oversized_grid_is_a_configuration_error() {
        assert_eq!(
            Distribution::from_fn(i64::MAX, 0.0, 1.0, |_| 1.0),
            Err(DistributionError::TooManyBins(i64::MAX))
        );
        assert_eq!(
            Distribution::uniform(i64::MAX, 0.0, 1.0, 0.0, 1.0),
            Err(DistributionError::TooManyBins(i64::MAX))
        );
    }

    #[test]
    fn trapezoid_rule_averages_edges() {
        let d = Distribution::from_fn(4, 0.0, 4.0, |x| x).unwrap();
        assert_eq!(d.pdf(), &[0.5, 1.5, 2.5, 3.5]);
        assert_eq!(d.cdf(), &[0.5, 2.0, 4.5, 8.0]);
        assert_eq!(d.total_mass(), 8.0);
        assert!(d.valid());
    }

    #[test]
    fn uniform_template() {
        let d = Distribution::uniform(100, 0.0, 10.0, 0.0, 10.0).unwrap();
        assert!(d.valid());
        assert!(d.cdf().windows(2).all(|w| w[0] < w[1]));
        assert_relative_eq!(d.total_mass(), 10.0, epsilon = 0.06);
        assert_relative_eq!(d.mean(), 5.0, epsilon = 0.05);
    }

    #[test]
    fn normal_template_validates_parameters() {
        assert!(matches!(
            Distribution::normal(10, 0.0, 1.0, 2.0, 1.0),
            Err(DistributionError::InvalidParameter { name: "mean", .. })
        ));
        assert!(matches!(
            Distribution::normal(10, 0.0, 1.0, 0.5, 0.0),
            Err(DistributionError::InvalidParameter { name: "variance", .. })
        ));
        let d = Distribution::normal(200, -5.0, 5.0, 0.0, 1.0).unwrap();
        assert_relative_eq!(d.total_mass() * d.bin_width(), 1.0, epsilon = 1e-3);
        assert_relative_eq!(d.mean(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn exponential_and_gamma_templates() {
        assert!(Distribution::exponential(10, 0.0, 1.0, 0.0).is_err());
        assert!(Distribution::gamma(10, 0.0, 1.0, -1.0, 1.0).is_err());
        assert!(Distribution::gamma(10, 0.0, 1.0, 1.0, 0.0).is_err());

        let e = Distribution::exponential(1000, 0.0, 20.0, 2.0).unwrap();
        assert_relative_eq!(e.total_mass() * e.bin_width(), 1.0, epsilon = 1e-3);
        let g = Distribution::gamma(1000, 0.0, 30.0, 2.0, 1.0).unwrap();
        assert_relative_eq!(g.mean(), 2.0, epsilon = 1e-2);
    }

    #[test]
    fn two_bins_is_the_minimal_grid() {
        let d = Distribution::uniform(2, 0.0, 1.0, 0.0, 1.0).unwrap();
        assert_eq!(d.bins(), 2);
        assert!(d.pdf().iter().all(|p| p.is_finite()));
        assert_eq!(
            Distribution::uniform(1, 0.0, 1.0, 0.0, 1.0),
            Err(DistributionError::InvalidBinCount(1))
        );
    }

    #[test]
    fn negative_density_is_clamped_and_reported() {
        let d = Distribution::from_fn(4, -2.0, 2.0, |x| x).unwrap();
        assert_eq!(d.pdf(), &[0.0, 0.0, 0.5, 1.5]);
        assert_eq!(d.clamped_bins(), &[0, 1]);
        assert!(d.valid());
    }

    #[test]
    fn non_finite_density_names_the_bin() {
        let err = Distribution::from_fn(4, 0.0, 4.0, |x| 1.0 / (x - 2.0)).unwrap_err();
        assert_eq!(err, DistributionError::NonFiniteDensity { bin: 1 });
    }

    #[test]
    fn zero_mass_is_rejected() {
        assert_eq!(
            Distribution::from_fn(4, 0.0, 1.0, |_| 0.0).unwrap_err(),
            DistributionError::ZeroMass { lower: 0.0, upper: 1.0 }
        );
        // support of U(5, 6) does not meet [0, 1]
        assert!(Distribution::uniform(10, 0.0, 1.0, 5.0, 6.0).is_err());
    }

    #[test]
    fn indexed_access_is_bounds_checked() {
        let d = Distribution::from_fn(3, 0.0, 3.0, |_| 1.0).unwrap();
        assert_eq!(d.density(2), Ok(1.0));
        assert_eq!(d.density(3), Err(IndexOutOfRange { index: 3, len: 3 }));
        assert_eq!(d.bin_edges(1), Ok((1.0, 2.0)));
        assert!(d.bin_edges(3).is_err());
    }

    #[test]
    fn default_is_invalid() {
        let d = Distribution::default();
        assert!(!d.valid());
        assert_eq!(d.total_mass(), 0.0);
        assert!(d.mean().is_nan());
    }

    #[test]
    fn from_parts_round_trip_and_checks() {
        let d = Distribution::normal(50, -3.0, 3.0, 0.0, 1.0).unwrap();
        let back = Distribution::from_parts(
            d.lower(),
            d.upper(),
            d.pdf().to_vec(),
            d.cdf().to_vec(),
            d.clamped_bins().to_vec(),
        )
        .unwrap();
        assert_eq!(back, d);

        let err = Distribution::from_parts(0.0, 1.0, vec![1.0, 1.0], vec![1.0], vec![]).unwrap_err();
        assert_eq!(err, DistributionError::LengthMismatch { bins: 2, pdf: 2, cdf: 1 });

        assert_eq!(
            Distribution::from_parts(0.0, 1.0, vec![1.0, 1.0], vec![1.0, 3.0], vec![]),
            Err(DistributionError::InconsistentCdf { bin: 1 })
        );
    }

    proptest! {
        #[test]
        fn cdf_is_monotone_and_pdf_non_negative(
            bins in 2i64..300,
            lower in -100.0f64..100.0,
            span in 0.1f64..100.0,
            k in -3.0f64..3.0,
        ) {
            let upper = lower + span;
            // a sine can go negative, exercising the clamp
            if let Ok(d) = Distribution::from_fn(bins, lower, upper, |x| (k * x).sin() + 0.5) {
                prop_assert!(d.valid());
                prop_assert!(d.pdf().iter().all(|p| *p >= 0.0));
                prop_assert!(d.cdf().windows(2).all(|w| w[0] <= w[1]));
                prop_assert_eq!(d.pdf().len(), bins as usize);
            }
        }
    }
}
