use statrs::distribution::{Continuous, Exp, Gamma, Normal, Uniform};
use sumlab_error::DistributionError;

/// A named analytic density usable as a term in a specification string.
#[derive(Debug, Clone)]
pub enum Template {
    Uniform(Uniform),
    Normal(Normal),
    Exponential(Exp),
    Gamma(Gamma),
}

fn invalid(template: &'static str, name: &'static str, value: f64) -> DistributionError {
    DistributionError::InvalidParameter {
        template,
        name,
        value,
    }
}

impl Template {
    /// Template names with their parameter counts, as written in specifications.
    pub const NAMES: [(&'static str, usize); 4] = [("U", 2), ("N", 2), ("E", 1), ("G", 2)];

    pub fn arity(name: &str) -> Option<usize> {
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(_, arity)| arity)
    }

    pub fn uniform(a: f64, b: f64) -> Result<Self, DistributionError> {
        if !a.is_finite() {
            return Err(invalid("U", "a", a));
        }
        if !b.is_finite() || b <= a {
            return Err(invalid("U", "b", b));
        }
        Uniform::new(a, b)
            .map(Template::Uniform)
            .map_err(|_| invalid("U", "b", b))
    }

    /// `variance` is the second central moment, not the standard deviation.
    /// The mean must lie inside the discretization range.
    pub fn normal(mean: f64, variance: f64, lower: f64, upper: f64) -> Result<Self, DistributionError> {
        if !mean.is_finite() || mean < lower || mean > upper {
            return Err(invalid("N", "mean", mean));
        }
        if !variance.is_finite() || variance <= 0.0 {
            return Err(invalid("N", "variance", variance));
        }
        Normal::new(mean, variance.sqrt())
            .map(Template::Normal)
            .map_err(|_| invalid("N", "variance", variance))
    }

    pub fn exponential(rate: f64) -> Result<Self, DistributionError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(invalid("E", "lambda", rate));
        }
        Exp::new(rate)
            .map(Template::Exponential)
            .map_err(|_| invalid("E", "lambda", rate))
    }

    pub fn gamma(shape: f64, rate: f64) -> Result<Self, DistributionError> {
        if !shape.is_finite() || shape <= 0.0 {
            return Err(invalid("G", "alpha", shape));
        }
        if !rate.is_finite() || rate <= 0.0 {
            return Err(invalid("G", "lambda", rate));
        }
        Gamma::new(shape, rate)
            .map(Template::Gamma)
            .map_err(|_| invalid("G", "lambda", rate))
    }

    /// Build a template from its specification name and evaluated arguments.
    ///
    /// Returns `None` for an unknown name; arity is the caller's concern.
    pub(crate) fn from_call(
        name: &str,
        args: &[f64],
        lower: f64,
        upper: f64,
    ) -> Option<Result<Self, DistributionError>> {
        let built = match (name, args) {
            ("U", &[a, b]) => Self::uniform(a, b),
            ("N", &[mean, variance]) => Self::normal(mean, variance, lower, upper),
            ("E", &[rate]) => Self::exponential(rate),
            ("G", &[shape, rate]) => Self::gamma(shape, rate),
            _ => return None,
        };
        Some(built)
    }

    /// Analytic density at `x`; zero outside the template's support.
    pub fn density(&self, x: f64) -> f64 {
        match self {
            Template::Uniform(d) => d.pdf(x),
            Template::Normal(d) => d.pdf(x),
            Template::Exponential(d) => {
                if x < 0.0 {
                    0.0
                } else {
                    d.pdf(x)
                }
            }
            Template::Gamma(d) => {
                if x < 0.0 {
                    0.0
                } else {
                    d.pdf(x)
                }
            }
        }
    }
}
