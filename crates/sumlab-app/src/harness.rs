//! Repeated-trial experiment runner.
//!
//! A run moves through `Idle -> GroundTruthComputed -> TrialRunning* -> Finished`:
//! the ground truth is computed once on the dataset as given, then every trial
//! runs the selected algorithms in canonical order and either shuffles the
//! dataset in place or replaces it with a fresh draw.

use rand::Rng;
use rand::seq::SliceRandom;
use sumlab_distribution::{ArrayGenerator, Distribution, MatrixGenerator};
use sumlab_domain::{
    Matrix, NoProgress, ProgressSink, Widen, ground_truth_value, percent_of, reduce,
};
use sumlab_error::{RequestError, SumlabError};
use sumlab_types::{Algorithm, ExperimentMode, ExperimentSpec, ResultRecord};
use tracing::{debug, info};

/// Validated selection in execution order.
fn check_spec(spec: &ExperimentSpec, has_distribution: bool) -> Result<Vec<Algorithm>, RequestError> {
    if spec.trials == 0 {
        return Err(RequestError::ZeroTrials);
    }
    let algorithms = sumlab_types::normalize_selection(&spec.algorithms);
    if algorithms.is_empty() {
        return Err(RequestError::NoAlgorithms);
    }
    if spec.mode == ExperimentMode::Regenerate && !has_distribution {
        return Err(RequestError::MissingDistribution);
    }
    Ok(algorithms)
}

fn run_trials<T, R, P, G>(
    mut data: Vec<T>,
    spec: &ExperimentSpec,
    has_distribution: bool,
    rng: &mut R,
    progress: &P,
    mut regenerate: G,
) -> Result<Vec<ResultRecord>, SumlabError>
where
    T: Widen,
    R: Rng + ?Sized,
    P: ProgressSink + ?Sized,
    G: FnMut(usize, &mut R) -> Result<Vec<T>, SumlabError>,
{
    let algorithms = check_spec(spec, has_distribution)?;
    let op = spec.operation;

    let too_many = || RequestError::TooManyTrials {
        trials: spec.trials,
        algorithms: algorithms.len(),
    };
    let capacity = usize::try_from(spec.trials)
        .ok()
        .and_then(|trials| trials.checked_mul(algorithms.len()))
        .and_then(|n| n.checked_add(1))
        .ok_or_else(too_many)?;
    let mut records = Vec::new();
    records.try_reserve_exact(capacity).map_err(|_| too_many())?;

    info!(
        operation = %op,
        trials = spec.trials,
        elements = data.len(),
        mode = ?spec.mode,
        "experiment started"
    );

    let truth = ground_truth_value(&data, op)?;
    records.push(ResultRecord::ground_truth(truth));
    debug!(ground_truth = truth, "ground truth computed");

    for trial in 1..=spec.trials {
        for &algorithm in &algorithms {
            let value = reduce(algorithm, &data, op)?.report_value();
            debug!(trial, %algorithm, value, "trial result");
            records.push(ResultRecord::trial(value, algorithm, trial));
        }

        if trial < spec.trials {
            match spec.mode {
                ExperimentMode::Shuffle => data.shuffle(&mut *rng),
                ExperimentMode::Regenerate => data = regenerate(data.len(), &mut *rng)?,
            }
        }
        progress.report(percent_of(u64::from(trial), u64::from(spec.trials)));
    }

    info!(records = records.len(), "experiment finished");
    Ok(records)
}

/// Experiment over a flat `f64` dataset.
#[derive(Debug, Clone)]
pub struct ArrayExperiment<'d> {
    data: Vec<f64>,
    distribution: Option<&'d Distribution>,
}

impl<'d> ArrayExperiment<'d> {
    pub fn new(data: Vec<f64>) -> Self {
        Self {
            data,
            distribution: None,
        }
    }

    /// Source for fresh datasets in [`ExperimentMode::Regenerate`].
    pub fn with_distribution(mut self, distribution: &'d Distribution) -> Self {
        self.distribution = Some(distribution);
        self
    }

    /// Ground truth first, then one record per selected algorithm per trial.
    ///
    /// Any failure discards the records collected so far.
    pub fn run<R, P>(self, spec: &ExperimentSpec, rng: &mut R, progress: &P) -> Result<Vec<ResultRecord>, SumlabError>
    where
        R: Rng + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let distribution = self.distribution;
        run_trials(
            self.data,
            spec,
            distribution.is_some(),
            rng,
            progress,
            |len, rng| match distribution {
                Some(d) => Ok(ArrayGenerator::new(d).generate(len as i64, rng, &NoProgress)?),
                None => Err(RequestError::MissingDistribution.into()),
            },
        )
    }
}

/// Experiment over a dataset of equally sized square matrices.
///
/// Each matrix plays the role of one element; records carry the entry sum of
/// the aggregate matrix.
#[derive(Debug, Clone)]
pub struct MatrixExperiment<'d> {
    data: Vec<Matrix<f64>>,
    distribution: Option<&'d Distribution>,
}

impl<'d> MatrixExperiment<'d> {
    pub fn new(data: Vec<Matrix<f64>>) -> Self {
        Self {
            data,
            distribution: None,
        }
    }

    pub fn with_distribution(mut self, distribution: &'d Distribution) -> Self {
        self.distribution = Some(distribution);
        self
    }

    pub fn run<R, P>(self, spec: &ExperimentSpec, rng: &mut R, progress: &P) -> Result<Vec<ResultRecord>, SumlabError>
    where
        R: Rng + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let distribution = self.distribution;
        let size = self.data.first().map_or(0, Matrix::size);
        run_trials(
            self.data,
            spec,
            distribution.is_some(),
            rng,
            progress,
            |len, rng| match distribution {
                Some(d) => Ok(MatrixGenerator::new(d).generate(len as i64, size as i64, rng, &NoProgress)?),
                None => Err(RequestError::MissingDistribution.into()),
            },
        )
    }
}
