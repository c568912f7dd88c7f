//! Application layer for sumlab.
//!
//! The app layer coordinates the numeric crates into use cases: build a
//! distribution, draw a dataset from it, run an experiment over the dataset.
//! It does not touch the filesystem; callers hand in values and persist the
//! returned contracts however they like.

mod coordinator;
mod dataset;
mod export;
mod harness;

pub use coordinator::{ChannelProgress, CoordinatorError, JobHandle, Permit, RunCoordinator};
pub use dataset::{
    array_dataset, distribution_from_receipt, distribution_receipt, matrices_from_dataset,
    matrix_dataset,
};
pub use export::{ExportFormat, ExportUseCase, RecordExportRow};
pub use harness::{ArrayExperiment, MatrixExperiment};

use anyhow::Context;
use rand::Rng;
use sumlab_distribution::{ArrayGenerator, Distribution, MatrixGenerator, Parser};
use sumlab_domain::{ProgressSink, summarize_errors};
use sumlab_error::{SamplingError, SumlabError};
use sumlab_types::{
    DATASET_SCHEMA_V1, DataKind, Dataset, DatasetFile, DistributionReceipt, EXPERIMENT_SCHEMA_V1,
    ExperimentMode, ExperimentReport, ExperimentSpec, RunMeta, ToolInfo,
};
use tracing::{info, warn};

pub trait Clock: Send + Sync {
    fn now_rfc3339(&self) -> String;
}

#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_rfc3339(&self) -> String {
        use time::format_description::well_known::Rfc3339;
        time::OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct DistributionRequest {
    pub spec: String,
    pub bins: i64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone)]
pub struct DistributionOutcome {
    pub distribution: Distribution,
    pub receipt: DistributionReceipt,
}

/// Compile a specification string into a distribution and its receipt.
pub struct DistributionUseCase {
    tool: ToolInfo,
}

impl DistributionUseCase {
    pub fn new(tool: ToolInfo) -> Self {
        Self { tool }
    }

    pub fn execute<P>(&self, req: &DistributionRequest, progress: &P) -> anyhow::Result<DistributionOutcome>
    where
        P: ProgressSink + ?Sized,
    {
        let distribution = Parser::new(req.bins, req.lower, req.upper)
            .map_err(SumlabError::from)
            .and_then(|parser| parser.parse(&req.spec))
            .with_context(|| format!("failed to build distribution from {:?}", req.spec))?;
        progress.report(100);

        info!(
            spec = %req.spec,
            bins = distribution.bins(),
            mean = distribution.mean(),
            clamped = distribution.clamped_bins().len(),
            "distribution ready"
        );

        let receipt = distribution_receipt(self.tool.clone(), &req.spec, &distribution);
        Ok(DistributionOutcome {
            distribution,
            receipt,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub kind: DataKind,
    pub count: i64,
    /// Required for [`DataKind::Matrix`].
    pub matrix_size: Option<i64>,
}

/// Draw a dataset from a distribution.
pub struct GenerateUseCase {
    tool: ToolInfo,
}

impl GenerateUseCase {
    pub fn new(tool: ToolInfo) -> Self {
        Self { tool }
    }

    pub fn execute<R, P>(
        &self,
        distribution: &Distribution,
        req: &GenerateRequest,
        rng: &mut R,
        progress: &P,
    ) -> anyhow::Result<DatasetFile>
    where
        R: Rng + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let data = match req.kind {
            DataKind::Array => {
                let values = ArrayGenerator::new(distribution)
                    .generate(req.count, rng, progress)
                    .context("failed to generate array dataset")?;
                array_dataset(values)
            }
            DataKind::Matrix => {
                let size = req.matrix_size.ok_or(SamplingError::InvalidDimension(0))?;
                let matrices = MatrixGenerator::new(distribution)
                    .generate(req.count, size, rng, progress)
                    .context("failed to generate matrix dataset")?;
                // the generator rejected non-positive sizes already
                matrix_dataset(matrices, size as usize)
            }
        };

        info!(kind = ?req.kind, count = data.len(), "dataset generated");

        Ok(DatasetFile {
            schema: DATASET_SCHEMA_V1.to_string(),
            tool: self.tool.clone(),
            data,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExperimentRequest {
    pub spec: ExperimentSpec,
    pub dataset: Dataset,
    /// Source for fresh draws; required in [`ExperimentMode::Regenerate`].
    pub distribution: Option<Distribution>,
}

pub struct ExperimentUseCase<C: Clock> {
    clock: C,
    tool: ToolInfo,
}

impl<C: Clock> ExperimentUseCase<C> {
    pub fn new(clock: C, tool: ToolInfo) -> Self {
        Self { clock, tool }
    }

    pub fn execute<R, P>(&self, req: ExperimentRequest, rng: &mut R, progress: &P) -> anyhow::Result<ExperimentReport>
    where
        R: Rng + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = self.clock.now_rfc3339();
        let summary = req.dataset.summary();

        if req.spec.mode == ExperimentMode::Regenerate {
            warn!("regenerate mode: the ground truth only describes the first trial's dataset");
        }

        let distribution = req.distribution.as_ref();
        let records = match req.dataset {
            Dataset::Array { values } => {
                let mut experiment = ArrayExperiment::new(values);
                if let Some(d) = distribution {
                    experiment = experiment.with_distribution(d);
                }
                experiment.run(&req.spec, rng, progress)
            }
            Dataset::Matrix { size, matrices } => {
                let matrices = matrices_from_dataset(size, matrices)?;
                let mut experiment = MatrixExperiment::new(matrices);
                if let Some(d) = distribution {
                    experiment = experiment.with_distribution(d);
                }
                experiment.run(&req.spec, rng, progress)
            }
        }
        .with_context(|| format!("experiment {run_id} failed"))?;

        let ended_at = self.clock.now_rfc3339();
        let errors = summarize_errors(&records);

        Ok(ExperimentReport {
            schema: EXPERIMENT_SCHEMA_V1.to_string(),
            tool: self.tool.clone(),
            run: RunMeta {
                id: run_id,
                started_at,
                ended_at,
            },
            ground_truth_applies_to_all_trials: req.spec.mode == ExperimentMode::Shuffle,
            experiment: req.spec,
            dataset: summary,
            records,
            errors,
        })
    }
}
