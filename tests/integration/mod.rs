//! Workspace-level integration tests that drive the library crates end to end:
//! config file -> distribution -> dataset -> experiment -> export.

use approx::assert_relative_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use sumlab_app::{
    DistributionRequest, DistributionUseCase, ExperimentRequest, ExperimentUseCase, ExportFormat,
    ExportUseCase, GenerateRequest, GenerateUseCase, SystemClock, distribution_from_receipt,
};
use sumlab_domain::{NoProgress, ground_truth_value, reduce};
use sumlab_error::{ErrorKind, SumlabError};
use sumlab_precision::HighPrecision;
use sumlab_types::{
    Algorithm, ConfigFile, DataKind, DatasetFile, DistributionReceipt, ExperimentReport,
    ExperimentSpec, Operation, ToolInfo,
};
use tempfile::tempdir;

fn tool() -> ToolInfo {
    ToolInfo {
        name: "sumlab".to_string(),
        version: "0.0.0".to_string(),
    }
}

const CONFIG: &str = r#"
[distribution]
spec = "N(0, 4) + U(-1, 1)"
bins = 400
lower = -8.0
upper = 8.0

[data]
count = 2000

[experiment]
trials = 3
algorithms = ["sort_merge", "linear"]
"#;

#[test]
fn config_driven_pipeline_survives_json_round_trips() {
    let cfg: ConfigFile = toml::from_str(CONFIG).expect("config should parse");
    assert_eq!(cfg.data.kind, DataKind::Array);
    assert_eq!(cfg.experiment.operation, Operation::Add);

    let dir = tempdir().expect("failed to create temp dir");
    let mut rng = StdRng::seed_from_u64(2024);

    let outcome = DistributionUseCase::new(tool())
        .execute(
            &DistributionRequest {
                spec: cfg.distribution.spec.clone(),
                bins: cfg.distribution.bins,
                lower: cfg.distribution.lower,
                upper: cfg.distribution.upper,
            },
            &NoProgress,
        )
        .expect("distribution should build");

    // receipts restore to the identical distribution
    let receipt_path = dir.path().join("distribution.json");
    fs::write(&receipt_path, serde_json::to_vec(&outcome.receipt).unwrap()).unwrap();
    let receipt: DistributionReceipt = serde_json::from_slice(&fs::read(&receipt_path).unwrap()).unwrap();
    let restored = distribution_from_receipt(&receipt).expect("receipt should restore");
    assert_eq!(restored, outcome.distribution);
    assert_relative_eq!(restored.mean(), 0.0, epsilon = 0.05);

    let dataset = GenerateUseCase::new(tool())
        .execute(
            &restored,
            &GenerateRequest {
                kind: cfg.data.kind,
                count: cfg.data.count,
                matrix_size: cfg.data.matrix_size,
            },
            &mut rng,
            &NoProgress,
        )
        .expect("dataset should generate");

    let dataset_path = dir.path().join("dataset.json");
    fs::write(&dataset_path, serde_json::to_vec(&dataset).unwrap()).unwrap();
    let dataset: DatasetFile = serde_json::from_slice(&fs::read(&dataset_path).unwrap()).unwrap();
    assert_eq!(dataset.data.len(), 2000);

    let report = ExperimentUseCase::new(SystemClock, tool())
        .execute(
            ExperimentRequest {
                spec: ExperimentSpec {
                    operation: cfg.experiment.operation,
                    trials: cfg.experiment.trials,
                    algorithms: cfg.experiment.algorithms.clone(),
                    mode: cfg.experiment.mode,
                },
                dataset: dataset.data,
                distribution: Some(restored),
            },
            &mut rng,
            &NoProgress,
        )
        .expect("experiment should run");

    // selection is normalized to canonical order
    let tags: Vec<&str> = report.records[1..3].iter().map(|r| r.tag.as_str()).collect();
    assert_eq!(tags, ["linear", "sort_merge"]);

    let report_json = serde_json::to_string(&report).unwrap();
    let back: ExperimentReport = serde_json::from_str(&report_json).unwrap();
    assert_eq!(back, report);

    let csv = ExportUseCase::export_report(&report, ExportFormat::Csv).unwrap();
    assert_eq!(csv.lines().count(), 1 + 1 + 3 * 2);
}

#[test]
fn sorted_strategies_beat_linear_on_cancellation() {
    let data = [1e16, 1.0, -1e16, 1.0];
    let truth = ground_truth_value(&data, Operation::Add).unwrap();
    assert_eq!(truth, 2.0);

    let linear = reduce(Algorithm::Linear, &data, Operation::Add).unwrap();
    let sort_linear = reduce(Algorithm::SortLinear, &data, Operation::Add).unwrap();
    let sort_merge = reduce(Algorithm::SortMerge, &data, Operation::Add).unwrap();

    assert!((linear - truth).abs() > (sort_linear - truth).abs());
    assert!((linear - truth).abs() > (sort_merge - truth).abs());
}

#[test]
fn ground_truth_matches_exact_decimal_sum() {
    let data = [0.1, 0.2, 0.3];
    let exact = data
        .iter()
        .map(|&x| HighPrecision::from_f64(x).unwrap())
        .fold(HighPrecision::zero(), |acc, x| &acc + &x);
    assert_eq!(ground_truth_value(&data, Operation::Add).unwrap(), exact.to_f64());
}

#[test]
fn failures_are_classified() {
    let err = sumlab_distribution::parse("U(0,1)", 1, 0.0, 1.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let err = sumlab_distribution::parse("Q(1,2)", 10, 0.0, 1.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);

    let empty: [f64; 0] = [];
    for algorithm in Algorithm::ALL {
        let err: SumlabError = reduce(algorithm, &empty, Operation::Add).unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
    }
}
