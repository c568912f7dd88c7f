//! Export use case for converting experiment reports to CSV or JSONL.
//!
//! One row per result record, in execution order, with the error against the
//! report's ground truth precomputed so spreadsheet users need no formulas.

use std::str::FromStr;
use sumlab_domain::{absolute_error, relative_error};
use sumlab_error::RequestError;
use sumlab_types::{ExperimentReport, ResultRecord, float_repr};

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// RFC 4180 compliant CSV with header row.
    Csv,
    /// JSON Lines format (one JSON object per line). Non-finite values are
    /// written as `"inf"`, `"-inf"` or `"nan"`.
    Jsonl,
}

impl FromStr for ExportFormat {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "jsonl" => Ok(ExportFormat::Jsonl),
            _ => Err(RequestError::UnknownName {
                what: "export format",
                value: s.to_string(),
            }),
        }
    }
}

/// Row structure for record export.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RecordExportRow {
    pub index: usize,
    pub algorithm: String,
    pub trial: Option<u32>,
    pub ground_truth: bool,
    #[serde(serialize_with = "float_repr::serialize")]
    pub value: f64,
    #[serde(serialize_with = "float_repr::serialize_option")]
    pub abs_error: Option<f64>,
    #[serde(serialize_with = "float_repr::serialize_option")]
    pub rel_error: Option<f64>,
}

/// Use case for exporting reports to different formats.
pub struct ExportUseCase;

impl ExportUseCase {
    pub fn export_report(report: &ExperimentReport, format: ExportFormat) -> anyhow::Result<String> {
        Self::export_records(&report.records, format)
    }

    /// Export records directly; the first ground-truth record is the reference.
    pub fn export_records(records: &[ResultRecord], format: ExportFormat) -> anyhow::Result<String> {
        let rows = Self::records_to_rows(records);

        match format {
            ExportFormat::Csv => Ok(Self::rows_to_csv(&rows)),
            ExportFormat::Jsonl => Self::rows_to_jsonl(&rows),
        }
    }

    fn records_to_rows(records: &[ResultRecord]) -> Vec<RecordExportRow> {
        let truth = records.iter().find(|r| r.ground_truth).map(|r| r.value);

        records
            .iter()
            .enumerate()
            .map(|(index, record)| RecordExportRow {
                index,
                algorithm: record.tag.as_str().to_string(),
                trial: record.trial,
                ground_truth: record.ground_truth,
                value: record.value,
                abs_error: truth.map(|t| absolute_error(record.value, t)),
                rel_error: truth.and_then(|t| relative_error(record.value, t)),
            })
            .collect()
    }

    /// Format rows as CSV (RFC 4180).
    fn rows_to_csv(rows: &[RecordExportRow]) -> String {
        let mut output = String::new();

        output.push_str("index,algorithm,trial,ground_truth,value,abs_error,rel_error\n");

        for row in rows {
            output.push_str(&row.index.to_string());
            output.push(',');
            output.push_str(&csv_escape(&row.algorithm));
            output.push(',');
            output.push_str(&row.trial.map(|t| t.to_string()).unwrap_or_default());
            output.push(',');
            output.push_str(if row.ground_truth { "true" } else { "false" });
            output.push(',');
            output.push_str(&row.value.to_string());
            output.push(',');
            output.push_str(&optional_number(row.abs_error));
            output.push(',');
            output.push_str(&optional_number(row.rel_error));
            output.push('\n');
        }

        output
    }

    /// Format rows as JSONL.
    fn rows_to_jsonl(rows: &[RecordExportRow]) -> anyhow::Result<String> {
        let mut output = String::new();

        for row in rows {
            let json = serde_json::to_string(row)?;
            output.push_str(&json);
            output.push('\n');
        }

        Ok(output)
    }
}

fn optional_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Escape a string for CSV per RFC 4180.
fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sumlab_types::{
        Algorithm, DataKind, DatasetSummary, EXPERIMENT_SCHEMA_V1, ExperimentMode, ExperimentSpec,
        Operation, RunMeta, ToolInfo,
    };

    fn create_test_report() -> ExperimentReport {
        let records = vec![
            ResultRecord::ground_truth(2.0),
            ResultRecord::trial(1.0, Algorithm::Linear, 1),
            ResultRecord::trial(2.0, Algorithm::SortMerge, 1),
        ];
        ExperimentReport {
            schema: EXPERIMENT_SCHEMA_V1.to_string(),
            tool: ToolInfo {
                name: "sumlab".to_string(),
                version: "0.3.0".to_string(),
            },
            run: RunMeta {
                id: "run-1".to_string(),
                started_at: "2024-01-15T10:00:00Z".to_string(),
                ended_at: "2024-01-15T10:00:01Z".to_string(),
            },
            experiment: ExperimentSpec {
                operation: Operation::Add,
                trials: 1,
                algorithms: vec![Algorithm::Linear, Algorithm::SortMerge],
                mode: ExperimentMode::Shuffle,
            },
            dataset: DatasetSummary {
                kind: DataKind::Array,
                count: 4,
                matrix_size: None,
            },
            ground_truth_applies_to_all_trials: true,
            errors: sumlab_domain::summarize_errors(&records),
            records,
        }
    }

    #[test]
    fn test_report_export_csv() {
        let report = create_test_report();
        let csv = ExportUseCase::export_report(&report, ExportFormat::Csv).unwrap();

        insta::assert_snapshot!(csv.trim_end(), @r"
        index,algorithm,trial,ground_truth,value,abs_error,rel_error
        0,ground_truth,,true,2,0,0
        1,linear,1,false,1,1,0.5
        2,sort_merge,1,false,2,0,0
        ");
    }

    #[test]
    fn test_report_export_jsonl() {
        let report = create_test_report();
        let jsonl = ExportUseCase::export_report(&report, ExportFormat::Jsonl).unwrap();

        let lines: Vec<&str> = jsonl.trim().split('\n').collect();
        assert_eq!(lines.len(), 3);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["algorithm"], "ground_truth");
        assert!(first["trial"].is_null());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["trial"], 1);
        assert_eq!(second["abs_error"], 1.0);
    }

    #[test]
    fn zero_truth_leaves_relative_error_empty() {
        let records = vec![
            ResultRecord::ground_truth(0.0),
            ResultRecord::trial(0.25, Algorithm::SplitMerge, 1),
        ];
        let csv = ExportUseCase::export_records(&records, ExportFormat::Csv).unwrap();
        assert!(csv.ends_with("1,split_merge,1,false,0.25,0.25,\n"));
    }

    #[test]
    fn non_finite_values_export_in_both_formats() {
        let records = vec![
            ResultRecord::ground_truth(1.0),
            ResultRecord::trial(f64::INFINITY, Algorithm::Linear, 1),
        ];
        let csv = ExportUseCase::export_records(&records, ExportFormat::Csv).unwrap();
        assert!(csv.contains("1,linear,1,false,inf,inf,inf"));

        let jsonl = ExportUseCase::export_records(&records, ExportFormat::Jsonl).unwrap();
        let second: serde_json::Value = serde_json::from_str(jsonl.lines().nth(1).unwrap()).unwrap();
        assert_eq!(second["value"], "inf");
        assert_eq!(second["abs_error"], "inf");
    }

    #[test]
    fn csv_rows_carry_the_trial_number() {
        let records = vec![
            ResultRecord::ground_truth(3.0),
            ResultRecord::trial(3.0, Algorithm::Linear, 1),
            ResultRecord::trial(3.0, Algorithm::Linear, 2),
        ];
        let csv = ExportUseCase::export_records(&records, ExportFormat::Csv).unwrap();
        let trials: Vec<&str> = csv
            .lines()
            .skip(1)
            .map(|line| line.split(',').nth(2).unwrap())
            .collect();
        assert_eq!(trials, vec!["", "1", "2"]);
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("simple"), "simple");
        assert_eq!(csv_escape("has,comma"), "\"has,comma\"");
        assert_eq!(csv_escape("has\"quote"), "\"has\"\"quote\"");
    }

    #[test]
    fn test_export_format_from_str() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("JSONL".parse::<ExportFormat>().unwrap(), ExportFormat::Jsonl);
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    proptest! {
        #[test]
        fn one_csv_line_per_record(values in prop::collection::vec(-1e9f64..1e9, 0..40)) {
            let mut records = vec![ResultRecord::ground_truth(1.0)];
            records.extend(
                values
                    .iter()
                    .enumerate()
                    .map(|(i, &v)| ResultRecord::trial(v, Algorithm::Linear, i as u32 + 1)),
            );
            let csv = ExportUseCase::export_records(&records, ExportFormat::Csv).unwrap();
            prop_assert_eq!(csv.lines().count(), records.len() + 1);
            prop_assert!(csv.lines().all(|l| l.split(',').count() == 7));

            let jsonl = ExportUseCase::export_records(&records, ExportFormat::Jsonl).unwrap();
            prop_assert_eq!(jsonl.lines().count(), records.len());
        }
    }

    #[test]
    fn export_is_deterministic() {
        let report = create_test_report();
        let a = ExportUseCase::export_report(&report, ExportFormat::Csv).unwrap();
        let b = ExportUseCase::export_report(&report, ExportFormat::Csv).unwrap();
        assert_eq!(a, b);
    }
}
