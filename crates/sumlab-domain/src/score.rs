use std::collections::BTreeMap;
use sumlab_types::{Algorithm, ErrorSummary, ResultRecord};

pub fn absolute_error(value: f64, truth: f64) -> f64 {
    (value - truth).abs()
}

/// `|value - truth| / |truth|`, or `None` when the truth is zero.
pub fn relative_error(value: f64, truth: f64) -> Option<f64> {
    if truth == 0.0 {
        None
    } else {
        Some(absolute_error(value, truth) / truth.abs())
    }
}

fn median_f64_sorted(sorted: &[f64]) -> f64 {
    debug_assert!(!sorted.is_empty());
    let n = sorted.len();
    let mid = n / 2;
    if n % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Per-algorithm absolute error summaries against the first ground-truth record.
///
/// Returns an empty map when `records` holds no ground truth. Algorithms with
/// no trial records are absent.
pub fn summarize_errors(records: &[ResultRecord]) -> BTreeMap<Algorithm, ErrorSummary> {
    let Some(truth) = records.iter().find(|r| r.ground_truth).map(|r| r.value) else {
        return BTreeMap::new();
    };

    let mut by_algorithm: BTreeMap<Algorithm, Vec<f64>> = BTreeMap::new();
    for record in records.iter().filter(|r| !r.ground_truth) {
        if let Some(algorithm) = record.tag.algorithm() {
            by_algorithm.entry(algorithm).or_default().push(record.value);
        }
    }

    by_algorithm
        .into_iter()
        .map(|(algorithm, values)| {
            let mut abs: Vec<f64> = values.iter().map(|&v| absolute_error(v, truth)).collect();
            abs.sort_by(f64::total_cmp);
            let rel: Option<Vec<f64>> = values.iter().map(|&v| relative_error(v, truth)).collect();
            let median_relative = rel.map(|mut r| {
                r.sort_by(f64::total_cmp);
                median_f64_sorted(&r)
            });

            let summary = ErrorSummary {
                count: abs.len(),
                min: abs[0],
                median: median_f64_sorted(&abs),
                max: abs[abs.len() - 1],
                mean: abs.iter().sum::<f64>() / abs.len() as f64,
                median_relative,
            };
            (algorithm, summary)
        })
        .collect()
}
