//! Summary statistics and metric checks shown next to the outcome histogram.

use serde::{Deserialize, Serialize};

use crate::models::{FeatureImportance, HistogramResult};

/// Significance level for the paired t and Mann-Whitney tests.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;
pub const MAX_IMBALANCE_RATIO: f64 = 10.0;
/// Smallest |Cohen's d| read as a meaningful effect.
pub const MIN_EFFECT_SIZE: f64 = 0.2;
/// Acceptable band for the k-fold normalized RMSE.
pub const K_FOLD_NRMSE_BAND: (f64, f64) = (0.1, 0.2);

/// Descriptive statistics of one series of values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Describe `values`. An empty slice yields all zeros.
pub fn describe(values: &[f64]) -> ValueSummary {
    if values.is_empty() {
        return ValueSummary::default();
    }

    let count = values.len();
    let mean = mean(values);

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let median = if count % 2 == 0 {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    } else {
        sorted[count / 2]
    };

    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

    ValueSummary {
        count,
        mean,
        median,
        std_dev: variance.sqrt(),
        min: sorted[0],
        max: sorted[count - 1],
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// The statistics panel of one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStatistics {
    pub inactive_mean: f64,
    pub active_mean: f64,
    #[serde(rename = "pairedTP")]
    pub paired_t_p: f64,
    pub mann_whitney_p: f64,
    #[serde(rename = "avgITE")]
    pub avg_ite: f64,
    #[serde(rename = "stdevITE")]
    pub stdev_ite: f64,
    pub imbalance_ratio: f64,
    pub cohens_d: f64,
}

pub fn compute_summary_statistics(histogram: &HistogramResult) -> SummaryStatistics {
    let scores = &histogram.test_scores;
    SummaryStatistics {
        inactive_mean: mean(&histogram.inactive_values),
        active_mean: mean(&histogram.active_values),
        paired_t_p: scores.paired_t_p,
        mann_whitney_p: scores.mann_whitney_p,
        avg_ite: histogram.ite_mean,
        stdev_ite: histogram.ite_stdev,
        imbalance_ratio: scores.imbalance_ratio,
        cohens_d: scores.cohens_d,
    }
}

/// Pass/fail flags for the quality metrics. `k_fold_in_band` is `None`
/// until cross-validation has reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricChecks {
    pub paired_t_significant: bool,
    pub mann_whitney_significant: bool,
    pub balanced: bool,
    pub meaningful_effect: bool,
    pub k_fold_in_band: Option<bool>,
}

impl MetricChecks {
    pub fn all_passed(&self) -> bool {
        self.paired_t_significant
            && self.mann_whitney_significant
            && self.balanced
            && self.meaningful_effect
            && self.k_fold_in_band.unwrap_or(true)
    }
}

pub fn metric_checks(stats: &SummaryStatistics, k_fold_score: Option<f64>) -> MetricChecks {
    let (low, high) = K_FOLD_NRMSE_BAND;
    MetricChecks {
        paired_t_significant: stats.paired_t_p < SIGNIFICANCE_LEVEL,
        mann_whitney_significant: stats.mann_whitney_p < SIGNIFICANCE_LEVEL,
        balanced: stats.imbalance_ratio <= MAX_IMBALANCE_RATIO,
        meaningful_effect: stats.cohens_d.abs() >= MIN_EFFECT_SIZE,
        k_fold_in_band: k_fold_score.map(|score| (low..=high).contains(&score)),
    }
}

/// One bar of the feature importance chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureImportanceRow {
    pub name: String,
    /// Column name with hyphens shown as spaces.
    pub label: String,
    pub importance: f64,
}

/// Feature importance rows, most important first. Features without a
/// matching importance value are dropped.
pub fn sorted_feature_importance(importance: &FeatureImportance) -> Vec<FeatureImportanceRow> {
    let mut rows: Vec<FeatureImportanceRow> = importance
        .features
        .iter()
        .zip(&importance.importance)
        .map(|(name, &value)| FeatureImportanceRow {
            name: name.clone(),
            label: name.replace('-', " "),
            importance: value,
        })
        .collect();
    rows.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestScores;

    fn histogram() -> HistogramResult {
        HistogramResult {
            cleaned_conditions: vec!["['X']>=2".to_string()],
            inactive_values: vec![1.0, 2.0, 3.0],
            active_values: vec![2.0, 4.0],
            ite_mean: 0.8,
            ite_stdev: 0.1,
            test_scores: TestScores::from([0.01, 0.03, 0.0, 2.5, -0.35]),
            feature_importance: None,
            column_histograms: None,
            full_column_histograms: None,
        }
    }

    #[test]
    fn test_describe() {
        let summary = describe(&[5.0, 1.0, 3.0, 2.0, 4.0]);

        assert_eq!(summary.count, 5);
        assert_eq!(summary.mean, 3.0);
        assert_eq!(summary.median, 3.0);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 5.0);
        assert!((summary.std_dev - std::f64::consts::SQRT_2).abs() < 0.001);
    }

    #[test]
    fn test_describe_even_and_empty() {
        assert_eq!(describe(&[4.0, 1.0, 3.0, 2.0]).median, 2.5);
        assert_eq!(describe(&[]), ValueSummary::default());
    }

    #[test]
    fn test_summary_statistics() {
        let stats = compute_summary_statistics(&histogram());

        assert_eq!(stats.inactive_mean, 2.0);
        assert_eq!(stats.active_mean, 3.0);
        assert_eq!(stats.mann_whitney_p, 0.01);
        assert_eq!(stats.paired_t_p, 0.03);
        assert_eq!(stats.avg_ite, 0.8);
        assert_eq!(stats.stdev_ite, 0.1);
        assert_eq!(stats.imbalance_ratio, 2.5);
        assert_eq!(stats.cohens_d, -0.35);
    }

    #[test]
    fn test_summary_statistics_wire_names() {
        let json = serde_json::to_value(compute_summary_statistics(&histogram())).unwrap();
        assert_eq!(json["pairedTP"], 0.03);
        assert_eq!(json["avgITE"], 0.8);
        assert_eq!(json["stdevITE"], 0.1);
        assert_eq!(json["cohensD"], -0.35);
    }

    #[test]
    fn test_metric_checks() {
        let stats = compute_summary_statistics(&histogram());

        let checks = metric_checks(&stats, None);
        assert!(checks.paired_t_significant);
        assert!(checks.mann_whitney_significant);
        assert!(checks.balanced);
        assert!(checks.meaningful_effect);
        assert_eq!(checks.k_fold_in_band, None);
        assert!(checks.all_passed());

        assert_eq!(metric_checks(&stats, Some(0.15)).k_fold_in_band, Some(true));
        assert_eq!(metric_checks(&stats, Some(0.2)).k_fold_in_band, Some(true));
        assert_eq!(metric_checks(&stats, Some(0.25)).k_fold_in_band, Some(false));
        assert!(!metric_checks(&stats, Some(0.05)).all_passed());

        let weak = SummaryStatistics {
            paired_t_p: 0.05,
            imbalance_ratio: 10.5,
            cohens_d: 0.1,
            ..stats
        };
        let checks = metric_checks(&weak, None);
        assert!(!checks.paired_t_significant);
        assert!(!checks.balanced);
        assert!(!checks.meaningful_effect);
    }

    #[test]
    fn test_feature_importance_sorted_descending() {
        let importance = FeatureImportance {
            features: vec![
                "median-income".to_string(),
                "poverty".to_string(),
                "unemployment-rate".to_string(),
            ],
            importance: vec![0.2, 0.5, 0.3],
        };

        let rows = sorted_feature_importance(&importance);
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["poverty", "unemployment-rate", "median-income"]);
        assert_eq!(rows[1].label, "unemployment rate");
    }
}
