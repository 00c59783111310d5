//! The canonical query and the results derived from it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::constraint::Constraint;
use super::range::{ranges_overlap, Range, DEFAULT_ACTIVE_RANGE, DEFAULT_INACTIVE_RANGE};

/// County identifier (FIPS code).
pub type CountyId = i64;

/// Preset pattern identifier (row index in the backend's pattern table).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatternId(pub i64);

impl PatternId {
    pub fn new(value: i64) -> Self {
        PatternId(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The unit of work sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub constraints: Option<Constraint>,
    pub treatment_column: String,
    pub active_range: Range,
    pub inactive_range: Range,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            constraints: None,
            treatment_column: String::new(),
            active_range: DEFAULT_ACTIVE_RANGE,
            inactive_range: DEFAULT_INACTIVE_RANGE,
        }
    }
}

impl Query {
    pub fn ranges_overlap(&self) -> bool {
        ranges_overlap(&self.active_range, &self.inactive_range)
    }

    /// Short stable digest used to tag derived data and log lines.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..12].to_string()
    }
}

/// Counties matching a query, split by treatment band.
///
/// `county_names[i]` and `state_names[i]` describe the record at position `i`
/// of the histogram value arrays produced by the same analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeomapSelection {
    pub all_indices: Vec<CountyId>,
    pub active_indices: Vec<CountyId>,
    pub inactive_indices: Vec<CountyId>,
    pub county_names: Vec<String>,
    pub state_names: Vec<String>,
}

impl GeomapSelection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.all_indices.is_empty()
    }

    pub fn position_of(&self, county: CountyId) -> Option<usize> {
        self.all_indices.iter().position(|id| *id == county)
    }
}

/// Positional significance tests returned by the backend.
///
/// Index 2 of the wire tuple is reserved and kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 5]", into = "[f64; 5]")]
pub struct TestScores {
    pub mann_whitney_p: f64,
    pub paired_t_p: f64,
    pub reserved: f64,
    pub imbalance_ratio: f64,
    pub cohens_d: f64,
}

impl From<[f64; 5]> for TestScores {
    fn from(scores: [f64; 5]) -> Self {
        Self {
            mann_whitney_p: scores[0],
            paired_t_p: scores[1],
            reserved: scores[2],
            imbalance_ratio: scores[3],
            cohens_d: scores[4],
        }
    }
}

impl From<TestScores> for [f64; 5] {
    fn from(scores: TestScores) -> Self {
        [
            scores.mann_whitney_p,
            scores.paired_t_p,
            scores.reserved,
            scores.imbalance_ratio,
            scores.cohens_d,
        ]
    }
}

/// Per-feature importance, parallel arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub features: Vec<String>,
    pub importance: Vec<f64>,
}

/// Pre-binned histogram of one feature column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnHistogram {
    pub counts: Vec<f64>,
    pub bin_edges: Vec<f64>,
}

/// Output of one full analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramResult {
    pub cleaned_conditions: Vec<String>,
    pub inactive_values: Vec<f64>,
    pub active_values: Vec<f64>,
    pub ite_mean: f64,
    pub ite_stdev: f64,
    pub test_scores: TestScores,
    pub feature_importance: Option<FeatureImportance>,
    pub column_histograms: Option<BTreeMap<String, ColumnHistogram>>,
    pub full_column_histograms: Option<BTreeMap<String, ColumnHistogram>>,
}

/// Geomap and histogram from the same analysis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub geomap: GeomapSelection,
    pub histogram: HistogramResult,
}

impl AnalysisResult {
    /// The county at `position` of the outcome series, with its names.
    pub fn county_at(&self, position: usize) -> Option<HighlightedCounty> {
        Some(HighlightedCounty {
            county_id: *self.geomap.all_indices.get(position)?,
            position,
            county_name: self.geomap.county_names.get(position).cloned(),
            state_name: self.geomap.state_names.get(position).cloned(),
            inactive_value: *self.histogram.inactive_values.get(position)?,
            active_value: *self.histogram.active_values.get(position)?,
        })
    }
}

/// A county picked on the map or the histogram, resolved against an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightedCounty {
    pub county_id: CountyId,
    pub position: usize,
    pub county_name: Option<String>,
    pub state_name: Option<String>,
    pub inactive_value: f64,
    pub active_value: f64,
}

/// k-fold cross-validation score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossValidation {
    pub k_fold_normalized_rmse: f64,
}

/// A preset pattern as looked up from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetPattern {
    pub id: PatternId,
    pub constraints: Constraint,
    pub constraint_bounds: Constraint,
    pub treatment_column: String,
    pub counties_indices: Vec<CountyId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_scores_keep_positions() {
        let scores: TestScores = serde_json::from_str("[0.01, 0.02, 99.0, 1.5, 0.4]").unwrap();
        assert_eq!(scores.mann_whitney_p, 0.01);
        assert_eq!(scores.paired_t_p, 0.02);
        assert_eq!(scores.reserved, 99.0);
        assert_eq!(scores.imbalance_ratio, 1.5);
        assert_eq!(scores.cohens_d, 0.4);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = Query {
            treatment_column: "lawA".to_string(),
            ..Query::default()
        };
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.active_range = Range::new(0.0, 0.3);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 12);
    }

    #[test]
    fn test_default_query_bands_are_disjoint() {
        assert!(!Query::default().ranges_overlap());
    }

    #[test]
    fn test_county_at_reads_one_position() {
        let analysis = AnalysisResult {
            geomap: GeomapSelection {
                all_indices: vec![1001, 1003],
                county_names: vec!["Autauga".to_string(), "Baldwin".to_string()],
                ..GeomapSelection::empty()
            },
            histogram: HistogramResult {
                cleaned_conditions: Vec::new(),
                inactive_values: vec![1.0, 2.0],
                active_values: vec![1.5, 2.5],
                ite_mean: 0.5,
                ite_stdev: 0.0,
                test_scores: TestScores::from([0.0; 5]),
                feature_importance: None,
                column_histograms: None,
                full_column_histograms: None,
            },
        };

        let county = analysis.county_at(1).unwrap();
        assert_eq!(county.county_id, 1003);
        assert_eq!(county.county_name.as_deref(), Some("Baldwin"));
        assert_eq!(county.state_name, None);
        assert_eq!(county.active_value, 2.5);
        assert_eq!(analysis.county_at(2), None);
    }
}
