//! Wire contracts of the statistical backend.
//!
//! These types mirror the backend's JSON exactly (including its mix of
//! camelCase and snake_case keys) and convert into the domain types in
//! [`crate::models`]. Nothing outside the gateway sees them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::{GatewayError, GatewayResult};
use crate::models::{
    AnalysisResult, Bounds, ColumnHistogram, ColumnRanges, Constraint, CountyId,
    FeatureImportance, GeomapSelection, HistogramResult, PatternId, PresetPattern, Query, Range,
    TestScores,
};

/// Body shared by `/geomapFilter`, `/userPattern` and `/crossVal`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternQueryBody {
    pub constraints: BTreeMap<String, WireBounds>,
    pub law: String,
    pub active_range: Range,
    pub inactive_range: Range,
}

impl From<&Query> for PatternQueryBody {
    /// A query without constraints is sent as an empty map, which the backend
    /// reads as "no filter".
    fn from(query: &Query) -> Self {
        let constraints = query
            .constraints
            .as_ref()
            .map(|c| {
                c.iter()
                    .map(|(name, bounds)| (name.clone(), WireBounds::from(*bounds)))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            constraints,
            law: query.treatment_column.clone(),
            active_range: query.active_range,
            inactive_range: query.inactive_range,
        }
    }
}

/// Bounds as they travel over JSON. Unbounded edges are `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireBounds {
    #[serde(default)]
    pub lb: Option<f64>,
    #[serde(default)]
    pub ub: Option<f64>,
}

impl From<Bounds> for WireBounds {
    fn from(bounds: Bounds) -> Self {
        Self {
            lb: bounds.lb.is_finite().then_some(bounds.lb),
            ub: bounds.ub.is_finite().then_some(bounds.ub),
        }
    }
}

impl From<WireBounds> for Bounds {
    fn from(wire: WireBounds) -> Self {
        Bounds::new(
            wire.lb.unwrap_or(f64::NEG_INFINITY),
            wire.ub.unwrap_or(f64::INFINITY),
        )
    }
}

fn constraint_from_wire(wire: BTreeMap<String, WireBounds>) -> Constraint {
    wire.into_iter()
        .map(|(name, bounds)| (name, Bounds::from(bounds)))
        .collect()
}

/// `GET /constraints?ID={n}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintsResponse {
    #[serde(rename = "ID", default)]
    pub id: Option<i64>,
    pub constraints: BTreeMap<String, WireBounds>,
    #[serde(default)]
    pub constraints_bounds: BTreeMap<String, WireBounds>,
    #[serde(default)]
    pub counties_indices: Vec<CountyId>,
    #[serde(default)]
    pub law: Option<String>,
}

impl ConstraintsResponse {
    pub fn into_preset(self, requested: PatternId) -> PresetPattern {
        PresetPattern {
            id: self.id.map(PatternId).unwrap_or(requested),
            constraints: constraint_from_wire(self.constraints),
            constraint_bounds: constraint_from_wire(self.constraints_bounds),
            treatment_column: self.law.unwrap_or_default(),
            counties_indices: self.counties_indices,
        }
    }
}

/// `GET /columns`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnsResponse {
    pub columns: Vec<String>,
}

/// `GET /column-ranges`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRangesResponse {
    pub column_ranges: ColumnRanges,
}

/// `POST /geomapFilter`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeomapResponse {
    #[serde(default)]
    pub counties_indices: Vec<CountyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_names: Option<Vec<String>>,
    #[serde(default)]
    pub active_counties_indices: Vec<CountyId>,
    #[serde(default)]
    pub inactive_counties_indices: Vec<CountyId>,
}

impl From<GeomapResponse> for GeomapSelection {
    fn from(wire: GeomapResponse) -> Self {
        GeomapSelection {
            all_indices: wire.counties_indices,
            active_indices: wire.active_counties_indices,
            inactive_indices: wire.inactive_counties_indices,
            county_names: wire.county_names.unwrap_or_default(),
            state_names: wire.state_names.unwrap_or_default(),
        }
    }
}

impl From<&GeomapSelection> for GeomapResponse {
    fn from(selection: &GeomapSelection) -> Self {
        GeomapResponse {
            counties_indices: selection.all_indices.clone(),
            county_names: Some(selection.county_names.clone()),
            state_names: Some(selection.state_names.clone()),
            active_counties_indices: selection.active_indices.clone(),
            inactive_counties_indices: selection.inactive_indices.clone(),
        }
    }
}

/// One element of `histogram_data`: the first two are per-record series,
/// the backend appends scalar group means after them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HistogramSeries {
    Values(Vec<f64>),
    Scalar(f64),
}

/// `histData` block of `/userPattern`. Keys stay snake_case on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistDataWire {
    #[serde(default)]
    pub cleaned_conds: Vec<String>,
    pub histogram_data: Vec<HistogramSeries>,
    pub ite_scores: [f64; 2],
    pub test_scores: TestScores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_importance: Option<FeatureImportance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_histograms: Option<BTreeMap<String, ColumnHistogram>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_column_histograms: Option<BTreeMap<String, ColumnHistogram>>,
}

impl TryFrom<HistDataWire> for HistogramResult {
    type Error = GatewayError;

    fn try_from(wire: HistDataWire) -> GatewayResult<Self> {
        let mut series = wire.histogram_data.into_iter();
        let inactive_values = match series.next() {
            Some(HistogramSeries::Values(values)) => values,
            _ => return Err(GatewayError::decode("histogram_data[0] is not a value list")),
        };
        let active_values = match series.next() {
            Some(HistogramSeries::Values(values)) => values,
            _ => return Err(GatewayError::decode("histogram_data[1] is not a value list")),
        };

        Ok(HistogramResult {
            cleaned_conditions: wire.cleaned_conds,
            inactive_values,
            active_values,
            ite_mean: wire.ite_scores[0],
            ite_stdev: wire.ite_scores[1],
            test_scores: wire.test_scores,
            feature_importance: wire.feature_importance,
            column_histograms: wire.column_histograms,
            full_column_histograms: wire.full_column_histograms,
        })
    }
}

impl From<&HistogramResult> for HistDataWire {
    fn from(result: &HistogramResult) -> Self {
        HistDataWire {
            cleaned_conds: result.cleaned_conditions.clone(),
            histogram_data: vec![
                HistogramSeries::Values(result.inactive_values.clone()),
                HistogramSeries::Values(result.active_values.clone()),
            ],
            ite_scores: [result.ite_mean, result.ite_stdev],
            test_scores: result.test_scores,
            feature_importance: result.feature_importance.clone(),
            column_histograms: result.column_histograms.clone(),
            full_column_histograms: result.full_column_histograms.clone(),
        }
    }
}

/// `POST /userPattern`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatternResponse {
    #[serde(flatten)]
    pub geomap: GeomapResponse,
    pub hist_data: HistDataWire,
}

impl TryFrom<UserPatternResponse> for AnalysisResult {
    type Error = GatewayError;

    /// County names, state names and both outcome series are positional and
    /// must line up. Name lists are optional, but when present they must
    /// cover every outcome.
    fn try_from(wire: UserPatternResponse) -> GatewayResult<Self> {
        let geomap: GeomapSelection = wire.geomap.into();
        let histogram: HistogramResult = wire.hist_data.try_into()?;

        let rows = histogram.inactive_values.len();
        if histogram.active_values.len() != rows {
            return Err(GatewayError::decode(format!(
                "histogram_data series differ in length ({} inactive, {} active)",
                rows,
                histogram.active_values.len()
            )));
        }
        for (key, names) in [
            ("countyNames", &geomap.county_names),
            ("stateNames", &geomap.state_names),
        ] {
            if !names.is_empty() && names.len() != rows {
                return Err(GatewayError::decode(format!(
                    "{} has {} entries for {} outcomes",
                    key,
                    names.len(),
                    rows
                )));
            }
        }
        Ok(AnalysisResult { geomap, histogram })
    }
}

/// `POST /crossVal`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CrossValResponse {
    #[serde(rename = "kFoldNRMSE")]
    pub k_fold_nrmse: f64,
}

/// `GET /list-files`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<String>,
}

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error body the backend sends on failures (and occasionally on 200s).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_body_shape() {
        let query = Query {
            constraints: Some(Constraint::new().with("X", 2.0, 8.0)),
            treatment_column: "lawA".to_string(),
            active_range: Range::new(0.0, 0.4),
            inactive_range: Range::new(0.6, 1.0),
        };
        let json = serde_json::to_value(PatternQueryBody::from(&query)).unwrap();
        assert_eq!(
            json,
            json!({
                "constraints": {"X": {"lb": 2.0, "ub": 8.0}},
                "law": "lawA",
                "activeRange": [0.0, 0.4],
                "inactiveRange": [0.6, 1.0]
            })
        );
    }

    #[test]
    fn test_null_bounds_become_infinite() {
        let response: ConstraintsResponse = serde_json::from_value(json!({
            "ID": 6,
            "constraints": {"Y": {"lb": null, "ub": 3.5}},
            "constraintsBounds": {"Y": {"lb": 0.0, "ub": 10.0}},
            "countiesIndices": [1001, 1003],
            "law": "lawA"
        }))
        .unwrap();
        let preset = response.into_preset(PatternId(6));
        let bounds = preset.constraints.get("Y").unwrap();
        assert_eq!(bounds.lb, f64::NEG_INFINITY);
        assert_eq!(bounds.ub, 3.5);
        assert_eq!(preset.treatment_column, "lawA");
    }

    #[test]
    fn test_user_pattern_decodes_positional_tuples() {
        let response: UserPatternResponse = serde_json::from_value(json!({
            "countiesIndices": [1001, 1003],
            "activeCountiesIndices": [1001],
            "inactiveCountiesIndices": [1003],
            "countyNames": ["Autauga", "Baldwin"],
            "stateNames": ["Alabama", "Alabama"],
            "histData": {
                "cleaned_conds": ["['X']>=2"],
                "histogram_data": [[0.1, 0.2], [0.3, 0.5], 0.15, 0.4],
                "ite_scores": [0.25, 0.05],
                "test_scores": [0.01, 0.02, 0.03, 1.2, 0.8]
            }
        }))
        .unwrap();
        let result = AnalysisResult::try_from(response).unwrap();
        assert_eq!(result.histogram.inactive_values, vec![0.1, 0.2]);
        assert_eq!(result.histogram.active_values, vec![0.3, 0.5]);
        assert_eq!(result.histogram.ite_mean, 0.25);
        assert_eq!(result.histogram.test_scores.reserved, 0.03);
        assert_eq!(result.geomap.county_names, vec!["Autauga", "Baldwin"]);
    }

    #[test]
    fn test_misaligned_county_names_are_decode_error() {
        let response = |names: serde_json::Value| -> UserPatternResponse {
            serde_json::from_value(json!({
                "countiesIndices": [1001, 1003, 1005],
                "countyNames": names,
                "histData": {
                    "cleaned_conds": [],
                    "histogram_data": [[0.1, 0.2], [0.3, 0.5], 0.15, 0.4],
                    "ite_scores": [0.25, 0.05],
                    "test_scores": [0.01, 0.02, 0.03, 1.2, 0.8]
                }
            }))
            .unwrap()
        };

        let err = AnalysisResult::try_from(response(json!(["Autauga", "Baldwin", "Barbour"])))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Decode { .. }));
        assert!(err.message().contains("countyNames"));

        // Without names nothing can be misread.
        let result = AnalysisResult::try_from(response(json!(null))).unwrap();
        assert!(result.geomap.county_names.is_empty());
    }

    #[test]
    fn test_histogram_data_without_series_is_decode_error() {
        let wire = HistDataWire {
            cleaned_conds: vec![],
            histogram_data: vec![HistogramSeries::Scalar(1.0)],
            ite_scores: [0.0, 0.0],
            test_scores: TestScores::from([0.0; 5]),
            feature_importance: None,
            column_histograms: None,
            full_column_histograms: None,
        };
        let err = HistogramResult::try_from(wire).unwrap_err();
        assert!(matches!(err, GatewayError::Decode { .. }));
    }

    #[test]
    fn test_cross_val_key() {
        let response: CrossValResponse = serde_json::from_str(r#"{"kFoldNRMSE": 0.15}"#).unwrap();
        assert_eq!(response.k_fold_nrmse, 0.15);
    }
}
