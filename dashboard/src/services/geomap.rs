//! Choropleth adapters: which counties to color, the counts bar, and county
//! lookups against an analysis.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::{AnalysisResult, CountyId, GeomapSelection, HighlightedCounty};

/// Counties on the national map.
pub const TOTAL_COUNTIES: usize = 3137;

/// How the choropleth colors the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapViewMode {
    /// Every matching county, banded counties tinted.
    #[default]
    All,
    /// Active and inactive counties in two contrasting colors.
    Dual,
    Active,
    Inactive,
}

impl MapViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Dual => "dual",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for MapViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MapViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "dual" => Ok(Self::Dual),
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown map view mode '{}'", other)),
        }
    }
}

/// County id sets to draw for one view mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapView {
    pub mode: MapViewMode,
    pub indices: Vec<CountyId>,
    pub active_indices: Vec<CountyId>,
    pub inactive_indices: Vec<CountyId>,
}

pub fn map_view(mode: MapViewMode, selection: &GeomapSelection) -> MapView {
    let (indices, active_indices, inactive_indices) = match mode {
        MapViewMode::All | MapViewMode::Dual => (
            selection.all_indices.clone(),
            selection.active_indices.clone(),
            selection.inactive_indices.clone(),
        ),
        MapViewMode::Active => (selection.active_indices.clone(), Vec::new(), Vec::new()),
        MapViewMode::Inactive => (selection.inactive_indices.clone(), Vec::new(), Vec::new()),
    };
    MapView {
        mode,
        indices,
        active_indices,
        inactive_indices,
    }
}

/// Numbers behind the active/inactive/rest counts bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountyCounts {
    pub active: usize,
    pub inactive: usize,
    pub rest: usize,
    pub total: usize,
}

pub fn county_counts(selection: &GeomapSelection) -> CountyCounts {
    let active = selection.active_indices.len();
    let inactive = selection.inactive_indices.len();
    CountyCounts {
        active,
        inactive,
        rest: TOTAL_COUNTIES.saturating_sub(active + inactive),
        total: TOTAL_COUNTIES,
    }
}

/// Find the first county whose outcome values equal the given ones.
///
/// With both values given both must match; with one, only that one is
/// compared. Returns `None` when neither is given.
pub fn find_county_by_values(
    analysis: &AnalysisResult,
    active_value: Option<f64>,
    inactive_value: Option<f64>,
) -> Option<HighlightedCounty> {
    if active_value.is_none() && inactive_value.is_none() {
        return None;
    }

    let histogram = &analysis.histogram;
    let matches = |expected: Option<f64>, actual: f64| expected.map_or(true, |v| v == actual);

    histogram
        .active_values
        .iter()
        .zip(&histogram.inactive_values)
        .position(|(&active, &inactive)| {
            matches(active_value, active) && matches(inactive_value, inactive)
        })
        .and_then(|position| analysis.county_at(position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HistogramResult, TestScores};

    fn selection() -> GeomapSelection {
        GeomapSelection {
            all_indices: vec![1001, 1003, 1005, 1007],
            active_indices: vec![1003],
            inactive_indices: vec![1005, 1007],
            county_names: vec![
                "Autauga".to_string(),
                "Baldwin".to_string(),
                "Barbour".to_string(),
                "Bibb".to_string(),
            ],
            state_names: vec!["Alabama".to_string(); 4],
        }
    }

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            geomap: selection(),
            histogram: HistogramResult {
                cleaned_conditions: Vec::new(),
                inactive_values: vec![1.0, 2.0, 3.0, 2.0],
                active_values: vec![1.5, 2.5, 3.5, 4.5],
                ite_mean: 0.5,
                ite_stdev: 0.0,
                test_scores: TestScores::from([1.0, 1.0, 1.0, 1.0, 0.0]),
                feature_importance: None,
                column_histograms: None,
                full_column_histograms: None,
            },
        }
    }

    #[test]
    fn test_map_view_modes() {
        let selection = selection();

        let all = map_view(MapViewMode::All, &selection);
        assert_eq!(all.indices.len(), 4);
        assert_eq!(all.active_indices, vec![1003]);

        let dual = map_view(MapViewMode::Dual, &selection);
        assert_eq!(dual.inactive_indices, vec![1005, 1007]);

        let active = map_view(MapViewMode::Active, &selection);
        assert_eq!(active.indices, vec![1003]);
        assert!(active.inactive_indices.is_empty());

        let inactive = map_view(MapViewMode::Inactive, &selection);
        assert_eq!(inactive.indices, vec![1005, 1007]);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Dual".parse::<MapViewMode>().unwrap(), MapViewMode::Dual);
        assert!("heat".parse::<MapViewMode>().is_err());
        assert_eq!(MapViewMode::default().to_string(), "all");
    }

    #[test]
    fn test_county_counts() {
        let counts = county_counts(&selection());
        assert_eq!(counts.active, 1);
        assert_eq!(counts.inactive, 2);
        assert_eq!(counts.rest, 3134);
        assert_eq!(counts.total, TOTAL_COUNTIES);

        let empty = county_counts(&GeomapSelection::empty());
        assert_eq!(empty.rest, 3137);
    }

    #[test]
    fn test_find_county_by_values() {
        let analysis = analysis();

        let both = find_county_by_values(&analysis, Some(4.5), Some(2.0)).unwrap();
        assert_eq!(both.county_id, 1007);
        assert_eq!(both.county_name.as_deref(), Some("Bibb"));

        // First match wins when only one value is given.
        let inactive_only = find_county_by_values(&analysis, None, Some(2.0)).unwrap();
        assert_eq!(inactive_only.position, 1);

        let active_only = find_county_by_values(&analysis, Some(1.5), None).unwrap();
        assert_eq!(active_only.county_id, 1001);

        assert_eq!(find_county_by_values(&analysis, Some(9.0), Some(2.0)), None);
        assert_eq!(find_county_by_values(&analysis, None, None), None);
    }
}
