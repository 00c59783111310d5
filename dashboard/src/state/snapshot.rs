//! Observable dashboard state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    AnalysisResult, ColumnRanges, GeomapSelection, HighlightedCounty, PatternId, Query,
    SliderConfig,
};

/// Preset pattern lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternPhase {
    #[default]
    Idle,
    ConstraintsLoading,
    ConstraintsReady,
}

/// Lightweight map channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MapPhase {
    #[default]
    Idle,
    Pending,
    Ready,
}

/// Full analysis channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisPhase {
    #[default]
    NotRun,
    Pending,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

/// A message the user must acknowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: AlertLevel,
    pub message: String,
}

impl Alert {
    pub fn new(level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// Everything a view needs, as of one revision.
///
/// The map channel (`geomap`, `map_query`) and the analysis channel
/// (`analysis`, `analysis_query`) are kept apart: the map may move ahead of
/// the last analysis, but county lookups must use the geomap that came with
/// the histogram so positions stay aligned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub revision: u64,
    /// Bumped on every data-file change; results from older epochs are dropped.
    pub epoch: u64,

    pub pattern_phase: PatternPhase,
    pub map_phase: MapPhase,
    pub analysis_phase: AnalysisPhase,

    pub columns: Vec<String>,
    pub column_ranges: ColumnRanges,

    pub selected_pattern: Option<PatternId>,
    pub query: Query,
    pub control_variable: Option<String>,
    pub sliders: Vec<SliderConfig>,
    pub range_overlap: bool,

    pub geomap: GeomapSelection,
    pub map_query: Option<Query>,

    pub analysis: Option<AnalysisResult>,
    pub analysis_query: Option<Query>,
    pub k_fold_score: Option<f64>,

    pub highlighted: Option<HighlightedCounty>,
    /// Informational message, e.g. an empty selection.
    pub notice: Option<String>,
    /// Recoverable error shown inline.
    pub error: Option<String>,
    pub alerts: Vec<Alert>,
}

impl DashboardState {
    /// Fresh state for a new epoch. Pending alerts and the revision counter
    /// survive; everything derived from the old data does not.
    pub(crate) fn reset_for_epoch(&self, epoch: u64) -> Self {
        Self {
            revision: self.revision,
            epoch,
            alerts: self.alerts.clone(),
            ..Self::default()
        }
    }

    pub fn has_constraints(&self) -> bool {
        self.query.constraints.is_some()
    }
}
