//! Data Transfer Objects for the Session API.
//!
//! Request bodies and query strings accepted by the handlers, plus the
//! response shapes that are not already plain model or service types.

use serde::{Deserialize, Serialize};

use crate::models::{CountyId, Range, SliderConfig};
use crate::services::{
    BinnedHistogram, CountyCounts, FeatureImportanceRow, MapView, MetricChecks,
    SummaryStatistics, ValueSummary,
};
use crate::state::{AnalysisOutcome, ChannelOutcome, CommitStatus, DashboardState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Whether the analysis backend answered its own health check
    pub backend: bool,
}

/// GET /check-env
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckEnvResponse {
    pub backend_kind: String,
    pub backend_url: String,
    pub settle_ms: u64,
    pub histogram_bins: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectPatternRequest {
    pub pattern_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSlidersRequest {
    pub sliders: Vec<SliderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddSliderRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSliderRequest {
    pub value: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRequest {
    pub column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeRequest {
    pub range: Range,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightRequest {
    pub county_id: CountyId,
}

/// Query string of GET /v1/session/histogram
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramQuery {
    pub bins: Option<usize>,
    #[serde(default)]
    pub negative_inactive: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapQuery {
    pub mode: Option<String>,
}

/// Query string of GET /v1/session/counties
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountiesQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
    #[serde(default)]
    pub desc: bool,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureQuery {
    #[serde(default)]
    pub log_scale: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Outcome of a commit-or-drop operation together with the resulting state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResponse {
    pub committed: bool,
    pub session: DashboardState,
}

impl CommitResponse {
    pub fn new(status: CommitStatus, session: DashboardState) -> Self {
        Self {
            committed: status == CommitStatus::Committed,
            session,
        }
    }
}

/// Result of a slider edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditResponse {
    pub changed: bool,
    pub session: DashboardState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDto {
    /// `committed`, `empty`, `failed` or `stale`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<ChannelOutcome> for ChannelDto {
    fn from(outcome: ChannelOutcome) -> Self {
        let (status, message) = match outcome {
            ChannelOutcome::Committed => ("committed", None),
            ChannelOutcome::Empty => ("empty", None),
            ChannelOutcome::Failed(message) => ("failed", Some(message)),
            ChannelOutcome::Stale => ("stale", None),
        };
        Self {
            status: status.to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRunResponse {
    /// True when overlapping ranges kept the analysis from running
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ChannelDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_validation: Option<ChannelDto>,
    pub session: DashboardState,
}

impl AnalysisRunResponse {
    pub fn new(outcome: AnalysisOutcome, session: DashboardState) -> Self {
        match outcome {
            AnalysisOutcome::Blocked => Self {
                blocked: true,
                analysis: None,
                cross_validation: None,
                session,
            },
            AnalysisOutcome::Finished {
                analysis,
                cross_validation,
            } => Self {
                blocked: false,
                analysis: Some(analysis.into()),
                cross_validation: Some(cross_validation.into()),
                session,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramResponse {
    #[serde(flatten)]
    pub histogram: BinnedHistogram,
    pub cleaned_conditions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsResponse {
    pub statistics: SummaryStatistics,
    pub checks: MetricChecks,
    pub k_fold_score: Option<f64>,
    pub inactive: ValueSummary,
    pub active: ValueSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapResponse {
    #[serde(flatten)]
    pub view: MapView,
    pub counts: CountyCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesResponse {
    pub features: Vec<FeatureImportanceRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<String>,
}
