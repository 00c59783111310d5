//! HTTP handlers for the Session API.
//!
//! Each handler drives the shared [`PatternStateMachine`] session or reads
//! its snapshot through the presentation services.
//!
//! [`PatternStateMachine`]: crate::state::PatternStateMachine

use axum::{
    extract::{Multipart, Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info};

use super::dto::{
    AddSliderRequest, AnalysisRunResponse, CheckEnvResponse, ColumnRequest, CommitResponse,
    CountiesQuery, EditResponse, FeatureQuery, FeaturesResponse, FilesQuery, FilesResponse,
    HealthResponse, HighlightRequest, HistogramQuery, HistogramResponse, MapQuery, MapResponse,
    RangeRequest, SelectPatternRequest, SetSlidersRequest, StatisticsResponse,
    UpdateSliderRequest,
};
use super::error::AppError;
use super::state::AppState;
use crate::models::{
    AnalysisResult, DataFileKind, DataFileSelection, DataFileUpload, PatternId, UploadReceipt,
};
use crate::services::{
    bin_histogram, compute_summary_statistics, county_counts, county_rows, county_table,
    describe, feature_histogram, map_view, metric_checks, sorted_feature_importance, BinOptions,
    CountyColumn, CountyPage, CountyTableQuery, FeatureHistogramBin, MapViewMode,
    COUNTY_PAGE_SIZE,
};
use crate::state::{Alert, DashboardState};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

fn require_analysis(state: &DashboardState) -> Result<&AnalysisResult, AppError> {
    state
        .analysis
        .as_ref()
        .ok_or_else(|| AppError::NotFound("No analysis has been run yet".to_string()))
}

// =============================================================================
// Health
// =============================================================================

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let backend = state.machine.health_check().await;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: "v1".to_string(),
        backend,
    }))
}

/// GET /check-env
///
/// Effective configuration after file and environment overrides.
pub async fn check_env(State(state): State<AppState>) -> HandlerResult<CheckEnvResponse> {
    let config = &state.config;
    Ok(Json(CheckEnvResponse {
        backend_kind: config.backend.kind.clone(),
        backend_url: config.backend.url.clone(),
        settle_ms: config.scheduler.settle_ms,
        histogram_bins: config.analysis.histogram_bins,
    }))
}

// =============================================================================
// Session state
// =============================================================================

/// GET /v1/session
pub async fn get_session(State(state): State<AppState>) -> HandlerResult<DashboardState> {
    Ok(Json(state.machine.snapshot()))
}

/// GET /v1/session/events
///
/// Server-sent events: the current snapshot, then one `state` event per
/// revision. Revisions that land while a client is slow are coalesced.
pub async fn stream_session(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let machine = state.machine.clone();
    let mut revisions = machine.subscribe();

    let stream = async_stream::stream! {
        loop {
            let snapshot = machine.snapshot();
            let data = serde_json::to_string(&snapshot).unwrap_or_default();
            yield Ok(Event::default()
                .event("state")
                .id(snapshot.revision.to_string())
                .data(data));

            if revisions.changed().await.is_err() {
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// POST /v1/session/discover
pub async fn discover(State(state): State<AppState>) -> HandlerResult<DashboardState> {
    state.machine.discover_columns().await?;
    Ok(Json(state.machine.snapshot()))
}

/// GET /v1/session/alerts
///
/// Pending alerts. Reading them acknowledges them.
pub async fn take_alerts(State(state): State<AppState>) -> HandlerResult<Vec<Alert>> {
    Ok(Json(state.machine.take_alerts()))
}

// =============================================================================
// Query editing
// =============================================================================

/// POST /v1/session/pattern
pub async fn select_pattern(
    State(state): State<AppState>,
    Json(request): Json<SelectPatternRequest>,
) -> HandlerResult<CommitResponse> {
    let id = PatternId::new(request.pattern_id);
    info!(pattern = %id, "selecting preset pattern");
    let status = state.machine.select_pattern(id).await?;
    Ok(Json(CommitResponse::new(status, state.machine.snapshot())))
}

/// PUT /v1/session/sliders
pub async fn set_sliders(
    State(state): State<AppState>,
    Json(request): Json<SetSlidersRequest>,
) -> HandlerResult<EditResponse> {
    let changed = state.machine.set_sliders(request.sliders);
    Ok(Json(EditResponse {
        changed,
        session: state.machine.snapshot(),
    }))
}

/// POST /v1/session/sliders
pub async fn add_slider(
    State(state): State<AppState>,
    Json(request): Json<AddSliderRequest>,
) -> HandlerResult<EditResponse> {
    let changed = state.machine.add_slider(&request.name);
    Ok(Json(EditResponse {
        changed,
        session: state.machine.snapshot(),
    }))
}

/// PATCH /v1/session/sliders/{name}
pub async fn update_slider(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<UpdateSliderRequest>,
) -> HandlerResult<EditResponse> {
    if !state.machine.update_slider(&name, request.value) {
        return Err(AppError::NotFound(format!("No slider named {}", name)));
    }
    Ok(Json(EditResponse {
        changed: true,
        session: state.machine.snapshot(),
    }))
}

/// DELETE /v1/session/sliders/{name}
pub async fn remove_slider(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> HandlerResult<EditResponse> {
    if !state.machine.remove_slider(&name) {
        return Err(AppError::NotFound(format!("No slider named {}", name)));
    }
    Ok(Json(EditResponse {
        changed: true,
        session: state.machine.snapshot(),
    }))
}

/// PUT /v1/session/treatment
pub async fn set_treatment(
    State(state): State<AppState>,
    Json(request): Json<ColumnRequest>,
) -> HandlerResult<DashboardState> {
    let snapshot = state.machine.snapshot();
    if !snapshot.columns.is_empty() && !snapshot.columns.contains(&request.column) {
        return Err(AppError::BadRequest(format!(
            "Unknown column {}",
            request.column
        )));
    }
    state.machine.set_treatment_column(&request.column);
    Ok(Json(state.machine.snapshot()))
}

/// PUT /v1/session/control
pub async fn set_control(
    State(state): State<AppState>,
    Json(request): Json<ColumnRequest>,
) -> HandlerResult<DashboardState> {
    state.machine.set_control_variable(&request.column);
    Ok(Json(state.machine.snapshot()))
}

/// PUT /v1/session/ranges/active
pub async fn set_active_range(
    State(state): State<AppState>,
    Json(request): Json<RangeRequest>,
) -> HandlerResult<DashboardState> {
    state.machine.set_active_range(request.range);
    Ok(Json(state.machine.snapshot()))
}

/// PUT /v1/session/ranges/inactive
pub async fn set_inactive_range(
    State(state): State<AppState>,
    Json(request): Json<RangeRequest>,
) -> HandlerResult<DashboardState> {
    state.machine.set_inactive_range(request.range);
    Ok(Json(state.machine.snapshot()))
}

// =============================================================================
// Analysis
// =============================================================================

/// POST /v1/session/analysis
///
/// Runs the full analysis and cross-validation and waits for both.
pub async fn run_analysis(State(state): State<AppState>) -> HandlerResult<AnalysisRunResponse> {
    let outcome = state.machine.run_analysis().await;
    debug!(?outcome, "analysis finished");
    Ok(Json(AnalysisRunResponse::new(
        outcome,
        state.machine.snapshot(),
    )))
}

/// POST /v1/session/highlight
pub async fn highlight_county(
    State(state): State<AppState>,
    Json(request): Json<HighlightRequest>,
) -> HandlerResult<DashboardState> {
    state.machine.highlight_county(request.county_id);
    Ok(Json(state.machine.snapshot()))
}

/// DELETE /v1/session/highlight
pub async fn clear_highlight(State(state): State<AppState>) -> HandlerResult<DashboardState> {
    state.machine.clear_highlight();
    Ok(Json(state.machine.snapshot()))
}

/// GET /v1/session/histogram?bins=&negativeInactive=
pub async fn get_histogram(
    State(state): State<AppState>,
    Query(query): Query<HistogramQuery>,
) -> HandlerResult<HistogramResponse> {
    let snapshot = state.machine.snapshot();
    let analysis = require_analysis(&snapshot)?;

    let bin_count = query.bins.unwrap_or(state.config.analysis.histogram_bins);
    if bin_count == 0 {
        return Err(AppError::BadRequest("bins must be positive".to_string()));
    }
    let options = BinOptions {
        bin_count,
        negative_inactive: query.negative_inactive,
        highlight_active: snapshot.highlighted.as_ref().map(|h| h.active_value),
        highlight_inactive: snapshot.highlighted.as_ref().map(|h| h.inactive_value),
    };

    let histogram = &analysis.histogram;
    Ok(Json(HistogramResponse {
        histogram: bin_histogram(&histogram.inactive_values, &histogram.active_values, &options),
        cleaned_conditions: histogram.cleaned_conditions.clone(),
    }))
}

/// GET /v1/session/statistics
pub async fn get_statistics(State(state): State<AppState>) -> HandlerResult<StatisticsResponse> {
    let snapshot = state.machine.snapshot();
    let analysis = require_analysis(&snapshot)?;

    let statistics = compute_summary_statistics(&analysis.histogram);
    Ok(Json(StatisticsResponse {
        checks: metric_checks(&statistics, snapshot.k_fold_score),
        statistics,
        k_fold_score: snapshot.k_fold_score,
        inactive: describe(&analysis.histogram.inactive_values),
        active: describe(&analysis.histogram.active_values),
    }))
}

/// GET /v1/session/map?mode=
pub async fn get_map(
    State(state): State<AppState>,
    Query(query): Query<MapQuery>,
) -> HandlerResult<MapResponse> {
    let mode = match query.mode.as_deref() {
        Some(mode) => mode.parse::<MapViewMode>().map_err(AppError::BadRequest)?,
        None => MapViewMode::default(),
    };
    let snapshot = state.machine.snapshot();
    Ok(Json(MapResponse {
        view: map_view(mode, &snapshot.geomap),
        counts: county_counts(&snapshot.geomap),
    }))
}

/// GET /v1/session/counties?filter=&sort=&desc=&page=&pageSize=
pub async fn get_counties(
    State(state): State<AppState>,
    Query(query): Query<CountiesQuery>,
) -> HandlerResult<CountyPage> {
    let sort = query
        .sort
        .as_deref()
        .map(str::parse::<CountyColumn>)
        .transpose()
        .map_err(AppError::BadRequest)?;
    let page_size = query.page_size.unwrap_or(COUNTY_PAGE_SIZE);
    if page_size == 0 {
        return Err(AppError::BadRequest("pageSize must be positive".to_string()));
    }

    let snapshot = state.machine.snapshot();
    let analysis = require_analysis(&snapshot)?;
    let table = CountyTableQuery {
        filter: query.filter,
        sort,
        descending: query.desc,
        page: query.page.unwrap_or(1),
        page_size,
    };
    Ok(Json(county_table(county_rows(analysis), &table)))
}

/// GET /v1/session/features
pub async fn get_features(State(state): State<AppState>) -> HandlerResult<FeaturesResponse> {
    let snapshot = state.machine.snapshot();
    let analysis = require_analysis(&snapshot)?;
    let features = analysis
        .histogram
        .feature_importance
        .as_ref()
        .map(sorted_feature_importance)
        .unwrap_or_default();
    Ok(Json(FeaturesResponse { features }))
}

/// GET /v1/session/features/{column}?logScale=
pub async fn get_feature_histogram(
    State(state): State<AppState>,
    Path(column): Path<String>,
    Query(query): Query<FeatureQuery>,
) -> HandlerResult<Vec<FeatureHistogramBin>> {
    let snapshot = state.machine.snapshot();
    let analysis = require_analysis(&snapshot)?;
    let histogram = &analysis.histogram;

    let filtered = histogram
        .column_histograms
        .as_ref()
        .and_then(|h| h.get(&column))
        .ok_or_else(|| AppError::NotFound(format!("No histogram for feature {}", column)))?;
    let full = histogram
        .full_column_histograms
        .as_ref()
        .and_then(|h| h.get(&column));

    Ok(Json(feature_histogram(filtered, full, query.log_scale)))
}

// =============================================================================
// Data files
// =============================================================================

/// GET /v1/files?type=
pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<FilesQuery>,
) -> HandlerResult<FilesResponse> {
    let files = state.machine.list_data_files(query.kind.as_deref()).await?;
    Ok(Json(FilesResponse { files }))
}

/// POST /v1/files/upload
///
/// Multipart form with a `file` part and a `type` field (`main` or `pattern`).
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> HandlerResult<UploadReceipt> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut kind: Option<DataFileKind> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file: {}", e)))?;
                file = Some((name, bytes.to_vec()));
            }
            Some("type") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid type field: {}", e)))?;
                kind = Some(text.parse().map_err(AppError::BadRequest)?);
            }
            _ => {}
        }
    }

    let (file_name, bytes) = file
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| AppError::BadRequest("No file selected".to_string()))?;
    let kind = kind.ok_or_else(|| AppError::BadRequest("File type is required".to_string()))?;

    info!(file = %file_name, kind = %kind, size = bytes.len(), "uploading data file");
    let receipt = state
        .machine
        .upload_data_file(DataFileUpload {
            file_name,
            kind,
            bytes,
        })
        .await?;
    Ok(Json(receipt))
}

/// POST /v1/files/reload
pub async fn reload_files(
    State(state): State<AppState>,
    Json(selection): Json<DataFileSelection>,
) -> HandlerResult<DashboardState> {
    if selection.main_file.trim().is_empty() {
        return Err(AppError::BadRequest("Main file name is required".to_string()));
    }
    state.machine.change_data_files(selection).await?;
    Ok(Json(state.machine.snapshot()))
}
