//! The pattern state machine.
//!
//! [`PatternStateMachine`] owns the canonical [`Query`] and every field
//! derived from backend responses. All mutation goes through one update path
//! (a single write lock, bumping the revision and notifying subscribers), and
//! every asynchronous result is checked against the identity of the request
//! that produced it before it is committed:
//!
//! - preset lookups against the selected pattern id and the data epoch
//! - full analyses against the analysis sequence and the data epoch
//! - map-only fetches against the scheduler's dispatch sequence

use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::snapshot::{Alert, AlertLevel, AnalysisPhase, DashboardState, MapPhase, PatternPhase};
use crate::config::DashboardConfig;
use crate::gateway::{AnalysisBackend, GatewayResult};
use crate::models::{
    constraints_from_sliders, default_ranges_for, generate_sliders, normalize_range,
    slider_for_column, AnalysisResult, CountyId, CrossValidation, DataFileSelection,
    DataFileUpload, GeomapSelection, HighlightedCounty, PatternId, PresetPattern, Query, Range,
    SliderConfig, UploadReceipt,
};
use crate::scheduler::{
    DebouncedScheduler, Generation, MapOutcome, MapSink, MapTicket, ScheduleOutcome,
};

pub const NO_RECORDS_NOTICE: &str = "No counties match the selected pattern.";
pub const OVERLAP_NOTICE: &str =
    "Active and inactive ranges overlap. Adjust them before running the analysis.";

/// Position of the first treatment column in the county table.
const FIRST_TREATMENT_COLUMN: usize = 27;

/// Tunables for [`PatternStateMachine`].
#[derive(Debug, Clone)]
pub struct MachineOptions {
    pub settle: Duration,
    pub default_treatment: Option<String>,
    pub default_control: Option<String>,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(300),
            default_treatment: None,
            default_control: None,
        }
    }
}

impl From<&DashboardConfig> for MachineOptions {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            settle: config.scheduler.settle(),
            default_treatment: config.analysis.default_treatment.clone(),
            default_control: config.analysis.default_control.clone(),
        }
    }
}

/// Whether an asynchronous result made it into the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    Committed,
    /// A newer request (or a data reload) superseded it.
    Stale,
}

/// How one channel of an analysis run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutcome {
    Committed,
    Empty,
    Failed(String),
    Stale,
}

/// Result of [`PatternStateMachine::run_analysis`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// Ranges overlap; nothing was sent.
    Blocked,
    Finished {
        analysis: ChannelOutcome,
        cross_validation: ChannelOutcome,
    },
}

/// Pick the outcome column shown next to the analysis.
///
/// Order of preference: the configured column, `delta_death_rate`, any
/// `death-rate` column, any `rate` column, the last column.
pub fn default_control_variable(columns: &[String], configured: Option<&str>) -> Option<String> {
    if let Some(configured) = configured {
        if columns.iter().any(|c| c == configured) {
            return Some(configured.to_string());
        }
    }
    columns
        .iter()
        .find(|c| c.as_str() == "delta_death_rate")
        .or_else(|| columns.iter().find(|c| c.contains("death-rate")))
        .or_else(|| columns.iter().find(|c| c.contains("rate")))
        .or_else(|| columns.last())
        .cloned()
}

/// Pick the treatment column after discovery: the configured one if the table
/// has it, otherwise the first treatment column of a full county table.
pub fn default_treatment_column(columns: &[String], configured: Option<&str>) -> Option<String> {
    if let Some(configured) = configured {
        if columns.iter().any(|c| c == configured) {
            return Some(configured.to_string());
        }
    }
    if columns.len() > FIRST_TREATMENT_COLUMN {
        return columns.get(FIRST_TREATMENT_COLUMN).cloned();
    }
    None
}

struct Shared {
    state: RwLock<DashboardState>,
    analysis_seq: Generation,
    revisions: watch::Sender<u64>,
}

impl Shared {
    fn snapshot(&self) -> DashboardState {
        self.state.read().clone()
    }

    fn update<R>(&self, f: impl FnOnce(&mut DashboardState) -> R) -> R {
        let mut state = self.state.write();
        let out = f(&mut state);
        state.revision += 1;
        let revision = state.revision;
        drop(state);
        self.revisions.send_replace(revision);
        out
    }

    /// Apply `f` only if `guard` still holds under the write lock.
    fn update_if<R>(
        &self,
        guard: impl FnOnce(&DashboardState) -> bool,
        f: impl FnOnce(&mut DashboardState) -> R,
    ) -> Option<R> {
        let mut state = self.state.write();
        if !guard(&state) {
            return None;
        }
        let out = f(&mut state);
        state.revision += 1;
        let revision = state.revision;
        drop(state);
        self.revisions.send_replace(revision);
        Some(out)
    }

    fn alert(&self, level: AlertLevel, message: String) {
        self.update(|s| s.alerts.push(Alert::new(level, message)));
    }
}

impl MapSink for Shared {
    fn overlap_changed(&self, overlapping: bool) {
        self.update_if(
            |s| s.range_overlap != overlapping,
            |s| s.range_overlap = overlapping,
        );
    }

    fn map_dispatched(&self, ticket: &MapTicket, _query: &Query) {
        self.update_if(
            |s| s.epoch == ticket.epoch(),
            |s| s.map_phase = MapPhase::Pending,
        );
    }

    fn map_settled(&self, ticket: MapTicket, query: Query, outcome: MapOutcome) {
        let committed = self.update_if(
            |s| s.epoch == ticket.epoch() && ticket.is_current(),
            |s| {
                match outcome {
                    MapOutcome::Selection(selection) => {
                        s.geomap = selection;
                        if s.notice.as_deref() == Some(NO_RECORDS_NOTICE) {
                            s.notice = None;
                        }
                    }
                    MapOutcome::Empty => {
                        s.geomap = GeomapSelection::empty();
                        s.notice = Some(NO_RECORDS_NOTICE.to_string());
                    }
                    // Swallowed: the map just shows nothing.
                    MapOutcome::Failed(_) => s.geomap = GeomapSelection::empty(),
                }
                s.map_query = Some(query);
                s.map_phase = MapPhase::Ready;
            },
        );
        if committed.is_none() {
            debug!("map-only #{} dropped at commit", ticket.seq());
        }
    }
}

/// Orchestrator of one dashboard session.
///
/// Cloning is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct PatternStateMachine {
    shared: Arc<Shared>,
    backend: Arc<dyn AnalysisBackend>,
    scheduler: DebouncedScheduler,
    options: Arc<MachineOptions>,
}

impl PatternStateMachine {
    pub fn new(backend: Arc<dyn AnalysisBackend>, options: MachineOptions) -> Self {
        let (revisions, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            state: RwLock::new(DashboardState::default()),
            analysis_seq: Generation::new(),
            revisions,
        });
        let sink: Arc<dyn MapSink> = shared.clone();
        let scheduler = DebouncedScheduler::new(backend.clone(), sink, options.settle);

        Self {
            shared,
            backend,
            scheduler,
            options: Arc::new(options),
        }
    }

    pub fn with_config(backend: Arc<dyn AnalysisBackend>, config: &DashboardConfig) -> Self {
        Self::new(backend, MachineOptions::from(config))
    }

    pub fn backend(&self) -> &Arc<dyn AnalysisBackend> {
        &self.backend
    }

    pub fn scheduler(&self) -> &DebouncedScheduler {
        &self.scheduler
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> DashboardState {
        self.shared.snapshot()
    }

    /// Receiver that sees the latest revision number after every change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revisions.subscribe()
    }

    /// Remove and return pending alerts.
    pub fn take_alerts(&self) -> Vec<Alert> {
        self.shared.update(|s| std::mem::take(&mut s.alerts))
    }

    pub async fn health_check(&self) -> bool {
        match self.backend.health_check().await {
            Ok(healthy) => healthy,
            Err(err) => {
                warn!("backend health check failed: {}", err);
                false
            }
        }
    }

    // ==================== Discovery ====================

    /// Fetch columns and column ranges, then pick default control and
    /// treatment columns if none are set.
    pub async fn discover_columns(&self) -> GatewayResult<()> {
        let epoch = self.shared.snapshot().epoch;
        let (columns, ranges) = tokio::join!(
            self.backend.fetch_columns(),
            self.backend.fetch_column_ranges()
        );

        let columns = match columns {
            Ok(columns) => columns,
            Err(err) => {
                warn!("column discovery failed: {}", err);
                self.shared.update_if(
                    |s| s.epoch == epoch,
                    |s| s.error = Some(format!("Failed to load columns: {}", err.message())),
                );
                return Err(err);
            }
        };
        // Without fresh ranges the ones already loaded stay in place.
        let ranges = match ranges {
            Ok(ranges) => Some(ranges),
            Err(err) => {
                warn!("column range discovery failed: {}", err);
                self.shared.update_if(
                    |s| s.epoch == epoch,
                    |s| {
                        s.error = Some(format!("Failed to load column ranges: {}", err.message()))
                    },
                );
                None
            }
        };

        let options = self.options.clone();
        let committed = self.shared.update_if(
            |s| s.epoch == epoch,
            move |s| {
                if s.control_variable.is_none() {
                    s.control_variable =
                        default_control_variable(&columns, options.default_control.as_deref());
                }
                if let Some(ranges) = ranges {
                    s.column_ranges = ranges;
                }
                if s.query.treatment_column.is_empty() {
                    if let Some(treatment) =
                        default_treatment_column(&columns, options.default_treatment.as_deref())
                    {
                        let defaults = default_ranges_for(&treatment, &s.column_ranges);
                        s.query.treatment_column = treatment;
                        s.query.active_range = defaults.active;
                        s.query.inactive_range = defaults.inactive;
                        s.range_overlap = false;
                    }
                }
                info!("discovered {} columns", columns.len());
                s.columns = columns;
            },
        );
        if committed.is_none() {
            debug!("column discovery from epoch {} dropped", epoch);
        }
        Ok(())
    }

    // ==================== Preset patterns ====================

    /// Load a preset pattern and derive sliders, constraints and ranges from
    /// it. A response for a pattern that is no longer selected is discarded.
    pub async fn select_pattern(&self, id: PatternId) -> GatewayResult<CommitStatus> {
        let epoch = self.shared.update(|s| {
            s.selected_pattern = Some(id);
            s.pattern_phase = PatternPhase::ConstraintsLoading;
            s.error = None;
            s.epoch
        });
        debug!("preset {} requested", id);

        let result = self.backend.fetch_preset_pattern(id).await;
        let is_current = |s: &DashboardState| s.epoch == epoch && s.selected_pattern == Some(id);

        match result {
            Ok(preset) => match self.shared.update_if(is_current, |s| apply_preset(s, preset)) {
                Some(()) => {
                    info!("preset {} applied", id);
                    self.schedule_map();
                    Ok(CommitStatus::Committed)
                }
                None => {
                    debug!("preset {} discarded: selection moved on", id);
                    Ok(CommitStatus::Stale)
                }
            },
            Err(err) => {
                let committed = self.shared.update_if(is_current, |s| {
                    s.query.constraints = None;
                    s.sliders.clear();
                    s.selected_pattern = None;
                    s.pattern_phase = PatternPhase::Idle;
                    s.error = Some(format!("Could not load pattern {}: {}", id, err.message()));
                });
                match committed {
                    Some(()) => {
                        warn!("preset {} failed: {}", id, err);
                        Err(err)
                    }
                    None => Ok(CommitStatus::Stale),
                }
            }
        }
    }

    // ==================== Query editing ====================

    /// Replace all sliders. The treatment column never gets one.
    pub fn set_sliders(&self, sliders: Vec<SliderConfig>) -> bool {
        self.edit_sliders(|current, treatment, _| {
            *current = sliders
                .into_iter()
                .filter(|slider| slider.name != treatment)
                .collect();
            true
        })
    }

    /// Add a slider sized from the column ranges. Ignored for the treatment
    /// column and for columns that already have one.
    pub fn add_slider(&self, name: &str) -> bool {
        self.edit_sliders(|current, treatment, state| {
            if name == treatment || current.iter().any(|slider| slider.name == name) {
                return false;
            }
            current.push(slider_for_column(name, &state.column_ranges));
            true
        })
    }

    /// Move a slider's handles. Values are ordered and clamped to its extent.
    pub fn update_slider(&self, name: &str, value: [f64; 2]) -> bool {
        self.edit_sliders(|current, _, _| match current.iter_mut().find(|s| s.name == name) {
            Some(slider) => {
                slider.set_value(value[0], value[1]);
                true
            }
            None => false,
        })
    }

    pub fn remove_slider(&self, name: &str) -> bool {
        self.edit_sliders(|current, _, _| {
            let before = current.len();
            current.retain(|slider| slider.name != name);
            current.len() != before
        })
    }

    /// Run a slider edit, rebuild the constraint from the sliders and
    /// schedule a map refresh if anything changed.
    fn edit_sliders(
        &self,
        edit: impl FnOnce(&mut Vec<SliderConfig>, &str, &DashboardState) -> bool,
    ) -> bool {
        let changed = self.shared.update(|s| {
            let mut sliders = std::mem::take(&mut s.sliders);
            let treatment = s.query.treatment_column.clone();
            let changed = edit(&mut sliders, &treatment, s);
            s.sliders = sliders;
            if changed {
                s.query.constraints = Some(constraints_from_sliders(&s.sliders));
            }
            changed
        });
        if changed {
            self.schedule_map();
        }
        changed
    }

    /// Switch the treatment column and reset both ranges to its defaults.
    pub fn set_treatment_column(&self, column: &str) {
        self.shared.update(|s| {
            let defaults = default_ranges_for(column, &s.column_ranges);
            s.query.treatment_column = column.to_string();
            s.query.active_range = defaults.active;
            s.query.inactive_range = defaults.inactive;
            s.range_overlap = false;

            let before = s.sliders.len();
            s.sliders.retain(|slider| slider.name != column);
            if s.sliders.len() != before {
                s.query.constraints = Some(constraints_from_sliders(&s.sliders));
            }
        });
        self.schedule_map();
    }

    pub fn set_active_range(&self, range: Range) {
        self.set_range(range, true);
    }

    pub fn set_inactive_range(&self, range: Range) {
        self.set_range(range, false);
    }

    fn set_range(&self, range: Range, active: bool) {
        self.shared.update(|s| {
            let bounds = s.column_ranges.get(&s.query.treatment_column).copied();
            let range = normalize_range(range.low, range.high, bounds);
            if active {
                s.query.active_range = range;
            } else {
                s.query.inactive_range = range;
            }
            s.range_overlap = s.query.ranges_overlap();
            if !s.range_overlap && s.notice.as_deref() == Some(OVERLAP_NOTICE) {
                s.notice = None;
            }
        });
        self.schedule_map();
    }

    pub fn set_control_variable(&self, column: &str) {
        self.shared
            .update(|s| s.control_variable = Some(column.to_string()));
    }

    /// Hand the current query to the scheduler if it has constraints.
    fn schedule_map(&self) -> Option<ScheduleOutcome> {
        let (query, epoch) = {
            let state = self.shared.state.read();
            state.query.constraints.as_ref()?;
            (state.query.clone(), state.epoch)
        };
        Some(self.scheduler.schedule(query, epoch))
    }

    // ==================== Analysis ====================

    /// Snapshot the query and run the full analysis and cross-validation
    /// concurrently. Each commits on its own as soon as it resolves; the
    /// latest submission wins.
    pub async fn run_analysis(&self) -> AnalysisOutcome {
        let submitted = self.shared.update(|s| {
            if s.query.ranges_overlap() {
                s.range_overlap = true;
                s.notice = Some(OVERLAP_NOTICE.to_string());
                return None;
            }
            s.analysis_phase = AnalysisPhase::Pending;
            s.k_fold_score = None;
            s.notice = None;
            let seq = self.shared.analysis_seq.advance();
            Some((s.query.clone(), s.epoch, seq))
        });
        let (query, epoch, seq) = match submitted {
            Some(submitted) => submitted,
            None => {
                info!("analysis blocked: ranges overlap");
                return AnalysisOutcome::Blocked;
            }
        };
        info!("analysis #{} submitted for {}", seq, query.fingerprint());

        let analysis = async {
            let result = self.backend.fetch_full_analysis(&query).await;
            self.commit_analysis(seq, epoch, &query, result)
        };
        let cross_validation = async {
            let result = self.backend.fetch_cross_validation(&query).await;
            self.commit_cross_validation(seq, epoch, result)
        };
        let (analysis, cross_validation) = tokio::join!(analysis, cross_validation);

        AnalysisOutcome::Finished {
            analysis,
            cross_validation,
        }
    }

    fn is_latest_analysis(&self, seq: u64, epoch: u64) -> impl FnOnce(&DashboardState) -> bool + '_ {
        move |s: &DashboardState| s.epoch == epoch && self.shared.analysis_seq.is_current(seq)
    }

    fn commit_analysis(
        &self,
        seq: u64,
        epoch: u64,
        query: &Query,
        result: GatewayResult<AnalysisResult>,
    ) -> ChannelOutcome {
        let guard = self.is_latest_analysis(seq, epoch);
        let outcome = match result {
            Ok(result) => self
                .shared
                .update_if(guard, |s| {
                    s.geomap = result.geomap.clone();
                    s.map_query = Some(query.clone());
                    s.map_phase = MapPhase::Ready;
                    s.analysis = Some(result);
                    s.analysis_query = Some(query.clone());
                    s.analysis_phase = AnalysisPhase::Ready;
                    s.highlighted = None;
                    s.error = None;
                })
                .map(|_| ChannelOutcome::Committed),
            Err(err) if err.is_empty_selection() => self
                .shared
                .update_if(guard, |s| {
                    s.geomap = GeomapSelection::empty();
                    s.map_query = Some(query.clone());
                    s.notice = Some(NO_RECORDS_NOTICE.to_string());
                    s.analysis_phase = if s.analysis.is_some() {
                        AnalysisPhase::Ready
                    } else {
                        AnalysisPhase::NotRun
                    };
                })
                .map(|_| ChannelOutcome::Empty),
            Err(err) => {
                let message = format!("Analysis failed: {}", err.message());
                self.shared
                    .update_if(guard, |s| {
                        s.alerts.push(Alert::new(AlertLevel::Error, message.clone()));
                        s.analysis_phase = AnalysisPhase::Failed;
                    })
                    .map(|_| {
                        warn!("analysis #{} failed: {}", seq, err);
                        ChannelOutcome::Failed(message)
                    })
            }
        };
        outcome.unwrap_or_else(|| {
            debug!("analysis #{} dropped: superseded", seq);
            ChannelOutcome::Stale
        })
    }

    fn commit_cross_validation(
        &self,
        seq: u64,
        epoch: u64,
        result: GatewayResult<CrossValidation>,
    ) -> ChannelOutcome {
        let guard = self.is_latest_analysis(seq, epoch);
        let outcome = match result {
            Ok(cv) => self
                .shared
                .update_if(guard, |s| s.k_fold_score = Some(cv.k_fold_normalized_rmse))
                .map(|_| ChannelOutcome::Committed),
            Err(err) if err.is_empty_selection() => {
                self.shared.update_if(guard, |_| ()).map(|_| ChannelOutcome::Empty)
            }
            Err(err) => {
                let message = format!("Cross-validation failed: {}", err.message());
                self.shared
                    .update_if(guard, |s| {
                        s.alerts.push(Alert::new(AlertLevel::Error, message.clone()));
                    })
                    .map(|_| {
                        warn!("cross-validation #{} failed: {}", seq, err);
                        ChannelOutcome::Failed(message)
                    })
            }
        };
        outcome.unwrap_or(ChannelOutcome::Stale)
    }

    // ==================== County highlighting ====================

    /// Resolve a clicked county against the last analysis. Unknown counties
    /// clear the highlight.
    pub fn highlight_county(&self, county_id: CountyId) -> Option<HighlightedCounty> {
        self.shared.update(|s| {
            let found = s
                .analysis
                .as_ref()
                .and_then(|analysis| locate_county(analysis, county_id));
            s.highlighted = found.clone();
            found
        })
    }

    pub fn clear_highlight(&self) {
        self.shared.update(|s| s.highlighted = None);
    }

    // ==================== Data files ====================

    pub async fn list_data_files(&self, extension: Option<&str>) -> GatewayResult<Vec<String>> {
        self.backend.list_files(extension).await
    }

    pub async fn upload_data_file(&self, upload: DataFileUpload) -> GatewayResult<UploadReceipt> {
        let file_name = upload.file_name.clone();
        self.backend.upload_file(upload).await.map_err(|err| {
            self.shared.alert(
                AlertLevel::Error,
                format!("Failed to upload {}: {}", file_name, err.message()),
            );
            err
        })
    }

    /// Ask the backend to load other files, then start over.
    pub async fn change_data_files(&self, selection: DataFileSelection) -> GatewayResult<()> {
        if let Err(err) = self.backend.reload_data(&selection).await {
            self.shared.alert(
                AlertLevel::Error,
                format!("Failed to reload data: {}", err.message()),
            );
            return Err(err);
        }
        info!("backend reloaded {}", selection.main_file);
        self.data_files_changed().await
    }

    /// Forget everything derived from the old data and rediscover columns.
    /// In-flight results of every channel are orphaned.
    pub async fn data_files_changed(&self) -> GatewayResult<()> {
        self.scheduler.invalidate();
        self.backend.invalidate_cache();
        self.shared.analysis_seq.advance();
        let epoch = self.shared.update(|s| {
            let next = s.epoch + 1;
            *s = s.reset_for_epoch(next);
            next
        });
        info!("data files changed, now at epoch {}", epoch);
        self.discover_columns().await
    }
}

fn apply_preset(s: &mut DashboardState, preset: PresetPattern) {
    let treatment = if preset.treatment_column.is_empty() {
        s.query.treatment_column.clone()
    } else {
        preset.treatment_column
    };

    s.sliders = generate_sliders(&preset.constraints, &preset.constraint_bounds, &treatment);
    s.query.constraints = Some(preset.constraints);

    let defaults = default_ranges_for(&treatment, &s.column_ranges);
    s.query.treatment_column = treatment;
    s.query.active_range = defaults.active;
    s.query.inactive_range = defaults.inactive;
    s.range_overlap = false;

    s.geomap = GeomapSelection {
        all_indices: preset.counties_indices,
        ..GeomapSelection::empty()
    };
    s.map_query = Some(s.query.clone());
    s.map_phase = MapPhase::Ready;
    s.highlighted = None;
    s.notice = None;
    s.pattern_phase = PatternPhase::ConstraintsReady;
}

fn locate_county(analysis: &AnalysisResult, county_id: CountyId) -> Option<HighlightedCounty> {
    analysis.county_at(analysis.geomap.position_of(county_id)?)
}

impl std::fmt::Debug for PatternStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("PatternStateMachine")
            .field("revision", &state.revision)
            .field("epoch", &state.epoch)
            .field("pattern_phase", &state.pattern_phase)
            .field("analysis_phase", &state.analysis_phase)
            .finish()
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
