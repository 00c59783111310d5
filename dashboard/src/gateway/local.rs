//! In-memory backend implementation.
//!
//! [`LocalBackend`] answers every gateway operation from county records held
//! in memory. Filtering and banding follow the statistical backend's rules
//! (inclusive bounds, records outside both bands excluded from the band sets);
//! the modeling outputs are deterministic stand-ins. Tests use it to inject
//! failures, script per-call latency and inspect which calls were made.

use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use super::error::{GatewayError, GatewayResult};
use super::AnalysisBackend;
use crate::models::{
    AnalysisResult, ColumnHistogram, ColumnRange, ColumnRanges, CountyId, CrossValidation,
    DataFileSelection, DataFileUpload, FeatureImportance, GeomapSelection, HistogramResult,
    PatternId, PresetPattern, Query, TestScores, UploadReceipt,
};

const FEATURE_HISTOGRAM_BINS: usize = 10;

/// One county row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyRecord {
    pub fips: CountyId,
    pub county: String,
    pub state: String,
    pub values: BTreeMap<String, f64>,
}

impl CountyRecord {
    pub fn new(fips: CountyId, county: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            fips,
            county: county.into(),
            state: state.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, column: impl Into<String>, value: f64) -> Self {
        self.values.insert(column.into(), value);
        self
    }
}

/// Gateway operations, as recorded in the call log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LocalOperation {
    Health,
    Columns,
    ColumnRanges,
    PresetPattern,
    MapOnly,
    FullAnalysis,
    CrossValidation,
    ListFiles,
    Upload,
    Reload,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalCall {
    pub operation: LocalOperation,
    pub query: Option<Query>,
    pub pattern: Option<PatternId>,
}

struct LocalData {
    columns: Vec<String>,
    records: Vec<CountyRecord>,
    presets: HashMap<PatternId, PresetPattern>,
    files: Vec<String>,

    // Modeling stand-ins
    outcome_column: String,
    treatment_effect: f64,
    test_scores: TestScores,
    feature_importance: Option<FeatureImportance>,
    k_fold_nrmse: f64,

    // Test hooks
    failures: HashMap<LocalOperation, GatewayError>,
    latencies: HashMap<LocalOperation, VecDeque<Duration>>,
    calls: Vec<LocalCall>,
    log_calls: bool,
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            records: Vec::new(),
            presets: HashMap::new(),
            files: Vec::new(),
            outcome_column: "delta_death_rate".to_string(),
            treatment_effect: 0.0,
            test_scores: TestScores::from([1.0, 1.0, 1.0, 1.0, 0.0]),
            feature_importance: None,
            k_fold_nrmse: 0.15,
            failures: HashMap::new(),
            latencies: HashMap::new(),
            calls: Vec::new(),
            log_calls: true,
            is_healthy: true,
        }
    }
}

/// In-memory [`AnalysisBackend`].
///
/// Cloning shares the underlying data, so a test can keep a handle for
/// assertions while the orchestrator owns another.
///
/// # Example
/// ```
/// use choropleth_dashboard::gateway::{CountyRecord, LocalBackend};
///
/// let backend = LocalBackend::new();
/// backend.add_record(CountyRecord::new(1001, "Autauga", "Alabama").with_value("X", 3.0));
/// assert_eq!(backend.columns(), vec!["X".to_string()]);
/// ```
#[derive(Clone, Default)]
pub struct LocalBackend {
    data: Arc<RwLock<LocalData>>,
}

impl LocalBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop recording calls. For long-running servers, where the log would
    /// only grow.
    pub fn without_call_log(self) -> Self {
        {
            let mut data = self.data.write();
            data.log_calls = false;
            data.calls.clear();
        }
        self
    }

    // ==================== Data setup ====================

    /// Add a county. Columns not seen before are appended to the column list.
    pub fn add_record(&self, record: CountyRecord) {
        let mut data = self.data.write();
        for column in record.values.keys() {
            if !data.columns.contains(column) {
                data.columns.push(column.clone());
            }
        }
        data.records.push(record);
    }

    /// Replace the column order reported by `fetch_columns`.
    pub fn set_columns(&self, columns: Vec<String>) {
        self.data.write().columns = columns;
    }

    pub fn columns(&self) -> Vec<String> {
        self.data.read().columns.clone()
    }

    pub fn add_preset(&self, preset: PresetPattern) {
        self.data.write().presets.insert(preset.id, preset);
    }

    pub fn add_file(&self, name: impl Into<String>) {
        self.data.write().files.push(name.into());
    }

    /// Column whose values stand in for the untreated outcome.
    pub fn set_outcome_column(&self, column: impl Into<String>) {
        self.data.write().outcome_column = column.into();
    }

    /// Constant individual treatment effect added to the outcome.
    pub fn set_treatment_effect(&self, effect: f64) {
        self.data.write().treatment_effect = effect;
    }

    pub fn set_test_scores(&self, scores: TestScores) {
        self.data.write().test_scores = scores;
    }

    pub fn set_feature_importance(&self, importance: FeatureImportance) {
        self.data.write().feature_importance = Some(importance);
    }

    pub fn set_cross_validation(&self, k_fold_nrmse: f64) {
        self.data.write().k_fold_nrmse = k_fold_nrmse;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    // ==================== Test hooks ====================

    /// Make every subsequent call of `operation` fail with `error`.
    pub fn fail(&self, operation: LocalOperation, error: GatewayError) {
        self.data.write().failures.insert(operation, error);
    }

    pub fn clear_failure(&self, operation: LocalOperation) {
        self.data.write().failures.remove(&operation);
    }

    /// Delay the next call of `operation` by `latency`. Delays queue up, one
    /// per call, in push order.
    pub fn push_latency(&self, operation: LocalOperation, latency: Duration) {
        self.data
            .write()
            .latencies
            .entry(operation)
            .or_default()
            .push_back(latency);
    }

    pub fn calls(&self) -> Vec<LocalCall> {
        self.data.read().calls.clone()
    }

    pub fn call_count(&self, operation: LocalOperation) -> usize {
        self.data
            .read()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    /// Queries received by `operation`, oldest first.
    pub fn queries(&self, operation: LocalOperation) -> Vec<Query> {
        self.data
            .read()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .filter_map(|call| call.query.clone())
            .collect()
    }

    // ==================== Internals ====================

    /// Log the call and take its scripted latency and failure. The lock is
    /// released before the caller awaits.
    fn begin(
        &self,
        operation: LocalOperation,
        query: Option<&Query>,
        pattern: Option<PatternId>,
    ) -> (Option<Duration>, Option<GatewayError>) {
        let mut data = self.data.write();
        if data.log_calls {
            data.calls.push(LocalCall {
                operation,
                query: query.cloned(),
                pattern,
            });
        }
        let latency = data
            .latencies
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front());
        let failure = data.failures.get(&operation).cloned();
        (latency, failure)
    }

    async fn enter(
        &self,
        operation: LocalOperation,
        query: Option<&Query>,
        pattern: Option<PatternId>,
    ) -> GatewayResult<()> {
        let (latency, failure) = self.begin(operation, query, pattern);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn filtered<'a>(data: &'a LocalData, query: &Query) -> Vec<&'a CountyRecord> {
        data.records
            .iter()
            .filter(|record| match &query.constraints {
                Some(constraint) => constraint.matches(&record.values),
                None => true,
            })
            .collect()
    }

    fn band(record: &CountyRecord, query: &Query) -> Option<bool> {
        let value = record.values.get(&query.treatment_column)?;
        if query.inactive_range.contains(*value) {
            Some(false)
        } else if query.active_range.contains(*value) {
            Some(true)
        } else {
            None
        }
    }

    fn cleaned_conditions(query: &Query) -> Vec<String> {
        let mut conditions = Vec::new();
        if let Some(constraint) = &query.constraints {
            for (name, bounds) in constraint {
                if bounds.lb.is_finite() {
                    conditions.push(format!("['{}']>={}", name, bounds.lb));
                }
                if bounds.ub.is_finite() {
                    conditions.push(format!("['{}']<={}", name, bounds.ub));
                }
            }
        }
        conditions
    }

    /// 10-bin histograms of `features` over the full-dataset range, for the
    /// whole table and for `subset`.
    fn feature_histograms(
        data: &LocalData,
        subset: &[&CountyRecord],
        features: &[String],
    ) -> (BTreeMap<String, ColumnHistogram>, BTreeMap<String, ColumnHistogram>) {
        let mut full = BTreeMap::new();
        let mut filtered = BTreeMap::new();

        for feature in features {
            let all: Vec<f64> = data
                .records
                .iter()
                .filter_map(|r| r.values.get(feature).copied())
                .collect();
            let picked: Vec<f64> = subset
                .iter()
                .filter_map(|r| r.values.get(feature).copied())
                .collect();
            if all.is_empty() || picked.is_empty() {
                continue;
            }

            let min = all.iter().copied().fold(f64::INFINITY, f64::min);
            let max = all.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let width = (max - min) / FEATURE_HISTOGRAM_BINS as f64;
            let bin_edges: Vec<f64> = (0..=FEATURE_HISTOGRAM_BINS)
                .map(|i| min + width * i as f64)
                .collect();

            let count = |values: &[f64]| -> Vec<f64> {
                let mut counts = vec![0.0; FEATURE_HISTOGRAM_BINS];
                for value in values {
                    let index = if width > 0.0 {
                        (((value - min) / width).floor() as usize).min(FEATURE_HISTOGRAM_BINS - 1)
                    } else {
                        0
                    };
                    counts[index] += 1.0;
                }
                counts
            };

            full.insert(
                feature.clone(),
                ColumnHistogram {
                    counts: count(&all),
                    bin_edges: bin_edges.clone(),
                },
            );
            filtered.insert(
                feature.clone(),
                ColumnHistogram {
                    counts: count(&picked),
                    bin_edges,
                },
            );
        }

        (full, filtered)
    }
}

fn floor4(value: f64) -> f64 {
    (value * 10_000.0).floor() / 10_000.0
}

fn ceil4(value: f64) -> f64 {
    (value * 10_000.0).ceil() / 10_000.0
}

#[async_trait]
impl AnalysisBackend for LocalBackend {
    async fn health_check(&self) -> GatewayResult<bool> {
        self.enter(LocalOperation::Health, None, None).await?;
        Ok(self.data.read().is_healthy)
    }

    async fn fetch_columns(&self) -> GatewayResult<Vec<String>> {
        self.enter(LocalOperation::Columns, None, None).await?;
        Ok(self.columns())
    }

    async fn fetch_column_ranges(&self) -> GatewayResult<ColumnRanges> {
        self.enter(LocalOperation::ColumnRanges, None, None).await?;
        let data = self.data.read();
        let mut ranges = ColumnRanges::new();
        for column in &data.columns {
            let values = data.records.iter().filter_map(|r| r.values.get(column).copied());
            let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
            if min.is_finite() && max.is_finite() {
                ranges.insert(column.clone(), ColumnRange::new(floor4(min), ceil4(max)));
            }
        }
        Ok(ranges)
    }

    async fn fetch_preset_pattern(&self, id: PatternId) -> GatewayResult<PresetPattern> {
        self.enter(LocalOperation::PresetPattern, None, Some(id)).await?;
        self.data
            .read()
            .presets
            .get(&id)
            .cloned()
            .ok_or_else(|| {
                GatewayError::status(404, format!("ID {} not found.", id))
                    .with_operation("fetch_preset_pattern")
            })
    }

    async fn fetch_map_only(&self, query: &Query) -> GatewayResult<GeomapSelection> {
        self.enter(LocalOperation::MapOnly, Some(query), None).await?;
        let data = self.data.read();
        let matching = Self::filtered(&data, query);
        if matching.is_empty() {
            return Err(GatewayError::empty_selection("No counties match the selected constraints")
                .with_operation("fetch_map_only"));
        }

        let mut selection = GeomapSelection::empty();
        for record in matching {
            selection.all_indices.push(record.fips);
            match Self::band(record, query) {
                Some(true) => selection.active_indices.push(record.fips),
                Some(false) => selection.inactive_indices.push(record.fips),
                None => {}
            }
        }
        debug!(
            "map-only {}: {} counties ({} active, {} inactive)",
            query.fingerprint(),
            selection.all_indices.len(),
            selection.active_indices.len(),
            selection.inactive_indices.len()
        );
        Ok(selection)
    }

    async fn fetch_full_analysis(&self, query: &Query) -> GatewayResult<AnalysisResult> {
        self.enter(LocalOperation::FullAnalysis, Some(query), None).await?;
        let data = self.data.read();
        let banded: Vec<(&CountyRecord, bool)> = Self::filtered(&data, query)
            .into_iter()
            .filter_map(|record| Self::band(record, query).map(|active| (record, active)))
            .collect();
        if banded.is_empty() {
            return Err(
                GatewayError::empty_selection("No data available for the selected constraints.")
                    .with_operation("fetch_full_analysis"),
            );
        }

        let mut geomap = GeomapSelection::empty();
        let mut inactive_values = Vec::with_capacity(banded.len());
        let mut active_values = Vec::with_capacity(banded.len());
        for (record, active) in &banded {
            geomap.all_indices.push(record.fips);
            if *active {
                geomap.active_indices.push(record.fips);
            } else {
                geomap.inactive_indices.push(record.fips);
            }
            geomap.county_names.push(record.county.clone());
            geomap.state_names.push(record.state.clone());

            let outcome = record.values.get(&data.outcome_column).copied().unwrap_or(0.0);
            inactive_values.push(outcome);
            active_values.push(outcome + data.treatment_effect);
        }

        let subset: Vec<&CountyRecord> = banded.iter().map(|(record, _)| *record).collect();
        let (full_histograms, filtered_histograms) = match &data.feature_importance {
            Some(importance) => {
                let (full, filtered) =
                    Self::feature_histograms(&data, &subset, &importance.features);
                (Some(full), Some(filtered))
            }
            None => (None, None),
        };

        Ok(AnalysisResult {
            geomap,
            histogram: HistogramResult {
                cleaned_conditions: Self::cleaned_conditions(query),
                inactive_values,
                active_values,
                ite_mean: data.treatment_effect,
                ite_stdev: 0.0,
                test_scores: data.test_scores,
                feature_importance: data.feature_importance.clone(),
                column_histograms: filtered_histograms,
                full_column_histograms: full_histograms,
            },
        })
    }

    async fn fetch_cross_validation(&self, query: &Query) -> GatewayResult<CrossValidation> {
        self.enter(LocalOperation::CrossValidation, Some(query), None).await?;
        Ok(CrossValidation {
            k_fold_normalized_rmse: self.data.read().k_fold_nrmse,
        })
    }

    async fn list_files(&self, extension: Option<&str>) -> GatewayResult<Vec<String>> {
        self.enter(LocalOperation::ListFiles, None, None).await?;
        let data = self.data.read();
        let files = match extension {
            Some(ext) => {
                let suffix = format!(".{}", ext.to_lowercase());
                data.files
                    .iter()
                    .filter(|f| f.to_lowercase().ends_with(&suffix))
                    .cloned()
                    .collect()
            }
            None => data.files.clone(),
        };
        Ok(files)
    }

    async fn upload_file(&self, upload: DataFileUpload) -> GatewayResult<UploadReceipt> {
        self.enter(LocalOperation::Upload, None, None).await?;
        if upload.file_name.is_empty() {
            return Err(GatewayError::status(400, "No file selected").with_operation("upload_file"));
        }
        let mut data = self.data.write();
        if !data.files.contains(&upload.file_name) {
            data.files.push(upload.file_name.clone());
        }
        Ok(UploadReceipt {
            filename: upload.file_name,
            kind: upload.kind.to_string(),
            message: Some("File uploaded successfully".to_string()),
        })
    }

    async fn reload_data(&self, selection: &DataFileSelection) -> GatewayResult<()> {
        self.enter(LocalOperation::Reload, None, None).await?;
        let data = self.data.read();
        let missing = |name: &str| !data.files.iter().any(|f| f == name);

        if selection.main_file.is_empty() {
            return Err(GatewayError::status(400, "Main file name is required")
                .with_operation("reload_data"));
        }
        if missing(&selection.main_file) {
            return Err(GatewayError::status(
                404,
                format!("Main file {} not found in data directory", selection.main_file),
            )
            .with_operation("reload_data"));
        }
        if let Some(pattern_file) = &selection.pattern_file {
            if missing(pattern_file) {
                return Err(GatewayError::status(
                    404,
                    format!("Pattern file {} not found in data directory", pattern_file),
                )
                .with_operation("reload_data"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Constraint, DataFileKind, Range};

    fn backend() -> LocalBackend {
        let backend = LocalBackend::new();
        for (fips, x, law, outcome) in [
            (1001, 1.0, 0.1, 5.0),
            (1003, 3.0, 0.2, 6.0),
            (1005, 5.0, 0.5, 7.0),
            (1007, 7.0, 0.9, 8.0),
            (1009, 9.0, 0.8, 9.0),
        ] {
            backend.add_record(
                CountyRecord::new(fips, format!("County {}", fips), "Alabama")
                    .with_value("X", x)
                    .with_value("lawA", law)
                    .with_value("delta_death_rate", outcome),
            );
        }
        backend
    }

    fn query(constraint: Constraint) -> Query {
        Query {
            constraints: Some(constraint),
            treatment_column: "lawA".to_string(),
            active_range: Range::new(0.0, 0.4),
            inactive_range: Range::new(0.6, 1.0),
        }
    }

    #[tokio::test]
    async fn test_map_only_bands_filtered_counties() {
        let backend = backend();
        let selection = backend
            .fetch_map_only(&query(Constraint::new().with("X", 2.0, 8.0)))
            .await
            .unwrap();

        assert_eq!(selection.all_indices, vec![1003, 1005, 1007]);
        assert_eq!(selection.active_indices, vec![1003]);
        assert_eq!(selection.inactive_indices, vec![1007]);
    }

    #[tokio::test]
    async fn test_map_only_empty_is_typed() {
        let backend = backend();
        let err = backend
            .fetch_map_only(&query(Constraint::new().with("X", 100.0, 200.0)))
            .await
            .unwrap_err();
        assert!(err.is_empty_selection());
    }

    #[tokio::test]
    async fn test_full_analysis_aligns_names_and_values() {
        let backend = backend();
        backend.set_treatment_effect(0.5);
        let result = backend
            .fetch_full_analysis(&query(Constraint::new()))
            .await
            .unwrap();

        // 1005 sits between the bands and is excluded.
        assert_eq!(result.geomap.all_indices, vec![1001, 1003, 1007, 1009]);
        assert_eq!(result.geomap.county_names[2], "County 1007");
        assert_eq!(result.histogram.inactive_values, vec![5.0, 6.0, 8.0, 9.0]);
        assert_eq!(result.histogram.active_values, vec![5.5, 6.5, 8.5, 9.5]);
        assert_eq!(result.histogram.ite_mean, 0.5);
    }

    #[tokio::test]
    async fn test_column_ranges_cover_records() {
        let backend = backend();
        let ranges = backend.fetch_column_ranges().await.unwrap();
        assert_eq!(ranges.get("X"), Some(&ColumnRange::new(1.0, 9.0)));
    }

    #[tokio::test]
    async fn test_injected_failure_and_call_log() {
        let backend = backend();
        backend.fail(LocalOperation::CrossValidation, GatewayError::transport("reset"));

        let q = query(Constraint::new());
        assert!(backend.fetch_cross_validation(&q).await.is_err());
        assert_eq!(backend.queries(LocalOperation::CrossValidation), vec![q]);

        backend.clear_failure(LocalOperation::CrossValidation);
        let cv = backend.fetch_cross_validation(&query(Constraint::new())).await.unwrap();
        assert_eq!(cv.k_fold_normalized_rmse, 0.15);
    }

    #[tokio::test]
    async fn test_call_log_can_be_switched_off() {
        let backend = backend().without_call_log();
        backend.fetch_columns().await.unwrap();
        backend.fetch_map_only(&query(Constraint::new())).await.unwrap();

        assert_eq!(backend.call_count(LocalOperation::Columns), 0);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_latency_delays_one_call() {
        let backend = backend();
        backend.push_latency(LocalOperation::Columns, Duration::from_millis(500));

        let start = tokio::time::Instant::now();
        backend.fetch_columns().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));

        let start = tokio::time::Instant::now();
        backend.fetch_columns().await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_files_upload_list_and_reload() {
        let backend = LocalBackend::new();
        backend
            .upload_file(DataFileUpload {
                file_name: "counties.csv".to_string(),
                kind: DataFileKind::Main,
                bytes: b"FIPS,X\n1001,1\n".to_vec(),
            })
            .await
            .unwrap();
        backend.add_file("notes.txt");

        assert_eq!(backend.list_files(Some("CSV")).await.unwrap(), vec!["counties.csv"]);

        let ok = DataFileSelection {
            main_file: "counties.csv".to_string(),
            pattern_file: None,
        };
        assert!(backend.reload_data(&ok).await.is_ok());

        let missing = DataFileSelection {
            main_file: "other.csv".to_string(),
            pattern_file: None,
        };
        let err = backend.reload_data(&missing).await.unwrap_err();
        assert_eq!(err.context().status, Some(404));
    }
}
