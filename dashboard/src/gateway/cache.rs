//! Session memoization of preset pattern lookups.

use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::error::GatewayResult;
use super::AnalysisBackend;
use crate::models::{
    AnalysisResult, ColumnRanges, CrossValidation, DataFileSelection, DataFileUpload,
    GeomapSelection, PatternId, PresetPattern, Query, UploadReceipt,
};

/// Decorator that remembers successful preset lookups by id.
///
/// Presets are immutable for a given data file, so the cache lives until
/// [`AnalysisBackend::invalidate_cache`] is called on a data reload. Failures
/// are never cached. Every other operation passes straight through.
///
/// A lookup that was in flight across an invalidation is returned to its
/// caller but not stored.
pub struct PresetCache {
    inner: Arc<dyn AnalysisBackend>,
    presets: RwLock<HashMap<PatternId, PresetPattern>>,
    generation: AtomicU64,
}

impl PresetCache {
    pub fn new(inner: Arc<dyn AnalysisBackend>) -> Self {
        Self {
            inner,
            presets: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Number of memoized presets.
    pub fn len(&self) -> usize {
        self.presets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.read().is_empty()
    }
}

#[async_trait]
impl AnalysisBackend for PresetCache {
    async fn health_check(&self) -> GatewayResult<bool> {
        self.inner.health_check().await
    }

    async fn fetch_columns(&self) -> GatewayResult<Vec<String>> {
        self.inner.fetch_columns().await
    }

    async fn fetch_column_ranges(&self) -> GatewayResult<ColumnRanges> {
        self.inner.fetch_column_ranges().await
    }

    async fn fetch_preset_pattern(&self, id: PatternId) -> GatewayResult<PresetPattern> {
        let cached = self.presets.read().get(&id).cloned();
        if let Some(preset) = cached {
            debug!("preset {} served from cache", id);
            return Ok(preset);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let preset = self.inner.fetch_preset_pattern(id).await?;

        let mut presets = self.presets.write();
        if self.generation.load(Ordering::SeqCst) == generation {
            presets.insert(id, preset.clone());
        } else {
            debug!("preset {} fetched across a reload, not cached", id);
        }
        Ok(preset)
    }

    async fn fetch_map_only(&self, query: &Query) -> GatewayResult<GeomapSelection> {
        self.inner.fetch_map_only(query).await
    }

    async fn fetch_full_analysis(&self, query: &Query) -> GatewayResult<AnalysisResult> {
        self.inner.fetch_full_analysis(query).await
    }

    async fn fetch_cross_validation(&self, query: &Query) -> GatewayResult<CrossValidation> {
        self.inner.fetch_cross_validation(query).await
    }

    async fn list_files(&self, extension: Option<&str>) -> GatewayResult<Vec<String>> {
        self.inner.list_files(extension).await
    }

    async fn upload_file(&self, upload: DataFileUpload) -> GatewayResult<UploadReceipt> {
        self.inner.upload_file(upload).await
    }

    async fn reload_data(&self, selection: &DataFileSelection) -> GatewayResult<()> {
        self.inner.reload_data(selection).await
    }

    fn invalidate_cache(&self) {
        let mut presets = self.presets.write();
        self.generation.fetch_add(1, Ordering::SeqCst);
        presets.clear();
        drop(presets);
        self.inner.invalidate_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::local::{LocalBackend, LocalOperation};
    use crate::models::Constraint;
    use std::time::Duration;

    fn backend_with_preset() -> LocalBackend {
        let backend = LocalBackend::new();
        backend.add_preset(PresetPattern {
            id: PatternId(6),
            constraints: Constraint::new().with("X", 2.0, 8.0),
            constraint_bounds: Constraint::new().with("X", 0.0, 10.0),
            treatment_column: "lawA".to_string(),
            counties_indices: vec![1001],
        });
        backend
    }

    #[tokio::test]
    async fn test_second_lookup_is_served_from_cache() {
        let local = backend_with_preset();
        let cache = PresetCache::new(Arc::new(local.clone()));

        cache.fetch_preset_pattern(PatternId(6)).await.unwrap();
        cache.fetch_preset_pattern(PatternId(6)).await.unwrap();

        assert_eq!(local.call_count(LocalOperation::PresetPattern), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let local = backend_with_preset();
        let cache = PresetCache::new(Arc::new(local.clone()));

        assert!(cache.fetch_preset_pattern(PatternId(99)).await.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_clears_entries() {
        let local = backend_with_preset();
        let cache = PresetCache::new(Arc::new(local.clone()));

        cache.fetch_preset_pattern(PatternId(6)).await.unwrap();
        cache.invalidate_cache();
        cache.fetch_preset_pattern(PatternId(6)).await.unwrap();

        assert_eq!(local.call_count(LocalOperation::PresetPattern), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_in_flight_across_invalidate_is_not_kept() {
        let local = backend_with_preset();
        local.push_latency(LocalOperation::PresetPattern, Duration::from_millis(500));
        let cache = Arc::new(PresetCache::new(Arc::new(local.clone())));

        let in_flight = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.fetch_preset_pattern(PatternId(6)).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        cache.invalidate_cache();

        assert!(in_flight.await.unwrap().is_ok());
        assert!(cache.is_empty());

        cache.fetch_preset_pattern(PatternId(6)).await.unwrap();
        assert_eq!(local.call_count(LocalOperation::PresetPattern), 2);
        assert_eq!(cache.len(), 1);
    }
}
