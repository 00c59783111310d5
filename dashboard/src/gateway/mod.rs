//! Backend gateway: typed access to the statistical backend.
//!
//! The orchestrator never talks HTTP directly. Every remote operation goes
//! through the [`AnalysisBackend`] trait, which has three implementations:
//!
//! - [`HttpBackend`]: the real client (reqwest), with retries and error
//!   normalization
//! - [`PresetCache`]: a decorator memoizing preset lookups for the session
//! - [`LocalBackend`]: an in-memory backend for tests and offline development
//!
//! # Error Model
//!
//! All operations return [`GatewayResult`]. An empty result set is reported as
//! [`GatewayError::EmptySelection`], never as a transport failure, so callers
//! can show guidance instead of an alert.

use async_trait::async_trait;

pub mod cache;
pub mod dto;
pub mod error;
pub mod factory;
pub mod http;
pub mod local;

pub use cache::PresetCache;
pub use error::{ErrorContext, GatewayError, GatewayResult};
pub use factory::{create_backend, BackendKind};
pub use http::{HttpBackend, HttpBackendOptions};
pub use local::{CountyRecord, LocalBackend, LocalCall, LocalOperation};

use crate::models::{
    AnalysisResult, ColumnRanges, CrossValidation, DataFileSelection, DataFileUpload,
    GeomapSelection, PatternId, PresetPattern, Query, UploadReceipt,
};

/// Operations offered by the statistical backend.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; the orchestrator shares one backend
/// across concurrent request channels.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    // ==================== Health & Discovery ====================

    /// Check whether the backend answers.
    ///
    /// # Returns
    /// - `Ok(true)` if the backend reports itself healthy
    /// - `Ok(false)` if it answered but not healthy
    /// - `Err(GatewayError)` if it could not be reached
    async fn health_check(&self) -> GatewayResult<bool>;

    /// Column names of the loaded county table, in table order.
    async fn fetch_columns(&self) -> GatewayResult<Vec<String>>;

    /// Observed `{min, max}` of every column.
    async fn fetch_column_ranges(&self) -> GatewayResult<ColumnRanges>;

    // ==================== Pattern Queries ====================

    /// Look up a preset pattern.
    ///
    /// # Arguments
    /// * `id` - Zero-based pattern row
    ///
    /// # Returns
    /// * `Ok(PresetPattern)` - constraints, slider extents, treatment column and counties
    /// * `Err(GatewayError::Status)` with 404 if the id is unknown
    async fn fetch_preset_pattern(&self, id: PatternId) -> GatewayResult<PresetPattern>;

    /// Lightweight filter: matching counties only, no modeling.
    ///
    /// # Returns
    /// * `Err(GatewayError::EmptySelection)` if no county matches
    async fn fetch_map_only(&self, query: &Query) -> GatewayResult<GeomapSelection>;

    /// Full treatment-effect analysis: geomap plus histogram and tests.
    ///
    /// # Returns
    /// * `Err(GatewayError::EmptySelection)` if no county matches
    async fn fetch_full_analysis(&self, query: &Query) -> GatewayResult<AnalysisResult>;

    /// k-fold cross-validation of the model for `query`.
    async fn fetch_cross_validation(&self, query: &Query) -> GatewayResult<CrossValidation>;

    // ==================== Data Files ====================

    /// Files in the backend's data directory, optionally filtered by extension.
    async fn list_files(&self, extension: Option<&str>) -> GatewayResult<Vec<String>>;

    /// Store a file in the backend's data directory.
    async fn upload_file(&self, upload: DataFileUpload) -> GatewayResult<UploadReceipt>;

    /// Make the backend load a different main/pattern file pair.
    async fn reload_data(&self, selection: &DataFileSelection) -> GatewayResult<()>;

    /// Drop anything memoized for the current data. Called after a reload.
    fn invalidate_cache(&self) {}
}
