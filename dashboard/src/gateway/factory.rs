//! Backend construction from configuration.

use std::str::FromStr;
use std::sync::Arc;

use super::cache::PresetCache;
use super::error::{GatewayError, GatewayResult};
use super::http::{HttpBackend, HttpBackendOptions};
use super::local::LocalBackend;
use super::AnalysisBackend;
use crate::config::BackendSettings;

/// Which backend implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// The statistical backend over HTTP
    Http,
    /// In-memory backend
    Local,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" | "remote" => Ok(Self::Http),
            "local" | "memory" => Ok(Self::Local),
            _ => Err(format!("Unknown backend kind: {}", s)),
        }
    }
}

/// Build the backend described by `settings`, wrapped in a [`PresetCache`].
pub fn create_backend(settings: &BackendSettings) -> GatewayResult<Arc<dyn AnalysisBackend>> {
    let kind = BackendKind::from_str(&settings.kind).map_err(GatewayError::configuration)?;
    let inner: Arc<dyn AnalysisBackend> = match kind {
        BackendKind::Http => Arc::new(HttpBackend::new(HttpBackendOptions::from(settings))?),
        BackendKind::Local => Arc::new(LocalBackend::new().without_call_log()),
    };
    Ok(Arc::new(PresetCache::new(inner)))
}
