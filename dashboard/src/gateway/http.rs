//! HTTP client for the statistical backend.

use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::dto::{
    ColumnRangesResponse, ColumnsResponse, ConstraintsResponse, CrossValResponse, ErrorBody,
    FilesResponse, GeomapResponse, HealthResponse, PatternQueryBody, UserPatternResponse,
};
use super::error::{GatewayError, GatewayResult};
use super::AnalysisBackend;
use crate::config::BackendSettings;
use crate::models::{
    AnalysisResult, ColumnRanges, CrossValidation, DataFileSelection, DataFileUpload,
    GeomapSelection, PatternId, PresetPattern, Query, UploadReceipt,
};

const EMPTY_SELECTION_MESSAGE: &str = "No counties match the selected constraints";

/// Connection options for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackendOptions {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for HttpBackendOptions {
    fn default() -> Self {
        Self::from(&BackendSettings::default())
    }
}

impl From<&BackendSettings> for HttpBackendOptions {
    fn from(settings: &BackendSettings) -> Self {
        Self {
            base_url: settings.url.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        }
    }
}

/// Which retryable failures an operation may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    /// Transport errors, timeouts and 5xx.
    Transient,
    /// As `Transient`, except timeouts. A timed-out model fit is still
    /// running on the backend, and sending it again only stacks another.
    NotOnTimeout,
}

impl Retry {
    fn allows(self, err: &GatewayError) -> bool {
        match self {
            Retry::Transient => err.is_retryable(),
            Retry::NotOnTimeout => err.is_retryable() && !err.is_timeout(),
        }
    }
}

/// reqwest-backed [`AnalysisBackend`].
///
/// Retryable failures (transport errors, timeouts, 5xx) are retried up to
/// `max_retries` times with a linearly growing delay. Everything else is
/// returned on the first attempt. The full analysis and cross-validation
/// never retry a timeout.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpBackend {
    pub fn new(options: HttpBackendOptions) -> GatewayResult<Self> {
        let base_url = options.base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url).map_err(|e| {
            GatewayError::configuration(format!("Invalid backend URL '{}': {}", base_url, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| GatewayError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            max_retries: options.max_retries,
            retry_delay: options.retry_delay,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn execute<T, F>(&self, operation: &str, endpoint: &str, build: F) -> GatewayResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client, String) -> reqwest::RequestBuilder + Sync,
    {
        self.execute_with(Retry::Transient, operation, endpoint, build)
            .await
    }

    async fn execute_with<T, F>(
        &self,
        retry: Retry,
        operation: &str,
        endpoint: &str,
        build: F,
    ) -> GatewayResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client, String) -> reqwest::RequestBuilder + Sync,
    {
        let mut attempt = 0u32;
        loop {
            match self.attempt(endpoint, &build).await {
                Ok(value) => return Ok(value),
                Err(err) if retry.allows(&err) && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "{} {} failed (attempt {}/{}): {}",
                        operation,
                        endpoint,
                        attempt,
                        self.max_retries + 1,
                        err.message()
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(err) => return Err(err.with_operation(operation).with_endpoint(endpoint)),
            }
        }
    }

    async fn attempt<T, F>(&self, endpoint: &str, build: &F) -> GatewayResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client, String) -> reqwest::RequestBuilder + Sync,
    {
        let response = build(&self.client, self.url(endpoint)).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!("{} -> {} ({} bytes)", endpoint, status, body.len());
        decode_body(status, &body)
    }
}

fn is_no_data_message(message: &str) -> bool {
    message.to_lowercase().contains("no data")
}

/// Turn a status + body into `T`, normalizing the backend's error shapes.
///
/// The backend signals "nothing matched" with a 400 whose message mentions
/// "no data"; that becomes [`GatewayError::EmptySelection`].
pub(crate) fn decode_body<T: DeserializeOwned>(status: u16, body: &str) -> GatewayResult<T> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.error)
            .unwrap_or_else(|_| body.trim().to_string());
        if status == 400 && is_no_data_message(&message) {
            return Err(GatewayError::empty_selection(message));
        }
        return Err(GatewayError::status(status, message));
    }

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| GatewayError::decode(format!("Invalid JSON: {} ({})", e, body.trim())))?;

    if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
        if is_no_data_message(error) {
            return Err(GatewayError::empty_selection(error));
        }
        return Err(GatewayError::backend(error));
    }

    serde_json::from_value(value)
        .map_err(|e| GatewayError::decode(format!("Unexpected response shape: {}", e)))
}

#[async_trait]
impl AnalysisBackend for HttpBackend {
    async fn health_check(&self) -> GatewayResult<bool> {
        let health: HealthResponse = self
            .execute("health_check", "/health", |c, url| c.get(url))
            .await?;
        Ok(health.status.eq_ignore_ascii_case("healthy"))
    }

    async fn fetch_columns(&self) -> GatewayResult<Vec<String>> {
        let response: ColumnsResponse = self
            .execute("fetch_columns", "/columns", |c, url| c.get(url))
            .await?;
        Ok(response.columns)
    }

    async fn fetch_column_ranges(&self) -> GatewayResult<ColumnRanges> {
        let response: ColumnRangesResponse = self
            .execute("fetch_column_ranges", "/column-ranges", |c, url| c.get(url))
            .await?;
        Ok(response.column_ranges)
    }

    async fn fetch_preset_pattern(&self, id: PatternId) -> GatewayResult<PresetPattern> {
        let response: ConstraintsResponse = self
            .execute("fetch_preset_pattern", "/constraints", |c, url| {
                c.get(url).query(&[("ID", id.value())])
            })
            .await?;
        Ok(response.into_preset(id))
    }

    async fn fetch_map_only(&self, query: &Query) -> GatewayResult<GeomapSelection> {
        let body = PatternQueryBody::from(query);
        let response: GeomapResponse = self
            .execute("fetch_map_only", "/geomapFilter", |c, url| c.post(url).json(&body))
            .await?;

        if response.counties_indices.is_empty() {
            return Err(GatewayError::empty_selection(EMPTY_SELECTION_MESSAGE)
                .with_operation("fetch_map_only")
                .with_endpoint("/geomapFilter"));
        }
        Ok(response.into())
    }

    async fn fetch_full_analysis(&self, query: &Query) -> GatewayResult<AnalysisResult> {
        let body = PatternQueryBody::from(query);
        let response: UserPatternResponse = self
            .execute_with(
                Retry::NotOnTimeout,
                "fetch_full_analysis",
                "/userPattern",
                |c, url| c.post(url).json(&body),
            )
            .await?;

        if response.geomap.counties_indices.is_empty() {
            return Err(GatewayError::empty_selection(EMPTY_SELECTION_MESSAGE)
                .with_operation("fetch_full_analysis")
                .with_endpoint("/userPattern"));
        }
        AnalysisResult::try_from(response)
            .map_err(|e| e.with_operation("fetch_full_analysis").with_endpoint("/userPattern"))
    }

    async fn fetch_cross_validation(&self, query: &Query) -> GatewayResult<CrossValidation> {
        let body = PatternQueryBody::from(query);
        let response: CrossValResponse = self
            .execute_with(
                Retry::NotOnTimeout,
                "fetch_cross_validation",
                "/crossVal",
                |c, url| c.post(url).json(&body),
            )
            .await?;
        Ok(CrossValidation {
            k_fold_normalized_rmse: response.k_fold_nrmse,
        })
    }

    async fn list_files(&self, extension: Option<&str>) -> GatewayResult<Vec<String>> {
        let response: FilesResponse = self
            .execute("list_files", "/list-files", |c, url| match extension {
                Some(ext) => c.get(url).query(&[("type", ext)]),
                None => c.get(url),
            })
            .await?;
        Ok(response.files)
    }

    async fn upload_file(&self, upload: DataFileUpload) -> GatewayResult<UploadReceipt> {
        self.execute("upload_file", "/upload", |c, url| {
            let part = reqwest::multipart::Part::bytes(upload.bytes.clone())
                .file_name(upload.file_name.clone());
            let form = reqwest::multipart::Form::new()
                .part("file", part)
                .text("type", upload.kind.as_str());
            c.post(url).multipart(form)
        })
        .await
    }

    async fn reload_data(&self, selection: &DataFileSelection) -> GatewayResult<()> {
        let _: serde_json::Value = self
            .execute("reload_data", "/reload-data", |c, url| c.post(url).json(selection))
            .await?;
        Ok(())
    }
}
