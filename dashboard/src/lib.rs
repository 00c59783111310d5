//! # Choropleth Dashboard
//!
//! Client-side orchestration for a county-level pattern analysis dashboard.
//!
//! The crate sits between a user interface and a statistical analysis
//! service. It owns the current query (variable constraints, a treatment
//! column, and active/inactive treatment ranges), sends it to the service,
//! and turns the answers into state a choropleth map and a histogram view can
//! draw directly.
//!
//! ## Architecture
//!
//! - [`models`]: ranges, constraints, sliders, queries and analysis results
//! - [`gateway`]: the [`gateway::AnalysisBackend`] trait with an HTTP client,
//!   an in-memory backend and a preset cache
//! - [`scheduler`]: debounced map-only requests with latest-wins commits
//! - [`state`]: the pattern state machine and its observable snapshot
//! - [`services`]: histogram binning, statistics and map adapters
//! - [`config`]: TOML and environment configuration
//! - [`http`]: the Session API served to the browser front end
//!
//! ## Consistency
//!
//! Map-only requests, full analyses, cross-validation runs and preset
//! lookups can all be in flight at once. Each result is tagged with the
//! request that produced it and is committed only while that request is
//! still the latest of its kind and the data files have not changed since.

// GatewayError carries a full ErrorContext.
#![allow(clippy::result_large_err)]

pub mod config;
pub mod gateway;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod state;

#[cfg(feature = "http-server")]
pub mod http;

pub use config::DashboardConfig;
pub use gateway::{create_backend, AnalysisBackend, GatewayError, GatewayResult};
pub use state::{DashboardState, PatternStateMachine};
