//! Application state for the HTTP server.

use std::sync::Arc;

use crate::config::DashboardConfig;
use crate::state::PatternStateMachine;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The one orchestrator session this server exposes
    pub machine: PatternStateMachine,
    pub config: Arc<DashboardConfig>,
}

impl AppState {
    pub fn new(machine: PatternStateMachine, config: DashboardConfig) -> Self {
        Self {
            machine,
            config: Arc::new(config),
        }
    }
}
