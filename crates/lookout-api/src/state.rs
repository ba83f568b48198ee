//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use lookout_chat::Orchestrator;
use lookout_core::LookoutConfig;
use lookout_data::Dataset;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks. Mutable
/// session state lives inside the orchestrator.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<LookoutConfig>,
    pub dataset: Arc<Dataset>,
    pub orchestrator: Arc<Orchestrator>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: LookoutConfig, dataset: Arc<Dataset>, orchestrator: Orchestrator) -> Self {
        Self {
            config: Arc::new(config),
            dataset,
            orchestrator: Arc::new(orchestrator),
            start_time: Instant::now(),
        }
    }
}
