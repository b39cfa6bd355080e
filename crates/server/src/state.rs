use std::sync::Arc;
use playout_core::{
    Config, ControllerStatus, RunState, SanitizedConfig, StatusHandle, Supervisor,
};

/// Shared application state
pub struct AppState {
    config: Config,
    status: StatusHandle,
    supervisor: Arc<dyn Supervisor>,
}

impl AppState {
    pub fn new(config: Config, status: StatusHandle, supervisor: Arc<dyn Supervisor>) -> Self {
        Self {
            config,
            status,
            supervisor,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    /// Snapshot of the playout loop.
    pub async fn status(&self) -> ControllerStatus {
        self.status.read().await.clone()
    }

    pub fn supervisor_state(&self) -> RunState {
        self.supervisor.state()
    }
}
