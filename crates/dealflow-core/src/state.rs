//! Shared application state for the CLI.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::db::Database;
use crate::service::RunService;
use crate::workflow::{ReasoningService, SqliteRunRecorder, WorkflowCatalog};

/// Database handle, recorder and catalog shared by all commands.
#[derive(Debug)]
pub struct AppStateInner {
    pub db: Database,
    pub recorder: Arc<SqliteRunRecorder>,
    pub catalog: Arc<WorkflowCatalog>,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(db: Database, catalog: WorkflowCatalog) -> Self {
        Self {
            recorder: Arc::new(SqliteRunRecorder::new(db.clone())),
            catalog: Arc::new(catalog),
            db,
        }
    }

    /// Build a run service over this state. Read-only commands never need
    /// one, so no reasoning client is required to open the state.
    pub fn run_service(
        &self,
        reasoning: Arc<dyn ReasoningService>,
        config: EngineConfig,
    ) -> RunService {
        RunService::new(
            self.recorder.clone(),
            reasoning,
            self.catalog.clone(),
            config,
        )
    }
}
