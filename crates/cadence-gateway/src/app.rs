use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use cadence_core::{CadenceConfig, OsType, TaskCatalog};
use cadence_scheduler::SchedulerEngine;

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: CadenceConfig,
    pub engine: Arc<SchedulerEngine>,
    pub catalog: TaskCatalog,
    /// Host OS, fixed at startup; selects the catalog column.
    pub os: OsType,
}

impl AppState {
    pub fn new(
        config: CadenceConfig,
        engine: Arc<SchedulerEngine>,
        catalog: TaskCatalog,
        os: OsType,
    ) -> Self {
        Self {
            config,
            engine,
            catalog,
            os,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(crate::http::ui::ui_handler))
        .route("/health", get(crate::http::health::health_handler))
        .route("/list_tasks", get(crate::http::tasks::list_tasks))
        .route("/tasks", get(crate::http::tasks::scheduled_tasks))
        .route("/task_status/{job_id}", get(crate::http::tasks::task_status))
        .route("/run_task", post(crate::http::tasks::run_task))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
