use axum::response::Html;

static INDEX_HTML: &str = include_str!("../../static/index.html");

/// Serve the embedded scheduling page at `GET /`.
///
/// The page talks to `/list_tasks`, `/run_task` and `/task_status` on the
/// same origin.
pub async fn ui_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}
