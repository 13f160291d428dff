//! HTTP server for the taskmind web interface.

use crate::commands::paginate;
use crate::insights::{InsightBlocker, InsightGenerator, InsightReport};
use crate::models::{Task, TaskDraft, TaskPatch, TaskStats};
use crate::storage::{Storage, TaskFilter, parse_priority, parse_status};
use crate::web::pages::{self, FilterValues, TaskListPage};
use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

/// Default port for the web server
pub const DEFAULT_PORT: u16 = 8000;

const METHOD_NOT_ALLOWED: &str = "Méthode non autorisée";

/// Shared state for the web server
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Mutex<Storage>>,
    pub generator: InsightGenerator,
}

impl AppState {
    pub fn new(storage: Storage, generator: InsightGenerator) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            generator,
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(task_list_page))
        .route("/insights", get(insights_page))
        .route("/static/app.js", get(serve_script))
        .route("/api/tasks", get(api_list_tasks).post(api_create_task))
        .route(
            "/api/tasks/:id",
            get(api_get_task).put(api_update_task).delete(api_delete_task),
        )
        .route(
            "/task/:id/toggle-status",
            post(toggle_status).fallback(method_not_allowed),
        )
        .route("/api/insights", get(api_insights).fallback(method_not_allowed))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server and serve until Ctrl+C.
pub async fn start_server(
    state: AppState,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let host_addr: std::net::IpAddr = host
        .parse()
        .map_err(|e| format!("Invalid host address '{}': {}", host, e))?;
    let addr = SocketAddr::from((host_addr, port));

    let app = build_router(state);

    tracing::info!("Starting taskmind web server at http://{}", addr);
    println!("Starting taskmind at http://{}", addr);
    println!("Press Ctrl+C to stop");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Web server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }
}

/// Error returned from JSON handlers as `{success: false, error}`.
struct ApiError(crate::Error);

impl From<crate::Error> for ApiError {
    fn from(err: crate::Error) -> Self {
        ApiError(err)
    }
}

// Malformed bodies and ids share the validation error shape.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(crate::Error::InvalidInput(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(crate::Error::InvalidInput(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            crate::Error::NotFound(_) => StatusCode::NOT_FOUND,
            crate::Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            other => {
                tracing::error!("Request failed: {}", other);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "success": false, "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "success": false, "error": METHOD_NOT_ALLOWED })),
    )
        .into_response()
}

async fn serve_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        include_str!("app.js"),
    )
}

/// Query parameters accepted by task listings.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub search: Option<String>,
    /// Kept as text so a malformed value falls back to page 1
    pub page: Option<String>,
    pub notice: Option<String>,
}

impl ListQuery {
    fn page_number(&self) -> usize {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(1)
    }

    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Build a filter, rejecting unknown status or priority values.
    fn strict_filter(&self) -> crate::Result<TaskFilter> {
        Ok(TaskFilter {
            status: non_empty(&self.status).map(parse_status).transpose()?,
            priority: non_empty(&self.priority).map(parse_priority).transpose()?,
            search: self.search_term(),
        })
    }

    /// Build a filter, ignoring unknown status or priority values.
    fn lenient_filter(&self) -> TaskFilter {
        TaskFilter {
            status: non_empty(&self.status).and_then(|s| parse_status(s).ok()),
            priority: non_empty(&self.priority).and_then(|p| parse_priority(p).ok()),
            search: self.search_term(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Task list page
async fn task_list_page(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Html<String>, ApiError> {
    let filter = query.lenient_filter();
    let now = Utc::now();

    let (tasks, stats) = {
        let storage = state.storage.lock().await;
        let tasks = storage.list_tasks(&filter)?;
        let stats = TaskStats::from_tasks(&storage.all_tasks()?, now);
        (tasks, stats)
    };
    let (tasks, page) = paginate(tasks, query.page_number());

    let notice = query
        .notice
        .as_deref()
        .and_then(InsightBlocker::from_code)
        .map(|blocker| blocker.to_string());

    Ok(Html(pages::render_task_list(&TaskListPage {
        tasks: &tasks,
        stats,
        page,
        filters: FilterValues {
            status: filter.status,
            priority: filter.priority,
            search: filter.search.clone(),
        },
        notice: notice.as_deref(),
        now,
    })))
}

/// List tasks as JSON
async fn api_list_tasks(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult {
    let filter = query.strict_filter()?;
    let now = Utc::now();

    let (tasks, stats) = {
        let storage = state.storage.lock().await;
        let tasks = storage.list_tasks(&filter)?;
        let stats = TaskStats::from_tasks(&storage.all_tasks()?, now);
        (tasks, stats)
    };
    let (tasks, page) = paginate(tasks, query.page_number());
    let views: Vec<_> = tasks.iter().map(|t| t.view(now)).collect();

    Ok(Json(json!({
        "success": true,
        "tasks": views,
        "page": page,
        "stats": stats,
    }))
    .into_response())
}

fn task_response(status: StatusCode, task: &Task) -> Response {
    (
        status,
        Json(json!({ "success": true, "task": task.view(Utc::now()) })),
    )
        .into_response()
}

/// Create a task
async fn api_create_task(
    State(state): State<AppState>,
    body: Result<Json<TaskDraft>, JsonRejection>,
) -> ApiResult {
    let Json(draft) = body?;
    let task = draft.into_task(Utc::now())?;
    let task = state.storage.lock().await.create_task(&task)?;
    tracing::info!("Created task {}", task.id);
    Ok(task_response(StatusCode::CREATED, &task))
}

/// Get a single task
async fn api_get_task(State(state): State<AppState>, id: Result<Path<i64>, PathRejection>) -> ApiResult {
    let Path(id) = id?;
    let task = state.storage.lock().await.get_task(id)?;
    Ok(task_response(StatusCode::OK, &task))
}

/// Apply a partial update to a task
async fn api_update_task(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<TaskPatch>, JsonRejection>,
) -> ApiResult {
    let Path(id) = id?;
    let Json(patch) = body?;
    let mut storage = state.storage.lock().await;
    let mut task = storage.get_task(id)?;
    patch.apply(&mut task, Utc::now())?;
    storage.update_task(&task)?;
    Ok(task_response(StatusCode::OK, &task))
}

/// Delete a task
async fn api_delete_task(State(state): State<AppState>, id: Result<Path<i64>, PathRejection>) -> ApiResult {
    let Path(id) = id?;
    state.storage.lock().await.delete_task(id)?;
    tracing::info!("Deleted task {}", id);
    Ok(Json(json!({ "success": true })).into_response())
}

/// Advance a task's status
async fn toggle_status(State(state): State<AppState>, id: Result<Path<i64>, PathRejection>) -> ApiResult {
    let Path(id) = id?;
    let task = state.storage.lock().await.toggle_status(id)?;
    Ok(Json(json!({
        "success": true,
        "new_status": task.status.as_str(),
        "status_display": task.status.label(),
    }))
    .into_response())
}

/// Outcome of an insight request before rendering.
enum InsightOutcome {
    Blocked(InsightBlocker),
    Report(InsightReport),
}

/// Load tasks, then check preconditions and generate off the async runtime.
async fn run_insights(state: &AppState) -> crate::Result<InsightOutcome> {
    // The lock is released before any inference work.
    let tasks = state.storage.lock().await.all_tasks()?;
    let generator = state.generator.clone();

    tokio::task::spawn_blocking(move || match generator.preflight(&tasks) {
        Err(blocker) => InsightOutcome::Blocked(blocker),
        Ok(()) => InsightOutcome::Report(generator.generate(&tasks)),
    })
    .await
    .map_err(|e| crate::Error::Other(format!("Insight task failed: {}", e)))
}

/// Insights page
async fn insights_page(State(state): State<AppState>) -> Result<Response, ApiError> {
    match run_insights(&state).await? {
        InsightOutcome::Blocked(blocker) => {
            Ok(Redirect::to(&format!("/?notice={}", blocker.code())).into_response())
        }
        InsightOutcome::Report(report) => Ok(Html(pages::render_insights(&report)).into_response()),
    }
}

/// Insights as JSON
async fn api_insights(State(state): State<AppState>) -> Response {
    match run_insights(&state).await {
        Ok(InsightOutcome::Report(report)) => {
            Json(json!({ "success": true, "insights": report })).into_response()
        }
        Ok(InsightOutcome::Blocked(InsightBlocker::Unreachable)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": InsightBlocker::Unreachable.short_message(),
            })),
        )
            .into_response(),
        Ok(InsightOutcome::Blocked(InsightBlocker::NoTasks)) => Json(json!({
            "success": false,
            "message": InsightBlocker::NoTasks.short_message(),
        }))
        .into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}
