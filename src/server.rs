use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    aggregate::SeverityFilter,
    client::ScanClient,
    error::{ExportError, ScanError},
    export::{ExportedReport, ReportExporter},
    view::ResultsView,
};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Dashboard>, // scan client, exporter and the view they feed
}

struct Dashboard {
    client: ScanClient,
    exporter: ReportExporter,
    view: ResultsView,
}

impl AppState {
    /// Wire a view onto the client's channel. The view lives as long as the
    /// state does.
    pub fn new(client: ScanClient, exporter: ReportExporter) -> Self {
        let view = ResultsView::attach(client.channel());
        Self {
            inner: Arc::new(Dashboard {
                client,
                exporter,
                view,
            }),
        }
    }

    pub fn view(&self) -> &ResultsView {
        &self.inner.view
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub has_report: bool,
    pub target: Option<String>,
    pub html_export_pending: bool,
    pub last_error: Option<String>,
    pub last_updated: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    #[serde(default)]
    pub severity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub filename: String,
    pub location: String,
    pub size: usize,
}

impl From<ExportedReport> for ExportResponse {
    fn from(e: ExportedReport) -> Self {
        Self {
            filename: e.artifact.filename,
            location: e.location.display().to_string(),
            size: e.artifact.bytes.len(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorBody { error: message })).into_response()
}

fn scan_status(err: &ScanError) -> StatusCode {
    match err {
        ScanError::InvalidInput => StatusCode::BAD_REQUEST,
        ScanError::RemoteRejected(_)
        | ScanError::MalformedResponse(_)
        | ScanError::Transport(_) => StatusCode::BAD_GATEWAY,
    }
}

fn export_status(err: &ExportError) -> StatusCode {
    match err {
        ExportError::AlreadyPending => StatusCode::CONFLICT,
        ExportError::RemoteRejected(_) | ExportError::Transport(_) => StatusCode::BAD_GATEWAY,
        ExportError::SerializationFailed(_) | ExportError::Save(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .route("/results", get(get_results))
        .route("/export/json", post(post_export_json))
        .route("/export/html", post(post_export_html))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

/// Serve the dashboard API on `bind` until `shutdown` is cancelled.
pub async fn spawn_server(bind: &str, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(%bind, "serving dashboard API");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let view = &app.inner.view;
    let report = view.report();
    let out = Status {
        has_report: report.is_some(),
        target: report.map(|r| r.target.clone()),
        html_export_pending: app.inner.exporter.is_html_pending(),
        last_error: view.error(),
        last_updated: view.last_updated(),
    };
    (StatusCode::OK, Json(out))
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> Response {
    let view = &app.inner.view;
    match app.inner.client.submit_scan(&req.url).await {
        Ok(report) => (StatusCode::OK, Json(report.as_ref().clone())).into_response(),
        Err(e) => {
            let message = e.to_string();
            view.set_error(message.clone());
            error_response(scan_status(&e), message)
        }
    }
}

async fn get_results(State(app): State<AppState>, Query(q): Query<ResultsQuery>) -> Response {
    let view = &app.inner.view;
    if view.report().is_none() {
        return StatusCode::NO_CONTENT.into_response();
    }
    if let Some(severity) = q.severity.as_deref() {
        let filter = severity.parse::<SeverityFilter>().unwrap_or_default();
        view.select(filter);
    }
    (StatusCode::OK, Json(view.snapshot())).into_response()
}

async fn post_export_json(State(app): State<AppState>) -> Response {
    let view = &app.inner.view;
    let Some(report) = view.report() else {
        return error_response(StatusCode::CONFLICT, "No scan results to export".into());
    };
    match app.inner.exporter.export_json(&report) {
        Ok(exported) => (StatusCode::OK, Json(ExportResponse::from(exported))).into_response(),
        Err(e) => {
            view.set_error(e.to_string());
            error_response(export_status(&e), e.to_string())
        }
    }
}

async fn post_export_html(State(app): State<AppState>) -> Response {
    let view = &app.inner.view;
    let Some(report) = view.report() else {
        return error_response(StatusCode::CONFLICT, "No scan results to export".into());
    };
    view.clear_error();
    match app.inner.exporter.export_html(&report).await {
        Ok(exported) => (StatusCode::OK, Json(ExportResponse::from(exported))).into_response(),
        Err(e) => {
            view.set_error(e.to_string());
            error_response(export_status(&e), e.to_string())
        }
    }
}
