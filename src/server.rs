//! HTTP surface over [`ReportPipeline`] (feature `server`).
//!
//! | route | body | reply |
//! |-------|------|-------|
//! | `GET /health` | | `OK` |
//! | `POST /api/analyze` | `{ fileName, mimeType, content }` (base64 PDF) | [`AnalysisOutcome`] |
//! | `POST /api/report` | [`AnalysisRecord`] | [`DownloadOutcome`] |
//!
//! Every reply body is the uniform outcome shape, including failures; the
//! status code only classifies them. The pipeline is shared read-only
//! between requests.

use crate::analyze::ReportPipeline;
use crate::error::{ErrorKind, GradeLensError};
use crate::output::{AnalysisOutcome, AnalysisRecord, DownloadOutcome};
use crate::pipeline::input::PdfUpload;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ReportPipeline>,
}

/// Body of `POST /api/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub file_name: String,
    pub mime_type: String,
    /// Base64-encoded file bytes.
    pub content: String,
}

/// Build the application router.
pub fn create_router(pipeline: Arc<ReportPipeline>) -> Router {
    let max_upload = pipeline.config().max_upload_bytes;
    // base64 inflates by 4/3; leave room for the JSON envelope.
    let body_limit = max_upload / 3 * 4 + 64 * 1024;
    let state = AppState { pipeline };

    let api = Router::new()
        .route("/analyze", post(analyze))
        .route("/report", post(report))
        .with_state(state);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(body_limit))
}

/// HTTP status for a failure kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::EmptyDocument | ErrorKind::UnsupportedFormat => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::MalformedAiResponse
        | ErrorKind::IncompleteAnalysis
        | ErrorKind::ModelTimeout
        | ErrorKind::ModelUnavailable => StatusCode::BAD_GATEWAY,
        ErrorKind::Render | ErrorKind::Configuration | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn bad_body(rejection: JsonRejection) -> GradeLensError {
    GradeLensError::InvalidInput {
        reason: rejection.body_text(),
    }
}

async fn analyze(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let result = match body {
        Ok(Json(req)) => match PdfUpload::from_base64(req.file_name, req.mime_type, &req.content) {
            Ok(upload) => state.pipeline.build_analysis(&upload).await,
            Err(e) => Err(e),
        },
        Err(rejection) => Err(bad_body(rejection)),
    };

    match result {
        Ok(record) => {
            info!("Analysis {} served", record.id);
            (StatusCode::OK, Json(AnalysisOutcome::succeeded(record)))
        }
        Err(e) => {
            let status = status_for(e.kind());
            if status.is_server_error() {
                error!("Analysis request failed: {}", e);
            }
            (status, Json(AnalysisOutcome::failed(&e)))
        }
    }
}

async fn report(
    State(state): State<AppState>,
    body: Result<Json<AnalysisRecord>, JsonRejection>,
) -> impl IntoResponse {
    let mut record = match body {
        Ok(Json(record)) => record,
        Err(rejection) => {
            let e = bad_body(rejection);
            return (status_for(e.kind()), Json(DownloadOutcome::failed(&e)));
        }
    };
    // Grades in a client-supplied record are not trusted.
    record.regrade();

    let format = state.pipeline.config().report_format;
    match state.pipeline.render_report(&record, format).await {
        Ok(rendered) => (StatusCode::OK, Json(DownloadOutcome::succeeded(&rendered))),
        Err(e) => {
            let status = status_for(e.kind());
            if status.is_server_error() {
                error!("Report rendering failed: {}", e);
            }
            (status, Json(DownloadOutcome::failed(&e)))
        }
    }
}

/// Bind and serve until the process is stopped.
pub async fn run_server(pipeline: ReportPipeline, port: u16) -> std::io::Result<()> {
    let app = create_router(Arc::new(pipeline));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Listening on http://localhost:{}", port);
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(ErrorKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::EmptyDocument), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(ErrorKind::ModelTimeout), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::Render), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
