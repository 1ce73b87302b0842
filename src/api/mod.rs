use crate::config::{DEFAULT_API_ADDR, DEFAULT_MAX_UPLOAD_BYTES};
use crate::error::Error;
use crate::pipeline::{CreateOutcome, ReportService, Submission, UPLOADS_URL_PREFIX};
use crate::report::{ReportSummary, StoredReport};
use anyhow::{anyhow, Context, Result};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::QueryRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

pub const WELCOME_MESSAGE: &str = "Welcome to Garbage Detection API";
const NOT_FOUND_OR_UNCHANGED: &str = "Report not found or no change made";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Request body cap, applied to multipart uploads.
    pub max_upload_bytes: usize,
    /// Serve saved uploads under `/uploads`.
    pub serve_uploads: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_API_ADDR.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            serve_uploads: true,
        }
    }
}

/// Running server. Dropping the handle leaves the server running; call
/// [`ApiHandle::stop`] to shut it down.
#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    service: Arc<ReportService>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, service: ReportService) -> Self {
        Self {
            cfg,
            service: Arc::new(service),
        }
    }

    pub fn router(&self) -> Router {
        router(self.service.clone(), &self.cfg)
    }

    /// Bind the configured address and serve on a dedicated thread.
    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid api addr '{}'", self.cfg.addr))?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("garbage-api")
            .build()
            .context("failed to build api runtime")?;
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind(configured_addr))
            .with_context(|| format!("failed to bind {configured_addr}"))?;
        let addr = listener.local_addr()?;

        let app = self.router();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let join = std::thread::spawn(move || {
            let served = runtime.block_on(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown_rx.await;
                    })
                    .await
            });
            if let Err(err) = served {
                log::error!("report api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown: Some(shutdown_tx),
            join: Some(join),
        })
    }
}

/// Build the HTTP surface over `service`.
pub fn router(service: Arc<ReportService>, cfg: &ApiConfig) -> Router {
    let upload_dir = service.upload_dir().to_path_buf();
    let mut app = Router::new()
        .route("/", get(root))
        .route("/reports", get(list_reports).post(create_report))
        .route("/reports/", get(list_reports).post(create_report))
        .route("/reports/summary", get(report_summary))
        .route("/reports/{report_id}/status", put(update_status))
        .with_state(service);

    if cfg.serve_uploads {
        app = app.nest_service(UPLOADS_URL_PREFIX, ServeDir::new(upload_dir));
    }

    app.layer(DefaultBodyLimit::max(cfg.max_upload_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": WELCOME_MESSAGE }))
}

async fn create_report(
    State(service): State<Arc<ReportService>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Json<CreateOutcome>, ApiError> {
    let multipart = multipart.map_err(|rejection| ApiError::unprocessable(rejection.body_text()))?;
    let submission = read_submission(multipart).await?;
    let outcome = run_blocking(move || service.create_report(submission)).await?;
    Ok(Json(outcome))
}

async fn list_reports(
    State(service): State<Arc<ReportService>>,
) -> std::result::Result<Json<Vec<StoredReport>>, ApiError> {
    let reports = run_blocking(move || service.list_reports()).await?;
    Ok(Json(reports))
}

async fn report_summary(
    State(service): State<Arc<ReportService>>,
) -> std::result::Result<Json<ReportSummary>, ApiError> {
    let summary = run_blocking(move || service.summary()).await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    status: String,
}

#[derive(Debug, Serialize)]
struct StatusUpdateResponse {
    status: &'static str,
    message: String,
}

async fn update_status(
    State(service): State<Arc<ReportService>>,
    Path(report_id): Path<String>,
    query: std::result::Result<Query<StatusQuery>, QueryRejection>,
) -> std::result::Result<Json<StatusUpdateResponse>, ApiError> {
    let Query(StatusQuery { status }) =
        query.map_err(|rejection| ApiError::unprocessable(rejection.body_text()))?;

    let new_status = status.clone();
    let modified = run_blocking(move || service.update_status(&report_id, &new_status)).await?;
    let response = if modified {
        StatusUpdateResponse {
            status: "success",
            message: format!("Report marked as {status}"),
        }
    } else {
        StatusUpdateResponse {
            status: "error",
            message: NOT_FOUND_OR_UNCHANGED.to_string(),
        }
    };
    Ok(Json(response))
}

async fn read_submission(mut multipart: Multipart) -> std::result::Result<Submission, ApiError> {
    let mut latitude = None;
    let mut longitude = None;
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(ApiError::from)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("latitude") => latitude = Some(parse_coordinate("latitude", &field.text().await?)?),
            Some("longitude") => {
                longitude = Some(parse_coordinate("longitude", &field.text().await?)?)
            }
            Some("image") => {
                let filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                image = Some((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let latitude = latitude.ok_or_else(|| ApiError::missing_field("latitude"))?;
    let longitude = longitude.ok_or_else(|| ApiError::missing_field("longitude"))?;
    let (filename, image) = image.ok_or_else(|| ApiError::missing_field("image"))?;
    Ok(Submission {
        latitude,
        longitude,
        filename,
        image,
    })
}

/// Coordinates must be finite; `nan` and `inf` parse as `f64` but cannot be
/// stored as JSON numbers.
fn parse_coordinate(name: &str, raw: &str) -> std::result::Result<f64, ApiError> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ApiError::unprocessable(format!(
            "field '{name}': input should be a finite number, got '{raw}'"
        ))),
    }
}

async fn run_blocking<T, F>(job: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|err| ApiError::internal(format!("request worker failed: {err}")))?
        .map_err(ApiError::from)
}

/// Error response rendered as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn unprocessable(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: detail.into(),
        }
    }

    fn missing_field(name: &str) -> Self {
        Self::unprocessable(format!("field '{name}' is required"))
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidUpload(detail) => Self {
                status: StatusCode::BAD_REQUEST,
                detail: format!("invalid upload: {detail}"),
            },
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        Self {
            status: if status == StatusCode::BAD_REQUEST {
                StatusCode::UNPROCESSABLE_ENTITY
            } else {
                status
            },
            detail: err.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("report api request failed: {}", self.detail);
        } else {
            log::warn!("report api request rejected: {}", self.detail);
        }
        let body = Json(serde_json::json!({ "detail": self.detail }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    #[test]
    fn parse_coordinate_accepts_finite_numbers() {
        assert_eq!(parse_coordinate("latitude", " 12.9716 ").unwrap(), 12.9716);
        assert_eq!(parse_coordinate("longitude", "-77").unwrap(), -77.0);
    }

    #[test]
    fn parse_coordinate_rejects_non_finite_values() {
        for raw in ["nan", "NaN", "inf", "-inf", "infinity", "north", ""] {
            let err = parse_coordinate("latitude", raw).unwrap_err();
            assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY, "{raw}");
            assert!(err.detail.contains("latitude"));
        }
    }

    #[test]
    fn api_defaults_follow_service_defaults() {
        let api = ApiConfig::default();
        let service = ServiceConfig::default();
        assert_eq!(api.addr, service.api.addr);
        assert_eq!(api.max_upload_bytes, service.api.max_upload_bytes);
        assert!(api.serve_uploads);
    }
}
