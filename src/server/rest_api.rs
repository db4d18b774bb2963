use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use common::{
    CheckUpdatesResponse, CleanupResponse, ComputerInfo, ComputerSummary, DeleteComputerRequest,
    DeleteComputerResponse, DeleteDriverRequest, DeleteDriverResponse, DriverDetail, DriverSummary,
    InstallationReport, RegisterComputerRequest, RegisterComputerResponse, RegisterDriverResponse,
    ReportAck, StatusSummary,
};

use crate::business_logic;
use crate::matcher;
use crate::service_core::{self, ServiceError, ServiceState};
use crate::MAX_BODY_BYTES;

pub fn router(state: Arc<ServiceState>) -> Router {
    let computers = Router::new()
        .route("/computers/register", post(register_computer))
        .route("/computers", get(list_computers))
        .route("/computers/delete", delete(delete_computer))
        .route("/computers/cleanup", delete(cleanup_computers))
        .route("/computers/:name/info", get(computer_info))
        .route("/computers/:name/check-updates", get(check_updates));

    let drivers = Router::new()
        .route("/drivers/register", post(register_driver))
        .route("/drivers", get(list_drivers))
        .route("/drivers/delete", delete(delete_driver))
        .route("/drivers/:hardware_id", get(driver_detail));

    let service = Router::new()
        .route("/installation/report", post(installation_report))
        .route("/status", get(status_summary));

    computers
        .merge(drivers)
        .merge(service)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            ServiceError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ServiceError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ServiceError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError(ServiceError::Validation(format!(
        "Invalid multipart payload: {err}"
    )))
}

async fn register_computer(
    State(state): State<Arc<ServiceState>>,
    Json(req): Json<RegisterComputerRequest>,
) -> ApiResult<RegisterComputerResponse> {
    Ok(Json(service_core::upsert_computer_core(&state, req).await?))
}

async fn list_computers(
    State(state): State<Arc<ServiceState>>,
) -> ApiResult<Vec<ComputerSummary>> {
    Ok(Json(service_core::list_computers_core(&state).await?))
}

async fn computer_info(
    State(state): State<Arc<ServiceState>>,
    Path(name): Path<String>,
) -> ApiResult<ComputerInfo> {
    Ok(Json(service_core::get_computer_info_core(&state, &name).await?))
}

async fn delete_computer(
    State(state): State<Arc<ServiceState>>,
    Json(req): Json<DeleteComputerRequest>,
) -> ApiResult<DeleteComputerResponse> {
    Ok(Json(service_core::delete_computer_core(&state, req).await?))
}

#[derive(Debug, Deserialize)]
struct CleanupParams {
    #[serde(default = "default_days_offline")]
    days_offline: i64,
}

fn default_days_offline() -> i64 {
    30
}

async fn cleanup_computers(
    State(state): State<Arc<ServiceState>>,
    Query(params): Query<CleanupParams>,
) -> ApiResult<CleanupResponse> {
    Ok(Json(
        service_core::cleanup_stale_core(&state, params.days_offline).await?,
    ))
}

async fn check_updates(
    State(state): State<Arc<ServiceState>>,
    Path(name): Path<String>,
) -> ApiResult<CheckUpdatesResponse> {
    Ok(Json(matcher::find_updates_core(&state, &name).await?))
}

/// Multipart upload: metadata fields plus the package under `file`. Fields
/// are buffered first so validation happens before anything touches disk.
async fn register_driver(
    State(state): State<Arc<ServiceState>>,
    mut multipart: Multipart,
) -> ApiResult<RegisterDriverResponse> {
    #[derive(Default)]
    struct FormData {
        file_name: Option<String>,
        file_bytes: Option<Vec<u8>>,
        model: String,
        driver_version: String,
        hardware_id: Option<String>,
        os_version: Option<String>,
        supported_hardware: Option<String>,
    }
    let mut fd = FormData::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            fd.file_name = field.file_name().map(|s| s.to_string());
            fd.file_bytes = Some(field.bytes().await.map_err(bad_multipart)?.to_vec());
        } else {
            let txt = field.text().await.map_err(bad_multipart)?;
            match name.as_str() {
                "model" => fd.model = txt,
                "driver_version" => fd.driver_version = txt,
                "hardware_id" => fd.hardware_id = Some(txt),
                "os_version" => fd.os_version = Some(txt),
                "supported_hardware" => fd.supported_hardware = Some(txt),
                _ => {}
            }
        }
    }

    let file_bytes = fd
        .file_bytes
        .ok_or_else(|| ApiError(ServiceError::Validation("driver file is required".to_string())))?;

    let req = business_logic::RegisterDriverRequest {
        file_name: fd.file_name.unwrap_or_default(),
        file_bytes,
        model: fd.model,
        driver_version: fd.driver_version,
        hardware_id: fd.hardware_id,
        os_version: fd.os_version,
        supported_hardware: fd.supported_hardware,
    };
    Ok(Json(
        business_logic::register_driver_logic(&state.db, &state.paths, req).await?,
    ))
}

async fn list_drivers(State(state): State<Arc<ServiceState>>) -> ApiResult<Vec<DriverSummary>> {
    Ok(Json(service_core::list_drivers_core(&state).await?))
}

async fn driver_detail(
    State(state): State<Arc<ServiceState>>,
    Path(hardware_id): Path<String>,
) -> ApiResult<DriverDetail> {
    Ok(Json(service_core::get_driver_core(&state, &hardware_id).await?))
}

async fn delete_driver(
    State(state): State<Arc<ServiceState>>,
    Json(req): Json<DeleteDriverRequest>,
) -> ApiResult<DeleteDriverResponse> {
    Ok(Json(business_logic::delete_driver_logic(&state.db, req).await?))
}

async fn installation_report(
    State(state): State<Arc<ServiceState>>,
    Json(report): Json<InstallationReport>,
) -> ApiResult<ReportAck> {
    Ok(Json(service_core::record_report_core(&state, report).await?))
}

async fn status_summary(State(state): State<Arc<ServiceState>>) -> ApiResult<StatusSummary> {
    Ok(Json(service_core::status_summary_core(&state).await?))
}
