use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};

use common::{ComputerSummary, DeleteDriverRequest, DriverSummary, StatusSummary};

use crate::business_logic;
use crate::service_core::{self, ServiceError, ServiceState};
use crate::MAX_BODY_BYTES;

/// Driver list entry with the size pre-formatted for the page.
struct DriverRow {
    hardware_id: String,
    model: String,
    version: String,
    os: String,
    size_mb: String,
    uploaded: String,
}

impl From<DriverSummary> for DriverRow {
    fn from(d: DriverSummary) -> Self {
        Self {
            size_mb: format!("{:.2}", d.file_size as f64 / (1024.0 * 1024.0)),
            hardware_id: d.hardware_id,
            model: d.model,
            version: d.version,
            os: d.os,
            uploaded: d.upload_date,
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    summary: StatusSummary,
    computers: Vec<ComputerSummary>,
    drivers: Vec<DriverRow>,
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate {
    message: String,
}

struct WebError(StatusCode, String);

impl From<ServiceError> for WebError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(msg) => WebError(StatusCode::NOT_FOUND, msg),
            ServiceError::Validation(msg) => WebError(StatusCode::BAD_REQUEST, msg),
            ServiceError::Internal(msg) => {
                tracing::error!(error = %msg, "management request failed");
                WebError(StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        }
    }
}

impl From<askama::Error> for WebError {
    fn from(err: askama::Error) -> Self {
        WebError(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("template rendering failed: {err}"),
        )
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let body = ErrorTemplate { message: self.1 }
            .render()
            .unwrap_or_else(|_| "management page rendering failed".to_string());
        (self.0, Html(body)).into_response()
    }
}

fn bad_upload(err: axum::extract::multipart::MultipartError) -> WebError {
    WebError(StatusCode::BAD_REQUEST, format!("Invalid upload: {err}"))
}

pub fn router(state: Arc<ServiceState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload_action))
        .route("/delete/:hardware_id", get(delete_action))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn index(State(state): State<Arc<ServiceState>>) -> Result<Html<String>, WebError> {
    let summary = service_core::status_summary_core(&state).await?;
    let computers = service_core::list_computers_core(&state).await?;
    let drivers: Vec<DriverRow> = service_core::list_drivers_core(&state)
        .await?
        .into_iter()
        .map(DriverRow::from)
        .collect();

    let page = IndexTemplate {
        summary,
        computers,
        drivers,
    };
    Ok(Html(page.render()?))
}

/// Upload form target. The hardware id is always derived here; operators who
/// need to pick their own use the REST endpoint.
async fn upload_action(
    State(state): State<Arc<ServiceState>>,
    mut multipart: Multipart,
) -> Result<Redirect, WebError> {
    let mut file_name = None;
    let mut file_bytes = None;
    let mut model = String::new();
    let mut driver_version = String::new();
    let mut os_version = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_upload)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            file_name = field.file_name().map(|s| s.to_string());
            file_bytes = Some(field.bytes().await.map_err(bad_upload)?.to_vec());
        } else {
            let txt = field.text().await.map_err(bad_upload)?;
            match name.as_str() {
                "model" => model = txt,
                "driver_version" => driver_version = txt,
                "os_version" => os_version = Some(txt).filter(|s| !s.trim().is_empty()),
                _ => {}
            }
        }
    }

    let req = business_logic::RegisterDriverRequest {
        file_name: file_name.unwrap_or_default(),
        file_bytes: file_bytes.ok_or_else(|| {
            WebError(StatusCode::BAD_REQUEST, "driver file is required".to_string())
        })?,
        model,
        driver_version,
        hardware_id: None,
        os_version,
        supported_hardware: None,
    };
    business_logic::register_driver_logic(&state.db, &state.paths, req).await?;
    Ok(Redirect::to("/"))
}

async fn delete_action(
    State(state): State<Arc<ServiceState>>,
    Path(hardware_id): Path<String>,
) -> Result<Redirect, WebError> {
    business_logic::delete_driver_logic(
        &state.db,
        DeleteDriverRequest {
            hardware_id,
            reason: "deleted via the web interface".to_string(),
        },
    )
    .await?;
    Ok(Redirect::to("/"))
}
