use std::sync::Arc;

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use common::{
    CleanupResponse, ComputerInfo, ComputerSummary, DeleteComputerRequest, DeleteComputerResponse,
    DriverCompatibility, DriverDetail, DriverFileInfo, DriverSummary, InstallationReport,
    JobStatus, RegisterComputerRequest, RegisterComputerResponse, ReportAck, StatusSummary,
};
use entity::{computer, driver, installation_job};

use crate::config::DataPaths;

/// Computers past this many days without a check-in count as outdated in the
/// status summary.
const OUTDATED_AFTER_DAYS: i64 = 30;

pub struct ServiceState {
    pub db: DatabaseConnection,
    pub paths: DataPaths,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for ServiceError {
    fn from(err: sea_orm::DbErr) -> Self {
        ServiceError::Internal(format!("Database error: {err}"))
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Internal(format!("IO error: {err}"))
    }
}

fn split_adapters(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Insert-or-update keyed by hostname. Descriptive fields are overwritten and
/// last_seen refreshed; created_at survives re-registration.
pub async fn upsert_computer_core(
    state: &Arc<ServiceState>,
    req: RegisterComputerRequest,
) -> Result<RegisterComputerResponse, ServiceError> {
    let now = chrono::Utc::now().naive_utc();
    let adapters = req.network_adapters.join(",");

    let existing = computer::Entity::find_by_id(req.name.clone())
        .one(&state.db)
        .await?;

    match existing {
        Some(model) => {
            let mut active: computer::ActiveModel = model.into();
            active.ip = Set(req.ip);
            active.cpu = Set(req.cpu);
            active.gpu = Set(req.gpu);
            active.motherboard = Set(req.motherboard);
            active.network_adapters = Set(adapters);
            active.last_seen = Set(now);
            active.update(&state.db).await?;
        }
        None => {
            let model = computer::ActiveModel {
                name: Set(req.name.clone()),
                ip: Set(req.ip),
                cpu: Set(req.cpu),
                gpu: Set(req.gpu),
                motherboard: Set(req.motherboard),
                network_adapters: Set(adapters),
                last_seen: Set(now),
                created_at: Set(now),
            };
            model.insert(&state.db).await?;
        }
    }

    tracing::info!(computer = %req.name, "computer registered");
    Ok(RegisterComputerResponse {
        status: "success".to_string(),
        message: format!("Computer {} registered", req.name),
        computer: req.name,
    })
}

pub async fn list_computers_core(
    state: &Arc<ServiceState>,
) -> Result<Vec<ComputerSummary>, ServiceError> {
    let computers = computer::Entity::find()
        .order_by_desc(computer::Column::LastSeen)
        .all(&state.db)
        .await?;

    Ok(computers
        .into_iter()
        .map(|c| ComputerSummary {
            name: c.name,
            ip: c.ip,
            cpu: c.cpu,
            gpu: c.gpu,
            last_seen: c.last_seen.to_string(),
        })
        .collect())
}

async fn active_job_count(db: &DatabaseConnection, name: &str) -> Result<u64, ServiceError> {
    let count = installation_job::Entity::find()
        .filter(installation_job::Column::ComputerName.eq(name))
        .filter(installation_job::Column::Status.is_in([
            JobStatus::Pending.as_str(),
            JobStatus::InProgress.as_str(),
        ]))
        .count(db)
        .await?;
    Ok(count)
}

pub async fn get_computer_info_core(
    state: &Arc<ServiceState>,
    name: &str,
) -> Result<ComputerInfo, ServiceError> {
    let model = computer::Entity::find_by_id(name.to_string())
        .one(&state.db)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Computer {name} not found")))?;

    let active = active_job_count(&state.db, name).await?;

    Ok(ComputerInfo {
        name: model.name,
        ip: model.ip,
        cpu: model.cpu,
        gpu: model.gpu,
        motherboard: model.motherboard,
        network_adapters: split_adapters(&model.network_adapters),
        last_seen: model.last_seen.to_string(),
        created_at: model.created_at.to_string(),
        active_installations: active,
        can_be_deleted: active == 0,
    })
}

pub async fn delete_computer_core(
    state: &Arc<ServiceState>,
    req: DeleteComputerRequest,
) -> Result<DeleteComputerResponse, ServiceError> {
    computer::Entity::find_by_id(req.name.clone())
        .one(&state.db)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Computer {} not found", req.name)))?;

    installation_job::Entity::delete_many()
        .filter(installation_job::Column::ComputerName.eq(req.name.clone()))
        .exec(&state.db)
        .await?;
    computer::Entity::delete_by_id(req.name.clone())
        .exec(&state.db)
        .await?;

    tracing::info!(computer = %req.name, reason = %req.reason, "computer deleted");
    Ok(DeleteComputerResponse {
        status: "success".to_string(),
        message: format!("Computer {} deleted", req.name),
        computer: req.name,
        reason: req.reason,
    })
}

/// Sweep for machines that stopped checking in. Jobs go first, then the row,
/// mirroring the explicit delete.
pub async fn cleanup_stale_core(
    state: &Arc<ServiceState>,
    days_offline: i64,
) -> Result<CleanupResponse, ServiceError> {
    let cutoff = chrono::Utc::now().naive_utc() - chrono::Duration::days(days_offline);
    let stale = computer::Entity::find()
        .filter(computer::Column::LastSeen.lt(cutoff))
        .all(&state.db)
        .await?;

    let mut deleted = 0u64;
    for machine in &stale {
        installation_job::Entity::delete_many()
            .filter(installation_job::Column::ComputerName.eq(machine.name.clone()))
            .exec(&state.db)
            .await?;
        computer::Entity::delete_by_id(machine.name.clone())
            .exec(&state.db)
            .await?;
        deleted += 1;
    }

    tracing::info!(deleted, days_offline, "stale computer cleanup");
    Ok(CleanupResponse {
        status: "success".to_string(),
        message: format!("Removed {deleted} stale computers"),
        deleted_count: deleted,
        criteria: format!("offline for more than {days_offline} days"),
    })
}

pub async fn list_drivers_core(
    state: &Arc<ServiceState>,
) -> Result<Vec<DriverSummary>, ServiceError> {
    let drivers = driver::Entity::find()
        .order_by_asc(driver::Column::Model)
        .order_by_asc(driver::Column::DriverVersion)
        .all(&state.db)
        .await?;

    Ok(drivers
        .into_iter()
        .map(|d| DriverSummary {
            hardware_id: d.hardware_id,
            model: d.model,
            version: d.driver_version,
            os: d.os_version,
            file_size: d.file_size,
            original_filename: d.original_filename,
            upload_date: d.upload_date.to_string(),
        })
        .collect())
}

pub async fn get_driver_core(
    state: &Arc<ServiceState>,
    hardware_id: &str,
) -> Result<DriverDetail, ServiceError> {
    let model = driver::Entity::find()
        .filter(driver::Column::HardwareId.eq(hardware_id))
        .one(&state.db)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Driver {hardware_id} not found")))?;

    let exists = std::path::Path::new(&model.file_path).exists();

    Ok(DriverDetail {
        hardware_id: model.hardware_id,
        model: model.model,
        version: model.driver_version,
        file_info: DriverFileInfo {
            path: model.file_path,
            size_bytes: model.file_size,
            original_name: model.original_filename,
            exists,
        },
        compatibility: DriverCompatibility {
            os_version: model.os_version,
            supported_hardware: model.supported_hardware,
        },
        upload_date: model.upload_date.to_string(),
    })
}

/// Applies an agent report to every job matching the (computer, hardware id)
/// pair; a first report with no matching job creates the row.
pub async fn record_report_core(
    state: &Arc<ServiceState>,
    report: InstallationReport,
) -> Result<ReportAck, ServiceError> {
    let status = JobStatus::parse(&report.status).ok_or_else(|| {
        ServiceError::Validation(format!("Unknown installation status {:?}", report.status))
    })?;
    let now = chrono::Utc::now().naive_utc();

    let updated = installation_job::Entity::update_many()
        .col_expr(installation_job::Column::Status, Expr::value(status.as_str()))
        .col_expr(installation_job::Column::CompletedAt, Expr::value(now))
        .filter(installation_job::Column::ComputerName.eq(report.computer_name.clone()))
        .filter(installation_job::Column::HardwareId.eq(report.hardware_id.clone()))
        .exec(&state.db)
        .await?;

    if updated.rows_affected == 0 {
        let driver_id = driver::Entity::find()
            .filter(driver::Column::HardwareId.eq(report.hardware_id.clone()))
            .one(&state.db)
            .await?
            .map(|d| d.id);

        let job = installation_job::ActiveModel {
            computer_name: Set(report.computer_name.clone()),
            hardware_id: Set(report.hardware_id.clone()),
            driver_id: Set(driver_id),
            status: Set(status.as_str().to_string()),
            created_at: Set(now),
            completed_at: Set(Some(now)),
            ..Default::default()
        };
        job.insert(&state.db).await?;
    }

    tracing::info!(
        computer = %report.computer_name,
        hardware_id = %report.hardware_id,
        status = %status,
        "installation report recorded"
    );
    Ok(ReportAck {
        status: "success".to_string(),
        message: format!("Installation report for {} recorded", report.hardware_id),
        installation_status: status.as_str().to_string(),
    })
}

pub async fn status_summary_core(
    state: &Arc<ServiceState>,
) -> Result<StatusSummary, ServiceError> {
    let computers = computer::Entity::find().count(&state.db).await?;
    let drivers = driver::Entity::find().count(&state.db).await?;

    let total_bytes: Option<i64> = driver::Entity::find()
        .select_only()
        .column_as(driver::Column::FileSize.sum(), "total_size")
        .into_tuple()
        .one(&state.db)
        .await?
        .flatten();
    let total_mb = total_bytes.unwrap_or(0) as f64 / (1024.0 * 1024.0);

    let pending = installation_job::Entity::find()
        .filter(installation_job::Column::Status.eq(JobStatus::Pending.as_str()))
        .count(&state.db)
        .await?;

    let cutoff = chrono::Utc::now().naive_utc() - chrono::Duration::days(OUTDATED_AFTER_DAYS);
    let outdated = computer::Entity::find()
        .filter(computer::Column::LastSeen.lt(cutoff))
        .count(&state.db)
        .await?;

    Ok(StatusSummary {
        status: "running".to_string(),
        computers_registered: computers,
        drivers_available: drivers,
        total_drivers_size_mb: (total_mb * 100.0).round() / 100.0,
        pending_installations: pending,
        outdated_computers: outdated,
        cleanup_available: outdated > 0,
        server_time: chrono::Utc::now().to_rfc3339(),
    })
}
