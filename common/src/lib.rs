//! Wire types shared between the driverhub server and the agent.

use serde::{Deserialize, Serialize};

/// Lifecycle of an installation job. Stored as plain text in the jobs table;
/// reports carry the string form on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "in_progress" => Some(JobStatus::InProgress),
            "success" => Some(JobStatus::Success),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Jobs still counting against a computer (blocks deletion hints).
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::InProgress)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Computers ---

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterComputerRequest {
    pub name: String,
    pub ip: String,
    pub cpu: String,
    pub gpu: String,
    pub motherboard: String,
    pub network_adapters: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterComputerResponse {
    pub status: String,
    pub message: String,
    pub computer: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComputerSummary {
    pub name: String,
    pub ip: String,
    pub cpu: String,
    pub gpu: String,
    pub last_seen: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComputerInfo {
    pub name: String,
    pub ip: String,
    pub cpu: String,
    pub gpu: String,
    pub motherboard: String,
    pub network_adapters: Vec<String>,
    pub last_seen: String,
    pub created_at: String,
    pub active_installations: u64,
    pub can_be_deleted: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteComputerRequest {
    pub name: String,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteComputerResponse {
    pub status: String,
    pub message: String,
    pub computer: String,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub status: String,
    pub message: String,
    pub deleted_count: u64,
    pub criteria: String,
}

// --- Drivers ---

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverSummary {
    pub hardware_id: String,
    pub model: String,
    pub version: String,
    pub os: String,
    pub file_size: i64,
    pub original_filename: String,
    pub upload_date: String,
}

/// Upload confirmation for the file just written to the drivers directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredFileInfo {
    pub original_name: String,
    pub saved_as: String,
    pub size_bytes: i64,
    pub path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverInfo {
    pub model: String,
    pub version: String,
    pub os_version: String,
    pub supported_hardware: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterDriverResponse {
    pub status: String,
    pub message: String,
    pub driver_id: i32,
    pub hardware_id: String,
    pub auto_generated: bool,
    pub file_info: StoredFileInfo,
    pub driver_info: DriverInfo,
}

/// Detail view of the backing file, including whether it is still on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverFileInfo {
    pub path: String,
    pub size_bytes: i64,
    pub original_name: String,
    pub exists: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverCompatibility {
    pub os_version: String,
    pub supported_hardware: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverDetail {
    pub hardware_id: String,
    pub model: String,
    pub version: String,
    pub file_info: DriverFileInfo,
    pub compatibility: DriverCompatibility,
    pub upload_date: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteDriverRequest {
    pub hardware_id: String,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteDriverResponse {
    pub status: String,
    pub message: String,
    pub hardware_id: String,
    pub file_deleted: bool,
    pub reason: String,
}

// --- Update matching ---

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateCandidate {
    pub hardware: String,
    pub current_model: String,
    pub available_driver: String,
    pub version: String,
    pub hardware_id: String,
    pub action: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckUpdatesResponse {
    pub computer: String,
    pub available_updates: Vec<UpdateCandidate>,
    pub last_checked: String,
}

// --- Installation reports ---

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstallationReport {
    pub computer_name: String,
    pub hardware_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportAck {
    pub status: String,
    pub message: String,
    pub installation_status: String,
}

// --- Server status ---

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSummary {
    pub status: String,
    pub computers_registered: u64,
    pub drivers_available: u64,
    pub total_drivers_size_mb: f64,
    pub pending_installations: u64,
    pub outdated_computers: u64,
    pub cleanup_available: bool,
    pub server_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_round_trips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::InProgress,
            JobStatus::Success,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("cancelled"), None);
    }

    #[test]
    fn active_statuses() {
        assert!(JobStatus::Pending.is_active());
        assert!(JobStatus::InProgress.is_active());
        assert!(!JobStatus::Success.is_active());
        assert!(!JobStatus::Failed.is_active());
    }
}
