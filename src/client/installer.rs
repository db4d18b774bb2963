use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use common::{DriverDetail, InstallationReport, JobStatus, UpdateCandidate};

/// Short timeout for catalog calls. Package downloads run without one since a
/// driver bundle can take minutes on a busy LAN.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);
/// Flags understood by both NSIS-style and MSI-style installers.
const SILENT_ARGS: [&str; 2] = ["/S", "/quiet"];

#[derive(Debug)]
enum InstallOutcome {
    Completed { success: bool, detail: String },
    TimedOut,
}

/// Downloads driver packages, runs them silently and reports every attempt
/// back to the catalog.
pub struct Installer {
    client: reqwest::Client,
    server_url: String,
    computer_name: String,
    install_timeout: Duration,
}

impl Installer {
    pub fn new(client: reqwest::Client, server_url: &str, computer_name: &str) -> Self {
        Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            computer_name: computer_name.to_string(),
            install_timeout: DEFAULT_INSTALL_TIMEOUT,
        }
    }

    pub fn with_install_timeout(mut self, timeout: Duration) -> Self {
        self.install_timeout = timeout;
        self
    }

    /// Full attempt for one update candidate. Every exit path files a report;
    /// returns true only when the installer finished successfully.
    pub async fn install_one(&self, candidate: &UpdateCandidate) -> bool {
        let package = match self.download(candidate).await {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(
                    hardware_id = %candidate.hardware_id,
                    error = %format!("{err:#}"),
                    "package download failed"
                );
                self.report(&candidate.hardware_id, JobStatus::Failed, "could not download driver")
                    .await;
                return false;
            }
        };

        if !cfg!(target_os = "windows") {
            self.report(
                &candidate.hardware_id,
                JobStatus::Failed,
                "automatic installation only supported on Windows",
            )
            .await;
            return false;
        }

        self.report(&candidate.hardware_id, JobStatus::InProgress, "running installer")
            .await;

        // Close the write handle before executing; the path is still removed
        // when the guard drops.
        let package = package.into_temp_path();

        match run_silent_install(&package, self.install_timeout).await {
            Ok(InstallOutcome::Completed { success: true, .. }) => {
                self.report(
                    &candidate.hardware_id,
                    JobStatus::Success,
                    &format!(
                        "driver {} {} installed",
                        candidate.available_driver, candidate.version
                    ),
                )
                .await;
                true
            }
            Ok(InstallOutcome::Completed { success: false, detail }) => {
                self.report(&candidate.hardware_id, JobStatus::Failed, &detail).await;
                false
            }
            Ok(InstallOutcome::TimedOut) => {
                self.report(
                    &candidate.hardware_id,
                    JobStatus::Failed,
                    &format!("installer timed out after {}s", self.install_timeout.as_secs()),
                )
                .await;
                false
            }
            Err(err) => {
                self.report(&candidate.hardware_id, JobStatus::Failed, &format!("{err:#}"))
                    .await;
                false
            }
        }
    }

    /// Looks up the stored file name, then streams the package into a scratch
    /// file that removes itself when dropped.
    async fn download(&self, candidate: &UpdateCandidate) -> Result<NamedTempFile> {
        let detail: DriverDetail = self
            .client
            .get(format!("{}/drivers/{}", self.server_url, candidate.hardware_id))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("driver detail request failed")?
            .error_for_status()?
            .json()
            .await
            .context("driver detail response was not valid JSON")?;

        let file_name = Path::new(&detail.file_info.path)
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .context("driver detail carried no file name")?;

        let mut response = self
            .client
            .get(format!("{}/static/{}", self.server_url, file_name))
            .send()
            .await
            .context("package download failed")?
            .error_for_status()?;

        let mut file = scratch_file(&file_name)?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)?;
        }
        file.flush()?;
        Ok(file)
    }

    /// Best effort: a report the catalog never receives only gets a warning,
    /// the install loop keeps going.
    async fn report(&self, hardware_id: &str, status: JobStatus, message: &str) {
        let body = InstallationReport {
            computer_name: self.computer_name.clone(),
            hardware_id: hardware_id.to_string(),
            status: status.as_str().to_string(),
            message: message.to_string(),
        };
        let sent = self
            .client
            .post(format!("{}/installation/report", self.server_url))
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .and_then(|resp| resp.error_for_status());
        if let Err(err) = sent {
            tracing::warn!(hardware_id, error = %err, "installation report not delivered");
        }
    }
}

/// Scratch file keeping the package extension so Windows will execute it.
fn scratch_file(file_name: &str) -> Result<NamedTempFile> {
    let suffix = Path::new(file_name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    tempfile::Builder::new()
        .prefix("driverhub-")
        .suffix(&suffix)
        .tempfile()
        .context("could not create scratch file for download")
}

/// Launches the package with silent flags and waits up to `timeout`. The
/// child is killed when the wait is abandoned.
async fn run_silent_install(path: &Path, timeout: Duration) -> Result<InstallOutcome> {
    let child = tokio::process::Command::new(path)
        .args(SILENT_ARGS)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to launch installer {}", path.display()))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => {
            let output = output.context("installer did not report an exit status")?;
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if output.status.success() {
                "installer exited successfully".to_string()
            } else if stderr.is_empty() {
                format!("installer exited with {}", output.status)
            } else {
                format!("installer exited with {}: {stderr}", output.status)
            };
            Ok(InstallOutcome::Completed {
                success: output.status.success(),
                detail,
            })
        }
        Err(_) => Ok(InstallOutcome::TimedOut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    use common::{DriverCompatibility, DriverFileInfo};

    #[derive(Clone)]
    struct Catalog {
        detail: Option<DriverDetail>,
        payload: Vec<u8>,
        reports: Arc<Mutex<Vec<InstallationReport>>>,
    }

    async fn detail_route(State(catalog): State<Catalog>) -> axum::response::Response {
        match catalog.detail {
            Some(detail) => Json(detail).into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn payload_route(State(catalog): State<Catalog>) -> Vec<u8> {
        catalog.payload
    }

    async fn report_route(
        State(catalog): State<Catalog>,
        Json(report): Json<InstallationReport>,
    ) -> Json<serde_json::Value> {
        catalog.reports.lock().unwrap().push(report);
        Json(serde_json::json!({ "status": "success" }))
    }

    async fn spawn_catalog(
        detail: Option<DriverDetail>,
        payload: &[u8],
    ) -> (String, Arc<Mutex<Vec<InstallationReport>>>) {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let catalog = Catalog {
            detail,
            payload: payload.to_vec(),
            reports: reports.clone(),
        };
        let app = Router::new()
            .route("/drivers/:hardware_id", get(detail_route))
            .route("/static/:file", get(payload_route))
            .route("/installation/report", post(report_route))
            .with_state(catalog);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), reports)
    }

    fn sample_detail() -> DriverDetail {
        DriverDetail {
            hardware_id: "nvidia_gtx_1660_abcd1234".to_string(),
            model: "NVIDIA GeForce Driver".to_string(),
            version: "531.61".to_string(),
            file_info: DriverFileInfo {
                path: "data/drivers/nvidia_gtx_1660_abcd1234.exe".to_string(),
                size_bytes: 15,
                original_name: "nvidia.exe".to_string(),
                exists: true,
            },
            compatibility: DriverCompatibility {
                os_version: "Windows 10".to_string(),
                supported_hardware: None,
            },
            upload_date: "2026-08-01 12:00:00".to_string(),
        }
    }

    fn sample_candidate() -> UpdateCandidate {
        UpdateCandidate {
            hardware: "NVIDIA GeForce GTX 1660".to_string(),
            current_model: "NVIDIA GeForce GTX 1660".to_string(),
            available_driver: "NVIDIA GeForce Driver".to_string(),
            version: "531.61".to_string(),
            hardware_id: "nvidia_gtx_1660_abcd1234".to_string(),
            action: "install".to_string(),
        }
    }

    #[cfg(unix)]
    fn script(body: &str) -> tempfile::TempPath {
        use std::os::unix::fs::PermissionsExt;
        let mut file = tempfile::Builder::new()
            .prefix("driverhub-test-")
            .suffix(".sh")
            .tempfile()
            .unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.flush().unwrap();
        let mut perms = file.as_file().metadata().unwrap().permissions();
        perms.set_mode(0o755);
        file.as_file().set_permissions(perms).unwrap();
        file.into_temp_path()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_install_reports_exit_status() {
        let ok = script("#!/bin/sh\nexit 0\n");
        match run_silent_install(&ok, Duration::from_secs(5)).await.unwrap() {
            InstallOutcome::Completed { success, .. } => assert!(success),
            other => panic!("unexpected outcome: {other:?}"),
        }

        let bad = script("#!/bin/sh\necho boom >&2\nexit 3\n");
        match run_silent_install(&bad, Duration::from_secs(5)).await.unwrap() {
            InstallOutcome::Completed { success, detail } => {
                assert!(!success);
                assert!(detail.contains("boom"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_installer_times_out() {
        let slow = script("#!/bin/sh\nsleep 5\n");
        let outcome = run_silent_install(&slow, Duration::from_millis(200))
            .await
            .unwrap();
        assert!(matches!(outcome, InstallOutcome::TimedOut));
    }

    #[tokio::test]
    async fn install_timeout_is_configurable() {
        let installer = Installer::new(reqwest::Client::new(), "http://hub.lan:8000/", "ws-test")
            .with_install_timeout(Duration::from_secs(30));
        assert_eq!(installer.install_timeout, Duration::from_secs(30));
        assert_eq!(installer.server_url, "http://hub.lan:8000");
    }

    #[tokio::test]
    async fn downloaded_package_is_removed_with_its_guard() {
        let (url, _reports) = spawn_catalog(Some(sample_detail()), b"package-payload").await;
        let installer = Installer::new(reqwest::Client::new(), &url, "ws-test");

        let file = installer.download(&sample_candidate()).await.unwrap();
        let path = file.path().to_path_buf();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("exe"));
        assert_eq!(std::fs::read(&path).unwrap(), b"package-payload");

        drop(file);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn download_failure_is_reported_as_failed() {
        let (url, reports) = spawn_catalog(None, b"").await;
        let installer = Installer::new(reqwest::Client::new(), &url, "ws-test");

        let installed = installer.install_one(&sample_candidate()).await;
        assert!(!installed);

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].computer_name, "ws-test");
        assert_eq!(reports[0].status, "failed");
        assert_eq!(reports[0].message, "could not download driver");
    }

    #[cfg(not(target_os = "windows"))]
    #[tokio::test]
    async fn install_is_gated_to_windows_after_download() {
        let (url, reports) = spawn_catalog(Some(sample_detail()), b"package-payload").await;
        let installer = Installer::new(reqwest::Client::new(), &url, "ws-test");

        let installed = installer.install_one(&sample_candidate()).await;
        assert!(!installed);

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, "failed");
        assert_eq!(
            reports[0].message,
            "automatic installation only supported on Windows"
        );
    }
}
