use std::fs;
use std::path::{Path, PathBuf};

use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use sha2::{Digest, Sha256};

use common::{
    DeleteDriverRequest, DeleteDriverResponse, DriverInfo, RegisterDriverResponse, StoredFileInfo,
};
use entity::{driver, installation_job};

use crate::config::DataPaths;
use crate::service_core::ServiceError;

pub const ALLOWED_EXTENSIONS: [&str; 5] = [".exe", ".msi", ".zip", ".inf", ".cab"];
pub const DEFAULT_OS_VERSION: &str = "Windows 10";

#[derive(Debug)]
pub struct RegisterDriverRequest {
    pub file_name: String,
    pub file_bytes: Vec<u8>,
    pub model: String,
    pub driver_version: String,
    pub hardware_id: Option<String>,
    pub os_version: Option<String>,
    pub supported_hardware: Option<String>,
}

/// Removes a stored upload, complete or partial, unless the catalog row landed.
struct StoredFile {
    path: PathBuf,
    committed: bool,
}

impl StoredFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for StoredFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Stable key for a driver package: normalized model+version plus a short
/// digest so near-identical names cannot share a slot.
pub fn generate_hardware_id(model: &str, version: &str) -> String {
    let base = format!("{model}_{version}");
    let clean: String = base
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let digest = Sha256::digest(base.as_bytes());
    format!("{}_{}", clean.to_lowercase(), hex::encode(&digest[..4]))
}

/// Lowercased extension with the leading dot, or empty when there is none.
fn file_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub async fn register_driver_logic(
    db: &DatabaseConnection,
    paths: &DataPaths,
    req: RegisterDriverRequest,
) -> Result<RegisterDriverResponse, ServiceError> {
    if req.model.trim().is_empty() || req.driver_version.trim().is_empty() {
        return Err(ServiceError::Validation(
            "model and driver_version are required".to_string(),
        ));
    }

    let ext = file_extension(&req.file_name);
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ServiceError::Validation(format!(
            "File type {:?} is not allowed (expected one of {})",
            ext,
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    let supplied = req
        .hardware_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let auto_generated = supplied.is_none();
    let mut hardware_id = match supplied {
        Some(id) => {
            // Supplied ids become file names; keep them inside the drivers dir.
            if id.contains("..") || id.contains(['/', '\\', ':']) {
                return Err(ServiceError::Validation(format!(
                    "hardware_id {id:?} must be a plain file name"
                )));
            }
            id.to_string()
        }
        None => generate_hardware_id(&req.model, &req.driver_version),
    };

    let collision = driver::Entity::find()
        .filter(driver::Column::HardwareId.eq(hardware_id.clone()))
        .one(db)
        .await?;
    if collision.is_some() {
        hardware_id = generate_hardware_id(&req.model, &format!("{}_dup", req.driver_version));
        tracing::warn!(hardware_id = %hardware_id, "hardware id collision, re-derived with suffix");

        let still_taken = driver::Entity::find()
            .filter(driver::Column::HardwareId.eq(hardware_id.clone()))
            .one(db)
            .await?;
        if still_taken.is_some() {
            return Err(ServiceError::Internal(format!(
                "hardware id {hardware_id} already registered"
            )));
        }
    }

    let os_version = req
        .os_version
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_OS_VERSION.to_string());

    let saved_as = format!("{hardware_id}{ext}");
    let file_path = paths.drivers_dir.join(&saved_as);
    let file_size = req.file_bytes.len() as i64;

    // Armed before the write; a failed or partial write is swept up on drop.
    let guard = StoredFile::new(file_path.clone());
    fs::write(&file_path, &req.file_bytes)?;

    let now = chrono::Utc::now().naive_utc();
    let row = driver::ActiveModel {
        hardware_id: Set(hardware_id.clone()),
        model: Set(req.model.clone()),
        driver_version: Set(req.driver_version.clone()),
        file_path: Set(file_path.to_string_lossy().to_string()),
        file_size: Set(file_size),
        original_filename: Set(req.file_name.clone()),
        os_version: Set(os_version.clone()),
        supported_hardware: Set(req.supported_hardware.clone()),
        upload_date: Set(now),
        created_at: Set(now),
        ..Default::default()
    };
    let inserted = row.insert(db).await?;
    guard.commit();

    tracing::info!(hardware_id = %hardware_id, size = file_size, "driver registered");
    Ok(RegisterDriverResponse {
        status: "success".to_string(),
        message: format!("Driver {} registered", req.model),
        driver_id: inserted.id,
        hardware_id,
        auto_generated,
        file_info: StoredFileInfo {
            original_name: req.file_name,
            saved_as,
            size_bytes: file_size,
            path: file_path.to_string_lossy().to_string(),
        },
        driver_info: DriverInfo {
            model: req.model,
            version: req.driver_version,
            os_version,
            supported_hardware: req.supported_hardware,
        },
    })
}

/// Row first, then its jobs, then the backing file. A missing file is not an
/// error; the flag in the response records what happened.
pub async fn delete_driver_logic(
    db: &DatabaseConnection,
    req: DeleteDriverRequest,
) -> Result<DeleteDriverResponse, ServiceError> {
    let model = driver::Entity::find()
        .filter(driver::Column::HardwareId.eq(req.hardware_id.clone()))
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Driver {} not found", req.hardware_id)))?;

    driver::Entity::delete_by_id(model.id).exec(db).await?;
    installation_job::Entity::delete_many()
        .filter(installation_job::Column::HardwareId.eq(req.hardware_id.clone()))
        .exec(db)
        .await?;

    let file_deleted = match fs::remove_file(&model.file_path) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(path = %model.file_path, error = %err, "driver file removal failed");
            false
        }
    };

    tracing::info!(hardware_id = %req.hardware_id, reason = %req.reason, "driver deleted");
    Ok(DeleteDriverResponse {
        status: "success".to_string(),
        message: format!("Driver {} deleted", req.hardware_id),
        hardware_id: req.hardware_id,
        file_deleted,
        reason: req.reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service_core::tests::test_state;

    fn upload(file_name: &str, model: &str, version: &str) -> RegisterDriverRequest {
        RegisterDriverRequest {
            file_name: file_name.to_string(),
            file_bytes: b"driver package bytes".to_vec(),
            model: model.to_string(),
            driver_version: version.to_string(),
            hardware_id: None,
            os_version: None,
            supported_hardware: None,
        }
    }

    fn dir_entries(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn hardware_id_is_deterministic_and_distinct() {
        let a = generate_hardware_id("NVIDIA GeForce GTX 1660", "531.61");
        let b = generate_hardware_id("NVIDIA GeForce GTX 1660", "531.61");
        let c = generate_hardware_id("NVIDIA GeForce GTX 1660", "532.03");
        assert_eq!(a, b);
        assert_ne!(a, c);

        assert!(a.starts_with("nvidia_geforce_gtx_1660_531_61_"));
        let digest = a.rsplit('_').next().unwrap();
        assert_eq!(digest.len(), 8);
        assert!(digest.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn hardware_id_normalizes_punctuation() {
        let id = generate_hardware_id("Intel(R) HD Graphics 530!", "27.20");
        assert!(!id.contains('('));
        assert!(!id.contains(')'));
        assert!(!id.contains('!'));
        assert_eq!(id, id.to_lowercase());
    }

    #[test]
    fn extensions_are_lowercased_with_dot() {
        assert_eq!(file_extension("Setup.EXE"), ".exe");
        assert_eq!(file_extension("pack.tar.gz"), ".gz");
        assert_eq!(file_extension("noext"), "");
    }

    #[tokio::test]
    async fn rejects_disallowed_extension_before_writing() {
        let (state, _dir) = test_state().await;

        let res = register_driver_logic(
            &state.db,
            &state.paths,
            upload("malware.bat", "NVIDIA GTX 1660", "531.61"),
        )
        .await;
        assert!(matches!(res, Err(ServiceError::Validation(_))));
        assert!(dir_entries(&state.paths.drivers_dir).is_empty());

        let missing_meta = register_driver_logic(
            &state.db,
            &state.paths,
            upload("driver.exe", "", "531.61"),
        )
        .await;
        assert!(matches!(missing_meta, Err(ServiceError::Validation(_))));
        assert!(dir_entries(&state.paths.drivers_dir).is_empty());
    }

    #[tokio::test]
    async fn registers_and_disambiguates_collisions() {
        let (state, _dir) = test_state().await;

        let first = register_driver_logic(
            &state.db,
            &state.paths,
            upload("nvidia.exe", "NVIDIA GTX 1660", "531.61"),
        )
        .await
        .unwrap();
        assert!(first.auto_generated);
        assert_eq!(first.file_info.saved_as, format!("{}.exe", first.hardware_id));
        assert!(state.paths.drivers_dir.join(&first.file_info.saved_as).exists());

        let second = register_driver_logic(
            &state.db,
            &state.paths,
            upload("nvidia.exe", "NVIDIA GTX 1660", "531.61"),
        )
        .await
        .unwrap();
        assert_ne!(second.hardware_id, first.hardware_id);
        assert_eq!(
            second.hardware_id,
            generate_hardware_id("NVIDIA GTX 1660", "531.61_dup")
        );
        assert_eq!(dir_entries(&state.paths.drivers_dir).len(), 2);

        // Both slots taken: rejected before any file is written.
        let third = register_driver_logic(
            &state.db,
            &state.paths,
            upload("nvidia.exe", "NVIDIA GTX 1660", "531.61"),
        )
        .await;
        assert!(matches!(third, Err(ServiceError::Internal(_))));
        assert_eq!(dir_entries(&state.paths.drivers_dir).len(), 2);
    }

    #[tokio::test]
    async fn supplied_hardware_id_is_kept() {
        let (state, _dir) = test_state().await;

        let mut req = upload("intel.zip", "Intel UHD 630", "27.20.100");
        req.hardware_id = Some("intel_custom_id".to_string());
        let resp = register_driver_logic(&state.db, &state.paths, req).await.unwrap();
        assert!(!resp.auto_generated);
        assert_eq!(resp.hardware_id, "intel_custom_id");
        assert_eq!(resp.file_info.saved_as, "intel_custom_id.zip");
        assert_eq!(resp.driver_info.os_version, DEFAULT_OS_VERSION);
    }

    #[tokio::test]
    async fn rejects_hardware_id_that_escapes_the_drivers_dir() {
        let (state, _dir) = test_state().await;

        for bad in ["../escaped", "nested/dir", "win\\dir", "/tmp/evil", "C:evil"] {
            let mut req = upload("evil.exe", "NVIDIA GTX 1660", "531.61");
            req.hardware_id = Some(bad.to_string());
            let res = register_driver_logic(&state.db, &state.paths, req).await;
            assert!(
                matches!(res, Err(ServiceError::Validation(_))),
                "{bad:?} was accepted"
            );
        }

        // Nothing stored, inside the drivers dir or above it.
        assert!(dir_entries(&state.paths.drivers_dir).is_empty());
        assert!(!state.paths.data_dir.join("escaped.exe").exists());
        let rows = driver::Entity::find().all(&state.db).await.unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn stored_file_guard_removes_partial_writes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("half.exe");
        {
            let _guard = StoredFile::new(path.clone());
            fs::write(&path, b"half written").unwrap();
        }
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn failed_write_leaves_no_row_behind() {
        let (state, _dir) = test_state().await;

        // Occupy the target path with a directory so the write itself fails.
        let expected = generate_hardware_id("NVIDIA GTX 1660", "531.61");
        fs::create_dir(state.paths.drivers_dir.join(format!("{expected}.exe"))).unwrap();

        let res = register_driver_logic(
            &state.db,
            &state.paths,
            upload("nvidia.exe", "NVIDIA GTX 1660", "531.61"),
        )
        .await;
        assert!(matches!(res, Err(ServiceError::Internal(_))));

        let rows = driver::Entity::find().all(&state.db).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(
            dir_entries(&state.paths.drivers_dir),
            vec![format!("{expected}.exe")]
        );
    }

    #[tokio::test]
    async fn delete_removes_row_jobs_and_file() {
        let (state, _dir) = test_state().await;

        let registered = register_driver_logic(
            &state.db,
            &state.paths,
            upload("amd.exe", "AMD Radeon RX 580", "23.4.1"),
        )
        .await
        .unwrap();

        crate::service_core::record_report_core(
            &state,
            common::InstallationReport {
                computer_name: "ws-07".to_string(),
                hardware_id: registered.hardware_id.clone(),
                status: "pending".to_string(),
                message: String::new(),
            },
        )
        .await
        .unwrap();

        let resp = delete_driver_logic(
            &state.db,
            DeleteDriverRequest {
                hardware_id: registered.hardware_id.clone(),
                reason: "superseded".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(resp.file_deleted);
        assert!(dir_entries(&state.paths.drivers_dir).is_empty());

        let jobs = installation_job::Entity::find()
            .filter(installation_job::Column::HardwareId.eq(registered.hardware_id.clone()))
            .all(&state.db)
            .await
            .unwrap();
        assert!(jobs.is_empty());

        let again = delete_driver_logic(
            &state.db,
            DeleteDriverRequest {
                hardware_id: registered.hardware_id,
                reason: "twice".to_string(),
            },
        )
        .await;
        assert!(matches!(again, Err(ServiceError::NotFound(_))));
    }
}
