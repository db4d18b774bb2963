use std::sync::Arc;

use sea_orm::sea_query::{Expr, Func};
use sea_orm::{EntityTrait, QueryFilter};

use common::{CheckUpdatesResponse, UpdateCandidate};
use entity::{computer, driver};

use crate::service_core::{ServiceError, ServiceState};

/// Vendor tokens recognized in a detected GPU string. AMD and RADEON label
/// the same hardware in the wild, so either one pulls in both.
pub fn vendor_tokens(gpu: &str) -> Vec<&'static str> {
    let upper = gpu.to_uppercase();
    let mut tokens = Vec::new();
    if upper.contains("NVIDIA") {
        tokens.push("NVIDIA");
    }
    if upper.contains("AMD") || upper.contains("RADEON") {
        tokens.push("AMD");
        tokens.push("RADEON");
    }
    if upper.contains("INTEL") {
        tokens.push("INTEL");
    }
    tokens
}

/// Drivers whose model mentions any vendor token of the computer's GPU.
/// Matching is case-insensitive on both sides; overlapping tokens can yield
/// the same driver more than once and the duplicates are kept.
pub async fn find_updates_core(
    state: &Arc<ServiceState>,
    name: &str,
) -> Result<CheckUpdatesResponse, ServiceError> {
    let machine = computer::Entity::find_by_id(name.to_string())
        .one(&state.db)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Computer {name} not found")))?;

    let mut candidates = Vec::new();
    for token in vendor_tokens(&machine.gpu) {
        let pattern = format!("%{token}%");
        let rows = driver::Entity::find()
            .filter(Expr::expr(Func::upper(Expr::col(driver::Column::Model))).like(pattern))
            .all(&state.db)
            .await?;
        for drv in rows {
            candidates.push(UpdateCandidate {
                hardware: "GPU".to_string(),
                current_model: machine.gpu.clone(),
                available_driver: drv.model,
                version: drv.driver_version,
                hardware_id: drv.hardware_id,
                action: "install".to_string(),
            });
        }
    }

    tracing::info!(computer = %name, candidates = candidates.len(), "update check");
    Ok(CheckUpdatesResponse {
        computer: machine.name,
        available_updates: candidates,
        last_checked: chrono::Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business_logic::{register_driver_logic, RegisterDriverRequest};
    use crate::service_core::tests::{sample_computer, test_state};
    use crate::service_core::upsert_computer_core;

    #[test]
    fn tokens_follow_vendor_substrings() {
        assert_eq!(vendor_tokens("nvidia geforce rtx 3060"), vec!["NVIDIA"]);
        assert_eq!(vendor_tokens("AMD Radeon RX 580"), vec!["AMD", "RADEON"]);
        assert_eq!(vendor_tokens("Radeon RX 6600"), vec!["AMD", "RADEON"]);
        assert_eq!(vendor_tokens("Intel(R) UHD Graphics 630"), vec!["INTEL"]);
        assert!(vendor_tokens("Matrox G200").is_empty());
        assert!(vendor_tokens("").is_empty());
    }

    async fn seed_driver(state: &Arc<ServiceState>, model: &str, version: &str) -> String {
        let resp = register_driver_logic(
            &state.db,
            &state.paths,
            RegisterDriverRequest {
                file_name: "driver.exe".to_string(),
                file_bytes: b"bytes".to_vec(),
                model: model.to_string(),
                driver_version: version.to_string(),
                hardware_id: None,
                os_version: None,
                supported_hardware: None,
            },
        )
        .await
        .unwrap();
        resp.hardware_id
    }

    #[tokio::test]
    async fn nvidia_gpu_matches_lowercase_catalog_entry() {
        let (state, _dir) = test_state().await;
        upsert_computer_core(&state, sample_computer("ws-10", "NVIDIA GeForce GTX 1660"))
            .await
            .unwrap();
        let hardware_id = seed_driver(&state, "nvidia geforce game ready", "531.61").await;
        seed_driver(&state, "Intel Wi-Fi Driver", "22.150").await;

        let resp = find_updates_core(&state, "ws-10").await.unwrap();
        assert_eq!(resp.computer, "ws-10");
        assert_eq!(resp.available_updates.len(), 1);
        let candidate = &resp.available_updates[0];
        assert_eq!(candidate.hardware, "GPU");
        assert_eq!(candidate.hardware_id, hardware_id);
        assert_eq!(candidate.current_model, "NVIDIA GeForce GTX 1660");
        assert_eq!(candidate.action, "install");
    }

    #[tokio::test]
    async fn amd_gpu_yields_duplicate_candidates_for_overlapping_tokens() {
        let (state, _dir) = test_state().await;
        upsert_computer_core(&state, sample_computer("ws-11", "AMD Radeon RX 580"))
            .await
            .unwrap();
        // Mentions both AMD and RADEON, so it matches under each token.
        seed_driver(&state, "AMD Radeon Adrenalin", "23.4.1").await;

        let resp = find_updates_core(&state, "ws-11").await.unwrap();
        assert_eq!(resp.available_updates.len(), 2);
        assert_eq!(resp.available_updates[0], resp.available_updates[1]);
    }

    #[tokio::test]
    async fn unknown_computer_is_not_found() {
        let (state, _dir) = test_state().await;
        let res = find_updates_core(&state, "ghost").await;
        assert!(matches!(res, Err(ServiceError::NotFound(_))));
    }
}
