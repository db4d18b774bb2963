use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use common::{
    CheckUpdatesResponse, RegisterComputerRequest, RegisterComputerResponse, UpdateCandidate,
};

mod hardware;
mod installer;

use installer::{Installer, REQUEST_TIMEOUT};

#[derive(Parser, Debug)]
#[command(about = "Registers this machine with a driver catalog and installs pending updates")]
struct Args {
    /// Server address, e.g. 192.168.1.10:8000
    #[arg(short, long, env = "DRIVERHUB_URL")]
    url: String,

    /// Seconds to wait for a silent installer before giving up on it
    #[arg(long, env = "DRIVERHUB_INSTALL_TIMEOUT", default_value_t = 300)]
    install_timeout: u64,
}

/// Bare host:port gets a plain-HTTP scheme; trailing slashes are dropped so
/// endpoint paths can be appended directly.
fn normalize_url(raw: &str) -> String {
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    with_scheme.trim_end_matches('/').to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "driverhub_agent=info".into()),
        )
        .init();

    let args = Args::parse();
    let url = normalize_url(&args.url);

    let client = reqwest::Client::builder()
        .connect_timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")?;

    // 1. Inventory this machine
    let hw = hardware::probe();
    if hw.name.trim().is_empty() {
        anyhow::bail!("could not determine a hostname for this machine");
    }
    println!("Machine:      {} ({})", hw.name, hw.ip);
    println!("CPU:          {}", hw.cpu);
    println!("GPU:          {}", hw.gpu);
    println!("Motherboard:  {}", hw.motherboard);
    println!("OS:           {}", hw.os);

    // 2. Register with the catalog
    let registration = RegisterComputerRequest {
        name: hw.name.clone(),
        ip: hw.ip.clone(),
        cpu: hw.cpu.clone(),
        gpu: hw.gpu.clone(),
        motherboard: hw.motherboard.clone(),
        network_adapters: hw.network_adapters.clone(),
    };
    let response = client
        .post(format!("{url}/computers/register"))
        .timeout(REQUEST_TIMEOUT)
        .json(&registration)
        .send()
        .await
        .context("Failed to reach the driver catalog")?;

    if !response.status().is_success() {
        eprintln!("Registration rejected: {}", response.status());
        std::process::exit(1);
    }
    let ack: RegisterComputerResponse = response
        .json()
        .await
        .context("Registration response was not valid JSON")?;
    println!("Registered:   {}", ack.message);

    // 3. Ask for matching driver updates
    let candidates = fetch_candidates(&client, &url, &hw.name).await;
    if candidates.is_empty() {
        println!("No driver updates available.");
        return Ok(());
    }
    println!("Updates:      {} candidate(s)", candidates.len());

    // 4. Download, install silently, report every attempt
    let installer = Installer::new(client, &url, &hw.name)
        .with_install_timeout(Duration::from_secs(args.install_timeout));
    let total = candidates.len();
    let mut installed = 0usize;
    for (idx, candidate) in candidates.iter().enumerate() {
        println!(
            "[{}/{}] {} {} for {}",
            idx + 1,
            total,
            candidate.available_driver,
            candidate.version,
            candidate.hardware
        );
        if installer.install_one(candidate).await {
            installed += 1;
        }
    }
    println!("Finished: {installed}/{total} updates installed");

    Ok(())
}

/// Update check failures are not fatal; the agent simply has nothing to do.
async fn fetch_candidates(
    client: &reqwest::Client,
    url: &str,
    name: &str,
) -> Vec<UpdateCandidate> {
    let result = client
        .get(format!("{url}/computers/{name}/check-updates"))
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await
        .and_then(|r| r.error_for_status());
    match result {
        Ok(response) => match response.json::<CheckUpdatesResponse>().await {
            Ok(data) => data.available_updates,
            Err(err) => {
                tracing::warn!(error = %err, "update check returned malformed JSON");
                Vec::new()
            }
        },
        Err(err) => {
            tracing::warn!(error = %err, "update check failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_normalization() {
        assert_eq!(normalize_url("192.168.1.10:8000"), "http://192.168.1.10:8000");
        assert_eq!(normalize_url("http://hub.lan:8000/"), "http://hub.lan:8000");
        assert_eq!(normalize_url("https://hub.lan"), "https://hub.lan");
    }
}
