//! Best-effort hardware inventory. Probes shell out to `wmic` on Windows and
//! fall back to uname or placeholders elsewhere; nothing here is fatal.

use std::net::ToSocketAddrs;
use std::process::Command;

#[derive(Clone, Debug)]
pub struct HardwareInfo {
    pub name: String,
    pub ip: String,
    pub cpu: String,
    pub gpu: String,
    pub motherboard: String,
    pub network_adapters: Vec<String>,
    pub os: String,
}

pub fn probe() -> HardwareInfo {
    let name = detect_hostname();
    let ip = resolve_ip(&name);
    HardwareInfo {
        ip,
        cpu: detect_cpu(),
        gpu: detect_gpu(),
        motherboard: detect_motherboard(),
        network_adapters: detect_network_adapters(),
        os: detect_os(),
        name,
    }
}

/// Runs a command and returns trimmed stdout, or None when the binary is
/// missing or exits nonzero.
fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// `wmic <query>` prints a header line followed by one value per row.
fn parse_wmic_table(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .skip(1)
        .map(str::to_string)
        .collect()
}

fn wmic_values(query: &[&str]) -> Vec<String> {
    command_stdout("wmic", query)
        .map(|out| parse_wmic_table(&out))
        .unwrap_or_default()
}

fn detect_cpu() -> String {
    wmic_values(&["cpu", "get", "name"])
        .into_iter()
        .next()
        .or_else(|| command_stdout("uname", &["-p"]))
        .unwrap_or_else(|| "Unknown CPU".to_string())
}

fn detect_gpu() -> String {
    wmic_values(&["path", "win32_videocontroller", "get", "name"])
        .into_iter()
        .next()
        .unwrap_or_else(|| "Unknown GPU".to_string())
}

fn detect_motherboard() -> String {
    wmic_values(&["baseboard", "get", "product"])
        .into_iter()
        .next()
        .unwrap_or_else(|| "Unknown motherboard".to_string())
}

fn detect_network_adapters() -> Vec<String> {
    let adapters = wmic_values(&["nic", "where", "netenabled=true", "get", "name"]);
    if adapters.is_empty() {
        vec!["Network adapter".to_string()]
    } else {
        adapters
    }
}

fn detect_hostname() -> String {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| command_stdout("hostname", &[]))
        .unwrap_or_else(|| "unknown-host".to_string())
}

/// First address the hostname resolves to; loopback when resolution fails.
pub fn resolve_ip(hostname: &str) -> String {
    (hostname, 0u16)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

fn detect_os() -> String {
    command_stdout("cmd", &["/C", "ver"])
        .or_else(|| command_stdout("uname", &["-sr"]))
        .unwrap_or_else(|| std::env::consts::OS.to_string())
}
