//! Nmap process wrapper.
//!
//! Runs one nmap per host under `tokio::process::Command` and parses the
//! XML written to stdout into the host's open ports.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use lanwatch_core::OpenPort;

use crate::config::PortScanConfig;
use crate::error::{DiscoverError, Result};
use crate::nmap_xml;
use crate::portscan::PortProbe;

/// Wrapper around the nmap binary.
pub struct NmapScanner {
    nmap_path: String,
    top_ports: u32,
    host_timeout: Duration,
}

impl NmapScanner {
    pub fn new(config: &PortScanConfig) -> Self {
        Self {
            nmap_path: config.nmap_path.clone(),
            top_ports: config.top_ports,
            host_timeout: Duration::from_secs(config.host_timeout_secs),
        }
    }

    /// Verify nmap is installed and accessible.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = Command::new(&self.nmap_path)
            .arg("--version")
            .output()
            .await
            .map_err(|_| DiscoverError::NmapNotFound {
                path: self.nmap_path.clone(),
            })?;

        String::from_utf8(output.stdout).map_err(|e| DiscoverError::XmlParse(e.to_string()))
    }

    fn args(&self, ip: Ipv4Addr) -> Vec<String> {
        vec![
            "-Pn".to_string(),
            "-T4".to_string(),
            "--top-ports".to_string(),
            self.top_ports.to_string(),
            "-oX".to_string(),
            "-".to_string(),
            "--noninteractive".to_string(),
            ip.to_string(),
        ]
    }
}

#[async_trait]
impl PortProbe for NmapScanner {
    async fn scan_host(&self, ip: Ipv4Addr) -> Result<Vec<OpenPort>> {
        let start = Instant::now();
        tracing::debug!(ip = %ip, top_ports = self.top_ports, "Starting nmap port scan");

        let run = Command::new(&self.nmap_path)
            .args(self.args(ip))
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.host_timeout, run)
            .await
            .map_err(|_| DiscoverError::ExternalTool {
                ip: ip.to_string(),
                message: format!("nmap exceeded {}s", self.host_timeout.as_secs()),
            })?
            .map_err(|e| DiscoverError::NmapNotFound {
                path: format!("{}: {e}", self.nmap_path),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(DiscoverError::NmapFailed {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let run = nmap_xml::parse_nmap_xml(&output.stdout)?;
        let ports = run.open_ports_for(&ip.to_string());

        tracing::debug!(
            ip = %ip,
            open_ports = ports.len(),
            duration_ms = start.elapsed().as_millis(),
            "Nmap port scan complete"
        );
        Ok(ports)
    }
}
