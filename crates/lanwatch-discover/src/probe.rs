//! Host probing: liveness, latency, MAC, vendor and reverse DNS.
//!
//! [`HostProbe`] is the system seam (ping binary, ARP table, resolver).
//! [`HostProber`] drives it over a target list in bounded batches and
//! streams one [`ProbeOutcome`] per target to the caller.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use lanwatch_core::ScanType;

use crate::config::ProbeConfig;
use crate::error::{DiscoverError, Result};
use crate::vendors::VendorDb;

#[async_trait]
pub trait HostProbe: Send + Sync {
    /// `Ok` when the host answered, with the round trip if it was reported.
    async fn ping(&self, ip: Ipv4Addr, timeout: Duration) -> Result<Option<f64>>;

    async fn mac_address(&self, ip: Ipv4Addr) -> Option<String>;

    async fn reverse_dns(&self, ip: Ipv4Addr, timeout: Duration) -> Option<String>;
}

/// Probe backed by the system `ping`, the kernel ARP table and the resolver.
pub struct SystemProbe {
    ping_path: String,
    ip_path: String,
    arp_table_path: String,
}

impl SystemProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            ping_path: config.ping_path.clone(),
            ip_path: config.ip_path.clone(),
            arp_table_path: config.arp_table_path.clone(),
        }
    }
}

#[async_trait]
impl HostProbe for SystemProbe {
    async fn ping(&self, ip: Ipv4Addr, timeout: Duration) -> Result<Option<f64>> {
        let wait_secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        let started = Instant::now();
        let run = Command::new(&self.ping_path)
            .args(["-c", "1", "-W", &wait_secs.to_string(), &ip.to_string()])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout + Duration::from_millis(500), run)
            .await
            .map_err(|_| DiscoverError::Probe {
                ip: ip.to_string(),
                message: "timed out".to_string(),
            })?
            .map_err(|e| DiscoverError::Probe {
                ip: ip.to_string(),
                message: format!("{}: {e}", self.ping_path),
            })?;

        if !output.status.success() {
            return Err(DiscoverError::Probe {
                ip: ip.to_string(),
                message: "no reply".to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_ping_latency(&stdout)
            .or_else(|| Some(started.elapsed().as_secs_f64() * 1000.0)))
    }

    async fn mac_address(&self, ip: Ipv4Addr) -> Option<String> {
        if let Ok(table) = tokio::fs::read_to_string(&self.arp_table_path).await {
            if let Some(mac) = parse_arp_table(&table, ip) {
                return Some(mac);
            }
        }
        let output = Command::new(&self.ip_path)
            .args(["neigh", "show", &ip.to_string()])
            .kill_on_drop(true)
            .output()
            .await
            .ok()?;
        parse_ip_neigh(&String::from_utf8_lossy(&output.stdout))
    }

    async fn reverse_dns(&self, ip: Ipv4Addr, timeout: Duration) -> Option<String> {
        let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&IpAddr::V4(ip)));
        let name = tokio::time::timeout(timeout, lookup).await.ok()?.ok()?.ok()?;
        let name = name.trim_end_matches('.');
        if name.is_empty() || name == ip.to_string() {
            return None;
        }
        Some(name.to_string())
    }
}

/// Round trip in milliseconds from `ping` output (`time=0.41 ms`, `time<1ms`).
pub fn parse_ping_latency(output: &str) -> Option<f64> {
    let start = output.find("time=").or_else(|| output.find("time<"))? + 5;
    let digits: String = output[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().ok()
}

/// MAC for `ip` from `/proc/net/arp`. Incomplete entries are skipped.
pub fn parse_arp_table(table: &str, ip: Ipv4Addr) -> Option<String> {
    let ip = ip.to_string();
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [addr, _hw_type, flags, mac, ..]
                if *addr == ip && *flags != "0x0" && *mac != "00:00:00:00:00:00" =>
            {
                Some(mac.to_uppercase())
            }
            _ => None,
        }
    })
}

/// MAC from `ip neigh show <ip>`: `192.168.1.1 dev eth0 lladdr aa:bb:.. REACHABLE`.
pub fn parse_ip_neigh(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        fields.find(|f| *f == "lladdr")?;
        fields.next().map(str::to_uppercase)
    })
}

/// Everything learned about one target.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub ip: Ipv4Addr,
    pub online: bool,
    pub latency_ms: Option<f64>,
    pub mac: Option<String>,
    pub vendor: Option<String>,
    pub hostname: Option<String>,
}

impl ProbeOutcome {
    pub fn offline(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            online: false,
            latency_ms: None,
            mac: None,
            vendor: None,
            hostname: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProberSettings {
    pub concurrency: usize,
    pub ping_timeout: Duration,
    pub dns_timeout: Duration,
}

impl From<&ProbeConfig> for ProberSettings {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            ping_timeout: config.ping_timeout(),
            dns_timeout: config.dns_timeout(),
        }
    }
}

/// Batched, cancellable prober over a [`HostProbe`].
#[derive(Clone)]
pub struct HostProber {
    probe: Arc<dyn HostProbe>,
    vendors: Arc<VendorDb>,
    settings: ProberSettings,
}

impl HostProber {
    pub fn new(probe: Arc<dyn HostProbe>, vendors: Arc<VendorDb>, settings: ProberSettings) -> Self {
        Self {
            probe,
            vendors,
            settings,
        }
    }

    pub fn probe(&self) -> Arc<dyn HostProbe> {
        self.probe.clone()
    }

    /// Probe one address. Probe failures mean offline; they are not errors.
    pub async fn probe_host(&self, ip: Ipv4Addr, scan_type: ScanType) -> ProbeOutcome {
        let latency_ms = match self.probe.ping(ip, self.settings.ping_timeout).await {
            Ok(latency) => latency,
            Err(e) => {
                tracing::trace!(ip = %ip, error = %e, "Host did not answer");
                return ProbeOutcome::offline(ip);
            }
        };

        let mut outcome = ProbeOutcome {
            ip,
            online: true,
            latency_ms,
            mac: None,
            vendor: None,
            hostname: None,
        };
        if scan_type == ScanType::Full {
            let (mac, hostname) = tokio::join!(
                self.probe.mac_address(ip),
                self.probe.reverse_dns(ip, self.settings.dns_timeout)
            );
            outcome.vendor = mac.as_deref().and_then(|m| self.vendors.lookup(m));
            outcome.mac = mac;
            outcome.hostname = hostname;
        }
        outcome
    }

    /// Probe `targets` in ascending batches of `concurrency`, sending every
    /// outcome to `sink`. Cancellation is checked between batches; the batch
    /// in flight always finishes. Returns how many targets were dispatched.
    pub async fn probe_all(
        &self,
        targets: &[Ipv4Addr],
        scan_type: ScanType,
        cancel: &CancellationToken,
        sink: mpsc::Sender<ProbeOutcome>,
    ) -> usize {
        let mut dispatched = 0;
        for batch in targets.chunks(self.settings.concurrency) {
            if cancel.is_cancelled() {
                tracing::debug!(dispatched, "Probe run cancelled between batches");
                break;
            }

            let mut set = JoinSet::new();
            for ip in batch {
                let prober = self.clone();
                let ip = *ip;
                set.spawn(async move { prober.probe_host(ip, scan_type).await });
            }
            dispatched += batch.len();

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(outcome) => {
                        if sink.send(outcome).await.is_err() {
                            return dispatched;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Probe task failed"),
                }
            }
        }
        dispatched
    }
}
