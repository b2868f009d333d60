//! Daemon configuration for lanwatch-discover.
//!
//! These are process-level settings (bind address, data directory, probe
//! tuning). User-editable runtime settings such as schedules and plugin
//! priority live in [`lanwatch_core::Settings`] and are persisted separately.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::range::MIN_PREFIX_FLOOR;

/// Top-level discover configuration.
///
/// Loaded from the `[lanwatch]` section of `lanwatch.toml` or from
/// environment variables such as `LANWATCH__LANWATCH__BIND`.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Address the REST API listens on.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Directory holding the host snapshot, settings and vendor cache.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Smallest CIDR prefix a full scan accepts. Clamped to /17.
    #[serde(default = "default_min_cidr_prefix")]
    pub min_cidr_prefix: u8,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub port_scan: PortScanConfig,

    #[serde(default)]
    pub latency: LatencyConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Number of hourly history buckets retained.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default)]
    pub vendors: VendorConfig,

    #[serde(default)]
    pub collaborators: CollaboratorConfig,
}

/// Host probe tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Hosts probed concurrently within one batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    #[serde(default = "default_dns_timeout_ms")]
    pub dns_timeout_ms: u64,

    #[serde(default = "default_ping_path")]
    pub ping_path: String,

    #[serde(default = "default_ip_path")]
    pub ip_path: String,

    #[serde(default = "default_arp_table_path")]
    pub arp_table_path: String,
}

/// Nmap-backed port scanning.
#[derive(Debug, Clone, Deserialize)]
pub struct PortScanConfig {
    /// Path to the nmap binary (default: "nmap").
    #[serde(default = "default_nmap_path")]
    pub nmap_path: String,

    #[serde(default = "default_top_ports")]
    pub top_ports: u32,

    /// Per-host wall-clock limit for one nmap invocation.
    #[serde(default = "default_host_timeout_secs")]
    pub host_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatencyConfig {
    #[serde(default = "default_latency_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// How often schedule timers are evaluated.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

/// OUI vendor database sources.
#[derive(Debug, Clone, Deserialize)]
pub struct VendorConfig {
    /// Local manuf file. Defaults to `<data_dir>/manuf`.
    #[serde(default)]
    pub manuf_path: Option<String>,

    /// Where `POST /vendors/update` downloads from when no URL is given.
    #[serde(default = "default_vendor_url")]
    pub update_url: String,
}

/// Optional inventory files seeding collaborator sources at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollaboratorConfig {
    #[serde(default)]
    pub freebox_inventory: Option<String>,

    #[serde(default)]
    pub unifi_inventory: Option<String>,
}

impl DiscoverConfig {
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_path().join("hosts.json")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_path().join("settings.json")
    }

    pub fn manuf_path(&self) -> PathBuf {
        self.vendors
            .manuf_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_path().join("manuf"))
    }

    /// The configured minimum prefix, never below the hard floor.
    pub fn effective_min_prefix(&self) -> u8 {
        self.min_cidr_prefix.clamp(MIN_PREFIX_FLOOR, 32)
    }
}

impl ProbeConfig {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_min_cidr_prefix() -> u8 {
    24
}

fn default_history_capacity() -> usize {
    168
}

fn default_concurrency() -> usize {
    64
}

fn default_ping_timeout_ms() -> u64 {
    1000
}

fn default_dns_timeout_ms() -> u64 {
    1500
}

fn default_ping_path() -> String {
    "ping".to_string()
}

fn default_ip_path() -> String {
    "ip".to_string()
}

fn default_arp_table_path() -> String {
    "/proc/net/arp".to_string()
}

fn default_nmap_path() -> String {
    "nmap".to_string()
}

fn default_top_ports() -> u32 {
    1000
}

fn default_host_timeout_secs() -> u64 {
    120
}

fn default_latency_interval_secs() -> u64 {
    30
}

fn default_retention_hours() -> u64 {
    24
}

fn default_max_samples() -> usize {
    4096
}

fn default_tick_secs() -> u64 {
    15
}

fn default_vendor_url() -> String {
    "https://www.wireshark.org/download/automated/data/manuf".to_string()
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            data_dir: default_data_dir(),
            min_cidr_prefix: default_min_cidr_prefix(),
            probe: ProbeConfig::default(),
            port_scan: PortScanConfig::default(),
            latency: LatencyConfig::default(),
            scheduler: SchedulerConfig::default(),
            history_capacity: default_history_capacity(),
            vendors: VendorConfig::default(),
            collaborators: CollaboratorConfig::default(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            ping_timeout_ms: default_ping_timeout_ms(),
            dns_timeout_ms: default_dns_timeout_ms(),
            ping_path: default_ping_path(),
            ip_path: default_ip_path(),
            arp_table_path: default_arp_table_path(),
        }
    }
}

impl Default for PortScanConfig {
    fn default() -> Self {
        Self {
            nmap_path: default_nmap_path(),
            top_ports: default_top_ports(),
            host_timeout_secs: default_host_timeout_secs(),
        }
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_latency_interval_secs(),
            retention_hours: default_retention_hours(),
            max_samples: default_max_samples(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
        }
    }
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            manuf_path: None,
            update_url: default_vendor_url(),
        }
    }
}
