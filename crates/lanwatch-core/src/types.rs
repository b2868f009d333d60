//! Core domain types for lanwatch.
//!
//! These types describe discovered hosts, scan jobs and the monitoring
//! state shared between the store, the discovery engine and the API.
//! Everything serializes camelCase on the wire.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Hosts ─────────────────────────────────────────────────────────

/// Liveness of a host as of its last probe.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for HostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown host status: {other}")),
        }
    }
}

/// Where a hostname or vendor value came from.
///
/// `Freebox`, `Unifi` and `Scanner` are the collaborator ids that appear in
/// priority lists. `Manual` marks operator edits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Freebox,
    Unifi,
    Scanner,
    Manual,
}

impl Source {
    /// The collaborator ids that may be placed in a priority list.
    pub const COLLABORATORS: [Source; 3] = [Source::Freebox, Source::Unifi, Source::Scanner];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Freebox => "freebox",
            Self::Unifi => "unifi",
            Self::Scanner => "scanner",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "freebox" => Ok(Self::Freebox),
            "unifi" => Ok(Self::Unifi),
            "scanner" => Ok(Self::Scanner),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown source: {other}")),
        }
    }
}

/// An open port found by the port scanner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenPort {
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

/// A host known to the system, keyed by IPv4 address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostRecord {
    pub ip: Ipv4Addr,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub hostname_source: Option<Source>,
    pub vendor_source: Option<Source>,
    pub status: HostStatus,
    pub ping_latency_ms: Option<f64>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub scan_count: u64,
    #[serde(default)]
    pub open_ports: Vec<OpenPort>,
    pub last_port_scan: Option<DateTime<Utc>>,
}

impl HostRecord {
    /// A fresh record as created on first detection.
    pub fn new(ip: Ipv4Addr, now: DateTime<Utc>) -> Self {
        Self {
            ip,
            mac: None,
            hostname: None,
            vendor: None,
            hostname_source: None,
            vendor_source: None,
            status: HostStatus::Unknown,
            ping_latency_ms: None,
            first_seen: now,
            last_seen: now,
            scan_count: 1,
            open_ports: Vec::new(),
            last_port_scan: None,
        }
    }
}

/// Aggregate host counts by status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostStats {
    pub total: u64,
    pub online: u64,
    pub offline: u64,
    pub unknown: u64,
}

/// One hour of scan history for charting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryBucket {
    pub bucket_start: DateTime<Utc>,
    pub scans: u32,
    pub online: u64,
    pub offline: u64,
    pub total: u64,
    pub max_online: u64,
}

/// A banned address. Banned hosts are never probed or merged into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BanEntry {
    pub ip: Ipv4Addr,
    pub reason: Option<String>,
    pub banned_at: DateTime<Utc>,
}

// ── Scan jobs ─────────────────────────────────────────────────────

/// Discovery over a range, or a re-probe of known hosts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Full,
    Refresh,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanTrigger {
    Manual,
    Auto,
}

/// Probe depth: `quick` checks liveness and latency only, `full` also
/// resolves MAC, vendor and hostname.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    #[default]
    Quick,
    Full,
}

impl FromStr for ScanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quick" => Ok(Self::Quick),
            "full" => Ok(Self::Full),
            other => Err(format!("invalid scan type: {other}. Choose: quick, full")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Stopped,
}

/// How many hosts newly acquired each attribute during a job.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetectionSummary {
    pub mac: u32,
    pub vendor: u32,
    pub hostname: u32,
}

/// Snapshot of a scan job, as reported by progress polling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanJob {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub trigger: ScanTrigger,
    pub scan_type: ScanType,
    pub status: JobStatus,
    pub scanned: u64,
    pub total: u64,
    pub found: u64,
    pub updated: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub detection_summary: DetectionSummary,
    pub range: Option<String>,
}

/// Outcome of a refresh pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub scanned: u64,
    pub online: u64,
    pub offline: u64,
    pub duration_ms: u64,
}

// ── Port scanning ─────────────────────────────────────────────────

/// Progress of the background port scanner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortScanState {
    pub active: bool,
    pub current: u64,
    pub total: u64,
    pub current_ip: Option<Ipv4Addr>,
    pub started_at: Option<DateTime<Utc>>,
}

// ── Latency ───────────────────────────────────────────────────────

/// A single latency measurement. `None` means the probe timed out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LatencySample {
    pub timestamp: DateTime<Utc>,
    pub latency_ms: Option<f64>,
}

/// Rolling latency statistics for one host.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStats {
    pub avg1h: Option<f64>,
    pub max: Option<f64>,
    pub samples: usize,
    pub last_latency_ms: Option<f64>,
}
