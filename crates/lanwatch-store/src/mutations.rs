//! Write operations for the host store.
//!
//! Every mutation holds the store gate shared and the entry lock of the
//! address it touches. Two writers on different addresses never wait for
//! each other.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use serde::Serialize;

use lanwatch_core::{BanEntry, HistoryBucket, HostRecord, HostStats, HostStatus, OpenPort, Source};

use crate::store::{HostStore, StoreError};

/// The decision for one merged field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    /// Leave the stored value and source untouched.
    Keep,
    /// Replace the stored value and record where it came from.
    Set { value: String, source: Source },
}

/// Attributes applied when a probe finds a host online.
#[derive(Debug, Clone)]
pub struct Detection {
    pub latency_ms: Option<f64>,
    /// A resolved MAC replaces the stored one; `None` keeps it.
    pub mac: Option<String>,
    pub hostname: FieldUpdate,
    pub vendor: FieldUpdate,
}

/// What an upsert changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub created: bool,
    pub gained_mac: bool,
    pub gained_vendor: bool,
    pub gained_hostname: bool,
}

/// An operator-added host.
#[derive(Debug, Clone, Default)]
pub struct ManualHost {
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
}

/// Counts removed by `clear`.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClearSummary {
    pub hosts: usize,
    pub history_buckets: usize,
}

impl HostStore {
    // ── Detections ───────────────────────────────────────────────

    /// Record a detection of `ip` as online.
    ///
    /// `decide` runs under the entry lock with the stored record (if any)
    /// and returns the attributes to apply, so merge decisions always see
    /// the latest stored values. New records start with `scan_count = 1`;
    /// existing ones bump `scan_count` and `last_seen`.
    pub fn upsert_with<F>(
        &self,
        ip: Ipv4Addr,
        now: DateTime<Utc>,
        decide: F,
    ) -> Result<UpsertOutcome, StoreError>
    where
        F: FnOnce(Option<&HostRecord>) -> Detection,
    {
        let _gate = self.gate_shared();
        if self.banned.contains_key(&ip) {
            return Err(StoreError::Banned(ip));
        }

        match self.hosts.entry(ip) {
            Entry::Occupied(mut occupied) => {
                let detection = decide(Some(occupied.get()));
                let record = occupied.get_mut();
                let before = (
                    record.mac.is_some(),
                    record.vendor.is_some(),
                    record.hostname.is_some(),
                );
                record.last_seen = now.max(record.first_seen);
                record.scan_count += 1;
                apply_detection(record, detection);
                Ok(UpsertOutcome {
                    created: false,
                    gained_mac: !before.0 && record.mac.is_some(),
                    gained_vendor: !before.1 && record.vendor.is_some(),
                    gained_hostname: !before.2 && record.hostname.is_some(),
                })
            }
            Entry::Vacant(vacant) => {
                let detection = decide(None);
                let mut record = HostRecord::new(ip, now);
                apply_detection(&mut record, detection);
                let outcome = UpsertOutcome {
                    created: true,
                    gained_mac: record.mac.is_some(),
                    gained_vendor: record.vendor.is_some(),
                    gained_hostname: record.hostname.is_some(),
                };
                vacant.insert(record);
                Ok(outcome)
            }
        }
    }

    /// Mark a known host offline. Unknown addresses are ignored; offline
    /// hosts are never created. Returns whether a record was updated.
    pub fn mark_offline(&self, ip: Ipv4Addr) -> bool {
        let _gate = self.gate_shared();
        if self.banned.contains_key(&ip) {
            return false;
        }
        match self.hosts.get_mut(&ip) {
            Some(mut record) => {
                record.status = HostStatus::Offline;
                record.ping_latency_ms = None;
                true
            }
            None => false,
        }
    }

    // ── Manual edits ─────────────────────────────────────────────

    /// Add a host by hand. Its status stays `unknown` until probed.
    pub fn add_manual(
        &self,
        ip: Ipv4Addr,
        host: ManualHost,
        now: DateTime<Utc>,
    ) -> Result<HostRecord, StoreError> {
        let _gate = self.gate_shared();
        if self.banned.contains_key(&ip) {
            return Err(StoreError::Banned(ip));
        }

        match self.hosts.entry(ip) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(ip)),
            Entry::Vacant(vacant) => {
                let mut record = HostRecord::new(ip, now);
                record.mac = non_empty(host.mac).map(|m| m.to_uppercase());
                if let Some(hostname) = non_empty(host.hostname) {
                    record.hostname = Some(hostname);
                    record.hostname_source = Some(Source::Manual);
                }
                if let Some(vendor) = non_empty(host.vendor) {
                    record.vendor = Some(vendor);
                    record.vendor_source = Some(Source::Manual);
                }
                vacant.insert(record.clone());
                tracing::info!(ip = %ip, "Manual host added");
                Ok(record)
            }
        }
    }

    /// Set or clear (empty string) a host's hostname as an operator edit.
    pub fn set_hostname(&self, ip: Ipv4Addr, hostname: &str) -> Result<HostRecord, StoreError> {
        let _gate = self.gate_shared();
        let mut record = self.hosts.get_mut(&ip).ok_or(StoreError::NotFound(ip))?;
        let hostname = hostname.trim();
        if hostname.is_empty() {
            record.hostname = None;
            record.hostname_source = None;
        } else {
            record.hostname = Some(hostname.to_string());
            record.hostname_source = Some(Source::Manual);
        }
        Ok(record.clone())
    }

    /// Replace the open ports of a host after a port scan.
    pub fn set_open_ports(
        &self,
        ip: Ipv4Addr,
        ports: Vec<OpenPort>,
        scanned_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let _gate = self.gate_shared();
        let mut record = self.hosts.get_mut(&ip).ok_or(StoreError::NotFound(ip))?;
        record.open_ports = ports;
        record.last_port_scan = Some(scanned_at);
        Ok(())
    }

    /// Delete one host.
    pub fn remove(&self, ip: Ipv4Addr) -> Result<HostRecord, StoreError> {
        let _gate = self.gate_shared();
        self.hosts
            .remove(&ip)
            .map(|(_, record)| record)
            .ok_or(StoreError::NotFound(ip))
    }

    /// Delete every host and every history bucket in one step.
    /// The ban list is kept.
    pub fn clear(&self) -> ClearSummary {
        let _gate = self.gate_exclusive();
        let hosts = self.hosts.len();
        self.hosts.clear();

        let mut history = self.history_lock();
        let history_buckets = history.len();
        history.clear();

        tracing::info!(hosts, history_buckets, "Host store cleared");
        ClearSummary {
            hosts,
            history_buckets,
        }
    }

    // ── Ban list ─────────────────────────────────────────────────

    /// Ban an address. The stored record, if any, is kept.
    pub fn ban(&self, ip: Ipv4Addr, reason: Option<String>, now: DateTime<Utc>) -> BanEntry {
        let _gate = self.gate_shared();
        let entry = BanEntry {
            ip,
            reason: non_empty(reason),
            banned_at: now,
        };
        self.banned.insert(ip, entry.clone());
        tracing::info!(ip = %ip, "Address banned");
        entry
    }

    pub fn unban(&self, ip: Ipv4Addr) -> bool {
        let _gate = self.gate_shared();
        self.banned.remove(&ip).is_some()
    }

    // ── History ──────────────────────────────────────────────────

    /// Fold a post-scan tally into the current hourly bucket.
    pub fn record_history(&self, now: DateTime<Utc>, stats: HostStats) {
        let _gate = self.gate_shared();
        let bucket_start = hour_start(now);
        let mut history = self.history_lock();

        match history.back_mut() {
            Some(last) if last.bucket_start == bucket_start => {
                last.scans += 1;
                last.online = stats.online;
                last.offline = stats.offline;
                last.total = stats.total;
                last.max_online = last.max_online.max(stats.online);
            }
            _ => {
                history.push_back(HistoryBucket {
                    bucket_start,
                    scans: 1,
                    online: stats.online,
                    offline: stats.offline,
                    total: stats.total,
                    max_online: stats.online,
                });
                while history.len() > self.config.history_capacity {
                    history.pop_front();
                }
            }
        }
    }
}

fn apply_detection(record: &mut HostRecord, detection: Detection) {
    record.status = HostStatus::Online;
    record.ping_latency_ms = detection.latency_ms;
    if let Some(mac) = non_empty(detection.mac) {
        record.mac = Some(mac.to_uppercase());
    }
    if let FieldUpdate::Set { value, source } = detection.hostname {
        record.hostname = Some(value);
        record.hostname_source = Some(source);
    }
    if let FieldUpdate::Set { value, source } = detection.vendor {
        record.vendor = Some(value);
        record.vendor_source = Some(source);
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Start of the UTC hour containing `at`.
pub(crate) fn hour_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let secs = at.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0).unwrap_or(at)
}
