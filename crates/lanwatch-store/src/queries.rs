//! Read operations: lookups, listing with sort/filter/pagination, stats.

use std::cmp::Ordering;
use std::net::Ipv4Addr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use lanwatch_core::{BanEntry, HistoryBucket, HostRecord, HostStats, HostStatus};

use crate::mutations::hour_start;
use crate::store::HostStore;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Ip,
    Hostname,
    Vendor,
    Mac,
    Status,
    LastSeen,
    FirstSeen,
    ScanCount,
    Latency,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Parameters for listing hosts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostQuery {
    #[serde(default)]
    pub sort_by: SortField,
    #[serde(default)]
    pub sort_order: SortOrder,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    pub status: Option<HostStatus>,
    /// Case-insensitive substring over ip, mac, hostname and vendor.
    pub search: Option<String>,
}

/// One page of hosts plus the filtered total.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostPage {
    pub items: Vec<HostRecord>,
    pub total: usize,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl HostStore {
    // ── Single host lookups ──────────────────────────────────────

    pub fn get(&self, ip: Ipv4Addr) -> Option<HostRecord> {
        self.hosts.get(&ip).map(|r| r.value().clone())
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.hosts.contains_key(&ip)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    // ── Ban list ─────────────────────────────────────────────────

    pub fn is_banned(&self, ip: Ipv4Addr) -> bool {
        self.banned.contains_key(&ip)
    }

    /// All bans, ordered by address.
    pub fn banned(&self) -> Vec<BanEntry> {
        let mut list: Vec<BanEntry> = self.banned.iter().map(|e| e.value().clone()).collect();
        list.sort_by_key(|b| b.ip);
        list
    }

    // ── Target sets ──────────────────────────────────────────────

    /// Known, non-banned addresses in ascending order: the refresh target set.
    pub fn known_targets(&self) -> Vec<Ipv4Addr> {
        let mut ips: Vec<Ipv4Addr> = self
            .hosts
            .iter()
            .map(|e| *e.key())
            .filter(|ip| !self.banned.contains_key(ip))
            .collect();
        ips.sort();
        ips
    }

    /// Non-banned hosts whose last probe found them online, ascending.
    pub fn online_targets(&self) -> Vec<Ipv4Addr> {
        let mut ips: Vec<Ipv4Addr> = self
            .hosts
            .iter()
            .filter(|e| e.value().status == HostStatus::Online)
            .map(|e| *e.key())
            .filter(|ip| !self.banned.contains_key(ip))
            .collect();
        ips.sort();
        ips
    }

    // ── Aggregates ───────────────────────────────────────────────

    pub fn stats(&self) -> HostStats {
        let mut stats = HostStats::default();
        for entry in self.hosts.iter() {
            stats.total += 1;
            match entry.value().status {
                HostStatus::Online => stats.online += 1,
                HostStatus::Offline => stats.offline += 1,
                HostStatus::Unknown => stats.unknown += 1,
            }
        }
        stats
    }

    /// History buckets covering the trailing `hours`, oldest first.
    pub fn history(&self, hours: u32, now: DateTime<Utc>) -> Vec<HistoryBucket> {
        let cutoff = hour_start(now) - TimeDelta::hours(i64::from(hours.saturating_sub(1)));
        self.history_lock()
            .iter()
            .filter(|b| b.bucket_start >= cutoff)
            .cloned()
            .collect()
    }

    // ── Listing ──────────────────────────────────────────────────

    pub fn list(&self, query: &HostQuery) -> HostPage {
        let needle = query
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut items: Vec<HostRecord> = self
            .hosts
            .iter()
            .map(|e| e.value().clone())
            .filter(|h| query.status.is_none_or(|s| h.status == s))
            .filter(|h| needle.as_deref().is_none_or(|n| matches_search(h, n)))
            .collect();

        items.sort_by(|a, b| {
            let ord = compare(a, b, query.sort_by).then_with(|| a.ip.cmp(&b.ip));
            match query.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = items.len();
        let items = items
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        HostPage {
            items,
            total,
            limit: query.limit,
            offset: query.offset,
        }
    }
}

fn matches_search(host: &HostRecord, needle: &str) -> bool {
    let contains = |v: &Option<String>| v.as_deref().is_some_and(|s| s.to_lowercase().contains(needle));
    host.ip.to_string().contains(needle)
        || contains(&host.mac)
        || contains(&host.hostname)
        || contains(&host.vendor)
}

fn compare(a: &HostRecord, b: &HostRecord, field: SortField) -> Ordering {
    match field {
        SortField::Ip => a.ip.cmp(&b.ip),
        SortField::Hostname => cmp_opt_str(&a.hostname, &b.hostname),
        SortField::Vendor => cmp_opt_str(&a.vendor, &b.vendor),
        SortField::Mac => cmp_opt_str(&a.mac, &b.mac),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
        SortField::LastSeen => a.last_seen.cmp(&b.last_seen),
        SortField::FirstSeen => a.first_seen.cmp(&b.first_seen),
        SortField::ScanCount => a.scan_count.cmp(&b.scan_count),
        SortField::Latency => match (a.ping_latency_ms, b.ping_latency_ms) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}

/// Missing values sort after present ones.
fn cmp_opt_str(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
