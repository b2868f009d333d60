//! Per-host latency monitoring.
//!
//! Each monitored host gets its own sampling task that pings on a fixed
//! interval and keeps a bounded, time-limited sample window.

use std::collections::{BTreeMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use lanwatch_core::{LatencySample, LatencyStats};

use crate::config::LatencyConfig;
use crate::probe::HostProbe;

#[derive(Debug, Clone, Copy)]
pub struct LatencySettings {
    pub interval: Duration,
    pub ping_timeout: Duration,
    pub retention: TimeDelta,
    pub max_samples: usize,
}

impl LatencySettings {
    pub fn from_config(config: &LatencyConfig, ping_timeout: Duration) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs.max(1)),
            ping_timeout,
            retention: TimeDelta::hours(config.retention_hours as i64),
            max_samples: config.max_samples.max(1),
        }
    }
}

type Samples = Arc<Mutex<VecDeque<LatencySample>>>;

struct Monitor {
    samples: Samples,
    cancel: CancellationToken,
}

pub struct LatencyMonitor {
    probe: Arc<dyn HostProbe>,
    settings: LatencySettings,
    monitors: DashMap<Ipv4Addr, Monitor>,
}

impl LatencyMonitor {
    pub fn new(probe: Arc<dyn HostProbe>, settings: LatencySettings) -> Self {
        Self {
            probe,
            settings,
            monitors: DashMap::new(),
        }
    }

    /// Start sampling `ip`. Returns `false` if it is already monitored.
    pub fn enable(&self, ip: Ipv4Addr) -> bool {
        let entry = match self.monitors.entry(ip) {
            dashmap::mapref::entry::Entry::Occupied(_) => return false,
            dashmap::mapref::entry::Entry::Vacant(vacant) => vacant,
        };

        let samples: Samples = Arc::new(Mutex::new(VecDeque::new()));
        let cancel = CancellationToken::new();
        tokio::spawn(sample_loop(
            ip,
            self.probe.clone(),
            self.settings,
            samples.clone(),
            cancel.clone(),
        ));
        entry.insert(Monitor { samples, cancel });
        tracing::info!(ip = %ip, "Latency monitoring enabled");
        true
    }

    /// Stop sampling `ip` and drop its samples.
    pub fn disable(&self, ip: Ipv4Addr) -> bool {
        match self.monitors.remove(&ip) {
            Some((_, monitor)) => {
                monitor.cancel.cancel();
                tracing::info!(ip = %ip, "Latency monitoring disabled");
                true
            }
            None => false,
        }
    }

    pub fn is_monitored(&self, ip: Ipv4Addr) -> bool {
        self.monitors.contains_key(&ip)
    }

    pub fn monitored(&self) -> Vec<Ipv4Addr> {
        let mut ips: Vec<Ipv4Addr> = self.monitors.iter().map(|e| *e.key()).collect();
        ips.sort();
        ips
    }

    pub fn status(&self, ips: &[Ipv4Addr]) -> BTreeMap<Ipv4Addr, bool> {
        ips.iter().map(|ip| (*ip, self.is_monitored(*ip))).collect()
    }

    /// Stats for each of `ips`; unmonitored hosts report empty stats.
    pub fn stats(&self, ips: &[Ipv4Addr], now: DateTime<Utc>) -> BTreeMap<Ipv4Addr, LatencyStats> {
        ips.iter()
            .map(|ip| {
                let stats = self
                    .monitors
                    .get(ip)
                    .map(|m| {
                        let samples = m.samples.lock().unwrap_or_else(PoisonError::into_inner);
                        compute_stats(&samples, now)
                    })
                    .unwrap_or_default();
                (*ip, stats)
            })
            .collect()
    }

    /// Stop every sampling task.
    pub fn shutdown(&self) {
        for entry in self.monitors.iter() {
            entry.value().cancel.cancel();
        }
        self.monitors.clear();
    }
}

async fn sample_loop(
    ip: Ipv4Addr,
    probe: Arc<dyn HostProbe>,
    settings: LatencySettings,
    samples: Samples,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let latency_ms = match probe.ping(ip, settings.ping_timeout).await {
                    Ok(latency) => latency,
                    Err(e) => {
                        tracing::trace!(ip = %ip, error = %e, "Latency probe timed out");
                        None
                    }
                };
                let now = Utc::now();
                let mut window = samples.lock().unwrap_or_else(PoisonError::into_inner);
                window.push_back(LatencySample { timestamp: now, latency_ms });
                evict(&mut window, now, settings.retention, settings.max_samples);
            }
        }
    }
    tracing::debug!(ip = %ip, "Latency sampler stopped");
}

/// Drop samples older than `retention` and keep at most `max_samples`.
pub fn evict(
    samples: &mut VecDeque<LatencySample>,
    now: DateTime<Utc>,
    retention: TimeDelta,
    max_samples: usize,
) {
    let cutoff = now - retention;
    while samples.front().is_some_and(|s| s.timestamp < cutoff) {
        samples.pop_front();
    }
    while samples.len() > max_samples {
        samples.pop_front();
    }
}

/// Average over the last hour, maximum and latest value. Timeouts count
/// toward `samples` but not toward the latency figures.
pub fn compute_stats(samples: &VecDeque<LatencySample>, now: DateTime<Utc>) -> LatencyStats {
    let hour_ago = now - TimeDelta::hours(1);
    let recent: Vec<f64> = samples
        .iter()
        .filter(|s| s.timestamp >= hour_ago)
        .filter_map(|s| s.latency_ms)
        .collect();

    LatencyStats {
        avg1h: (!recent.is_empty()).then(|| recent.iter().sum::<f64>() / recent.len() as f64),
        max: samples
            .iter()
            .filter_map(|s| s.latency_ms)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v)))),
        samples: samples.len(),
        last_latency_ms: samples.back().and_then(|s| s.latency_ms),
    }
}
