//! Scan orchestration.
//!
//! Owns the single scan job slot. A job is either a full discovery over a
//! range or a refresh of every known host. At most one job runs at a time;
//! a second start fails with a conflict instead of queueing.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use lanwatch_core::{
    DetectionSummary, HostRecord, JobKind, JobStatus, PluginPriorityConfig, RefreshSummary,
    ScanJob, ScanTrigger, ScanType, Source,
};
use lanwatch_store::{Detection, HostStore, StoreError, UpsertOutcome};

use crate::collaborators::CollaboratorSet;
use crate::error::{DiscoverError, Result};
use crate::merge::{self, Candidates};
use crate::portscan::PortScanner;
use crate::probe::{HostProber, ProbeOutcome};
use crate::range::{detect_local_range, ScanRange};
use crate::settings::SettingsHandle;

/// Where a full scan should look.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanTarget {
    Range(String),
    /// The network of the first non-loopback interface.
    AutoDetect,
    /// The configured default range, falling back to auto-detection.
    Default,
}

struct JobHandle {
    id: Uuid,
    kind: JobKind,
    trigger: ScanTrigger,
    scan_type: ScanType,
    range: Option<String>,
    started_at: DateTime<Utc>,
    started: Instant,
    total: u64,
    scanned: AtomicU64,
    found: AtomicU64,
    updated: AtomicU64,
    offline: AtomicU64,
    gained_mac: AtomicU32,
    gained_vendor: AtomicU32,
    gained_hostname: AtomicU32,
    cancel: CancellationToken,
    finished: Mutex<Option<(JobStatus, DateTime<Utc>, u64)>>,
}

impl JobHandle {
    fn new(
        kind: JobKind,
        trigger: ScanTrigger,
        scan_type: ScanType,
        range: Option<String>,
        total: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            trigger,
            scan_type,
            range,
            started_at: Utc::now(),
            started: Instant::now(),
            total: total as u64,
            scanned: AtomicU64::new(0),
            found: AtomicU64::new(0),
            updated: AtomicU64::new(0),
            offline: AtomicU64::new(0),
            gained_mac: AtomicU32::new(0),
            gained_vendor: AtomicU32::new(0),
            gained_hostname: AtomicU32::new(0),
            cancel: CancellationToken::new(),
            finished: Mutex::new(None),
        }
    }

    fn finish(&self) -> JobStatus {
        let status = if self.cancel.is_cancelled() {
            JobStatus::Stopped
        } else {
            JobStatus::Completed
        };
        let duration_ms = self.started.elapsed().as_millis() as u64;
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((status, Utc::now(), duration_ms));
        status
    }

    fn record_upsert(&self, outcome: UpsertOutcome) {
        if !outcome.created {
            self.updated.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.gained_mac {
            self.gained_mac.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.gained_vendor {
            self.gained_vendor.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.gained_hostname {
            self.gained_hostname.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> ScanJob {
        let finished = *self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        let (status, completed_at, duration_ms) = match finished {
            Some((status, at, ms)) => (status, Some(at), Some(ms)),
            None => (JobStatus::Running, None, None),
        };
        ScanJob {
            id: self.id,
            kind: self.kind,
            trigger: self.trigger,
            scan_type: self.scan_type,
            status,
            scanned: self.scanned.load(Ordering::Relaxed),
            total: self.total,
            found: self.found.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            started_at: self.started_at,
            completed_at,
            duration_ms,
            detection_summary: DetectionSummary {
                mac: self.gained_mac.load(Ordering::Relaxed),
                vendor: self.gained_vendor.load(Ordering::Relaxed),
                hostname: self.gained_hostname.load(Ordering::Relaxed),
            },
            range: self.range.clone(),
        }
    }

    fn refresh_summary(&self) -> RefreshSummary {
        let job = self.snapshot();
        RefreshSummary {
            job_id: job.id,
            status: job.status,
            scanned: job.scanned,
            online: job.found,
            offline: self.offline.load(Ordering::Relaxed),
            duration_ms: job.duration_ms.unwrap_or_default(),
        }
    }
}

/// What applying one probe outcome did to the store.
enum Applied {
    Online(UpsertOutcome),
    Offline,
    Skipped,
}

pub struct ScanOrchestrator {
    store: Arc<HostStore>,
    prober: HostProber,
    collaborators: Arc<CollaboratorSet>,
    settings: SettingsHandle,
    port_scanner: Arc<PortScanner>,
    min_prefix: u8,
    permit: Arc<Semaphore>,
    current: Mutex<Option<Arc<JobHandle>>>,
    last_summary: Mutex<Option<ScanJob>>,
}

impl ScanOrchestrator {
    pub fn new(
        store: Arc<HostStore>,
        prober: HostProber,
        collaborators: Arc<CollaboratorSet>,
        settings: SettingsHandle,
        port_scanner: Arc<PortScanner>,
        min_prefix: u8,
    ) -> Self {
        Self {
            store,
            prober,
            collaborators,
            settings,
            port_scanner,
            min_prefix,
            permit: Arc::new(Semaphore::new(1)),
            current: Mutex::new(None),
            last_summary: Mutex::new(None),
        }
    }

    /// Whether a job currently holds the slot. Has no side effects.
    pub fn is_running(&self) -> bool {
        self.permit.available_permits() == 0
    }

    // ── Full scans ───────────────────────────────────────────────

    /// Validate the target, claim the slot and run a full scan in the
    /// background. Returns the new job id.
    pub fn start_scan(
        self: &Arc<Self>,
        target: ScanTarget,
        scan_type: ScanType,
        trigger: ScanTrigger,
    ) -> Result<Uuid> {
        let (job, targets, permit) = self.prepare_full(target, scan_type, trigger)?;
        let id = job.id;
        let this = self.clone();
        tokio::spawn(async move { this.run_job(job, targets, permit).await });
        Ok(id)
    }

    /// Run a full scan to completion and return its final summary.
    pub async fn run_scan(
        self: &Arc<Self>,
        target: ScanTarget,
        scan_type: ScanType,
        trigger: ScanTrigger,
    ) -> Result<ScanJob> {
        let (job, targets, permit) = self.prepare_full(target, scan_type, trigger)?;
        self.run_detached(job.clone(), targets, permit).await;
        Ok(job.snapshot())
    }

    fn prepare_full(
        &self,
        target: ScanTarget,
        scan_type: ScanType,
        trigger: ScanTrigger,
    ) -> Result<(Arc<JobHandle>, Vec<Ipv4Addr>, OwnedSemaphorePermit)> {
        let range = self.resolve_range(target)?;
        let permit = self.try_claim()?;
        let targets: Vec<Ipv4Addr> = range.iter().filter(|ip| !self.store.is_banned(*ip)).collect();
        let job = self.begin(
            JobKind::Full,
            trigger,
            scan_type,
            Some(range.to_string()),
            targets.len(),
        );
        Ok((job, targets, permit))
    }

    fn resolve_range(&self, target: ScanTarget) -> Result<ScanRange> {
        match target {
            ScanTarget::Range(range) => ScanRange::parse(&range, self.min_prefix),
            ScanTarget::AutoDetect => detect_local_range(self.min_prefix),
            ScanTarget::Default => {
                let defaults = self.settings.defaults();
                match defaults.range.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
                    Some(range) => ScanRange::parse(range, self.min_prefix),
                    None if defaults.auto_detect => detect_local_range(self.min_prefix),
                    None => Err(DiscoverError::validation(
                        "range",
                        "no range given and auto-detection is off",
                    )),
                }
            }
        }
    }

    // ── Refresh ──────────────────────────────────────────────────

    /// Re-probe every known, non-banned host and wait for the result.
    pub async fn start_refresh(
        self: &Arc<Self>,
        scan_type: ScanType,
        trigger: ScanTrigger,
    ) -> Result<RefreshSummary> {
        let (job, targets, permit) = self.prepare_refresh(scan_type, trigger)?;
        self.run_detached(job.clone(), targets, permit).await;
        Ok(job.refresh_summary())
    }

    /// Same as [`start_refresh`](Self::start_refresh) but in the background.
    pub fn spawn_refresh(self: &Arc<Self>, scan_type: ScanType, trigger: ScanTrigger) -> Result<Uuid> {
        let (job, targets, permit) = self.prepare_refresh(scan_type, trigger)?;
        let id = job.id;
        let this = self.clone();
        tokio::spawn(async move { this.run_job(job, targets, permit).await });
        Ok(id)
    }

    fn prepare_refresh(
        &self,
        scan_type: ScanType,
        trigger: ScanTrigger,
    ) -> Result<(Arc<JobHandle>, Vec<Ipv4Addr>, OwnedSemaphorePermit)> {
        let permit = self.try_claim()?;
        let targets = self.store.known_targets();
        let job = self.begin(JobKind::Refresh, trigger, scan_type, None, targets.len());
        Ok((job, targets, permit))
    }

    // ── Control and progress ─────────────────────────────────────

    /// Ask the running job to stop at the next batch boundary.
    pub fn stop_scan(&self) -> bool {
        match self.current_slot().as_ref() {
            Some(job) if !job.cancel.is_cancelled() => {
                tracing::info!(job_id = %job.id, "Stop requested");
                job.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// The running job, or once only, the summary of the job that just ended.
    pub fn progress(&self) -> Option<ScanJob> {
        let current = self.current_slot();
        if let Some(job) = current.as_ref() {
            return Some(job.snapshot());
        }
        self.last_summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    // ── Single host ──────────────────────────────────────────────

    /// Full probe of one known host, outside the job slot.
    pub async fn rescan_host(&self, ip: Ipv4Addr) -> Result<HostRecord> {
        if !self.store.contains(ip) {
            return Err(DiscoverError::NotFound(format!("host {ip}")));
        }
        if self.store.is_banned(ip) {
            return Err(DiscoverError::validation(ip.to_string(), "address is banned"));
        }

        let priority = self.settings.plugin_priority();
        let outcome = self.prober.probe_host(ip, ScanType::Full).await;
        self.apply(outcome, ScanType::Full, &priority).await?;
        self.store
            .get(ip)
            .ok_or_else(|| DiscoverError::NotFound(format!("host {ip}")))
    }

    // ── Job lifecycle ────────────────────────────────────────────

    fn try_claim(&self) -> Result<OwnedSemaphorePermit> {
        self.permit.clone().try_acquire_owned().map_err(|_| {
            let running = self
                .current_slot()
                .as_ref()
                .map(|j| j.id.to_string())
                .unwrap_or_else(|| "job in progress".to_string());
            DiscoverError::Conflict(running)
        })
    }

    fn begin(
        &self,
        kind: JobKind,
        trigger: ScanTrigger,
        scan_type: ScanType,
        range: Option<String>,
        total: usize,
    ) -> Arc<JobHandle> {
        let job = Arc::new(JobHandle::new(kind, trigger, scan_type, range, total));
        *self.current_slot() = Some(job.clone());
        *self.last_summary.lock().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::info!(
            job_id = %job.id,
            kind = ?kind,
            trigger = ?trigger,
            scan_type = ?scan_type,
            range = job.range.as_deref().unwrap_or("known hosts"),
            total,
            "Scan job started"
        );
        job
    }

    /// Run a job on its own task and wait for it. The job finishes and
    /// releases the slot even if the caller stops waiting.
    async fn run_detached(
        self: &Arc<Self>,
        job: Arc<JobHandle>,
        targets: Vec<Ipv4Addr>,
        permit: OwnedSemaphorePermit,
    ) {
        let this = self.clone();
        let job_id = job.id;
        let handle = tokio::spawn(async move { this.run_job(job, targets, permit).await });
        if let Err(e) = handle.await {
            tracing::error!(job_id = %job_id, error = %e, "Scan job task failed");
        }
    }

    async fn run_job(&self, job: Arc<JobHandle>, targets: Vec<Ipv4Addr>, permit: OwnedSemaphorePermit) {
        let priority = self.settings.plugin_priority();
        let (tx, mut rx) = mpsc::channel::<ProbeOutcome>(256);

        let probing = self.prober.probe_all(&targets, job.scan_type, &job.cancel, tx);
        let consuming = async {
            let mut online = Vec::new();
            while let Some(outcome) = rx.recv().await {
                let ip = outcome.ip;
                match self.apply(outcome, job.scan_type, &priority).await {
                    Ok(Applied::Online(upsert)) => {
                        job.found.fetch_add(1, Ordering::Relaxed);
                        job.record_upsert(upsert);
                        online.push(ip);
                    }
                    Ok(Applied::Offline) => {
                        job.offline.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Applied::Skipped) => {}
                    Err(e) => tracing::warn!(ip = %ip, error = %e, "Failed to record probe result"),
                }
                job.scanned.fetch_add(1, Ordering::Relaxed);
            }
            online
        };
        let (_, mut online) = tokio::join!(probing, consuming);
        online.sort();

        // Finish and publish under the slot lock so progress() never sees
        // a finished job in the slot and again as the summary.
        let (status, summary) = {
            let mut current = self.current_slot();
            let status = job.finish();
            let summary = job.snapshot();
            *self.last_summary.lock().unwrap_or_else(PoisonError::into_inner) = Some(summary.clone());
            *current = None;
            (status, summary)
        };

        self.store.record_history(Utc::now(), self.store.stats());
        if let Err(e) = self.store.persist() {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to persist host store");
        }
        drop(permit);

        tracing::info!(
            job_id = %summary.id,
            status = ?status,
            scanned = summary.scanned,
            total = summary.total,
            found = summary.found,
            updated = summary.updated,
            duration_ms = summary.duration_ms.unwrap_or_default(),
            "Scan job finished"
        );

        if status == JobStatus::Completed
            && job.kind == JobKind::Full
            && self.settings.schedule().full_scan.port_scan_enabled
            && !online.is_empty()
        {
            self.port_scanner.start(online);
        }
    }

    /// Write one probe outcome into the store, merging names and vendors
    /// from the scanner and enabled collaborators on full scans.
    async fn apply(
        &self,
        outcome: ProbeOutcome,
        scan_type: ScanType,
        priority: &PluginPriorityConfig,
    ) -> Result<Applied> {
        let ip = outcome.ip;
        if !outcome.online {
            return Ok(if self.store.mark_offline(ip) {
                Applied::Offline
            } else {
                Applied::Skipped
            });
        }

        let (candidates, mac) = if scan_type == ScanType::Full {
            let hints = self.collaborators.lookup_all(ip, &priority.enabled).await;
            let candidates =
                Candidates::gather(outcome.hostname.as_deref(), outcome.vendor.as_deref(), &hints);
            let fallback_mac = priority
                .hostname_priority
                .iter()
                .chain([Source::Freebox, Source::Unifi].iter())
                .find_map(|s| hints.get(s).and_then(|h| h.mac.clone()));
            (candidates, outcome.mac.clone().or(fallback_mac))
        } else {
            (Candidates::default(), None)
        };

        let now = Utc::now();
        let result = self.store.upsert_with(ip, now, |existing| {
            let (hostname, vendor) = merge::merge_host(existing, &candidates, priority);
            Detection {
                latency_ms: outcome.latency_ms,
                mac,
                hostname,
                vendor,
            }
        });
        match result {
            Ok(upsert) => Ok(Applied::Online(upsert)),
            Err(StoreError::Banned(_)) => {
                tracing::debug!(ip = %ip, "Skipping banned address");
                Ok(Applied::Skipped)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn current_slot(&self) -> MutexGuard<'_, Option<Arc<JobHandle>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
