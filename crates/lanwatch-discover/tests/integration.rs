//! End-to-end tests for the discovery engine: orchestrator, scheduler,
//! port-scan hand-off and the REST surface, over fake probes.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeDelta, Utc};
use tokio::sync::Semaphore;
use tower::ServiceExt;

use lanwatch_core::{HostStatus, JobStatus, OpenPort, ScanTrigger, ScanType, Settings, Source};
use lanwatch_discover::api;
use lanwatch_discover::collaborators::{CollaboratorSet, DeviceHints, InventoryDevice, InventorySource};
use lanwatch_discover::config::DiscoverConfig;
use lanwatch_discover::engine::{Engine, EngineParts};
use lanwatch_discover::error::{DiscoverError, Result};
use lanwatch_discover::orchestrator::ScanTarget;
use lanwatch_discover::portscan::PortProbe;
use lanwatch_discover::probe::HostProbe;
use lanwatch_discover::scheduler::TimerOutcome;
use lanwatch_discover::settings::SettingsHandle;
use lanwatch_discover::vendors::VendorDb;
use lanwatch_store::{Detection, FieldUpdate, HostStore};

// ── Fakes ────────────────────────────────────────────────────────

/// Hosts in `online` answer. With a gate set, every ping waits for a
/// permit first so a job can be held open.
struct FakeProbe {
    online: HashSet<Ipv4Addr>,
    gate: Option<Arc<Semaphore>>,
    pinged: AtomicUsize,
}

#[async_trait]
impl HostProbe for FakeProbe {
    async fn ping(&self, ip: Ipv4Addr, _timeout: Duration) -> Result<Option<f64>> {
        self.pinged.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.online.contains(&ip) {
            Ok(Some(1.5))
        } else {
            Err(DiscoverError::Probe {
                ip: ip.to_string(),
                message: "no reply".to_string(),
            })
        }
    }

    async fn mac_address(&self, ip: Ipv4Addr) -> Option<String> {
        Some(format!("00:11:32:00:00:{:02X}", ip.octets()[3]))
    }

    async fn reverse_dns(&self, ip: Ipv4Addr, _timeout: Duration) -> Option<String> {
        Some(format!("host-{}", ip.octets()[3]))
    }
}

struct FakePorts;

#[async_trait]
impl PortProbe for FakePorts {
    async fn scan_host(&self, _ip: Ipv4Addr) -> Result<Vec<OpenPort>> {
        Ok(vec![OpenPort {
            port: 22,
            protocol: Some("tcp".to_string()),
            service: Some("ssh".to_string()),
        }])
    }
}

fn ip(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

struct Harness {
    engine: Arc<Engine>,
    probe: Arc<FakeProbe>,
    gate: Arc<Semaphore>,
}

/// Engine over fakes. Probes one host at a time; `gated` holds every
/// ping until the test adds permits.
fn harness(online: &[u8], gated: bool) -> Harness {
    let gate = Arc::new(Semaphore::new(0));
    let probe = Arc::new(FakeProbe {
        online: online.iter().map(|o| ip(*o)).collect(),
        gate: gated.then(|| gate.clone()),
        pinged: AtomicUsize::new(0),
    });
    let freebox = Arc::new(InventorySource::new(Source::Freebox));

    let mut config = DiscoverConfig::default();
    config.probe.concurrency = 1;

    let parts = EngineParts {
        store: Arc::new(HostStore::in_memory()),
        settings: SettingsHandle::in_memory(Settings::default()),
        vendors: Arc::new(VendorDb::from_text(
            "00:11:32\tSynology\tSynology Incorporated\n",
        )),
        collaborators: Arc::new(CollaboratorSet::new().with_inventory(freebox)),
        host_probe: probe.clone(),
        port_probe: Arc::new(FakePorts),
    };
    Harness {
        engine: Arc::new(Engine::assemble(config, parts)),
        probe,
        gate,
    }
}

async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

fn seed(store: &HostStore, last: u8) {
    store
        .upsert_with(ip(last), Utc::now(), |_| Detection {
            latency_ms: Some(1.0),
            mac: None,
            hostname: FieldUpdate::Keep,
            vendor: FieldUpdate::Keep,
        })
        .unwrap();
}

// ── Orchestrator ─────────────────────────────────────────────────

#[tokio::test]
async fn test_full_scan_records_online_hosts() {
    let h = harness(&[2, 5], false);
    let orchestrator = &h.engine.orchestrator;

    let job = orchestrator
        .run_scan(
            ScanTarget::Range("10.0.0.0/29".to_string()),
            ScanType::Full,
            ScanTrigger::Manual,
        )
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total, 6);
    assert_eq!(job.scanned, 6);
    assert_eq!(job.found, 2);
    assert_eq!(job.updated, 0);
    assert_eq!(job.detection_summary.mac, 2);
    assert_eq!(job.detection_summary.vendor, 2);
    assert_eq!(job.range.as_deref(), Some("10.0.0.0/29"));

    let store = &h.engine.store;
    assert_eq!(store.len(), 2);
    let record = store.get(ip(2)).unwrap();
    assert_eq!(record.status, HostStatus::Online);
    assert_eq!(record.hostname.as_deref(), Some("host-2"));
    assert_eq!(record.hostname_source, Some(Source::Scanner));
    assert_eq!(record.vendor.as_deref(), Some("Synology Incorporated"));
    assert_eq!(record.scan_count, 1);
    assert!(!store.contains(ip(3)));

    let again = orchestrator
        .run_scan(
            ScanTarget::Range("10.0.0.0/29".to_string()),
            ScanType::Full,
            ScanTrigger::Manual,
        )
        .await
        .unwrap();
    assert_eq!(again.found, 2);
    assert_eq!(again.updated, 2);
    assert_eq!(again.detection_summary.hostname, 0);
    assert_eq!(store.get(ip(2)).unwrap().scan_count, 2);
}

#[tokio::test]
async fn test_progress_returns_summary_once() {
    let h = harness(&[1], false);
    let orchestrator = &h.engine.orchestrator;
    assert!(orchestrator.progress().is_none());

    let job = orchestrator
        .run_scan(ScanTarget::Range("10.0.0.1".to_string()), ScanType::Quick, ScanTrigger::Manual)
        .await
        .unwrap();

    let summary = orchestrator.progress().unwrap();
    assert_eq!(summary.id, job.id);
    assert_eq!(summary.status, JobStatus::Completed);
    assert!(orchestrator.progress().is_none());
}

#[tokio::test]
async fn test_second_start_conflicts() {
    let h = harness(&[1], true);
    let orchestrator = &h.engine.orchestrator;

    orchestrator
        .start_scan(
            ScanTarget::Range("10.0.0.0/29".to_string()),
            ScanType::Quick,
            ScanTrigger::Manual,
        )
        .unwrap();
    assert!(orchestrator.is_running());

    let second = orchestrator.start_scan(
        ScanTarget::Range("10.0.0.0/29".to_string()),
        ScanType::Quick,
        ScanTrigger::Manual,
    );
    assert!(matches!(second, Err(DiscoverError::Conflict(_))));
    let refresh = orchestrator.spawn_refresh(ScanType::Quick, ScanTrigger::Auto);
    assert!(matches!(refresh, Err(DiscoverError::Conflict(_))));

    h.gate.add_permits(100);
    wait_until("scan to finish", || !orchestrator.is_running()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_claim_one_slot() {
    let h = harness(&[1], true);

    let starts: Vec<_> = (0..2)
        .map(|_| {
            let orchestrator = h.engine.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator.start_scan(
                    ScanTarget::Range("10.0.0.0/29".to_string()),
                    ScanType::Quick,
                    ScanTrigger::Manual,
                )
            })
        })
        .collect();

    let mut started = 0;
    let mut conflicts = 0;
    for start in starts {
        match start.await.unwrap() {
            Ok(_) => started += 1,
            Err(DiscoverError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((started, conflicts), (1, 1));

    h.gate.add_permits(100);
    let orchestrator = &h.engine.orchestrator;
    wait_until("scan to finish", || !orchestrator.is_running()).await;
}

#[tokio::test]
async fn test_abandoned_refresh_still_finishes() {
    let h = harness(&[1, 2], true);
    seed(&h.engine.store, 1);
    seed(&h.engine.store, 2);
    let orchestrator = &h.engine.orchestrator;

    let waited = tokio::time::timeout(
        Duration::from_millis(50),
        orchestrator.start_refresh(ScanType::Quick, ScanTrigger::Manual),
    )
    .await;
    assert!(waited.is_err());
    assert!(orchestrator.is_running());

    h.gate.add_permits(100);
    wait_until("refresh to finish", || !orchestrator.is_running()).await;

    let job = orchestrator.progress().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.scanned, 2);
    assert!(!orchestrator.stop_scan());
    assert!(!h.engine.store.history(24, Utc::now()).is_empty());
}

#[tokio::test]
async fn test_progress_never_repeats_a_finished_job() {
    let h = harness(&[1, 2, 3], true);
    let orchestrator = h.engine.orchestrator.clone();

    orchestrator
        .start_scan(
            ScanTarget::Range("10.0.0.1-3".to_string()),
            ScanType::Quick,
            ScanTrigger::Manual,
        )
        .unwrap();
    h.gate.add_permits(100);

    let mut finished_seen = 0;
    while orchestrator.is_running() {
        if let Some(job) = orchestrator.progress() {
            if job.status != JobStatus::Running {
                finished_seen += 1;
            }
        }
        tokio::task::yield_now().await;
    }
    if let Some(job) = orchestrator.progress() {
        assert_ne!(job.status, JobStatus::Running);
        finished_seen += 1;
    }
    assert_eq!(finished_seen, 1);
    assert!(orchestrator.progress().is_none());
}

#[tokio::test]
async fn test_stop_keeps_partial_counters() {
    let h = harness(&[1, 2, 3, 4, 5, 6], true);
    let orchestrator = &h.engine.orchestrator;

    let id = orchestrator
        .start_scan(
            ScanTarget::Range("10.0.0.0/29".to_string()),
            ScanType::Quick,
            ScanTrigger::Manual,
        )
        .unwrap();
    wait_until("first probe", || h.probe.pinged.load(Ordering::SeqCst) >= 1).await;

    assert!(orchestrator.stop_scan());
    assert!(!orchestrator.stop_scan());
    h.gate.add_permits(100);
    wait_until("scan to stop", || !orchestrator.is_running()).await;

    let job = orchestrator.progress().unwrap();
    assert_eq!(job.id, id);
    assert_eq!(job.status, JobStatus::Stopped);
    assert_eq!(job.total, 6);
    assert_eq!(job.scanned, 1);
    assert_eq!(job.found, 1);
    assert!(job.completed_at.is_some());
    assert_eq!(h.engine.store.len(), 1);
}

#[tokio::test]
async fn test_invalid_range_rejected_before_claiming_slot() {
    let h = harness(&[], false);
    let orchestrator = &h.engine.orchestrator;

    let err = orchestrator
        .start_scan(
            ScanTarget::Range("10.0.0.0/16".to_string()),
            ScanType::Full,
            ScanTrigger::Manual,
        )
        .unwrap_err();
    assert!(matches!(err, DiscoverError::Validation { .. }));
    assert!(!orchestrator.is_running());
    assert!(orchestrator.progress().is_none());
}

#[tokio::test]
async fn test_full_scan_skips_banned_addresses() {
    let h = harness(&[1, 2], false);
    h.engine.store.ban(ip(2), Some("printer".to_string()), Utc::now());

    let job = h
        .engine
        .orchestrator
        .run_scan(
            ScanTarget::Range("10.0.0.1-2".to_string()),
            ScanType::Quick,
            ScanTrigger::Manual,
        )
        .await
        .unwrap();

    assert_eq!(job.total, 1);
    assert_eq!(job.found, 1);
    assert!(!h.engine.store.contains(ip(2)));
    assert_eq!(h.probe.pinged.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refresh_excludes_banned_and_marks_offline() {
    let h = harness(&[1], false);
    let store = &h.engine.store;
    for last in 1..=3 {
        seed(store, last);
    }
    store.ban(ip(2), None, Utc::now());

    let summary = h
        .engine
        .orchestrator
        .start_refresh(ScanType::Quick, ScanTrigger::Manual)
        .await
        .unwrap();

    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.scanned, 2);
    assert_eq!(summary.online, 1);
    assert_eq!(summary.offline, 1);
    assert_eq!(store.get(ip(1)).unwrap().status, HostStatus::Online);
    assert_eq!(store.get(ip(3)).unwrap().status, HostStatus::Offline);
    // Banned records are kept but not touched.
    assert_eq!(store.get(ip(2)).unwrap().status, HostStatus::Online);
    assert_eq!(store.get(ip(2)).unwrap().scan_count, 1);
}

#[tokio::test]
async fn test_collaborator_hostname_outranks_scanner() {
    let h = harness(&[4], false);
    let inventory = h.engine.collaborators.inventory(Source::Freebox).unwrap();
    inventory.replace(vec![InventoryDevice {
        ip: ip(4),
        hints: DeviceHints {
            hostname: Some("living-room-tv".to_string()),
            vendor: None,
            mac: None,
        },
    }]);
    h.engine
        .settings
        .update(|s| s.plugin_priority.enabled.freebox = true)
        .unwrap();

    h.engine
        .orchestrator
        .run_scan(ScanTarget::Range("10.0.0.4".to_string()), ScanType::Full, ScanTrigger::Manual)
        .await
        .unwrap();

    let record = h.engine.store.get(ip(4)).unwrap();
    assert_eq!(record.hostname.as_deref(), Some("living-room-tv"));
    assert_eq!(record.hostname_source, Some(Source::Freebox));
    assert_eq!(record.vendor_source, Some(Source::Scanner));
}

#[tokio::test]
async fn test_completed_full_scan_starts_port_scan() {
    let h = harness(&[2, 3], false);
    h.engine
        .settings
        .update(|s| s.schedule.full_scan.port_scan_enabled = true)
        .unwrap();

    h.engine
        .orchestrator
        .run_scan(
            ScanTarget::Range("10.0.0.0/29".to_string()),
            ScanType::Full,
            ScanTrigger::Manual,
        )
        .await
        .unwrap();

    let store = h.engine.store.clone();
    wait_until("ports recorded", || {
        store.get(ip(3)).is_some_and(|r| r.last_port_scan.is_some())
    })
    .await;
    wait_until("port scan idle", || !h.engine.port_scanner.is_active()).await;
    assert_eq!(store.get(ip(2)).unwrap().open_ports[0].port, 22);
}

#[tokio::test]
async fn test_rescan_host_requires_known_unbanned_host() {
    let h = harness(&[7], false);
    let orchestrator = &h.engine.orchestrator;

    let missing = orchestrator.rescan_host(ip(7)).await.unwrap_err();
    assert!(matches!(missing, DiscoverError::NotFound(_)));

    seed(&h.engine.store, 7);
    let record = orchestrator.rescan_host(ip(7)).await.unwrap();
    assert_eq!(record.hostname.as_deref(), Some("host-7"));
    assert_eq!(record.scan_count, 2);

    h.engine.store.ban(ip(7), None, Utc::now());
    let banned = orchestrator.rescan_host(ip(7)).await.unwrap_err();
    assert!(matches!(banned, DiscoverError::Validation { .. }));
}

// ── Scheduler ────────────────────────────────────────────────────

#[tokio::test]
async fn test_scheduler_starts_due_full_scan_and_skips_refresh() {
    let h = harness(&[1], false);
    h.engine
        .settings
        .update(|s| {
            s.schedule.enabled = true;
            s.schedule.full_scan.interval_minutes = 10;
            s.schedule.refresh.interval_minutes = 10;
            s.defaults.range = Some("10.0.0.0/30".to_string());
        })
        .unwrap();
    let scheduler = &h.engine.scheduler;

    let now = Utc::now();
    let early = scheduler.tick(now);
    assert_eq!(early.full_scan, TimerOutcome::NotDue);
    assert_eq!(early.refresh, TimerOutcome::NotDue);

    let report = scheduler.tick(now + TimeDelta::minutes(11));
    assert!(matches!(report.full_scan, TimerOutcome::Started(_)));
    assert_eq!(report.refresh, TimerOutcome::Skipped);

    wait_until("scheduled scan", || !h.engine.orchestrator.is_running()).await;
    let job = h.engine.orchestrator.progress().unwrap();
    assert_eq!(job.trigger, ScanTrigger::Auto);
    assert_eq!(job.range.as_deref(), Some("10.0.0.0/30"));
}

#[tokio::test]
async fn test_scheduler_idle_while_master_switch_off() {
    let h = harness(&[1], false);
    let report = h.engine.scheduler.tick(Utc::now() + TimeDelta::days(1));
    assert_eq!(report.full_scan, TimerOutcome::Disabled);
    assert_eq!(report.refresh, TimerOutcome::Disabled);
    assert!(h.engine.scheduler.next_runs().full_scan.is_none());
}

// ── REST API ─────────────────────────────────────────────────────

async fn call(engine: &Arc<Engine>, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if body.is_some() {
        request = request.header("content-type", "application/json");
    }
    let request = request
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let response = api::router(engine.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_api_health() {
    let h = harness(&[], false);
    let (status, body) = call(&h.engine, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["scanRunning"], false);
}

#[tokio::test]
async fn test_api_rejects_wide_range() {
    let h = harness(&[], false);
    let (status, body) = call(
        &h.engine,
        "POST",
        "/api/network/scan",
        Some(r#"{"range":"10.0.0.0/16"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("/16"));
}

#[tokio::test]
async fn test_api_scan_conflict_and_progress() {
    let h = harness(&[1], true);

    let (status, body) = call(
        &h.engine,
        "POST",
        "/api/network/scan",
        Some(r#"{"range":"10.0.0.1-3","scanType":"quick"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let (status, _) = call(&h.engine, "POST", "/api/network/scan", Some(r#"{"range":"10.0.0.1"}"#)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = call(&h.engine, "POST", "/api/network/refresh", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, progress) = call(&h.engine, "GET", "/api/network/progress", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["id"], job_id.as_str());
    assert_eq!(progress["status"], "running");
    assert_eq!(progress["total"], 3);

    h.gate.add_permits(100);
    wait_until("scan to finish", || !h.engine.orchestrator.is_running()).await;

    let (_, done) = call(&h.engine, "GET", "/api/network/progress", None).await;
    assert_eq!(done["status"], "completed");
    let (status, _) = call(&h.engine, "GET", "/api/network/progress", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_api_host_edits() {
    let h = harness(&[], false);

    let (status, record) = call(
        &h.engine,
        "POST",
        "/api/network/add-manual",
        Some(r#"{"ip":"10.0.0.9","hostname":"nas"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["hostnameSource"], "manual");

    let (status, _) = call(
        &h.engine,
        "POST",
        "/api/network/add-manual",
        Some(r#"{"ip":"10.0.0.9"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, record) = call(
        &h.engine,
        "POST",
        "/api/network/10.0.0.9/hostname",
        Some(r#"{"hostname":"backup-nas"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["hostname"], "backup-nas");

    let (_, page) = call(&h.engine, "GET", "/api/network/history?search=backup&limit=10", None).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["ip"], "10.0.0.9");

    let (status, _) = call(&h.engine, "DELETE", "/api/network/10.0.0.9", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&h.engine, "DELETE", "/api/network/10.0.0.9", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = call(&h.engine, "DELETE", "/api/network/not-an-ip", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_ban_list_survives_clear() {
    let h = harness(&[], false);
    seed(&h.engine.store, 1);

    let (status, _) = call(
        &h.engine,
        "POST",
        "/api/network/blacklist/add",
        Some(r#"{"ip":"10.0.0.2","reason":"guest"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, cleared) = call(&h.engine, "DELETE", "/api/network/clear", None).await;
    assert_eq!(cleared["hosts"], 1);

    let (_, banned) = call(&h.engine, "GET", "/api/network/blacklist", None).await;
    assert_eq!(banned[0]["ip"], "10.0.0.2");
    assert_eq!(banned[0]["reason"], "guest");

    let (_, removed) = call(
        &h.engine,
        "POST",
        "/api/network/blacklist/remove",
        Some(r#"{"ip":"10.0.0.2"}"#),
    )
    .await;
    assert_eq!(removed["removed"], true);
}

#[tokio::test]
async fn test_api_schedule_config_validation() {
    let h = harness(&[], false);

    let (status, _) = call(
        &h.engine,
        "POST",
        "/api/network/refresh-config",
        Some(r#"{"intervalMinutes":0}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &h.engine,
        "POST",
        "/api/network/config",
        Some(r#"{"enabled":true,"fullScan":{"intervalMinutes":30}}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], true);
    assert_eq!(body["fullScan"]["intervalMinutes"], 30);

    let (_, unified) = call(&h.engine, "GET", "/api/network/unified-config", None).await;
    assert_eq!(unified["schedule"]["enabled"], true);
    assert!(unified["nextRuns"]["fullScan"].is_string());

    let (status, _) = call(
        &h.engine,
        "POST",
        "/api/network/default-config",
        Some(r#"{"range":"10.0.0.0/8","autoDetect":false}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_inventory_push_and_latency_status() {
    let h = harness(&[], false);

    let (status, body) = call(
        &h.engine,
        "PUT",
        "/api/network/collaborators/freebox/inventory",
        Some(r#"[{"ip":"10.0.0.4","hostname":"tv","mac":"aa:bb:cc:dd:ee:ff"}]"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["devices"], 1);

    let (status, _) = call(
        &h.engine,
        "PUT",
        "/api/network/collaborators/unifi/inventory",
        Some("[]"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&h.engine, "POST", "/api/network/latency-monitoring/enable/10.0.0.4", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, monitored) = call(
        &h.engine,
        "POST",
        "/api/network/latency-monitoring/status/batch",
        Some(r#"{"ips":["10.0.0.4","10.0.0.5"]}"#),
    )
    .await;
    assert_eq!(monitored["10.0.0.4"], true);
    assert_eq!(monitored["10.0.0.5"], false);
    h.engine.latency.shutdown();
}
