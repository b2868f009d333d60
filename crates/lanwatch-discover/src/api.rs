//! REST surface under `/api/network`, plus `/health`.

use std::net::Ipv4Addr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use lanwatch_core::config::{FullScanSchedule, RefreshSchedule};
use lanwatch_core::{PluginPriorityConfig, ScanDefaults, ScanTrigger, ScanType, ScheduleConfig, Source};
use lanwatch_store::{HostQuery, ManualHost, StoreError};

use crate::collaborators::InventoryDevice;
use crate::engine::Engine;
use crate::error::{DiscoverError, Result};
use crate::orchestrator::ScanTarget;
use crate::range::ScanRange;

type AppState = State<Arc<Engine>>;

// ── Errors ───────────────────────────────────────────────────────

/// Error response: status from the error kind, body `{"error": "..."}`.
pub struct ApiError(DiscoverError);

impl<E: Into<DiscoverError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            DiscoverError::Validation { .. } | DiscoverError::Settings(_) => StatusCode::BAD_REQUEST,
            DiscoverError::Conflict(_) => StatusCode::CONFLICT,
            DiscoverError::NotFound(_) => StatusCode::NOT_FOUND,
            DiscoverError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            DiscoverError::Store(StoreError::AlreadyExists(_) | StoreError::Banned(_)) => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn parse_ip(raw: &str) -> ApiResult<Ipv4Addr> {
    raw.trim()
        .parse()
        .map_err(|_| DiscoverError::validation(raw, "not a valid IPv4 address").into())
}

fn parse_ips(raw: &[String]) -> ApiResult<Vec<Ipv4Addr>> {
    raw.iter().map(|ip| parse_ip(ip)).collect()
}

/// Decode a JSON body that may be absent.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| DiscoverError::validation("body", e.to_string()).into())
}

// ── Router ───────────────────────────────────────────────────────

pub fn router(engine: Arc<Engine>) -> Router {
    let api = Router::new()
        // scans
        .route("/scan", post(start_scan))
        .route("/scan-stop", post(stop_scan))
        .route("/progress", get(progress))
        .route("/refresh", post(refresh))
        // port scans
        .route("/port-scan", post(start_port_scan))
        .route("/port-scan-stop", post(stop_port_scan))
        .route("/port-scan-progress", get(port_scan_progress))
        // hosts
        .route("/history", get(list_hosts))
        .route("/add-manual", post(add_manual))
        .route("/clear", delete(clear_hosts))
        .route("/{ip}", delete(remove_host))
        .route("/{ip}/hostname", post(set_hostname))
        .route("/{ip}/rescan", post(rescan_host))
        // ban list
        .route("/blacklist", get(list_banned))
        .route("/blacklist/add", post(ban_host))
        .route("/blacklist/remove", post(unban_host))
        // stats
        .route("/stats", get(stats))
        .route("/stats-history", get(stats_history))
        // settings
        .route("/config", get(get_full_scan_config).post(set_full_scan_config))
        .route("/refresh-config", get(get_refresh_config).post(set_refresh_config))
        .route("/unified-config", get(get_unified_config).post(set_unified_config))
        .route("/default-config", get(get_default_config).post(set_default_config))
        .route(
            "/plugin-priority-config",
            get(get_priority_config).post(set_priority_config),
        )
        // vendors
        .route("/wireshark-vendor-stats", get(vendor_stats))
        .route("/update-wireshark-vendors", post(update_vendors))
        // latency
        .route("/latency-monitoring/enable/{ip}", post(enable_latency))
        .route("/latency-monitoring/disable/{ip}", post(disable_latency))
        .route("/latency-monitoring/status/batch", post(latency_status))
        .route("/latency-monitoring/stats/batch", post(latency_stats))
        // collaborators
        .route("/collaborators/{id}/inventory", put(replace_inventory));

    Router::new()
        .route("/health", get(health))
        .nest("/api/network", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

/// Serve the API until `shutdown` is cancelled.
pub async fn serve(engine: Arc<Engine>, bind: &str, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(bind = %bind, "API listening");
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn health(State(engine): AppState) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "scanRunning": engine.orchestrator.is_running(),
        "hosts": engine.store.len(),
    }))
}

// ── Scans ────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanRequest {
    range: Option<String>,
    auto_detect: Option<bool>,
    scan_type: Option<ScanType>,
}

async fn start_scan(State(engine): AppState, body: Bytes) -> ApiResult<impl IntoResponse> {
    let req: ScanRequest = optional_body(&body)?;
    let target = match (req.range.filter(|r| !r.trim().is_empty()), req.auto_detect) {
        (Some(range), _) => ScanTarget::Range(range),
        (None, Some(true)) => ScanTarget::AutoDetect,
        (None, _) => ScanTarget::Default,
    };
    let job_id = engine.orchestrator.start_scan(
        target,
        req.scan_type.unwrap_or(ScanType::Full),
        ScanTrigger::Manual,
    )?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))))
}

async fn stop_scan(State(engine): AppState) -> Json<serde_json::Value> {
    Json(json!({ "stopped": engine.orchestrator.stop_scan() }))
}

async fn progress(State(engine): AppState) -> Response {
    match engine.orchestrator.progress() {
        Some(job) => Json(job).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    scan_type: Option<ScanType>,
}

async fn refresh(State(engine): AppState, body: Bytes) -> ApiResult<impl IntoResponse> {
    let req: RefreshRequest = optional_body(&body)?;
    let summary = engine
        .orchestrator
        .start_refresh(req.scan_type.unwrap_or_default(), ScanTrigger::Manual)
        .await?;
    Ok(Json(summary))
}

// ── Port scans ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct PortScanRequest {
    ips: Option<Vec<String>>,
}

async fn start_port_scan(State(engine): AppState, body: Bytes) -> ApiResult<impl IntoResponse> {
    let req: PortScanRequest = optional_body(&body)?;
    let hosts = match req.ips {
        Some(ips) => parse_ips(&ips)?,
        None => engine.store.online_targets(),
    };
    let total = hosts.len();
    let started = engine.port_scanner.start(hosts);
    Ok(Json(json!({ "started": started, "total": total })))
}

async fn stop_port_scan(State(engine): AppState) -> Json<serde_json::Value> {
    Json(json!({ "stopped": engine.port_scanner.stop() }))
}

async fn port_scan_progress(State(engine): AppState) -> impl IntoResponse {
    Json(engine.port_scanner.progress())
}

// ── Hosts ────────────────────────────────────────────────────────

async fn list_hosts(State(engine): AppState, Query(query): Query<HostQuery>) -> impl IntoResponse {
    Json(engine.store.list(&query))
}

#[derive(Debug, Deserialize)]
struct AddManualRequest {
    ip: String,
    mac: Option<String>,
    hostname: Option<String>,
    vendor: Option<String>,
}

async fn add_manual(
    State(engine): AppState,
    Json(req): Json<AddManualRequest>,
) -> ApiResult<impl IntoResponse> {
    let ip = parse_ip(&req.ip)?;
    let record = engine.store.add_manual(
        ip,
        ManualHost {
            mac: req.mac,
            hostname: req.hostname,
            vendor: req.vendor,
        },
        Utc::now(),
    )?;
    persist(&engine);
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
struct HostnameRequest {
    #[serde(default)]
    hostname: String,
}

async fn set_hostname(
    State(engine): AppState,
    Path(ip): Path<String>,
    Json(req): Json<HostnameRequest>,
) -> ApiResult<impl IntoResponse> {
    let ip = parse_ip(&ip)?;
    let record = engine.store.set_hostname(ip, &req.hostname)?;
    persist(&engine);
    Ok(Json(record))
}

async fn rescan_host(State(engine): AppState, Path(ip): Path<String>) -> ApiResult<impl IntoResponse> {
    let ip = parse_ip(&ip)?;
    let record = engine.orchestrator.rescan_host(ip).await?;
    persist(&engine);
    Ok(Json(record))
}

async fn remove_host(State(engine): AppState, Path(ip): Path<String>) -> ApiResult<impl IntoResponse> {
    let ip = parse_ip(&ip)?;
    engine.latency.disable(ip);
    let record = engine.store.remove(ip)?;
    persist(&engine);
    Ok(Json(json!({ "removed": record.ip })))
}

async fn clear_hosts(State(engine): AppState) -> impl IntoResponse {
    let summary = engine.store.clear();
    persist(&engine);
    Json(summary)
}

fn persist(engine: &Engine) {
    if let Err(e) = engine.store.persist() {
        tracing::warn!(error = %e, "Failed to persist host store");
    }
}

// ── Ban list ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BanRequest {
    ip: String,
    reason: Option<String>,
}

async fn list_banned(State(engine): AppState) -> impl IntoResponse {
    Json(engine.store.banned())
}

async fn ban_host(State(engine): AppState, Json(req): Json<BanRequest>) -> ApiResult<impl IntoResponse> {
    let ip = parse_ip(&req.ip)?;
    let entry = engine.store.ban(ip, req.reason, Utc::now());
    persist(&engine);
    Ok(Json(entry))
}

async fn unban_host(State(engine): AppState, Json(req): Json<BanRequest>) -> ApiResult<impl IntoResponse> {
    let ip = parse_ip(&req.ip)?;
    let removed = engine.store.unban(ip);
    persist(&engine);
    Ok(Json(json!({ "removed": removed })))
}

// ── Stats ────────────────────────────────────────────────────────

async fn stats(State(engine): AppState) -> impl IntoResponse {
    Json(engine.store.stats())
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    #[serde(default = "default_history_hours")]
    hours: u32,
}

fn default_history_hours() -> u32 {
    24
}

async fn stats_history(
    State(engine): AppState,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    Json(engine.store.history(params.hours, Utc::now()))
}

// ── Settings ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FullScanConfigView {
    enabled: bool,
    full_scan: FullScanSchedule,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullScanPatch {
    enabled: Option<bool>,
    interval_minutes: Option<u64>,
    port_scan_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullScanConfigUpdate {
    enabled: Option<bool>,
    #[serde(default)]
    full_scan: FullScanPatch,
}

fn full_scan_view(schedule: ScheduleConfig) -> FullScanConfigView {
    FullScanConfigView {
        enabled: schedule.enabled,
        full_scan: schedule.full_scan,
    }
}

async fn get_full_scan_config(State(engine): AppState) -> impl IntoResponse {
    Json(full_scan_view(engine.settings.schedule()))
}

async fn set_full_scan_config(
    State(engine): AppState,
    Json(update): Json<FullScanConfigUpdate>,
) -> ApiResult<impl IntoResponse> {
    let settings = engine.settings.update(|s| {
        if let Some(enabled) = update.enabled {
            s.schedule.enabled = enabled;
        }
        let full = &mut s.schedule.full_scan;
        if let Some(enabled) = update.full_scan.enabled {
            full.enabled = enabled;
        }
        if let Some(minutes) = update.full_scan.interval_minutes {
            full.interval_minutes = minutes;
        }
        if let Some(ports) = update.full_scan.port_scan_enabled {
            full.port_scan_enabled = ports;
        }
    })?;
    Ok(Json(full_scan_view(settings.schedule)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshPatch {
    enabled: Option<bool>,
    interval_minutes: Option<u64>,
    scan_type: Option<ScanType>,
}

async fn get_refresh_config(State(engine): AppState) -> impl IntoResponse {
    Json(engine.settings.schedule().refresh)
}

async fn set_refresh_config(
    State(engine): AppState,
    Json(patch): Json<RefreshPatch>,
) -> ApiResult<Json<RefreshSchedule>> {
    let settings = engine.settings.update(|s| {
        let refresh = &mut s.schedule.refresh;
        if let Some(enabled) = patch.enabled {
            refresh.enabled = enabled;
        }
        if let Some(minutes) = patch.interval_minutes {
            refresh.interval_minutes = minutes;
        }
        if let Some(scan_type) = patch.scan_type {
            refresh.scan_type = scan_type;
        }
    })?;
    Ok(Json(settings.schedule.refresh))
}

async fn get_unified_config(State(engine): AppState) -> impl IntoResponse {
    Json(json!({
        "schedule": engine.settings.schedule(),
        "nextRuns": engine.scheduler.next_runs(),
    }))
}

async fn set_unified_config(
    State(engine): AppState,
    Json(schedule): Json<ScheduleConfig>,
) -> ApiResult<impl IntoResponse> {
    engine.settings.update(|s| s.schedule = schedule)?;
    Ok(Json(json!({
        "schedule": engine.settings.schedule(),
        "nextRuns": engine.scheduler.next_runs(),
    })))
}

async fn get_default_config(State(engine): AppState) -> impl IntoResponse {
    Json(engine.settings.defaults())
}

async fn set_default_config(
    State(engine): AppState,
    Json(defaults): Json<ScanDefaults>,
) -> ApiResult<Json<ScanDefaults>> {
    if let Some(range) = defaults.range.as_deref().filter(|r| !r.trim().is_empty()) {
        ScanRange::parse(range, engine.config.effective_min_prefix())?;
    }
    let settings = engine.settings.update(|s| s.defaults = defaults)?;
    Ok(Json(settings.defaults))
}

async fn get_priority_config(State(engine): AppState) -> impl IntoResponse {
    Json(engine.settings.plugin_priority())
}

async fn set_priority_config(
    State(engine): AppState,
    Json(priority): Json<PluginPriorityConfig>,
) -> ApiResult<Json<PluginPriorityConfig>> {
    let settings = engine.settings.update(|s| s.plugin_priority = priority)?;
    Ok(Json(settings.plugin_priority))
}

// ── Vendors ──────────────────────────────────────────────────────

async fn vendor_stats(State(engine): AppState) -> impl IntoResponse {
    Json(engine.vendors.stats())
}

#[derive(Debug, Default, Deserialize)]
struct VendorUpdateRequest {
    url: Option<String>,
    path: Option<String>,
}

async fn update_vendors(State(engine): AppState, body: Bytes) -> ApiResult<impl IntoResponse> {
    let req: VendorUpdateRequest = optional_body(&body)?;
    let stats = match req.path {
        Some(path) => engine.vendors.update_from_path(std::path::Path::new(&path)).await?,
        None => {
            let url = req.url.unwrap_or_else(|| engine.config.vendors.update_url.clone());
            engine.vendors.update_from_url(&url).await?
        }
    };
    Ok(Json(stats))
}

// ── Latency ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct IpBatch {
    ips: Vec<String>,
}

async fn enable_latency(State(engine): AppState, Path(ip): Path<String>) -> ApiResult<impl IntoResponse> {
    let ip = parse_ip(&ip)?;
    let changed = engine.latency.enable(ip);
    Ok(Json(json!({ "ip": ip, "enabled": true, "changed": changed })))
}

async fn disable_latency(State(engine): AppState, Path(ip): Path<String>) -> ApiResult<impl IntoResponse> {
    let ip = parse_ip(&ip)?;
    let changed = engine.latency.disable(ip);
    Ok(Json(json!({ "ip": ip, "enabled": false, "changed": changed })))
}

async fn latency_status(State(engine): AppState, Json(batch): Json<IpBatch>) -> ApiResult<impl IntoResponse> {
    let ips = parse_ips(&batch.ips)?;
    Ok(Json(engine.latency.status(&ips)))
}

async fn latency_stats(State(engine): AppState, Json(batch): Json<IpBatch>) -> ApiResult<impl IntoResponse> {
    let ips = parse_ips(&batch.ips)?;
    Ok(Json(engine.latency.stats(&ips, Utc::now())))
}

// ── Collaborators ────────────────────────────────────────────────

async fn replace_inventory(
    State(engine): AppState,
    Path(id): Path<String>,
    Json(devices): Json<Vec<InventoryDevice>>,
) -> ApiResult<impl IntoResponse> {
    let source: Source = id
        .parse()
        .map_err(|e: String| DiscoverError::validation(id.clone(), e))?;
    let inventory = engine.collaborators.inventory(source)?;
    let count = inventory.replace(devices);
    tracing::info!(source = %source, devices = count, "Collaborator inventory replaced");
    Ok(Json(json!({ "source": source, "devices": count })))
}
