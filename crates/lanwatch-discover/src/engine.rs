//! Wires the store, probes, orchestrator and background services together.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lanwatch_core::Source;
use lanwatch_store::{HostStore, StoreConfig};

use crate::collaborators::{CollaboratorSet, InventorySource};
use crate::config::DiscoverConfig;
use crate::error::Result;
use crate::latency::{LatencyMonitor, LatencySettings};
use crate::orchestrator::ScanOrchestrator;
use crate::portscan::{PortProbe, PortScanner};
use crate::probe::{HostProbe, HostProber, ProberSettings, SystemProbe};
use crate::scanner::NmapScanner;
use crate::scheduler::ScanScheduler;
use crate::settings::SettingsHandle;
use crate::vendors::VendorDb;

/// Everything the daemon and the API share.
pub struct Engine {
    pub config: DiscoverConfig,
    pub store: Arc<HostStore>,
    pub settings: SettingsHandle,
    pub vendors: Arc<VendorDb>,
    pub collaborators: Arc<CollaboratorSet>,
    pub orchestrator: Arc<ScanOrchestrator>,
    pub port_scanner: Arc<PortScanner>,
    pub latency: Arc<LatencyMonitor>,
    pub scheduler: Arc<ScanScheduler>,
}

/// Storage pieces an engine is assembled from.
pub struct EngineParts {
    pub store: Arc<HostStore>,
    pub settings: SettingsHandle,
    pub vendors: Arc<VendorDb>,
    pub collaborators: Arc<CollaboratorSet>,
    pub host_probe: Arc<dyn HostProbe>,
    pub port_probe: Arc<dyn PortProbe>,
}

impl Engine {
    /// Build the production engine: on-disk store and settings under
    /// `data_dir`, system probes and nmap.
    pub async fn build(config: DiscoverConfig) -> Result<Self> {
        tokio::fs::create_dir_all(config.data_path()).await?;

        let store = Arc::new(HostStore::open(StoreConfig {
            snapshot_path: Some(config.snapshot_path()),
            history_capacity: config.history_capacity,
        })?);
        let settings = SettingsHandle::load(config.settings_path())?;
        let vendors = Arc::new(VendorDb::load_file(config.manuf_path()).await?);

        let freebox = inventory(Source::Freebox, config.collaborators.freebox_inventory.as_deref());
        let unifi = inventory(Source::Unifi, config.collaborators.unifi_inventory.as_deref());
        let collaborators = Arc::new(
            CollaboratorSet::new()
                .with_inventory(Arc::new(freebox))
                .with_inventory(Arc::new(unifi)),
        );

        let nmap = NmapScanner::new(&config.port_scan);
        match nmap.verify_installation().await {
            Ok(version) => {
                tracing::info!(version = version.lines().next().unwrap_or_default(), "Found nmap");
            }
            Err(e) => tracing::warn!(error = %e, "nmap unavailable; port scans will fail"),
        }

        let parts = EngineParts {
            store,
            settings,
            vendors,
            collaborators,
            host_probe: Arc::new(SystemProbe::new(&config.probe)),
            port_probe: Arc::new(nmap),
        };
        Ok(Self::assemble(config, parts))
    }

    /// Assemble an engine from explicit parts.
    pub fn assemble(config: DiscoverConfig, parts: EngineParts) -> Self {
        let prober = HostProber::new(
            parts.host_probe.clone(),
            parts.vendors.clone(),
            ProberSettings::from(&config.probe),
        );
        let port_scanner = Arc::new(PortScanner::new(parts.port_probe, parts.store.clone()));
        let orchestrator = Arc::new(ScanOrchestrator::new(
            parts.store.clone(),
            prober,
            parts.collaborators.clone(),
            parts.settings.clone(),
            port_scanner.clone(),
            config.effective_min_prefix(),
        ));
        let latency = Arc::new(LatencyMonitor::new(
            parts.host_probe,
            LatencySettings::from_config(&config.latency, config.probe.ping_timeout()),
        ));
        let scheduler = Arc::new(ScanScheduler::new(
            orchestrator.clone(),
            parts.settings.clone(),
            Duration::from_secs(config.scheduler.tick_secs.max(1)),
        ));

        Self {
            config,
            store: parts.store,
            settings: parts.settings,
            vendors: parts.vendors,
            collaborators: parts.collaborators,
            orchestrator,
            port_scanner,
            latency,
            scheduler,
        }
    }

    /// Stop background work and flush the store.
    pub fn shutdown(&self) {
        self.orchestrator.stop_scan();
        self.port_scanner.stop();
        self.latency.shutdown();
        if let Err(e) = self.store.persist() {
            tracing::error!(error = %e, "Failed to persist host store on shutdown");
        }
    }
}

fn inventory(id: Source, path: Option<&str>) -> InventorySource {
    let Some(path) = path else {
        return InventorySource::new(id);
    };
    match InventorySource::from_file(id, Path::new(path)) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!(source = %id, path, error = %e, "Failed to load collaborator inventory");
            InventorySource::new(id)
        }
    }
}
