//! Collaborator device sources (router and controller inventories).
//!
//! Each source can answer "what do you know about this address?" with an
//! optional hostname, vendor and MAC. Sources are consulted during full scans
//! and their answers feed the priority merger.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lanwatch_core::{EnabledSources, Source};

use crate::error::{DiscoverError, Result};

/// What one source knows about one address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHints {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
}

impl DeviceHints {
    pub fn is_empty(&self) -> bool {
        self.hostname.is_none() && self.vendor.is_none() && self.mac.is_none()
    }
}

#[async_trait]
pub trait DeviceSource: Send + Sync {
    fn id(&self) -> Source;

    async fn lookup(&self, ip: Ipv4Addr) -> Result<DeviceHints>;
}

/// One device pushed by, or exported from, a collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryDevice {
    pub ip: Ipv4Addr,
    #[serde(flatten)]
    pub hints: DeviceHints,
}

/// Device source backed by an inventory snapshot that can be replaced at
/// runtime through the API.
pub struct InventorySource {
    id: Source,
    devices: RwLock<HashMap<Ipv4Addr, DeviceHints>>,
}

impl InventorySource {
    pub fn new(id: Source) -> Self {
        Self {
            id,
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Seed from a JSON array of [`InventoryDevice`].
    pub fn from_file(id: Source, path: &Path) -> Result<Self> {
        let source = Self::new(id);
        let data = std::fs::read(path)?;
        let devices: Vec<InventoryDevice> = serde_json::from_slice(&data)?;
        let count = source.replace(devices);
        tracing::info!(source = %id, devices = count, path = %path.display(), "Loaded collaborator inventory");
        Ok(source)
    }

    /// Swap in a new inventory. Returns the number of addresses held.
    pub fn replace(&self, devices: Vec<InventoryDevice>) -> usize {
        let map: HashMap<Ipv4Addr, DeviceHints> = devices
            .into_iter()
            .map(|d| (d.ip, normalize(d.hints)))
            .collect();
        let count = map.len();
        *self.devices.write().unwrap_or_else(PoisonError::into_inner) = map;
        count
    }

    pub fn len(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeviceSource for InventorySource {
    fn id(&self) -> Source {
        self.id
    }

    async fn lookup(&self, ip: Ipv4Addr) -> Result<DeviceHints> {
        Ok(self
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ip)
            .cloned()
            .unwrap_or_default())
    }
}

fn normalize(hints: DeviceHints) -> DeviceHints {
    let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    DeviceHints {
        hostname: clean(hints.hostname),
        vendor: clean(hints.vendor),
        mac: clean(hints.mac).map(|m| m.to_uppercase()),
    }
}

/// All registered collaborator sources.
#[derive(Default)]
pub struct CollaboratorSet {
    sources: Vec<Arc<dyn DeviceSource>>,
    inventories: HashMap<Source, Arc<InventorySource>>,
}

impl CollaboratorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an API-replaceable inventory source.
    pub fn with_inventory(mut self, inventory: Arc<InventorySource>) -> Self {
        self.inventories.insert(inventory.id(), inventory.clone());
        self.sources.push(inventory);
        self
    }

    pub fn with_source(mut self, source: Arc<dyn DeviceSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn inventory(&self, id: Source) -> Result<Arc<InventorySource>> {
        self.inventories
            .get(&id)
            .cloned()
            .ok_or_else(|| DiscoverError::NotFound(format!("collaborator {id}")))
    }

    /// Ask every enabled source about `ip`. Failing sources contribute
    /// nothing; the scan carries on without them.
    pub async fn lookup_all(
        &self,
        ip: Ipv4Addr,
        enabled: &EnabledSources,
    ) -> HashMap<Source, DeviceHints> {
        let mut found = HashMap::new();
        for source in &self.sources {
            let id = source.id();
            if !enabled.is_enabled(id) {
                continue;
            }
            match source.lookup(ip).await {
                Ok(hints) if !hints.is_empty() => {
                    found.insert(id, hints);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(source = %id, ip = %ip, error = %e, "Collaborator lookup failed");
                }
            }
        }
        found
    }
}
