//! Store construction, snapshot persistence and the shared host map.

use std::collections::VecDeque;
use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use lanwatch_core::{BanEntry, HistoryBucket, HostRecord};

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Host not found: {0}")]
    NotFound(Ipv4Addr),

    #[error("Host already exists: {0}")]
    AlreadyExists(Ipv4Addr),

    #[error("Host is banned: {0}")]
    Banned(Ipv4Addr),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration for the host store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Where the JSON snapshot lives. `None` keeps the store in memory only.
    pub snapshot_path: Option<PathBuf>,
    /// Maximum number of hourly history buckets kept.
    pub history_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            history_capacity: 168,
        }
    }
}

/// On-disk layout of a store snapshot.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    #[serde(default)]
    pub hosts: Vec<HostRecord>,
    #[serde(default)]
    pub banned: Vec<BanEntry>,
    #[serde(default)]
    pub history: Vec<HistoryBucket>,
}

/// Concurrent host record store.
///
/// Records live in a sharded map, so a write locks only the shard holding
/// its key. `clear` takes the gate exclusively; every other mutation holds
/// it shared, so a clear never interleaves with a half-applied write.
pub struct HostStore {
    pub(crate) hosts: DashMap<Ipv4Addr, HostRecord>,
    pub(crate) banned: DashMap<Ipv4Addr, BanEntry>,
    pub(crate) history: Mutex<VecDeque<HistoryBucket>>,
    pub(crate) gate: RwLock<()>,
    pub(crate) config: StoreConfig,
}

impl HostStore {
    /// An empty in-memory store.
    pub fn in_memory() -> Self {
        Self::empty(StoreConfig::default())
    }

    fn empty(config: StoreConfig) -> Self {
        Self {
            hosts: DashMap::new(),
            banned: DashMap::new(),
            history: Mutex::new(VecDeque::new()),
            gate: RwLock::new(()),
            config,
        }
    }

    /// Open a store, loading the snapshot if one exists.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let path = config.snapshot_path.clone();
        let store = Self::empty(config);

        let Some(path) = path else {
            return Ok(store);
        };
        if !path.exists() {
            tracing::info!(path = %path.display(), "No host snapshot yet, starting empty");
            return Ok(store);
        }

        let json = fs::read_to_string(&path)?;
        let snapshot: Snapshot = serde_json::from_str(&json)?;

        for host in snapshot.hosts {
            store.hosts.insert(host.ip, host);
        }
        for ban in snapshot.banned {
            store.banned.insert(ban.ip, ban);
        }
        {
            let mut history = store.history_lock();
            history.extend(snapshot.history);
            while history.len() > store.config.history_capacity {
                history.pop_front();
            }
        }

        tracing::info!(
            path = %path.display(),
            hosts = store.hosts.len(),
            banned = store.banned.len(),
            "Host snapshot loaded"
        );
        Ok(store)
    }

    /// Write the current state to the snapshot file, if one is configured.
    pub fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = self.config.snapshot_path.as_ref() else {
            return Ok(());
        };

        let snapshot = {
            let _gate = self.gate_shared();
            let mut hosts: Vec<HostRecord> = self.hosts.iter().map(|e| e.value().clone()).collect();
            hosts.sort_by_key(|h| h.ip);
            let mut banned: Vec<BanEntry> = self.banned.iter().map(|e| e.value().clone()).collect();
            banned.sort_by_key(|b| b.ip);
            let history = self.history_lock().iter().cloned().collect();
            Snapshot {
                hosts,
                banned,
                history,
            }
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&snapshot)?)?;
        fs::rename(&tmp, path)?;

        tracing::debug!(
            path = %path.display(),
            hosts = snapshot.hosts.len(),
            "Host snapshot written"
        );
        Ok(())
    }

    pub(crate) fn gate_shared(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn gate_exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn history_lock(&self) -> MutexGuard<'_, VecDeque<HistoryBucket>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
