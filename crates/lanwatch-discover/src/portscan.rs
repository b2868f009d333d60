//! Background port scanner.
//!
//! Scans a list of hosts one at a time and stores each host's open ports.
//! At most one port scan runs at a time; progress is observable while it
//! runs and resets to idle when it finishes or is stopped.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use lanwatch_core::{OpenPort, PortScanState};
use lanwatch_store::{HostStore, StoreError};

use crate::error::Result;

#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn scan_host(&self, ip: Ipv4Addr) -> Result<Vec<OpenPort>>;
}

pub struct PortScanner {
    probe: Arc<dyn PortProbe>,
    store: Arc<HostStore>,
    state: Mutex<PortScanState>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl PortScanner {
    pub fn new(probe: Arc<dyn PortProbe>, store: Arc<HostStore>) -> Self {
        Self {
            probe,
            store,
            state: Mutex::new(PortScanState::default()),
            cancel: Mutex::new(None),
        }
    }

    /// Start scanning `hosts` in the background. Returns `false` when a
    /// port scan is already active.
    pub fn start(self: &Arc<Self>, hosts: Vec<Ipv4Addr>) -> bool {
        let token = CancellationToken::new();
        {
            let mut state = self.state();
            if state.active {
                return false;
            }
            *state = PortScanState {
                active: true,
                current: 0,
                total: hosts.len() as u64,
                current_ip: None,
                started_at: Some(Utc::now()),
            };
            *self.cancel_slot() = Some(token.clone());
        }

        tracing::info!(hosts = hosts.len(), "Port scan started");
        let this = self.clone();
        tokio::spawn(async move { this.run(hosts, token).await });
        true
    }

    /// Request the active port scan to stop after the current host.
    pub fn stop(&self) -> bool {
        match self.cancel_slot().as_ref() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn progress(&self) -> PortScanState {
        self.state().clone()
    }

    pub fn is_active(&self) -> bool {
        self.state().active
    }

    async fn run(self: Arc<Self>, hosts: Vec<Ipv4Addr>, token: CancellationToken) {
        let mut scanned = 0usize;
        for (i, ip) in hosts.iter().enumerate() {
            if token.is_cancelled() {
                break;
            }
            if self.store.is_banned(*ip) {
                continue;
            }
            {
                let mut state = self.state();
                state.current = i as u64 + 1;
                state.current_ip = Some(*ip);
            }

            match self.probe.scan_host(*ip).await {
                Ok(ports) => match self.store.set_open_ports(*ip, ports, Utc::now()) {
                    Ok(()) => scanned += 1,
                    Err(StoreError::NotFound(_)) => {
                        tracing::debug!(ip = %ip, "Host removed during port scan");
                    }
                    Err(e) => tracing::warn!(ip = %ip, error = %e, "Failed to store open ports"),
                },
                Err(e) => tracing::warn!(ip = %ip, error = %e, "Port scan of host failed"),
            }
        }

        let stopped = token.is_cancelled();
        *self.state() = PortScanState::default();
        *self.cancel_slot() = None;

        if let Err(e) = self.store.persist() {
            tracing::warn!(error = %e, "Failed to persist after port scan");
        }
        tracing::info!(scanned, total = hosts.len(), stopped, "Port scan finished");
    }

    fn state(&self) -> MutexGuard<'_, PortScanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
