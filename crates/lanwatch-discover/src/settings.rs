//! Shared handle on the operator-editable runtime settings.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use lanwatch_core::{PluginPriorityConfig, ScanDefaults, ScheduleConfig, Settings};

use crate::error::Result;

/// Cloneable handle; every clone sees the same settings.
#[derive(Clone)]
pub struct SettingsHandle {
    inner: Arc<RwLock<Settings>>,
    path: Option<PathBuf>,
}

impl SettingsHandle {
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
            path: None,
        }
    }

    /// Load from `path`; a missing file gives defaults.
    pub fn load(path: PathBuf) -> Result<Self> {
        let settings = Settings::load(&path)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(settings)),
            path: Some(path),
        })
    }

    pub fn get(&self) -> Settings {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn schedule(&self) -> ScheduleConfig {
        self.get().schedule
    }

    pub fn defaults(&self) -> ScanDefaults {
        self.get().defaults
    }

    pub fn plugin_priority(&self) -> PluginPriorityConfig {
        self.get().plugin_priority
    }

    /// Apply `edit` to a copy, validate it, then persist and publish it.
    /// Nothing changes if validation or the write fails.
    pub fn update<F>(&self, edit: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        edit(&mut next);
        next.validate()?;
        if let Some(path) = &self.path {
            next.save(path)?;
        }
        *guard = next.clone();
        Ok(next)
    }
}
