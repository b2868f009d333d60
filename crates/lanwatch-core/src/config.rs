//! Runtime settings for lanwatch.
//!
//! These are the operator-editable settings (schedules, merge priorities,
//! default scan target) that change while the daemon runs. They are
//! persisted as `settings.json` in the data directory. Static daemon
//! configuration (bind address, timeouts, paths) lives with the discover
//! crate and is loaded through the `config` crate.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{ScanType, Source};

/// The full-scan sub-schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FullScanSchedule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_full_interval")]
    pub interval_minutes: u64,
    #[serde(default)]
    pub port_scan_enabled: bool,
}

/// The refresh sub-schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSchedule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_refresh_interval")]
    pub interval_minutes: u64,
    #[serde(default)]
    pub scan_type: ScanType,
}

/// Master switch plus the two independent sub-schedules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub full_scan: FullScanSchedule,
    #[serde(default)]
    pub refresh: RefreshSchedule,
}

/// Target used by scheduled full scans and by scan requests without a range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanDefaults {
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default = "default_true")]
    pub auto_detect: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverwriteExisting {
    #[serde(default)]
    pub hostname: bool,
    #[serde(default)]
    pub vendor: bool,
}

/// Which collaborators contribute to merges. Disabled collaborators keep
/// their place in the priority lists and are skipped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnabledSources {
    #[serde(default)]
    pub freebox: bool,
    #[serde(default)]
    pub unifi: bool,
    #[serde(default = "default_true")]
    pub scanner: bool,
}

impl EnabledSources {
    pub fn is_enabled(&self, source: Source) -> bool {
        match source {
            Source::Freebox => self.freebox,
            Source::Unifi => self.unifi,
            Source::Scanner => self.scanner,
            Source::Manual => true,
        }
    }
}

/// Ordered merge preferences per field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PluginPriorityConfig {
    #[serde(default = "default_priority")]
    pub hostname_priority: Vec<Source>,
    #[serde(default = "default_priority")]
    pub vendor_priority: Vec<Source>,
    #[serde(default)]
    pub overwrite_existing: OverwriteExisting,
    #[serde(default)]
    pub enabled: EnabledSources,
}

/// Everything an operator can change at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub defaults: ScanDefaults,
    #[serde(default)]
    pub plugin_priority: PluginPriorityConfig,
}

fn default_true() -> bool {
    true
}

fn default_full_interval() -> u64 {
    60
}

fn default_refresh_interval() -> u64 {
    5
}

fn default_priority() -> Vec<Source> {
    vec![Source::Unifi, Source::Freebox, Source::Scanner]
}

impl Default for FullScanSchedule {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_full_interval(),
            port_scan_enabled: false,
        }
    }
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_refresh_interval(),
            scan_type: ScanType::Quick,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            full_scan: FullScanSchedule::default(),
            refresh: RefreshSchedule::default(),
        }
    }
}

impl Default for ScanDefaults {
    fn default() -> Self {
        Self {
            range: None,
            auto_detect: true,
        }
    }
}

impl Default for EnabledSources {
    fn default() -> Self {
        Self {
            freebox: false,
            unifi: false,
            scanner: true,
        }
    }
}

impl Default for PluginPriorityConfig {
    fn default() -> Self {
        Self {
            hostname_priority: default_priority(),
            vendor_priority: default_priority(),
            overwrite_existing: OverwriteExisting::default(),
            enabled: EnabledSources::default(),
        }
    }
}

/// Longest accepted schedule interval: one year.
pub const MAX_INTERVAL_MINUTES: u64 = 366 * 24 * 60;

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_interval("fullScan.intervalMinutes", self.full_scan.interval_minutes)?;
        validate_interval("refresh.intervalMinutes", self.refresh.interval_minutes)
    }
}

fn validate_interval(field: &str, minutes: u64) -> Result<(), CoreError> {
    if minutes == 0 {
        return Err(CoreError::invalid(field, "must be at least 1 minute"));
    }
    if minutes > MAX_INTERVAL_MINUTES {
        return Err(CoreError::invalid(
            field,
            format!("must be at most {MAX_INTERVAL_MINUTES} minutes"),
        ));
    }
    Ok(())
}

impl ScanDefaults {
    pub fn validate(&self) -> Result<(), CoreError> {
        let has_range = self.range.as_deref().is_some_and(|r| !r.trim().is_empty());
        if !has_range && !self.auto_detect {
            return Err(CoreError::invalid(
                "range",
                "a range is required when autoDetect is off",
            ));
        }
        Ok(())
    }
}

impl PluginPriorityConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_priority("hostnamePriority", &self.hostname_priority)?;
        validate_priority("vendorPriority", &self.vendor_priority)
    }

    /// Position of `source` in the hostname or vendor list. Sources absent
    /// from the list (including `manual`) rank after every listed source.
    pub fn rank(list: &[Source], source: Source) -> usize {
        list.iter().position(|s| *s == source).unwrap_or(usize::MAX)
    }
}

fn validate_priority(field: &str, list: &[Source]) -> Result<(), CoreError> {
    for (i, source) in list.iter().enumerate() {
        if *source == Source::Manual {
            return Err(CoreError::invalid(field, "manual is not a collaborator"));
        }
        if list[..i].contains(source) {
            return Err(CoreError::invalid(field, format!("duplicate entry {source}")));
        }
    }
    Ok(())
}

impl Settings {
    pub fn validate(&self) -> Result<(), CoreError> {
        self.schedule.validate()?;
        self.defaults.validate()?;
        self.plugin_priority.validate()
    }

    /// Load settings from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Write settings atomically (temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), "Settings saved");
        Ok(())
    }
}
