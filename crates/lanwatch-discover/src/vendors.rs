//! MAC vendor (OUI) database.
//!
//! Parses the Wireshark `manuf` format, including the `/28` and `/36`
//! sub-allocations, and the IEEE `oui.txt` export. Lookups pick the longest
//! matching prefix.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{DiscoverError, Result};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorStats {
    pub entries: usize,
    pub source: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct VendorTable {
    /// Keyed by (prefix bits, masked 48-bit value).
    entries: HashMap<(u8, u64), String>,
    /// Distinct prefix lengths present, longest first.
    lengths: Vec<u8>,
    source: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

impl VendorTable {
    fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for line in text.lines() {
            if let Some((bits, value, vendor)) = parse_line(line) {
                entries.insert((bits, value), vendor);
            }
        }
        let mut lengths: Vec<u8> = entries.keys().map(|(bits, _)| *bits).collect();
        lengths.sort_unstable_by(|a, b| b.cmp(a));
        lengths.dedup();
        Self {
            entries,
            lengths,
            source: None,
            updated_at: None,
        }
    }

    fn lookup(&self, mac: u64) -> Option<&str> {
        self.lengths.iter().find_map(|bits| {
            self.entries
                .get(&(*bits, mac & mask(*bits)))
                .map(String::as_str)
        })
    }
}

/// Shared vendor lookup table, swappable at runtime.
pub struct VendorDb {
    table: RwLock<Arc<VendorTable>>,
    cache_path: Option<PathBuf>,
}

impl VendorDb {
    pub fn empty() -> Self {
        Self {
            table: RwLock::new(Arc::new(VendorTable::default())),
            cache_path: None,
        }
    }

    /// Build from manuf text without a backing file.
    pub fn from_text(text: &str) -> Self {
        let db = Self::empty();
        db.install(VendorTable::parse(text), "inline");
        db
    }

    /// Load the cached manuf file if present. A missing file gives an empty db.
    pub async fn load_file(cache_path: PathBuf) -> Result<Self> {
        let db = Self {
            table: RwLock::new(Arc::new(VendorTable::default())),
            cache_path: Some(cache_path.clone()),
        };
        match tokio::fs::read_to_string(&cache_path).await {
            Ok(text) => {
                let stats = db.install(VendorTable::parse(&text), &cache_path.display().to_string());
                tracing::info!(entries = stats.entries, path = %cache_path.display(), "Loaded vendor database");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %cache_path.display(), "No vendor database cached yet");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(db)
    }

    /// Vendor name for a MAC address in any common notation.
    pub fn lookup(&self, mac: &str) -> Option<String> {
        let value = parse_mac(mac)?;
        self.current().lookup(value).map(str::to_string)
    }

    pub fn stats(&self) -> VendorStats {
        let table = self.current();
        VendorStats {
            entries: table.entries.len(),
            source: table.source.clone(),
            updated_at: table.updated_at,
        }
    }

    /// Download a manuf or oui.txt file, install it and refresh the cache.
    pub async fn update_from_url(&self, url: &str) -> Result<VendorStats> {
        tracing::info!(url = %url, "Downloading vendor database");
        let text = reqwest::get(url).await?.error_for_status()?.text().await?;
        self.replace(&text, url).await
    }

    /// Install a local manuf or oui.txt file and refresh the cache.
    pub async fn update_from_path(&self, path: &Path) -> Result<VendorStats> {
        let text = tokio::fs::read_to_string(path).await?;
        self.replace(&text, &path.display().to_string()).await
    }

    async fn replace(&self, text: &str, source: &str) -> Result<VendorStats> {
        let table = VendorTable::parse(text);
        if table.entries.is_empty() {
            return Err(DiscoverError::validation(
                source,
                "no vendor entries recognized",
            ));
        }
        if let Some(path) = &self.cache_path {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, text).await?;
        }
        let stats = self.install(table, source);
        tracing::info!(entries = stats.entries, source = %source, "Vendor database updated");
        Ok(stats)
    }

    fn install(&self, mut table: VendorTable, source: &str) -> VendorStats {
        table.source = Some(source.to_string());
        table.updated_at = Some(Utc::now());
        let table = Arc::new(table);
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = table;
        self.stats()
    }

    fn current(&self) -> Arc<VendorTable> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn mask(bits: u8) -> u64 {
    let bits = u32::from(bits.min(48));
    if bits == 0 {
        return 0;
    }
    (u64::MAX << (48 - bits)) & 0xFFFF_FFFF_FFFF
}

/// Parse `AA:BB:CC:DD:EE:FF`, `aa-bb-cc-dd-ee-ff` or `aabb.ccdd.eeff`.
pub fn parse_mac(mac: &str) -> Option<u64> {
    let hex: String = mac.chars().filter(char::is_ascii_hexdigit).collect();
    if hex.len() != 12 || mac.chars().any(|c| !c.is_ascii_hexdigit() && !":-.".contains(c)) {
        return None;
    }
    u64::from_str_radix(&hex, 16).ok()
}

/// One entry from either format: `(bits, masked value, vendor)`.
fn parse_line(line: &str) -> Option<(u8, u64, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    // IEEE export: `00-00-0C   (hex)\t\tCisco Systems, Inc`
    if let Some((prefix, vendor)) = line.split_once("(hex)") {
        let (bits, value) = parse_prefix(prefix.trim())?;
        let vendor = vendor.trim();
        return (!vendor.is_empty()).then(|| (bits, value, vendor.to_string()));
    }

    // Wireshark manuf: `prefix<TAB>short<TAB>long`
    let mut fields = line.split('\t').map(str::trim).filter(|f| !f.is_empty());
    let prefix = fields.next()?;
    let short = fields.next()?;
    let vendor = fields.next().unwrap_or(short);
    let (bits, value) = parse_prefix(prefix)?;
    Some((bits, value, vendor.to_string()))
}

/// `00:1B:C5` gives 24 bits; `00:1B:C5:00:00:00/36` gives 36.
fn parse_prefix(token: &str) -> Option<(u8, u64)> {
    let (addr, explicit_bits) = match token.split_once('/') {
        Some((addr, bits)) => (addr, Some(bits.parse::<u8>().ok()?)),
        None => (token, None),
    };
    let bytes: Vec<u8> = addr
        .split([':', '-', '.'])
        .map(|b| u8::from_str_radix(b, 16).ok())
        .collect::<Option<_>>()?;
    if bytes.is_empty() || bytes.len() > 6 {
        return None;
    }
    let bits = explicit_bits.unwrap_or((bytes.len() * 8) as u8);
    if bits == 0 || bits > 48 {
        return None;
    }
    let value = bytes
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, b)| acc | (u64::from(*b) << (40 - 8 * i)));
    Some((bits, value & mask(bits)))
}
