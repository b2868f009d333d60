//! Plugin priority merging for hostname and vendor.
//!
//! Each field walks its priority list; the first enabled source with a
//! non-empty value is the winner. Whether the winner replaces the stored
//! value depends on `overwriteExisting` for that field:
//!
//! - overwrite on: the winner always replaces the stored value.
//! - overwrite off: a stored value is kept unless the winner's source ranks
//!   strictly higher than the stored source. Manual values are never replaced.
//!
//! With no winner the stored value stays. A merge never blanks a field.

use std::collections::HashMap;

use lanwatch_core::{EnabledSources, HostRecord, PluginPriorityConfig, Source};
use lanwatch_store::FieldUpdate;

use crate::collaborators::DeviceHints;

/// Values offered for one field, keyed by the source offering them.
pub type Offers = HashMap<Source, String>;

/// Hostname and vendor offers gathered for one address.
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    pub hostname: Offers,
    pub vendor: Offers,
}

impl Candidates {
    /// Collect offers from the scanner's own findings plus collaborator hints.
    pub fn gather(
        scanner_hostname: Option<&str>,
        scanner_vendor: Option<&str>,
        collaborators: &HashMap<Source, DeviceHints>,
    ) -> Self {
        let mut candidates = Self::default();
        candidates.offer(Source::Scanner, scanner_hostname, scanner_vendor);
        for (source, hints) in collaborators {
            candidates.offer(*source, hints.hostname.as_deref(), hints.vendor.as_deref());
        }
        candidates
    }

    fn offer(&mut self, source: Source, hostname: Option<&str>, vendor: Option<&str>) {
        if let Some(h) = hostname.map(str::trim).filter(|h| !h.is_empty()) {
            self.hostname.insert(source, h.to_string());
        }
        if let Some(v) = vendor.map(str::trim).filter(|v| !v.is_empty()) {
            self.vendor.insert(source, v.to_string());
        }
    }
}

/// First enabled source in `priority` with a value on offer.
pub fn pick_winner<'a>(
    priority: &[Source],
    enabled: &EnabledSources,
    offers: &'a Offers,
) -> Option<(Source, &'a str)> {
    priority
        .iter()
        .filter(|source| enabled.is_enabled(**source))
        .find_map(|source| offers.get(source).map(|value| (*source, value.as_str())))
}

/// Decide one field given what is stored and what won.
pub fn merge_field(
    stored: Option<(&str, Option<Source>)>,
    winner: Option<(Source, &str)>,
    priority: &[Source],
    overwrite: bool,
) -> FieldUpdate {
    let Some((source, value)) = winner else {
        return FieldUpdate::Keep;
    };
    let set = FieldUpdate::Set {
        value: value.to_string(),
        source,
    };

    let Some((stored_value, stored_source)) = stored else {
        return set;
    };
    if overwrite {
        return set;
    }
    match stored_source {
        Some(Source::Manual) => FieldUpdate::Keep,
        Some(stored_source) => {
            let outranks = PluginPriorityConfig::rank(priority, source)
                < PluginPriorityConfig::rank(priority, stored_source);
            if outranks && (stored_value != value || stored_source != source) {
                set
            } else {
                FieldUpdate::Keep
            }
        }
        // A value with no recorded source yields to any winner.
        None => set,
    }
}

/// Hostname and vendor decisions for one host.
pub fn merge_host(
    existing: Option<&HostRecord>,
    candidates: &Candidates,
    config: &PluginPriorityConfig,
) -> (FieldUpdate, FieldUpdate) {
    let hostname = merge_field(
        existing.and_then(|h| h.hostname.as_deref().map(|v| (v, h.hostname_source))),
        pick_winner(&config.hostname_priority, &config.enabled, &candidates.hostname),
        &config.hostname_priority,
        config.overwrite_existing.hostname,
    );
    let vendor = merge_field(
        existing.and_then(|h| h.vendor.as_deref().map(|v| (v, h.vendor_source))),
        pick_winner(&config.vendor_priority, &config.enabled, &candidates.vendor),
        &config.vendor_priority,
        config.overwrite_existing.vendor,
    );
    (hostname, vendor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::net::Ipv4Addr;

    const PRIORITY: [Source; 3] = [Source::Unifi, Source::Freebox, Source::Scanner];

    fn all_enabled() -> EnabledSources {
        EnabledSources {
            freebox: true,
            unifi: true,
            scanner: true,
        }
    }

    fn offers(pairs: &[(Source, &str)]) -> Offers {
        pairs.iter().map(|(s, v)| (*s, v.to_string())).collect()
    }

    fn set(value: &str, source: Source) -> FieldUpdate {
        FieldUpdate::Set {
            value: value.to_string(),
            source,
        }
    }

    #[test]
    fn test_first_enabled_source_wins() {
        let offered = offers(&[(Source::Scanner, "raspberrypi"), (Source::Freebox, "pi-kitchen")]);
        assert_eq!(
            pick_winner(&PRIORITY, &all_enabled(), &offered),
            Some((Source::Freebox, "pi-kitchen"))
        );

        let only_scanner = EnabledSources::default();
        assert_eq!(
            pick_winner(&PRIORITY, &only_scanner, &offered),
            Some((Source::Scanner, "raspberrypi"))
        );
    }

    #[test]
    fn test_unlisted_source_never_wins() {
        let offered = offers(&[(Source::Unifi, "ap")]);
        let priority = [Source::Freebox, Source::Scanner];
        assert_eq!(pick_winner(&priority, &all_enabled(), &offered), None);
    }

    #[test]
    fn test_empty_store_takes_winner() {
        let update = merge_field(None, Some((Source::Scanner, "nas")), &PRIORITY, false);
        assert_eq!(update, set("nas", Source::Scanner));
    }

    #[test]
    fn test_no_winner_never_blanks() {
        let stored = Some(("nas", Some(Source::Scanner)));
        assert_eq!(merge_field(stored, None, &PRIORITY, true), FieldUpdate::Keep);
        assert_eq!(merge_field(stored, None, &PRIORITY, false), FieldUpdate::Keep);
    }

    #[test]
    fn test_lower_rank_does_not_replace_without_overwrite() {
        let stored = Some(("ap-hall", Some(Source::Unifi)));
        let update = merge_field(stored, Some((Source::Scanner, "ubnt")), &PRIORITY, false);
        assert_eq!(update, FieldUpdate::Keep);
    }

    #[test]
    fn test_higher_rank_replaces_without_overwrite() {
        let stored = Some(("ubnt", Some(Source::Scanner)));
        let update = merge_field(stored, Some((Source::Unifi, "ap-hall")), &PRIORITY, false);
        assert_eq!(update, set("ap-hall", Source::Unifi));
    }

    #[test]
    fn test_overwrite_always_takes_winner() {
        let stored = Some(("ap-hall", Some(Source::Unifi)));
        let update = merge_field(stored, Some((Source::Scanner, "ubnt")), &PRIORITY, true);
        assert_eq!(update, set("ubnt", Source::Scanner));
    }

    #[test]
    fn test_manual_survives_without_overwrite() {
        let stored = Some(("my-nas", Some(Source::Manual)));
        let update = merge_field(stored, Some((Source::Unifi, "nas")), &PRIORITY, false);
        assert_eq!(update, FieldUpdate::Keep);
    }

    #[test]
    fn test_merge_host_uses_per_field_lists() {
        let now = Utc::now();
        let mut existing = HostRecord::new(Ipv4Addr::new(192, 168, 1, 5), now);
        existing.hostname = Some("old".to_string());
        existing.hostname_source = Some(Source::Scanner);

        let mut collaborators = HashMap::new();
        collaborators.insert(
            Source::Freebox,
            DeviceHints {
                hostname: Some("freebox-name".to_string()),
                vendor: Some("Freebox Vendor".to_string()),
                mac: None,
            },
        );
        let candidates = Candidates::gather(Some("old"), Some("Scanner Vendor"), &collaborators);

        let config = PluginPriorityConfig {
            hostname_priority: PRIORITY.to_vec(),
            vendor_priority: vec![Source::Scanner, Source::Freebox],
            enabled: all_enabled(),
            ..Default::default()
        };

        let (hostname, vendor) = merge_host(Some(&existing), &candidates, &config);
        assert_eq!(hostname, set("freebox-name", Source::Freebox));
        assert_eq!(vendor, set("Scanner Vendor", Source::Scanner));
    }

    #[test]
    fn test_blank_offers_are_ignored() {
        let candidates = Candidates::gather(Some("  "), None, &HashMap::new());
        assert!(candidates.hostname.is_empty());
    }
}
