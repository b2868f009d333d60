//! Scan range parsing.
//!
//! Accepts three forms:
//! - CIDR: `192.168.1.0/24` (network and broadcast excluded below /31)
//! - Last-octet span: `192.168.1.10-50`
//! - Single address: `192.168.1.7`
//!
//! A full-address span (`10.0.0.1-10.0.1.20`) is also accepted as long as it
//! stays within the size a minimum-prefix CIDR would allow.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::Ipv4Net;

use crate::error::{DiscoverError, Result};

/// No configuration may allow prefixes shorter than this.
pub const MIN_PREFIX_FLOOR: u8 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRange {
    Cidr(Ipv4Net),
    Span { start: Ipv4Addr, end: Ipv4Addr },
}

impl ScanRange {
    /// Parse `input`, rejecting CIDR prefixes shorter than `min_prefix`.
    pub fn parse(input: &str, min_prefix: u8) -> Result<Self> {
        let min_prefix = min_prefix.clamp(MIN_PREFIX_FLOOR, 32);
        let input = input.trim();
        if input.is_empty() {
            return Err(DiscoverError::validation("range", "empty range"));
        }

        if let Some((addr, prefix)) = input.split_once('/') {
            let addr = parse_addr(addr)?;
            let prefix: u8 = prefix
                .trim()
                .parse()
                .map_err(|_| DiscoverError::validation(prefix, "prefix is not a number"))?;
            if prefix > 32 {
                return Err(DiscoverError::validation(
                    format!("/{prefix}"),
                    "prefix must be between 0 and 32",
                ));
            }
            if prefix < min_prefix {
                return Err(DiscoverError::validation(
                    format!("/{prefix}"),
                    format!("range too large, smallest accepted prefix is /{min_prefix}"),
                ));
            }
            let net = Ipv4Net::new(addr, prefix)
                .map_err(|e| DiscoverError::validation(input, e.to_string()))?;
            return Ok(Self::Cidr(net.trunc()));
        }

        if let Some((start, end)) = input.split_once('-') {
            let start = parse_addr(start)?;
            let end_token = end.trim();
            let end = if end_token.contains('.') {
                parse_addr(end_token)?
            } else {
                let last: u8 = end_token.parse().map_err(|_| {
                    DiscoverError::validation(end_token, "last octet must be 0-255")
                })?;
                let [a, b, c, _] = start.octets();
                Ipv4Addr::new(a, b, c, last)
            };
            if end < start {
                return Err(DiscoverError::validation(
                    input,
                    "range end is before range start",
                ));
            }
            let span = u64::from(u32::from(end)) - u64::from(u32::from(start)) + 1;
            let ceiling = 1u64 << (32 - u32::from(min_prefix));
            if span > ceiling {
                return Err(DiscoverError::validation(
                    input,
                    format!("range too large, at most {ceiling} addresses"),
                ));
            }
            return Ok(Self::Span { start, end });
        }

        let addr = parse_addr(input)?;
        Ok(Self::Span {
            start: addr,
            end: addr,
        })
    }

    /// First and last target as integers, inclusive.
    fn bounds(&self) -> (u32, u32) {
        match self {
            Self::Cidr(net) => {
                let network = u32::from(net.network());
                let broadcast = u32::from(net.broadcast());
                if net.prefix_len() >= 31 {
                    (network, broadcast)
                } else {
                    (network + 1, broadcast - 1)
                }
            }
            Self::Span { start, end } => (u32::from(*start), u32::from(*end)),
        }
    }

    /// Number of target addresses.
    pub fn len(&self) -> usize {
        let (first, last) = self.bounds();
        (last - first) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Targets in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> + Clone {
        let (first, last) = self.bounds();
        (first..=last).map(Ipv4Addr::from)
    }

    pub fn targets(&self) -> Vec<Ipv4Addr> {
        self.iter().collect()
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let (first, last) = self.bounds();
        (first..=last).contains(&u32::from(ip))
    }
}

impl fmt::Display for ScanRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cidr(net) => write!(f, "{net}"),
            Self::Span { start, end } if start == end => write!(f, "{start}"),
            Self::Span { start, end } => write!(f, "{start}-{end}"),
        }
    }
}

fn parse_addr(token: &str) -> Result<Ipv4Addr> {
    let token = token.trim();
    Ipv4Addr::from_str(token)
        .map_err(|_| DiscoverError::validation(token, "not a valid IPv4 address"))
}

/// Pick the first up, non-loopback IPv4 interface and return its network.
///
/// Networks wider than `min_prefix` are narrowed to the `/min_prefix` block
/// containing the interface address.
pub fn detect_local_range(min_prefix: u8) -> Result<ScanRange> {
    let min_prefix = min_prefix.clamp(MIN_PREFIX_FLOOR, 32);
    let interfaces = if_addrs::get_if_addrs()?;

    let mut candidates: Vec<(String, Ipv4Addr, Ipv4Addr)> = interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.addr {
            if_addrs::IfAddr::V4(v4) if !v4.ip.is_link_local() => {
                Some((iface.name, v4.ip, v4.netmask))
            }
            _ => None,
        })
        .collect();
    candidates.sort();

    let (name, ip, netmask) = candidates.into_iter().next().ok_or_else(|| {
        DiscoverError::Config("no non-loopback IPv4 interface to derive a range from".to_string())
    })?;

    let prefix = (u32::from(netmask).leading_ones() as u8).max(min_prefix);
    let net = Ipv4Net::new(ip, prefix)
        .map_err(|e| DiscoverError::Config(format!("interface {name}: {e}")))?
        .trunc();

    tracing::info!(interface = %name, range = %net, "Auto-detected scan range");
    Ok(ScanRange::Cidr(net))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation_token(err: DiscoverError) -> String {
        match err {
            DiscoverError::Validation { token, .. } => token,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_slash_24_yields_254_hosts() {
        let range = ScanRange::parse("192.168.1.0/24", 24).unwrap();
        let targets = range.targets();
        assert_eq!(targets.len(), 254);
        assert_eq!(range.len(), 254);
        assert_eq!(targets[0], Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(targets[253], Ipv4Addr::new(192, 168, 1, 254));
    }

    #[test]
    fn test_cidr_base_is_truncated() {
        let range = ScanRange::parse("10.0.0.77/24", 24).unwrap();
        assert_eq!(range.to_string(), "10.0.0.0/24");
    }

    #[test]
    fn test_point_to_point_prefixes() {
        let range = ScanRange::parse("10.0.0.0/31", 24).unwrap();
        assert_eq!(
            range.targets(),
            vec![Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(10, 0, 0, 1)]
        );
        let range = ScanRange::parse("10.0.0.9/32", 24).unwrap();
        assert_eq!(range.targets(), vec![Ipv4Addr::new(10, 0, 0, 9)]);
    }

    #[test]
    fn test_slash_16_rejected_under_default_minimum() {
        let err = ScanRange::parse("10.0.0.0/16", 24).unwrap_err();
        assert_eq!(validation_token(err), "/16");
    }

    #[test]
    fn test_floor_applies_even_when_configured_lower() {
        assert!(ScanRange::parse("10.0.0.0/16", 8).is_err());
        let range = ScanRange::parse("10.0.0.0/17", 8).unwrap();
        assert_eq!(range.len(), 32766);
    }

    #[test]
    fn test_last_octet_span() {
        let range = ScanRange::parse("192.168.1.10-12", 24).unwrap();
        assert_eq!(
            range.targets(),
            vec![
                Ipv4Addr::new(192, 168, 1, 10),
                Ipv4Addr::new(192, 168, 1, 11),
                Ipv4Addr::new(192, 168, 1, 12),
            ]
        );
        assert_eq!(range.to_string(), "192.168.1.10-192.168.1.12");
    }

    #[test]
    fn test_full_address_span_respects_ceiling() {
        let range = ScanRange::parse("10.0.0.250-10.0.1.5", 24).unwrap();
        assert_eq!(range.len(), 12);
        assert!(ScanRange::parse("10.0.0.0-10.0.2.0", 24).is_err());
    }

    #[test]
    fn test_single_address() {
        let range = ScanRange::parse(" 10.1.2.3 ", 24).unwrap();
        assert_eq!(range.targets(), vec![Ipv4Addr::new(10, 1, 2, 3)]);
        assert!(range.contains(Ipv4Addr::new(10, 1, 2, 3)));
        assert!(!range.contains(Ipv4Addr::new(10, 1, 2, 4)));
    }

    #[test]
    fn test_errors_name_offending_token() {
        assert_eq!(
            validation_token(ScanRange::parse("192.168.1.300/24", 24).unwrap_err()),
            "192.168.1.300"
        );
        assert_eq!(
            validation_token(ScanRange::parse("192.168.1.0/abc", 24).unwrap_err()),
            "abc"
        );
        assert_eq!(
            validation_token(ScanRange::parse("192.168.1.10-999", 24).unwrap_err()),
            "999"
        );
        assert_eq!(
            validation_token(ScanRange::parse("192.168.1.50-10", 24).unwrap_err()),
            "192.168.1.50-10"
        );
        assert_eq!(
            validation_token(ScanRange::parse("", 24).unwrap_err()),
            "range"
        );
        assert_eq!(
            validation_token(ScanRange::parse("10.0.0.0/33", 24).unwrap_err()),
            "/33"
        );
    }
}
