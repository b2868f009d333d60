//! Nmap XML output deserialization for per-host port scans.
//!
//! Only the parts of `-oX -` output the port scanner consumes are modelled:
//! host state, addresses and the port table with service names.

use lanwatch_core::OpenPort;
use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// Root element: `<nmaprun>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "nmaprun")]
pub struct NmapRun {
    #[serde(rename = "@args")]
    pub args: Option<String>,
    #[serde(rename = "host", default)]
    pub hosts: Vec<NmapHost>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapHost {
    pub status: Option<HostState>,
    #[serde(rename = "address", default)]
    pub addresses: Vec<Address>,
    pub ports: Option<Ports>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostState {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype")]
    pub addr_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ports {
    #[serde(rename = "port", default)]
    pub ports: Vec<NmapPort>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapPort {
    #[serde(rename = "@protocol")]
    pub protocol: String,
    #[serde(rename = "@portid")]
    pub port_id: u16,
    pub state: PortState,
    pub service: Option<NmapService>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortState {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapService {
    #[serde(rename = "@name")]
    pub name: String,
}

impl NmapHost {
    /// Extract the IPv4 address, if present.
    pub fn ipv4(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.addr_type == "ipv4")
            .map(|a| a.addr.as_str())
    }

    pub fn is_up(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "up")
    }

    /// Ports in the `open` state, ascending by port number.
    pub fn open_ports(&self) -> Vec<OpenPort> {
        let mut open: Vec<OpenPort> = self
            .ports
            .iter()
            .flat_map(|p| p.ports.iter())
            .filter(|p| p.state.state == "open")
            .map(|p| OpenPort {
                port: p.port_id,
                protocol: Some(p.protocol.clone()),
                service: p.service.as_ref().map(|s| s.name.clone()),
            })
            .collect();
        open.sort_by_key(|p| p.port);
        open
    }
}

impl NmapRun {
    /// Open ports reported for `ip`. Empty when nmap did not report the host.
    pub fn open_ports_for(&self, ip: &str) -> Vec<OpenPort> {
        self.hosts
            .iter()
            .find(|h| h.ipv4() == Some(ip))
            .map(NmapHost::open_ports)
            .unwrap_or_default()
    }
}

/// Parse nmap XML bytes into a structured `NmapRun`.
pub fn parse_nmap_xml(xml: &[u8]) -> Result<NmapRun> {
    quick_xml::de::from_reader(xml).map_err(|e| DiscoverError::XmlParse(format!("{e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORT_SCAN_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<nmaprun scanner="nmap" args="nmap -Pn -T4 --top-ports 1000 -oX - 192.168.1.20" startstr="Sat Oct 17 10:05:00 2026">
  <host>
    <status state="up" reason="user-set"/>
    <address addr="192.168.1.20" addrtype="ipv4"/>
    <address addr="00:11:32:AA:BB:CC" addrtype="mac" vendor="Synology"/>
    <ports>
      <extraports state="closed" count="995"/>
      <port protocol="tcp" portid="5000">
        <state state="open" reason="syn-ack"/>
        <service name="upnp"/>
      </port>
      <port protocol="tcp" portid="22">
        <state state="open" reason="syn-ack"/>
        <service name="ssh"/>
      </port>
      <port protocol="tcp" portid="139">
        <state state="filtered" reason="no-response"/>
        <service name="netbios-ssn"/>
      </port>
      <port protocol="tcp" portid="445">
        <state state="open" reason="syn-ack"/>
      </port>
    </ports>
  </host>
  <runstats>
    <finished time="1792231500" elapsed="4.20"/>
    <hosts up="1" down="0" total="1"/>
  </runstats>
</nmaprun>"#;

    #[test]
    fn test_open_ports_sorted_and_filtered() {
        let run = parse_nmap_xml(PORT_SCAN_XML.as_bytes()).unwrap();
        assert_eq!(run.hosts.len(), 1);
        assert!(run.hosts[0].is_up());

        let ports = run.open_ports_for("192.168.1.20");
        let numbers: Vec<u16> = ports.iter().map(|p| p.port).collect();
        assert_eq!(numbers, vec![22, 445, 5000]);
        assert_eq!(ports[0].service.as_deref(), Some("ssh"));
        assert_eq!(ports[0].protocol.as_deref(), Some("tcp"));
        assert!(ports[1].service.is_none());
    }

    #[test]
    fn test_unreported_host_has_no_ports() {
        let run = parse_nmap_xml(PORT_SCAN_XML.as_bytes()).unwrap();
        assert!(run.open_ports_for("192.168.1.21").is_empty());
    }

    #[test]
    fn test_parse_host_down() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<nmaprun scanner="nmap" args="nmap -Pn 10.9.9.9">
  <host>
    <status state="down" reason="no-response"/>
    <address addr="10.9.9.9" addrtype="ipv4"/>
  </host>
</nmaprun>"#;

        let run = parse_nmap_xml(xml.as_bytes()).unwrap();
        assert!(!run.hosts[0].is_up());
        assert!(run.open_ports_for("10.9.9.9").is_empty());
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let err = parse_nmap_xml(b"<nmaprun><host>").unwrap_err();
        assert!(matches!(err, DiscoverError::XmlParse(_)));
    }
}
