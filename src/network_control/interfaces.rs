//! Parsing of `ip -j addr` output.

use std::collections::HashSet;

use log::info;
use serde::Deserialize;

use crate::error_handling::types::ControlError;

/// Loopback is never listed.
pub const LOOPBACK: &str = "lo";

#[derive(Debug, Deserialize)]
struct IpLink {
    ifname: String,
    #[serde(default)]
    addr_info: Vec<IpAddrInfo>,
}

#[derive(Debug, Deserialize)]
struct IpAddrInfo {
    family: String,
    #[serde(default)]
    local: Option<String>,
}

/// An interface that carries an IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpInterface {
    pub name: String,
    /// First `inet` address.
    pub ipv4: String,
}

/// Interfaces from `ip -j addr`, minus loopback, the ignore list and
/// anything without an IPv4 address.
pub fn parse_ip_addr(json: &str, ignored: &[String]) -> Result<Vec<IpInterface>, ControlError> {
    let links: Vec<IpLink> =
        serde_json::from_str(json).map_err(|e| ControlError::ParseError(e.to_string()))?;

    let skip: HashSet<&str> = ignored
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(LOOPBACK))
        .collect();

    let mut interfaces = Vec::new();
    for link in links {
        if skip.contains(link.ifname.as_str()) {
            info!("Skipping ignored interface: {}", link.ifname);
            continue;
        }
        let ipv4 = link
            .addr_info
            .into_iter()
            .find(|a| a.family == "inet")
            .and_then(|a| a.local);
        if let Some(ipv4) = ipv4 {
            interfaces.push(IpInterface {
                name: link.ifname,
                ipv4,
            });
        }
    }
    Ok(interfaces)
}
