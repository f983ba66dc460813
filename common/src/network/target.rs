//! # Scan Target Model
//!
//! A [`Target`] is one relay: a host plus the Telnet and Modbus/TCP ports to
//! reach it on. Users describe targets with a [`TargetExpr`], which can be:
//! * A single IP address or hostname (e.g. `10.190.42.105`, `relay-07.substation`).
//! * An IPv4 range (e.g. `10.190.42.100-110`).
//! * A CIDR block (e.g. `10.190.42.0/28`).
//! * A comma separated list of any of the above.

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::network::range::{self, Ipv4Range, MAX_RANGE_HOSTS};

pub const DEFAULT_TELNET_PORT: u16 = 23;
pub const DEFAULT_MODBUS_PORT: u16 = 502;

/// One relay endpoint. Immutable for the duration of a scan run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    pub telnet_port: u16,
    pub modbus_port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            telnet_port: DEFAULT_TELNET_PORT,
            modbus_port: DEFAULT_MODBUS_PORT,
        }
    }

    pub fn with_ports(mut self, telnet_port: u16, modbus_port: u16) -> Self {
        self.telnet_port = telnet_port;
        self.modbus_port = modbus_port;
        self
    }

    pub fn telnet_endpoint(&self) -> String {
        endpoint(&self.host, self.telnet_port)
    }

    pub fn modbus_endpoint(&self) -> String {
        endpoint(&self.host, self.modbus_port)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

fn endpoint(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => format!("[{host}]:{port}"),
        _ => format!("{host}:{port}"),
    }
}

/// A parsed target expression, expanded to concrete [`Target`]s with
/// [`TargetExpr::into_targets`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetExpr {
    Host { host: String },
    Range { ipv4_range: Ipv4Range },
    /// Comma separated list, expanded left to right.
    Multi { exprs: Vec<TargetExpr> },
}

impl FromStr for TargetExpr {
    type Err = String;

    /// Accepts a host (`10.0.0.5`, `::1`, `relay-07.substation`), an IPv4
    /// range (`10.0.0.1-50`, `10.0.0.1-10.0.1.9`), a CIDR block
    /// (`10.0.0.0/28`), or a comma separated list of those.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.contains(',') {
            return parse_single(s);
        }

        let exprs = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| parse_single(part).map_err(|e| format!("target '{part}': {e}")))
            .collect::<Result<Vec<_>, _>>()?;

        if exprs.is_empty() {
            return Err(format!("no targets in '{s}'"));
        }
        Ok(TargetExpr::Multi { exprs })
    }
}

impl TargetExpr {
    /// Expands the expression into targets, in order, without duplicates.
    pub fn into_targets(self, telnet_port: u16, modbus_port: u16) -> Result<Vec<Target>, ScanError> {
        let mut hosts: Vec<String> = Vec::new();
        collect_hosts(self, &mut hosts)?;

        let mut seen: HashSet<String> = HashSet::new();
        Ok(hosts
            .into_iter()
            .filter(|host| seen.insert(host.clone()))
            .map(|host| Target::new(host).with_ports(telnet_port, modbus_port))
            .collect())
    }
}

fn collect_hosts(expr: TargetExpr, hosts: &mut Vec<String>) -> Result<(), ScanError> {
    match expr {
        TargetExpr::Host { host } => hosts.push(host),
        TargetExpr::Range { ipv4_range } => {
            let span = format!("{}-{}", ipv4_range.start_addr, ipv4_range.end_addr);
            if ipv4_range.is_empty() {
                return Err(ScanError::Config(format!("empty range {span}")));
            }
            if ipv4_range.len() > MAX_RANGE_HOSTS {
                return Err(ScanError::Config(format!(
                    "range {span} exceeds {MAX_RANGE_HOSTS} hosts"
                )));
            }
            hosts.extend(ipv4_range.to_iter().map(|ip| ip.to_string()));
        }
        TargetExpr::Multi { exprs } => {
            for expr in exprs {
                collect_hosts(expr, hosts)?;
            }
        }
    }
    Ok(())
}

fn parse_single(s: &str) -> Result<TargetExpr, String> {
    if let Ok(addr) = s.parse::<IpAddr>() {
        return Ok(TargetExpr::Host {
            host: addr.to_string(),
        });
    }

    // a hyphen only means a range when an IPv4 address precedes it
    if let Some((head, tail)) = s.split_once('-') {
        if let Ok(first) = head.parse::<Ipv4Addr>() {
            let last = range_end(first, tail)?;
            return Ok(TargetExpr::Range {
                ipv4_range: Ipv4Range::new(first, last),
            });
        }
    }

    if let Some((network, prefix)) = s.split_once('/') {
        let network: Ipv4Addr = network
            .parse()
            .map_err(|e| format!("bad CIDR network '{network}': {e}"))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|e| format!("bad CIDR prefix '{prefix}': {e}"))?;
        let ipv4_range = range::cidr_range(network, prefix).map_err(|e| e.to_string())?;
        return Ok(TargetExpr::Range { ipv4_range });
    }

    if is_hostname(s) {
        return Ok(TargetExpr::Host {
            host: s.to_ascii_lowercase(),
        });
    }

    Err(format!("not a host, range or CIDR block: {s}"))
}

/// Resolves the right side of a range. A short form replaces the trailing
/// octets of `first`: `10.0.0.1-50` ends at `10.0.0.50`, `10.0.0.1-1.9` at
/// `10.0.1.9`.
fn range_end(first: Ipv4Addr, tail: &str) -> Result<Ipv4Addr, String> {
    if let Ok(full) = tail.parse::<Ipv4Addr>() {
        return Ok(full);
    }

    let parts: Vec<&str> = tail.split('.').collect();
    if tail.is_empty() || parts.len() > 3 {
        return Err(format!("bad range end '{tail}'"));
    }

    let mut octets = first.octets();
    let offset = octets.len() - parts.len();
    for (slot, part) in octets[offset..].iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|e| format!("bad range end '{tail}': {e}"))?;
    }
    Ok(Ipv4Addr::from(octets))
}

fn is_hostname(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 253
        && s.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
