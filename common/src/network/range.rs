use std::net::Ipv4Addr;

use crate::error::ScanError;

/// Largest IPv4 block a single target expression may expand to.
pub const MAX_RANGE_HOSTS: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Range {
    pub start_addr: Ipv4Addr,
    pub end_addr: Ipv4Addr,
}

impl Ipv4Range {
    pub fn new(start_addr: Ipv4Addr, end_addr: Ipv4Addr) -> Self {
        Self {
            start_addr,
            end_addr,
        }
    }

    pub fn len(&self) -> u32 {
        let start: u32 = self.start_addr.into();
        let end: u32 = self.end_addr.into();
        end.saturating_sub(start).saturating_add(u32::from(end >= start))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_iter(&self) -> impl Iterator<Item = Ipv4Addr> {
        let start: u32 = self.start_addr.into();
        let end: u32 = self.end_addr.into();
        (start..=end).map(Ipv4Addr::from)
    }
}

/// Host addresses of a CIDR block, excluding network and broadcast where the
/// block is large enough to have them.
pub fn cidr_range(ip: Ipv4Addr, prefix: u8) -> Result<Ipv4Range, ScanError> {
    if prefix > 32 {
        return Err(ScanError::Config(format!("invalid CIDR prefix /{prefix}")));
    }
    let mask: u32 = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    let network: u32 = u32::from(ip) & mask;
    let broadcast: u32 = network | !mask;

    let (start, end) = if prefix >= 31 {
        (network, broadcast)
    } else {
        (network + 1, broadcast - 1)
    };

    Ok(Ipv4Range::new(Ipv4Addr::from(start), Ipv4Addr::from(end)))
}
