//! Common protocol types

use std::fmt;
use std::str::FromStr;

/// Length of an EUI-48 hardware address
pub const MAC_ADDR_LEN: usize = 6;

/// MAC address (EUI-48)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; MAC_ADDR_LEN]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; MAC_ADDR_LEN]);
    pub const ZERO: MacAddr = MacAddr([0; MAC_ADDR_LEN]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn octets(&self) -> [u8; MAC_ADDR_LEN] {
        self.0
    }
}

impl TryFrom<&[u8]> for MacAddr {
    type Error = usize;

    /// Fails with the offending length when the slice is not 6 bytes long
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; MAC_ADDR_LEN]>::try_from(bytes)
            .map(MacAddr)
            .map_err(|_| bytes.len())
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error returned when a MAC address string is malformed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMacAddrError(String);

impl fmt::Display for ParseMacAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid MAC address: {}", self.0)
    }
}

impl std::error::Error for ParseMacAddrError {}

impl FromStr for MacAddr {
    type Err = ParseMacAddrError;

    /// Accepts "00:11:22:33:44:55" or "00-11-22-33-44-55"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMacAddrError(s.to_string());
        let mut out = [0u8; MAC_ADDR_LEN];
        let mut groups = s.split([':', '-']);

        for byte in out.iter_mut() {
            let group = groups.next().ok_or_else(err)?;
            if group.len() != 2 {
                return Err(err());
            }
            *byte = u8::from_str_radix(group, 16).map_err(|_| err())?;
        }

        if groups.next().is_some() {
            return Err(err());
        }
        Ok(MacAddr(out))
    }
}

/// EtherType values understood by the switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EtherType {
    Ipv4 = 0x0800,
    Arp = 0x0806,
    /// Neighbour discovery between switches
    Hello = 0xFF70,
    /// Frames encapsulated in a `PathHeader`
    PathDiscovery = 0xFFAF,
}

impl EtherType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0800 => Some(EtherType::Ipv4),
            0x0806 => Some(EtherType::Arp),
            0xFF70 => Some(EtherType::Hello),
            0xFFAF => Some(EtherType::PathDiscovery),
            _ => None,
        }
    }
}

impl From<EtherType> for u16 {
    fn from(value: EtherType) -> Self {
        value as u16
    }
}
