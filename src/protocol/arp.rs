//! ARP (Address Resolution Protocol) - RFC 826
//!
//! The switch only needs to tell requests from replies; the builder exists so
//! hosts and tests can emit well-formed packets.

use super::MacAddr;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// ARP packet size (for Ethernet/IPv4)
pub const ARP_PACKET_SIZE: usize = 28;

/// ARP operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

/// ARP packet (Ethernet/IPv4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    pub operation: ArpOp,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < ARP_PACKET_SIZE {
            return Err(Error::Parse("ARP packet too short".into()));
        }
        if u16::from_be_bytes([buffer[0], buffer[1]]) != 1 || buffer[4] != 6 {
            return Err(Error::Parse("ARP hardware is not Ethernet".into()));
        }
        if u16::from_be_bytes([buffer[2], buffer[3]]) != 0x0800 || buffer[5] != 4 {
            return Err(Error::Parse("ARP protocol is not IPv4".into()));
        }

        let operation = match u16::from_be_bytes([buffer[6], buffer[7]]) {
            1 => ArpOp::Request,
            2 => ArpOp::Reply,
            op => return Err(Error::Parse(format!("invalid ARP operation {op}"))),
        };

        let mac_at = |offset: usize| {
            let mut mac = [0u8; 6];
            mac.copy_from_slice(&buffer[offset..offset + 6]);
            MacAddr(mac)
        };
        let ip_at = |offset: usize| {
            Ipv4Addr::new(
                buffer[offset],
                buffer[offset + 1],
                buffer[offset + 2],
                buffer[offset + 3],
            )
        };

        Ok(Self {
            operation,
            sender_mac: mac_at(8),
            sender_ip: ip_at(14),
            target_mac: mac_at(18),
            target_ip: ip_at(24),
        })
    }

    pub fn is_request(&self) -> bool {
        self.operation == ArpOp::Request
    }

    pub fn to_bytes(&self) -> [u8; ARP_PACKET_SIZE] {
        let mut buf = [0u8; ARP_PACKET_SIZE];
        buf[0..2].copy_from_slice(&1u16.to_be_bytes());
        buf[2..4].copy_from_slice(&0x0800u16.to_be_bytes());
        buf[4] = 6;
        buf[5] = 4;
        buf[6..8].copy_from_slice(&(self.operation as u16).to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.0);
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac.0);
        buf[24..28].copy_from_slice(&self.target_ip.octets());
        buf
    }

    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            operation: ArpOp::Request,
            sender_mac,
            sender_ip,
            target_mac: MacAddr::ZERO,
            target_ip,
        }
    }

    pub fn reply(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            operation: ArpOp::Reply,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST_A: MacAddr = MacAddr([0x00, 0x00, 0x00, 0x00, 0x00, 0x0a]);
    const HOST_B: MacAddr = MacAddr([0x00, 0x00, 0x00, 0x00, 0x00, 0x0b]);

    #[test]
    fn test_request_parses_as_request() {
        let req = ArpPacket::request(HOST_A, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
        let parsed = ArpPacket::parse(&req.to_bytes()).unwrap();
        assert!(parsed.is_request());
        assert_eq!(parsed.sender_mac, HOST_A);
        assert_eq!(parsed.target_mac, MacAddr::ZERO);
        assert_eq!(parsed.target_ip, Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn test_reply_is_not_request() {
        let rep = ArpPacket::reply(
            HOST_B,
            Ipv4Addr::new(10, 0, 0, 2),
            HOST_A,
            Ipv4Addr::new(10, 0, 0, 1),
        );
        let parsed = ArpPacket::parse(&rep.to_bytes()).unwrap();
        assert!(!parsed.is_request());
        assert_eq!(parsed, rep);
    }

    #[test]
    fn test_rejects_short_and_bad_op() {
        assert!(ArpPacket::parse(&[0u8; 20]).is_err());

        let mut bytes = ArpPacket::request(HOST_A, Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST)
            .to_bytes();
        bytes[7] = 9;
        assert!(ArpPacket::parse(&bytes).is_err());
    }
}
