//! Packet classification
//!
//! Derives the protocol-relevant kind of a received frame from its outer
//! EtherType and payload. The result is computed once per frame and carries
//! the TCP port pair explicitly, so the forwarding step that follows never
//! depends on state left behind by a previous frame.

use crate::protocol::arp::ArpPacket;
use crate::protocol::ipv4::{Ipv4Header, PROTOCOL_TCP};
use crate::protocol::tcp::{TcpHeader, FLAGS_OFFSET};
use crate::protocol::{EtherType, MacAddr, PathHeader};

/// Offset of the TCP source port when indexing from the IPv4 header start
const RAW_PORTS_OFFSET: usize = 20;
/// Offset of the TCP flag byte when indexing from the IPv4 header start
const RAW_FLAGS_OFFSET: usize = RAW_PORTS_OFFSET + FLAGS_OFFSET;
/// Offset of the protocol field in the IPv4 header
const RAW_PROTOCOL_OFFSET: usize = 9;

/// Kind of packet, as far as path learning is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    TcpSyn,
    TcpSynAck,
    TcpAck,
    TcpFinAck,
    ArpRequest,
    ArpReply,
    EthBroadcast,
    PathDiscoveryRequest,
    /// Switch-to-switch hello; never forwarded
    Hello,
    Other,
}

impl PacketKind {
    /// Map a TCP flag byte to a packet kind
    pub fn from_tcp_flags(flags: u8) -> Self {
        match flags {
            2 => PacketKind::TcpSyn,
            16 => PacketKind::TcpAck,
            17 | 25 => PacketKind::TcpFinAck,
            18 => PacketKind::TcpSynAck,
            _ => PacketKind::Other,
        }
    }
}

/// TCP port pair of a flow (zero when the frame carries no TCP)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TcpPorts {
    pub src: u16,
    pub dst: u16,
}

impl TcpPorts {
    pub fn new(src: u16, dst: u16) -> Self {
        Self { src, dst }
    }

    pub fn reversed(self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }
}

/// Classification result for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: PacketKind,
    pub ports: TcpPorts,
    /// Decoded path header for `PathDiscoveryRequest` frames
    pub path: Option<PathHeader>,
}

impl Classification {
    fn plain(kind: PacketKind) -> Self {
        Self {
            kind,
            ports: TcpPorts::default(),
            path: None,
        }
    }
}

/// Classify a frame from its L2 payload, outer EtherType and destination
///
/// Frames whose payload matches no recognised header shape are tagged
/// `EthBroadcast` when sent to the broadcast address and `Other` otherwise.
pub fn classify(payload: &[u8], ethertype: u16, dst: MacAddr) -> Classification {
    let recognised = match EtherType::from_u16(ethertype) {
        Some(EtherType::Hello) => Some(Classification::plain(PacketKind::Hello)),
        Some(EtherType::PathDiscovery) => PathHeader::parse(payload).ok().map(|header| {
            Classification {
                kind: PacketKind::PathDiscoveryRequest,
                ports: TcpPorts::new(header.tcp_src_port, header.tcp_dst_port),
                path: Some(header),
            }
        }),
        Some(EtherType::Arp) => ArpPacket::parse(payload).ok().map(|arp| {
            if arp.is_request() {
                Classification::plain(PacketKind::ArpRequest)
            } else {
                Classification::plain(PacketKind::ArpReply)
            }
        }),
        Some(EtherType::Ipv4) => classify_ipv4(payload).map(|(kind, ports)| Classification {
            kind,
            ports,
            path: None,
        }),
        None => None,
    };

    recognised.unwrap_or_else(|| {
        if dst.is_broadcast() {
            Classification::plain(PacketKind::EthBroadcast)
        } else {
            Classification::plain(PacketKind::Other)
        }
    })
}

/// Classify an IPv4 packet carrying TCP
///
/// Uses the parsed headers when they are well formed and falls back to fixed
/// offsets otherwise. Returns `None` for anything that is not TCP.
pub fn classify_ipv4(packet: &[u8]) -> Option<(PacketKind, TcpPorts)> {
    let Ok(ip) = Ipv4Header::parse(packet) else {
        return classify_raw_ipv4(packet);
    };
    if ip.protocol() != PROTOCOL_TCP {
        return None;
    }

    match TcpHeader::parse(ip.payload()) {
        Ok(tcp) => Some((
            PacketKind::from_tcp_flags(tcp.flags().bits()),
            TcpPorts::new(tcp.src_port(), tcp.dst_port()),
        )),
        Err(_) => classify_raw_ipv4(packet),
    }
}

/// Fixed-offset classification of an option-less IPv4 + TCP packet
///
/// Ports are read at bytes 20..24 and the flag byte at 33, counted from the
/// start of the IPv4 header.
pub fn classify_raw_ipv4(packet: &[u8]) -> Option<(PacketKind, TcpPorts)> {
    if packet.len() <= RAW_FLAGS_OFFSET || packet[RAW_PROTOCOL_OFFSET] != PROTOCOL_TCP {
        return None;
    }

    let port_at = |offset: usize| u16::from_be_bytes([packet[offset], packet[offset + 1]]);
    let ports = TcpPorts::new(port_at(RAW_PORTS_OFFSET), port_at(RAW_PORTS_OFFSET + 2));
    Some((PacketKind::from_tcp_flags(packet[RAW_FLAGS_OFFSET]), ports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ipv4::Ipv4Builder;
    use crate::protocol::tcp::{TcpFlags, TcpSegmentBuilder};
    use std::net::Ipv4Addr;

    const HOST_A: MacAddr = MacAddr([0x00, 0x00, 0x00, 0x00, 0x00, 0x0a]);
    const HOST_B: MacAddr = MacAddr([0x00, 0x00, 0x00, 0x00, 0x00, 0x0b]);

    fn tcp_packet(sport: u16, dport: u16, flags: u8) -> Vec<u8> {
        let segment = TcpSegmentBuilder::new(sport, dport, flags).build();
        Ipv4Builder::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2))
            .payload(&segment)
            .build()
    }

    #[test]
    fn test_tcp_flag_mapping() {
        let cases = [
            (TcpFlags::SYN, PacketKind::TcpSyn),
            (TcpFlags::ACK, PacketKind::TcpAck),
            (TcpFlags::FIN | TcpFlags::ACK, PacketKind::TcpFinAck),
            (TcpFlags::FIN | TcpFlags::PSH | TcpFlags::ACK, PacketKind::TcpFinAck),
            (TcpFlags::SYN | TcpFlags::ACK, PacketKind::TcpSynAck),
            (TcpFlags::PSH | TcpFlags::ACK, PacketKind::Other),
            (TcpFlags::RST, PacketKind::Other),
        ];

        for (flags, expected) in cases {
            let packet = tcp_packet(1000, 80, flags);
            let cls = classify(&packet, EtherType::Ipv4 as u16, HOST_B);
            assert_eq!(cls.kind, expected, "flags {flags}");
            assert_eq!(cls.ports, TcpPorts::new(1000, 80));
            assert!(cls.path.is_none());
        }
    }

    #[test]
    fn test_raw_path_matches_structured_path() {
        for flags in 0u8..=0x3f {
            let packet = tcp_packet(3600, 22, flags);
            assert_eq!(classify_ipv4(&packet), classify_raw_ipv4(&packet), "flags {flags}");
        }
    }

    #[test]
    fn test_malformed_tcp_uses_raw_offsets() {
        let mut packet = tcp_packet(4000, 4001, TcpFlags::SYN);
        // Data offset below the minimum: structured parsing rejects the header
        packet[20 + 12] = 1 << 4;

        let (kind, ports) = classify_ipv4(&packet).unwrap();
        assert_eq!(kind, PacketKind::TcpSyn);
        assert_eq!(ports, TcpPorts::new(4000, 4001));
    }

    #[test]
    fn test_non_tcp_ipv4_is_not_tcp() {
        let udp = Ipv4Builder::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::BROADCAST)
            .protocol(17)
            .payload(&[0u8; 20])
            .build();

        assert_eq!(classify_ipv4(&udp), None);
        let cls = classify(&udp, EtherType::Ipv4 as u16, MacAddr::BROADCAST);
        assert_eq!(cls.kind, PacketKind::EthBroadcast);
        assert_eq!(cls.ports, TcpPorts::default());

        let unicast = classify(&udp, EtherType::Ipv4 as u16, HOST_B);
        assert_eq!(unicast.kind, PacketKind::Other);
    }

    #[test]
    fn test_arp_request_and_reply() {
        let req = ArpPacket::request(HOST_A, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2));
        let cls = classify(&req.to_bytes(), EtherType::Arp as u16, MacAddr::BROADCAST);
        assert_eq!(cls.kind, PacketKind::ArpRequest);

        let rep = ArpPacket::reply(
            HOST_B,
            Ipv4Addr::new(10, 0, 0, 2),
            HOST_A,
            Ipv4Addr::new(10, 0, 0, 1),
        );
        let cls = classify(&rep.to_bytes(), EtherType::Arp as u16, HOST_A);
        assert_eq!(cls.kind, PacketKind::ArpReply);
    }

    #[test]
    fn test_path_header_ports_come_from_header() {
        // Inner TCP says 1/2 but the header is authoritative
        let inner = tcp_packet(1, 2, TcpFlags::SYN);
        let header = PathHeader::probe(HOST_A, HOST_B, 1000, 80);
        let frame = header.encapsulate(&inner);

        let cls = classify(&frame, EtherType::PathDiscovery as u16, MacAddr::BROADCAST);
        assert_eq!(cls.kind, PacketKind::PathDiscoveryRequest);
        assert_eq!(cls.ports, TcpPorts::new(1000, 80));
        assert_eq!(cls.path, Some(header));
    }

    #[test]
    fn test_hello_and_unknown() {
        let cls = classify(&[], EtherType::Hello as u16, MacAddr::BROADCAST);
        assert_eq!(cls.kind, PacketKind::Hello);

        let cls = classify(&[1, 2, 3], 0x88cc, HOST_B);
        assert_eq!(cls.kind, PacketKind::Other);

        let cls = classify(&[1, 2, 3], 0x88cc, MacAddr::BROADCAST);
        assert_eq!(cls.kind, PacketKind::EthBroadcast);

        // A truncated probe is not a probe
        let cls = classify(&[0u8; 10], EtherType::PathDiscovery as u16, MacAddr::BROADCAST);
        assert_eq!(cls.kind, PacketKind::EthBroadcast);
    }
}
