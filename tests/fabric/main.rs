//! Multi-switch scenarios on an in-memory fabric
//!
//! Topologies are built from ToR, aggregation and core switches with hosts
//! at the edge; every test runs on virtual time.

mod harness;

use harness::Fabric;
use std::time::Duration;
use tfe_switch::dataplane::{HierarchyRole, SwitchMode};
use tfe_switch::protocol::tcp::TcpFlags;
use tfe_switch::protocol::{EtherType, MacAddr, PathHeader};

const SYN: u8 = TcpFlags::SYN;
const SYN_ACK: u8 = TcpFlags::SYN | TcpFlags::ACK;
const ACK: u8 = TcpFlags::ACK;

const IPV4: u16 = 0x0800;
const ARP: u16 = 0x0806;
const PATH: u16 = 0xFFAF;

/// Switch ids and host ids of a three-tier fabric
struct ThreeTier {
    core: usize,
    aggr: usize,
    tor_a: usize,
    tor_b: usize,
    a: usize,
    b: usize,
}

///```text
///            core
///             |
///            aggr
///           /    \
///       tor_a    tor_b
///         |        |
///         A        B
///```
fn three_tier(mode: SwitchMode) -> (Fabric, ThreeTier) {
    let mut fabric = Fabric::new();
    let core = fabric.add_switch(HierarchyRole::Core, mode);
    let aggr = fabric.add_switch(HierarchyRole::Aggr, mode);
    let tor_a = fabric.add_switch(HierarchyRole::Tor, mode);
    let tor_b = fabric.add_switch(HierarchyRole::Tor, mode);

    fabric.uplink(tor_a, aggr);
    fabric.uplink(tor_b, aggr);
    fabric.uplink(aggr, core);
    let a = fabric.add_host(tor_a, 0x0a);
    let b = fabric.add_host(tor_b, 0x0b);

    fabric.start();
    (
        fabric,
        ThreeTier {
            core,
            aggr,
            tor_a,
            tor_b,
            a,
            b,
        },
    )
}

/// B asks for A, A answers
fn exchange_arp(fabric: &mut Fabric, t: &ThreeTier) {
    fabric.arp_request(t.b, t.a);
    let request = fabric.take_inbox(t.a);
    assert_eq!(request.len(), 1);
    assert_eq!(request[0].ethertype, ARP);
    assert_eq!(request[0].dst, MacAddr::BROADCAST);

    fabric.arp_reply(t.a, t.b);
    let reply = fabric.take_inbox(t.b);
    assert_eq!(reply.len(), 1);
    assert_eq!(reply[0].ethertype, ARP);
}

#[test]
fn test_hellos_mark_inter_switch_ports_only() {
    let (fabric, t) = three_tier(SwitchMode::TcpPath);
    let now = fabric.now();

    // aggr: tor_a, tor_b, core
    for port in 0..3 {
        assert!(fabric.switch(t.aggr).neighbors().is_neighbor_port(port, now));
    }
    // tor_a: aggr uplink, host A
    assert!(fabric.switch(t.tor_a).neighbors().is_neighbor_port(0, now));
    assert!(!fabric.switch(t.tor_a).neighbors().is_neighbor_port(1, now));
    assert_eq!(fabric.switch(t.core).neighbors().len(), 1);
}

#[test]
fn test_elephant_handshake_discovers_path() {
    let (mut fabric, t) = three_tier(SwitchMode::Hybrid);
    exchange_arp(&mut fabric, &t);

    // tor_a only knows B behind a neighbor switch, so the SYN is probed
    let syn = fabric.tcp(t.a, t.b, 40000, 3600, SYN);
    let at_b = fabric.take_inbox(t.b);
    assert_eq!(at_b.len(), 1);
    assert_eq!(at_b[0].ethertype, IPV4);
    assert_eq!(at_b[0].src, fabric.host(t.a).mac);
    assert_eq!(at_b[0].dst, fabric.host(t.b).mac);
    assert_eq!(at_b[0].payload, syn);
    assert!(fabric.take_inbox(t.a).is_empty());

    let value = |sw: usize, name: &str| fabric.switch(sw).metrics().value(name);
    assert_eq!(value(t.tor_a, "probes_originated"), Some(1));
    assert_eq!(value(t.aggr, "probes_reflooded"), Some(1));
    assert_eq!(value(t.tor_b, "probes_resolved"), Some(1));

    let syn_ack = fabric.tcp(t.b, t.a, 3600, 40000, SYN_ACK);
    let at_a = fabric.take_inbox(t.a);
    assert_eq!(at_a.len(), 1);
    assert_eq!(at_a[0].payload, syn_ack);
    assert!(fabric.take_inbox(t.b).is_empty());

    let ack = fabric.tcp(t.a, t.b, 40000, 3600, ACK);
    let at_b = fabric.take_inbox(t.b);
    assert_eq!(at_b.len(), 1);
    assert_eq!(at_b[0].payload, ack);

    // Every hop after discovery was a table hit
    assert_eq!(fabric.total("lookup_misses"), 0);
    assert_eq!(fabric.switch(t.aggr).tcp_paths().len(), 1);
}

#[test]
fn test_mice_flow_follows_arp_path() {
    let (mut fabric, t) = three_tier(SwitchMode::Hybrid);
    exchange_arp(&mut fabric, &t);

    let syn = fabric.tcp(t.a, t.b, 40000, 80, SYN);
    let at_b = fabric.take_inbox(t.b);
    assert_eq!(at_b.len(), 1);
    assert_eq!(at_b[0].payload, syn);

    let syn_ack = fabric.tcp(t.b, t.a, 80, 40000, SYN_ACK);
    let at_a = fabric.take_inbox(t.a);
    assert_eq!(at_a.len(), 1);
    assert_eq!(at_a[0].payload, syn_ack);

    assert_eq!(fabric.total("probes_originated"), 0);
    assert_eq!(fabric.total("lookup_misses"), 0);
    assert!(fabric.switch(t.aggr).tcp_paths().is_empty());
}

#[test]
fn test_unresolved_probe_reaches_edge_encapsulated() {
    let (mut fabric, t) = three_tier(SwitchMode::TcpPath);

    let syn = fabric.tcp(t.a, t.b, 40000, 3600, SYN);
    let at_b = fabric.take_inbox(t.b);
    assert_eq!(at_b.len(), 1);
    assert_eq!(at_b[0].ethertype, PATH);
    assert_eq!(at_b[0].dst, MacAddr::BROADCAST);

    let header = PathHeader::parse(&at_b[0].payload).unwrap();
    assert_eq!(header.original_dst, fabric.host(t.b).mac);
    assert_eq!(header.src, fabric.host(t.a).mac);
    assert_eq!((header.tcp_src_port, header.tcp_dst_port), (40000, 3600));
    // Re-flooded by aggr and tor_b
    assert_eq!(header.jump_count, 2);
    assert_eq!(&at_b[0].payload[24..], &syn[..]);

    // Nothing is reflected back down to the sender
    assert!(fabric.take_inbox(t.a).is_empty());
}

#[test]
fn test_tables_age_out_without_traffic() {
    let (mut fabric, t) = three_tier(SwitchMode::TcpPath);
    exchange_arp(&mut fabric, &t);
    fabric.tcp(t.a, t.b, 40000, 3600, SYN);
    fabric.take_inbox(t.b);
    assert!(!fabric.switch(t.tor_b).arp_paths().is_empty());
    assert!(!fabric.switch(t.aggr).tcp_paths().is_empty());

    fabric.advance(Duration::from_secs(21));

    for sw in [t.core, t.aggr, t.tor_a, t.tor_b] {
        assert!(fabric.switch(sw).arp_paths().is_empty());
        assert!(fabric.switch(sw).tcp_paths().is_empty());
    }
    // Hellos keep running, so neighbors survive
    assert_eq!(fabric.switch(t.aggr).neighbors().len(), 3);

    // With B forgotten, a new SYN can only be probed
    fabric.tcp(t.a, t.b, 40001, 3600, SYN);
    let at_b = fabric.take_inbox(t.b);
    assert_eq!(at_b.len(), 1);
    assert_eq!(at_b[0].ethertype, PATH);
}

///```text
///          core
///         /    \
///     aggr1    aggr2
///       |  \  /  |
///       |   \/   |
///       |   /\   |
///     tor_a    tor_b
///       |        |
///       A        B
///```
#[test]
fn test_redundant_fabric_floods_terminate() {
    let mut fabric = Fabric::new();
    let mode = SwitchMode::ArpPath;
    let core = fabric.add_switch(HierarchyRole::Core, mode);
    let aggr1 = fabric.add_switch(HierarchyRole::Aggr, mode);
    let aggr2 = fabric.add_switch(HierarchyRole::Aggr, mode);
    let tor_a = fabric.add_switch(HierarchyRole::Tor, mode);
    let tor_b = fabric.add_switch(HierarchyRole::Tor, mode);
    for aggr in [aggr1, aggr2] {
        fabric.uplink(aggr, core);
        fabric.uplink(tor_a, aggr);
        fabric.uplink(tor_b, aggr);
    }
    let a = fabric.add_host(tor_a, 0x0a);
    let b = fabric.add_host(tor_b, 0x0b);
    fabric.start();

    // The pump panics if the broadcast keeps circulating
    fabric.arp_request(a, b);
    let copies = fabric.take_inbox(b);
    assert!(!copies.is_empty());
    assert!(copies.iter().all(|f| f.ethertype == ARP));

    // The reply retraces the first copy of the request
    fabric.take_inbox(a);
    fabric.arp_reply(b, a);
    let at_a = fabric.take_inbox(a);
    assert_eq!(at_a.len(), 1);
    assert_eq!(fabric.total("lookup_misses"), 0);
    assert_eq!(fabric.total("frames_filtered"), 0);
}
