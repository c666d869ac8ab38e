//! In-memory switch fabric
//!
//! Switches are wired port-to-port with recording links; hosts are plain
//! frame sinks. Time is virtual: `advance` fires every switch timer in
//! deadline order and delivers the resulting frames before moving on.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tfe_switch::dataplane::{
    HierarchyRole, Port, PortDirection, PortId, Switch, SwitchMode, SwitchSettings, TimerQueue,
};
use tfe_switch::protocol::arp::ArpPacket;
use tfe_switch::protocol::ethernet::{Frame, FrameBuilder};
use tfe_switch::protocol::ipv4::Ipv4Builder;
use tfe_switch::protocol::tcp::TcpSegmentBuilder;
use tfe_switch::protocol::{EtherType, MacAddr};
use tfe_switch::telemetry::MetricsRegistry;
use tfe_switch::Result;

/// Rounds of delivery after which the fabric is considered looping
const MAX_ROUNDS: usize = 64;

/// Port that queues complete Ethernet frames for the fabric to deliver
pub struct WirePort {
    name: String,
    hw: MacAddr,
    outbox: Mutex<Vec<Vec<u8>>>,
}

impl WirePort {
    fn drain(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.outbox.lock().unwrap())
    }
}

impl Port for WirePort {
    fn name(&self) -> &str {
        &self.name
    }

    fn hw_address(&self) -> Vec<u8> {
        self.hw.octets().to_vec()
    }

    fn supports_send_from(&self) -> bool {
        true
    }

    fn send_from(&self, payload: &[u8], src: MacAddr, dst: MacAddr, ethertype: u16) -> Result<()> {
        let frame = FrameBuilder::new(dst, src, ethertype).payload(payload).build();
        self.outbox.lock().unwrap().push(frame);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Switch(usize, PortId),
    Host(usize),
}

struct Node {
    switch: Switch<StdRng>,
    ports: Vec<Arc<WirePort>>,
    links: Vec<Option<Endpoint>>,
    timers: TimerQueue,
}

/// A received frame, decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub src: MacAddr,
    pub dst: MacAddr,
    pub ethertype: u16,
    pub payload: Vec<u8>,
}

pub struct Host {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    attached: (usize, PortId),
    inbox: Vec<Received>,
}

pub struct Fabric {
    nodes: Vec<Node>,
    hosts: Vec<Host>,
    now: Duration,
}

impl Fabric {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            hosts: Vec::new(),
            now: Duration::ZERO,
        }
    }

    pub fn add_switch(&mut self, role: HierarchyRole, mode: SwitchMode) -> usize {
        let id = self.nodes.len();
        let settings = SwitchSettings::new(role).with_mode(mode);
        let switch = Switch::with_rng(
            settings,
            Arc::new(MetricsRegistry::new()),
            StdRng::seed_from_u64(id as u64 + 1),
        );
        self.nodes.push(Node {
            switch,
            ports: Vec::new(),
            links: Vec::new(),
            timers: TimerQueue::new(),
        });
        id
    }

    fn add_port(&mut self, sw: usize, direction: PortDirection) -> PortId {
        let node = &mut self.nodes[sw];
        let idx = node.ports.len() as u8;
        let port = Arc::new(WirePort {
            name: format!("s{}p{}", sw, idx),
            hw: MacAddr([0x02, 0, 0, 0, sw as u8 + 1, idx]),
            outbox: Mutex::new(Vec::new()),
        });
        let id = node.switch.attach_port(port.clone(), direction).unwrap();
        node.ports.push(port);
        node.links.push(None);
        id
    }

    /// Wire `lower`'s upper-facing port to `upper`'s lower-facing port
    pub fn uplink(&mut self, lower: usize, upper: usize) {
        let up = self.add_port(lower, PortDirection::Upper);
        let down = self.add_port(upper, PortDirection::Lower);
        self.nodes[lower].links[up as usize] = Some(Endpoint::Switch(upper, down));
        self.nodes[upper].links[down as usize] = Some(Endpoint::Switch(lower, up));
    }

    /// Attach a host below switch `sw`
    pub fn add_host(&mut self, sw: usize, last_octet: u8) -> usize {
        let id = self.hosts.len();
        let port = self.add_port(sw, PortDirection::Lower);
        self.nodes[sw].links[port as usize] = Some(Endpoint::Host(id));
        self.hosts.push(Host {
            mac: MacAddr([0x00, 0x00, 0x00, 0x00, 0x00, last_octet]),
            ip: Ipv4Addr::new(10, 0, 0, last_octet),
            attached: (sw, port),
            inbox: Vec::new(),
        });
        id
    }

    pub fn switch(&self, sw: usize) -> &Switch<StdRng> {
        &self.nodes[sw].switch
    }

    pub fn host(&self, host: usize) -> &Host {
        &self.hosts[host]
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Start every switch and let the first round of hellos settle
    pub fn start(&mut self) {
        for node in &mut self.nodes {
            node.switch.start(&mut node.timers);
        }
        self.advance(Duration::from_millis(1));
    }

    /// Move time forward, firing timers in deadline order
    pub fn advance(&mut self, by: Duration) {
        let until = self.now + by;
        loop {
            let next = self
                .nodes
                .iter()
                .filter_map(|n| n.timers.next_deadline())
                .filter(|&d| d <= until)
                .min();
            let Some(deadline) = next else {
                break;
            };
            self.now = deadline;
            for node in &mut self.nodes {
                node.switch.run_until(&mut node.timers, deadline);
            }
            self.pump();
        }
        self.now = until;
        for node in &mut self.nodes {
            node.timers.advance_to(until);
        }
    }

    /// Deliver queued frames round by round until the fabric is quiet.
    /// Returns the number of frames delivered.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        for _ in 0..MAX_ROUNDS {
            let mut in_flight = Vec::new();
            for node in &self.nodes {
                for (port, link) in node.ports.iter().zip(&node.links) {
                    for frame in port.drain() {
                        if let Some(endpoint) = link {
                            in_flight.push((*endpoint, frame));
                        }
                    }
                }
            }
            if in_flight.is_empty() {
                return delivered;
            }
            delivered += in_flight.len();
            for (endpoint, frame) in in_flight {
                self.deliver(endpoint, &frame);
            }
        }
        panic!("fabric still busy after {} rounds", MAX_ROUNDS);
    }

    fn deliver(&mut self, endpoint: Endpoint, frame: &[u8]) {
        match endpoint {
            Endpoint::Switch(sw, port) => {
                self.nodes[sw]
                    .switch
                    .receive_frame(self.now, port, frame)
                    .unwrap();
            }
            Endpoint::Host(host) => {
                let eth = Frame::parse(frame).unwrap();
                self.hosts[host].inbox.push(Received {
                    src: eth.src_mac(),
                    dst: eth.dst_mac(),
                    ethertype: eth.ethertype(),
                    payload: eth.payload().to_vec(),
                });
            }
        }
    }

    /// Transmit a frame from `host` and deliver everything it causes
    pub fn send(&mut self, host: usize, dst: MacAddr, ethertype: EtherType, payload: &[u8]) {
        let src = self.hosts[host].mac;
        let (sw, port) = self.hosts[host].attached;
        let frame = FrameBuilder::new(dst, src, ethertype.into())
            .payload(payload)
            .build();
        self.deliver(Endpoint::Switch(sw, port), &frame);
        self.pump();
    }

    /// Broadcast an ARP request from `from` for `to`'s address
    pub fn arp_request(&mut self, from: usize, to: usize) {
        let (mac, ip, target) = (self.hosts[from].mac, self.hosts[from].ip, self.hosts[to].ip);
        let packet = ArpPacket::request(mac, ip, target).to_bytes();
        self.send(from, MacAddr::BROADCAST, EtherType::Arp, &packet);
    }

    /// Unicast an ARP reply from `from` to `to`
    pub fn arp_reply(&mut self, from: usize, to: usize) {
        let (a, b) = (&self.hosts[from], &self.hosts[to]);
        let packet = ArpPacket::reply(a.mac, a.ip, b.mac, b.ip).to_bytes();
        let dst = b.mac;
        self.send(from, dst, EtherType::Arp, &packet);
    }

    /// Send a TCP segment from `from` to `to`
    pub fn tcp(&mut self, from: usize, to: usize, sport: u16, dport: u16, flags: u8) -> Vec<u8> {
        let segment = TcpSegmentBuilder::new(sport, dport, flags).build();
        let packet = Ipv4Builder::new(self.hosts[from].ip, self.hosts[to].ip)
            .payload(&segment)
            .build();
        let dst = self.hosts[to].mac;
        self.send(from, dst, EtherType::Ipv4, &packet);
        packet
    }

    /// Frames received by `host` since the last call, hellos excluded
    pub fn take_inbox(&mut self, host: usize) -> Vec<Received> {
        std::mem::take(&mut self.hosts[host].inbox)
            .into_iter()
            .filter(|f| f.ethertype != u16::from(EtherType::Hello))
            .collect()
    }

    /// Sum of a metric across all switches
    pub fn total(&self, metric: &str) -> u64 {
        self.nodes
            .iter()
            .filter_map(|n| n.switch.metrics().value(metric))
            .sum()
    }
}
