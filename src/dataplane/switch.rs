//! TFE switch forwarding engine
//!
//! Owns the neighbor, ARP-Path and TCP-Path tables and turns every received
//! frame into zero or more transmissions on the attached ports:
//!
//! - hellos mark switch-facing ports
//! - ARP-Path mode learns host locations from the first copy of a flood
//! - TCP-Path mode pins each TCP flow to the path its handshake took,
//!   probing the fabric with encapsulated SYNs when the destination is unknown
//! - hybrid mode picks TCP-Path for elephant flows and ARP-Path otherwise

use super::arp_path_table::{ArpLookupPolicy, ArpPathTable, ArpWindowPolicy};
use super::arp_path_table::{DEFAULT_ARP_BLOCK, DEFAULT_ARP_EXPIRE};
use super::classifier::{classify, Classification, PacketKind, TcpPorts};
use super::flood::{flood_order, HierarchyRole, PortDirection};
use super::neighbor_table::{NeighborTable, DEFAULT_HELLO_PERIOD};
use super::port::{DeliveryClass, Port, PortId};
use super::tcp_path_table::{FlowKey, TcpPathTable, DEFAULT_TCP_EXPIRE};
use super::timer::{SwitchTimer, TimerQueue, TimerService, FIRST_HELLO_DELAY};
use crate::protocol::ethernet::Frame;
use crate::protocol::path_header::with_incremented_jump_count;
use crate::protocol::{EtherType, MacAddr, PathHeader, PATH_HEADER_LEN};
use crate::telemetry::MetricsRegistry;
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Default interval between ARP table sweeps
pub const DEFAULT_ARP_SWEEP: Duration = Duration::from_secs(10);

/// TCP ports whose flows count as elephants in hybrid mode
pub const DEFAULT_ELEPHANT_PORTS: RangeInclusive<u16> = 3500..=4500;

/// Floor applied to every timer period so a zero period cannot spin
const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// Forwarding mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SwitchMode {
    ArpPath,
    TcpPath,
    /// TCP-Path for elephant flows, ARP-Path for everything else
    #[default]
    Hybrid,
}

impl FromStr for SwitchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "arp-path" | "arppath" => Ok(Self::ArpPath),
            "tcp-path" | "tcppath" => Ok(Self::TcpPath),
            "hybrid" | "tfe-path" | "tfepath" => Ok(Self::Hybrid),
            _ => Err(Error::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for SwitchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ArpPath => "arp-path",
            Self::TcpPath => "tcp-path",
            Self::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Runtime parameters of a switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchSettings {
    pub mode: SwitchMode,
    pub hierarchy: HierarchyRole,
    /// Informational; the hierarchy role drives flooding
    pub is_tor: bool,
    pub hello_period: Duration,
    pub arp_block: Duration,
    pub arp_expire: Duration,
    pub arp_sweep: Duration,
    pub tcp_expire: Duration,
    pub arp_policy: ArpLookupPolicy,
    pub arp_window: ArpWindowPolicy,
    pub elephant_ports: RangeInclusive<u16>,
    /// Seed for the flood order generator; entropy when unset
    pub rng_seed: Option<u64>,
}

impl SwitchSettings {
    /// Defaults for a switch playing `hierarchy`
    pub fn new(hierarchy: HierarchyRole) -> Self {
        Self {
            mode: SwitchMode::default(),
            hierarchy,
            is_tor: hierarchy == HierarchyRole::Tor,
            hello_period: DEFAULT_HELLO_PERIOD,
            arp_block: DEFAULT_ARP_BLOCK,
            arp_expire: DEFAULT_ARP_EXPIRE,
            arp_sweep: DEFAULT_ARP_SWEEP,
            tcp_expire: DEFAULT_TCP_EXPIRE,
            arp_policy: ArpLookupPolicy::default(),
            arp_window: ArpWindowPolicy::default(),
            elephant_ports: DEFAULT_ELEPHANT_PORTS,
            rng_seed: None,
        }
    }

    pub fn with_mode(mut self, mode: SwitchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether either side of the flow uses an elephant port
    pub fn is_elephant(&self, ports: TcpPorts) -> bool {
        self.elephant_ports.contains(&ports.src) || self.elephant_ports.contains(&ports.dst)
    }
}

/// A frame handed to the switch by a port
#[derive(Debug, Clone, Copy)]
pub struct RxFrame<'a> {
    /// L2 payload (everything after the EtherType)
    pub payload: &'a [u8],
    pub ethertype: u16,
    pub src: MacAddr,
    pub dst: MacAddr,
    pub class: DeliveryClass,
}

/// Receives every frame the switch passes up to its own stack
pub type LocalHandler = Box<dyn FnMut(PortId, &RxFrame<'_>) + Send>;

struct AttachedPort {
    handle: Arc<dyn Port>,
    direction: PortDirection,
    mac: MacAddr,
}

/// Path-discovery switch
pub struct Switch<R = StdRng> {
    settings: SwitchSettings,
    mac: MacAddr,
    ports: Vec<AttachedPort>,
    neighbors: NeighborTable,
    arp_paths: ArpPathTable,
    tcp_paths: TcpPathTable,
    rng: R,
    metrics: Arc<MetricsRegistry>,
    local_handler: Option<LocalHandler>,
}

impl Switch<StdRng> {
    /// Switch whose flood order comes from `settings.rng_seed`, or from
    /// entropy when no seed is set
    pub fn new(settings: SwitchSettings, metrics: Arc<MetricsRegistry>) -> Self {
        let rng = match settings.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(settings, metrics, rng)
    }
}

impl<R: Rng> Switch<R> {
    pub fn with_rng(settings: SwitchSettings, metrics: Arc<MetricsRegistry>, rng: R) -> Self {
        let mut switch = Self {
            neighbors: NeighborTable::new(settings.hello_period),
            arp_paths: ArpPathTable::new(settings.arp_block, settings.arp_expire),
            tcp_paths: TcpPathTable::new(settings.tcp_expire),
            settings: settings.clone(),
            mac: MacAddr::ZERO,
            ports: Vec::new(),
            rng,
            metrics,
            local_handler: None,
        };
        switch.configure(settings);
        switch
    }

    /// Apply new settings. Existing table entries keep their validity.
    pub fn configure(&mut self, settings: SwitchSettings) {
        self.neighbors.set_hold_time(settings.hello_period);
        self.arp_paths
            .set_timers(settings.arp_block, settings.arp_expire);
        self.arp_paths
            .set_policy(settings.arp_policy, settings.arp_window);
        self.tcp_paths.set_expire(settings.tcp_expire);
        debug!(
            mode = %settings.mode,
            hierarchy = %settings.hierarchy,
            is_tor = settings.is_tor,
            "Switch configured"
        );
        self.settings = settings;
    }

    pub fn settings(&self) -> &SwitchSettings {
        &self.settings
    }

    /// Attach a port facing `direction`
    ///
    /// The first attached port lends its address to the switch unless one
    /// was set explicitly. Ports without a 48-bit address or without
    /// foreign-source transmit are rejected.
    pub fn attach_port(&mut self, port: Arc<dyn Port>, direction: PortDirection) -> Result<PortId> {
        let hw = port.hw_address();
        let mac = MacAddr::try_from(hw.as_slice()).map_err(|len| Error::UnsupportedAddress {
            port: port.name().to_string(),
            len,
        })?;
        if !port.supports_send_from() {
            return Err(Error::SendFromUnsupported {
                port: port.name().to_string(),
            });
        }

        let id = self.ports.len() as PortId;
        if self.mac.is_zero() {
            self.mac = mac;
        }
        self.metrics.register_port(port.name());
        info!(port = port.name(), id, ?direction, %mac, "Port attached");

        self.ports.push(AttachedPort {
            handle: port,
            direction,
            mac,
        });
        Ok(id)
    }

    pub fn mac_addr(&self) -> MacAddr {
        self.mac
    }

    pub fn set_mac_addr(&mut self, mac: MacAddr) {
        self.mac = mac;
    }

    pub fn set_local_handler(&mut self, handler: LocalHandler) {
        self.local_handler = Some(handler);
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn port_name(&self, id: PortId) -> Option<&str> {
        self.ports.get(id as usize).map(|p| p.handle.name())
    }

    pub fn port_direction(&self, id: PortId) -> Option<PortDirection> {
        self.ports.get(id as usize).map(|p| p.direction)
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn arp_paths(&self) -> &ArpPathTable {
        &self.arp_paths
    }

    pub fn tcp_paths(&self) -> &TcpPathTable {
        &self.tcp_paths
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    // ========================================
    // Timers
    // ========================================

    /// Arm the periodic timers: first hello almost immediately, sweeps after
    /// one period each
    pub fn start(&mut self, timers: &mut impl TimerService) {
        timers.schedule_once(FIRST_HELLO_DELAY, SwitchTimer::Hello);
        timers.schedule_once(period(self.settings.tcp_expire), SwitchTimer::TcpSweep);
        timers.schedule_once(period(self.settings.arp_sweep), SwitchTimer::ArpSweep);
        info!(
            mac = %self.mac,
            ports = self.ports.len(),
            mode = %self.settings.mode,
            hierarchy = %self.settings.hierarchy,
            "Switch started"
        );
    }

    /// Handle a fired timer. The timer re-arms itself before doing its work.
    pub fn on_timer(&mut self, timer: SwitchTimer, timers: &mut impl TimerService) {
        let now = timers.now();
        match timer {
            SwitchTimer::Hello => {
                timers.schedule_once(period(self.settings.hello_period), SwitchTimer::Hello);
                let removed = self.neighbors.sweep(now);
                if removed > 0 {
                    debug!(removed, "Neighbor entries expired");
                }
                self.send_hellos();
            }
            SwitchTimer::ArpSweep => {
                timers.schedule_once(period(self.settings.arp_sweep), SwitchTimer::ArpSweep);
                let removed = self.arp_paths.sweep(now);
                trace!(removed, remaining = self.arp_paths.len(), "ARP-Path sweep");
            }
            SwitchTimer::TcpSweep => {
                timers.schedule_once(period(self.settings.tcp_expire), SwitchTimer::TcpSweep);
                let removed = self.tcp_paths.sweep(now);
                trace!(removed, remaining = self.tcp_paths.len(), "TCP-Path sweep");
            }
        }
        self.metrics.set_table_sizes(
            self.neighbors.len(),
            self.arp_paths.len(),
            self.tcp_paths.len(),
        );
    }

    /// Fire every timer due up to `until`, then leave the clock at `until`
    pub fn run_until(&mut self, queue: &mut TimerQueue, until: Duration) {
        while let Some(timer) = queue.pop_due(until) {
            self.on_timer(timer, queue);
        }
        queue.advance_to(until);
    }

    fn send_hellos(&self) {
        for port in &self.ports {
            let name = port.handle.name();
            match port
                .handle
                .send_from(&[], port.mac, MacAddr::BROADCAST, EtherType::Hello.into())
            {
                Ok(()) => {
                    self.metrics.hellos_sent.inc();
                    self.metrics.record_tx(name, 0);
                }
                Err(e) => {
                    warn!(port = name, error = %e, "Failed to send hello");
                    self.metrics.record_tx_error(name);
                }
            }
        }
    }

    // ========================================
    // Receive path
    // ========================================

    /// Receive a raw Ethernet frame on `ingress`
    pub fn receive_frame(&mut self, now: Duration, ingress: PortId, frame: &[u8]) -> Result<()> {
        let local = self
            .ports
            .get(ingress as usize)
            .map(|p| p.mac)
            .ok_or(Error::UnknownPort(ingress))?;
        let eth = Frame::parse(frame)?;
        let rx = RxFrame {
            payload: eth.payload(),
            ethertype: eth.ethertype(),
            src: eth.src_mac(),
            dst: eth.dst_mac(),
            class: DeliveryClass::classify(eth.dst_mac(), local),
        };
        self.receive(now, ingress, &rx);
        Ok(())
    }

    /// Receive a decoded frame on `ingress`
    pub fn receive(&mut self, now: Duration, ingress: PortId, frame: &RxFrame<'_>) {
        let Some(port) = self.ports.get(ingress as usize) else {
            warn!(ingress, "Frame received on unknown port");
            return;
        };
        self.metrics.record_rx(port.handle.name(), frame.payload.len());

        let cls = classify(frame.payload, frame.ethertype, frame.dst);
        trace!(
            port = port.handle.name(),
            src = %frame.src,
            dst = %frame.dst,
            ethertype = format_args!("{:#06x}", frame.ethertype),
            kind = ?cls.kind,
            "Frame received"
        );

        match frame.class {
            DeliveryClass::ToSelf => {
                if frame.dst == self.mac {
                    self.deliver_local(ingress, frame);
                }
            }
            DeliveryClass::Broadcast | DeliveryClass::Multicast => {
                self.deliver_local(ingress, frame);
                if cls.kind == PacketKind::Hello {
                    self.receive_hello(now, ingress, frame.src);
                } else {
                    self.dispatch(now, ingress, frame, &cls);
                }
            }
            DeliveryClass::OtherHost => {
                self.deliver_local(ingress, frame);
                if frame.dst != self.mac {
                    self.dispatch(now, ingress, frame, &cls);
                }
            }
        }
    }

    fn deliver_local(&mut self, ingress: PortId, frame: &RxFrame<'_>) {
        if let Some(handler) = self.local_handler.as_mut() {
            handler(ingress, frame);
            self.metrics.frames_delivered_local.inc();
        }
    }

    fn receive_hello(&mut self, now: Duration, ingress: PortId, peer: MacAddr) {
        self.metrics.hellos_received.inc();
        if self.neighbors.record_hello(ingress, peer, now) {
            debug!(port = ingress, %peer, "Neighbor switch discovered");
        }
    }

    fn dispatch(&mut self, now: Duration, ingress: PortId, frame: &RxFrame<'_>, cls: &Classification) {
        let mode = match self.settings.mode {
            SwitchMode::Hybrid if self.settings.is_elephant(cls.ports) => SwitchMode::TcpPath,
            SwitchMode::Hybrid => SwitchMode::ArpPath,
            mode => mode,
        };

        match (cls.kind, mode) {
            (PacketKind::Hello, _) => {}
            (_, SwitchMode::TcpPath) => self.forward_tcp_path(now, ingress, frame, cls),
            _ => self.forward_arp_path(now, ingress, frame, cls.kind),
        }
    }

    // ========================================
    // ARP-Path
    // ========================================

    fn learn_arp(&mut self, mac: MacAddr, port: PortId, kind: PacketKind, now: Duration) {
        let is_neighbor = self.neighbors.is_neighbor_port(port, now);
        self.arp_paths.learn(mac, port, kind, is_neighbor, now);
    }

    fn forward_arp_path(&mut self, now: Duration, ingress: PortId, frame: &RxFrame<'_>, kind: PacketKind) {
        if frame.dst.is_broadcast() {
            self.learn_arp(frame.src, ingress, kind, now);
            self.flood(ingress, frame.payload, frame.src, frame.dst, frame.ethertype);
            return;
        }

        let out = self.arp_paths.lookup(frame.dst, now);
        if kind == PacketKind::ArpReply {
            self.learn_arp(frame.src, ingress, kind, now);
            if let Some(out) = out {
                self.learn_arp(frame.dst, out, PacketKind::ArpRequest, now);
            }
        }
        if let Some(out) = out {
            self.learn_arp(frame.dst, out, kind, now);
        }
        self.unicast_or_flood(out, ingress, frame.payload, frame.src, frame.dst, frame.ethertype);
    }

    // ========================================
    // TCP-Path
    // ========================================

    /// Keep host bindings behind `port` alive while a flow uses it
    fn refresh_host_bindings(&mut self, port: PortId, now: Duration) {
        if self.arp_paths.policy() == ArpLookupPolicy::Mobility {
            self.arp_paths.refresh_host_bindings(port, now);
        }
    }

    /// ARP-Path port for `mac` if it leads straight to a host
    fn host_port(&self, mac: MacAddr, now: Duration) -> Option<PortId> {
        self.arp_paths
            .lookup(mac, now)
            .filter(|&port| !self.neighbors.is_neighbor_port(port, now))
    }

    fn forward_tcp_path(&mut self, now: Duration, ingress: PortId, frame: &RxFrame<'_>, cls: &Classification) {
        let key = FlowKey::new(frame.src, frame.dst, cls.ports);
        match cls.kind {
            PacketKind::TcpSyn => {
                self.tcp_paths.learn(key, ingress, cls.kind, now);
                match self.host_port(frame.dst, now) {
                    Some(out) => {
                        self.unicast(out, ingress, frame.payload, frame.src, frame.dst, frame.ethertype)
                    }
                    None => self.originate_probe(ingress, frame, cls.ports),
                }
                self.refresh_host_bindings(ingress, now);
            }
            PacketKind::TcpSynAck => {
                self.tcp_paths.learn(key, ingress, cls.kind, now);
                self.learn_arp(frame.dst, ingress, cls.kind, now);
                let out = self.tcp_paths.lookup(&key, cls.kind);
                self.refresh_host_bindings(ingress, now);
                self.unicast_or_flood(out, ingress, frame.payload, frame.src, frame.dst, frame.ethertype);
            }
            PacketKind::PathDiscoveryRequest => self.handle_probe(now, ingress, frame, cls),
            PacketKind::ArpRequest | PacketKind::ArpReply => {
                self.forward_arp_path(now, ingress, frame, cls.kind)
            }
            _ => {
                let out = self.tcp_paths.lookup(&key, cls.kind);
                self.refresh_host_bindings(ingress, now);
                self.unicast_or_flood(out, ingress, frame.payload, frame.src, frame.dst, frame.ethertype);
                self.tcp_paths.learn(key, ingress, cls.kind, now);
            }
        }
    }

    fn originate_probe(&mut self, ingress: PortId, frame: &RxFrame<'_>, ports: TcpPorts) {
        let header = PathHeader::probe(frame.src, frame.dst, ports.src, ports.dst);
        let probe = header.encapsulate(frame.payload);
        debug!(
            src = %frame.src,
            dst = %frame.dst,
            sport = ports.src,
            dport = ports.dst,
            "Originating path discovery"
        );
        self.metrics.probes_originated.inc();
        self.flood(
            ingress,
            &probe,
            frame.src,
            MacAddr::BROADCAST,
            EtherType::PathDiscovery.into(),
        );
    }

    fn handle_probe(&mut self, now: Duration, ingress: PortId, frame: &RxFrame<'_>, cls: &Classification) {
        let Some(header) = cls.path else {
            return;
        };
        let key = FlowKey::new(frame.src, header.original_dst, cls.ports);

        if let Some(owner) = self.tcp_paths.lookup(&key, PacketKind::PathDiscoveryRequest) {
            if owner != ingress {
                trace!(port = ingress, owner, jump = header.jump_count, "Duplicate probe dropped");
                self.metrics.probes_suppressed.inc();
                return;
            }
        }
        self.tcp_paths.learn(key, ingress, PacketKind::PathDiscoveryRequest, now);

        match self.host_port(header.original_dst, now) {
            Some(out) => {
                debug!(
                    dst = %header.original_dst,
                    port = out,
                    jump = header.jump_count,
                    "Path discovery resolved"
                );
                self.metrics.probes_resolved.inc();
                self.unicast(
                    out,
                    ingress,
                    &frame.payload[PATH_HEADER_LEN..],
                    frame.src,
                    header.original_dst,
                    EtherType::Ipv4.into(),
                );
            }
            None => match with_incremented_jump_count(frame.payload) {
                Ok(probe) => {
                    self.metrics.probes_reflooded.inc();
                    self.flood(
                        ingress,
                        &probe,
                        frame.src,
                        MacAddr::BROADCAST,
                        EtherType::PathDiscovery.into(),
                    );
                }
                Err(e) => warn!(error = %e, "Malformed path discovery probe"),
            },
        }
    }

    // ========================================
    // Egress
    // ========================================

    fn unicast_or_flood(
        &mut self,
        out: Option<PortId>,
        ingress: PortId,
        payload: &[u8],
        src: MacAddr,
        dst: MacAddr,
        ethertype: u16,
    ) {
        match out {
            Some(out) => self.unicast(out, ingress, payload, src, dst, ethertype),
            None => {
                self.metrics.lookup_misses.inc();
                self.flood(ingress, payload, src, dst, ethertype);
            }
        }
    }

    fn unicast(&self, out: PortId, ingress: PortId, payload: &[u8], src: MacAddr, dst: MacAddr, ethertype: u16) {
        if out == ingress {
            trace!(port = out, %dst, "Egress equals ingress, frame filtered");
            self.metrics.frames_filtered.inc();
            return;
        }
        self.metrics.frames_unicast.inc();
        self.transmit(out, payload, src, dst, ethertype);
    }

    /// Send one copy out every port the hierarchy allows, in random order
    fn flood(&mut self, ingress: PortId, payload: &[u8], src: MacAddr, dst: MacAddr, ethertype: u16) {
        let directions: Vec<PortDirection> = self.ports.iter().map(|p| p.direction).collect();
        let order = flood_order(
            &mut self.rng,
            self.settings.hierarchy,
            &directions,
            ingress as usize,
        );

        self.metrics.frames_flooded.inc();
        self.metrics.flood_copies.add(order.len() as u64);
        for idx in order {
            self.transmit(idx as PortId, payload, src, dst, ethertype);
        }
    }

    fn transmit(&self, out: PortId, payload: &[u8], src: MacAddr, dst: MacAddr, ethertype: u16) {
        let Some(port) = self.ports.get(out as usize) else {
            warn!(port = out, "Transmit on unknown port");
            return;
        };
        let name = port.handle.name();
        match port.handle.send_from(payload, src, dst, ethertype) {
            Ok(()) => self.metrics.record_tx(name, payload.len()),
            Err(e) => {
                warn!(port = name, error = %e, "Transmit failed");
                self.metrics.record_tx_error(name);
            }
        }
    }
}

fn period(configured: Duration) -> Duration {
    configured.max(MIN_TIMER_PERIOD)
}
