//! TCP-Path table
//!
//! Per-flow path state keyed by the (MAC, MAC, port, port) 4-tuple. The
//! entry created by a SYN or a path discovery probe remembers the port the
//! flow came in on; the SYN-ACK travelling back fills in the other side.

use super::classifier::{PacketKind, TcpPorts};
use super::port::PortId;
use crate::protocol::MacAddr;
use std::collections::HashMap;
use std::time::Duration;

/// Default lifetime of a flow entry
pub const DEFAULT_TCP_EXPIRE: Duration = Duration::from_secs(10);

/// Directional flow identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub mac_src: MacAddr,
    pub mac_dst: MacAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl FlowKey {
    pub fn new(mac_src: MacAddr, mac_dst: MacAddr, ports: TcpPorts) -> Self {
        Self {
            mac_src,
            mac_dst,
            src_port: ports.src,
            dst_port: ports.dst,
        }
    }

    /// Key of the opposite direction
    pub fn reversed(&self) -> Self {
        Self {
            mac_src: self.mac_dst,
            mac_dst: self.mac_src,
            src_port: self.dst_port,
            dst_port: self.src_port,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpFlowEntry {
    /// Port the flow's first packet arrived on
    pub src_device: PortId,
    /// Port the reply arrived on, once seen
    pub dst_device: Option<PortId>,
    pub valid_until: Duration,
}

/// Flow -> port table
#[derive(Debug)]
pub struct TcpPathTable {
    flows: HashMap<FlowKey, TcpFlowEntry>,
    expire: Duration,
}

impl Default for TcpPathTable {
    fn default() -> Self {
        Self::new(DEFAULT_TCP_EXPIRE)
    }
}

impl TcpPathTable {
    pub fn new(expire: Duration) -> Self {
        Self {
            flows: HashMap::new(),
            expire,
        }
    }

    pub fn set_expire(&mut self, expire: Duration) {
        self.expire = expire;
    }

    /// Learn from a packet of `kind` seen on `port`
    ///
    /// SYN and probes create the entry for `key` with `port` as source side,
    /// or refresh it if it already exists. Any other kind refreshes both
    /// directions of the flow where present; a SYN-ACK additionally records
    /// `port` as the destination side of the reverse entry.
    pub fn learn(&mut self, key: FlowKey, port: PortId, kind: PacketKind, now: Duration) {
        let valid_until = now + self.expire;
        match kind {
            PacketKind::TcpSyn | PacketKind::PathDiscoveryRequest => {
                self.flows
                    .entry(key)
                    .and_modify(|entry| entry.valid_until = valid_until)
                    .or_insert(TcpFlowEntry {
                        src_device: port,
                        dst_device: None,
                        valid_until,
                    });
            }
            _ => {
                if let Some(entry) = self.flows.get_mut(&key) {
                    entry.valid_until = valid_until;
                }
                if let Some(entry) = self.flows.get_mut(&key.reversed()) {
                    entry.valid_until = valid_until;
                    if kind == PacketKind::TcpSynAck {
                        entry.dst_device = Some(port);
                    }
                }
            }
        }
    }

    /// Egress port for a packet of `kind` belonging to `key`
    ///
    /// The reverse direction is checked first and answers with its source
    /// side. The forward direction answers with its source side for probes
    /// and its destination side otherwise. Expiry is enforced by `sweep`.
    pub fn lookup(&self, key: &FlowKey, kind: PacketKind) -> Option<PortId> {
        if let Some(entry) = self.flows.get(&key.reversed()) {
            return Some(entry.src_device);
        }

        let entry = self.flows.get(key)?;
        match kind {
            PacketKind::PathDiscoveryRequest => Some(entry.src_device),
            _ => entry.dst_device,
        }
    }

    pub fn get(&self, key: &FlowKey) -> Option<&TcpFlowEntry> {
        self.flows.get(key)
    }

    /// Drop lapsed flows. Returns the number removed.
    pub fn sweep(&mut self, now: Duration) -> usize {
        let before = self.flows.len();
        self.flows.retain(|_, entry| entry.valid_until >= now);
        before - self.flows.len()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
