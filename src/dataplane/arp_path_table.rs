//! ARP-Path table
//!
//! Maps host MAC addresses to the port the first copy of their flooded
//! traffic arrived on. A fresh binding gets a short "blocking" lifetime
//! so that late duplicates of the same flood, which arrive on other ports,
//! only refresh the winning entry instead of moving it. Confirmed traffic
//! extends the binding to the full expiry time.

use super::classifier::PacketKind;
use super::port::PortId;
use crate::protocol::MacAddr;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Default short window for new or flood-refreshed bindings
pub const DEFAULT_ARP_BLOCK: Duration = Duration::from_secs(3);

/// Default lifetime of a confirmed binding
pub const DEFAULT_ARP_EXPIRE: Duration = Duration::from_secs(10);

/// How lookups treat bindings whose validity has lapsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArpLookupPolicy {
    /// Only unexpired bindings are returned; the sweep drops every expired
    /// binding. Live TCP traffic keeps host-facing bindings alive.
    #[default]
    Mobility,
    /// Host-facing bindings are returned and kept by the sweep even after
    /// their validity has lapsed.
    Strict,
}

impl FromStr for ArpLookupPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "mobility" => Ok(Self::Mobility),
            "strict" => Ok(Self::Strict),
            other => Err(crate::Error::Config(format!("unknown ARP policy: {other}"))),
        }
    }
}

/// Which validity window a learned binding receives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArpWindowPolicy {
    /// ARP requests and plain broadcasts get the blocking window, everything
    /// else the full expiry
    #[default]
    ByKind,
    /// Every learn uses the blocking window
    AlwaysBlock,
}

impl FromStr for ArpWindowPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "by-kind" => Ok(Self::ByKind),
            "always-block" => Ok(Self::AlwaysBlock),
            other => Err(crate::Error::Config(format!("unknown ARP window: {other}"))),
        }
    }
}

/// Snapshot of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpBinding {
    pub port: PortId,
    /// Set when the port was not a neighbor (switch-facing) port at learn time
    pub host_facing: bool,
    pub valid_until: Duration,
}

/// MAC -> port table with ARP-Path blocking semantics
#[derive(Debug)]
pub struct ArpPathTable {
    entries: HashMap<MacAddr, ArpBinding>,
    block: Duration,
    expire: Duration,
    policy: ArpLookupPolicy,
    window: ArpWindowPolicy,
}

impl Default for ArpPathTable {
    fn default() -> Self {
        Self::new(DEFAULT_ARP_BLOCK, DEFAULT_ARP_EXPIRE)
    }
}

impl ArpPathTable {
    pub fn new(block: Duration, expire: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            block,
            expire,
            policy: ArpLookupPolicy::default(),
            window: ArpWindowPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ArpLookupPolicy, window: ArpWindowPolicy) -> Self {
        self.policy = policy;
        self.window = window;
        self
    }

    pub fn set_timers(&mut self, block: Duration, expire: Duration) {
        self.block = block;
        self.expire = expire;
    }

    pub fn set_policy(&mut self, policy: ArpLookupPolicy, window: ArpWindowPolicy) {
        self.policy = policy;
        self.window = window;
    }

    pub fn policy(&self) -> ArpLookupPolicy {
        self.policy
    }

    /// Validity window applied when learning from a packet of `kind`
    pub fn window_for(&self, kind: PacketKind) -> Duration {
        match (self.window, kind) {
            (ArpWindowPolicy::AlwaysBlock, _) => self.block,
            (_, PacketKind::ArpRequest | PacketKind::EthBroadcast) => self.block,
            _ => self.expire,
        }
    }

    /// Learn that `mac` is reachable through `port`
    ///
    /// An existing binding is only refreshed and keeps its port and
    /// host-facing flag until the sweep removes it. A new binding records
    /// whether `port` faced a neighbor switch at that moment.
    /// Broadcast and multicast addresses are never learned.
    pub fn learn(
        &mut self,
        mac: MacAddr,
        port: PortId,
        kind: PacketKind,
        is_neighbor_port: bool,
        now: Duration,
    ) {
        if mac.is_broadcast() || mac.is_multicast() {
            return;
        }

        let valid_until = now + self.window_for(kind);
        self.entries
            .entry(mac)
            .and_modify(|binding| binding.valid_until = valid_until)
            .or_insert(ArpBinding {
                port,
                host_facing: !is_neighbor_port,
                valid_until,
            });
    }

    /// Egress port for `mac`, if known
    pub fn lookup(&self, mac: MacAddr, now: Duration) -> Option<PortId> {
        let binding = self.entries.get(&mac)?;
        let usable = match self.policy {
            ArpLookupPolicy::Mobility => binding.valid_until >= now,
            ArpLookupPolicy::Strict => binding.host_facing || binding.valid_until >= now,
        };
        usable.then_some(binding.port)
    }

    pub fn get(&self, mac: MacAddr) -> Option<&ArpBinding> {
        self.entries.get(&mac)
    }

    /// Extend every host-facing binding on `port` to the full expiry time
    ///
    /// Returns the number of bindings refreshed.
    pub fn refresh_host_bindings(&mut self, port: PortId, now: Duration) -> usize {
        let valid_until = now + self.expire;
        let mut refreshed = 0;
        for binding in self.entries.values_mut() {
            if binding.port == port && binding.host_facing {
                binding.valid_until = valid_until;
                refreshed += 1;
            }
        }
        refreshed
    }

    /// Drop lapsed bindings. Returns the number removed.
    pub fn sweep(&mut self, now: Duration) -> usize {
        let before = self.entries.len();
        let policy = self.policy;
        self.entries.retain(|_, binding| {
            binding.valid_until >= now
                || (policy == ArpLookupPolicy::Strict && binding.host_facing)
        });
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
