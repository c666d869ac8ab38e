//! Hello-learned neighbor table
//!
//! Records which ports face another switch. A port is a neighbor port while
//! an unexpired hello entry exists for it; entries are purged by `sweep`.

use super::port::PortId;
use crate::protocol::MacAddr;
use std::collections::HashMap;
use std::time::Duration;

/// Default hello period and neighbor hold time
pub const DEFAULT_HELLO_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborEntry {
    /// Hardware address of the switch that sent the hello
    pub peer: MacAddr,
    pub valid_until: Duration,
}

/// Port -> neighbor switch table
#[derive(Debug)]
pub struct NeighborTable {
    entries: HashMap<PortId, NeighborEntry>,
    hold_time: Duration,
}

impl Default for NeighborTable {
    fn default() -> Self {
        Self::new(DEFAULT_HELLO_PERIOD)
    }
}

impl NeighborTable {
    pub fn new(hold_time: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            hold_time,
        }
    }

    pub fn set_hold_time(&mut self, hold_time: Duration) {
        self.hold_time = hold_time;
    }

    /// Record a hello heard on `port`
    ///
    /// Creates the entry or refreshes its validity; the first peer heard on
    /// a port is kept. Returns `true` if the port was not known as a
    /// neighbor port before.
    pub fn record_hello(&mut self, port: PortId, peer: MacAddr, now: Duration) -> bool {
        let valid_until = now + self.hold_time;
        match self.entries.get_mut(&port) {
            Some(entry) => {
                entry.valid_until = valid_until;
                false
            }
            None => {
                self.entries.insert(port, NeighborEntry { peer, valid_until });
                true
            }
        }
    }

    /// Whether an unexpired hello entry exists for `port`
    pub fn is_neighbor_port(&self, port: PortId, now: Duration) -> bool {
        self.entries
            .get(&port)
            .is_some_and(|entry| entry.valid_until >= now)
    }

    pub fn get(&self, port: PortId) -> Option<&NeighborEntry> {
        self.entries.get(&port)
    }

    /// Remove entries whose validity has passed. Returns the number removed.
    pub fn sweep(&mut self, now: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.valid_until >= now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
