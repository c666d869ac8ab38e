//! Forwarding statistics.
//!
//! Lock-free counters for the forwarding decisions the switch takes, plus
//! per-port frame counters keyed by port name.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Last-written value.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, val: usize) {
        self.0.store(val as u64, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-port frame counters.
#[derive(Debug, Default)]
pub struct PortStats {
    pub rx_frames: Counter,
    pub rx_bytes: Counter,
    pub tx_frames: Counter,
    pub tx_bytes: Counter,
    /// Frames the transport refused to send.
    pub tx_errors: Counter,
}

impl PortStats {
    pub fn record_rx(&self, bytes: usize) {
        self.rx_frames.inc();
        self.rx_bytes.add(bytes as u64);
    }

    pub fn record_tx(&self, bytes: usize) {
        self.tx_frames.inc();
        self.tx_bytes.add(bytes as u64);
    }
}

/// Switch-wide metrics.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    ports: RwLock<HashMap<String, PortStats>>,

    // Forwarding decisions
    /// Frames sent out a single resolved port.
    pub frames_unicast: Counter,
    /// Frames handed to the flooding algorithm.
    pub frames_flooded: Counter,
    /// Copies emitted by floods.
    pub flood_copies: Counter,
    /// Frames dropped because the resolved port was the ingress port.
    pub frames_filtered: Counter,
    /// Frames passed up to the local handler.
    pub frames_delivered_local: Counter,
    /// Unicast lookups that found no port.
    pub lookup_misses: Counter,

    // Path discovery
    pub probes_originated: Counter,
    pub probes_reflooded: Counter,
    /// Probes decapsulated and delivered toward their destination.
    pub probes_resolved: Counter,
    /// Duplicate probes dropped because the flow is owned by another port.
    pub probes_suppressed: Counter,

    // Hello protocol
    pub hellos_sent: Counter,
    pub hellos_received: Counter,

    // Table sizes, refreshed at each sweep
    pub neighbor_table_size: Gauge,
    pub arp_table_size: Gauge,
    pub tcp_table_size: Gauge,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a port. Registering twice keeps the existing counters.
    pub fn register_port(&self, name: &str) {
        let mut ports = self.ports.write().unwrap_or_else(PoisonError::into_inner);
        ports.entry(name.to_string()).or_default();
    }

    fn with_port(&self, name: &str, f: impl FnOnce(&PortStats)) {
        let ports = self.ports.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(stats) = ports.get(name) {
            f(stats);
        }
    }

    pub fn record_rx(&self, port: &str, bytes: usize) {
        self.with_port(port, |stats| stats.record_rx(bytes));
    }

    pub fn record_tx(&self, port: &str, bytes: usize) {
        self.with_port(port, |stats| stats.record_tx(bytes));
    }

    pub fn record_tx_error(&self, port: &str) {
        self.with_port(port, |stats| stats.tx_errors.inc());
    }

    pub fn set_table_sizes(&self, neighbors: usize, arp: usize, tcp: usize) {
        self.neighbor_table_size.set(neighbors);
        self.arp_table_size.set(arp);
        self.tcp_table_size.set(tcp);
    }

    /// Snapshot of every metric as name/value pairs, ports sorted by name.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result: Vec<(String, u64)> = [
            ("frames_unicast", self.frames_unicast.get()),
            ("frames_flooded", self.frames_flooded.get()),
            ("flood_copies", self.flood_copies.get()),
            ("frames_filtered", self.frames_filtered.get()),
            ("frames_delivered_local", self.frames_delivered_local.get()),
            ("lookup_misses", self.lookup_misses.get()),
            ("probes_originated", self.probes_originated.get()),
            ("probes_reflooded", self.probes_reflooded.get()),
            ("probes_resolved", self.probes_resolved.get()),
            ("probes_suppressed", self.probes_suppressed.get()),
            ("hellos_sent", self.hellos_sent.get()),
            ("hellos_received", self.hellos_received.get()),
            ("neighbor_table_size", self.neighbor_table_size.get()),
            ("arp_table_size", self.arp_table_size.get()),
            ("tcp_table_size", self.tcp_table_size.get()),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

        let ports = self.ports.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&String> = ports.keys().collect();
        names.sort();
        for name in names {
            let stats = &ports[name];
            result.extend([
                (format!("{name}_rx_frames"), stats.rx_frames.get()),
                (format!("{name}_rx_bytes"), stats.rx_bytes.get()),
                (format!("{name}_tx_frames"), stats.tx_frames.get()),
                (format!("{name}_tx_bytes"), stats.tx_bytes.get()),
                (format!("{name}_tx_errors"), stats.tx_errors.get()),
            ]);
        }

        result
    }

    /// Value of a single exported metric
    pub fn value(&self, name: &str) -> Option<u64> {
        self.export()
            .into_iter()
            .find(|(metric, _)| metric == name)
            .map(|(_, value)| value)
    }
}
