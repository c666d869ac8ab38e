//! TFE Switch - path-discovery L2 forwarding engine
//!
//! Forwards Ethernet frames without spanning tree. Unicast paths are learned
//! from ARP traffic (ARP-Path) or from the TCP handshake (TCP-Path), and
//! unknown destinations are reached through hierarchy-restricted flooding.

pub mod capture;
pub mod config;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
