//! Packet I/O on Linux interfaces
//!
//! AF_PACKET sockets bound per interface, wrapped as switch ports.

mod af_packet;

pub use af_packet::{interface_hw_address, AfPacketPort, AfPacketSocket};

/// Information about a received frame
#[derive(Debug, Clone)]
pub struct RxInfo {
    /// Number of bytes received
    pub len: usize,
}
