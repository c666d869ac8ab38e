//! Path discovery encapsulation
//!
//! A `PathHeader` is prepended to a frame whose egress port is still unknown
//! and travels with EtherType `PathDiscovery` until a switch that knows the
//! original destination strips it.
//!
//! Wire format, all fields in network byte order (24 bytes):
//!
//! ```text
//! dst_mac(6) | src_mac(6) | original_mac(6) | tcp_src_port(2) | tcp_dst_port(2) | jump_count(2)
//! ```

use super::MacAddr;
use crate::{Error, Result};

/// Encoded size of a path header
pub const PATH_HEADER_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathHeader {
    pub dst: MacAddr,
    pub src: MacAddr,
    /// Destination the probe is looking for
    pub original_dst: MacAddr,
    pub tcp_src_port: u16,
    pub tcp_dst_port: u16,
    /// Times the probe has been re-flooded. Informational only.
    pub jump_count: u16,
}

impl Default for PathHeader {
    fn default() -> Self {
        Self {
            dst: MacAddr::BROADCAST,
            src: MacAddr::ZERO,
            original_dst: MacAddr::ZERO,
            tcp_src_port: 0,
            tcp_dst_port: 0,
            jump_count: 0,
        }
    }
}

impl PathHeader {
    /// Probe header for a flow from `src` towards `original_dst`
    pub fn probe(src: MacAddr, original_dst: MacAddr, tcp_src_port: u16, tcp_dst_port: u16) -> Self {
        Self {
            src,
            original_dst,
            tcp_src_port,
            tcp_dst_port,
            ..Self::default()
        }
    }

    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < PATH_HEADER_LEN {
            return Err(Error::Parse("path header too short".into()));
        }

        let mac_at = |offset: usize| {
            let mut mac = [0u8; 6];
            mac.copy_from_slice(&buffer[offset..offset + 6]);
            MacAddr(mac)
        };
        let u16_at = |offset: usize| u16::from_be_bytes([buffer[offset], buffer[offset + 1]]);

        Ok(Self {
            dst: mac_at(0),
            src: mac_at(6),
            original_dst: mac_at(12),
            tcp_src_port: u16_at(18),
            tcp_dst_port: u16_at(20),
            jump_count: u16_at(22),
        })
    }

    pub fn to_bytes(&self) -> [u8; PATH_HEADER_LEN] {
        let mut buf = [0u8; PATH_HEADER_LEN];
        buf[0..6].copy_from_slice(&self.dst.0);
        buf[6..12].copy_from_slice(&self.src.0);
        buf[12..18].copy_from_slice(&self.original_dst.0);
        buf[18..20].copy_from_slice(&self.tcp_src_port.to_be_bytes());
        buf[20..22].copy_from_slice(&self.tcp_dst_port.to_be_bytes());
        buf[22..24].copy_from_slice(&self.jump_count.to_be_bytes());
        buf
    }

    pub fn increment_jump_count(&mut self) {
        self.jump_count = self.jump_count.wrapping_add(1);
    }

    /// Prepend this header to `payload`
    pub fn encapsulate(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(PATH_HEADER_LEN + payload.len());
        out.extend_from_slice(&self.to_bytes());
        out.extend_from_slice(payload);
        out
    }
}

/// Split an encapsulated frame into its header and the original payload
pub fn decapsulate(frame: &[u8]) -> Result<(PathHeader, &[u8])> {
    let header = PathHeader::parse(frame)?;
    Ok((header, &frame[PATH_HEADER_LEN..]))
}

/// Copy of `frame` with the jump count of its header incremented by one
pub fn with_incremented_jump_count(frame: &[u8]) -> Result<Vec<u8>> {
    let (mut header, inner) = decapsulate(frame)?;
    header.increment_jump_count();
    Ok(header.encapsulate(inner))
}
