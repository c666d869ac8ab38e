//! TCP protocol - RFC 793
//!
//! Only the fields path learning depends on: ports and the flag byte.

use crate::{Error, Result};

/// Minimum TCP header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Offset of the flag byte inside the TCP header
pub const FLAGS_OFFSET: usize = 13;

/// TCP flag byte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags(pub u8);

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }
}

/// Parsed TCP header (zero-copy reference)
#[derive(Debug)]
pub struct TcpHeader<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> TcpHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("TCP header too short".into()));
        }

        let header_len = ((buffer[12] >> 4) as usize) * 4;
        if header_len < MIN_HEADER_SIZE {
            return Err(Error::Parse("TCP data offset too small".into()));
        }
        if buffer.len() < header_len {
            return Err(Error::Parse("TCP header truncated".into()));
        }

        Ok(Self { buffer, header_len })
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[0], self.buffer[1]])
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn flags(&self) -> TcpFlags {
        TcpFlags(self.buffer[FLAGS_OFFSET])
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }
}

/// Builder for option-less TCP segments (checksum left zero)
#[derive(Debug, Clone)]
pub struct TcpSegmentBuilder {
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ack: u32,
    flags: u8,
    payload: Vec<u8>,
}

impl TcpSegmentBuilder {
    pub fn new(src_port: u16, dst_port: u16, flags: u8) -> Self {
        Self {
            src_port,
            dst_port,
            seq: 0,
            ack: 0,
            flags,
            payload: Vec::new(),
        }
    }

    pub fn seq(mut self, seq: u32) -> Self {
        self.seq = seq;
        self
    }

    pub fn ack(mut self, ack: u32) -> Self {
        self.ack = ack;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MIN_HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.src_port.to_be_bytes());
        buf.extend_from_slice(&self.dst_port.to_be_bytes());
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(&self.ack.to_be_bytes());
        buf.push(5 << 4);
        buf.push(self.flags);
        buf.extend_from_slice(&0xFFFFu16.to_be_bytes());
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.extend_from_slice(&self.payload);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ports_and_flags() {
        let seg = TcpSegmentBuilder::new(1000, 80, TcpFlags::SYN | TcpFlags::ACK)
            .seq(7)
            .build();
        let header = TcpHeader::parse(&seg).unwrap();

        assert_eq!(header.src_port(), 1000);
        assert_eq!(header.dst_port(), 80);
        assert_eq!(header.flags().bits(), 18);
        assert!(header.flags().contains(TcpFlags::SYN));
        assert!(!header.flags().contains(TcpFlags::FIN));
        assert_eq!(header.header_len(), MIN_HEADER_SIZE);
    }

    #[test]
    fn test_parse_rejects_bad_offset() {
        let mut seg = TcpSegmentBuilder::new(1, 2, TcpFlags::ACK).build();
        seg[12] = 2 << 4;
        assert!(TcpHeader::parse(&seg).is_err());

        seg[12] = 15 << 4;
        assert!(TcpHeader::parse(&seg).is_err());
    }
}
