//! Switch ports
//!
//! A port is anything that can put an Ethernet frame on a link with a
//! caller-chosen source address. The switch only ever talks to ports through
//! this trait; the AF_PACKET transport and the test doubles both implement it.

use crate::protocol::MacAddr;
use crate::Result;

/// Port identifier, assigned sequentially at attach time
pub type PortId = u32;

pub trait Port: Send + Sync {
    /// Human-readable name (interface name for real ports)
    fn name(&self) -> &str;

    /// Raw hardware address of the port
    fn hw_address(&self) -> Vec<u8>;

    /// Whether `send_from` may use a source address other than the port's own
    fn supports_send_from(&self) -> bool;

    /// Transmit `payload` in a frame from `src` to `dst`
    fn send_from(&self, payload: &[u8], src: MacAddr, dst: MacAddr, ethertype: u16) -> Result<()>;
}

/// How a received frame was addressed, relative to the receiving port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryClass {
    /// Addressed to the receiving port itself
    ToSelf,
    Broadcast,
    Multicast,
    /// Unicast to some other station
    OtherHost,
}

impl DeliveryClass {
    pub fn classify(dst: MacAddr, local: MacAddr) -> Self {
        if dst.is_broadcast() {
            DeliveryClass::Broadcast
        } else if dst.is_multicast() {
            DeliveryClass::Multicast
        } else if dst == local {
            DeliveryClass::ToSelf
        } else {
            DeliveryClass::OtherHost
        }
    }
}
