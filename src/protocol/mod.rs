//! Header codecs consumed by the switch
//!
//! Generic Ethernet/ARP/IPv4/TCP parsing is kept narrow; the path discovery
//! header is the only encapsulation the switch owns.

pub mod arp;
pub mod ethernet;
pub mod ipv4;
pub mod path_header;
pub mod tcp;
pub mod types;

pub use path_header::{PathHeader, PATH_HEADER_LEN};
pub use types::*;
