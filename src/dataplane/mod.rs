//! Data plane components
//!
//! Classification, the three learning tables, flooding, timers and the
//! forwarding engine that ties them together.

mod arp_path_table;
mod classifier;
mod flood;
mod neighbor_table;
mod port;
mod switch;
mod tcp_path_table;
mod timer;

pub use arp_path_table::{ArpBinding, ArpLookupPolicy, ArpPathTable, ArpWindowPolicy};
pub use classifier::{classify, classify_ipv4, classify_raw_ipv4, Classification, PacketKind, TcpPorts};
pub use flood::{eligible_ports, flood_order, may_flood, HierarchyRole, PortDirection};
pub use neighbor_table::{NeighborEntry, NeighborTable};
pub use port::{DeliveryClass, Port, PortId};
pub use switch::{
    LocalHandler, RxFrame, Switch, SwitchMode, SwitchSettings, DEFAULT_ARP_SWEEP,
    DEFAULT_ELEPHANT_PORTS,
};
pub use tcp_path_table::{FlowKey, TcpFlowEntry, TcpPathTable};
pub use timer::{SwitchTimer, TimerQueue, TimerService, FIRST_HELLO_DELAY};

pub use arp_path_table::{DEFAULT_ARP_BLOCK, DEFAULT_ARP_EXPIRE};
pub use neighbor_table::DEFAULT_HELLO_PERIOD;
pub use tcp_path_table::DEFAULT_TCP_EXPIRE;
