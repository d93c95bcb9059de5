//! Live chat connections: the manager and the wire protocol.
//!
//! One persistent user socket, many keyed agent sockets; see `manager` for
//! the lifecycle and liveness rules.

mod manager;
mod protocol;

pub use manager::{ChatEvents, ConnectParams, ConnectionManager, SocketHandle};
pub use protocol::{connect_url, decode_inbound, InboundFrame, OutboundFrame};
