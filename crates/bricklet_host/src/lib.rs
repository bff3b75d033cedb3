//! Host-side runtime adapter: serial port discovery, the connection with
//! its ping-based liveness tracking, and the block-to-chunk-id registry the
//! editor uses to address code on the device.

mod chunks;
mod connection;
mod error;
mod events;
mod ports;

pub use chunks::{ChunkEntry, ChunkRegistry};
pub use connection::{Connection, ConnectionStatus, PING_INTERVAL, LIVENESS_WINDOW};
pub use error::HostError;
pub use events::{HostEvents, NullEvents};
pub use ports::{list_ports, open_port};
