//! HCI transports with a uniform async lifecycle.
//!
//! Two transports move H4 frames between the host stack and a controller:
//! - [`SerialTransport`] over a UART device (Unix only)
//! - [`TcpTransport`] over an outbound TCP connection
//!
//! Both implement [`HciTransport`]: `open` starts a background reader that
//! reassembles packets into a queue, `receive` pops them in arrival order,
//! `send` frames and writes one packet at a time, and `close` stops the
//! reader and releases anyone blocked in `receive`.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod monitor;
pub mod queue;
pub mod tcp;
pub mod traits;

#[cfg(unix)]
pub mod serial;
#[cfg(unix)]
mod wake;

pub use config::{OpenOptions, TransportConfig, DEFAULT_READ_CHUNK, INIT_BAUDRATE};
pub use error::{ErrorKind, Result, TransportError};
pub use lifecycle::LinkState;
pub use monitor::{hex_dump, Monitor, NullMonitor, TracingMonitor};
pub use queue::{packet_queue, Delivery, PacketQueue, QueueProducer};
pub use tcp::TcpTransport;
pub use traits::HciTransport;

#[cfg(unix)]
pub use serial::{LineSettings, LinkOpener, SerialLink, SerialPortOpener, SerialTransport};
