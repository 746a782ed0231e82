//! HCI transports for Bluetooth host stacks.
//!
//! hciwire moves HCI packets between a host stack and a controller over a
//! UART (H4 framing) or a TCP socket carrying the same byte stream.
//!
//! # Crate Structure
//!
//! - [`frame`]: packet types, H4 encoding and stream reassembly
//! - [`transport`]: the [`transport::HciTransport`] lifecycle with serial
//!   and TCP implementations

/// Re-export frame types.
pub mod frame {
    pub use hciwire_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use hciwire_transport::*;
}
