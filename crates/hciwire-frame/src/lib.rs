//! HCI UART packet framing and stream reassembly.
//!
//! Every frame on an HCI UART (H4) link is a single indicator byte followed
//! by a packet whose header announces the payload length:
//! - `0x01` command (host to controller)
//! - `0x02` ACL data (both directions)
//! - `0x04` event (controller to host)
//!
//! [`FrameDecoder`] turns arbitrarily chunked input back into packets and
//! [`encode_packet`] produces the outbound byte stream. No I/O happens here.

pub mod codec;
pub mod error;
pub mod indicator;
pub mod packet;

pub use codec::{encode_packet, FrameDecoder, ProtocolErrorPolicy};
pub use error::{FrameError, Result};
pub use indicator::{Direction, Indicator};
pub use packet::{AclData, Command, Event, HciPacket, Packet};
