use std::time::Duration;

use async_trait::async_trait;
use hciwire_frame::Packet;

use crate::config::OpenOptions;
use crate::error::Result;
use crate::lifecycle::LinkState;

/// Lifecycle contract the HCI layer relies on.
///
/// All methods take `&self` so one transport can be shared between a
/// receiving task and any number of senders. Implementations must follow
/// the [`LinkState`] rules:
/// - `open` only from `Closed`
/// - `send` and `receive` only while `Open`
/// - `close` goes through `Closing` and releases any pending `receive`
#[async_trait]
pub trait HciTransport: Send + Sync {
    /// Short transport name for diagnostics.
    fn name(&self) -> &'static str;

    /// Current lifecycle state.
    fn state(&self) -> LinkState;

    /// Establish the link and start reading.
    async fn open(&self, device: &str, options: &OpenOptions) -> Result<()>;

    /// Stop reading, discard undelivered packets and release the link.
    async fn close(&self) -> Result<()>;

    /// Frame and write one packet. Concurrent sends never interleave.
    async fn send(&self, packet: &Packet) -> Result<()>;

    /// Next reassembled packet in arrival order.
    ///
    /// `Ok(None)` means the link ended (closed or faulted). With a timeout,
    /// fails with [`crate::TransportError::Timeout`] if nothing arrives in time.
    async fn receive(&self, timeout: Option<Duration>) -> Result<Option<Packet>>;
}
