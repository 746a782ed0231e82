//! Passive packet observers.
//!
//! Transports report every packet that crosses the link: inbound packets at
//! the moment they are reassembled, outbound packets right before they are
//! written.

use std::fmt::Write as _;

use hciwire_frame::{HciPacket, Packet};

/// Sink for packets crossing the transport. Both hooks default to no-ops.
pub trait Monitor: Send + Sync {
    /// Called from the reader context for each reassembled packet.
    fn feed_rx(&self, _packet: &Packet) {}

    /// Called for each packet about to be written.
    fn feed_tx(&self, _packet: &Packet) {}
}

/// Monitor that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitor;

impl Monitor for NullMonitor {}

/// Monitor that logs every packet at `trace` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMonitor;

impl Monitor for TracingMonitor {
    fn feed_rx(&self, packet: &Packet) {
        tracing::trace!(
            target: "hciwire::monitor",
            dir = ">",
            kind = %packet.indicator(),
            data = %hex_dump(packet.data()),
            "rx packet"
        );
    }

    fn feed_tx(&self, packet: &Packet) {
        tracing::trace!(
            target: "hciwire::monitor",
            dir = "<",
            kind = %packet.indicator(),
            data = %hex_dump(packet.data()),
            "tx packet"
        );
    }
}

/// Render bytes as dash-separated lowercase hex (`01-03-0c-00`).
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push('-');
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}
