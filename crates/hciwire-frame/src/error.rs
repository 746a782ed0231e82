use crate::indicator::{Direction, Indicator};

/// Errors that can occur while framing or reassembling HCI packets.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The byte at a frame boundary is not a known packet indicator.
    #[error("invalid packet indicator 0x{0:02x}")]
    InvalidIndicator(u8),

    /// The indicator is known but not legal in this direction.
    #[error("unexpected {indicator} indicator on the {direction} path")]
    UnexpectedIndicator {
        indicator: Indicator,
        direction: Direction,
    },

    /// The packet cannot be sent from host to controller.
    #[error("invalid outbound packet type: {0}")]
    InvalidOutbound(Indicator),

    /// The payload does not fit the length field of the packet header.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
