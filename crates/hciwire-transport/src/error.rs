use std::time::Duration;

use hciwire_frame::FrameError;

use crate::lifecycle::LinkState;

/// Errors that can occur in HCI transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The serial transport was opened without an operating baud rate.
    #[error("missing baudrate")]
    MissingBaudRate,

    /// The requested baud rate is the one used to initialize the link.
    #[error("invalid baudrate {0}: reserved for link initialization")]
    ReservedBaudRate(u32),

    /// The network address is not `host:port`.
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress {
        address: String,
        reason: &'static str,
    },

    /// The operation is not allowed in the current lifecycle state.
    #[error("cannot {op} while transport is {state}")]
    InvalidState { op: &'static str, state: LinkState },

    /// The packet could not be framed.
    #[error("protocol error: {0}")]
    Protocol(#[from] FrameError),

    /// Failed to open the serial device.
    #[error("failed to open {device}: {source}")]
    Open {
        device: String,
        source: std::io::Error,
    },

    /// Failed to connect to the network address.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the device or socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No packet arrived before the receive deadline.
    #[error("receive timed out after {0:?}")]
    Timeout(Duration),
}

/// Broad classification of [`TransportError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required option is missing or invalid.
    Config,
    /// The call is not valid in the current lifecycle state.
    ConnectionState,
    /// An indicator byte is unknown or illegal for its direction.
    Protocol,
    /// The device or socket failed.
    Io,
    /// A receive deadline expired.
    Timeout,
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::MissingBaudRate
            | TransportError::ReservedBaudRate(_)
            | TransportError::InvalidAddress { .. } => ErrorKind::Config,
            TransportError::InvalidState { .. } => ErrorKind::ConnectionState,
            TransportError::Protocol(_) => ErrorKind::Protocol,
            TransportError::Open { .. } | TransportError::Connect { .. } | TransportError::Io(_) => {
                ErrorKind::Io
            }
            TransportError::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
