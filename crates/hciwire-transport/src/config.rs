use hciwire_frame::ProtocolErrorPolicy;

use crate::error::{Result, TransportError};

/// Baud rate every serial link is opened at before switching to the
/// operating rate. Never valid as an operating rate.
pub const INIT_BAUDRATE: u32 = 9600;

/// Default size of a single read from the link.
pub const DEFAULT_READ_CHUNK: usize = 4096;

/// Per-open options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Operating baud rate. Required by the serial transport, ignored by TCP.
    pub baudrate: Option<u32>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn baudrate(mut self, baudrate: u32) -> Self {
        self.baudrate = Some(baudrate);
        self
    }

    /// The validated operating baud rate for a serial link.
    pub fn operating_baudrate(&self) -> Result<u32> {
        match self.baudrate {
            None | Some(0) => Err(TransportError::MissingBaudRate),
            Some(INIT_BAUDRATE) => Err(TransportError::ReservedBaudRate(INIT_BAUDRATE)),
            Some(baudrate) => Ok(baudrate),
        }
    }
}

/// Transport-wide settings fixed at construction.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum bytes pulled from the link per read.
    pub read_chunk_size: usize,
    /// What the reader does with an illegal indicator byte.
    pub protocol_errors: ProtocolErrorPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK,
            protocol_errors: ProtocolErrorPolicy::Fatal,
        }
    }
}
