use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use hciwire_frame::Packet;

use crate::error::{Result, TransportError};
use crate::queue::PacketQueue;

/// Connection state shared by every transport.
///
/// `Closed → Open → Closing → Closed`. A reader fault jumps straight from
/// `Open` back to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Closed = 0,
    Open = 1,
    Closing = 2,
}

impl LinkState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LinkState::Open,
            2 => LinkState::Closing,
            _ => LinkState::Closed,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Closed => f.write_str("closed"),
            LinkState::Open => f.write_str("open"),
            LinkState::Closing => f.write_str("closing"),
        }
    }
}

/// Atomic [`LinkState`] readable from the reader context.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(LinkState::Closed as u8))
    }

    pub(crate) fn get(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: LinkState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to`; false if the state was something else.
    pub(crate) fn transition(&self, from: LinkState, to: LinkState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn require(&self, expected: LinkState, op: &'static str) -> Result<()> {
        let state = self.get();
        if state == expected {
            Ok(())
        } else {
            Err(TransportError::InvalidState { op, state })
        }
    }
}

/// State machine and receive queue common to all transports.
///
/// Session resources (device, socket, reader) stay with the transport
/// behind its write lock; this only tracks what `receive()` needs.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: Arc<StateCell>,
    queue: Mutex<Option<Arc<PacketQueue>>>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(StateCell::new()),
            queue: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> LinkState {
        self.state.get()
    }

    /// Handle for the reader context, which marks the link closed on a fault.
    pub(crate) fn state_cell(&self) -> Arc<StateCell> {
        Arc::clone(&self.state)
    }

    pub(crate) fn require(&self, expected: LinkState, op: &'static str) -> Result<()> {
        self.state.require(expected, op)
    }

    /// Install the session queue and mark the link open.
    pub(crate) fn activate(&self, queue: Arc<PacketQueue>) {
        *self.slot() = Some(queue);
        self.state.set(LinkState::Open);
    }

    /// Start closing.
    ///
    /// Returns true when moving out of `Open`, false when already closed
    /// (never opened, or the reader faulted).
    pub(crate) fn begin_close(&self) -> Result<bool> {
        if self.state.transition(LinkState::Open, LinkState::Closing) {
            return Ok(true);
        }
        match self.state.get() {
            LinkState::Closed => Ok(false),
            state => Err(TransportError::InvalidState { op: "close", state }),
        }
    }

    /// Drain the session queue and mark the link closed.
    ///
    /// Returns the number of undelivered packets discarded.
    pub(crate) async fn finish_close(&self) -> usize {
        let queue = self.slot().take();
        let discarded = match queue {
            Some(queue) => queue.drain().await,
            None => 0,
        };
        self.state.set(LinkState::Closed);
        discarded
    }

    /// Pop the next packet, or `None` at end of transport.
    pub(crate) async fn receive(&self, timeout: Option<Duration>) -> Result<Option<Packet>> {
        self.require(LinkState::Open, "receive")?;
        let queue = self.slot().clone().ok_or(TransportError::InvalidState {
            op: "receive",
            state: self.state(),
        })?;

        match timeout {
            None => Ok(queue.pop().await),
            Some(limit) => tokio::time::timeout(limit, queue.pop())
                .await
                .map_err(|_| TransportError::Timeout(limit)),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<PacketQueue>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
