//! Packet hand-off from a reader context to the receiving caller.
//!
//! The producer side is a plain unbounded sender, so it can be driven from
//! an OS thread as well as from a task on the runtime. The consumer side is
//! awaited by `receive()`.

use std::sync::atomic::{AtomicBool, Ordering};

use hciwire_frame::Packet;
use tokio::sync::{mpsc, Mutex};

/// An item travelling through the queue.
#[derive(Debug)]
pub enum Delivery {
    /// A fully reassembled packet.
    Packet(Packet),
    /// The producer stopped; no further packets will arrive.
    Shutdown,
}

/// Create a connected producer/consumer pair.
pub fn packet_queue() -> (QueueProducer, PacketQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        QueueProducer { tx },
        PacketQueue {
            rx: Mutex::new(rx),
            ended: AtomicBool::new(false),
        },
    )
}

/// Producer half, owned by the reader thread or task.
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl QueueProducer {
    /// Enqueue a packet.
    ///
    /// Returns false once the consumer side has been drained and closed.
    pub fn push(&self, packet: Packet) -> bool {
        self.tx.send(Delivery::Packet(packet)).is_ok()
    }

    /// Tell the consumer that no further packets will arrive.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Delivery::Shutdown);
    }
}

/// Consumer half: FIFO of reassembled packets.
#[derive(Debug)]
pub struct PacketQueue {
    rx: Mutex<mpsc::UnboundedReceiver<Delivery>>,
    ended: AtomicBool,
}

impl PacketQueue {
    /// Wait for the next packet.
    ///
    /// Returns `None` once the producer has shut down or gone away. The end
    /// is sticky: every later call also returns `None` immediately.
    pub async fn pop(&self) -> Option<Packet> {
        let mut rx = self.rx.lock().await;
        if self.ended.load(Ordering::Acquire) {
            return None;
        }
        match rx.recv().await {
            Some(Delivery::Packet(packet)) => Some(packet),
            Some(Delivery::Shutdown) | None => {
                self.ended.store(true, Ordering::Release);
                None
            }
        }
    }

    /// End the queue and discard anything still buffered.
    ///
    /// Waits for an in-progress [`PacketQueue::pop`] to finish first. Returns
    /// the number of packets dropped.
    pub async fn drain(&self) -> usize {
        let mut rx = self.rx.lock().await;
        self.ended.store(true, Ordering::Release);
        rx.close();

        let mut dropped = 0;
        while let Ok(delivery) = rx.try_recv() {
            if matches!(delivery, Delivery::Packet(_)) {
                dropped += 1;
            }
        }
        dropped
    }

    /// Returns true once the end of the queue has been observed.
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }
}
