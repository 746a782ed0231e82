//! HCI over a UART (H4) link.
//!
//! The device is read by a dedicated OS thread that blocks indefinitely and
//! hands reassembled packets to the runtime through the packet queue.
//! Writes run on the blocking pool, one at a time.

use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use hciwire_frame::{encode_packet, FrameDecoder, Packet};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits, TTYPort};
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::config::{OpenOptions, TransportConfig, INIT_BAUDRATE};
use crate::error::{Result, TransportError};
use crate::lifecycle::{Lifecycle, LinkState, StateCell};
use crate::monitor::{hex_dump, Monitor, NullMonitor};
use crate::queue::{packet_queue, QueueProducer};
use crate::traits::HciTransport;
use crate::wake::{cancel_pair, CancelSignal, ReadCanceller, Readiness};

/// Longest timeout the line driver accepts; effectively no timeout.
pub const LINE_TIMEOUT: Duration = Duration::from_millis(i32::MAX as u64);

/// Line parameters handed to a [`LinkOpener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    pub timeout: Duration,
}

impl LineSettings {
    /// The only line setup used for HCI: 8N1 with RTS/CTS and no timeout.
    pub fn hci_uart(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::Hardware,
            timeout: LINE_TIMEOUT,
        }
    }
}

/// An open serial line.
pub trait SerialLink: Read + Write + AsRawFd + Send {
    /// Switch the line to a new baud rate.
    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()>;

    /// Discard anything the driver has buffered but not yet delivered.
    fn clear_input(&mut self) -> io::Result<()>;

    /// Second handle on the same line, for the reader thread.
    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>>;
}

/// Opens serial devices.
pub trait LinkOpener: Send + Sync {
    fn open(&self, device: &str, settings: &LineSettings) -> io::Result<Box<dyn SerialLink>>;
}

/// [`LinkOpener`] backed by the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortOpener;

impl LinkOpener for SerialPortOpener {
    fn open(&self, device: &str, settings: &LineSettings) -> io::Result<Box<dyn SerialLink>> {
        let port = serialport::new(device, settings.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .flow_control(settings.flow_control)
            .timeout(settings.timeout)
            .open_native()?;
        Ok(Box::new(port))
    }
}

impl SerialLink for TTYPort {
    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        SerialPort::set_baud_rate(self, baud_rate).map_err(Into::into)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(Into::into)
    }

    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>> {
        Ok(Box::new(self.try_clone_native()?))
    }
}

struct SerialSession {
    device: String,
    writer: Box<dyn SerialLink>,
    reader: Option<JoinHandle<()>>,
    canceller: ReadCanceller,
}

impl SerialSession {
    /// Stop the reader thread, wait for it, then release the device.
    async fn shutdown(mut self) {
        self.canceller.cancel();
        if let Some(handle) = self.reader.take() {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => warn!(device = %self.device, "rx thread panicked"),
                Err(err) => warn!(device = %self.device, error = %err, "failed to join rx thread"),
            }
        }
        // Dropping the last handle closes the device.
        drop(self.writer);
    }
}

/// HCI transport over a serial device.
pub struct SerialTransport {
    opener: Arc<dyn LinkOpener>,
    monitor: Arc<dyn Monitor>,
    config: TransportConfig,
    lifecycle: Lifecycle,
    /// Write-serialization lock; also guards open/close. A write owns the
    /// guard until the device accepts the whole frame.
    io: Arc<Mutex<Option<SerialSession>>>,
}

impl SerialTransport {
    /// Transport using real serial devices and default settings.
    pub fn new() -> Self {
        Self::with_opener(Arc::new(SerialPortOpener))
    }

    /// Transport using a custom device opener.
    pub fn with_opener(opener: Arc<dyn LinkOpener>) -> Self {
        Self {
            opener,
            monitor: Arc::new(NullMonitor),
            config: TransportConfig::default(),
            lifecycle: Lifecycle::new(),
            io: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = monitor;
        self
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HciTransport for SerialTransport {
    fn name(&self) -> &'static str {
        "uart"
    }

    fn state(&self) -> LinkState {
        self.lifecycle.state()
    }

    async fn open(&self, device: &str, options: &OpenOptions) -> Result<()> {
        let mut slot = self.io.lock().await;
        self.lifecycle.require(LinkState::Closed, "open")?;
        let baudrate = options.operating_baudrate()?;

        if let Some(stale) = slot.take() {
            debug!(device = %stale.device, "reaping faulted session");
            stale.shutdown().await;
        }

        info!(device, baudrate, "opening serial port device");
        let opener = Arc::clone(&self.opener);
        let dev = device.to_string();
        let (writer, reader_link) = tokio::task::spawn_blocking(move || {
            open_link(opener.as_ref(), &dev, baudrate)
                .map_err(|source| TransportError::Open { device: dev, source })
        })
        .await
        .map_err(|err| TransportError::Io(io::Error::other(err)))??;

        let (canceller, signal) = cancel_pair()?;
        let (producer, queue) = packet_queue();
        self.lifecycle.activate(Arc::new(queue));

        let reader = RxThread {
            device: device.to_string(),
            link: reader_link,
            signal,
            producer,
            state: self.lifecycle.state_cell(),
            monitor: Arc::clone(&self.monitor),
            config: self.config.clone(),
        };
        let handle = thread::Builder::new()
            .name("hciwire-rx".to_string())
            .spawn(move || reader.run());
        let handle = match handle {
            Ok(handle) => handle,
            Err(err) => {
                self.lifecycle.finish_close().await;
                return Err(err.into());
            }
        };

        *slot = Some(SerialSession {
            device: device.to_string(),
            writer,
            reader: Some(handle),
            canceller,
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut slot = self.io.lock().await;
        let was_open = self.lifecycle.begin_close()?;

        if let Some(session) = slot.take() {
            info!(device = %session.device, "closing serial port device");
            session.shutdown().await;
        }
        let discarded = self.lifecycle.finish_close().await;
        if was_open || discarded > 0 {
            debug!(discarded, "serial transport closed");
        }
        Ok(())
    }

    async fn send(&self, packet: &Packet) -> Result<()> {
        self.lifecycle.require(LinkState::Open, "send")?;
        let mut slot = Arc::clone(&self.io).lock_owned().await;
        // close() may have run while we waited for the lock.
        self.lifecycle.require(LinkState::Open, "send")?;
        let device = match slot.as_ref() {
            Some(session) => session.device.clone(),
            None => {
                return Err(TransportError::InvalidState {
                    op: "send",
                    state: LinkState::Closed,
                })
            }
        };

        let mut buf = BytesMut::new();
        encode_packet(packet, &mut buf)?;
        self.monitor.feed_tx(packet);
        debug!(len = buf.len(), data = %hex_dump(&buf), "writing");

        // The blocking task owns the guard, so a cancelled caller cannot
        // release the lock or lose the writer while the frame is going out.
        let written = tokio::task::spawn_blocking(move || match slot.as_mut() {
            Some(session) => write_frame(&mut *session.writer, &buf),
            None => Err(io::Error::from(ErrorKind::NotConnected)),
        })
        .await
        .map_err(|err| TransportError::Io(io::Error::other(err)))?;

        written.map_err(|err| {
            error!(device = %device, error = %err, "tx exception");
            TransportError::Io(err)
        })
    }

    async fn receive(&self, timeout: Option<Duration>) -> Result<Option<Packet>> {
        self.lifecycle.receive(timeout).await
    }
}

/// Open at the initialization rate, then switch to the operating rate.
///
/// Some on-board debug probes only enable RTS/CTS after they see the baud
/// rate change.
fn open_link(
    opener: &dyn LinkOpener,
    device: &str,
    baudrate: u32,
) -> io::Result<(Box<dyn SerialLink>, Box<dyn SerialLink>)> {
    let mut link = opener.open(device, &LineSettings::hci_uart(INIT_BAUDRATE))?;
    link.set_baud_rate(baudrate)?;
    let reader = link.try_clone_link()?;
    Ok((link, reader))
}

fn write_frame(link: &mut dyn SerialLink, bytes: &[u8]) -> io::Result<()> {
    link.write_all(bytes)?;
    link.flush()
}

/// Everything the reader thread owns.
struct RxThread {
    device: String,
    link: Box<dyn SerialLink>,
    signal: CancelSignal,
    producer: QueueProducer,
    state: Arc<StateCell>,
    monitor: Arc<dyn Monitor>,
    config: TransportConfig,
}

impl RxThread {
    fn run(mut self) {
        debug!(device = %self.device, "rx thread started");

        if let Err(err) = self.read_loop() {
            error!(device = %self.device, error = %err, "rx exception");
        }
        if self.state.transition(LinkState::Open, LinkState::Closed) {
            warn!(device = %self.device, "receive path faulted; transport closed");
        }
        // The public receive path is now disabled.
        self.producer.shutdown();

        debug!(device = %self.device, "rx thread exited");
    }

    fn read_loop(&mut self) -> Result<()> {
        self.link.clear_input()?;

        let mut decoder = FrameDecoder::with_policy(self.config.protocol_errors);
        let mut buf = vec![0u8; self.config.read_chunk_size.max(1)];
        let mut packets = Vec::new();

        while self.state.get() == LinkState::Open {
            match self.signal.wait_readable(self.link.as_raw_fd()) {
                Ok(Readiness::Cancelled) => return Ok(()),
                Ok(Readiness::Readable) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }

            let read = match self.link.read(&mut buf) {
                Ok(0) => return Err(io::Error::from(ErrorKind::UnexpectedEof).into()),
                Ok(n) => n,
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                    ) =>
                {
                    continue
                }
                Err(err) => return Err(err.into()),
            };
            trace!(len = read, data = %hex_dump(&buf[..read]), "read");

            let decoded = decoder.decode_into(&buf[..read], &mut packets);
            for packet in packets.drain(..) {
                self.monitor.feed_rx(&packet);
                if !self.producer.push(packet) {
                    return Ok(());
                }
            }
            decoded?;
        }
        Ok(())
    }
}
