//! HCI over a TCP socket (an H4 stream tunnelled through the network).
//!
//! Inbound bytes are read by a task on the runtime, so no extra thread is
//! needed and the decoder is fed directly from the socket.

use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use hciwire_frame::{encode_packet, FrameDecoder, Packet};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{OpenOptions, TransportConfig};
use crate::error::{Result, TransportError};
use crate::lifecycle::{Lifecycle, LinkState, StateCell};
use crate::monitor::{hex_dump, Monitor, NullMonitor};
use crate::queue::{packet_queue, QueueProducer};
use crate::traits::HciTransport;

/// Split `host:port`. IPv6 hosts may be bracketed (`[::1]:9000`).
pub fn parse_address(address: &str) -> Result<(String, u16)> {
    let invalid = |reason| TransportError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| invalid("expected host:port"))?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
    Ok((host.to_string(), port))
}

struct TcpSession {
    address: String,
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
    cancel: CancellationToken,
}

impl TcpSession {
    async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Err(err) = self.reader.await {
            warn!(address = %self.address, error = %err, "rx task ended abnormally");
        }
        if let Err(err) = self.writer.shutdown().await {
            debug!(address = %self.address, error = %err, "socket shutdown failed");
        }
    }
}

/// HCI transport over an outbound TCP connection.
pub struct TcpTransport {
    monitor: Arc<dyn Monitor>,
    config: TransportConfig,
    lifecycle: Lifecycle,
    /// Write-serialization lock; also guards open/close. A write owns the
    /// guard until the whole frame is on the socket.
    io: Arc<Mutex<Option<TcpSession>>>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
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

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HciTransport for TcpTransport {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn state(&self) -> LinkState {
        self.lifecycle.state()
    }

    async fn open(&self, device: &str, _options: &OpenOptions) -> Result<()> {
        let mut slot = self.io.lock().await;
        self.lifecycle.require(LinkState::Closed, "open")?;
        let (host, port) = parse_address(device)?;

        if let Some(stale) = slot.take() {
            debug!(address = %stale.address, "reaping faulted session");
            stale.shutdown().await;
        }

        info!(%host, port, "opening TCP connection");
        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|source| TransportError::Connect {
                address: device.to_string(),
                source,
            })?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!(error = %err, "failed to disable Nagle");
        }
        let (read_half, writer) = stream.into_split();

        let (producer, queue) = packet_queue();
        self.lifecycle.activate(Arc::new(queue));

        let cancel = CancellationToken::new();
        let rx = RxTask {
            address: device.to_string(),
            socket: read_half,
            producer,
            state: self.lifecycle.state_cell(),
            monitor: Arc::clone(&self.monitor),
            config: self.config.clone(),
            cancel: cancel.clone(),
        };
        let reader = tokio::spawn(rx.run());

        *slot = Some(TcpSession {
            address: device.to_string(),
            writer,
            reader,
            cancel,
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut slot = self.io.lock().await;
        let was_open = self.lifecycle.begin_close()?;

        if let Some(session) = slot.take() {
            info!(address = %session.address, "closing TCP connection");
            session.shutdown().await;
        }
        let discarded = self.lifecycle.finish_close().await;
        if was_open || discarded > 0 {
            debug!(discarded, "tcp transport closed");
        }
        Ok(())
    }

    async fn send(&self, packet: &Packet) -> Result<()> {
        self.lifecycle.require(LinkState::Open, "send")?;
        let mut slot = Arc::clone(&self.io).lock_owned().await;
        self.lifecycle.require(LinkState::Open, "send")?;
        let address = match slot.as_ref() {
            Some(session) => session.address.clone(),
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

        // write_all is not cancel safe; a detached task finishes the frame
        // even if the caller goes away.
        let written = tokio::spawn(async move {
            let session = slot
                .as_mut()
                .ok_or_else(|| io::Error::from(ErrorKind::NotConnected))?;
            session.writer.write_all(&buf).await?;
            session.writer.flush().await
        })
        .await
        .map_err(|err| TransportError::Io(io::Error::other(err)))?;

        written.map_err(|err| {
            error!(address = %address, error = %err, "tx exception");
            TransportError::Io(err)
        })
    }

    async fn receive(&self, timeout: Option<Duration>) -> Result<Option<Packet>> {
        self.lifecycle.receive(timeout).await
    }
}

/// Everything the reader task owns.
struct RxTask {
    address: String,
    socket: OwnedReadHalf,
    producer: QueueProducer,
    state: Arc<StateCell>,
    monitor: Arc<dyn Monitor>,
    config: TransportConfig,
    cancel: CancellationToken,
}

impl RxTask {
    async fn run(mut self) {
        debug!(address = %self.address, "rx task started");

        if let Err(err) = self.read_loop().await {
            error!(address = %self.address, error = %err, "rx exception");
        }
        if self.state.transition(LinkState::Open, LinkState::Closed) {
            warn!(address = %self.address, "receive path faulted; transport closed");
        }
        self.producer.shutdown();

        debug!(address = %self.address, "rx task exited");
    }

    async fn read_loop(&mut self) -> Result<()> {
        let mut decoder = FrameDecoder::with_policy(self.config.protocol_errors);
        let mut buf = vec![0u8; self.config.read_chunk_size.max(1)];
        let mut packets = Vec::new();

        loop {
            let read = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                read = self.socket.read(&mut buf) => read?,
            };
            if read == 0 {
                return Err(io::Error::from(ErrorKind::UnexpectedEof).into());
            }
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
    }
}

#[cfg(test)]
mod tests {
    use hciwire_frame::{AclData, Command, Event, HciPacket};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::error::ErrorKind as TransportErrorKind;

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        (listener, address)
    }

    #[test]
    fn address_parsing() {
        assert_eq!(
            parse_address("localhost:9000").unwrap(),
            ("localhost".to_string(), 9000)
        );
        assert_eq!(
            parse_address("[::1]:45000").unwrap(),
            ("::1".to_string(), 45000)
        );

        for bad in ["localhost", ":9000", "host:port", "host:70000"] {
            let err = parse_address(bad).unwrap_err();
            assert_eq!(err.kind(), TransportErrorKind::Config, "{bad}");
        }
    }

    #[tokio::test]
    async fn malformed_address_is_config_error() {
        let transport = TcpTransport::new();
        let err = transport
            .open("no-port", &OpenOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidAddress { .. }));
        assert_eq!(transport.state(), LinkState::Closed);
    }

    #[tokio::test]
    async fn exchange_with_controller() {
        let (listener, address) = listener().await;
        let controller = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut cmd = [0u8; 4];
            socket.read_exact(&mut cmd).await.unwrap();
            assert_eq!(cmd, [0x01, 0x03, 0x0C, 0x00]);
            socket
                .write_all(&[0x04, 0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00])
                .await
                .unwrap();
            socket
        });

        let transport = TcpTransport::new();
        transport.open(&address, &OpenOptions::new()).await.unwrap();
        transport
            .send(&Command::new(0x0C03, &[]).unwrap().into())
            .await
            .unwrap();

        let packet = transport
            .receive(Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(
            packet,
            Some(Packet::from(Event::new(0x0E, &[0x01, 0x03, 0x0C, 0x00]).unwrap()))
        );

        let _socket = controller.await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn fragmented_stream_reassembles() {
        let (listener, address) = listener().await;
        let controller = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let wire = [0x02, 0x05, 0x00, 0x03, 0x00, 0xAA, 0xBB, 0xCC, 0x04, 0x13, 0x00];
            for byte in wire {
                socket.write_all(&[byte]).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            socket
        });

        let transport = TcpTransport::new();
        transport.open(&address, &OpenOptions::new()).await.unwrap();

        let first = transport
            .receive(Some(Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();
        let second = transport
            .receive(Some(Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.payload(), &[0xAA, 0xBB, 0xCC]);
        assert_eq!(second.data(), &[0x13, 0x00]);

        let _socket = controller.await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_sends_do_not_interleave() {
        let (listener, address) = listener().await;
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let transport = Arc::new(TcpTransport::new());
        transport.open(&address, &OpenOptions::new()).await.unwrap();
        let (mut conn, _) = accept.await.unwrap();

        let mut tasks = Vec::new();
        for id in 0..8u8 {
            let transport = Arc::clone(&transport);
            tasks.push(tokio::spawn(async move {
                let packet = Packet::from(AclData::new(u16::from(id), 0, 0, &[id; 3000]).unwrap());
                transport.send(&packet).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let frame_len = 1 + AclData::HEADER_LEN + 3000;
        let mut wire = vec![0u8; frame_len * 8];
        conn.read_exact(&mut wire).await.unwrap();

        let packets = FrameDecoder::new().decode(&wire).unwrap();
        assert_eq!(packets.len(), 8);
        let mut seen = Vec::new();
        for packet in packets {
            let Packet::AclData(acl) = packet else {
                panic!("expected ACL data");
            };
            let id = acl.handle() as u8;
            assert!(acl.payload().iter().all(|b| *b == id), "bytes interleaved");
            seen.push(id);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<u8>>());

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_send_never_tears_a_frame() {
        let (listener, address) = listener().await;
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let transport = TcpTransport::new();
        transport.open(&address, &OpenOptions::new()).await.unwrap();
        let (mut conn, _) = accept.await.unwrap();

        // The peer does not read yet, so the socket buffers fill up.
        let bulk = Packet::from(AclData::new(0x001, 0, 0, &[0x5A; 60_000]).unwrap());
        let mut completed = 0usize;
        let mut cancelled = false;
        for _ in 0..512 {
            match tokio::time::timeout(Duration::from_millis(200), transport.send(&bulk)).await {
                Ok(result) => {
                    result.unwrap();
                    completed += 1;
                }
                Err(_) => {
                    cancelled = true;
                    break;
                }
            }
        }
        assert!(cancelled, "send never blocked");

        let frame_len = 1 + AclData::HEADER_LEN + 60_000;
        let expected = frame_len * (completed + 1) + 4;
        let drain = tokio::spawn(async move {
            let mut wire = vec![0u8; expected];
            conn.read_exact(&mut wire).await.unwrap();
            (conn, wire)
        });

        let reset = Packet::from(Command::new(0x0C03, &[]).unwrap());
        tokio::time::timeout(Duration::from_secs(5), transport.send(&reset))
            .await
            .expect("send should not hang")
            .unwrap();
        assert_eq!(transport.state(), LinkState::Open);

        let (_conn, wire) = drain.await.unwrap();
        let (bulk_wire, tail) = wire.split_at(wire.len() - 4);
        assert_eq!(tail, &[0x01, 0x03, 0x0C, 0x00]);
        let packets = FrameDecoder::new().decode(bulk_wire).unwrap();
        assert_eq!(packets.len(), completed + 1);
        assert!(packets.iter().all(|p| p.payload().len() == 60_000));

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn second_open_fails() {
        let (listener, address) = listener().await;
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let transport = TcpTransport::new();
        transport.open(&address, &OpenOptions::new()).await.unwrap();
        let err = transport
            .open(&address, &OpenOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::ConnectionState);

        let _conn = accept.await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_releases_pending_receive() {
        let (listener, address) = listener().await;
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let transport = Arc::new(TcpTransport::new());
        transport.open(&address, &OpenOptions::new()).await.unwrap();
        let _conn = accept.await.unwrap();

        let pending = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.receive(None).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        transport.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .expect("receive should be released")
            .unwrap();
        assert!(matches!(result, Ok(None)));
        assert_eq!(
            transport.receive(None).await.unwrap_err().kind(),
            TransportErrorKind::ConnectionState
        );
    }

    #[tokio::test]
    async fn peer_disconnect_ends_transport() {
        let (listener, address) = listener().await;
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let transport = Arc::new(TcpTransport::new());
        transport.open(&address, &OpenOptions::new()).await.unwrap();
        let (conn, _) = accept.await.unwrap();

        let pending = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.receive(Some(Duration::from_secs(5))).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(conn);

        assert!(matches!(pending.await.unwrap(), Ok(None)));
        assert_eq!(transport.state(), LinkState::Closed);
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn receive_timeout_keeps_link_open() {
        let (listener, address) = listener().await;
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let transport = TcpTransport::new();
        transport.open(&address, &OpenOptions::new()).await.unwrap();
        let _conn = accept.await.unwrap();

        let err = transport
            .receive(Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Timeout);
        assert_eq!(transport.state(), LinkState::Open);

        transport.close().await.unwrap();
    }
}
