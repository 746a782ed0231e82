use bytes::{BufMut, BytesMut};
use tracing::{trace, warn};

use crate::error::{FrameError, Result};
use crate::indicator::{Direction, Indicator};
use crate::packet::{HciPacket, Packet};

/// Encode a packet into the UART wire format.
///
/// Wire format:
/// ```text
/// ┌───────────────┬──────────────────┬──────────────────┐
/// │ Indicator (1B)│ Header           │ Payload          │
/// │ 0x01 / 0x02   │ (per packet kind)│ (header length)  │
/// └───────────────┴──────────────────┴──────────────────┘
/// ```
///
/// Only commands and ACL data may be sent from the host.
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut) -> Result<()> {
    let indicator = packet.indicator();
    if !indicator.is_legal(Direction::Outbound) {
        return Err(FrameError::InvalidOutbound(indicator));
    }
    let data = packet.data();
    dst.reserve(1 + data.len());
    dst.put_u8(indicator.as_u8());
    dst.put_slice(data);
    Ok(())
}

/// What the decoder does when a frame boundary holds an illegal indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProtocolErrorPolicy {
    /// Abort the chunk and report the error. The receive path is expected to stop.
    #[default]
    Fatal,
    /// Drop the offending byte and keep scanning for the next legal indicator.
    Resync,
}

#[derive(Debug, Default)]
enum RxState {
    #[default]
    Idle,
    Header(Packet),
    Payload(Packet),
}

/// Incremental reassembler for controller-to-host byte streams.
///
/// Feed it whatever the link returns, in order. Every packet completed
/// within a chunk is returned; a trailing partial frame is kept until the
/// next call.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    state: RxState,
    policy: ProtocolErrorPolicy,
    discarded: u64,
}

impl FrameDecoder {
    /// Create a decoder that treats protocol violations as fatal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with an explicit protocol error policy.
    pub fn with_policy(policy: ProtocolErrorPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Decode a chunk and return every packet it completes.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Packet>> {
        let mut out = Vec::new();
        self.decode_into(chunk, &mut out)?;
        Ok(out)
    }

    /// Decode a chunk, appending completed packets to `out`.
    ///
    /// On a protocol error the packets completed before the bad byte are
    /// already in `out`, the rest of the chunk is dropped and the decoder
    /// is back to idle.
    pub fn decode_into(&mut self, chunk: &[u8], out: &mut Vec<Packet>) -> Result<()> {
        let mut rest = chunk;
        loop {
            match std::mem::take(&mut self.state) {
                RxState::Idle => {
                    let Some((&byte, tail)) = rest.split_first() else {
                        return Ok(());
                    };
                    rest = tail;
                    match start_packet(byte) {
                        Ok(packet) => self.state = RxState::Header(packet),
                        Err(err) => match self.policy {
                            ProtocolErrorPolicy::Fatal => return Err(err),
                            ProtocolErrorPolicy::Resync => {
                                self.discarded += 1;
                                warn!(byte, error = %err, "discarding byte at frame boundary");
                            }
                        },
                    }
                }
                RxState::Header(mut packet) => {
                    let target = packet.header_len();
                    if !fill(&mut packet, target, &mut rest) {
                        self.state = RxState::Header(packet);
                        return Ok(());
                    }
                    packet.unpack_header();
                    self.state = RxState::Payload(packet);
                }
                RxState::Payload(mut packet) => {
                    let target = packet.header_len() + packet.payload_len();
                    if !fill(&mut packet, target, &mut rest) {
                        self.state = RxState::Payload(packet);
                        return Ok(());
                    }
                    trace!(
                        indicator = %packet.indicator(),
                        len = packet.data().len(),
                        "packet reassembled"
                    );
                    out.push(packet);
                }
            }
        }
    }

    /// Returns true if no partial packet is held.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, RxState::Idle)
    }

    /// Drop any partial packet.
    pub fn reset(&mut self) {
        self.state = RxState::Idle;
    }

    /// Number of bytes skipped while resynchronizing.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// How this decoder reacts to an illegal indicator.
    pub fn policy(&self) -> ProtocolErrorPolicy {
        self.policy
    }
}

fn start_packet(byte: u8) -> Result<Packet> {
    let indicator = Indicator::parse(byte, Direction::Inbound)?;
    Packet::for_indicator(indicator).ok_or(FrameError::UnexpectedIndicator {
        indicator,
        direction: Direction::Inbound,
    })
}

/// Copy bytes from the front of `rest` until the packet holds `target` bytes.
fn fill(packet: &mut Packet, target: usize, rest: &mut &[u8]) -> bool {
    let needed = target.saturating_sub(packet.data().len());
    let take = needed.min(rest.len());
    let (head, tail) = rest.split_at(take);
    packet.buffer_mut().extend_from_slice(head);
    *rest = tail;
    take == needed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{AclData, Command, Event};

    fn wire(packet: impl Into<Packet>) -> Vec<u8> {
        let packet = packet.into();
        let mut out = vec![packet.indicator().as_u8()];
        out.extend_from_slice(packet.data());
        out
    }

    #[test]
    fn event_with_three_byte_payload() {
        let bytes = [0x04, 0x0E, 0x03, 0x01, 0x02, 0x03];
        let mut decoder = FrameDecoder::new();

        let packets = decoder.decode(&bytes).unwrap();

        assert_eq!(packets.len(), 1);
        let Packet::Event(evt) = &packets[0] else {
            panic!("expected an event, got {:?}", packets[0]);
        };
        assert_eq!(evt.code(), 0x0E);
        assert_eq!(evt.params(), &[0x01, 0x02, 0x03]);
        assert!(decoder.is_idle());
    }

    #[test]
    fn acl_with_empty_payload() {
        let bytes = [0x02, 0x01, 0x20, 0x00, 0x00];
        let mut decoder = FrameDecoder::new();

        let packets = decoder.decode(&bytes).unwrap();

        assert_eq!(packets.len(), 1);
        let Packet::AclData(acl) = &packets[0] else {
            panic!("expected ACL data, got {:?}", packets[0]);
        };
        assert_eq!(acl.handle(), 0x0001);
        assert!(acl.payload().is_empty());
        assert!(decoder.is_idle());
    }

    #[test]
    fn every_split_point_yields_same_packet() {
        let expected = Packet::from(AclData::new(0x0123, 0b10, 0, b"fragmented payload").unwrap());
        let bytes = wire(expected.clone());

        for split in 0..=bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut packets = decoder.decode(&bytes[..split]).unwrap();
            packets.extend(decoder.decode(&bytes[split..]).unwrap());
            assert_eq!(packets, vec![expected.clone()], "split at {split}");
            assert!(decoder.is_idle());
        }
    }

    #[test]
    fn byte_by_byte_reassembly() {
        let expected = Packet::from(Event::new(0x0F, &[0x00, 0x01, 0x05, 0x04]).unwrap());
        let bytes = wire(expected.clone());
        let mut decoder = FrameDecoder::new();

        let mut packets = Vec::new();
        for (i, byte) in bytes.iter().enumerate() {
            decoder.decode_into(std::slice::from_ref(byte), &mut packets).unwrap();
            if i + 1 < bytes.len() {
                assert!(packets.is_empty());
                assert!(!decoder.is_idle());
            }
        }

        assert_eq!(packets, vec![expected]);
    }

    #[test]
    fn two_frames_in_one_chunk() {
        let first = Packet::from(Event::new(0x0E, &[0x01, 0x03, 0x0C, 0x00]).unwrap());
        let second = Packet::from(AclData::new(0x0040, 0b10, 0, b"hi").unwrap());
        let mut bytes = wire(first.clone());
        bytes.extend(wire(second.clone()));

        let packets = FrameDecoder::new().decode(&bytes).unwrap();

        assert_eq!(packets, vec![first, second]);
    }

    #[test]
    fn trailing_partial_frame_is_kept() {
        let first = Packet::from(Event::new(0x13, &[0x01]).unwrap());
        let second = Packet::from(Event::new(0x3E, &[0x02, 0x01, 0x00]).unwrap());
        let mut bytes = wire(first.clone());
        let tail = wire(second.clone());
        bytes.extend_from_slice(&tail[..3]);

        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.decode(&bytes).unwrap(), vec![first]);
        assert!(!decoder.is_idle());
        assert_eq!(decoder.decode(&tail[3..]).unwrap(), vec![second]);
    }

    #[test]
    fn unknown_indicator_is_protocol_error() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.decode(&[0x07, 0x0E, 0x00]).unwrap_err();

        assert!(matches!(err, FrameError::InvalidIndicator(0x07)));
        assert!(decoder.is_idle());
    }

    #[test]
    fn command_indicator_rejected_inbound() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.decode(&[0x01, 0x03, 0x0C, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::UnexpectedIndicator {
                indicator: Indicator::Command,
                direction: Direction::Inbound,
            }
        ));
    }

    #[test]
    fn packets_before_bad_indicator_are_kept() {
        let good = Packet::from(Event::new(0x0E, &[0x01]).unwrap());
        let mut bytes = wire(good.clone());
        bytes.extend_from_slice(&[0x03, 0x00, 0x00]);

        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        let err = decoder.decode_into(&bytes, &mut out).unwrap_err();

        assert!(matches!(
            err,
            FrameError::UnexpectedIndicator {
                indicator: Indicator::Sco,
                ..
            }
        ));
        assert_eq!(out, vec![good]);
        assert!(decoder.is_idle());
    }

    #[test]
    fn resync_skips_garbage() {
        let good = Packet::from(Event::new(0x0E, &[0x01, 0x02]).unwrap());
        let mut bytes = vec![0xFF, 0x00, 0x07];
        bytes.extend(wire(good.clone()));

        let mut decoder = FrameDecoder::with_policy(ProtocolErrorPolicy::Resync);
        assert_eq!(decoder.policy(), ProtocolErrorPolicy::Resync);
        assert_eq!(FrameDecoder::new().policy(), ProtocolErrorPolicy::Fatal);
        let packets = decoder.decode(&bytes).unwrap();

        assert_eq!(packets, vec![good]);
        assert_eq!(decoder.discarded(), 3);
    }

    #[test]
    fn reset_drops_partial_packet() {
        let mut decoder = FrameDecoder::new();
        decoder.decode(&[0x04, 0x0E]).unwrap();
        assert!(!decoder.is_idle());

        decoder.reset();
        assert!(decoder.is_idle());

        let packets = decoder.decode(&[0x04, 0x0E, 0x00]).unwrap();
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn encode_prepends_indicator() {
        let mut buf = BytesMut::new();
        encode_packet(&Command::new(0x0C03, &[]).unwrap().into(), &mut buf).unwrap();
        encode_packet(&AclData::new(0x0001, 0, 0, &[0xAA]).unwrap().into(), &mut buf).unwrap();

        assert_eq!(
            buf.as_ref(),
            &[0x01, 0x03, 0x0C, 0x00, 0x02, 0x01, 0x00, 0x01, 0x00, 0xAA]
        );
    }

    #[test]
    fn encode_rejects_event() {
        let mut buf = BytesMut::new();
        let err = encode_packet(&Event::new(0x0E, &[]).unwrap().into(), &mut buf).unwrap_err();

        assert!(matches!(err, FrameError::InvalidOutbound(Indicator::Event)));
        assert!(buf.is_empty());
    }

    #[test]
    fn encoded_acl_decodes() {
        let acl = Packet::from(AclData::new(0x0ABC, 0b01, 0, &[1, 2, 3, 4]).unwrap());
        let mut buf = BytesMut::new();
        encode_packet(&acl, &mut buf).unwrap();

        let packets = FrameDecoder::new().decode(&buf).unwrap();
        assert_eq!(packets, vec![acl]);
    }
}
