use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::indicator::Indicator;

/// Header contract shared by every HCI packet variant.
///
/// The frame decoder only knows that a packet has a fixed-size header, that
/// the header must be parsed once it is complete, and that parsing yields
/// the number of payload bytes still to read. Everything else about the
/// packet layout stays inside the variant.
pub trait HciPacket {
    /// The indicator written in front of this packet on the wire.
    fn indicator(&self) -> Indicator;

    /// Fixed header size, known before any byte is seen.
    fn header_len(&self) -> usize;

    /// Parse the accumulated header bytes.
    ///
    /// Must be called exactly once, after `header_len()` bytes are buffered.
    fn unpack_header(&mut self);

    /// Payload size declared by the header.
    ///
    /// Zero until [`HciPacket::unpack_header`] has run on a decoded packet.
    fn payload_len(&self) -> usize;

    /// Header and payload bytes accumulated so far.
    fn data(&self) -> &[u8];

    /// Growable buffer the decoder appends to.
    fn buffer_mut(&mut self) -> &mut BytesMut;
}

/// HCI command packet (host to controller).
///
/// Header: opcode (2B LE) + parameter length (1B).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    data: BytesMut,
    payload_len: usize,
}

impl Command {
    pub const HEADER_LEN: usize = 3;
    pub const MAX_PARAMS: usize = u8::MAX as usize;

    /// Build a command from an opcode and its parameters.
    pub fn new(opcode: u16, params: &[u8]) -> Result<Self> {
        if params.len() > Self::MAX_PARAMS {
            return Err(FrameError::PayloadTooLarge {
                size: params.len(),
                max: Self::MAX_PARAMS,
            });
        }
        let mut data = BytesMut::with_capacity(Self::HEADER_LEN + params.len());
        data.put_u16_le(opcode);
        data.put_u8(params.len() as u8);
        data.put_slice(params);
        Ok(Self {
            data,
            payload_len: params.len(),
        })
    }

    pub(crate) fn empty() -> Self {
        Self {
            data: BytesMut::with_capacity(Self::HEADER_LEN),
            payload_len: 0,
        }
    }

    pub fn opcode(&self) -> u16 {
        u16::from_le_bytes([self.data[0], self.data[1]])
    }

    pub fn params(&self) -> &[u8] {
        &self.data[Self::HEADER_LEN..]
    }
}

impl HciPacket for Command {
    fn indicator(&self) -> Indicator {
        Indicator::Command
    }

    fn header_len(&self) -> usize {
        Self::HEADER_LEN
    }

    fn unpack_header(&mut self) {
        self.payload_len = usize::from(self.data[2]);
        self.data.reserve(self.payload_len);
    }

    fn payload_len(&self) -> usize {
        self.payload_len
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.data
    }
}

/// HCI event packet (controller to host).
///
/// Header: event code (1B) + parameter length (1B).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    data: BytesMut,
    payload_len: usize,
}

impl Event {
    pub const HEADER_LEN: usize = 2;
    pub const MAX_PARAMS: usize = u8::MAX as usize;

    /// Build an event from its code and parameters.
    pub fn new(code: u8, params: &[u8]) -> Result<Self> {
        if params.len() > Self::MAX_PARAMS {
            return Err(FrameError::PayloadTooLarge {
                size: params.len(),
                max: Self::MAX_PARAMS,
            });
        }
        let mut data = BytesMut::with_capacity(Self::HEADER_LEN + params.len());
        data.put_u8(code);
        data.put_u8(params.len() as u8);
        data.put_slice(params);
        Ok(Self {
            data,
            payload_len: params.len(),
        })
    }

    pub(crate) fn empty() -> Self {
        Self {
            data: BytesMut::with_capacity(Self::HEADER_LEN),
            payload_len: 0,
        }
    }

    pub fn code(&self) -> u8 {
        self.data[0]
    }

    pub fn params(&self) -> &[u8] {
        &self.data[Self::HEADER_LEN..]
    }
}

impl HciPacket for Event {
    fn indicator(&self) -> Indicator {
        Indicator::Event
    }

    fn header_len(&self) -> usize {
        Self::HEADER_LEN
    }

    fn unpack_header(&mut self) {
        self.payload_len = usize::from(self.data[1]);
        self.data.reserve(self.payload_len);
    }

    fn payload_len(&self) -> usize {
        self.payload_len
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.data
    }
}

/// HCI ACL data packet (both directions).
///
/// Header: handle (12 bits) + packet boundary flag (2 bits) + broadcast
/// flag (2 bits) as one LE u16, then data length (2B LE).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclData {
    data: BytesMut,
    payload_len: usize,
}

impl AclData {
    pub const HEADER_LEN: usize = 4;
    pub const MAX_PAYLOAD: usize = u16::MAX as usize;

    /// Build an ACL data packet.
    ///
    /// `handle` is truncated to 12 bits and both flags to 2 bits.
    pub fn new(handle: u16, pb_flag: u8, bc_flag: u8, payload: &[u8]) -> Result<Self> {
        if payload.len() > Self::MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: Self::MAX_PAYLOAD,
            });
        }
        let word = (handle & 0x0FFF)
            | (u16::from(pb_flag & 0x3) << 12)
            | (u16::from(bc_flag & 0x3) << 14);
        let mut data = BytesMut::with_capacity(Self::HEADER_LEN + payload.len());
        data.put_u16_le(word);
        data.put_u16_le(payload.len() as u16);
        data.put_slice(payload);
        Ok(Self {
            data,
            payload_len: payload.len(),
        })
    }

    pub(crate) fn empty() -> Self {
        Self {
            data: BytesMut::with_capacity(Self::HEADER_LEN),
            payload_len: 0,
        }
    }

    fn handle_word(&self) -> u16 {
        u16::from_le_bytes([self.data[0], self.data[1]])
    }

    pub fn handle(&self) -> u16 {
        self.handle_word() & 0x0FFF
    }

    pub fn packet_boundary(&self) -> u8 {
        ((self.handle_word() >> 12) & 0x3) as u8
    }

    pub fn broadcast(&self) -> u8 {
        ((self.handle_word() >> 14) & 0x3) as u8
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[Self::HEADER_LEN..]
    }
}

impl HciPacket for AclData {
    fn indicator(&self) -> Indicator {
        Indicator::AclData
    }

    fn header_len(&self) -> usize {
        Self::HEADER_LEN
    }

    fn unpack_header(&mut self) {
        self.payload_len = usize::from(u16::from_le_bytes([self.data[2], self.data[3]]));
        self.data.reserve(self.payload_len);
    }

    fn payload_len(&self) -> usize {
        self.payload_len
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.data
    }
}

/// An HCI packet of any implemented kind.
///
/// The variant doubles as the wire indicator; SCO has no variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Command(Command),
    Event(Event),
    AclData(AclData),
}

impl Packet {
    /// An empty packet ready to be filled by the decoder.
    ///
    /// Returns `None` for indicators with no packet type.
    pub(crate) fn for_indicator(indicator: Indicator) -> Option<Self> {
        match indicator {
            Indicator::Command => Some(Packet::Command(Command::empty())),
            Indicator::Event => Some(Packet::Event(Event::empty())),
            Indicator::AclData => Some(Packet::AclData(AclData::empty())),
            Indicator::None | Indicator::Sco => None,
        }
    }

    fn inner(&self) -> &dyn HciPacket {
        match self {
            Packet::Command(p) => p,
            Packet::Event(p) => p,
            Packet::AclData(p) => p,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn HciPacket {
        match self {
            Packet::Command(p) => p,
            Packet::Event(p) => p,
            Packet::AclData(p) => p,
        }
    }

    /// Bytes after the header (command/event parameters or ACL data).
    pub fn payload(&self) -> &[u8] {
        &self.data()[self.header_len()..]
    }
}

impl HciPacket for Packet {
    fn indicator(&self) -> Indicator {
        self.inner().indicator()
    }

    fn header_len(&self) -> usize {
        self.inner().header_len()
    }

    fn unpack_header(&mut self) {
        self.inner_mut().unpack_header()
    }

    fn payload_len(&self) -> usize {
        self.inner().payload_len()
    }

    fn data(&self) -> &[u8] {
        self.inner().data()
    }

    fn buffer_mut(&mut self) -> &mut BytesMut {
        self.inner_mut().buffer_mut()
    }
}

impl From<Command> for Packet {
    fn from(value: Command) -> Self {
        Packet::Command(value)
    }
}

impl From<Event> for Packet {
    fn from(value: Event) -> Self {
        Packet::Event(value)
    }
}

impl From<AclData> for Packet {
    fn from(value: AclData) -> Self {
        Packet::AclData(value)
    }
}
