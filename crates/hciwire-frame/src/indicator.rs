//! Packet indicators for the HCI UART transport.
//!
//! Every frame on the wire starts with a single indicator byte naming the
//! packet kind that follows. Legality depends on the direction of travel.

use std::fmt;

use crate::error::{FrameError, Result};

/// Single-byte wire prefix identifying the packet kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Indicator {
    /// Never appears on the wire.
    None = 0x00,
    /// HCI command (host to controller only).
    Command = 0x01,
    /// ACL data (both directions).
    AclData = 0x02,
    /// Synchronous data. Reserved, no packet type is wired to it.
    Sco = 0x03,
    /// HCI event (controller to host only).
    Event = 0x04,
}

/// Direction of travel across the HCI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Host to controller.
    Outbound,
    /// Controller to host.
    Inbound,
}

impl Indicator {
    /// Returns the raw wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable name used in logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            Indicator::None => "NONE",
            Indicator::Command => "CMD",
            Indicator::AclData => "ACL",
            Indicator::Sco => "SCO",
            Indicator::Event => "EVT",
        }
    }

    /// Returns true if a frame with this indicator may travel in `direction`.
    pub fn is_legal(self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (Indicator::Command | Indicator::AclData, Direction::Outbound)
                | (Indicator::AclData | Indicator::Event, Direction::Inbound)
        )
    }

    /// Parse a frame-boundary byte, checking it against `direction`.
    pub fn parse(byte: u8, direction: Direction) -> Result<Self> {
        let indicator = Self::try_from(byte)?;
        if !indicator.is_legal(direction) {
            return Err(FrameError::UnexpectedIndicator {
                indicator,
                direction,
            });
        }
        Ok(indicator)
    }
}

impl TryFrom<u8> for Indicator {
    type Error = FrameError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(Indicator::None),
            0x01 => Ok(Indicator::Command),
            0x02 => Ok(Indicator::AclData),
            0x03 => Ok(Indicator::Sco),
            0x04 => Ok(Indicator::Event),
            other => Err(FrameError::InvalidIndicator(other)),
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Outbound => f.write_str("outbound"),
            Direction::Inbound => f.write_str("inbound"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_accepts_acl_and_event_only() {
        assert_eq!(
            Indicator::parse(0x02, Direction::Inbound).unwrap(),
            Indicator::AclData
        );
        assert_eq!(
            Indicator::parse(0x04, Direction::Inbound).unwrap(),
            Indicator::Event
        );

        for byte in [0x00, 0x01, 0x03] {
            let err = Indicator::parse(byte, Direction::Inbound).unwrap_err();
            assert!(matches!(err, FrameError::UnexpectedIndicator { .. }));
        }
    }

    #[test]
    fn outbound_accepts_command_and_acl_only() {
        assert!(Indicator::Command.is_legal(Direction::Outbound));
        assert!(Indicator::AclData.is_legal(Direction::Outbound));
        assert!(!Indicator::Event.is_legal(Direction::Outbound));
        assert!(!Indicator::Sco.is_legal(Direction::Outbound));
        assert!(!Indicator::None.is_legal(Direction::Outbound));
    }

    #[test]
    fn unknown_byte_is_invalid() {
        let err = Indicator::parse(0x07, Direction::Inbound).unwrap_err();
        assert!(matches!(err, FrameError::InvalidIndicator(0x07)));
    }

    #[test]
    fn wire_values() {
        assert_eq!(Indicator::Command.as_u8(), 1);
        assert_eq!(Indicator::Event.as_u8(), 4);
        assert_eq!(Indicator::AclData.to_string(), "ACL");
    }
}
