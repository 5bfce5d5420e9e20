//! One-byte purpose tags written at the start of every logical stream.

use crate::error::{Error, Result};

use std::fmt;

use quinn::{RecvStream, SendStream};

/// Tag byte of control-plane streams.
pub const CONTROL_TAG: u8 = 0x01;

/// Tag byte of payload (agent traffic) streams.
pub const PAYLOAD_TAG: u8 = 0x02;

/// The purpose of a logical stream.
///
/// Values other than the known tags are carried as [`Purpose::Unrecognized`]
/// so callers decide what to do with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Control plane: lifecycle, health.
    Control,
    /// Payload: agent-to-agent traffic.
    Payload,
    /// Any other tag byte, passed through uninterpreted. Holding a known
    /// tag byte here aliases that purpose on the wire.
    Unrecognized(u8),
}

impl Purpose {
    /// Decodes a tag byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            CONTROL_TAG => Self::Control,
            PAYLOAD_TAG => Self::Payload,
            other => Self::Unrecognized(other),
        }
    }

    /// Encodes the tag byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Control => CONTROL_TAG,
            Self::Payload => PAYLOAD_TAG,
            Self::Unrecognized(byte) => byte,
        }
    }

    /// Whether this is one of the known purposes.
    #[must_use]
    pub const fn is_recognized(self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<u8> for Purpose {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

impl From<Purpose> for u8 {
    fn from(purpose: Purpose) -> Self {
        purpose.as_byte()
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Control => f.write_str("control"),
            Self::Payload => f.write_str("payload"),
            Self::Unrecognized(byte) => write!(f, "unknown(0x{byte:02x})"),
        }
    }
}

pub(crate) async fn write_purpose(send: &mut SendStream, purpose: Purpose) -> Result<()> {
    send.write_all(&[purpose.as_byte()])
        .await
        .map_err(Error::PurposeWrite)
}

pub(crate) async fn read_purpose(recv: &mut RecvStream) -> Result<Purpose> {
    let mut tag = [0u8; 1];
    recv.read_exact(&mut tag)
        .await
        .map_err(Error::PurposeRead)?;
    Ok(Purpose::from_byte(tag[0]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tags() {
        assert_eq!(Purpose::from_byte(0x01), Purpose::Control);
        assert_eq!(Purpose::from_byte(0x02), Purpose::Payload);
        assert_eq!(Purpose::Control.as_byte(), 0x01);
        assert_eq!(Purpose::Payload.as_byte(), 0x02);
    }

    #[test]
    fn test_unknown_tags_pass_through() {
        for byte in [0x00, 0x03, 0x7f, 0xff] {
            let purpose = Purpose::from(byte);
            assert_eq!(purpose, Purpose::Unrecognized(byte));
            assert!(!purpose.is_recognized());
            assert_eq!(u8::from(purpose), byte);
        }
    }

    #[test]
    fn test_unrecognized_known_byte_aliases_known_purpose() {
        let aliased = Purpose::Unrecognized(CONTROL_TAG);
        assert_eq!(Purpose::from_byte(aliased.as_byte()), Purpose::Control);
    }

    #[test]
    fn test_display() {
        assert_eq!(Purpose::Control.to_string(), "control");
        assert_eq!(Purpose::Payload.to_string(), "payload");
        assert_eq!(Purpose::Unrecognized(0xab).to_string(), "unknown(0xab)");
    }
}
