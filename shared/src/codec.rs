//! Command frame codec
//!
//! Every command written to the droid is framed as:
//! ```text
//! [ size | 0x20 ][ flags ][ command id ][ payload len + 0x40 ][ payload ... ]
//! ```
//! where `size` is the payload length plus three and `flags` is `0x42` for
//! multipurpose commands and `0x00` otherwise. Notifications coming back from
//! the droid use the same four byte header, with the first byte holding the
//! total packet length plus `0x1f`.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::{CommandId, MultipurposeCommand};

/// Largest payload that still fits the five bit size field
pub const MAX_PAYLOAD_LEN: usize = 28;

/// Header length shared by commands and notifications
pub const HEADER_LEN: usize = 4;

/// Raw bytes written twice right after connecting to unlock the droid
pub const HANDSHAKE: [u8; 3] = [0x22, 0x20, 0x01];

/// Marker byte that opens every multipurpose payload
const MULTIPURPOSE_MARKER: u8 = 0x44;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug, PartialEq)]
pub enum CodecError {
    #[error("Payload too large: {0} bytes (max: {MAX_PAYLOAD_LEN})")]
    PayloadTooLarge(usize),

    #[error("Packet too short: {0} bytes")]
    TooShort(usize),

    #[error("Received truncated packet. Expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Value {0} cannot be packed as two decimal digits")]
    NotDecimalPackable(u8),

    #[error("Malformed hex data: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Encode a command frame
pub fn encode_command(command: CommandId, data: &[u8]) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + data.len());
    encode_command_into(command, data, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a command frame directly into a provided buffer
pub fn encode_command_into(
    command: CommandId,
    data: &[u8],
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    if data.len() > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLarge(data.len()));
    }

    let flags = if command == CommandId::Multipurpose {
        0x42
    } else {
        0x00
    };

    buf.reserve(HEADER_LEN + data.len());
    buf.put_u8((data.len() as u8 + 3) | 0x20);
    buf.put_u8(flags);
    buf.put_u8(command.as_u8());
    buf.put_u8(data.len() as u8 + 0x40);
    buf.put_slice(data);

    Ok(())
}

/// Build the payload of a multipurpose command
pub fn multipurpose_payload(sub: MultipurposeCommand, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut payload = Vec::with_capacity(2 + data.len());
    payload.push(MULTIPURPOSE_MARKER);
    payload.push(bcd(sub as u8)?);
    payload.extend_from_slice(data);
    Ok(payload)
}

/// Encode a multipurpose command frame
pub fn encode_multipurpose(sub: MultipurposeCommand, data: &[u8]) -> Result<Bytes, CodecError> {
    encode_command(CommandId::Multipurpose, &multipurpose_payload(sub, data)?)
}

/// Pack a value below 100 as two decimal digits in one byte (11 -> 0x11)
///
/// Script ids, script actions and multipurpose sub commands are sent this way.
pub fn bcd(value: u8) -> Result<u8, CodecError> {
    if value > 99 {
        return Err(CodecError::NotDecimalPackable(value));
    }
    Ok(((value / 10) << 4) | (value % 10))
}

/// Lowercase hex rendering used in logs and the interactive shell
pub fn to_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Parse a hex string, accepting either case
pub fn from_hex(data: &str) -> Result<Vec<u8>, CodecError> {
    Ok(hex::decode(data.trim())?)
}

/// A notification received from the droid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyMessage {
    /// Total packet length announced by the header
    pub size: usize,
    /// Second header byte, meaning unknown
    pub unknown1: u8,
    /// Raw command id; not guaranteed to be a known [`CommandId`]
    pub command_id: u8,
    /// Fourth header byte, meaning unknown
    pub unknown3: u8,
    /// Payload following the header
    pub data: Vec<u8>,
}

impl NotifyMessage {
    /// Known command id, if any
    pub fn command(&self) -> Option<CommandId> {
        CommandId::try_from(self.command_id).ok()
    }
}

impl std::fmt::Display for NotifyMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "size={} unknown1={} command={} unknown3={} data={}",
            self.size,
            self.unknown1,
            self.command_id,
            self.unknown3,
            to_hex(&self.data)
        )
    }
}

/// Decode a notification packet
pub fn decode_notification(data: &[u8]) -> Result<NotifyMessage, CodecError> {
    if data.len() < HEADER_LEN {
        return Err(CodecError::TooShort(data.len()));
    }

    let expected = (data[0] as usize)
        .checked_sub(0x1f)
        .ok_or(CodecError::Truncated {
            expected: 0,
            actual: data.len(),
        })?;

    if expected != data.len() {
        return Err(CodecError::Truncated {
            expected,
            actual: data.len(),
        });
    }

    Ok(NotifyMessage {
        size: expected,
        unknown1: data[1],
        command_id: data[2],
        unknown3: data[3],
        data: data[HEADER_LEN..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_frame() {
        let frame = encode_command(CommandId::ConnectionHeartbeat, &[]).unwrap();
        assert_eq!(&frame[..], &[0x23, 0x00, 0x0e, 0x40]);
    }

    #[test]
    fn test_multipurpose_frame_matches_captured_bytes() {
        // Select sound bank 9, as captured from the official app
        let frame = encode_multipurpose(MultipurposeCommand::Audio, &[0x1f, 0x09]).unwrap();
        assert_eq!(to_hex(&frame), "27420f4444001f09");
    }

    #[test]
    fn test_payload_too_large() {
        let data = [0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(
            encode_command(CommandId::FlashPairingLed, &data),
            Err(CodecError::PayloadTooLarge(29))
        );
        assert!(encode_command(CommandId::FlashPairingLed, &data[..MAX_PAYLOAD_LEN]).is_ok());
    }

    #[test]
    fn test_encode_into_appends() {
        let mut buf = BytesMut::new();
        encode_command_into(CommandId::ConnectionHeartbeat, &[], &mut buf).unwrap();
        encode_command_into(CommandId::SetPairingLedState, &[0x00, 0xff], &mut buf).unwrap();
        assert_eq!(to_hex(&buf), "23000e402500024200ff");
    }

    #[test]
    fn test_bcd() {
        assert_eq!(bcd(0).unwrap(), 0x00);
        assert_eq!(bcd(7).unwrap(), 0x07);
        assert_eq!(bcd(11).unwrap(), 0x11);
        assert_eq!(bcd(99).unwrap(), 0x99);
        assert_eq!(bcd(100), Err(CodecError::NotDecimalPackable(100)));
    }

    #[test]
    fn test_decode_head_event() {
        // 6 byte packet -> first byte 6 + 0x1f
        let packet = [0x25, 0x00, 0x80, 0x42, 0x01, 0x82];
        let msg = decode_notification(&packet).unwrap();
        assert_eq!(msg.size, 6);
        assert_eq!(msg.command(), Some(CommandId::RUnitHeadEvent));
        assert_eq!(msg.data, vec![0x01, 0x82]);
    }

    #[test]
    fn test_decode_truncated() {
        let packet = [0x25, 0x00, 0x80, 0x42, 0x01];
        assert_eq!(
            decode_notification(&packet),
            Err(CodecError::Truncated {
                expected: 6,
                actual: 5
            })
        );
        assert_eq!(decode_notification(&[0x25, 0x00]), Err(CodecError::TooShort(2)));
    }

    #[test]
    fn test_decode_unknown_command_keeps_raw_id() {
        let packet = [0x23, 0x00, 0x63, 0x40];
        let msg = decode_notification(&packet).unwrap();
        assert_eq!(msg.command_id, 0x63);
        assert!(msg.command().is_none());
        assert!(msg.data.is_empty());
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(from_hex("0A04FF").unwrap(), vec![0x0a, 0x04, 0xff]);
        assert!(matches!(from_hex("0g"), Err(CodecError::InvalidHex(_))));
    }

    #[test]
    fn test_hex_error_compares() {
        assert_eq!(
            from_hex("0g"),
            Err(CodecError::InvalidHex(hex::FromHexError::InvalidHexCharacter {
                c: 'g',
                index: 1
            }))
        );
        assert_eq!(from_hex("abc"), Err(CodecError::InvalidHex(hex::FromHexError::OddLength)));
    }
}
