//! The header shared by every NTLM message.
//!
//! ```text
//! 0        8        12
//! +--------+--------+----------------
//! |NTLMSSP\0| type  | message body...
//! +--------+--------+----------------
//! ```
//!
//! The type is a little-endian `u32`. Each message type has a fixed minimum
//! length that includes this header.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

/// Magic bytes at the start of every NTLM message.
pub const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

/// Length of the signature plus the type tag.
pub const HEADER_LEN: usize = 12;

/// NTLM handshake message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Client capabilities (Type 1).
    Negotiate,
    /// Server challenge (Type 2).
    Challenge,
    /// Client response (Type 3).
    Authenticate,
}

impl MessageType {
    /// Returns the wire tag.
    #[must_use]
    pub const fn tag(self) -> u32 {
        match self {
            Self::Negotiate => 1,
            Self::Challenge => 2,
            Self::Authenticate => 3,
        }
    }

    /// Returns the smallest valid message of this type, header included.
    #[must_use]
    pub const fn min_len(self) -> usize {
        match self {
            Self::Negotiate | Self::Challenge => 32,
            Self::Authenticate => 52,
        }
    }
}

impl TryFrom<u32> for MessageType {
    type Error = u32;

    fn try_from(tag: u32) -> std::result::Result<Self, u32> {
        match tag {
            1 => Ok(Self::Negotiate),
            2 => Ok(Self::Challenge),
            3 => Ok(Self::Authenticate),
            other => Err(other),
        }
    }
}

/// Allocates a zeroed message of `len` bytes with the header filled in.
///
/// `len` is raised to the header length if it is shorter.
#[must_use]
pub fn prepare(message_type: MessageType, len: usize) -> Vec<u8> {
    let mut message = vec![0u8; len.max(HEADER_LEN)];
    let mut header = &mut message[..HEADER_LEN];
    header.put_slice(SIGNATURE);
    header.put_u32_le(message_type.tag());
    message
}

/// Validates the header of the message at `bytes[offset..offset + length]`.
///
/// Returns the message slice on success.
///
/// # Errors
///
/// - [`Error::OutOfBounds`] if the range does not fit in `bytes`
/// - [`Error::Truncated`] if `length` is below the type's minimum
/// - [`Error::BadSignature`] if the signature is wrong
/// - [`Error::UnexpectedType`] if the type tag is not `expected`
pub fn parse(bytes: &[u8], offset: usize, length: usize, expected: MessageType) -> Result<&[u8]> {
    let message = offset
        .checked_add(length)
        .and_then(|end| bytes.get(offset..end))
        .ok_or(Error::OutOfBounds {
            offset,
            length,
            available: bytes.len(),
        })?;

    if message.len() < expected.min_len() {
        return Err(Error::Truncated {
            message_type: expected,
            needed: expected.min_len(),
            actual: message.len(),
        });
    }
    if !message.starts_with(SIGNATURE) {
        return Err(Error::BadSignature);
    }

    let actual = read_u32(message, 8);
    if actual != expected.tag() {
        return Err(Error::UnexpectedType {
            expected: expected.tag(),
            actual,
        });
    }

    Ok(message)
}

/// Reads the message type from a buffer without validating the body.
///
/// # Errors
///
/// Returns [`Error::BadSignature`] if `bytes` is not an NTLM message, or
/// [`Error::UnknownType`] if the tag is not a known message type.
pub fn peek_message_type(bytes: &[u8]) -> Result<MessageType> {
    if bytes.len() < HEADER_LEN || !bytes.starts_with(SIGNATURE) {
        return Err(Error::BadSignature);
    }
    let tag = read_u32(bytes, 8);
    MessageType::try_from(tag).map_err(Error::UnknownType)
}

/// Callers must have checked that `at + 2 <= message.len()`.
pub(crate) fn read_u16(message: &[u8], at: usize) -> u16 {
    (&message[at..at + 2]).get_u16_le()
}

/// Callers must have checked that `at + 4 <= message.len()`.
pub(crate) fn read_u32(message: &[u8], at: usize) -> u32 {
    (&message[at..at + 4]).get_u32_le()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_writes_header() {
        let message = prepare(MessageType::Challenge, 32);
        assert_eq!(message.len(), 32);
        assert_eq!(&message[..8], SIGNATURE);
        assert_eq!(&message[8..12], &[2, 0, 0, 0]);
        assert!(message[12..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_prepare_never_shorter_than_header() {
        assert_eq!(prepare(MessageType::Negotiate, 0).len(), HEADER_LEN);
    }

    #[test]
    fn test_parse_accepts_own_output() {
        let message = prepare(MessageType::Negotiate, 32);
        assert_eq!(
            parse(&message, 0, 32, MessageType::Negotiate).unwrap(),
            &message[..]
        );
    }

    #[test]
    fn test_parse_at_offset() {
        let mut buffer = vec![0xAA; 5];
        buffer.extend(prepare(MessageType::Negotiate, 32));
        buffer.extend([0xBB; 3]);

        let message = parse(&buffer, 5, 32, MessageType::Negotiate).unwrap();
        assert_eq!(message.len(), 32);
        assert_eq!(&message[..8], SIGNATURE);
    }

    #[test]
    fn test_parse_truncated() {
        let message = prepare(MessageType::Negotiate, 32);
        for len in 0..32 {
            let err = parse(&message, 0, len, MessageType::Negotiate).unwrap_err();
            assert!(matches!(err, Error::Truncated { needed: 32, .. }), "{len}");
            assert!(err.is_malformed());
        }
    }

    #[test]
    fn test_parse_authenticate_minimum() {
        let message = prepare(MessageType::Authenticate, 52);
        assert!(parse(&message, 0, 52, MessageType::Authenticate).is_ok());
        assert!(matches!(
            parse(&message, 0, 51, MessageType::Authenticate),
            Err(Error::Truncated { needed: 52, .. })
        ));
    }

    #[test]
    fn test_parse_range_outside_buffer() {
        let message = prepare(MessageType::Negotiate, 32);
        assert!(matches!(
            parse(&message, 1, 32, MessageType::Negotiate),
            Err(Error::OutOfBounds { available: 32, .. })
        ));
        assert!(matches!(
            parse(&message, usize::MAX, 2, MessageType::Negotiate),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_parse_bad_signature() {
        let mut message = prepare(MessageType::Negotiate, 32);
        message[6] = b'X';
        assert_eq!(
            parse(&message, 0, 32, MessageType::Negotiate),
            Err(Error::BadSignature)
        );
    }

    #[test]
    fn test_parse_wrong_type() {
        let message = prepare(MessageType::Challenge, 32);
        assert_eq!(
            parse(&message, 0, 32, MessageType::Negotiate),
            Err(Error::UnexpectedType {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn test_peek_message_type() {
        let message = prepare(MessageType::Authenticate, 12);
        assert_eq!(
            peek_message_type(&message).unwrap(),
            MessageType::Authenticate
        );
        assert_eq!(peek_message_type(b"NTLM"), Err(Error::BadSignature));

        let mut unknown = prepare(MessageType::Negotiate, 12);
        unknown[8] = 9;
        let err = peek_message_type(&unknown).unwrap_err();
        assert_eq!(err, Error::UnknownType(9));
        assert!(err.is_malformed());
    }

    #[test]
    fn test_message_type_tags() {
        for ty in [
            MessageType::Negotiate,
            MessageType::Challenge,
            MessageType::Authenticate,
        ] {
            assert_eq!(MessageType::try_from(ty.tag()), Ok(ty));
        }
        assert_eq!(MessageType::try_from(0), Err(0));
    }
}
