//! Error types for NTLM message encoding and decoding.

use thiserror::Error;

use crate::envelope::MessageType;

/// Errors that can occur while building or parsing NTLM messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The requested slice does not fit in the buffer.
    #[error("Message range {offset}+{length} exceeds buffer of {available} bytes")]
    OutOfBounds {
        /// Start of the requested slice.
        offset: usize,
        /// Length of the requested slice.
        length: usize,
        /// Size of the buffer.
        available: usize,
    },

    /// The message is shorter than its fixed header.
    #[error("{message_type:?} message needs at least {needed} bytes, got {actual}")]
    Truncated {
        /// Message type being decoded.
        message_type: MessageType,
        /// Minimum length for this message type.
        needed: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// The message does not start with `NTLMSSP\0`.
    #[error("Missing NTLMSSP signature")]
    BadSignature,

    /// The message-type tag does not match what was being decoded.
    #[error("Expected NTLM message type {expected}, got {actual}")]
    UnexpectedType {
        /// Tag of the message being decoded.
        expected: u32,
        /// Tag found in the message.
        actual: u32,
    },

    /// The message-type tag is not one of the known NTLM messages.
    #[error("Unknown NTLM message type {0}")]
    UnknownType(u32),

    /// A length/offset pair points outside the message.
    #[error("{field} field ({length} bytes at offset {offset}) exceeds message of {available} bytes")]
    FieldOutOfBounds {
        /// Field name.
        field: &'static str,
        /// Offset from the start of the message.
        offset: usize,
        /// Field length.
        length: usize,
        /// Message length.
        available: usize,
    },

    /// A field is too long for its 16-bit length or offset.
    #[error("{field} is {length} bytes, too long for an NTLM message")]
    FieldTooLong {
        /// Field name.
        field: &'static str,
        /// Encoded length of the field.
        length: usize,
    },

    /// A SASL token was not valid base64.
    #[error("Invalid base64 token: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl Error {
    /// Returns true if the input bytes were not a well-formed message.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::OutOfBounds { .. }
                | Self::Truncated { .. }
                | Self::BadSignature
                | Self::UnexpectedType { .. }
                | Self::UnknownType(_)
                | Self::FieldOutOfBounds { .. }
        )
    }
}

/// Result type alias for NTLM operations.
pub type Result<T> = std::result::Result<T, Error>;
