//! SASL `NTLM` mechanism helpers.
//!
//! IMAP `AUTHENTICATE NTLM`, SMTP `AUTH NTLM` and POP3 `AUTH NTLM` all carry
//! NTLM messages as base64 lines. The client sends the Negotiate message
//! first and the server answers with a Challenge.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::envelope::{self, MessageType};
use crate::error::Result;
use crate::negotiate::encode_negotiate;
use crate::version::OsVersion;

/// SASL mechanism name.
pub const MECHANISM: &str = "NTLM";

/// Builds the client's first response: a base64 Negotiate message.
///
/// # Errors
///
/// Returns an error if the message cannot be encoded.
pub fn negotiate_response(
    workstation: &str,
    domain: &str,
    os_version: Option<OsVersion>,
) -> Result<String> {
    let message = encode_negotiate(workstation, domain, os_version)?;
    Ok(STANDARD.encode(message))
}

/// Decodes a server continuation into the raw Challenge message.
///
/// Surrounding whitespace is ignored. The envelope is checked, the body is
/// left to the caller.
///
/// # Errors
///
/// Returns an error if the token is not base64 or not a Challenge message.
pub fn challenge_bytes(token: &str) -> Result<Vec<u8>> {
    let bytes = STANDARD.decode(token.trim())?;
    envelope::parse(&bytes, 0, bytes.len(), MessageType::Challenge)?;
    Ok(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::negotiate::decode_negotiate;

    #[test]
    fn test_negotiate_response() {
        let token = negotiate_response("host1", "", None).unwrap();
        let bytes = STANDARD.decode(&token).unwrap();
        assert_eq!(bytes.len(), 37);

        let message = decode_negotiate(&bytes, 0, bytes.len()).unwrap();
        assert_eq!(message.workstation(), "HOST1");
    }

    #[test]
    fn test_empty_negotiate_response() {
        let token = negotiate_response("", "", None).unwrap();
        assert_eq!(token, "TlRMTVNTUAABAAAABwIAAAAAAAAgAAAAAAAAACAAAAA=");
    }

    #[test]
    fn test_challenge_bytes() {
        let challenge = envelope::prepare(MessageType::Challenge, 48);
        let token = format!("{}\r\n", STANDARD.encode(&challenge));
        assert_eq!(challenge_bytes(&token).unwrap(), challenge);
    }

    #[test]
    fn test_challenge_bytes_rejects_other_messages() {
        let negotiate = STANDARD.encode(encode_negotiate("ws", "", None).unwrap());
        assert!(matches!(
            challenge_bytes(&negotiate),
            Err(Error::UnexpectedType { expected: 2, actual: 1 })
        ));
        assert!(matches!(challenge_bytes("!!"), Err(Error::Base64(_))));
        assert!(matches!(
            challenge_bytes(&STANDARD.encode(b"NTLMSSP\0")),
            Err(Error::Truncated { .. })
        ));
    }
}
