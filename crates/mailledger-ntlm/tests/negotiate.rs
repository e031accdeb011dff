//! Wire-format tests for the Negotiate message.

#![allow(clippy::unwrap_used)]

use mailledger_ntlm::{
    Error, MessageType, NegotiateMessage, NtlmFlags, OsVersion, decode_negotiate,
    encode_negotiate, envelope,
};

fn flags_of(bytes: &[u8]) -> NtlmFlags {
    NtlmFlags::from_bits_retain(u32::from_le_bytes(bytes[12..16].try_into().unwrap()))
}

#[test]
fn test_workstation_only_message() {
    let bytes = encode_negotiate("host1", "", None).unwrap();

    assert_eq!(bytes.len(), 37);
    assert_eq!(&bytes[..8], b"NTLMSSP\0");
    assert_eq!(&bytes[8..12], &1u32.to_le_bytes());
    assert!(!flags_of(&bytes).contains(NtlmFlags::NEGOTIATE_DOMAIN_SUPPLIED));
    assert!(flags_of(&bytes).contains(NtlmFlags::NEGOTIATE_WORKSTATION_SUPPLIED));
    assert_eq!(&bytes[32..37], b"HOST1");
}

#[test]
fn test_version_presence_sets_layout() {
    let without = encode_negotiate("ws", "", None).unwrap();
    let with = encode_negotiate("ws", "", Some(OsVersion::new(6, 3, 9600))).unwrap();

    assert_eq!(u16::from_le_bytes([without[28], without[29]]), 32);
    assert_eq!(u16::from_le_bytes([with[28], with[29]]), 40);
    assert_eq!(with.len(), without.len() + 8);
    assert_eq!(with[39], 0x0f);
}

#[test]
fn test_every_truncation_is_malformed() {
    let bytes = encode_negotiate("host1", "corp", None).unwrap();
    for len in 0..32 {
        let err = decode_negotiate(&bytes, 0, len).unwrap_err();
        assert!(err.is_malformed(), "length {len}: {err}");
    }
}

#[test]
fn test_decode_inside_larger_buffer() {
    let message = NegotiateMessage::new("pc-7", "example", Some(OsVersion::new(10, 0, 22621)));
    let encoded = message.encode().unwrap();

    let mut buffer = b"garbage".to_vec();
    buffer.extend_from_slice(&encoded);
    buffer.extend_from_slice(b"more garbage");

    let decoded = decode_negotiate(&buffer, 7, encoded.len()).unwrap();
    assert_eq!(decoded.workstation(), "PC-7");
    assert_eq!(decoded.domain(), "EXAMPLE");
    assert_eq!(decoded.os_version(), Some(OsVersion::new(10, 0, 22621)));
    assert_eq!(decoded.flags(), message.flags());
}

#[test]
fn test_rejects_other_message_types() {
    let challenge = envelope::prepare(MessageType::Challenge, 32);
    assert_eq!(
        decode_negotiate(&challenge, 0, 32),
        Err(Error::UnexpectedType {
            expected: 1,
            actual: 2
        })
    );
}
