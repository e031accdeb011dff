//! NTLM negotiation flags.

use bitflags::bitflags;

bitflags! {
    /// Capabilities a client or server advertises during the handshake.
    ///
    /// Unknown bits are kept as-is when decoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NtlmFlags: u32 {
        /// Text fields are UTF-16LE.
        const NEGOTIATE_UNICODE = 0x0000_0001;
        /// Text fields use the OEM code page.
        const NEGOTIATE_OEM = 0x0000_0002;
        /// Ask the server to send its realm in the challenge.
        const REQUEST_TARGET = 0x0000_0004;
        /// Message integrity.
        const NEGOTIATE_SIGN = 0x0000_0010;
        /// Message confidentiality.
        const NEGOTIATE_SEAL = 0x0000_0020;
        /// Connectionless authentication.
        const NEGOTIATE_DATAGRAM = 0x0000_0040;
        /// LAN Manager session key.
        const NEGOTIATE_LM_KEY = 0x0000_0080;
        /// NTLM v1 session security.
        const NEGOTIATE_NTLM = 0x0000_0200;
        /// Anonymous connection.
        const NEGOTIATE_ANONYMOUS = 0x0000_0800;
        /// The domain field is present.
        const NEGOTIATE_DOMAIN_SUPPLIED = 0x0000_1000;
        /// The workstation field is present.
        const NEGOTIATE_WORKSTATION_SUPPLIED = 0x0000_2000;
        /// Sign even when signing was not negotiated.
        const NEGOTIATE_ALWAYS_SIGN = 0x0000_8000;
        /// The target name is a domain.
        const TARGET_TYPE_DOMAIN = 0x0001_0000;
        /// The target name is a server.
        const TARGET_TYPE_SERVER = 0x0002_0000;
        /// NTLM2 session security.
        const NEGOTIATE_EXTENDED_SESSION_SECURITY = 0x0008_0000;
        /// Identify-level token.
        const NEGOTIATE_IDENTIFY = 0x0010_0000;
        /// Non-NT session key.
        const REQUEST_NON_NT_SESSION_KEY = 0x0040_0000;
        /// The target info block is present.
        const NEGOTIATE_TARGET_INFO = 0x0080_0000;
        /// The OS version record is present.
        const NEGOTIATE_VERSION = 0x0200_0000;
        /// 128-bit session keys.
        const NEGOTIATE_128 = 0x2000_0000;
        /// Explicit key exchange.
        const NEGOTIATE_KEY_EXCHANGE = 0x4000_0000;
        /// 56-bit session keys.
        const NEGOTIATE_56 = 0x8000_0000;
    }
}

impl Default for NtlmFlags {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_values() {
        assert_eq!(NtlmFlags::NEGOTIATE_UNICODE.bits(), 0x1);
        assert_eq!(NtlmFlags::NEGOTIATE_DOMAIN_SUPPLIED.bits(), 0x1000);
        assert_eq!(NtlmFlags::NEGOTIATE_WORKSTATION_SUPPLIED.bits(), 0x2000);
        assert_eq!(NtlmFlags::NEGOTIATE_VERSION.bits(), 0x0200_0000);
    }

    #[test]
    fn test_unknown_bits_are_retained() {
        let flags = NtlmFlags::from_bits_retain(0x0000_0100 | 0x1);
        assert!(flags.contains(NtlmFlags::NEGOTIATE_UNICODE));
        assert_eq!(flags.bits(), 0x101);
    }
}
