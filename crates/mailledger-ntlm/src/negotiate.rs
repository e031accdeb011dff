//! The NTLM Negotiate (Type 1) message.
//!
//! ```text
//! offset  size  field
//!  0       8    signature "NTLMSSP\0"
//!  8       4    type = 1
//! 12       4    flags
//! 16       2    domain length
//! 18       2    domain length (again)
//! 20       4    domain offset
//! 24       2    workstation length
//! 26       2    workstation length (again)
//! 28       4    workstation offset
//! 32       8    OS version (only with NEGOTIATE_VERSION)
//! 32|40    n    workstation, then domain
//! ```
//!
//! Text fields are upper-cased and written as UTF-8 without a terminator.

use bytes::BufMut;

use crate::envelope::{self, MessageType, read_u16};
use crate::error::{Error, Result};
use crate::flags::NtlmFlags;
use crate::version::OsVersion;

/// Length of the fixed header without a version record.
const FIXED_LEN: usize = 32;

/// Length of the OS version record.
const VERSION_LEN: usize = 8;

/// NTLMSSP revision written in the last byte of the version record.
const NTLM_REVISION: u8 = 0x0f;

/// Flags that follow from the message contents rather than from the caller.
const DERIVED_FLAGS: NtlmFlags = NtlmFlags::NEGOTIATE_DOMAIN_SUPPLIED
    .union(NtlmFlags::NEGOTIATE_WORKSTATION_SUPPLIED)
    .union(NtlmFlags::NEGOTIATE_VERSION);

/// A client's opening NTLM message.
///
/// The supplied-field flags and the version flag track the fields: setting a
/// non-empty domain raises `NEGOTIATE_DOMAIN_SUPPLIED`, clearing it lowers
/// the flag, and likewise for the workstation and OS version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiateMessage {
    flags: NtlmFlags,
    domain: String,
    workstation: String,
    os_version: Option<OsVersion>,
}

impl NegotiateMessage {
    /// Flags every new message starts with.
    pub const DEFAULT_FLAGS: NtlmFlags = NtlmFlags::NEGOTIATE_NTLM
        .union(NtlmFlags::NEGOTIATE_OEM)
        .union(NtlmFlags::NEGOTIATE_UNICODE)
        .union(NtlmFlags::REQUEST_TARGET);

    /// Creates a message. Empty strings leave a field out.
    #[must_use]
    pub fn new(
        workstation: impl Into<String>,
        domain: impl Into<String>,
        os_version: Option<OsVersion>,
    ) -> Self {
        let mut message = Self {
            flags: Self::DEFAULT_FLAGS,
            domain: String::new(),
            workstation: String::new(),
            os_version: None,
        };
        message.set_workstation(workstation);
        message.set_domain(domain);
        message.set_os_version(os_version);
        message
    }

    /// Decodes the message at `bytes[offset..offset + length]`.
    ///
    /// Flags are kept exactly as received, and text fields are taken as
    /// they are, without case folding. Invalid UTF-8 is replaced with U+FFFD.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid (see
    /// [`envelope::parse`]) or a field points outside the message.
    pub fn decode(bytes: &[u8], offset: usize, length: usize) -> Result<Self> {
        let message = envelope::parse(bytes, offset, length, MessageType::Negotiate)?;

        let flags = NtlmFlags::from_bits_retain(envelope::read_u32(message, 12));
        let domain = read_field(message, "domain", 16)?;
        let workstation = read_field(message, "workstation", 24)?;

        let os_version = (flags.contains(NtlmFlags::NEGOTIATE_VERSION)
            && message.len() >= FIXED_LEN + VERSION_LEN)
            .then(|| OsVersion::new(message[32], message[33], read_u16(message, 34)));

        Ok(Self {
            flags,
            domain,
            workstation,
            os_version,
        })
    }

    /// Returns the flags.
    #[must_use]
    pub const fn flags(&self) -> NtlmFlags {
        self.flags
    }

    /// Replaces the caller-controlled flags.
    ///
    /// The supplied-field and version flags are recomputed from the message
    /// contents whatever `flags` says about them.
    pub fn set_flags(&mut self, flags: NtlmFlags) {
        self.flags = flags.difference(DERIVED_FLAGS);
        self.flags.set(
            NtlmFlags::NEGOTIATE_DOMAIN_SUPPLIED,
            !self.domain.is_empty(),
        );
        self.flags.set(
            NtlmFlags::NEGOTIATE_WORKSTATION_SUPPLIED,
            !self.workstation.is_empty(),
        );
        self.flags
            .set(NtlmFlags::NEGOTIATE_VERSION, self.os_version.is_some());
    }

    /// Returns the domain, or an empty string if none.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Sets the domain and updates `NEGOTIATE_DOMAIN_SUPPLIED`.
    pub fn set_domain(&mut self, domain: impl Into<String>) {
        self.domain = domain.into();
        self.flags.set(
            NtlmFlags::NEGOTIATE_DOMAIN_SUPPLIED,
            !self.domain.is_empty(),
        );
    }

    /// Returns the workstation, or an empty string if none.
    #[must_use]
    pub fn workstation(&self) -> &str {
        &self.workstation
    }

    /// Sets the workstation and updates `NEGOTIATE_WORKSTATION_SUPPLIED`.
    pub fn set_workstation(&mut self, workstation: impl Into<String>) {
        self.workstation = workstation.into();
        self.flags.set(
            NtlmFlags::NEGOTIATE_WORKSTATION_SUPPLIED,
            !self.workstation.is_empty(),
        );
    }

    /// Returns the OS version, if one is sent.
    #[must_use]
    pub const fn os_version(&self) -> Option<OsVersion> {
        self.os_version
    }

    /// Sets the OS version and updates `NEGOTIATE_VERSION`.
    pub fn set_os_version(&mut self, os_version: Option<OsVersion>) {
        self.os_version = os_version;
        self.flags
            .set(NtlmFlags::NEGOTIATE_VERSION, os_version.is_some());
    }

    /// Encodes the message.
    ///
    /// A version record is written whenever `NEGOTIATE_VERSION` is set. If
    /// the flag came off the wire without a record, the record is zeroed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldTooLong`] if a field or its offset does not fit
    /// in 16 bits.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let workstation = self.workstation.to_uppercase();
        let domain = self.domain.to_uppercase();

        let fixed = if self.flags.contains(NtlmFlags::NEGOTIATE_VERSION) {
            FIXED_LEN + VERSION_LEN
        } else {
            FIXED_LEN
        };
        let workstation_offset = fixed;
        let domain_offset = workstation_offset + workstation.len();
        let total = domain_offset + domain.len();

        let workstation_len = to_u16("workstation", workstation.len())?;
        let domain_len = to_u16("domain", domain.len())?;
        let workstation_offset_u16 = to_u16("workstation", workstation_offset)?;
        let domain_offset_u16 = to_u16("domain", domain_offset)?;

        let mut message = envelope::prepare(MessageType::Negotiate, total);

        let mut header = &mut message[12..FIXED_LEN];
        header.put_u32_le(self.flags.bits());
        header.put_u16_le(domain_len);
        header.put_u16_le(domain_len);
        header.put_u32_le(u32::from(domain_offset_u16));
        header.put_u16_le(workstation_len);
        header.put_u16_le(workstation_len);
        header.put_u32_le(u32::from(workstation_offset_u16));

        if fixed > FIXED_LEN {
            let version = self.os_version.unwrap_or_default();
            let mut record = &mut message[FIXED_LEN..fixed];
            record.put_u8(version.major);
            record.put_u8(version.minor);
            record.put_u16_le(version.build);
            record.put_bytes(0, 3);
            record.put_u8(NTLM_REVISION);
        }

        message[workstation_offset..domain_offset].copy_from_slice(workstation.as_bytes());
        message[domain_offset..total].copy_from_slice(domain.as_bytes());

        Ok(message)
    }
}

impl Default for NegotiateMessage {
    fn default() -> Self {
        Self::new("", "", None)
    }
}

/// Encodes a Negotiate message from its parts.
///
/// # Errors
///
/// See [`NegotiateMessage::encode`].
pub fn encode_negotiate(
    workstation: &str,
    domain: &str,
    os_version: Option<OsVersion>,
) -> Result<Vec<u8>> {
    NegotiateMessage::new(workstation, domain, os_version).encode()
}

/// Decodes a Negotiate message.
///
/// # Errors
///
/// See [`NegotiateMessage::decode`].
pub fn decode_negotiate(bytes: &[u8], offset: usize, length: usize) -> Result<NegotiateMessage> {
    NegotiateMessage::decode(bytes, offset, length)
}

fn to_u16(field: &'static str, value: usize) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::FieldTooLong {
        field,
        length: value,
    })
}

/// Reads a length/offset pair at `at` and returns the text it points to.
///
/// An empty field is absent whatever its offset says.
fn read_field(message: &[u8], field: &'static str, at: usize) -> Result<String> {
    let length = usize::from(read_u16(message, at));
    if length == 0 {
        return Ok(String::new());
    }
    let offset = usize::from(read_u16(message, at + 4));
    let bytes = message
        .get(offset..offset + length)
        .ok_or(Error::FieldOutOfBounds {
            field,
            offset,
            length,
            available: message.len(),
        })?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}
