//! # mailledger-ntlm
//!
//! NTLM message codec for SASL `NTLM` authentication.
//!
//! ## Features
//!
//! - **Negotiate (Type 1) messages**: build the client's opening message with
//!   [`NegotiateMessage`], or parse one received from elsewhere
//! - **Shared envelope**: signature and type checks for every message type in
//!   [`envelope`]
//! - **Typed flags**: [`NtlmFlags`] keeps unknown bits intact
//! - **SASL helpers**: base64 tokens for IMAP, SMTP and POP3 in [`sasl`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailledger_ntlm::{NegotiateMessage, OsVersion, sasl};
//!
//! let message = NegotiateMessage::new("workstation", "CORP", Some(OsVersion::new(10, 0, 19041)));
//! let bytes = message.encode()?;
//!
//! // Or straight to a SASL initial response:
//! let token = sasl::negotiate_response("workstation", "CORP", None)?;
//! ```
//!
//! ## Modules
//!
//! - [`envelope`]: Header shared by all NTLM messages
//! - [`sasl`]: SASL mechanism helpers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod envelope;
mod error;
mod flags;
mod negotiate;
pub mod sasl;
mod version;

pub use envelope::{MessageType, SIGNATURE};
pub use error::{Error, Result};
pub use flags::NtlmFlags;
pub use negotiate::{NegotiateMessage, decode_negotiate, encode_negotiate};
pub use version::OsVersion;
