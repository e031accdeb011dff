//! # mailledger-net
//!
//! The socket layer underneath the `MailLedger` protocol clients.
//!
//! ## Features
//!
//! - **Blocking and async I/O on one stream**: [`NetworkStream::read`] /
//!   [`NetworkStream::write`] block the calling thread and honor the socket
//!   timeouts; [`NetworkStream::read_async`] / [`NetworkStream::write_async`]
//!   suspend the task and can be cancelled with a [`CancellationToken`]
//! - **Disconnect on cancel**: a cancelled transfer shuts the socket down
//!   instead of leaving a half-read reply on the wire
//! - **Cancellable readiness polling**: [`NetworkStream::poll`] wakes up every
//!   [`POLL_INTERVAL`] to check the token
//! - **Deterministic teardown**: the socket is closed exactly once, by
//!   [`NetworkStream::close`] or on drop
//! - **Layer lookup**: [`network_stream`] finds the socket stream under TLS
//!   and compression wrappers
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailledger_net::{NetworkStream, SelectMode, StreamConfig, TcpSocket};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mailledger_net::Result<()> {
//!     let tcp = tokio::net::TcpStream::connect("imap.example.com:143").await?;
//!     let config = StreamConfig::builder()
//!         .io_timeout(std::time::Duration::from_secs(60))
//!         .build();
//!     let mut stream = NetworkStream::with_config(TcpSocket::new(tcp), true, &config)?;
//!
//!     let cancel = CancellationToken::new();
//!     let mut greeting = [0u8; 512];
//!     let n = stream.read_async(&mut greeting, Some(&cancel)).await?;
//!     println!("{}", String::from_utf8_lossy(&greeting[..n]));
//!
//!     stream.write_async(b"A1 CAPABILITY\r\n", Some(&cancel)).await?;
//!     stream.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Stream configuration
//! - [`layer`]: Unwrapping TLS and compression layers
//! - [`socket`]: The socket abstraction the stream is built on

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod layer;
pub mod socket;
mod stream;
mod tcp;

pub use config::{POLL_INTERVAL, StreamConfig, StreamConfigBuilder};
pub use error::{Error, Result};
pub use layer::{Layer, StreamLayer, network_stream};
pub use socket::{SelectMode, Socket};
pub use stream::NetworkStream;
pub use tcp::TcpSocket;
pub use tokio_util::sync::CancellationToken;
