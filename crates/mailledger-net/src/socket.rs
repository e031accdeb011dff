//! Socket abstraction underneath [`NetworkStream`](crate::NetworkStream).
//!
//! The stream never talks to the operating system directly. Everything it
//! needs from a connected socket goes through the [`Socket`] trait: blocking
//! transfers for the synchronous path, readiness-driven transfers for the
//! async path, and a bounded readiness wait for [`poll`](crate::NetworkStream::poll).

use std::io;
use std::net::Shutdown;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

/// Readiness condition to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectMode {
    /// Data is available to read, or the peer closed the connection.
    Read,
    /// The send buffer has room.
    Write,
    /// An error or out-of-band data is pending.
    Error,
}

/// A connected, full-duplex socket.
///
/// All methods take `&self` so that a socket can be shared between two
/// streams (see the `Arc<T>` implementation), one reading and one writing.
pub trait Socket: Send + Sync {
    /// Returns true if the socket still has a peer.
    fn is_connected(&self) -> bool;

    /// Returns the number of bytes that can be read without blocking.
    fn available(&self) -> io::Result<usize>;

    /// Blocks until at least one byte is received, honoring the read timeout.
    fn receive(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Blocks until the whole buffer is sent, honoring the write timeout.
    fn send(&self, buf: &[u8]) -> io::Result<()>;

    /// Attempts a non-blocking receive, registering the waker if not ready.
    fn poll_receive(&self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>>;

    /// Attempts a non-blocking send, registering the waker if not ready.
    fn poll_send(&self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>>;

    /// Blocks until the socket reaches `mode` or `timeout` elapses.
    ///
    /// Returns `false` on timeout. `None` waits forever.
    fn wait_ready(&self, mode: SelectMode, timeout: Option<Duration>) -> io::Result<bool>;

    /// Shuts down one or both halves of the connection.
    fn shutdown(&self, how: Shutdown) -> io::Result<()>;

    /// Returns the blocking read timeout.
    fn read_timeout(&self) -> Option<Duration>;

    /// Sets the blocking read timeout.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Returns the blocking write timeout.
    fn write_timeout(&self) -> Option<Duration>;

    /// Sets the blocking write timeout.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Releases the socket.
    fn close(self) -> io::Result<()>
    where
        Self: Sized,
    {
        drop(self);
        Ok(())
    }
}

/// Shared handle. Closing one handle only releases that reference; the
/// descriptor is closed when the last handle goes away.
impl<T: Socket> Socket for Arc<T> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn available(&self) -> io::Result<usize> {
        (**self).available()
    }

    fn receive(&self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).receive(buf)
    }

    fn send(&self, buf: &[u8]) -> io::Result<()> {
        (**self).send(buf)
    }

    fn poll_receive(&self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        (**self).poll_receive(cx, buf)
    }

    fn poll_send(&self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        (**self).poll_send(cx, buf)
    }

    fn wait_ready(&self, mode: SelectMode, timeout: Option<Duration>) -> io::Result<bool> {
        (**self).wait_ready(mode, timeout)
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        (**self).shutdown(how)
    }

    fn read_timeout(&self) -> Option<Duration> {
        (**self).read_timeout()
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_read_timeout(timeout)
    }

    fn write_timeout(&self) -> Option<Duration> {
        (**self).write_timeout()
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_write_timeout(timeout)
    }
}
