//! TCP implementation of [`Socket`].

use std::io::{self, Read, Write};
use std::mem::MaybeUninit;
use std::net::{Shutdown, SocketAddr};
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use socket2::SockRef;
use tokio::net::TcpStream;

use crate::socket::{SelectMode, Socket};

/// How many bytes `available` peeks at.
const PEEK_PROBE_SIZE: usize = 4096;

/// A TCP socket registered with the tokio reactor.
///
/// The async path goes through tokio readiness. The blocking path issues the
/// system calls directly on the descriptor and waits with `poll(2)`, so it
/// does not depend on a runtime thread being free to drive the reactor.
#[derive(Debug)]
pub struct TcpSocket {
    stream: TcpStream,
    /// Milliseconds; zero means no timeout.
    read_timeout_ms: AtomicU64,
    /// Milliseconds; zero means no timeout.
    write_timeout_ms: AtomicU64,
}

impl TcpSocket {
    /// Wraps a connected tokio stream.
    #[must_use]
    pub const fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_timeout_ms: AtomicU64::new(0),
            write_timeout_ms: AtomicU64::new(0),
        }
    }

    /// Wraps a connected standard library stream.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be registered with the reactor.
    pub fn from_std(stream: std::net::TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self::new(TcpStream::from_std(stream)?))
    }

    /// Returns the remote address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is not connected.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    /// Returns the local address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is not bound.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    /// Returns the underlying tokio stream.
    #[must_use]
    pub const fn get_ref(&self) -> &TcpStream {
        &self.stream
    }

    /// Consumes the socket and returns the underlying tokio stream.
    #[must_use]
    pub fn into_inner(self) -> TcpStream {
        self.stream
    }

    fn wait_or_time_out(&self, mode: SelectMode, timeout: Option<Duration>) -> io::Result<()> {
        if self.wait_ready(mode, timeout)? {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("socket not ready for {mode:?} within {timeout:?}"),
            ))
        }
    }
}

impl From<TcpStream> for TcpSocket {
    fn from(stream: TcpStream) -> Self {
        Self::new(stream)
    }
}

impl Socket for TcpSocket {
    fn is_connected(&self) -> bool {
        self.stream.peer_addr().is_ok()
    }

    fn available(&self) -> io::Result<usize> {
        let mut probe = [MaybeUninit::<u8>::uninit(); PEEK_PROBE_SIZE];
        match SockRef::from(&self.stream).peek(&mut probe) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn receive(&self, buf: &mut [u8]) -> io::Result<usize> {
        let sock = SockRef::from(&self.stream);
        let mut reader: &socket2::Socket = &sock;
        loop {
            match reader.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.wait_or_time_out(SelectMode::Read, self.read_timeout())?;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                result => return result,
            }
        }
    }

    fn send(&self, buf: &[u8]) -> io::Result<()> {
        let sock = SockRef::from(&self.stream);
        let mut writer: &socket2::Socket = &sock;
        let mut written = 0;
        while written < buf.len() {
            match writer.write(&buf[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.wait_or_time_out(SelectMode::Write, self.write_timeout())?;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn poll_receive(&self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        loop {
            ready!(self.stream.poll_read_ready(cx))?;
            match self.stream.try_read(buf) {
                // Readiness was stale and has been cleared; re-register.
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                result => return Poll::Ready(result),
            }
        }
    }

    fn poll_send(&self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        loop {
            ready!(self.stream.poll_write_ready(cx))?;
            match self.stream.try_write(buf) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                result => return Poll::Ready(result),
            }
        }
    }

    fn wait_ready(&self, mode: SelectMode, timeout: Option<Duration>) -> io::Result<bool> {
        let (events, ready) = match mode {
            SelectMode::Read => (
                PollFlags::POLLIN,
                PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR,
            ),
            SelectMode::Write => (PollFlags::POLLOUT, PollFlags::POLLOUT | PollFlags::POLLERR),
            SelectMode::Error => (PollFlags::POLLPRI, PollFlags::POLLPRI | PollFlags::POLLERR),
        };
        let timeout = timeout.map_or(PollTimeout::NONE, |t| {
            PollTimeout::try_from(t).unwrap_or(PollTimeout::MAX)
        });

        let mut fds = [PollFd::new(self.stream.as_fd(), events)];
        loop {
            match poll(&mut fds, timeout) {
                Ok(0) => return Ok(false),
                Ok(_) => return Ok(fds[0].revents().is_some_and(|r| r.intersects(ready))),
                Err(Errno::EINTR) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        SockRef::from(&self.stream).shutdown(how)
    }

    fn read_timeout(&self) -> Option<Duration> {
        from_millis(self.read_timeout_ms.load(Ordering::Relaxed))
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.read_timeout_ms
            .store(to_millis(timeout)?, Ordering::Relaxed);
        Ok(())
    }

    fn write_timeout(&self) -> Option<Duration> {
        from_millis(self.write_timeout_ms.load(Ordering::Relaxed))
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.write_timeout_ms
            .store(to_millis(timeout)?, Ordering::Relaxed);
        Ok(())
    }
}

const fn from_millis(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

/// Sub-millisecond timeouts round up so they never read back as "none".
fn to_millis(timeout: Option<Duration>) -> io::Result<u64> {
    match timeout {
        None => Ok(0),
        Some(t) if t.is_zero() => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "cannot set a 0 duration timeout",
        )),
        Some(t) => Ok(u64::try_from(t.as_millis()).unwrap_or(u64::MAX).max(1)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::similar_names)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn pair() -> (TcpSocket, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (TcpSocket::new(client.unwrap()), server.unwrap().0)
    }

    #[test]
    fn test_timeout_millis() {
        assert_eq!(to_millis(None).unwrap(), 0);
        assert_eq!(to_millis(Some(Duration::from_micros(10))).unwrap(), 1);
        assert_eq!(to_millis(Some(Duration::from_secs(2))).unwrap(), 2000);
        assert!(to_millis(Some(Duration::ZERO)).is_err());
        assert_eq!(from_millis(0), None);
        assert_eq!(from_millis(1500), Some(Duration::from_millis(1500)));
    }

    #[tokio::test]
    async fn test_timeouts_round_trip() {
        let (socket, _peer) = pair().await;
        assert_eq!(socket.read_timeout(), None);

        socket
            .set_read_timeout(Some(Duration::from_millis(300)))
            .unwrap();
        socket
            .set_write_timeout(Some(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(socket.read_timeout(), Some(Duration::from_millis(300)));
        assert_eq!(socket.write_timeout(), Some(Duration::from_secs(1)));

        socket.set_read_timeout(None).unwrap();
        assert_eq!(socket.read_timeout(), None);
    }

    #[tokio::test]
    async fn test_blocking_receive_and_available() {
        let (socket, mut peer) = pair().await;
        assert!(socket.is_connected());
        assert_eq!(socket.available().unwrap(), 0);

        peer.write_all(b"hello").await.unwrap();
        assert!(
            socket
                .wait_ready(SelectMode::Read, Some(Duration::from_secs(5)))
                .unwrap()
        );
        assert_eq!(socket.available().unwrap(), 5);

        let mut buf = [0u8; 16];
        let n = socket.receive(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(socket.available().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blocking_receive_times_out() {
        let (socket, _peer) = pair().await;
        socket
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();

        let mut buf = [0u8; 4];
        let err = socket.receive(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_wait_ready_times_out_without_data() {
        let (socket, _peer) = pair().await;
        let ready = socket
            .wait_ready(SelectMode::Read, Some(Duration::from_millis(20)))
            .unwrap();
        assert!(!ready);
        assert!(
            socket
                .wait_ready(SelectMode::Write, Some(Duration::from_millis(20)))
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_shutdown_is_seen_by_peer() {
        use tokio::io::AsyncReadExt;

        let (socket, mut peer) = pair().await;
        socket.send(b"bye").unwrap();
        socket.shutdown(Shutdown::Write).unwrap();

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye");
    }
}
