//! Cancellable network stream over a connected socket.

use std::future::poll_fn;
use std::io;
use std::net::Shutdown;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::sync::CancellationToken;

use crate::config::{POLL_INTERVAL, StreamConfig};
use crate::socket::{SelectMode, Socket};
use crate::tcp::TcpSocket;
use crate::{Error, Result};

/// A forward-only byte stream over a connected socket.
///
/// The stream is either connected or not. It starts out connected if the
/// socket has a peer, and becomes disconnected exactly once: when it is
/// closed, when an async operation fails, or when an async operation is
/// cancelled with [`disconnect_on_cancel`](Self::disconnect_on_cancel) set.
/// Every read or write after that fails with [`Error::NotConnected`] without
/// touching the socket.
///
/// Async operations take `&mut self`, so only one can be in flight at a time.
/// To read and write concurrently, build two streams over an
/// `Arc<TcpSocket>`.
#[derive(Debug)]
pub struct NetworkStream<S: Socket = TcpSocket> {
    socket: Option<S>,
    owns_socket: bool,
    connected: bool,
    disconnect_on_cancel: bool,
}

impl<S: Socket> NetworkStream<S> {
    /// Creates a stream over `socket`.
    ///
    /// If `owns_socket` is false the socket is never closed by the stream;
    /// take it back with [`into_socket`](Self::into_socket).
    pub fn new(socket: S, owns_socket: bool) -> Self {
        let connected = socket.is_connected();
        Self {
            socket: Some(socket),
            owns_socket,
            connected,
            disconnect_on_cancel: true,
        }
    }

    /// Creates a stream and applies `config` to it.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured timeout is zero or cannot be applied.
    pub fn with_config(socket: S, owns_socket: bool, config: &StreamConfig) -> Result<Self> {
        let mut stream = Self::new(socket, owns_socket);
        stream.disconnect_on_cancel = config.disconnect_on_cancel;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        Ok(stream)
    }

    /// Returns the socket, or `None` once an owned socket has been released.
    #[must_use]
    pub const fn socket(&self) -> Option<&S> {
        self.socket.as_ref()
    }

    /// Disconnects the stream and hands back the socket without closing it.
    #[must_use]
    pub fn into_socket(mut self) -> Option<S> {
        self.connected = false;
        self.socket.take()
    }

    /// Returns true until the stream is disconnected.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Returns true if the stream closes the socket on teardown.
    #[must_use]
    pub const fn owns_socket(&self) -> bool {
        self.owns_socket
    }

    /// Returns true if a cancelled async operation tears down the connection.
    #[must_use]
    pub const fn disconnect_on_cancel(&self) -> bool {
        self.disconnect_on_cancel
    }

    /// Sets whether a cancelled async operation tears down the connection.
    pub const fn set_disconnect_on_cancel(&mut self, disconnect: bool) {
        self.disconnect_on_cancel = disconnect;
    }

    /// Returns true if unread data is buffered in the socket.
    #[must_use]
    pub fn data_available(&self) -> bool {
        self.connected
            && self
                .socket
                .as_ref()
                .is_some_and(|s| s.available().is_ok_and(|n| n > 0))
    }

    /// Returns true if the stream can be read from.
    #[must_use]
    pub const fn can_read(&self) -> bool {
        self.connected
    }

    /// Returns true if the stream can be written to.
    #[must_use]
    pub const fn can_write(&self) -> bool {
        self.connected
    }

    /// Returns true if the stream supports timeouts.
    #[must_use]
    pub const fn can_timeout(&self) -> bool {
        self.connected
    }

    /// Always false: a socket cannot seek.
    #[must_use]
    pub const fn can_seek(&self) -> bool {
        false
    }

    /// Not supported.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::NotSupported`].
    pub const fn length(&self) -> Result<u64> {
        Err(Error::NotSupported("length"))
    }

    /// Not supported.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::NotSupported`].
    pub const fn set_length(&mut self, _len: u64) -> Result<()> {
        Err(Error::NotSupported("set_length"))
    }

    /// Not supported.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::NotSupported`].
    pub const fn position(&self) -> Result<u64> {
        Err(Error::NotSupported("position"))
    }

    /// Not supported.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::NotSupported`].
    pub const fn set_position(&mut self, _pos: u64) -> Result<()> {
        Err(Error::NotSupported("set_position"))
    }

    /// Returns the blocking read timeout; `None` means no timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] once the socket has been released.
    pub fn read_timeout(&self) -> Result<Option<Duration>> {
        Ok(self.socket.as_ref().ok_or(Error::NotConnected)?.read_timeout())
    }

    /// Sets the blocking read timeout; `None` means no timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTimeout`] for a zero duration.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        let timeout = validate_timeout(timeout)?;
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;
        socket.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Returns the blocking write timeout; `None` means no timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] once the socket has been released.
    pub fn write_timeout(&self) -> Result<Option<Duration>> {
        Ok(self.socket.as_ref().ok_or(Error::NotConnected)?.write_timeout())
    }

    /// Sets the blocking write timeout; `None` means no timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTimeout`] for a zero duration.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        let timeout = validate_timeout(timeout)?;
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;
        socket.set_write_timeout(timeout)?;
        Ok(())
    }

    /// Reads into `buf`, blocking the calling thread.
    ///
    /// Returns the number of bytes read; zero means the peer closed the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] after disconnect, or [`Error::Io`] if
    /// the receive fails.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.connected_socket()?.receive(buf)?)
    }

    /// Writes all of `buf`, blocking the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] after disconnect, or [`Error::Io`] if
    /// the send fails.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.connected_socket()?.send(buf)?;
        Ok(())
    }

    /// No-op; writes are not buffered.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub const fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Reads into `buf`, suspending until data arrives or `cancel` fires.
    ///
    /// Passing `None` makes the read uncancellable.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if the token is (or becomes) cancelled. The
    ///   socket is not touched when the token is already cancelled.
    /// - [`Error::NotConnected`] after disconnect.
    /// - [`Error::Io`] if the receive fails; the stream is disconnected.
    pub async fn read_async(
        &mut self,
        buf: &mut [u8],
        cancel: Option<&CancellationToken>,
    ) -> Result<usize> {
        self.run_cancellable(cancel, |socket, cx| socket.poll_receive(cx, buf))
            .await
    }

    /// Writes all of `buf`, suspending until it is sent or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Same as [`read_async`](Self::read_async).
    pub async fn write_async(
        &mut self,
        buf: &[u8],
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        let mut written = 0;
        self.run_cancellable(cancel, |socket, cx| {
            while written < buf.len() {
                let n = ready!(socket.poll_send(cx, &buf[written..]))?;
                if n == 0 {
                    return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
                }
                written += n;
            }
            Poll::Ready(Ok(()))
        })
        .await
    }

    /// No-op; writes are not buffered.
    ///
    /// # Errors
    ///
    /// Never fails.
    #[allow(clippy::unused_async)]
    pub async fn flush_async(&mut self) -> Result<()> {
        Ok(())
    }

    /// Blocks until the socket reaches `mode` or `cancel` fires.
    ///
    /// Without a token this returns immediately, leaving the caller to block
    /// in the following read or write. With one, cancellation is checked
    /// every [`POLL_INTERVAL`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the token fires, [`Error::NotConnected`]
    /// after disconnect, or [`Error::Io`] if waiting fails.
    pub fn poll(&self, mode: SelectMode, cancel: Option<&CancellationToken>) -> Result<()> {
        let Some(token) = cancel else {
            return Ok(());
        };

        loop {
            if token.is_cancelled() {
                tracing::trace!(?mode, "poll cancelled");
                return Err(Error::Cancelled);
            }
            if self.connected_socket()?.wait_ready(mode, Some(POLL_INTERVAL))? {
                break;
            }
        }

        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Closes the stream.
    ///
    /// An owned socket is closed; a borrowed one is left open. Calling this
    /// again does nothing.
    pub fn close(&mut self) {
        if self.connected {
            self.disconnect();
        }
    }

    fn connected_socket(&self) -> Result<&S> {
        match &self.socket {
            Some(socket) if self.connected => Ok(socket),
            _ => Err(Error::NotConnected),
        }
    }

    fn disconnect(&mut self) {
        self.connected = false;
        if !self.owns_socket {
            return;
        }
        if let Some(socket) = self.socket.take()
            && let Err(e) = socket.close()
        {
            tracing::debug!(error = %e, "Failed to close socket");
        }
    }

    async fn run_cancellable<T>(
        &mut self,
        cancel: Option<&CancellationToken>,
        mut op: impl FnMut(&S, &mut Context<'_>) -> Poll<io::Result<T>>,
    ) -> Result<T> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(Error::Cancelled);
        }

        let socket = self.connected_socket()?;
        let io = poll_fn(|cx| op(socket, cx));
        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => None,
                result = io => Some(result),
            },
            None => Some(io.await),
        };

        match outcome {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => {
                tracing::debug!(error = %e, "Socket operation failed, disconnecting");
                self.disconnect();
                Err(Error::Io(e))
            }
            None => {
                if self.disconnect_on_cancel {
                    tracing::debug!("Socket operation cancelled, disconnecting");
                    self.shutdown_quietly();
                    self.disconnect();
                }
                Err(Error::Cancelled)
            }
        }
    }

    fn shutdown_quietly(&self) {
        if let Some(socket) = &self.socket
            && socket.is_connected()
            && let Err(e) = socket.shutdown(Shutdown::Both)
        {
            tracing::debug!(error = %e, "Failed to shut down socket");
        }
    }

    fn poll_transfer<T>(
        &mut self,
        cx: &mut Context<'_>,
        op: impl FnOnce(&S, &mut Context<'_>) -> Poll<io::Result<T>>,
    ) -> Poll<io::Result<T>> {
        let socket = match self.connected_socket() {
            Ok(socket) => socket,
            Err(e) => return Poll::Ready(Err(e.into())),
        };
        let result = ready!(op(socket, cx));
        if let Err(e) = &result {
            tracing::debug!(error = %e, "Socket operation failed, disconnecting");
            self.disconnect();
        }
        Poll::Ready(result)
    }
}

impl<S: Socket> Drop for NetworkStream<S> {
    fn drop(&mut self) {
        self.close();
    }
}

fn validate_timeout(timeout: Option<Duration>) -> Result<Option<Duration>> {
    match timeout {
        Some(t) if t.is_zero() => Err(Error::InvalidTimeout(t)),
        other => Ok(other),
    }
}

impl<S: Socket> io::Read for NetworkStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(Self::read(self, buf)?)
    }
}

impl<S: Socket> io::Write for NetworkStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Self::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Socket> io::Seek for NetworkStream<S> {
    fn seek(&mut self, _pos: io::SeekFrom) -> io::Result<u64> {
        Err(Error::NotSupported("seek").into())
    }
}

impl<S: Socket + Unpin> AsyncRead for NetworkStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let unfilled = buf.initialize_unfilled();
        let n = ready!(
            self.get_mut()
                .poll_transfer(cx, |socket, cx| socket.poll_receive(cx, unfilled))
        )?;
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

impl<S: Socket + Unpin> AsyncWrite for NetworkStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut()
            .poll_transfer(cx, |socket, cx| socket.poll_send(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(
            self.connected_socket()
                .map_err(io::Error::from)
                .and_then(|socket| socket.shutdown(Shutdown::Write)),
        )
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::needless_collect,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio_test::{assert_pending, assert_ready_err, task};

    /// Counts every call the stream makes into the socket.
    #[derive(Debug, Default)]
    struct Calls {
        receives: AtomicUsize,
        sends: AtomicUsize,
        shutdowns: AtomicUsize,
        closes: AtomicUsize,
    }

    /// Scripted socket: queued reads complete immediately, an empty queue
    /// stays pending forever.
    #[derive(Debug)]
    struct MockSocket {
        calls: Arc<Calls>,
        connected: AtomicBool,
        reads: Mutex<VecDeque<io::Result<Vec<u8>>>>,
        sent: Arc<Mutex<Vec<u8>>>,
        send_error: Option<io::ErrorKind>,
        fail_close: bool,
        timeout: Mutex<Option<Duration>>,
    }

    impl MockSocket {
        fn new() -> (Self, Arc<Calls>) {
            let calls = Arc::new(Calls::default());
            let socket = Self {
                calls: Arc::clone(&calls),
                connected: AtomicBool::new(true),
                reads: Mutex::new(VecDeque::new()),
                sent: Arc::new(Mutex::new(Vec::new())),
                send_error: None,
                fail_close: false,
                timeout: Mutex::new(None),
            };
            (socket, calls)
        }

        fn with_read(self, data: &[u8]) -> Self {
            self.reads.lock().unwrap().push_back(Ok(data.to_vec()));
            self
        }

        fn with_read_error(self, kind: io::ErrorKind) -> Self {
            self.reads.lock().unwrap().push_back(Err(kind.into()));
            self
        }
    }

    impl Socket for MockSocket {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn available(&self) -> io::Result<usize> {
            let reads = self.reads.lock().unwrap();
            Ok(reads
                .front()
                .and_then(|r| r.as_ref().ok())
                .map_or(0, Vec::len))
        }

        fn receive(&self, buf: &mut [u8]) -> io::Result<usize> {
            self.calls.receives.fetch_add(1, Ordering::SeqCst);
            match self.reads.lock().unwrap().pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::ErrorKind::TimedOut.into()),
            }
        }

        fn send(&self, buf: &[u8]) -> io::Result<()> {
            self.calls.sends.fetch_add(1, Ordering::SeqCst);
            self.sent.lock().unwrap().extend_from_slice(buf);
            Ok(())
        }

        fn poll_receive(&self, _cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
            self.calls.receives.fetch_add(1, Ordering::SeqCst);
            match self.reads.lock().unwrap().pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Poll::Ready(Ok(data.len()))
                }
                Some(Err(e)) => Poll::Ready(Err(e)),
                None => Poll::Pending,
            }
        }

        fn poll_send(&self, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            self.calls.sends.fetch_add(1, Ordering::SeqCst);
            if let Some(kind) = self.send_error {
                return Poll::Ready(Err(kind.into()));
            }
            // Accept at most three bytes per call to exercise partial writes.
            let n = buf.len().min(3);
            self.sent.lock().unwrap().extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn wait_ready(&self, _mode: SelectMode, timeout: Option<Duration>) -> io::Result<bool> {
            if self.reads.lock().unwrap().is_empty() {
                std::thread::sleep(timeout.unwrap_or(Duration::from_millis(10)));
                Ok(false)
            } else {
                Ok(true)
            }
        }

        fn shutdown(&self, _how: Shutdown) -> io::Result<()> {
            self.calls.shutdowns.fetch_add(1, Ordering::SeqCst);
            self.connected.store(false, Ordering::SeqCst);
            Err(io::ErrorKind::NotConnected.into())
        }

        fn read_timeout(&self) -> Option<Duration> {
            *self.timeout.lock().unwrap()
        }

        fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
            *self.timeout.lock().unwrap() = timeout;
            Ok(())
        }

        fn write_timeout(&self) -> Option<Duration> {
            *self.timeout.lock().unwrap()
        }

        fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
            *self.timeout.lock().unwrap() = timeout;
            Ok(())
        }

        fn close(self) -> io::Result<()> {
            self.calls.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(io::Error::other("close failed"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_new_captures_connected_state() {
        let (socket, _) = MockSocket::new();
        socket.connected.store(false, Ordering::SeqCst);
        let stream = NetworkStream::new(socket, true);

        assert!(!stream.is_connected());
        assert!(!stream.can_read());
        assert!(!stream.can_write());
        assert!(!stream.can_timeout());
    }

    #[test]
    fn test_capabilities_while_connected() {
        let (socket, _) = MockSocket::new();
        let stream = NetworkStream::new(socket, true);

        assert!(stream.is_connected());
        assert!(stream.can_read());
        assert!(stream.can_write());
        assert!(stream.can_timeout());
        assert!(!stream.can_seek());
        assert!(stream.disconnect_on_cancel());
    }

    #[test]
    fn test_seek_length_position_not_supported() {
        use std::io::Seek;

        let (socket, calls) = MockSocket::new();
        let mut stream = NetworkStream::new(socket, true);

        assert!(matches!(stream.length(), Err(Error::NotSupported(_))));
        assert!(matches!(stream.position(), Err(Error::NotSupported(_))));
        assert!(matches!(stream.set_position(0), Err(Error::NotSupported(_))));
        assert!(matches!(stream.set_length(10), Err(Error::NotSupported(_))));
        let err = stream.seek(io::SeekFrom::Start(0)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);

        assert!(stream.is_connected());
        assert_eq!(calls.receives.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_data_available() {
        let (socket, _) = MockSocket::new();
        let mut stream = NetworkStream::new(socket.with_read(b"abc"), true);
        assert!(stream.data_available());

        stream.close();
        assert!(!stream.data_available());
    }

    #[test]
    fn test_timeouts() {
        let (socket, _) = MockSocket::new();
        let mut stream = NetworkStream::new(socket, true);

        assert_eq!(stream.read_timeout().unwrap(), None);
        stream
            .set_read_timeout(Some(Duration::from_secs(3)))
            .unwrap();
        assert_eq!(stream.read_timeout().unwrap(), Some(Duration::from_secs(3)));

        let err = stream.set_write_timeout(Some(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, Error::InvalidTimeout(_)));

        stream.set_write_timeout(None).unwrap();
        assert_eq!(stream.write_timeout().unwrap(), None);
    }

    #[test]
    fn test_with_config() {
        let (socket, _) = MockSocket::new();
        let config = StreamConfig::builder()
            .read_timeout(Duration::from_secs(1))
            .disconnect_on_cancel(false)
            .build();
        let stream = NetworkStream::with_config(socket, true, &config).unwrap();

        assert!(!stream.disconnect_on_cancel());
        assert_eq!(stream.read_timeout().unwrap(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_sync_read_write_pass_through() {
        let (socket, calls) = MockSocket::new();
        let sent = Arc::clone(&socket.sent);
        let mut stream = NetworkStream::new(socket.with_read(b"* OK\r\n"), true);

        let mut buf = [0u8; 32];
        let n = stream.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"* OK\r\n");

        stream.write(b"A1 NOOP\r\n").unwrap();
        assert_eq!(sent.lock().unwrap().as_slice(), b"A1 NOOP\r\n");
        assert_eq!(calls.sends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sync_read_error_is_wrapped() {
        let (socket, _) = MockSocket::new();
        let mut stream =
            NetworkStream::new(socket.with_read_error(io::ErrorKind::ConnectionReset), true);

        let mut buf = [0u8; 8];
        match stream.read(&mut buf) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected I/O error, got {other:?}"),
        }
        // The blocking path leaves the connection alone.
        assert!(stream.is_connected());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (socket, calls) = MockSocket::new();
        let mut stream = NetworkStream::new(socket, true);

        stream.close();
        stream.close();
        drop(stream);

        assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_swallows_close_failure() {
        let (mut socket, calls) = MockSocket::new();
        socket.fail_close = true;
        let mut stream = NetworkStream::new(socket, true);

        stream.close();
        assert!(!stream.is_connected());
        assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_closes_owned_socket() {
        let (socket, calls) = MockSocket::new();
        drop(NetworkStream::new(socket, true));
        assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_borrowed_socket_is_never_closed() {
        let (socket, calls) = MockSocket::new();
        let mut stream = NetworkStream::new(socket, false);

        stream.close();
        assert!(!stream.is_connected());
        assert_eq!(calls.closes.load(Ordering::SeqCst), 0);

        let socket = stream.into_socket().unwrap();
        assert!(socket.is_connected());
        assert_eq!(calls.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_operations_after_close_fail_not_connected() {
        let (socket, calls) = MockSocket::new();
        let mut stream = NetworkStream::new(socket.with_read(b"x"), true);
        stream.close();

        let mut buf = [0u8; 4];
        assert!(stream.read(&mut buf).unwrap_err().is_not_connected());
        assert!(stream.write(b"x").unwrap_err().is_not_connected());
        assert_eq!(calls.receives.load(Ordering::SeqCst), 0);
        assert_eq!(calls.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_read_async_completes() {
        let (socket, _) = MockSocket::new();
        let mut stream = NetworkStream::new(socket.with_read(b"+ ready"), true);
        let token = CancellationToken::new();

        let mut buf = [0u8; 16];
        let n = stream.read_async(&mut buf, Some(&token)).await.unwrap();
        assert_eq!(&buf[..n], b"+ ready");
        assert!(stream.is_connected());
    }

    #[tokio::test]
    async fn test_write_async_sends_everything() {
        let (socket, calls) = MockSocket::new();
        let sent = Arc::clone(&socket.sent);
        let mut stream = NetworkStream::new(socket, true);

        stream
            .write_async(b"A001 AUTHENTICATE NTLM\r\n", None)
            .await
            .unwrap();

        assert_eq!(sent.lock().unwrap().as_slice(), b"A001 AUTHENTICATE NTLM\r\n");
        assert!(calls.sends.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_never_touches_socket() {
        let (socket, calls) = MockSocket::new();
        let mut stream = NetworkStream::new(socket.with_read(b"data"), true);
        let token = CancellationToken::new();
        token.cancel();

        let mut buf = [0u8; 8];
        let err = stream.read_async(&mut buf, Some(&token)).await.unwrap_err();
        assert!(err.is_cancelled());
        let err = stream.write_async(b"x", Some(&token)).await.unwrap_err();
        assert!(err.is_cancelled());

        assert_eq!(calls.receives.load(Ordering::SeqCst), 0);
        assert_eq!(calls.sends.load(Ordering::SeqCst), 0);
        assert_eq!(calls.shutdowns.load(Ordering::SeqCst), 0);
        assert_eq!(calls.closes.load(Ordering::SeqCst), 0);
        assert!(stream.is_connected());
    }

    #[test]
    fn test_cancel_in_flight_disconnects() {
        let (socket, calls) = MockSocket::new();
        let mut stream = NetworkStream::new(socket, true);
        let token = CancellationToken::new();
        let mut buf = [0u8; 8];

        {
            let mut read = task::spawn(stream.read_async(&mut buf, Some(&token)));
            assert_pending!(read.poll());
            token.cancel();
            assert!(read.is_woken());
            let err = assert_ready_err!(read.poll());
            assert!(err.is_cancelled());
        }

        assert!(!stream.is_connected());
        assert_eq!(calls.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
        assert!(stream.read(&mut buf).unwrap_err().is_not_connected());
        assert!(stream.write(b"x").unwrap_err().is_not_connected());

        stream.close();
        assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_in_flight_keeps_connection_when_configured() {
        let (socket, calls) = MockSocket::new();
        let mut stream = NetworkStream::new(socket, true);
        stream.set_disconnect_on_cancel(false);
        let token = CancellationToken::new();
        let mut buf = [0u8; 8];

        {
            let mut read = task::spawn(stream.read_async(&mut buf, Some(&token)));
            assert_pending!(read.poll());
            token.cancel();
            let err = assert_ready_err!(read.poll());
            assert!(err.is_cancelled());
        }

        assert!(stream.is_connected());
        assert_eq!(calls.shutdowns.load(Ordering::SeqCst), 0);
        assert_eq!(calls.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_disconnects_borrowed_socket_without_closing() {
        let (socket, calls) = MockSocket::new();
        let mut stream = NetworkStream::new(socket, false);
        let token = CancellationToken::new();
        let mut buf = [0u8; 8];

        {
            let mut read = task::spawn(stream.read_async(&mut buf, Some(&token)));
            assert_pending!(read.poll());
            token.cancel();
            assert_ready_err!(read.poll());
        }

        assert!(!stream.is_connected());
        assert_eq!(calls.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(calls.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_uncancellable_read_stays_pending() {
        let (socket, _) = MockSocket::new();
        let mut stream = NetworkStream::new(socket, true);
        let mut buf = [0u8; 8];

        let mut read = task::spawn(stream.read_async(&mut buf, None));
        assert_pending!(read.poll());
        assert_pending!(read.poll());
    }

    #[tokio::test]
    async fn test_async_failure_disconnects_and_wraps() {
        let (socket, calls) = MockSocket::new();
        let mut stream =
            NetworkStream::new(socket.with_read_error(io::ErrorKind::ConnectionReset), true);

        let mut buf = [0u8; 8];
        match stream.read_async(&mut buf, None).await {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected I/O error, got {other:?}"),
        }

        assert!(!stream.is_connected());
        assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
        // Failure teardown does not shut down, only cancellation does.
        assert_eq!(calls.shutdowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_write_async_failure_disconnects() {
        let (mut socket, calls) = MockSocket::new();
        socket.send_error = Some(io::ErrorKind::BrokenPipe);
        let mut stream = NetworkStream::new(socket, true);

        let err = stream.write_async(b"data", None).await.unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
        assert!(!stream.is_connected());

        let err = stream.write_async(b"data", None).await.unwrap_err();
        assert!(err.is_not_connected());
        assert_eq!(calls.sends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_poll_without_token_returns_immediately() {
        let (socket, _) = MockSocket::new();
        let mut stream = NetworkStream::new(socket, true);
        stream.poll(SelectMode::Read, None).unwrap();

        // Even a closed stream is not inspected without a token.
        stream.close();
        stream.poll(SelectMode::Read, None).unwrap();
    }

    #[test]
    fn test_poll_returns_when_ready() {
        let (socket, _) = MockSocket::new();
        let stream = NetworkStream::new(socket.with_read(b"x"), true);
        let token = CancellationToken::new();

        stream.poll(SelectMode::Read, Some(&token)).unwrap();
    }

    #[test]
    fn test_poll_cancelled_before_start() {
        let (socket, _) = MockSocket::new();
        let stream = NetworkStream::new(socket.with_read(b"x"), true);
        let token = CancellationToken::new();
        token.cancel();

        let err = stream.poll(SelectMode::Read, Some(&token)).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_poll_observes_cancellation_within_interval() {
        let (socket, _) = MockSocket::new();
        let stream = NetworkStream::new(socket, true);
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                token.cancel();
            })
        };

        let start = std::time::Instant::now();
        let err = stream.poll(SelectMode::Read, Some(&token)).unwrap_err();
        assert!(err.is_cancelled());
        assert!(start.elapsed() < Duration::from_millis(100) + POLL_INTERVAL * 2);
        canceller.join().unwrap();
    }

    #[tokio::test]
    async fn test_async_read_trait() {
        use tokio::io::AsyncReadExt;

        let (socket, _) = MockSocket::new();
        let mut stream = NetworkStream::new(socket.with_read(b"hello"), true);

        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_async_write_trait() {
        use tokio::io::AsyncWriteExt;

        let (socket, _) = MockSocket::new();
        let sent = Arc::clone(&socket.sent);
        let mut stream = NetworkStream::new(socket, true);

        stream.write_all(b"EHLO client\r\n").await.unwrap();
        AsyncWriteExt::flush(&mut stream).await.unwrap();
        assert_eq!(sent.lock().unwrap().as_slice(), b"EHLO client\r\n");
    }

    #[tokio::test]
    async fn test_async_trait_after_close_is_not_connected() {
        use tokio::io::AsyncReadExt;

        let (socket, _) = MockSocket::new();
        let mut stream = NetworkStream::new(socket.with_read(b"x"), true);
        stream.close();

        let mut buf = [0u8; 1];
        let err = AsyncReadExt::read(&mut stream, &mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_flush_is_a_no_op() {
        let (socket, calls) = MockSocket::new();
        let mut stream = NetworkStream::new(socket, true);

        stream.flush_async().await.unwrap();
        stream.flush().unwrap();
        assert_eq!(calls.sends.load(Ordering::SeqCst), 0);
        assert!(stream.is_connected());
    }

    #[test]
    fn test_std_io_traits() {
        use std::io::{Read, Write};

        let (socket, _) = MockSocket::new();
        let sent = Arc::clone(&socket.sent);
        let mut stream = NetworkStream::new(socket.with_read(b"250 OK"), true);

        let mut buf = [0u8; 6];
        Read::read_exact(&mut stream, &mut buf).unwrap();
        assert_eq!(&buf, b"250 OK");

        Write::write_all(&mut stream, b"QUIT\r\n").unwrap();
        assert_eq!(sent.lock().unwrap().as_slice(), b"QUIT\r\n");
    }
}
