//! Loopback tests for `NetworkStream` over real TCP sockets.

#![allow(clippy::unwrap_used, clippy::similar_names)]

use std::sync::Arc;
use std::time::Duration;

use mailledger_net::{
    CancellationToken, Error, NetworkStream, SelectMode, StreamConfig, TcpSocket,
};
use mailledger_ntlm::{NtlmFlags, decode_negotiate, encode_negotiate};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn connect() -> (TcpSocket, TcpStream) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (TcpSocket::new(client.unwrap()), server.unwrap().0)
}

#[tokio::test]
async fn test_blocking_round_trip() {
    let (socket, mut peer) = connect().await;
    let config = StreamConfig::builder()
        .io_timeout(Duration::from_secs(5))
        .build();
    let mut stream = NetworkStream::with_config(socket, true, &config).unwrap();
    assert_eq!(stream.read_timeout().unwrap(), Some(Duration::from_secs(5)));

    peer.write_all(b"* OK ready\r\n").await.unwrap();
    let mut buf = [0u8; 64];
    let n = stream.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"* OK ready\r\n");

    stream.write(b"A1 NOOP\r\n").unwrap();
    let mut line = [0u8; 9];
    peer.read_exact(&mut line).await.unwrap();
    assert_eq!(&line, b"A1 NOOP\r\n");
}

#[tokio::test]
async fn test_blocking_read_times_out_and_stays_connected() {
    let (socket, mut peer) = connect().await;
    let mut stream = NetworkStream::new(socket, true);
    stream
        .set_read_timeout(Some(Duration::from_millis(50)))
        .unwrap();

    let mut buf = [0u8; 8];
    let err = stream.read(&mut buf).unwrap_err();
    assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::TimedOut));
    assert!(stream.is_connected());

    peer.write_all(b"late").await.unwrap();
    let n = stream.read_async(&mut buf, None).await.unwrap();
    assert_eq!(&buf[..n], b"late");
}

#[tokio::test]
async fn test_async_round_trip() {
    let (socket, mut peer) = connect().await;
    let mut stream = NetworkStream::new(socket, true);
    let cancel = CancellationToken::new();

    stream
        .write_async(b"EHLO client\r\n", Some(&cancel))
        .await
        .unwrap();
    let mut line = [0u8; 13];
    peer.read_exact(&mut line).await.unwrap();
    assert_eq!(&line, b"EHLO client\r\n");

    peer.write_all(b"250 OK\r\n").await.unwrap();
    let mut buf = [0u8; 32];
    let n = stream.read_async(&mut buf, Some(&cancel)).await.unwrap();
    assert_eq!(&buf[..n], b"250 OK\r\n");
    assert!(stream.is_connected());
}

#[tokio::test]
async fn test_cancel_in_flight_disconnects() {
    let (socket, mut peer) = connect().await;
    let mut stream = NetworkStream::new(socket, true);
    let cancel = CancellationToken::new();

    let mut buf = [0u8; 16];
    let (result, ()) = tokio::join!(stream.read_async(&mut buf, Some(&cancel)), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    assert!(result.unwrap_err().is_cancelled());
    assert!(!stream.is_connected());
    assert!(stream.socket().is_none());

    let err = stream.read_async(&mut buf, None).await.unwrap_err();
    assert!(err.is_not_connected());
    assert!(stream.write(b"x").unwrap_err().is_not_connected());

    // The peer sees the connection go away.
    let mut rest = Vec::new();
    let n = tokio::time::timeout(Duration::from_secs(5), peer.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_cancel_without_disconnect_keeps_stream() {
    let (socket, mut peer) = connect().await;
    let config = StreamConfig::builder().disconnect_on_cancel(false).build();
    let mut stream = NetworkStream::with_config(socket, true, &config).unwrap();
    let cancel = CancellationToken::new();

    let mut buf = [0u8; 16];
    let (result, ()) = tokio::join!(stream.read_async(&mut buf, Some(&cancel)), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });
    assert!(result.unwrap_err().is_cancelled());
    assert!(stream.is_connected());

    peer.write_all(b"still here").await.unwrap();
    let n = stream.read_async(&mut buf, None).await.unwrap();
    assert_eq!(&buf[..n], b"still here");
}

#[tokio::test]
async fn test_pre_cancelled_token_consumes_nothing() {
    let (socket, mut peer) = connect().await;
    let mut stream = NetworkStream::new(socket, true);
    let cancel = CancellationToken::new();
    cancel.cancel();

    peer.write_all(b"data").await.unwrap();
    let mut buf = [0u8; 8];
    let err = stream.read_async(&mut buf, Some(&cancel)).await.unwrap_err();
    assert!(err.is_cancelled());

    let n = stream.read_async(&mut buf, None).await.unwrap();
    assert_eq!(&buf[..n], b"data");
}

#[tokio::test]
async fn test_peer_close_reads_zero() {
    let (socket, peer) = connect().await;
    let mut stream = NetworkStream::new(socket, true);
    drop(peer);

    let mut buf = [0u8; 8];
    assert_eq!(stream.read_async(&mut buf, None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_poll_and_data_available() {
    let (socket, mut peer) = connect().await;
    let stream = NetworkStream::new(socket, true);
    let cancel = CancellationToken::new();

    assert!(!stream.data_available());
    stream.poll(SelectMode::Write, Some(&cancel)).unwrap();

    peer.write_all(b"+").await.unwrap();
    stream.poll(SelectMode::Read, Some(&cancel)).unwrap();
    assert!(stream.data_available());

    cancel.cancel();
    assert!(
        stream
            .poll(SelectMode::Read, Some(&cancel))
            .unwrap_err()
            .is_cancelled()
    );
    assert!(stream.is_connected());
}

#[tokio::test]
async fn test_duplex_over_shared_socket() {
    let (socket, mut peer) = connect().await;
    let shared = Arc::new(socket);
    let mut reader = NetworkStream::new(Arc::clone(&shared), false);
    let mut writer = NetworkStream::new(shared, true);
    let cancel = CancellationToken::new();

    let mut buf = [0u8; 4];
    let (read, written, ()) = tokio::join!(
        reader.read_async(&mut buf, Some(&cancel)),
        writer.write_async(b"ping", Some(&cancel)),
        async {
            let mut ping = [0u8; 4];
            peer.read_exact(&mut ping).await.unwrap();
            assert_eq!(&ping, b"ping");
            peer.write_all(b"pong").await.unwrap();
        }
    );
    written.unwrap();
    assert_eq!(&buf[..read.unwrap()], b"pong");
}

#[tokio::test]
async fn test_borrowed_socket_survives_close() {
    let (socket, mut peer) = connect().await;
    let mut stream = NetworkStream::new(socket, false);
    stream.close();
    assert!(!stream.is_connected());

    let socket = stream.into_socket().unwrap();
    let mut stream = NetworkStream::new(socket, true);
    stream.write_async(b"again", None).await.unwrap();

    let mut buf = [0u8; 5];
    peer.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"again");
}

#[tokio::test]
async fn test_ntlm_negotiate_over_transport() {
    let (socket, mut peer) = connect().await;
    let mut stream = NetworkStream::new(socket, true);
    let cancel = CancellationToken::new();

    let message = encode_negotiate("host1", "", None).unwrap();
    stream.write_async(&message, Some(&cancel)).await.unwrap();

    let mut received = [0u8; 37];
    peer.read_exact(&mut received).await.unwrap();
    let negotiate = decode_negotiate(&received, 0, received.len()).unwrap();
    assert_eq!(negotiate.workstation(), "HOST1");
    assert_eq!(negotiate.domain(), "");
    assert!(
        negotiate
            .flags()
            .contains(NtlmFlags::NEGOTIATE_WORKSTATION_SUPPLIED)
    );
}
