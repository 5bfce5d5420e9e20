//! Integration tests for the connection adapter: dial, accept, byte I/O,
//! deadlines and close ordering.

mod common;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use common::{Pki, STEP, connect, connected_pair, init_tracing, listen, loopback};
use ferry_pki::Role;
use ferry_transport_quic::{
    CLOSE_CODE_OK, CLOSE_CODE_SETUP_FAILED, ConnectionState, Connector, Dialer, Error, Listener,
    Purpose, QuicConfig, QuicDialer, QuicListener,
};
use futures::StreamExt;
use quinn::VarInt;
use quinn::crypto::rustls::QuicClientConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{Instant, timeout};

#[tokio::test]
async fn test_ping_pong() {
    init_tracing();

    let (mut client, mut server, _listener, _pki) = connected_pair().await;

    assert_eq!(client.purpose(), Purpose::Control);
    assert_eq!(server.purpose(), Purpose::Control);
    assert_eq!(client.state(), ConnectionState::Established);
    assert_eq!(server.state(), ConnectionState::Established);
    assert_eq!(client.stream_id(), server.stream_id());

    client.write_all(b"PING").await.unwrap();
    let mut buf = [0u8; 4];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"PING");

    server.write_all(b"PONG").await.unwrap();
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"PONG");

    assert_eq!(client.remote_addr(), server.local_addr());
    assert_eq!(server.remote_addr().port(), client.local_addr().port());
}

#[tokio::test]
async fn test_peer_identity() {
    init_tracing();

    let (client, server, _listener, _pki) = connected_pair().await;

    let unit = client.peer_identity().unwrap();
    assert_eq!(unit.role(), Role::Unit);
    assert_eq!(unit.name(), "u1");

    let controller = server.peer_identity().unwrap();
    assert_eq!(controller.role(), Role::Controller);
    assert_eq!(controller.name(), "main");
}

#[tokio::test]
async fn test_close_finishes_stream_then_connection() {
    init_tracing();

    let (mut client, server, _listener, _pki) = connected_pair().await;

    client.write_all(b"bye").await.unwrap();
    client.close().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);

    let reason = timeout(STEP, server.connection().closed()).await.unwrap();
    match reason {
        quinn::ConnectionError::ApplicationClosed(close) => {
            assert_eq!(close.error_code, CLOSE_CODE_OK);
            assert_eq!(&close.reason[..], b"closing");
        }
        other => panic!("unexpected close reason: {other}"),
    }
    assert_eq!(server.state(), ConnectionState::Closed);

    // Closing again is a no-op.
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_close_after_shutdown_closes_connection() {
    init_tracing();

    let (mut client, mut server, _listener, _pki) = connected_pair().await;

    client.write_all(b"request").await.unwrap();
    client.shutdown().await.unwrap();

    let mut received = Vec::new();
    timeout(STEP, server.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"request");

    client.close().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);

    match timeout(STEP, server.connection().closed()).await.unwrap() {
        quinn::ConnectionError::ApplicationClosed(close) => {
            assert_eq!(close.error_code, CLOSE_CODE_OK);
        }
        other => panic!("unexpected close reason: {other}"),
    }
}

#[tokio::test]
async fn test_stream_close_failure_keeps_connection_open() {
    init_tracing();

    let (mut client, mut server, _listener, _pki) = connected_pair().await;

    // A reset send half cannot be finished.
    client.reset(VarInt::from_u32(7)).unwrap();

    let result = client.close().await;
    assert!(matches!(result, Err(Error::StreamClose(_))));
    assert!(client.connection().close_reason().is_none());
    assert_eq!(client.state(), ConnectionState::Established);

    let mut rest = Vec::new();
    let err = timeout(STEP, server.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap_err();
    assert_ne!(err.kind(), io::ErrorKind::TimedOut);

    // The connection still carries new streams.
    let client_mux = client.multiplexer();
    let server_mux = server.multiplexer();
    let mut stream = client_mux.open_stream(Purpose::Payload).await.unwrap();
    stream.write_all(b"still here").await.unwrap();
    let (mut accepted, _) = server_mux.accept_stream().await.unwrap();
    let mut buf = [0u8; 10];
    accepted.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"still here");
}

#[tokio::test]
async fn test_close_is_shared_with_multiplexer() {
    init_tracing();

    let (mut client, _server, _listener, _pki) = connected_pair().await;
    let mux = client.multiplexer();

    client.close().await.unwrap();

    assert!(mux.is_closed());
    assert_eq!(mux.state(), ConnectionState::Closed);
    assert!(matches!(
        mux.open_stream(Purpose::Payload).await,
        Err(Error::Closed(None))
    ));
    mux.close().unwrap();
}

#[tokio::test]
async fn test_read_deadline() {
    init_tracing();

    let (mut client, mut server, _listener, _pki) = connected_pair().await;

    server.set_read_deadline(Some(Instant::now() + Duration::from_millis(100)));
    let mut buf = [0u8; 4];
    let err = timeout(STEP, server.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);

    // Clearing the deadline makes the stream readable again.
    server.set_read_deadline(None);
    client.write_all(b"late").await.unwrap();
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"late");
}

#[tokio::test]
async fn test_elapsed_write_deadline() {
    init_tracing();

    let (mut client, _server, _listener, _pki) = connected_pair().await;

    client.set_deadline(Some(Instant::now()));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let err = client.write_all(b"too late").await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
}

#[tokio::test]
async fn test_handshake_timeout() {
    init_tracing();

    let pki = Pki::new();
    let config = QuicConfig {
        handshake_timeout: Duration::from_millis(300),
        ..QuicConfig::default()
    };

    // A bound UDP socket that never answers.
    let silent = std::net::UdpSocket::bind(loopback()).unwrap();
    let address = silent.local_addr().unwrap().to_string();

    let result = ferry_transport_quic::dial(&address, &pki.client_tls(), &config).await;
    assert!(matches!(result, Err(Error::HandshakeTimeout(_))));
}

#[tokio::test]
async fn test_listener_closes_connection_without_initial_stream() {
    init_tracing();

    let pki = Pki::new();
    let config = QuicConfig {
        initial_stream_timeout: Duration::from_millis(200),
        ..QuicConfig::default()
    };
    let listener = Arc::new(listen(&pki.server_tls(), &config));

    let accept = {
        let listener = Arc::clone(&listener);
        tokio::spawn(async move { listener.accept().await })
    };

    // A raw QUIC client that completes the handshake but opens no stream.
    let mut endpoint = quinn::Endpoint::client(loopback()).unwrap();
    let crypto = QuicClientConfig::try_from(pki.client_tls().rustls()).unwrap();
    endpoint.set_default_client_config(quinn::ClientConfig::new(Arc::new(crypto)));
    let silent = endpoint
        .connect(listener.local_addr(), "localhost")
        .unwrap()
        .await
        .unwrap();

    let result = timeout(STEP, accept).await.unwrap().unwrap();
    assert!(matches!(result, Err(Error::InitialStreamTimeout(_))));

    match timeout(STEP, silent.closed()).await.unwrap() {
        quinn::ConnectionError::ApplicationClosed(close) => {
            assert_eq!(close.error_code, CLOSE_CODE_SETUP_FAILED);
        }
        other => panic!("unexpected close reason: {other}"),
    }

    // The listener keeps accepting.
    let (client, server) = connect(&listener, &pki.client_tls(), &config).await;
    assert_eq!(client.purpose(), server.purpose());
}

#[tokio::test]
async fn test_stalled_peer_does_not_block_others() {
    init_tracing();

    let pki = Pki::new();
    let config = QuicConfig {
        initial_stream_timeout: Duration::from_secs(5),
        ..QuicConfig::default()
    };
    let listener = listen(&pki.server_tls(), &config);

    // Completes the handshake, then never opens its initial stream.
    let mut endpoint = quinn::Endpoint::client(loopback()).unwrap();
    let crypto = QuicClientConfig::try_from(pki.client_tls().rustls()).unwrap();
    endpoint.set_default_client_config(quinn::ClientConfig::new(Arc::new(crypto)));
    let _stalled = timeout(
        STEP,
        endpoint.connect(listener.local_addr(), "localhost").unwrap(),
    )
    .await
    .unwrap()
    .unwrap();

    let address = listener.local_addr().to_string();
    let client_tls = pki.client_tls();
    let (dialed, accepted) = timeout(Duration::from_secs(2), async {
        tokio::join!(
            ferry_transport_quic::dial(&address, &client_tls, &config),
            listener.accept()
        )
    })
    .await
    .expect("a stalled peer held up the listener");

    let (client, server) = (dialed.unwrap(), accepted.unwrap());
    assert_eq!(server.remote_addr().port(), client.local_addr().port());
}

#[tokio::test]
async fn test_initial_stream_finished_before_tag() {
    init_tracing();

    let pki = Pki::new();
    let config = QuicConfig::default();
    let listener = Arc::new(listen(&pki.server_tls(), &config));

    let accept = {
        let listener = Arc::clone(&listener);
        tokio::spawn(async move { listener.accept().await })
    };

    let mut endpoint = quinn::Endpoint::client(loopback()).unwrap();
    let crypto = QuicClientConfig::try_from(pki.client_tls().rustls()).unwrap();
    endpoint.set_default_client_config(quinn::ClientConfig::new(Arc::new(crypto)));
    let connection = endpoint
        .connect(listener.local_addr(), "localhost")
        .unwrap()
        .await
        .unwrap();

    let (mut send, _recv) = connection.open_bi().await.unwrap();
    send.finish().unwrap();

    let result = timeout(STEP, accept).await.unwrap().unwrap();
    assert!(matches!(result, Err(Error::PurposeRead(_))));
}

#[tokio::test]
async fn test_listener_close_ends_accept() {
    init_tracing();

    let pki = Pki::new();
    let listener = Arc::new(listen(&pki.server_tls(), &QuicConfig::default()));

    let pending = {
        let listener = Arc::clone(&listener);
        tokio::spawn(async move { listener.accept().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    listener.close();

    let result = timeout(STEP, pending).await.unwrap().unwrap();
    assert!(matches!(result, Err(Error::ListenerClosed)));
    let mut incoming = std::pin::pin!(listener.incoming());
    assert!(incoming.next().await.is_none());
}

#[tokio::test]
async fn test_incoming_yields_connections() {
    init_tracing();

    let pki = Pki::new();
    let config = QuicConfig::default();
    let listener = listen(&pki.server_tls(), &config);
    let address = listener.local_addr().to_string();
    let client_tls = pki.client_tls();

    let dials = async {
        let first = ferry_transport_quic::dial(&address, &client_tls, &config).await;
        let second = ferry_transport_quic::dial(&address, &client_tls, &config).await;
        (first.unwrap(), second.unwrap())
    };
    let accepts = listener.incoming().take(2).collect::<Vec<_>>();

    let ((_first, _second), accepted) = timeout(STEP, async { tokio::join!(dials, accepts) })
        .await
        .unwrap();

    assert_eq!(accepted.len(), 2);
    assert!(accepted.iter().all(Result::is_ok));
}

async fn echo_once<L: Listener>(listener: &L) {
    let mut connection = listener.accept().await.unwrap();
    let mut buf = [0u8; 4];
    connection.read_exact(&mut buf).await.unwrap();
    connection.write_all(&buf).await.unwrap();
    connection.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
}

async fn ping<D: Dialer>(dialer: &D, address: &str) -> [u8; 4] {
    let mut connection = dialer.dial(address).await.unwrap();
    connection.write_all(b"PING").await.unwrap();
    let mut buf = [0u8; 4];
    connection.read_exact(&mut buf).await.unwrap();
    buf
}

#[tokio::test]
async fn test_transport_traits() {
    init_tracing();

    let pki = Pki::new();
    let config = QuicConfig::default();
    let listener = QuicListener::bind(loopback(), &pki.server_tls(), &config).unwrap();
    let address = Listener::local_addr(&listener).unwrap().to_string();
    let dialer = QuicDialer::new(pki.client_tls(), config);

    let (reply, ()) = timeout(STEP, async {
        tokio::join!(ping(&dialer, &address), echo_once(&listener))
    })
    .await
    .unwrap();

    assert_eq!(&reply, b"PING");
}
