//! End-to-end tests driving the server over real TCP sockets.
//!
//! Each test binds the built-in listener on an ephemeral port, speaks the
//! legacy wire protocol from a raw client socket, and observes the event
//! stream the way an embedding application would.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use hixie_core::{head_terminator, VersionPolicy, CLOSING_SEQUENCE};
use hixie_server::{EventReceiver, Server, ServerConfig, ServerEvent};

const KEY1: &str = "4 @1  46546xW%0l 1 5";
const KEY2: &str = "12998 5 Y3 1  .P00";
const KEY3: &[u8; 8] = b"^n:ds[4U";
const CHALLENGE_RESPONSE: &[u8; 16] = b"8jKS'y:G*Co,Wxa-";

async fn start(config: ServerConfig) -> (Server, EventReceiver, SocketAddr) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let server = Server::new(config);
    let events = server.events().expect("events taken once");
    let addr = server.listen("127.0.0.1:0").await.expect("listen");
    (server, events, addr)
}

async fn next_event(events: &mut EventReceiver) -> ServerEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn expect_no_event(events: &mut EventReceiver) {
    assert!(
        timeout(Duration::from_millis(200), events.recv())
            .await
            .is_err(),
        "unexpected event"
    );
}

/// Read the 101 response head, up to and including the blank line.
async fn read_response_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0_u8; 1];
    while head_terminator(&head).is_none() {
        let n = stream.read(&mut byte).await.expect("read response head");
        assert!(n > 0, "socket closed before response head completed");
        head.push(byte[0]);
    }
    String::from_utf8(head).expect("response head is ASCII")
}

async fn connect_draft75(addr: SocketAddr, path: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let head = format!(
        "GET {path} HTTP/1.1\r\n\
         Upgrade: WebSocket\r\n\
         Connection: Upgrade\r\n\
         Host: example.com\r\n\
         Origin: http://example.com\r\n\
         \r\n"
    );
    stream.write_all(head.as_bytes()).await.expect("write head");
    stream
}

/// Upgrade a draft75 client and consume its Connection event.
async fn establish_draft75(addr: SocketAddr, events: &mut EventReceiver) -> TcpStream {
    let mut stream = connect_draft75(addr, "/chat").await;
    read_response_head(&mut stream).await;
    match next_event(events).await {
        ServerEvent::Connection(_) => stream,
        other => panic!("expected connection event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_draft75_end_to_end() {
    let (_server, mut events, addr) = start(ServerConfig::default()).await;

    let mut client = connect_draft75(addr, "/x").await;
    let head = read_response_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 101 Web Socket Protocol Handshake\r\n"));
    assert!(head.contains("Upgrade: WebSocket\r\n"));
    assert!(head.contains("Connection: Upgrade\r\n"));
    assert!(head.contains("WebSocket-Origin: http://example.com\r\n"));
    assert!(head.contains("WebSocket-Location: ws://example.com/x\r\n"));

    assert!(matches!(next_event(&mut events).await, ServerEvent::Connection(_)));

    client.write_all(&[0x00, b'h', b'i', 0xFF]).await.unwrap();
    match next_event(&mut events).await {
        ServerEvent::Message { text, .. } => assert_eq!(text, "hi"),
        other => panic!("expected message, got {other:?}"),
    }

    client.write_all(&CLOSING_SEQUENCE).await.unwrap();
    assert!(matches!(next_event(&mut events).await, ServerEvent::Close(_)));
}

#[tokio::test]
async fn test_draft76_end_to_end() {
    let (server, mut events, addr) = start(ServerConfig::default()).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let mut request = format!(
        "GET /demo HTTP/1.1\r\n\
         Upgrade: WebSocket\r\n\
         Connection: Upgrade\r\n\
         Host: example.com\r\n\
         Origin: http://example.com\r\n\
         Sec-WebSocket-Key1: {KEY1}\r\n\
         Sec-WebSocket-Key2: {KEY2}\r\n\
         \r\n"
    )
    .into_bytes();
    request.extend_from_slice(KEY3);
    client.write_all(&request).await.unwrap();

    let head = read_response_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 101 WebSocket Protocol Handshake\r\n"));
    assert!(head.contains("Sec-WebSocket-Origin: http://example.com\r\n"));
    assert!(head.contains("Sec-WebSocket-Location: ws://example.com/demo\r\n"));

    // The raw digest follows the blank line, unencoded.
    let mut digest = [0_u8; 16];
    client.read_exact(&mut digest).await.unwrap();
    assert_eq!(&digest, CHALLENGE_RESPONSE);

    let id = match next_event(&mut events).await {
        ServerEvent::Connection(id) => id,
        other => panic!("expected connection event, got {other:?}"),
    };

    client.write_all(&[0x00, b'p', b'i', b'n', b'g', 0xFF]).await.unwrap();
    match next_event(&mut events).await {
        ServerEvent::Message { text, .. } => assert_eq!(text, "ping"),
        other => panic!("expected message, got {other:?}"),
    }

    assert!(server.send(&id, "pong").await);
    let mut frame = [0_u8; 6];
    client.read_exact(&mut frame).await.unwrap();
    assert_eq!(&frame, &[0x00, b'p', b'o', b'n', b'g', 0xFF]);
}

#[tokio::test]
async fn test_draft76_short_upgrade_head_rejected() {
    let (_server, mut events, addr) = start(ServerConfig::default()).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let mut request = format!(
        "GET /demo HTTP/1.1\r\n\
         Upgrade: WebSocket\r\n\
         Connection: Upgrade\r\n\
         Host: example.com\r\n\
         Sec-WebSocket-Key1: {KEY1}\r\n\
         Sec-WebSocket-Key2: {KEY2}\r\n\
         \r\n"
    )
    .into_bytes();
    request.extend_from_slice(&KEY3[..7]);
    client.write_all(&request).await.unwrap();

    match next_event(&mut events).await {
        ServerEvent::Rejected { reason, .. } => {
            assert_eq!(reason.to_string(), "Missing key3");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(matches!(next_event(&mut events).await, ServerEvent::Close(_)));

    // The socket was destroyed without a response.
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_non_upgrade_requests_never_construct_connections() {
    let (server, mut events, addr) = start(ServerConfig::default()).await;

    // Wrong method.
    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"POST /x HTTP/1.1\r\nUpgrade: WebSocket\r\nConnection: Upgrade\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    // Missing the upgrade headers.
    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"GET /x HTTP/1.1\r\nHost: h\r\n\r\n")
        .await
        .unwrap();
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    expect_no_event(&mut events).await;
    assert!(server.registry().is_empty());
}

#[tokio::test]
async fn test_malformed_head_surfaces_client_error() {
    let (_server, mut events, addr) = start(ServerConfig::default()).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"GARBAGE\r\n\r\n").await.unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        ServerEvent::ClientError(_)
    ));
}

#[tokio::test]
async fn test_version_policy_rejects_other_draft() {
    let config = ServerConfig::builder().version(VersionPolicy::Draft76).build();
    let (_server, mut events, addr) = start(config).await;

    let _client = connect_draft75(addr, "/x").await;
    match next_event(&mut events).await {
        ServerEvent::Rejected { reason, .. } => {
            assert_eq!(reason.to_string(), "Invalid version");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(matches!(next_event(&mut events).await, ServerEvent::Close(_)));
}

#[tokio::test]
async fn test_subprotocol_header_emitted_when_configured() {
    let config = ServerConfig::builder().subprotocol("chat").build();
    let (_server, mut events, addr) = start(config).await;

    let mut client = connect_draft75(addr, "/x").await;
    let head = read_response_head(&mut client).await;
    assert!(head.contains("WebSocket-Protocol: chat\r\n"));
    assert!(matches!(next_event(&mut events).await, ServerEvent::Connection(_)));
}

#[tokio::test]
async fn test_broadcast_reaches_every_connected_client_in_order() {
    let (server, mut events, addr) = start(ServerConfig::default()).await;

    let mut clients = Vec::new();
    let mut ids = Vec::new();
    for path in ["/a", "/b", "/c"] {
        let mut client = connect_draft75(addr, path).await;
        read_response_head(&mut client).await;
        match next_event(&mut events).await {
            ServerEvent::Connection(id) => ids.push(id),
            other => panic!("expected connection event, got {other:?}"),
        }
        clients.push(client);
    }
    assert_eq!(server.registry().len(), 3);

    // The registry walks clients in attachment order.
    let registered = server.registry().map(|connection| connection.id().clone());
    assert_eq!(registered, ids);

    server.broadcast("fanout").await;

    // Exactly one frame per client, no extras.
    for client in &mut clients {
        let mut frame = [0_u8; 8];
        client.read_exact(&mut frame).await.unwrap();
        assert_eq!(&frame, &[0x00, b'f', b'a', b'n', b'o', b'u', b't', 0xFF]);

        let mut probe = [0_u8; 1];
        assert!(
            timeout(Duration::from_millis(100), client.read(&mut probe))
                .await
                .is_err()
        );
    }
}

#[tokio::test]
async fn test_connection_broadcast_skips_the_sender() {
    let (server, mut events, addr) = start(ServerConfig::default()).await;

    let mut sender_client = connect_draft75(addr, "/a").await;
    read_response_head(&mut sender_client).await;
    let sender_id = match next_event(&mut events).await {
        ServerEvent::Connection(id) => id,
        other => panic!("expected connection event, got {other:?}"),
    };
    let mut other = establish_draft75(addr, &mut events).await;

    let sender = server.registry().find(&sender_id).expect("sender registered");
    sender.broadcast("fanout").await;

    let mut frame = [0_u8; 8];
    other.read_exact(&mut frame).await.unwrap();
    assert_eq!(&frame, &[0x00, b'f', b'a', b'n', b'o', b'u', b't', 0xFF]);

    // The broadcasting connection itself gets nothing.
    let mut probe = [0_u8; 1];
    assert!(
        timeout(Duration::from_millis(200), sender_client.read(&mut probe))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_send_targets_exactly_one_client() {
    let (server, mut events, addr) = start(ServerConfig::default()).await;

    let mut first = connect_draft75(addr, "/a").await;
    read_response_head(&mut first).await;
    let first_id = match next_event(&mut events).await {
        ServerEvent::Connection(id) => id,
        other => panic!("expected connection event, got {other:?}"),
    };
    let mut second = establish_draft75(addr, &mut events).await;

    assert!(server.send(&first_id, "direct").await);

    let mut frame = [0_u8; 8];
    first.read_exact(&mut frame).await.unwrap();
    assert_eq!(&frame, &[0x00, b'd', b'i', b'r', b'e', b'c', b't', 0xFF]);

    // The other client gets nothing.
    let mut probe = [0_u8; 1];
    assert!(
        timeout(Duration::from_millis(200), second.read(&mut probe))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_client_eof_closes_connection() {
    let (server, mut events, addr) = start(ServerConfig::default()).await;

    let client = establish_draft75(addr, &mut events).await;
    drop(client);

    assert!(matches!(next_event(&mut events).await, ServerEvent::Close(_)));
    assert!(server.registry().is_empty());
}

#[tokio::test]
async fn test_server_close_tears_everything_down() {
    let (server, mut events, addr) = start(ServerConfig::default()).await;

    let mut client = establish_draft75(addr, &mut events).await;
    server.close().await;

    assert!(matches!(next_event(&mut events).await, ServerEvent::Close(_)));
    assert!(server.registry().is_empty());

    // The established client sees the closing sequence, then EOF.
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert_eq!(rest, CLOSING_SEQUENCE);
}
