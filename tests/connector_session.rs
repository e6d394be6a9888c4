//! Session state machine tests against a scripted in-process broker.
//!
//! Each test binds a `TcpListener` on an ephemeral port and plays one side
//! of the handshake, so the suite stays hermetic.

use cobalt_stomp::{ClientError, Connector, ConnectorConfig, SessionEvent, SessionEvents};
use cobalt_stomp::connector::SessionState;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn config(port: u16) -> ConnectorConfig {
    ConnectorConfig {
        hostname: "127.0.0.1".to_string(),
        port,
        broker: String::new(),
        username: "u".to_string(),
        password: "p".to_string(),
    }
}

async fn next_event(events: &mut SessionEvents) -> SessionEvent {
    timeout(WAIT, events.next())
        .await
        .expect("timed out waiting for session event")
        .expect("event stream ended unexpectedly")
}

/// Read one frame's bytes off the socket, up to (not including) its NUL.
async fn read_until_nul(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await.expect("broker read");
        if n == 0 || byte[0] == 0 {
            break;
        }
        out.push(byte[0]);
    }
    out
}

async fn bind_broker() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local_addr").port();
    (listener, port)
}

// =============================================================================
// Happy Path: CONNECT → CONNECTED → subscribe/ready → graceful disconnect
// =============================================================================

#[tokio::test]
async fn handshake_then_graceful_disconnect() {
    let (listener, port) = bind_broker().await;

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let connect = read_until_nul(&mut stream).await;
        stream
            .write_all(b"CONNECTED\nversion:1.1\nsession:abc\n\n\0")
            .await
            .expect("write CONNECTED");
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.expect("drain");
        (connect, rest)
    });

    let (connector, mut events) = Connector::connect(config(port)).await.expect("connect");

    assert!(matches!(next_event(&mut events).await, SessionEvent::Connected));

    let connected = match next_event(&mut events).await {
        SessionEvent::Message(frame) => frame,
        other => panic!("expected Message(CONNECTED), got {:?}", other),
    };
    assert_eq!(connected.command, "CONNECTED");
    assert_eq!(connected.get_header("version"), Some("1.1"));

    assert!(matches!(next_event(&mut events).await, SessionEvent::Subscribe));
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready));

    assert_eq!(connector.state(), SessionState::ConnectorReady);
    assert_eq!(connector.version(), "1.1");
    assert_eq!(connector.session_id(), "abc");

    // CONNECT took message id 0, so the next send is assigned 1
    let mut send = connector.send_frame("/queue/x").set_body(b"hi".to_vec());
    let receipt_id = connector.request_receipt(&mut send);
    assert_eq!(receipt_id, 1);
    assert_eq!(send.get_header("receipt"), Some("1"));
    assert_eq!(connector.send(send), 1);

    connector.disconnect(true);
    match next_event(&mut events).await {
        SessionEvent::Disconnect { graceful } => assert!(graceful),
        other => panic!("expected Disconnect, got {:?}", other),
    }

    // session identity cleared on disconnect
    assert_eq!(connector.state(), SessionState::SocketDisconnected);
    assert_eq!(connector.version(), "");
    assert_eq!(connector.session_id(), "");

    // further sends are refused with the sentinel
    let late = connector.send_frame("/queue/x");
    assert_eq!(connector.send(late), -1);

    let (connect, rest) = broker.await.expect("broker task");
    let connect = String::from_utf8_lossy(&connect).to_string();
    assert!(connect.starts_with("CONNECT\n"));
    assert!(connect.contains("accept-version:1.0,1.1\n"));
    assert!(connect.contains("host:localhost\n"));
    assert!(connect.contains("login:u\n"));
    assert!(connect.contains("passcode:p\n"));

    let rest = String::from_utf8_lossy(&rest).to_string();
    assert!(rest.contains("SEND\n"));
    assert!(rest.contains("destination:/queue/x\n"));
    assert!(rest.contains("receipt:1\n"));
    // DISCONNECT went out after the SEND, carrying the next message id
    assert!(rest.contains("DISCONNECT\n"));
    assert!(rest.contains("receipt:2\n"));
}

// =============================================================================
// Rejected Credentials
// =============================================================================

#[tokio::test]
async fn rejected_connect_emits_message_rejected_disconnect() {
    let (listener, port) = bind_broker().await;

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let _connect = read_until_nul(&mut stream).await;
        stream
            .write_all(b"ERROR\nmessage:bad login\n\n\0")
            .await
            .expect("write ERROR");
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.expect("drain");
    });

    let (connector, mut events) = Connector::connect(config(port)).await.expect("connect");

    assert!(matches!(next_event(&mut events).await, SessionEvent::Connected));

    // the ERROR frame is forwarded before it is classified
    let error_frame = match next_event(&mut events).await {
        SessionEvent::Message(frame) => frame,
        other => panic!("expected Message(ERROR), got {:?}", other),
    };
    assert_eq!(error_frame.command, "ERROR");
    assert_eq!(error_frame.get_header("message"), Some("bad login"));

    match next_event(&mut events).await {
        SessionEvent::Rejected { reason } => assert_eq!(reason, "bad login"),
        other => panic!("expected Rejected, got {:?}", other),
    }

    match next_event(&mut events).await {
        SessionEvent::Disconnect { graceful } => assert!(!graceful),
        other => panic!("expected Disconnect, got {:?}", other),
    }

    assert_eq!(connector.state(), SessionState::SocketDisconnected);
    broker.await.expect("broker task");
}

// =============================================================================
// Abrupt Broker Close
// =============================================================================

#[tokio::test]
async fn broker_close_without_client_disconnect_is_not_graceful() {
    let (listener, port) = bind_broker().await;

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let _connect = read_until_nul(&mut stream).await;
        stream
            .write_all(b"CONNECTED\nversion:1.1\nsession:s1\n\n\0")
            .await
            .expect("write CONNECTED");
        // drop the socket with the session still up
    });

    let (connector, mut events) = Connector::connect(config(port)).await.expect("connect");

    assert!(matches!(next_event(&mut events).await, SessionEvent::Connected));
    assert!(matches!(next_event(&mut events).await, SessionEvent::Message(_)));
    assert!(matches!(next_event(&mut events).await, SessionEvent::Subscribe));
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready));

    // no error and no DISCONNECT sent: the close reports as not graceful
    match next_event(&mut events).await {
        SessionEvent::Disconnect { graceful } => assert!(!graceful),
        other => panic!("expected Disconnect, got {:?}", other),
    }
    assert_eq!(connector.version(), "");
    broker.await.expect("broker task");
}

// =============================================================================
// Half-Close Without DISCONNECT Frame
// =============================================================================

#[tokio::test]
async fn plain_disconnect_skips_disconnect_frame() {
    let (listener, port) = bind_broker().await;

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let _connect = read_until_nul(&mut stream).await;
        stream
            .write_all(b"CONNECTED\nversion:1.0\nsession:s2\n\n\0")
            .await
            .expect("write CONNECTED");
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.expect("drain");
        rest
    });

    let (connector, mut events) = Connector::connect(config(port)).await.expect("connect");

    assert!(matches!(next_event(&mut events).await, SessionEvent::Connected));
    assert!(matches!(next_event(&mut events).await, SessionEvent::Message(_)));
    assert!(matches!(next_event(&mut events).await, SessionEvent::Subscribe));
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready));

    connector.disconnect(false);
    match next_event(&mut events).await {
        SessionEvent::Disconnect { graceful } => assert!(!graceful),
        other => panic!("expected Disconnect, got {:?}", other),
    }

    let rest = broker.await.expect("broker task");
    assert!(!String::from_utf8_lossy(&rest).contains("DISCONNECT"));
}

// =============================================================================
// CONNECT Frame Variants
// =============================================================================

#[tokio::test]
async fn connect_frame_uses_broker_name_and_omits_empty_credentials() {
    let (listener, port) = bind_broker().await;

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let connect = read_until_nul(&mut stream).await;
        stream
            .write_all(b"CONNECTED\nversion:1.1\nsession:s3\n\n\0")
            .await
            .expect("write CONNECTED");
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.expect("drain");
        connect
    });

    let cfg = ConnectorConfig {
        hostname: "127.0.0.1".to_string(),
        port,
        broker: "vhost1".to_string(),
        username: String::new(),
        password: String::new(),
    };
    let (connector, mut events) = Connector::connect(cfg).await.expect("connect");

    loop {
        if let SessionEvent::Ready = next_event(&mut events).await {
            break;
        }
    }
    connector.disconnect(false);

    let connect = broker.await.expect("broker task");
    let connect = String::from_utf8_lossy(&connect).to_string();
    assert!(connect.contains("host:vhost1\n"));
    assert!(!connect.contains("login:"));
    assert!(!connect.contains("passcode:"));
}

// =============================================================================
// Transport Failure
// =============================================================================

#[tokio::test]
async fn connect_refused_returns_transport_error() {
    let (listener, port) = bind_broker().await;
    drop(listener);

    match Connector::connect(config(port)).await {
        Err(ClientError::Transport(_)) => {}
        Ok(_) => panic!("expected connection failure"),
        Err(other) => panic!("unexpected error kind: {}", other),
    }
}

// =============================================================================
// Frame Factories
// =============================================================================

#[tokio::test]
async fn frame_factories_compose_expected_headers() {
    let (listener, port) = bind_broker().await;

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let _connect = read_until_nul(&mut stream).await;
        stream
            .write_all(b"CONNECTED\nversion:1.1\nsession:s4\n\n\0")
            .await
            .expect("write CONNECTED");
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.expect("drain");
    });

    let (connector, mut events) = Connector::connect(config(port)).await.expect("connect");
    loop {
        if let SessionEvent::Ready = next_event(&mut events).await {
            break;
        }
    }

    let sub = connector.subscribe_frame("3", "/topic/news");
    assert_eq!(sub.command, "SUBSCRIBE");
    assert_eq!(sub.get_header("id"), Some("3"));
    assert_eq!(sub.get_header("destination"), Some("/topic/news"));
    assert_eq!(sub.get_header("ack"), Some("auto"));

    let sub = connector.subscribe_frame_with_ack("4", "/topic/news", "client");
    assert_eq!(sub.get_header("ack"), Some("client"));

    let unsub = connector.unsubscribe_frame("3", "/topic/news");
    assert_eq!(unsub.command, "UNSUBSCRIBE");
    assert_eq!(unsub.get_header("id"), Some("3"));
    assert_eq!(unsub.get_header("destination"), Some("/topic/news"));

    let message = cobalt_stomp::Frame::new("MESSAGE")
        .header("destination", "/topic/news")
        .header("subscription", "3")
        .header("message-id", "m-77");
    let ack = connector.ack_frame(&message);
    assert_eq!(ack.command, "ACK");
    assert_eq!(ack.get_header("subscription"), Some("3"));
    assert_eq!(ack.get_header("message-id"), Some("m-77"));

    // without a subscription header, the destination stands in
    let bare = cobalt_stomp::Frame::new("MESSAGE")
        .header("destination", "/topic/news")
        .header("message-id", "m-78");
    let nack = connector.nack_frame(&bare);
    assert_eq!(nack.command, "NACK");
    assert_eq!(nack.get_header("subscription"), Some("/topic/news"));
    assert_eq!(nack.get_header("message-id"), Some("m-78"));

    let send = connector.send_frame("/queue/out");
    assert_eq!(send.command, "SEND");
    assert_eq!(send.get_header("destination"), Some("/queue/out"));

    connector.disconnect(false);
    loop {
        if let SessionEvent::Disconnect { .. } = next_event(&mut events).await {
            break;
        }
    }
    broker.await.expect("broker task");
}

// =============================================================================
// Inbound MESSAGE Delivery
// =============================================================================

#[tokio::test]
async fn inbound_messages_forwarded_in_order() {
    let (listener, port) = bind_broker().await;

    let broker = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let _connect = read_until_nul(&mut stream).await;
        stream
            .write_all(b"CONNECTED\nversion:1.1\nsession:s5\n\n\0")
            .await
            .expect("write CONNECTED");
        stream
            .write_all(b"MESSAGE\nsubscription:0\nmessage-id:1\ndestination:/topic/a\n\nfirst\0")
            .await
            .expect("write first");
        stream
            .write_all(b"MESSAGE\nsubscription:0\nmessage-id:2\ndestination:/topic/a\ncontent-length:6\n\nsec\0nd\0")
            .await
            .expect("write second");
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.expect("drain");
    });

    let (connector, mut events) = Connector::connect(config(port)).await.expect("connect");
    loop {
        if let SessionEvent::Ready = next_event(&mut events).await {
            break;
        }
    }

    let first = match next_event(&mut events).await {
        SessionEvent::Message(frame) => frame,
        other => panic!("expected first MESSAGE, got {:?}", other),
    };
    assert_eq!(first.command, "MESSAGE");
    assert_eq!(first.body, b"first");

    let second = match next_event(&mut events).await {
        SessionEvent::Message(frame) => frame,
        other => panic!("expected second MESSAGE, got {:?}", other),
    };
    assert_eq!(second.get_header("message-id"), Some("2"));
    assert_eq!(second.body, b"sec\0nd");

    connector.disconnect(false);
    broker.await.expect("broker task");
}
