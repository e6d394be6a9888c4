//! Session-level state machine layered over [`Connection`].
//!
//! The connector performs the CONNECT/CONNECTED/ERROR handshake, tracks
//! session identity and negotiated version, forwards every inbound frame,
//! and provides factories for the client-side frame vocabulary.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionEvent, ConnectionEvents};
use crate::error::ClientError;
use crate::frame::Frame;

/// Default STOMP broker port.
pub const DEFAULT_PORT: u16 = 61613;
/// Virtual host named in CONNECT when no broker name is configured.
pub const DEFAULT_VIRTUAL_HOST: &str = "localhost";

/// Session states, in handshake order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    SocketDisconnected,
    ConnectSent,
    ConnectorReady,
    DisconnectSent,
}

/// Broker address and credentials for one session.
///
/// Empty `broker` means the CONNECT `host` header falls back to
/// [`DEFAULT_VIRTUAL_HOST`]; empty `username` means no credentials are
/// sent.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub hostname: String,
    pub port: u16,
    pub broker: String,
    pub username: String,
    pub password: String,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            broker: String::new(),
            username: String::new(),
            password: String::new(),
        }
    }
}

/// Application-visible session events, in emission order over a normal
/// session: `Connected`, `Subscribe`, `Ready`, zero or more `Message`,
/// `Disconnect`.
#[derive(Debug)]
pub enum SessionEvent {
    /// Transport is up and CONNECT has been sent.
    Connected,
    /// Handshake done; issue SUBSCRIBE frames now.
    Subscribe,
    /// Session fully established.
    Ready,
    /// Any inbound frame, forwarded before classification.
    Message(Frame),
    /// Transport failure.
    Error(ClientError),
    /// The broker answered CONNECT with ERROR.
    Rejected { reason: String },
    /// Terminal event; fires exactly once per session.
    Disconnect { graceful: bool },
}

/// Receiving side of the session event stream.
pub struct SessionEvents {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionEvents {
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }
}

#[derive(Default)]
struct SessionIdentity {
    version: String,
    session_id: String,
}

/// Shared machine state, mutated only by the session task and the
/// `disconnect` entry point. Locks are never held across awaits.
struct Shared {
    state: Mutex<SessionState>,
    identity: Mutex<SessionIdentity>,
    /// Message id of the DISCONNECT frame once sent; -1 before that, so
    /// any real id is distinguishable.
    disconnect_id: AtomicI64,
}

/// Session handle: frame factories, send path, and disconnect control.
#[derive(Clone)]
pub struct Connector {
    conn: Connection,
    config: ConnectorConfig,
    shared: Arc<Shared>,
}

impl Connector {
    /// Open the transport and start the session handshake.
    ///
    /// On success the returned event stream yields `Connected` (CONNECT is
    /// already on the wire at that point), then `Message(CONNECTED)`,
    /// `Subscribe`, `Ready` on a successful handshake. TCP-level failure
    /// to reach the broker is returned directly.
    pub async fn connect(
        config: ConnectorConfig,
    ) -> Result<(Self, SessionEvents), ClientError> {
        let addr = format!("{}:{}", config.hostname, config.port);
        let (conn, conn_events) = Connection::open(&addr).await?;

        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::SocketDisconnected),
            identity: Mutex::new(SessionIdentity::default()),
            disconnect_id: AtomicI64::new(-1),
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connector = Connector {
            conn,
            config,
            shared,
        };

        tokio::spawn(run_session(connector.clone(), conn_events, events_tx));

        Ok((connector, SessionEvents { rx: events_rx }))
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.shared.state.lock().unwrap()
    }

    /// Protocol version negotiated in CONNECTED, empty until ready.
    pub fn version(&self) -> String {
        self.shared.identity.lock().unwrap().version.clone()
    }

    /// Session identifier assigned by the broker, empty until ready.
    pub fn session_id(&self) -> String {
        self.shared.identity.lock().unwrap().session_id.clone()
    }

    /// Send a frame on the underlying connection. Returns the assigned
    /// message id, or -1 when the connection cannot send.
    pub fn send(&self, frame: Frame) -> i64 {
        self.conn.send(frame)
    }

    /// Leave the session.
    ///
    /// With `graceful` set and the session ready, a DISCONNECT frame with
    /// a `receipt` header goes out first and its message id is recorded;
    /// either way the outbound side is half-closed and the terminal
    /// `Disconnect` event fires once the transport is fully down.
    pub fn disconnect(&self, graceful: bool) {
        if graceful && self.state() == SessionState::ConnectorReady {
            let mut frame = self.disconnect_frame();
            self.request_receipt(&mut frame);
            let id = self.send(frame);
            if id >= 0 {
                self.shared.disconnect_id.store(id, Ordering::SeqCst);
                *self.shared.state.lock().unwrap() = SessionState::DisconnectSent;
            }
        }
        self.conn.disconnect();
    }

    /// Override the frame's `receipt` header with the id the next send
    /// will be assigned, and return that id.
    pub fn request_receipt(&self, frame: &mut Frame) -> i64 {
        let id = self.conn.next_message_id();
        frame.override_header("receipt", &id.to_string());
        id
    }

    // ------------------------------------------------------------------
    // Frame factories
    // ------------------------------------------------------------------

    /// CONNECT with `accept-version:1.0,1.1`, the virtual host, and
    /// credentials when configured.
    pub fn connect_frame(&self) -> Frame {
        let host = if self.config.broker.is_empty() {
            DEFAULT_VIRTUAL_HOST
        } else {
            &self.config.broker
        };
        let mut frame = Frame::new("CONNECT")
            .header("accept-version", "1.0,1.1")
            .header("host", host);
        if !self.config.username.is_empty() {
            frame = frame
                .header("login", &self.config.username)
                .header("passcode", &self.config.password);
        }
        frame
    }

    pub fn disconnect_frame(&self) -> Frame {
        Frame::new("DISCONNECT")
    }

    /// SUBSCRIBE with the default `auto` ack mode. Subscription ids are
    /// chosen by the caller.
    pub fn subscribe_frame(&self, id: &str, destination: &str) -> Frame {
        self.subscribe_frame_with_ack(id, destination, "auto")
    }

    /// SUBSCRIBE with an explicit ack mode (`auto`, `client`,
    /// `client-individual`). The value is not validated.
    pub fn subscribe_frame_with_ack(&self, id: &str, destination: &str, ack: &str) -> Frame {
        Frame::new("SUBSCRIBE")
            .header("id", id)
            .header("destination", destination)
            .header("ack", ack)
    }

    pub fn unsubscribe_frame(&self, id: &str, destination: &str) -> Frame {
        Frame::new("UNSUBSCRIBE")
            .header("id", id)
            .header("destination", destination)
    }

    /// ACK for an inbound MESSAGE frame. The subscription is taken from
    /// the message's `subscription` header, falling back to its
    /// `destination`; the `message-id` header is copied.
    pub fn ack_frame(&self, message: &Frame) -> Frame {
        acknowledge_frame("ACK", message)
    }

    /// NACK counterpart of [`Connector::ack_frame`].
    pub fn nack_frame(&self, message: &Frame) -> Frame {
        acknowledge_frame("NACK", message)
    }

    pub fn send_frame(&self, destination: &str) -> Frame {
        Frame::new("SEND").header("destination", destination)
    }
}

fn acknowledge_frame(command: &str, message: &Frame) -> Frame {
    let subscription = message
        .get_header("subscription")
        .or_else(|| message.get_header("destination"))
        .unwrap_or("");
    let message_id = message.get_header("message-id").unwrap_or("");
    Frame::new(command)
        .header("subscription", subscription)
        .header("message-id", message_id)
}

/// Session task: translate connection events into session events through
/// the handshake state machine.
async fn run_session(
    connector: Connector,
    mut conn_events: ConnectionEvents,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
) {
    let shared = connector.shared.clone();
    while let Some(event) = conn_events.next().await {
        match event {
            ConnectionEvent::Connected => {
                let frame = connector.connect_frame();
                debug!("sending CONNECT");
                connector.send(frame);
                *shared.state.lock().unwrap() = SessionState::ConnectSent;
                let _ = events_tx.send(SessionEvent::Connected);
            }
            ConnectionEvent::Message(frame) => {
                // Every inbound frame reaches the application before the
                // connector classifies it.
                let _ = events_tx.send(SessionEvent::Message(frame.clone()));
                let state = *shared.state.lock().unwrap();
                match frame.command.as_str() {
                    "CONNECTED" if state == SessionState::ConnectSent => {
                        {
                            let mut identity = shared.identity.lock().unwrap();
                            identity.version =
                                frame.get_header("version").unwrap_or("").to_string();
                            identity.session_id =
                                frame.get_header("session").unwrap_or("").to_string();
                        }
                        *shared.state.lock().unwrap() = SessionState::ConnectorReady;
                        debug!(version = %connector.version(), "session ready");
                        let _ = events_tx.send(SessionEvent::Subscribe);
                        let _ = events_tx.send(SessionEvent::Ready);
                    }
                    "ERROR" if state == SessionState::ConnectSent => {
                        let reason = frame.get_header("message").unwrap_or("").to_string();
                        warn!(%reason, "broker rejected CONNECT");
                        *shared.state.lock().unwrap() = SessionState::SocketDisconnected;
                        let _ = events_tx.send(SessionEvent::Rejected { reason });
                        connector.conn.disconnect();
                    }
                    _ => {}
                }
            }
            ConnectionEvent::Error(e) => {
                *shared.state.lock().unwrap() = SessionState::SocketDisconnected;
                let _ = events_tx.send(SessionEvent::Error(e));
            }
            ConnectionEvent::Disconnect { had_error } => {
                // A close counts as graceful when a DISCONNECT frame went
                // out first. A transport error also reports as graceful;
                // that polarity is long-standing observable behavior (see
                // DESIGN.md) and must not change without a product call.
                let graceful =
                    had_error || shared.disconnect_id.load(Ordering::SeqCst) >= 0;
                *shared.state.lock().unwrap() = SessionState::SocketDisconnected;
                *shared.identity.lock().unwrap() = SessionIdentity::default();
                let _ = events_tx.send(SessionEvent::Disconnect { graceful });
                break;
            }
        }
    }
}
