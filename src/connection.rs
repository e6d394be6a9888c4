//! Socket driver: adapts a byte-oriented TCP transport to a frame-oriented
//! event stream.

use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::codec::StompCodec;
use crate::error::ClientError;
use crate::frame::Frame;

/// Sentinel id returned by [`Connection::send`] when nothing was written.
pub const SEND_FAILED: i64 = -1;

/// Frame-level events emitted by a [`Connection`].
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Transport handshake complete; sending is possible.
    Connected,
    /// A complete inbound frame.
    Message(Frame),
    /// Transport failure. A `Disconnect` always follows.
    Error(ClientError),
    /// Transport fully closed. Emitted exactly once per connection.
    Disconnect { had_error: bool },
}

/// Receiving side of a connection's event stream.
pub struct ConnectionEvents {
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl ConnectionEvents {
    /// Await the next event; `None` after the terminal `Disconnect` has
    /// been consumed and the driver task has gone away.
    pub async fn next(&mut self) -> Option<ConnectionEvent> {
        self.rx.recv().await
    }
}

/// Outbound instructions to the driver task. Frames and the half-close
/// request share one queue so a frame sent just before `disconnect` is
/// flushed before the sink closes.
enum Outbound {
    Frame(Frame),
    Close,
}

/// Handle to an open STOMP transport.
///
/// The I/O itself runs on a background driver task owning a
/// `Framed<TcpStream, StompCodec>`; this handle carries the outbound
/// queue, the `can_send` gate and the message-id counter. Cloning the
/// handle shares all of them.
#[derive(Clone)]
pub struct Connection {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    can_send: Arc<AtomicBool>,
    message_id: Arc<AtomicI64>,
}

impl Connection {
    /// Open a TCP connection to `addr` and spawn the driver task.
    ///
    /// Returns the connection handle and its event stream. The first event
    /// is always `Connected`. A failure to establish the TCP connection is
    /// returned directly as `ClientError::Transport`.
    pub async fn open(addr: &str) -> Result<(Self, ConnectionEvents), ClientError> {
        let stream = TcpStream::connect(addr).await?;
        debug!(addr, "transport connected");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let can_send = Arc::new(AtomicBool::new(true));
        let message_id = Arc::new(AtomicI64::new(0));

        let _ = events_tx.send(ConnectionEvent::Connected);

        tokio::spawn(drive(
            Framed::new(stream, StompCodec::new()),
            events_tx,
            outbound_rx,
            can_send.clone(),
        ));

        Ok((
            Connection {
                outbound_tx,
                can_send,
                message_id,
            },
            ConnectionEvents { rx: events_rx },
        ))
    }

    /// Serialize `frame` onto the outbound write path.
    ///
    /// Returns the message id assigned to this frame and increments the
    /// counter, or [`SEND_FAILED`] without writing when sending is not
    /// currently possible. Outbound queue depth is uncapped; backpressure
    /// is the transport's write buffer.
    pub fn send(&self, frame: Frame) -> i64 {
        if !self.can_send.load(Ordering::SeqCst) {
            return SEND_FAILED;
        }
        debug!(command = %frame.command, "queueing outbound frame");
        if self.outbound_tx.send(Outbound::Frame(frame)).is_err() {
            return SEND_FAILED;
        }
        self.message_id.fetch_add(1, Ordering::SeqCst)
    }

    /// The id the next successful [`Connection::send`] will return.
    pub fn next_message_id(&self) -> i64 {
        self.message_id.load(Ordering::SeqCst)
    }

    /// Whether the outbound path currently accepts frames.
    pub fn can_send(&self) -> bool {
        self.can_send.load(Ordering::SeqCst)
    }

    /// Half-close: flush queued frames, shut down the outbound side and
    /// stop accepting sends. Inbound frames keep flowing until the peer
    /// closes the transport, at which point `Disconnect` fires.
    pub fn disconnect(&self) {
        self.can_send.store(false, Ordering::SeqCst);
        let _ = self.outbound_tx.send(Outbound::Close);
    }
}

/// Connection driver: one task per transport, owning the framed socket.
async fn drive(
    framed: Framed<TcpStream, StompCodec>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    can_send: Arc<AtomicBool>,
) {
    let (mut sink, mut stream) = framed.split();
    let mut had_error = false;
    let mut writing = true;

    loop {
        if writing {
            tokio::select! {
                maybe = outbound_rx.recv() => match maybe {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = sink.send(frame).await {
                            warn!(error = %e, "outbound write failed");
                            can_send.store(false, Ordering::SeqCst);
                            had_error = true;
                            let _ = events_tx.send(ConnectionEvent::Error(ClientError::Transport(e)));
                            break;
                        }
                    }
                    // Close request, or every handle dropped: half-close.
                    Some(Outbound::Close) | None => {
                        debug!("half-closing outbound side");
                        can_send.store(false, Ordering::SeqCst);
                        let _ = sink.close().await;
                        writing = false;
                    }
                },
                item = stream.next() => {
                    if !handle_inbound(item, &events_tx, &can_send, &mut had_error) {
                        break;
                    }
                }
            }
        } else {
            // Outbound side is gone; drain inbound until EOF.
            let item = stream.next().await;
            if !handle_inbound(item, &events_tx, &can_send, &mut had_error) {
                break;
            }
        }
    }

    can_send.store(false, Ordering::SeqCst);
    debug!(had_error, "transport closed");
    let _ = events_tx.send(ConnectionEvent::Disconnect { had_error });
}

/// Returns `false` when the read side has terminated.
fn handle_inbound(
    item: Option<Result<Frame, std::io::Error>>,
    events_tx: &mpsc::UnboundedSender<ConnectionEvent>,
    can_send: &AtomicBool,
    had_error: &mut bool,
) -> bool {
    match item {
        Some(Ok(frame)) => {
            let _ = events_tx.send(ConnectionEvent::Message(frame));
            true
        }
        Some(Err(e)) => {
            warn!(error = %e, "inbound read failed");
            can_send.store(false, Ordering::SeqCst);
            *had_error = true;
            let _ = events_tx.send(ConnectionEvent::Error(ClientError::Transport(e)));
            false
        }
        None => false,
    }
}
