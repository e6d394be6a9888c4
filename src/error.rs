use thiserror::Error;

/// Errors surfaced through the connection and session event streams.
#[derive(Error, Debug)]
pub enum ClientError {
    /// I/O-level failure of the underlying TCP transport.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    /// The broker answered the CONNECT frame with an ERROR frame. `reason`
    /// carries the ERROR frame's `message` header.
    #[error("connect rejected: {reason}")]
    Rejected { reason: String },
    /// Reserved for strict-mode decoding. The tolerant parser never
    /// produces this; only non-UTF-8 command or header bytes at the codec
    /// boundary would.
    #[error("malformed frame: {context}")]
    MalformedFrame { context: String },
}
