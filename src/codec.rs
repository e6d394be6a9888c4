use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::Frame;
use crate::parser::{ParseState, Parser};

/// `StompCodec` implements `tokio_util::codec::{Decoder, Encoder}` for the
/// STOMP 1.0/1.1 wire protocol.
///
/// Decoding feeds bytes through the stateful push [`Parser`], so partial
/// frames may be absorbed entirely out of `src`: parse position lives in
/// the parser, not the buffer. Heart-beat LFs between frames are dropped
/// by the parser's syncing state and never surface as items. Encoding
/// writes [`Frame::to_buffer`] verbatim; callers wanting a fixed-length
/// body attach `content-length` themselves before sending.
pub struct StompCodec {
    parser: Parser,
}

impl StompCodec {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }
}

impl Default for StompCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StompCodec {
    type Item = Frame;
    type Error = io::Error;

    /// Decode bytes from `src` into at most one `Frame` per call.
    ///
    /// Bytes are pushed into the parser in order. When a frame completes,
    /// exactly the bytes up to and including its terminating NUL have been
    /// consumed from `src`; the remainder stays for the next call. When no
    /// frame completes, all of `src` has been absorbed into parser state
    /// and `Ok(None)` asks the transport for more bytes.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut ready_at = None;
        for (i, &byte) in src.chunk().iter().enumerate() {
            if self.parser.push(byte) == ParseState::MessageReady {
                ready_at = Some(i + 1);
                break;
            }
        }
        match ready_at {
            Some(consumed) => {
                let frame = self.parser.take_frame();
                self.parser.reset();
                src.advance(consumed);
                Ok(frame)
            }
            None => {
                let absorbed = src.len();
                src.advance(absorbed);
                Ok(None)
            }
        }
    }
}

impl Encoder<Frame> for StompCodec {
    type Error = io::Error;

    /// Append the frame's exact wire form to `dst`.
    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let buf = frame.to_buffer();
        dst.reserve(buf.len());
        dst.put_slice(&buf);
        Ok(())
    }
}
