//! Push-driven STOMP frame parser.
//!
//! The parser consumes bytes one at a time (or in bulk via
//! [`Parser::push_slice`]) and signals [`ParseState::MessageReady`] when a
//! complete frame has been seen. It tolerates arbitrary network chunking:
//! parse position lives entirely in the parser, never in the caller's
//! buffer. One parser instance is reused for every frame on a connection;
//! the body buffer is retained across frames and grows monotonically in
//! 8192-byte steps.

use crate::frame::Frame;

/// Body buffer allocation grain.
const BODY_CHUNK: usize = 8192;

/// Result of feeding one byte to the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// The frame is incomplete; feed more bytes.
    NeedMore,
    /// A full frame is available via [`Parser::take_frame`].
    MessageReady,
}

/// Internal machine state. Header parsing is split into sub-states so a
/// single byte always maps to exactly one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Dropping noise (heart-beat LFs) until a command letter appears.
    Syncing,
    /// Accumulating the command token.
    Command,
    /// At the start of a header line; LF here ends the header block.
    KeyStart,
    /// Accumulating a header key.
    KeyData,
    /// Just consumed the `:` separator.
    ValueStart,
    /// Accumulating a header value.
    ValueData,
    /// Reading the body (fixed or variable length).
    Body,
    /// A complete frame is waiting for extraction.
    Ready,
}

/// Incremental byte-at-a-time STOMP frame parser.
pub struct Parser {
    state: State,
    command: Vec<u8>,
    current_key: Vec<u8>,
    current_value: Vec<u8>,
    headers: Vec<(String, String)>,
    /// Retained body storage; only the first `body_len` bytes are live.
    body_buf: Vec<u8>,
    body_len: usize,
    fixed_length: bool,
    body_size: usize,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: State::Syncing,
            command: Vec::new(),
            current_key: Vec::new(),
            current_value: Vec::new(),
            headers: Vec::new(),
            body_buf: vec![0; BODY_CHUNK],
            body_len: 0,
            fixed_length: false,
            body_size: 0,
        }
    }

    /// Advance the machine by one byte.
    ///
    /// Returns [`ParseState::MessageReady`] once the terminating NUL of a
    /// complete frame has been consumed. After that, further calls are
    /// no-ops (still reporting `MessageReady`) until the caller extracts
    /// the frame with [`Parser::take_frame`] and calls [`Parser::reset`].
    pub fn push(&mut self, byte: u8) -> ParseState {
        match self.state {
            State::Syncing => {
                // Stray LFs between frames are heart-beats; anything else
                // that is not a letter is noise.
                if byte.is_ascii_alphabetic() {
                    self.command.push(byte);
                    self.state = State::Command;
                }
                ParseState::NeedMore
            }
            State::Command => {
                if byte == b'\n' {
                    self.state = State::KeyStart;
                } else {
                    self.command.push(byte);
                }
                ParseState::NeedMore
            }
            State::KeyStart => {
                if byte == b'\n' {
                    self.begin_body();
                } else {
                    self.current_key.clear();
                    self.current_key.push(byte);
                    self.current_value.clear();
                    self.state = State::KeyData;
                }
                ParseState::NeedMore
            }
            State::KeyData => {
                match byte {
                    b':' => self.state = State::ValueStart,
                    b'\n' => {
                        // Header line with no separator: empty value.
                        self.commit_header();
                        self.state = State::KeyStart;
                    }
                    _ => self.current_key.push(byte),
                }
                ParseState::NeedMore
            }
            State::ValueStart => {
                if byte == b'\n' {
                    self.commit_header();
                    self.state = State::KeyStart;
                } else {
                    self.current_value.push(byte);
                    self.state = State::ValueData;
                }
                ParseState::NeedMore
            }
            State::ValueData => {
                if byte == b'\n' {
                    self.commit_header();
                    self.state = State::KeyStart;
                } else {
                    self.current_value.push(byte);
                }
                ParseState::NeedMore
            }
            State::Body => {
                if self.fixed_length {
                    if self.body_len < self.body_size {
                        self.body_buf[self.body_len] = byte;
                        self.body_len += 1;
                        ParseState::NeedMore
                    } else if byte == 0 {
                        self.state = State::Ready;
                        ParseState::MessageReady
                    } else {
                        // The broker declared a short content-length;
                        // surplus bytes before the NUL are discarded.
                        ParseState::NeedMore
                    }
                } else if byte == 0 {
                    self.state = State::Ready;
                    ParseState::MessageReady
                } else {
                    self.ensure_body(self.body_len + 1);
                    self.body_buf[self.body_len] = byte;
                    self.body_len += 1;
                    ParseState::NeedMore
                }
            }
            State::Ready => ParseState::MessageReady,
        }
    }

    /// Feed a whole read worth of bytes, collecting every frame completed
    /// along the way. The parser is reset after each extraction so the
    /// remaining bytes of the same read keep parsing.
    pub fn push_slice(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if self.push(byte) == ParseState::MessageReady {
                if let Some(frame) = self.take_frame() {
                    frames.push(frame);
                }
                self.reset();
            }
        }
        frames
    }

    /// Extract the completed frame, or `None` if no frame is ready. The
    /// command is upper-cased and trimmed; the body is copied out of the
    /// retained buffer.
    pub fn take_frame(&mut self) -> Option<Frame> {
        if self.state != State::Ready {
            return None;
        }
        let command = String::from_utf8_lossy(&self.command)
            .trim()
            .to_ascii_uppercase();
        Some(Frame {
            command,
            headers: self.headers.clone(),
            body: self.body_buf[..self.body_len].to_vec(),
        })
    }

    /// Clear all accumulators and return to the initial state. The body
    /// buffer keeps its capacity.
    pub fn reset(&mut self) {
        self.state = State::Syncing;
        self.command.clear();
        self.current_key.clear();
        self.current_value.clear();
        self.headers.clear();
        self.body_len = 0;
        self.fixed_length = false;
        self.body_size = 0;
    }

    /// End of the header block: derive the body mode from the last
    /// `content-length` header. Negative or malformed values mean "no
    /// fixed length".
    fn begin_body(&mut self) {
        self.body_len = 0;
        self.fixed_length = false;
        self.body_size = 0;
        let declared = self
            .headers
            .iter()
            .rev()
            .find(|(k, _)| k.as_str() == "content-length")
            .and_then(|(_, v)| v.trim().parse::<i64>().ok())
            .filter(|n| *n >= 0);
        if let Some(n) = declared {
            self.fixed_length = true;
            self.body_size = n as usize;
            self.ensure_body(self.body_size);
        }
        self.state = State::Body;
    }

    /// Commit the accumulated header line: key trimmed, unescaped and
    /// lower-cased; value left-trimmed and unescaped. Trimming runs on the
    /// raw bytes, where escapes are still inert `\x` pairs, so a `\n`
    /// that unescapes to a real LF stays part of the content.
    fn commit_header(&mut self) {
        let key = String::from_utf8_lossy(&unescape_header(self.current_key.trim_ascii()))
            .to_ascii_lowercase();
        let value =
            String::from_utf8_lossy(&unescape_header(self.current_value.trim_ascii_start()))
                .to_string();
        self.headers.push((key, value));
        self.current_key.clear();
        self.current_value.clear();
    }

    fn ensure_body(&mut self, needed: usize) {
        if self.body_buf.len() < needed {
            let rounded = needed.div_ceil(BODY_CHUNK) * BODY_CHUNK;
            self.body_buf.resize(rounded, 0);
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Reverse the STOMP 1.1 header escapes: `\c` → `:`, `\n` → LF, `\\` →
/// `\`. An unknown escape consumes the backslash and its successor and
/// produces nothing; a trailing lone backslash is likewise dropped.
pub fn unescape_header(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if b == b'\\' {
            match input.get(i + 1) {
                Some(b'c') => out.push(b':'),
                Some(b'n') => out.push(b'\n'),
                Some(b'\\') => out.push(b'\\'),
                _ => {}
            }
            i += 2;
        } else {
            out.push(b);
            i += 1;
        }
    }
    out
}
