use std::fmt;

/// Default MIME type attached by the content-type helpers.
pub const DEFAULT_MIME: &str = "text/plain";
/// Default native encoding tag. Rust strings are UTF-8, so this is the
/// platform-native representation here.
pub const DEFAULT_ENCODING: &str = "utf8";

/// A STOMP frame: command, ordered headers, and raw body bytes.
///
/// Headers are an ordered sequence of (name, value) pairs. Names are
/// normalized to lower case on insert. Duplicate names are legal and keep
/// their insertion order; when several headers share a name, the *last*
/// one is authoritative for lookups. An empty `body` means "no body".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// STOMP command (e.g. CONNECT, SEND, SUBSCRIBE)
    pub command: String,
    /// Ordered headers as (key, value) pairs
    pub headers: Vec<(String, String)>,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl Frame {
    /// Create a new frame with the given command and empty headers/body.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Create a frame with pre-sized header and body storage.
    ///
    /// Parameters
    /// - `command`: the STOMP command name.
    /// - `header_capacity`: number of header slots to reserve.
    /// - `body_capacity`: number of body bytes to reserve.
    pub fn with_capacity(
        command: impl Into<String>,
        header_capacity: usize,
        body_capacity: usize,
    ) -> Self {
        Self {
            command: command.into(),
            headers: Vec::with_capacity(header_capacity),
            body: Vec::with_capacity(body_capacity),
        }
    }

    /// Add a header (builder style). The name is lower-cased on insert.
    ///
    /// Returns the mutated `Frame` allowing builder-style chaining.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.append_header(&key.into(), &value.into());
        self
    }

    /// Set the frame body (builder style).
    pub fn set_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Append a header at the end of the sequence. The name is lower-cased;
    /// duplicates are permitted.
    pub fn append_header(&mut self, name: &str, value: &str) {
        self.headers
            .push((name.to_ascii_lowercase(), value.to_string()));
    }

    /// Replace the *last* header matching `name` in place, preserving its
    /// position; append if no header with that name exists.
    pub fn override_header(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        match self.headers.iter().rposition(|(k, _)| *k == name) {
            Some(idx) => self.headers[idx].1 = value.to_string(),
            None => self.headers.push((name, value.to_string())),
        }
    }

    /// Remove the last header matching `name` and return its value, or
    /// `None` if no such header exists.
    pub fn remove_last_header(&mut self, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .rposition(|(k, _)| *k == name)
            .map(|idx| self.headers.remove(idx).1)
    }

    /// Remove every header matching `name`.
    pub fn remove_all_headers(&mut self, name: &str) {
        let name = name.to_ascii_lowercase();
        self.headers.retain(|(k, _)| *k != name);
    }

    /// Get the value of the *last* header matching `name`, or `None`.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Append a `content-type` header composed as `<mime>;charset=<label>`,
    /// both parts lower-cased. `encoding` is a native tag (`utf8`,
    /// `utf16le`, `ascii`, `base64`) mapped to its ISO label on emit;
    /// unknown tags pass through unchanged.
    pub fn append_content_type(&mut self, mime: &str, encoding: &str) {
        let value = content_type_value(mime, encoding);
        self.append_header("content-type", &value);
    }

    /// Like [`Frame::append_content_type`] but replaces the last
    /// `content-type` header if one exists.
    pub fn override_content_type(&mut self, mime: &str, encoding: &str) {
        let value = content_type_value(mime, encoding);
        self.override_header("content-type", &value);
    }

    /// Parse the last `content-type` header into `(mime, native-tag)`,
    /// mapping the charset's ISO label back to a native encoding tag. A
    /// missing charset parameter yields [`DEFAULT_ENCODING`].
    pub fn content_type(&self) -> Option<(String, String)> {
        let raw = self.get_header("content-type")?;
        let mut parts = raw.split(';');
        let mime = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let mut encoding = DEFAULT_ENCODING.to_string();
        for param in parts {
            if let Some(label) = param.trim().strip_prefix("charset=") {
                encoding = native_tag(&label.trim().to_ascii_lowercase()).to_string();
            }
        }
        Some((mime, encoding))
    }

    /// Append a `content-length` header carrying the current body length
    /// as decimal ASCII.
    pub fn append_content_length(&mut self) {
        let len = self.body.len().to_string();
        self.append_header("content-length", &len);
    }

    /// Like [`Frame::append_content_length`] but replaces the last
    /// `content-length` header if one exists.
    pub fn override_content_length(&mut self) {
        let len = self.body.len().to_string();
        self.override_header("content-length", &len);
    }

    /// Exact serialized size of this frame in bytes, accounting for header
    /// escape expansion: command + LF, `key:value` + LF per header, the
    /// blank separator LF, the body, and the terminating NUL.
    pub fn wire_size(&self) -> usize {
        let mut size = self.command.len() + 1;
        for (k, v) in &self.headers {
            size += escaped_len(k) + 1 + escaped_len(v) + 1;
        }
        size + 1 + self.body.len() + 1
    }

    /// Serialize the frame to a buffer of exactly [`Frame::wire_size`]
    /// bytes: command, LF, escaped `key:value` header lines, a blank LF,
    /// body bytes, terminating NUL.
    pub fn to_buffer(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.wire_size());
        buf.extend_from_slice(self.command.as_bytes());
        buf.push(b'\n');
        for (k, v) in &self.headers {
            buf.extend_from_slice(escape_header(k).as_bytes());
            buf.push(b':');
            buf.extend_from_slice(escape_header(v).as_bytes());
            buf.push(b'\n');
        }
        buf.push(b'\n');
        buf.extend_from_slice(&self.body);
        buf.push(0);
        debug_assert_eq!(buf.len(), self.wire_size());
        buf
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Command: {}", self.command)?;
        for (k, v) in &self.headers {
            writeln!(f, "{}: {}", k, v)?;
        }
        writeln!(f, "Body ({} bytes)", self.body.len())
    }
}

fn content_type_value(mime: &str, encoding: &str) -> String {
    format!(
        "{};charset={}",
        mime.to_ascii_lowercase(),
        iso_label(&encoding.to_ascii_lowercase())
    )
}

/// Map a native encoding tag to the ISO charset label emitted on the wire.
/// Unknown tags pass through unchanged.
pub fn iso_label(tag: &str) -> &str {
    match tag {
        "utf16le" => "utf-16",
        "utf8" => "utf-8",
        "ascii" => "ascii",
        "base64" => "base64",
        other => other,
    }
}

/// Map an ISO charset label from the wire to a native encoding tag.
/// Unknown labels pass through unchanged.
pub fn native_tag(label: &str) -> &str {
    match label {
        "utf-16" | "utf-16le" => "utf16le",
        "utf-8" => "utf8",
        "ascii" | "us-ascii" => "ascii",
        "base64" => "base64",
        other => other,
    }
}

/// Escape a header name or value for wire transmission.
///
/// STOMP 1.1 escape sequences:
/// - backslash (0x5c) → `\\`
/// - line feed (0x0a) → `\n`
/// - colon (0x3a) → `\c`
pub fn escape_header(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            ':' => result.push_str("\\c"),
            _ => result.push(ch),
        }
    }
    result
}

/// Escaped length of a header name or value, without building the string.
pub fn escaped_len(input: &str) -> usize {
    input
        .bytes()
        .map(|b| match b {
            b'\\' | b'\n' | b':' => 2,
            _ => 1,
        })
        .sum()
}
