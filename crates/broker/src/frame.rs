//! STOMP 1.2 frame codec
//!
//! ```text
//! COMMAND\n
//! header:value\n
//! \n
//! body\0
//! ```
//!
//! Header values are escaped on every frame except CONNECT and CONNECTED.
//! Bare EOLs between frames are heart-beats and are skipped.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{BrokerError, Result};

/// Upper bound for the command line plus headers of one frame
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

/// One STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Frame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of `key` (repeated headers: first one wins)
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize into `dst`
    pub fn encode(&self, dst: &mut BytesMut) {
        let escape = escapes_headers(&self.command);
        dst.reserve(self.command.len() + self.body.len() + 64);
        dst.put_slice(self.command.as_bytes());
        dst.put_u8(b'\n');
        for (key, value) in &self.headers {
            if escape {
                put_escaped(dst, key);
                dst.put_u8(b':');
                put_escaped(dst, value);
            } else {
                dst.put_slice(key.as_bytes());
                dst.put_u8(b':');
                dst.put_slice(value.as_bytes());
            }
            dst.put_u8(b'\n');
        }
        dst.put_u8(b'\n');
        dst.put_slice(&self.body);
        dst.put_u8(0);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Take one complete frame off the front of `src`
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Frame>> {
        // heart-beats
        while let Some(&first) = src.first() {
            if first == b'\n' {
                src.advance(1);
            } else if src.starts_with(b"\r\n") {
                src.advance(2);
            } else if first == b'\r' && src.len() == 1 {
                return Ok(None);
            } else {
                break;
            }
        }
        if src.is_empty() {
            return Ok(None);
        }

        let mut lines = Vec::new();
        let mut pos = 0;
        let header_end = loop {
            let Some(offset) = src[pos..].iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_HEADER_BYTES {
                    return Err(BrokerError::frame("header section too large"));
                }
                return Ok(None);
            };
            let line = trim_cr(&src[pos..pos + offset]);
            pos += offset + 1;
            if line.is_empty() {
                break pos;
            }
            lines.push(
                std::str::from_utf8(line)
                    .map_err(|_| BrokerError::frame("header is not valid UTF-8"))?
                    .to_string(),
            );
        };

        let mut lines = lines.into_iter();
        let command = lines
            .next()
            .ok_or_else(|| BrokerError::frame("missing command"))?;
        let unescape = escapes_headers(&command);
        let mut headers = Vec::new();
        for line in lines {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| BrokerError::frame(format!("header without ':': {line}")))?;
            if unescape {
                headers.push((unescape_value(key)?, unescape_value(value)?));
            } else {
                headers.push((key.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.parse::<usize>()
                    .map_err(|_| BrokerError::frame(format!("bad content-length '{v}'")))
            })
            .transpose()?;

        let body_len = match content_length {
            Some(len) => {
                let body_end = header_end
                    .checked_add(len)
                    .filter(|end| *end < usize::MAX)
                    .ok_or_else(|| BrokerError::frame(format!("content-length {len} too large")))?;
                if src.len() <= body_end {
                    return Ok(None);
                }
                if src[body_end] != 0 {
                    return Err(BrokerError::frame("body not terminated by NUL"));
                }
                len
            }
            None => match src[header_end..].iter().position(|b| *b == 0) {
                Some(len) => len,
                None => return Ok(None),
            },
        };

        src.advance(header_end);
        let body = src.split_to(body_len).freeze();
        src.advance(1);

        Ok(Some(Frame {
            command,
            headers,
            body,
        }))
    }
}

fn escapes_headers(command: &str) -> bool {
    !matches!(command, "CONNECT" | "CONNECTED")
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn put_escaped(dst: &mut BytesMut, value: &str) {
    for b in value.bytes() {
        match b {
            b'\\' => dst.put_slice(b"\\\\"),
            b'\n' => dst.put_slice(b"\\n"),
            b'\r' => dst.put_slice(b"\\r"),
            b':' => dst.put_slice(b"\\c"),
            other => dst.put_u8(other),
        }
    }
}

fn unescape_value(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(BrokerError::frame(format!(
                    "invalid escape sequence '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}
