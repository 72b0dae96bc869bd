//! SSE line decoder (Bytes -> data payloads)
//!
//! Splits the response body into lines independent of chunk boundaries and keeps
//! only `data:` payloads. Bytes are decoded (lossily) one complete line at a
//! time, so a multi-byte character split across chunks survives intact.

use bytes::Bytes;
use futures::{stream, StreamExt};

use crate::transport::TransportError;
use crate::{BoxStream, Error};

pub const DONE_SIGNAL: &str = "[DONE]";

/// One meaningful SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Payload of a `data:` line.
    Data(String),
    /// `data: [DONE]`
    Done,
}

/// Classify a single line (without its terminator).
///
/// `event:`, `id:`, `retry:`, comments and blank lines yield `None`.
pub fn classify_line(line: &str) -> Option<SseLine> {
    let rest = line.strip_prefix("data:")?;
    let payload = rest.strip_prefix(' ').unwrap_or(rest);
    if payload.trim() == DONE_SIGNAL {
        return Some(SseLine::Done);
    }
    if payload.trim().is_empty() {
        return None;
    }
    Some(SseLine::Data(payload.to_string()))
}

/// Longest line kept in memory while waiting for its terminator.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Incremental line splitter over raw bytes. Handles `\n` and `\r\n`.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Bytes of `buf` already known to hold no `\n`.
    scanned: usize,
    limit: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            limit,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, if one is buffered.
    pub fn next_line(&mut self) -> Option<String> {
        let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') else {
            self.scanned = self.buf.len();
            return None;
        };
        let idx = self.scanned + offset;
        self.scanned = 0;
        let mut line: Vec<u8> = self.buf.drain(..=idx).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// True when an unterminated line has outgrown the limit.
    pub fn is_overlong(&self) -> bool {
        self.scanned > self.limit
    }

    /// Whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.buf.is_empty() {
            return None;
        }
        let mut rest = std::mem::take(&mut self.buf);
        if rest.last() == Some(&b'\r') {
            rest.pop();
        }
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Turn a body stream into a stream of SSE lines.
///
/// Nothing is emitted after [`SseLine::Done`]. Transport errors are passed through.
pub fn sse_lines(input: BoxStream<'static, Bytes>) -> BoxStream<'static, SseLine> {
    let stream = stream::unfold(
        (input, LineBuffer::new(), false),
        |(mut input, mut lines, finished)| async move {
            if finished {
                return None;
            }
            loop {
                while let Some(line) = lines.next_line() {
                    if let Some(sse) = classify_line(&line) {
                        let done = sse == SseLine::Done;
                        return Some((Ok(sse), (input, lines, done)));
                    }
                }
                if lines.is_overlong() {
                    let err = Error::InvalidHttpResponse(TransportError::Other(format!(
                        "stream line exceeds {} bytes",
                        lines.limit
                    )));
                    return Some((Err(err), (input, lines, true)));
                }

                match input.next().await {
                    Some(Ok(bytes)) => lines.push(&bytes),
                    Some(Err(e)) => return Some((Err(e), (input, lines, true))),
                    None => {
                        let sse = lines.finish().and_then(|line| classify_line(&line))?;
                        return Some((Ok(sse), (input, lines, true)));
                    }
                }
            }
        },
    );
    Box::pin(stream)
}
