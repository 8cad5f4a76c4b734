//! Bounded line splitting for subprocess output.

use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

const READ_BUFFER_BYTES: usize = 64 * 1024;

/// One line read from the subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// A complete line without its terminator.
    Text(String),
    /// A line longer than the limit; only its length is kept.
    Oversized(usize),
}

/// Reads newline-delimited output, never buffering much more than `limit`
/// bytes of a single line.
///
/// A trailing `\r` is stripped before the limit applies and invalid UTF-8
/// is replaced. A final line without a newline is still returned.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: BufReader<R>,
    limit: usize,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Creates a reader that accepts lines of up to `limit` bytes.
    pub fn new(reader: R, limit: usize) -> Self {
        Self {
            inner: BufReader::with_capacity(READ_BUFFER_BYTES, reader),
            limit,
            buf: Vec::new(),
        }
    }

    /// Returns the next line, or `None` at end of stream.
    pub async fn next_line(&mut self) -> io::Result<Option<OutputLine>> {
        self.buf.clear();
        let mut len = 0usize;
        let mut oversized = false;
        let mut read_any = false;

        loop {
            let (consumed, done) = {
                let available = self.inner.fill_buf().await?;
                if available.is_empty() {
                    break;
                }
                read_any = true;
                let (chunk, consumed, done) = match available.iter().position(|&b| b == b'\n') {
                    Some(i) => (&available[..i], i + 1, true),
                    None => (available, available.len(), false),
                };
                len += chunk.len();
                if !oversized {
                    // One spare byte for the `\r` of a CRLF ending.
                    if len > self.limit.saturating_add(1) {
                        oversized = true;
                        self.buf = Vec::new();
                    } else {
                        self.buf.extend_from_slice(chunk);
                    }
                }
                (consumed, done)
            };
            self.inner.consume(consumed);
            if done {
                break;
            }
        }

        if !read_any {
            return Ok(None);
        }
        if oversized {
            return Ok(Some(OutputLine::Oversized(len)));
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        if self.buf.len() > self.limit {
            return Ok(Some(OutputLine::Oversized(len)));
        }
        Ok(Some(OutputLine::Text(
            String::from_utf8_lossy(&self.buf).into_owned(),
        )))
    }
}
