//! Newline framing for the backend byte stream.

use bytes::BytesMut;
use memchr::memchr;

use crate::error::GatewayError;

/// Accumulates raw bytes and hands out complete lines.
///
/// Lines end at `\n`; one trailing `\r` is stripped and empty lines are
/// skipped. Anything after the last newline stays buffered until more bytes
/// arrive, so a line split across reads comes out whole. Framing works on
/// bytes, so a multi-byte character split between reads is not damaged.
#[derive(Debug)]
pub struct LineBuffer {
    buf: BytesMut,
    max_line_len: usize,
}

impl LineBuffer {
    pub fn new(max_line_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(8 * 1024),
            max_line_len: max_line_len.max(1),
        }
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Direct access for `AsyncReadExt::read_buf`.
    pub fn buf_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Bytes buffered after the last complete line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Pops the next non-empty line.
    ///
    /// Returns `Ok(None)` once no complete line is buffered, and an error if
    /// the unterminated tail has grown past `max_line_len`.
    pub fn next_line(&mut self) -> Result<Option<String>, GatewayError> {
        while let Some(i) = memchr(b'\n', &self.buf) {
            let raw = self.buf.split_to(i + 1);
            let mut end = i;
            if end > 0 && raw[end - 1] == b'\r' {
                end -= 1;
            }
            if end == 0 {
                continue;
            }
            return Ok(Some(String::from_utf8_lossy(&raw[..end]).into_owned()));
        }

        if self.buf.len() > self.max_line_len {
            return Err(GatewayError::Protocol(format!(
                "backend line exceeds {} bytes",
                self.max_line_len
            )));
        }
        Ok(None)
    }
}
