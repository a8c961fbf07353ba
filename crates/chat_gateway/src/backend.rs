//! The per-bridge link to the backend session transport.
//!
//! Each client connection gets its own TCP connection to the backend, opened
//! as soon as the client is accepted. The stream is split so the bridge can
//! read backend lines and write forwarded commands independently.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::GatewayError;
use crate::framing::LineBuffer;

/// Opens backend links.
pub struct BackendLink;

impl BackendLink {
    /// Connects to the backend and returns the two halves of the link.
    pub async fn connect(
        addr: SocketAddr,
        max_line_len: usize,
    ) -> Result<(BackendReader<OwnedReadHalf>, BackendWriter<OwnedWriteHalf>), GatewayError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| GatewayError::Backend(format!("Failed to connect to {addr}: {e}")))?;
        stream.set_nodelay(true).ok();

        let (rd, wr) = stream.into_split();
        Ok((
            BackendReader::new(rd, max_line_len),
            BackendWriter::new(wr),
        ))
    }
}

/// Reading half: frames backend output into lines.
#[derive(Debug)]
pub struct BackendReader<R> {
    inner: R,
    lines: LineBuffer,
}

impl<R: AsyncRead + Unpin> BackendReader<R> {
    pub fn new(inner: R, max_line_len: usize) -> Self {
        Self {
            inner,
            lines: LineBuffer::new(max_line_len),
        }
    }

    /// Reads the next non-empty line.
    ///
    /// Returns `Ok(None)` when the backend closes its side. Bytes left over
    /// without a terminating newline at that point are discarded.
    pub async fn next_line(&mut self) -> Result<Option<String>, GatewayError> {
        loop {
            if let Some(line) = self.lines.next_line()? {
                return Ok(Some(line));
            }

            let n = self.inner.read_buf(self.lines.buf_mut()).await?;
            if n == 0 {
                if self.lines.pending() > 0 {
                    debug!(
                        "Backend closed with {} unterminated byte(s)",
                        self.lines.pending()
                    );
                }
                return Ok(None);
            }
        }
    }
}

/// Writing half: sends newline-terminated commands.
#[derive(Debug)]
pub struct BackendWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> BackendWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes `line`, appending `\n` unless it already ends with one.
    pub async fn send_line(&mut self, line: &str) -> Result<(), GatewayError> {
        if line.ends_with('\n') {
            self.inner.write_all(line.as_bytes()).await?;
        } else {
            let mut out = String::with_capacity(line.len() + 1);
            out.push_str(line);
            out.push('\n');
            self.inner.write_all(out.as_bytes()).await?;
        }
        self.inner.flush().await?;
        Ok(())
    }

    /// Half-closes the backend connection.
    pub async fn shutdown(&mut self) -> Result<(), GatewayError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
