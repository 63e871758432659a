//! Line transport over a split TCP stream.
//!
//! Reading happens on the session task through [`LineReader`]; writing
//! happens on a dedicated writer task fed by the session's outbox, so each
//! peer has an independent write path.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::session::SessionId;
use crate::error::{ChatError, Result};

/// Reads newline-terminated UTF-8 lines with a length cap.
pub struct LineReader<R> {
    reader: BufReader<R>,
    max_line_length: usize,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R, max_line_length: usize) -> Self {
        Self {
            reader: BufReader::new(inner),
            max_line_length,
            buf: Vec::new(),
        }
    }

    /// Read the next line without its `\n` or `\r\n` terminator.
    ///
    /// Returns `Ok(None)` at end of stream. Trailing bytes with no
    /// terminator are discarded as an incomplete line. Over-long lines and
    /// invalid UTF-8 are protocol errors.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();

        // Room for the longest allowed line plus "\r\n".
        let limit = self.max_line_length as u64 + 2;
        let n = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .await?;

        if n == 0 {
            return Ok(None);
        }

        if self.buf.last() != Some(&b'\n') {
            if n as u64 >= limit {
                return Err(ChatError::Protocol(format!(
                    "line exceeds {} bytes",
                    self.max_line_length
                )));
            }
            debug!("Discarding {} bytes of unterminated input at EOF", n);
            return Ok(None);
        }

        self.buf.pop();
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }

        if self.buf.len() > self.max_line_length {
            return Err(ChatError::Protocol(format!(
                "line exceeds {} bytes",
                self.max_line_length
            )));
        }

        String::from_utf8(std::mem::take(&mut self.buf))
            .map(Some)
            .map_err(|_| ChatError::Protocol("line is not valid UTF-8".to_string()))
    }
}

/// Spawn the writer task for one session.
///
/// The task drains `outbox` into `writer`, bounding every write by
/// `write_timeout`. It exits when every sender is dropped, after flushing
/// what was queued. A failed or timed-out write stops the task and cancels
/// `session_cancel` so the session tears itself down.
pub fn spawn_writer<W>(
    mut writer: W,
    mut outbox: mpsc::Receiver<String>,
    write_timeout: Duration,
    session_cancel: CancellationToken,
    id: SessionId,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(line) = outbox.recv().await {
            match tokio::time::timeout(write_timeout, writer.write_all(line.as_bytes())).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(session = %id, "Write failed: {}", e);
                    session_cancel.cancel();
                    break;
                }
                Err(_) => {
                    warn!(session = %id, "Write timed out after {:?}", write_timeout);
                    session_cancel.cancel();
                    break;
                }
            }
        }

        // Closing the receiver makes later deliveries fail fast.
        outbox.close();
        if let Err(e) = writer.shutdown().await {
            debug!(session = %id, "Shutdown of write half failed: {}", e);
        }
    })
}
