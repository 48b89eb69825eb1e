//! Reply sinks for command handlers.
//!
//! Handlers never touch the transport. They write text into a [`ReplySink`],
//! and the shell decides how the accumulated bytes reach the peer.

use std::fmt;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Size of each write when a reply is flushed to the peer.
pub const REPLY_CHUNK_SIZE: usize = 64;

/// Write-only destination for handler output.
pub trait ReplySink: Send {
    /// Appends a string to the reply.
    fn write_str(&mut self, s: &str);

    /// Appends formatted output.
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) {
        self.write_str(&args.to_string());
    }
}

/// In-memory reply buffer, one per command invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplyBuffer {
    bytes: Vec<u8>,
}

impl ReplyBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the accumulated bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Discards the buffered output.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Writes the buffered bytes to `writer` in [`REPLY_CHUNK_SIZE`] pieces.
    ///
    /// # Errors
    ///
    /// Returns the first write error; the remaining chunks are not sent.
    pub async fn flush_to<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        for chunk in self.bytes.chunks(REPLY_CHUNK_SIZE) {
            writer.write_all(chunk).await?;
        }
        writer.flush().await
    }
}

impl ReplySink for ReplyBuffer {
    fn write_str(&mut self, s: &str) {
        self.bytes.extend_from_slice(s.as_bytes());
    }
}

impl fmt::Display for ReplyBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writer that records the size of every write it receives.
    #[derive(Default)]
    struct RecordingWriter {
        data: Vec<u8>,
        writes: Vec<usize>,
    }

    impl AsyncWrite for RecordingWriter {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            self.data.extend_from_slice(buf);
            self.writes.push(buf.len());
            std::task::Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn test_write_fmt() {
        let mut buf = ReplyBuffer::new();
        write!(buf, "[{}] {} = {}\r\n", 3, "motd", "hi");
        assert_eq!(buf.to_string(), "[3] motd = hi\r\n");
    }

    #[tokio::test]
    async fn test_flush_is_chunked() {
        let mut buf = ReplyBuffer::new();
        let text = "x".repeat(REPLY_CHUNK_SIZE * 2 + 10);
        buf.write_str(&text);

        let mut writer = RecordingWriter::default();
        buf.flush_to(&mut writer).await.unwrap();

        assert_eq!(writer.data, text.as_bytes());
        assert_eq!(writer.writes, vec![REPLY_CHUNK_SIZE, REPLY_CHUNK_SIZE, 10]);
    }

    #[tokio::test]
    async fn test_flush_empty_writes_nothing() {
        let buf = ReplyBuffer::new();
        let mut writer = RecordingWriter::default();
        buf.flush_to(&mut writer).await.unwrap();
        assert!(writer.writes.is_empty());
    }
}
