//! Newline framing over any `AsyncRead`.
//!
//! Bytes are collected in a `BytesMut` that lives in the reader, not in the
//! read future, so dropping a pending read (timeout, shutdown, `select!`)
//! never loses data already received.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::error::{MeteostickError, Result};
use crate::protocol::RawLine;
use crate::station::Timestamp;

use super::port_trait::LineRead;

/// Longest line accepted; longer input is dropped up to the next newline
pub const MAX_LINE_LENGTH: usize = 256;

#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    buffer: BytesMut,
    timeout: Duration,
    discard_next: bool,
    skipping_overlong: bool,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// `discard_first_line` drops the first complete line, which is usually
    /// a fragment when the port is opened mid-transmission.
    pub fn new(inner: R, timeout: Duration, discard_first_line: bool) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(MAX_LINE_LENGTH),
            timeout,
            discard_next: discard_first_line,
            skipping_overlong: false,
        }
    }

    /// Next complete line, or `Timeout` if none arrived within the timeout.
    ///
    /// # Errors
    ///
    /// `LineSupplyClosed` at end of stream, `Io` for read failures
    pub async fn next_line(&mut self) -> Result<LineRead> {
        loop {
            if let Some(text) = self.take_line() {
                if self.discard_next {
                    self.discard_next = false;
                    debug!("Discarded first line '{}'", text);
                    continue;
                }
                return Ok(LineRead::Line(RawLine::new(text, Timestamp::now())));
            }

            if self.buffer.len() > MAX_LINE_LENGTH {
                warn!("Dropping {} bytes without a line terminator", self.buffer.len());
                self.buffer.clear();
                self.skipping_overlong = true;
            }

            match tokio::time::timeout(self.timeout, self.inner.read_buf(&mut self.buffer)).await {
                Err(_) => return Ok(LineRead::Timeout),
                Ok(Ok(0)) => return Err(MeteostickError::LineSupplyClosed),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(MeteostickError::Io(e)),
            }
        }
    }

    fn take_line(&mut self) -> Option<String> {
        loop {
            let end = self.buffer.iter().position(|&b| b == b'\n')?;
            let frame = self.buffer.split_to(end + 1);

            if self.skipping_overlong {
                self.skipping_overlong = false;
                continue;
            }

            let text = String::from_utf8_lossy(&frame);
            return Some(text.trim_end_matches(&['\r', '\n'][..]).to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn expect_line(read: LineRead) -> String {
        match read {
            LineRead::Line(line) => line.text,
            LineRead::Timeout => panic!("Expected a line, got timeout"),
        }
    }

    #[tokio::test]
    async fn test_lines_split_across_reads() {
        let mock = Builder::new()
            .read(b"R 1 5 -6")
            .read(b"0\r\nT 1 21.0 40 -61\n")
            .build();
        let mut reader = LineReader::new(mock, Duration::from_secs(3), false);

        assert_eq!(expect_line(reader.next_line().await.unwrap()), "R 1 5 -60");
        assert_eq!(expect_line(reader.next_line().await.unwrap()), "T 1 21.0 40 -61");
        assert!(matches!(
            reader.next_line().await,
            Err(MeteostickError::LineSupplyClosed)
        ));
    }

    #[tokio::test]
    async fn test_discard_first_line() {
        let mock = Builder::new().read(b"1 -58\nW 1 2.0 90 -60\n").build();
        let mut reader = LineReader::new(mock, Duration::from_secs(3), true);
        assert_eq!(expect_line(reader.next_line().await.unwrap()), "W 1 2.0 90 -60");
    }

    #[tokio::test]
    async fn test_overlong_input_dropped() {
        let noise = vec![b'x'; MAX_LINE_LENGTH + 10];
        let mock = Builder::new()
            .read(&noise)
            .read(b"xx\nB 21.0 1010.0\n")
            .build();
        let mut reader = LineReader::new(mock, Duration::from_secs(3), false);
        assert_eq!(expect_line(reader.next_line().await.unwrap()), "B 21.0 1010.0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_not_an_error() {
        let mock = Builder::new().wait(Duration::from_secs(10)).build();
        let mut reader = LineReader::new(mock, Duration::from_secs(3), false);
        assert!(matches!(reader.next_line().await.unwrap(), LineRead::Timeout));
    }
}
