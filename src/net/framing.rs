//! Newline-delimited JSON framing
//!
//! One [`Envelope`] per line. Lines longer than the configured limit are
//! skipped whole and reported; the reader stays usable afterwards.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::net::protocol::Envelope;

/// Errors that can occur while framing envelopes
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Line too long: {0} bytes (max {1})")]
    LineTooLong(usize, usize),
    #[error("Bad envelope: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FramingError {
    /// Whether the stream can still be read after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FramingError::Io(_))
    }
}

/// Reads envelopes line by line from a buffered stream
pub struct EnvelopeReader<R> {
    reader: R,
    max_line_bytes: usize,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> EnvelopeReader<R> {
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader,
            max_line_bytes,
            buf: Vec::with_capacity(1024),
        }
    }

    /// Next envelope, or `None` at end of input. Blank lines are skipped.
    pub async fn next_envelope(&mut self) -> Result<Option<Envelope>, FramingError> {
        loop {
            self.buf.clear();
            // Room for the body plus a trailing "\r\n"
            let limit = self.max_line_bytes as u64 + 2;
            let n = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut self.buf)
                .await?;
            if n == 0 {
                return Ok(None);
            }

            // Hit the limit mid-line: the body is longer than allowed
            if n as u64 == limit && self.buf.last() != Some(&b'\n') {
                let skipped = self.discard_rest_of_line().await?;
                return Err(FramingError::LineTooLong(
                    self.buf.len() + skipped,
                    self.max_line_bytes,
                ));
            }

            let mut line = self.buf.as_slice();
            while let [rest @ .., b'\n' | b'\r'] = line {
                line = rest;
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            if line.len() > self.max_line_bytes {
                return Err(FramingError::LineTooLong(line.len(), self.max_line_bytes));
            }

            return Ok(Some(serde_json::from_slice(line)?));
        }
    }

    async fn discard_rest_of_line(&mut self) -> io::Result<usize> {
        let mut skipped = 0;
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(skipped);
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    self.reader.consume(i + 1);
                    return Ok(skipped + i + 1);
                }
                None => {
                    let len = available.len();
                    self.reader.consume(len);
                    skipped += len;
                }
            }
        }
    }
}

/// Write one envelope as a JSON line and flush
pub async fn write_envelope<W: AsyncWrite + Unpin>(
    stream: &mut W,
    envelope: &Envelope,
) -> Result<(), FramingError> {
    let mut line = serde_json::to_vec(envelope)?;
    line.push(b'\n');
    stream.write_all(&line).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::Channel;
    use serde_json::json;
    use tokio::io::BufReader;
    use tokio_test::io::Builder;

    #[test]
    fn test_reads_lines_across_chunks() {
        tokio_test::block_on(async {
            let mock = Builder::new()
                .read(b"{\"channel\":\"aquarium\",\"event\":\"upd")
                .read(b"ate_thing\",\"data\":{\"id\":\"a\"}}\n\n")
                .read(b"{\"channel\":\"chat\",\"event\":\"new_message\"}\r\n")
                .build();
            let mut reader = EnvelopeReader::new(BufReader::new(mock), 1024);

            let first = reader.next_envelope().await.unwrap().unwrap();
            assert_eq!(first.channel, Channel::Aquarium);
            assert_eq!(first.data, json!({"id": "a"}));

            let second = reader.next_envelope().await.unwrap().unwrap();
            assert_eq!(second.event, "new_message");

            assert!(reader.next_envelope().await.unwrap().is_none());
        });
    }

    #[test]
    fn test_last_line_without_newline() {
        tokio_test::block_on(async {
            let mock = Builder::new()
                .read(b"{\"channel\":\"store\",\"event\":\"summarize_store\",\"data\":[]}")
                .build();
            let mut reader = EnvelopeReader::new(BufReader::new(mock), 1024);
            let env = reader.next_envelope().await.unwrap().unwrap();
            assert_eq!(env.channel, Channel::Store);
            assert!(reader.next_envelope().await.unwrap().is_none());
        });
    }

    #[test]
    fn test_long_line_is_skipped() {
        tokio_test::block_on(async {
            let long = format!("{{\"channel\":\"chat\",\"event\":\"{}\"}}\n", "x".repeat(100));
            let mock = Builder::new()
                .read(long.as_bytes())
                .read(b"{\"channel\":\"users\",\"event\":\"user_connected\",\"data\":\"bob\"}\n")
                .build();
            let mut reader = EnvelopeReader::new(BufReader::new(mock), 64);

            let err = reader.next_envelope().await.unwrap_err();
            assert!(matches!(err, FramingError::LineTooLong(n, 64) if n == long.len()));
            assert!(err.is_recoverable());

            let next = reader.next_envelope().await.unwrap().unwrap();
            assert_eq!(next.channel, Channel::Users);
        });
    }

    #[test]
    fn test_limit_applies_to_body_not_line_ending() {
        tokio_test::block_on(async {
            let body = r#"{"channel":"chat","event":"new_message"}"#;
            let max = body.len();
            let input = format!("{body}\r\n{body}\n{body}", body = body);
            let mock = Builder::new().read(input.as_bytes()).build();
            let mut reader = EnvelopeReader::new(BufReader::new(mock), max);

            for _ in 0..3 {
                let env = reader.next_envelope().await.unwrap().unwrap();
                assert_eq!(env.event, "new_message");
            }
            assert!(reader.next_envelope().await.unwrap().is_none());

            // One byte over is still rejected, whatever the line ending
            let over = r#"{"channel":"chat","event":"new_message" }"#;
            let input = format!("{over}\r\n{over}\n{over}", over = over);
            let mock = Builder::new().read(input.as_bytes()).build();
            let mut reader = EnvelopeReader::new(BufReader::new(mock), max);
            for _ in 0..3 {
                let err = reader.next_envelope().await.unwrap_err();
                assert!(matches!(err, FramingError::LineTooLong(_, m) if m == max));
            }
            assert!(reader.next_envelope().await.unwrap().is_none());
        });
    }

    #[test]
    fn test_bad_json_is_recoverable() {
        tokio_test::block_on(async {
            let mock = Builder::new()
                .read(b"not json\n{\"channel\":\"local\",\"event\":\"tap\"}\n")
                .build();
            let mut reader = EnvelopeReader::new(BufReader::new(mock), 1024);

            let err = reader.next_envelope().await.unwrap_err();
            assert!(matches!(err, FramingError::Json(_)));
            assert!(err.is_recoverable());
            assert_eq!(reader.next_envelope().await.unwrap().unwrap().channel, Channel::Local);
        });
    }

    #[test]
    fn test_write_envelope() {
        tokio_test::block_on(async {
            let mut mock = Builder::new()
                .write(b"{\"channel\":\"interactions\",\"event\":\"tap\",\"data\":{\"x\":1}}\n")
                .build();
            let env = Envelope::new(Channel::Interactions, "tap", json!({"x": 1}));
            write_envelope(&mut mock, &env).await.unwrap();
        });
    }
}
