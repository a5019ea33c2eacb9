//! Reading child output streams.
//!
//! A stream reader pulls one line at a time from a child's stdout or stderr, wraps it
//! into a [`MergedLine`] carrying the command's prefix and forwards it to the merge loop.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

use crate::events::{Failure, FailureCause, MergedLine};

/// Longest line accepted by default before reading fails.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Indicates the source stream of an output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard Output.
    Stdout,
    /// Standard Error.
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Reads the next `\n`-terminated line, dropping the terminator and a trailing `\r`.
///
/// A final line without terminator is still returned. Returns `Ok(None)` at end of stream
/// and an `InvalidData` error once a line grows beyond `max_bytes`.
pub async fn next_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    loop {
        let (done, used) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                if buf.is_empty() {
                    return Ok(None);
                }
                break;
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    buf.extend_from_slice(&available[..pos]);
                    (true, pos + 1)
                }
                None => {
                    buf.extend_from_slice(available);
                    (false, available.len())
                }
            }
        };
        reader.consume(used);
        if buf.len() > max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds {} bytes", max_bytes),
            ));
        }
        if done {
            break;
        }
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Forwards every line of `reader` until end of stream or the first read error.
///
/// Returning from this function is the reader's "drained" signal.
pub(crate) async fn read_stream<R>(
    index: usize,
    stream: StreamKind,
    reader: R,
    prefix: Arc<str>,
    line_tx: mpsc::Sender<MergedLine>,
    err_tx: mpsc::Sender<Failure>,
    max_line_bytes: usize,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        match next_line(&mut reader, &mut buf, max_line_bytes).await {
            Ok(Some(text)) => {
                let line = MergedLine {
                    index,
                    stream,
                    prefix: Arc::clone(&prefix),
                    text,
                };
                if line_tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(error) => {
                let _ = err_tx
                    .send(Failure {
                        index,
                        cause: FailureCause::Read { stream, error },
                    })
                    .await;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn lines(input: &[u8], max: usize) -> (Vec<String>, Option<io::Error>) {
        let mut reader = BufReader::with_capacity(4, input);
        let mut buf = Vec::new();
        let mut out = Vec::new();
        loop {
            match next_line(&mut reader, &mut buf, max).await {
                Ok(Some(line)) => out.push(line),
                Ok(None) => return (out, None),
                Err(err) => return (out, Some(err)),
            }
        }
    }

    #[tokio::test]
    async fn splits_on_line_feed_and_keeps_partial_tail() {
        let (out, err) = lines(b"one\ntwo\r\n\nthree", 64).await;
        assert!(err.is_none());
        assert_eq!(out, vec!["one", "two", "", "three"]);
    }

    #[tokio::test]
    async fn empty_stream_has_no_lines() {
        let (out, err) = lines(b"", 64).await;
        assert!(out.is_empty());
        assert!(err.is_none());
    }

    #[tokio::test]
    async fn overlong_line_is_an_error() {
        let (out, err) = lines(b"ok\n0123456789abcdef\nlater\n", 8).await;
        assert_eq!(out, vec!["ok"]);
        assert_eq!(err.map(|e| e.kind()), Some(io::ErrorKind::InvalidData));
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let (out, _) = lines(b"a\xffb\n", 64).await;
        assert_eq!(out, vec!["a\u{fffd}b"]);
    }

    #[tokio::test]
    async fn read_stream_forwards_lines_in_order() {
        let (line_tx, mut line_rx) = mpsc::channel(1);
        let (err_tx, mut err_rx) = mpsc::channel(1);
        let task = tokio::spawn(read_stream(
            3,
            StreamKind::Stderr,
            &b"first\nsecond\n"[..],
            Arc::from("p"),
            line_tx,
            err_tx,
            DEFAULT_MAX_LINE_BYTES,
        ));
        let mut seen = Vec::new();
        while let Some(line) = line_rx.recv().await {
            assert_eq!(line.index, 3);
            assert_eq!(line.stream, StreamKind::Stderr);
            seen.push(line.text);
        }
        task.await.unwrap();
        assert_eq!(seen, vec!["first", "second"]);
        assert!(err_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn read_stream_reports_read_failure() {
        let (line_tx, mut line_rx) = mpsc::channel(1);
        let (err_tx, mut err_rx) = mpsc::channel(1);
        tokio::spawn(read_stream(
            0,
            StreamKind::Stdout,
            &b"xxxxxxxxxxxxxxxx"[..],
            Arc::from("p"),
            line_tx,
            err_tx,
            4,
        ));
        let failure = err_rx.recv().await.unwrap();
        assert_eq!(failure.index, 0);
        assert!(matches!(
            failure.cause,
            FailureCause::Read {
                stream: StreamKind::Stdout,
                ..
            }
        ));
        assert!(line_rx.recv().await.is_none());
    }
}
