//! Output draining (C5).
//!
//! The select loop here is adapted directly from
//! `turborepo-process::child::Child::wait_with_piped_async_outputs`: race
//! reading a line from stdout against one from stderr against the child's
//! exit, guarded so the exit branch only fires once, with an `else` arm that
//! flushes any partial trailing line once both streams and the wait future
//! are spent.
//!
//! One semantic change from that original loop: we do not return early
//! on a nonzero exit. A grandchild that inherited the pipe can keep a stream
//! open well past the point where the child we spawned has exited; stopping
//! the instant `wait()` resolves would silently truncate that output. So
//! once exit is observed we do exactly one more non-blocking drain pass over
//! whatever is immediately available, then stop — we do not block
//! indefinitely waiting for a lingering grandchild to close the pipe on its
//! own.
//!
//! `drain_bytes` runs the same select shape over raw chunks instead of
//! lines; the capture modes are built on it rather than on `drain_lines` so
//! that captured output is exactly the bytes the child wrote, not a
//! reconstruction from split, terminator-stripped lines.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::trace;

pub use crate::child::ExitStatus;

/// Which stream a line or chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// One line of output, with its trailing `\n` stripped and any `\r\n` line
/// ending normalized to `\n` before stripping.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: Stream,
    pub data: Vec<u8>,
}

/// Accumulated stdout/stderr, captured separately.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Accumulated stdout+stderr, interleaved in the order bytes were observed.
#[derive(Debug, Clone, Default)]
pub struct CombinedOutput {
    pub bytes: Vec<u8>,
}

fn strip_line_ending(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
}

async fn next_line<R: AsyncBufRead + Unpin>(
    stream: &mut Option<R>,
    buffer: &mut Vec<u8>,
) -> Option<io::Result<()>> {
    match stream {
        Some(s) => match s.read_until(b'\n', buffer).await {
            Ok(0) => {
                trace!("reached EOF");
                None
            }
            Ok(_) => Some(Ok(())),
            Err(e) => Some(Err(e)),
        },
        None => None,
    }
}

/// Drains `stdout`/`stderr` into a callback, invoked once per complete line,
/// stopping once `wait` resolves (plus one final non-blocking flush of
/// anything already buffered).
///
/// `wait` is typically `ChildProcessHandle::wait_async` for the same child;
/// it is passed in rather than the handle itself so the reader does not need
/// to borrow the handle mutably for its whole lifetime — a caller can still
/// poll `try_wait`/`signal` on the handle while output is draining.
///
/// `on_line` returns a future rather than running synchronously so a caller
/// that forwards lines through a bounded channel (the line-streaming
/// composition op) can `.await` the send and get real backpressure out of
/// it, instead of having to buffer unboundedly between drain and consumer.
pub async fn drain_lines<R1, R2, F, Fut, W>(
    stdout: Option<R1>,
    stderr: Option<R2>,
    mut on_line: F,
    wait: W,
) -> io::Result<ExitStatus>
where
    R1: AsyncRead + Unpin,
    R2: AsyncRead + Unpin,
    F: FnMut(OutputLine) -> Fut,
    Fut: std::future::Future<Output = io::Result<()>>,
    W: std::future::Future<Output = crate::error::Result<ExitStatus>>,
{
    tokio::pin!(wait);
    let mut stdout_lines = stdout.map(BufReader::new);
    let mut stderr_lines = stderr.map(BufReader::new);

    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    let mut exited: Option<ExitStatus> = None;

    loop {
        tokio::select! {
            biased;

            Some(result) = next_line(&mut stdout_lines, &mut stdout_buf), if exited.is_none() => {
                result?;
                let mut line = std::mem::take(&mut stdout_buf);
                strip_line_ending(&mut line);
                on_line(OutputLine { stream: Stream::Stdout, data: line }).await?;
            }
            Some(result) = next_line(&mut stderr_lines, &mut stderr_buf), if exited.is_none() => {
                result?;
                let mut line = std::mem::take(&mut stderr_buf);
                strip_line_ending(&mut line);
                on_line(OutputLine { stream: Stream::Stderr, data: line }).await?;
            }
            status = &mut wait, if exited.is_none() => {
                exited = Some(status.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?);
                trace!("child exited while output was draining, flushing once more");
            }
            else => break,
        }
    }

    // One final, non-blocking pass: anything sitting in the OS pipe buffer
    // already is available without awaiting further writes.
    flush_remaining(&mut stdout_lines, &mut stdout_buf, Stream::Stdout, &mut on_line).await?;
    flush_remaining(&mut stderr_lines, &mut stderr_buf, Stream::Stderr, &mut on_line).await?;

    exited.ok_or_else(|| io::Error::new(io::ErrorKind::Other, "wait future dropped without resolving"))
}

async fn flush_remaining<R, F, Fut>(
    stream: &mut Option<BufReader<R>>,
    buf: &mut Vec<u8>,
    which: Stream,
    on_line: &mut F,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(OutputLine) -> Fut,
    Fut: std::future::Future<Output = io::Result<()>>,
{
    let Some(s) = stream else { return Ok(()) };
    // A zero-duration timeout makes this a non-blocking check: it succeeds
    // only if the data was already sitting in the OS pipe buffer, and times
    // out immediately otherwise rather than waiting for a writer that may
    // never come (a grandchild still holding the pipe open).
    loop {
        match tokio::time::timeout(std::time::Duration::ZERO, s.read_until(b'\n', buf)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(_)) => {
                let mut line = std::mem::take(buf);
                strip_line_ending(&mut line);
                on_line(OutputLine { stream: which, data: line }).await?;
            }
            Ok(Err(_)) => break,
        }
    }
    if !buf.is_empty() {
        let line = std::mem::take(buf);
        on_line(OutputLine { stream: which, data: line }).await?;
    }
    Ok(())
}

async fn next_chunk<R: AsyncRead + Unpin>(
    stream: &mut Option<R>,
    buf: &mut [u8],
) -> Option<io::Result<usize>> {
    match stream {
        Some(s) => match s.read(buf).await {
            Ok(0) => {
                trace!("reached EOF");
                None
            }
            Ok(n) => Some(Ok(n)),
            Err(e) => Some(Err(e)),
        },
        None => None,
    }
}

/// Drains `stdout`/`stderr` into a callback invoked once per chunk of raw
/// bytes exactly as read from the pipe — no line splitting, no terminator
/// normalization. This is what the capture modes need: the child's own
/// bytes, untouched, not a reconstruction from split lines.
async fn drain_bytes<R1, R2, F, W>(
    stdout: Option<R1>,
    stderr: Option<R2>,
    mut on_chunk: F,
    wait: W,
) -> io::Result<ExitStatus>
where
    R1: AsyncRead + Unpin,
    R2: AsyncRead + Unpin,
    F: FnMut(Stream, &[u8]),
    W: std::future::Future<Output = crate::error::Result<ExitStatus>>,
{
    tokio::pin!(wait);
    let mut stdout = stdout;
    let mut stderr = stderr;

    let mut stdout_buf = [0u8; 8192];
    let mut stderr_buf = [0u8; 8192];
    let mut exited: Option<ExitStatus> = None;

    loop {
        tokio::select! {
            biased;

            Some(result) = next_chunk(&mut stdout, &mut stdout_buf), if exited.is_none() => {
                let n = result?;
                on_chunk(Stream::Stdout, &stdout_buf[..n]);
            }
            Some(result) = next_chunk(&mut stderr, &mut stderr_buf), if exited.is_none() => {
                let n = result?;
                on_chunk(Stream::Stderr, &stderr_buf[..n]);
            }
            status = &mut wait, if exited.is_none() => {
                exited = Some(status.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?);
                trace!("child exited while output was draining, flushing once more");
            }
            else => break,
        }
    }

    flush_remaining_bytes(&mut stdout, &mut stdout_buf, Stream::Stdout, &mut on_chunk).await;
    flush_remaining_bytes(&mut stderr, &mut stderr_buf, Stream::Stderr, &mut on_chunk).await;

    exited.ok_or_else(|| io::Error::new(io::ErrorKind::Other, "wait future dropped without resolving"))
}

async fn flush_remaining_bytes<R, F>(
    stream: &mut Option<R>,
    buf: &mut [u8],
    which: Stream,
    on_chunk: &mut F,
) where
    R: AsyncRead + Unpin,
    F: FnMut(Stream, &[u8]),
{
    let Some(s) = stream else { return };
    loop {
        match tokio::time::timeout(std::time::Duration::ZERO, s.read(buf)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => on_chunk(which, &buf[..n]),
            Ok(Err(_)) => break,
        }
    }
}

/// Accumulates stdout/stderr into separate byte buffers, byte-exact: no
/// synthesized trailing newline, no `\r\n` collapsing. Built on
/// [`drain_bytes`], not [`drain_lines`] — the line splitter's terminator
/// handling is wrong for capture, which must hand back exactly what the
/// child wrote.
pub async fn capture<R1, R2, W>(
    stdout: Option<R1>,
    stderr: Option<R2>,
    wait: W,
) -> io::Result<(CapturedOutput, ExitStatus)>
where
    R1: AsyncRead + Unpin,
    R2: AsyncRead + Unpin,
    W: std::future::Future<Output = crate::error::Result<ExitStatus>>,
{
    let mut out = CapturedOutput::default();
    let status = drain_bytes(
        stdout,
        stderr,
        |stream, chunk| {
            let buf = match stream {
                Stream::Stdout => &mut out.stdout,
                Stream::Stderr => &mut out.stderr,
            };
            buf.extend_from_slice(chunk);
        },
        wait,
    )
    .await?;
    Ok((out, status))
}

/// Interleaves both streams' raw bytes, in the order chunks actually
/// arrived, into one buffer. Byte-exact for the same reason [`capture`] is.
pub async fn capture_combined<R1, R2, W>(
    stdout: Option<R1>,
    stderr: Option<R2>,
    wait: W,
) -> io::Result<(CombinedOutput, ExitStatus)>
where
    R1: AsyncRead + Unpin,
    R2: AsyncRead + Unpin,
    W: std::future::Future<Output = crate::error::Result<ExitStatus>>,
{
    let mut out = CombinedOutput::default();
    let status = drain_bytes(
        stdout,
        stderr,
        |_stream, chunk| out.bytes.extend_from_slice(chunk),
        wait,
    )
    .await?;
    Ok((out, status))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strips_lf_and_crlf() {
        let mut a = b"hello\n".to_vec();
        strip_line_ending(&mut a);
        assert_eq!(a, b"hello");

        let mut b = b"hello\r\n".to_vec();
        strip_line_ending(&mut b);
        assert_eq!(b, b"hello");

        let mut c = b"hello".to_vec();
        strip_line_ending(&mut c);
        assert_eq!(c, b"hello");
    }
}
