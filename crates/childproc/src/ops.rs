//! Composition operations (C6): the small set of spawn shapes built on top
//! of the PAL, the child handle, and the output reader.
//!
//! Grounded in `turborepo-lib::process::command`'s `Command`/
//! `turborepo-process::child`'s `ChildHandle::spawn_normal` pairing: a single
//! low-level spawn primitive, wrapped by a handful of named call sites that
//! each fix the stdio shape a caller actually wants instead of exposing the
//! full cross product of options.
//!
//! `spawn_inherit`/`spawn_discard`/`spawn_redirect_to_files` are terminal:
//! each takes a deadline, waits for the child, and kills-and-reports
//! `Canceled` if that deadline trips, the way `turborepo-process::child`'s
//! `ShutdownStyle` escalation does. A caller that instead needs to steer the
//! child itself before any wait happens (checking `state()`, calling
//! `resume()` on a suspended start, signaling mid-flight) uses the
//! `_handle` variant of the same spawn shape to get the live
//! [`ChildProcessHandle`] back directly.

use std::{
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;

use crate::{
    child::ChildProcessHandle,
    deadline::MaybeDeadline,
    error::{Error, Result},
    handle::{self, BorrowedHandle},
    options::StartOptions,
    pal::{self, ResolvedEndpoint, ResolvedStdio},
    reader::{self, CapturedOutput, CombinedOutput, ExitStatus, OutputLine},
};

const LINE_QUEUE_CAPACITY: usize = 64;

fn spawn_raw(opts: &StartOptions, stdio: ResolvedStdio) -> Result<ChildProcessHandle> {
    let outcome = pal::spawn(opts, stdio)?;
    let suspended = opts.get_flags().create_suspended;
    Ok(ChildProcessHandle::new(outcome, suspended))
}

/// All three standard streams inherited from this process, returning the
/// live handle for manual control rather than driving it to completion.
/// Used by callers that must steer the child before waiting on it — most
/// notably a suspended start, which has to `resume()` before any wait makes
/// sense.
pub fn spawn_inherit_handle(opts: &StartOptions) -> Result<ChildProcessHandle> {
    spawn_raw(
        opts,
        ResolvedStdio {
            stdin: ResolvedEndpoint::Inherit,
            stdout: ResolvedEndpoint::Inherit,
            stderr: ResolvedEndpoint::Inherit,
        },
    )
}

/// All three standard streams inherited from this process; waits for exit
/// bounded by `deadline`, killing and reporting `Canceled` if it trips.
pub async fn spawn_inherit(opts: &StartOptions, deadline: MaybeDeadline) -> Result<ExitStatus> {
    spawn_inherit_handle(opts)?.wait_or_kill_async(deadline).await
}

/// All three standard streams connected to the null device, returning the
/// live handle. See [`spawn_inherit_handle`] for when to prefer this over
/// [`spawn_discard`].
pub fn spawn_discard_handle(opts: &StartOptions) -> Result<ChildProcessHandle> {
    spawn_raw(
        opts,
        ResolvedStdio {
            stdin: ResolvedEndpoint::Null,
            stdout: ResolvedEndpoint::Null,
            stderr: ResolvedEndpoint::Null,
        },
    )
}

/// All three standard streams connected to the null device; waits for exit
/// bounded by `deadline`, killing and reporting `Canceled` if it trips.
pub async fn spawn_discard(opts: &StartOptions, deadline: MaybeDeadline) -> Result<ExitStatus> {
    spawn_discard_handle(opts)?.wait_or_kill_async(deadline).await
}

/// Stdout/stderr redirected to caller-owned open files; stdin discarded.
/// The caller's handles are duplicated, not consumed — the caller keeps them
/// open (and is responsible for eventually closing them) after this call
/// returns. Returns the live handle; see [`spawn_inherit_handle`].
pub fn spawn_redirect_to_files_handle(
    opts: &StartOptions,
    stdout_file: BorrowedHandle<'_>,
    stderr_file: BorrowedHandle<'_>,
) -> Result<ChildProcessHandle> {
    let stdout = handle::duplicate(stdout_file).map_err(Error::OsResource)?;
    let stderr = handle::duplicate(stderr_file).map_err(Error::OsResource)?;
    spawn_raw(
        opts,
        ResolvedStdio {
            stdin: ResolvedEndpoint::Null,
            stdout: ResolvedEndpoint::PipeEnd(stdout),
            stderr: ResolvedEndpoint::PipeEnd(stderr),
        },
    )
}

/// Stdout/stderr redirected to caller-owned open files, stdin discarded;
/// waits for exit bounded by `deadline`, killing and reporting `Canceled` if
/// it trips.
pub async fn spawn_redirect_to_files(
    opts: &StartOptions,
    stdout_file: BorrowedHandle<'_>,
    stderr_file: BorrowedHandle<'_>,
    deadline: MaybeDeadline,
) -> Result<ExitStatus> {
    spawn_redirect_to_files_handle(opts, stdout_file, stderr_file)?
        .wait_or_kill_async(deadline)
        .await
}

/// Spawns with stdio discarded and immediately releases interest in the
/// process: the caller gets the pid back but no handle to wait on. Useful
/// for detached, long-lived processes the caller does not intend to
/// supervise.
pub fn spawn_fire_and_forget(opts: &StartOptions) -> Result<u32> {
    let child = spawn_discard_handle(opts)?;
    let pid = child.pid();
    child.dispose();
    Ok(pid)
}

/// Spawns with stdout/stderr piped and captured into separate buffers.
pub async fn spawn_capture(opts: &StartOptions) -> Result<(CapturedOutput, ExitStatus)> {
    let mut child = spawn_raw(
        opts,
        ResolvedStdio {
            stdin: ResolvedEndpoint::Null,
            stdout: ResolvedEndpoint::Piped,
            stderr: ResolvedEndpoint::Piped,
        },
    )?;
    let stdout = child.take_stdout();
    let stderr = child.take_stderr();
    reader::capture(
        stdout,
        stderr,
        child.wait_async(crate::deadline::MaybeDeadline::NONE),
    )
    .await
    .map_err(Error::Io)
}

/// Spawns with stdout/stderr piped and captured into one interleaved buffer.
pub async fn spawn_capture_combined(opts: &StartOptions) -> Result<(CombinedOutput, ExitStatus)> {
    let mut child = spawn_raw(
        opts,
        ResolvedStdio {
            stdin: ResolvedEndpoint::Null,
            stdout: ResolvedEndpoint::Piped,
            stderr: ResolvedEndpoint::Piped,
        },
    )?;
    let stdout = child.take_stdout();
    let stderr = child.take_stderr();
    reader::capture_combined(
        stdout,
        stderr,
        child.wait_async(crate::deadline::MaybeDeadline::NONE),
    )
    .await
    .map_err(Error::Io)
}

/// Spawns `upstream`, piping its stdout directly into `downstream`'s stdin
/// (an OS-level pipe shared between the two children, not buffered through
/// this process), and returns both handles for the caller to wait on.
pub fn spawn_piped_pair(
    upstream: &StartOptions,
    downstream: &StartOptions,
) -> Result<(ChildProcessHandle, ChildProcessHandle)> {
    let pipe = crate::pipe::create_pipe(false, false).map_err(Error::OsResource)?;

    let up = spawn_raw(
        upstream,
        ResolvedStdio {
            stdin: ResolvedEndpoint::Null,
            stdout: ResolvedEndpoint::PipeEnd(pipe.write),
            stderr: ResolvedEndpoint::Inherit,
        },
    )?;
    let down = spawn_raw(
        downstream,
        ResolvedStdio {
            stdin: ResolvedEndpoint::PipeEnd(pipe.read),
            stdout: ResolvedEndpoint::Inherit,
            stderr: ResolvedEndpoint::Inherit,
        },
    )?;

    Ok((up, down))
}

/// Builds a [`LineStream`] over `opts`, not spawning anything until the
/// stream is first polled. `deadline` bounds the whole run the same way it
/// does for [`spawn_inherit`]/[`spawn_discard`]: on expiry the child is
/// killed and the stream's final status is `Canceled`.
pub fn stream_lines(opts: StartOptions, deadline: MaybeDeadline) -> LineStream {
    LineStream {
        inner: LineStreamInner::Pending(Some((opts, deadline))),
        exit_status: None,
    }
}

enum LineStreamInner {
    Pending(Option<(StartOptions, MaybeDeadline)>),
    Running {
        pid: u32,
        rx: tokio::sync::mpsc::Receiver<OutputLine>,
        done_rx: tokio::sync::oneshot::Receiver<Result<ExitStatus>>,
    },
    Draining {
        pid: u32,
        done_rx: tokio::sync::oneshot::Receiver<Result<ExitStatus>>,
    },
    Finished,
}

/// A lazy, single-pass, cancel-able sequence of [`OutputLine`]s.
///
/// Nothing is spawned until this stream is polled for the first time, so a
/// `LineStream` built but never consumed leaks no process. Lines flow
/// through a bounded channel fed by a background drain task: a slow consumer
/// applies backpressure all the way back to the reads on the child's pipes,
/// rather than this crate buffering unboundedly on the consumer's behalf.
pub struct LineStream {
    inner: LineStreamInner,
    exit_status: Option<Result<ExitStatus>>,
}

impl LineStream {
    /// The child's pid, once the stream has been polled at least once and
    /// spawning succeeded. `None` before the first poll, or if spawning
    /// failed (in which case the stream yields no items).
    pub fn pid(&self) -> Option<u32> {
        match &self.inner {
            LineStreamInner::Running { pid, .. } | LineStreamInner::Draining { pid, .. } => {
                Some(*pid)
            }
            _ => None,
        }
    }

    /// The final status, available once the stream has yielded `None`.
    pub fn exit_status(&self) -> Option<&Result<ExitStatus>> {
        self.exit_status.as_ref()
    }
}

impl Stream for LineStream {
    type Item = io::Result<OutputLine>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match &mut self.inner {
                LineStreamInner::Pending(slot) => {
                    let (opts, deadline) =
                        slot.take().expect("LineStream polled after completion");
                    match start_line_stream(opts, deadline) {
                        Ok((pid, rx, done_rx)) => {
                            self.inner = LineStreamInner::Running { pid, rx, done_rx };
                        }
                        Err(e) => {
                            self.exit_status = Some(Err(e));
                            self.inner = LineStreamInner::Finished;
                            return Poll::Ready(None);
                        }
                    }
                }
                LineStreamInner::Running { rx, .. } => match rx.poll_recv(cx) {
                    Poll::Ready(Some(line)) => return Poll::Ready(Some(Ok(line))),
                    Poll::Ready(None) => {
                        let (pid, done_rx) =
                            match std::mem::replace(&mut self.inner, LineStreamInner::Finished) {
                                LineStreamInner::Running { pid, done_rx, .. } => (pid, done_rx),
                                _ => unreachable!(),
                            };
                        self.inner = LineStreamInner::Draining { pid, done_rx };
                    }
                    Poll::Pending => return Poll::Pending,
                },
                LineStreamInner::Draining { done_rx, .. } => {
                    return match Pin::new(done_rx).poll(cx) {
                        Poll::Ready(result) => {
                            self.exit_status = Some(result.unwrap_or_else(|_| {
                                Err(Error::InvalidState(
                                    "output reader task ended without reporting a status",
                                ))
                            }));
                            self.inner = LineStreamInner::Finished;
                            Poll::Ready(None)
                        }
                        Poll::Pending => Poll::Pending,
                    };
                }
                LineStreamInner::Finished => return Poll::Ready(None),
            }
        }
    }
}

fn start_line_stream(
    opts: StartOptions,
    deadline: MaybeDeadline,
) -> Result<(
    u32,
    tokio::sync::mpsc::Receiver<OutputLine>,
    tokio::sync::oneshot::Receiver<Result<ExitStatus>>,
)> {
    let mut child = spawn_raw(
        &opts,
        ResolvedStdio {
            stdin: ResolvedEndpoint::Null,
            stdout: ResolvedEndpoint::Piped,
            stderr: ResolvedEndpoint::Piped,
        },
    )?;
    let pid = child.pid();
    let stdout = child.take_stdout();
    let stderr = child.take_stderr();

    let (tx, rx) = tokio::sync::mpsc::channel(LINE_QUEUE_CAPACITY);
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let result = reader::drain_lines(
            stdout,
            stderr,
            move |line| {
                let tx = tx.clone();
                async move {
                    tx.send(line)
                        .await
                        .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "line consumer dropped"))
                }
            },
            child.wait_or_kill_async(deadline),
        )
        .await
        .map_err(Error::Io);
        let _ = done_tx.send(result);
    });

    Ok((pid, rx, done_rx))
}
